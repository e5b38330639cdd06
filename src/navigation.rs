//! Slide navigation for one open card.
//!
//! The slider never swaps the visible image to something undecoded: a
//! navigation request first asks the host to decode the target, and only the
//! completion of the latest request commits the new index. Everything here is
//! pure state; the host performs the returned [`SlideEffect`]s and feeds
//! [`DecodeCompletion`]s back.

use std::time::Duration;
use serde::Serialize;

#[allow(unused_imports)]
use log::{debug, info, warn, error};

/// Ask the host to fetch and decode `reference`, then report back with the same ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeRequest {
    pub mount: u64,
    pub seq: u64,
    pub index: usize,
    pub reference: String,
}

impl DecodeRequest {
    pub fn complete(&self, outcome: DecodeOutcome) -> DecodeCompletion {
        DecodeCompletion {
            mount: self.mount,
            seq: self.seq,
            index: self.index,
            outcome,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeOutcome {
    Ready,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeCompletion {
    pub mount: u64,
    pub seq: u64,
    pub index: usize,
    pub outcome: DecodeOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlideEffect {
    Decode(DecodeRequest),
    /// Best-effort background fetch+decode, started after `delay`
    Warm { reference: String, delay: Duration },
    /// Navigation left the range of slides; the owner closes the slider
    Exit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlideKey {
    ArrowLeft,
    ArrowRight,
    Escape,
    Other,
}

impl SlideKey {
    pub fn from_name(name: &str) -> Self {
        match name {
            "ArrowLeft" => SlideKey::ArrowLeft,
            "ArrowRight" => SlideKey::ArrowRight,
            "Escape" => SlideKey::Escape,
            _ => SlideKey::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Thumbnail {
    pub reference: String,
    pub selected: bool,
}

#[derive(Debug)]
pub struct Slider {
    images: Vec<String>,
    mount: u64,
    current_index: usize,
    is_clarifying: bool,
    next_seq: u64,
    pending: Option<DecodeRequest>,
    prefetch_delay: Duration,
}

impl Slider {
    /// Mounts a slider at `start_index` and returns the neighbor prefetch for it.
    ///
    /// `mount` must be unique per mounted slider so completions addressed to a
    /// previous card are dropped.
    pub fn new(images: Vec<String>, start_index: usize, mount: u64, prefetch_delay: Duration) -> (Self, Vec<SlideEffect>) {
        let current_index = if images.is_empty() {
            0
        } else if start_index >= images.len() {
            warn!("Start index {} out of range for {} images, using last", start_index, images.len());
            images.len() - 1
        } else {
            start_index
        };

        let slider = Self {
            images,
            mount,
            current_index,
            is_clarifying: false,
            next_seq: 0,
            pending: None,
            prefetch_delay,
        };
        let effects = slider.neighbor_prefetch();
        (slider, effects)
    }

    pub fn go_to(&mut self, index: isize) -> Vec<SlideEffect> {
        if index < 0 || index as usize >= self.images.len() {
            debug!("Slide {} out of range (0..{}), exiting", index, self.images.len());
            // A pending decode must not commit after the exit
            self.pending = None;
            self.is_clarifying = false;
            return vec![SlideEffect::Exit];
        }

        let index = index as usize;
        self.next_seq += 1;
        let request = DecodeRequest {
            mount: self.mount,
            seq: self.next_seq,
            index,
            reference: self.images[index].clone(),
        };
        if let Some(superseded) = self.pending.replace(request.clone()) {
            debug!("Slide request {} superseded by {}", superseded.index, index);
        }
        self.is_clarifying = true;

        vec![SlideEffect::Decode(request)]
    }

    pub fn next(&mut self) -> Vec<SlideEffect> {
        self.go_to(self.current_index as isize + 1)
    }

    pub fn prev(&mut self) -> Vec<SlideEffect> {
        self.go_to(self.current_index as isize - 1)
    }

    /// Applies a decode completion. Ready and failed both commit.
    pub fn on_decode_finished(&mut self, completion: &DecodeCompletion) -> Vec<SlideEffect> {
        let is_latest = matches!(
            &self.pending,
            Some(pending) if pending.mount == completion.mount && pending.seq == completion.seq
        );
        if !is_latest {
            debug!("Ignoring stale decode completion for slide {} (seq {})", completion.index, completion.seq);
            return Vec::new();
        }

        if completion.outcome == DecodeOutcome::Failed {
            debug!("Slide {} failed to decode, showing it anyway", completion.index);
        }

        self.pending = None;
        self.is_clarifying = false;

        if self.current_index == completion.index {
            return Vec::new();
        }
        self.current_index = completion.index;
        self.neighbor_prefetch()
    }

    pub fn handle_key(&mut self, key: SlideKey) -> Vec<SlideEffect> {
        match key {
            SlideKey::ArrowLeft => self.prev(),
            SlideKey::ArrowRight => self.next(),
            SlideKey::Escape => {
                self.pending = None;
                self.is_clarifying = false;
                vec![SlideEffect::Exit]
            }
            SlideKey::Other => Vec::new(),
        }
    }

    // prev and next right away, one further ahead after a short delay
    fn neighbor_prefetch(&self) -> Vec<SlideEffect> {
        let i = self.current_index;
        let mut effects = Vec::with_capacity(3);

        if let Some(next) = self.images.get(i + 1) {
            effects.push(SlideEffect::Warm { reference: next.clone(), delay: Duration::ZERO });
        }
        if let Some(prev) = i.checked_sub(1).and_then(|p| self.images.get(p)) {
            effects.push(SlideEffect::Warm { reference: prev.clone(), delay: Duration::ZERO });
        }
        if let Some(ahead) = self.images.get(i + 2) {
            effects.push(SlideEffect::Warm { reference: ahead.clone(), delay: self.prefetch_delay });
        }
        effects
    }

    pub fn current_image(&self) -> Option<&str> {
        self.images.get(self.current_index).map(String::as_str)
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn is_clarifying(&self) -> bool {
        self.is_clarifying
    }

    pub fn mount(&self) -> u64 {
        self.mount
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn images(&self) -> &[String] {
        &self.images
    }

    pub fn alt_text(&self) -> String {
        format!("Slide {} of {}", self.current_index + 1, self.images.len())
    }

    pub fn thumbnails(&self) -> Vec<Thumbnail> {
        self.images
            .iter()
            .enumerate()
            .map(|(i, reference)| Thumbnail {
                reference: reference.clone(),
                selected: i == self.current_index,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DELAY: Duration = Duration::from_millis(80);

    fn slider(names: &[&str]) -> Slider {
        let images = names.iter().map(|s| s.to_string()).collect();
        Slider::new(images, 0, 1, DELAY).0
    }

    fn request(effects: &[SlideEffect]) -> DecodeRequest {
        match effects {
            [SlideEffect::Decode(req)] => req.clone(),
            other => panic!("expected a single decode, got {:?}", other),
        }
    }

    fn warmed(effects: &[SlideEffect]) -> Vec<(String, Duration)> {
        effects
            .iter()
            .filter_map(|e| match e {
                SlideEffect::Warm { reference, delay } => Some((reference.clone(), *delay)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_mount_prefetches_neighbors() {
        let images = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let (s, effects) = Slider::new(images, 0, 7, DELAY);
        assert_eq!(s.current_image(), Some("a"));
        assert!(!s.is_clarifying());
        assert_eq!(
            warmed(&effects),
            vec![("b".to_string(), Duration::ZERO), ("c".to_string(), DELAY)]
        );
    }

    #[test]
    fn test_keeps_old_image_until_decoded() {
        let mut s = slider(&["x1", "x2", "x3"]);
        let req = request(&s.next());

        assert!(s.is_clarifying());
        assert_eq!(s.current_image(), Some("x1"));

        let effects = s.on_decode_finished(&req.complete(DecodeOutcome::Ready));
        assert_eq!(s.current_image(), Some("x2"));
        assert!(!s.is_clarifying());
        assert_eq!(
            warmed(&effects),
            vec![("x3".to_string(), Duration::ZERO), ("x1".to_string(), Duration::ZERO)]
        );
    }

    #[test]
    fn test_failed_decode_still_commits() {
        let mut s = slider(&["a", "b", "c", "d"]);
        let req = request(&s.go_to(3));
        s.on_decode_finished(&req.complete(DecodeOutcome::Failed));
        assert_eq!(s.current_index(), 3);
        assert!(!s.is_clarifying());
    }

    #[test]
    fn test_last_request_wins() {
        let mut s = slider(&["a", "b", "c", "d"]);
        let first = request(&s.go_to(1));
        let second = request(&s.go_to(3));

        s.on_decode_finished(&second.complete(DecodeOutcome::Ready));
        assert_eq!(s.current_index(), 3);

        // The superseded completion arrives late
        let effects = s.on_decode_finished(&first.complete(DecodeOutcome::Ready));
        assert!(effects.is_empty());
        assert_eq!(s.current_index(), 3);
        assert!(!s.is_clarifying());
    }

    #[test]
    fn test_stale_completion_before_latest_does_not_commit() {
        let mut s = slider(&["a", "b", "c"]);
        let first = request(&s.go_to(1));
        let _second = request(&s.go_to(2));

        s.on_decode_finished(&first.complete(DecodeOutcome::Ready));
        assert_eq!(s.current_index(), 0);
        assert!(s.is_clarifying());
    }

    #[test]
    fn test_completion_from_other_mount_ignored() {
        let mut s = slider(&["a", "b"]);
        let req = request(&s.next());
        let foreign = DecodeCompletion { mount: 99, ..req.complete(DecodeOutcome::Ready) };
        s.on_decode_finished(&foreign);
        assert_eq!(s.current_index(), 0);
    }

    #[test]
    fn test_out_of_range_exits_once() {
        let mut s = slider(&["a", "b"]);
        assert_eq!(s.prev(), vec![SlideEffect::Exit]);
        assert_eq!(s.go_to(2), vec![SlideEffect::Exit]);
        assert_eq!(s.current_index(), 0);
    }

    #[test]
    fn test_exit_drops_pending_request() {
        let mut s = slider(&["a", "b"]);
        let req = request(&s.next());
        assert_eq!(s.go_to(-1), vec![SlideEffect::Exit]);
        s.on_decode_finished(&req.complete(DecodeOutcome::Ready));
        assert_eq!(s.current_index(), 0);
    }

    #[test]
    fn test_walk_forward_and_back() {
        let mut s = slider(&["x1", "x2", "x3"]);
        for _ in 0..2 {
            let req = request(&s.next());
            s.on_decode_finished(&req.complete(DecodeOutcome::Ready));
        }
        assert_eq!(s.current_image(), Some("x3"));
        assert_eq!(s.current_index(), 2);

        for expected in ["x2", "x1"] {
            let req = request(&s.prev());
            s.on_decode_finished(&req.complete(DecodeOutcome::Ready));
            assert_eq!(s.current_image(), Some(expected));
        }
        assert_eq!(s.prev(), vec![SlideEffect::Exit]);
    }

    #[test]
    fn test_same_index_commit_skips_prefetch() {
        let mut s = slider(&["a", "b", "c"]);
        let req = request(&s.go_to(0));
        assert!(s.on_decode_finished(&req.complete(DecodeOutcome::Ready)).is_empty());
    }

    #[test]
    fn test_keys() {
        let mut s = slider(&["a", "b"]);
        assert!(matches!(s.handle_key(SlideKey::ArrowRight).as_slice(), [SlideEffect::Decode(r)] if r.index == 1));
        assert_eq!(s.handle_key(SlideKey::Escape), vec![SlideEffect::Exit]);
        assert!(s.handle_key(SlideKey::from_name("Enter")).is_empty());
        assert_eq!(SlideKey::from_name("ArrowLeft"), SlideKey::ArrowLeft);
    }

    #[test]
    fn test_empty_card_exits_on_any_navigation() {
        let (mut s, effects) = Slider::new(Vec::new(), 0, 1, DELAY);
        assert!(effects.is_empty());
        assert_eq!(s.current_image(), None);
        assert_eq!(s.next(), vec![SlideEffect::Exit]);
    }

    #[test]
    fn test_start_index_clamped_and_thumbnails() {
        let images = vec!["a".to_string(), "b".to_string()];
        let (s, _) = Slider::new(images, 5, 1, DELAY);
        assert_eq!(s.current_index(), 1);
        assert_eq!(s.alt_text(), "Slide 2 of 2");
        let selected: Vec<bool> = s.thumbnails().iter().map(|t| t.selected).collect();
        assert_eq!(selected, vec![false, true]);
    }
}
