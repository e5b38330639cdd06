use std::sync::{Arc, Mutex, MutexGuard};
use serde::Serialize;

#[allow(unused_imports)]
use log::{debug, info, warn, error};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HintRel {
    Preload,
    Prefetch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchPriority {
    High,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Image,
}

/// One entry in the page's resource loading queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceHint {
    pub href: String,
    pub rel: HintRel,
    pub as_type: Option<ResourceKind>,
    pub priority: FetchPriority,
}

impl ResourceHint {
    /// High-priority single fetch for the image about to be shown
    pub fn preload_image(href: &str) -> Self {
        Self {
            href: href.to_string(),
            rel: HintRel::Preload,
            as_type: Some(ResourceKind::Image),
            priority: FetchPriority::High,
        }
    }

    /// Low-priority speculative fetch
    pub fn prefetch(href: &str) -> Self {
        Self {
            href: href.to_string(),
            rel: HintRel::Prefetch,
            as_type: None,
            priority: FetchPriority::Low,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HintId(u64);

/// The page-global queue of resource hints.
pub trait ResourceHintQueue {
    /// Returns `None` when the host cannot take hints (no page head).
    fn insert(&mut self, hint: ResourceHint) -> Option<HintId>;
    /// Returns whether the entry was still present.
    fn remove(&mut self, id: HintId) -> bool;
}

/// In-memory stand-in for the page head.
#[derive(Debug, Default)]
pub struct HintQueue {
    entries: Vec<(HintId, ResourceHint)>,
    next_id: u64,
}

impl HintQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> impl Iterator<Item = &ResourceHint> {
        self.entries.iter().map(|(_, hint)| hint)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ResourceHintQueue for HintQueue {
    fn insert(&mut self, hint: ResourceHint) -> Option<HintId> {
        let id = HintId(self.next_id);
        self.next_id += 1;
        self.entries.push((id, hint));
        Some(id)
    }

    fn remove(&mut self, id: HintId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry_id, _)| *entry_id != id);
        self.entries.len() != before
    }
}

/// Cloneable handle to a [`HintQueue`] shared between the page and the gallery.
#[derive(Debug, Clone, Default)]
pub struct SharedHintQueue(Arc<Mutex<HintQueue>>);

impl SharedHintQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock(&self) -> MutexGuard<'_, HintQueue> {
        // The queue holds plain data, a poisoned lock is still consistent
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn snapshot(&self) -> Vec<ResourceHint> {
        self.lock().entries().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl ResourceHintQueue for SharedHintQueue {
    fn insert(&mut self, hint: ResourceHint) -> Option<HintId> {
        self.lock().insert(hint)
    }

    fn remove(&mut self, id: HintId) -> bool {
        self.lock().remove(id)
    }
}

/// Handles of the hints installed for one open card.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct HintSet {
    ids: Vec<HintId>,
}

impl HintSet {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Installs and removes the preload/prefetch hints for a card.
///
/// Callers must `clear` the previous set before installing a new one; the
/// manager itself does not track what is currently installed.
#[derive(Debug, Clone, Copy)]
pub struct PreloadLinks {
    lookahead: usize,
}

impl PreloadLinks {
    pub fn new(lookahead: usize) -> Self {
        Self { lookahead }
    }

    pub fn install(&self, queue: &mut dyn ResourceHintQueue, images: &[String], anchor: usize) -> HintSet {
        let mut set = HintSet::default();

        let Some(hero) = images.get(anchor) else {
            debug!("No image at anchor {} ({} images), nothing to preload", anchor, images.len());
            return set;
        };

        let hints = std::iter::once(ResourceHint::preload_image(hero)).chain(
            images
                .iter()
                .skip(anchor + 1)
                .take(self.lookahead)
                .map(|href| ResourceHint::prefetch(href)),
        );

        for hint in hints {
            if hint.href.is_empty() {
                continue;
            }
            if let Some(id) = queue.insert(hint) {
                set.ids.push(id);
            }
        }

        debug!("Installed {} preload hints anchored at {}", set.len(), anchor);
        set
    }

    /// Removes every hint in `set`; calling it again on the emptied set is a no-op.
    pub fn clear(&self, queue: &mut dyn ResourceHintQueue, set: &mut HintSet) {
        if set.is_empty() {
            return;
        }
        let count = set.ids.len();
        for id in set.ids.drain(..) {
            if !queue.remove(id) {
                warn!("Preload hint {:?} was already gone from the queue", id);
            }
        }
        debug!("Cleared {} preload hints", count);
    }
}

impl Default for PreloadLinks {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_PRELOAD_LOOKAHEAD)
    }
}
