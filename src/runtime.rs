use std::time::Instant;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

#[allow(unused_imports)]
use log::{debug, info, warn, error};

use crate::image_cache::ImageCache;
use crate::navigation::{DecodeCompletion, DecodeOutcome, DecodeRequest};
use crate::preload::SharedHintQueue;
use crate::session::{GallerySession, Intent, SessionEffect, View};
use crate::utils::timing::TimingStats;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Intent(Intent),
    DecodeFinished(DecodeCompletion),
    Shutdown,
}

/// Drives a [`GallerySession`]: performs its effects on the tokio runtime and
/// turns decode results back into messages.
pub struct GalleryRuntime {
    session: GallerySession<SharedHintQueue>,
    cache: ImageCache,
    sender: UnboundedSender<Message>,
    receiver: UnboundedReceiver<Message>,
    decode_started: Option<(u64, u64, Instant)>,
    decode_stats: TimingStats,
}

impl GalleryRuntime {
    pub fn new(session: GallerySession<SharedHintQueue>, cache: ImageCache) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            session,
            cache,
            sender,
            receiver,
            decode_started: None,
            decode_stats: TimingStats::new("Slide decode"),
        }
    }

    /// Sender for intents coming from outside (input thread, tests)
    pub fn sender(&self) -> UnboundedSender<Message> {
        self.sender.clone()
    }

    pub fn session(&self) -> &GallerySession<SharedHintQueue> {
        &self.session
    }

    pub fn cache(&self) -> &ImageCache {
        &self.cache
    }

    pub fn decode_stats(&self) -> &TimingStats {
        &self.decode_stats
    }

    pub fn view(&self) -> View {
        self.session.view()
    }

    /// Applies one message. Returns `false` once the runtime should stop.
    pub fn dispatch(&mut self, message: Message) -> bool {
        let effects = match message {
            Message::Intent(intent) => {
                debug!("Intent: {:?}", intent);
                self.session.update(intent)
            }
            Message::DecodeFinished(completion) => {
                self.record_decode_time(&completion);
                self.session.on_decode_finished(&completion)
            }
            Message::Shutdown => {
                info!("Shutting down gallery runtime");
                self.session.close();
                return false;
            }
        };
        self.perform(effects);
        true
    }

    pub async fn next_message(&mut self) -> Option<Message> {
        self.receiver.recv().await
    }

    /// Processes messages until `Shutdown`, rendering after each one.
    pub async fn run<F>(&mut self, mut on_render: F)
    where
        F: FnMut(&View),
    {
        on_render(&self.session.view());
        while let Some(message) = self.receiver.recv().await {
            if !self.dispatch(message) {
                break;
            }
            on_render(&self.session.view());
        }
        debug!(
            "Decode timing: {} samples, avg {:.2}ms, max {:?}",
            self.decode_stats.count,
            self.decode_stats.average_ms(),
            self.decode_stats.max_time
        );
    }

    fn perform(&mut self, effects: Vec<SessionEffect>) {
        for effect in effects {
            match effect {
                SessionEffect::Decode(request) => self.start_decode(request),
                SessionEffect::Warm { reference, delay } => self.cache.warm_after(&reference, delay),
                SessionEffect::WarmHero { reference, max_wait } => {
                    let cache = self.cache.clone();
                    self.cache.handle().spawn(async move {
                        let outcome = cache.warm_with_timeout(&reference, max_wait).await;
                        debug!("Hero image {}: {:?}", reference, outcome);
                    });
                }
            }
        }
    }

    fn start_decode(&mut self, request: DecodeRequest) {
        self.decode_started = Some((request.mount, request.seq, Instant::now()));

        let ready_tx = self.sender.clone();
        let failed_tx = self.sender.clone();
        let ready = request.complete(DecodeOutcome::Ready);
        let failed = request.complete(DecodeOutcome::Failed);

        // A closed channel means the runtime is gone and nobody wants the result
        self.cache.decode_then(
            request.reference,
            move || {
                let _ = ready_tx.send(Message::DecodeFinished(ready));
            },
            move || {
                let _ = failed_tx.send(Message::DecodeFinished(failed));
            },
        );
    }

    fn record_decode_time(&mut self, completion: &DecodeCompletion) {
        if let Some((mount, seq, started)) = self.decode_started {
            if mount == completion.mount && seq == completion.seq {
                self.decode_stats.add_measurement(started.elapsed());
                self.decode_started = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::runtime::Handle;
    use crate::card::{Card, CardCatalog};
    use crate::config::Config;
    use crate::image_cache::tests::MemorySource;

    fn runtime(source: MemorySource) -> (GalleryRuntime, SharedHintQueue) {
        let catalog = Arc::new(
            CardCatalog::new(vec![
                Card::new("a", "Alpha", &["x1", "x2", "x3"]),
                Card::new("b", "Beta", &["y1"]),
            ])
            .unwrap(),
        );
        let queue = SharedHintQueue::new();
        let session = GallerySession::new(catalog, queue.clone(), &Config::default());
        let cache = ImageCache::new(Arc::new(source), 8, Handle::current());
        (GalleryRuntime::new(session, cache), queue)
    }

    async fn completion(rt: &mut GalleryRuntime) -> Message {
        tokio::time::timeout(Duration::from_secs(5), rt.next_message())
            .await
            .expect("decode completion")
            .expect("channel open")
    }

    fn slider_state(rt: &GalleryRuntime) -> (Option<String>, usize, bool) {
        match rt.view() {
            View::Slider(view) => (view.current_image, view.current_index, view.is_clarifying),
            View::Grid { .. } => panic!("slider expected"),
        }
    }

    #[tokio::test]
    async fn test_navigation_commits_after_decode() {
        let (mut rt, queue) = runtime(MemorySource::with(&["x1", "x2", "x3", "y1"]));
        rt.dispatch(Message::Intent(Intent::OpenCard("a".to_string())));
        assert_eq!(queue.len(), 3);

        for expected in ["x2", "x3"] {
            rt.dispatch(Message::Intent(Intent::Next));
            assert!(slider_state(&rt).2);
            let message = completion(&mut rt).await;
            rt.dispatch(message);
            assert_eq!(slider_state(&rt).0.as_deref(), Some(expected));
        }
        assert_eq!(slider_state(&rt), (Some("x3".to_string()), 2, false));
        assert_eq!(rt.decode_stats().count, 2);
    }

    #[tokio::test]
    async fn test_broken_image_still_commits() {
        let (mut rt, _queue) = runtime(MemorySource::with(&["x1", "x3"]));
        rt.dispatch(Message::Intent(Intent::OpenCard("a".to_string())));
        rt.dispatch(Message::Intent(Intent::Navigate(1)));

        let message = completion(&mut rt).await;
        assert!(matches!(&message, Message::DecodeFinished(c) if c.outcome == DecodeOutcome::Failed));
        rt.dispatch(message);
        assert_eq!(slider_state(&rt), (Some("x2".to_string()), 1, false));
    }

    #[tokio::test]
    async fn test_slow_superseded_decode_does_not_win() {
        let mut source = MemorySource::with(&["x1", "x2", "x3"]);
        source.delays.insert("x2".to_string(), Duration::from_millis(200));
        let (mut rt, _queue) = runtime(source);

        rt.dispatch(Message::Intent(Intent::OpenCard("a".to_string())));
        rt.dispatch(Message::Intent(Intent::Navigate(1)));
        rt.dispatch(Message::Intent(Intent::Navigate(2)));

        for _ in 0..2 {
            let message = completion(&mut rt).await;
            rt.dispatch(message);
            assert_eq!(slider_state(&rt).1, 2);
        }
        assert_eq!(slider_state(&rt), (Some("x3".to_string()), 2, false));
    }

    #[tokio::test]
    async fn test_shutdown_clears_hints() {
        let (mut rt, queue) = runtime(MemorySource::with(&["x1"]));
        let sender = rt.sender();
        sender.send(Message::Intent(Intent::OpenCard("b".to_string()))).unwrap();
        sender.send(Message::Shutdown).unwrap();

        let mut renders = Vec::new();
        rt.run(|view| renders.push(view.clone())).await;

        assert_eq!(renders.len(), 2);
        assert!(matches!(renders[1], View::Slider(ref v) if v.card_id == "b"));
        assert!(queue.is_empty());
    }
}
