use std::collections::VecDeque;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Handle;

#[allow(unused_imports)]
use log::{debug, info, warn, error};

use crate::config::DEFAULT_WARM_TIMEOUT_MS;
use crate::error::LoadError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
}

/// Where image bytes come from and how they are decoded.
///
/// Both calls block; the cache runs them on tokio's blocking pool.
pub trait ImageSource: Send + Sync + 'static {
    fn fetch(&self, reference: &str) -> Result<Vec<u8>, LoadError>;

    /// `None` when this source cannot decode. A finished fetch then counts as ready.
    fn decode(&self, reference: &str, bytes: &[u8]) -> Option<Result<ImageInfo, LoadError>>;
}

/// Serves site-relative references (`/SOLUTIONS/x1.jpg`) from a local directory.
#[derive(Debug, Clone)]
pub struct FsImageSource {
    root: PathBuf,
    decode: bool,
}

impl FsImageSource {
    pub fn new(root: impl Into<PathBuf>, decode: bool) -> Self {
        Self { root: root.into(), decode }
    }

    pub fn resolve(&self, reference: &str) -> Result<PathBuf, LoadError> {
        // Query strings and fragments do not name files
        let path_part = reference
            .split(|c| c == '?' || c == '#')
            .next()
            .unwrap_or_default()
            .trim_start_matches('/');
        if path_part.is_empty() {
            return Err(LoadError::EmptyReference);
        }

        let relative = Path::new(path_part);
        if !relative.components().all(|c| matches!(c, Component::Normal(_) | Component::CurDir)) {
            return Err(LoadError::OutsideRoot(reference.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

impl ImageSource for FsImageSource {
    fn fetch(&self, reference: &str) -> Result<Vec<u8>, LoadError> {
        let path = self.resolve(reference)?;
        fs::read(&path).map_err(|source| LoadError::Io {
            reference: reference.to_string(),
            source,
        })
    }

    fn decode(&self, reference: &str, bytes: &[u8]) -> Option<Result<ImageInfo, LoadError>> {
        if !self.decode {
            return None;
        }
        Some(
            image::load_from_memory(bytes)
                .map(|img| ImageInfo { width: img.width(), height: img.height() })
                .map_err(|e| LoadError::Decode {
                    reference: reference.to_string(),
                    message: e.to_string(),
                }),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarmOutcome {
    Decoded,
    Failed,
    TimedOut,
    Skipped,
}

// Most-recently-used references that finished decoding
#[derive(Debug)]
struct DecodedSet {
    capacity: usize,
    order: VecDeque<String>,
}

impl DecodedSet {
    fn new(capacity: usize) -> Self {
        Self { capacity, order: VecDeque::with_capacity(capacity) }
    }

    fn touch(&mut self, reference: &str) -> bool {
        match self.order.iter().position(|r| r == reference) {
            Some(pos) => {
                if let Some(r) = self.order.remove(pos) {
                    self.order.push_back(r);
                }
                true
            }
            None => false,
        }
    }

    fn insert(&mut self, reference: &str) {
        if self.capacity == 0 || self.touch(reference) {
            return;
        }
        while self.order.len() >= self.capacity {
            self.order.pop_front();
        }
        self.order.push_back(reference.to_string());
    }
}

/// Fetch+decode primitive shared by the slider and the preloader.
#[derive(Clone)]
pub struct ImageCache {
    source: Arc<dyn ImageSource>,
    decoded: Arc<Mutex<DecodedSet>>,
    handle: Handle,
    warm_timeout: Duration,
}

impl ImageCache {
    pub fn new(source: Arc<dyn ImageSource>, capacity: usize, handle: Handle) -> Self {
        Self {
            source,
            decoded: Arc::new(Mutex::new(DecodedSet::new(capacity))),
            handle,
            warm_timeout: Duration::from_millis(DEFAULT_WARM_TIMEOUT_MS),
        }
    }

    /// Bound used by `preload` and the background warms
    pub fn with_warm_timeout(mut self, warm_timeout: Duration) -> Self {
        self.warm_timeout = warm_timeout;
        self
    }

    pub fn warm_timeout(&self) -> Duration {
        self.warm_timeout
    }

    pub fn is_decoded(&self, reference: &str) -> bool {
        self.decoded
            .lock()
            .map(|set| set.order.iter().any(|r| r == reference))
            .unwrap_or(false)
    }

    /// Starts a background fetch+decode and forgets about it.
    pub fn warm(&self, reference: &str) {
        self.warm_after(reference, Duration::ZERO);
    }

    /// `warm`, started after `delay`
    pub fn warm_after(&self, reference: &str, delay: Duration) {
        if reference.is_empty() || self.is_decoded(reference) {
            return;
        }
        let cache = self.clone();
        let reference = reference.to_string();
        self.handle.spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let outcome = cache.preload(&reference).await;
            debug!("Warm-up of {}: {:?}", reference, outcome);
        });
    }

    /// `warm_with_timeout` bounded by the configured warm timeout.
    pub async fn preload(&self, reference: &str) -> WarmOutcome {
        self.warm_with_timeout(reference, self.warm_timeout).await
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Runs exactly one of the callbacks once `reference` is decoded or has failed.
    pub fn decode_then<R, F>(&self, reference: String, on_ready: R, on_failed: F)
    where
        R: FnOnce() + Send + 'static,
        F: FnOnce() + Send + 'static,
    {
        let cache = self.clone();
        self.handle.spawn(async move {
            match cache.load(&reference).await {
                Ok(()) => on_ready(),
                Err(e) => {
                    debug!("Decode of {} failed: {}", reference, e);
                    on_failed();
                }
            }
        });
    }

    /// Warms `reference`, waiting at most `max_wait`. The fetch keeps going after a timeout.
    pub async fn warm_with_timeout(&self, reference: &str, max_wait: Duration) -> WarmOutcome {
        if reference.is_empty() {
            return WarmOutcome::Skipped;
        }
        let cache = self.clone();
        let owned = reference.to_string();
        let task = self.handle.spawn(async move { cache.load(&owned).await });

        match tokio::time::timeout(max_wait, task).await {
            Ok(Ok(Ok(()))) => WarmOutcome::Decoded,
            Ok(Ok(Err(e))) => {
                debug!("Preload of {} failed: {}", reference, e);
                WarmOutcome::Failed
            }
            Ok(Err(e)) => {
                warn!("Preload task for {} did not finish: {}", reference, e);
                WarmOutcome::Failed
            }
            Err(_) => {
                debug!("Preload of {} still running after {:?}", reference, max_wait);
                WarmOutcome::TimedOut
            }
        }
    }

    async fn load(&self, reference: &str) -> Result<(), LoadError> {
        if self.touch(reference) {
            return Ok(());
        }

        let source = Arc::clone(&self.source);
        let owned = reference.to_string();
        let decoded = tokio::task::spawn_blocking(move || -> Result<bool, LoadError> {
            let bytes = source.fetch(&owned)?;
            match source.decode(&owned, &bytes) {
                Some(result) => result.map(|_| true),
                None => Ok(false),
            }
        })
        .await
        .map_err(|e| LoadError::Decode {
            reference: reference.to_string(),
            message: e.to_string(),
        })??;

        if !decoded {
            debug!("No decoder for {}, treating the fetch as ready", reference);
        }
        if let Ok(mut set) = self.decoded.lock() {
            set.insert(reference);
        }
        Ok(())
    }

    fn touch(&self, reference: &str) -> bool {
        self.decoded
            .lock()
            .map(|mut set| set.touch(reference))
            .unwrap_or(false)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::oneshot;

    /// In-memory source; references missing from the map fail to fetch
    #[derive(Default)]
    pub(crate) struct MemorySource {
        pub images: HashMap<String, Vec<u8>>,
        pub delays: HashMap<String, Duration>,
        pub fetches: AtomicUsize,
        pub decoder: bool,
    }

    impl MemorySource {
        pub(crate) fn with(names: &[&str]) -> Self {
            Self {
                images: names.iter().map(|n| (n.to_string(), n.as_bytes().to_vec())).collect(),
                decoder: true,
                ..Default::default()
            }
        }
    }

    impl ImageSource for MemorySource {
        fn fetch(&self, reference: &str) -> Result<Vec<u8>, LoadError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delays.get(reference) {
                std::thread::sleep(*delay);
            }
            self.images.get(reference).cloned().ok_or_else(|| LoadError::Io {
                reference: reference.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
            })
        }

        fn decode(&self, reference: &str, bytes: &[u8]) -> Option<Result<ImageInfo, LoadError>> {
            if !self.decoder {
                return None;
            }
            if bytes.starts_with(b"broken") {
                return Some(Err(LoadError::Decode {
                    reference: reference.to_string(),
                    message: "corrupt".to_string(),
                }));
            }
            Some(Ok(ImageInfo { width: 1, height: 1 }))
        }
    }

    async fn decode(cache: &ImageCache, reference: &str) -> bool {
        let (tx, rx) = oneshot::channel();
        let tx = Arc::new(Mutex::new(Some(tx)));
        let tx_failed = Arc::clone(&tx);
        cache.decode_then(
            reference.to_string(),
            move || {
                if let Some(tx) = tx.lock().unwrap().take() {
                    let _ = tx.send(true);
                }
            },
            move || {
                if let Some(tx) = tx_failed.lock().unwrap().take() {
                    let _ = tx.send(false);
                }
            },
        );
        rx.await.unwrap()
    }

    #[test]
    fn test_resolve_references() {
        let source = FsImageSource::new("/srv/site", true);
        assert_eq!(source.resolve("/SOLUTIONS/x1.jpg").unwrap(), PathBuf::from("/srv/site/SOLUTIONS/x1.jpg"));
        assert_eq!(source.resolve("a/b.png?v=2").unwrap(), PathBuf::from("/srv/site/a/b.png"));
        assert!(matches!(source.resolve("/../etc/passwd"), Err(LoadError::OutsideRoot(_))));
        assert!(matches!(source.resolve("/"), Err(LoadError::EmptyReference)));
    }

    #[test]
    fn test_fs_source_reads_and_decodes() {
        let dir = tempfile::tempdir().unwrap();
        let img = image::RgbImage::new(3, 2);
        img.save(dir.path().join("pic.png")).unwrap();
        fs::write(dir.path().join("junk.png"), b"not an image").unwrap();

        let source = FsImageSource::new(dir.path(), true);
        let bytes = source.fetch("/pic.png").unwrap();
        let info = source.decode("/pic.png", &bytes).unwrap().unwrap();
        assert_eq!(info, ImageInfo { width: 3, height: 2 });

        let junk = source.fetch("/junk.png").unwrap();
        assert!(matches!(source.decode("/junk.png", &junk), Some(Err(LoadError::Decode { .. }))));
        assert!(matches!(source.fetch("/missing.png"), Err(LoadError::Io { .. })));

        let no_decode = FsImageSource::new(dir.path(), false);
        assert!(no_decode.decode("/junk.png", &junk).is_none());
    }

    #[tokio::test]
    async fn test_decode_then_ready_and_failed() {
        let mut source = MemorySource::with(&["a"]);
        source.images.insert("bad".to_string(), b"broken".to_vec());
        let cache = ImageCache::new(Arc::new(source), 4, Handle::current());

        assert!(decode(&cache, "a").await);
        assert!(cache.is_decoded("a"));
        assert!(!decode(&cache, "bad").await);
        assert!(!decode(&cache, "missing").await);
        assert!(!cache.is_decoded("missing"));
    }

    #[tokio::test]
    async fn test_without_decoder_fetch_counts_as_ready() {
        let mut source = MemorySource::with(&["a"]);
        source.decoder = false;
        let cache = ImageCache::new(Arc::new(source), 4, Handle::current());
        assert!(decode(&cache, "a").await);
    }

    #[tokio::test]
    async fn test_decoded_reference_not_fetched_again() {
        let source = Arc::new(MemorySource::with(&["a"]));
        let cache = ImageCache::new(source.clone(), 4, Handle::current());

        assert_eq!(cache.warm_with_timeout("a", Duration::from_secs(5)).await, WarmOutcome::Decoded);
        assert!(decode(&cache, "a").await);
        cache.warm("a");
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_warm_with_timeout_outcomes() {
        let mut source = MemorySource::with(&["slow"]);
        source.delays.insert("slow".to_string(), Duration::from_millis(300));
        let cache = ImageCache::new(Arc::new(source), 4, Handle::current());

        assert_eq!(cache.warm_with_timeout("", Duration::from_millis(10)).await, WarmOutcome::Skipped);
        assert_eq!(cache.warm_with_timeout("missing", Duration::from_secs(5)).await, WarmOutcome::Failed);
        assert_eq!(cache.warm_with_timeout("slow", Duration::from_millis(10)).await, WarmOutcome::TimedOut);

        // The timed-out fetch still completes in the background
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(cache.is_decoded("slow"));
    }

    async fn wait_decoded(cache: &ImageCache, reference: &str) -> bool {
        for _ in 0..200 {
            if cache.is_decoded(reference) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_warm_after_waits_for_delay() {
        let source = Arc::new(MemorySource::with(&["a", "b"]));
        let cache = ImageCache::new(source.clone(), 4, Handle::current());

        cache.warm_after("a", Duration::from_millis(150));
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(source.fetches.load(Ordering::SeqCst), 0);
        assert!(!cache.is_decoded("a"));

        assert!(wait_decoded(&cache, "a").await);
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);

        cache.warm("b");
        assert!(wait_decoded(&cache, "b").await);
        assert_eq!(source.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_preload_uses_configured_timeout() {
        let mut source = MemorySource::with(&["slow", "fast"]);
        source.delays.insert("slow".to_string(), Duration::from_millis(300));
        let cache = ImageCache::new(Arc::new(source), 4, Handle::current());
        assert_eq!(cache.warm_timeout(), Duration::from_millis(DEFAULT_WARM_TIMEOUT_MS));

        let cache = cache.with_warm_timeout(Duration::from_millis(20));
        assert_eq!(cache.preload("slow").await, WarmOutcome::TimedOut);
        assert_eq!(cache.preload("fast").await, WarmOutcome::Decoded);
        assert!(wait_decoded(&cache, "slow").await);
    }

    #[test]
    fn test_decoded_set_evicts_oldest() {
        let mut set = DecodedSet::new(2);
        set.insert("a");
        set.insert("b");
        assert!(set.touch("a"));
        set.insert("c");
        assert_eq!(set.order, VecDeque::from(vec!["a".to_string(), "c".to_string()]));
    }
}
