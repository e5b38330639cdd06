//! Gallery card browser core: opens image collections ("cards"), navigates
//! their slides without ever showing an undecoded image, and keeps the page's
//! preload hints in step with the open card.

pub mod build_info;
pub mod card;
pub mod config;
pub mod error;
pub mod image_cache;
pub mod logging;
pub mod navigation;
pub mod preload;
pub mod runtime;
pub mod session;
pub mod settings;
pub mod utils;

pub use card::{Card, CardCatalog, CardSummary, GridPreview};
pub use config::{Config, CONFIG};
pub use error::{CatalogError, LoadError};
pub use image_cache::{FsImageSource, ImageCache, ImageSource, WarmOutcome};
pub use navigation::{DecodeCompletion, DecodeOutcome, DecodeRequest, SlideEffect, SlideKey, Slider};
pub use preload::{HintQueue, PreloadLinks, ResourceHint, ResourceHintQueue, SharedHintQueue};
pub use runtime::{GalleryRuntime, Message};
pub use session::{GallerySession, Intent, SessionEffect, SliderView, View};
