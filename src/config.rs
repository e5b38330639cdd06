use std::path::PathBuf;
use std::time::Duration;
use once_cell::sync::Lazy;
use crate::settings::UserSettings;

// Default values for configuration
// These serve as fallback values and can be used for "reset to defaults" functionality
pub const DEFAULT_CACHE_SIZE: usize = 16;
pub const DEFAULT_PRELOAD_LOOKAHEAD: usize = 2;
pub const DEFAULT_NEIGHBOR_PREFETCH_DELAY_MS: u64 = 80;
pub const DEFAULT_HERO_WARM_TIMEOUT_MS: u64 = 1500;
pub const DEFAULT_WARM_TIMEOUT_MS: u64 = 900;
pub const DEFAULT_ASSET_ROOT: &str = ".";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub cache_size: usize,                  // Decoded images remembered by the image cache
    pub preload_lookahead: usize,           // Low-priority prefetch hints after the anchor image
    pub neighbor_prefetch_delay: Duration,  // Delay before warming the slide two ahead
    pub hero_warm_timeout: Duration,        // Bounded wait for the first image on card open
    pub warm_timeout: Duration,             // Default bounded wait for a preload
    pub asset_root: PathBuf,                // Directory image references are resolved against
    pub cards_path: Option<PathBuf>,        // Card file, built-in cards when unset
    pub decode_images: bool,                // false: a finished fetch counts as decoded
}

impl Config {
    pub fn from_settings(settings: &UserSettings) -> Self {
        Self {
            cache_size: settings.cache_size,
            preload_lookahead: settings.preload_lookahead,
            neighbor_prefetch_delay: Duration::from_millis(settings.neighbor_prefetch_delay_ms),
            hero_warm_timeout: Duration::from_millis(settings.hero_warm_timeout_ms),
            warm_timeout: Duration::from_millis(settings.warm_timeout_ms),
            asset_root: PathBuf::from(&settings.asset_root),
            cards_path: settings.cards_path.as_ref().map(PathBuf::from),
            decode_images: settings.decode_images,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_settings(&UserSettings::default())
    }
}

pub static CONFIG: Lazy<Config> = Lazy::new(|| {
    // Load settings from YAML file
    let settings = UserSettings::load(None);
    Config::from_settings(&settings)
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_matches_constants() {
        let config = Config::default();
        assert_eq!(config.cache_size, DEFAULT_CACHE_SIZE);
        assert_eq!(config.preload_lookahead, DEFAULT_PRELOAD_LOOKAHEAD);
        assert_eq!(config.neighbor_prefetch_delay, Duration::from_millis(80));
        assert_eq!(config.hero_warm_timeout, Duration::from_millis(1500));
        assert_eq!(config.warm_timeout, Duration::from_millis(900));
        assert_eq!(config.cards_path, None);
        assert!(config.decode_images);
    }
}
