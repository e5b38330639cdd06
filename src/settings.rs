use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use log::{debug, info, warn, error};

use crate::config::{
    DEFAULT_ASSET_ROOT, DEFAULT_CACHE_SIZE, DEFAULT_HERO_WARM_TIMEOUT_MS,
    DEFAULT_NEIGHBOR_PREFETCH_DELAY_MS, DEFAULT_PRELOAD_LOOKAHEAD, DEFAULT_WARM_TIMEOUT_MS,
};

/// User-specific settings that persist across sessions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSettings {
    /// Number of decoded images kept by the image cache
    #[serde(default = "default_cache_size")]
    pub cache_size: usize,

    /// Number of low-priority prefetch hints after the anchor image
    #[serde(default = "default_preload_lookahead")]
    pub preload_lookahead: usize,

    /// Delay before warming the slide two positions ahead
    #[serde(default = "default_neighbor_prefetch_delay_ms")]
    pub neighbor_prefetch_delay_ms: u64,

    /// Bounded wait for the first image when a card opens
    #[serde(default = "default_hero_warm_timeout_ms")]
    pub hero_warm_timeout_ms: u64,

    /// Bounded wait for other preloads
    #[serde(default = "default_warm_timeout_ms")]
    pub warm_timeout_ms: u64,

    /// Directory image references are resolved against
    #[serde(default = "default_asset_root")]
    pub asset_root: String,

    /// Card file; the built-in cards are used when unset
    #[serde(default)]
    pub cards_path: Option<String>,

    /// Decode images after fetching them
    #[serde(default = "default_decode_images")]
    pub decode_images: bool,
}

fn default_cache_size() -> usize {
    DEFAULT_CACHE_SIZE
}

fn default_preload_lookahead() -> usize {
    DEFAULT_PRELOAD_LOOKAHEAD
}

fn default_neighbor_prefetch_delay_ms() -> u64 {
    DEFAULT_NEIGHBOR_PREFETCH_DELAY_MS
}

fn default_hero_warm_timeout_ms() -> u64 {
    DEFAULT_HERO_WARM_TIMEOUT_MS
}

fn default_warm_timeout_ms() -> u64 {
    DEFAULT_WARM_TIMEOUT_MS
}

fn default_asset_root() -> String {
    DEFAULT_ASSET_ROOT.to_string()
}

fn default_decode_images() -> bool {
    true
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            cache_size: DEFAULT_CACHE_SIZE,
            preload_lookahead: DEFAULT_PRELOAD_LOOKAHEAD,
            neighbor_prefetch_delay_ms: DEFAULT_NEIGHBOR_PREFETCH_DELAY_MS,
            hero_warm_timeout_ms: DEFAULT_HERO_WARM_TIMEOUT_MS,
            warm_timeout_ms: DEFAULT_WARM_TIMEOUT_MS,
            asset_root: DEFAULT_ASSET_ROOT.to_string(),
            cards_path: None,
            decode_images: true,
        }
    }
}

impl UserSettings {
    /// Get the path to the settings file
    /// On macOS: ~/Library/Application Support/GallerySlider/settings.yaml
    /// On Linux: ~/.config/GallerySlider/settings.yaml
    /// On Windows: C:\Users\<user>\AppData\Roaming\GallerySlider\settings.yaml
    pub fn settings_path() -> PathBuf {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."));

        config_dir.join("GallerySlider").join("settings.yaml")
    }

    /// Load settings from the YAML file
    /// If custom_path is provided, uses that path; otherwise uses the default settings path
    pub fn load(custom_path: Option<&str>) -> Self {
        let path = match custom_path {
            Some(p) => {
                info!("Using custom settings path: {}", p);
                PathBuf::from(p)
            }
            None => Self::settings_path(),
        };
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            info!("Settings file not found at {:?}, using defaults", path);
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(contents) => {
                match serde_yaml::from_str::<UserSettings>(&contents) {
                    Ok(settings) => {
                        info!("Loaded settings from {:?}", path);
                        debug!("Settings: cache_size={}, lookahead={}, asset_root={}",
                            settings.cache_size, settings.preload_lookahead, settings.asset_root);
                        settings
                    }
                    Err(e) => {
                        error!("Failed to parse settings file at {:?}: {}", path, e);
                        warn!("Using default settings");
                        Self::default()
                    }
                }
            }
            Err(e) => {
                error!("Failed to read settings file at {:?}: {}", path, e);
                warn!("Using default settings");
                Self::default()
            }
        }
    }

    /// Save settings to the YAML file while preserving comments
    pub fn save_to(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)
                    .map_err(|e| format!("Failed to create settings directory: {}", e))?;
            }
        }

        // If file exists, try to preserve comments by doing in-place value updates
        if path.exists() {
            match fs::read_to_string(path) {
                Ok(contents) => {
                    let updated = self.update_yaml_values(&contents);
                    fs::write(path, updated)
                        .map_err(|e| format!("Failed to write settings file: {}", e))?;
                    info!("Saved settings to {:?} (comments preserved)", path);
                    return Ok(());
                }
                Err(e) => {
                    warn!("Failed to read existing settings file for comment preservation: {}", e);
                }
            }
        }

        let yaml = self.to_yaml_with_comments();
        fs::write(path, yaml)
            .map_err(|e| format!("Failed to write settings file: {}", e))?;

        info!("Saved settings to {:?}", path);
        Ok(())
    }

    pub fn save(&self) -> Result<(), String> {
        self.save_to(&Self::settings_path())
    }

    /// Update YAML values while preserving existing comments and structure
    fn update_yaml_values(&self, yaml_content: &str) -> String {
        let mut result = yaml_content.to_string();

        result = Self::replace_yaml_value(&result, "cache_size", &self.cache_size.to_string());
        result = Self::replace_yaml_value(&result, "preload_lookahead", &self.preload_lookahead.to_string());
        result = Self::replace_yaml_value(&result, "neighbor_prefetch_delay_ms", &self.neighbor_prefetch_delay_ms.to_string());
        result = Self::replace_yaml_value(&result, "hero_warm_timeout_ms", &self.hero_warm_timeout_ms.to_string());
        result = Self::replace_yaml_value(&result, "warm_timeout_ms", &self.warm_timeout_ms.to_string());
        result = Self::replace_yaml_value(&result, "asset_root", &yaml_string(&self.asset_root));
        result = Self::replace_yaml_value(&result, "cards_path", &self.cards_path_yaml());
        result = Self::replace_yaml_value(&result, "decode_images", &self.decode_images.to_string());

        result
    }

    fn cards_path_yaml(&self) -> String {
        match &self.cards_path {
            Some(path) => yaml_string(path),
            None => "null".to_string(),
        }
    }

    /// Replace a YAML key's value while preserving the rest of the line
    fn replace_yaml_value(yaml: &str, key: &str, new_value: &str) -> String {
        let pattern = format!(r"(?m)^(\s*{}\s*:\s*).*$", regex::escape(key));
        match regex::Regex::new(&pattern) {
            // Closure replacer so `$` inside paths is taken literally
            Ok(re) => re
                .replace_all(yaml, |caps: &regex::Captures| format!("{}{}", &caps[1], new_value))
                .to_string(),
            Err(e) => {
                warn!("Failed to create regex for key '{}': {}", key, e);
                yaml.to_string()
            }
        }
    }

    /// Generate YAML content with comments for new files
    fn to_yaml_with_comments(&self) -> String {
        format!(
            r#"# Gallery Slider User Settings
# This file is loaded automatically on startup.
# Settings specified here will override the default values.

# Number of decoded images remembered by the image cache
cache_size: {}

# Low-priority prefetch hints installed after the first image of an opened card
preload_lookahead: {}

# Delay (ms) before warming the slide two positions ahead of the current one
neighbor_prefetch_delay_ms: {}

# Bounded wait (ms) for the first image of a card when it opens
hero_warm_timeout_ms: {}

# Bounded wait (ms) for other preloads
warm_timeout_ms: {}

# Directory that image references such as "/SOLUTIONS/x1.jpg" are resolved against
asset_root: {}

# YAML file with the gallery cards (null = built-in cards)
cards_path: {}

# Decode images after fetching them (false = a finished fetch counts as ready)
decode_images: {}
"#,
            self.cache_size,
            self.preload_lookahead,
            self.neighbor_prefetch_delay_ms,
            self.hero_warm_timeout_ms,
            self.warm_timeout_ms,
            yaml_string(&self.asset_root),
            self.cards_path_yaml(),
            self.decode_images
        )
    }
}

/// Renders a string as a single-line YAML scalar, quoted and escaped as needed
fn yaml_string(value: &str) -> String {
    match serde_yaml::to_string(value) {
        Ok(yaml) if !yaml.trim_end().contains('\n') => yaml.trim_end().to_string(),
        // Block scalars span lines; a JSON string is a valid double-quoted YAML scalar
        _ => serde_json::to_string(value)
            .unwrap_or_else(|_| format!("'{}'", value.replace('\'', "''").replace('\n', " "))),
    }
}
