use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::viewport::Orientation;

const CONFIG_FILENAME: &str = "config.yaml";
const APP_NAME: &str = "tilepager";

/// Tunables of the paging engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Tile side in device pixels
    #[serde(default = "default_tile_size")]
    pub tile_size: f32,

    /// Shared budget of full-resolution tiles, also the per-pass request budget
    #[serde(default = "default_cache_size")]
    pub cache_size: usize,

    /// Shared budget of page thumbnails
    #[serde(default = "default_thumbnail_cache_size")]
    pub thumbnail_cache_size: usize,

    /// Stripes preloaded ahead of the viewport
    #[serde(default = "default_preload_count")]
    pub preload_count: usize,

    /// Thumbnail size as a fraction of the optimal page size
    #[serde(default = "default_thumbnail_ratio")]
    pub thumbnail_ratio: f32,

    /// Keep tiles as RGBA instead of reducing them to RGB565
    #[serde(default)]
    pub best_quality: bool,

    #[serde(default)]
    pub annotation_rendering: bool,

    /// Request thumbnails only
    #[serde(default)]
    pub preview_only: bool,

    #[serde(default)]
    pub orientation: Orientation,

    /// Snap one page per screen, padding pages with margins
    #[serde(default)]
    pub paging: bool,

    #[serde(default = "default_min_zoom")]
    pub min_zoom: f32,

    #[serde(default = "default_mid_zoom")]
    pub mid_zoom: f32,

    #[serde(default = "default_max_zoom")]
    pub max_zoom: f32,

    /// Capacity of the completed-tile channel between workers and the engine
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_tile_size() -> f32 {
    256.0
}

fn default_cache_size() -> usize {
    120
}

fn default_thumbnail_cache_size() -> usize {
    8
}

fn default_preload_count() -> usize {
    7
}

fn default_thumbnail_ratio() -> f32 {
    0.3
}

fn default_min_zoom() -> f32 {
    1.0
}

fn default_mid_zoom() -> f32 {
    1.75
}

fn default_max_zoom() -> f32 {
    3.0
}

fn default_event_capacity() -> usize {
    64
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tile_size: default_tile_size(),
            cache_size: default_cache_size(),
            thumbnail_cache_size: default_thumbnail_cache_size(),
            preload_count: default_preload_count(),
            thumbnail_ratio: default_thumbnail_ratio(),
            best_quality: false,
            annotation_rendering: false,
            preview_only: false,
            orientation: Orientation::default(),
            paging: false,
            min_zoom: default_min_zoom(),
            mid_zoom: default_mid_zoom(),
            max_zoom: default_max_zoom(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl EngineConfig {
    /// `<config dir>/tilepager/config.yaml`, when the platform has one.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|config| config.join(APP_NAME).join(CONFIG_FILENAME))
    }

    /// Load and validate a YAML config. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            info!("Config file {path:?} not found, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        config.validate()?;
        debug!("Loaded config from {path:?}");
        Ok(config)
    }

    /// Persist as YAML, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let yaml = serde_yaml::to_string(self)?;
        fs::write(path, yaml)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if !self.tile_size.is_finite() || self.tile_size <= 0.0 {
            return invalid("tile_size must be positive");
        }
        if self.cache_size == 0 {
            return invalid("cache_size must be at least 1");
        }
        if self.thumbnail_cache_size == 0 {
            return invalid("thumbnail_cache_size must be at least 1");
        }
        if !(self.thumbnail_ratio > 0.0 && self.thumbnail_ratio <= 1.0) {
            return invalid("thumbnail_ratio must be in (0, 1]");
        }
        if !(self.min_zoom > 0.0 && self.min_zoom <= self.mid_zoom && self.mid_zoom <= self.max_zoom)
        {
            return invalid("zoom bounds must satisfy 0 < min <= mid <= max");
        }
        if self.event_capacity == 0 {
            return invalid("event_capacity must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.cache_size, 120);
        assert_eq!(config.thumbnail_cache_size, 8);
        assert_eq!(config.preload_count, 7);
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::load(&dir.path().join("nope.yaml")).unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILENAME);
        fs::write(&path, "cache_size: 16\nbest_quality: true\norientation: horizontal\n").unwrap();

        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.cache_size, 16);
        assert!(config.best_quality);
        assert_eq!(config.orientation, Orientation::Horizontal);
        assert_eq!(config.tile_size, 256.0);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILENAME);
        fs::write(&path, "cache_size: 0\n").unwrap();

        assert!(matches!(
            EngineConfig::load(&path),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn save_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILENAME);
        let config = EngineConfig {
            preview_only: true,
            ..EngineConfig::default()
        };

        config.save(&path).unwrap();
        assert_eq!(EngineConfig::load(&path).unwrap(), config);
    }
}
