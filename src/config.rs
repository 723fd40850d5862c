use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::audio_system::AudioCategory;
use crate::error::ConfigError;

const APP_DIR: &str = "audio-dispatch";
const CONFIG_FILE: &str = "config.json";

fn default_volumes() -> HashMap<AudioCategory, f32> {
    AudioCategory::ALL.iter().map(|c| (*c, 1.0)).collect()
}

fn default_log_filter() -> String {
    "info".to_string()
}

fn default_tick_interval_ms() -> u64 {
    16
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Volume multiplier per category (0.0-1.0)
    #[serde(default = "default_volumes")]
    pub category_volumes: HashMap<AudioCategory, f32>,

    /// Output bus used by a category when a handle names none
    #[serde(default)]
    pub default_routes: HashMap<AudioCategory, String>,

    /// Tracing filter directive, overridden by RUST_LOG
    #[serde(default = "default_log_filter")]
    pub log_filter: String,

    /// Write a daily log file under the config directory
    #[serde(default = "default_true")]
    pub log_to_file: bool,

    /// How often the player drives the engine
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            category_volumes: default_volumes(),
            default_routes: HashMap::new(),
            log_filter: default_log_filter(),
            log_to_file: true,
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from `path`
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::LoadFailed {
            path: path.display().to_string(),
            source: Box::new(e),
        })?;

        let config: EngineConfig =
            serde_json::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                path: path.display().to_string(),
                source: Box::new(e),
            })?;

        config.validate()?;
        tracing::info!("Loaded config from: {}", path.display());
        Ok(config)
    }

    /// Save configuration to `path`, creating parent directories
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::DirectoryCreationFailed {
                path: parent.display().to_string(),
                source: e,
            })?;
        }

        let json = serde_json::to_string_pretty(self).map_err(|e| ConfigError::SaveFailed {
            path: path.display().to_string(),
            source: Box::new(e),
        })?;

        fs::write(path, json).map_err(|e| ConfigError::SaveFailed {
            path: path.display().to_string(),
            source: Box::new(e),
        })
    }

    /// Platform config directory for this application
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR))
            .ok_or_else(|| ConfigError::Invalid("could not determine config directory".to_string()))
    }

    pub fn default_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::config_dir()?.join(CONFIG_FILE))
    }

    /// Load from the default path. Creates default config if file doesn't exist.
    pub fn load_or_create() -> Result<Self, ConfigError> {
        let path = Self::default_path()?;

        if path.exists() {
            Self::load(&path)
        } else {
            let config = EngineConfig::default();
            config.save(&path)?;
            tracing::info!("Created default config at: {}", path.display());
            Ok(config)
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (category, volume) in &self.category_volumes {
            if !(0.0..=1.0).contains(volume) {
                return Err(ConfigError::Invalid(format!(
                    "{} volume {} is outside 0.0-1.0",
                    category, volume
                )));
            }
        }

        if self.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "tick_interval_ms must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    pub fn category_volume(&self, category: AudioCategory) -> f32 {
        self.category_volumes.get(&category).copied().unwrap_or(1.0)
    }

    pub fn set_category_volume(&mut self, category: AudioCategory, volume: f32) {
        self.category_volumes.insert(category, volume.clamp(0.0, 1.0));
    }

    pub fn default_route(&self, category: AudioCategory) -> Option<&str> {
        self.default_routes.get(&category).map(String::as_str)
    }

    pub fn set_default_route(&mut self, category: AudioCategory, route: Option<String>) {
        match route {
            Some(route) => {
                self.default_routes.insert(category, route);
            }
            None => {
                self.default_routes.remove(&category);
            }
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("audio-dispatch-test-{}", std::process::id()))
            .join(name)
    }

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.category_volume(AudioCategory::Music), 1.0);
        assert_eq!(config.default_route(AudioCategory::Effect), None);
        assert_eq!(config.log_filter, "info");
        assert_eq!(config.tick_interval(), Duration::from_millis(16));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let mut config = EngineConfig::default();
        config.set_category_volume(AudioCategory::SpatialEffect, 0.25);
        config.set_default_route(AudioCategory::Music, Some("music-bus".to_string()));

        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("spatial_effect"));
        let deserialized: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let config: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = EngineConfig::default();
        config.category_volumes.insert(AudioCategory::Music, 1.5);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let config = EngineConfig {
            tick_interval_ms: 0,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let path = temp_path("save_and_load.json");
        let mut config = EngineConfig::default();
        config.log_filter = "audio_dispatch=debug".to_string();

        config.save(&path).unwrap();
        let loaded = EngineConfig::load(&path).unwrap();
        assert_eq!(loaded, config);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_load_missing_file() {
        let result = EngineConfig::load(&temp_path("does-not-exist.json"));
        assert!(matches!(result, Err(ConfigError::LoadFailed { .. })));
    }
}
