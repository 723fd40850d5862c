/// Audio categories
///
/// Categories govern channel pooling, volume scaling and default routing.
use std::fmt;

use serde::{Deserialize, Serialize};

/// Audio playback categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioCategory {
    /// Background music
    Music,

    /// Sound effects
    Effect,

    /// Positioned sound effects
    SpatialEffect,
}

impl AudioCategory {
    /// Every category, in pool order
    pub const ALL: [AudioCategory; 3] = [
        AudioCategory::Music,
        AudioCategory::Effect,
        AudioCategory::SpatialEffect,
    ];

    /// Spatial blend a freshly played handle of this category starts with
    pub fn default_spatial_blend(&self) -> f32 {
        match self {
            AudioCategory::Music => 0.0,
            AudioCategory::Effect => 0.0,
            AudioCategory::SpatialEffect => 1.0,
        }
    }
}

impl fmt::Display for AudioCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioCategory::Music => write!(f, "Music"),
            AudioCategory::Effect => write!(f, "Effect"),
            AudioCategory::SpatialEffect => write!(f, "Spatial Effect"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_display() {
        assert_eq!(AudioCategory::Music.to_string(), "Music");
        assert_eq!(AudioCategory::SpatialEffect.to_string(), "Spatial Effect");
    }

    #[test]
    fn test_spatial_blend_defaults() {
        assert_eq!(AudioCategory::Effect.default_spatial_blend(), 0.0);
        assert_eq!(AudioCategory::SpatialEffect.default_spatial_blend(), 1.0);
    }

    #[test]
    fn test_category_serde_names() {
        let json = serde_json::to_string(&AudioCategory::SpatialEffect).unwrap();
        assert_eq!(json, "\"spatial_effect\"");
        let parsed: AudioCategory = serde_json::from_str("\"music\"").unwrap();
        assert_eq!(parsed, AudioCategory::Music);
    }
}
