/// Category-wide volume and routing
///
/// Every handle's logical volume is multiplied by its category's volume each
/// tick, and new handles are routed to their category's default bus.
use std::collections::HashMap;

use super::category::AudioCategory;

#[derive(Debug, Clone)]
pub(crate) struct CategoryMixer {
    volumes: HashMap<AudioCategory, f32>,
    routes: HashMap<AudioCategory, String>,
}

impl CategoryMixer {
    pub(crate) fn new() -> Self {
        Self {
            volumes: AudioCategory::ALL.iter().map(|c| (*c, 1.0)).collect(),
            routes: HashMap::new(),
        }
    }

    pub(crate) fn volume(&self, category: AudioCategory) -> f32 {
        self.volumes.get(&category).copied().unwrap_or(1.0)
    }

    /// Set the multiplier (0.0-1.0)
    pub(crate) fn set_volume(&mut self, category: AudioCategory, volume: f32) {
        self.volumes.insert(category, volume.clamp(0.0, 1.0));
    }

    pub(crate) fn route(&self, category: AudioCategory) -> Option<&str> {
        self.routes.get(&category).map(String::as_str)
    }

    pub(crate) fn set_route(&mut self, category: AudioCategory, route: Option<String>) {
        match route {
            Some(route) => {
                self.routes.insert(category, route);
            }
            None => {
                self.routes.remove(&category);
            }
        }
    }
}

impl Default for CategoryMixer {
    fn default() -> Self {
        Self::new()
    }
}
