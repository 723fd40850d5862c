/// Playback settings
///
/// Everything a handle is configured with before it becomes active. Settings
/// are applied to the channel in one step when the handle is created.
use std::time::Duration;

use super::output::{ChannelSettings, RolloffMode, VelocityUpdateMode};

#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackSettings {
    /// Logical volume, scaled by the category volume on output
    pub volume: f32,

    /// Logical pitch (1.0 = original)
    pub pitch: f32,

    /// Time to wait after play before output starts
    pub delay: Duration,

    /// Fade in from silence when output starts
    pub fade_in: Duration,

    /// Release the channel when output ends; otherwise return to Wait
    pub auto_stop: bool,

    /// Multiply pitch by the frame time scale
    pub sync_pitch_with_time_scale: bool,

    /// Identifier for group queries
    pub id: Option<String>,

    /// Output parameters; a `None` route falls back to the category default
    pub channel: ChannelSettings,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            volume: 1.0,
            pitch: 1.0,
            delay: Duration::ZERO,
            fade_in: Duration::ZERO,
            auto_stop: true,
            sync_pitch_with_time_scale: false,
            id: None,
            channel: ChannelSettings::default(),
        }
    }
}

impl PlaybackSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = volume;
        self
    }

    pub fn with_pitch(mut self, pitch: f32) -> Self {
        self.pitch = pitch;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_fade_in(mut self, duration: Duration) -> Self {
        self.fade_in = duration;
        self
    }

    pub fn with_auto_stop(mut self, auto_stop: bool) -> Self {
        self.auto_stop = auto_stop;
        self
    }

    pub fn with_sync_pitch_with_time_scale(mut self, sync: bool) -> Self {
        self.sync_pitch_with_time_scale = sync;
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_loop(mut self, looping: bool) -> Self {
        self.channel.looping = looping;
        self
    }

    pub fn with_mute(mut self, muted: bool) -> Self {
        self.channel.muted = muted;
        self
    }

    pub fn with_position(mut self, position: [f32; 3]) -> Self {
        self.channel.position = position;
        self
    }

    pub fn with_pan(mut self, pan: f32) -> Self {
        self.channel.pan = pan.clamp(-1.0, 1.0);
        self
    }

    pub fn with_spatial_blend(mut self, blend: f32) -> Self {
        self.channel.spatial_blend = blend.clamp(0.0, 1.0);
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.channel.priority = priority;
        self
    }

    pub fn with_route(mut self, route: impl Into<String>) -> Self {
        self.channel.route = Some(route.into());
        self
    }

    pub fn with_rolloff(mut self, rolloff: RolloffMode) -> Self {
        self.channel.rolloff = rolloff;
        self
    }

    pub fn with_min_distance(mut self, distance: f32) -> Self {
        self.channel.min_distance = distance;
        self
    }

    pub fn with_max_distance(mut self, distance: f32) -> Self {
        self.channel.max_distance = distance;
        self
    }

    pub fn with_doppler_level(mut self, level: f32) -> Self {
        self.channel.doppler_level = level;
        self
    }

    pub fn with_spread(mut self, spread: f32) -> Self {
        self.channel.spread = spread;
        self
    }

    pub fn with_reverb_zone_mix(mut self, mix: f32) -> Self {
        self.channel.reverb_zone_mix = mix;
        self
    }

    pub fn with_velocity_update(mut self, mode: VelocityUpdateMode) -> Self {
        self.channel.velocity_update = mode;
        self
    }

    pub fn with_ignore_listener_pause(mut self, ignore: bool) -> Self {
        self.channel.ignore_listener_pause = ignore;
        self
    }

    pub fn with_ignore_listener_volume(mut self, ignore: bool) -> Self {
        self.channel.ignore_listener_volume = ignore;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_builder() {
        let settings = PlaybackSettings::new()
            .with_volume(0.8)
            .with_pitch(1.2)
            .with_delay(Duration::from_millis(300))
            .with_loop(true)
            .with_id("ambience")
            .with_priority(10);

        assert_eq!(settings.volume, 0.8);
        assert_eq!(settings.pitch, 1.2);
        assert_eq!(settings.delay, Duration::from_millis(300));
        assert!(settings.channel.looping);
        assert_eq!(settings.id.as_deref(), Some("ambience"));
        assert_eq!(settings.channel.priority, 10);
    }

    #[test]
    fn test_default_settings() {
        let settings = PlaybackSettings::default();
        assert_eq!(settings.volume, 1.0);
        assert!(settings.auto_stop);
        assert!(settings.id.is_none());
        assert_eq!(settings.channel, ChannelSettings::default());
    }

    #[test]
    fn test_pan_and_blend_clamping() {
        let settings = PlaybackSettings::new().with_pan(3.0).with_spatial_blend(-1.0);
        assert_eq!(settings.channel.pan, 1.0);
        assert_eq!(settings.channel.spatial_blend, 0.0);
    }
}
