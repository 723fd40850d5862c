/// Output channel abstraction
///
/// The engine never talks to an audio device directly. A [`ChannelBackend`]
/// creates channels (one output primitive attached to a positioned object) and
/// the engine drives them through [`OutputChannel`].
use std::time::Duration;

use super::category::AudioCategory;
use super::clip::AudioClip;
use crate::error::Result;

/// Distance attenuation curve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RolloffMode {
    #[default]
    Logarithmic,
    Linear,
}

/// How the channel's velocity is tracked for doppler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VelocityUpdateMode {
    #[default]
    Auto,
    Fixed,
    Dynamic,
}

/// Every output parameter a channel carries besides volume, pitch and clip.
///
/// `Default` is the state a pooled channel is reset to before reuse.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSettings {
    pub looping: bool,
    pub muted: bool,
    /// Stereo pan, -1.0 (left) to 1.0 (right)
    pub pan: f32,
    /// 0.0 = fully 2D, 1.0 = fully 3D
    pub spatial_blend: f32,
    /// 0 = highest, 255 = lowest
    pub priority: u8,
    /// Named output bus, `None` for the device default
    pub route: Option<String>,
    pub position: [f32; 3],
    pub rolloff: RolloffMode,
    pub min_distance: f32,
    pub max_distance: f32,
    pub doppler_level: f32,
    pub spread: f32,
    pub reverb_zone_mix: f32,
    pub velocity_update: VelocityUpdateMode,
    pub ignore_listener_pause: bool,
    pub ignore_listener_volume: bool,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            looping: false,
            muted: false,
            pan: 0.0,
            spatial_blend: 0.0,
            priority: 128,
            route: None,
            position: [0.0; 3],
            rolloff: RolloffMode::Logarithmic,
            min_distance: 1.0,
            max_distance: 500.0,
            doppler_level: 1.0,
            spread: 0.0,
            reverb_zone_mix: 1.0,
            velocity_update: VelocityUpdateMode::Auto,
            ignore_listener_pause: false,
            ignore_listener_volume: false,
        }
    }
}

/// A single playback primitive.
pub trait OutputChannel: Send {
    fn set_clip(&mut self, clip: Option<AudioClip>);
    fn clip(&self) -> Option<&AudioClip>;

    /// Start the current clip from the beginning
    fn play(&mut self);
    fn pause(&mut self);
    /// Resume after [`OutputChannel::pause`]
    fn unpause(&mut self);
    fn stop(&mut self);

    /// Output has run out (not merely paused)
    fn is_finished(&self) -> bool;

    /// False once the underlying resource was destroyed outside the engine
    fn is_alive(&self) -> bool {
        true
    }

    fn set_volume(&mut self, volume: f32);
    fn volume(&self) -> f32;
    fn set_pitch(&mut self, pitch: f32);
    fn pitch(&self) -> f32;

    fn apply_settings(&mut self, settings: &ChannelSettings);
    fn settings(&self) -> &ChannelSettings;

    /// Position within the current clip
    fn position(&self) -> Duration;

    /// Return the channel to its pristine state for reuse.
    fn reset(&mut self) {
        self.stop();
        self.apply_settings(&ChannelSettings::default());
        self.set_volume(1.0);
        self.set_pitch(1.0);
        self.set_clip(None);
    }
}

/// Creates output channels (scene object + playback primitive) on demand.
pub trait ChannelBackend: Send {
    fn create_channel(&mut self, category: AudioCategory) -> Result<Box<dyn OutputChannel>>;

    /// Short name for logs
    fn name(&self) -> &str;
}
