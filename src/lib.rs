//! Pooled audio playback engine.
//!
//! Playback requests become [`AudioHandle`]s backed by channels that are
//! pooled per [`AudioCategory`]. The host drives everything by calling
//! [`AudioEngine::tick`] once per frame.

pub mod audio_system;
pub mod config;
pub mod error;
pub mod logging;

pub use audio_system::{
    AudioCategory, AudioClip, AudioEngine, AudioHandle, CancelBehaviour, EngineEvent, Frame,
    HandleFilter, HandleState, LinkBehaviour, OwnerEvent, OwnerId, PlaybackSettings, Playlist,
};
pub use config::EngineConfig;
pub use error::{AppResult, AudioError, ConfigError, Result};
