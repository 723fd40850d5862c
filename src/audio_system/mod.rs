//! Audio system module
//!
//! A pooled playback engine:
//! - Channels are pooled per category and reused across playbacks
//! - Handles carry delay, fades, pitch, callbacks and owner links
//! - Playlists sequence clips on a single handle
//!
//! ## Architecture
//!
//! ```text
//! AudioEngine (one lock)
//!   ├── handles: HandleCore (Wait → Delay → Playing ⇄ Pause → Stop)
//!   ├── ChannelPool (per category)
//!   │     └── Channel ── Box<dyn OutputChannel> (from a ChannelBackend)
//!   ├── CategoryMixer (volume + default route per category)
//!   ├── LinkRegistry (owner → handles)
//!   └── EventBus (EngineEvent broadcast)
//!
//! Playlist ── one AudioHandle, advanced from its on_complete callback
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use audio_dispatch::audio_system::{AudioEngine, AudioCategory, AudioClip, Frame, PlaybackSettings};
//!
//! let (_output, backend) = audio_dispatch::audio_system::rodio_output::open_default()?;
//! let engine = AudioEngine::new(backend);
//!
//! let clip = AudioClip::load("jump.mp3")?;
//! let handle = engine.play(
//!     AudioCategory::Effect,
//!     clip,
//!     PlaybackSettings::new().with_volume(0.8).with_delay(Duration::from_millis(100)),
//! )?;
//! handle.on_complete(|| println!("done"))?;
//!
//! // Once per frame
//! engine.tick(Frame::new(delta));
//! ```

pub mod category;
pub mod clip;
pub mod clock;
pub mod events;
mod fade;
pub mod handle;
pub mod link;
pub mod manager;
mod mixer;
pub mod output;
pub mod playlist;
mod pool;
#[cfg(feature = "rodio-output")]
pub mod rodio_output;
pub mod settings;
pub mod virtual_output;
mod wait;

pub use category::AudioCategory;
pub use clip::{AudioClip, ClipId};
pub use clock::{Clock, Frame, ManualClock, SystemClock};
pub use events::{EngineEvent, EventBus, SubscriberId};
pub use handle::{AudioHandle, Callback, HandleId, HandleState};
pub use link::{LinkBehaviour, OwnerEvent, OwnerId};
pub use manager::{AudioEngine, HandleFilter};
pub use output::{ChannelBackend, ChannelSettings, OutputChannel, RolloffMode, VelocityUpdateMode};
pub use playlist::{Playlist, PlaylistDefinition};
pub use pool::{ChannelId, ChannelStats};
pub use settings::PlaybackSettings;
pub use virtual_output::{ChannelProbe, VirtualBackend};
pub use wait::CancelBehaviour;
