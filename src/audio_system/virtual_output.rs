/// Headless output backend
///
/// Channels produce no sound. Every created channel is recorded as a
/// [`ChannelProbe`] so the host can inspect what the engine did and drive the
/// things a device would: end of output and external destruction.
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::category::AudioCategory;
use super::clip::AudioClip;
use super::output::{ChannelBackend, ChannelSettings, OutputChannel};
use crate::error::Result;

#[derive(Debug)]
struct VirtualState {
    category: AudioCategory,
    clip: Option<AudioClip>,
    settings: ChannelSettings,
    volume: f32,
    pitch: f32,
    playing: bool,
    paused: bool,
    alive: bool,
    position: Duration,
    play_count: usize,
    stop_count: usize,
    pause_count: usize,
}

/// Backend whose channels are recorded instead of played
#[derive(Clone, Default)]
pub struct VirtualBackend {
    channels: Arc<Mutex<Vec<ChannelProbe>>>,
}

impl VirtualBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// All channels created so far, in creation order
    pub fn channels(&self) -> Vec<ChannelProbe> {
        self.channels.lock().clone()
    }

    pub fn channel(&self, index: usize) -> Option<ChannelProbe> {
        self.channels.lock().get(index).cloned()
    }

    pub fn created_count(&self) -> usize {
        self.channels.lock().len()
    }

    /// End output on every channel currently playing
    pub fn finish_all(&self) {
        for probe in self.channels.lock().iter() {
            probe.finish();
        }
    }
}

impl ChannelBackend for VirtualBackend {
    fn create_channel(&mut self, category: AudioCategory) -> Result<Box<dyn OutputChannel>> {
        let shared = Arc::new(Mutex::new(VirtualState {
            category,
            clip: None,
            settings: ChannelSettings::default(),
            volume: 1.0,
            pitch: 1.0,
            playing: false,
            paused: false,
            alive: true,
            position: Duration::ZERO,
            play_count: 0,
            stop_count: 0,
            pause_count: 0,
        }));

        let mut channels = self.channels.lock();
        let index = channels.len();
        channels.push(ChannelProbe {
            index,
            shared: Arc::clone(&shared),
        });

        Ok(Box::new(VirtualChannel {
            clip: None,
            settings: ChannelSettings::default(),
            shared,
        }))
    }

    fn name(&self) -> &str {
        "virtual"
    }
}

/// Host-side view of one virtual channel
#[derive(Clone)]
pub struct ChannelProbe {
    index: usize,
    shared: Arc<Mutex<VirtualState>>,
}

impl ChannelProbe {
    /// Creation index within the backend
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn category(&self) -> AudioCategory {
        self.shared.lock().category
    }

    pub fn clip(&self) -> Option<AudioClip> {
        self.shared.lock().clip.clone()
    }

    pub fn settings(&self) -> ChannelSettings {
        self.shared.lock().settings.clone()
    }

    pub fn volume(&self) -> f32 {
        self.shared.lock().volume
    }

    pub fn pitch(&self) -> f32 {
        self.shared.lock().pitch
    }

    /// Output running and not paused
    pub fn is_playing(&self) -> bool {
        let state = self.shared.lock();
        state.playing && !state.paused
    }

    pub fn is_paused(&self) -> bool {
        self.shared.lock().paused
    }

    pub fn play_count(&self) -> usize {
        self.shared.lock().play_count
    }

    pub fn stop_count(&self) -> usize {
        self.shared.lock().stop_count
    }

    pub fn pause_count(&self) -> usize {
        self.shared.lock().pause_count
    }

    /// Simulate the clip running out
    pub fn finish(&self) {
        let mut state = self.shared.lock();
        state.playing = false;
        state.paused = false;
    }

    /// Simulate the host destroying the channel's object
    pub fn destroy(&self) {
        let mut state = self.shared.lock();
        state.alive = false;
        state.playing = false;
    }

    pub fn set_position(&self, position: Duration) {
        self.shared.lock().position = position;
    }
}

struct VirtualChannel {
    clip: Option<AudioClip>,
    settings: ChannelSettings,
    shared: Arc<Mutex<VirtualState>>,
}

impl OutputChannel for VirtualChannel {
    fn set_clip(&mut self, clip: Option<AudioClip>) {
        self.shared.lock().clip = clip.clone();
        self.clip = clip;
    }

    fn clip(&self) -> Option<&AudioClip> {
        self.clip.as_ref()
    }

    fn play(&mut self) {
        let mut state = self.shared.lock();
        state.playing = true;
        state.paused = false;
        state.position = Duration::ZERO;
        state.play_count += 1;
    }

    fn pause(&mut self) {
        let mut state = self.shared.lock();
        if state.playing {
            state.paused = true;
        }
        state.pause_count += 1;
    }

    fn unpause(&mut self) {
        self.shared.lock().paused = false;
    }

    fn stop(&mut self) {
        let mut state = self.shared.lock();
        state.playing = false;
        state.paused = false;
        state.position = Duration::ZERO;
        state.stop_count += 1;
    }

    fn is_finished(&self) -> bool {
        !self.shared.lock().playing
    }

    fn is_alive(&self) -> bool {
        self.shared.lock().alive
    }

    fn set_volume(&mut self, volume: f32) {
        self.shared.lock().volume = volume;
    }

    fn volume(&self) -> f32 {
        self.shared.lock().volume
    }

    fn set_pitch(&mut self, pitch: f32) {
        self.shared.lock().pitch = pitch;
    }

    fn pitch(&self) -> f32 {
        self.shared.lock().pitch
    }

    fn apply_settings(&mut self, settings: &ChannelSettings) {
        self.settings = settings.clone();
        self.shared.lock().settings = settings.clone();
    }

    fn settings(&self) -> &ChannelSettings {
        &self.settings
    }

    fn position(&self) -> Duration {
        self.shared.lock().position
    }
}
