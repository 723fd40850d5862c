/// Playlist sequencer
///
/// Plays an authored list of clips one after another on a single handle. The
/// handle never auto-stops; its completion callback advances to the next
/// track and swaps the clip in place.
///
/// Callbacks registered on [`Playlist::current_handle`] must not call back
/// into the same playlist.
use std::path::Path;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::category::AudioCategory;
use super::clip::AudioClip;
use super::handle::AudioHandle;
use super::manager::{AudioEngine, WeakEngine};
use super::settings::PlaybackSettings;
use super::wait::{wait_while, CancelBehaviour, Interrupted};
use crate::error::{AudioError, ConfigError, Result};

/// Serializable playlist description; clips are stored as lookup keys
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistDefinition {
    pub display_name: String,
    pub category: AudioCategory,
    #[serde(default)]
    pub clips: Vec<String>,
}

impl PlaylistDefinition {
    pub fn load(path: &Path) -> std::result::Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::LoadFailed {
            path: path.display().to_string(),
            source: Box::new(e),
        })?;

        serde_json::from_str(&contents).map_err(|e| ConfigError::LoadFailed {
            path: path.display().to_string(),
            source: Box::new(e),
        })
    }

    pub fn save(&self, path: &Path) -> std::result::Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self).map_err(|e| ConfigError::SaveFailed {
            path: path.display().to_string(),
            source: Box::new(e),
        })?;

        std::fs::write(path, json).map_err(|e| ConfigError::SaveFailed {
            path: path.display().to_string(),
            source: Box::new(e),
        })
    }
}

struct PlaylistState {
    name: String,
    category: AudioCategory,
    settings: PlaybackSettings,
    /// Authored list
    clips: Vec<AudioClip>,
    /// Working order captured when playback starts
    order: Vec<AudioClip>,
    index: usize,
    repeat: bool,
    current: Option<AudioHandle>,
}

impl PlaylistState {
    fn is_playing(&self) -> bool {
        self.current.as_ref().is_some_and(AudioHandle::is_playing)
    }

    fn is_busy(&self) -> bool {
        self.current.as_ref().is_some_and(AudioHandle::is_busy)
    }

    fn stop_current(&mut self) {
        if let Some(handle) = self.current.take() {
            if handle.is_stopped() {
                return;
            }
            if let Err(e) = handle.stop() {
                tracing::debug!("Playlist '{}' handle already gone: {}", self.name, e);
            }
        }
    }
}

/// An ordered clip list with sequential or shuffled playback.
///
/// Clones share the same playlist.
#[derive(Clone)]
pub struct Playlist {
    engine: AudioEngine,
    state: Arc<Mutex<PlaylistState>>,
}

impl Playlist {
    pub fn new(engine: &AudioEngine, name: impl Into<String>, category: AudioCategory) -> Self {
        Self {
            engine: engine.clone(),
            state: Arc::new(Mutex::new(PlaylistState {
                name: name.into(),
                category,
                settings: PlaybackSettings::default(),
                clips: Vec::new(),
                order: Vec::new(),
                index: 0,
                repeat: false,
                current: None,
            })),
        }
    }

    pub fn with_clips(self, clips: impl IntoIterator<Item = AudioClip>) -> Self {
        self.state.lock().clips.extend(clips);
        self
    }

    /// Settings for newly allocated track handles; auto-stop is always off
    pub fn with_settings(self, settings: PlaybackSettings) -> Self {
        self.state.lock().settings = settings;
        self
    }

    /// Build from a definition, resolving each clip key with `resolve`
    pub fn from_definition<F>(
        engine: &AudioEngine,
        definition: &PlaylistDefinition,
        mut resolve: F,
    ) -> Result<Self>
    where
        F: FnMut(&str) -> Result<AudioClip>,
    {
        let clips = definition
            .clips
            .iter()
            .map(|key| resolve(key))
            .collect::<Result<Vec<_>>>()?;

        tracing::info!(
            "Loaded playlist '{}' ({} clips)",
            definition.display_name,
            clips.len()
        );
        Ok(Self::new(engine, definition.display_name.clone(), definition.category).with_clips(clips))
    }

    /// Describe the authored list, naming clips with `key`
    pub fn to_definition<F>(&self, key: F) -> PlaylistDefinition
    where
        F: FnMut(&AudioClip) -> String,
    {
        let state = self.state.lock();
        PlaylistDefinition {
            display_name: state.name.clone(),
            category: state.category,
            clips: state.clips.iter().map(key).collect(),
        }
    }

    // ----- playback -----

    /// Play the authored list in order from `start`
    pub fn play(&self, start: usize, repeat: bool) -> Result<()> {
        let mut state = self.state.lock();
        self.begin(&mut state, start, repeat, false)
    }

    /// Play a uniformly shuffled copy of the authored list
    pub fn play_shuffle(&self, repeat: bool) -> Result<()> {
        let mut state = self.state.lock();
        self.begin(&mut state, 0, repeat, true)
    }

    /// Advance one track. When nothing is playing, start over at the first
    /// track; past the last track, wrap when repeating or stop otherwise.
    pub fn play_next(&self) -> Result<()> {
        let mut state = self.state.lock();
        advance(&self.engine, &self.state, &mut state, false)
    }

    /// Step back one track, staying on the first
    pub fn play_previous(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.order.is_empty() {
            return self.begin(&mut state, 0, false, false);
        }

        if !state.is_playing() || state.index == 0 {
            state.index = 0;
        } else {
            state.index -= 1;
        }
        play_current(&self.engine, &self.state, &mut state)
    }

    pub fn stop(&self) {
        self.state.lock().stop_current();
    }

    pub fn pause(&self) -> Result<()> {
        match self.current_handle() {
            Some(handle) => handle.pause(),
            None => Ok(()),
        }
    }

    pub fn unpause(&self) -> Result<()> {
        match self.current_handle() {
            Some(handle) => handle.unpause(),
            None => Ok(()),
        }
    }

    /// Resolve once the current track is neither playing nor paused, which
    /// for a running playlist means the sequence has ended.
    pub async fn wait_for_completion(
        &self,
        cancel: CancellationToken,
        on_cancel: CancelBehaviour,
    ) -> Result<()> {
        let ticks = self.engine.subscribe_ticks();
        match wait_while(ticks, &cancel, || self.state.lock().is_busy()).await {
            Ok(()) => Ok(()),
            Err(Interrupted) => {
                if !self.engine.is_shut_down() {
                    let result = match on_cancel {
                        CancelBehaviour::Stop => {
                            self.stop();
                            Ok(())
                        }
                        CancelBehaviour::Pause => self.pause(),
                        CancelBehaviour::Keep => Ok(()),
                    };
                    if let Err(e) = result {
                        tracing::debug!("Playlist cancel policy not applied: {}", e);
                    }
                }
                Err(AudioError::Cancelled)
            }
        }
    }

    fn begin(
        &self,
        state: &mut PlaylistState,
        start: usize,
        repeat: bool,
        shuffle: bool,
    ) -> Result<()> {
        if state.clips.is_empty() {
            tracing::debug!("Playlist '{}' is empty; nothing to play", state.name);
            return Ok(());
        }
        if start >= state.clips.len() {
            return Err(AudioError::IndexOutOfRange {
                index: start,
                len: state.clips.len(),
            });
        }

        state.repeat = repeat;
        state.stop_current();
        state.order = state.clips.clone();
        if shuffle {
            state.order.shuffle(&mut rand::thread_rng());
        }
        state.index = start;

        tracing::info!(
            "Playing playlist '{}' ({} tracks{}{})",
            state.name,
            state.order.len(),
            if shuffle { ", shuffled" } else { "" },
            if repeat { ", repeating" } else { "" }
        );
        play_current(&self.engine, &self.state, state)
    }

    // ----- accessors -----

    pub fn name(&self) -> String {
        self.state.lock().name.clone()
    }

    pub fn category(&self) -> AudioCategory {
        self.state.lock().category
    }

    pub fn current_index(&self) -> usize {
        self.state.lock().index
    }

    pub fn current_handle(&self) -> Option<AudioHandle> {
        self.state.lock().current.clone()
    }

    /// Working order of the current run
    pub fn play_order(&self) -> Vec<AudioClip> {
        self.state.lock().order.clone()
    }

    pub fn is_playing(&self) -> bool {
        self.state.lock().is_playing()
    }

    pub fn is_repeating(&self) -> bool {
        self.state.lock().repeat
    }

    // ----- authored list -----

    pub fn len(&self) -> usize {
        self.state.lock().clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().clips.is_empty()
    }

    pub fn clips(&self) -> Vec<AudioClip> {
        self.state.lock().clips.clone()
    }

    pub fn get(&self, index: usize) -> Option<AudioClip> {
        self.state.lock().clips.get(index).cloned()
    }

    pub fn set(&self, index: usize, clip: AudioClip) -> Result<()> {
        let mut state = self.state.lock();
        let len = state.clips.len();
        match state.clips.get_mut(index) {
            Some(slot) => {
                *slot = clip;
                Ok(())
            }
            None => Err(AudioError::IndexOutOfRange { index, len }),
        }
    }

    pub fn push(&self, clip: AudioClip) {
        self.state.lock().clips.push(clip);
    }

    pub fn insert(&self, index: usize, clip: AudioClip) -> Result<()> {
        let mut state = self.state.lock();
        let len = state.clips.len();
        if index > len {
            return Err(AudioError::IndexOutOfRange { index, len });
        }
        state.clips.insert(index, clip);
        Ok(())
    }

    /// Remove the first occurrence of `clip`
    pub fn remove(&self, clip: &AudioClip) -> bool {
        let mut state = self.state.lock();
        match state.clips.iter().position(|c| c == clip) {
            Some(index) => {
                state.clips.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn remove_at(&self, index: usize) -> Result<AudioClip> {
        let mut state = self.state.lock();
        let len = state.clips.len();
        if index >= len {
            return Err(AudioError::IndexOutOfRange { index, len });
        }
        Ok(state.clips.remove(index))
    }

    /// Keep only clips matching `keep`; returns how many were removed
    pub fn retain(&self, keep: impl FnMut(&AudioClip) -> bool) -> usize {
        let mut state = self.state.lock();
        let before = state.clips.len();
        state.clips.retain(keep);
        before - state.clips.len()
    }

    pub fn clear(&self) {
        self.state.lock().clips.clear();
    }

    pub fn contains(&self, clip: &AudioClip) -> bool {
        self.state.lock().clips.contains(clip)
    }

    pub fn index_of(&self, clip: &AudioClip) -> Option<usize> {
        self.state.lock().clips.iter().position(|c| c == clip)
    }
}

impl std::fmt::Debug for Playlist {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Playlist")
            .field("name", &state.name)
            .field("category", &state.category)
            .field("clips", &state.clips.len())
            .field("index", &state.index)
            .finish()
    }
}

/// Move to the next track. A completed track always advances; a manual
/// request with nothing playing starts over at the first track.
fn advance(
    engine: &AudioEngine,
    shared: &Arc<Mutex<PlaylistState>>,
    state: &mut PlaylistState,
    completed: bool,
) -> Result<()> {
    if state.order.is_empty() {
        if state.clips.is_empty() {
            return Ok(());
        }
        state.order = state.clips.clone();
        state.index = 0;
        state.repeat = false;
        return play_current(engine, shared, state);
    }

    if !completed && !state.is_playing() {
        state.index = 0;
        return play_current(engine, shared, state);
    }

    if state.index + 1 < state.order.len() {
        state.index += 1;
    } else if state.repeat {
        state.index = 0;
    } else {
        tracing::debug!("Playlist '{}' finished", state.name);
        state.stop_current();
        return Ok(());
    }
    play_current(engine, shared, state)
}

/// Start `order[index]`, reusing the live handle when there is one
fn play_current(
    engine: &AudioEngine,
    shared: &Arc<Mutex<PlaylistState>>,
    state: &mut PlaylistState,
) -> Result<()> {
    let clip = state.order[state.index].clone();
    tracing::debug!(
        "Playlist '{}' track {} of {}: {}",
        state.name,
        state.index + 1,
        state.order.len(),
        clip.name()
    );

    if let Some(handle) = state.current.as_ref().filter(|handle| !handle.is_stopped()) {
        return handle.restart_with_clip(clip);
    }

    let settings = state.settings.clone().with_auto_stop(false);
    let handle = engine.play(state.category, clip, settings)?;

    let weak_engine = engine.downgrade();
    let weak_state = Arc::downgrade(shared);
    handle.on_complete(move || on_track_complete(&weak_engine, &weak_state))?;

    state.current = Some(handle);
    Ok(())
}

fn on_track_complete(engine: &WeakEngine, state: &Weak<Mutex<PlaylistState>>) {
    let (Some(engine), Some(shared)) = (engine.upgrade(), state.upgrade()) else {
        return;
    };
    let mut state = shared.lock();
    if let Err(e) = advance(&engine, &shared, &mut state, true) {
        tracing::warn!("Playlist '{}' failed to advance: {}", state.name, e);
    }
}
