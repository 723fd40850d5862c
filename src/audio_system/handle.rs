/// Playback handles
///
/// A handle is one playback request. It owns a pooled channel from creation
/// until it stops, moves through `Wait -> Delay -> Playing <-> Pause -> Stop`
/// and is driven once per engine tick. `Stop` is terminal: the channel goes
/// back to the pool and every further control call is an invalid operation.
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::category::AudioCategory;
use super::clip::AudioClip;
use super::clock::Frame;
use super::events::EngineEvent;
use super::fade::{Fade, FadeAction};
use super::link::{LinkBehaviour, OwnerId};
use super::manager::{AudioEngine, WeakEngine};
use super::mixer::CategoryMixer;
use super::output::ChannelSettings;
use super::pool::{Channel, ChannelId, ChannelPool};
use super::settings::PlaybackSettings;
use super::wait::{wait_while, CancelBehaviour, Interrupted};
use crate::error::{AudioError, Result};

/// User callback. Runs after the engine lock is released, so it may call
/// back into the engine.
pub type Callback = Arc<dyn Fn() + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(u64);

impl HandleId {
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handle#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleState {
    /// Configured, not yet asked to play
    Wait,
    /// Asked to play, waiting out the start delay
    Delay,
    Playing,
    Pause,
    /// Terminal
    Stop,
}

impl fmt::Display for HandleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HandleState::Wait => "Wait",
            HandleState::Delay => "Delay",
            HandleState::Playing => "Playing",
            HandleState::Pause => "Pause",
            HandleState::Stop => "Stop",
        };
        write!(f, "{}", name)
    }
}

/// Callbacks and events gathered while the engine lock is held
#[derive(Default)]
pub(crate) struct Outbox {
    callbacks: Vec<Callback>,
    events: Vec<EngineEvent>,
}

impl Outbox {
    fn notify(&mut self, callbacks: &[Callback]) {
        self.callbacks.extend(callbacks.iter().cloned());
    }

    pub(crate) fn push_callback(&mut self, callback: Callback) {
        self.callbacks.push(callback);
    }

    pub(crate) fn push_event(&mut self, event: EngineEvent) {
        self.events.push(event);
    }

    pub(crate) fn into_parts(self) -> (Vec<EngineEvent>, Vec<Callback>) {
        (self.events, self.callbacks)
    }
}

/// Engine state a handle operation may touch besides the handle itself
pub(crate) struct HandleContext<'a> {
    pub(crate) mixer: &'a CategoryMixer,
    pub(crate) pool: &'a mut ChannelPool,
    /// Wall-clock time for fades
    pub(crate) now: Duration,
    pub(crate) time_scale: f32,
    pub(crate) outbox: &'a mut Outbox,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CallbackKind {
    Start,
    Play,
    Pause,
    Stop,
    Complete,
}

#[derive(Default, Clone)]
struct HandleCallbacks {
    on_start: Vec<Callback>,
    on_play: Vec<Callback>,
    on_pause: Vec<Callback>,
    on_stop: Vec<Callback>,
    on_complete: Vec<Callback>,
}

impl HandleCallbacks {
    fn list_mut(&mut self, kind: CallbackKind) -> &mut Vec<Callback> {
        match kind {
            CallbackKind::Start => &mut self.on_start,
            CallbackKind::Play => &mut self.on_play,
            CallbackKind::Pause => &mut self.on_pause,
            CallbackKind::Stop => &mut self.on_stop,
            CallbackKind::Complete => &mut self.on_complete,
        }
    }
}

pub(crate) struct HandleCore {
    id: HandleId,
    category: AudioCategory,
    /// `None` once stopped
    channel: Option<Channel>,
    state: HandleState,
    elapsed: Duration,
    delay: Duration,
    volume: f32,
    pitch: f32,
    auto_stop: bool,
    sync_pitch: bool,
    started: bool,
    start_fade: Duration,
    /// Volume to return to after a pause fade
    resume_volume: Option<f32>,
    tag: Option<String>,
    volume_fade: Option<Fade>,
    pitch_fade: Option<Fade>,
    callbacks: HandleCallbacks,
}

impl HandleCore {
    /// Configure `channel` from `settings`. The handle starts in `Wait`.
    pub(crate) fn new(
        id: HandleId,
        mut channel: Channel,
        settings: PlaybackSettings,
        ctx: &mut HandleContext<'_>,
    ) -> Self {
        let category = channel.category();
        let mut channel_settings = settings.channel;
        if channel_settings.route.is_none() {
            channel_settings.route = ctx.mixer.route(category).map(str::to_string);
        }
        channel.output_mut().apply_settings(&channel_settings);

        let mut core = Self {
            id,
            category,
            channel: Some(channel),
            state: HandleState::Wait,
            elapsed: Duration::ZERO,
            delay: settings.delay,
            volume: settings.volume,
            pitch: settings.pitch,
            auto_stop: settings.auto_stop,
            sync_pitch: settings.sync_pitch_with_time_scale,
            started: false,
            start_fade: settings.fade_in,
            resume_volume: None,
            tag: settings.id,
            volume_fade: None,
            pitch_fade: None,
            callbacks: HandleCallbacks::default(),
        };
        core.apply_volume(ctx);
        core.apply_pitch(ctx);
        core
    }

    pub(crate) fn id(&self) -> HandleId {
        self.id
    }

    pub(crate) fn category(&self) -> AudioCategory {
        self.category
    }

    pub(crate) fn state(&self) -> HandleState {
        self.state
    }

    /// Delay or Playing
    pub(crate) fn is_playing(&self) -> bool {
        matches!(self.state, HandleState::Delay | HandleState::Playing)
    }

    pub(crate) fn is_paused(&self) -> bool {
        self.state == HandleState::Pause
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.state == HandleState::Stop
    }

    pub(crate) fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub(crate) fn delay(&self) -> Duration {
        self.delay
    }

    pub(crate) fn volume(&self) -> f32 {
        self.volume
    }

    pub(crate) fn pitch(&self) -> f32 {
        self.pitch
    }

    pub(crate) fn auto_stop(&self) -> bool {
        self.auto_stop
    }

    pub(crate) fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub(crate) fn has_channel(&self) -> bool {
        self.channel.is_some()
    }

    pub(crate) fn channel_alive(&self) -> bool {
        self.channel.as_ref().is_some_and(Channel::is_alive)
    }

    pub(crate) fn channel_id(&self) -> Option<ChannelId> {
        self.channel.as_ref().map(Channel::id)
    }

    pub(crate) fn clip(&self) -> Option<&AudioClip> {
        self.channel.as_ref()?.output().clip()
    }

    pub(crate) fn channel_settings(&self) -> Option<&ChannelSettings> {
        self.channel.as_ref().map(|channel| channel.output().settings())
    }

    pub(crate) fn position(&self) -> Duration {
        self.channel
            .as_ref()
            .map_or(Duration::ZERO, |channel| channel.output().position())
    }

    fn ensure_live(&self) -> Result<()> {
        if self.is_stopped() {
            return Err(AudioError::stopped_handle());
        }
        Ok(())
    }

    fn output_mut(&mut self) -> Option<&mut dyn super::output::OutputChannel> {
        self.channel.as_mut().map(Channel::output_mut)
    }

    fn apply_volume(&mut self, ctx: &HandleContext<'_>) {
        let effective = self.volume * ctx.mixer.volume(self.category);
        if let Some(output) = self.output_mut() {
            output.set_volume(effective);
        }
    }

    fn apply_pitch(&mut self, ctx: &HandleContext<'_>) {
        let scale = if self.sync_pitch { ctx.time_scale } else { 1.0 };
        let effective = self.pitch * scale;
        if let Some(output) = self.output_mut() {
            output.set_pitch(effective);
        }
    }

    fn settle_state(&mut self) {
        self.state = if self.elapsed < self.delay {
            HandleState::Delay
        } else {
            HandleState::Playing
        };
    }

    fn clip_name(&self) -> Option<String> {
        self.clip().map(|clip| clip.name().to_string())
    }

    // ----- control -----

    pub(crate) fn play(&mut self, _ctx: &mut HandleContext<'_>) -> Result<()> {
        self.ensure_live()?;
        if self.is_paused() {
            if let Some(output) = self.output_mut() {
                output.unpause();
            }
        }
        self.settle_state();
        tracing::debug!("{} {} -> {}", self.category, self.id, self.state);
        Ok(())
    }

    pub(crate) fn play_with_fade(
        &mut self,
        duration: Duration,
        ctx: &mut HandleContext<'_>,
    ) -> Result<()> {
        self.ensure_live()?;
        self.start_fade = duration;
        self.play(ctx)
    }

    pub(crate) fn restart(&mut self, _ctx: &mut HandleContext<'_>) -> Result<()> {
        self.ensure_live()?;
        self.elapsed = Duration::ZERO;
        self.started = false;
        if let Some(output) = self.output_mut() {
            output.stop();
        }
        self.settle_state();
        tracing::debug!("{} {} restarted", self.category, self.id);
        Ok(())
    }

    /// Swap the clip and start over. Output begins right away when no delay
    /// is pending.
    pub(crate) fn restart_with_clip(
        &mut self,
        clip: AudioClip,
        ctx: &mut HandleContext<'_>,
    ) -> Result<()> {
        self.ensure_live()?;
        if let Some(output) = self.output_mut() {
            output.stop();
            output.set_clip(Some(clip));
        }
        self.elapsed = Duration::ZERO;
        self.started = false;
        self.settle_state();
        if self.state == HandleState::Playing {
            self.start(ctx);
        }
        Ok(())
    }

    pub(crate) fn pause(&mut self, ctx: &mut HandleContext<'_>) -> Result<()> {
        self.ensure_live()?;
        self.enter_pause(ctx);
        Ok(())
    }

    fn enter_pause(&mut self, ctx: &mut HandleContext<'_>) {
        if let Some(output) = self.output_mut() {
            output.pause();
        }
        ctx.outbox.notify(&self.callbacks.on_pause);
        ctx.outbox.push_event(EngineEvent::HandlePaused {
            handle: self.id,
            category: self.category,
        });
        self.state = HandleState::Pause;
    }

    pub(crate) fn pause_with_fade(
        &mut self,
        duration: Duration,
        ctx: &mut HandleContext<'_>,
    ) -> Result<()> {
        self.ensure_live()?;
        // Fades only move while output runs
        if duration.is_zero() || self.state != HandleState::Playing {
            return self.pause(ctx);
        }
        self.resume_volume = Some(self.volume);
        self.fade_volume(0.0, duration, Some(FadeAction::Pause), ctx)
    }

    pub(crate) fn unpause(&mut self, ctx: &mut HandleContext<'_>) -> Result<()> {
        self.ensure_live()?;
        if !self.is_paused() {
            return Ok(());
        }
        if let Some(output) = self.output_mut() {
            output.unpause();
        }
        self.settle_state();
        if let Some(volume) = self.resume_volume.take() {
            self.volume = volume;
            self.apply_volume(ctx);
        }
        Ok(())
    }

    pub(crate) fn unpause_with_fade(
        &mut self,
        duration: Duration,
        ctx: &mut HandleContext<'_>,
    ) -> Result<()> {
        self.ensure_live()?;
        if !self.is_paused() {
            return Ok(());
        }
        if duration.is_zero() {
            return self.unpause(ctx);
        }
        let target = self.resume_volume.take().unwrap_or(self.volume);
        if let Some(output) = self.output_mut() {
            output.unpause();
        }
        self.settle_state();
        self.volume = 0.0;
        self.apply_volume(ctx);
        self.fade_volume(target, duration, None, ctx)
    }

    pub(crate) fn stop(&mut self, ctx: &mut HandleContext<'_>) -> Result<()> {
        self.ensure_live()?;
        self.halt(ctx);
        Ok(())
    }

    fn halt(&mut self, ctx: &mut HandleContext<'_>) {
        if let Some(mut channel) = self.channel.take() {
            channel.output_mut().stop();
            ctx.pool.release(channel);
        }
        ctx.outbox.notify(&self.callbacks.on_stop);
        ctx.outbox.push_event(EngineEvent::HandleStopped {
            handle: self.id,
            category: self.category,
        });
        self.volume_fade = None;
        self.pitch_fade = None;
        self.state = HandleState::Stop;
        tracing::debug!("{} {} stopped", self.category, self.id);
    }

    pub(crate) fn stop_with_fade(
        &mut self,
        duration: Duration,
        ctx: &mut HandleContext<'_>,
    ) -> Result<()> {
        self.ensure_live()?;
        if duration.is_zero() || self.state != HandleState::Playing {
            return self.stop(ctx);
        }
        self.fade_volume(0.0, duration, Some(FadeAction::Stop), ctx)
    }

    /// Fade the logical volume; a zero duration applies it immediately and
    /// runs the action before returning.
    pub(crate) fn fade_volume(
        &mut self,
        end: f32,
        duration: Duration,
        action: Option<FadeAction>,
        ctx: &mut HandleContext<'_>,
    ) -> Result<()> {
        self.ensure_live()?;
        if duration.is_zero() {
            self.volume_fade = None;
            self.volume = end;
            self.apply_volume(ctx);
            self.run_action(action, ctx);
        } else {
            self.volume_fade = Some(Fade::new(self.volume, end, duration, ctx.now).then(action));
        }
        Ok(())
    }

    pub(crate) fn fade_pitch(
        &mut self,
        end: f32,
        duration: Duration,
        action: Option<FadeAction>,
        ctx: &mut HandleContext<'_>,
    ) -> Result<()> {
        self.ensure_live()?;
        if duration.is_zero() {
            self.pitch_fade = None;
            self.pitch = end;
            self.apply_pitch(ctx);
            self.run_action(action, ctx);
        } else {
            self.pitch_fade = Some(Fade::new(self.pitch, end, duration, ctx.now).then(action));
        }
        Ok(())
    }

    fn run_action(&mut self, action: Option<FadeAction>, ctx: &mut HandleContext<'_>) {
        match action {
            None => {}
            Some(FadeAction::Stop) => {
                if !self.is_stopped() {
                    self.halt(ctx);
                }
            }
            Some(FadeAction::Pause) => {
                if !self.is_stopped() {
                    self.enter_pause(ctx);
                }
            }
            Some(FadeAction::Notify(callback)) => ctx.outbox.push_callback(callback),
        }
    }

    // ----- configuration -----

    pub(crate) fn set_volume(&mut self, volume: f32, ctx: &mut HandleContext<'_>) -> Result<()> {
        self.ensure_live()?;
        self.volume = volume;
        self.apply_volume(ctx);
        Ok(())
    }

    pub(crate) fn set_pitch(&mut self, pitch: f32, ctx: &mut HandleContext<'_>) -> Result<()> {
        self.ensure_live()?;
        self.pitch = pitch;
        self.apply_pitch(ctx);
        Ok(())
    }

    pub(crate) fn set_delay(&mut self, delay: Duration) -> Result<()> {
        self.ensure_live()?;
        self.delay = delay;
        Ok(())
    }

    pub(crate) fn set_clip(&mut self, clip: AudioClip) -> Result<()> {
        self.ensure_live()?;
        if let Some(output) = self.output_mut() {
            output.set_clip(Some(clip));
        }
        Ok(())
    }

    pub(crate) fn set_tag(&mut self, tag: Option<String>) -> Result<()> {
        self.ensure_live()?;
        self.tag = tag;
        Ok(())
    }

    pub(crate) fn set_auto_stop(&mut self, auto_stop: bool) -> Result<()> {
        self.ensure_live()?;
        self.auto_stop = auto_stop;
        Ok(())
    }

    pub(crate) fn set_sync_pitch(&mut self, sync: bool, ctx: &mut HandleContext<'_>) -> Result<()> {
        self.ensure_live()?;
        self.sync_pitch = sync;
        self.apply_pitch(ctx);
        Ok(())
    }

    pub(crate) fn configure_channel(
        &mut self,
        configure: impl FnOnce(&mut ChannelSettings),
    ) -> Result<()> {
        self.ensure_live()?;
        if let Some(output) = self.output_mut() {
            let mut settings = output.settings().clone();
            configure(&mut settings);
            output.apply_settings(&settings);
        }
        Ok(())
    }

    pub(crate) fn add_callback(&mut self, kind: CallbackKind, callback: Callback) -> Result<()> {
        self.ensure_live()?;
        self.callbacks.list_mut(kind).push(callback);
        Ok(())
    }

    // ----- per-tick -----

    /// Advance one frame. Only Delay/Playing handles with a live channel move.
    pub(crate) fn update(&mut self, frame: &Frame, ctx: &mut HandleContext<'_>) {
        if !self.is_playing() || !self.channel_alive() {
            return;
        }

        self.apply_pitch(ctx);
        self.apply_volume(ctx);

        self.elapsed += frame.delta;
        ctx.outbox.notify(&self.callbacks.on_play);

        if self.elapsed < self.delay {
            self.state = HandleState::Delay;
            return;
        }

        self.state = HandleState::Playing;
        if !self.started {
            self.start(ctx);
        } else if self.output_finished() {
            ctx.outbox.notify(&self.callbacks.on_complete);
            ctx.outbox.push_event(EngineEvent::HandleCompleted {
                handle: self.id,
                category: self.category,
            });

            if self.auto_stop {
                self.halt(ctx);
                return;
            }
            self.elapsed = Duration::ZERO;
            self.started = false;
            self.state = HandleState::Wait;
        }

        self.advance_fades(ctx);
    }

    fn output_finished(&self) -> bool {
        self.channel
            .as_ref()
            .is_some_and(|channel| channel.output().is_finished())
    }

    fn start(&mut self, ctx: &mut HandleContext<'_>) {
        if !self.start_fade.is_zero() {
            let target = self.volume;
            self.volume = 0.0;
            self.apply_volume(ctx);
            self.volume_fade = Some(Fade::new(0.0, target, self.start_fade, ctx.now));
        }

        if let Some(output) = self.output_mut() {
            output.play();
        }
        ctx.outbox.notify(&self.callbacks.on_start);
        ctx.outbox.push_event(EngineEvent::HandleStarted {
            handle: self.id,
            category: self.category,
            clip: self.clip_name(),
        });
        self.started = true;
        tracing::debug!("{} {} started output", self.category, self.id);
    }

    fn advance_fades(&mut self, ctx: &mut HandleContext<'_>) {
        if let Some((value, done)) = self
            .volume_fade
            .as_ref()
            .map(|fade| (fade.value_at(ctx.now), fade.is_complete(ctx.now)))
        {
            self.volume = value;
            self.apply_volume(ctx);
            if done {
                let action = self.volume_fade.take().and_then(Fade::into_action);
                self.run_action(action, ctx);
            }
        }

        if self.is_stopped() {
            return;
        }

        if let Some((value, done)) = self
            .pitch_fade
            .as_ref()
            .map(|fade| (fade.value_at(ctx.now), fade.is_complete(ctx.now)))
        {
            self.pitch = value;
            self.apply_pitch(ctx);
            if done {
                let action = self.pitch_fade.take().and_then(Fade::into_action);
                self.run_action(action, ctx);
            }
        }
    }
}

/// Public handle to one playback request.
///
/// Cheap to clone; all clones control the same playback. The handle does not
/// keep the engine alive. Once the engine is gone, control calls fail with
/// [`AudioError::EngineShutDown`] and queries report a stopped handle.
#[derive(Clone)]
pub struct AudioHandle {
    id: HandleId,
    category: AudioCategory,
    engine: WeakEngine,
}

impl fmt::Debug for AudioHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioHandle")
            .field("id", &self.id)
            .field("category", &self.category)
            .finish()
    }
}

impl PartialEq for AudioHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.engine.ptr_eq(&other.engine)
    }
}

impl Eq for AudioHandle {}

impl AudioHandle {
    pub(crate) fn new(id: HandleId, category: AudioCategory, engine: WeakEngine) -> Self {
        Self {
            id,
            category,
            engine,
        }
    }

    fn engine(&self) -> Result<AudioEngine> {
        self.engine.upgrade().ok_or(AudioError::EngineShutDown)
    }

    fn with_core<R>(
        &self,
        op: impl FnOnce(&mut HandleCore, &mut HandleContext<'_>) -> Result<R>,
    ) -> Result<R> {
        self.engine()?.with_handle(self.id, op)
    }

    fn read<R>(&self, read: impl FnOnce(&HandleCore) -> R) -> Option<R> {
        self.engine.upgrade()?.read_handle(self.id, read)
    }

    pub fn handle_id(&self) -> HandleId {
        self.id
    }

    pub fn category(&self) -> AudioCategory {
        self.category
    }

    /// Current state; handles the engine no longer tracks report `Stop`
    pub fn state(&self) -> HandleState {
        self.read(HandleCore::state).unwrap_or(HandleState::Stop)
    }

    /// True in Delay or Playing
    pub fn is_playing(&self) -> bool {
        self.read(HandleCore::is_playing).unwrap_or(false)
    }

    pub fn is_paused(&self) -> bool {
        self.read(HandleCore::is_paused).unwrap_or(false)
    }

    pub fn is_stopped(&self) -> bool {
        self.state() == HandleState::Stop
    }

    /// Playing or paused; what completion waits on
    pub fn is_busy(&self) -> bool {
        self.read(|core| core.is_playing() || core.is_paused())
            .unwrap_or(false)
    }

    pub fn elapsed(&self) -> Duration {
        self.read(HandleCore::elapsed).unwrap_or_default()
    }

    pub fn delay(&self) -> Duration {
        self.read(HandleCore::delay).unwrap_or_default()
    }

    pub fn volume(&self) -> f32 {
        self.read(HandleCore::volume).unwrap_or(0.0)
    }

    pub fn pitch(&self) -> f32 {
        self.read(HandleCore::pitch).unwrap_or(1.0)
    }

    pub fn auto_stop(&self) -> bool {
        self.read(HandleCore::auto_stop).unwrap_or(true)
    }

    /// Identifier used by group queries
    pub fn id(&self) -> Option<String> {
        self.read(|core| core.tag().map(str::to_string)).flatten()
    }

    pub fn clip(&self) -> Option<AudioClip> {
        self.read(|core| core.clip().cloned()).flatten()
    }

    pub fn channel_id(&self) -> Option<ChannelId> {
        self.read(HandleCore::channel_id).flatten()
    }

    pub fn channel_settings(&self) -> Option<ChannelSettings> {
        self.read(|core| core.channel_settings().cloned()).flatten()
    }

    /// Position within the current clip as reported by the output
    pub fn playback_position(&self) -> Duration {
        self.read(HandleCore::position).unwrap_or_default()
    }

    pub fn is_muted(&self) -> bool {
        self.channel_settings().is_some_and(|settings| settings.muted)
    }

    pub fn play(&self) -> Result<()> {
        self.with_core(|core, ctx| core.play(ctx))
    }

    /// Play, fading in from silence once output starts
    pub fn play_with_fade(&self, duration: Duration) -> Result<()> {
        self.with_core(|core, ctx| core.play_with_fade(duration, ctx))
    }

    pub fn pause(&self) -> Result<()> {
        self.with_core(|core, ctx| core.pause(ctx))
    }

    pub fn pause_with_fade(&self, duration: Duration) -> Result<()> {
        self.with_core(|core, ctx| core.pause_with_fade(duration, ctx))
    }

    /// No-op unless paused
    pub fn unpause(&self) -> Result<()> {
        self.with_core(|core, ctx| core.unpause(ctx))
    }

    pub fn unpause_with_fade(&self, duration: Duration) -> Result<()> {
        self.with_core(|core, ctx| core.unpause_with_fade(duration, ctx))
    }

    /// Stop and release the channel. Stopping a stopped handle is an error.
    pub fn stop(&self) -> Result<()> {
        self.with_core(|core, ctx| core.stop(ctx))
    }

    pub fn stop_with_fade(&self, duration: Duration) -> Result<()> {
        self.with_core(|core, ctx| core.stop_with_fade(duration, ctx))
    }

    /// Start over from the beginning, honouring the delay again
    pub fn restart(&self) -> Result<()> {
        self.with_core(|core, ctx| core.restart(ctx))
    }

    pub fn restart_with_clip(&self, clip: AudioClip) -> Result<()> {
        self.with_core(|core, ctx| core.restart_with_clip(clip, ctx))
    }

    pub fn fade_volume(&self, end: f32, duration: Duration) -> Result<&Self> {
        self.with_core(|core, ctx| core.fade_volume(end, duration, None, ctx))?;
        Ok(self)
    }

    /// Fade volume and call `on_done` when the fade completes
    pub fn fade_volume_then<F>(&self, end: f32, duration: Duration, on_done: F) -> Result<&Self>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let action = FadeAction::Notify(Arc::new(on_done));
        self.with_core(|core, ctx| core.fade_volume(end, duration, Some(action), ctx))?;
        Ok(self)
    }

    pub fn fade_pitch(&self, end: f32, duration: Duration) -> Result<&Self> {
        self.with_core(|core, ctx| core.fade_pitch(end, duration, None, ctx))?;
        Ok(self)
    }

    pub fn fade_pitch_then<F>(&self, end: f32, duration: Duration, on_done: F) -> Result<&Self>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let action = FadeAction::Notify(Arc::new(on_done));
        self.with_core(|core, ctx| core.fade_pitch(end, duration, Some(action), ctx))?;
        Ok(self)
    }

    pub fn set_volume(&self, volume: f32) -> Result<&Self> {
        self.with_core(|core, ctx| core.set_volume(volume, ctx))?;
        Ok(self)
    }

    pub fn set_pitch(&self, pitch: f32) -> Result<&Self> {
        self.with_core(|core, ctx| core.set_pitch(pitch, ctx))?;
        Ok(self)
    }

    pub fn set_delay(&self, delay: Duration) -> Result<&Self> {
        self.with_core(|core, _| core.set_delay(delay))?;
        Ok(self)
    }

    /// Replace the clip without restarting
    pub fn set_clip(&self, clip: AudioClip) -> Result<&Self> {
        self.with_core(|core, _| core.set_clip(clip))?;
        Ok(self)
    }

    pub fn set_id(&self, id: impl Into<String>) -> Result<&Self> {
        let id = id.into();
        self.with_core(|core, _| core.set_tag(Some(id)))?;
        Ok(self)
    }

    pub fn set_auto_stop(&self, auto_stop: bool) -> Result<&Self> {
        self.with_core(|core, _| core.set_auto_stop(auto_stop))?;
        Ok(self)
    }

    pub fn set_sync_pitch_with_time_scale(&self, sync: bool) -> Result<&Self> {
        self.with_core(|core, ctx| core.set_sync_pitch(sync, ctx))?;
        Ok(self)
    }

    /// Edit any channel parameter in place
    pub fn configure_channel(&self, configure: impl FnOnce(&mut ChannelSettings)) -> Result<&Self> {
        self.with_core(|core, _| core.configure_channel(configure))?;
        Ok(self)
    }

    pub fn set_loop(&self, looping: bool) -> Result<&Self> {
        self.configure_channel(|settings| settings.looping = looping)
    }

    pub fn set_mute(&self, muted: bool) -> Result<&Self> {
        self.configure_channel(|settings| settings.muted = muted)
    }

    pub fn set_position(&self, position: [f32; 3]) -> Result<&Self> {
        self.configure_channel(|settings| settings.position = position)
    }

    pub fn set_pan(&self, pan: f32) -> Result<&Self> {
        self.configure_channel(|settings| settings.pan = pan.clamp(-1.0, 1.0))
    }

    pub fn set_spatial_blend(&self, blend: f32) -> Result<&Self> {
        self.configure_channel(|settings| settings.spatial_blend = blend.clamp(0.0, 1.0))
    }

    pub fn set_priority(&self, priority: u8) -> Result<&Self> {
        self.configure_channel(|settings| settings.priority = priority)
    }

    pub fn set_route(&self, route: Option<String>) -> Result<&Self> {
        self.configure_channel(|settings| settings.route = route)
    }

    fn add_callback(&self, kind: CallbackKind, callback: Callback) -> Result<&Self> {
        self.with_core(|core, _| core.add_callback(kind, callback))?;
        Ok(self)
    }

    /// Called each time output begins
    pub fn on_start<F>(&self, callback: F) -> Result<&Self>
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.add_callback(CallbackKind::Start, Arc::new(callback))
    }

    /// Called on every tick while in Delay or Playing
    pub fn on_play<F>(&self, callback: F) -> Result<&Self>
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.add_callback(CallbackKind::Play, Arc::new(callback))
    }

    pub fn on_pause<F>(&self, callback: F) -> Result<&Self>
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.add_callback(CallbackKind::Pause, Arc::new(callback))
    }

    pub fn on_stop<F>(&self, callback: F) -> Result<&Self>
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.add_callback(CallbackKind::Stop, Arc::new(callback))
    }

    /// Called when output runs out, before auto-stop or the return to Wait
    pub fn on_complete<F>(&self, callback: F) -> Result<&Self>
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.add_callback(CallbackKind::Complete, Arc::new(callback))
    }

    /// Tie this handle to an owner's lifecycle. Re-linking replaces the
    /// behaviour.
    pub fn link(&self, owner: OwnerId, behaviour: LinkBehaviour) -> Result<&Self> {
        self.engine()?.link_handle(self.id, owner, behaviour)?;
        Ok(self)
    }

    pub fn unlink(&self, owner: OwnerId) -> Result<&Self> {
        self.engine()?.unlink_handle(self.id, owner);
        Ok(self)
    }

    /// Resolve once the handle is neither playing nor paused.
    ///
    /// On cancellation `on_cancel` is applied (unless the engine is already
    /// shut down) and [`AudioError::Cancelled`] is returned.
    pub async fn wait_for_completion(
        &self,
        cancel: CancellationToken,
        on_cancel: CancelBehaviour,
    ) -> Result<()> {
        let ticks = match self.engine.upgrade() {
            Some(engine) => engine.subscribe_ticks(),
            None => return Ok(()),
        };

        match wait_while(ticks, &cancel, || self.is_busy()).await {
            Ok(()) => Ok(()),
            Err(Interrupted) => {
                self.apply_cancel(on_cancel);
                Err(AudioError::Cancelled)
            }
        }
    }

    fn apply_cancel(&self, on_cancel: CancelBehaviour) {
        let Some(engine) = self.engine.upgrade() else {
            return;
        };
        if engine.is_shut_down() || self.is_stopped() {
            return;
        }

        let result = match on_cancel {
            CancelBehaviour::Stop => self.stop(),
            CancelBehaviour::Pause => self.pause(),
            CancelBehaviour::Keep => Ok(()),
        };
        if let Err(e) = result {
            tracing::debug!("Cancel policy for {} not applied: {}", self.id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_system::virtual_output::{ChannelProbe, VirtualBackend};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixture {
        backend: VirtualBackend,
        pool: ChannelPool,
        mixer: CategoryMixer,
        outbox: Outbox,
        now: Duration,
    }

    impl Fixture {
        fn new() -> Self {
            let backend = VirtualBackend::new();
            Self {
                pool: ChannelPool::new(Box::new(backend.clone())),
                backend,
                mixer: CategoryMixer::new(),
                outbox: Outbox::default(),
                now: Duration::ZERO,
            }
        }

        fn ctx(&mut self) -> HandleContext<'_> {
            HandleContext {
                mixer: &self.mixer,
                pool: &mut self.pool,
                now: self.now,
                time_scale: 1.0,
                outbox: &mut self.outbox,
            }
        }

        fn handle(&mut self, settings: PlaybackSettings) -> HandleCore {
            let clip = AudioClip::silent("test", Duration::from_secs(1));
            let channel = self.pool.acquire(AudioCategory::Effect, clip).unwrap();
            let mut ctx = self.ctx();
            HandleCore::new(HandleId::from_raw(1), channel, settings, &mut ctx)
        }

        fn tick(&mut self, core: &mut HandleCore, ms: u64) {
            self.now += Duration::from_millis(ms);
            let frame = Frame::new(Duration::from_millis(ms));
            let mut ctx = self.ctx();
            core.update(&frame, &mut ctx);
        }

        fn probe(&self) -> ChannelProbe {
            self.backend.channel(0).unwrap()
        }

        fn run_callbacks(&mut self) {
            let (_, callbacks) = std::mem::take(&mut self.outbox).into_parts();
            for callback in callbacks {
                callback();
            }
        }
    }

    fn counter() -> (Arc<AtomicUsize>, Callback) {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = count.clone();
        (
            count,
            Arc::new(move || {
                inner.fetch_add(1, Ordering::SeqCst);
            }),
        )
    }

    #[test]
    fn test_new_handle_waits() {
        let mut fx = Fixture::new();
        let core = fx.handle(PlaybackSettings::new().with_volume(0.5));

        assert_eq!(core.state(), HandleState::Wait);
        assert_eq!(fx.probe().volume(), 0.5);
        assert!(!fx.probe().is_playing());
    }

    #[test]
    fn test_wait_handles_do_not_advance() {
        let mut fx = Fixture::new();
        let mut core = fx.handle(PlaybackSettings::new());

        fx.tick(&mut core, 100);
        assert_eq!(core.elapsed(), Duration::ZERO);
        assert_eq!(core.state(), HandleState::Wait);
    }

    #[test]
    fn test_delay_gates_output() {
        let mut fx = Fixture::new();
        let mut core = fx.handle(PlaybackSettings::new().with_delay(Duration::from_millis(300)));
        let mut ctx = fx.ctx();
        core.play(&mut ctx).unwrap();
        assert_eq!(core.state(), HandleState::Delay);

        fx.tick(&mut core, 100);
        fx.tick(&mut core, 100);
        assert_eq!(core.state(), HandleState::Delay);
        assert_eq!(fx.probe().play_count(), 0);

        fx.tick(&mut core, 100);
        assert_eq!(core.state(), HandleState::Playing);
        assert_eq!(fx.probe().play_count(), 1);
    }

    #[test]
    fn test_stop_is_terminal() {
        let mut fx = Fixture::new();
        let mut core = fx.handle(PlaybackSettings::new());
        let mut ctx = fx.ctx();
        core.play(&mut ctx).unwrap();
        core.stop(&mut ctx).unwrap();

        assert!(core.is_stopped());
        assert!(!core.has_channel());
        assert!(core.stop(&mut ctx).unwrap_err().is_invalid_operation());
        assert!(core.play(&mut ctx).unwrap_err().is_invalid_operation());
        assert!(core.set_volume(0.3, &mut ctx).is_err());
        assert_eq!(fx.pool.idle_count(AudioCategory::Effect), 1);
    }

    #[test]
    fn test_auto_stop_releases_channel_on_completion() {
        let mut fx = Fixture::new();
        let mut core = fx.handle(PlaybackSettings::new());
        let (completed, on_complete) = counter();
        core.add_callback(CallbackKind::Complete, on_complete).unwrap();
        let mut ctx = fx.ctx();
        core.play(&mut ctx).unwrap();

        fx.tick(&mut core, 16);
        fx.probe().finish();
        fx.tick(&mut core, 16);
        fx.run_callbacks();

        assert!(core.is_stopped());
        assert_eq!(completed.load(Ordering::SeqCst), 1);
        assert_eq!(fx.pool.idle_count(AudioCategory::Effect), 1);
    }

    #[test]
    fn test_completion_without_auto_stop_returns_to_wait() {
        let mut fx = Fixture::new();
        let mut core = fx.handle(PlaybackSettings::new().with_auto_stop(false));
        let mut ctx = fx.ctx();
        core.play(&mut ctx).unwrap();

        fx.tick(&mut core, 16);
        fx.probe().finish();
        fx.tick(&mut core, 16);

        assert_eq!(core.state(), HandleState::Wait);
        assert_eq!(core.elapsed(), Duration::ZERO);
        assert!(core.has_channel());

        let mut ctx = fx.ctx();
        core.play(&mut ctx).unwrap();
        fx.tick(&mut core, 16);
        assert_eq!(fx.probe().play_count(), 2);
        assert_eq!(fx.backend.created_count(), 1);
    }

    #[test]
    fn test_zero_duration_fade_is_synchronous() {
        let mut fx = Fixture::new();
        let mut core = fx.handle(PlaybackSettings::new());
        let (done, on_done) = counter();
        let mut ctx = fx.ctx();

        core.fade_volume(0.25, Duration::ZERO, Some(FadeAction::Notify(on_done)), &mut ctx)
            .unwrap();
        assert_eq!(core.volume(), 0.25);
        fx.run_callbacks();
        assert_eq!(done.load(Ordering::SeqCst), 1);
        assert_eq!(fx.probe().volume(), 0.25);
    }

    #[test]
    fn test_timed_fade_advances_with_clock() {
        let mut fx = Fixture::new();
        let mut core = fx.handle(PlaybackSettings::new());
        let mut ctx = fx.ctx();
        core.play(&mut ctx).unwrap();
        core.fade_volume(0.0, Duration::from_millis(1000), None, &mut ctx).unwrap();

        fx.tick(&mut core, 500);
        assert!((core.volume() - 0.5).abs() < 1e-3);

        fx.tick(&mut core, 500);
        assert_eq!(core.volume(), 0.0);
    }

    #[test]
    fn test_stop_with_fade_stops_at_end() {
        let mut fx = Fixture::new();
        let mut core = fx.handle(PlaybackSettings::new());
        let mut ctx = fx.ctx();
        core.play(&mut ctx).unwrap();
        core.stop_with_fade(Duration::from_millis(200), &mut ctx).unwrap();

        fx.tick(&mut core, 100);
        assert!(!core.is_stopped());
        fx.tick(&mut core, 100);
        assert!(core.is_stopped());
    }

    #[test]
    fn test_stop_with_fade_outside_playing_stops_at_once() {
        let mut fx = Fixture::new();
        let mut delayed =
            fx.handle(PlaybackSettings::new().with_delay(Duration::from_millis(300)));
        let mut ctx = fx.ctx();
        delayed.play(&mut ctx).unwrap();
        assert_eq!(delayed.state(), HandleState::Delay);
        delayed.stop_with_fade(Duration::from_millis(100), &mut ctx).unwrap();
        assert!(delayed.is_stopped());

        let mut paused = fx.handle(PlaybackSettings::new());
        let mut ctx = fx.ctx();
        paused.play(&mut ctx).unwrap();
        paused.pause(&mut ctx).unwrap();
        paused.stop_with_fade(Duration::from_millis(100), &mut ctx).unwrap();
        assert!(paused.is_stopped());
        assert_eq!(fx.pool.idle_count(AudioCategory::Effect), 1);
        assert_eq!(fx.backend.created_count(), 1);
    }

    #[test]
    fn test_pause_with_fade_during_delay_pauses_at_once() {
        let mut fx = Fixture::new();
        let mut core = fx.handle(PlaybackSettings::new().with_delay(Duration::from_millis(300)));
        let mut ctx = fx.ctx();
        core.play(&mut ctx).unwrap();
        core.pause_with_fade(Duration::from_millis(100), &mut ctx).unwrap();

        assert!(core.is_paused());
        assert_eq!(core.volume(), 1.0);
    }

    #[test]
    fn test_pause_fade_then_unpause_restores_volume() {
        let mut fx = Fixture::new();
        let mut core = fx.handle(PlaybackSettings::new().with_volume(0.8));
        let mut ctx = fx.ctx();
        core.play(&mut ctx).unwrap();
        core.pause_with_fade(Duration::from_millis(100), &mut ctx).unwrap();

        fx.tick(&mut core, 100);
        assert!(core.is_paused());
        assert_eq!(core.volume(), 0.0);

        let mut ctx = fx.ctx();
        core.unpause_with_fade(Duration::from_millis(100), &mut ctx).unwrap();
        fx.tick(&mut core, 100);
        assert!((core.volume() - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_fade_in_targets_configured_volume() {
        let mut fx = Fixture::new();
        let mut core = fx.handle(
            PlaybackSettings::new()
                .with_volume(0.6)
                .with_fade_in(Duration::from_millis(200)),
        );
        let mut ctx = fx.ctx();
        core.play(&mut ctx).unwrap();

        fx.tick(&mut core, 16);
        assert_eq!(core.volume(), 0.0);

        fx.tick(&mut core, 200);
        assert!((core.volume() - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_unpause_is_noop_unless_paused() {
        let mut fx = Fixture::new();
        let mut core = fx.handle(PlaybackSettings::new());
        let mut ctx = fx.ctx();

        core.unpause(&mut ctx).unwrap();
        assert_eq!(core.state(), HandleState::Wait);
    }

    #[test]
    fn test_play_on_paused_handle_resumes() {
        let mut fx = Fixture::new();
        let mut core = fx.handle(PlaybackSettings::new());
        let mut ctx = fx.ctx();
        core.play(&mut ctx).unwrap();
        fx.tick(&mut core, 16);

        let mut ctx = fx.ctx();
        core.pause(&mut ctx).unwrap();
        assert!(fx.probe().is_paused());

        let mut ctx = fx.ctx();
        core.play(&mut ctx).unwrap();
        assert_eq!(core.state(), HandleState::Playing);
        assert!(!fx.probe().is_paused());
    }

    #[test]
    fn test_category_volume_scales_output() {
        let mut fx = Fixture::new();
        fx.mixer.set_volume(AudioCategory::Effect, 0.5);
        let mut core = fx.handle(PlaybackSettings::new().with_volume(0.8));
        let mut ctx = fx.ctx();
        core.play(&mut ctx).unwrap();

        fx.tick(&mut core, 16);
        assert!((fx.probe().volume() - 0.4).abs() < 1e-6);
        assert_eq!(core.volume(), 0.8);
    }

    #[test]
    fn test_dead_channel_is_skipped() {
        let mut fx = Fixture::new();
        let mut core = fx.handle(PlaybackSettings::new());
        let mut ctx = fx.ctx();
        core.play(&mut ctx).unwrap();
        fx.probe().destroy();

        fx.tick(&mut core, 100);
        assert_eq!(core.elapsed(), Duration::ZERO);
    }

    #[test]
    fn test_restart_with_clip_starts_immediately() {
        let mut fx = Fixture::new();
        let mut core = fx.handle(PlaybackSettings::new());
        let mut ctx = fx.ctx();
        core.play(&mut ctx).unwrap();
        fx.tick(&mut core, 16);

        let next = AudioClip::silent("next", Duration::from_secs(2));
        let mut ctx = fx.ctx();
        core.restart_with_clip(next.clone(), &mut ctx).unwrap();

        assert_eq!(core.state(), HandleState::Playing);
        assert_eq!(fx.probe().clip(), Some(next));
        assert_eq!(fx.probe().play_count(), 2);
    }

    #[test]
    fn test_route_falls_back_to_category_default() {
        let mut fx = Fixture::new();
        fx.mixer
            .set_route(AudioCategory::Effect, Some("sfx-bus".to_string()));

        let core = fx.handle(PlaybackSettings::new());
        assert_eq!(
            core.channel_settings().unwrap().route.as_deref(),
            Some("sfx-bus")
        );

        let mut fx = Fixture::new();
        fx.mixer
            .set_route(AudioCategory::Effect, Some("sfx-bus".to_string()));
        let core = fx.handle(PlaybackSettings::new().with_route("ui"));
        assert_eq!(core.channel_settings().unwrap().route.as_deref(), Some("ui"));
    }
}
