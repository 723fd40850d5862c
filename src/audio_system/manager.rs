/// Audio engine
///
/// Owns every handle, the channel pool, the category mixer and the owner link
/// registry. All state sits behind one lock; callbacks and events produced
/// while it is held are delivered after it is released, so user code may call
/// back into the engine from any callback.
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use tokio::sync::watch;

use super::category::AudioCategory;
use super::clip::AudioClip;
use super::clock::{Clock, Frame, SystemClock};
use super::events::{EngineEvent, EventBus, SubscriberId};
use super::handle::{AudioHandle, HandleContext, HandleCore, HandleId, HandleState, Outbox};
use super::link::{LinkAction, LinkBehaviour, LinkRegistry, OwnerEvent, OwnerId};
use super::mixer::CategoryMixer;
use super::output::ChannelBackend;
use super::pool::{ChannelPool, ChannelStats};
use super::settings::PlaybackSettings;
use crate::config::EngineConfig;
use crate::error::{AudioError, Result};

/// Selects handles for bulk control and queries
#[derive(Debug, Clone, Default)]
pub struct HandleFilter {
    category: Option<AudioCategory>,
    clip: Option<AudioClip>,
    id: Option<String>,
}

impl HandleFilter {
    /// Match every handle
    pub fn all() -> Self {
        Self::default()
    }

    pub fn in_category(mut self, category: AudioCategory) -> Self {
        self.category = Some(category);
        self
    }

    pub fn with_clip(mut self, clip: &AudioClip) -> Self {
        self.clip = Some(clip.clone());
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    fn matches(&self, core: &HandleCore) -> bool {
        if self.category.is_some_and(|category| category != core.category()) {
            return false;
        }
        if let Some(clip) = &self.clip {
            if core.clip() != Some(clip) {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if core.tag() != Some(id.as_str()) {
                return false;
            }
        }
        true
    }
}

struct EngineState {
    handles: HashMap<HandleId, HandleCore>,
    /// Handles driven by tick, in admission order
    active: Vec<HandleId>,
    /// Created since the last tick; admitted at the next tick boundary
    pending: Vec<HandleId>,
    pool: ChannelPool,
    mixer: CategoryMixer,
    links: LinkRegistry,
    clock: Arc<dyn Clock>,
    time_scale: f32,
    next_handle: u64,
    shut_down: bool,
}

impl EngineState {
    /// Run `op` against one handle with the shared context split out of the
    /// engine state. Links of a handle that ends up stopped are dropped.
    fn run<R>(
        &mut self,
        id: HandleId,
        outbox: &mut Outbox,
        op: impl FnOnce(&mut HandleCore, &mut HandleContext<'_>) -> Result<R>,
    ) -> Result<R> {
        let now = self.clock.now();
        let EngineState {
            handles,
            pool,
            mixer,
            links,
            time_scale,
            ..
        } = self;

        let core = handles.get_mut(&id).ok_or_else(AudioError::stopped_handle)?;
        let mut ctx = HandleContext {
            mixer,
            pool,
            now,
            time_scale: *time_scale,
            outbox,
        };
        let result = op(core, &mut ctx);
        if core.is_stopped() {
            links.remove_handle(id);
        }
        result
    }

    /// Drop stopped handles, then admit this frame's new ones
    fn prune_and_admit(&mut self) {
        let EngineState {
            handles,
            active,
            pending,
            ..
        } = self;

        active.retain(|id| {
            let keep = handles.get(id).is_some_and(|core| !core.is_stopped());
            if !keep {
                handles.remove(id);
            }
            keep
        });

        for id in pending.drain(..) {
            if handles.get(&id).is_some_and(|core| !core.is_stopped()) {
                active.push(id);
            } else {
                handles.remove(&id);
            }
        }
    }

    fn live_cores(&self) -> impl Iterator<Item = &HandleCore> {
        self.active
            .iter()
            .filter_map(|id| self.handles.get(id))
            .filter(|core| !core.is_stopped())
    }
}

pub(crate) struct EngineInner {
    state: Mutex<EngineState>,
    events: EventBus,
    ticks: watch::Sender<u64>,
}

/// Non-owning reference held by handles and playlist callbacks
#[derive(Clone)]
pub(crate) struct WeakEngine(Weak<EngineInner>);

impl WeakEngine {
    pub(crate) fn upgrade(&self) -> Option<AudioEngine> {
        self.0.upgrade().map(|inner| AudioEngine { inner })
    }

    pub(crate) fn ptr_eq(&self, other: &WeakEngine) -> bool {
        self.0.ptr_eq(&other.0)
    }
}

/// The pooled playback engine.
///
/// Cheap to clone; clones share the same engine. Call [`AudioEngine::tick`]
/// once per frame to drive delays, fades and completion.
#[derive(Clone)]
pub struct AudioEngine {
    inner: Arc<EngineInner>,
}

impl AudioEngine {
    pub fn new(backend: impl ChannelBackend + 'static) -> Self {
        Self::with_clock(backend, Arc::new(SystemClock::new()))
    }

    /// Use `clock` for fade timing
    pub fn with_clock(backend: impl ChannelBackend + 'static, clock: Arc<dyn Clock>) -> Self {
        let pool = ChannelPool::new(Box::new(backend));
        tracing::info!("Audio engine created on {} backend", pool.backend_name());

        let (ticks, _) = watch::channel(0);
        Self {
            inner: Arc::new(EngineInner {
                state: Mutex::new(EngineState {
                    handles: HashMap::new(),
                    active: Vec::new(),
                    pending: Vec::new(),
                    pool,
                    mixer: CategoryMixer::new(),
                    links: LinkRegistry::new(),
                    clock,
                    time_scale: 1.0,
                    next_handle: 1,
                    shut_down: false,
                }),
                events: EventBus::new(),
                ticks,
            }),
        }
    }

    /// Apply category volumes and default routes from `config`
    pub fn apply_config(&self, config: &EngineConfig) {
        let mut state = self.inner.state.lock();
        for category in AudioCategory::ALL {
            state
                .mixer
                .set_volume(category, config.category_volume(category));
            state
                .mixer
                .set_route(category, config.default_route(category).map(str::to_string));
        }
        tracing::debug!("Applied engine configuration");
    }

    pub(crate) fn downgrade(&self) -> WeakEngine {
        WeakEngine(Arc::downgrade(&self.inner))
    }

    fn flush(&self, outbox: Outbox) {
        let (events, callbacks) = outbox.into_parts();
        for event in events {
            self.inner.events.publish(event);
        }
        for callback in callbacks {
            callback();
        }
    }

    // ----- playback -----

    /// Create a handle on a pooled channel and start it
    pub fn play(
        &self,
        category: AudioCategory,
        clip: AudioClip,
        settings: PlaybackSettings,
    ) -> Result<AudioHandle> {
        self.spawn(category, clip, settings, true)
    }

    /// Create a configured handle that stays in `Wait` until played
    pub fn prepare(
        &self,
        category: AudioCategory,
        clip: AudioClip,
        settings: PlaybackSettings,
    ) -> Result<AudioHandle> {
        self.spawn(category, clip, settings, false)
    }

    pub fn play_music(&self, clip: AudioClip) -> Result<AudioHandle> {
        self.play(AudioCategory::Music, clip, PlaybackSettings::default())
    }

    pub fn play_effect(&self, clip: AudioClip) -> Result<AudioHandle> {
        self.play(AudioCategory::Effect, clip, PlaybackSettings::default())
    }

    /// Play a fully 3D effect at `position`
    pub fn play_spatial(&self, clip: AudioClip, position: [f32; 3]) -> Result<AudioHandle> {
        let category = AudioCategory::SpatialEffect;
        let settings = PlaybackSettings::new()
            .with_position(position)
            .with_spatial_blend(category.default_spatial_blend());
        self.play(category, clip, settings)
    }

    fn spawn(
        &self,
        category: AudioCategory,
        clip: AudioClip,
        settings: PlaybackSettings,
        start: bool,
    ) -> Result<AudioHandle> {
        let mut outbox = Outbox::default();
        let id = {
            let mut guard = self.inner.state.lock();
            if guard.shut_down {
                return Err(AudioError::EngineShutDown);
            }

            let now = guard.clock.now();
            let state = &mut *guard;
            let id = HandleId::from_raw(state.next_handle);
            state.next_handle += 1;

            let channel = state.pool.acquire(category, clip)?;
            let mut ctx = HandleContext {
                mixer: &state.mixer,
                pool: &mut state.pool,
                now,
                time_scale: state.time_scale,
                outbox: &mut outbox,
            };
            let mut core = HandleCore::new(id, channel, settings, &mut ctx);
            if start {
                core.play(&mut ctx)?;
            }

            tracing::debug!("{} {} created ({})", category, id, core.state());
            state.handles.insert(id, core);
            state.pending.push(id);
            id
        };

        self.flush(outbox);
        Ok(AudioHandle::new(id, category, self.downgrade()))
    }

    // ----- per-handle access -----

    pub(crate) fn with_handle<R>(
        &self,
        id: HandleId,
        op: impl FnOnce(&mut HandleCore, &mut HandleContext<'_>) -> Result<R>,
    ) -> Result<R> {
        let mut outbox = Outbox::default();
        let result = self.inner.state.lock().run(id, &mut outbox, op);
        self.flush(outbox);
        result
    }

    pub(crate) fn read_handle<R>(&self, id: HandleId, read: impl FnOnce(&HandleCore) -> R) -> Option<R> {
        self.inner.state.lock().handles.get(&id).map(read)
    }

    pub(crate) fn link_handle(
        &self,
        id: HandleId,
        owner: OwnerId,
        behaviour: LinkBehaviour,
    ) -> Result<()> {
        let mut state = self.inner.state.lock();
        match state.handles.get(&id) {
            Some(core) if !core.is_stopped() => {
                state.links.link(owner, id, behaviour);
                tracing::debug!("{} linked to {} ({:?})", id, owner, behaviour);
                Ok(())
            }
            _ => Err(AudioError::stopped_handle()),
        }
    }

    pub(crate) fn unlink_handle(&self, id: HandleId, owner: OwnerId) {
        self.inner.state.lock().links.unlink(owner, id);
    }

    pub(crate) fn subscribe_ticks(&self) -> watch::Receiver<u64> {
        self.inner.ticks.subscribe()
    }

    // ----- tick -----

    /// Advance every active handle by one frame.
    ///
    /// Handles created during this call are first driven on the next tick.
    pub fn tick(&self, frame: Frame) {
        let ids = {
            let mut state = self.inner.state.lock();
            if state.shut_down {
                return;
            }
            state.time_scale = frame.time_scale;
            state.prune_and_admit();
            state.active.clone()
        };

        for id in ids {
            let mut outbox = Outbox::default();
            // Missing handles were removed by a callback earlier in this tick
            let _ = self.inner.state.lock().run(id, &mut outbox, |core, ctx| {
                core.update(&frame, ctx);
                Ok(())
            });
            self.flush(outbox);
        }

        self.inner.ticks.send_modify(|count| *count += 1);
    }

    /// Number of completed ticks
    pub fn tick_count(&self) -> u64 {
        *self.inner.ticks.borrow()
    }

    // ----- bulk control -----

    fn select(&self, filter: &HandleFilter) -> Vec<HandleId> {
        let state = self.inner.state.lock();
        let ids = state
            .live_cores()
            .filter(|core| core.state() != HandleState::Wait && filter.matches(core))
            .map(HandleCore::id)
            .collect();
        ids
    }

    fn apply_each(
        &self,
        ids: Vec<HandleId>,
        op: impl Fn(&mut HandleCore, &mut HandleContext<'_>) -> Result<()>,
    ) -> usize {
        let mut count = 0;
        for id in ids {
            let mut outbox = Outbox::default();
            let result = self.inner.state.lock().run(id, &mut outbox, |core, ctx| {
                if core.is_stopped() {
                    return Ok(false);
                }
                op(core, ctx).map(|_| true)
            });
            self.flush(outbox);

            match result {
                Ok(true) => count += 1,
                Ok(false) => {}
                Err(e) => tracing::debug!("Skipping {}: {}", id, e),
            }
        }
        count
    }

    pub fn restart_matching(&self, filter: &HandleFilter) -> usize {
        let count = self.apply_each(self.select(filter), |core, ctx| core.restart(ctx));
        tracing::debug!("Restarted {} handle(s)", count);
        count
    }

    pub fn pause_matching(&self, filter: &HandleFilter, fade: Duration) -> usize {
        let count = self.apply_each(self.select(filter), |core, ctx| {
            core.pause_with_fade(fade, ctx)
        });
        tracing::debug!("Paused {} handle(s)", count);
        count
    }

    pub fn unpause_matching(&self, filter: &HandleFilter, fade: Duration) -> usize {
        self.apply_each(self.select(filter), |core, ctx| {
            core.unpause_with_fade(fade, ctx)
        })
    }

    pub fn stop_matching(&self, filter: &HandleFilter, fade: Duration) -> usize {
        let count = self.apply_each(self.select(filter), |core, ctx| {
            core.stop_with_fade(fade, ctx)
        });
        tracing::debug!("Stopped {} handle(s)", count);
        count
    }

    pub fn pause_all(&self) -> usize {
        self.pause_matching(&HandleFilter::all(), Duration::ZERO)
    }

    pub fn unpause_all(&self) -> usize {
        self.unpause_matching(&HandleFilter::all(), Duration::ZERO)
    }

    pub fn stop_all(&self) -> usize {
        self.stop_matching(&HandleFilter::all(), Duration::ZERO)
    }

    pub fn restart_all(&self) -> usize {
        self.restart_matching(&HandleFilter::all())
    }

    // ----- queries -----

    fn collect(&self, filter: &HandleFilter) -> Vec<AudioHandle> {
        let state = self.inner.state.lock();
        let handles = state
            .live_cores()
            .filter(|core| filter.matches(core))
            .map(|core| AudioHandle::new(core.id(), core.category(), self.downgrade()))
            .collect();
        handles
    }

    /// Live handles admitted by the last tick
    pub fn handles(&self) -> Vec<AudioHandle> {
        self.collect(&HandleFilter::all())
    }

    pub fn handles_in(&self, category: AudioCategory) -> Vec<AudioHandle> {
        self.collect(&HandleFilter::all().in_category(category))
    }

    pub fn handles_by_clip(&self, clip: &AudioClip) -> Vec<AudioHandle> {
        self.collect(&HandleFilter::all().with_clip(clip))
    }

    pub fn handles_by_id(&self, id: &str) -> Vec<AudioHandle> {
        self.collect(&HandleFilter::all().with_id(id))
    }

    pub fn active_count(&self) -> usize {
        self.inner.state.lock().live_cores().count()
    }

    pub fn active_count_in(&self, category: AudioCategory) -> usize {
        self.inner
            .state
            .lock()
            .live_cores()
            .filter(|core| core.category() == category)
            .count()
    }

    pub fn channel_stats(&self, category: AudioCategory) -> ChannelStats {
        let state = self.inner.state.lock();
        let in_use = state
            .handles
            .values()
            .filter(|core| core.category() == category && core.has_channel())
            .count();
        ChannelStats {
            allocated: state.pool.allocated_count(category),
            idle: state.pool.idle_count(category),
            in_use,
        }
    }

    // ----- category control -----

    pub fn category_volume(&self, category: AudioCategory) -> f32 {
        self.inner.state.lock().mixer.volume(category)
    }

    /// Set the category multiplier (0.0-1.0); takes effect on the next tick
    pub fn set_category_volume(&self, category: AudioCategory, volume: f32) {
        self.inner.state.lock().mixer.set_volume(category, volume);
        tracing::debug!("{} volume set to {:.2}", category, volume.clamp(0.0, 1.0));
    }

    pub fn default_route(&self, category: AudioCategory) -> Option<String> {
        self.inner
            .state
            .lock()
            .mixer
            .route(category)
            .map(str::to_string)
    }

    /// Route used by new handles of `category` that name no route themselves
    pub fn set_default_route(&self, category: AudioCategory, route: Option<String>) {
        self.inner.state.lock().mixer.set_route(category, route);
    }

    // ----- owner links -----

    pub fn owner_enabled(&self, owner: OwnerId) -> usize {
        self.notify_owner(owner, OwnerEvent::Enabled)
    }

    pub fn owner_disabled(&self, owner: OwnerId) -> usize {
        self.notify_owner(owner, OwnerEvent::Disabled)
    }

    /// Stop every handle linked to `owner` and forget the owner
    pub fn owner_destroyed(&self, owner: OwnerId) -> usize {
        self.notify_owner(owner, OwnerEvent::Destroyed)
    }

    /// Apply an owner lifecycle event to its linked handles; returns how many
    /// handles reacted. Stopped handles and handles whose channel was
    /// destroyed are skipped.
    pub fn notify_owner(&self, owner: OwnerId, event: OwnerEvent) -> usize {
        let mut outbox = Outbox::default();
        let mut affected = 0;
        {
            let mut state = self.inner.state.lock();
            let entries = state.links.entries(owner);
            if event == OwnerEvent::Destroyed {
                state.links.remove_owner(owner);
            }

            for (id, behaviour) in entries {
                let Some(action) = behaviour.reaction(event) else {
                    continue;
                };
                let result = state.run(id, &mut outbox, |core, ctx| {
                    if core.is_stopped() || !core.channel_alive() {
                        return Ok(false);
                    }
                    match action {
                        LinkAction::Play => core.play(ctx)?,
                        LinkAction::Restart => core.restart(ctx)?,
                        LinkAction::UnPause => core.unpause(ctx)?,
                        LinkAction::Pause => core.pause(ctx)?,
                        LinkAction::Stop => core.stop(ctx)?,
                    }
                    Ok(true)
                });
                if let Ok(true) = result {
                    affected += 1;
                }
            }

            outbox.push_event(EngineEvent::OwnerNotified {
                owner,
                event,
                affected,
            });
        }

        self.flush(outbox);
        tracing::debug!("{} {:?}: {} handle(s) affected", owner, event, affected);
        affected
    }

    pub fn link_count(&self) -> usize {
        self.inner.state.lock().links.link_count()
    }

    // ----- events -----

    pub fn subscribe(&self) -> (Receiver<EngineEvent>, SubscriberId) {
        self.inner.events.subscribe()
    }

    pub fn unsubscribe(&self, id: SubscriberId) {
        self.inner.events.unsubscribe(id);
    }

    // ----- teardown -----

    /// Stop every handle and drop every pooled channel. Further playback
    /// requests fail with [`AudioError::EngineShutDown`].
    pub fn shutdown(&self) {
        let mut outbox = Outbox::default();
        let stopped = {
            let mut state = self.inner.state.lock();
            if state.shut_down {
                return;
            }
            state.shut_down = true;

            let ids: Vec<HandleId> = state
                .active
                .iter()
                .chain(state.pending.iter())
                .copied()
                .collect();
            let mut stopped = 0;
            for id in ids {
                let result = state.run(id, &mut outbox, |core, ctx| {
                    if core.is_stopped() {
                        return Ok(false);
                    }
                    core.stop(ctx).map(|_| true)
                });
                if let Ok(true) = result {
                    stopped += 1;
                }
            }

            state.handles.clear();
            state.active.clear();
            state.pending.clear();
            state.links.clear();
            state.pool.clear();
            outbox.push_event(EngineEvent::Shutdown);
            stopped
        };

        self.flush(outbox);
        self.inner.ticks.send_modify(|count| *count += 1);
        tracing::info!("Audio engine shut down ({} handle(s) stopped)", stopped);
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.state.lock().shut_down
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_system::clock::ManualClock;
    use crate::audio_system::virtual_output::VirtualBackend;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const FRAME: Duration = Duration::from_millis(16);

    fn engine() -> (AudioEngine, VirtualBackend, ManualClock) {
        let backend = VirtualBackend::new();
        let clock = ManualClock::new();
        let engine = AudioEngine::with_clock(backend.clone(), Arc::new(clock.clone()));
        (engine, backend, clock)
    }

    fn clip(name: &str) -> AudioClip {
        AudioClip::silent(name, Duration::from_secs(1))
    }

    fn step(engine: &AudioEngine, clock: &ManualClock) {
        clock.advance(FRAME);
        engine.tick(Frame::new(FRAME));
    }

    #[test]
    fn test_new_handles_are_pending_until_tick() {
        let (engine, _backend, clock) = engine();
        engine.play_effect(clip("a")).unwrap();
        assert_eq!(engine.active_count(), 0);

        step(&engine, &clock);
        assert_eq!(engine.active_count(), 1);
    }

    #[test]
    fn test_stopped_handles_are_pruned() {
        let (engine, _backend, clock) = engine();
        let handle = engine.play_effect(clip("a")).unwrap();
        step(&engine, &clock);

        handle.stop().unwrap();
        assert_eq!(engine.active_count(), 0);
        step(&engine, &clock);
        assert!(engine.handles().is_empty());
        assert_eq!(handle.state(), HandleState::Stop);
    }

    #[test]
    fn test_stop_all_filters_by_category() {
        let (engine, _backend, clock) = engine();
        let music = engine.play_music(clip("m")).unwrap();
        let effect = engine.play_effect(clip("e")).unwrap();
        step(&engine, &clock);

        let stopped = engine.stop_matching(
            &HandleFilter::all().in_category(AudioCategory::Effect),
            Duration::ZERO,
        );
        assert_eq!(stopped, 1);
        assert!(effect.is_stopped());
        assert!(music.is_playing());
    }

    #[test]
    fn test_bulk_skips_waiting_handles() {
        let (engine, _backend, clock) = engine();
        let waiting = engine
            .prepare(AudioCategory::Effect, clip("w"), PlaybackSettings::default())
            .unwrap();
        engine.play_effect(clip("p")).unwrap();
        step(&engine, &clock);

        assert_eq!(engine.stop_all(), 1);
        assert_eq!(waiting.state(), HandleState::Wait);
    }

    #[test]
    fn test_pause_and_unpause_by_clip() {
        let (engine, _backend, clock) = engine();
        let shared = clip("loop");
        let a = engine.play_effect(shared.clone()).unwrap();
        let b = engine.play_effect(clip("other")).unwrap();
        step(&engine, &clock);

        let filter = HandleFilter::all().with_clip(&shared);
        assert_eq!(engine.pause_matching(&filter, Duration::ZERO), 1);
        assert!(a.is_paused());
        assert!(b.is_playing());

        assert_eq!(engine.unpause_matching(&filter, Duration::ZERO), 1);
        assert!(a.is_playing());
    }

    #[test]
    fn test_queries_by_id() {
        let (engine, _backend, clock) = engine();
        engine
            .play(
                AudioCategory::Effect,
                clip("a"),
                PlaybackSettings::new().with_id("footsteps"),
            )
            .unwrap();
        engine.play_effect(clip("b")).unwrap();
        step(&engine, &clock);

        let found = engine.handles_by_id("footsteps");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id().as_deref(), Some("footsteps"));
        assert_eq!(engine.handles_in(AudioCategory::Effect).len(), 2);
        assert_eq!(engine.active_count_in(AudioCategory::Music), 0);
    }

    #[test]
    fn test_channel_stats_balance() {
        let (engine, backend, clock) = engine();
        let a = engine.play_effect(clip("a")).unwrap();
        let _b = engine.play_effect(clip("b")).unwrap();
        step(&engine, &clock);
        a.stop().unwrap();

        let stats = engine.channel_stats(AudioCategory::Effect);
        assert_eq!(stats.allocated, 2);
        assert_eq!(stats.idle, 1);
        assert_eq!(stats.in_use, 1);
        assert_eq!(stats.allocated, stats.idle + stats.in_use);

        engine.play_effect(clip("c")).unwrap();
        assert_eq!(backend.created_count(), 2);
    }

    #[test]
    fn test_callback_may_reenter_engine() {
        let (engine, backend, clock) = engine();
        let handle = engine.play_effect(clip("a")).unwrap();
        let inner = engine.clone();
        let spawned = Arc::new(AtomicUsize::new(0));
        let counter = spawned.clone();
        handle
            .on_complete(move || {
                inner.play_effect(clip("follow-up")).unwrap();
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        step(&engine, &clock);
        backend.finish_all();
        step(&engine, &clock);

        assert_eq!(spawned.load(Ordering::SeqCst), 1);
        step(&engine, &clock);
        assert_eq!(engine.active_count(), 1);
    }

    #[test]
    fn test_events_are_published() {
        let (engine, _backend, clock) = engine();
        let (rx, _id) = engine.subscribe();
        let handle = engine.play_effect(clip("a")).unwrap();
        step(&engine, &clock);
        handle.stop().unwrap();

        let events: Vec<EngineEvent> = rx.try_iter().collect();
        assert!(matches!(events[0], EngineEvent::HandleStarted { .. }));
        assert!(matches!(events[1], EngineEvent::HandleStopped { .. }));
    }

    #[test]
    fn test_shutdown_stops_everything() {
        let (engine, _backend, clock) = engine();
        let handle = engine.play_music(clip("a")).unwrap();
        step(&engine, &clock);

        engine.shutdown();
        assert!(engine.is_shut_down());
        assert!(handle.is_stopped());
        assert_eq!(engine.channel_stats(AudioCategory::Music).idle, 0);
        assert!(matches!(
            engine.play_music(clip("b")),
            Err(AudioError::EngineShutDown)
        ));
    }

    #[test]
    fn test_dropped_engine_fails_handle_calls() {
        let (engine, _backend, _clock) = engine();
        let handle = engine.play_effect(clip("a")).unwrap();
        drop(engine);

        assert!(matches!(handle.stop(), Err(AudioError::EngineShutDown)));
        assert_eq!(handle.state(), HandleState::Stop);
    }

    #[test]
    fn test_apply_config() {
        let (engine, _backend, _clock) = engine();
        let mut config = EngineConfig::default();
        config.set_category_volume(AudioCategory::Music, 0.3);
        config.set_default_route(AudioCategory::Effect, Some("sfx".to_string()));

        engine.apply_config(&config);
        assert!((engine.category_volume(AudioCategory::Music) - 0.3).abs() < 1e-6);
        assert_eq!(engine.default_route(AudioCategory::Effect).as_deref(), Some("sfx"));
    }
}
