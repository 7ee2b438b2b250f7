//! The sound manager: public API plus the per-tick update driver.

mod effects;
mod music;
mod speech;
mod update;

pub use effects::SoundOptions;

use crate::ambient::{AmbientClock, RegionSoundSelector, WaterSoundUpdater};
use crate::asset::{AssetId, SoundCatalog};
use crate::cache::BufferCache;
use crate::config::{Category, CategoryMask, Environment, SonorityDesc};
use crate::decoder::DecoderProvider;
use crate::device::AudioDevice;
use crate::error::Result;
use crate::events::SonorityEvent;
use crate::math::Pose;
use crate::music::MusicPlayer;
use crate::registry::{ActiveSounds, Tracks, Voices};
use crate::session::{SessionId, SessionKind, SessionPool};
use crate::volume::CategoryVolumes;
use crate::worker::WorkQueue;
use crate::world::{AudioListener, EntityId, WorldView};
use crossbeam_channel::{Receiver, Sender, unbounded};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::HashMap;
use std::sync::Arc;

/// Asynchronous audio resource and playback manager.
///
/// `SonorityManager` lives on the application's main thread. Decoding happens on a background
/// worker; everything else, including every call into the [`AudioDevice`], happens on the
/// thread that owns the manager, during API calls and [`update`](Self::update).
///
/// # Lifecycle
///
/// - [`new`](Self::new) initializes the device. If that fails the manager stays usable but
///   every playback call is a no-op.
/// - Call [`update`](Self::update) once per frame.
/// - [`shutdown`](Self::shutdown) (or dropping the manager) stops everything and joins the
///   worker.
pub struct SonorityManager {
    desc: SonorityDesc,
    device: Box<dyn AudioDevice>,
    provider: Arc<dyn DecoderProvider>,
    catalog: Box<dyn SoundCatalog>,
    world: Box<dyn WorldView>,
    output_ready: bool,
    worker: WorkQueue,
    cache: BufferCache,
    pool: SessionPool,
    volumes: CategoryVolumes,
    sounds: ActiveSounds,
    voices: Voices,
    tracks: Tracks,
    music: MusicPlayer,
    region_sounds: RegionSoundSelector,
    water: WaterSoundUpdater,
    ambient_clock: AmbientClock,
    near_water: Option<(SessionId, AssetId)>,
    last_cell: Option<String>,
    underwater_sound: Option<SessionId>,
    region_sound: Option<SessionId>,
    listener: AudioListener,
    paused: HashMap<String, CategoryMask>,
    playback_paused: bool,
    rng: StdRng,
    event_sender: Sender<SonorityEvent>,
    event_receiver: Receiver<SonorityEvent>,
    shut_down: bool,
}

impl SonorityManager {
    /// Creates the manager and initializes `device`.
    ///
    /// # Errors
    ///
    /// Returns [`SonorityError::Configuration`](crate::SonorityError::Configuration) for an
    /// invalid `desc` and [`SonorityError::Io`](crate::SonorityError::Io) if the worker
    /// thread cannot be spawned. A device that fails to initialize is not an error.
    pub fn new(
        desc: SonorityDesc,
        mut device: Box<dyn AudioDevice>,
        provider: Arc<dyn DecoderProvider>,
        catalog: Box<dyn SoundCatalog>,
        world: Box<dyn WorldView>,
    ) -> Result<Self> {
        desc.validate()?;

        let output_ready = match device.init(desc.device_name.as_deref(), desc.hrtf) {
            Ok(()) => {
                log::info!("Audio output initialized");
                true
            }
            Err(e) => {
                log::error!("Failed to initialize audio output, sound disabled: {}", e);
                false
            }
        };

        let worker = WorkQueue::new(desc.worker_threads)?;
        let rng = match desc.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let (event_sender, event_receiver) = unbounded();

        Ok(Self {
            cache: BufferCache::new(desc.buffer_cache_min, desc.buffer_cache_max),
            volumes: CategoryVolumes::new(&desc.volumes),
            region_sounds: RegionSoundSelector::new(desc.region_sounds.clone()),
            water: WaterSoundUpdater::new(desc.water.clone()),
            ambient_clock: AmbientClock::new(desc.ambient_update_interval),
            desc,
            device,
            provider,
            catalog,
            world,
            output_ready,
            worker,
            pool: SessionPool::new(),
            sounds: ActiveSounds::new(),
            voices: Voices::new(),
            tracks: Tracks::new(),
            music: MusicPlayer::new(),
            near_water: None,
            last_cell: None,
            underwater_sound: None,
            region_sound: None,
            listener: AudioListener::default(),
            paused: HashMap::new(),
            playback_paused: false,
            rng,
            event_sender,
            event_receiver,
            shut_down: false,
        })
    }

    pub fn desc(&self) -> &SonorityDesc {
        &self.desc
    }

    /// Whether the device initialized; when `false` every playback call does nothing.
    pub fn is_output_ready(&self) -> bool {
        self.output_ready && !self.shut_down
    }

    pub fn cache(&self) -> &BufferCache {
        &self.cache
    }

    pub fn sessions(&self) -> &SessionPool {
        &self.pool
    }

    pub fn listener(&self) -> &AudioListener {
        &self.listener
    }

    /// Sets the listener pose pushed to the device on the next update.
    pub fn set_listener_pose(&mut self, pose: Pose, underwater: bool) {
        self.listener.pose = pose;
        self.listener.environment = if underwater {
            Environment::Underwater
        } else {
            Environment::Normal
        };
    }

    /// Drains the events produced since the last call.
    pub fn poll_events(&self) -> Vec<SonorityEvent> {
        self.event_receiver.try_iter().collect()
    }

    fn emit(&self, event: SonorityEvent) {
        let _ = self.event_sender.send(event);
    }

    /// Pauses `categories` on behalf of `blocker`, replacing any earlier pause by it.
    pub fn pause_sounds(&mut self, blocker: &str, categories: CategoryMask) {
        if !self.is_output_ready() {
            return;
        }
        if self.paused.get(blocker).is_some_and(|mask| !mask.is_empty()) {
            self.resume_sounds(blocker);
        }
        self.device.pause_sounds(categories);
        self.paused.insert(blocker.to_string(), categories);
    }

    /// Lifts `blocker`'s pause. Categories other blockers still pause stay paused.
    pub fn resume_sounds(&mut self, blocker: &str) {
        if !self.is_output_ready() {
            return;
        }
        self.paused.remove(blocker);
        let held = self
            .paused
            .values()
            .fold(CategoryMask::empty(), |held, mask| held | *mask);
        self.device.resume_sounds(CategoryMask::all() & !held);
    }

    /// Pauses the whole output; updates are skipped until resumed.
    pub fn pause_playback(&mut self) {
        if !self.is_output_ready() || self.playback_paused {
            return;
        }
        self.playback_paused = true;
        self.device.pause_playback();
    }

    pub fn resume_playback(&mut self) {
        if !self.is_output_ready() || !self.playback_paused {
            return;
        }
        self.playback_paused = false;
        self.device.resume_playback();
    }

    pub fn is_playback_paused(&self) -> bool {
        self.playback_paused
    }

    pub fn volumes(&self) -> &CategoryVolumes {
        &self.volumes
    }

    pub fn set_category_volume(&mut self, category: Category, volume: f32) {
        self.volumes.set_level(category, volume);
        self.refresh_volumes();
    }

    pub fn set_master_volume(&mut self, volume: f32) {
        self.volumes.set_master(volume);
        self.refresh_volumes();
    }

    fn refresh_volumes(&mut self) {
        if !self.is_output_ready() {
            return;
        }
        self.device.start_update();
        for id in self.pool.active_ids() {
            let Some(session) = self.pool.get_mut(id) else {
                continue;
            };
            session.params.category_volume = self.volumes.effective(session.params.category);
            match session.kind {
                SessionKind::Sound => self.device.update_sound(id, &session.params),
                SessionKind::Stream => self.device.update_stream(id, &session.params),
            }
        }
        self.device.finish_update();
    }

    /// Moves every sound and voice line of `old` over to `new`.
    pub fn update_entity(&mut self, old: EntityId, new: EntityId) {
        self.sounds.rekey(old, new);
        self.voices.rekey(old, new);
    }

    /// Stops all playback and drops every in-flight request.
    ///
    /// In-flight units are aborted and then waited for, so no late result survives the call.
    pub fn clear(&mut self) {
        if !self.output_ready {
            return;
        }

        let mut requests: Vec<_> = self
            .sounds
            .drain_loads()
            .into_iter()
            .map(|request| request.work)
            .collect();
        requests.extend(self.voices.take_pending().into_iter().map(|r| {
            self.pool.release(r.key);
            r.work
        }));
        if let Some(request) = self.music.take_pending() {
            self.pool.release(request.key);
            requests.push(request.work);
        }
        requests.extend(self.music.take_discarded().into_iter().map(|r| {
            self.pool.release(r.key);
            r.work
        }));
        for work in &requests {
            work.abort();
        }
        for work in &requests {
            work.wait_until_done();
        }

        for pending in self.sounds.take_all_pending() {
            self.pool.release(pending.session);
        }
        for session in self.sounds.sessions() {
            self.device.finish_sound(session);
            if let Some(sound) = self.sounds.remove_active(session) {
                self.cache.release(sound.buffer);
            }
            self.pool.release(session);
        }
        for line in self.voices.drain_lines() {
            self.device.finish_stream(line.session);
            self.pool.release(line.session);
        }
        for session in self.tracks.drain() {
            self.device.finish_stream(session);
            self.pool.release(session);
        }
        if let Some(current) = self.music.take_current() {
            self.device.finish_stream(current.session);
            self.pool.release(current.session);
        }
        self.music.reset();
        self.sounds.results().clear();
        self.voices.results().clear();

        self.near_water = None;
        self.underwater_sound = None;
        self.region_sound = None;
        self.last_cell = None;

        if !self.paused.is_empty() {
            self.paused.clear();
            self.device.resume_sounds(CategoryMask::all());
        }
        if self.playback_paused {
            self.playback_paused = false;
            self.device.resume_playback();
        }
        log::debug!("Cleared all playback");
    }

    /// Stops everything, joins the worker, unloads the cache and closes the device.
    ///
    /// Called automatically on drop; later calls do nothing.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.clear();
        self.worker.shutdown();
        self.cache.clear(self.device.as_mut());
        if self.output_ready {
            self.device.deinit();
        }
        self.shut_down = true;
        log::info!("Sound manager shut down");
    }
}

impl Drop for SonorityManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}
