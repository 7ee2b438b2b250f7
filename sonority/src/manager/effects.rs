use super::SonorityManager;
use crate::asset::AssetId;
use crate::cache::BufferId;
use crate::config::{Category, PlayMode};
use crate::decoder::decode_all;
use crate::error::SonorityError;
use crate::events::SonorityEvent;
use crate::math::Vec3;
use crate::pending::{PendingRequest, Resolution};
use crate::registry::{ActiveSound, PendingSound};
use crate::session::{PlaybackParams, SessionId, SessionKind, SessionState};
use crate::world::EntityId;
use std::sync::Arc;
use std::time::Instant;

/// Per-request settings of an effect.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SoundOptions {
    pub volume: f32,
    pub pitch: f32,
    pub category: Category,
    pub mode: PlayMode,
    /// Start position as a fraction of the sound's length
    pub offset: f32,
}

impl Default for SoundOptions {
    fn default() -> Self {
        Self {
            volume: 1.0,
            pitch: 1.0,
            category: Category::Effect,
            mode: PlayMode::empty(),
            offset: 0.0,
        }
    }
}

impl SoundOptions {
    pub fn volume(mut self, volume: f32) -> Self {
        self.volume = volume;
        self
    }

    pub fn pitch(mut self, pitch: f32) -> Self {
        self.pitch = pitch;
        self
    }

    pub fn category(mut self, category: Category) -> Self {
        self.category = category;
        self
    }

    pub fn mode(mut self, mode: PlayMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn offset(mut self, offset: f32) -> Self {
        self.offset = offset;
        self
    }
}

impl SonorityManager {
    /// Plays `asset` without positioning.
    ///
    /// Returns the session immediately, even while the buffer is still being decoded, or
    /// `None` if the asset is unknown or the output is unavailable.
    pub fn play_sound(
        &mut self,
        asset: impl Into<AssetId>,
        options: SoundOptions,
    ) -> Option<SessionId> {
        if !self.is_output_ready() {
            return None;
        }
        self.issue_effect(None, asset.into(), options, None)
    }

    /// Plays `asset` at `entity`'s position, following it while it moves.
    ///
    /// With [`PlayMode::REMOVE_AT_DISTANCE`], an entity farther than the cull distance from
    /// the listener gets no sound at all. Sounds emitted by the player play without
    /// positioning unless [`PlayMode::NO_PLAYER_LOCAL`] is set.
    pub fn play_sound_3d(
        &mut self,
        entity: EntityId,
        asset: impl Into<AssetId>,
        options: SoundOptions,
    ) -> Option<SessionId> {
        if !self.is_output_ready() {
            return None;
        }
        let Some(position) = self.world.position(entity) else {
            log::debug!("Not playing a sound for missing {}", entity);
            return None;
        };
        if self.is_culled(position, options.mode) {
            return None;
        }

        if self.world.is_player(entity) && !options.mode.contains(PlayMode::NO_PLAYER_LOCAL) {
            self.issue_effect(Some(entity), asset.into(), options, None)
        } else {
            self.issue_effect(Some(entity), asset.into(), options, Some(position))
        }
    }

    /// Plays `asset` at a fixed position.
    pub fn play_sound_3d_at(
        &mut self,
        position: Vec3,
        asset: impl Into<AssetId>,
        options: SoundOptions,
    ) -> Option<SessionId> {
        if !self.is_output_ready() || self.is_culled(position, options.mode) {
            return None;
        }
        self.issue_effect(None, asset.into(), options, Some(position))
    }

    fn is_culled(&self, position: Vec3, mode: PlayMode) -> bool {
        mode.contains(PlayMode::REMOVE_AT_DISTANCE)
            && self.listener.position().distance(position) > self.desc.cull_distance
    }

    fn issue_effect(
        &mut self,
        entity: Option<EntityId>,
        asset: AssetId,
        options: SoundOptions,
        position: Option<Vec3>,
    ) -> Option<SessionId> {
        let Some(buffer) = self.cache.resolve(&asset, self.catalog.as_ref()) else {
            log::warn!("{}", SonorityError::ResourceNotFound(asset.to_string()));
            return None;
        };

        let mut params = PlaybackParams::new(options.category, options.mode);
        params.base_volume = options.volume;
        params.pitch = options.pitch;
        params.category_volume = self.volumes.effective(options.category);
        params.spatial = position.is_some();
        params.position = position.unwrap_or(Vec3::ZERO);
        let session = self.pool.allocate(SessionKind::Sound, params);
        let offset = options.offset.clamp(0.0, 1.0);

        if self.cache.is_resident(buffer) {
            return self
                .start_effect(session, entity, buffer, offset)
                .then_some(session);
        }

        if !self.sounds.is_loading(buffer) {
            self.queue_load(buffer);
        }
        self.sounds.add_pending(PendingSound {
            session,
            entity,
            buffer,
            offset,
        });
        Some(session)
    }

    fn queue_load(&mut self, buffer: BufferId) {
        let name = self.cache.entry(buffer).resource_name().to_string();
        let provider = Arc::clone(&self.provider);
        let results = self.sounds.results();
        let job_name = name.clone();
        let work = self.worker.submit(move || {
            if results.contains(&buffer) {
                return;
            }
            results.publish(buffer, decode_all(provider.as_ref(), &job_name));
        });
        self.sounds.begin_load(PendingRequest::new(
            buffer,
            None,
            name,
            work,
            self.desc.pending_timeout(),
        ));
    }

    /// Resolves finished buffer loads and starts the effects waiting on them.
    pub(super) fn process_effect_loads(&mut self, now: Instant) {
        let results = self.sounds.results();
        for buffer in self.sounds.loading_buffers() {
            let (name, resolution) = match self.sounds.load(buffer) {
                Some(request) => (request.name.clone(), request.poll(&results, now)),
                None => continue,
            };

            let loaded = match resolution {
                Resolution::Waiting => continue,
                Resolution::Ready(decoded) => {
                    log::debug!("Decoded {} ({:.2?})", name, decoded.duration());
                    match self.cache.install(buffer, self.device.as_mut(), &decoded) {
                        Ok(_) => true,
                        Err(e) => {
                            self.report_load_failure(&name, e);
                            false
                        }
                    }
                }
                Resolution::Failed(e) => {
                    self.report_load_failure(&name, e);
                    false
                }
                Resolution::Dropped => {
                    log::debug!("Load of {} produced nothing", name);
                    self.emit(SonorityEvent::LoadDropped { name });
                    false
                }
            };
            self.sounds.finish_load(buffer);
            self.report_overflow();

            for pending in self.sounds.take_pending_for(buffer) {
                if loaded && !self.pool.is_cancelled(pending.session) {
                    self.start_effect(pending.session, pending.entity, buffer, pending.offset);
                } else {
                    self.discard_effect(pending.session);
                }
            }
        }
    }

    pub(super) fn report_load_failure(&self, name: &str, error: SonorityError) {
        log::warn!("Failed to load {}: {}", name, error);
        self.emit(SonorityEvent::LoadFailed {
            name: name.to_string(),
            error: error.to_string(),
        });
    }

    fn report_overflow(&mut self) {
        if let Some(SonorityError::CacheOverflow { resident, max }) = self.cache.take_overflow() {
            self.emit(SonorityEvent::CacheOverflow { resident, max });
        }
    }

    /// Binds a loading session to its resident buffer and starts it.
    fn start_effect(
        &mut self,
        session: SessionId,
        entity: Option<EntityId>,
        buffer: BufferId,
        offset: f32,
    ) -> bool {
        // One copy of a sound per emitter
        for previous in self.sounds.matching(entity, Some(buffer)) {
            self.device.finish_sound(previous);
        }

        let entry = self.cache.entry(buffer);
        let Some(handle) = entry.handle() else {
            self.discard_effect(session);
            return false;
        };
        let asset = entry.id().clone();
        let (volume, min_distance, max_distance) =
            (entry.volume(), entry.min_distance(), entry.max_distance());

        let Some(state) = self.pool.get_mut(session) else {
            return false;
        };
        state.params.base_volume *= volume;
        state.params.min_distance = min_distance;
        state.params.max_distance = max_distance;
        state.params.category_volume = self.volumes.effective(state.params.category);
        let params = state.params.clone();

        let played = if params.spatial {
            self.device.play_sound_3d(session, &params, handle, offset)
        } else {
            self.device.play_sound(session, &params, handle, offset)
        };
        if !played {
            log::debug!("Device refused to play {}", asset);
            self.discard_effect(session);
            return false;
        }

        self.pool.activate(session);
        if let Some(state) = self.pool.get_mut(session) {
            state.buffer = Some(buffer);
        }
        self.cache.acquire(buffer);
        self.sounds.add_active(ActiveSound {
            session,
            entity,
            buffer,
        });
        self.emit(SonorityEvent::SoundStarted { session, asset });
        true
    }

    fn discard_effect(&mut self, session: SessionId) {
        self.pool.release(session);
        self.forget_ambient(session);
    }

    /// Ends an active effect and drops its hold on the buffer.
    fn retire_effect(&mut self, session: SessionId) {
        self.device.finish_sound(session);
        if let Some(sound) = self.sounds.remove_active(session) {
            self.cache.release(sound.buffer);
        }
        self.pool.release(session);
        self.forget_ambient(session);
        self.emit(SonorityEvent::SoundFinished { session });
    }

    fn forget_ambient(&mut self, session: SessionId) {
        if self.near_water.as_ref().is_some_and(|(s, _)| *s == session) {
            self.near_water = None;
        }
        if self.underwater_sound == Some(session) {
            self.underwater_sound = None;
        }
        if self.region_sound == Some(session) {
            self.region_sound = None;
        }
    }

    /// Follows emitters, culls, fades and reaps finished effects.
    pub(super) fn update_effects(&mut self, dt: f32) {
        let listener = self.listener.position();
        let cull_distance = self.desc.cull_distance;

        for sound in self.sounds.active().to_vec() {
            let Some(state) = self.pool.get_mut(sound.session) else {
                continue;
            };
            let params = &mut state.params;

            if let Some(entity) = sound.entity.filter(|_| params.spatial) {
                if let Some(position) = self.world.position(entity) {
                    params.position = position;
                }
                if params.mode.contains(PlayMode::REMOVE_AT_DISTANCE)
                    && listener.distance(params.position) > cull_distance
                {
                    self.device.finish_sound(sound.session);
                }
            }

            if !self.device.is_sound_playing(sound.session) {
                self.retire_effect(sound.session);
                continue;
            }

            params.update_fade(dt);
            if params.volume_factor <= 0.0 {
                self.retire_effect(sound.session);
                continue;
            }
            self.device.update_sound(sound.session, params);
        }
    }

    /// Stops an effect, or cancels it if it is still loading.
    pub fn stop_sound(&mut self, session: SessionId) {
        if !self.is_output_ready() {
            return;
        }
        match self.pool.state(session) {
            Some(SessionState::Playing) => self.device.finish_sound(session),
            Some(SessionState::Loading) => {
                self.pool.cancel(session);
            }
            _ => {}
        }
    }

    /// Stops `entity`'s copies of `asset`, including ones still loading.
    pub fn stop_sound_3d(&mut self, entity: EntityId, asset: impl Into<AssetId>) {
        if !self.is_output_ready() {
            return;
        }
        let Some(buffer) = self.cache.lookup(&asset.into()) else {
            return;
        };
        self.stop_matching(Some(entity), Some(buffer));
    }

    /// Stops every effect and voice line of `entity`.
    pub fn stop_sound_3d_all(&mut self, entity: EntityId) {
        if !self.is_output_ready() {
            return;
        }
        self.stop_matching(Some(entity), None);
        self.stop_say(Some(entity));
    }

    /// Stops every effect and voice line of entities in the cell `cell_id`.
    ///
    /// Meant for cells being unloaded; the player's sounds keep playing.
    pub fn stop_cell(&mut self, cell_id: &str) {
        if !self.is_output_ready() {
            return;
        }
        let mut entities = self.sounds.emitters();
        entities.extend(self.voices.speakers());
        entities.sort();
        entities.dedup();

        for entity in entities {
            if self.world.is_player(entity) || !self.world.in_cell(entity, cell_id) {
                continue;
            }
            log::debug!("Stopping sounds of {} in unloaded cell {}", entity, cell_id);
            self.stop_sound_3d_all(entity);
        }
    }

    fn stop_matching(&mut self, entity: Option<EntityId>, buffer: Option<BufferId>) {
        for session in self.sounds.matching(entity, buffer) {
            self.device.finish_sound(session);
        }
        for session in self.sounds.pending_matching(entity, buffer) {
            self.pool.cancel(session);
        }
    }

    /// Fades `entity`'s copies of `asset` out over `duration` seconds, then stops them.
    pub fn fade_out_sound_3d(&mut self, entity: EntityId, asset: impl Into<AssetId>, duration: f32) {
        let Some(buffer) = self.cache.lookup(&asset.into()) else {
            return;
        };
        for session in self.sounds.matching(Some(entity), Some(buffer)) {
            if let Some(state) = self.pool.get_mut(session) {
                state.params.start_fade_out(duration);
            }
        }
    }

    /// Whether `entity` (or the 2D channel for `None`) plays or is loading `asset`.
    pub fn get_sound_playing(&self, entity: Option<EntityId>, asset: impl Into<AssetId>) -> bool {
        let Some(buffer) = self.cache.lookup(&asset.into()) else {
            return false;
        };
        let playing = self
            .sounds
            .matching(entity, Some(buffer))
            .into_iter()
            .any(|session| self.device.is_sound_playing(session));
        playing
            || self
                .sounds
                .pending_matching(entity, Some(buffer))
                .into_iter()
                .any(|session| !self.pool.is_cancelled(session))
    }

    /// Whether `session` is still loading or audible.
    pub fn is_sound_playing(&self, session: SessionId) -> bool {
        match self.pool.state(session) {
            Some(SessionState::Loading) => true,
            Some(SessionState::Playing) => self.device.is_sound_playing(session),
            _ => false,
        }
    }

    /// Decodes `asset` into the cache right away.
    pub fn preload_sound(&mut self, asset: impl Into<AssetId>) -> bool {
        if !self.is_output_ready() {
            return false;
        }
        let asset = asset.into();
        let Some(buffer) = self.cache.resolve(&asset, self.catalog.as_ref()) else {
            log::warn!("{}", SonorityError::ResourceNotFound(asset.to_string()));
            return false;
        };
        let loaded = match self.cache.ensure_loaded(
            buffer,
            self.device.as_mut(),
            self.provider.as_ref(),
        ) {
            Ok(_) => true,
            Err(e) => {
                let name = self.cache.entry(buffer).resource_name().to_string();
                self.report_load_failure(&name, e);
                false
            }
        };
        self.report_overflow();
        loaded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::SayState;
    use crate::testing::{DeviceCall, Fixture, provider, test_desc};
    use std::time::Duration;

    fn plays(fixture: &Fixture) -> usize {
        fixture
            .device
            .log()
            .count(|call| matches!(call, DeviceCall::PlaySound { .. }))
    }

    #[test]
    fn effect_returns_handle_before_buffer_is_ready() {
        let mut fixture = Fixture::standard();
        let session = fixture
            .manager
            .play_sound("door", SoundOptions::default())
            .unwrap();
        assert_eq!(
            fixture.manager.sessions().state(session),
            Some(SessionState::Loading)
        );
        assert!(fixture.manager.is_sound_playing(session));

        fixture.manager.update(0.0);
        assert_eq!(
            fixture.manager.sessions().state(session),
            Some(SessionState::Playing)
        );
        assert_eq!(plays(&fixture), 1);
        assert!(fixture.manager.poll_events().iter().any(|event| matches!(
            event,
            SonorityEvent::SoundStarted { session: s, .. } if *s == session
        )));
    }

    #[test]
    fn resident_buffers_start_immediately() {
        let mut fixture = Fixture::standard();
        assert!(fixture.manager.preload_sound("door"));
        let session = fixture
            .manager
            .play_sound("door", SoundOptions::default())
            .unwrap();
        assert_eq!(
            fixture.manager.sessions().state(session),
            Some(SessionState::Playing)
        );
    }

    #[test]
    fn unknown_assets_yield_nothing() {
        let mut fixture = Fixture::standard();
        assert!(fixture
            .manager
            .play_sound("missing", SoundOptions::default())
            .is_none());
        assert!(!fixture.manager.preload_sound("missing"));
    }

    #[test]
    fn distant_culled_sound_is_never_started() {
        let mut fixture = Fixture::standard();
        let far = EntityId(1);
        let near = EntityId(2);
        fixture.world.place(far, Vec3::new(2100.0, 0.0, 0.0));
        fixture.world.place(near, Vec3::new(100.0, 0.0, 0.0));
        let culled = SoundOptions::default().mode(PlayMode::REMOVE_AT_DISTANCE);

        assert!(fixture.manager.play_sound_3d(far, "step", culled).is_none());
        assert!(fixture
            .manager
            .play_sound_3d_at(Vec3::new(0.0, 2100.0, 0.0), "step", culled)
            .is_none());
        assert!(fixture.manager.play_sound_3d(near, "step", culled).is_some());
        assert!(fixture
            .manager
            .play_sound_3d(far, "door", SoundOptions::default())
            .is_some());
        assert_eq!(fixture.manager.sessions().live_count(), 2);
    }

    #[test]
    fn sounds_walking_out_of_range_are_culled() {
        let mut fixture = Fixture::standard();
        let npc = EntityId(1);
        fixture.world.place(npc, Vec3::new(100.0, 0.0, 0.0));
        let session = fixture
            .manager
            .play_sound_3d(
                npc,
                "door",
                SoundOptions::default().mode(PlayMode::LOOP_REMOVE_AT_DISTANCE),
            )
            .unwrap();
        fixture.manager.update(0.0);
        assert!(fixture.manager.is_sound_playing(session));

        fixture.world.place(npc, Vec3::new(3000.0, 0.0, 0.0));
        fixture.manager.update(0.0);
        assert!(fixture.manager.sessions().get(session).is_none());
        assert!(!fixture.manager.get_sound_playing(Some(npc), "door"));
    }

    #[test]
    fn player_sounds_play_locally() {
        let mut fixture = Fixture::standard();
        let player = EntityId(7);
        fixture.world.set_player(player, Vec3::new(5.0, 5.0, 0.0));
        fixture
            .manager
            .play_sound_3d(player, "step", SoundOptions::default());
        fixture.manager.play_sound_3d(
            player,
            "door",
            SoundOptions::default().mode(PlayMode::NO_PLAYER_LOCAL),
        );
        fixture.manager.update(0.0);

        let log = fixture.device.log();
        let spatial: Vec<bool> = log
            .calls
            .iter()
            .filter_map(|call| match call {
                DeviceCall::PlaySound { spatial, .. } => Some(*spatial),
                _ => None,
            })
            .collect();
        assert_eq!(spatial.len(), 2);
        assert_eq!(spatial.iter().filter(|s| **s).count(), 1);
    }

    #[test]
    fn stop_all_covers_pending_and_playing() {
        let mut fixture = Fixture::standard();
        let npc = EntityId(4);
        fixture.world.place(npc, Vec3::new(10.0, 0.0, 0.0));

        fixture
            .manager
            .play_sound_3d(npc, "door", SoundOptions::default());
        fixture.manager.update(0.0);
        fixture
            .manager
            .play_sound_3d(npc, "step", SoundOptions::default());
        assert!(fixture.manager.get_sound_playing(Some(npc), "door"));
        assert!(fixture.manager.get_sound_playing(Some(npc), "step"));

        fixture.manager.stop_sound_3d_all(npc);
        assert!(!fixture.manager.get_sound_playing(Some(npc), "door"));
        assert!(!fixture.manager.get_sound_playing(Some(npc), "step"));

        fixture.manager.update(0.0);
        assert_eq!(plays(&fixture), 1);
        assert_eq!(fixture.manager.sessions().live_count(), 0);
    }

    #[test]
    fn unloading_a_cell_silences_its_entities() {
        let mut fixture = Fixture::standard();
        let guard = EntityId(4);
        let merchant = EntityId(5);
        let player = EntityId(6);
        fixture
            .world
            .place_in_cell(guard, Vec3::new(10.0, 0.0, 0.0), "balmora");
        fixture
            .world
            .place_in_cell(merchant, Vec3::new(20.0, 0.0, 0.0), "caldera");
        fixture.world.set_player(player, Vec3::ZERO);
        fixture.world.state().cells.insert(player, "balmora".into());

        fixture.manager.say(Some(guard), "vo/hello.mp3");
        fixture.manager.say(Some(merchant), "vo/bye.mp3");
        fixture
            .manager
            .play_sound_3d(player, "step", SoundOptions::default().mode(PlayMode::LOOP));
        fixture.manager.update(0.0);
        assert!(fixture.manager.say_active(Some(guard)));

        fixture
            .manager
            .play_sound_3d(guard, "door", SoundOptions::default());
        fixture.manager.stop_cell("balmora");
        assert!(!fixture.manager.get_sound_playing(Some(guard), "door"));
        assert_eq!(fixture.manager.say_state(Some(guard)), SayState::Idle);

        fixture.manager.update(0.0);
        assert_eq!(plays(&fixture), 1);
        assert!(fixture.manager.say_active(Some(merchant)));
        assert!(fixture.manager.get_sound_playing(Some(player), "step"));
        assert_eq!(
            fixture
                .device
                .log()
                .count(|call| matches!(call, DeviceCall::FinishStream(_))),
            1
        );
    }

    #[test]
    fn stop_sound_3d_only_touches_that_asset() {
        let mut fixture = Fixture::standard();
        let npc = EntityId(4);
        let other = EntityId(5);
        fixture.world.place(npc, Vec3::new(10.0, 0.0, 0.0));
        fixture.world.place(other, Vec3::new(20.0, 0.0, 0.0));

        for entity in [npc, other] {
            fixture
                .manager
                .play_sound_3d(entity, "door", SoundOptions::default());
        }
        fixture
            .manager
            .play_sound_3d(npc, "step", SoundOptions::default());
        fixture.manager.update(0.0);

        fixture.manager.stop_sound_3d(npc, "door");
        assert!(!fixture.manager.get_sound_playing(Some(npc), "door"));
        assert!(fixture.manager.get_sound_playing(Some(npc), "step"));
        assert!(fixture.manager.get_sound_playing(Some(other), "door"));
    }

    #[test]
    fn use_count_tracks_bound_sessions() {
        let mut fixture = Fixture::standard();
        let a = EntityId(1);
        let b = EntityId(2);
        fixture.world.place(a, Vec3::ZERO);
        fixture.world.place(b, Vec3::ZERO);

        let first = fixture
            .manager
            .play_sound_3d(a, "door", SoundOptions::default())
            .unwrap();
        fixture
            .manager
            .play_sound_3d(b, "door", SoundOptions::default());
        fixture.manager.update(0.0);

        let buffer = fixture.manager.cache().lookup(&"door".into()).unwrap();
        assert_eq!(fixture.manager.cache().entry(buffer).use_count(), 2);

        fixture.manager.stop_sound(first);
        fixture.manager.stop_sound(first);
        fixture.manager.update(0.0);
        assert_eq!(fixture.manager.cache().entry(buffer).use_count(), 1);

        fixture.manager.stop_sound_3d_all(b);
        fixture.manager.update(0.0);
        fixture.manager.update(0.0);
        assert_eq!(fixture.manager.cache().entry(buffer).use_count(), 0);
        assert_eq!(
            fixture.manager.cache().unused().collect::<Vec<_>>(),
            vec![buffer]
        );
    }

    #[test]
    fn second_copy_on_same_emitter_replaces_first() {
        let mut fixture = Fixture::standard();
        let first = fixture
            .manager
            .play_sound("door", SoundOptions::default())
            .unwrap();
        fixture.manager.update(0.0);
        let second = fixture
            .manager
            .play_sound("door", SoundOptions::default())
            .unwrap();
        fixture.manager.update(0.0);

        assert!(!fixture.manager.is_sound_playing(first));
        assert!(fixture.manager.is_sound_playing(second));
        let buffer = fixture.manager.cache().lookup(&"door".into()).unwrap();
        assert_eq!(fixture.manager.cache().entry(buffer).use_count(), 1);
    }

    #[test]
    fn cancelled_load_never_plays() {
        let mut fixture = Fixture::standard();
        let session = fixture
            .manager
            .play_sound("door", SoundOptions::default())
            .unwrap();
        fixture.manager.stop_sound(session);
        assert!(!fixture.manager.is_sound_playing(session));
        assert!(!fixture.manager.get_sound_playing(None, "door"));

        fixture.manager.update(0.0);
        assert_eq!(plays(&fixture), 0);
        assert_eq!(fixture.manager.sessions().live_count(), 0);
        let buffer = fixture.manager.cache().lookup(&"door".into()).unwrap();
        assert!(fixture.manager.cache().is_resident(buffer));
    }

    #[test]
    fn concurrent_requests_share_one_load() {
        let mut fixture = Fixture::new(test_desc(), provider());
        let a = EntityId(1);
        let b = EntityId(2);
        fixture.world.place(a, Vec3::ZERO);
        fixture.world.place(b, Vec3::ZERO);
        fixture
            .manager
            .play_sound_3d(a, "door", SoundOptions::default());
        fixture
            .manager
            .play_sound_3d(b, "door", SoundOptions::default());
        fixture.manager.update(0.0);

        let log = fixture.device.log();
        assert_eq!(log.count(|c| matches!(c, DeviceCall::Load(_))), 1);
        assert_eq!(log.count(|c| matches!(c, DeviceCall::PlaySound { .. })), 2);
    }

    #[test]
    fn overdue_load_resolves_in_the_same_tick() {
        let (release, gate) = crossbeam_channel::unbounded::<()>();
        let mut fixture = Fixture::new(
            test_desc(),
            provider().with_gate("fx/door.wav", gate),
        );
        let session = fixture
            .manager
            .play_sound("door", SoundOptions::default())
            .unwrap();

        let releaser = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            drop(release);
        });
        fixture.manager.update(0.0);
        releaser.join().unwrap();

        assert_eq!(
            fixture.manager.sessions().state(session),
            Some(SessionState::Playing)
        );
    }

    #[test]
    fn loads_within_deadline_do_not_block() {
        let (release, gate) = crossbeam_channel::unbounded::<()>();
        let mut fixture = Fixture::new(
            test_desc().async_timeout(Duration::from_secs(60)),
            provider().with_gate("fx/door.wav", gate),
        );
        let session = fixture
            .manager
            .play_sound("door", SoundOptions::default())
            .unwrap();

        fixture.manager.update(0.0);
        assert_eq!(
            fixture.manager.sessions().state(session),
            Some(SessionState::Loading)
        );

        drop(release);
        let started = Instant::now();
        while fixture.manager.sessions().state(session) == Some(SessionState::Loading) {
            assert!(started.elapsed() < Duration::from_secs(5));
            std::thread::sleep(Duration::from_millis(1));
            fixture.manager.update(0.0);
        }
        assert_eq!(
            fixture.manager.sessions().state(session),
            Some(SessionState::Playing)
        );
    }

    #[test]
    fn failed_decode_is_absorbed() {
        let mut fixture = Fixture::standard();
        let session = fixture
            .manager
            .play_sound("broken", SoundOptions::default())
            .unwrap();
        fixture.manager.update(0.0);

        assert!(fixture.manager.sessions().get(session).is_none());
        assert_eq!(plays(&fixture), 0);
        assert!(fixture
            .manager
            .poll_events()
            .iter()
            .any(|event| matches!(event, SonorityEvent::LoadFailed { .. })));
    }

    #[test]
    fn fade_out_stops_the_sound() {
        let mut fixture = Fixture::standard();
        let npc = EntityId(1);
        fixture.world.place(npc, Vec3::ZERO);
        let session = fixture
            .manager
            .play_sound_3d(npc, "door", SoundOptions::default().mode(PlayMode::LOOP))
            .unwrap();
        fixture.manager.update(0.0);

        fixture.manager.fade_out_sound_3d(npc, "door", 0.5);
        fixture.manager.update(0.25);
        let factor = fixture
            .manager
            .sessions()
            .get(session)
            .unwrap()
            .params
            .volume_factor;
        assert!((factor - 0.5).abs() < 1e-5);

        fixture.manager.update(0.25);
        assert!(fixture.manager.sessions().get(session).is_none());
        assert!(fixture.manager.poll_events().iter().any(|event| matches!(
            event,
            SonorityEvent::SoundFinished { session: s } if *s == session
        )));
    }

    #[test]
    fn instant_fade_stops_a_loop() {
        let mut fixture = Fixture::standard();
        let npc = EntityId(1);
        fixture.world.place(npc, Vec3::ZERO);
        let session = fixture
            .manager
            .play_sound_3d(npc, "door", SoundOptions::default().mode(PlayMode::LOOP))
            .unwrap();
        fixture.manager.update(0.0);
        let buffer = fixture.manager.cache().lookup(&"door".into()).unwrap();

        fixture.manager.fade_out_sound_3d(npc, "door", 0.0);
        fixture.manager.update(0.1);
        assert!(fixture.manager.sessions().get(session).is_none());
        assert!(!fixture.manager.get_sound_playing(Some(npc), "door"));
        assert_eq!(fixture.manager.cache().entry(buffer).use_count(), 0);
        assert!(fixture.device.log().calls.contains(&DeviceCall::FinishSound(session)));
    }
}
