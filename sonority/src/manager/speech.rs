use super::SonorityManager;
use crate::config::{Category, PlayMode};
use crate::events::SonorityEvent;
use crate::pending::{PendingRequest, Resolution};
use crate::registry::{SayState, VoiceLine};
use crate::session::{PlaybackParams, SessionKind};
use crate::world::EntityId;
use std::sync::Arc;
use std::time::Instant;

impl SonorityManager {
    /// Streams the voice line `name` from `entity`, or as narration for `None`.
    ///
    /// A newer line replaces whatever the entity was saying or about to say.
    pub fn say(&mut self, entity: Option<EntityId>, name: &str) {
        if !self.is_output_ready() {
            return;
        }

        for request in self.voices.pending_for(entity) {
            request.abort();
            self.pool.cancel(request.key);
        }

        let mut params = PlaybackParams::new(Category::Voice, PlayMode::NO_ENV);
        params.category_volume = self.volumes.effective(Category::Voice);
        if let Some(entity) = entity.filter(|e| !self.world.is_player(*e)) {
            let Some(position) = self.world.position(entity) else {
                log::debug!("Not saying {} for missing {}", name, entity);
                return;
            };
            let scale = self.catalog.distance_scale();
            params.mode = PlayMode::empty();
            params.spatial = true;
            params.position = position;
            params.min_distance = scale.default_min * scale.min_multiplier;
            params.max_distance = scale.default_max * scale.max_multiplier;
        }

        let session = self.pool.allocate(SessionKind::Stream, params);
        let provider = Arc::clone(&self.provider);
        let results = self.voices.results();
        let job_name = name.to_string();
        let work = self.worker.submit(move || {
            results.publish(session, provider.open(&job_name));
        });
        self.voices.add_pending(PendingRequest::new(
            session,
            entity,
            name,
            work,
            self.desc.pending_timeout(),
        ));
    }

    /// Starts voice streams whose decoders are open.
    pub(super) fn process_voice_loads(&mut self, now: Instant) {
        let results = self.voices.results();
        for request in self.voices.take_pending() {
            let session = request.key;
            let resolution = request.poll(&results, now);
            if matches!(resolution, Resolution::Waiting) {
                self.voices.add_pending(request);
                continue;
            }
            if self.pool.is_cancelled(session) || self.pool.get(session).is_none() {
                log::debug!("Dropping superseded line {}", request.name);
                self.pool.release(session);
                continue;
            }

            match resolution {
                Resolution::Ready(decoder) => {
                    let Some(state) = self.pool.get_mut(session) else {
                        continue;
                    };
                    if let Some(position) = request
                        .entity
                        .filter(|_| state.params.spatial)
                        .and_then(|entity| self.world.position(entity))
                    {
                        state.params.position = position;
                    }
                    state.params.category_volume = self.volumes.effective(Category::Voice);

                    let started = if state.params.spatial {
                        self.device.stream_sound_3d(decoder, session, &state.params)
                    } else {
                        self.device.stream_sound(decoder, session, &state.params)
                    };
                    if !started || !self.pool.activate(session) {
                        log::debug!("Device refused to stream {}", request.name);
                        self.pool.release(session);
                        continue;
                    }
                    self.voices.push_queued(VoiceLine {
                        session,
                        entity: request.entity,
                        name: request.name.clone(),
                    });
                    self.emit(SonorityEvent::VoiceStarted {
                        session,
                        entity: request.entity,
                        name: request.name,
                    });
                }
                Resolution::Failed(e) => {
                    self.report_load_failure(&request.name, e);
                    self.pool.release(session);
                }
                Resolution::Dropped => {
                    self.emit(SonorityEvent::LoadDropped { name: request.name });
                    self.pool.release(session);
                }
                Resolution::Waiting => {}
            }
        }
    }

    pub(super) fn update_voices(&mut self, dt: f32) {
        for line in self.voices.promote_queued() {
            self.end_line(line);
        }

        for line in self.voices.active().to_vec() {
            if !self.device.is_stream_playing(line.session) {
                self.voices.finish_active(line.session);
                self.end_line(line);
                continue;
            }
            let Some(state) = self.pool.get_mut(line.session) else {
                continue;
            };
            if state.params.spatial {
                if let Some(position) = line.entity.and_then(|e| self.world.position(e)) {
                    state.params.position = position;
                }
            }
            state.params.update_fade(dt);
            self.device.update_stream(line.session, &state.params);
        }
    }

    fn end_line(&mut self, line: VoiceLine) {
        self.device.finish_stream(line.session);
        self.pool.release(line.session);
        self.emit(SonorityEvent::VoiceFinished {
            session: line.session,
            entity: line.entity,
        });
    }

    /// Stops `entity`'s current line and any line still being opened.
    pub fn stop_say(&mut self, entity: Option<EntityId>) {
        if !self.is_output_ready() {
            return;
        }
        for request in self.voices.pending_for(entity) {
            request.abort();
            self.pool.cancel(request.key);
        }
        for line in self.voices.remove_lines_for(entity) {
            self.end_line(line);
        }
    }

    pub fn say_state(&self, entity: Option<EntityId>) -> SayState {
        self.voices.state(
            entity,
            |session| self.pool.is_cancelled(session),
            |session| self.device.is_stream_playing(session),
        )
    }

    /// Whether `entity` has nothing left to say.
    pub fn say_done(&self, entity: Option<EntityId>) -> bool {
        self.say_state(entity).is_done()
    }

    pub fn say_active(&self, entity: Option<EntityId>) -> bool {
        self.say_state(entity) == SayState::Speaking
    }

    /// Current loudness of `entity`'s line, for lip animation.
    pub fn say_loudness(&self, entity: Option<EntityId>) -> f32 {
        self.voices
            .line_for(entity)
            .map(|line| self.device.get_stream_loudness(line.session))
            .unwrap_or(0.0)
    }
}
