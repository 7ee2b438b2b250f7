use super::SonorityManager;
use crate::config::{Category, PlayMode};
use crate::decoder::Decoder;
use crate::events::SonorityEvent;
use crate::music::{CurrentMusic, MusicState, Playlist};
use crate::pending::{PendingRequest, Resolution};
use crate::session::{PlaybackParams, SessionId, SessionKind};
use std::sync::Arc;
use std::time::Instant;

impl SonorityManager {
    /// Switches music to the resource `name`.
    ///
    /// A playing title fades out first; the new one is opened once it is silent. Requesting
    /// another title during the fade only replaces what comes next.
    pub fn advance_music(&mut self, name: &str) {
        if !self.is_output_ready() {
            return;
        }

        if let Some(request) = self.music.take_pending() {
            self.pool.cancel(request.key);
            self.music.discard(request);
            self.start_music_load(name);
            return;
        }

        let Some(session) = self.music.current().map(|current| current.session) else {
            self.start_music_load(name);
            return;
        };
        self.music.set_next(name.to_string());
        if !self.music.is_fading() {
            if let Some(state) = self.pool.get_mut(session) {
                state.params.start_fade_out(self.desc.music_fade_out);
            }
            self.music.mark_fading();
        }
    }

    /// Plays `name` from the music directory.
    pub fn stream_music(&mut self, name: &str) {
        let path = format!("{}/{}", self.desc.music_root, name);
        self.advance_music(&path);
    }

    /// Makes the titles under `<music root>/<name>` the active playlist and starts one.
    pub fn play_playlist(&mut self, name: &str) {
        if !self.is_output_ready() || self.music.active_playlist() == Some(name) {
            return;
        }

        if !self.music.has_playlist(name) {
            let dir = format!("{}/{}", self.desc.music_root, name);
            let tracks = self.provider.list(&dir);
            log::debug!("Found {} title(s) in {}", tracks.len(), dir);
            self.music.insert_playlist(name, Playlist::new(tracks));
        }
        if !self.music.activate_playlist(name) {
            log::warn!("Playlist {} has no titles", name);
            return;
        }

        if let Some(title) = self.music.pick_title(&mut self.rng) {
            self.advance_music(&title);
        }
    }

    /// Stops the current title, drops any title waiting to start and leaves the playlist.
    pub fn stop_music(&mut self) {
        if !self.is_output_ready() {
            return;
        }
        if let Some(current) = self.music.take_current() {
            self.end_music(current);
        }
        if let Some(request) = self.music.take_pending() {
            self.pool.cancel(request.key);
            self.music.discard(request);
        }
        self.music.take_next();
        self.music.clear_playlist();
    }

    /// Whether a title is playing or about to.
    pub fn is_music_playing(&self) -> bool {
        let loading = self
            .music
            .pending()
            .is_some_and(|request| !self.pool.is_cancelled(request.key));
        loading
            || self
                .music
                .current()
                .is_some_and(|current| self.device.is_stream_playing(current.session))
    }

    pub fn music_state(&self) -> MusicState {
        self.music.state()
    }

    fn start_music_load(&mut self, name: &str) {
        let mut params = PlaybackParams::new(Category::Music, PlayMode::NO_ENV);
        params.category_volume = self.volumes.effective(Category::Music);
        let session = self.pool.allocate(SessionKind::Stream, params);

        let provider = Arc::clone(&self.provider);
        let results = self.music.results();
        let job_name = name.to_string();
        let work = self.worker.submit(move || {
            results.publish(session, provider.open(&job_name));
        });
        log::info!("Playing {}", name);
        self.music.set_pending(PendingRequest::new(
            session,
            None,
            name,
            work,
            self.desc.pending_timeout(),
        ));
    }

    fn end_music(&mut self, current: CurrentMusic) {
        self.device.finish_stream(current.session);
        self.pool.release(current.session);
        self.emit(SonorityEvent::MusicFinished {
            session: current.session,
            name: current.name,
        });
    }

    pub(super) fn update_music(&mut self, dt: f32, now: Instant) {
        let results = self.music.results();

        for request in self.music.take_discarded() {
            if request.work.is_done() {
                results.take(&request.key);
                self.pool.release(request.key);
            } else {
                self.music.discard(request);
            }
        }

        if let Some(request) = self.music.take_pending() {
            let session = request.key;
            match request.poll(&results, now) {
                Resolution::Waiting => self.music.set_pending(request),
                Resolution::Ready(decoder) => self.start_music_stream(session, request.name, decoder),
                Resolution::Failed(e) => {
                    self.report_load_failure(&request.name, e);
                    self.pool.release(session);
                }
                Resolution::Dropped => {
                    self.emit(SonorityEvent::LoadDropped { name: request.name });
                    self.pool.release(session);
                }
            }
        }

        if let Some(current) = self.music.current().cloned() {
            let ended = if !self.device.is_stream_playing(current.session) {
                true
            } else if self.music.is_fading() {
                match self.pool.get_mut(current.session) {
                    Some(state) => {
                        state.params.update_fade(dt);
                        self.device.update_stream(current.session, &state.params);
                        state.params.volume_factor <= 0.0
                    }
                    None => true,
                }
            } else {
                false
            };
            if ended {
                self.music.take_current();
                self.end_music(current);
            }
        }

        if self.music.current().is_none() && self.music.pending().is_none() {
            if let Some(next) = self.music.take_next() {
                self.start_music_load(&next);
            } else if self.desc.music_enabled {
                if let Some(title) = self.music.pick_title(&mut self.rng) {
                    self.start_music_load(&title);
                }
            }
        }
    }

    fn start_music_stream(&mut self, session: SessionId, name: String, decoder: Box<dyn Decoder>) {
        if self.pool.is_cancelled(session) {
            self.pool.release(session);
            return;
        }
        if let Some(previous) = self.music.take_current() {
            self.end_music(previous);
        }

        let Some(state) = self.pool.get_mut(session) else {
            return;
        };
        state.params.category_volume = self.volumes.effective(Category::Music);
        if !self.device.stream_sound(decoder, session, &state.params) || !self.pool.activate(session) {
            log::warn!("Failed to stream {}", name);
            self.pool.release(session);
            return;
        }

        self.music.set_current(session, name.clone());
        self.emit(SonorityEvent::MusicStarted { session, name });
    }

    /// Streams `decoder` as an independent track, without positioning or crossfade.
    pub fn play_track(&mut self, decoder: Box<dyn Decoder>, category: Category) -> Option<SessionId> {
        if !self.is_output_ready() {
            return None;
        }
        let mut params = PlaybackParams::new(category, PlayMode::NO_ENV);
        params.category_volume = self.volumes.effective(category);
        let session = self.pool.allocate(SessionKind::Stream, params.clone());

        if !self.device.stream_sound(decoder, session, &params) {
            self.pool.release(session);
            return None;
        }
        self.pool.activate(session);
        self.tracks.push(session);
        Some(session)
    }

    pub fn stop_track(&mut self, session: SessionId) {
        if self.tracks.remove(session) {
            self.device.finish_stream(session);
            self.pool.release(session);
        }
    }

    /// Seconds between what the track decoded and what is audible.
    pub fn track_time_delay(&self, session: SessionId) -> f32 {
        if self.tracks.contains(session) {
            self.device.get_stream_delay(session)
        } else {
            0.0
        }
    }

    pub(super) fn update_tracks(&mut self, dt: f32) {
        for session in self.tracks.sessions().to_vec() {
            if !self.device.is_stream_playing(session) {
                self.stop_track(session);
                continue;
            }
            if let Some(state) = self.pool.get_mut(session) {
                state.params.update_fade(dt);
                self.device.update_stream(session, &state.params);
            }
        }
    }
}
