//! Music state: the current stream, the load in flight, the queued next title and playlists.

mod playlist;

pub use playlist::Playlist;

use crate::decoder::Decoder;
use crate::pending::{PendingRequest, ResultTable};
use crate::session::SessionId;
use rand::Rng;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MusicState {
    Idle,
    /// A title is loading or playing at full volume
    Streaming,
    /// The current title fades out; the next one starts when it is silent
    CrossfadingOut,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CurrentMusic {
    pub session: SessionId,
    pub name: String,
}

/// The single music stream of the process.
///
/// At most one title is current and at most one load is in flight, never both: a new load is
/// only issued once the current title has ended or faded to silence.
#[derive(Default)]
pub struct MusicPlayer {
    current: Option<CurrentMusic>,
    fading: bool,
    pending: Option<PendingRequest<SessionId>>,
    discarded: Vec<PendingRequest<SessionId>>,
    next: Option<String>,
    last_played: Option<String>,
    playlist: Option<String>,
    playlists: HashMap<String, Playlist>,
    results: ResultTable<SessionId, Box<dyn Decoder>>,
}

impl MusicPlayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn results(&self) -> ResultTable<SessionId, Box<dyn Decoder>> {
        self.results.clone()
    }

    pub fn state(&self) -> MusicState {
        match (&self.current, &self.pending) {
            (None, None) => MusicState::Idle,
            (Some(_), _) if self.fading => MusicState::CrossfadingOut,
            _ => MusicState::Streaming,
        }
    }

    pub fn current(&self) -> Option<&CurrentMusic> {
        self.current.as_ref()
    }

    pub fn set_current(&mut self, session: SessionId, name: String) {
        self.last_played = Some(name.clone());
        self.current = Some(CurrentMusic { session, name });
        self.fading = false;
    }

    pub fn take_current(&mut self) -> Option<CurrentMusic> {
        self.fading = false;
        self.current.take()
    }

    pub fn is_fading(&self) -> bool {
        self.fading
    }

    pub fn mark_fading(&mut self) {
        self.fading = true;
    }

    pub fn pending(&self) -> Option<&PendingRequest<SessionId>> {
        self.pending.as_ref()
    }

    pub fn set_pending(&mut self, request: PendingRequest<SessionId>) {
        self.pending = Some(request);
    }

    pub fn take_pending(&mut self) -> Option<PendingRequest<SessionId>> {
        self.pending.take()
    }

    /// Keeps a superseded load around until its unit finishes, so its result is consumed.
    pub fn discard(&mut self, request: PendingRequest<SessionId>) {
        request.abort();
        self.discarded.push(request);
    }

    pub fn take_discarded(&mut self) -> Vec<PendingRequest<SessionId>> {
        std::mem::take(&mut self.discarded)
    }

    pub fn next(&self) -> Option<&str> {
        self.next.as_deref()
    }

    pub fn set_next(&mut self, name: String) {
        self.next = Some(name);
    }

    pub fn take_next(&mut self) -> Option<String> {
        self.next.take()
    }

    pub fn last_played(&self) -> Option<&str> {
        self.last_played.as_deref()
    }

    pub fn active_playlist(&self) -> Option<&str> {
        self.playlist.as_deref()
    }

    pub fn has_playlist(&self, name: &str) -> bool {
        self.playlists.contains_key(name)
    }

    pub fn insert_playlist(&mut self, name: &str, playlist: Playlist) {
        self.playlists.insert(name.to_string(), playlist);
    }

    /// Makes `name` the active playlist. Returns `false` if it is unknown or empty.
    pub fn activate_playlist(&mut self, name: &str) -> bool {
        match self.playlists.get(name) {
            Some(playlist) if !playlist.is_empty() => {
                self.playlist = Some(name.to_string());
                true
            }
            _ => false,
        }
    }

    pub fn clear_playlist(&mut self) {
        self.playlist = None;
    }

    /// Picks the next title of the active playlist.
    pub fn pick_title<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<String> {
        let name = self.playlist.as_ref()?;
        let playlist = self.playlists.get_mut(name)?;
        playlist.pick(rng, self.last_played.as_deref())
    }

    /// Forgets everything but the discovered playlists.
    pub fn reset(&mut self) {
        self.current = None;
        self.fading = false;
        self.pending = None;
        self.discarded.clear();
        self.next = None;
        self.playlist = None;
        self.results.clear();
    }
}
