//! Playback sessions and the arena that owns them.

use crate::cache::BufferId;
use crate::config::{Category, Environment, PlayMode};
use crate::math::Vec3;

/// Generational handle of a session slot.
///
/// A handle stays valid until its session is released; afterwards the slot may be reused
/// under a new generation and the stale handle simply stops resolving.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId {
    index: u32,
    generation: u32,
}

impl SessionId {
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SessionId({}v{})", self.index, self.generation)
    }
}

/// Everything a device needs to render one playback.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackParams {
    pub position: Vec3,
    /// Fade multiplier, 1.0 until a fade-out starts
    pub volume_factor: f32,
    pub category_volume: f32,
    /// Request volume times asset volume
    pub base_volume: f32,
    pub pitch: f32,
    pub min_distance: f32,
    pub max_distance: f32,
    pub category: Category,
    pub mode: PlayMode,
    pub spatial: bool,
    pub environment: Environment,
    pub fade_out_remaining: f32,
}

impl PlaybackParams {
    pub fn new(category: Category, mode: PlayMode) -> Self {
        Self {
            position: Vec3::ZERO,
            volume_factor: 1.0,
            category_volume: 1.0,
            base_volume: 1.0,
            pitch: 1.0,
            min_distance: 1.0,
            max_distance: 1000.0,
            category,
            mode,
            spatial: false,
            environment: Environment::Normal,
            fade_out_remaining: 0.0,
        }
    }

    pub fn real_volume(&self) -> f32 {
        self.base_volume * self.category_volume * self.volume_factor
    }

    pub fn is_looping(&self) -> bool {
        self.mode.contains(PlayMode::LOOP)
    }

    pub fn uses_environment(&self) -> bool {
        !self.mode.contains(PlayMode::NO_ENV)
    }

    pub fn start_fade_out(&mut self, seconds: f32) {
        if seconds <= 0.0 {
            self.volume_factor = 0.0;
            self.fade_out_remaining = 0.0;
        } else {
            self.fade_out_remaining = seconds;
        }
    }

    pub fn is_fading_out(&self) -> bool {
        self.fade_out_remaining > 0.0
    }

    /// Advances a running fade-out by `dt` seconds.
    ///
    /// The factor decays linearly towards zero and is exactly zero once the fade time is
    /// used up.
    pub fn update_fade(&mut self, dt: f32) {
        if self.fade_out_remaining > 0.0 {
            let step = dt.min(self.fade_out_remaining);
            self.volume_factor *= (self.fade_out_remaining - step) / self.fade_out_remaining;
            self.fade_out_remaining -= step;
        }
    }
}

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting on an async decode or decoder open
    Loading,
    Playing,
    /// Stopped while still loading; the late result is discarded
    LoadCancelled,
}

/// Whether a session renders from a cached buffer or from a live decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    Sound,
    Stream,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub params: PlaybackParams,
    pub state: SessionState,
    pub kind: SessionKind,
    /// Cache entry this session holds a use on, once playing
    pub buffer: Option<BufferId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotTag {
    Free,
    Pending,
    Active,
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    tag: SlotTag,
    session: Option<Session>,
}

/// Arena of sessions addressed by [`SessionId`].
///
/// Slots move `Free -> Pending -> Active -> Free`; released slots are reused.
#[derive(Debug, Default)]
pub struct SessionPool {
    slots: Vec<Slot>,
    free: Vec<u32>,
}

impl SessionPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a `Loading` session in a `Pending` slot.
    pub fn allocate(&mut self, kind: SessionKind, params: PlaybackParams) -> SessionId {
        let session = Session {
            params,
            state: SessionState::Loading,
            kind,
            buffer: None,
        };

        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    tag: SlotTag::Free,
                    session: None,
                });
                (self.slots.len() - 1) as u32
            }
        };

        let slot = &mut self.slots[index as usize];
        slot.tag = SlotTag::Pending;
        slot.session = Some(session);
        SessionId {
            index,
            generation: slot.generation,
        }
    }

    fn slot(&self, id: SessionId) -> Option<&Slot> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation && slot.tag != SlotTag::Free)
    }

    fn slot_mut(&mut self, id: SessionId) -> Option<&mut Slot> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation && slot.tag != SlotTag::Free)
    }

    pub fn get(&self, id: SessionId) -> Option<&Session> {
        self.slot(id).and_then(|slot| slot.session.as_ref())
    }

    pub fn get_mut(&mut self, id: SessionId) -> Option<&mut Session> {
        self.slot_mut(id).and_then(|slot| slot.session.as_mut())
    }

    pub fn tag(&self, id: SessionId) -> SlotTag {
        self.slot(id).map(|slot| slot.tag).unwrap_or(SlotTag::Free)
    }

    pub fn state(&self, id: SessionId) -> Option<SessionState> {
        self.get(id).map(|session| session.state)
    }

    /// Moves a loaded session to `Active`/`Playing`. Cancelled sessions are not activated.
    pub fn activate(&mut self, id: SessionId) -> bool {
        let Some(slot) = self.slot_mut(id) else {
            return false;
        };
        let Some(session) = slot.session.as_mut() else {
            return false;
        };
        if session.state == SessionState::LoadCancelled {
            return false;
        }
        session.state = SessionState::Playing;
        slot.tag = SlotTag::Active;
        true
    }

    /// Marks a loading session as cancelled. Returns `false` if it was not loading.
    pub fn cancel(&mut self, id: SessionId) -> bool {
        match self.get_mut(id) {
            Some(session) if session.state == SessionState::Loading => {
                session.state = SessionState::LoadCancelled;
                true
            }
            _ => false,
        }
    }

    pub fn is_cancelled(&self, id: SessionId) -> bool {
        self.state(id) == Some(SessionState::LoadCancelled)
    }

    /// Frees the slot and returns its session.
    pub fn release(&mut self, id: SessionId) -> Option<Session> {
        let slot = self.slot_mut(id)?;
        slot.tag = SlotTag::Free;
        slot.generation = slot.generation.wrapping_add(1);
        let session = slot.session.take();
        self.free.push(id.index);
        session
    }

    pub fn live_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.tag != SlotTag::Free)
            .count()
    }

    /// Ids of sessions in `Active` slots.
    pub fn active_ids(&self) -> Vec<SessionId> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.tag == SlotTag::Active)
            .map(|(index, slot)| SessionId {
                index: index as u32,
                generation: slot.generation,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn effect() -> PlaybackParams {
        PlaybackParams::new(Category::Effect, PlayMode::empty())
    }

    #[test]
    fn real_volume_multiplies_components() {
        let mut params = effect();
        params.base_volume = 0.5;
        params.category_volume = 0.8;
        params.volume_factor = 0.5;
        assert!((params.real_volume() - 0.2).abs() < 1e-6);
    }

    #[test]
    fn fade_reaches_exactly_zero() {
        let mut params = effect();
        params.start_fade_out(1.0);
        params.update_fade(0.25);
        assert!((params.volume_factor - 0.75).abs() < 1e-6);
        params.update_fade(0.5);
        assert!((params.volume_factor - 0.25).abs() < 1e-5);
        params.update_fade(10.0);
        assert_eq!(params.volume_factor, 0.0);
        assert!(!params.is_fading_out());
    }

    #[test]
    fn zero_length_fade_silences_immediately() {
        let mut params = effect();
        params.start_fade_out(0.0);
        assert_eq!(params.real_volume(), 0.0);
    }

    #[test]
    fn slot_lifecycle() {
        let mut pool = SessionPool::new();
        let id = pool.allocate(SessionKind::Sound, effect());
        assert_eq!(pool.tag(id), SlotTag::Pending);
        assert_eq!(pool.state(id), Some(SessionState::Loading));

        assert!(pool.activate(id));
        assert_eq!(pool.tag(id), SlotTag::Active);
        assert_eq!(pool.active_ids(), vec![id]);

        assert!(pool.release(id).is_some());
        assert_eq!(pool.tag(id), SlotTag::Free);
        assert!(pool.get(id).is_none());
        assert_eq!(pool.live_count(), 0);
    }

    #[test]
    fn released_slots_are_reused_with_new_generation() {
        let mut pool = SessionPool::new();
        let first = pool.allocate(SessionKind::Stream, effect());
        pool.release(first);
        let second = pool.allocate(SessionKind::Stream, effect());
        assert_eq!(first.index(), second.index());
        assert_ne!(first.generation(), second.generation());
        assert!(pool.get(first).is_none());
        assert!(pool.release(first).is_none());
        assert!(pool.get(second).is_some());
    }

    #[test]
    fn cancelled_sessions_do_not_activate() {
        let mut pool = SessionPool::new();
        let id = pool.allocate(SessionKind::Sound, effect());
        assert!(pool.cancel(id));
        assert!(pool.is_cancelled(id));
        assert!(!pool.activate(id));
        assert!(!pool.cancel(id));
    }
}
