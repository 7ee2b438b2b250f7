use crate::decoder::Decoder;
use crate::pending::{PendingRequest, ResultTable};
use crate::session::SessionId;
use crate::world::EntityId;
use std::collections::HashSet;

/// What an entity is doing with its voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SayState {
    /// Never spoke, or its last line was stopped
    Idle,
    /// A line is waiting on its decoder
    Decoding,
    Speaking,
    /// The last line played to its end
    Finished,
}

impl SayState {
    pub fn is_done(self) -> bool {
        matches!(self, SayState::Idle | SayState::Finished)
    }
}

/// A voice line bound to a running stream.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceLine {
    pub session: SessionId,
    /// `None` for lines spoken by nobody in particular (narration)
    pub entity: Option<EntityId>,
    pub name: String,
}

/// Speech per entity.
///
/// A line moves from pending (decoder being opened) to queued (stream started this tick) to
/// active. The queued stage exists so the entity's previous line is retired in the same sweep
/// that promotes the new one.
#[derive(Default)]
pub struct Voices {
    pending: Vec<PendingRequest<SessionId>>,
    queued: Vec<VoiceLine>,
    active: Vec<VoiceLine>,
    finished: HashSet<Option<EntityId>>,
    results: ResultTable<SessionId, Box<dyn Decoder>>,
}

impl Voices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn results(&self) -> ResultTable<SessionId, Box<dyn Decoder>> {
        self.results.clone()
    }

    pub fn add_pending(&mut self, request: PendingRequest<SessionId>) {
        self.finished.remove(&request.entity);
        self.pending.push(request);
    }

    pub fn pending_for(
        &self,
        entity: Option<EntityId>,
    ) -> impl Iterator<Item = &PendingRequest<SessionId>> + '_ {
        self.pending
            .iter()
            .filter(move |request| request.entity == entity)
    }

    /// Takes every pending request; unresolved ones are handed back with
    /// [`add_pending`](Self::add_pending).
    pub fn take_pending(&mut self) -> Vec<PendingRequest<SessionId>> {
        std::mem::take(&mut self.pending)
    }

    pub fn push_queued(&mut self, line: VoiceLine) {
        self.queued.push(line);
    }

    /// Moves queued lines to active and returns the lines they replace.
    pub fn promote_queued(&mut self) -> Vec<VoiceLine> {
        let mut retired = Vec::new();
        for line in std::mem::take(&mut self.queued) {
            if let Some(index) = self.active.iter().position(|a| a.entity == line.entity) {
                retired.push(self.active.swap_remove(index));
            }
            self.active.push(line);
        }
        retired
    }

    pub fn active(&self) -> &[VoiceLine] {
        &self.active
    }

    /// The newest line of `entity`, queued or active.
    pub fn line_for(&self, entity: Option<EntityId>) -> Option<&VoiceLine> {
        self.queued
            .iter()
            .rev()
            .chain(self.active.iter())
            .find(|line| line.entity == entity)
    }

    /// Removes a line that ended on its own.
    pub fn finish_active(&mut self, session: SessionId) -> Option<VoiceLine> {
        let index = self.active.iter().position(|line| line.session == session)?;
        let line = self.active.swap_remove(index);
        self.finished.insert(line.entity);
        Some(line)
    }

    /// Removes every queued and active line of `entity`.
    pub fn remove_lines_for(&mut self, entity: Option<EntityId>) -> Vec<VoiceLine> {
        self.finished.remove(&entity);
        let (mut removed, queued): (Vec<VoiceLine>, Vec<VoiceLine>) =
            std::mem::take(&mut self.queued)
                .into_iter()
                .partition(|line| line.entity == entity);
        let (active_removed, active): (Vec<VoiceLine>, Vec<VoiceLine>) =
            std::mem::take(&mut self.active)
                .into_iter()
                .partition(|line| line.entity == entity);
        self.queued = queued;
        self.active = active;
        removed.extend(active_removed);
        removed
    }

    /// Every entity with a line pending, queued or active.
    pub fn speakers(&self) -> Vec<EntityId> {
        let mut speakers: Vec<EntityId> = self
            .pending
            .iter()
            .filter_map(|request| request.entity)
            .chain(self.queued.iter().filter_map(|line| line.entity))
            .chain(self.active.iter().filter_map(|line| line.entity))
            .collect();
        speakers.sort();
        speakers.dedup();
        speakers
    }

    pub fn drain_lines(&mut self) -> Vec<VoiceLine> {
        self.finished.clear();
        let mut lines = std::mem::take(&mut self.queued);
        lines.append(&mut self.active);
        lines
    }

    /// State of `entity`'s voice, given which pending sessions are still wanted and which
    /// streams are still audible.
    pub fn state(
        &self,
        entity: Option<EntityId>,
        is_cancelled: impl Fn(SessionId) -> bool,
        is_playing: impl Fn(SessionId) -> bool,
    ) -> SayState {
        let speaking = self
            .queued
            .iter()
            .chain(self.active.iter())
            .any(|line| line.entity == entity && is_playing(line.session));
        if speaking {
            return SayState::Speaking;
        }
        if self
            .pending_for(entity)
            .any(|request| !is_cancelled(request.key))
        {
            return SayState::Decoding;
        }
        if self.finished.contains(&entity) {
            SayState::Finished
        } else {
            SayState::Idle
        }
    }

    pub fn rekey(&mut self, old: EntityId, new: EntityId) {
        for line in self.queued.iter_mut().chain(self.active.iter_mut()) {
            if line.entity == Some(old) {
                line.entity = Some(new);
            }
        }
        for request in self.pending.iter_mut() {
            if request.entity == Some(old) {
                request.entity = Some(new);
            }
        }
        if self.finished.remove(&Some(old)) {
            self.finished.insert(Some(new));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Category, PlayMode};
    use crate::session::{PlaybackParams, SessionKind, SessionPool};

    fn line(pool: &mut SessionPool, entity: u64, name: &str) -> VoiceLine {
        VoiceLine {
            session: pool.allocate(
                SessionKind::Stream,
                PlaybackParams::new(Category::Voice, PlayMode::empty()),
            ),
            entity: Some(EntityId(entity)),
            name: name.to_string(),
        }
    }

    #[test]
    fn promotion_retires_previous_line_of_same_entity() {
        let mut pool = SessionPool::new();
        let mut voices = Voices::new();
        let first = line(&mut pool, 1, "x.mp3");
        let other = line(&mut pool, 2, "z.mp3");
        voices.push_queued(first.clone());
        voices.push_queued(other.clone());
        assert!(voices.promote_queued().is_empty());

        let second = line(&mut pool, 1, "y.mp3");
        voices.push_queued(second.clone());
        let retired = voices.promote_queued();
        assert_eq!(retired, vec![first]);
        assert_eq!(voices.active().len(), 2);
        assert_eq!(voices.line_for(Some(EntityId(1))), Some(&second));
        assert_eq!(voices.line_for(Some(EntityId(2))), Some(&other));
    }

    #[test]
    fn state_distinguishes_finished_from_idle() {
        let mut pool = SessionPool::new();
        let mut voices = Voices::new();
        let npc = Some(EntityId(1));
        assert_eq!(voices.state(npc, |_| false, |_| true), SayState::Idle);

        let spoken = line(&mut pool, 1, "x.mp3");
        voices.push_queued(spoken.clone());
        voices.promote_queued();
        assert_eq!(voices.state(npc, |_| false, |_| true), SayState::Speaking);

        voices.finish_active(spoken.session);
        assert_eq!(voices.state(npc, |_| false, |_| false), SayState::Finished);
        assert!(SayState::Finished.is_done());

        voices.remove_lines_for(npc);
        assert_eq!(voices.state(npc, |_| false, |_| false), SayState::Idle);
    }

    #[test]
    fn rekey_moves_lines() {
        let mut pool = SessionPool::new();
        let mut voices = Voices::new();
        voices.push_queued(line(&mut pool, 1, "x.mp3"));
        voices.rekey(EntityId(1), EntityId(9));
        assert!(voices.line_for(Some(EntityId(1))).is_none());
        assert_eq!(voices.remove_lines_for(Some(EntityId(9))).len(), 1);
        assert!(voices.drain_lines().is_empty());
    }
}
