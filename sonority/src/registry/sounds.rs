use crate::cache::BufferId;
use crate::decoder::DecodedSound;
use crate::pending::{PendingRequest, ResultTable};
use crate::session::SessionId;
use crate::world::EntityId;
use std::collections::HashMap;

/// An effect bound to a resident buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActiveSound {
    pub session: SessionId,
    /// Emitter; `None` for 2D sounds and sounds placed at a fixed position
    pub entity: Option<EntityId>,
    pub buffer: BufferId,
}

/// An effect waiting for its buffer to be decoded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingSound {
    pub session: SessionId,
    pub entity: Option<EntityId>,
    pub buffer: BufferId,
    pub offset: f32,
}

/// Effects that are playing or waiting on a buffer load.
///
/// Loads are shared: every pending effect on the same buffer waits on one request.
#[derive(Default)]
pub struct ActiveSounds {
    active: Vec<ActiveSound>,
    pending: Vec<PendingSound>,
    loads: HashMap<BufferId, PendingRequest<BufferId>>,
    results: ResultTable<BufferId, DecodedSound>,
}

impl ActiveSounds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table decode jobs publish into.
    pub fn results(&self) -> ResultTable<BufferId, DecodedSound> {
        self.results.clone()
    }

    pub fn active(&self) -> &[ActiveSound] {
        &self.active
    }

    pub fn pending(&self) -> &[PendingSound] {
        &self.pending
    }

    pub fn add_active(&mut self, sound: ActiveSound) {
        self.active.push(sound);
    }

    pub fn add_pending(&mut self, sound: PendingSound) {
        self.pending.push(sound);
    }

    pub fn find(&self, session: SessionId) -> Option<&ActiveSound> {
        self.active.iter().find(|sound| sound.session == session)
    }

    pub fn remove_active(&mut self, session: SessionId) -> Option<ActiveSound> {
        let index = self.active.iter().position(|sound| sound.session == session)?;
        Some(self.active.remove(index))
    }

    pub fn is_loading(&self, buffer: BufferId) -> bool {
        self.loads.contains_key(&buffer)
    }

    pub fn begin_load(&mut self, request: PendingRequest<BufferId>) {
        self.loads.insert(request.key, request);
    }

    /// Buffers with a load in flight, in a stable order.
    pub fn loading_buffers(&self) -> Vec<BufferId> {
        let mut buffers: Vec<BufferId> = self.loads.keys().copied().collect();
        buffers.sort();
        buffers
    }

    pub fn load(&self, buffer: BufferId) -> Option<&PendingRequest<BufferId>> {
        self.loads.get(&buffer)
    }

    pub fn finish_load(&mut self, buffer: BufferId) -> Option<PendingRequest<BufferId>> {
        self.loads.remove(&buffer)
    }

    pub fn drain_loads(&mut self) -> Vec<PendingRequest<BufferId>> {
        self.loads.drain().map(|(_, request)| request).collect()
    }

    /// Removes and returns every pending effect waiting on `buffer`, in request order.
    pub fn take_pending_for(&mut self, buffer: BufferId) -> Vec<PendingSound> {
        let (waiting, rest) = self
            .pending
            .drain(..)
            .partition(|sound| sound.buffer == buffer);
        self.pending = rest;
        waiting
    }

    pub fn take_all_pending(&mut self) -> Vec<PendingSound> {
        std::mem::take(&mut self.pending)
    }

    /// Active sessions of `entity`, optionally restricted to one buffer.
    pub fn matching(&self, entity: Option<EntityId>, buffer: Option<BufferId>) -> Vec<SessionId> {
        self.active
            .iter()
            .filter(|sound| sound.entity == entity)
            .filter(|sound| buffer.is_none_or(|b| b == sound.buffer))
            .map(|sound| sound.session)
            .collect()
    }

    /// Pending sessions of `entity`, optionally restricted to one buffer.
    pub fn pending_matching(
        &self,
        entity: Option<EntityId>,
        buffer: Option<BufferId>,
    ) -> Vec<SessionId> {
        self.pending
            .iter()
            .filter(|sound| sound.entity == entity)
            .filter(|sound| buffer.is_none_or(|b| b == sound.buffer))
            .map(|sound| sound.session)
            .collect()
    }

    /// Every emitter with a playing or pending effect.
    pub fn emitters(&self) -> Vec<EntityId> {
        let mut emitters: Vec<EntityId> = self
            .active
            .iter()
            .filter_map(|sound| sound.entity)
            .chain(self.pending.iter().filter_map(|sound| sound.entity))
            .collect();
        emitters.sort();
        emitters.dedup();
        emitters
    }

    pub fn sessions(&self) -> Vec<SessionId> {
        self.active.iter().map(|sound| sound.session).collect()
    }

    /// Moves every sound emitted by `old` over to `new`.
    pub fn rekey(&mut self, old: EntityId, new: EntityId) {
        for sound in self.active.iter_mut().filter(|s| s.entity == Some(old)) {
            sound.entity = Some(new);
        }
        for sound in self.pending.iter_mut().filter(|s| s.entity == Some(old)) {
            sound.entity = Some(new);
        }
    }
}
