use crate::session::SessionId;

/// Independent streams without crossfading, kept in the order they were started.
#[derive(Debug, Default)]
pub struct Tracks {
    streams: Vec<SessionId>,
}

impl Tracks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, session: SessionId) {
        self.streams.push(session);
    }

    pub fn remove(&mut self, session: SessionId) -> bool {
        let before = self.streams.len();
        self.streams.retain(|s| *s != session);
        self.streams.len() != before
    }

    pub fn contains(&self, session: SessionId) -> bool {
        self.streams.contains(&session)
    }

    pub fn sessions(&self) -> &[SessionId] {
        &self.streams
    }

    pub fn drain(&mut self) -> Vec<SessionId> {
        std::mem::take(&mut self.streams)
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}
