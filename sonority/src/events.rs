//! Event types for sonority

use crate::asset::AssetId;
use crate::session::SessionId;
use crate::world::EntityId;

#[derive(Debug, Clone, PartialEq)]
pub enum SonorityEvent {
    SoundStarted {
        session: SessionId,
        asset: AssetId,
    },
    SoundFinished {
        session: SessionId,
    },
    VoiceStarted {
        session: SessionId,
        entity: Option<EntityId>,
        name: String,
    },
    VoiceFinished {
        session: SessionId,
        entity: Option<EntityId>,
    },
    MusicStarted {
        session: SessionId,
        name: String,
    },
    MusicFinished {
        session: SessionId,
        name: String,
    },
    /// A load finished with an error; the request was dropped
    LoadFailed {
        name: String,
        error: String,
    },
    /// A load unit finished without producing a result
    LoadDropped {
        name: String,
    },
    CacheOverflow {
        resident: usize,
        max: usize,
    },
}

impl SonorityEvent {
    pub fn session(&self) -> Option<SessionId> {
        match self {
            Self::SoundStarted { session, .. }
            | Self::SoundFinished { session }
            | Self::VoiceStarted { session, .. }
            | Self::VoiceFinished { session, .. }
            | Self::MusicStarted { session, .. }
            | Self::MusicFinished { session, .. } => Some(*session),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::LoadFailed { .. } | Self::CacheOverflow { .. })
    }

    pub fn is_music_event(&self) -> bool {
        matches!(self, Self::MusicStarted { .. } | Self::MusicFinished { .. })
    }
}
