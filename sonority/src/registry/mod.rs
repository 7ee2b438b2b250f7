//! Registries of live playback, one per kind of audio.
//!
//! Registries only hold bookkeeping; the manager decides when sessions start and stop.

mod sounds;
mod tracks;
mod voices;

pub use sounds::{ActiveSound, ActiveSounds, PendingSound};
pub use tracks::Tracks;
pub use voices::{SayState, VoiceLine, Voices};
