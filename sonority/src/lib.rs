//! # Sonority
//!
//! An asynchronous audio resource and playback manager for games.
//!
//! Sonority sits between game logic and an output device. The game asks for sounds by
//! catalog id, voice lines and music by resource name; Sonority decodes them on a background
//! worker, caches decoded effects within a byte budget, and drives fades, culling, music
//! transitions and environmental ambience from a per-frame [`update`](SonorityManager::update).
//!
//! ## Quick Start
//!
//! ```no_run
//! use sonority::*;
//! use std::sync::Arc;
//!
//! let catalog = StaticCatalog::new()
//!     .with_sound(SoundRecord::new("door", "sound/fx/door.wav"));
//!
//! let mut manager = SonorityManager::new(
//!     SonorityDesc::default(),
//!     Box::new(CpalDevice::new()),
//!     Arc::new(FileDecoderProvider::new("data")),
//!     Box::new(catalog),
//!     Box::new(EmptyWorld),
//! )?;
//!
//! // Returns right away; the sound starts once its buffer is decoded
//! let door = manager.play_sound("door", SoundOptions::default());
//!
//! manager.say(None, "sound/vo/greeting.mp3");
//! manager.play_playlist("explore");
//!
//! loop {
//!     manager.set_listener_pose(Pose::from_position(Vec3::new(0.0, 0.0, 0.0)), false);
//!     manager.update(1.0 / 60.0);
//!     for event in manager.poll_events() {
//!         if let SonorityEvent::SoundFinished { session } = event {
//!             println!("{} finished", session);
//!         }
//!     }
//!     # break;
//! }
//! # Ok::<(), SonorityError>(())
//! ```
//!
//! ## Key Components
//!
//! - **[`SonorityManager`]**: the public API; owns everything below
//! - **[`AudioDevice`]**: the output backend; [`CpalDevice`] is built in
//! - **[`DecoderProvider`]**: opens decoders by resource name; [`FileDecoderProvider`] reads
//!   files through Symphonia
//! - **[`SoundCatalog`]** and **[`WorldView`]**: game data the manager queries
//! - **[`SonorityEvent`]**: playback notifications drained with
//!   [`poll_events`](SonorityManager::poll_events)
//!
//! ## Threading
//!
//! 1. **Main thread**: owns the manager, issues every device call
//! 2. **Worker thread(s)**: decode effects and open stream decoders
//! 3. **Device threads**: whatever the [`AudioDevice`] runs internally (for [`CpalDevice`],
//!    a mixer thread feeding the output callback through a ring buffer)
//!
//! A request still pending after its deadline (200 ms by default) is waited for inside the
//! next update, so nothing stays pending forever.

pub mod ambient;
pub mod asset;
pub mod cache;
pub mod config;
pub mod decoder;
pub mod device;
pub mod error;
pub mod events;
pub mod manager;
pub mod math;
pub mod music;
pub mod pending;
pub mod registry;
pub mod session;
pub mod volume;
pub mod worker;
pub mod world;

#[cfg(test)]
mod testing;

pub use asset::{AssetId, SoundCatalog, SoundRecord, StaticCatalog};
pub use config::{Category, CategoryMask, Environment, HrtfMode, PlayMode, SonorityDesc};
pub use decoder::{DecoderProvider, FileDecoderProvider};
pub use device::{AudioDevice, CpalDevice};
pub use error::{Result, SonorityError};
pub use events::SonorityEvent;
pub use manager::{SonorityManager, SoundOptions};
pub use math::{Pose, Vec3};
pub use music::MusicState;
pub use registry::SayState;
pub use session::SessionId;
pub use world::{CellInfo, EmptyWorld, EntityId, WorldView};
