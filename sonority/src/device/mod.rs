//! Output device abstraction.
//!
//! The manager never mixes audio itself: it hands buffers, decoders and per-session
//! parameters to an [`AudioDevice`] and asks it what is still playing. [`CpalDevice`] is the
//! built-in implementation.

mod cpal_device;
mod mixer;

use crate::config::{CategoryMask, Environment, HrtfMode};
use crate::decoder::{DecodedSound, Decoder};
use crate::error::Result;
use crate::math::Vec3;
use crate::session::{PlaybackParams, SessionId};
pub use cpal_device::CpalDevice;
pub use mixer::{ListenerState, channel_gains};

/// Opaque handle of decoded data uploaded to a device.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub u64);

/// Low-level audio backend driven by the manager.
///
/// Sessions are addressed by the manager's [`SessionId`]; a device keeps whatever per-session
/// state it needs keyed by it. Calls for unknown sessions are ignored.
pub trait AudioDevice {
    /// Opens the output. `device_name` of `None` selects the host default.
    fn init(&mut self, device_name: Option<&str>, hrtf: HrtfMode) -> Result<()>;

    fn deinit(&mut self);

    fn is_initialized(&self) -> bool;

    /// Names of available output devices.
    fn enumerate(&self) -> Vec<String> {
        Vec::new()
    }

    /// Uploads decoded audio and returns its handle and resident size in bytes.
    fn load_sound(&mut self, sound: &DecodedSound) -> Result<(BufferHandle, usize)>;

    /// Frees an uploaded buffer and returns the bytes released.
    fn unload_sound(&mut self, handle: BufferHandle) -> usize;

    /// Starts a 2D buffer playback. `offset` is the start position as a fraction of the
    /// buffer length.
    fn play_sound(
        &mut self,
        session: SessionId,
        params: &PlaybackParams,
        buffer: BufferHandle,
        offset: f32,
    ) -> bool;

    fn play_sound_3d(
        &mut self,
        session: SessionId,
        params: &PlaybackParams,
        buffer: BufferHandle,
        offset: f32,
    ) -> bool;

    fn finish_sound(&mut self, session: SessionId);

    fn is_sound_playing(&self, session: SessionId) -> bool;

    fn update_sound(&mut self, session: SessionId, params: &PlaybackParams);

    fn stream_sound(
        &mut self,
        decoder: Box<dyn Decoder>,
        session: SessionId,
        params: &PlaybackParams,
    ) -> bool;

    fn stream_sound_3d(
        &mut self,
        decoder: Box<dyn Decoder>,
        session: SessionId,
        params: &PlaybackParams,
    ) -> bool;

    fn finish_stream(&mut self, session: SessionId);

    fn is_stream_playing(&self, session: SessionId) -> bool;

    fn update_stream(&mut self, session: SessionId, params: &PlaybackParams);

    /// Seconds of decoded audio queued ahead of what is audible.
    fn get_stream_delay(&self, session: SessionId) -> f32;

    /// Loudness of the audible part of a stream, `0.0..=1.0`.
    fn get_stream_loudness(&self, session: SessionId) -> f32;

    fn pause_sounds(&mut self, categories: CategoryMask);

    fn resume_sounds(&mut self, categories: CategoryMask);

    fn pause_playback(&mut self);

    fn resume_playback(&mut self);

    /// Opens a batch of per-tick updates.
    fn start_update(&mut self);

    fn update_listener(&mut self, position: Vec3, forward: Vec3, up: Vec3, env: Environment);

    /// Closes the batch opened by [`start_update`](Self::start_update).
    fn finish_update(&mut self);
}
