mod resampler;
mod symphonia_decoder;

use crate::error::{Result, SonorityError};
pub use resampler::{BatchResampler, StreamResampler};
use std::sync::Arc;
use std::time::Duration;
pub use symphonia_decoder::{FileDecoderProvider, SymphoniaDecoder};

/// Incremental reader of one encoded audio resource.
///
/// Blocks are **INTERLEAVED** f32 samples: `[L0, R0, L1, R1, ...]` for stereo.
pub trait Decoder: Send {
    fn name(&self) -> &str;

    fn sample_rate(&self) -> u32;

    fn channels(&self) -> u16;

    /// Decodes the next block, or returns `Ok(None)` at end of stream.
    fn read_block(&mut self) -> Result<Option<Vec<f32>>>;

    /// Seeks back to the first sample.
    fn rewind(&mut self) -> Result<()>;
}

/// Opens decoders by resource name. Called from worker threads.
pub trait DecoderProvider: Send + Sync {
    /// # Errors
    ///
    /// Returns [`SonorityError::ResourceNotFound`] when no resource has that name and
    /// [`SonorityError::DecodeFailure`] when it exists but cannot be decoded.
    fn open(&self, name: &str) -> Result<Box<dyn Decoder>>;

    /// Resource names directly inside `dir`, sorted. Used to discover playlists.
    fn list(&self, _dir: &str) -> Vec<String> {
        Vec::new()
    }
}

/// A fully decoded sound, ready to be uploaded to a device.
#[derive(Debug, Clone)]
pub struct DecodedSound {
    pub name: String,
    /// Interleaved samples
    pub samples: Arc<[f32]>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl DecodedSound {
    pub fn byte_size(&self) -> usize {
        self.samples.len() * std::mem::size_of::<f32>()
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate.max(1) as f64)
    }
}

/// Opens `name` and decodes it to the end.
pub fn decode_all(provider: &dyn DecoderProvider, name: &str) -> Result<DecodedSound> {
    let mut decoder = provider.open(name)?;
    let mut samples = Vec::new();
    while let Some(block) = decoder.read_block()? {
        samples.extend_from_slice(&block);
    }

    if samples.is_empty() {
        return Err(SonorityError::DecodeFailure(format!(
            "{} contains no audio",
            name
        )));
    }

    log::debug!(
        "Decoded {}: {} samples, {} Hz, {} channels",
        name,
        samples.len(),
        decoder.sample_rate(),
        decoder.channels()
    );

    Ok(DecodedSound {
        name: name.to_string(),
        samples: samples.into(),
        sample_rate: decoder.sample_rate(),
        channels: decoder.channels(),
    })
}

/// Reduces interleaved audio with more than two channels to stereo by keeping the front pair.
pub fn fold_to_stereo(samples: &[f32], channels: u16) -> (Vec<f32>, u16) {
    if channels <= 2 {
        return (samples.to_vec(), channels.max(1));
    }
    let folded = samples
        .chunks(channels as usize)
        .flat_map(|frame| [frame[0], frame.get(1).copied().unwrap_or(0.0)])
        .collect();
    (folded, 2)
}
