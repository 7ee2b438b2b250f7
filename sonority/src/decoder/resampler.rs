use crate::error::{Result, SonorityError};
use rubato::{FastFixedIn, FftFixedIn, PolynomialDegree, Resampler};

fn check_format(source_sample_rate: u32, target_sample_rate: u32, channels: u16) -> Result<()> {
    if source_sample_rate == 0 || target_sample_rate == 0 {
        return Err(SonorityError::DecodeFailure(
            "Sample rates must be greater than 0".to_string(),
        ));
    }
    if channels == 0 {
        return Err(SonorityError::DecodeFailure(
            "Channel count must be greater than 0".to_string(),
        ));
    }
    Ok(())
}

fn deinterleave(samples: &[f32], channels: usize) -> Vec<Vec<f32>> {
    let frames = samples.len() / channels;
    let mut waves = vec![Vec::with_capacity(frames); channels];
    for frame in samples.chunks_exact(channels) {
        for (wave, sample) in waves.iter_mut().zip(frame) {
            wave.push(*sample);
        }
    }
    waves
}

fn interleave(waves: &[Vec<f32>], frames: usize, out: &mut Vec<f32>) {
    for frame_idx in 0..frames {
        for wave in waves {
            out.push(wave.get(frame_idx).copied().unwrap_or(0.0));
        }
    }
}

/// Offline resampler for whole decoded buffers.
pub struct BatchResampler {
    source_sample_rate: u32,
    target_sample_rate: u32,
    channels: u16,
    chunk_size: usize,
}

impl BatchResampler {
    pub fn new(
        source_sample_rate: u32,
        target_sample_rate: u32,
        channels: u16,
        chunk_size: Option<usize>,
    ) -> Result<Self> {
        check_format(source_sample_rate, target_sample_rate, channels)?;
        Ok(Self {
            source_sample_rate,
            target_sample_rate,
            channels,
            chunk_size: chunk_size.unwrap_or(1024),
        })
    }

    /// Resamples interleaved audio and returns interleaved audio at the target rate.
    ///
    /// The output is trimmed to `frames * target / source` so the zero padding of the last
    /// chunk does not lengthen the sound.
    pub fn resample_interleaved(&self, samples: &[f32]) -> Result<Vec<f32>> {
        if self.source_sample_rate == self.target_sample_rate {
            return Ok(samples.to_vec());
        }

        let channels = self.channels as usize;
        let input_frames = samples.len() / channels;
        let expected_frames = (input_frames as u64 * self.target_sample_rate as u64
            / self.source_sample_rate as u64) as usize;

        let mut resampler = FftFixedIn::<f32>::new(
            self.source_sample_rate as usize,
            self.target_sample_rate as usize,
            self.chunk_size,
            2, // sub_chunks
            channels,
        )
        .map_err(|e| SonorityError::DecodeFailure(format!("Failed to create resampler: {}", e)))?;

        let waves = deinterleave(samples, channels);
        let mut output: Vec<Vec<f32>> = vec![Vec::with_capacity(expected_frames); channels];
        let mut input_index = 0;

        while input_index < input_frames {
            let take = (input_frames - input_index).min(self.chunk_size);
            let chunk: Vec<Vec<f32>> = waves
                .iter()
                .map(|wave| {
                    let mut padded = vec![0.0f32; self.chunk_size];
                    padded[..take].copy_from_slice(&wave[input_index..input_index + take]);
                    padded
                })
                .collect();

            let waves_out = resampler
                .process(&chunk, None)
                .map_err(|e| SonorityError::DecodeFailure(format!("Resampling error: {}", e)))?;
            for (out, wave) in output.iter_mut().zip(waves_out) {
                out.extend_from_slice(&wave);
            }

            input_index += take;
        }

        // FFT resamplers delay their output; drop the leading latency before trimming.
        let delay = resampler.output_delay();
        for wave in output.iter_mut() {
            let start = delay.min(wave.len());
            wave.drain(..start);
        }

        let frames = output
            .iter()
            .map(Vec::len)
            .min()
            .unwrap_or(0)
            .min(expected_frames);
        let mut interleaved = Vec::with_capacity(frames * channels);
        interleave(&output, frames, &mut interleaved);
        Ok(interleaved)
    }

    pub fn resample_ratio(&self) -> f64 {
        self.target_sample_rate as f64 / self.source_sample_rate as f64
    }
}

/// Real-time resampler for streamed audio.
///
/// Accepts interleaved blocks of any length, buffers them into the fixed input chunks the
/// underlying resampler needs, and returns whatever output became available.
pub struct StreamResampler {
    resampler: FastFixedIn<f32>,
    channels: usize,
    chunk_frames: usize,
    pending: Vec<Vec<f32>>,
}

impl StreamResampler {
    pub fn new(
        source_sample_rate: u32,
        target_sample_rate: u32,
        channels: u16,
        chunk_frames: usize,
    ) -> Result<Self> {
        check_format(source_sample_rate, target_sample_rate, channels)?;

        // target/source (output/input)
        let ratio = target_sample_rate as f64 / source_sample_rate as f64;

        log::debug!(
            "Creating stream resampler: {} Hz -> {} Hz ({} frame chunks)",
            source_sample_rate,
            target_sample_rate,
            chunk_frames
        );

        let resampler = FastFixedIn::new(
            ratio,
            1.0, // fixed ratio
            PolynomialDegree::Septic,
            chunk_frames,
            channels as usize,
        )
        .map_err(|e| {
            SonorityError::DecodeFailure(format!("Failed to create stream resampler: {}", e))
        })?;

        Ok(Self {
            resampler,
            channels: channels as usize,
            chunk_frames,
            pending: vec![Vec::with_capacity(chunk_frames); channels as usize],
        })
    }

    /// Feeds interleaved input and returns interleaved output produced so far.
    pub fn push(&mut self, samples: &[f32]) -> Result<Vec<f32>> {
        for (wave, channel) in self
            .pending
            .iter_mut()
            .zip(deinterleave(samples, self.channels))
        {
            wave.extend(channel);
        }

        let mut out = Vec::new();
        while self.pending[0].len() >= self.chunk_frames {
            let chunk: Vec<Vec<f32>> = self
                .pending
                .iter_mut()
                .map(|wave| wave.drain(..self.chunk_frames).collect())
                .collect();
            self.process_chunk(&chunk, &mut out)?;
        }
        Ok(out)
    }

    /// Pads and processes whatever input is still buffered.
    pub fn flush(&mut self) -> Result<Vec<f32>> {
        let remaining = self.pending[0].len();
        if remaining == 0 {
            return Ok(Vec::new());
        }

        let chunk: Vec<Vec<f32>> = self
            .pending
            .iter_mut()
            .map(|wave| {
                let mut padded: Vec<f32> = wave.drain(..).collect();
                padded.resize(self.chunk_frames, 0.0);
                padded
            })
            .collect();

        let mut out = Vec::new();
        self.process_chunk(&chunk, &mut out)?;
        Ok(out)
    }

    pub fn reset(&mut self) {
        self.resampler.reset();
        for wave in self.pending.iter_mut() {
            wave.clear();
        }
    }

    fn process_chunk(&mut self, chunk: &[Vec<f32>], out: &mut Vec<f32>) -> Result<()> {
        let waves_out = self.resampler.process(chunk, None).map_err(|e| {
            SonorityError::DecodeFailure(format!("Streaming resampling error: {}", e))
        })?;
        let frames = waves_out.first().map(Vec::len).unwrap_or(0);
        interleave(&waves_out, frames, out);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_same_rate_is_passthrough() {
        let resampler = BatchResampler::new(48000, 48000, 2, None).unwrap();
        let input = vec![0.1, 0.2, 0.3, 0.4];
        assert_eq!(resampler.resample_interleaved(&input).unwrap(), input);
    }

    #[test]
    fn batch_output_length_follows_ratio() {
        let resampler = BatchResampler::new(22050, 44100, 1, Some(512)).unwrap();
        let input: Vec<f32> = (0..4410).map(|i| (i as f32 * 0.01).sin()).collect();
        let output = resampler.resample_interleaved(&input).unwrap();
        assert!(output.len() <= 8820);
        assert!(output.len() > 8000);
    }

    #[test]
    fn rejects_zero_rates() {
        assert!(BatchResampler::new(0, 48000, 2, None).is_err());
        assert!(StreamResampler::new(44100, 48000, 0, 256).is_err());
    }

    #[test]
    fn stream_resampler_buffers_partial_chunks() {
        let mut resampler = StreamResampler::new(44100, 48000, 2, 256).unwrap();
        let short = vec![0.0f32; 100 * 2];
        assert!(resampler.push(&short).unwrap().is_empty());

        let more = vec![0.0f32; 200 * 2];
        let out = resampler.push(&more).unwrap();
        assert!(!out.is_empty());
        assert_eq!(out.len() % 2, 0);

        let tail = resampler.flush().unwrap();
        assert!(!tail.is_empty());
        assert!(resampler.flush().unwrap().is_empty());
    }
}
