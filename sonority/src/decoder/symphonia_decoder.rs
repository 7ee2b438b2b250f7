use crate::decoder::{Decoder, DecoderProvider};
use crate::error::{Result, SonorityError};
use std::fs::File;
use std::path::{Component, Path, PathBuf};
use symphonia::{
    core::{
        audio::SampleBuffer,
        codecs::{Decoder as CodecDecoder, DecoderOptions},
        errors::Error,
        formats::{FormatOptions, FormatReader},
        io::MediaSourceStream,
        meta::MetadataOptions,
        probe::Hint,
    },
    default::{get_codecs, get_probe},
};

/// Decoder provider backed by files under a root directory.
///
/// Resource names are relative paths using `/`, e.g. `sound/fx/door.wav`.
#[derive(Debug, Clone)]
pub struct FileDecoderProvider {
    root: PathBuf,
}

impl FileDecoderProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps a resource name to a path under the root, or `None` if it would leave the root.
    fn resolve(&self, name: &str) -> Option<PathBuf> {
        let mut path = self.root.clone();
        for part in name.split('/').filter(|part| !part.is_empty()) {
            let mut components = Path::new(part).components();
            match (components.next(), components.next()) {
                (Some(Component::Normal(part)), None) => path.push(part),
                _ => return None,
            }
        }
        Some(path)
    }
}

impl DecoderProvider for FileDecoderProvider {
    fn open(&self, name: &str) -> Result<Box<dyn Decoder>> {
        let Some(path) = self.resolve(name).filter(|path| path.is_file()) else {
            return Err(SonorityError::ResourceNotFound(name.to_string()));
        };
        Ok(Box::new(SymphoniaDecoder::open(name, path)?))
    }

    fn list(&self, dir: &str) -> Vec<String> {
        let Some(Ok(entries)) = self.resolve(dir).map(std::fs::read_dir) else {
            return Vec::new();
        };

        let prefix = dir.trim_end_matches('/');
        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_file())
            .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
            .map(|file| {
                if prefix.is_empty() {
                    file
                } else {
                    format!("{}/{}", prefix, file)
                }
            })
            .collect();
        names.sort();
        names
    }
}

/// Packet-at-a-time decoder for any format Symphonia can probe.
pub struct SymphoniaDecoder {
    name: String,
    path: PathBuf,
    format: Box<dyn FormatReader>,
    codec: Box<dyn CodecDecoder>,
    track_id: u32,
    sample_rate: u32,
    channels: u16,
}

impl SymphoniaDecoder {
    pub fn open(name: &str, path: PathBuf) -> Result<Self> {
        let file = File::open(&path)?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| {
                SonorityError::DecodeFailure(format!("Failed to probe {}: {:?}", name, e))
            })?;

        let format = probed.format;

        let track = format.default_track().ok_or_else(|| {
            SonorityError::DecodeFailure(format!("No default audio track in {}", name))
        })?;

        let sample_rate = track.codec_params.sample_rate.ok_or_else(|| {
            SonorityError::DecodeFailure(format!("Sample rate not found in {}", name))
        })?;

        let channels = track
            .codec_params
            .channels
            .ok_or_else(|| {
                SonorityError::DecodeFailure(format!("Channel count not found in {}", name))
            })?
            .count() as u16;

        let track_id = track.id;

        let codec = get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| {
                SonorityError::DecodeFailure(format!("Failed to create decoder: {:?}", e))
            })?;

        Ok(Self {
            name: name.to_string(),
            path,
            format,
            codec,
            track_id,
            sample_rate,
            channels,
        })
    }
}

impl Decoder for SymphoniaDecoder {
    fn name(&self) -> &str {
        &self.name
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn read_block(&mut self) -> Result<Option<Vec<f32>>> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(Error::IoError(_)) => return Ok(None), // end-of-file
                Err(e) => {
                    return Err(SonorityError::DecodeFailure(format!(
                        "Error reading packet from {}: {:?}",
                        self.name, e
                    )));
                }
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.codec.decode(&packet) {
                Ok(decoded) => decoded,
                Err(Error::IoError(_)) => return Ok(None),
                Err(Error::DecodeError(_)) => continue, // recoverable corruption
                Err(e) => {
                    return Err(SonorityError::DecodeFailure(format!(
                        "Error decoding {}: {:?}",
                        self.name, e
                    )));
                }
            };

            if decoded.frames() == 0 {
                continue;
            }

            let spec = *decoded.spec();
            let mut block = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
            block.copy_interleaved_ref(decoded);
            return Ok(Some(block.samples().to_vec()));
        }
    }

    fn rewind(&mut self) -> Result<()> {
        *self = Self::open(&self.name, self.path.clone())?;
        Ok(())
    }
}
