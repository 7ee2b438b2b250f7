// Software mixer shared between the device front end and the cpal callback.
// The callback only ever try_locks the state; everything else runs on the update thread.

use crate::config::{Category, CategoryMask, Environment, PlayMode};
use crate::math::Vec3;
use crate::session::{PlaybackParams, SessionId};
use ringbuf::HeapCons;
use ringbuf::traits::{Consumer as _, Observer as _};
use std::f32::consts::{FRAC_PI_4, SQRT_2};
use std::sync::Arc;

/// Attenuation applied to environment-aware sounds while the listener is submerged.
const UNDERWATER_GAIN: f32 = 0.4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ListenerState {
    pub position: Vec3,
    pub forward: Vec3,
    pub up: Vec3,
    pub environment: Environment,
}

impl Default for ListenerState {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            forward: -Vec3::Z,
            up: Vec3::Y,
            environment: Environment::Normal,
        }
    }
}

impl ListenerState {
    fn right(&self) -> Vec3 {
        self.forward.cross(self.up).normalize_or_zero()
    }
}

/// Left/right gains for one playback as heard by `listener`.
///
/// 2D playbacks get their real volume on both channels. 3D playbacks are attenuated by
/// `min / clamp(distance, min, max)` and panned with a constant-power law.
pub fn channel_gains(params: &PlaybackParams, listener: &ListenerState) -> [f32; 2] {
    let mut gain = params.real_volume();
    if listener.environment == Environment::Underwater && params.uses_environment() {
        gain *= UNDERWATER_GAIN;
    }
    if !params.spatial {
        return [gain, gain];
    }

    let offset = params.position - listener.position;
    let distance = offset.length();
    if !params.mode.contains(PlayMode::NO_SCALING) {
        let min = params.min_distance.max(1e-3);
        let clamped = distance.clamp(min, params.max_distance.max(min));
        gain *= min / clamped;
    }

    let pan = if distance > f32::EPSILON {
        (offset / distance).dot(listener.right()).clamp(-1.0, 1.0)
    } else {
        0.0
    };
    let angle = (pan + 1.0) * FRAC_PI_4;
    [gain * angle.cos() * SQRT_2, gain * angle.sin() * SQRT_2]
}

pub(crate) enum MixSource {
    Buffer {
        samples: Arc<[f32]>,
        channels: usize,
        cursor: f64,
    },
    Stream {
        consumer: HeapCons<f32>,
        channels: usize,
        input_done: bool,
    },
}

pub(crate) struct MixVoice {
    pub session: SessionId,
    pub category: Category,
    pub source: MixSource,
    pub gains: [f32; 2],
    pub pitch: f32,
    pub looping: bool,
    pub paused: bool,
    pub finished: bool,
}

impl MixVoice {
    /// Next stereo frame, or `None` when nothing is available this frame.
    fn next_frame(&mut self) -> Option<(f32, f32)> {
        match &mut self.source {
            MixSource::Buffer {
                samples,
                channels,
                cursor,
            } => {
                let frames = samples.len() / *channels;
                if frames == 0 {
                    self.finished = true;
                    return None;
                }
                let mut index = *cursor as usize;
                if index >= frames {
                    if !self.looping {
                        self.finished = true;
                        return None;
                    }
                    *cursor %= frames as f64;
                    index = *cursor as usize;
                }
                let base = index * *channels;
                let left = samples[base];
                let right = if *channels > 1 { samples[base + 1] } else { left };
                *cursor += self.pitch.max(0.01) as f64;
                Some((left, right))
            }
            MixSource::Stream {
                consumer,
                channels,
                input_done,
            } => {
                if consumer.occupied_len() < *channels {
                    if *input_done {
                        self.finished = true;
                    }
                    return None;
                }
                let mut frame = [0.0f32; 2];
                consumer.pop_slice(&mut frame[..*channels]);
                if *channels == 1 {
                    Some((frame[0], frame[0]))
                } else {
                    Some((frame[0], frame[1]))
                }
            }
        }
    }
}

#[derive(Default)]
pub(crate) struct MixState {
    pub voices: Vec<MixVoice>,
    pub paused: bool,
}

impl MixState {
    pub fn voice(&self, session: SessionId) -> Option<&MixVoice> {
        self.voices.iter().find(|voice| voice.session == session)
    }

    pub fn voice_mut(&mut self, session: SessionId) -> Option<&mut MixVoice> {
        self.voices.iter_mut().find(|voice| voice.session == session)
    }

    pub fn remove(&mut self, session: SessionId) -> Option<MixVoice> {
        let index = self.voices.iter().position(|voice| voice.session == session)?;
        Some(self.voices.swap_remove(index))
    }

    pub fn set_paused(&mut self, categories: CategoryMask, paused: bool) {
        for voice in self
            .voices
            .iter_mut()
            .filter(|voice| categories.contains_category(voice.category))
        {
            voice.paused = paused;
        }
    }

    /// Mixes every running voice into `out` (interleaved, `channels` wide).
    ///
    /// Returns the number of frames written.
    pub fn render(&mut self, out: &mut [f32], channels: usize) -> usize {
        out.fill(0.0);
        if self.paused || channels == 0 {
            return 0;
        }

        let frames = out.len() / channels;
        for voice in self.voices.iter_mut() {
            if voice.paused || voice.finished {
                continue;
            }
            let [left_gain, right_gain] = voice.gains;
            for frame in 0..frames {
                let Some((left, right)) = voice.next_frame() else {
                    if voice.finished {
                        break;
                    }
                    continue;
                };
                let base = frame * channels;
                if channels == 1 {
                    out[base] += 0.5 * (left * left_gain + right * right_gain);
                } else {
                    out[base] += left * left_gain;
                    out[base + 1] += right * right_gain;
                }
            }
        }

        for sample in out.iter_mut() {
            *sample = sample.clamp(-1.0, 1.0);
        }
        frames
    }
}
