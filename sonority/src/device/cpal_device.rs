use super::mixer::{ListenerState, MixSource, MixState, MixVoice, channel_gains};
use super::{AudioDevice, BufferHandle};
use crate::config::{CategoryMask, Environment, HrtfMode};
use crate::decoder::{BatchResampler, DecodedSound, Decoder, StreamResampler, fold_to_stereo};
use crate::error::{Result, SonorityError};
use crate::math::Vec3;
use crate::session::{PlaybackParams, SessionId};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SizedSample};
use ringbuf::traits::{Observer as _, Producer as _, Split as _};
use ringbuf::{HeapProd, HeapRb};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Seconds of decoded audio each stream keeps queued for the callback.
const STREAM_BUFFER_SECONDS: f32 = 0.5;
const RESAMPLE_CHUNK_FRAMES: usize = 1024;

struct LoadedBuffer {
    samples: Arc<[f32]>,
    channels: usize,
}

/// Update-thread side of a streamed playback: pulls blocks from the decoder and keeps the
/// ring buffer the callback reads from topped up.
struct StreamFeed {
    decoder: Box<dyn Decoder>,
    resampler: Option<StreamResampler>,
    producer: HeapProd<f32>,
    channels: usize,
    backlog: Vec<f32>,
    input_done: bool,
    looping: bool,
    written_frames: u64,
    /// (end frame, RMS) of each decoded block, oldest first
    loudness: VecDeque<(u64, f32)>,
}

impl StreamFeed {
    fn queued_frames(&self) -> u64 {
        (self.producer.occupied_len() / self.channels) as u64
    }

    fn played_frames(&self) -> u64 {
        self.written_frames.saturating_sub(self.queued_frames())
    }

    fn delay_frames(&self) -> u64 {
        self.queued_frames() + (self.backlog.len() / self.channels) as u64
    }

    /// True once the decoder is drained and every sample was handed to the ring buffer.
    fn exhausted(&self) -> bool {
        self.input_done && self.backlog.is_empty()
    }

    fn loudness_now(&self) -> f32 {
        let played = self.played_frames();
        self.loudness
            .iter()
            .find(|(end, _)| *end > played)
            .map(|(_, rms)| *rms)
            .unwrap_or(0.0)
    }

    fn pump(&mut self) {
        loop {
            if !self.backlog.is_empty() {
                let vacant = self.producer.vacant_len().min(self.backlog.len());
                let whole = vacant / self.channels * self.channels;
                let pushed = self.producer.push_slice(&self.backlog[..whole]);
                self.backlog.drain(..pushed);
                self.written_frames += (pushed / self.channels) as u64;
                if !self.backlog.is_empty() {
                    break;
                }
            }
            if self.input_done {
                break;
            }
            if let Err(e) = self.decode_next() {
                log::warn!("Stream {} stopped decoding: {}", self.decoder.name(), e);
                self.input_done = true;
            }
        }

        let played = self.played_frames();
        while self.loudness.front().is_some_and(|(end, _)| *end <= played) {
            self.loudness.pop_front();
        }
    }

    fn decode_next(&mut self) -> Result<()> {
        match self.decoder.read_block()? {
            Some(block) => {
                let (block, _) = fold_to_stereo(&block, self.decoder.channels());
                let out = match self.resampler.as_mut() {
                    Some(resampler) => resampler.push(&block)?,
                    None => block,
                };
                if !out.is_empty() {
                    let rms = (out.iter().map(|s| s * s).sum::<f32>() / out.len() as f32).sqrt();
                    let end = self.written_frames
                        + ((self.backlog.len() + out.len()) / self.channels) as u64;
                    self.loudness.push_back((end, rms.min(1.0)));
                    self.backlog.extend_from_slice(&out);
                }
            }
            None if self.looping => {
                self.decoder.rewind()?;
            }
            None => {
                if let Some(resampler) = self.resampler.as_mut() {
                    let tail = resampler.flush()?;
                    self.backlog.extend_from_slice(&tail);
                }
                self.input_done = true;
            }
        }
        Ok(())
    }
}

/// Software-mixing output device on top of cpal.
///
/// Buffers are converted to the device rate on upload; streams are decoded on the update
/// thread in [`finish_update`](AudioDevice::finish_update) and handed to the audio callback
/// through lock-free ring buffers. Spatialization is distance attenuation plus stereo panning.
pub struct CpalDevice {
    stream: Option<cpal::Stream>,
    mix: Arc<Mutex<MixState>>,
    sample_rate: u32,
    channels: u16,
    buffers: HashMap<BufferHandle, LoadedBuffer>,
    next_buffer: u64,
    params: HashMap<SessionId, PlaybackParams>,
    feeds: HashMap<SessionId, StreamFeed>,
    listener: ListenerState,
}

impl CpalDevice {
    pub fn new() -> Self {
        Self {
            stream: None,
            mix: Arc::new(Mutex::new(MixState::default())),
            sample_rate: 48000,
            channels: 2,
            buffers: HashMap::new(),
            next_buffer: 1,
            params: HashMap::new(),
            feeds: HashMap::new(),
            listener: ListenerState::default(),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    fn lock_mix(&self) -> MutexGuard<'_, MixState> {
        self.mix.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn find_device(host: &cpal::Host, name: &str) -> Option<cpal::Device> {
        host.output_devices()
            .ok()?
            .find(|device| device.name().is_ok_and(|n| n == name))
    }

    fn create_stream<T>(
        &self,
        device: &cpal::Device,
        config: &cpal::StreamConfig,
    ) -> Result<cpal::Stream>
    where
        T: SizedSample + FromSample<f32>,
    {
        let mix = self.mix.clone();
        let channels = config.channels as usize;
        let mut scratch: Vec<f32> = Vec::new();

        device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    scratch.resize(data.len(), 0.0);
                    match mix.try_lock() {
                        Ok(mut state) => {
                            state.render(&mut scratch, channels);
                        }
                        Err(_) => scratch.fill(0.0),
                    }
                    for (out, sample) in data.iter_mut().zip(scratch.iter()) {
                        *out = T::from_sample(*sample);
                    }
                },
                move |err| {
                    log::error!("Audio stream error: {}", err);
                },
                None,
            )
            .map_err(|e| SonorityError::DeviceUnavailable(format!("Failed to build stream: {}", e)))
    }

    fn start_buffer(
        &mut self,
        session: SessionId,
        params: &PlaybackParams,
        buffer: BufferHandle,
        offset: f32,
    ) -> bool {
        let Some(loaded) = self.buffers.get(&buffer) else {
            log::warn!("Play requested for unknown buffer {:?}", buffer);
            return false;
        };

        let frames = loaded.samples.len() / loaded.channels;
        let cursor = (offset.clamp(0.0, 1.0) as f64 * frames as f64).floor();
        let voice = MixVoice {
            session,
            category: params.category,
            source: MixSource::Buffer {
                samples: loaded.samples.clone(),
                channels: loaded.channels,
                cursor,
            },
            gains: channel_gains(params, &self.listener),
            pitch: params.pitch,
            looping: params.is_looping(),
            paused: false,
            finished: false,
        };

        self.lock_mix().voices.push(voice);
        self.params.insert(session, params.clone());
        true
    }

    fn start_stream(
        &mut self,
        decoder: Box<dyn Decoder>,
        session: SessionId,
        params: &PlaybackParams,
    ) -> bool {
        let channels = decoder.channels().clamp(1, 2) as usize;
        let resampler = if decoder.sample_rate() != self.sample_rate {
            match StreamResampler::new(
                decoder.sample_rate(),
                self.sample_rate,
                channels as u16,
                RESAMPLE_CHUNK_FRAMES,
            ) {
                Ok(resampler) => Some(resampler),
                Err(e) => {
                    log::warn!("Cannot stream {}: {}", decoder.name(), e);
                    return false;
                }
            }
        } else {
            None
        };

        let capacity = ((self.sample_rate as f32 * STREAM_BUFFER_SECONDS) as usize)
            .max(RESAMPLE_CHUNK_FRAMES)
            * channels;
        let (producer, consumer) = HeapRb::<f32>::new(capacity).split();

        let mut feed = StreamFeed {
            decoder,
            resampler,
            producer,
            channels,
            backlog: Vec::new(),
            input_done: false,
            looping: params.is_looping(),
            written_frames: 0,
            loudness: VecDeque::new(),
        };
        feed.pump();

        let voice = MixVoice {
            session,
            category: params.category,
            source: MixSource::Stream {
                consumer,
                channels,
                input_done: feed.exhausted(),
            },
            gains: channel_gains(params, &self.listener),
            pitch: 1.0,
            looping: false,
            paused: false,
            finished: false,
        };

        self.lock_mix().voices.push(voice);
        self.feeds.insert(session, feed);
        self.params.insert(session, params.clone());
        true
    }

    fn stop_session(&mut self, session: SessionId) {
        self.lock_mix().remove(session);
        self.feeds.remove(&session);
        self.params.remove(&session);
    }

    fn is_running(&self, session: SessionId) -> bool {
        self.lock_mix()
            .voice(session)
            .is_some_and(|voice| !voice.finished)
    }

    fn apply_params(&mut self, session: SessionId, params: &PlaybackParams) {
        let Some(stored) = self.params.get_mut(&session) else {
            return;
        };
        *stored = params.clone();
        if let Some(feed) = self.feeds.get_mut(&session) {
            feed.looping = params.is_looping();
        }

        let gains = channel_gains(params, &self.listener);
        let mut mix = self.lock_mix();
        if let Some(voice) = mix.voice_mut(session) {
            voice.gains = gains;
            if matches!(voice.source, MixSource::Buffer { .. }) {
                voice.pitch = params.pitch;
                voice.looping = params.is_looping();
            }
        }
    }
}

impl Default for CpalDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioDevice for CpalDevice {
    fn init(&mut self, device_name: Option<&str>, hrtf: HrtfMode) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let host = cpal::default_host();
        let device = match device_name {
            Some(name) => Self::find_device(&host, name).or_else(|| {
                log::warn!("Output device {:?} not found, using the default device", name);
                host.default_output_device()
            }),
            None => host.default_output_device(),
        }
        .ok_or_else(|| {
            SonorityError::DeviceUnavailable("No output device available".to_string())
        })?;
        let name = device.name().unwrap_or_else(|_| "<unnamed>".to_string());

        let default_config = device.default_output_config().map_err(|e| {
            SonorityError::DeviceUnavailable(format!("Failed to get default config: {}", e))
        })?;
        let config: cpal::StreamConfig = default_config.config();

        if hrtf == HrtfMode::Enable {
            log::warn!(
                "HRTF requested on {}; this device renders stereo panning only",
                name
            );
        }

        let stream = match default_config.sample_format() {
            cpal::SampleFormat::F32 => self.create_stream::<f32>(&device, &config)?,
            cpal::SampleFormat::I16 => self.create_stream::<i16>(&device, &config)?,
            cpal::SampleFormat::U16 => self.create_stream::<u16>(&device, &config)?,
            format => {
                return Err(SonorityError::DeviceUnavailable(format!(
                    "Unsupported sample format {:?}",
                    format
                )));
            }
        };

        stream.play().map_err(|e| {
            SonorityError::DeviceUnavailable(format!("Failed to start stream: {}", e))
        })?;

        self.sample_rate = config.sample_rate.0;
        self.channels = config.channels;
        self.stream = Some(stream);

        log::info!(
            "Opened audio device {} ({} Hz, {} channels)",
            name,
            self.sample_rate,
            self.channels
        );
        Ok(())
    }

    fn deinit(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream); // stops the callback
            log::info!("Audio device closed");
        }
        self.lock_mix().voices.clear();
        self.feeds.clear();
        self.params.clear();
        self.buffers.clear();
    }

    fn is_initialized(&self) -> bool {
        self.stream.is_some()
    }

    fn enumerate(&self) -> Vec<String> {
        cpal::default_host()
            .output_devices()
            .map(|devices| devices.filter_map(|device| device.name().ok()).collect())
            .unwrap_or_default()
    }

    fn load_sound(&mut self, sound: &DecodedSound) -> Result<(BufferHandle, usize)> {
        let (samples, channels) = fold_to_stereo(&sound.samples, sound.channels);
        let samples = if sound.sample_rate != self.sample_rate {
            BatchResampler::new(sound.sample_rate, self.sample_rate, channels, None)?
                .resample_interleaved(&samples)?
        } else {
            samples
        };

        let size = samples.len() * std::mem::size_of::<f32>();
        let handle = BufferHandle(self.next_buffer);
        self.next_buffer += 1;
        self.buffers.insert(
            handle,
            LoadedBuffer {
                samples: samples.into(),
                channels: channels as usize,
            },
        );
        Ok((handle, size))
    }

    fn unload_sound(&mut self, handle: BufferHandle) -> usize {
        self.buffers
            .remove(&handle)
            .map(|buffer| buffer.samples.len() * std::mem::size_of::<f32>())
            .unwrap_or(0)
    }

    fn play_sound(
        &mut self,
        session: SessionId,
        params: &PlaybackParams,
        buffer: BufferHandle,
        offset: f32,
    ) -> bool {
        self.start_buffer(session, params, buffer, offset)
    }

    fn play_sound_3d(
        &mut self,
        session: SessionId,
        params: &PlaybackParams,
        buffer: BufferHandle,
        offset: f32,
    ) -> bool {
        self.start_buffer(session, params, buffer, offset)
    }

    fn finish_sound(&mut self, session: SessionId) {
        self.stop_session(session);
    }

    fn is_sound_playing(&self, session: SessionId) -> bool {
        self.is_running(session)
    }

    fn update_sound(&mut self, session: SessionId, params: &PlaybackParams) {
        self.apply_params(session, params);
    }

    fn stream_sound(
        &mut self,
        decoder: Box<dyn Decoder>,
        session: SessionId,
        params: &PlaybackParams,
    ) -> bool {
        self.start_stream(decoder, session, params)
    }

    fn stream_sound_3d(
        &mut self,
        decoder: Box<dyn Decoder>,
        session: SessionId,
        params: &PlaybackParams,
    ) -> bool {
        self.start_stream(decoder, session, params)
    }

    fn finish_stream(&mut self, session: SessionId) {
        self.stop_session(session);
    }

    fn is_stream_playing(&self, session: SessionId) -> bool {
        self.is_running(session)
    }

    fn update_stream(&mut self, session: SessionId, params: &PlaybackParams) {
        self.apply_params(session, params);
    }

    fn get_stream_delay(&self, session: SessionId) -> f32 {
        self.feeds
            .get(&session)
            .map(|feed| feed.delay_frames() as f32 / self.sample_rate as f32)
            .unwrap_or(0.0)
    }

    fn get_stream_loudness(&self, session: SessionId) -> f32 {
        self.feeds
            .get(&session)
            .map(StreamFeed::loudness_now)
            .unwrap_or(0.0)
    }

    fn pause_sounds(&mut self, categories: CategoryMask) {
        self.lock_mix().set_paused(categories, true);
    }

    fn resume_sounds(&mut self, categories: CategoryMask) {
        self.lock_mix().set_paused(categories, false);
    }

    fn pause_playback(&mut self) {
        self.lock_mix().paused = true;
        if let Some(stream) = &self.stream {
            if let Err(e) = stream.pause() {
                log::warn!("Failed to pause output stream: {}", e);
            }
        }
    }

    fn resume_playback(&mut self) {
        self.lock_mix().paused = false;
        if let Some(stream) = &self.stream {
            if let Err(e) = stream.play() {
                log::warn!("Failed to resume output stream: {}", e);
            }
        }
    }

    fn start_update(&mut self) {}

    fn update_listener(&mut self, position: Vec3, forward: Vec3, up: Vec3, env: Environment) {
        self.listener = ListenerState {
            position,
            forward,
            up,
            environment: env,
        };
    }

    fn finish_update(&mut self) {
        for feed in self.feeds.values_mut() {
            feed.pump();
        }

        let mut mix = self.mix.lock().unwrap_or_else(PoisonError::into_inner);
        for voice in mix.voices.iter_mut() {
            if let Some(params) = self.params.get(&voice.session) {
                voice.gains = channel_gains(params, &self.listener);
            }
            if let MixSource::Stream { input_done, .. } = &mut voice.source {
                if let Some(feed) = self.feeds.get(&voice.session) {
                    *input_done = feed.exhausted();
                }
            }
        }
    }
}

impl Drop for CpalDevice {
    fn drop(&mut self) {
        self.deinit();
    }
}
