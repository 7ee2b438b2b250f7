//! Test doubles shared by the unit tests.

use crate::asset::{RegionSound, SoundRecord, StaticCatalog};
use crate::config::{CategoryMask, Environment, HrtfMode, SonorityDesc};
use crate::decoder::{DecodedSound, Decoder, DecoderProvider};
use crate::device::{AudioDevice, BufferHandle};
use crate::error::{Result, SonorityError};
use crate::manager::SonorityManager;
use crate::math::Vec3;
use crate::session::{PlaybackParams, SessionId};
use crate::world::{CellInfo, EntityId, WorldView};
use crossbeam_channel::Receiver;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

pub const SAMPLE_VALUE: f32 = 0.25;
const BLOCK_FRAMES: usize = 1024;

#[derive(Debug, Clone, Copy)]
struct MemorySound {
    frames: usize,
    sample_rate: u32,
    channels: u16,
}

/// Provider serving constant-valued sounds from memory.
///
/// Opens can be held back with a gate: the open blocks until the paired sender sends or is
/// dropped.
#[derive(Default)]
pub struct MemoryProvider {
    sounds: HashMap<String, MemorySound>,
    failing: HashSet<String>,
    gates: HashMap<String, Receiver<()>>,
    listings: HashMap<String, Vec<String>>,
    opened: Arc<Mutex<Vec<String>>>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sound(mut self, name: &str, frames: usize, sample_rate: u32, channels: u16) -> Self {
        self.sounds.insert(
            name.to_string(),
            MemorySound {
                frames,
                sample_rate,
                channels,
            },
        );
        self
    }

    /// A sound whose byte size after decoding is exactly `bytes` (mono).
    pub fn with_sized(self, name: &str, bytes: usize) -> Self {
        self.with_sound(name, bytes / 4, 48000, 1)
    }

    pub fn with_failure(mut self, name: &str) -> Self {
        self.failing.insert(name.to_string());
        self
    }

    pub fn with_gate(mut self, name: &str, gate: Receiver<()>) -> Self {
        self.gates.insert(name.to_string(), gate);
        self
    }

    pub fn with_listing(mut self, dir: &str, names: &[&str]) -> Self {
        self.listings.insert(
            dir.to_string(),
            names.iter().map(|name| name.to_string()).collect(),
        );
        for name in names {
            if !self.sounds.contains_key(*name) {
                self = self.with_sound(name, 4800, 48000, 2);
            }
        }
        self
    }

    pub fn opened(&self) -> Arc<Mutex<Vec<String>>> {
        self.opened.clone()
    }
}

impl DecoderProvider for MemoryProvider {
    fn open(&self, name: &str) -> Result<Box<dyn Decoder>> {
        if let Some(gate) = self.gates.get(name) {
            let _ = gate.recv();
        }
        self.opened.lock().unwrap().push(name.to_string());

        if self.failing.contains(name) {
            return Err(SonorityError::DecodeFailure(format!("{} is corrupt", name)));
        }
        let sound = self
            .sounds
            .get(name)
            .ok_or_else(|| SonorityError::ResourceNotFound(name.to_string()))?;
        Ok(Box::new(MemoryDecoder {
            name: name.to_string(),
            sound: *sound,
            position: 0,
        }))
    }

    fn list(&self, dir: &str) -> Vec<String> {
        self.listings.get(dir).cloned().unwrap_or_default()
    }
}

pub struct MemoryDecoder {
    name: String,
    sound: MemorySound,
    position: usize,
}

impl Decoder for MemoryDecoder {
    fn name(&self) -> &str {
        &self.name
    }

    fn sample_rate(&self) -> u32 {
        self.sound.sample_rate
    }

    fn channels(&self) -> u16 {
        self.sound.channels
    }

    fn read_block(&mut self) -> Result<Option<Vec<f32>>> {
        if self.position >= self.sound.frames {
            return Ok(None);
        }
        let frames = (self.sound.frames - self.position).min(BLOCK_FRAMES);
        self.position += frames;
        Ok(Some(vec![
            SAMPLE_VALUE;
            frames * self.sound.channels as usize
        ]))
    }

    fn rewind(&mut self) -> Result<()> {
        self.position = 0;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCall {
    Init,
    Deinit,
    Load(String),
    Unload(BufferHandle),
    PlaySound { session: SessionId, spatial: bool },
    FinishSound(SessionId),
    UpdateSound { session: SessionId, volume: f32 },
    StreamSound { session: SessionId, name: String },
    FinishStream(SessionId),
    UpdateStream { session: SessionId, volume: f32 },
    PauseSounds(CategoryMask),
    ResumeSounds(CategoryMask),
    PausePlayback,
    ResumePlayback,
    StartUpdate,
    UpdateListener { position: Vec3, env: Environment },
    FinishUpdate,
}

#[derive(Default)]
pub struct DeviceLog {
    pub calls: Vec<DeviceCall>,
    pub playing: HashSet<SessionId>,
    pub streams: HashMap<SessionId, String>,
    pub loaded: HashMap<BufferHandle, usize>,
    pub fail_init: bool,
    pub loudness: f32,
    pub delay: f32,
    next_handle: u64,
}

impl DeviceLog {
    /// Simulates a playback reaching its natural end.
    pub fn end(&mut self, session: SessionId) {
        self.playing.remove(&session);
    }

    /// Ends every running stream whose decoder had this name.
    pub fn end_stream(&mut self, name: &str) {
        let ended: Vec<SessionId> = self
            .streams
            .iter()
            .filter(|(_, stream)| stream.as_str() == name)
            .map(|(session, _)| *session)
            .collect();
        for session in ended {
            self.playing.remove(&session);
        }
    }

    pub fn count(&self, pred: impl Fn(&DeviceCall) -> bool) -> usize {
        self.calls.iter().filter(|call| pred(call)).count()
    }

    pub fn position(&self, pred: impl Fn(&DeviceCall) -> bool) -> Option<usize> {
        self.calls.iter().position(pred)
    }

    pub fn streams_started(&self) -> Vec<String> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                DeviceCall::StreamSound { name, .. } => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn resident_bytes(&self) -> usize {
        self.loaded.values().sum()
    }
}

/// Device that records every call and plays sessions until told they ended.
#[derive(Clone, Default)]
pub struct RecordingDevice {
    log: Arc<Mutex<DeviceLog>>,
    initialized: bool,
}

impl RecordingDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_init() -> Self {
        let device = Self::default();
        device.log().fail_init = true;
        device
    }

    pub fn log(&self) -> MutexGuard<'_, DeviceLog> {
        self.log.lock().unwrap()
    }

    fn record(&self, call: DeviceCall) {
        self.log().calls.push(call);
    }

    fn start(&self, session: SessionId) {
        self.log().playing.insert(session);
    }
}

impl AudioDevice for RecordingDevice {
    fn init(&mut self, _device_name: Option<&str>, _hrtf: HrtfMode) -> Result<()> {
        if self.log().fail_init {
            return Err(SonorityError::DeviceUnavailable("no hardware".into()));
        }
        self.initialized = true;
        self.record(DeviceCall::Init);
        Ok(())
    }

    fn deinit(&mut self) {
        self.initialized = false;
        self.record(DeviceCall::Deinit);
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn load_sound(&mut self, sound: &DecodedSound) -> Result<(BufferHandle, usize)> {
        let mut log = self.log();
        log.next_handle += 1;
        let handle = BufferHandle(log.next_handle);
        log.loaded.insert(handle, sound.byte_size());
        log.calls.push(DeviceCall::Load(sound.name.clone()));
        Ok((handle, sound.byte_size()))
    }

    fn unload_sound(&mut self, handle: BufferHandle) -> usize {
        let mut log = self.log();
        log.calls.push(DeviceCall::Unload(handle));
        log.loaded.remove(&handle).unwrap_or(0)
    }

    fn play_sound(
        &mut self,
        session: SessionId,
        params: &PlaybackParams,
        _buffer: BufferHandle,
        _offset: f32,
    ) -> bool {
        self.start(session);
        self.record(DeviceCall::PlaySound {
            session,
            spatial: params.spatial,
        });
        true
    }

    fn play_sound_3d(
        &mut self,
        session: SessionId,
        params: &PlaybackParams,
        buffer: BufferHandle,
        offset: f32,
    ) -> bool {
        self.play_sound(session, params, buffer, offset)
    }

    fn finish_sound(&mut self, session: SessionId) {
        self.log().playing.remove(&session);
        self.record(DeviceCall::FinishSound(session));
    }

    fn is_sound_playing(&self, session: SessionId) -> bool {
        self.log().playing.contains(&session)
    }

    fn update_sound(&mut self, session: SessionId, params: &PlaybackParams) {
        self.record(DeviceCall::UpdateSound {
            session,
            volume: params.real_volume(),
        });
    }

    fn stream_sound(
        &mut self,
        decoder: Box<dyn Decoder>,
        session: SessionId,
        _params: &PlaybackParams,
    ) -> bool {
        self.start(session);
        let name = decoder.name().to_string();
        self.log().streams.insert(session, name.clone());
        self.record(DeviceCall::StreamSound { session, name });
        true
    }

    fn stream_sound_3d(
        &mut self,
        decoder: Box<dyn Decoder>,
        session: SessionId,
        params: &PlaybackParams,
    ) -> bool {
        self.stream_sound(decoder, session, params)
    }

    fn finish_stream(&mut self, session: SessionId) {
        self.log().playing.remove(&session);
        self.record(DeviceCall::FinishStream(session));
    }

    fn is_stream_playing(&self, session: SessionId) -> bool {
        self.log().playing.contains(&session)
    }

    fn update_stream(&mut self, session: SessionId, params: &PlaybackParams) {
        self.record(DeviceCall::UpdateStream {
            session,
            volume: params.real_volume(),
        });
    }

    fn get_stream_delay(&self, session: SessionId) -> f32 {
        let log = self.log();
        if log.playing.contains(&session) { log.delay } else { 0.0 }
    }

    fn get_stream_loudness(&self, session: SessionId) -> f32 {
        let log = self.log();
        if log.playing.contains(&session) {
            log.loudness
        } else {
            0.0
        }
    }

    fn pause_sounds(&mut self, categories: CategoryMask) {
        self.record(DeviceCall::PauseSounds(categories));
    }

    fn resume_sounds(&mut self, categories: CategoryMask) {
        self.record(DeviceCall::ResumeSounds(categories));
    }

    fn pause_playback(&mut self) {
        self.record(DeviceCall::PausePlayback);
    }

    fn resume_playback(&mut self) {
        self.record(DeviceCall::ResumePlayback);
    }

    fn start_update(&mut self) {
        self.record(DeviceCall::StartUpdate);
    }

    fn update_listener(&mut self, position: Vec3, _forward: Vec3, _up: Vec3, env: Environment) {
        self.record(DeviceCall::UpdateListener { position, env });
    }

    fn finish_update(&mut self) {
        self.record(DeviceCall::FinishUpdate);
    }
}

#[derive(Default)]
pub struct WorldState {
    pub positions: HashMap<EntityId, Vec3>,
    pub player: Option<EntityId>,
    pub cell: Option<CellInfo>,
    pub terrain_height: f32,
    pub cells: HashMap<EntityId, String>,
}

/// Mutable world shared between a test and the manager.
#[derive(Clone, Default)]
pub struct FakeWorld {
    state: Arc<Mutex<WorldState>>,
}

impl FakeWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, WorldState> {
        self.state.lock().unwrap()
    }

    pub fn place(&self, entity: EntityId, position: Vec3) {
        self.state().positions.insert(entity, position);
    }

    pub fn set_player(&self, entity: EntityId, position: Vec3) {
        let mut state = self.state();
        state.player = Some(entity);
        state.positions.insert(entity, position);
    }

    pub fn place_in_cell(&self, entity: EntityId, position: Vec3, cell_id: &str) {
        let mut state = self.state();
        state.positions.insert(entity, position);
        state.cells.insert(entity, cell_id.to_string());
    }

    pub fn set_cell(&self, cell: Option<CellInfo>) {
        self.state().cell = cell;
    }
}

impl WorldView for FakeWorld {
    fn position(&self, entity: EntityId) -> Option<Vec3> {
        self.state().positions.get(&entity).copied()
    }

    fn player(&self) -> Option<EntityId> {
        self.state().player
    }

    fn cell(&self) -> Option<CellInfo> {
        self.state().cell.clone()
    }

    fn in_cell(&self, entity: EntityId, cell_id: &str) -> bool {
        self.state().cells.get(&entity).is_some_and(|cell| cell == cell_id)
    }

    fn terrain_height_at(&self, _x: f32, _y: f32) -> f32 {
        self.state().terrain_height
    }
}

/// Descriptor that resolves every pending load on the first update after submission.
pub fn test_desc() -> SonorityDesc {
    let _ = env_logger::builder().is_test(true).try_init();
    SonorityDesc::default()
        .async_timeout(Duration::ZERO)
        .rng_seed(7)
        .buffer_cache(1 << 20, 1 << 21)
}

pub fn catalog() -> StaticCatalog {
    StaticCatalog::new()
        .with_sound(SoundRecord::new("door", "fx/door.wav"))
        .with_sound(SoundRecord::new("step", "fx/step.wav"))
        .with_sound(SoundRecord::new("water layer", "fx/water.wav"))
        .with_sound(SoundRecord::new("underwater", "fx/underwater.wav"))
        .with_sound(SoundRecord::new("birds", "fx/birds.wav"))
        .with_sound(SoundRecord::new("broken", "fx/broken.wav"))
        .with_region(
            "west gash",
            vec![RegionSound {
                sound: "birds".into(),
                chance: 100,
            }],
        )
}

pub fn provider() -> MemoryProvider {
    MemoryProvider::new()
        .with_sound("fx/door.wav", 4800, 48000, 1)
        .with_sound("fx/step.wav", 2400, 48000, 1)
        .with_sound("fx/water.wav", 4800, 48000, 1)
        .with_sound("fx/underwater.wav", 4800, 48000, 1)
        .with_sound("fx/birds.wav", 4800, 48000, 1)
        .with_failure("fx/broken.wav")
        .with_sound("vo/hello.mp3", 48000, 48000, 1)
        .with_sound("vo/bye.mp3", 48000, 48000, 1)
        .with_sound("music/a.mp3", 480000, 48000, 2)
        .with_sound("music/b.mp3", 480000, 48000, 2)
}

pub struct Fixture {
    pub manager: SonorityManager,
    pub device: RecordingDevice,
    pub world: FakeWorld,
}

impl Fixture {
    pub fn new(desc: SonorityDesc, provider: MemoryProvider) -> Self {
        let device = RecordingDevice::new();
        let world = FakeWorld::new();
        let manager = SonorityManager::new(
            desc,
            Box::new(device.clone()),
            Arc::new(provider),
            Box::new(catalog()),
            Box::new(world.clone()),
        )
        .unwrap();
        Self {
            manager,
            device,
            world,
        }
    }

    pub fn standard() -> Self {
        Self::new(test_desc(), provider())
    }
}
