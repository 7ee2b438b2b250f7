use crate::config::Category;
use crate::error::{Result, SonorityError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

const MIB: usize = 1024 * 1024;

/// Head-related transfer function preference passed to the output device on init.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HrtfMode {
    Disable,
    Enable,
    #[default]
    Auto,
}

/// Per-category volume multipliers, each in `0.0..=1.0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeSettings {
    pub master: f32,
    pub effects: f32,
    pub voice: f32,
    pub music: f32,
    pub tracks: f32,
}

impl Default for VolumeSettings {
    fn default() -> Self {
        Self {
            master: 1.0,
            effects: 1.0,
            voice: 0.8,
            music: 0.5,
            tracks: 1.0,
        }
    }
}

impl VolumeSettings {
    pub fn category(&self, category: Category) -> f32 {
        match category {
            Category::Effect => self.effects,
            Category::Voice => self.voice,
            Category::Music => self.music,
            Category::Track => self.tracks,
        }
    }
}

/// Timing of random region ambience, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionSoundSettings {
    pub enabled: bool,
    pub min_time_between_sounds: f32,
    pub max_time_between_sounds: f32,
}

impl Default for RegionSoundSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            min_time_between_sounds: 1.0,
            max_time_between_sounds: 5.0,
        }
    }
}

/// Near-water ambience parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaterSoundSettings {
    pub enabled: bool,
    /// Half-width of the terrain sampling grid around the listener
    pub nearby_radius: f32,
    /// Grid points per axis
    pub nearby_points: u32,
    pub indoor_tolerance: f32,
    pub outdoor_tolerance: f32,
    pub indoor_sound: String,
    pub outdoor_sound: String,
}

impl Default for WaterSoundSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            nearby_radius: 1000.0,
            nearby_points: 8,
            indoor_tolerance: 512.0,
            outdoor_tolerance: 1024.0,
            indoor_sound: "water layer".to_string(),
            outdoor_sound: "water layer".to_string(),
        }
    }
}

/// Configuration descriptor for a [`SonorityManager`](crate::SonorityManager).
///
/// Every field has a sensible default; a settings file only needs to name what it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SonorityDesc {
    /// Output device to open; `None` uses the host default
    pub device_name: Option<String>,
    pub hrtf: HrtfMode,
    /// Resident decoded bytes the cache shrinks to when it evicts
    pub buffer_cache_min: usize,
    /// Resident decoded bytes above which the cache starts evicting
    pub buffer_cache_max: usize,
    /// Background decode threads
    pub worker_threads: usize,
    /// How long an async load may stay pending before the update loop waits on it
    pub async_timeout_ms: u64,
    /// Distance beyond which `REMOVE_AT_DISTANCE` sounds are dropped
    pub cull_distance: f32,
    /// Seconds a music track takes to fade out when another is requested
    pub music_fade_out: f32,
    /// Minimum seconds between ambient passes; shorter ticks are coalesced
    pub ambient_update_interval: f32,
    pub volumes: VolumeSettings,
    pub region_sounds: RegionSoundSettings,
    pub water: WaterSoundSettings,
    /// Looped effect played while the listener is submerged
    pub underwater_sound: String,
    pub music_enabled: bool,
    /// Directory (as seen by the decoder provider) holding one sub-directory per playlist
    pub music_root: String,
    /// Seed for playlist and ambience randomness; `None` seeds from entropy
    pub rng_seed: Option<u64>,
}

impl Default for SonorityDesc {
    fn default() -> Self {
        Self {
            device_name: None,
            hrtf: HrtfMode::Auto,
            buffer_cache_min: 14 * MIB,
            buffer_cache_max: 16 * MIB,
            worker_threads: 1,
            async_timeout_ms: 200,
            cull_distance: 2000.0,
            music_fade_out: 1.0,
            ambient_update_interval: 1.0 / 30.0,
            volumes: VolumeSettings::default(),
            region_sounds: RegionSoundSettings::default(),
            water: WaterSoundSettings::default(),
            underwater_sound: "underwater".to_string(),
            music_enabled: true,
            music_root: "music".to_string(),
            rng_seed: None,
        }
    }
}

impl SonorityDesc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn device_name(mut self, name: impl Into<String>) -> Self {
        self.device_name = Some(name.into());
        self
    }

    pub fn hrtf(mut self, mode: HrtfMode) -> Self {
        self.hrtf = mode;
        self
    }

    pub fn buffer_cache(mut self, min_bytes: usize, max_bytes: usize) -> Self {
        self.buffer_cache_min = min_bytes;
        self.buffer_cache_max = max_bytes;
        self
    }

    pub fn worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads;
        self
    }

    pub fn async_timeout(mut self, timeout: Duration) -> Self {
        self.async_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn cull_distance(mut self, distance: f32) -> Self {
        self.cull_distance = distance;
        self
    }

    pub fn music_fade_out(mut self, seconds: f32) -> Self {
        self.music_fade_out = seconds;
        self
    }

    pub fn music_root(mut self, root: impl Into<String>) -> Self {
        self.music_root = root.into();
        self
    }

    pub fn rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    pub fn pending_timeout(&self) -> Duration {
        Duration::from_millis(self.async_timeout_ms)
    }

    /// Checks the descriptor for values the manager cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.buffer_cache_min > self.buffer_cache_max {
            return Err(SonorityError::Configuration(format!(
                "buffer_cache_min ({}) exceeds buffer_cache_max ({})",
                self.buffer_cache_min, self.buffer_cache_max
            )));
        }
        if self.worker_threads == 0 {
            return Err(SonorityError::Configuration(
                "worker_threads must be at least 1".into(),
            ));
        }
        if self.cull_distance <= 0.0 {
            return Err(SonorityError::Configuration(
                "cull_distance must be positive".into(),
            ));
        }
        let region = &self.region_sounds;
        if region.min_time_between_sounds > region.max_time_between_sounds {
            return Err(SonorityError::Configuration(
                "region min_time_between_sounds exceeds max_time_between_sounds".into(),
            ));
        }
        Ok(())
    }

    /// Parses a descriptor from TOML; missing keys keep their defaults.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let desc: Self =
            toml::from_str(contents).map_err(|e| SonorityError::Configuration(e.to_string()))?;
        desc.validate()?;
        Ok(desc)
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| SonorityError::Configuration(e.to_string()))
    }
}
