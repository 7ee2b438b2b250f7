//! Sound asset records and the catalog they are looked up in.

use std::collections::HashMap;

/// Case-insensitive identifier of a sound asset.
///
/// Ids are trimmed, lower-cased and use `/` as the path separator so that lookups match
/// however the caller spelled them.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssetId(String);

impl AssetId {
    pub fn new(raw: &str) -> Self {
        Self(raw.trim().replace('\\', "/").to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for AssetId {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for AssetId {
    fn from(raw: String) -> Self {
        Self::new(&raw)
    }
}

impl std::fmt::Display for AssetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A sound as described by the data store.
#[derive(Debug, Clone, PartialEq)]
pub struct SoundRecord {
    pub id: AssetId,
    /// Name handed to the decoder provider
    pub resource_name: String,
    /// Loudness on a 0..=255 scale
    pub volume: u8,
    /// Full-volume radius in catalog units; 0 together with `max_range` 0 means default
    pub min_range: u8,
    pub max_range: u8,
}

impl SoundRecord {
    pub fn new(id: &str, resource_name: &str) -> Self {
        Self {
            id: AssetId::new(id),
            resource_name: resource_name.to_string(),
            volume: 255,
            min_range: 0,
            max_range: 0,
        }
    }

    pub fn with_volume(mut self, volume: u8) -> Self {
        self.volume = volume;
        self
    }

    pub fn with_range(mut self, min_range: u8, max_range: u8) -> Self {
        self.min_range = min_range;
        self.max_range = max_range;
        self
    }

    /// Converts the record's integer fields into playback metadata.
    ///
    /// Volume follows a decibel curve from silent at 0 to unity at 255; ranges are scaled by
    /// the catalog's multipliers, with the minimum clamped to at least 1 and the maximum to at
    /// least the minimum.
    pub fn metadata(&self, scale: &DistanceScale) -> SoundMetadata {
        let volume = 10.0_f32.powf((self.volume as f32 / 255.0 * 3348.0 - 3348.0) / 2000.0);

        let (min, max) = if self.min_range == 0 && self.max_range == 0 {
            (scale.default_min, scale.default_max)
        } else {
            (self.min_range as f32, self.max_range as f32)
        };
        let min_distance = (min * scale.min_multiplier).max(1.0);
        let max_distance = (max * scale.max_multiplier).max(min_distance);

        SoundMetadata {
            volume,
            min_distance,
            max_distance,
        }
    }
}

/// Playback-ready values derived from a [`SoundRecord`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SoundMetadata {
    pub volume: f32,
    pub min_distance: f32,
    pub max_distance: f32,
}

/// Catalog-wide distance defaults and multipliers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceScale {
    pub default_min: f32,
    pub default_max: f32,
    pub min_multiplier: f32,
    pub max_multiplier: f32,
}

impl Default for DistanceScale {
    fn default() -> Self {
        Self {
            default_min: 5.0,
            default_max: 40.0,
            min_multiplier: 20.0,
            max_multiplier: 50.0,
        }
    }
}

/// Weighted ambient sound of a region.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionSound {
    pub sound: AssetId,
    /// Selection weight, out of at least 100
    pub chance: u8,
}

/// Read access to the sound records of the data store.
pub trait SoundCatalog {
    /// Every known sound; used to build the cache index on first access.
    fn sounds(&self) -> Vec<SoundRecord>;

    fn sound(&self, id: &AssetId) -> Option<SoundRecord> {
        self.sounds().into_iter().find(|record| &record.id == id)
    }

    fn distance_scale(&self) -> DistanceScale {
        DistanceScale::default()
    }

    fn region_sounds(&self, _region: &str) -> Vec<RegionSound> {
        Vec::new()
    }
}

/// In-memory catalog built up front.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    sounds: HashMap<AssetId, SoundRecord>,
    regions: HashMap<String, Vec<RegionSound>>,
    scale: DistanceScale,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sound(mut self, record: SoundRecord) -> Self {
        self.sounds.insert(record.id.clone(), record);
        self
    }

    pub fn with_region(mut self, region: &str, sounds: Vec<RegionSound>) -> Self {
        self.regions.insert(region.to_lowercase(), sounds);
        self
    }

    pub fn with_distance_scale(mut self, scale: DistanceScale) -> Self {
        self.scale = scale;
        self
    }
}

impl SoundCatalog for StaticCatalog {
    fn sounds(&self) -> Vec<SoundRecord> {
        self.sounds.values().cloned().collect()
    }

    fn sound(&self, id: &AssetId) -> Option<SoundRecord> {
        self.sounds.get(id).cloned()
    }

    fn distance_scale(&self) -> DistanceScale {
        self.scale
    }

    fn region_sounds(&self, region: &str) -> Vec<RegionSound> {
        self.regions
            .get(&region.to_lowercase())
            .cloned()
            .unwrap_or_default()
    }
}
