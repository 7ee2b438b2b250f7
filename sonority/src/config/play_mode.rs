use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Volume category a playback belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Short sound effects played from cached buffers
    Effect,
    /// Streamed speech lines
    Voice,
    /// Streamed background music
    Music,
    /// Generic streamed tracks (movies, scripted audio)
    Track,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Effect,
        Category::Voice,
        Category::Music,
        Category::Track,
    ];

    pub fn mask(self) -> CategoryMask {
        match self {
            Category::Effect => CategoryMask::EFFECT,
            Category::Voice => CategoryMask::VOICE,
            Category::Music => CategoryMask::MUSIC,
            Category::Track => CategoryMask::TRACK,
        }
    }
}

bitflags! {
    /// Flags controlling how a single playback behaves.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PlayMode: u32 {
        /// Restart from the beginning when the end is reached
        const LOOP = 1 << 0;
        /// Ignore the listener environment (no underwater filtering)
        const NO_ENV = 1 << 1;
        /// Stop the sound once it is farther than the cull distance
        const REMOVE_AT_DISTANCE = 1 << 2;
        /// Play sounds emitted by the player in 3D instead of 2D
        const NO_PLAYER_LOCAL = 1 << 3;
        /// Skip the distance attenuation curve
        const NO_SCALING = 1 << 4;

        const LOOP_NO_ENV = Self::LOOP.bits() | Self::NO_ENV.bits();
        const LOOP_REMOVE_AT_DISTANCE = Self::LOOP.bits() | Self::REMOVE_AT_DISTANCE.bits();
    }
}

bitflags! {
    /// Set of categories, used for pausing.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CategoryMask: u32 {
        const EFFECT = 1 << 0;
        const VOICE = 1 << 1;
        const MUSIC = 1 << 2;
        const TRACK = 1 << 3;
    }
}

impl CategoryMask {
    pub fn contains_category(self, category: Category) -> bool {
        self.contains(category.mask())
    }
}

/// Acoustic environment the listener is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Normal,
    Underwater,
}
