//! Master and per-category volume control.

use crate::config::{Category, VolumeSettings};
use std::collections::HashMap;

/// Volume levels (0.0 to 1.0) for each category plus a master level.
#[derive(Debug, Clone)]
pub struct CategoryVolumes {
    master: f32,
    levels: HashMap<Category, f32>,
    muted: bool,
}

impl CategoryVolumes {
    pub fn new(settings: &VolumeSettings) -> Self {
        let levels = Category::ALL
            .iter()
            .map(|category| (*category, settings.category(*category).clamp(0.0, 1.0)))
            .collect();
        Self {
            master: settings.master.clamp(0.0, 1.0),
            levels,
            muted: false,
        }
    }

    pub fn set_master(&mut self, volume: f32) {
        self.master = volume.clamp(0.0, 1.0);
    }

    pub fn master(&self) -> f32 {
        self.master
    }

    pub fn set_level(&mut self, category: Category, volume: f32) {
        self.levels.insert(category, volume.clamp(0.0, 1.0));
    }

    pub fn level(&self, category: Category) -> f32 {
        self.levels.get(&category).copied().unwrap_or(1.0)
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    /// Multiplier applied to every session of `category`.
    pub fn effective(&self, category: Category) -> f32 {
        if self.muted {
            return 0.0;
        }
        self.master * self.level(category)
    }
}

impl Default for CategoryVolumes {
    fn default() -> Self {
        Self::new(&VolumeSettings::default())
    }
}
