//! Environmental sounds driven by the listener's surroundings.

mod region;
mod water;

pub use region::RegionSoundSelector;
pub use water::{WaterSoundAction, WaterSoundUpdate, WaterSoundUpdater, water_sound_action};

/// Coalesces short ticks into updates no more frequent than `interval`.
#[derive(Debug, Clone, Copy)]
pub struct AmbientClock {
    interval: f32,
    accumulated: f32,
}

impl AmbientClock {
    pub fn new(interval: f32) -> Self {
        Self {
            interval: interval.max(0.0),
            accumulated: 0.0,
        }
    }

    /// Adds `dt` and returns the total elapsed time once it reaches the interval.
    pub fn tick(&mut self, dt: f32) -> Option<f32> {
        self.accumulated += dt;
        if self.accumulated < self.interval {
            return None;
        }
        Some(std::mem::take(&mut self.accumulated))
    }
}
