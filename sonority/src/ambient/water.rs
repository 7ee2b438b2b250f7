use crate::asset::AssetId;
use crate::config::WaterSoundSettings;
use crate::math::Vec3;
use crate::world::{CellInfo, WorldView};

/// Desired near-water sound for the listener's current spot.
#[derive(Debug, Clone, PartialEq)]
pub struct WaterSoundUpdate {
    /// `0.0..=1.0`
    pub volume: f32,
    pub id: AssetId,
}

/// What to do with the near-water sound this update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaterSoundAction {
    DoNothing,
    SetVolume,
    FinishSound,
    PlaySound,
}

/// Decides how to move from the current near-water sound to `update`.
///
/// `current` is the id of the sound playing now, if any. A different id only replaces the
/// playing sound when the listener changed cells.
pub fn water_sound_action(
    current: Option<&AssetId>,
    update: &WaterSoundUpdate,
    cell_changed: bool,
) -> WaterSoundAction {
    match current {
        Some(_) if update.volume == 0.0 => WaterSoundAction::FinishSound,
        Some(id) if cell_changed && *id != update.id => WaterSoundAction::PlaySound,
        Some(_) => WaterSoundAction::SetVolume,
        None if update.volume > 0.0 => WaterSoundAction::PlaySound,
        None => WaterSoundAction::DoNothing,
    }
}

/// Estimates how much water surrounds the listener.
#[derive(Debug, Clone)]
pub struct WaterSoundUpdater {
    settings: WaterSoundSettings,
}

impl WaterSoundUpdater {
    pub fn new(settings: WaterSoundSettings) -> Self {
        Self { settings }
    }

    pub fn is_enabled(&self) -> bool {
        self.settings.enabled
    }

    pub fn update(
        &self,
        world: &dyn WorldView,
        listener: Vec3,
        underwater: bool,
    ) -> WaterSoundUpdate {
        let cell = world.cell();
        let exterior = cell.as_ref().is_some_and(|cell| cell.exterior);
        let id = if exterior {
            &self.settings.outdoor_sound
        } else {
            &self.settings.indoor_sound
        };
        WaterSoundUpdate {
            volume: self
                .volume(world, cell.as_ref(), listener, underwater)
                .min(1.0),
            id: AssetId::new(id),
        }
    }

    fn volume(
        &self,
        world: &dyn WorldView,
        cell: Option<&CellInfo>,
        listener: Vec3,
        underwater: bool,
    ) -> f32 {
        if underwater {
            return 1.0;
        }
        let Some(cell) = cell else {
            return 0.0;
        };
        let Some(water_level) = cell.water_level else {
            return 0.0;
        };

        let distance = (water_level - listener.z).abs();
        let settings = &self.settings;

        if cell.exterior && distance <= settings.outdoor_tolerance {
            if settings.nearby_points <= 1 {
                return (settings.outdoor_tolerance - distance) / settings.outdoor_tolerance;
            }
            return self.wet_fraction(world, listener);
        }
        if !cell.exterior && distance <= settings.indoor_tolerance {
            return (settings.indoor_tolerance - distance) / settings.indoor_tolerance;
        }
        0.0
    }

    /// Samples a square grid around the listener and scores the share of points below sea
    /// level; half the grid submerged already counts as full volume.
    fn wet_fraction(&self, world: &dyn WorldView, listener: Vec3) -> f32 {
        let points = self.settings.nearby_points;
        let radius = self.settings.nearby_radius;
        let step = radius * 2.0 / (points - 1) as f32;

        let mut wet = 0u32;
        for x in 0..points {
            for y in 0..points {
                let sample_x = listener.x - radius + x as f32 * step;
                let sample_y = listener.y - radius + y as f32 * step;
                if world.terrain_height_at(sample_x, sample_y) < 0.0 {
                    wet += 1;
                }
            }
        }
        wet as f32 * 2.0 / (points * points) as f32
    }
}
