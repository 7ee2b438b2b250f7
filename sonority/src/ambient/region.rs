use crate::asset::{AssetId, RegionSound};
use crate::config::RegionSoundSettings;
use rand::Rng;

/// Picks random region sounds at randomized intervals.
#[derive(Debug, Clone)]
pub struct RegionSoundSelector {
    settings: RegionSoundSettings,
    time_passed: f32,
    time_to_next: f32,
    last_region: Option<String>,
    chance_sum: u32,
}

impl RegionSoundSelector {
    pub fn new(settings: RegionSoundSettings) -> Self {
        Self {
            settings,
            time_passed: 0.0,
            time_to_next: 0.0,
            last_region: None,
            chance_sum: 0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.settings.enabled
    }

    /// Seconds until the next pick, counted from the last one.
    pub fn time_to_next(&self) -> f32 {
        self.time_to_next
    }

    /// Advances the timer by `dt` and, when it runs out, rolls a sound from `sounds`.
    ///
    /// Chances are weights out of `max(sum, 100)`, so a region whose chances sum to less
    /// than 100 is sometimes silent.
    pub fn next_sound<R: Rng + ?Sized>(
        &mut self,
        dt: f32,
        region: &str,
        sounds: &[RegionSound],
        rng: &mut R,
    ) -> Option<AssetId> {
        self.time_passed += dt;
        if self.time_passed < self.time_to_next {
            return None;
        }

        let min = self.settings.min_time_between_sounds;
        let max = self.settings.max_time_between_sounds.max(min);
        self.time_to_next = min + (max - min) * rng.r#gen::<f32>();
        self.time_passed = 0.0;

        if self.last_region.as_deref() != Some(region) {
            self.last_region = Some(region.to_string());
            self.chance_sum = 0;
        }
        if self.chance_sum == 0 {
            self.chance_sum = sounds.iter().map(|sound| u32::from(sound.chance)).sum();
            if self.chance_sum == 0 {
                return None;
            }
        }

        let roll = rng.gen_range(0..self.chance_sum.max(100));
        let mut position = 0;
        sounds
            .iter()
            .find(|sound| {
                if roll - position < u32::from(sound.chance) {
                    return true;
                }
                position += u32::from(sound.chance);
                false
            })
            .map(|sound| sound.sound.clone())
    }
}
