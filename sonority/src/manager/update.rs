use super::{SonorityManager, SoundOptions};
use crate::ambient::{WaterSoundAction, water_sound_action};
use crate::asset::AssetId;
use crate::config::PlayMode;
use crate::session::SessionState;
use crate::world::CellInfo;
use std::time::Instant;

impl SonorityManager {
    /// Advances all playback by `dt` seconds. Call once per frame.
    ///
    /// Device work for the tick, including the listener push, happens between one
    /// `start_update` and one `finish_update`.
    pub fn update(&mut self, dt: f32) {
        if !self.is_output_ready() || self.playback_paused {
            return;
        }
        let now = Instant::now();

        self.device.start_update();

        self.process_effect_loads(now);
        self.process_voice_loads(now);

        self.update_effects(dt);
        self.update_voices(dt);
        self.update_tracks(dt);
        self.update_music(dt, now);

        if let Some(elapsed) = self.ambient_clock.tick(dt) {
            self.update_ambient(elapsed);
        }

        let pose = self.listener.pose;
        self.device.update_listener(
            pose.position,
            pose.forward(),
            pose.up(),
            self.listener.environment,
        );
        self.device.finish_update();
    }

    fn update_ambient(&mut self, elapsed: f32) {
        let cell = self.world.cell();
        self.update_region_sound(elapsed, cell.as_ref());
        self.update_water_sound(cell.as_ref());
        self.update_underwater_sound();
    }

    fn update_region_sound(&mut self, elapsed: f32, cell: Option<&CellInfo>) {
        if !self.region_sounds.is_enabled() {
            return;
        }
        let Some(region) = cell
            .filter(|cell| cell.exterior)
            .and_then(|cell| cell.region.as_deref())
        else {
            return;
        };
        if self.region_sound.is_some_and(|s| self.is_sound_playing(s)) {
            return;
        }

        let sounds = self.catalog.region_sounds(region);
        if let Some(sound) = self
            .region_sounds
            .next_sound(elapsed, region, &sounds, &mut self.rng)
        {
            log::debug!("Region sound {} in {}", sound, region);
            self.region_sound = self.play_sound(sound, SoundOptions::default());
        }
    }

    fn update_water_sound(&mut self, cell: Option<&CellInfo>) {
        if !self.water.is_enabled() {
            return;
        }
        let update = self.water.update(
            self.world.as_ref(),
            self.listener.position(),
            self.listener.is_underwater(),
        );
        let cell_id = cell.map(|cell| cell.id.clone());
        let cell_changed = self.last_cell != cell_id;
        let action = water_sound_action(
            self.near_water.as_ref().map(|(_, id)| id),
            &update,
            cell_changed,
        );

        match action {
            WaterSoundAction::DoNothing => {}
            WaterSoundAction::SetVolume => {
                if let Some((session, id)) = &self.near_water {
                    let asset_volume = self
                        .cache
                        .lookup(id)
                        .map(|buffer| self.cache.entry(buffer).volume())
                        .unwrap_or(1.0);
                    if let Some(state) = self.pool.get_mut(*session) {
                        // Loading sessions get the asset volume applied when they start
                        let scale = if state.state == SessionState::Playing {
                            asset_volume
                        } else {
                            1.0
                        };
                        state.params.base_volume = update.volume * scale;
                    }
                }
            }
            WaterSoundAction::FinishSound => {
                if let Some((session, _)) = self.near_water.take() {
                    self.stop_sound(session);
                }
            }
            WaterSoundAction::PlaySound => {
                if let Some((session, _)) = self.near_water.take() {
                    self.stop_sound(session);
                }
                let options = SoundOptions::default()
                    .volume(update.volume)
                    .mode(PlayMode::LOOP);
                self.near_water = self
                    .play_sound(update.id.clone(), options)
                    .map(|session| (session, update.id));
            }
        }
        self.last_cell = cell_id;
    }

    fn update_underwater_sound(&mut self) {
        let underwater = self.listener.is_underwater();
        match self.underwater_sound {
            None if underwater => {
                let asset = AssetId::new(&self.desc.underwater_sound);
                self.underwater_sound =
                    self.play_sound(asset, SoundOptions::default().mode(PlayMode::LOOP_NO_ENV));
            }
            Some(session) if !underwater => {
                self.stop_sound(session);
                self.underwater_sound = None;
            }
            _ => {}
        }
    }
}
