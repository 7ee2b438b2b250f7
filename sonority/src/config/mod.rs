mod play_mode;
mod settings;

pub use play_mode::{Category, CategoryMask, Environment, PlayMode};
pub use settings::{
    HrtfMode, RegionSoundSettings, SonorityDesc, VolumeSettings, WaterSoundSettings,
};
