use anyhow::{Context, Result};
use sonority::asset::RegionSound;
use sonority::math::{Pose, Quat, Vec3};
use sonority::{
    CellInfo, CpalDevice, EntityId, FileDecoderProvider, SonorityDesc, SonorityEvent,
    SonorityManager, SoundOptions, SoundRecord, StaticCatalog, WorldView,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

const FRAME: Duration = Duration::from_millis(16);
const CELL: &str = "seyda neen";

/// A single NPC walking in circles around the listener on a beach.
struct DemoWorld {
    /// Elapsed frames, advanced by the main loop
    frame: Arc<AtomicU32>,
}

impl DemoWorld {
    const NPC: EntityId = EntityId(1);
}

impl WorldView for DemoWorld {
    fn position(&self, entity: EntityId) -> Option<Vec3> {
        if entity != Self::NPC {
            return None;
        }
        let angle = self.frame.load(Ordering::Relaxed) as f32 * 0.01;
        Some(Vec3::new(angle.cos() * 300.0, angle.sin() * 300.0, 0.0))
    }

    fn player(&self) -> Option<EntityId> {
        None
    }

    fn cell(&self) -> Option<CellInfo> {
        Some(CellInfo {
            id: CELL.into(),
            exterior: true,
            region: Some("bitter coast".into()),
            water_level: Some(0.0),
        })
    }

    fn in_cell(&self, entity: EntityId, cell_id: &str) -> bool {
        entity == Self::NPC && cell_id == CELL
    }

    // Sea to the west
    fn terrain_height_at(&self, x: f32, _y: f32) -> f32 {
        if x < 0.0 { -50.0 } else { 20.0 }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Debug)
        .init();

    let mut args = std::env::args().skip(1);
    let data_dir = PathBuf::from(args.next().unwrap_or_else(|| "sonority-demo/data".into()));
    let desc = match args.next() {
        Some(settings) => SonorityDesc::load_from_file(&settings)
            .with_context(|| format!("Failed to read settings from {}", settings))?,
        None => SonorityDesc::default(),
    };

    log::info!("=== Sonority demo, data from {} ===", data_dir.display());
    run(data_dir, desc)
}

fn catalog() -> StaticCatalog {
    StaticCatalog::new()
        .with_sound(SoundRecord::new("door", "fx/door.wav"))
        .with_sound(SoundRecord::new("footstep", "fx/footstep.wav").with_range(1, 20))
        .with_sound(SoundRecord::new("water layer", "fx/water.wav").with_volume(200))
        .with_sound(SoundRecord::new("underwater", "fx/underwater.wav"))
        .with_sound(SoundRecord::new("gull", "fx/gull.wav"))
        .with_region(
            "bitter coast",
            vec![RegionSound {
                sound: "gull".into(),
                chance: 40,
            }],
        )
}

fn run(data_dir: PathBuf, desc: SonorityDesc) -> Result<()> {
    let frame = Arc::new(AtomicU32::new(0));
    let world = DemoWorld {
        frame: frame.clone(),
    };

    let mut manager = SonorityManager::new(
        desc,
        Box::new(CpalDevice::new()),
        Arc::new(FileDecoderProvider::new(data_dir)),
        Box::new(catalog()),
        Box::new(world),
    )?;
    if !manager.is_output_ready() {
        log::error!("No audio output available; the demo will run silently");
    }

    log::info!("Preloading the door sound...");
    manager.preload_sound("door");

    log::info!("Playing a door slam in 2D");
    manager.play_sound("door", SoundOptions::default().volume(0.8));

    log::info!("NPC starts walking with looping footsteps");
    manager.play_sound_3d(
        DemoWorld::NPC,
        "footstep",
        SoundOptions::default().mode(sonority::PlayMode::LOOP_REMOVE_AT_DISTANCE),
    );

    log::info!("NPC greets the player");
    manager.say(Some(DemoWorld::NPC), "vo/greeting.mp3");

    log::info!("Starting the explore playlist");
    manager.play_playlist("explore");

    for tick in 0..1200u32 {
        frame.store(tick, Ordering::Relaxed);

        // Turn slowly; dive under water for the last quarter
        let rotation = Quat::from_rotation_z(tick as f32 * 0.002);
        let underwater = tick >= 900;
        manager.set_listener_pose(Pose::new(Vec3::ZERO, rotation), underwater);
        manager.update(FRAME.as_secs_f32());

        if tick == 600 {
            log::info!("Fading out the footsteps over two seconds");
            manager.fade_out_sound_3d(DemoWorld::NPC, "footstep", 2.0);
        }

        if tick == 1100 {
            log::info!("Leaving {}; its sounds stop", CELL);
            manager.stop_cell(CELL);
        }

        for event in manager.poll_events() {
            if event.is_music_event() {
                log::info!("Music: {:?}", event);
                continue;
            }
            match event {
                SonorityEvent::VoiceStarted { name, .. } => log::info!("Voice started: {}", name),
                SonorityEvent::VoiceFinished { .. } => log::info!("Voice finished"),
                SonorityEvent::LoadFailed { name, error } => {
                    log::warn!("Could not load {}: {}", name, error)
                }
                event => match event.session() {
                    Some(session) => log::debug!("{}: {:?}", session, event),
                    None => log::debug!("{:?}", event),
                },
            }
        }

        std::thread::sleep(FRAME);
    }

    log::info!("Shutting down");
    manager.shutdown();
    log::info!("Demo completed successfully");
    Ok(())
}
