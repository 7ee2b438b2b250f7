//! The manager's view of the simulated world.
//!
//! World space is Z-up: terrain is sampled over `(x, y)` and water levels compare against `z`.

use crate::config::Environment;
use crate::math::{Pose, Vec3};

/// Opaque handle of a world entity that can emit sounds.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub u64);

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EntityId({})", self.0)
    }
}

/// The cell the player currently occupies.
#[derive(Debug, Clone, PartialEq)]
pub struct CellInfo {
    pub id: String,
    pub exterior: bool,
    pub region: Option<String>,
    /// `None` when the cell has no water
    pub water_level: Option<f32>,
}

/// Entity and environment queries answered by the host application.
pub trait WorldView {
    /// Current position of `entity`, or `None` if it no longer exists.
    fn position(&self, entity: EntityId) -> Option<Vec3>;

    fn player(&self) -> Option<EntityId>;

    fn is_player(&self, entity: EntityId) -> bool {
        self.player() == Some(entity)
    }

    fn cell(&self) -> Option<CellInfo>;

    /// Whether `entity` belongs to the cell with id `cell_id`.
    fn in_cell(&self, _entity: EntityId, _cell_id: &str) -> bool {
        false
    }

    /// Terrain height at a world-space column; negative values are below sea level.
    fn terrain_height_at(&self, _x: f32, _y: f32) -> f32 {
        0.0
    }
}

/// A world without entities or cells, for applications that only play 2D audio.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyWorld;

impl WorldView for EmptyWorld {
    fn position(&self, _entity: EntityId) -> Option<Vec3> {
        None
    }

    fn player(&self) -> Option<EntityId> {
        None
    }

    fn cell(&self) -> Option<CellInfo> {
        None
    }
}

/// Listener state pushed to the device once per update.
#[derive(Debug, Clone, Copy, Default)]
pub struct AudioListener {
    pub pose: Pose,
    pub environment: Environment,
}

impl AudioListener {
    pub fn position(&self) -> Vec3 {
        self.pose.position
    }

    pub fn is_underwater(&self) -> bool {
        self.environment == Environment::Underwater
    }
}
