//! Deterministic simulation module
//!
//! All gameplay logic lives here. This module must be pure and deterministic:
//! - Clock advanced only by `tick`
//! - Seeded RNG only
//! - Stable iteration order (spawn order, then timer handle)
//! - No rendering or platform dependencies

pub mod collision;
pub mod geometry;
pub mod gimmick;
pub mod hazard;
pub mod pattern;
pub mod registry;
mod round;
pub mod sandbox;
pub mod scheduler;
pub mod state;
pub mod tick;

pub use collision::{Hit, first_hit};
pub use geometry::{Aabb, Direction, GridPos};
pub use gimmick::{ActiveGimmick, Gimmick, GimmickController};
pub use hazard::{HazardKind, HazardPhase, HazardTimer};
pub use pattern::{
    Blacklist, BuiltinPattern, Emission, PatternDef, PatternParams, PatternRegistry, select_patterns,
    target_pattern_count,
};
pub use registry::{EntityId, EntityRegistry, LaserAxis, ProjectileKind, ProjectileSpawnSpec};
pub use sandbox::{Sandbox, SandboxError, SandboxLimits};
pub use state::{GameEvent, GamePhase, GameState, LevelRecord, Player, Snapshot};
pub use tick::{TickInput, tick};
