//! Grid Dodge - simulation core for a top-down arcade dodge game
//!
//! Core modules:
//! - `sim`: Deterministic simulation (player, hazards, patterns, gimmicks, collisions)
//! - `oracle`: Boundary types for the external pattern oracle
//! - `settings`: Round and sandbox configuration
//! - `error`: Validation failures raised at the collaborator boundary

pub mod error;
pub mod oracle;
pub mod settings;
pub mod sim;

pub use error::ValidationError;
pub use settings::{DifficultyMode, Settings};

use glam::Vec2;

use sim::geometry::GridPos;

/// Game configuration constants
pub mod consts {
    /// Nominal frame length (60 Hz host loop), milliseconds
    pub const FRAME_MS: f64 = 1000.0 / 60.0;
    /// Largest wall-clock delta a single tick will consume (tab stalls, breakpoints)
    pub const MAX_FRAME_MS: f64 = 100.0;

    /// Play field: GRID_SIZE x GRID_SIZE tiles
    pub const GRID_SIZE: i32 = 8;
    pub const TILE_SIZE: f32 = 60.0;
    pub const FIELD_SIZE: f32 = GRID_SIZE as f32 * TILE_SIZE;
    /// Projectiles are culled once this far outside the field
    pub const CULL_MARGIN: f32 = 60.0;

    /// Player footprint (square, pixels)
    pub const PLAYER_SIZE: f32 = 50.0;
    /// Baseline tween length for a single-cell move
    pub const MOVE_DURATION_MS: f64 = 120.0;

    /// Standard and homing projectile footprint (square, pixels)
    pub const PROJECTILE_SIZE: f32 = 20.0;
    /// Wall-sweep segment: long side across the direction of travel
    pub const WALL_SEGMENT_LENGTH: f32 = 48.0;
    pub const WALL_SEGMENT_THICKNESS: f32 = 16.0;

    /// Telegraph lead time before a projectile materializes
    pub const PROJECTILE_WARNING_DURATION_MS: f64 = 1000.0;
    /// Homing projectiles stop steering after this long
    pub const HOMING_DURATION_MS: f64 = 2500.0;
    /// Turn rate used when a homing pattern does not set one (radians/sec)
    pub const DEFAULT_TURN_RATE: f32 = 2.0;
    /// Delay between consecutive wall-sweep lanes
    pub const WALL_SWEEP_STAGGER_MS: f64 = 70.0;

    pub const LASER_WARNING_MS: f64 = 1200.0;
    pub const LASER_ACTIVE_MS: f64 = 600.0;
    pub const TRAP_WARNING_MS: f64 = 1000.0;
    pub const TRAP_ACTIVE_MS: f64 = 800.0;
    pub const EXPLOSION_LIFETIME_MS: f64 = 450.0;

    /// Score awarded for every tick survived
    pub const SCORE_PER_TICK: u64 = 1;
    pub const MAX_SIMULTANEOUS_PATTERNS: usize = 4;
    /// Oracle-proposed patterns may not fire faster than this
    pub const MIN_PATTERN_INTERVAL_MS: f64 = 250.0;

    /// Gimmick duration range (milliseconds)
    pub const GIMMICK_MIN_MS: f64 = 8000.0;
    pub const GIMMICK_MAX_MS: f64 = 15000.0;
    /// Gravity-well pull per tick (pixels)
    pub const GRAVITY_STEP: f32 = 1.5;
    /// Slippery tiles: cells travelled per input and tween stretch
    pub const SLIPPERY_STEP: i32 = 2;
    pub const SLIPPERY_DURATION_FACTOR: f64 = 1.5;

    /// Maximum timer catch-up firings per advance (prevents spiral of death)
    pub const MAX_TIMER_CATCH_UP: u32 = 8;
}

/// Pixel center of a grid cell
#[inline]
pub fn grid_to_pixel(cell: GridPos) -> Vec2 {
    Vec2::new(
        (cell.col as f32 + 0.5) * consts::TILE_SIZE,
        (cell.row as f32 + 0.5) * consts::TILE_SIZE,
    )
}

/// Grid cell containing a pixel position, clamped onto the field
#[inline]
pub fn pixel_to_grid(pos: Vec2) -> GridPos {
    let col = (pos.x / consts::TILE_SIZE).floor() as i32;
    let row = (pos.y / consts::TILE_SIZE).floor() as i32;
    GridPos::new(col, row).clamped()
}

/// Quadratic ease-out on [0, 1]
#[inline]
pub fn ease_out_quad(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    1.0 - (1.0 - t) * (1.0 - t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::*;

    #[test]
    fn test_grid_pixel_conversion() {
        let cell = GridPos::new(2, 3);
        let px = grid_to_pixel(cell);
        assert_eq!(px, Vec2::new(2.5 * TILE_SIZE, 3.5 * TILE_SIZE));
        assert_eq!(pixel_to_grid(px), cell);
    }

    #[test]
    fn test_pixel_to_grid_clamps() {
        assert_eq!(pixel_to_grid(Vec2::new(-40.0, -1.0)), GridPos::new(0, 0));
        let far = Vec2::splat(FIELD_SIZE + 100.0);
        assert_eq!(pixel_to_grid(far), GridPos::new(GRID_SIZE - 1, GRID_SIZE - 1));
    }

    #[test]
    fn test_ease_out_quad_endpoints() {
        assert_eq!(ease_out_quad(0.0), 0.0);
        assert_eq!(ease_out_quad(1.0), 1.0);
        assert_eq!(ease_out_quad(2.0), 1.0);
        assert!(ease_out_quad(0.5) > 0.5);
    }
}
