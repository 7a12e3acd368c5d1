//! Entity registry: the authoritative collections of projectiles, telegraphs,
//! lasers, traps and explosions.
//!
//! Every collection is a `Vec` kept in spawn (= id) order, so iteration within
//! one advance is deterministic. Nothing outside the simulation mutates these
//! collections; collaborators read them through the slice accessors.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::geometry::{Aabb, GridPos, field_bounds};
use super::hazard::{HazardKind, HazardTimer, HazardTransition};
use crate::consts::*;

/// Entity identifier, unique for the lifetime of a round
pub type EntityId = u32;

/// Projectile flavours
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProjectileKind {
    Standard,
    Homing,
    WallSweep,
}

/// Everything needed to materialize a projectile once its telegraph expires
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProjectileSpawnSpec {
    pub kind: ProjectileKind,
    pub pos: Vec2,
    /// Pixels per second
    pub vel: Vec2,
    /// Homing only: maximum steering rate (radians/sec)
    pub turn_rate: f32,
}

impl ProjectileSpawnSpec {
    pub fn standard(pos: Vec2, vel: Vec2) -> Self {
        Self {
            kind: ProjectileKind::Standard,
            pos,
            vel,
            turn_rate: 0.0,
        }
    }

    pub fn homing(pos: Vec2, vel: Vec2, turn_rate: f32) -> Self {
        Self {
            kind: ProjectileKind::Homing,
            pos,
            vel,
            turn_rate,
        }
    }

    pub fn wall(pos: Vec2, vel: Vec2) -> Self {
        Self {
            kind: ProjectileKind::WallSweep,
            pos,
            vel,
            turn_rate: 0.0,
        }
    }
}

/// Homing state; cleared once `until` passes and the projectile flies straight
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Homing {
    pub until: f64,
    pub turn_rate: f32,
}

/// A live projectile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Projectile {
    pub id: EntityId,
    pub kind: ProjectileKind,
    pub pos: Vec2,
    pub vel: Vec2,
    pub homing: Option<Homing>,
}

impl Projectile {
    /// Collision box. Wall segments are long across their direction of travel;
    /// any rotation is a rendering concern.
    pub fn footprint(&self) -> Aabb {
        let size = match self.kind {
            ProjectileKind::WallSweep if self.vel.x.abs() >= self.vel.y.abs() => {
                Vec2::new(WALL_SEGMENT_THICKNESS, WALL_SEGMENT_LENGTH)
            }
            ProjectileKind::WallSweep => Vec2::new(WALL_SEGMENT_LENGTH, WALL_SEGMENT_THICKNESS),
            _ => Vec2::splat(PROJECTILE_SIZE),
        };
        Aabb::from_center(self.pos, size)
    }

    /// Re-steer toward `target` (homing only), then integrate position
    pub fn advance(&mut self, target: Vec2, dt_secs: f32, now: f64) {
        if let Some(homing) = self.homing {
            if now >= homing.until {
                self.homing = None;
            } else {
                let desired = target - self.pos;
                if desired.length_squared() > f32::EPSILON && self.vel.length_squared() > f32::EPSILON {
                    // Clamp the turn to this tick's budget; rotation keeps the speed
                    let max_turn = homing.turn_rate * dt_secs;
                    let turn = self.vel.angle_to(desired).clamp(-max_turn, max_turn);
                    self.vel = Vec2::from_angle(turn).rotate(self.vel);
                }
            }
        }
        self.pos += self.vel * dt_secs;
    }
}

/// Pre-projectile warning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Telegraph {
    pub id: EntityId,
    pub pos: Vec2,
    pub created_at: f64,
    pub spec: ProjectileSpawnSpec,
    /// Render hint: unit direction of travel
    pub direction: Vec2,
}

impl Telegraph {
    /// Render hint
    pub fn kind(&self) -> ProjectileKind {
        self.spec.kind
    }
}

/// Which line a laser covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LaserAxis {
    Row(i32),
    Column(i32),
}

impl LaserAxis {
    pub fn covers(&self, cell: GridPos) -> bool {
        match *self {
            LaserAxis::Row(row) => cell.row == row,
            LaserAxis::Column(col) => cell.col == col,
        }
    }

    pub fn footprint(&self) -> Aabb {
        match *self {
            LaserAxis::Row(row) => Aabb::row(row),
            LaserAxis::Column(col) => Aabb::column(col),
        }
    }

    pub fn in_bounds(&self) -> bool {
        let index = match *self {
            LaserAxis::Row(i) | LaserAxis::Column(i) => i,
        };
        (0..GRID_SIZE).contains(&index)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Laser {
    pub id: EntityId,
    pub axis: LaserAxis,
    pub timer: HazardTimer,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trap {
    pub id: EntityId,
    pub cell: GridPos,
    pub timer: HazardTimer,
}

/// Cosmetic burst; no gameplay effect
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explosion {
    pub id: EntityId,
    pub area: Aabb,
    pub created_at: f64,
}

/// Spawn request, one variant per entity kind
#[derive(Debug, Clone, PartialEq)]
pub enum Spawn {
    Projectile(ProjectileSpawnSpec),
    Telegraph(ProjectileSpawnSpec),
    Laser(LaserAxis),
    Trap(GridPos),
    Explosion(Aabb),
}

/// A hazard that changed phase during `advance_hazards`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HazardChange {
    pub id: EntityId,
    pub kind: HazardKind,
    pub footprint: Aabb,
    pub transition: HazardTransition,
}

/// Owner of every round-scoped entity
#[derive(Debug, Clone, Default)]
pub struct EntityRegistry {
    projectiles: Vec<Projectile>,
    telegraphs: Vec<Telegraph>,
    lasers: Vec<Laser>,
    traps: Vec<Trap>,
    explosions: Vec<Explosion>,
    next_id: EntityId,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            ..Default::default()
        }
    }

    fn next_entity_id(&mut self) -> EntityId {
        let id = self.next_id.max(1);
        self.next_id = id + 1;
        id
    }

    /// Create an entity of the requested kind
    pub fn spawn(&mut self, spawn: Spawn, now: f64) -> EntityId {
        let id = self.next_entity_id();
        match spawn {
            Spawn::Projectile(spec) => {
                let homing = (spec.kind == ProjectileKind::Homing).then_some(Homing {
                    until: now + HOMING_DURATION_MS,
                    turn_rate: spec.turn_rate,
                });
                self.projectiles.push(Projectile {
                    id,
                    kind: spec.kind,
                    pos: spec.pos,
                    vel: spec.vel,
                    homing,
                });
            }
            Spawn::Telegraph(spec) => self.telegraphs.push(Telegraph {
                id,
                pos: spec.pos,
                created_at: now,
                spec,
                direction: spec.vel.normalize_or_zero(),
            }),
            Spawn::Laser(axis) => {
                debug_assert!(axis.in_bounds(), "laser {axis:?} outside the grid");
                self.lasers.push(Laser {
                    id,
                    axis,
                    timer: HazardTimer::new(HazardKind::Laser, now),
                });
            }
            Spawn::Trap(cell) => {
                debug_assert!(cell.in_bounds(), "trap {cell:?} outside the grid");
                self.traps.push(Trap {
                    id,
                    cell,
                    timer: HazardTimer::new(HazardKind::Trap, now),
                });
            }
            Spawn::Explosion(area) => self.explosions.push(Explosion {
                id,
                area,
                created_at: now,
            }),
        }
        id
    }

    pub fn projectiles(&self) -> &[Projectile] {
        &self.projectiles
    }

    pub fn telegraphs(&self) -> &[Telegraph] {
        &self.telegraphs
    }

    pub fn lasers(&self) -> &[Laser] {
        &self.lasers
    }

    pub fn traps(&self) -> &[Trap] {
        &self.traps
    }

    pub fn explosions(&self) -> &[Explosion] {
        &self.explosions
    }

    /// Move every projectile; homing ones steer toward `target`
    pub fn advance_projectiles(&mut self, target: Vec2, dt_secs: f32, now: f64) {
        for projectile in &mut self.projectiles {
            projectile.advance(target, dt_secs, now);
        }
    }

    /// Drop projectiles that left the field (plus margin)
    pub fn cull_projectiles(&mut self) -> Vec<EntityId> {
        let bounds = field_bounds().expanded(CULL_MARGIN);
        let mut removed = Vec::new();
        self.projectiles.retain(|p| {
            let keep = bounds.contains(p.pos);
            if !keep {
                removed.push(p.id);
            }
            keep
        });
        removed
    }

    /// Remove telegraphs whose warning elapsed and hand back their specs
    pub fn expire_telegraphs(&mut self, now: f64) -> Vec<ProjectileSpawnSpec> {
        let mut expired = Vec::new();
        self.telegraphs.retain(|t| {
            if now - t.created_at >= PROJECTILE_WARNING_DURATION_MS {
                expired.push(t.spec);
                false
            } else {
                true
            }
        });
        expired
    }

    /// Step every laser and trap state machine
    pub fn advance_hazards(&mut self, now: f64) -> Vec<HazardChange> {
        let mut changes = Vec::new();
        for laser in &mut self.lasers {
            if let Some(transition) = laser.timer.advance(now) {
                changes.push(HazardChange {
                    id: laser.id,
                    kind: HazardKind::Laser,
                    footprint: laser.axis.footprint(),
                    transition,
                });
            }
        }
        for trap in &mut self.traps {
            if let Some(transition) = trap.timer.advance(now) {
                changes.push(HazardChange {
                    id: trap.id,
                    kind: HazardKind::Trap,
                    footprint: Aabb::cell(trap.cell),
                    transition,
                });
            }
        }
        changes
    }

    pub fn cull_hazards(&mut self) -> Vec<EntityId> {
        let mut removed = Vec::new();
        self.lasers.retain(|l| {
            if l.timer.is_removed() {
                removed.push(l.id);
                false
            } else {
                true
            }
        });
        self.traps.retain(|t| {
            if t.timer.is_removed() {
                removed.push(t.id);
                false
            } else {
                true
            }
        });
        removed
    }

    pub fn cull_explosions(&mut self, now: f64) -> Vec<EntityId> {
        let mut removed = Vec::new();
        self.explosions.retain(|e| {
            let keep = now - e.created_at < EXPLOSION_LIFETIME_MS;
            if !keep {
                removed.push(e.id);
            }
            keep
        });
        removed
    }

    /// Reset for a new round; ids restart
    pub fn clear(&mut self) {
        *self = Self::new();
    }

    pub fn is_empty(&self) -> bool {
        self.projectiles.is_empty()
            && self.telegraphs.is_empty()
            && self.lasers.is_empty()
            && self.traps.is_empty()
            && self.explosions.is_empty()
    }
}
