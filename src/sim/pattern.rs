//! Hazard patterns: definitions, built-in behaviors, the blacklist and
//! concurrent-pattern selection.
//!
//! Built-in and scripted patterns share one registry and one contract: when a
//! pattern's timer fires it produces a list of [`Emission`]s, which the
//! simulation applies to the entity registry.

use std::collections::BTreeSet;

use glam::Vec2;
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use super::geometry::{Direction, GridPos};
use super::registry::{LaserAxis, ProjectileSpawnSpec};
use super::sandbox::ScriptedPattern;
use super::scheduler::TimerHandle;
use crate::consts::*;
use crate::error::ValidationError;
use crate::grid_to_pixel;

/// Per-pattern tuning
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PatternParams {
    /// Time between firings (ms)
    pub interval_ms: f64,
    /// Projectile speed (pixels/sec)
    pub speed: f32,
    /// Homing steering rate (radians/sec)
    #[serde(default)]
    pub turn_rate: Option<f32>,
}

impl Default for PatternParams {
    fn default() -> Self {
        Self {
            interval_ms: 2500.0,
            speed: 200.0,
            turn_rate: None,
        }
    }
}

impl PatternParams {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.interval_ms.is_finite() || self.interval_ms < MIN_PATTERN_INTERVAL_MS {
            return Err(ValidationError::InvalidParams(format!(
                "interval {} ms is below the {} ms floor",
                self.interval_ms, MIN_PATTERN_INTERVAL_MS
            )));
        }
        if !self.speed.is_finite() || self.speed < 0.0 {
            return Err(ValidationError::InvalidParams(format!("speed {} is not a non-negative number", self.speed)));
        }
        if let Some(rate) = self.turn_rate {
            if !rate.is_finite() || rate < 0.0 {
                return Err(ValidationError::InvalidParams(format!("turn rate {rate} is not a non-negative number")));
            }
        }
        Ok(())
    }
}

/// What a firing pattern asks the simulation to create
#[derive(Debug, Clone, PartialEq)]
pub enum Emission {
    Telegraph(ProjectileSpawnSpec),
    /// Telegraph created `delay_ms` after the firing (wall-sweep stagger)
    DelayedTelegraph { delay_ms: f64, spec: ProjectileSpawnSpec },
    Laser(LaserAxis),
    Trap(GridPos),
}

/// Read-only view of the field handed to a firing pattern
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldView {
    pub now: f64,
    pub player_cell: GridPos,
    pub player_pos: Vec2,
}

/// The fixed set of built-in behaviors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuiltinPattern {
    Homing,
    Crossfire,
    WallSweep,
    Laser,
    TileTrap,
}

impl BuiltinPattern {
    pub const ALL: [BuiltinPattern; 5] = [
        BuiltinPattern::Homing,
        BuiltinPattern::Crossfire,
        BuiltinPattern::WallSweep,
        BuiltinPattern::Laser,
        BuiltinPattern::TileTrap,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            BuiltinPattern::Homing => "homing",
            BuiltinPattern::Crossfire => "crossfire",
            BuiltinPattern::WallSweep => "wall_sweep",
            BuiltinPattern::Laser => "laser",
            BuiltinPattern::TileTrap => "tile_trap",
        }
    }

    pub fn default_params(&self) -> PatternParams {
        match self {
            BuiltinPattern::Homing => PatternParams {
                interval_ms: 2200.0,
                speed: 180.0,
                turn_rate: Some(DEFAULT_TURN_RATE),
            },
            BuiltinPattern::Crossfire => PatternParams {
                interval_ms: 2600.0,
                speed: 220.0,
                turn_rate: None,
            },
            BuiltinPattern::WallSweep => PatternParams {
                interval_ms: 4200.0,
                speed: 160.0,
                turn_rate: None,
            },
            BuiltinPattern::Laser => PatternParams {
                interval_ms: 3000.0,
                speed: 0.0,
                turn_rate: None,
            },
            BuiltinPattern::TileTrap => PatternParams {
                interval_ms: 1800.0,
                speed: 0.0,
                turn_rate: None,
            },
        }
    }

    /// Produce this firing's hazards
    pub fn emit<R: Rng + ?Sized>(&self, params: &PatternParams, field: &FieldView, rng: &mut R) -> Vec<Emission> {
        match self {
            BuiltinPattern::Homing => {
                let edge = random_edge(rng);
                let pos = edge_point(edge, rng.random_range(0.0..FIELD_SIZE));
                let aim = (field.player_pos - pos).try_normalize().unwrap_or(edge.opposite().unit());
                let turn_rate = params.turn_rate.unwrap_or(DEFAULT_TURN_RATE);
                vec![Emission::Telegraph(ProjectileSpawnSpec::homing(
                    pos,
                    aim * params.speed,
                    turn_rate,
                ))]
            }
            BuiltinPattern::Crossfire => {
                let lane = grid_to_pixel(field.player_cell);
                let (a, b) = if rng.random_bool(0.5) {
                    (Direction::Left, Direction::Right)
                } else {
                    (Direction::Up, Direction::Down)
                };
                [a, b]
                    .into_iter()
                    .map(|edge| {
                        let along = match edge {
                            Direction::Left | Direction::Right => lane.y,
                            Direction::Up | Direction::Down => lane.x,
                        };
                        let vel = edge.opposite().unit() * params.speed;
                        Emission::Telegraph(ProjectileSpawnSpec::standard(edge_point(edge, along), vel))
                    })
                    .collect()
            }
            BuiltinPattern::WallSweep => {
                let edge = random_edge(rng);
                let gap = rng.random_range(0..GRID_SIZE);
                let vel = edge.opposite().unit() * params.speed;
                (0..GRID_SIZE)
                    .filter(|&lane| lane != gap)
                    .map(|lane| {
                        let along = (lane as f32 + 0.5) * TILE_SIZE;
                        Emission::DelayedTelegraph {
                            delay_ms: lane as f64 * WALL_SWEEP_STAGGER_MS,
                            spec: ProjectileSpawnSpec::wall(edge_point(edge, along), vel),
                        }
                    })
                    .collect()
            }
            BuiltinPattern::Laser => {
                let index = rng.random_range(0..GRID_SIZE);
                let axis = if rng.random_bool(0.5) {
                    LaserAxis::Row(index)
                } else {
                    LaserAxis::Column(index)
                };
                vec![Emission::Laser(axis)]
            }
            BuiltinPattern::TileTrap => {
                let cell = GridPos::new(rng.random_range(0..GRID_SIZE), rng.random_range(0..GRID_SIZE));
                vec![Emission::Trap(cell)]
            }
        }
    }
}

fn random_edge<R: Rng + ?Sized>(rng: &mut R) -> Direction {
    Direction::ALL[rng.random_range(0..Direction::ALL.len())]
}

/// Point on the field boundary on side `edge`, `along` pixels from the corner
fn edge_point(edge: Direction, along: f32) -> Vec2 {
    match edge {
        Direction::Up => Vec2::new(along, 0.0),
        Direction::Down => Vec2::new(along, FIELD_SIZE),
        Direction::Left => Vec2::new(0.0, along),
        Direction::Right => Vec2::new(FIELD_SIZE, along),
    }
}

/// How a pattern produces hazards
#[derive(Debug, Clone)]
pub enum PatternBehavior {
    Builtin(BuiltinPattern),
    Scripted(ScriptedPattern),
}

#[derive(Debug, Clone)]
pub struct PatternDef {
    pub name: String,
    pub params: PatternParams,
    pub behavior: PatternBehavior,
}

impl PatternDef {
    pub fn builtin(pattern: BuiltinPattern) -> Self {
        Self {
            name: pattern.name().to_string(),
            params: pattern.default_params(),
            behavior: PatternBehavior::Builtin(pattern),
        }
    }
}

/// Every pattern eligible for selection, built-in or admitted
#[derive(Debug, Clone)]
pub struct PatternRegistry {
    defs: Vec<PatternDef>,
}

impl Default for PatternRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl PatternRegistry {
    pub fn empty() -> Self {
        Self { defs: Vec::new() }
    }

    pub fn with_builtins() -> Self {
        Self {
            defs: BuiltinPattern::ALL.iter().map(|&p| PatternDef::builtin(p)).collect(),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.defs.iter().any(|d| d.name == name)
    }

    pub fn get(&self, name: &str) -> Option<&PatternDef> {
        self.defs.iter().find(|d| d.name == name)
    }

    /// Append a definition; names are unique
    pub fn register(&mut self, def: PatternDef) -> Result<(), ValidationError> {
        if self.contains(&def.name) {
            return Err(ValidationError::NameCollision(def.name));
        }
        self.defs.push(def);
        Ok(())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.defs.iter().map(|d| d.name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &PatternDef> {
        self.defs.iter()
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }
}

/// Unordered pattern-name pairs that must never run together
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blacklist {
    pairs: BTreeSet<(String, String)>,
}

impl Blacklist {
    fn key(a: &str, b: &str) -> (String, String) {
        if a <= b {
            (a.to_string(), b.to_string())
        } else {
            (b.to_string(), a.to_string())
        }
    }

    /// Returns false if the pair was already present
    pub fn insert(&mut self, a: &str, b: &str) -> bool {
        self.pairs.insert(Self::key(a, b))
    }

    pub fn contains(&self, a: &str, b: &str) -> bool {
        self.pairs.contains(&Self::key(a, b))
    }

    /// Would adding `candidate` to `chosen` realize a forbidden pair?
    pub fn conflicts<S: AsRef<str>>(&self, candidate: &str, chosen: &[S]) -> bool {
        chosen.iter().any(|c| self.contains(candidate, c.as_ref()))
    }

    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(a, b)| (a.as_str(), b.as_str()))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Identifies one activation of a pattern (the same definition can be
/// reactivated after being torn down)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActivationId(pub u64);

/// A running pattern bound to its periodic timer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivePattern {
    pub activation: ActivationId,
    pub name: String,
    pub timer: TimerHandle,
}

/// Number of patterns that should run at `level`
pub fn target_pattern_count(level: u32, max_simultaneous: usize) -> usize {
    max_simultaneous.min(level as usize + 1)
}

/// Draw up to `target` pattern names without replacement, skipping any
/// candidate that would form a blacklisted pair with one already chosen.
pub fn select_patterns<R: Rng + ?Sized>(
    registry: &PatternRegistry,
    blacklist: &Blacklist,
    target: usize,
    rng: &mut R,
) -> Vec<String> {
    let mut candidates: Vec<&str> = registry.names().collect();
    candidates.shuffle(rng);

    let mut chosen: Vec<String> = Vec::with_capacity(target);
    for candidate in candidates {
        if chosen.len() >= target {
            break;
        }
        if blacklist.conflicts(candidate, &chosen) {
            log::debug!("skipping pattern {candidate}: blacklisted with the current selection");
            continue;
        }
        chosen.push(candidate.to_string());
    }
    chosen
}
