//! Sandboxed extension loader for externally authored patterns
//!
//! Pattern bodies are Rhai scripts. A script sees three values:
//! - `api`: its only capabilities (`telegraph`, `telegraph_homing`,
//!   `laser_row`, `laser_col`, `trap`, plus `rand`/`rand_int` helpers)
//! - `params`: `interval`, `speed`, `turn_rate`
//! - `field`: `size`, `tile`, `width`, `player_col`, `player_row`,
//!   `player_x`, `player_y`, `now`
//!
//! Capabilities never touch game state directly. They append to a sink owned by
//! the invocation: the dry run uses an inert sink that only counts calls, a
//! live run records [`Emission`]s that the simulation applies after the script
//! returns successfully. Both runs expose exactly the same functions.

use std::cell::RefCell;
use std::rc::Rc;

use rand::distr::Uniform;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use rhai::module_resolvers::DummyModuleResolver;
use rhai::{AST, Dynamic, Engine, EvalAltResult, FLOAT, INT, Map, Scope};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::geometry::{GridPos, field_bounds};
use super::pattern::{Emission, FieldView, PatternBehavior, PatternDef, PatternParams, PatternRegistry};
use super::registry::{LaserAxis, ProjectileSpawnSpec};
use crate::consts::*;
use crate::error::ValidationError;
use crate::grid_to_pixel;

/// Upper bound on capability calls in one invocation
pub const MAX_EMISSIONS_PER_RUN: usize = 64;
pub const MAX_PATTERN_NAME_LEN: usize = 32;
const DRY_RUN_SEED: u64 = 0x5eed_d2e7;

/// Resource limits applied to every script invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxLimits {
    pub max_operations: u64,
    pub max_call_levels: usize,
    pub max_expr_depth: usize,
    pub max_string_size: usize,
    pub max_array_size: usize,
    pub max_map_size: usize,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            max_operations: 100_000,
            max_call_levels: 16,
            max_expr_depth: 64,
            max_string_size: 1024,
            max_array_size: 256,
            max_map_size: 64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SandboxError {
    #[error("compile error: {0}")]
    Compile(String),
    #[error("runtime error: {0}")]
    Runtime(String),
}

/// A compiled, validated pattern body
#[derive(Debug, Clone)]
pub struct ScriptedPattern {
    ast: AST,
    pub rationale: String,
}

enum Sink {
    /// Dry run: validate and count, keep nothing
    Inert { calls: usize },
    Recording(Vec<Emission>),
}

struct ApiState {
    sink: Sink,
    rng: Pcg32,
    turn_rate: f32,
}

/// Capability object handed to a script as `api`
#[derive(Clone)]
pub struct ScriptApi {
    state: Rc<RefCell<ApiState>>,
}

type ScriptResult<T> = Result<T, Box<EvalAltResult>>;

impl ScriptApi {
    fn new(sink: Sink, seed: u64, turn_rate: f32) -> Self {
        Self {
            state: Rc::new(RefCell::new(ApiState {
                sink,
                rng: Pcg32::seed_from_u64(seed),
                turn_rate,
            })),
        }
    }

    fn calls(&self) -> usize {
        match &self.state.borrow().sink {
            Sink::Inert { calls } => *calls,
            Sink::Recording(emissions) => emissions.len(),
        }
    }

    fn take_emissions(&self) -> Vec<Emission> {
        match &mut self.state.borrow_mut().sink {
            Sink::Inert { .. } => Vec::new(),
            Sink::Recording(emissions) => std::mem::take(emissions),
        }
    }

    fn emit(&mut self, emission: Emission) -> ScriptResult<()> {
        if self.calls() >= MAX_EMISSIONS_PER_RUN {
            return Err(format!("emission limit of {MAX_EMISSIONS_PER_RUN} reached").into());
        }
        match &mut self.state.borrow_mut().sink {
            Sink::Inert { calls } => *calls += 1,
            Sink::Recording(emissions) => emissions.push(emission),
        }
        Ok(())
    }

    fn projectile(&self, x: &Dynamic, y: &Dynamic, vx: &Dynamic, vy: &Dynamic) -> ScriptResult<(glam::Vec2, glam::Vec2)> {
        let pos = glam::Vec2::new(number("x", x)?, number("y", y)?);
        let vel = glam::Vec2::new(number("vx", vx)?, number("vy", vy)?);
        if !field_bounds().expanded(CULL_MARGIN).contains(pos) {
            return Err(format!("telegraph at ({}, {}) is outside the field", pos.x, pos.y).into());
        }
        let speed_sq = vel.length_squared();
        if speed_sq <= f32::EPSILON {
            return Err("projectile velocity must be non-zero".into());
        }
        if !speed_sq.is_finite() {
            return Err(format!("projectile velocity ({}, {}) is too large", vel.x, vel.y).into());
        }
        Ok((pos, vel))
    }

    fn telegraph(&mut self, x: Dynamic, y: Dynamic, vx: Dynamic, vy: Dynamic) -> ScriptResult<()> {
        let (pos, vel) = self.projectile(&x, &y, &vx, &vy)?;
        self.emit(Emission::Telegraph(ProjectileSpawnSpec::standard(pos, vel)))
    }

    fn telegraph_homing(&mut self, x: Dynamic, y: Dynamic, vx: Dynamic, vy: Dynamic) -> ScriptResult<()> {
        let (pos, vel) = self.projectile(&x, &y, &vx, &vy)?;
        let turn_rate = self.state.borrow().turn_rate;
        self.emit(Emission::Telegraph(ProjectileSpawnSpec::homing(pos, vel, turn_rate)))
    }

    fn laser_row(&mut self, index: Dynamic) -> ScriptResult<()> {
        let row = lane("row", &index)?;
        self.emit(Emission::Laser(LaserAxis::Row(row)))
    }

    fn laser_col(&mut self, index: Dynamic) -> ScriptResult<()> {
        let col = lane("col", &index)?;
        self.emit(Emission::Laser(LaserAxis::Column(col)))
    }

    fn trap(&mut self, col: Dynamic, row: Dynamic) -> ScriptResult<()> {
        let cell = GridPos::new(lane("col", &col)?, lane("row", &row)?);
        self.emit(Emission::Trap(cell))
    }

    fn rand(&mut self, lo: Dynamic, hi: Dynamic) -> ScriptResult<FLOAT> {
        let (mut lo, mut hi) = (number("lo", &lo)?, number("hi", &hi)?);
        if lo > hi {
            std::mem::swap(&mut lo, &mut hi);
        }
        if (hi - lo).abs() <= f32::EPSILON {
            return Ok(lo as FLOAT);
        }
        let range = Uniform::new(lo, hi).map_err(|err| format!("rand({lo}, {hi}): {err}"))?;
        Ok(self.state.borrow_mut().rng.sample(range) as FLOAT)
    }

    fn rand_int(&mut self, lo: INT, hi: INT) -> ScriptResult<INT> {
        let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
        Ok(self.state.borrow_mut().rng.random_range(lo..=hi))
    }
}

fn number(label: &str, value: &Dynamic) -> ScriptResult<f32> {
    let n = if let Ok(f) = value.as_float() {
        f
    } else if let Ok(i) = value.as_int() {
        i as FLOAT
    } else {
        return Err(format!("{label}: expected a number, got {}", value.type_name()).into());
    };
    let narrowed = n as f32;
    if !narrowed.is_finite() {
        return Err(format!("{label}: {n} does not fit a finite f32").into());
    }
    Ok(narrowed)
}

fn lane(label: &str, value: &Dynamic) -> ScriptResult<i32> {
    let index = number(label, value)?.floor();
    if index < 0.0 || index >= GRID_SIZE as f32 {
        return Err(format!("{label} {index} is outside the {GRID_SIZE}x{GRID_SIZE} grid").into());
    }
    Ok(index as i32)
}

fn register_api(engine: &mut Engine) {
    engine.register_type_with_name::<ScriptApi>("Api");
    engine.register_fn("telegraph", ScriptApi::telegraph);
    engine.register_fn("telegraph_homing", ScriptApi::telegraph_homing);
    engine.register_fn("laser_row", ScriptApi::laser_row);
    engine.register_fn("laser_col", ScriptApi::laser_col);
    engine.register_fn("trap", ScriptApi::trap);
    engine.register_fn("rand", ScriptApi::rand);
    engine.register_fn("rand_int", ScriptApi::rand_int);
}

fn params_map(params: &PatternParams) -> Map {
    let mut map = Map::new();
    map.insert("interval".into(), Dynamic::from_float(params.interval_ms as FLOAT));
    map.insert("speed".into(), Dynamic::from_float(params.speed as FLOAT));
    map.insert(
        "turn_rate".into(),
        Dynamic::from_float(params.turn_rate.unwrap_or(DEFAULT_TURN_RATE) as FLOAT),
    );
    map
}

fn field_map(field: &FieldView) -> Map {
    let mut map = Map::new();
    map.insert("size".into(), Dynamic::from_int(GRID_SIZE as INT));
    map.insert("tile".into(), Dynamic::from_float(TILE_SIZE as FLOAT));
    map.insert("width".into(), Dynamic::from_float(FIELD_SIZE as FLOAT));
    map.insert("player_col".into(), Dynamic::from_int(field.player_cell.col as INT));
    map.insert("player_row".into(), Dynamic::from_int(field.player_cell.row as INT));
    map.insert("player_x".into(), Dynamic::from_float(field.player_pos.x as FLOAT));
    map.insert("player_y".into(), Dynamic::from_float(field.player_pos.y as FLOAT));
    map.insert("now".into(), Dynamic::from_float(field.now as FLOAT));
    map
}

/// Fixed stand-in geometry for dry runs
fn dry_run_field() -> FieldView {
    let cell = GridPos::center();
    FieldView {
        now: 0.0,
        player_cell: cell,
        player_pos: grid_to_pixel(cell),
    }
}

fn valid_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_PATTERN_NAME_LEN
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Script host shared by every scripted pattern
pub struct Sandbox {
    engine: Engine,
}

impl Sandbox {
    pub fn new(limits: &SandboxLimits) -> Self {
        let mut engine = Engine::new();
        engine.set_max_operations(limits.max_operations);
        engine.set_max_call_levels(limits.max_call_levels);
        engine.set_max_expr_depths(limits.max_expr_depth, limits.max_expr_depth);
        engine.set_max_string_size(limits.max_string_size);
        engine.set_max_array_size(limits.max_array_size);
        engine.set_max_map_size(limits.max_map_size);
        engine.set_module_resolver(DummyModuleResolver::new());
        engine.disable_symbol("eval");
        engine.on_print(|text| log::debug!("[pattern] {text}"));
        engine.on_debug(|text, _source, pos| log::debug!("[pattern] {pos:?} {text}"));
        register_api(&mut engine);
        Self { engine }
    }

    pub fn compile(&self, source: &str) -> Result<AST, SandboxError> {
        self.engine
            .compile(source)
            .map_err(|err| SandboxError::Compile(err.to_string()))
    }

    fn invoke(&self, ast: &AST, params: &PatternParams, field: &FieldView, api: ScriptApi) -> Result<(), SandboxError> {
        let mut scope = Scope::new();
        scope.push("api", api);
        scope.push_constant("params", params_map(params));
        scope.push_constant("field", field_map(field));
        self.engine
            .run_ast_with_scope(&mut scope, ast)
            .map_err(|err| SandboxError::Runtime(err.to_string()))
    }

    /// Execute once against inert capabilities and dummy geometry.
    /// Returns the number of capability calls the script made.
    pub fn dry_run(&self, ast: &AST) -> Result<usize, SandboxError> {
        let params = PatternParams::default();
        let api = ScriptApi::new(Sink::Inert { calls: 0 }, DRY_RUN_SEED, DEFAULT_TURN_RATE);
        self.invoke(ast, &params, &dry_run_field(), api.clone())?;
        Ok(api.calls())
    }

    /// Live invocation. Emissions are returned only when the whole script
    /// succeeds, so a failing run never half-applies.
    pub fn run(
        &self,
        pattern: &ScriptedPattern,
        params: &PatternParams,
        field: &FieldView,
        seed: u64,
    ) -> Result<Vec<Emission>, SandboxError> {
        let turn_rate = params.turn_rate.unwrap_or(DEFAULT_TURN_RATE);
        let api = ScriptApi::new(Sink::Recording(Vec::new()), seed, turn_rate);
        self.invoke(&pattern.ast, params, field, api.clone())?;
        Ok(api.take_emissions())
    }

    /// Full admission check for an external pattern: unique well-formed name,
    /// sane params, compiles, survives one dry run. Nothing is registered here.
    pub fn prepare(
        &self,
        registry: &PatternRegistry,
        name: &str,
        params: PatternParams,
        source: &str,
        rationale: &str,
    ) -> Result<PatternDef, ValidationError> {
        if registry.contains(name) {
            return Err(ValidationError::NameCollision(name.to_string()));
        }
        if !valid_name(name) {
            return Err(ValidationError::InvalidName(name.to_string()));
        }
        params.validate()?;

        let ast = self.compile(source).map_err(|err| ValidationError::Compile {
            name: name.to_string(),
            message: err.to_string(),
        })?;
        let calls = self.dry_run(&ast).map_err(|err| ValidationError::DryRun {
            name: name.to_string(),
            message: err.to_string(),
        })?;
        log::debug!("pattern {name} passed its dry run ({calls} capability calls)");

        Ok(PatternDef {
            name: name.to_string(),
            params,
            behavior: PatternBehavior::Scripted(ScriptedPattern {
                ast,
                rationale: rationale.to_string(),
            }),
        })
    }
}

impl Default for Sandbox {
    fn default() -> Self {
        Self::new(&SandboxLimits::default())
    }
}
