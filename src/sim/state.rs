//! Game state structures
//!
//! `GameState` is the single owner of everything a round touches. Render and
//! host collaborators only see [`Snapshot`]s and drained [`GameEvent`]s.

use glam::Vec2;
use rand::SeedableRng;
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use super::collision::Hit;
use super::geometry::{Aabb, Direction, GridPos, field_bounds};
use super::gimmick::{ActiveGimmick, Gimmick, GimmickController};
use super::hazard::HazardKind;
use super::pattern::{ActivationId, ActivePattern, Blacklist, FieldView, PatternRegistry};
use super::registry::{EntityId, EntityRegistry, Explosion, Laser, Projectile, ProjectileSpawnSpec, Telegraph, Trap};
use super::sandbox::Sandbox;
use super::scheduler::Scheduler;
use crate::consts::*;
use crate::oracle::{OracleKind, OracleLedger, OracleRequest};
use crate::settings::{DifficultyMode, Settings};
use crate::{ease_out_quad, grid_to_pixel, pixel_to_grid};

/// Current phase of the game
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum GamePhase {
    /// No round running
    #[default]
    Menu,
    Playing,
    /// Round ended by a hit (or aborted); entities stay for the final frame
    GameOver,
}

/// The player avatar: a logical grid cell plus a tweened pixel position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    /// Logical cell; the destination while a tween runs. Grid hazards
    /// collide against this, never the pixel position.
    pub cell: GridPos,
    pub pos: Vec2,
    pub moving: bool,
    pub move_from: Vec2,
    pub move_to: Vec2,
    pub move_start_ms: f64,
    pub move_duration_ms: f64,
}

impl Player {
    pub fn at(cell: GridPos) -> Self {
        let pos = grid_to_pixel(cell);
        Self {
            cell,
            pos,
            moving: false,
            move_from: pos,
            move_to: pos,
            move_start_ms: 0.0,
            move_duration_ms: MOVE_DURATION_MS,
        }
    }

    /// Start a tween toward the neighbouring cell (two cells when slippery).
    ///
    /// The logical cell jumps to the destination immediately; the pixel
    /// position catches up over the tween. An intent arriving mid-tween
    /// retargets from the current pixel position. Returns false if the
    /// clamped destination is the cell already targeted.
    pub fn begin_move(&mut self, dir: Direction, now: f64, slippery: bool) -> bool {
        let (steps, duration) = if slippery {
            (SLIPPERY_STEP, MOVE_DURATION_MS * SLIPPERY_DURATION_FACTOR)
        } else {
            (1, MOVE_DURATION_MS)
        };
        let dest = self.cell.offset(dir, steps);
        if dest == self.cell {
            return false;
        }
        self.cell = dest;
        self.moving = true;
        self.move_from = self.pos;
        self.move_to = grid_to_pixel(dest);
        self.move_start_ms = now;
        self.move_duration_ms = duration;
        true
    }

    /// Advance the tween
    pub fn update(&mut self, now: f64) {
        if !self.moving {
            return;
        }
        let t = ((now - self.move_start_ms) / self.move_duration_ms) as f32;
        if t >= 1.0 {
            self.pos = self.move_to;
            self.moving = false;
        } else {
            self.pos = self.move_from.lerp(self.move_to, ease_out_quad(t));
        }
    }

    /// Nudge toward `center` by at most `step` pixels; no-op within 1 px.
    /// At rest the cell follows the dragged pixel position.
    pub fn pull_toward(&mut self, center: Vec2, step: f32) {
        let delta = center - self.pos;
        let dist = delta.length();
        if dist <= 1.0 {
            return;
        }
        let bounds = field_bounds();
        self.pos = (self.pos + delta / dist * step.min(dist)).clamp(bounds.min, bounds.max);
        if !self.moving {
            self.cell = pixel_to_grid(self.pos);
        }
    }

    pub fn footprint(&self) -> Aabb {
        Aabb::from_center(self.pos, Vec2::splat(PLAYER_SIZE))
    }
}

impl Default for Player {
    fn default() -> Self {
        Self::at(GridPos::center())
    }
}

/// Notifications for render and host collaborators
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GameEvent {
    RoundStarted {
        mode: DifficultyMode,
        seed: u64,
    },
    HazardActivated {
        id: EntityId,
        kind: HazardKind,
        area: Aabb,
    },
    GimmickStarted {
        label: String,
        gimmick: Gimmick,
        duration_ms: f64,
    },
    GimmickEnded {
        label: String,
    },
    PatternAdmitted {
        name: String,
        rationale: String,
    },
    PatternRejected {
        name: String,
        reason: String,
    },
    BlacklistUpdated {
        pair: (String, String),
        rationale: String,
    },
    /// Oracle response dropped (failure, mismatch or invalid payload)
    OracleDiscarded {
        kind: OracleKind,
        reason: String,
    },
    PatternsReselected {
        level: u32,
        previous: Vec<String>,
        current: Vec<String>,
    },
    RoundOver {
        score: u64,
        level: u32,
        hit: Option<Hit>,
    },
}

/// Patterns that were running when a level ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelRecord {
    pub level: u32,
    pub patterns: Vec<String>,
    /// Round clock when the next level was reached
    pub ended_at_ms: f64,
}

/// Per-frame view for the renderer
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub phase: GamePhase,
    pub mode: DifficultyMode,
    pub clock_ms: f64,
    pub score: u64,
    pub level: u32,
    pub player: Player,
    pub projectiles: Vec<Projectile>,
    pub telegraphs: Vec<Telegraph>,
    pub lasers: Vec<Laser>,
    pub traps: Vec<Trap>,
    pub explosions: Vec<Explosion>,
    pub gimmick: Option<ActiveGimmick>,
    pub active_patterns: Vec<String>,
}

/// What a scheduler entry does when it fires
#[derive(Debug, Clone, PartialEq)]
pub enum TimerAction {
    FirePattern(ActivationId),
    /// Staggered wall-sweep spawn
    Telegraph(ProjectileSpawnSpec),
    Oracle(OracleKind),
}

/// Complete game state
pub struct GameState {
    pub settings: Settings,
    /// Run seed for reproducibility
    pub seed: u64,
    pub(crate) rng: Pcg32,
    pub phase: GamePhase,
    pub mode: DifficultyMode,
    /// Round clock (ms)
    pub clock_ms: f64,
    /// Simulation tick counter
    pub time_ticks: u64,
    pub score: u64,
    pub level: u32,
    pub player: Player,
    pub(crate) entities: EntityRegistry,
    /// Survives across rounds
    pub(crate) patterns: PatternRegistry,
    /// Survives across rounds
    pub(crate) blacklist: Blacklist,
    pub(crate) active_patterns: Vec<ActivePattern>,
    pub(crate) level_history: Vec<LevelRecord>,
    pub(crate) gimmick: GimmickController,
    pub(crate) scheduler: Scheduler<TimerAction>,
    pub(crate) sandbox: Sandbox,
    pub(crate) oracle: OracleLedger,
    events: Vec<GameEvent>,
    next_activation: u64,
}

impl GameState {
    pub fn new(seed: u64, settings: Settings) -> Self {
        let mut blacklist = Blacklist::default();
        for (a, b) in &settings.blacklist {
            if a == b {
                log::warn!("Ignoring blacklist entry pairing `{a}` with itself");
                continue;
            }
            blacklist.insert(a, b);
        }

        Self {
            sandbox: Sandbox::new(&settings.sandbox),
            mode: settings.difficulty,
            settings,
            seed,
            rng: Pcg32::seed_from_u64(seed),
            phase: GamePhase::Menu,
            clock_ms: 0.0,
            time_ticks: 0,
            score: 0,
            level: 0,
            player: Player::default(),
            entities: EntityRegistry::new(),
            patterns: PatternRegistry::with_builtins(),
            blacklist,
            active_patterns: Vec::new(),
            level_history: Vec::new(),
            gimmick: GimmickController::new(),
            scheduler: Scheduler::new(),
            oracle: OracleLedger::new(),
            events: Vec::new(),
            next_activation: 1,
        }
    }

    pub fn entities(&self) -> &EntityRegistry {
        &self.entities
    }

    pub fn patterns(&self) -> &PatternRegistry {
        &self.patterns
    }

    pub fn blacklist(&self) -> &Blacklist {
        &self.blacklist
    }

    pub fn gimmick(&self) -> Option<&ActiveGimmick> {
        self.gimmick.active()
    }

    pub fn level_history(&self) -> &[LevelRecord] {
        &self.level_history
    }

    pub fn active_pattern_names(&self) -> Vec<String> {
        self.active_patterns.iter().map(|p| p.name.clone()).collect()
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            phase: self.phase,
            mode: self.mode,
            clock_ms: self.clock_ms,
            score: self.score,
            level: self.level,
            player: self.player.clone(),
            projectiles: self.entities.projectiles().to_vec(),
            telegraphs: self.entities.telegraphs().to_vec(),
            lasers: self.entities.lasers().to_vec(),
            traps: self.entities.traps().to_vec(),
            explosions: self.entities.explosions().to_vec(),
            gimmick: self.gimmick.active().cloned(),
            active_patterns: self.active_pattern_names(),
        }
    }

    /// Events raised since the last drain, oldest first
    pub fn drain_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.events)
    }

    /// Oracle requests for the host to dispatch
    pub fn take_oracle_requests(&mut self) -> Vec<OracleRequest> {
        self.oracle.take_requests()
    }

    pub(crate) fn emit(&mut self, event: GameEvent) {
        self.events.push(event);
    }

    pub(crate) fn next_activation_id(&mut self) -> ActivationId {
        let id = ActivationId(self.next_activation);
        self.next_activation += 1;
        id
    }

    pub(crate) fn field_view(&self) -> FieldView {
        FieldView {
            now: self.clock_ms,
            player_cell: self.player.cell,
            player_pos: self.player.pos,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_new_state_is_in_menu() {
        let state = GameState::new(7, Settings::default());
        assert_eq!(state.phase, GamePhase::Menu);
        assert_eq!(state.player.cell, GridPos::center());
        assert!(state.blacklist().contains("laser", "wall_sweep"));
        assert_eq!(state.patterns().len(), 5);
    }

    #[test]
    fn test_move_tweens_to_neighbour() {
        let mut p = Player::at(GridPos::new(3, 3));
        assert!(p.begin_move(Direction::Right, 0.0, false));
        assert_eq!(p.cell, GridPos::new(4, 3));
        p.update(MOVE_DURATION_MS / 2.0);
        assert!(p.moving);
        assert_eq!(p.cell, GridPos::new(4, 3));
        assert!(p.pos.x > grid_to_pixel(GridPos::new(3, 3)).x);
        p.update(MOVE_DURATION_MS);
        assert!(!p.moving);
        assert_eq!(p.cell, GridPos::new(4, 3));
        assert_eq!(p.pos, grid_to_pixel(GridPos::new(4, 3)));
    }

    #[test]
    fn test_intent_mid_tween_retargets() {
        let mut p = Player::at(GridPos::new(3, 3));
        assert!(p.begin_move(Direction::Right, 0.0, false));
        p.update(10.0);
        let midway = p.pos;
        assert!(p.begin_move(Direction::Down, 10.0, false));
        assert_eq!(p.cell, GridPos::new(4, 4));
        assert_eq!(p.move_from, midway);
        assert_eq!(p.move_to, grid_to_pixel(GridPos::new(4, 4)));
        p.update(10.0 + MOVE_DURATION_MS);
        assert!(!p.moving);
        assert_eq!(p.pos, grid_to_pixel(GridPos::new(4, 4)));

        // Blocked destination leaves the running tween alone
        let mut edge = Player::at(GridPos::new(GRID_SIZE - 2, 0));
        assert!(edge.begin_move(Direction::Right, 0.0, false));
        let target = edge.move_to;
        assert!(!edge.begin_move(Direction::Right, 5.0, false));
        assert_eq!(edge.move_to, target);
        assert_eq!(edge.move_start_ms, 0.0);
    }

    #[test]
    fn test_move_into_wall_is_noop() {
        let mut p = Player::at(GridPos::new(0, 0));
        assert!(!p.begin_move(Direction::Left, 0.0, false));
        assert!(!p.begin_move(Direction::Up, 0.0, true));
        assert!(!p.moving);
    }

    #[test]
    fn test_slippery_move_slides_two_cells() {
        let mut p = Player::at(GridPos::new(2, 5));
        assert!(p.begin_move(Direction::Right, 100.0, true));
        assert_eq!(p.move_duration_ms, MOVE_DURATION_MS * SLIPPERY_DURATION_FACTOR);
        p.update(100.0 + p.move_duration_ms);
        assert_eq!(p.cell, GridPos::new(4, 5));

        // Clamped at the edge: one cell left to slide
        let mut edge = Player::at(GridPos::new(GRID_SIZE - 2, 0));
        assert!(edge.begin_move(Direction::Right, 0.0, true));
        edge.update(1_000.0);
        assert_eq!(edge.cell, GridPos::new(GRID_SIZE - 1, 0));
    }

    #[test]
    fn test_pull_toward_well() {
        let mut p = Player::at(GridPos::new(4, 4));
        let well = grid_to_pixel(GridPos::new(0, 4));
        let start = p.pos;
        p.pull_toward(well, GRAVITY_STEP);
        assert!((start.x - p.pos.x - GRAVITY_STEP).abs() < 1e-4);
        assert_eq!(p.pos.y, start.y);

        let mut close = Player::at(GridPos::new(0, 4));
        close.pos += Vec2::new(0.5, 0.0);
        let before = close.pos;
        close.pull_toward(well, GRAVITY_STEP);
        assert_eq!(close.pos, before);
    }

    proptest! {
        #[test]
        fn movement_stays_on_grid(
            start_col in 0..GRID_SIZE,
            start_row in 0..GRID_SIZE,
            moves in proptest::collection::vec((0usize..4, any::<bool>()), 0..64),
        ) {
            let mut p = Player::at(GridPos::new(start_col, start_row));
            let mut now = 0.0;
            for (dir, slippery) in moves {
                let dir = Direction::ALL[dir];
                let steps = if slippery { SLIPPERY_STEP } else { 1 };
                let expected = p.cell.offset(dir, steps);
                let moved = p.begin_move(dir, now, slippery);
                prop_assert_eq!(moved, expected != p.cell);
                now += 1_000.0;
                p.update(now);
                prop_assert!(p.cell.in_bounds());
                prop_assert_eq!(p.cell, expected);
            }
        }

        #[test]
        fn rapid_moves_land_on_clamped_sum(
            start_col in 0..GRID_SIZE,
            start_row in 0..GRID_SIZE,
            moves in proptest::collection::vec(0usize..4, 0..32),
            gap_ms in 0.0f64..MOVE_DURATION_MS,
        ) {
            let mut p = Player::at(GridPos::new(start_col, start_row));
            let mut expected = p.cell;
            let mut now = 0.0;
            for dir in moves {
                let dir = Direction::ALL[dir];
                expected = expected.offset(dir, 1);
                p.begin_move(dir, now, false);
                prop_assert_eq!(p.cell, expected);
                now += gap_ms;
                p.update(now);
            }
            p.update(now + MOVE_DURATION_MS);
            prop_assert!(!p.moving);
            prop_assert_eq!(p.cell, expected);
            prop_assert_eq!(p.pos, grid_to_pixel(expected));
        }
    }
}
