//! Grid Dodge headless driver
//!
//! Plays one seeded round with a random-walk player against an offline oracle
//! that answers from a small canned catalogue, logging every game event as
//! JSON. Usage: `grid-dodge [settings.json]`

use std::path::Path;

use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use serde_json::json;

use grid_dodge::Settings;
use grid_dodge::consts::*;
use grid_dodge::oracle::{OracleError, OracleKind, OracleRequest, OracleResponse};
use grid_dodge::sim::{Direction, GamePhase, GameState, TickInput, tick};

/// Stop the demo even if the walker never gets hit
const MAX_ROUND_MS: f64 = 180_000.0;

/// Chance per tick that the walker picks a new direction
const MOVE_CHANCE: f64 = 0.08;

const CANNED_PATTERNS: &[&str] = &[
    r#"{"name":"spiral","rationale":"rotating ring closing on the center",
        "params":{"interval_ms":3200.0,"speed":140.0},
        "code":"let n = 6; let r = field.width / 2.0; for i in 0..n { let a = field.now / 400.0 + i.to_float() * 6.2832 / n.to_float(); api.telegraph(r + r * a.cos(), r + r * a.sin(), -a.cos() * params.speed, -a.sin() * params.speed); }"}"#,
    r#"{"name":"pincer","rationale":"cross through the player",
        "params":{"interval_ms":5000.0,"speed":0.0},
        "code":"api.laser_row(field.player_row); api.laser_col(field.player_col);"}"#,
    r#"{"name":"broken","rationale":"never compiles","code":"let = ;"}"#,
    r#"{"name":"rain","rationale":"random columns from the top",
        "params":{"interval_ms":2800.0,"speed":220.0},
        "code":"for c in 0..field.size { if api.rand(0.0, 1.0) < 0.35 { api.telegraph((c.to_float() + 0.5) * field.tile, 0.0, 0.0, params.speed); } }"}"#,
];

/// Stand-in for the real generator: deterministic, never blocks
struct OfflineOracle {
    rng: Pcg32,
    next_pattern: usize,
}

impl OfflineOracle {
    fn new(seed: u64) -> Self {
        Self {
            rng: Pcg32::seed_from_u64(seed.rotate_left(17)),
            next_pattern: 0,
        }
    }

    fn answer(&mut self, request: &OracleRequest) -> Result<OracleResponse, OracleError> {
        let payload = match request.kind {
            OracleKind::NewPattern => {
                let payload = CANNED_PATTERNS
                    .get(self.next_pattern)
                    .ok_or_else(|| OracleError::Unavailable("pattern catalogue exhausted".to_string()))?;
                self.next_pattern += 1;
                payload.to_string()
            }
            OracleKind::BalanceReview => {
                let pair: Vec<&String> = request.registered.choose_multiple(&mut self.rng, 2).collect();
                if pair.len() < 2 {
                    return Err(OracleError::Unavailable("not enough patterns to review".to_string()));
                }
                json!({
                    "patterns": [pair[0], pair[1]],
                    "rationale": "too punishing together",
                })
                .to_string()
            }
            OracleKind::WorldEvent => {
                let gravity = self.rng.random_bool(0.5);
                let rng = &mut self.rng;
                let mut cell = || json!({ "col": rng.random_range(0..GRID_SIZE), "row": rng.random_range(0..GRID_SIZE) });
                if gravity {
                    json!({ "kind": "gravity_well", "label": "Singularity", "well": cell() }).to_string()
                } else {
                    let tiles: Vec<_> = (0..6).map(|_| cell()).collect();
                    json!({ "kind": "slippery_tiles", "label": "Black Ice", "tiles": tiles }).to_string()
                }
            }
        };
        OracleResponse::parse(request.kind, &payload)
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings = match std::env::args().nth(1) {
        Some(path) => Settings::load(Path::new(&path)),
        None => Settings::default(),
    };
    let seed = settings.seed.unwrap_or_else(rand::random);
    let mode = settings.difficulty;
    log::info!("Grid Dodge (headless) seed {seed}, {} mode", mode.as_str());

    let mut state = GameState::new(seed, settings);
    let mut oracle = OfflineOracle::new(seed);
    let mut walker = Pcg32::seed_from_u64(seed ^ 0x9e37_79b9_7f4a_7c15);

    state.start_round(mode);
    while state.phase == GamePhase::Playing && state.clock_ms < MAX_ROUND_MS {
        let intent = walker
            .random_bool(MOVE_CHANCE)
            .then(|| Direction::ALL[walker.random_range(0..Direction::ALL.len())]);
        tick(&mut state, &TickInput { intent }, FRAME_MS);

        for request in state.take_oracle_requests() {
            let response = oracle.answer(&request);
            state.apply_oracle_response(request.kind, response);
        }

        for event in state.drain_events() {
            match serde_json::to_string(&event) {
                Ok(json) => log::info!("{json}"),
                Err(err) => log::warn!("Unserializable event {event:?}: {err}"),
            }
        }
    }

    if state.phase == GamePhase::Playing {
        log::info!("Time limit reached");
        state.end_round();
        state.drain_events();
    }
    log::info!(
        "Final score {} at level {} ({} patterns registered, {} levels recorded)",
        state.score,
        state.level,
        state.patterns().len(),
        state.level_history().len()
    );
}
