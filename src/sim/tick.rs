//! Simulation tick
//!
//! Advances the game by one frame of variable length (clamped to
//! `MAX_FRAME_MS`). Due timers run first, then the fixed phase order:
//! gimmick expiry, player, projectiles, telegraphs, hazards, explosions,
//! collision, score.

use super::collision::first_hit;
use super::geometry::Direction;
use super::hazard::HazardTransition;
use super::registry::Spawn;
use super::state::{GameEvent, GamePhase, GameState};
use crate::consts::*;

/// Input commands for a single tick
#[derive(Debug, Clone, Default)]
pub struct TickInput {
    /// Move intent; retargets a running tween
    pub intent: Option<Direction>,
}

/// Advance the game state by `dt_ms` milliseconds of wall-clock time
pub fn tick(state: &mut GameState, input: &TickInput, dt_ms: f64) {
    if state.phase != GamePhase::Playing {
        return;
    }

    let dt_ms = dt_ms.clamp(0.0, MAX_FRAME_MS);
    state.clock_ms += dt_ms;
    state.time_ticks += 1;
    let now = state.clock_ms;
    let dt_secs = (dt_ms / 1000.0) as f32;

    // Pattern firings, staggered spawns, oracle cadence
    state.run_timers();

    if let Some(ended) = state.gimmick.update(now) {
        log::info!("Gimmick {} ended", ended.label);
        state.emit(GameEvent::GimmickEnded { label: ended.label });
    }

    if let Some(dir) = input.intent {
        let slippery = state.gimmick.is_slippery(state.player.cell);
        state.player.begin_move(dir, now, slippery);
    }

    state.player.update(now);
    if let Some(center) = state.gimmick.gravity_center() {
        state.player.pull_toward(center, GRAVITY_STEP);
    }

    state.entities.advance_projectiles(state.player.pos, dt_secs, now);
    state.entities.cull_projectiles();

    // Expired warnings become projectiles; they first move next tick
    for spec in state.entities.expire_telegraphs(now) {
        state.entities.spawn(Spawn::Projectile(spec), now);
    }

    for change in state.entities.advance_hazards(now) {
        if change.transition == HazardTransition::Activated {
            state.entities.spawn(Spawn::Explosion(change.footprint), now);
            state.emit(GameEvent::HazardActivated {
                id: change.id,
                kind: change.kind,
                area: change.footprint,
            });
        }
    }
    state.entities.cull_hazards();
    state.entities.cull_explosions(now);

    if let Some(hit) = first_hit(&state.player.footprint(), state.player.cell, &state.entities) {
        state.finish_round(Some(hit));
        return;
    }

    state.score += SCORE_PER_TICK;
    state.update_difficulty();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid_to_pixel;
    use crate::oracle::{
        BalanceProposal, OracleKind, OracleResponse, PatternProposal, WorldEventKind, WorldEventProposal,
    };
    use crate::settings::{DifficultyMode, Settings};
    use crate::sim::collision::Hit;
    use crate::sim::gimmick::Gimmick;
    use crate::sim::state::Player;
    use crate::sim::geometry::GridPos;
    use crate::sim::pattern::{BuiltinPattern, PatternRegistry};
    use crate::sim::registry::{LaserAxis, ProjectileSpawnSpec};
    use crate::error::ValidationError;
    use glam::Vec2;

    /// A round with no patterns and no oracle traffic
    fn quiet_state() -> GameState {
        let mut settings = Settings::default();
        settings.oracle.enabled = false;
        let mut state = GameState::new(12345, settings);
        state.patterns = PatternRegistry::empty();
        state
    }

    fn proposal(name: &str, code: &str) -> PatternProposal {
        PatternProposal {
            name: name.to_string(),
            code: code.to_string(),
            rationale: "test".to_string(),
            params: None,
        }
    }

    fn count_events(state: &mut GameState, pred: impl Fn(&GameEvent) -> bool) -> usize {
        state.drain_events().iter().filter(|e| pred(e)).count()
    }

    #[test]
    fn test_no_tick_outside_round() {
        let mut state = quiet_state();
        tick(&mut state, &TickInput::default(), FRAME_MS);
        assert_eq!(state.time_ticks, 0);
        assert_eq!(state.score, 0);
    }

    #[test]
    fn test_active_laser_on_player_row_ends_round_once() {
        let mut state = quiet_state();
        state.start_round(DifficultyMode::Normal);
        state.player = Player::at(GridPos::new(2, 2));
        let id = state.entities.spawn(Spawn::Laser(LaserAxis::Row(2)), state.clock_ms);
        state.drain_events();

        let input = TickInput::default();
        while state.phase == GamePhase::Playing && state.clock_ms < 10_000.0 {
            tick(&mut state, &input, FRAME_MS);
            if state.clock_ms < LASER_WARNING_MS - FRAME_MS {
                assert_eq!(state.phase, GamePhase::Playing, "warning phase must not hit");
            }
        }
        assert_eq!(state.phase, GamePhase::GameOver);

        // Further ticks and an explicit end do nothing
        let score = state.score;
        tick(&mut state, &input, FRAME_MS);
        state.end_round();
        assert_eq!(state.score, score);

        let events = state.drain_events();
        let overs: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                GameEvent::RoundOver { hit, .. } => Some(*hit),
                _ => None,
            })
            .collect();
        assert_eq!(overs, vec![Some(Hit::Laser(id))]);
        assert!(events.iter().any(|e| matches!(e, GameEvent::HazardActivated { id: i, .. } if *i == id)));
        assert!(!state.entities().explosions().is_empty());
    }

    #[test]
    fn test_difficulty_edge_reselects_once() {
        let mut state = quiet_state();
        state.admit_pattern(proposal("idle", "let x = field.size;")).unwrap();
        state.start_round(DifficultyMode::Normal);
        state.drain_events();

        let input = TickInput::default();
        let step = DifficultyMode::Normal.score_step();
        for _ in 0..step - 1 {
            tick(&mut state, &input, FRAME_MS);
        }
        assert_eq!(state.level, 0);
        assert!(state.level_history().is_empty());

        tick(&mut state, &input, FRAME_MS);
        assert_eq!(state.time_ticks, step);
        assert_eq!(state.level, 1);
        assert_eq!(state.level_history().len(), 1);
        assert_eq!(state.level_history()[0].level, 0);
        assert_eq!(state.level_history()[0].patterns, vec!["idle".to_string()]);

        tick(&mut state, &input, FRAME_MS);
        let reselections = count_events(&mut state, |e| matches!(e, GameEvent::PatternsReselected { .. }));
        assert_eq!(reselections, 1);
        assert_eq!(state.active_pattern_names(), vec!["idle".to_string()]);
    }

    #[test]
    fn test_telegraph_materializes_once_and_moves_next_tick() {
        let mut state = quiet_state();
        state.start_round(DifficultyMode::Normal);
        let spec = ProjectileSpawnSpec::standard(Vec2::new(0.0, 15.0), Vec2::new(120.0, 0.0));
        state.entities.spawn(Spawn::Telegraph(spec), 0.0);

        let input = TickInput::default();
        while state.entities().projectiles().is_empty() {
            assert!(state.clock_ms <= PROJECTILE_WARNING_DURATION_MS);
            tick(&mut state, &input, FRAME_MS);
        }
        assert!(state.entities().telegraphs().is_empty());
        assert_eq!(state.entities().projectiles().len(), 1);
        assert_eq!(state.entities().projectiles()[0].pos, spec.pos);

        tick(&mut state, &input, FRAME_MS);
        assert_eq!(state.entities().projectiles().len(), 1);
        assert!(state.entities().projectiles()[0].pos.x > spec.pos.x);
    }

    #[test]
    fn test_end_round_cancels_staggered_spawns() {
        let mut state = quiet_state();
        state.start_round(DifficultyMode::Normal);
        let field = state.field_view();
        let emissions = BuiltinPattern::WallSweep.emit(
            &BuiltinPattern::WallSweep.default_params(),
            &field,
            &mut state.rng,
        );
        state.apply_emissions(emissions);
        assert!(!state.scheduler.is_empty());
        let telegraphs = state.entities().telegraphs().len();

        state.end_round();
        assert!(state.scheduler.is_empty());
        state.phase = GamePhase::Playing;
        tick(&mut state, &TickInput::default(), MAX_FRAME_MS);
        assert_eq!(state.entities().telegraphs().len(), telegraphs);
    }

    #[test]
    fn test_slippery_tiles_double_the_move() {
        let mut state = quiet_state();
        state.start_round(DifficultyMode::Normal);
        let start = state.player.cell;
        state
            .apply_world_event(WorldEventProposal {
                kind: WorldEventKind::SlipperyTiles,
                label: "Ice".into(),
                well: None,
                tiles: vec![start],
            })
            .unwrap();

        let right = TickInput {
            intent: Some(Direction::Right),
        };
        tick(&mut state, &right, FRAME_MS);
        assert!(state.player.moving);
        assert_eq!(state.player.move_duration_ms, MOVE_DURATION_MS * SLIPPERY_DURATION_FACTOR);
        for _ in 0..20 {
            tick(&mut state, &TickInput::default(), FRAME_MS);
        }
        assert_eq!(state.player.cell, start.offset(Direction::Right, 2));
    }

    #[test]
    fn test_back_to_back_intents_add_up() {
        let mut state = quiet_state();
        state.start_round(DifficultyMode::Normal);
        state.player = Player::at(GridPos::new(4, 4));
        let right = TickInput {
            intent: Some(Direction::Right),
        };
        tick(&mut state, &right, FRAME_MS);
        assert_eq!(state.player.cell, GridPos::new(5, 4));
        tick(&mut state, &right, FRAME_MS);
        assert_eq!(state.player.cell, GridPos::new(6, 4));
        for _ in 0..30 {
            tick(&mut state, &TickInput::default(), FRAME_MS);
        }
        assert!(!state.player.moving);
        assert_eq!(state.player.cell, GridPos::new(6, 4));
        assert_eq!(state.player.pos, grid_to_pixel(GridPos::new(6, 4)));
    }

    #[test]
    fn test_moving_into_active_laser_hits_on_intent_tick() {
        let mut state = quiet_state();
        state.start_round(DifficultyMode::Normal);
        state.player = Player::at(GridPos::new(4, 4));
        let id = state.entities.spawn(Spawn::Laser(LaserAxis::Column(5)), state.clock_ms);
        let idle = TickInput::default();
        while !state.entities().lasers()[0].timer.is_active() {
            tick(&mut state, &idle, FRAME_MS);
        }
        assert_eq!(state.phase, GamePhase::Playing);

        tick(
            &mut state,
            &TickInput {
                intent: Some(Direction::Right),
            },
            FRAME_MS,
        );
        assert_eq!(state.phase, GamePhase::GameOver);
        let hits: Vec<_> = state
            .drain_events()
            .into_iter()
            .filter_map(|e| match e {
                GameEvent::RoundOver { hit, .. } => Some(hit),
                _ => None,
            })
            .collect();
        assert_eq!(hits, vec![Some(Hit::Laser(id))]);
    }

    #[test]
    fn test_intent_on_slippery_expiry_tick_moves_one_cell() {
        let mut state = quiet_state();
        state.start_round(DifficultyMode::Normal);
        let start = state.player.cell;
        state
            .gimmick
            .activate_for(
                Gimmick::SlipperyTiles { tiles: vec![start] },
                "Ice",
                state.clock_ms,
                FRAME_MS,
            )
            .unwrap();
        state.drain_events();

        tick(
            &mut state,
            &TickInput {
                intent: Some(Direction::Right),
            },
            FRAME_MS,
        );
        assert!(state.gimmick().is_none());
        assert_eq!(state.player.move_duration_ms, MOVE_DURATION_MS);
        assert_eq!(state.player.cell, start.offset(Direction::Right, 1));
        let ended = count_events(&mut state, |e| matches!(e, GameEvent::GimmickEnded { .. }));
        assert_eq!(ended, 1);
    }

    #[test]
    fn test_gravity_well_pulls_idle_player() {
        let mut state = quiet_state();
        state.start_round(DifficultyMode::Normal);
        let start = state.player.pos;
        state
            .apply_world_event(WorldEventProposal {
                kind: WorldEventKind::GravityWell,
                label: "Pull".into(),
                well: Some(GridPos::new(0, state.player.cell.row)),
                tiles: vec![],
            })
            .unwrap();
        tick(&mut state, &TickInput::default(), FRAME_MS);
        assert!((start.x - state.player.pos.x - GRAVITY_STEP).abs() < 1e-4);

        // Second request is refused while the first runs
        let err = state
            .apply_world_event(WorldEventProposal {
                kind: WorldEventKind::GravityWell,
                label: "Again".into(),
                well: Some(GridPos::new(7, 7)),
                tiles: vec![],
            })
            .unwrap_err();
        assert_eq!(err, ValidationError::GimmickBusy);
    }

    #[test]
    fn test_gimmick_expires_with_event() {
        let mut state = quiet_state();
        state.start_round(DifficultyMode::Normal);
        state
            .apply_world_event(WorldEventProposal {
                kind: WorldEventKind::GravityWell,
                label: "Pull".into(),
                well: Some(GridPos::new(0, 0)),
                tiles: vec![],
            })
            .unwrap();
        let input = TickInput::default();
        let mut ticks = 0;
        while state.gimmick().is_some() {
            tick(&mut state, &input, MAX_FRAME_MS);
            ticks += 1;
            assert!(ticks < 1_000);
        }
        assert!(state.clock_ms >= GIMMICK_MIN_MS);
        let ended = count_events(&mut state, |e| matches!(e, GameEvent::GimmickEnded { .. }));
        assert_eq!(ended, 1);
    }

    #[test]
    fn test_rejected_pattern_is_never_registered() {
        let mut state = quiet_state();
        let bad = proposal("broken", "throw \"no\";");
        for _ in 0..3 {
            assert!(state.admit_pattern(bad.clone()).is_err());
        }
        assert!(!state.patterns().contains("broken"));
        assert!(state.patterns().is_empty());

        let good = proposal("fine", "api.trap(0, 0);");
        state.admit_pattern(good.clone()).unwrap();
        assert_eq!(
            state.admit_pattern(good),
            Err(ValidationError::NameCollision("fine".into()))
        );
        assert_eq!(state.patterns().len(), 1);
    }

    #[test]
    fn test_oracle_round_trip() {
        let mut state = quiet_state();
        state.start_round(DifficultyMode::Normal);
        state.request_oracle(OracleKind::NewPattern);
        state.request_oracle(OracleKind::NewPattern);
        let requests = state.take_oracle_requests();
        assert_eq!(requests.len(), 1);
        assert!(state.oracle.is_outstanding(OracleKind::NewPattern));
        assert!(!state.oracle.is_outstanding(OracleKind::WorldEvent));

        let payload = r#"{"name":"rain","code":"api.telegraph(field.player_x, 0, 0, params.speed);"}"#;
        let response = OracleResponse::parse(OracleKind::NewPattern, payload);
        assert!(state.apply_oracle_response(OracleKind::NewPattern, response));
        assert!(state.patterns().contains("rain"));
        assert!(!state.oracle.is_outstanding(OracleKind::NewPattern));

        // Nothing outstanding any more
        let again = OracleResponse::parse(OracleKind::NewPattern, payload);
        assert!(!state.apply_oracle_response(OracleKind::NewPattern, again));
    }

    #[test]
    fn test_oracle_failures_leave_state_alone() {
        let mut state = quiet_state();
        state.start_round(DifficultyMode::Normal);

        state.request_oracle(OracleKind::NewPattern);
        let bad = OracleResponse::parse(OracleKind::NewPattern, r#"{"name":"x","code":"loop {}"}"#);
        assert!(!state.apply_oracle_response(OracleKind::NewPattern, bad));
        assert!(state.patterns().is_empty());

        state.request_oracle(OracleKind::WorldEvent);
        let mismatched = Ok(OracleResponse::BalanceReview(BalanceProposal {
            patterns: ["a".into(), "b".into()],
            rationale: String::new(),
        }));
        assert!(!state.apply_oracle_response(OracleKind::WorldEvent, mismatched));
        assert!(state.gimmick().is_none());

        state.request_oracle(OracleKind::BalanceReview);
        let malformed = OracleResponse::parse(OracleKind::BalanceReview, "{");
        assert!(!state.apply_oracle_response(OracleKind::BalanceReview, malformed));

        let events = state.drain_events();
        assert!(events.iter().any(|e| matches!(e, GameEvent::PatternRejected { name, .. } if name == "x")));
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, GameEvent::OracleDiscarded { .. }))
                .count(),
            2
        );
    }

    #[test]
    fn test_balance_review_validation() {
        let mut state = GameState::new(1, Settings::default());
        let pair = |a: &str, b: &str| BalanceProposal {
            patterns: [a.to_string(), b.to_string()],
            rationale: String::new(),
        };
        assert_eq!(
            state.apply_balance(pair("laser", "laser")),
            Err(ValidationError::SelfPair("laser".into()))
        );
        assert_eq!(
            state.apply_balance(pair("laser", "nope")),
            Err(ValidationError::UnknownPattern("nope".into()))
        );
        assert!(matches!(
            state.apply_balance(pair("laser", "wall_sweep")),
            Err(ValidationError::AlreadyBlacklisted(..))
        ));
        state.apply_balance(pair("homing", "crossfire")).unwrap();
        assert!(state.blacklist().contains("crossfire", "homing"));
    }

    #[test]
    fn test_mid_round_blacklist_holds_across_reselection() {
        for seed in 0..8 {
            let mut settings = Settings::default();
            settings.oracle.enabled = false;
            settings.max_simultaneous_patterns = 5;
            let mut state = GameState::new(seed, settings);
            state.start_round(DifficultyMode::Normal);
            state
                .apply_balance(BalanceProposal {
                    patterns: ["homing".to_string(), "crossfire".to_string()],
                    rationale: String::new(),
                })
                .unwrap();

            let step = DifficultyMode::Normal.score_step();
            for level in 1..=4u64 {
                state.score = step * level - SCORE_PER_TICK;
                tick(&mut state, &TickInput::default(), FRAME_MS);
                assert_eq!(state.level as u64, level);
                let names = state.active_pattern_names();
                assert!(
                    !(names.contains(&"homing".to_string()) && names.contains(&"crossfire".to_string())),
                    "seed {seed} level {level}: {names:?}"
                );
                assert!(
                    !(names.contains(&"laser".to_string()) && names.contains(&"wall_sweep".to_string())),
                    "seed {seed} level {level}: {names:?}"
                );
                assert!(names.len() <= 3);
            }
        }
    }

    #[test]
    fn test_world_event_requires_round() {
        let mut state = quiet_state();
        let err = state
            .apply_world_event(WorldEventProposal {
                kind: WorldEventKind::GravityWell,
                label: "Pull".into(),
                well: Some(GridPos::new(1, 1)),
                tiles: vec![],
            })
            .unwrap_err();
        assert_eq!(err, ValidationError::NotPlaying);
    }

    #[test]
    fn test_scripted_pattern_fires_in_round() {
        let mut state = quiet_state();
        let code = "api.trap(field.player_col, field.player_row);";
        state
            .admit_pattern(PatternProposal {
                params: Some(crate::sim::pattern::PatternParams {
                    interval_ms: 500.0,
                    speed: 0.0,
                    turn_rate: None,
                }),
                ..proposal("stalker", code)
            })
            .unwrap();
        state.start_round(DifficultyMode::Normal);
        let input = TickInput::default();
        while state.clock_ms < 500.0 {
            tick(&mut state, &input, FRAME_MS);
        }
        let traps = state.entities().traps();
        assert_eq!(traps.len(), 1);
        assert_eq!(traps[0].cell, state.player.cell);
    }

    #[test]
    fn test_projectile_hit_uses_pixel_boxes() {
        let mut state = quiet_state();
        state.start_round(DifficultyMode::Normal);
        let center = grid_to_pixel(state.player.cell);
        state.entities.spawn(
            Spawn::Projectile(ProjectileSpawnSpec::standard(center + Vec2::new(-200.0, 0.0), Vec2::new(600.0, 0.0))),
            0.0,
        );
        for _ in 0..60 {
            tick(&mut state, &TickInput::default(), FRAME_MS);
        }
        assert_eq!(state.phase, GamePhase::GameOver);
    }

    #[test]
    fn test_same_seed_same_round() {
        let run = || {
            let mut settings = Settings::default();
            settings.oracle.enabled = false;
            let mut state = GameState::new(777, settings);
            state.start_round(DifficultyMode::Hard);
            let input = TickInput::default();
            for _ in 0..600 {
                tick(&mut state, &input, FRAME_MS);
            }
            serde_json::to_string(&state.snapshot()).unwrap()
        };
        assert_eq!(run(), run());
    }
}
