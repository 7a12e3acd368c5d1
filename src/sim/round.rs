//! Round lifecycle, pattern activation and oracle merging
//!
//! Everything here mutates [`GameState`] as one atomic step between ticks:
//! an oracle response is either fully applied or discarded.

use rand::Rng;

use super::collision::Hit;
use super::pattern::{ActivationId, ActivePattern, Emission, PatternBehavior, select_patterns, target_pattern_count};
use super::registry::Spawn;
use super::state::{GameEvent, GamePhase, GameState, LevelRecord, Player, TimerAction};
use crate::error::ValidationError;
use crate::oracle::{
    BalanceProposal, OracleError, OracleKind, OracleRequest, OracleResponse, PatternProposal, WorldEventProposal,
};
use crate::settings::DifficultyMode;

impl GameState {
    /// Reset round-scoped state and begin playing. Registered patterns and the
    /// blacklist carry over from earlier rounds.
    pub fn start_round(&mut self, mode: DifficultyMode) {
        self.teardown();
        self.entities.clear();
        self.gimmick.clear();
        self.level_history.clear();
        self.clock_ms = 0.0;
        self.time_ticks = 0;
        self.score = 0;
        self.level = 0;
        self.mode = mode;
        self.player = Player::default();
        self.phase = GamePhase::Playing;

        log::info!("Round started ({} mode, seed {})", mode.as_str(), self.seed);
        self.emit(GameEvent::RoundStarted { mode, seed: self.seed });
        self.reselect_patterns();

        if self.settings.oracle.enabled {
            for kind in OracleKind::ALL {
                let period = self.settings.oracle.period_ms(kind);
                if period > 0.0 {
                    self.scheduler.every(self.clock_ms, period, TimerAction::Oracle(kind));
                }
            }
        }
    }

    /// Abort the running round
    pub fn end_round(&mut self) {
        self.finish_round(None);
    }

    pub fn return_to_menu(&mut self) {
        self.finish_round(None);
        self.entities.clear();
        self.gimmick.clear();
        self.phase = GamePhase::Menu;
    }

    /// Stop the round exactly once; later calls are no-ops
    pub(crate) fn finish_round(&mut self, hit: Option<Hit>) {
        if self.phase != GamePhase::Playing {
            return;
        }
        self.teardown();
        self.phase = GamePhase::GameOver;
        log::info!("Round over: score {} at level {} ({hit:?})", self.score, self.level);
        self.emit(GameEvent::RoundOver {
            score: self.score,
            level: self.level,
            hit,
        });
    }

    /// Cancel every timer, including staggered spawns and oracle cadences
    fn teardown(&mut self) {
        self.scheduler.clear();
        self.oracle.clear();
        self.active_patterns.clear();
    }

    /// Tear down the running patterns and activate a fresh selection for the
    /// current level
    pub(crate) fn reselect_patterns(&mut self) {
        let previous = self.active_pattern_names();
        for active in self.active_patterns.drain(..) {
            self.scheduler.cancel(active.timer);
        }

        let target = target_pattern_count(self.level, self.settings.max_simultaneous_patterns);
        let chosen = select_patterns(&self.patterns, &self.blacklist, target, &mut self.rng);
        for name in &chosen {
            let Some(def) = self.patterns.get(name) else {
                continue;
            };
            let interval = def.params.interval_ms;
            let activation = self.next_activation_id();
            let timer = self
                .scheduler
                .every(self.clock_ms, interval, TimerAction::FirePattern(activation));
            self.active_patterns.push(ActivePattern {
                activation,
                name: name.clone(),
                timer,
            });
        }

        if chosen.len() < target {
            log::info!("Level {}: only {} of {target} patterns selectable", self.level, chosen.len());
        }
        log::info!("Level {} patterns: {chosen:?}", self.level);
        self.emit(GameEvent::PatternsReselected {
            level: self.level,
            previous,
            current: chosen,
        });
    }

    /// Edge-triggered level crossing: record the finished level, then reselect
    pub(crate) fn update_difficulty(&mut self) {
        let level = (self.score / self.mode.score_step()) as u32;
        if level == self.level {
            return;
        }
        self.level_history.push(LevelRecord {
            level: self.level,
            patterns: self.active_pattern_names(),
            ended_at_ms: self.clock_ms,
        });
        log::info!("Difficulty level {} -> {level}", self.level);
        self.level = level;
        self.reselect_patterns();
    }

    /// Run the scheduler for the current clock
    pub(crate) fn run_timers(&mut self) {
        for firing in self.scheduler.advance(self.clock_ms) {
            match firing.action {
                TimerAction::FirePattern(activation) => self.fire_pattern(activation),
                TimerAction::Telegraph(spec) => {
                    self.entities.spawn(Spawn::Telegraph(spec), self.clock_ms);
                }
                TimerAction::Oracle(kind) => self.request_oracle(kind),
            }
        }
    }

    pub(crate) fn fire_pattern(&mut self, activation: ActivationId) {
        let Some(active) = self.active_patterns.iter().find(|p| p.activation == activation) else {
            log::debug!("Timer fired for retired activation {activation:?}");
            return;
        };
        let Some(def) = self.patterns.get(&active.name) else {
            debug_assert!(false, "active pattern {} missing from registry", active.name);
            return;
        };

        let field = self.field_view();
        let emissions = match &def.behavior {
            PatternBehavior::Builtin(pattern) => pattern.emit(&def.params, &field, &mut self.rng),
            PatternBehavior::Scripted(script) => {
                let seed = self.rng.random::<u64>();
                match self.sandbox.run(script, &def.params, &field, seed) {
                    Ok(emissions) => emissions,
                    Err(err) => {
                        log::warn!("Pattern {} skipped this firing: {err}", def.name);
                        return;
                    }
                }
            }
        };
        self.apply_emissions(emissions);
    }

    pub(crate) fn apply_emissions(&mut self, emissions: Vec<Emission>) {
        let now = self.clock_ms;
        for emission in emissions {
            match emission {
                Emission::Telegraph(spec) => {
                    self.entities.spawn(Spawn::Telegraph(spec), now);
                }
                Emission::DelayedTelegraph { delay_ms, spec } if delay_ms > 0.0 => {
                    self.scheduler.after(now, delay_ms, TimerAction::Telegraph(spec));
                }
                Emission::DelayedTelegraph { spec, .. } => {
                    self.entities.spawn(Spawn::Telegraph(spec), now);
                }
                Emission::Laser(axis) => {
                    self.entities.spawn(Spawn::Laser(axis), now);
                }
                Emission::Trap(cell) => {
                    self.entities.spawn(Spawn::Trap(cell), now);
                }
            }
        }
    }

    /// Queue an oracle request unless one of this kind is still unanswered
    pub(crate) fn request_oracle(&mut self, kind: OracleKind) {
        let request = OracleRequest {
            kind,
            level: self.level,
            score: self.score,
            registered: self.patterns.names().map(str::to_string).collect(),
            active: self.active_pattern_names(),
            blacklist: self
                .blacklist
                .pairs()
                .map(|(a, b)| (a.to_string(), b.to_string()))
                .collect(),
        };
        if self.oracle.request(request) {
            log::debug!("Queued oracle {} request", kind.as_str());
        }
    }

    /// Validate and register an external pattern. It becomes selectable at
    /// the next reselection.
    pub fn admit_pattern(&mut self, proposal: PatternProposal) -> Result<(), ValidationError> {
        let params = proposal.params.unwrap_or_default();
        let def = self
            .sandbox
            .prepare(&self.patterns, &proposal.name, params, &proposal.code, &proposal.rationale)?;
        self.patterns.register(def)?;
        log::info!("Admitted pattern {}", proposal.name);
        self.emit(GameEvent::PatternAdmitted {
            name: proposal.name,
            rationale: proposal.rationale,
        });
        Ok(())
    }

    /// Blacklist a pair of registered patterns from the next selection on
    pub fn apply_balance(&mut self, proposal: BalanceProposal) -> Result<(), ValidationError> {
        let [a, b] = proposal.patterns;
        if a == b {
            return Err(ValidationError::SelfPair(a));
        }
        for name in [&a, &b] {
            if !self.patterns.contains(name) {
                return Err(ValidationError::UnknownPattern(name.clone()));
            }
        }
        if !self.blacklist.insert(&a, &b) {
            return Err(ValidationError::AlreadyBlacklisted(a, b));
        }
        log::info!("Blacklisted ({a}, {b})");
        self.emit(GameEvent::BlacklistUpdated {
            pair: (a, b),
            rationale: proposal.rationale,
        });
        Ok(())
    }

    /// Start a gimmick if the round is running and none is active
    pub fn apply_world_event(&mut self, proposal: WorldEventProposal) -> Result<(), ValidationError> {
        if self.phase != GamePhase::Playing {
            return Err(ValidationError::NotPlaying);
        }
        if !self.gimmick.is_idle() {
            return Err(ValidationError::GimmickBusy);
        }
        let gimmick = proposal.to_gimmick()?;
        let started = self
            .gimmick
            .activate(gimmick, &proposal.label, self.clock_ms, &mut self.rng)?
            .clone();
        log::info!("Gimmick {} for {:.0} ms", started.label, started.duration_ms);
        self.emit(GameEvent::GimmickStarted {
            label: started.label,
            gimmick: started.gimmick,
            duration_ms: started.duration_ms,
        });
        Ok(())
    }

    /// Merge the host's answer to an outstanding request. Returns true if it
    /// changed the game; anything else is logged and dropped.
    pub fn apply_oracle_response(&mut self, kind: OracleKind, response: Result<OracleResponse, OracleError>) -> bool {
        if !self.oracle.settle(kind) {
            log::warn!("Discarding unsolicited oracle {} response", kind.as_str());
            return false;
        }
        let result = match response {
            Err(err) => {
                log::warn!("Oracle {} request failed: {err}", kind.as_str());
                self.emit(GameEvent::OracleDiscarded {
                    kind,
                    reason: err.to_string(),
                });
                return false;
            }
            Ok(response) if response.kind() != kind => Err(ValidationError::KindMismatch {
                expected: kind.as_str().to_string(),
                got: response.kind().as_str().to_string(),
            }),
            Ok(_) if self.phase != GamePhase::Playing => Err(ValidationError::NotPlaying),
            Ok(OracleResponse::NewPattern(proposal)) => {
                let name = proposal.name.clone();
                match self.admit_pattern(proposal) {
                    Ok(()) => Ok(()),
                    Err(err) => {
                        log::warn!("Rejected pattern {name}: {err}");
                        self.emit(GameEvent::PatternRejected {
                            name,
                            reason: err.to_string(),
                        });
                        return false;
                    }
                }
            }
            Ok(OracleResponse::BalanceReview(proposal)) => self.apply_balance(proposal),
            Ok(OracleResponse::WorldEvent(proposal)) => self.apply_world_event(proposal),
        };

        match result {
            Ok(()) => true,
            Err(err) => {
                log::warn!("Discarding oracle {} response: {err}", kind.as_str());
                self.emit(GameEvent::OracleDiscarded {
                    kind,
                    reason: err.to_string(),
                });
                false
            }
        }
    }
}
