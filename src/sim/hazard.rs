//! Warning → active → removed state machine shared by lasers and traps

use serde::{Deserialize, Serialize};

use crate::consts::*;

/// Grid hazard flavours
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HazardKind {
    Laser,
    Trap,
}

impl HazardKind {
    /// (warning duration, active duration) in milliseconds
    pub fn durations(&self) -> (f64, f64) {
        match self {
            HazardKind::Laser => (LASER_WARNING_MS, LASER_ACTIVE_MS),
            HazardKind::Trap => (TRAP_WARNING_MS, TRAP_ACTIVE_MS),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HazardPhase {
    /// Telegraphed, harmless
    Warning,
    /// Dangerous
    Active,
    /// Finished; culled at the end of the hazard phase
    Removed,
}

/// A transition taken during one `advance`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HazardTransition {
    Activated,
    Expired,
}

/// Phase plus the time the phase was entered
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HazardTimer {
    pub phase: HazardPhase,
    pub entered_at: f64,
    pub warn_ms: f64,
    pub active_ms: f64,
}

impl HazardTimer {
    pub fn new(kind: HazardKind, now: f64) -> Self {
        let (warn_ms, active_ms) = kind.durations();
        Self::with_durations(now, warn_ms, active_ms)
    }

    pub fn with_durations(now: f64, warn_ms: f64, active_ms: f64) -> Self {
        Self {
            phase: HazardPhase::Warning,
            entered_at: now,
            warn_ms,
            active_ms,
        }
    }

    /// Take at most one transition. A timer already in a phase never re-enters it,
    /// so the activation effect fires once per hazard.
    pub fn advance(&mut self, now: f64) -> Option<HazardTransition> {
        let elapsed = now - self.entered_at;
        match self.phase {
            HazardPhase::Warning if elapsed >= self.warn_ms => {
                self.phase = HazardPhase::Active;
                self.entered_at = now;
                Some(HazardTransition::Activated)
            }
            HazardPhase::Active if elapsed >= self.active_ms => {
                self.phase = HazardPhase::Removed;
                self.entered_at = now;
                Some(HazardTransition::Expired)
            }
            HazardPhase::Removed => {
                debug_assert!(false, "advanced a removed hazard");
                None
            }
            _ => None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.phase == HazardPhase::Active
    }

    pub fn is_removed(&self) -> bool {
        self.phase == HazardPhase::Removed
    }
}
