//! Round and sandbox configuration
//!
//! Read once at startup from an optional JSON file; anything the file leaves
//! out takes its default.

use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::consts::MAX_SIMULTANEOUS_PATTERNS;
use crate::oracle::OracleKind;
use crate::sim::sandbox::SandboxLimits;

/// Difficulty chosen at round start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DifficultyMode {
    Easy,
    #[default]
    Normal,
    Hard,
}

impl DifficultyMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DifficultyMode::Easy => "Easy",
            DifficultyMode::Normal => "Normal",
            DifficultyMode::Hard => "Hard",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "easy" => Some(DifficultyMode::Easy),
            "normal" | "norm" => Some(DifficultyMode::Normal),
            "hard" => Some(DifficultyMode::Hard),
            _ => None,
        }
    }

    /// Score needed per difficulty level
    pub fn score_step(&self) -> u64 {
        match self {
            DifficultyMode::Easy => 3000,
            DifficultyMode::Normal => 2000,
            DifficultyMode::Hard => 1000,
        }
    }
}

/// Oracle request cadence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleSettings {
    /// Schedule oracle requests during a round
    pub enabled: bool,
    pub new_pattern_period_ms: f64,
    pub balance_review_period_ms: f64,
    pub world_event_period_ms: f64,
}

impl Default for OracleSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            new_pattern_period_ms: 30_000.0,
            balance_review_period_ms: 45_000.0,
            world_event_period_ms: 25_000.0,
        }
    }
}

impl OracleSettings {
    /// Request cadence for one kind; zero or less disables it
    pub fn period_ms(&self, kind: OracleKind) -> f64 {
        match kind {
            OracleKind::NewPattern => self.new_pattern_period_ms,
            OracleKind::BalanceReview => self.balance_review_period_ms,
            OracleKind::WorldEvent => self.world_event_period_ms,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub difficulty: DifficultyMode,
    /// Fixed run seed; random when absent
    pub seed: Option<u64>,
    /// Upper bound on concurrently running patterns
    pub max_simultaneous_patterns: usize,
    /// Pairs blacklisted before the oracle weighs in
    pub blacklist: Vec<(String, String)>,
    pub oracle: OracleSettings,
    pub sandbox: SandboxLimits,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            difficulty: DifficultyMode::Normal,
            seed: None,
            max_simultaneous_patterns: MAX_SIMULTANEOUS_PATTERNS,
            blacklist: vec![("wall_sweep".to_string(), "laser".to_string())],
            oracle: OracleSettings::default(),
            sandbox: SandboxLimits::default(),
        }
    }
}

impl Settings {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Load from `path`, falling back to defaults when the file is missing or
    /// unreadable
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(json) => match Self::from_json(&json) {
                Ok(settings) => {
                    log::info!("Loaded settings from {}", path.display());
                    settings
                }
                Err(err) => {
                    log::warn!("Ignoring malformed settings in {}: {err}", path.display());
                    Self::default()
                }
            },
            Err(err) => {
                log::info!("Using default settings ({}: {err})", path.display());
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(io::Error::other)?;
        fs::write(path, json)?;
        log::info!("Settings saved to {}", path.display());
        Ok(())
    }
}
