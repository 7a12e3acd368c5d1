//! Timed world modifiers: gravity well and slippery tiles
//!
//! At most one gimmick runs at a time. Requests made while one is active are
//! refused; an active gimmick ends on its own once its duration elapses.

use glam::Vec2;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::geometry::GridPos;
use crate::consts::*;
use crate::error::ValidationError;
use crate::grid_to_pixel;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gimmick {
    /// Pulls the player toward the center of `well`
    GravityWell { well: GridPos },
    /// Moves that start on one of these cells slide further
    SlipperyTiles { tiles: Vec<GridPos> },
}

impl Gimmick {
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            Gimmick::GravityWell { well } if !well.in_bounds() => Err(ValidationError::InvalidWorldEvent(format!(
                "gravity well at {well:?} is outside the grid"
            ))),
            Gimmick::SlipperyTiles { tiles } if tiles.is_empty() => Err(ValidationError::InvalidWorldEvent(
                "slippery tiles event lists no tiles".to_string(),
            )),
            Gimmick::SlipperyTiles { tiles } => match tiles.iter().find(|t| !t.in_bounds()) {
                Some(tile) => Err(ValidationError::InvalidWorldEvent(format!(
                    "slippery tile {tile:?} is outside the grid"
                ))),
                None => Ok(()),
            },
            Gimmick::GravityWell { .. } => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveGimmick {
    pub gimmick: Gimmick,
    pub label: String,
    pub started_at: f64,
    pub duration_ms: f64,
}

impl ActiveGimmick {
    pub fn ends_at(&self) -> f64 {
        self.started_at + self.duration_ms
    }
}

#[derive(Debug, Clone, Default)]
pub struct GimmickController {
    active: Option<ActiveGimmick>,
}

impl GimmickController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_idle(&self) -> bool {
        self.active.is_none()
    }

    pub fn active(&self) -> Option<&ActiveGimmick> {
        self.active.as_ref()
    }

    /// Start `gimmick` for a random duration in the configured range
    pub fn activate<R: Rng + ?Sized>(
        &mut self,
        gimmick: Gimmick,
        label: &str,
        now: f64,
        rng: &mut R,
    ) -> Result<&ActiveGimmick, ValidationError> {
        let duration = rng.random_range(GIMMICK_MIN_MS..=GIMMICK_MAX_MS);
        self.activate_for(gimmick, label, now, duration)
    }

    pub fn activate_for(
        &mut self,
        gimmick: Gimmick,
        label: &str,
        now: f64,
        duration_ms: f64,
    ) -> Result<&ActiveGimmick, ValidationError> {
        if !self.is_idle() {
            return Err(ValidationError::GimmickBusy);
        }
        gimmick.validate()?;
        Ok(self.active.insert(ActiveGimmick {
            gimmick,
            label: label.to_string(),
            started_at: now,
            duration_ms,
        }))
    }

    /// Expire the active gimmick once its duration has elapsed.
    /// Returns the gimmick that just ended.
    pub fn update(&mut self, now: f64) -> Option<ActiveGimmick> {
        if self.active.as_ref().is_some_and(|g| now >= g.ends_at()) {
            self.active.take()
        } else {
            None
        }
    }

    /// Pixel center of the gravity well, if one is active
    pub fn gravity_center(&self) -> Option<Vec2> {
        match self.active.as_ref().map(|g| &g.gimmick) {
            Some(Gimmick::GravityWell { well }) => Some(grid_to_pixel(*well)),
            _ => None,
        }
    }

    pub fn is_slippery(&self, cell: GridPos) -> bool {
        match self.active.as_ref().map(|g| &g.gimmick) {
            Some(Gimmick::SlipperyTiles { tiles }) => tiles.contains(&cell),
            _ => false,
        }
    }

    pub fn clear(&mut self) {
        self.active = None;
    }
}
