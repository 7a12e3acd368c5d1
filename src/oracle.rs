//! Pattern oracle boundary
//!
//! The oracle is an external generator (in practice an LLM behind a host
//! process) that proposes new patterns, blacklist pairs and world events. The
//! core never talks to it directly: it queues [`OracleRequest`]s for the host
//! to collect, and the host feeds back raw JSON payloads or failures.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ValidationError;
use crate::sim::geometry::GridPos;
use crate::sim::gimmick::Gimmick;
use crate::sim::pattern::PatternParams;

/// The three oracle request kinds, each on its own period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OracleKind {
    NewPattern,
    BalanceReview,
    WorldEvent,
}

impl OracleKind {
    pub const ALL: [OracleKind; 3] = [OracleKind::NewPattern, OracleKind::BalanceReview, OracleKind::WorldEvent];

    pub fn as_str(&self) -> &'static str {
        match self {
            OracleKind::NewPattern => "new_pattern",
            OracleKind::BalanceReview => "balance_review",
            OracleKind::WorldEvent => "world_event",
        }
    }
}

/// Context handed to the host alongside a request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleRequest {
    pub kind: OracleKind,
    pub level: u32,
    pub score: u64,
    /// Every registered pattern name
    pub registered: Vec<String>,
    /// Patterns running right now
    pub active: Vec<String>,
    /// Current blacklist
    pub blacklist: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternProposal {
    pub name: String,
    pub code: String,
    #[serde(default)]
    pub rationale: String,
    #[serde(default)]
    pub params: Option<PatternParams>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceProposal {
    pub patterns: [String; 2],
    #[serde(default)]
    pub rationale: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorldEventKind {
    GravityWell,
    SlipperyTiles,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldEventProposal {
    pub kind: WorldEventKind,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub well: Option<GridPos>,
    #[serde(default)]
    pub tiles: Vec<GridPos>,
}

impl WorldEventProposal {
    /// Check the payload shape against its kind
    pub fn to_gimmick(&self) -> Result<Gimmick, ValidationError> {
        let gimmick = match self.kind {
            WorldEventKind::GravityWell => {
                let well = self.well.ok_or_else(|| {
                    ValidationError::InvalidWorldEvent("gravity well event has no well".to_string())
                })?;
                Gimmick::GravityWell { well }
            }
            WorldEventKind::SlipperyTiles => Gimmick::SlipperyTiles {
                tiles: self.tiles.clone(),
            },
        };
        gimmick.validate()?;
        Ok(gimmick)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OracleResponse {
    NewPattern(PatternProposal),
    BalanceReview(BalanceProposal),
    WorldEvent(WorldEventProposal),
}

impl OracleResponse {
    pub fn kind(&self) -> OracleKind {
        match self {
            OracleResponse::NewPattern(_) => OracleKind::NewPattern,
            OracleResponse::BalanceReview(_) => OracleKind::BalanceReview,
            OracleResponse::WorldEvent(_) => OracleKind::WorldEvent,
        }
    }

    /// Decode a raw payload for a request of `kind`
    pub fn parse(kind: OracleKind, json: &str) -> Result<Self, OracleError> {
        Ok(match kind {
            OracleKind::NewPattern => OracleResponse::NewPattern(serde_json::from_str(json)?),
            OracleKind::BalanceReview => OracleResponse::BalanceReview(serde_json::from_str(json)?),
            OracleKind::WorldEvent => OracleResponse::WorldEvent(serde_json::from_str(json)?),
        })
    }
}

/// Why the host could not produce a usable response
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("oracle request timed out")]
    Timeout,
    #[error("oracle unavailable: {0}")]
    Unavailable(String),
    #[error("malformed oracle payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Outstanding requests, at most one per kind
#[derive(Debug, Clone, Default)]
pub struct OracleLedger {
    outstanding: BTreeSet<OracleKind>,
    queued: Vec<OracleRequest>,
}

impl OracleLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `request` for the host. Returns false (and drops it) when a
    /// request of the same kind is still unanswered.
    pub fn request(&mut self, request: OracleRequest) -> bool {
        if !self.outstanding.insert(request.kind) {
            log::debug!("oracle {} request still outstanding, skipping", request.kind.as_str());
            return false;
        }
        self.queued.push(request);
        true
    }

    /// Hand every queued request to the host; they stay outstanding until settled
    pub fn take_requests(&mut self) -> Vec<OracleRequest> {
        std::mem::take(&mut self.queued)
    }

    /// Returns false if nothing of this kind was outstanding
    pub fn settle(&mut self, kind: OracleKind) -> bool {
        self.queued.retain(|r| r.kind != kind);
        self.outstanding.remove(&kind)
    }

    pub fn is_outstanding(&self, kind: OracleKind) -> bool {
        self.outstanding.contains(&kind)
    }

    pub fn clear(&mut self) {
        self.outstanding.clear();
        self.queued.clear();
    }
}
