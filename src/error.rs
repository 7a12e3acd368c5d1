//! Validation failures raised where collaborators hand data to the core
//!
//! Every variant is recoverable: the offending proposal is discarded, logged,
//! and the simulation carries on untouched.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("pattern name `{0}` is already registered")]
    NameCollision(String),

    #[error("pattern name `{0}` is not a valid identifier")]
    InvalidName(String),

    #[error("invalid pattern parameters: {0}")]
    InvalidParams(String),

    #[error("pattern `{name}` failed to compile: {message}")]
    Compile { name: String, message: String },

    #[error("pattern `{name}` failed its dry run: {message}")]
    DryRun { name: String, message: String },

    #[error("unknown pattern `{0}`")]
    UnknownPattern(String),

    #[error("cannot blacklist `{0}` against itself")]
    SelfPair(String),

    #[error("pair (`{0}`, `{1}`) is already blacklisted")]
    AlreadyBlacklisted(String, String),

    #[error("a gimmick is already active")]
    GimmickBusy,

    #[error("invalid world event: {0}")]
    InvalidWorldEvent(String),

    #[error("no round is in progress")]
    NotPlaying,

    #[error("expected a {expected} response, got {got}")]
    KindMismatch { expected: String, got: String },
}
