//! Error types for the roll-in engine.
//!
//! Mirrors the `thiserror`-based error enum pattern used throughout the
//! ecosystem this engine was distilled from: one flat enum, `#[from]`
//! conversions for the handful of external error sources we actually see,
//! and a crate-local `Result` alias so call sites don't repeat the error
//! type.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

/// All error kinds the engine can surface. `VerifierError` is the single
/// exception to "always surfaced": the transition verifier swallows it and
/// reports the transition as invalid instead (see `verifier::Verifier::is_valid`).
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("invalid roots: {0}")]
    InvalidRoots(String),

    #[error("state mismatch: {0}")]
    StateMismatch(String),

    #[error("budget exceeded: prefix of length {prefix_len} costs {cost}, ceiling is {ceiling}")]
    BudgetExceeded {
        prefix_len: usize,
        cost: u64,
        ceiling: u64,
    },

    #[error("still in lock window: {remaining_secs}s remaining")]
    StillInLock { remaining_secs: u64 },

    #[error("no recorded fraudster for this suspect")]
    NotFraudulent,

    #[error("chain adapter error: {0}")]
    ChainError(String),

    #[error("decode error: {0}")]
    DecodeError(String),

    /// Recorded but never returned by the public verifier API — it is
    /// converted to `is_valid = false` before crossing that boundary.
    #[error("pure verifier error: {0}")]
    VerifierError(String),
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        EngineError::DecodeError(e.to_string())
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(e: reqwest::Error) -> Self {
        EngineError::ChainError(e.to_string())
    }
}

impl From<hex::FromHexError> for EngineError {
    fn from(e: hex::FromHexError) -> Self {
        EngineError::DecodeError(format!("invalid hex: {e}"))
    }
}
