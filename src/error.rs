//! Error types for loopscope
//!
//! Centralized error handling using thiserror. Display strings double as the
//! wire-level error codes surfaced in `{"status":"error","error":...}`
//! envelopes, so their exact wording is part of the public contract.

use thiserror::Error;

/// All error types that can occur in the research loop registry
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A required operation parameter was missing or empty
    #[error("{0} required")]
    MissingField(&'static str),

    /// No loop with this id exists in the store
    #[error("research loop not found: {0}")]
    LoopNotFound(String),

    /// The loop exists but belongs to a different agent
    #[error("research loop not accessible: {0}")]
    LoopNotAccessible(String),

    /// Mutation attempted against a closed loop
    #[error("loop is closed")]
    LoopClosed,

    /// Checkpoint attempted while the loop is not active
    #[error("loop must be active to checkpoint (current state: {0})")]
    NotActive(String),

    /// Continue attempted while the loop is not awaiting a decision
    #[error("loop is not awaiting_decision (current state: {0})")]
    NotAwaitingDecision(String),

    /// Continue attempted when the round cap is already reached
    #[error("cannot continue: max rounds reached ({0})")]
    RoundCapReached(u32),

    /// The action selector did not name a known operation
    #[error("unsupported action: {0}")]
    UnsupportedAction(String),

    /// Gave up waiting for the store lock
    #[error("timeout acquiring research loop registry lock: {0}")]
    LockTimeout(String),

    /// Configuration file could not be parsed
    #[error("config error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for registry operations
pub type Result<T> = std::result::Result<T, RegistryError>;
