use thiserror::Error;

use crate::game::Phase;

/// Explicit `error` event emitted by the remote service.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("service reported error: {message}")]
pub struct ProtocolError {
    pub message: String,
}

/// Inbound sequence the harness refuses to absorb silently.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolViolation {
    #[error("phase regressed from {from} to {to}")]
    PhaseRegression { from: Phase, to: Phase },
    #[error("{phase} expects {expected} community cards, got {actual}")]
    BoardLength {
        phase: Phase,
        expected: usize,
        actual: usize,
    },
}
