//! Session Error Types

use thiserror::Error;

use super::state::SessionState;
use crate::transport::TransportError;
use crate::validation::ValidationError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    // === Usage Errors (fail fast, never retried) ===
    #[error("Cannot {op} a session in state {state}")]
    InvalidState {
        op: &'static str,
        state: SessionState,
    },

    #[error("Session already terminated ({state})")]
    SessionTerminated { state: SessionState },

    #[error("Illegal transition {from} -> {to}")]
    IllegalTransition {
        from: SessionState,
        to: SessionState,
    },

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    // === Instrument Replies ===
    #[error("Instrument rejected request ({code}): {message}")]
    Rejected { code: u16, message: String },

    #[error("Instrument server error ({code}): {message}")]
    ServerError { code: u16, message: String },

    // === Transport ===
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

impl SessionError {
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::InvalidState { .. } => "INVALID_STATE",
            SessionError::SessionTerminated { .. } => "SESSION_TERMINATED",
            SessionError::IllegalTransition { .. } => "ILLEGAL_TRANSITION",
            SessionError::Validation(e) => e.code(),
            SessionError::Rejected { .. } => "REJECTED",
            SessionError::ServerError { .. } => "SERVER_ERROR",
            SessionError::Transport(e) => e.code(),
        }
    }

    /// No response (or a 5xx) leaves the session unchanged, so the same call
    /// may be repeated
    pub fn is_retryable(&self) -> bool {
        match self {
            SessionError::Transport(e) => e.is_retryable(),
            SessionError::ServerError { .. } => true,
            _ => false,
        }
    }
}
