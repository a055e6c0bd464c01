//! Session FSM State Definitions

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Transfer session states
///
/// ```text
/// DRAFT → SUBMITTED → RUNNING → COMPLETED
///              ↓          ↓
///      FAILED/CANCELLED  FAILED/CANCELLED
/// ```
///
/// Terminal: COMPLETED, FAILED, CANCELLED
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    /// Validated locally, not yet sent
    Draft,
    /// Accepted by the instrument, `session_id` assigned
    Submitted,
    /// Executing on the instrument
    Running,
    /// Terminal: instrument reported success
    Completed,
    /// Terminal: rejected at start or instrument-reported error
    Failed,
    /// Terminal: cancellation honored
    Cancelled,
}

impl SessionState {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Failed | SessionState::Cancelled
        )
    }

    /// Legal edges of the state machine
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Draft, Submitted)
                | (Submitted, Running)
                | (Submitted, Failed)
                | (Submitted, Cancelled)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Draft => "DRAFT",
            SessionState::Submitted => "SUBMITTED",
            SessionState::Running => "RUNNING",
            SessionState::Completed => "COMPLETED",
            SessionState::Failed => "FAILED",
            SessionState::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One recorded state change
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transition {
    /// Strictly increasing within a session, starting at 1
    pub seq: u64,
    pub from: SessionState,
    pub to: SessionState,
    pub at: DateTime<Utc>,
}
