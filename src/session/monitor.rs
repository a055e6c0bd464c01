//! Polling Monitor
//!
//! Drives a session to a terminal state by polling, absorbing transport
//! failures with capped exponential backoff up to a retry budget.

use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{Instant, sleep, sleep_until};
use tracing::{debug, info, warn};

use super::error::SessionError;
use super::machine::Session;
use super::state::SessionState;
use crate::transport::Transport;

/// Configuration for the polling monitor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Cadence between successful polls, and the first backoff step
    pub poll_interval: Duration,
    /// Overall wait before giving up with `Timeout`
    pub timeout: Duration,
    /// Backoff ceiling
    pub max_backoff: Duration,
    /// Consecutive failed polls tolerated before `TransportUnavailable`
    pub retry_budget: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            timeout: Duration::from_secs(600),
            max_backoff: Duration::from_secs(60),
            retry_budget: 5,
        }
    }
}

impl MonitorConfig {
    pub fn new(poll_interval: Duration, timeout: Duration) -> Self {
        Self {
            poll_interval,
            timeout,
            ..Self::default()
        }
    }

    /// Delay after the `failures`-th consecutive failure (1-based)
    pub fn backoff(&self, failures: u32) -> Duration {
        let ceiling = self.max_backoff.max(self.poll_interval);
        let factor = 1u32 << failures.saturating_sub(1).min(16);
        self.poll_interval.saturating_mul(factor).min(ceiling)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MonitorError {
    #[error("Session failed: {0}")]
    SessionFailed(String),

    #[error("Session cancelled")]
    SessionCancelled,

    #[error("Timed out waiting for session (last state {last_state})")]
    Timeout { last_state: SessionState },

    #[error("Instrument unreachable after {attempts} attempts: {last_error}")]
    TransportUnavailable { attempts: u32, last_error: String },

    #[error("Monitoring stopped (last state {last_state})")]
    Stopped { last_state: SessionState },

    #[error(transparent)]
    Session(SessionError),
}

impl MonitorError {
    pub fn code(&self) -> &'static str {
        match self {
            MonitorError::SessionFailed(_) => "SESSION_FAILED",
            MonitorError::SessionCancelled => "SESSION_CANCELLED",
            MonitorError::Timeout { .. } => "TIMEOUT",
            MonitorError::TransportUnavailable { .. } => "TRANSPORT_UNAVAILABLE",
            MonitorError::Stopped { .. } => "STOPPED",
            MonitorError::Session(e) => e.code(),
        }
    }
}

enum Interrupt {
    Deadline,
    Stop,
}

pub struct Monitor {
    config: MonitorConfig,
}

impl Monitor {
    pub fn new(config: MonitorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Poll until Completed, Failed, Cancelled, or timeout
    pub async fn await_terminal(
        &self,
        session: &mut Session,
        transport: &dyn Transport,
    ) -> Result<Session, MonitorError> {
        self.await_terminal_until(session, transport, std::future::pending())
            .await
    }

    /// As `await_terminal`, but also returns `Stopped` when `stop` resolves
    ///
    /// An interrupted wait never leaves a half-applied poll: the session only
    /// changes after a complete reply.
    pub async fn await_terminal_until<F>(
        &self,
        session: &mut Session,
        transport: &dyn Transport,
        stop: F,
    ) -> Result<Session, MonitorError>
    where
        F: Future<Output = ()>,
    {
        let deadline = Instant::now() + self.config.timeout;
        info!(
            session_id = session.session_id(),
            state = %session.state(),
            transport = transport.name(),
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            timeout_ms = self.config.timeout.as_millis() as u64,
            "Monitoring transfer session"
        );

        let driven = tokio::select! {
            biased;
            r = self.drive(session, transport) => Ok(r),
            _ = sleep_until(deadline) => Err(Interrupt::Deadline),
            _ = stop => Err(Interrupt::Stop),
        };

        let last_state = session.state();
        match driven {
            Ok(Ok(())) => outcome(session),
            Ok(Err(e)) => Err(e),
            Err(Interrupt::Deadline) => {
                warn!(
                    session_id = session.session_id(),
                    state = %last_state,
                    "Session did not reach a terminal state before timeout"
                );
                Err(MonitorError::Timeout { last_state })
            }
            Err(Interrupt::Stop) => {
                info!(session_id = session.session_id(), state = %last_state, "Monitoring stopped");
                Err(MonitorError::Stopped { last_state })
            }
        }
    }

    async fn drive(
        &self,
        session: &mut Session,
        transport: &dyn Transport,
    ) -> Result<(), MonitorError> {
        let mut failures = 0u32;

        loop {
            if session.state().is_terminal() {
                return Ok(());
            }

            let delay = match session.poll(transport).await {
                Ok(state) => {
                    failures = 0;
                    if state.is_terminal() {
                        return Ok(());
                    }
                    self.config.poll_interval
                }
                Err(e) if e.is_retryable() => {
                    failures += 1;
                    if failures > self.config.retry_budget {
                        warn!(
                            session_id = session.session_id(),
                            attempts = failures,
                            error = %e,
                            "Retry budget exhausted"
                        );
                        return Err(MonitorError::TransportUnavailable {
                            attempts: failures,
                            last_error: e.to_string(),
                        });
                    }
                    let backoff = self.config.backoff(failures);
                    debug!(
                        session_id = session.session_id(),
                        attempt = failures,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Poll failed, backing off"
                    );
                    backoff
                }
                Err(e) => return Err(MonitorError::Session(e)),
            };

            sleep(delay).await;
        }
    }
}

fn outcome(session: &Session) -> Result<Session, MonitorError> {
    match session.state() {
        SessionState::Completed => Ok(session.clone()),
        SessionState::Failed => Err(MonitorError::SessionFailed(
            session.error_detail().unwrap_or_default().to_string(),
        )),
        SessionState::Cancelled => Err(MonitorError::SessionCancelled),
        other => Err(MonitorError::Session(SessionError::InvalidState {
            op: "monitor",
            state: other,
        })),
    }
}

/// One-shot monitor with default backoff settings
pub async fn await_terminal(
    session: &mut Session,
    transport: &dyn Transport,
    poll_interval: Duration,
    timeout: Duration,
) -> Result<Session, MonitorError> {
    Monitor::new(MonitorConfig::new(poll_interval, timeout))
        .await_terminal(session, transport)
        .await
}
