//! Session State Machine
//!
//! Owns one transfer session from Draft to a terminal state. Every instrument
//! reply is mapped to at most one transition; a missing reply never moves the
//! session.
//!
//! # Rules
//!
//! 1. **Validated Drafts**: `Session::draft` is the only constructor and runs
//!    layout + plan validation, so an invalid plan never reaches the instrument
//! 2. **No Forced Terminals**: transport failures and 5xx replies leave the
//!    state unchanged; only an instrument-reported outcome ends a session
//! 3. **Cancel Loses Races**: if the instrument finished before processing a
//!    cancel, the reported terminal state wins
//! 4. **Frozen Terminals**: every operation on a terminal session fails with
//!    `SessionTerminated`

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use ulid::Ulid;

use super::error::SessionError;
use super::state::{SessionState, Transition};
use crate::catalog::Catalog;
use crate::deck::Layout;
use crate::plan::TransferPlan;
use crate::transport::wire::{CancelReply, Progress, StartReply, StatusReply};
use crate::transport::{InstrumentApi, RemoteState, Reply, Transport};
use crate::validation::{self, ValidationError};

#[derive(Debug, Clone)]
pub struct Session {
    local_id: Ulid,
    session_id: Option<String>,
    state: SessionState,
    plan: TransferPlan,
    progress: Option<Progress>,
    error_detail: Option<String>,
    transitions: Vec<Transition>,
    created_at: DateTime<Utc>,
}

impl Session {
    /// Validate `plan` against `layout` and create a Draft
    pub fn draft(
        plan: TransferPlan,
        layout: &Layout,
        catalog: &Catalog,
    ) -> Result<Self, ValidationError> {
        validation::validate(&plan, layout, catalog)?;

        let session = Self {
            local_id: Ulid::new(),
            session_id: None,
            state: SessionState::Draft,
            plan,
            progress: None,
            error_detail: None,
            transitions: Vec::new(),
            created_at: Utc::now(),
        };
        debug!(
            local_id = %session.local_id,
            transfers = session.plan.len(),
            "Session drafted"
        );
        Ok(session)
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Local id, stable before and after the instrument assigns `session_id`
    pub fn local_id(&self) -> Ulid {
        self.local_id
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn plan(&self) -> &TransferPlan {
        &self.plan
    }

    pub fn progress(&self) -> Option<&Progress> {
        self.progress.as_ref()
    }

    /// Set only in the Failed state
    pub fn error_detail(&self) -> Option<&str> {
        self.error_detail.as_deref()
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    // ------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------

    /// Send the plan; Draft -> Submitted on acceptance
    ///
    /// Any failure leaves the session in Draft.
    pub async fn submit(&mut self, transport: &dyn Transport) -> Result<SessionState, SessionError> {
        self.require("submit", &[SessionState::Draft])?;

        let reply = InstrumentApi::new(transport)
            .create_session(&self.plan)
            .await?;
        match reply {
            Reply::Accepted(accepted) => {
                info!(
                    local_id = %self.local_id,
                    session_id = %accepted.session_id,
                    transfers = self.plan.len(),
                    "Transfer session accepted"
                );
                self.session_id = Some(accepted.session_id);
                self.transition(SessionState::Submitted)?;
                Ok(self.state)
            }
            Reply::Rejected { code, message } => {
                warn!(local_id = %self.local_id, code, %message, "Transfer session rejected");
                Err(SessionError::Rejected { code, message })
            }
            Reply::ServerError { code, message } => Err(SessionError::ServerError { code, message }),
        }
    }

    /// Submitted -> Running, or Failed when the instrument refuses to start
    pub async fn start(&mut self, transport: &dyn Transport) -> Result<SessionState, SessionError> {
        self.require("start", &[SessionState::Submitted])?;
        let session_id = self.remote_id()?;

        match InstrumentApi::new(transport).start(&session_id).await? {
            Reply::Accepted(reply) => self.apply_start(reply),
            Reply::Rejected { code, message } => {
                warn!(session_id = %session_id, code, %message, "Instrument refused to start session");
                self.fail(message)?;
                Ok(self.state)
            }
            Reply::ServerError { code, message } => Err(SessionError::ServerError { code, message }),
        }
    }

    fn apply_start(&mut self, reply: StartReply) -> Result<SessionState, SessionError> {
        match reply.status {
            Some(RemoteState::Failed) => {
                let detail = reply
                    .message
                    .unwrap_or_else(|| "instrument failed to start session".to_string());
                self.fail(detail)?;
            }
            Some(RemoteState::Cancelled | RemoteState::Cancelling) => {
                self.transition(SessionState::Cancelled)?;
            }
            _ => self.transition(SessionState::Running)?,
        }
        Ok(self.state)
    }

    /// Refresh status from the instrument
    ///
    /// Safe to repeat: without a state change on the instrument it only
    /// refreshes `progress`.
    pub async fn poll(&mut self, transport: &dyn Transport) -> Result<SessionState, SessionError> {
        self.require("poll", &[SessionState::Submitted, SessionState::Running])?;
        let session_id = self.remote_id()?;

        match InstrumentApi::new(transport).status(&session_id).await? {
            Reply::Accepted(reply) => self.apply_status(reply),
            Reply::Rejected { code, message } => Err(SessionError::Rejected { code, message }),
            Reply::ServerError { code, message } => Err(SessionError::ServerError { code, message }),
        }
    }

    fn apply_status(&mut self, reply: StatusReply) -> Result<SessionState, SessionError> {
        if let Some(progress) = reply.progress {
            self.progress = Some(progress);
        }

        match reply.status {
            RemoteState::Pending | RemoteState::Cancelling => {}
            RemoteState::Running => {
                if self.state == SessionState::Submitted {
                    self.transition(SessionState::Running)?;
                }
            }
            RemoteState::Completed => self.reach(SessionState::Completed)?,
            RemoteState::Failed => {
                let detail = reply
                    .error
                    .unwrap_or_else(|| "instrument reported failure".to_string());
                self.fail(detail)?;
            }
            RemoteState::Cancelled => self.transition(SessionState::Cancelled)?,
        }

        debug!(
            session_id = self.session_id(),
            state = %self.state,
            completed = self.progress.as_ref().map(|p| p.completed_count),
            fraction = self.progress.as_ref().and_then(|p| p.fraction()),
            "Session polled"
        );
        Ok(self.state)
    }

    /// Request cancellation
    ///
    /// If the instrument reports a terminal state reached before the cancel
    /// was processed, the session reconciles to that state instead.
    pub async fn cancel(&mut self, transport: &dyn Transport) -> Result<SessionState, SessionError> {
        self.require("cancel", &[SessionState::Submitted, SessionState::Running])?;
        let session_id = self.remote_id()?;
        info!(session_id = %session_id, state = %self.state, "Cancelling transfer session");

        match InstrumentApi::new(transport).cancel(&session_id).await? {
            Reply::Accepted(reply) => self.apply_cancel(reply),
            Reply::Rejected { code, message } => {
                warn!(session_id = %session_id, code, %message, "Cancellation rejected");
                Err(SessionError::Rejected { code, message })
            }
            Reply::ServerError { code, message } => Err(SessionError::ServerError { code, message }),
        }
    }

    fn apply_cancel(&mut self, reply: CancelReply) -> Result<SessionState, SessionError> {
        if let Some(progress) = reply.progress {
            self.progress = Some(progress);
        }

        match reply.status {
            RemoteState::Cancelled | RemoteState::Cancelling => {
                self.transition(SessionState::Cancelled)?
            }
            RemoteState::Completed => {
                info!(session_id = self.session_id(), "Session completed before cancellation");
                self.reach(SessionState::Completed)?;
            }
            RemoteState::Failed => {
                let detail = reply
                    .error
                    .unwrap_or_else(|| "instrument reported failure".to_string());
                self.fail(detail)?;
            }
            RemoteState::Pending | RemoteState::Running => {
                info!(
                    session_id = self.session_id(),
                    remote = %reply.status,
                    "Cancellation not yet honored"
                );
            }
        }
        Ok(self.state)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn require(&self, op: &'static str, allowed: &[SessionState]) -> Result<(), SessionError> {
        if self.state.is_terminal() {
            return Err(SessionError::SessionTerminated { state: self.state });
        }
        if !allowed.contains(&self.state) {
            return Err(SessionError::InvalidState {
                op,
                state: self.state,
            });
        }
        Ok(())
    }

    fn remote_id(&self) -> Result<String, SessionError> {
        self.session_id
            .clone()
            .ok_or(SessionError::InvalidState {
                op: "address",
                state: self.state,
            })
    }

    fn fail(&mut self, detail: String) -> Result<(), SessionError> {
        warn!(session_id = self.session_id(), error = %detail, "Transfer session failed");
        self.transition(SessionState::Failed)?;
        self.error_detail = Some(detail);
        Ok(())
    }

    /// Reach a reported terminal state, passing through Running if the
    /// instrument finished before we observed it running
    fn reach(&mut self, to: SessionState) -> Result<(), SessionError> {
        if self.state == SessionState::Submitted && !self.state.can_transition_to(to) {
            self.transition(SessionState::Running)?;
        }
        self.transition(to)
    }

    fn transition(&mut self, to: SessionState) -> Result<(), SessionError> {
        let from = self.state;
        if !from.can_transition_to(to) {
            return Err(SessionError::IllegalTransition { from, to });
        }

        let seq = self.transitions.last().map_or(1, |t| t.seq + 1);
        self.transitions.push(Transition {
            seq,
            from,
            to,
            at: Utc::now(),
        });
        self.state = to;

        info!(
            local_id = %self.local_id,
            session_id = self.session_id(),
            seq,
            from = %from,
            to = %to,
            "Session transition"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deck::{LabwareType, Position};
    use crate::plan::TransferSpec;
    use crate::transport::TransportError;
    use crate::transport::mock::ScriptedTransport;
    use serde_json::json;

    fn layout() -> Layout {
        Layout::new(vec![
            Position::new("A1", LabwareType::Microplate96).occupied(),
            Position::new("A2", LabwareType::Microplate96).occupied(),
        ])
    }

    fn draft() -> Session {
        let plan = TransferPlan::new(vec![
            TransferSpec::new("A1", "A2", 50.0, "Standard", "Standard_200uL").with_mix(3, 25.0),
        ]);
        Session::draft(plan, &layout(), &Catalog::standard()).unwrap()
    }

    async fn submitted(t: &ScriptedTransport) -> Session {
        let mut s = draft();
        t.push_ok(json!({"session_id": "S-1"}));
        s.submit(t).await.unwrap();
        s
    }

    async fn running(t: &ScriptedTransport) -> Session {
        let mut s = submitted(t).await;
        t.push_ok(json!({"status": "running"}));
        s.start(t).await.unwrap();
        s
    }

    #[test]
    fn test_draft_rejects_invalid_plan() {
        let plan = TransferPlan::new(vec![TransferSpec::new(
            "A1",
            "A1",
            50.0,
            "Standard",
            "Standard_200uL",
        )]);
        let err = Session::draft(plan, &layout(), &Catalog::standard()).unwrap_err();
        assert_eq!(err.code(), "SAME_SOURCE_DESTINATION");
    }

    #[test]
    fn test_new_draft() {
        let s = draft();
        assert_eq!(s.state(), SessionState::Draft);
        assert!(s.session_id().is_none());
        assert!(s.transitions().is_empty());
    }

    #[tokio::test]
    async fn test_submit_assigns_session_id() {
        let t = ScriptedTransport::new();
        let s = submitted(&t).await;

        assert_eq!(s.state(), SessionState::Submitted);
        assert_eq!(s.session_id(), Some("S-1"));
        assert_eq!(t.paths(), vec!["/api/v1/transfers/session"]);
    }

    #[tokio::test]
    async fn test_submit_failure_stays_draft() {
        let t = ScriptedTransport::new();
        let mut s = draft();

        t.push_err(TransportError::ConnectionRefused("down".into()));
        let err = s.submit(&t).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(s.state(), SessionState::Draft);

        t.push_reply(400, json!({"message": "bad liquid class"}));
        let err = s.submit(&t).await.unwrap_err();
        assert_eq!(
            err,
            SessionError::Rejected {
                code: 400,
                message: "bad liquid class".into()
            }
        );
        assert_eq!(s.state(), SessionState::Draft);
        assert!(s.session_id().is_none());
        assert!(s.transitions().is_empty());
    }

    #[tokio::test]
    async fn test_submit_twice_is_usage_error() {
        let t = ScriptedTransport::new();
        let mut s = submitted(&t).await;
        let err = s.submit(&t).await.unwrap_err();
        assert_eq!(
            err,
            SessionError::InvalidState {
                op: "submit",
                state: SessionState::Submitted
            }
        );
        assert_eq!(t.call_count(), 1);
    }

    #[tokio::test]
    async fn test_start_on_draft_fails_fast() {
        let t = ScriptedTransport::new();
        let mut s = draft();
        assert!(matches!(
            s.start(&t).await,
            Err(SessionError::InvalidState { op: "start", .. })
        ));
        assert!(matches!(
            s.poll(&t).await,
            Err(SessionError::InvalidState { op: "poll", .. })
        ));
        assert_eq!(t.call_count(), 0);
    }

    #[tokio::test]
    async fn test_start_success() {
        let t = ScriptedTransport::new();
        let s = running(&t).await;
        assert_eq!(s.state(), SessionState::Running);
        assert_eq!(t.paths()[1], "/api/v1/transfers/session/S-1/start");
    }

    #[tokio::test]
    async fn test_start_rejection_fails_session() {
        let t = ScriptedTransport::new();
        let mut s = submitted(&t).await;

        t.push_reply(409, json!({"message": "deck door open"}));
        let state = s.start(&t).await.unwrap();

        assert_eq!(state, SessionState::Failed);
        assert_eq!(s.error_detail(), Some("deck door open"));
    }

    fn assert_chained(s: &Session) {
        let log = s.transitions();
        assert_eq!(log[0].from, SessionState::Draft);
        for pair in log.windows(2) {
            assert_eq!(pair[1].seq, pair[0].seq + 1);
            assert_eq!(pair[1].from, pair[0].to);
        }
        assert_eq!(log.last().unwrap().to, s.state());
    }

    #[tokio::test]
    async fn test_start_accepted_but_reported_failed() {
        let t = ScriptedTransport::new();
        let mut s = submitted(&t).await;

        t.push_ok(json!({"status": "failed"}));
        assert_eq!(s.start(&t).await.unwrap(), SessionState::Failed);
        assert_eq!(s.error_detail(), Some("instrument failed to start session"));
        assert_eq!(s.transitions().len(), 2);
        assert_chained(&s);

        let mut s = submitted(&t).await;
        t.push_ok(json!({"state": "error", "message": "no tips loaded"}));
        assert_eq!(s.start(&t).await.unwrap(), SessionState::Failed);
        assert_eq!(s.error_detail(), Some("no tips loaded"));
    }

    #[tokio::test]
    async fn test_start_accepted_but_reported_cancelled() {
        let t = ScriptedTransport::new();
        let mut s = submitted(&t).await;

        t.push_ok(json!({"status": "cancelled"}));
        assert_eq!(s.start(&t).await.unwrap(), SessionState::Cancelled);
        assert!(s.error_detail().is_none());
        let path: Vec<_> = s.transitions().iter().map(|tr| tr.to).collect();
        assert_eq!(path, vec![SessionState::Submitted, SessionState::Cancelled]);
        assert_chained(&s);
    }

    #[tokio::test]
    async fn test_start_without_response_stays_submitted() {
        let t = ScriptedTransport::new();
        let mut s = submitted(&t).await;

        t.push_err(TransportError::Timeout("30s".into()));
        let err = s.start(&t).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(s.state(), SessionState::Submitted);

        t.push_reply(503, json!({"message": "busy"}));
        let err = s.start(&t).await.unwrap_err();
        assert!(matches!(err, SessionError::ServerError { code: 503, .. }));
        assert_eq!(s.state(), SessionState::Submitted);
        assert!(s.error_detail().is_none());

        // Retry succeeds
        t.push_ok(serde_json::Value::Null);
        assert_eq!(s.start(&t).await.unwrap(), SessionState::Running);
    }

    #[tokio::test]
    async fn test_poll_refreshes_progress_without_transition() {
        let t = ScriptedTransport::new();
        let mut s = running(&t).await;
        let before = s.transitions().len();

        for n in 1..=3 {
            t.push_ok(json!({"status": "running", "progress": {"completed_count": n}}));
            assert_eq!(s.poll(&t).await.unwrap(), SessionState::Running);
            assert_eq!(s.progress().unwrap().completed_count, n);
        }
        assert_eq!(s.transitions().len(), before);
    }

    #[tokio::test]
    async fn test_poll_moves_submitted_to_running() {
        let t = ScriptedTransport::new();
        let mut s = submitted(&t).await;

        t.push_ok(json!({"status": "pending"}));
        assert_eq!(s.poll(&t).await.unwrap(), SessionState::Submitted);

        t.push_ok(json!({"status": "running"}));
        assert_eq!(s.poll(&t).await.unwrap(), SessionState::Running);
    }

    #[tokio::test]
    async fn test_poll_failure_sets_error_detail() {
        let t = ScriptedTransport::new();
        let mut s = running(&t).await;

        t.push_ok(json!({"status": "failed", "error": "liquid level detection failed at A1"}));
        assert_eq!(s.poll(&t).await.unwrap(), SessionState::Failed);
        assert_eq!(
            s.error_detail(),
            Some("liquid level detection failed at A1")
        );
    }

    #[tokio::test]
    async fn test_poll_external_cancel() {
        let t = ScriptedTransport::new();
        let mut s = running(&t).await;

        t.push_ok(json!({"status": "cancelled"}));
        assert_eq!(s.poll(&t).await.unwrap(), SessionState::Cancelled);
        assert!(s.error_detail().is_none());
    }

    #[tokio::test]
    async fn test_poll_transport_failure_keeps_state() {
        let t = ScriptedTransport::new();
        let mut s = running(&t).await;

        t.push_err(TransportError::MalformedResponse("truncated".into()));
        assert!(s.poll(&t).await.is_err());
        assert_eq!(s.state(), SessionState::Running);
    }

    #[tokio::test]
    async fn test_completed_from_submitted_passes_through_running() {
        let t = ScriptedTransport::new();
        let mut s = submitted(&t).await;

        t.push_ok(json!({"status": "completed"}));
        assert_eq!(s.poll(&t).await.unwrap(), SessionState::Completed);

        let path: Vec<_> = s.transitions().iter().map(|tr| tr.to).collect();
        assert_eq!(
            path,
            vec![
                SessionState::Submitted,
                SessionState::Running,
                SessionState::Completed
            ]
        );
    }

    #[tokio::test]
    async fn test_terminal_session_rejects_every_operation() {
        let t = ScriptedTransport::new();
        let mut s = running(&t).await;
        t.push_ok(json!({"status": "completed"}));
        s.poll(&t).await.unwrap();
        let calls = t.call_count();

        for _ in 0..3 {
            let expected = SessionError::SessionTerminated {
                state: SessionState::Completed,
            };
            assert_eq!(s.poll(&t).await.unwrap_err(), expected);
            assert_eq!(s.cancel(&t).await.unwrap_err(), expected);
            assert_eq!(s.start(&t).await.unwrap_err(), expected);
            assert_eq!(s.submit(&t).await.unwrap_err(), expected);
        }
        assert_eq!(s.state(), SessionState::Completed);
        assert_eq!(t.call_count(), calls);
    }

    #[tokio::test]
    async fn test_cancel_running() {
        let t = ScriptedTransport::new();
        let mut s = running(&t).await;

        t.push_ok(json!({"status": "cancelled"}));
        assert_eq!(s.cancel(&t).await.unwrap(), SessionState::Cancelled);
        assert_eq!(t.paths().last().unwrap(), "/api/v1/transfers/session/S-1/cancel");
    }

    #[tokio::test]
    async fn test_cancel_before_start() {
        let t = ScriptedTransport::new();
        let mut s = submitted(&t).await;

        t.push_ok(json!({"state": "cancelling"}));
        assert_eq!(s.cancel(&t).await.unwrap(), SessionState::Cancelled);
    }

    #[tokio::test]
    async fn test_cancel_loses_race_to_completion() {
        let t = ScriptedTransport::new();
        let mut s = running(&t).await;

        t.push_ok(json!({"status": "completed", "progress": {"completed_count": 1}}));
        assert_eq!(s.cancel(&t).await.unwrap(), SessionState::Completed);
        assert_eq!(s.progress().unwrap().completed_count, 1);
    }

    #[tokio::test]
    async fn test_cancel_reconciles_to_failure() {
        let t = ScriptedTransport::new();
        let mut s = running(&t).await;

        t.push_ok(json!({"status": "failed", "error": "clot detected in A1"}));
        assert_eq!(s.cancel(&t).await.unwrap(), SessionState::Failed);
        assert_eq!(s.error_detail(), Some("clot detected in A1"));
        let path: Vec<_> = s.transitions().iter().map(|tr| tr.to).collect();
        assert_eq!(
            path,
            vec![
                SessionState::Submitted,
                SessionState::Running,
                SessionState::Failed
            ]
        );
        assert_chained(&s);
    }

    #[tokio::test]
    async fn test_cancel_not_yet_honored() {
        let t = ScriptedTransport::new();
        let mut s = running(&t).await;

        t.push_ok(json!({"status": "running"}));
        assert_eq!(s.cancel(&t).await.unwrap(), SessionState::Running);
    }

    #[tokio::test]
    async fn test_cancel_rejected_keeps_state() {
        let t = ScriptedTransport::new();
        let mut s = running(&t).await;

        t.push_reply(404, json!({"message": "no such session"}));
        assert!(matches!(
            s.cancel(&t).await,
            Err(SessionError::Rejected { code: 404, .. })
        ));
        assert_eq!(s.state(), SessionState::Running);
    }

    #[tokio::test]
    async fn test_transition_log_is_sequenced() {
        let t = ScriptedTransport::new();
        let mut s = running(&t).await;
        t.push_ok(json!({"status": "failed"}));
        s.poll(&t).await.unwrap();

        let log = s.transitions();
        assert_eq!(log.len(), 3);
        assert_eq!(log[0].from, SessionState::Draft);
        for pair in log.windows(2) {
            assert!(pair[1].seq > pair[0].seq);
            assert_eq!(pair[1].from, pair[0].to);
            assert!(pair[1].at >= pair[0].at);
        }
        assert_eq!(log.last().unwrap().to, SessionState::Failed);
        assert_eq!(s.error_detail(), Some("instrument reported failure"));
    }
}
