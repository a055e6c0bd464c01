//! Instrument wire contract
//!
//! Endpoint paths, request bodies, and the typed reply for every endpoint.
//! Untyped payloads stop here: a body that does not fit the endpoint's reply
//! type becomes `TransportError::MalformedResponse`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

use super::{Response, ResponseStatus, Transport, TransportError};
use crate::deck::{Layout, Position};
use crate::plan::TransferPlan;

pub const STATUS_PATH: &str = "/api/v1/status";
pub const DECK_LAYOUT_PATH: &str = "/api/v1/deck/layout";
pub const SESSION_PATH: &str = "/api/v1/transfers/session";
pub const LAYOUT_VERSION: &str = "1.0";

pub fn session_path(session_id: &str, action: &str) -> String {
    format!("{}/{}/{}", SESSION_PATH, session_id, action)
}

// ============================================================================
// Replies
// ============================================================================

/// Outcome of one exchange that produced a response
#[derive(Debug, Clone, PartialEq)]
pub enum Reply<T> {
    Accepted(T),
    /// 4xx: the instrument refused the request
    Rejected { code: u16, message: String },
    /// 5xx: the instrument could not process the request
    ServerError { code: u16, message: String },
}

impl<T> Reply<T> {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Reply::Accepted(_))
    }
}

/// Session state as reported by the instrument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteState {
    #[serde(alias = "queued", alias = "submitted", alias = "created", alias = "ready")]
    Pending,
    #[serde(alias = "started", alias = "in_progress")]
    Running,
    #[serde(alias = "complete", alias = "succeeded", alias = "success")]
    Completed,
    #[serde(alias = "error", alias = "aborted")]
    Failed,
    Cancelling,
    #[serde(alias = "canceled")]
    Cancelled,
}

impl RemoteState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemoteState::Pending => "pending",
            RemoteState::Running => "running",
            RemoteState::Completed => "completed",
            RemoteState::Failed => "failed",
            RemoteState::Cancelling => "cancelling",
            RemoteState::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for RemoteState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Execution progress reported by the instrument
///
/// Instruments send either a bare percentage (`"progress": 40`) or an object
/// with transfer counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    #[serde(default, alias = "completed")]
    pub completed_count: u32,
    #[serde(default, alias = "total", skip_serializing_if = "Option::is_none")]
    pub total_count: Option<u32>,
    #[serde(default, alias = "percentage", skip_serializing_if = "Option::is_none")]
    pub percent: Option<f64>,
    /// Instrument-specific extras
    #[serde(flatten)]
    pub details: serde_json::Map<String, serde_json::Value>,
}

impl Progress {
    pub fn from_percent(percent: f64) -> Self {
        Self {
            percent: Some(percent),
            ..Self::default()
        }
    }

    /// Completed share in `0.0..=1.0`; counts win over a reported percentage
    pub fn fraction(&self) -> Option<f64> {
        match (self.total_count, self.percent) {
            (Some(total), _) if total > 0 => {
                Some(f64::from(self.completed_count) / f64::from(total))
            }
            (_, Some(percent)) if percent.is_finite() => Some((percent / 100.0).clamp(0.0, 1.0)),
            _ => None,
        }
    }
}

/// Progress is informational: a shape we do not recognize is dropped rather
/// than failing the whole status reply
fn lenient_progress<'de, D>(deserializer: D) -> Result<Option<Progress>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match raw {
        Some(serde_json::Value::Number(n)) => n.as_f64().map(Progress::from_percent),
        Some(serde_json::Value::String(s)) => s
            .trim()
            .trim_end_matches('%')
            .parse::<f64>()
            .ok()
            .map(Progress::from_percent),
        Some(value @ serde_json::Value::Object(_)) => serde_json::from_value(value).ok(),
        _ => None,
    })
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LayoutAck {
    #[serde(default = "default_true")]
    pub accepted: bool,
    /// Normalized positions, when the instrument echoes them
    #[serde(default)]
    pub positions: Option<Vec<Position>>,
    #[serde(default)]
    pub message: Option<String>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DeckSnapshot {
    pub positions: Vec<Position>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InstrumentStatus {
    #[serde(alias = "state")]
    pub status: String,
    #[serde(flatten)]
    pub details: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SessionAccepted {
    pub session_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StartReply {
    #[serde(default, alias = "state")]
    pub status: Option<RemoteState>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StatusReply {
    #[serde(alias = "state")]
    pub status: RemoteState,
    #[serde(default, deserialize_with = "lenient_progress")]
    pub progress: Option<Progress>,
    #[serde(default, alias = "error_detail", alias = "message")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CancelReply {
    #[serde(alias = "state")]
    pub status: RemoteState,
    #[serde(default, alias = "error_detail")]
    pub error: Option<String>,
    #[serde(default, deserialize_with = "lenient_progress")]
    pub progress: Option<Progress>,
}

// ============================================================================
// Request bodies
// ============================================================================

#[derive(Serialize)]
struct LayoutBody<'a> {
    positions: &'a Layout,
    timestamp: f64,
    version: &'static str,
}

#[derive(Serialize)]
struct SessionBody<'a> {
    transfers: &'a TransferPlan,
    timestamp: f64,
    status: RemoteState,
}

fn unix_timestamp() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}

fn encode<T: Serialize>(body: &T) -> Result<serde_json::Value, TransportError> {
    serde_json::to_value(body)
        .map_err(|e| TransportError::MalformedResponse(format!("request encoding: {}", e)))
}

// ============================================================================
// Decoding
// ============================================================================

fn error_message(body: &serde_json::Value) -> String {
    ["message", "error", "detail", "reason"]
        .iter()
        .find_map(|k| body.get(k).and_then(|v| v.as_str()))
        .map(str::to_string)
        .unwrap_or_else(|| match body {
            serde_json::Value::Null => "no response body".to_string(),
            other => other.to_string(),
        })
}

/// Parse a reply; a `null` body decodes as an empty object
pub fn decode<T: DeserializeOwned>(resp: Response) -> Result<Reply<T>, TransportError> {
    match resp.status {
        ResponseStatus::Success => {
            let body = match resp.body {
                serde_json::Value::Null => serde_json::Value::Object(Default::default()),
                other => other,
            };
            serde_json::from_value(body)
                .map(Reply::Accepted)
                .map_err(|e| TransportError::MalformedResponse(e.to_string()))
        }
        ResponseStatus::ClientRejected => Ok(Reply::Rejected {
            code: resp.code,
            message: error_message(&resp.body),
        }),
        ResponseStatus::ServerError => Ok(Reply::ServerError {
            code: resp.code,
            message: error_message(&resp.body),
        }),
    }
}

// ============================================================================
// Typed endpoint API
// ============================================================================

/// Typed view of the instrument endpoints over any transport
#[derive(Clone, Copy)]
pub struct InstrumentApi<'a> {
    transport: &'a dyn Transport,
}

impl<'a> InstrumentApi<'a> {
    pub fn new(transport: &'a dyn Transport) -> Self {
        Self { transport }
    }

    pub async fn instrument_status(&self) -> Result<Reply<InstrumentStatus>, TransportError> {
        decode(self.transport.get(STATUS_PATH).await?)
    }

    pub async fn deck_layout(&self) -> Result<Reply<DeckSnapshot>, TransportError> {
        decode(self.transport.get(DECK_LAYOUT_PATH).await?)
    }

    pub async fn post_layout(&self, layout: &Layout) -> Result<Reply<LayoutAck>, TransportError> {
        let body = encode(&LayoutBody {
            positions: layout,
            timestamp: unix_timestamp(),
            version: LAYOUT_VERSION,
        })?;
        decode(self.transport.post(DECK_LAYOUT_PATH, Some(body)).await?)
    }

    pub async fn create_session(
        &self,
        plan: &TransferPlan,
    ) -> Result<Reply<SessionAccepted>, TransportError> {
        let body = encode(&SessionBody {
            transfers: plan,
            timestamp: unix_timestamp(),
            status: RemoteState::Pending,
        })?;
        let reply = decode::<SessionAccepted>(self.transport.post(SESSION_PATH, Some(body)).await?)?;
        if let Reply::Accepted(ref accepted) = reply
            && !is_valid_session_id(&accepted.session_id)
        {
            return Err(TransportError::MalformedResponse(format!(
                "invalid session_id {:?}",
                accepted.session_id
            )));
        }
        Ok(reply)
    }

    pub async fn start(&self, session_id: &str) -> Result<Reply<StartReply>, TransportError> {
        decode(
            self.transport
                .post(&session_path(session_id, "start"), None)
                .await?,
        )
    }

    pub async fn status(&self, session_id: &str) -> Result<Reply<StatusReply>, TransportError> {
        decode(self.transport.get(&session_path(session_id, "status")).await?)
    }

    pub async fn cancel(&self, session_id: &str) -> Result<Reply<CancelReply>, TransportError> {
        decode(
            self.transport
                .post(&session_path(session_id, "cancel"), None)
                .await?,
        )
    }
}

/// Session ids are embedded in paths
fn is_valid_session_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}
