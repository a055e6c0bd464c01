//! Instrument Transport
//!
//! Narrow request/response seam between the session core and the instrument's
//! HTTP control interface. The core only ever sees typed replies from [`wire`].

pub mod http;
pub mod wire;

#[cfg(test)]
pub mod mock;

pub use http::HttpTransport;
pub use wire::{InstrumentApi, RemoteState, Reply};

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

/// Failure to obtain any usable response
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection refused: {0}")]
    ConnectionRefused(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("TLS or authentication failure: {0}")]
    Auth(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

impl TransportError {
    pub fn code(&self) -> &'static str {
        match self {
            TransportError::ConnectionRefused(_) => "CONNECTION_REFUSED",
            TransportError::Timeout(_) => "TIMEOUT",
            TransportError::Auth(_) => "AUTH_FAILURE",
            TransportError::MalformedResponse(_) => "MALFORMED_RESPONSE",
        }
    }

    /// Retrying with the same credentials cannot fix an auth failure
    pub fn is_retryable(&self) -> bool {
        !matches!(self, TransportError::Auth(_))
    }
}

/// Classification of an HTTP status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStatus {
    Success,
    ClientRejected,
    ServerError,
}

impl ResponseStatus {
    pub fn from_code(code: u16) -> Self {
        match code {
            200..=399 => ResponseStatus::Success,
            400..=499 => ResponseStatus::ClientRejected,
            _ => ResponseStatus::ServerError,
        }
    }
}

/// Raw response from the instrument
///
/// Only [`wire`] reads `body`; everything above it works on typed replies.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub code: u16,
    pub status: ResponseStatus,
    pub body: serde_json::Value,
}

impl Response {
    pub fn new(code: u16, body: serde_json::Value) -> Self {
        Self {
            code,
            status: ResponseStatus::from_code(code),
            body,
        }
    }

    pub fn ok(body: serde_json::Value) -> Self {
        Self::new(200, body)
    }
}

/// Credentials attached to every request
#[derive(Clone, Default, PartialEq, Eq)]
pub enum Credentials {
    #[default]
    Anonymous,
    /// `Authorization: Bearer <key>`
    ApiKey(String),
    Basic {
        username: String,
        password: String,
    },
}

impl Credentials {
    /// Pick credentials the way the instrument scripts do: API key wins over
    /// username/password, anything incomplete means anonymous.
    pub fn resolve(
        api_key: Option<String>,
        username: Option<String>,
        password: Option<String>,
    ) -> Self {
        match (api_key, username, password) {
            (Some(key), _, _) if !key.is_empty() => Credentials::ApiKey(key),
            (_, Some(username), Some(password))
                if !username.is_empty() && !password.is_empty() =>
            {
                Credentials::Basic { username, password }
            }
            _ => Credentials::Anonymous,
        }
    }

    pub fn from_env() -> Self {
        Self::resolve(
            std::env::var("FLUENT_CONTROL_API_KEY").ok(),
            std::env::var("FLUENT_CONTROL_USERNAME").ok(),
            std::env::var("FLUENT_CONTROL_PASSWORD").ok(),
        )
    }

    pub fn scheme(&self) -> &'static str {
        match self {
            Credentials::Anonymous => "anonymous",
            Credentials::ApiKey(_) => "api_key",
            Credentials::Basic { .. } => "basic",
        }
    }
}

// Secrets never reach logs
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Anonymous => write!(f, "Anonymous"),
            Credentials::ApiKey(_) => write!(f, "ApiKey(***)"),
            Credentials::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"***")
                .finish(),
        }
    }
}

/// Request/response channel to the instrument
///
/// Implementations attach credentials and classify responses; they never
/// retry. Retrying is the polling monitor's decision alone.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Adapter name for logging
    fn name(&self) -> &'static str;

    async fn post(
        &self,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<Response, TransportError>;

    async fn get(&self, path: &str) -> Result<Response, TransportError>;
}
