//! Scripted transport for tests
//!
//! Replays queued replies in order and records every request.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{Response, Transport, TransportError};

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub method: &'static str,
    pub path: String,
    pub body: Option<serde_json::Value>,
}

type Scripted = Result<Response, TransportError>;

#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Scripted>>,
    /// Replayed forever once the script runs out
    fallback: Mutex<Option<Scripted>>,
    requests: Mutex<Vec<RecordedRequest>>,
    call_count: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, reply: Scripted) -> &Self {
        self.script.lock().unwrap().push_back(reply);
        self
    }

    pub fn push_ok(&self, body: serde_json::Value) -> &Self {
        self.push(Ok(Response::ok(body)))
    }

    pub fn push_reply(&self, code: u16, body: serde_json::Value) -> &Self {
        self.push(Ok(Response::new(code, body)))
    }

    pub fn push_err(&self, err: TransportError) -> &Self {
        self.push(Err(err))
    }

    pub fn set_fallback(&self, reply: Scripted) {
        *self.fallback.lock().unwrap() = Some(reply);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn paths(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.path).collect()
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    fn next(&self, method: &'static str, path: &str, body: Option<serde_json::Value>) -> Scripted {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(RecordedRequest {
            method,
            path: path.to_string(),
            body,
        });

        if let Some(reply) = self.script.lock().unwrap().pop_front() {
            return reply;
        }
        self.fallback
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| Err(TransportError::ConnectionRefused("script exhausted".into())))
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn post(
        &self,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<Response, TransportError> {
        self.next("POST", path, body)
    }

    async fn get(&self, path: &str) -> Result<Response, TransportError> {
        self.next("GET", path, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_script_then_fallback() {
        let t = ScriptedTransport::new();
        t.push_ok(json!({"a": 1}))
            .push_err(TransportError::Timeout("t".into()));
        t.set_fallback(Ok(Response::new(503, json!({}))));

        assert_eq!(t.get("/x").await.unwrap().body["a"], 1);
        assert!(t.post("/y", None).await.is_err());
        assert_eq!(t.get("/z").await.unwrap().code, 503);
        assert_eq!(t.get("/z").await.unwrap().code, 503);

        assert_eq!(t.call_count(), 4);
        assert_eq!(t.paths(), vec!["/x", "/y", "/z", "/z"]);
    }

    #[tokio::test]
    async fn test_exhausted_without_fallback() {
        let t = ScriptedTransport::new();
        assert!(matches!(
            t.get("/x").await,
            Err(TransportError::ConnectionRefused(_))
        ));
    }
}
