//! HTTP transport backed by `reqwest`

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::{Credentials, Response, ResponseStatus, Transport, TransportError};

pub struct HttpTransport {
    base_url: String,
    credentials: Credentials,
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(
        base_url: &str,
        credentials: Credentials,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        info!(
            base_url = %base_url,
            auth = credentials.scheme(),
            timeout_ms = timeout.as_millis() as u64,
            "Initializing instrument HTTP transport"
        );
        if credentials == Credentials::Anonymous {
            warn!("No authentication provided - some endpoints may fail");
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                TransportError::ConnectionRefused(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.credentials {
            Credentials::Anonymous => req,
            Credentials::ApiKey(key) => req.bearer_auth(key),
            Credentials::Basic { username, password } => req.basic_auth(username, Some(password)),
        }
    }

    async fn send(
        &self,
        method: &'static str,
        path: &str,
        req: reqwest::RequestBuilder,
    ) -> Result<Response, TransportError> {
        debug!(method, path, "Instrument request");

        let resp = self
            .authorize(req)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| {
                error!(method, path, error = %e, "Instrument request failed");
                map_reqwest_error(e)
            })?;

        let code = resp.status().as_u16();
        if code == 401 || code == 403 {
            return Err(TransportError::Auth(format!(
                "{} {} returned {}",
                method, path, code
            )));
        }

        let text = resp.text().await.map_err(map_reqwest_error)?;
        let body = decode_body(code, &text)?;

        if ResponseStatus::from_code(code) == ResponseStatus::Success {
            debug!(method, path, code, "Instrument request successful");
        } else {
            warn!(method, path, code, body = %text, "Instrument returned error status");
        }

        Ok(Response::new(code, body))
    }
}

/// Success bodies must be JSON; error bodies may be plain text
fn decode_body(code: u16, text: &str) -> Result<serde_json::Value, TransportError> {
    if text.trim().is_empty() {
        return Ok(serde_json::Value::Null);
    }
    match serde_json::from_str(text) {
        Ok(value) => Ok(value),
        Err(_) if ResponseStatus::from_code(code) != ResponseStatus::Success => {
            Ok(serde_json::json!({ "message": text.trim() }))
        }
        Err(e) => Err(TransportError::MalformedResponse(format!(
            "status {} with non-JSON body: {}",
            code, e
        ))),
    }
}

fn map_reqwest_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout(e.to_string())
    } else if e.is_decode() || e.is_body() {
        TransportError::MalformedResponse(e.to_string())
    } else {
        TransportError::ConnectionRefused(e.to_string())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn post(
        &self,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<Response, TransportError> {
        let mut req = self.client.post(self.url(path));
        if let Some(body) = body {
            req = req.json(&body);
        }
        self.send("POST", path, req).await
    }

    async fn get(&self, path: &str) -> Result<Response, TransportError> {
        let req = self.client.get(self.url(path));
        self.send("GET", path, req).await
    }
}
