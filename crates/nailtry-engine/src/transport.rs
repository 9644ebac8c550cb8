use std::sync::Arc;
use std::thread;
use std::time::Duration;

use nailtry_contracts::tier::EntitlementTier;
use reqwest::blocking::Client as HttpClient;
use serde_json::Value;

use crate::config::EngineConfig;
use crate::error::GenerationError;

/// Status and body of one HTTP exchange, before any interpretation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends one JSON POST. Implementations must not retry.
pub trait Transport: Send + Sync {
    fn post_json(
        &self,
        endpoint: &str,
        api_key: &str,
        payload: &Value,
    ) -> Result<RawResponse, GenerationError>;
}

pub struct HttpTransport {
    http: HttpClient,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Self {
        Self::with_client(HttpClient::new(), timeout)
    }

    pub fn with_client(http: HttpClient, timeout: Duration) -> Self {
        Self { http, timeout }
    }
}

impl Transport for HttpTransport {
    fn post_json(
        &self,
        endpoint: &str,
        api_key: &str,
        payload: &Value,
    ) -> Result<RawResponse, GenerationError> {
        let response = self
            .http
            .post(endpoint)
            .query(&[("key", api_key)])
            .timeout(self.timeout)
            .json(payload)
            .send()
            .map_err(GenerationError::Transport)?;
        let status = response.status().as_u16();
        let body = response.bytes().map_err(GenerationError::Transport)?;
        Ok(RawResponse::new(status, body.to_vec()))
    }
}

/// Client for the `generateContent` endpoint with tier-dependent pacing.
#[derive(Clone)]
pub struct GeminiClient {
    config: Arc<EngineConfig>,
    transport: Arc<dyn Transport>,
}

impl GeminiClient {
    pub fn new(config: Arc<EngineConfig>, transport: Arc<dyn Transport>) -> Self {
        Self { config, transport }
    }

    pub fn over_http(config: Arc<EngineConfig>) -> Self {
        let transport = Arc::new(HttpTransport::new(config.request_timeout));
        Self::new(config, transport)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Waits out the standard-tier delay, sends once, and returns the body of
    /// a successful response.
    pub fn dispatch(
        &self,
        payload: &Value,
        tier: EntitlementTier,
    ) -> Result<Vec<u8>, GenerationError> {
        let delay = self.config.delay_for(tier);
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        let response =
            self.transport
                .post_json(&self.config.endpoint(), &self.config.api_key, payload)?;
        check_status(response)
    }
}

/// Turns a non-2xx response into `Service`, preferring the server's own
/// `error.message`.
pub fn check_status(response: RawResponse) -> Result<Vec<u8>, GenerationError> {
    if response.is_success() {
        return Ok(response.body);
    }
    let message = service_message(&response.body)
        .unwrap_or_else(|| format!("server error {}", response.status));
    Err(GenerationError::Service {
        status: response.status,
        message,
    })
}

fn service_message(body: &[u8]) -> Option<String> {
    let parsed: Value = serde_json::from_slice(body).ok()?;
    parsed
        .get("error")
        .and_then(Value::as_object)
        .and_then(|error| error.get("message"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|message| !message.is_empty())
        .map(str::to_string)
}
