//! HTTP client for the cloud inference endpoint

use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, BreakerState};
use crate::config::RemoteConfig;
use crate::error::AssistError;
use crate::metrics::METRICS;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, warn};

/// Remote inference error types
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("Remote inference is disabled")]
    Disabled,

    #[error("Circuit breaker is open")]
    CircuitOpen,

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Upstream error: {0}")]
    UpstreamError(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl RemoteError {
    /// Whether the endpoint was not contacted at all
    pub fn is_skip(&self) -> bool {
        matches!(self, RemoteError::Disabled | RemoteError::CircuitOpen)
    }
}

impl From<RemoteError> for AssistError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Timeout(msg) => AssistError::NetworkTimeout(msg),
            other => AssistError::RemoteFailed(other.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    prompt: &'a str,
}

/// Reply body from the inference endpoint
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RemoteReply {
    pub response: String,
    /// Topic label, when the server provides one
    #[serde(default)]
    pub category: Option<String>,
}

/// Client for `POST {prompt}` → `{response}`
pub struct RemoteInferenceClient {
    http: Client,
    endpoint: String,
    api_key: Option<SecretString>,
    enabled: bool,
    breaker: CircuitBreaker,
}

impl RemoteInferenceClient {
    pub fn new(config: &RemoteConfig) -> Result<Self, RemoteError> {
        let http = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| RemoteError::RequestFailed(e.to_string()))?;

        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: config.breaker_failures,
            reset_timeout: config.breaker_reset_timeout(),
        });

        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
            api_key: config
                .api_key
                .as_ref()
                .map(|key| SecretString::new(key.expose_secret().clone())),
            enabled: config.enabled,
            breaker,
        })
    }

    pub fn breaker_state(&self) -> BreakerState {
        self.breaker.state()
    }

    /// Send one prompt and return the generated reply
    ///
    /// Timeouts, non-2xx statuses and empty replies all count as failures
    /// towards the circuit breaker.
    pub async fn infer(&self, prompt: &str) -> Result<RemoteReply, RemoteError> {
        if !self.enabled {
            return Err(RemoteError::Disabled);
        }

        if self.breaker.is_open() {
            return Err(RemoteError::CircuitOpen);
        }

        let start = Instant::now();
        let result = self.call_chat_api(prompt).await;
        METRICS.remote_duration.observe(start.elapsed().as_secs_f64());

        match &result {
            Ok(_) => self.breaker.mark_success(),
            Err(e) => {
                self.breaker.mark_failure();
                warn!("Remote inference failed: {}", e);
            }
        }

        result
    }

    async fn call_chat_api(&self, prompt: &str) -> Result<RemoteReply, RemoteError> {
        debug!("Calling remote inference: {} chars", prompt.len());

        let mut req = self.http.post(&self.endpoint).json(&ChatRequest { prompt });

        if let Some(api_key) = &self.api_key {
            req = req.bearer_auth(api_key.expose_secret());
        }

        let response = req.send().await.map_err(|e| {
            if e.is_timeout() {
                RemoteError::Timeout(e.to_string())
            } else {
                RemoteError::RequestFailed(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(RemoteError::UpstreamError(format!(
                "Status {}: {}",
                status, error_text
            )));
        }

        let chat_response: RemoteReply = response.json().await.map_err(|e| {
            if e.is_timeout() {
                RemoteError::Timeout(e.to_string())
            } else {
                RemoteError::InvalidResponse(e.to_string())
            }
        })?;

        if chat_response.response.trim().is_empty() {
            return Err(RemoteError::InvalidResponse("empty response".to_string()));
        }

        Ok(chat_response)
    }
}
