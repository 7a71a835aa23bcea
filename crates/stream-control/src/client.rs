//! Control channel client (C11, client side): posts JSON-RPC 2.0
//! subscribe/unsubscribe requests, one process-wide monotonic id per
//! request, a 30-second per-phase (connect, then response) timeout.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use reqwest::Client;
use serde_json::{json, Value};

use crate::rpc::{RpcRequest, RpcResponse};

static REQUEST_ID: AtomicU64 = AtomicU64::new(0);

fn next_request_id() -> u64 {
    REQUEST_ID.fetch_add(1, Ordering::Relaxed) + 1
}

#[derive(Debug, Clone)]
pub struct ControlClientConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl ControlClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

pub struct ControlClient {
    http: Client,
    config: ControlClientConfig,
}

impl ControlClient {
    pub fn new(config: ControlClientConfig) -> Result<Self, ControlClientError> {
        let http = Client::builder()
            .connect_timeout(config.timeout)
            .timeout(config.timeout)
            .build()
            .map_err(|e| ControlClientError::Transport(e.to_string()))?;
        Ok(Self { http, config })
    }

    /// Matches `asyncSubscribe`. Short-circuits to `Ok(0)` without a
    /// network call when `signal_ids` is empty.
    pub async fn async_subscribe(&self, stream_id: &str, signal_ids: &[String]) -> Result<usize, ControlClientError> {
        self.call(stream_id, "subscribe", signal_ids).await
    }

    /// Matches `asyncUnsubscribe`.
    pub async fn async_unsubscribe(&self, stream_id: &str, signal_ids: &[String]) -> Result<usize, ControlClientError> {
        self.call(stream_id, "unsubscribe", signal_ids).await
    }

    async fn call(&self, stream_id: &str, command: &str, signal_ids: &[String]) -> Result<usize, ControlClientError> {
        if signal_ids.is_empty() {
            return Ok(0);
        }

        let request = RpcRequest {
            jsonrpc: "2.0".to_owned(),
            id: Value::from(next_request_id()),
            method: format!("{stream_id}.{command}"),
            params: json!(signal_ids),
        };

        let response = self
            .http
            .post(&self.config.base_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ControlClientError::Timeout
                } else {
                    ControlClientError::Transport(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(ControlClientError::Transport(format!("unexpected status {}", response.status())));
        }

        let body: RpcResponse = response
            .json()
            .await
            .map_err(|e| ControlClientError::MalformedResponse(e.to_string()))?;

        if let Some(error) = body.error {
            return Err(ControlClientError::RpcError {
                code: error.code,
                message: error.message,
            });
        }
        let result = body
            .result
            .ok_or_else(|| ControlClientError::MalformedResponse("response carries neither result nor error".to_owned()))?;
        let matched = result
            .get("matched")
            .and_then(Value::as_u64)
            .ok_or_else(|| ControlClientError::MalformedResponse("result missing matched count".to_owned()))?;
        Ok(matched as usize)
    }
}

/// Hand-rolled, matching `UplinkError`'s split between state-machine
/// errors (thiserror, in `stream-protocol`) and leaf HTTP-client
/// failures.
#[derive(Debug)]
pub enum ControlClientError {
    Timeout,
    Transport(String),
    MalformedResponse(String),
    RpcError { code: i64, message: String },
}

impl std::fmt::Display for ControlClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControlClientError::Timeout => write!(f, "control request timed out"),
            ControlClientError::Transport(s) => write!(f, "transport error: {s}"),
            ControlClientError::MalformedResponse(s) => write!(f, "malformed JSON-RPC response: {s}"),
            ControlClientError::RpcError { code, message } => write!(f, "control server error {code}: {message}"),
        }
    }
}

impl std::error::Error for ControlClientError {}
