//! Control channel server (C11, server side): routes
//! `"<streamId>.<command>"` JSON-RPC requests to a registry of
//! producer sessions and replies with genuine JSON-RPC 2.0 bodies —
//! the source's always-empty response body was a bug, not a contract
//! to preserve (see DESIGN.md).

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use stream_producer::ProducerSession;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::RwLock;

use crate::rpc::{split_method, RpcError, RpcRequest, RpcResponse, INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND};

type SessionRegistry<W> = Arc<RwLock<HashMap<String, Arc<ProducerSession<W>>>>>;

pub struct ControlServerState<W> {
    sessions: SessionRegistry<W>,
}

impl<W> ControlServerState<W> {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn register(&self, stream_id: impl Into<String>, session: Arc<ProducerSession<W>>) {
        self.sessions.write().await.insert(stream_id.into(), session);
    }

    pub async fn unregister(&self, stream_id: &str) {
        self.sessions.write().await.remove(stream_id);
    }
}

impl<W> Default for ControlServerState<W> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W> Clone for ControlServerState<W> {
    fn clone(&self) -> Self {
        Self {
            sessions: self.sessions.clone(),
        }
    }
}

pub fn router<W>(state: ControlServerState<W>) -> Router
where
    W: AsyncRead + AsyncWrite + Unpin + Send + Sync + 'static,
{
    Router::new().route("/", post(handle_rpc::<W>)).with_state(state)
}

async fn handle_rpc<W>(State(state): State<ControlServerState<W>>, Json(request): Json<RpcRequest>) -> Json<RpcResponse>
where
    W: AsyncRead + AsyncWrite + Unpin + Send + Sync + 'static,
{
    let id = request.id.clone();

    let Some((stream_id, command)) = split_method(&request.method) else {
        return Json(RpcResponse::failure(
            id,
            RpcError::new(INVALID_REQUEST, "method must be \"<streamId>.<command>\""),
        ));
    };

    let Some(signal_ids) = parse_signal_ids(&request.params) else {
        return Json(RpcResponse::failure(
            id,
            RpcError::new(INVALID_PARAMS, "params must be an array of signal ids"),
        ));
    };

    let sessions = state.sessions.read().await;
    let Some(session) = sessions.get(stream_id) else {
        tracing::warn!(stream_id, "control request for unknown stream id");
        return Json(RpcResponse::failure(
            id,
            RpcError::new(METHOD_NOT_FOUND, format!("unknown stream id {stream_id}")),
        ));
    };

    let matched = match command {
        "subscribe" => session.subscribe_signals(&signal_ids).await,
        "unsubscribe" => session.unsubscribe_signals(&signal_ids).await,
        other => {
            tracing::warn!(stream_id, command = other, "unknown control command");
            return Json(RpcResponse::failure(
                id,
                RpcError::new(METHOD_NOT_FOUND, format!("unknown command {other}")),
            ));
        }
    };

    match matched {
        Ok(count) => {
            tracing::info!(stream_id, command, matched = count, "control request applied");
            Json(RpcResponse::success(id, json!({ "matched": count })))
        }
        Err(e) => {
            tracing::warn!(stream_id, command, error = %e, "control request failed");
            Json(RpcResponse::failure(id, RpcError::new(INVALID_REQUEST, e.to_string())))
        }
    }
}

fn parse_signal_ids(params: &Value) -> Option<Vec<String>> {
    params.as_array()?.iter().map(|v| v.as_str().map(str::to_owned)).collect()
}
