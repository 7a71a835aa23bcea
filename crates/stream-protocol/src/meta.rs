//! Meta envelope codec (spec §4.2): `[meta-type: u32 LE][MessagePack body]`.

use serde_json::{Map, Value};

use crate::constants::METAINFORMATION_MSGPACK;
use crate::error::StreamError;

/// A decoded meta body: `method` and `params` are both optional, since
/// some bodies (e.g. `alive`) are advisory only.
#[derive(Debug, Clone, Default)]
pub struct MetaMessage {
    pub method: Option<String>,
    pub params: Option<Value>,
}

impl MetaMessage {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: Some(method.into()),
            params: Some(params),
        }
    }

    /// Returns `params` as a JSON object, or an empty one if absent or
    /// not an object.
    pub fn params_object(&self) -> Map<String, Value> {
        match &self.params {
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        }
    }
}

/// Encodes `[meta-type=2][msgpack({method, params})]`, the byte string
/// that becomes a meta frame's payload once passed to the frame codec.
pub fn encode_meta_envelope(method: &str, params: Value) -> Result<Vec<u8>, StreamError> {
    let mut doc = Map::new();
    doc.insert("method".to_owned(), Value::String(method.to_owned()));
    doc.insert("params".to_owned(), params);

    let body = rmp_serde::to_vec(&Value::Object(doc)).map_err(|e| StreamError::BadMeta {
        signal_number: None,
        reason: format!("failed to encode meta body: {e}"),
    })?;

    let mut out = Vec::with_capacity(4 + body.len());
    out.extend_from_slice(&METAINFORMATION_MSGPACK.to_le_bytes());
    out.extend_from_slice(&body);
    Ok(out)
}

/// Decodes a meta frame's payload. Returns `Ok(None)` when the
/// meta-type discriminator is anything other than `2`
/// (`METAINFORMATION_MSGPACK`) — per spec this is silently ignored at
/// this layer; callers that need the stricter "non-msgpack on a
/// stream-scoped frame closes the session" behaviour apply that check
/// themselves (see the protocol handler).
pub fn decode_meta_envelope(payload: &[u8]) -> Result<Option<MetaMessage>, StreamError> {
    if payload.len() < 4 {
        return Err(StreamError::BadMeta {
            signal_number: None,
            reason: "meta payload shorter than the 4-byte meta-type discriminator".to_owned(),
        });
    }
    let meta_type = u32::from_le_bytes(payload[0..4].try_into().unwrap());
    if meta_type != METAINFORMATION_MSGPACK {
        return Ok(None);
    }

    let value: Value = rmp_serde::from_slice(&payload[4..]).map_err(|e| StreamError::BadMeta {
        signal_number: None,
        reason: format!("malformed msgpack meta body: {e}"),
    })?;

    let method = value.get("method").and_then(Value::as_str).map(str::to_owned);
    let params = value.get("params").cloned();
    Ok(Some(MetaMessage { method, params }))
}
