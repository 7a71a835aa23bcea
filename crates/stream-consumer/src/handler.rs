//! Protocol handler (C10): the consumer-side read loop. Owns a
//! `Framed<T, FrameCodec>` and demultiplexes decoded frames to the
//! stream-meta interpreter or the signal container, turning the
//! results into `ConsumerEvent`s on an `mpsc` channel — the same
//! event-channel-to-owner shape this codebase uses for UI/dashboard
//! fan-out (`state.rs`'s `dashboard_tx`).

use bytes::Bytes;
use futures_util::StreamExt;
use serde_json::Value;
use stream_protocol::constants::{is_supported_api_version, stream_method};
use stream_protocol::{decode_meta_envelope, Frame, FrameCodec, StreamError, StreamResult, TransportType};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::codec::Framed;

use crate::container::{DataOutcome, SignalContainer, SignalMetaOutcome};

/// Parsed from the `init` frame's `commandInterfaces.jsonrpc-http`.
/// `http_control_port` is set at most once — a later `init`-shaped
/// update never overwrites it.
#[derive(Debug, Default, Clone)]
pub struct ControlInterfaceInfo {
    pub stream_id: Option<String>,
    pub http_control_path: Option<String>,
    pub http_control_port: Option<u16>,
    pub http_version: Option<String>,
}

/// Events the handler reports to its owner. `Closed` always fires
/// exactly once, whether the session ended in a clean EOF (`None`) or
/// an error (`Some(description)`).
#[derive(Debug, Clone)]
pub enum ConsumerEvent {
    StreamMeta { method: String, params: Value },
    SignalSubscribed { number: u32, id: String },
    SignalUnsubscribed { number: u32 },
    SignalDescriptor { number: u32 },
    SignalData { number: u32, timestamp: u64, raw: Bytes },
    Closed(Option<String>),
}

pub struct ProtocolHandler<T> {
    framed: Framed<T, FrameCodec>,
    container: SignalContainer,
    control_info: ControlInterfaceInfo,
    events: mpsc::Sender<ConsumerEvent>,
}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> ProtocolHandler<T> {
    pub fn new(transport: T, events: mpsc::Sender<ConsumerEvent>) -> Self {
        Self {
            framed: Framed::new(transport, FrameCodec),
            container: SignalContainer::new(),
            control_info: ControlInterfaceInfo::default(),
            events,
        }
    }

    pub fn control_info(&self) -> &ControlInterfaceInfo {
        &self.control_info
    }

    /// Runs the read loop to completion: peer EOF or a decode/protocol
    /// error. Always emits exactly one `Closed` event before returning.
    pub async fn run(mut self) -> StreamResult<()> {
        let result = self.run_inner().await;
        let closed = match &result {
            Ok(()) => {
                tracing::info!("stream closed");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "stream closed with error");
                Some(e.to_string())
            }
        };
        let _ = self.events.send(ConsumerEvent::Closed(closed)).await;
        result
    }

    async fn run_inner(&mut self) -> StreamResult<()> {
        loop {
            let frame: Frame = match self.framed.next().await {
                Some(frame) => frame?,
                None => return Ok(()),
            };
            match frame.transport_type {
                TransportType::SignalData => {
                    self.handle_signal_data(frame.signal_number, frame.payload).await?;
                }
                TransportType::MetaInformation => {
                    self.handle_meta(frame.signal_number, &frame.payload).await?;
                }
            }
        }
    }

    async fn handle_meta(&mut self, signal_number: u32, payload: &[u8]) -> StreamResult<()> {
        let Some(message) = decode_meta_envelope(payload)? else {
            if signal_number == 0 {
                return Err(StreamError::Protocol {
                    reason: "stream-scoped meta frame must be MessagePack",
                });
            }
            return Ok(());
        };
        let Some(method) = message.method else {
            return Ok(());
        };
        let params = message.params.unwrap_or(Value::Null);

        if signal_number == 0 {
            self.handle_stream_meta(&method, params).await
        } else {
            self.handle_signal_meta(signal_number, &method, params).await
        }
    }

    async fn handle_stream_meta(&mut self, method: &str, params: Value) -> StreamResult<()> {
        match method {
            stream_method::API_VERSION => {
                let version = params.get("version").and_then(Value::as_str).unwrap_or_default();
                if !is_supported_api_version(version) {
                    tracing::warn!(version, "unsupported api version, rejecting stream");
                    return Err(StreamError::UnsupportedVersion { version: version.to_owned() });
                }
            }
            stream_method::INIT => {
                if let Some(stream_id) = params.get("streamId").and_then(Value::as_str) {
                    self.control_info.stream_id = Some(stream_id.to_owned());
                }
                if self.control_info.http_control_port.is_none() {
                    if let Some(jsonrpc_http) = params.get("commandInterfaces").and_then(|v| v.get("jsonrpc-http")) {
                        self.control_info.http_control_path =
                            jsonrpc_http.get("path").and_then(Value::as_str).map(str::to_owned);
                        self.control_info.http_control_port =
                            jsonrpc_http.get("port").and_then(Value::as_u64).map(|p| p as u16);
                        self.control_info.http_version =
                            jsonrpc_http.get("version").and_then(Value::as_str).map(str::to_owned);
                    }
                }
            }
            stream_method::ALIVE => {
                if let Some(fill_level) = params.get("fillLevel").and_then(Value::as_f64) {
                    if fill_level > 0.5 {
                        tracing::trace!(fill_level, "stream alive, fill level above 50%");
                    }
                }
            }
            _ => {}
        }
        let _ = self.events.send(ConsumerEvent::StreamMeta { method: method.to_owned(), params }).await;
        Ok(())
    }

    async fn handle_signal_meta(&mut self, signal_number: u32, method: &str, params: Value) -> StreamResult<()> {
        let outcome = self.container.process_meta(signal_number, method, &params)?;
        let event = match outcome {
            SignalMetaOutcome::Subscribed => ConsumerEvent::SignalSubscribed {
                number: signal_number,
                id: self.container.get(signal_number).map(|s| s.id.clone()).unwrap_or_default(),
            },
            SignalMetaOutcome::Unsubscribed => ConsumerEvent::SignalUnsubscribed { number: signal_number },
            SignalMetaOutcome::Updated => ConsumerEvent::SignalDescriptor { number: signal_number },
        };
        let _ = self.events.send(event).await;
        Ok(())
    }

    async fn handle_signal_data(&mut self, signal_number: u32, payload: Bytes) -> StreamResult<()> {
        if let DataOutcome::Measured { timestamp, raw } = self.container.process_data(signal_number, payload)? {
            let _ = self.events.send(ConsumerEvent::SignalData { number: signal_number, timestamp, raw }).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stream_protocol::encode_header;
    use tokio::io::duplex;

    async fn write_meta(writer: &mut (impl tokio::io::AsyncWrite + Unpin), signal_number: u32, method: &str, params: Value) {
        use tokio::io::AsyncWriteExt;
        let body = stream_protocol::encode_meta_envelope(method, params).unwrap();
        let header = encode_header(TransportType::MetaInformation, signal_number, body.len() as u32).unwrap();
        writer.write_all(&header).await.unwrap();
        writer.write_all(&body).await.unwrap();
    }

    #[tokio::test]
    async fn rejects_api_version_below_floor() {
        let (mut client, server) = duplex(8192);
        let (tx, mut rx) = mpsc::channel(16);
        let handler = ProtocolHandler::new(server, tx);
        let handle = tokio::spawn(handler.run());

        write_meta(&mut client, 0, "apiVersion", json!({"version": "0.5.0"})).await;
        drop(client);

        let result = handle.await.unwrap();
        assert!(matches!(result, Err(StreamError::UnsupportedVersion { .. })));
        while let Some(event) = rx.recv().await {
            if let ConsumerEvent::Closed(Some(_)) = event {
                return;
            }
        }
        panic!("expected a Closed(Some(..)) event");
    }

    #[tokio::test]
    async fn records_init_stream_id_and_control_port_once() {
        let (mut client, server) = duplex(8192);
        let (tx, _rx) = mpsc::channel(16);
        let mut handler = ProtocolHandler::new(server, tx);

        write_meta(&mut client, 0, "apiVersion", json!({"version": "1.0.0"})).await;
        write_meta(
            &mut client,
            0,
            "init",
            json!({"streamId": "demo", "commandInterfaces": {"jsonrpc-http": {"path": "/rpc", "port": 8080, "version": "2.0"}}}),
        )
        .await;

        // Drive the loop for exactly two frames then stop by dropping the client.
        handler.run_inner_for_test(2).await;
        assert_eq!(handler.control_info().stream_id.as_deref(), Some("demo"));
        assert_eq!(handler.control_info().http_control_port, Some(8080));
    }

    impl<T: AsyncRead + AsyncWrite + Unpin + Send> ProtocolHandler<T> {
        async fn run_inner_for_test(&mut self, frame_count: usize) {
            for _ in 0..frame_count {
                if let Some(Ok(frame)) = self.framed.next().await {
                    match frame.transport_type {
                        TransportType::SignalData => {
                            let _ = self.handle_signal_data(frame.signal_number, frame.payload).await;
                        }
                        TransportType::MetaInformation => {
                            let _ = self.handle_meta(frame.signal_number, &frame.payload).await;
                        }
                    }
                }
            }
        }
    }
}
