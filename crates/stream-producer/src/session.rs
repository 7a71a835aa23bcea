//! Producer session (C7): the per-connection state machine that owns
//! the handshake, the signal registry, and the noise-discarding read
//! loop over the data socket.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};
use stream_protocol::constants::stream_method;
use stream_protocol::{SignalNumberAllocator, StreamError, StreamResult};
use tokio::io::{split, AsyncRead, AsyncReadExt, AsyncWrite, ReadHalf, WriteHalf};
use tokio::sync::RwLock;
use tracing::info;

use crate::signal::ProducerSignal;
use crate::writer::StreamWriter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Active,
    Closing,
    Closed,
}

/// One producer-side connection. `W` is the raw transport; reads and
/// writes are driven over its split halves so the noise-discarding
/// read loop and signal writes never contend for the same lock.
pub struct ProducerSession<W> {
    writer: Arc<StreamWriter<WriteHalf<W>>>,
    read_half: std::sync::Mutex<Option<ReadHalf<W>>>,
    allocator: Arc<SignalNumberAllocator>,
    signals: RwLock<HashMap<String, ProducerSignal<WriteHalf<W>>>>,
    state: RwLock<SessionState>,
}

impl<W: AsyncRead + AsyncWrite + Unpin + Send + 'static> ProducerSession<W> {
    pub fn new(transport: W, endpoint_id: impl Into<String>, allocator: Arc<SignalNumberAllocator>) -> Self {
        let (read_half, write_half) = split(transport);
        Self {
            writer: Arc::new(StreamWriter::new(endpoint_id, write_half)),
            read_half: std::sync::Mutex::new(Some(read_half)),
            allocator,
            signals: RwLock::new(HashMap::new()),
            state: RwLock::new(SessionState::Created),
        }
    }

    /// The shared writer handle, cloned out so callers can construct
    /// signals against the same transport before calling `add_signal`.
    pub fn writer(&self) -> Arc<StreamWriter<WriteHalf<W>>> {
        self.writer.clone()
    }

    pub fn allocator(&self) -> Arc<SignalNumberAllocator> {
        self.allocator.clone()
    }

    pub async fn state(&self) -> SessionState {
        *self.state.read().await
    }

    /// Writes `apiVersion` then `init` and transitions `CREATED -> ACTIVE`.
    /// `command_interfaces` becomes `init.params.commandInterfaces`
    /// (the control channel's `jsonrpc-http` descriptor), when present.
    pub async fn start(&self, command_interfaces: Option<Value>) -> StreamResult<()> {
        self.writer
            .write_meta_information(0, stream_method::API_VERSION, json!({ "version": "1.0.0" }))
            .await?;

        let mut init_params = serde_json::Map::new();
        init_params.insert("streamId".to_owned(), Value::String(self.writer.id().to_owned()));
        if let Some(command_interfaces) = command_interfaces {
            init_params.insert("commandInterfaces".to_owned(), command_interfaces);
        }
        self.writer
            .write_meta_information(0, stream_method::INIT, Value::Object(init_params))
            .await?;

        *self.state.write().await = SessionState::Active;
        info!(endpoint_id = %self.writer.id(), "session active");
        Ok(())
    }

    /// Reads and discards bytes from the data socket until EOF or
    /// error, per spec §4.7(iii) — the control plane is out-of-band,
    /// so inbound bytes here only let us detect the peer closing.
    /// Consumes the read half; calling this twice on the same session
    /// panics.
    pub async fn run_noise_loop(&self) -> StreamResult<()> {
        let mut read_half = self
            .read_half
            .lock()
            .unwrap()
            .take()
            .expect("run_noise_loop already consumed the read half");

        let mut buf = [0u8; 4096];
        let result = loop {
            match read_half.read(&mut buf).await {
                Ok(0) => break Ok(()),
                Ok(_) => continue,
                Err(e) => break Err(StreamError::TransportError(e)),
            }
        };
        *self.state.write().await = SessionState::Closed;
        result
    }

    /// Inserts `signal` into the registry; if it's a data signal,
    /// announces it via one `available` frame. Matches `addSignal`.
    pub async fn add_signal(&self, signal: ProducerSignal<WriteHalf<W>>) -> StreamResult<()> {
        self.add_signals(vec![signal]).await
    }

    /// Batched form: one `available` frame covers every newly added
    /// data signal. Matches `addSignals`.
    pub async fn add_signals(&self, new_signals: Vec<ProducerSignal<WriteHalf<W>>>) -> StreamResult<()> {
        let mut announced = Vec::new();
        {
            let mut signals = self.signals.write().await;
            for signal in new_signals {
                if signal.is_data_signal() {
                    announced.push(signal.id().to_owned());
                }
                signals.insert(signal.id().to_owned(), signal);
            }
        }
        if !announced.is_empty() {
            self.writer
                .write_meta_information(0, stream_method::AVAILABLE, json!({ "signalIds": announced }))
                .await?;
        }
        Ok(())
    }

    /// Removes `id`; if it was a data signal, announces its removal.
    /// Returns whether a signal with that id existed. Matches
    /// `removeSignal`.
    pub async fn remove_signal(&self, id: &str) -> StreamResult<bool> {
        let ids = [id.to_owned()];
        Ok(self.remove_signals(&ids).await? == 1)
    }

    /// Matches `removeSignals`; returns the count actually removed.
    pub async fn remove_signals(&self, ids: &[String]) -> StreamResult<usize> {
        let mut removed = 0usize;
        let mut announced = Vec::new();
        {
            let mut signals = self.signals.write().await;
            for id in ids {
                if let Some(signal) = signals.remove(id) {
                    removed += 1;
                    if signal.is_data_signal() {
                        announced.push(id.clone());
                    }
                }
            }
        }
        if !announced.is_empty() {
            self.writer
                .write_meta_information(0, stream_method::UNAVAILABLE, json!({ "signalIds": announced }))
                .await?;
        }
        Ok(removed)
    }

    /// Invokes `subscribe()` on every signal found among `ids`.
    /// Missing ids are silently skipped; returns the count matched.
    pub async fn subscribe_signals(&self, ids: &[String]) -> StreamResult<usize> {
        let signals = self.signals.read().await;
        let mut matched = 0usize;
        for id in ids {
            if let Some(signal) = signals.get(id) {
                signal.subscribe().await?;
                matched += 1;
            }
        }
        info!(endpoint_id = %self.writer.id(), requested = ids.len(), matched, "signals subscribed");
        Ok(matched)
    }

    /// Symmetric with `subscribe_signals`.
    pub async fn unsubscribe_signals(&self, ids: &[String]) -> StreamResult<usize> {
        let signals = self.signals.read().await;
        let mut matched = 0usize;
        for id in ids {
            if let Some(signal) = signals.get(id) {
                signal.unsubscribe().await?;
                matched += 1;
            }
        }
        info!(endpoint_id = %self.writer.id(), requested = ids.len(), matched, "signals unsubscribed");
        Ok(matched)
    }

    /// Closes the transport. Further `add_data` calls on signals
    /// constructed against this session's writer are undefined, per
    /// spec §4.7.
    pub async fn stop(&self) -> StreamResult<()> {
        *self.state.write().await = SessionState::Closing;
        self.writer.shutdown().await?;
        *self.state.write().await = SessionState::Closed;
        info!(endpoint_id = %self.writer.id(), "session closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::ValueSignal;
    use stream_protocol::SampleType;
    use tokio::io::duplex;

    #[tokio::test]
    async fn start_writes_api_version_then_init() {
        let (client, mut server) = duplex(8192);
        let session = ProducerSession::new(client, "demo", Arc::new(SignalNumberAllocator::new()));
        session.start(None).await.unwrap();

        use tokio::io::AsyncReadExt;
        let mut buf = [0u8; 4096];
        let n = server.read(&mut buf).await.unwrap();
        let payload = stream_protocol::decode_meta_envelope(&buf[4..n]);
        assert!(payload.is_ok());
        assert_eq!(session.state().await, SessionState::Active);
    }

    #[tokio::test]
    async fn add_signals_announces_only_data_signals() {
        let (client, server) = duplex(8192);
        let session = Arc::new(ProducerSession::new(client, "demo", Arc::new(SignalNumberAllocator::new())));
        session.start(None).await.unwrap();

        let writer = session.writer();
        let allocator = session.allocator();
        let value = Arc::new(
            ValueSignal::new_synchronous("data", "T", SampleType::Real64, writer.clone(), &allocator).unwrap(),
        );
        let time = Arc::new(crate::signal::DomainSignal::new_linear(
            "time",
            "T",
            1_000_000_000,
            1_000_000,
            writer,
            &allocator,
        ).unwrap());

        use tokio::io::AsyncReadExt;
        tokio::spawn(async move {
            let mut s = server;
            let mut buf = [0u8; 8192];
            loop {
                match s.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        });

        session
            .add_signals(vec![
                ProducerSignal::Value(value.clone()),
                ProducerSignal::Domain(time),
            ])
            .await
            .unwrap();

        let matched = session.subscribe_signals(&["data".to_owned()]).await.unwrap();
        assert_eq!(matched, 1);
    }
}
