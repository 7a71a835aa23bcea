//! In-memory transport and harness helpers for exercising a producer
//! session against a consumer protocol handler without a real socket,
//! adapted from `rt-test-utils`'s mock-client pattern (WebSocket
//! messages there, raw `tokio::io::duplex` byte streams here).

use std::sync::Arc;

use stream_consumer::{ConsumerEvent, ProtocolHandler};
use stream_producer::ProducerSession;
use stream_protocol::SignalNumberAllocator;
use tokio::io::DuplexStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Default buffer size for `tokio::io::duplex`, generous enough for a
/// handful of descriptor frames and a few kilobytes of sample data
/// without blocking a single-threaded test.
pub const DEFAULT_DUPLEX_CAPACITY: usize = 64 * 1024;

pub fn duplex_pair() -> (DuplexStream, DuplexStream) {
    tokio::io::duplex(DEFAULT_DUPLEX_CAPACITY)
}

/// Spins up a producer session on `transport`, writes `apiVersion` +
/// `init`, and spawns its noise-discarding read loop. Returns the
/// session so the caller can add signals and publish data.
pub async fn start_producer_session(
    transport: DuplexStream,
    endpoint_id: impl Into<String>,
    command_interfaces: Option<serde_json::Value>,
) -> Arc<ProducerSession<DuplexStream>> {
    let session = Arc::new(ProducerSession::new(transport, endpoint_id, Arc::new(SignalNumberAllocator::new())));
    session.start(command_interfaces).await.expect("producer handshake should succeed in test harness");

    let noise_session = session.clone();
    tokio::spawn(async move {
        let _ = noise_session.run_noise_loop().await;
    });

    session
}

/// Runs a `ProtocolHandler` over `transport` on a background task and
/// hands back the event receiver plus the task's `JoinHandle` so tests
/// can assert on the final `Result` as well as the event stream.
pub fn spawn_consumer(transport: DuplexStream) -> (mpsc::Receiver<ConsumerEvent>, JoinHandle<stream_protocol::StreamResult<()>>) {
    let (tx, rx) = mpsc::channel(256);
    let handler = ProtocolHandler::new(transport, tx);
    let handle = tokio::spawn(handler.run());
    (rx, handle)
}

/// Drains every event up to and including `Closed`, returning them in
/// order. Panics if the channel closes without a `Closed` event first
/// (that would mean the handler task died without reporting).
pub async fn drain_until_closed(mut events: mpsc::Receiver<ConsumerEvent>) -> Vec<ConsumerEvent> {
    let mut collected = Vec::new();
    while let Some(event) = events.recv().await {
        let is_closed = matches!(event, ConsumerEvent::Closed(_));
        collected.push(event);
        if is_closed {
            return collected;
        }
    }
    panic!("consumer event channel closed without emitting ConsumerEvent::Closed");
}
