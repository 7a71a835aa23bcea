//! Scenario: a control server wired to one producer session under
//! stream id `"demo"`. A JSON-RPC subscribe call against a real HTTP
//! server invokes the session's `subscribe_signals`, and the session's
//! own consumer observes the resulting `subscribe` + `signal` frames.
//! Grounded in `tests/integration/e2e_forwarder_server_receiver.rs`'s
//! `start_server` shape.

use std::sync::Arc;
use std::time::Duration;

use stream_consumer::ConsumerEvent;
use stream_control::client::ControlClientError;
use stream_control::{ControlClient, ControlClientConfig, ControlServerState};
use stream_producer::{ProducerSignal, ValueSignal};
use stream_protocol::SampleType;
use stream_test_support::{duplex_pair, spawn_consumer, start_producer_session};

async fn start_control_server(state: ControlServerState<tokio::io::DuplexStream>) -> std::net::SocketAddr {
    let router = stream_control::router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    addr
}

#[tokio::test]
async fn subscribe_round_trip_drives_real_frames_over_the_data_socket() {
    let (producer_transport, consumer_transport) = duplex_pair();
    let session = start_producer_session(producer_transport, "demo", None).await;
    let (mut events, _consumer_handle) = spawn_consumer(consumer_transport);

    let writer = session.writer();
    let allocator = session.allocator();
    let value = Arc::new(ValueSignal::new_synchronous("dataId", "T", SampleType::Real64, writer, &allocator).unwrap());
    session.add_signal(ProducerSignal::Value(value)).await.unwrap();

    let state = ControlServerState::new();
    state.register("demo", session.clone()).await;
    let addr = start_control_server(state).await;

    let control_client = ControlClient::new(ControlClientConfig::new(format!("http://{addr}/"))).unwrap();
    let matched = control_client.async_subscribe("demo", &["dataId".to_owned()]).await.unwrap();
    assert_eq!(matched, 1);

    let mut saw_subscribe = false;
    let mut saw_signal = false;
    while let Some(event) = events.recv().await {
        match event {
            ConsumerEvent::SignalSubscribed { id, .. } => {
                assert_eq!(id, "dataId");
                saw_subscribe = true;
            }
            ConsumerEvent::SignalDescriptor { .. } => {
                saw_signal = true;
                break;
            }
            _ => {}
        }
    }
    assert!(saw_subscribe && saw_signal);

    let unknown_err = control_client.async_subscribe("ghost-stream", &["dataId".to_owned()]).await.unwrap_err();
    match unknown_err {
        ControlClientError::RpcError { code, .. } => assert_eq!(code, stream_control::rpc::METHOD_NOT_FOUND),
        other => panic!("expected an RPC error for an unknown stream id, got {other:?}"),
    }

    let matched_empty = control_client.async_subscribe("demo", &[]).await.unwrap();
    assert_eq!(matched_empty, 0);
}
