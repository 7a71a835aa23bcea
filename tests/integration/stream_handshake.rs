//! Scenario: a producer opens a session, the consumer sees exactly
//! `apiVersion` then `init`, and the session stops cleanly with no
//! other frames exchanged.

use stream_consumer::ConsumerEvent;
use stream_test_support::{drain_until_closed, duplex_pair, spawn_consumer, start_producer_session};

#[tokio::test]
async fn handshake_only_yields_api_version_then_init_then_closed() {
    let (producer_transport, consumer_transport) = duplex_pair();
    let session = start_producer_session(producer_transport, "endpoint-a", None).await;
    let (events, handle) = spawn_consumer(consumer_transport);

    session.stop().await.unwrap();
    let collected = drain_until_closed(events).await;
    handle.await.unwrap().unwrap();

    assert_eq!(collected.len(), 3, "expected apiVersion, init, Closed and nothing else: {collected:?}");

    match &collected[0] {
        ConsumerEvent::StreamMeta { method, params } => {
            assert_eq!(method, "apiVersion");
            assert_eq!(params.get("version").and_then(|v| v.as_str()), Some("1.0.0"));
        }
        other => panic!("expected apiVersion first, got {other:?}"),
    }

    match &collected[1] {
        ConsumerEvent::StreamMeta { method, params } => {
            assert_eq!(method, "init");
            assert_eq!(params.get("streamId").and_then(|v| v.as_str()), Some("endpoint-a"));
        }
        other => panic!("expected init second, got {other:?}"),
    }

    assert!(matches!(collected[2], ConsumerEvent::Closed(None)));
}
