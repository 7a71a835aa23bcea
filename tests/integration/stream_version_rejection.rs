//! Scenario: a producer announces an `apiVersion` below the supported
//! floor. The consumer must close the session with
//! `UnsupportedVersion` and never emit anything else.

use stream_consumer::ConsumerEvent;
use stream_producer::StreamWriter;
use stream_protocol::StreamError;
use stream_test_support::{duplex_pair, spawn_consumer};

#[tokio::test]
async fn below_floor_api_version_closes_the_session_with_no_further_events() {
    let (producer_transport, consumer_transport) = duplex_pair();
    let (mut events, handle) = spawn_consumer(consumer_transport);

    let writer = StreamWriter::new("endpoint-f", producer_transport);
    writer
        .write_meta_information(0, "apiVersion", serde_json::json!({ "version": "0.5.0" }))
        .await
        .unwrap();
    writer.shutdown().await.unwrap();

    let mut collected = Vec::new();
    while let Some(event) = events.recv().await {
        collected.push(event);
    }

    assert_eq!(collected.len(), 1, "expected only Closed(Some(..)): {collected:?}");
    assert!(matches!(&collected[0], ConsumerEvent::Closed(Some(_))));

    let result = handle.await.unwrap();
    assert!(matches!(result, Err(StreamError::UnsupportedVersion { version }) if version == "0.5.0"));
}
