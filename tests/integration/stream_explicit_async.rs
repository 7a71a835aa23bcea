//! Scenario: an EXPLICIT-rule time signal paired with an EXPLICIT-rule
//! asynchronous REAL64 data signal. Each value carries its own
//! timestamp frame rather than being reconstructed from a linear
//! anchor.

use std::sync::Arc;

use stream_consumer::ConsumerEvent;
use stream_producer::{DomainSignal, ProducerSignal, ValueSignal};
use stream_protocol::SampleType;
use stream_test_support::{duplex_pair, spawn_consumer, start_producer_session};

#[tokio::test]
async fn explicit_rule_async_signal_carries_its_own_timestamp() {
    let (producer_transport, consumer_transport) = duplex_pair();
    let session = start_producer_session(producer_transport, "endpoint-d", None).await;
    let (mut events, handle) = spawn_consumer(consumer_transport);

    let writer = session.writer();
    let allocator = session.allocator();
    let time = Arc::new(DomainSignal::new_explicit("timeId", "T", 1_000_000_000, writer.clone(), &allocator).unwrap());
    let value = Arc::new(ValueSignal::new_asynchronous("eventId", "T", SampleType::Real64, writer, &allocator).unwrap());

    session
        .add_signals(vec![ProducerSignal::Domain(time.clone()), ProducerSignal::Value(value.clone())])
        .await
        .unwrap();
    session
        .subscribe_signals(&["timeId".to_owned(), "eventId".to_owned()])
        .await
        .unwrap();

    time.write_timestamp(111).await.unwrap();
    value.add_data(&[10.0f64]).await.unwrap();

    session.stop().await.unwrap();

    let mut data_event = None;
    while let Some(event) = events.recv().await {
        if let ConsumerEvent::SignalData { .. } = &event {
            data_event = Some(event);
            break;
        }
    }
    handle.await.unwrap().unwrap();

    let ConsumerEvent::SignalData { timestamp, raw, .. } = data_event.expect("a SignalData event") else {
        unreachable!()
    };
    assert_eq!(timestamp, 111);
    assert_eq!(raw.len(), 8);
    assert_eq!(f64::from_le_bytes(raw[..].try_into().unwrap()), 10.0);
}
