//! Scenario: a linear time signal paired with a CONSTANT-rule UINT64
//! signal. The producer writes two (index, value) pairs in a single
//! data frame; the consumer's raw callback sees all 32 bytes stamped
//! with the table's current time, not split per pair.

use std::sync::Arc;

use stream_consumer::ConsumerEvent;
use stream_producer::{DomainSignal, ProducerSignal, ValueSignal};
use stream_protocol::SampleType;
use stream_test_support::{duplex_pair, spawn_consumer, start_producer_session};

#[tokio::test]
async fn constant_rule_status_signal_is_delivered_as_one_frame() {
    let (producer_transport, consumer_transport) = duplex_pair();
    let session = start_producer_session(producer_transport, "endpoint-c", None).await;
    let (mut events, handle) = spawn_consumer(consumer_transport);

    let writer = session.writer();
    let allocator = session.allocator();
    let time = Arc::new(DomainSignal::new_linear("timeId", "T", 1_000_000_000, 1_000_000, writer.clone(), &allocator).unwrap());
    let status = Arc::new(ValueSignal::new_constant("statusId", "T", SampleType::U64, writer, &allocator).unwrap());

    session
        .add_signals(vec![ProducerSignal::Domain(time.clone()), ProducerSignal::Value(status.clone())])
        .await
        .unwrap();
    session
        .subscribe_signals(&["timeId".to_owned(), "statusId".to_owned()])
        .await
        .unwrap();

    time.set_time_start(0, 5_000).await.unwrap();
    status.add_constant_data(&[(1000u64, 0x1000u64), (1001u64, 0x1001u64)]).await.unwrap();

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
    assert_eq!(timestamp, 5_000);
    assert_eq!(raw.len(), 32);

    let pairs: Vec<(u64, u64)> = raw
        .chunks_exact(16)
        .map(|chunk| {
            let index = u64::from_le_bytes(chunk[0..8].try_into().unwrap());
            let value = u64::from_le_bytes(chunk[8..16].try_into().unwrap());
            (index, value)
        })
        .collect();
    assert_eq!(pairs, vec![(1000, 0x1000), (1001, 0x1001)]);
}
