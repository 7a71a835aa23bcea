//! Scenario: one synchronous REAL64 data signal bound to a linear time
//! signal. Exercises the full announce -> subscribe -> describe ->
//! data -> unsubscribe -> remove lifecycle end to end.

use std::sync::Arc;

use stream_consumer::ConsumerEvent;
use stream_producer::{DomainSignal, ProducerSignal, ValueSignal};
use stream_protocol::SampleType;
use stream_test_support::{drain_until_closed, duplex_pair, spawn_consumer, start_producer_session};

const TICKS_PER_SECOND: u64 = 1_000_000_000;
const DELTA: u64 = 1_000_000; // 1ms output rate

#[tokio::test]
async fn synchronous_signal_lifecycle_matches_expected_event_order() {
    let (producer_transport, consumer_transport) = duplex_pair();
    let session = start_producer_session(producer_transport, "endpoint-b", None).await;
    let (mut events, handle) = spawn_consumer(consumer_transport);

    let writer = session.writer();
    let allocator = session.allocator();
    let time =
        Arc::new(DomainSignal::new_linear("timeId", "T", TICKS_PER_SECOND, DELTA, writer.clone(), &allocator).unwrap());
    let value = Arc::new(ValueSignal::new_synchronous("dataId", "T", SampleType::Real64, writer, &allocator).unwrap());

    session
        .add_signals(vec![ProducerSignal::Domain(time.clone()), ProducerSignal::Value(value.clone())])
        .await
        .unwrap();

    session
        .subscribe_signals(&["timeId".to_owned(), "dataId".to_owned()])
        .await
        .unwrap();

    value.add_data(&[1.0f64, 67.4365]).await.unwrap();
    let anchor_index = value.sample_counter().await;
    time.set_time_start(anchor_index, 30_000_000).await.unwrap();

    let samples = vec![2.0f64; 1024];
    value.add_data(&samples).await.unwrap();

    session
        .unsubscribe_signals(&["dataId".to_owned(), "timeId".to_owned()])
        .await
        .unwrap();
    session.remove_signals(&["dataId".to_owned()]).await.unwrap();
    session.stop().await.unwrap();

    let mut seen = Vec::new();
    while let Some(event) = events.recv().await {
        let is_closed = matches!(event, ConsumerEvent::Closed(_));
        seen.push(event);
        if is_closed {
            break;
        }
    }
    handle.await.unwrap().unwrap();

    // available(["dataId"]), apiVersion, init are emitted before the signals
    // are added; skip past the two handshake frames and the available frame.
    let available_pos = seen
        .iter()
        .position(|e| matches!(e, ConsumerEvent::StreamMeta { method, .. } if method == "available"))
        .expect("available frame");
    match &seen[available_pos] {
        ConsumerEvent::StreamMeta { params, .. } => {
            assert_eq!(params.get("signalIds").and_then(|v| v.as_array()).map(Vec::len), Some(1));
        }
        _ => unreachable!(),
    }

    let rest = &seen[available_pos + 1..];
    assert!(matches!(rest[0], ConsumerEvent::SignalSubscribed { number: _, .. }));
    let time_number = match &rest[0] {
        ConsumerEvent::SignalSubscribed { number, id } => {
            assert_eq!(id, "timeId");
            *number
        }
        _ => unreachable!(),
    };
    assert!(matches!(rest[1], ConsumerEvent::SignalDescriptor { number } if number == time_number));

    let data_number = match &rest[2] {
        ConsumerEvent::SignalSubscribed { number, id } => {
            assert_eq!(id, "dataId");
            *number
        }
        other => panic!("expected data subscribe, got {other:?}"),
    };
    assert!(matches!(rest[3], ConsumerEvent::SignalDescriptor { number } if number == data_number));

    match &rest[4] {
        ConsumerEvent::SignalData { number, timestamp, raw } => {
            assert_eq!(*number, data_number);
            assert_eq!(*timestamp, 0);
            assert_eq!(raw.len(), 16);
        }
        other => panic!("expected first data chunk, got {other:?}"),
    }

    match &rest[5] {
        ConsumerEvent::SignalData { number, timestamp, raw } => {
            assert_eq!(*number, data_number);
            assert_eq!(*timestamp, 30_000_000);
            assert_eq!(raw.len(), 8192);
        }
        other => panic!("expected anchored data chunk, got {other:?}"),
    }

    assert!(matches!(rest[6], ConsumerEvent::SignalUnsubscribed { number } if number == data_number));
    assert!(matches!(rest[7], ConsumerEvent::SignalUnsubscribed { number } if number == time_number));

    match &rest[8] {
        ConsumerEvent::StreamMeta { method, params } => {
            assert_eq!(method, "unavailable");
            assert_eq!(params.get("signalIds").and_then(|v| v.as_array()).map(Vec::len), Some(1));
        }
        other => panic!("expected unavailable, got {other:?}"),
    }

    assert!(matches!(rest.last(), Some(ConsumerEvent::Closed(None))));
}
