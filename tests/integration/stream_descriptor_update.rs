//! Scenario: after a signal has been subscribed, the producer mutates
//! its unit, range, and post-scaling and re-announces the descriptor.
//! The consumer must see a second `signal` meta without disturbing
//! data already delivered under the old descriptor.

use std::sync::Arc;

use stream_consumer::ConsumerEvent;
use stream_producer::{DomainSignal, ProducerSignal, ValueSignal};
use stream_protocol::{PostScaling, Range, SampleType, Unit};
use stream_test_support::{duplex_pair, spawn_consumer, start_producer_session};

#[tokio::test]
async fn descriptor_change_after_subscribe_is_delivered_as_a_second_signal_meta() {
    let (producer_transport, consumer_transport) = duplex_pair();
    let session = start_producer_session(producer_transport, "endpoint-e", None).await;
    let (mut events, handle) = spawn_consumer(consumer_transport);

    let writer = session.writer();
    let allocator = session.allocator();
    let time = Arc::new(DomainSignal::new_linear("timeId", "T", 1_000_000_000, 1_000_000, writer.clone(), &allocator).unwrap());
    let value = Arc::new(ValueSignal::new_synchronous("dataId", "T", SampleType::Real64, writer, &allocator).unwrap());

    value
        .set_unit(Unit {
            id: 1,
            display_name: "original".to_owned(),
            quantity: "pressure".to_owned(),
        })
        .await;

    session
        .add_signals(vec![ProducerSignal::Domain(time.clone()), ProducerSignal::Value(value.clone())])
        .await
        .unwrap();
    session
        .subscribe_signals(&["timeId".to_owned(), "dataId".to_owned()])
        .await
        .unwrap();

    value.add_data(&[1.0f64]).await.unwrap();

    value
        .set_unit(Unit {
            id: 1111,
            display_name: "new".to_owned(),
            quantity: "pressure".to_owned(),
        })
        .await;
    value.set_range(Range { low: -34.9, high: 1000.1 }).await;
    value.set_post_scaling(PostScaling { offset: -5.0, scale: 2.0 }).await;
    value.write_signal_meta_information().await.unwrap();

    value.add_data(&[2.0f64]).await.unwrap();

    session.stop().await.unwrap();

    let mut descriptor_events = Vec::new();
    let mut data_events = Vec::new();
    while let Some(event) = events.recv().await {
        match event {
            ConsumerEvent::SignalDescriptor { number } => descriptor_events.push(number),
            ConsumerEvent::SignalData { timestamp, raw, .. } => data_events.push((timestamp, raw)),
            ConsumerEvent::Closed(_) => break,
            _ => {}
        }
    }
    handle.await.unwrap().unwrap();

    // One descriptor for the time signal, two for the data signal
    // (initial subscribe-time descriptor, then the post-subscribe update).
    assert_eq!(descriptor_events.len(), 3);
    let data_number = descriptor_events[1];
    assert_eq!(descriptor_events[2], data_number);

    assert_eq!(data_events.len(), 2);
    assert_eq!(data_events[0].0, 0);
    assert_eq!(f64::from_le_bytes(data_events[0].1[..].try_into().unwrap()), 1.0);
    // No new time anchor arrived between the two values, so the linear
    // index kept advancing from the first value instead of resetting.
    assert_eq!(data_events[1].0, 1_000_000);
    assert_eq!(f64::from_le_bytes(data_events[1].1[..].try_into().unwrap()), 2.0);
}
