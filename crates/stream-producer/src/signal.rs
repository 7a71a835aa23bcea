//! Value-signal (C4) and domain-signal (C5) descriptors, plus the
//! `ProducerSignal` tag that lets a `ProducerSession` hold either kind
//! in one map. Replaces the source's `BaseSignal -> BaseValueSignal ->
//! {Synchronous, Asynchronous, Constant}` hierarchy with a small tagged
//! variant per DESIGN.md's redesign note.

use std::sync::Arc;

use serde_json::Value;
use stream_protocol::{
    constants::signal_method, PostScaling, Range, RelatedSignals, Resolution, Rule, SampleType,
    SignalDefinition, SignalDescriptor, StreamError, StreamResult, Unit,
};
use tokio::io::AsyncWrite;
use tokio::sync::Mutex;

use crate::wire_scalar::WireScalar;
use crate::writer::StreamWriter;

const UNIX_EPOCH: &str = stream_protocol::constants::UNIX_EPOCH;

/// Fields shared by value and domain signals: identity, the shared
/// writer, and the two generic descriptor extras (interpretation blob,
/// related-signal map) that both kinds may carry.
struct SignalCore<W> {
    id: String,
    table_id: String,
    number: u32,
    writer: Arc<StreamWriter<W>>,
}

impl<W: AsyncWrite + Unpin + Send> SignalCore<W> {
    async fn emit_subscribe_ack(&self) -> StreamResult<()> {
        self.writer
            .write_meta_information(
                self.number,
                signal_method::SUBSCRIBE,
                serde_json::json!({ "signalId": self.id }),
            )
            .await
    }

    async fn emit_unsubscribe(&self) -> StreamResult<()> {
        self.writer
            .write_meta_information(self.number, signal_method::UNSUBSCRIBE, serde_json::json!({}))
            .await
    }

    async fn emit_descriptor(&self, descriptor: &SignalDescriptor) -> StreamResult<()> {
        self.writer
            .write_meta_information(self.number, signal_method::SIGNAL, descriptor.compose_params())
            .await
    }
}

struct ValueState {
    sample_type: SampleType,
    unit: Unit,
    range: Range,
    post_scaling: PostScaling,
    interpretation: Option<Value>,
    related_signals: RelatedSignals,
    kind: ValueKind,
}

enum ValueKind {
    Synchronous { sample_counter: u64 },
    Asynchronous,
    Constant,
}

impl ValueKind {
    fn rule(&self) -> Rule {
        match self {
            ValueKind::Synchronous { .. } | ValueKind::Asynchronous => Rule::Explicit,
            ValueKind::Constant => Rule::Constant,
        }
    }
}

/// A value-producing signal (spec §4.4): synchronous, asynchronous, or
/// constant-rule, over any scalar/array/struct sample type.
pub struct ValueSignal<W> {
    core: SignalCore<W>,
    state: Mutex<ValueState>,
}

impl<W: AsyncWrite + Unpin + Send> ValueSignal<W> {
    fn new(
        kind: ValueKind,
        id: impl Into<String>,
        table_id: impl Into<String>,
        sample_type: SampleType,
        writer: Arc<StreamWriter<W>>,
        allocator: &stream_protocol::SignalNumberAllocator,
    ) -> StreamResult<Self> {
        let number = allocator.allocate().ok_or(StreamError::Protocol {
            reason: "signal-number space exhausted",
        })?;
        Ok(Self {
            core: SignalCore {
                id: id.into(),
                table_id: table_id.into(),
                number,
                writer,
            },
            state: Mutex::new(ValueState {
                sample_type,
                unit: Unit::none(),
                range: Range::unlimited(),
                post_scaling: PostScaling::identity(),
                interpretation: None,
                related_signals: RelatedSignals::new(),
                kind,
            }),
        })
    }

    pub fn new_synchronous(
        id: impl Into<String>,
        table_id: impl Into<String>,
        sample_type: SampleType,
        writer: Arc<StreamWriter<W>>,
        allocator: &stream_protocol::SignalNumberAllocator,
    ) -> StreamResult<Self> {
        Self::new(
            ValueKind::Synchronous { sample_counter: 0 },
            id,
            table_id,
            sample_type,
            writer,
            allocator,
        )
    }

    pub fn new_asynchronous(
        id: impl Into<String>,
        table_id: impl Into<String>,
        sample_type: SampleType,
        writer: Arc<StreamWriter<W>>,
        allocator: &stream_protocol::SignalNumberAllocator,
    ) -> StreamResult<Self> {
        Self::new(ValueKind::Asynchronous, id, table_id, sample_type, writer, allocator)
    }

    pub fn new_constant(
        id: impl Into<String>,
        table_id: impl Into<String>,
        sample_type: SampleType,
        writer: Arc<StreamWriter<W>>,
        allocator: &stream_protocol::SignalNumberAllocator,
    ) -> StreamResult<Self> {
        Self::new(ValueKind::Constant, id, table_id, sample_type, writer, allocator)
    }

    pub fn id(&self) -> &str {
        &self.core.id
    }

    pub fn table_id(&self) -> &str {
        &self.core.table_id
    }

    pub fn number(&self) -> u32 {
        self.core.number
    }

    pub async fn set_unit(&self, unit: Unit) {
        self.state.lock().await.unit = unit;
    }

    pub async fn set_range(&self, range: Range) {
        self.state.lock().await.range = range;
    }

    pub async fn set_post_scaling(&self, post_scaling: PostScaling) {
        self.state.lock().await.post_scaling = post_scaling;
    }

    pub async fn set_related_signals(&self, related_signals: RelatedSignals) {
        self.state.lock().await.related_signals = related_signals;
    }

    pub async fn set_interpretation_object(&self, interpretation: Value) {
        self.state.lock().await.interpretation = Some(interpretation);
    }

    /// Current synchronous sample counter. Producer applications read
    /// this to supply `value_index` to a paired linear time signal's
    /// `set_time_start`.
    pub async fn sample_counter(&self) -> u64 {
        match self.state.lock().await.kind {
            ValueKind::Synchronous { sample_counter } => sample_counter,
            _ => 0,
        }
    }

    fn descriptor(&self, state: &ValueState) -> SignalDescriptor {
        SignalDescriptor {
            table_id: self.core.table_id.clone(),
            value_index: None,
            interpretation: state.interpretation.clone(),
            related_signals: state.related_signals.clone(),
            definition: SignalDefinition {
                name: "value".to_owned(),
                data_type: state.sample_type.clone(),
                rule: state.kind.rule(),
                linear_delta: None,
                unit: state.unit.clone(),
                resolution: None,
                absolute_reference: None,
                range: state.range,
                post_scaling: state.post_scaling,
            },
        }
    }

    /// Emits a `signal` meta frame carrying the current descriptor.
    pub async fn write_signal_meta_information(&self) -> StreamResult<()> {
        let state = self.state.lock().await;
        let descriptor = self.descriptor(&state);
        self.core.emit_descriptor(&descriptor).await
    }

    /// Emits `subscribe` then the current descriptor, as if the signal
    /// had just been added (spec §4.4).
    pub async fn subscribe(&self) -> StreamResult<()> {
        self.core.emit_subscribe_ack().await?;
        self.write_signal_meta_information().await
    }

    pub async fn unsubscribe(&self) -> StreamResult<()> {
        self.core.emit_unsubscribe().await
    }

    /// Raw bytes, used for sample types `add_data`'s generic form can't
    /// express (complex, array, struct).
    pub async fn add_data_raw(&self, bytes: &[u8]) -> StreamResult<()> {
        self.core.writer.write_signal_data(self.core.number, bytes).await
    }

    /// Synchronous/asynchronous signals: writes `values` as one frame
    /// of `values.len() * size_of::<T>()` bytes. Per spec, an
    /// asynchronous signal must be called with exactly one value.
    pub async fn add_data<T: WireScalar>(&self, values: &[T]) -> StreamResult<()> {
        {
            let mut state = self.state.lock().await;
            if matches!(state.kind, ValueKind::Asynchronous) {
                if values.len() != 1 {
                    return Err(StreamError::Protocol {
                        reason: "an explicit-rule asynchronous data signal carries exactly one value per frame",
                    });
                }
            }
            if let ValueKind::Synchronous { sample_counter } = &mut state.kind {
                *sample_counter += values.len() as u64;
            }
        }
        let mut bytes = Vec::with_capacity(values.len() * T::WIRE_SIZE);
        for v in values {
            bytes.extend_from_slice(&v.to_wire_bytes());
        }
        self.add_data_raw(&bytes).await
    }

    /// Constant-rule signal: packs `n` `[u64 index][T value]` pairs
    /// into one data frame.
    pub async fn add_constant_data<T: WireScalar>(&self, pairs: &[(u64, T)]) -> StreamResult<()> {
        let mut bytes = Vec::with_capacity(pairs.len() * (8 + T::WIRE_SIZE));
        for (index, value) in pairs {
            bytes.extend_from_slice(&index.to_le_bytes());
            bytes.extend_from_slice(&value.to_wire_bytes());
        }
        self.add_data_raw(&bytes).await
    }
}

enum DomainKind {
    Linear {
        ticks_per_second: u64,
        delta: u64,
    },
    Explicit {
        ticks_per_second: u64,
    },
}

/// A time (domain) signal (spec §4.5): linear or explicit rule, always
/// `UINT64`, always a `"time"`-quantity unit of seconds.
pub struct DomainSignal<W> {
    core: SignalCore<W>,
    epoch: String,
    kind: DomainKind,
}

impl<W: AsyncWrite + Unpin + Send> DomainSignal<W> {
    pub fn new_linear(
        id: impl Into<String>,
        table_id: impl Into<String>,
        ticks_per_second: u64,
        delta: u64,
        writer: Arc<StreamWriter<W>>,
        allocator: &stream_protocol::SignalNumberAllocator,
    ) -> StreamResult<Self> {
        let number = allocator.allocate().ok_or(StreamError::Protocol {
            reason: "signal-number space exhausted",
        })?;
        Ok(Self {
            core: SignalCore {
                id: id.into(),
                table_id: table_id.into(),
                number,
                writer,
            },
            epoch: UNIX_EPOCH.to_owned(),
            kind: DomainKind::Linear { ticks_per_second, delta },
        })
    }

    pub fn new_explicit(
        id: impl Into<String>,
        table_id: impl Into<String>,
        ticks_per_second: u64,
        writer: Arc<StreamWriter<W>>,
        allocator: &stream_protocol::SignalNumberAllocator,
    ) -> StreamResult<Self> {
        let number = allocator.allocate().ok_or(StreamError::Protocol {
            reason: "signal-number space exhausted",
        })?;
        Ok(Self {
            core: SignalCore {
                id: id.into(),
                table_id: table_id.into(),
                number,
                writer,
            },
            epoch: UNIX_EPOCH.to_owned(),
            kind: DomainKind::Explicit { ticks_per_second },
        })
    }

    pub fn id(&self) -> &str {
        &self.core.id
    }

    pub fn table_id(&self) -> &str {
        &self.core.table_id
    }

    pub fn number(&self) -> u32 {
        self.core.number
    }

    pub fn set_epoch(&mut self, epoch: impl Into<String>) {
        self.epoch = epoch.into();
    }

    fn descriptor(&self) -> SignalDescriptor {
        let (rule, linear_delta, ticks_per_second) = match self.kind {
            DomainKind::Linear { ticks_per_second, delta } => (Rule::Linear, Some(delta), ticks_per_second),
            DomainKind::Explicit { ticks_per_second } => (Rule::Explicit, None, ticks_per_second),
        };
        SignalDescriptor {
            table_id: self.core.table_id.clone(),
            value_index: None,
            interpretation: None,
            related_signals: RelatedSignals::new(),
            definition: SignalDefinition {
                name: "time".to_owned(),
                data_type: SampleType::U64,
                rule,
                linear_delta,
                unit: Unit::seconds(),
                resolution: Some(Resolution::ticks_per_second(ticks_per_second)),
                absolute_reference: Some(self.epoch.clone()),
                range: Range::unlimited(),
                post_scaling: PostScaling::identity(),
            },
        }
    }

    pub async fn write_signal_meta_information(&self) -> StreamResult<()> {
        self.core.emit_descriptor(&self.descriptor()).await
    }

    pub async fn subscribe(&self) -> StreamResult<()> {
        self.core.emit_subscribe_ack().await?;
        self.write_signal_meta_information().await
    }

    pub async fn unsubscribe(&self) -> StreamResult<()> {
        self.core.emit_unsubscribe().await
    }

    /// Anchors a linear sequence to absolute time: writes one data
    /// frame `[u64 value_index][u64 start_ticks]`. `value_index` is
    /// the paired data signal's sample counter at the moment of the
    /// call (the source's implicit shared counter is made an explicit
    /// caller-supplied argument; see DESIGN.md).
    pub async fn set_time_start(&self, value_index: u64, start_ticks: u64) -> StreamResult<()> {
        if !matches!(self.kind, DomainKind::Linear { .. }) {
            return Err(StreamError::UnsupportedRule {
                signal_number: self.core.number,
                rule: "set_time_start is only valid for a linear-rule time signal".to_owned(),
            });
        }
        let mut bytes = Vec::with_capacity(16);
        bytes.extend_from_slice(&value_index.to_le_bytes());
        bytes.extend_from_slice(&start_ticks.to_le_bytes());
        self.core.writer.write_signal_data(self.core.number, &bytes).await
    }

    /// Writes one absolute timestamp as a single `u64` data frame,
    /// valid only for an explicit-rule time signal.
    pub async fn write_timestamp(&self, ticks: u64) -> StreamResult<()> {
        if !matches!(self.kind, DomainKind::Explicit { .. }) {
            return Err(StreamError::UnsupportedRule {
                signal_number: self.core.number,
                rule: "write_timestamp is only valid for an explicit-rule time signal".to_owned(),
            });
        }
        self.core.writer.write_signal_data(self.core.number, &ticks.to_le_bytes()).await
    }
}

/// Either a value or a domain signal, shared via `Arc` so the owning
/// producer application can keep calling `add_data`/`set_time_start`
/// after handing a clone to a `ProducerSession`.
pub enum ProducerSignal<W> {
    Value(Arc<ValueSignal<W>>),
    Domain(Arc<DomainSignal<W>>),
}

impl<W> Clone for ProducerSignal<W> {
    fn clone(&self) -> Self {
        match self {
            Self::Value(v) => Self::Value(v.clone()),
            Self::Domain(d) => Self::Domain(d.clone()),
        }
    }
}

impl<W: AsyncWrite + Unpin + Send> ProducerSignal<W> {
    pub fn id(&self) -> &str {
        match self {
            Self::Value(v) => v.id(),
            Self::Domain(d) => d.id(),
        }
    }

    pub fn table_id(&self) -> &str {
        match self {
            Self::Value(v) => v.table_id(),
            Self::Domain(d) => d.table_id(),
        }
    }

    pub fn number(&self) -> u32 {
        match self {
            Self::Value(v) => v.number(),
            Self::Domain(d) => d.number(),
        }
    }

    /// Only value signals are announced through `available`/`unavailable`.
    pub fn is_data_signal(&self) -> bool {
        matches!(self, Self::Value(_))
    }

    pub async fn subscribe(&self) -> StreamResult<()> {
        match self {
            Self::Value(v) => v.subscribe().await,
            Self::Domain(d) => d.subscribe().await,
        }
    }

    pub async fn unsubscribe(&self) -> StreamResult<()> {
        match self {
            Self::Value(v) => v.unsubscribe().await,
            Self::Domain(d) => d.unsubscribe().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stream_protocol::SignalNumberAllocator;
    use tokio::io::duplex;

    async fn drain(mut server: tokio::io::DuplexStream) {
        use tokio::io::AsyncReadExt;
        tokio::spawn(async move {
            let mut buf = [0u8; 4096];
            loop {
                match server.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        });
    }

    #[tokio::test]
    async fn synchronous_signal_tracks_sample_counter() {
        let (client, server) = duplex(8192);
        drain(server).await;
        let writer = Arc::new(StreamWriter::new("demo", client));
        let allocator = SignalNumberAllocator::new();
        let sig = ValueSignal::new_synchronous("data", "T", SampleType::Real64, writer, &allocator).unwrap();
        sig.add_data(&[1.0f64, 67.4365]).await.unwrap();
        assert_eq!(sig.sample_counter().await, 2);
    }

    #[tokio::test]
    async fn asynchronous_signal_rejects_multi_value_batches() {
        let (client, server) = duplex(8192);
        drain(server).await;
        let writer = Arc::new(StreamWriter::new("demo", client));
        let allocator = SignalNumberAllocator::new();
        let sig = ValueSignal::new_asynchronous("evt", "T", SampleType::Real64, writer, &allocator).unwrap();
        assert!(sig.add_data(&[1.0f64, 2.0]).await.is_err());
        assert!(sig.add_data(&[1.0f64]).await.is_ok());
    }

    #[tokio::test]
    async fn explicit_time_signal_rejects_set_time_start() {
        let (client, server) = duplex(8192);
        drain(server).await;
        let writer = Arc::new(StreamWriter::new("demo", client));
        let allocator = SignalNumberAllocator::new();
        let time = DomainSignal::new_explicit("time", "T", 1_000_000_000, writer, &allocator).unwrap();
        assert!(time.set_time_start(0, 0).await.is_err());
        assert!(time.write_timestamp(111).await.is_ok());
    }
}
