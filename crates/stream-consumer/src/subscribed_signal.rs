//! Subscribed-signal state (C8): per-signal decoder state updated by
//! meta frames and consulted while decoding data frames.

use serde_json::Value;
use stream_protocol::{PostScaling, Range, RelatedSignals, Rule, SampleType, SignalDescriptor, StreamError, StreamResult, Unit};

/// One signal's consumer-side state, created on `subscribe` and
/// populated by the first `signal` meta. Whether it acts as a time
/// signal or a data signal within its table is determined entirely by
/// `unit.is_time()` — there is no separate discriminant.
#[derive(Debug, Clone)]
pub struct SubscribedSignal {
    pub number: u32,
    pub id: String,
    pub table_id: String,
    pub data_type: Option<SampleType>,
    pub rule: Option<Rule>,
    pub linear_delta: Option<u64>,
    pub unit: Unit,
    pub range: Range,
    pub post_scaling: PostScaling,
    pub interpretation: Option<Value>,
    pub related_signals: RelatedSignals,
    /// Absolute tick anchor; meaningful only while this signal is a
    /// time signal (updated by its own data frames).
    pub time: u64,
    /// Per-data-signal sample counter used by the linear-time decode
    /// path; reset to zero whenever the table's time signal delivers
    /// a new anchor.
    pub linear_value_index: u64,
}

impl SubscribedSignal {
    pub fn new(number: u32) -> Self {
        Self {
            number,
            id: String::new(),
            table_id: String::new(),
            data_type: None,
            rule: None,
            linear_delta: None,
            unit: Unit::none(),
            range: Range::unlimited(),
            post_scaling: PostScaling::identity(),
            interpretation: None,
            related_signals: RelatedSignals::new(),
            time: 0,
            linear_value_index: 0,
        }
    }

    pub fn is_time_signal(&self) -> bool {
        self.unit.is_time()
    }

    /// Processes a `subscribe` meta: sets `id` from `params.signalId`,
    /// accepting a string or a number coerced to its decimal string
    /// form. Missing or object-typed `signalId` is `BadMeta`.
    pub fn process_subscribe(&mut self, params: &Value) -> StreamResult<()> {
        let signal_id = params.get("signalId").ok_or_else(|| StreamError::BadMeta {
            signal_number: Some(self.number),
            reason: "subscribe meta missing signalId".to_owned(),
        })?;
        self.id = match signal_id {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => {
                return Err(StreamError::BadMeta {
                    signal_number: Some(self.number),
                    reason: "signalId must be a string or a number".to_owned(),
                })
            }
        };
        Ok(())
    }

    /// Processes a `signal` meta: parses the full descriptor, applying
    /// the previously known linear delta (if any) so a later update
    /// that omits `linear.delta` still validates.
    pub fn process_signal(&mut self, params: &serde_json::Map<String, Value>) -> StreamResult<()> {
        let descriptor = SignalDescriptor::parse_params(params, self.linear_delta).map_err(|e| match e {
            StreamError::BadMeta { reason, .. } => StreamError::BadMeta {
                signal_number: Some(self.number),
                reason,
            },
            other => other,
        })?;

        self.table_id = descriptor.table_id;
        self.interpretation = descriptor.interpretation;
        self.related_signals = descriptor.related_signals;
        self.data_type = Some(descriptor.definition.data_type);
        self.rule = Some(descriptor.definition.rule);
        self.linear_delta = descriptor.definition.linear_delta;
        self.unit = descriptor.definition.unit;
        self.range = descriptor.definition.range;
        self.post_scaling = descriptor.definition.post_scaling;
        Ok(())
    }

    pub fn reset_linear_value_index(&mut self) {
        self.linear_value_index = 0;
    }

    pub fn advance_linear_value_index(&mut self, n: u64) {
        self.linear_value_index += n;
    }

    pub fn set_time(&mut self, ticks: u64) {
        self.time = ticks;
    }

    /// Byte size of one sample, or `None` before a descriptor has
    /// arrived.
    pub fn sample_byte_size(&self) -> Option<usize> {
        self.data_type.as_ref().map(SampleType::byte_size)
    }

    /// Converts raw sample bytes to lossy doubles using this signal's
    /// data type and rule; empty for unset or non-scalar types.
    pub fn interpret_as_doubles(&self, buf: &[u8]) -> Vec<f64> {
        let (Some(data_type), Some(rule)) = (self.data_type.as_ref(), self.rule) else {
            return Vec::new();
        };
        data_type.interpret_as_doubles(buf, rule)
    }
}
