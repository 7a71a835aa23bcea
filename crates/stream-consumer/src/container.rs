//! Signal container (C9): the consumer-side registry of subscribed
//! signals, the table index binding each data signal to its time
//! signal, and the (intentionally undispatched) status-source map.

use std::collections::{HashMap, HashSet};

use bytes::Bytes;
use serde_json::Value;
use stream_protocol::{Rule, StreamError, StreamResult};

use crate::subscribed_signal::SubscribedSignal;

#[derive(Debug, Default, Clone)]
struct Table {
    time_signal_number: Option<u32>,
    data_signal_numbers: HashSet<u32>,
}

impl Table {
    fn is_empty(&self) -> bool {
        self.time_signal_number.is_none() && self.data_signal_numbers.is_empty()
    }
}

/// What a processed signal-meta frame did, for the protocol handler to
/// turn into a user-facing event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalMetaOutcome {
    Subscribed,
    Unsubscribed,
    Updated,
}

/// What a processed signal-data frame produced.
#[derive(Debug, Clone)]
pub enum DataOutcome {
    /// The frame belonged to a time signal; its table's anchor moved.
    TimeUpdated { table_id: String },
    /// The frame belonged to a data signal and decoded to a value.
    Measured { timestamp: u64, raw: Bytes },
    /// An explicit-rule data frame whose size didn't match the
    /// signal's sample size; per spec this is logged and dropped
    /// without mutating any state.
    Discarded,
}

/// The registry of every currently-subscribed signal (spec §4.9).
#[derive(Debug, Default)]
pub struct SignalContainer {
    subscribed_signals: HashMap<u32, SubscribedSignal>,
    tables: HashMap<String, Table>,
    status_sources: HashMap<u32, String>,
}

impl SignalContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, signal_number: u32) -> Option<&SubscribedSignal> {
        self.subscribed_signals.get(&signal_number)
    }

    pub fn len(&self) -> usize {
        self.subscribed_signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribed_signals.is_empty()
    }

    /// Processes a signal-scoped (`signal_number > 0`) meta frame:
    /// `subscribe` creates the entry, `unsubscribe` tears it down,
    /// anything else (`signal`) must target an existing entry.
    pub fn process_meta(&mut self, signal_number: u32, method: &str, params: &Value) -> StreamResult<SignalMetaOutcome> {
        match method {
            "subscribe" => {
                if self.subscribed_signals.contains_key(&signal_number) {
                    return Err(StreamError::BadMeta {
                        signal_number: Some(signal_number),
                        reason: "duplicate subscribe for an already-subscribed signal number".to_owned(),
                    });
                }
                let mut signal = SubscribedSignal::new(signal_number);
                signal.process_subscribe(params)?;
                self.subscribed_signals.insert(signal_number, signal);
                Ok(SignalMetaOutcome::Subscribed)
            }
            "unsubscribe" => {
                if !self.subscribed_signals.contains_key(&signal_number) {
                    return Err(StreamError::UnknownSignal { signal_number });
                }
                self.unlink_from_table(signal_number);
                self.subscribed_signals.remove(&signal_number);
                self.status_sources.remove(&signal_number);
                Ok(SignalMetaOutcome::Unsubscribed)
            }
            "signal" => {
                let params_obj = params.as_object().ok_or_else(|| StreamError::BadMeta {
                    signal_number: Some(signal_number),
                    reason: "signal meta params must be an object".to_owned(),
                })?;
                let signal = self
                    .subscribed_signals
                    .get_mut(&signal_number)
                    .ok_or(StreamError::UnknownSignal { signal_number })?;
                signal.process_signal(params_obj)?;

                let table_id = signal.table_id.clone();
                let is_time = signal.is_time_signal();
                let status_target = signal.related_signals.get("status").cloned();

                self.link_into_table(signal_number, &table_id, is_time);
                if let Some(status_id) = status_target {
                    self.status_sources.insert(signal_number, status_id);
                }
                Ok(SignalMetaOutcome::Updated)
            }
            other => Err(StreamError::BadMeta {
                signal_number: Some(signal_number),
                reason: format!("unknown signal meta method {other}"),
            }),
        }
    }

    /// Processes a signal-scoped data frame, dispatching on whether
    /// `signal_number` names a time signal or a data signal.
    pub fn process_data(&mut self, signal_number: u32, payload: Bytes) -> StreamResult<DataOutcome> {
        let is_time = self
            .subscribed_signals
            .get(&signal_number)
            .ok_or(StreamError::UnknownSignal { signal_number })?
            .is_time_signal();

        if is_time {
            self.process_time_data(signal_number, payload)
        } else {
            self.process_measured_data(signal_number, payload)
        }
    }

    fn process_time_data(&mut self, signal_number: u32, payload: Bytes) -> StreamResult<DataOutcome> {
        let rule = self
            .subscribed_signals
            .get(&signal_number)
            .ok_or(StreamError::UnknownSignal { signal_number })?
            .rule;
        let new_time = match rule {
            Some(Rule::Explicit) => {
                if payload.len() != 8 {
                    return Err(StreamError::BadMeta {
                        signal_number: Some(signal_number),
                        reason: "explicit time frame must be exactly 8 bytes".to_owned(),
                    });
                }
                u64::from_le_bytes(payload[0..8].try_into().unwrap())
            }
            Some(Rule::Linear) => {
                if payload.len() != 16 {
                    return Err(StreamError::BadMeta {
                        signal_number: Some(signal_number),
                        reason: "linear time start frame must be exactly 16 bytes".to_owned(),
                    });
                }
                u64::from_le_bytes(payload[8..16].try_into().unwrap())
            }
            _ => {
                return Err(StreamError::UnsupportedRule {
                    signal_number,
                    rule: format!("{rule:?}"),
                })
            }
        };

        let table_id = {
            let signal = self.subscribed_signals.get_mut(&signal_number).unwrap();
            signal.set_time(new_time);
            signal.table_id.clone()
        };

        if let Some(table) = self.tables.get(&table_id) {
            let data_numbers: Vec<u32> = table.data_signal_numbers.iter().copied().collect();
            for number in data_numbers {
                if let Some(data_signal) = self.subscribed_signals.get_mut(&number) {
                    data_signal.reset_linear_value_index();
                }
            }
        }

        Ok(DataOutcome::TimeUpdated { table_id })
    }

    fn process_measured_data(&mut self, signal_number: u32, payload: Bytes) -> StreamResult<DataOutcome> {
        let table_id = self
            .subscribed_signals
            .get(&signal_number)
            .ok_or(StreamError::UnknownSignal { signal_number })?
            .table_id
            .clone();
        let table = self.tables.get(&table_id).ok_or(StreamError::UnboundTime { signal_number })?;
        let time_number = table.time_signal_number.ok_or(StreamError::UnboundTime { signal_number })?;

        let time_signal = self.subscribed_signals.get(&time_number).ok_or(StreamError::UnboundTime { signal_number })?;
        let time_rule = time_signal.rule;
        let time_delta = time_signal.linear_delta;
        let time_value = time_signal.time;

        let data_signal = self.subscribed_signals.get_mut(&signal_number).unwrap();
        let data_rule = data_signal.rule.ok_or_else(|| StreamError::BadMeta {
            signal_number: Some(signal_number),
            reason: "data frame received before a signal descriptor".to_owned(),
        })?;
        let sample_size = data_signal.sample_byte_size().ok_or_else(|| StreamError::BadMeta {
            signal_number: Some(signal_number),
            reason: "data frame received before a signal descriptor".to_owned(),
        })?;

        match (time_rule, data_rule) {
            (Some(Rule::Linear), Rule::Explicit) => {
                if sample_size == 0 || payload.len() % sample_size != 0 {
                    return Err(StreamError::BadMeta {
                        signal_number: Some(signal_number),
                        reason: "data frame length is not a multiple of the sample size".to_owned(),
                    });
                }
                let delta = time_delta.ok_or_else(|| StreamError::BadMeta {
                    signal_number: Some(signal_number),
                    reason: "bound linear time signal has no delta".to_owned(),
                })?;
                let sample_count = (payload.len() / sample_size) as u64;
                let timestamp = time_value + data_signal.linear_value_index * delta;
                data_signal.advance_linear_value_index(sample_count);
                Ok(DataOutcome::Measured { timestamp, raw: payload })
            }
            (Some(Rule::Linear), Rule::Constant) => Ok(DataOutcome::Measured { timestamp: time_value, raw: payload }),
            (Some(Rule::Explicit), Rule::Explicit) => {
                if payload.len() != sample_size {
                    tracing::warn!(
                        signal_number,
                        payload_len = payload.len(),
                        sample_size,
                        "explicit data frame size mismatch, discarding"
                    );
                    return Ok(DataOutcome::Discarded);
                }
                Ok(DataOutcome::Measured { timestamp: time_value, raw: payload })
            }
            _ => Err(StreamError::UnsupportedRule {
                signal_number,
                rule: format!("time={time_rule:?} data={data_rule:?}"),
            }),
        }
    }

    fn link_into_table(&mut self, signal_number: u32, table_id: &str, is_time: bool) {
        let table = self.tables.entry(table_id.to_owned()).or_default();
        if is_time {
            table.time_signal_number = Some(signal_number);
        } else {
            table.data_signal_numbers.insert(signal_number);
        }
    }

    fn unlink_from_table(&mut self, signal_number: u32) {
        let Some(signal) = self.subscribed_signals.get(&signal_number) else {
            return;
        };
        let table_id = signal.table_id.clone();
        let Some(table) = self.tables.get_mut(&table_id) else {
            return;
        };
        if table.time_signal_number == Some(signal_number) {
            table.time_signal_number = None;
        }
        table.data_signal_numbers.remove(&signal_number);
        if table.is_empty() {
            self.tables.remove(&table_id);
        }
    }
}
