//! The signal descriptor model shared by producer-side emission (C4/C5)
//! and consumer-side parsing (C8): unit, range, post-scaling,
//! resolution, rule, related signals, and the full `signal` meta
//! `definition` document.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::constants::{NO_UNIT_ID, SECONDS_UNIT_ID};
use crate::error::StreamError;
use crate::sample_type::SampleType;

/// A relation tag (`"time"`, `"status"`, ...) to a related signal's id.
pub type RelatedSignals = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq)]
pub struct Unit {
    pub id: i32,
    pub display_name: String,
    pub quantity: String,
}

impl Unit {
    pub fn none() -> Self {
        Self {
            id: NO_UNIT_ID,
            display_name: String::new(),
            quantity: String::new(),
        }
    }

    pub fn seconds() -> Self {
        Self {
            id: SECONDS_UNIT_ID,
            display_name: "s".to_owned(),
            quantity: "time".to_owned(),
        }
    }

    pub fn is_time(&self) -> bool {
        self.quantity == "time"
    }

    pub fn compose(&self, definition: &mut Map<String, Value>) {
        definition.insert(
            "unit".to_owned(),
            serde_json::json!({
                "id": self.id,
                "displayName": self.display_name,
                "quantity": self.quantity,
            }),
        );
    }

    pub fn parse(definition: &Map<String, Value>) -> Self {
        let Some(unit) = definition.get("unit").and_then(Value::as_object) else {
            return Self::none();
        };
        Self {
            id: unit
                .get("id")
                .and_then(Value::as_i64)
                .map(|v| v as i32)
                .unwrap_or(NO_UNIT_ID),
            display_name: unit
                .get("displayName")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned(),
            quantity: unit
                .get("quantity")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Range {
    pub low: f64,
    pub high: f64,
}

impl Range {
    pub fn unlimited() -> Self {
        Self {
            low: f64::NEG_INFINITY,
            high: f64::INFINITY,
        }
    }

    pub fn is_unlimited(&self) -> bool {
        self.low == f64::NEG_INFINITY && self.high == f64::INFINITY
    }

    pub fn compose(&self, definition: &mut Map<String, Value>) {
        if !self.is_unlimited() {
            definition.insert(
                "range".to_owned(),
                serde_json::json!({ "low": self.low, "high": self.high }),
            );
        }
    }

    pub fn parse(definition: &Map<String, Value>) -> Self {
        let Some(range) = definition.get("range").and_then(Value::as_object) else {
            return Self::unlimited();
        };
        Self {
            low: range.get("low").and_then(Value::as_f64).unwrap_or(f64::NEG_INFINITY),
            high: range.get("high").and_then(Value::as_f64).unwrap_or(f64::INFINITY),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PostScaling {
    pub offset: f64,
    pub scale: f64,
}

impl PostScaling {
    pub fn identity() -> Self {
        Self { offset: 0.0, scale: 1.0 }
    }

    pub fn is_identity(&self) -> bool {
        self.offset == 0.0 && self.scale == 1.0
    }

    pub fn compose(&self, definition: &mut Map<String, Value>) {
        if !self.is_identity() {
            definition.insert(
                "postScaling".to_owned(),
                serde_json::json!({ "scale": self.scale, "postOffset": self.offset }),
            );
        }
    }

    pub fn parse(definition: &Map<String, Value>) -> Self {
        let Some(ps) = definition.get("postScaling").and_then(Value::as_object) else {
            return Self::identity();
        };
        Self {
            scale: ps.get("scale").and_then(Value::as_f64).unwrap_or(1.0),
            offset: ps.get("postOffset").and_then(Value::as_f64).unwrap_or(0.0),
        }
    }
}

/// Seconds-per-tick, expressed as `numerator / denominator`. For time
/// signals `denominator` is the ticks-per-second.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub numerator: u64,
    pub denominator: u64,
}

impl Resolution {
    pub fn ticks_per_second(ticks_per_second: u64) -> Self {
        Self {
            numerator: 1,
            denominator: ticks_per_second,
        }
    }

    fn compose(&self, definition: &mut Map<String, Value>) {
        definition.insert(
            "resolution".to_owned(),
            serde_json::json!({ "num": self.numerator, "denom": self.denominator }),
        );
    }

    /// Parses an optional `resolution` sub-object; fails if present
    /// but partially or wholly zero.
    fn parse(definition: &Map<String, Value>) -> Result<Option<Self>, StreamError> {
        let Some(res) = definition.get("resolution").and_then(Value::as_object) else {
            return Ok(None);
        };
        let numerator = res.get("num").and_then(Value::as_u64).unwrap_or(0);
        let denominator = res.get("denom").and_then(Value::as_u64).unwrap_or(0);
        if numerator == 0 || denominator == 0 {
            return Err(StreamError::BadMeta {
                signal_number: None,
                reason: "resolution numerator and denominator must both be nonzero".to_owned(),
            });
        }
        Ok(Some(Self { numerator, denominator }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    Explicit,
    Linear,
    Constant,
}

impl Rule {
    pub fn wire_name(self) -> &'static str {
        match self {
            Self::Explicit => "explicit",
            Self::Linear => "linear",
            Self::Constant => "constant",
        }
    }

    pub fn parse(name: &str) -> Result<Self, StreamError> {
        match name {
            "explicit" => Ok(Self::Explicit),
            "linear" => Ok(Self::Linear),
            "constant" => Ok(Self::Constant),
            other => Err(StreamError::BadMeta {
                signal_number: None,
                reason: format!("unknown rule {other}"),
            }),
        }
    }
}

pub fn compose_related_signals(related: &RelatedSignals, params: &mut Map<String, Value>) {
    if related.is_empty() {
        return;
    }
    let entries: Vec<Value> = related
        .iter()
        .map(|(relation, signal_id)| {
            serde_json::json!({ "type": relation, "signalId": signal_id })
        })
        .collect();
    params.insert("relatedSignals".to_owned(), Value::Array(entries));
}

/// Parses `relatedSignals` from a `signal` meta's `params`. Malformed
/// entries are skipped rather than failing the whole descriptor —
/// the registry this feeds (spec §4.9 `statusSources`) has no defined
/// consumer-side dispatch, so strict parsing would only reject
/// otherwise-usable descriptors over an unused field.
pub fn parse_related_signals(params: &Map<String, Value>) -> RelatedSignals {
    let mut out = RelatedSignals::new();
    let Some(entries) = params.get("relatedSignals").and_then(Value::as_array) else {
        return out;
    };
    for entry in entries {
        let (Some(relation), Some(signal_id)) = (
            entry.get("type").and_then(Value::as_str),
            entry.get("signalId").and_then(Value::as_str),
        ) else {
            continue;
        };
        out.insert(relation.to_owned(), signal_id.to_owned());
    }
    out
}

/// The `definition` sub-document of a `signal` meta frame.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalDefinition {
    pub name: String,
    pub data_type: SampleType,
    pub rule: Rule,
    pub linear_delta: Option<u64>,
    pub unit: Unit,
    pub resolution: Option<Resolution>,
    pub absolute_reference: Option<String>,
    pub range: Range,
    pub post_scaling: PostScaling,
}

impl SignalDefinition {
    pub fn compose(&self) -> Map<String, Value> {
        let mut def = Map::new();
        def.insert("name".to_owned(), Value::String(self.name.clone()));
        self.data_type.compose(&mut def);
        def.insert(
            "rule".to_owned(),
            Value::String(self.rule.wire_name().to_owned()),
        );
        if let (Rule::Linear, Some(delta)) = (self.rule, self.linear_delta) {
            def.insert("linear".to_owned(), serde_json::json!({ "delta": delta }));
        }
        self.unit.compose(&mut def);
        if let Some(resolution) = &self.resolution {
            resolution.compose(&mut def);
        }
        if let Some(epoch) = &self.absolute_reference {
            def.insert("absoluteReference".to_owned(), Value::String(epoch.clone()));
        }
        self.range.compose(&mut def);
        self.post_scaling.compose(&mut def);
        def
    }

    /// Parses a `definition` object. `existing_delta` is the
    /// previously known linear delta for this signal (if any) — used
    /// to satisfy "a linear rule without a nonzero delta, either
    /// previously set or now set, fails" (spec §4.8).
    pub fn parse(
        definition: &Map<String, Value>,
        existing_delta: Option<u64>,
    ) -> Result<Self, StreamError> {
        let name = definition
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("value")
            .to_owned();
        let data_type = SampleType::parse(definition)?;
        let rule_name = definition.get("rule").and_then(Value::as_str).ok_or_else(|| {
            StreamError::BadMeta {
                signal_number: None,
                reason: "definition missing rule".to_owned(),
            }
        })?;
        let rule = Rule::parse(rule_name)?;

        let message_delta = definition
            .get("linear")
            .and_then(Value::as_object)
            .and_then(|linear| linear.get("delta"))
            .and_then(Value::as_u64);
        let linear_delta = if rule == Rule::Linear {
            let delta = message_delta.or(existing_delta);
            match delta {
                Some(0) | None => {
                    return Err(StreamError::BadMeta {
                        signal_number: None,
                        reason: "linear rule requires a nonzero delta".to_owned(),
                    });
                }
                Some(d) => Some(d),
            }
        } else {
            message_delta
        };

        let unit = Unit::parse(definition);
        let resolution = Resolution::parse(definition)?;
        let absolute_reference = definition
            .get("absoluteReference")
            .and_then(Value::as_str)
            .map(str::to_owned);
        let range = Range::parse(definition);
        let post_scaling = PostScaling::parse(definition);

        if unit.is_time() {
            if unit.id != SECONDS_UNIT_ID {
                return Err(StreamError::BadMeta {
                    signal_number: None,
                    reason: "time signal unit id must be secondsId".to_owned(),
                });
            }
            match &resolution {
                Some(r) if r.numerator > 0 && r.denominator > 0 => {}
                _ => {
                    return Err(StreamError::BadMeta {
                        signal_number: None,
                        reason: "time signal requires a positive resolution".to_owned(),
                    });
                }
            }
        }

        Ok(Self {
            name,
            data_type,
            rule,
            linear_delta,
            unit,
            resolution,
            absolute_reference,
            range,
            post_scaling,
        })
    }
}

/// The full `params` of a `signal` meta frame.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalDescriptor {
    pub table_id: String,
    pub value_index: Option<u64>,
    pub interpretation: Option<Value>,
    pub related_signals: RelatedSignals,
    pub definition: SignalDefinition,
}

impl SignalDescriptor {
    pub fn compose_params(&self) -> Value {
        let mut params = Map::new();
        params.insert("tableId".to_owned(), Value::String(self.table_id.clone()));
        if let Some(index) = self.value_index {
            params.insert("valueIndex".to_owned(), Value::from(index));
        }
        if let Some(interpretation) = &self.interpretation {
            params.insert("interpretation".to_owned(), interpretation.clone());
        }
        compose_related_signals(&self.related_signals, &mut params);
        params.insert(
            "definition".to_owned(),
            Value::Object(self.definition.compose()),
        );
        Value::Object(params)
    }

    pub fn parse_params(
        params: &Map<String, Value>,
        existing_delta: Option<u64>,
    ) -> Result<Self, StreamError> {
        let table_id = params
            .get("tableId")
            .and_then(Value::as_str)
            .ok_or_else(|| StreamError::BadMeta {
                signal_number: None,
                reason: "signal meta missing tableId".to_owned(),
            })?
            .to_owned();
        let value_index = params.get("valueIndex").and_then(Value::as_u64);
        let interpretation = params.get("interpretation").cloned();
        let related_signals = parse_related_signals(params);
        let definition_obj = params
            .get("definition")
            .and_then(Value::as_object)
            .ok_or_else(|| StreamError::BadMeta {
                signal_number: None,
                reason: "signal meta missing definition".to_owned(),
            })?;
        let definition = SignalDefinition::parse(definition_obj, existing_delta)?;

        Ok(Self {
            table_id,
            value_index,
            interpretation,
            related_signals,
            definition,
        })
    }
}
