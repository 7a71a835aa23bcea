//! The `SampleType` tag (spec §3) and its wire (de)serialisation.

use serde_json::{Map, Value};

use crate::descriptor::Rule;
use crate::error::StreamError;

/// A structural description of one scalar member inside a `STRUCT`
/// sample type.
#[derive(Debug, Clone, PartialEq)]
pub struct StructMember {
    pub name: String,
    pub data_type: SampleType,
}

/// The on-wire data type of a signal's samples.
///
/// `Array` and `Struct` are the only variants that nest further
/// `SampleType`s; both are restricted to scalar (non-nested, non-array)
/// element/member types, matching the source's model.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleType {
    U8,
    S8,
    U16,
    S16,
    U32,
    S32,
    U64,
    S64,
    Real32,
    Real64,
    Complex32,
    Complex64,
    Bitfield32,
    Bitfield64,
    Array { element: Box<SampleType>, count: usize },
    Struct { members: Vec<StructMember> },
}

impl SampleType {
    /// Byte size of one sample on the wire.
    pub fn byte_size(&self) -> usize {
        match self {
            Self::U8 | Self::S8 => 1,
            Self::U16 | Self::S16 => 2,
            Self::U32 | Self::S32 | Self::Real32 | Self::Bitfield32 => 4,
            Self::U64 | Self::S64 | Self::Real64 | Self::Bitfield64 | Self::Complex32 => 8,
            Self::Complex64 => 16,
            Self::Array { element, count } => element.byte_size() * count,
            Self::Struct { members } => members.iter().map(|m| m.data_type.byte_size()).sum(),
        }
    }

    fn primitive_wire_name(&self) -> Option<&'static str> {
        Some(match self {
            Self::U8 => "uint8",
            Self::S8 => "int8",
            Self::U16 => "uint16",
            Self::S16 => "int16",
            Self::U32 => "uint32",
            Self::S32 => "int32",
            Self::U64 => "uint64",
            Self::S64 => "int64",
            Self::Real32 => "real32",
            Self::Real64 => "real64",
            Self::Complex32 => "complex32",
            Self::Complex64 => "complex64",
            Self::Bitfield32 | Self::Bitfield64 => "bitField",
            Self::Array { .. } | Self::Struct { .. } => return None,
        })
    }

    fn primitive_from_wire_name(name: &str) -> Option<Self> {
        Some(match name {
            "uint8" => Self::U8,
            "int8" => Self::S8,
            "uint16" => Self::U16,
            "int16" => Self::S16,
            "uint32" => Self::U32,
            "int32" => Self::S32,
            "uint64" => Self::U64,
            "int64" => Self::S64,
            "real32" => Self::Real32,
            "real64" => Self::Real64,
            "complex32" => Self::Complex32,
            "complex64" => Self::Complex64,
            _ => return None,
        })
    }

    /// Serialises this sample type into a descriptor's `definition`
    /// object, writing `dataType` and any nested `bitField`/`array`/
    /// `struct` sub-document.
    pub fn compose(&self, definition: &mut Map<String, Value>) {
        match self {
            Self::Bitfield32 => {
                definition.insert("dataType".to_owned(), Value::String("bitField".to_owned()));
                definition.insert(
                    "bitField".to_owned(),
                    serde_json::json!({ "dataType": "uint32" }),
                );
            }
            Self::Bitfield64 => {
                definition.insert("dataType".to_owned(), Value::String("bitField".to_owned()));
                definition.insert(
                    "bitField".to_owned(),
                    serde_json::json!({ "dataType": "uint64" }),
                );
            }
            Self::Array { element, count } => {
                definition.insert("dataType".to_owned(), Value::String("array".to_owned()));
                definition.insert(
                    "array".to_owned(),
                    serde_json::json!({
                        "count": count,
                        "dataType": element.primitive_wire_name(),
                    }),
                );
            }
            Self::Struct { members } => {
                definition.insert("dataType".to_owned(), Value::String("struct".to_owned()));
                let members_json: Vec<Value> = members
                    .iter()
                    .map(|m| {
                        serde_json::json!({
                            "name": m.name,
                            "dataType": m.data_type.primitive_wire_name(),
                        })
                    })
                    .collect();
                definition.insert("struct".to_owned(), Value::Array(members_json));
            }
            other => {
                let name = other.primitive_wire_name().expect("primitive has a wire name");
                definition.insert("dataType".to_owned(), Value::String(name.to_owned()));
            }
        }
    }

    /// Parses a sample type out of a descriptor's `definition` object.
    /// `dynamicArray` is explicitly rejected (spec §4.8); unknown data
    /// types and bitfields over an unsupported underlying type also
    /// fail.
    pub fn parse(definition: &Map<String, Value>) -> Result<Self, StreamError> {
        let data_type = definition
            .get("dataType")
            .and_then(Value::as_str)
            .ok_or_else(|| StreamError::BadMeta {
                signal_number: None,
                reason: "definition missing dataType".to_owned(),
            })?;

        match data_type {
            "dynamicArray" => Err(StreamError::BadMeta {
                signal_number: None,
                reason: "dynamicArray is not a supported data type".to_owned(),
            }),
            "bitField" => {
                let underlying = definition
                    .get("bitField")
                    .and_then(Value::as_object)
                    .and_then(|o| o.get("dataType"))
                    .and_then(Value::as_str)
                    .ok_or_else(|| StreamError::BadMeta {
                        signal_number: None,
                        reason: "bitField missing underlying dataType".to_owned(),
                    })?;
                match underlying {
                    "uint32" => Ok(Self::Bitfield32),
                    "uint64" => Ok(Self::Bitfield64),
                    other => Err(StreamError::BadMeta {
                        signal_number: None,
                        reason: format!("bitField underlying type must be uint32 or uint64, got {other}"),
                    }),
                }
            }
            "array" => {
                let array = definition
                    .get("array")
                    .and_then(Value::as_object)
                    .ok_or_else(|| StreamError::BadMeta {
                        signal_number: None,
                        reason: "array missing count/dataType".to_owned(),
                    })?;
                let count = array
                    .get("count")
                    .and_then(Value::as_u64)
                    .ok_or_else(|| StreamError::BadMeta {
                        signal_number: None,
                        reason: "array missing count".to_owned(),
                    })? as usize;
                let element_name =
                    array.get("dataType").and_then(Value::as_str).ok_or_else(|| {
                        StreamError::BadMeta {
                            signal_number: None,
                            reason: "array missing element dataType".to_owned(),
                        }
                    })?;
                let element = Self::primitive_from_wire_name(element_name).ok_or_else(|| {
                    StreamError::BadMeta {
                        signal_number: None,
                        reason: format!("unsupported array element type {element_name}"),
                    }
                })?;
                Ok(Self::Array {
                    element: Box::new(element),
                    count,
                })
            }
            "struct" => {
                let members_json = definition
                    .get("struct")
                    .and_then(Value::as_array)
                    .ok_or_else(|| StreamError::BadMeta {
                        signal_number: None,
                        reason: "struct missing member list".to_owned(),
                    })?;
                let mut members = Vec::with_capacity(members_json.len());
                for member in members_json {
                    let name = member
                        .get("name")
                        .and_then(Value::as_str)
                        .ok_or_else(|| StreamError::BadMeta {
                            signal_number: None,
                            reason: "struct member missing name".to_owned(),
                        })?
                        .to_owned();
                    let data_type_name = member
                        .get("dataType")
                        .and_then(Value::as_str)
                        .ok_or_else(|| StreamError::BadMeta {
                            signal_number: None,
                            reason: "struct member missing dataType".to_owned(),
                        })?;
                    let data_type = Self::primitive_from_wire_name(data_type_name).ok_or_else(|| {
                        StreamError::BadMeta {
                            signal_number: None,
                            reason: format!("unsupported struct member type {data_type_name}"),
                        }
                    })?;
                    members.push(StructMember { name, data_type });
                }
                Ok(Self::Struct { members })
            }
            other => Self::primitive_from_wire_name(other).ok_or_else(|| StreamError::BadMeta {
                signal_number: None,
                reason: format!("unsupported data type {other}"),
            }),
        }
    }

    /// Converts raw sample bytes of this type into lossy `f64`s.
    /// Unsupported types (array, struct) return an empty vector, per
    /// spec §4.8 ("other sample types return 0 values converted").
    ///
    /// `rule` selects the wire layout: `Constant` data is `count`
    /// repetitions of `[u64 index][T value]`, so each value is read
    /// after skipping the leading 8-byte index; `Explicit`/`Linear`
    /// data is just `count` contiguous `T`s.
    pub fn interpret_as_doubles(&self, buf: &[u8], rule: Rule) -> Vec<f64> {
        macro_rules! read_as {
            ($ty:ty, $size:expr) => {
                Self::value_chunks(buf, $size, rule)
                    .map(|c| <$ty>::from_le_bytes(c.try_into().unwrap()) as f64)
                    .collect()
            };
        }
        match self {
            Self::U8 => read_as!(u8, 1),
            Self::S8 => read_as!(i8, 1),
            Self::U16 => read_as!(u16, 2),
            Self::S16 => read_as!(i16, 2),
            Self::U32 | Self::Bitfield32 => read_as!(u32, 4),
            Self::S32 => read_as!(i32, 4),
            // Matches the source's intentionally lossy U64/BITFIELD64 -> i64 cast.
            Self::U64 | Self::Bitfield64 => Self::value_chunks(buf, 8, rule)
                .map(|c| u64::from_le_bytes(c.try_into().unwrap()) as i64 as f64)
                .collect(),
            Self::S64 => read_as!(i64, 8),
            Self::Real32 => read_as!(f32, 4),
            Self::Real64 => read_as!(f64, 8),
            Self::Complex32 | Self::Complex64 | Self::Array { .. } | Self::Struct { .. } => Vec::new(),
        }
    }

    /// Slices `buf` into `elem_size`-byte value chunks, skipping the
    /// leading 8-byte index of each pair when `rule` is `Constant`.
    fn value_chunks(buf: &[u8], elem_size: usize, rule: Rule) -> Box<dyn Iterator<Item = &[u8]> + '_> {
        match rule {
            Rule::Constant => Box::new(buf.chunks_exact(8 + elem_size).map(move |c| &c[8..8 + elem_size])),
            Rule::Explicit | Rule::Linear => Box::new(buf.chunks_exact(elem_size)),
        }
    }
}
