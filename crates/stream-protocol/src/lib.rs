//! Wire-level types shared by the producer and consumer sides of the
//! streaming-telemetry protocol: frame header codec (C1), meta
//! envelope codec (C2), the signal-number allocator (C3), and the
//! signal descriptor model (C4/C5/C8 share it).
//!
//! Nothing in this crate touches an actual transport; it operates on
//! byte buffers and `serde_json::Value` documents only.

pub mod allocator;
pub mod constants;
pub mod descriptor;
pub mod error;
pub mod frame;
pub mod meta;
pub mod sample_type;

pub use allocator::SignalNumberAllocator;
pub use descriptor::{
    compose_related_signals, parse_related_signals, PostScaling, Range, RelatedSignals,
    Resolution, Rule, SignalDefinition, SignalDescriptor, Unit,
};
pub use error::{StreamError, StreamResult};
pub use frame::{encode_header, Frame, FrameCodec, TransportType};
pub use meta::{decode_meta_envelope, encode_meta_envelope, MetaMessage};
pub use sample_type::{SampleType, StructMember};
