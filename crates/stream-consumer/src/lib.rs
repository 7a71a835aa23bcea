//! Consumer-side signal state (C8), the signal container (C9), and the
//! protocol handler read loop (C10).

pub mod container;
pub mod handler;
pub mod subscribed_signal;

pub use container::{DataOutcome, SignalContainer, SignalMetaOutcome};
pub use handler::{ConsumerEvent, ControlInterfaceInfo, ProtocolHandler};
pub use subscribed_signal::SubscribedSignal;
