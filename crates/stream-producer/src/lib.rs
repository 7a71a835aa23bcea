//! Producer-side signal model (C4/C5), the stream writer (C6), and the
//! producer session state machine (C7).

pub mod session;
pub mod signal;
pub mod wire_scalar;
pub mod writer;

pub use session::{ProducerSession, SessionState};
pub use signal::{DomainSignal, ProducerSignal, ValueSignal};
pub use wire_scalar::WireScalar;
pub use writer::StreamWriter;
