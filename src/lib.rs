//! Facade crate tying together the streaming-telemetry protocol's
//! focused crates. Exists so the top-level `tests/integration` suite
//! has one package to live under, the same role this workspace's root
//! package has always played next to its component crates.

pub use stream_consumer as consumer;
pub use stream_control as control;
pub use stream_producer as producer;
pub use stream_protocol as protocol;
