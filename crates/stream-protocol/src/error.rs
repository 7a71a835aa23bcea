//! Error taxonomy shared by the frame codec, meta envelope, signal
//! container and protocol handler (spec §7).

use std::io;

/// Everything that can end a producer or consumer session.
///
/// Variants carry just enough context to log usefully; none of them
/// retain a backtrace.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("malformed frame header: {reason}")]
    MalformedHeader { reason: &'static str },

    #[error("protocol violation: {reason}")]
    Protocol { reason: &'static str },

    #[error("bad meta information for signal {signal_number:?}: {reason}")]
    BadMeta {
        signal_number: Option<u32>,
        reason: String,
    },

    #[error("frame for unknown signal number {signal_number}")]
    UnknownSignal { signal_number: u32 },

    #[error("data frame for signal {signal_number} whose table has no time signal")]
    UnboundTime { signal_number: u32 },

    #[error("unsupported rule for domain signal {signal_number}: {rule}")]
    UnsupportedRule { signal_number: u32, rule: String },

    #[error("producer api version {version} is below the supported floor 0.6.0")]
    UnsupportedVersion { version: String },

    #[error("transport error: {0}")]
    TransportError(#[from] io::Error),

    #[error("control channel request failed: {0}")]
    ControlRequestFailed(String),
}

pub type StreamResult<T> = Result<T, StreamError>;
