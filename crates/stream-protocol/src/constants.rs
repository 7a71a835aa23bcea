//! Reserved wire constants (spec §6).

/// Default epoch used when a domain signal's `absoluteReference` is unset.
pub const UNIX_EPOCH: &str = "1970-01-01";

/// User-assigned unit id meaning "seconds"; time signals must use it.
pub const SECONDS_UNIT_ID: i32 = 5_457_219;

/// Unit id meaning "no unit".
pub const NO_UNIT_ID: i32 = -1;

/// Meta-type discriminator for a MessagePack-encoded meta body; the only
/// one this protocol accepts.
pub const METAINFORMATION_MSGPACK: u32 = 2;

/// Method names used in stream-scoped (signal number 0) meta frames.
pub mod stream_method {
    pub const API_VERSION: &str = "apiVersion";
    pub const INIT: &str = "init";
    pub const AVAILABLE: &str = "available";
    pub const UNAVAILABLE: &str = "unavailable";
    pub const ALIVE: &str = "alive";
}

/// Method names used in signal-scoped (signal number > 0) meta frames.
pub mod signal_method {
    pub const SUBSCRIBE: &str = "subscribe";
    pub const UNSUBSCRIBE: &str = "unsubscribe";
    pub const SIGNAL: &str = "signal";
}

/// Parses an `apiVersion` string of the form `MAJOR.MINOR.PATCH` and
/// checks it against the supported floor.
///
/// The source implementation used `MAJOR < 1 && MINOR < 6` to decide
/// rejection, which is a bug (it accepts e.g. `0.3.0`). This is the
/// corrected floor check: a version is supported iff `MAJOR >= 1 ||
/// MINOR >= 6`.
pub fn is_supported_api_version(version: &str) -> bool {
    let parts: Vec<&str> = version.split('.').collect();
    if parts.len() != 3 {
        return false;
    }
    let Ok(major) = parts[0].parse::<u32>() else {
        return false;
    };
    let Ok(minor) = parts[1].parse::<u32>() else {
        return false;
    };
    major >= 1 || minor >= 6
}
