//! Control-server configuration: bind address and per-phase HTTP
//! timeout, loaded the same two-tier way as `forwarder.toml` (spec
//! §7.2).

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ControlServerConfig {
    pub bind_addr: SocketAddr,
    pub request_timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct RawControlServerConfig {
    bind_addr: Option<String>,
    request_timeout_secs: Option<u64>,
}

#[derive(Debug)]
pub enum ConfigError {
    Io(String),
    Parse(String),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(s) => write!(f, "IO error: {s}"),
            ConfigError::Parse(s) => write!(f, "Parse error: {s}"),
            ConfigError::InvalidValue(s) => write!(f, "Invalid config value: {s}"),
        }
    }
}

impl std::error::Error for ConfigError {}

pub fn load_config_from_path(path: &Path) -> Result<ControlServerConfig, ConfigError> {
    let toml_str = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Io(format!("reading config file '{}': {}", path.display(), e)))?;
    load_config_from_str(&toml_str)
}

pub fn load_config() -> Result<ControlServerConfig, ConfigError> {
    load_config_from_path(Path::new("/etc/streaming-telemetry/stream-control.toml"))
}

pub fn load_config_from_str(toml_str: &str) -> Result<ControlServerConfig, ConfigError> {
    let raw: RawControlServerConfig = toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))?;

    let bind_addr = raw
        .bind_addr
        .unwrap_or_else(|| "0.0.0.0:9091".to_owned())
        .parse()
        .map_err(|e| ConfigError::InvalidValue(format!("bind_addr: {e}")))?;
    let request_timeout = Duration::from_secs(raw.request_timeout_secs.unwrap_or(30));

    Ok(ControlServerConfig {
        bind_addr,
        request_timeout,
    })
}
