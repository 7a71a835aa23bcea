//! Control channel (C11): JSON-RPC 2.0 client and server for the
//! out-of-band subscribe/unsubscribe side channel, plus its
//! configuration (A3).

pub mod client;
pub mod config;
pub mod rpc;
pub mod server;

pub use client::{ControlClient, ControlClientConfig, ControlClientError};
pub use config::{load_config, load_config_from_path, load_config_from_str, ConfigError, ControlServerConfig};
pub use rpc::{RpcError, RpcRequest, RpcResponse};
pub use server::{router, ControlServerState};
