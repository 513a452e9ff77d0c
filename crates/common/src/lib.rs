//! Klaatu Common Library
//!
//! Shared types for the telemetry ping collector and the experiment-event
//! correlator: the opaque [`Ping`] document, configuration, and errors.

pub mod config;
pub mod error;
pub mod ping;

pub use config::{CorrelatorConfig, PingServerConfig};
pub use error::{Error, Result};
pub use ping::{Ping, SessionInfo};

/// Klaatu version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default loopback address the ping server listens on
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:5000";

/// Default base URL clients use to reach the ping server
pub fn default_base_url() -> String {
    format!("http://{}", DEFAULT_LISTEN_ADDR)
}
