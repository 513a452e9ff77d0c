//! Configuration for the ping server and the correlator

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::error::{Error, Result};

/// Environment variable overriding [`PingServerConfig::listen`]
pub const ENV_PING_LISTEN: &str = "KLAATU_PING_LISTEN";

/// Environment variable overriding [`PingServerConfig::max_body_bytes`]
pub const ENV_PING_MAX_BODY_BYTES: &str = "KLAATU_PING_MAX_BODY_BYTES";

/// Ping server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PingServerConfig {
    /// Listen address
    pub listen: String,

    /// Largest request body accepted by the submit routes
    pub max_body_bytes: usize,

    /// Decompress `Content-Encoding: gzip` submissions
    pub accept_gzip: bool,

    /// Attach a permissive CORS layer
    pub cors: bool,
}

impl Default for PingServerConfig {
    fn default() -> Self {
        Self {
            listen: crate::DEFAULT_LISTEN_ADDR.to_string(),
            max_body_bytes: 16 * 1024 * 1024,
            accept_gzip: true,
            cors: true,
        }
    }
}

impl PingServerConfig {
    /// Load configuration from a TOML file, falling back to defaults if it is absent
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            Ok(config)
        } else {
            debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply `KLAATU_PING_*` environment overrides
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(listen) = lookup(ENV_PING_LISTEN).filter(|v| !v.trim().is_empty()) {
            self.listen = listen.trim().to_string();
        }

        if let Some(raw) = lookup(ENV_PING_MAX_BODY_BYTES) {
            self.max_body_bytes = raw.trim().parse().map_err(|_| {
                Error::InvalidConfig(format!("{} must be a byte count, got {:?}", ENV_PING_MAX_BODY_BYTES, raw))
            })?;
        }

        Ok(self)
    }

    /// Parse and validate the listen address
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.listen.parse().map_err(|source| Error::InvalidAddr {
            addr: self.listen.clone(),
            source,
        })
    }
}

/// Correlator configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrelatorConfig {
    /// Base URL of the ping server
    pub base_url: String,

    /// Pause between unsuccessful poll attempts
    pub poll_interval_secs: u64,

    /// Total time budget for one correlation
    pub deadline_secs: u64,

    /// Per-request timeout for store calls
    pub request_timeout_secs: u64,
}

impl Default for CorrelatorConfig {
    fn default() -> Self {
        Self {
            base_url: crate::default_base_url(),
            poll_interval_secs: 5,
            deadline_secs: 5 * 60,
            request_timeout_secs: 10,
        }
    }
}

impl CorrelatorConfig {
    /// Load configuration from a TOML file, falling back to defaults if it is absent
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_secs == 0 {
            return Err(Error::InvalidConfig("poll_interval_secs must be positive".to_string()));
        }
        if self.request_timeout_secs == 0 {
            return Err(Error::InvalidConfig("request_timeout_secs must be positive".to_string()));
        }
        if self.base_url.trim().is_empty() {
            return Err(Error::InvalidConfig("base_url must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_server_defaults() {
        let config = PingServerConfig::default();
        assert_eq!(config.listen, "127.0.0.1:5000");
        assert_eq!(config.max_body_bytes, 16 * 1024 * 1024);
        assert!(config.listen_addr().unwrap().ip().is_loopback());
    }

    #[test]
    fn test_server_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = PingServerConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, PingServerConfig::default());
    }

    #[test]
    fn test_server_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("server.toml");

        let config = PingServerConfig {
            listen: "127.0.0.1:5151".to_string(),
            accept_gzip: false,
            ..Default::default()
        };
        config.save(&path).unwrap();

        let loaded = PingServerConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_server_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.toml");
        std::fs::write(&path, "max_body_bytes = 1024\n").unwrap();

        let loaded = PingServerConfig::load(&path).unwrap();
        assert_eq!(loaded.max_body_bytes, 1024);
        assert_eq!(loaded.listen, "127.0.0.1:5000");
    }

    #[test]
    fn test_server_env_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_PING_LISTEN, "127.0.0.1:6000"),
            (ENV_PING_MAX_BODY_BYTES, "2048"),
        ]
        .into_iter()
        .collect();

        let config = PingServerConfig::default()
            .with_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.listen, "127.0.0.1:6000");
        assert_eq!(config.max_body_bytes, 2048);
    }

    #[test]
    fn test_server_env_override_rejects_garbage() {
        let result = PingServerConfig::default().with_overrides(|key| {
            (key == ENV_PING_MAX_BODY_BYTES).then(|| "lots".to_string())
        });
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_invalid_listen_addr() {
        let config = PingServerConfig {
            listen: "localhost-ish".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.listen_addr(), Err(Error::InvalidAddr { .. })));
    }

    #[test]
    fn test_correlator_defaults() {
        let config = CorrelatorConfig::default();
        assert_eq!(config.base_url, "http://127.0.0.1:5000");
        assert_eq!(config.poll_interval(), Duration::from_secs(5));
        assert_eq!(config.deadline(), Duration::from_secs(300));
    }

    #[test]
    fn test_correlator_rejects_zero_interval() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("correlator.toml");
        std::fs::write(&path, "poll_interval_secs = 0\n").unwrap();

        assert!(matches!(
            CorrelatorConfig::load(&path),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_correlator_rejects_zero_request_timeout() {
        let config = CorrelatorConfig {
            request_timeout_secs: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
        assert!(CorrelatorConfig::default().validate().is_ok());
    }
}
