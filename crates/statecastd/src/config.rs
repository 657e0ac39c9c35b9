//! Relay configuration.
//!
//! Values are layered, lowest precedence first:
//! 1. [`RelayConfig::default`]
//! 2. an optional TOML file ([`RelayConfig::load`])
//! 3. environment variables ([`RelayConfig::apply_env`])
//! 4. command-line flags (applied by the binary through the builder methods)

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// Default address for both listeners.
pub const DEFAULT_ADDR: &str = "127.0.0.1:8080";

/// Largest possible UDP payload.
pub const DEFAULT_RECV_BUFFER_SIZE: usize = 65_535;

/// Default bound on a single broadcast write to one connection.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default process monitor period.
pub const DEFAULT_STATS_INTERVAL: Duration = Duration::from_secs(60);

/// Sets both the UDP and TCP address.
pub const ENV_ADDR: &str = "STATECAST_ADDR";
pub const ENV_UDP_ADDR: &str = "STATECAST_UDP_ADDR";
pub const ENV_TCP_ADDR: &str = "STATECAST_TCP_ADDR";
pub const ENV_MAX_CONNECTIONS: &str = "STATECAST_MAX_CONNECTIONS";

/// Relay server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RelayConfig {
    /// Address the datagram socket binds to
    pub udp_addr: SocketAddr,

    /// Address the stream listener binds to
    pub tcp_addr: SocketAddr,

    /// Maximum registered connections (0 = unlimited)
    pub max_connections: usize,

    /// Per-connection broadcast write timeout in milliseconds
    pub write_timeout_ms: u64,

    /// Datagram receive buffer size in bytes
    pub recv_buffer_size: usize,

    /// Process monitor period in seconds (0 = disabled)
    pub stats_interval_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        let addr = SocketAddr::from(([127, 0, 0, 1], 8080));
        Self {
            udp_addr: addr,
            tcp_addr: addr,
            max_connections: 0,
            write_timeout_ms: DEFAULT_WRITE_TIMEOUT.as_millis() as u64,
            recv_buffer_size: DEFAULT_RECV_BUFFER_SIZE,
            stats_interval_secs: DEFAULT_STATS_INTERVAL.as_secs(),
        }
    }
}

impl RelayConfig {
    /// Loads configuration from a TOML file. Missing keys keep their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::InvalidToml(error) => ConfigError::Parse {
                path: path.to_path_buf(),
                error,
            },
            other => other,
        })
    }

    /// Parses configuration from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::InvalidToml(e.to_string()))
    }

    /// Applies `STATECAST_*` overrides from the process environment.
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Applies overrides from an arbitrary variable lookup.
    pub fn apply_env_from<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_ADDR) {
            let addr = parse_addr(ENV_ADDR, &value)?;
            self.udp_addr = addr;
            self.tcp_addr = addr;
        }
        if let Some(value) = lookup(ENV_UDP_ADDR) {
            self.udp_addr = parse_addr(ENV_UDP_ADDR, &value)?;
        }
        if let Some(value) = lookup(ENV_TCP_ADDR) {
            self.tcp_addr = parse_addr(ENV_TCP_ADDR, &value)?;
        }
        if let Some(value) = lookup(ENV_MAX_CONNECTIONS) {
            self.max_connections =
                value
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue {
                        key: ENV_MAX_CONNECTIONS.to_string(),
                        value,
                    })?;
        }
        Ok(self)
    }

    /// Sets both listen addresses.
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.udp_addr = addr;
        self.tcp_addr = addr;
        self
    }

    /// Sets the datagram listen address.
    pub fn udp_addr(mut self, addr: SocketAddr) -> Self {
        self.udp_addr = addr;
        self
    }

    /// Sets the stream listen address.
    pub fn tcp_addr(mut self, addr: SocketAddr) -> Self {
        self.tcp_addr = addr;
        self
    }

    /// Sets the admission cap (0 = unlimited).
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Sets the per-connection write timeout.
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Sets the process monitor period (zero disables it).
    pub fn stats_interval(mut self, interval: Duration) -> Self {
        self.stats_interval_secs = interval.as_secs();
        self
    }

    /// Per-connection write timeout as a `Duration`.
    ///
    /// A zero value would evict every connection on every write, so it is
    /// treated as the default instead.
    pub fn write_timeout_duration(&self) -> Duration {
        if self.write_timeout_ms == 0 {
            DEFAULT_WRITE_TIMEOUT
        } else {
            Duration::from_millis(self.write_timeout_ms)
        }
    }

    /// Process monitor period, or `None` when disabled.
    pub fn stats_interval_duration(&self) -> Option<Duration> {
        (self.stats_interval_secs > 0).then(|| Duration::from_secs(self.stats_interval_secs))
    }

    /// Receive buffer size, never smaller than one byte.
    pub fn recv_buffer_len(&self) -> usize {
        self.recv_buffer_size.max(1)
    }
}

fn parse_addr(key: &str, value: &str) -> Result<SocketAddr, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        })
}

/// Errors that can occur while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {error}")]
    Read { path: PathBuf, error: String },

    #[error("Failed to parse config file {path}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Invalid config: {0}")]
    InvalidToml(String),

    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },
}
