//! Connection settings and polling configuration.
//!
//! The daemon is configured entirely from environment variables:
//!
//! - `WHATSMINER_HOST`: device address (required)
//! - `WHATSMINER_PORT`: management port (default: 4028)
//! - `WHATSMINER_PASSWORD`: admin password (default: `admin`)
//! - `WHATSMINER_POLL_INTERVAL_SECS`: refresh interval (default: 5)
//! - `WHATSMINER_CALL_TIMEOUT_SECS`: per-call timeout (default: 10)
//! - `WHATSMINER_MAC`: device MAC recorded at setup (optional; read from
//!   the device when unset)

use std::fmt;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 4028;
pub const DEFAULT_PASSWORD: &str = "admin";
pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Where the device lives and how to authenticate to it.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    pub host: String,
    pub port: u16,
    pub password: String,
}

impl ConnectionDescriptor {
    pub fn new(host: impl Into<String>, port: u16, password: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            password: password.into(),
        }
    }
}

impl fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionDescriptor")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl fmt::Display for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorConfig {
    pub update_interval: Duration,
    /// Upper bound for each device call within a cycle.
    pub call_timeout: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            update_interval: DEFAULT_UPDATE_INTERVAL,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }
}

/// Everything the daemon needs to monitor one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    pub descriptor: ConnectionDescriptor,
    pub coordinator: CoordinatorConfig,
    /// MAC recorded at setup. Used to name controls.
    pub device_mac: Option<String>,
}

impl MonitorConfig {
    /// Read configuration from the process environment.
    ///
    /// Returns `None` if `WHATSMINER_HOST` is unset or empty. Malformed
    /// numbers fall back to their defaults.
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let host = lookup("WHATSMINER_HOST").filter(|h| !h.trim().is_empty())?;

        let port = lookup("WHATSMINER_PORT")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_PORT);
        let password =
            lookup("WHATSMINER_PASSWORD").unwrap_or_else(|| DEFAULT_PASSWORD.to_string());

        let seconds = |key: &str, default: Duration| {
            lookup(key)
                .and_then(|s| s.parse::<u64>().ok())
                .filter(|&secs| secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(default)
        };

        Some(Self {
            descriptor: ConnectionDescriptor::new(host.trim(), port, password),
            coordinator: CoordinatorConfig {
                update_interval: seconds("WHATSMINER_POLL_INTERVAL_SECS", DEFAULT_UPDATE_INTERVAL),
                call_timeout: seconds("WHATSMINER_CALL_TIMEOUT_SECS", DEFAULT_CALL_TIMEOUT),
            },
            device_mac: lookup("WHATSMINER_MAC")
                .map(|mac| mac.trim().to_string())
                .filter(|mac| !mac.is_empty()),
        })
    }
}
