//! Connection configuration.
//!
//! [`NetfluxConfig`] is the serde-facing form, typically loaded from TOML.
//! Every field has a default, so an empty document is a valid configuration:
//!
//! ```toml
//! local_port = 2000
//! remote_address = "192.168.0.10"
//! remote_port = 2000
//! send_interval_us = 5000
//! watchdog_interval_ms = 30
//! keep_values_on_timeout = false
//! payload_size = 20
//! ```
//!
//! [`NetfluxConfig::validate`] turns it into [`Settings`], the typed form
//! consumed by engines and nodes. A configuration that fails validation never
//! reaches a transport.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::{
    ConfigError, DEFAULT_LOCAL_PORT, DEFAULT_PAYLOAD_SIZE, DEFAULT_REMOTE_ADDRESS,
    DEFAULT_REMOTE_PORT, DEFAULT_RETRY_INTERVAL, DEFAULT_SEND_INTERVAL, DEFAULT_STATS_WINDOW,
    DEFAULT_WATCHDOG_INTERVAL, MAX_PAYLOAD_SIZE,
};
use crate::link::{Session, Watchdog};
use crate::transport::FrameCodec;

/// Connection configuration as read from a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NetfluxConfig {
    /// Local UDP port (0 picks an ephemeral port).
    #[serde(default = "default_local_port")]
    pub local_port: u16,

    /// Partner IPv4 address.
    #[serde(default = "default_remote_address")]
    pub remote_address: String,

    /// Partner UDP port.
    #[serde(default = "default_remote_port")]
    pub remote_port: u16,

    /// Minimum time between sends, in microseconds.
    #[serde(default = "default_send_interval_us")]
    pub send_interval_us: u64,

    /// Silence tolerated before the link is declared down, in milliseconds.
    #[serde(default = "default_watchdog_interval_ms")]
    pub watchdog_interval_ms: u64,

    /// Keep the last received payload when the link goes down.
    #[serde(default)]
    pub keep_values_on_timeout: bool,

    /// Agreed payload size in bytes.
    #[serde(default = "default_payload_size")]
    pub payload_size: usize,

    /// Upper bound for `payload_size`.
    #[serde(default = "default_max_payload_size")]
    pub max_payload_size: usize,

    /// Delay between recovery attempts after a transport fault, in milliseconds.
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,

    /// Number of intervals averaged by the statistics engine.
    #[serde(default = "default_stats_window")]
    pub stats_window: usize,
}

fn default_local_port() -> u16 {
    DEFAULT_LOCAL_PORT
}

fn default_remote_address() -> String {
    DEFAULT_REMOTE_ADDRESS.to_string()
}

fn default_remote_port() -> u16 {
    DEFAULT_REMOTE_PORT
}

fn default_send_interval_us() -> u64 {
    DEFAULT_SEND_INTERVAL.as_micros() as u64
}

fn default_watchdog_interval_ms() -> u64 {
    DEFAULT_WATCHDOG_INTERVAL.as_millis() as u64
}

fn default_payload_size() -> usize {
    DEFAULT_PAYLOAD_SIZE
}

fn default_max_payload_size() -> usize {
    MAX_PAYLOAD_SIZE
}

fn default_retry_interval_ms() -> u64 {
    DEFAULT_RETRY_INTERVAL.as_millis() as u64
}

fn default_stats_window() -> usize {
    DEFAULT_STATS_WINDOW
}

impl Default for NetfluxConfig {
    fn default() -> Self {
        Self {
            local_port: default_local_port(),
            remote_address: default_remote_address(),
            remote_port: default_remote_port(),
            send_interval_us: default_send_interval_us(),
            watchdog_interval_ms: default_watchdog_interval_ms(),
            keep_values_on_timeout: false,
            payload_size: default_payload_size(),
            max_payload_size: default_max_payload_size(),
            retry_interval_ms: default_retry_interval_ms(),
            stats_window: default_stats_window(),
        }
    }
}

impl NetfluxConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Read and parse a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Render as TOML.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Check every field and produce typed settings.
    pub fn validate(&self) -> Result<Settings, ConfigError> {
        // The local socket is IPv4 only
        let ip: Ipv4Addr = self
            .remote_address
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidAddress(self.remote_address.clone()))?;
        if self.remote_port == 0 {
            return Err(ConfigError::InvalidPort("remote_port"));
        }
        if self.max_payload_size > MAX_PAYLOAD_SIZE {
            return Err(ConfigError::PayloadTooLarge {
                size: self.max_payload_size,
                max: MAX_PAYLOAD_SIZE,
            });
        }
        let codec = FrameCodec::new(self.payload_size, self.max_payload_size).map_err(|_| {
            ConfigError::PayloadTooLarge {
                size: self.payload_size,
                max: self.max_payload_size,
            }
        })?;
        let send_interval = non_zero(
            Duration::from_micros(self.send_interval_us),
            "send_interval_us",
        )?;
        let watchdog_interval = non_zero(
            Duration::from_millis(self.watchdog_interval_ms),
            "watchdog_interval_ms",
        )?;
        let retry_interval = non_zero(
            Duration::from_millis(self.retry_interval_ms),
            "retry_interval_ms",
        )?;
        if self.stats_window < 2 {
            return Err(ConfigError::InvalidWindow(self.stats_window));
        }

        Ok(Settings {
            local_port: self.local_port,
            remote: SocketAddr::from((ip, self.remote_port)),
            send_interval,
            watchdog_interval,
            keep_values_on_timeout: self.keep_values_on_timeout,
            codec,
            retry_interval,
            stats_window: self.stats_window,
        })
    }
}

fn non_zero(interval: Duration, field: &'static str) -> Result<Duration, ConfigError> {
    if interval.is_zero() {
        return Err(ConfigError::InvalidInterval(field));
    }
    Ok(interval)
}

/// Validated connection settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    /// Local UDP port.
    pub local_port: u16,
    /// Partner endpoint.
    pub remote: SocketAddr,
    /// Minimum time between sends.
    pub send_interval: Duration,
    /// Watchdog interval.
    pub watchdog_interval: Duration,
    /// Keep the last payload when the link goes down.
    pub keep_values_on_timeout: bool,
    /// Frame codec for the agreed payload size.
    pub codec: FrameCodec,
    /// Delay between recovery attempts.
    pub retry_interval: Duration,
    /// Statistics window.
    pub stats_window: usize,
}

impl Settings {
    /// Create a fresh session for these settings.
    pub fn session(&self) -> Session {
        Session::new(
            self.codec,
            Watchdog::new(self.watchdog_interval, self.keep_values_on_timeout),
            self.stats_window,
        )
    }

    /// Agreed payload size.
    pub fn payload_size(&self) -> usize {
        self.codec.payload_size()
    }
}

impl TryFrom<&NetfluxConfig> for Settings {
    type Error = ConfigError;

    fn try_from(config: &NetfluxConfig) -> Result<Self, Self::Error> {
        config.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StatusCode;

    #[test]
    fn test_defaults() {
        let settings = NetfluxConfig::default().validate().unwrap();
        assert_eq!(settings.local_port, 2000);
        assert_eq!(settings.remote, "127.0.0.1:2000".parse().unwrap());
        assert_eq!(settings.send_interval, Duration::from_millis(5));
        assert_eq!(settings.watchdog_interval, Duration::from_millis(30));
        assert!(!settings.keep_values_on_timeout);
        assert_eq!(settings.payload_size(), 20);
        assert_eq!(settings.codec.max_payload_size(), 1461);
        assert_eq!(settings.retry_interval, Duration::from_secs(1));
    }

    #[test]
    fn test_empty_document_is_default() {
        let config = NetfluxConfig::from_toml_str("").unwrap();
        assert_eq!(config, NetfluxConfig::default());
    }

    #[test]
    fn test_parse_toml() {
        let config = NetfluxConfig::from_toml_str(
            r#"
            local_port = 2100
            remote_address = "10.0.0.7"
            remote_port = 2200
            send_interval_us = 1000
            watchdog_interval_ms = 50
            keep_values_on_timeout = true
            payload_size = 64
            "#,
        )
        .unwrap();

        let settings = config.validate().unwrap();
        assert_eq!(settings.local_port, 2100);
        assert_eq!(settings.remote, "10.0.0.7:2200".parse().unwrap());
        assert_eq!(settings.send_interval, Duration::from_millis(1));
        assert!(settings.keep_values_on_timeout);
        assert_eq!(settings.codec.frame_size(), 66);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = NetfluxConfig::from_toml_str("remote_host = \"x\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_toml_round_trip() {
        let config = NetfluxConfig {
            keep_values_on_timeout: true,
            payload_size: 8,
            ..Default::default()
        };
        let text = config.to_toml_string().unwrap();
        assert_eq!(NetfluxConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_invalid_address() {
        let config = NetfluxConfig {
            remote_address: "plc.local".into(),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidAddress(_)));
        assert_eq!(err.status(), StatusCode::InvalidAddress);
    }

    #[test]
    fn test_ipv6_remote_rejected() {
        for address in ["::1", "fe80::1", "::ffff:127.0.0.1"] {
            let config = NetfluxConfig {
                remote_address: address.into(),
                ..Default::default()
            };
            let err = config.validate().unwrap_err();
            assert!(matches!(err, ConfigError::InvalidAddress(ref a) if a == address));
        }

        let config = NetfluxConfig {
            remote_address: " 10.0.0.7 ".into(),
            ..Default::default()
        };
        assert_eq!(
            config.validate().unwrap().remote,
            "10.0.0.7:2000".parse().unwrap()
        );
    }

    #[test]
    fn test_remote_port_required() {
        let config = NetfluxConfig {
            remote_port: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidPort("remote_port"))
        ));
    }

    #[test]
    fn test_payload_limits() {
        let config = NetfluxConfig {
            payload_size: 1462,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert_eq!(err.status(), StatusCode::PayloadTooLarge);

        let config = NetfluxConfig {
            max_payload_size: 2000,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::PayloadTooLarge { size: 2000, max: 1461 })
        ));

        let config = NetfluxConfig {
            payload_size: 1461,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_intervals_rejected() {
        let config = NetfluxConfig {
            send_interval_us: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidInterval("send_interval_us"))
        ));

        let config = NetfluxConfig {
            watchdog_interval_ms: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidInterval("watchdog_interval_ms")));
        assert_eq!(err.status(), StatusCode::InvalidConfig);
        assert!(err.status().is_error());
    }

    #[test]
    fn test_stats_window() {
        let config = NetfluxConfig {
            stats_window: 1,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidWindow(1))));
    }
}
