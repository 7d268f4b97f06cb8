//! Pool and endpoint configuration.
//!
//! Callers supply partial [`PoolOptions`] and [`EndpointOptions`]; every
//! unset field falls back to a default. [`PoolConfig::merge`] and
//! [`EndpointConfig::merge`] are pure functions producing a fresh resolved
//! configuration per client.
//!
//! # Defaults
//!
//! | Option | Default |
//! |--------|---------|
//! | `max` | 1 |
//! | `min` | 0 |
//! | `idleTimeoutMillis` | 30000 |
//! | `acquireTimeoutMillis` | 10000 |
//! | `testOnBorrow` | true |
//! | `testOnReturn` | true |
//! | `transport` | framed |
//! | `protocol` | binary |
//! | `connect_timeout` | 1000 |
//! | `timeout` | none |
//! | `max_attempts` | 3 |
//!
//! # Example
//!
//! ```ignore
//! use pooled_rpc::{EndpointOptions, PoolOptions};
//!
//! let pool = PoolOptions::new().with_max(4).with_acquire_timeout_millis(2_000);
//! let endpoint = EndpointOptions::new("127.0.0.1", 9090).with_timeout(500);
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::protocol::{Codec, ProtocolKind, TransportKind};

// ============================================================================
// Constants
// ============================================================================

/// Default maximum pool size.
pub const DEFAULT_MAX: usize = 1;

/// Default minimum pool size.
pub const DEFAULT_MIN: usize = 0;

/// Default idle eviction threshold.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_millis(30_000);

/// Default bound on waiting for a pooled connection.
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Default bound on a single connect attempt.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(1_000);

/// Default number of connect attempts.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Message for a missing or empty endpoint address.
const MISSING_ADDRESS: &str = "both host and port must be specified";

// ============================================================================
// PoolOptions
// ============================================================================

/// Caller-supplied pool options.
///
/// Keys use the camelCase names accepted by the JSON form
/// (`idleTimeoutMillis`, `acquireTimeoutMillis`, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PoolOptions {
    /// Maximum number of connections.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<usize>,

    /// Minimum number of connections kept open.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<usize>,

    /// Idle time after which a pooled connection is evicted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idle_timeout_millis: Option<u64>,

    /// Maximum time to wait for a connection on acquire.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acquire_timeout_millis: Option<u64>,

    /// Validate connections before handing them out.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_on_borrow: Option<bool>,

    /// Validate connections when they are returned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_on_return: Option<bool>,
}

impl PoolOptions {
    /// Creates empty options (all defaults).
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum pool size.
    #[inline]
    #[must_use]
    pub fn with_max(mut self, max: usize) -> Self {
        self.max = Some(max);
        self
    }

    /// Sets the minimum pool size.
    #[inline]
    #[must_use]
    pub fn with_min(mut self, min: usize) -> Self {
        self.min = Some(min);
        self
    }

    /// Sets the idle eviction threshold in milliseconds.
    #[inline]
    #[must_use]
    pub fn with_idle_timeout_millis(mut self, millis: u64) -> Self {
        self.idle_timeout_millis = Some(millis);
        self
    }

    /// Sets the acquire timeout in milliseconds.
    #[inline]
    #[must_use]
    pub fn with_acquire_timeout_millis(mut self, millis: u64) -> Self {
        self.acquire_timeout_millis = Some(millis);
        self
    }

    /// Enables or disables validation on borrow.
    #[inline]
    #[must_use]
    pub fn with_test_on_borrow(mut self, enabled: bool) -> Self {
        self.test_on_borrow = Some(enabled);
        self
    }

    /// Enables or disables validation on return.
    #[inline]
    #[must_use]
    pub fn with_test_on_return(mut self, enabled: bool) -> Self {
        self.test_on_return = Some(enabled);
        self
    }
}

// ============================================================================
// EndpointOptions
// ============================================================================

/// Caller-supplied endpoint options.
///
/// `host` and `port` are required; everything else has a default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointOptions {
    /// Hostname or IP address of the service.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// Port of the service.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Message delimiting on the stream.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transport: Option<TransportKind>,

    /// Message encoding.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<ProtocolKind>,

    /// Milliseconds allowed per connect attempt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connect_timeout: Option<u64>,

    /// Milliseconds allowed for each outstanding call, if set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,

    /// Number of connect attempts before giving up.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
}

impl EndpointOptions {
    /// Creates options for `host:port`.
    #[inline]
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: Some(host.into()),
            port: Some(port),
            ..Self::default()
        }
    }

    /// Sets the host.
    #[inline]
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Sets the port.
    #[inline]
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Sets the transport kind.
    #[inline]
    #[must_use]
    pub fn with_transport(mut self, transport: TransportKind) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Sets the protocol kind.
    #[inline]
    #[must_use]
    pub fn with_protocol(mut self, protocol: ProtocolKind) -> Self {
        self.protocol = Some(protocol);
        self
    }

    /// Sets the per-attempt connect timeout in milliseconds.
    #[inline]
    #[must_use]
    pub fn with_connect_timeout(mut self, millis: u64) -> Self {
        self.connect_timeout = Some(millis);
        self
    }

    /// Sets the per-call timeout in milliseconds.
    #[inline]
    #[must_use]
    pub fn with_timeout(mut self, millis: u64) -> Self {
        self.timeout = Some(millis);
        self
    }

    /// Sets the number of connect attempts.
    #[inline]
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }
}

// ============================================================================
// PoolConfig
// ============================================================================

/// Resolved pool configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Maximum number of connections.
    pub max: usize,
    /// Minimum number of connections kept open.
    pub min: usize,
    /// Idle time after which a pooled connection is evicted.
    pub idle_timeout: Duration,
    /// Maximum time to wait for a connection on acquire.
    pub acquire_timeout: Duration,
    /// Validate connections before handing them out.
    pub test_on_borrow: bool,
    /// Validate connections when they are returned.
    pub test_on_return: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max: DEFAULT_MAX,
            min: DEFAULT_MIN,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
            test_on_borrow: true,
            test_on_return: true,
        }
    }
}

impl PoolConfig {
    /// Merges caller options over the defaults.
    ///
    /// `min` is clamped to `max`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `max` is zero.
    pub fn merge(options: &PoolOptions) -> Result<Self> {
        let defaults = Self::default();

        let max = options.max.unwrap_or(defaults.max);
        if max == 0 {
            return Err(Error::config("pool max must be at least 1"));
        }

        Ok(Self {
            max,
            min: options.min.unwrap_or(defaults.min).min(max),
            idle_timeout: options
                .idle_timeout_millis
                .map_or(defaults.idle_timeout, Duration::from_millis),
            acquire_timeout: options
                .acquire_timeout_millis
                .map_or(defaults.acquire_timeout, Duration::from_millis),
            test_on_borrow: options.test_on_borrow.unwrap_or(defaults.test_on_borrow),
            test_on_return: options.test_on_return.unwrap_or(defaults.test_on_return),
        })
    }
}

// ============================================================================
// EndpointConfig
// ============================================================================

/// Resolved endpoint configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    /// Hostname or IP address.
    pub host: String,
    /// Port.
    pub port: u16,
    /// Message delimiting on the stream.
    pub transport: TransportKind,
    /// Message encoding.
    pub protocol: ProtocolKind,
    /// Bound on a single connect attempt.
    pub connect_timeout: Duration,
    /// Bound on each outstanding call, if any.
    pub timeout: Option<Duration>,
    /// Number of connect attempts.
    pub max_attempts: u32,
}

impl EndpointConfig {
    /// Merges caller options over the defaults.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if `host` is missing or empty, or `port` is missing or zero
    /// - [`Error::Config`] if `max_attempts` is zero
    pub fn merge(options: &EndpointOptions) -> Result<Self> {
        let host = options.host.as_deref().filter(|host| !host.is_empty());
        let port = options.port.filter(|&port| port != 0);

        let (Some(host), Some(port)) = (host, port) else {
            return Err(Error::config(MISSING_ADDRESS));
        };

        let max_attempts = options.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS);
        if max_attempts == 0 {
            return Err(Error::config("max_attempts must be at least 1"));
        }

        Ok(Self {
            host: host.to_string(),
            port,
            transport: options.transport.unwrap_or_default(),
            protocol: options.protocol.unwrap_or_default(),
            connect_timeout: options
                .connect_timeout
                .map_or(DEFAULT_CONNECT_TIMEOUT, Duration::from_millis),
            timeout: options.timeout.map(Duration::from_millis),
            max_attempts,
        })
    }

    /// Returns the `host:port` address.
    #[inline]
    #[must_use]
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Returns the codec for this endpoint.
    #[inline]
    #[must_use]
    pub const fn codec(&self) -> Codec {
        Codec::new(self.transport, self.protocol)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_defaults() {
        let config = PoolConfig::merge(&PoolOptions::new()).expect("defaults");
        assert_eq!(config, PoolConfig::default());
        assert_eq!(config.max, 1);
        assert_eq!(config.min, 0);
        assert_eq!(config.idle_timeout, Duration::from_secs(30));
        assert_eq!(config.acquire_timeout, Duration::from_secs(10));
        assert!(config.test_on_borrow);
        assert!(config.test_on_return);
    }

    #[test]
    fn test_pool_options_override_defaults() {
        let options = PoolOptions::new()
            .with_max(8)
            .with_min(2)
            .with_acquire_timeout_millis(250)
            .with_test_on_return(false);

        let config = PoolConfig::merge(&options).expect("merge");
        assert_eq!(config.max, 8);
        assert_eq!(config.min, 2);
        assert_eq!(config.acquire_timeout, Duration::from_millis(250));
        assert_eq!(config.idle_timeout, DEFAULT_IDLE_TIMEOUT);
        assert!(config.test_on_borrow);
        assert!(!config.test_on_return);
    }

    #[test]
    fn test_pool_min_is_clamped_to_max() {
        let config = PoolConfig::merge(&PoolOptions::new().with_max(2).with_min(5)).expect("merge");
        assert_eq!(config.min, 2);
    }

    #[test]
    fn test_pool_zero_max_is_rejected() {
        let err = PoolConfig::merge(&PoolOptions::new().with_max(0)).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_merge_does_not_touch_options() {
        let options = PoolOptions::new().with_max(3);
        let _ = PoolConfig::merge(&options).expect("merge");
        let _ = PoolConfig::merge(&PoolOptions::new()).expect("merge");
        assert_eq!(options, PoolOptions::new().with_max(3));
    }

    #[test]
    fn test_pool_options_from_json() {
        let options: PoolOptions =
            serde_json::from_str(r#"{"max": 4, "idleTimeoutMillis": 500, "testOnBorrow": false}"#)
                .expect("parse");
        assert_eq!(options.max, Some(4));
        assert_eq!(options.idle_timeout_millis, Some(500));
        assert_eq!(options.test_on_borrow, Some(false));
        assert_eq!(options.min, None);
    }

    #[test]
    fn test_endpoint_defaults() {
        let config = EndpointConfig::merge(&EndpointOptions::new("127.0.0.1", 9090)).expect("merge");
        assert_eq!(config.addr(), "127.0.0.1:9090");
        assert_eq!(config.transport, TransportKind::Framed);
        assert_eq!(config.protocol, ProtocolKind::Binary);
        assert_eq!(config.connect_timeout, Duration::from_millis(1000));
        assert_eq!(config.timeout, None);
        assert_eq!(config.max_attempts, 3);
    }

    #[test]
    fn test_endpoint_overrides() {
        let options = EndpointOptions::new("localhost", 7911)
            .with_transport(TransportKind::Buffered)
            .with_protocol(ProtocolKind::Json)
            .with_connect_timeout(50)
            .with_timeout(200)
            .with_max_attempts(1);

        let config = EndpointConfig::merge(&options).expect("merge");
        assert_eq!(config.codec(), Codec::new(TransportKind::Buffered, ProtocolKind::Json));
        assert_eq!(config.connect_timeout, Duration::from_millis(50));
        assert_eq!(config.timeout, Some(Duration::from_millis(200)));
        assert_eq!(config.max_attempts, 1);
    }

    #[test]
    fn test_endpoint_requires_host_and_port() {
        let cases = [
            EndpointOptions::default(),
            EndpointOptions::default().with_host("127.0.0.1"),
            EndpointOptions::default().with_port(9090),
            EndpointOptions::new("", 9090),
            EndpointOptions::new("127.0.0.1", 0),
        ];

        for options in cases {
            let err = EndpointConfig::merge(&options).unwrap_err();
            let message = err.to_string();
            assert!(message.contains("host"), "{message}");
            assert!(message.contains("port"), "{message}");
        }
    }

    #[test]
    fn test_endpoint_zero_attempts_is_rejected() {
        let options = EndpointOptions::new("127.0.0.1", 9090).with_max_attempts(0);
        assert!(EndpointConfig::merge(&options).is_err());
    }

    #[test]
    fn test_endpoint_options_from_json() {
        let options: EndpointOptions = serde_json::from_str(
            r#"{"host": "10.0.0.1", "port": 9090, "transport": "buffered", "protocol": "json", "connect_timeout": 250}"#,
        )
        .expect("parse");

        let config = EndpointConfig::merge(&options).expect("merge");
        assert_eq!(config.transport, TransportKind::Buffered);
        assert_eq!(config.protocol, ProtocolKind::Json);
        assert_eq!(config.connect_timeout, Duration::from_millis(250));
    }
}
