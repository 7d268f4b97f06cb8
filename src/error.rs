//! Error types for the pooled RPC client.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use pooled_rpc::{Error, Result};
//!
//! async fn example(client: &Client) -> Result<()> {
//!     match client.call("add", json!([1, 2])).await {
//!         Ok(sum) => println!("sum = {sum}"),
//!         Err(Error::AcquisitionTimeout { message }) => eprintln!("pool busy: {message}"),
//!         Err(e) if e.is_connection_fault() => eprintln!("connection dropped: {e}"),
//!         Err(e) => return Err(e),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Acquisition | [`Error::AcquisitionTimeout`] |
//! | Connection fault | [`Error::ConnectionTimeout`], [`Error::ConnectionClosed`], [`Error::Transport`] |
//! | Connection | [`Error::Connection`] |
//! | Protocol | [`Error::Protocol`], [`Error::UnknownMethod`] |
//! | Remote | [`Error::Application`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::ChannelClosed`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::{Error as IoError, ErrorKind};
use std::result::Result as StdResult;

use thiserror::Error;
use tokio::sync::oneshot::error::RecvError;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned synchronously when client configuration is invalid,
    /// before any I/O is attempted.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Acquisition Errors
    // ========================================================================
    /// The pool could not supply a connection in time.
    ///
    /// Wraps whatever the pool rejected the borrow with.
    #[error("Pool connection acquisition timeout: {message}")]
    AcquisitionTimeout {
        /// Message of the underlying pool rejection.
        message: String,
    },

    // ========================================================================
    // Connection Faults
    // ========================================================================
    /// Connection attempt or outstanding call timed out.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Connection closed by the peer.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Socket-level error observed on a connection.
    #[error("Transport error ({kind:?}): {message}")]
    Transport {
        /// Kind of the underlying I/O error.
        kind: ErrorKind,
        /// Description of the I/O error.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Connection could not be used.
    ///
    /// Returned when a call is attempted on a connection that was never
    /// established or has already been shut down.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Protocol violation or unexpected message.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    /// Method is not part of the service description.
    #[error("Unknown method: {method}")]
    UnknownMethod {
        /// The requested method name.
        method: String,
    },

    // ========================================================================
    // Remote Errors
    // ========================================================================
    /// Error returned by the remote service itself.
    ///
    /// The connection that carried the call remains usable.
    #[error("Remote error in {method}: {message}")]
    Application {
        /// Method that failed.
        method: String,
        /// Error message from the remote service.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Channel receive error.
    #[error("Channel closed")]
    ChannelClosed(#[from] RecvError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an acquisition timeout error wrapping a pool message.
    #[inline]
    pub fn acquisition_timeout(message: impl Into<String>) -> Self {
        Self::AcquisitionTimeout {
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates a transport error from an I/O error.
    #[inline]
    pub fn transport(err: &IoError) -> Self {
        Self::Transport {
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates an unknown method error.
    #[inline]
    pub fn unknown_method(method: impl Into<String>) -> Self {
        Self::UnknownMethod {
            method: method.into(),
        }
    }

    /// Creates a remote application error.
    #[inline]
    pub fn application(method: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Application {
            method: method.into(),
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Accessors & Predicates
// ============================================================================

impl Error {
    /// Returns the wrapped pool message of an acquisition timeout.
    #[inline]
    #[must_use]
    pub fn pool_message(&self) -> Option<&str> {
        match self {
            Self::AcquisitionTimeout { message } => Some(message),
            _ => None,
        }
    }

    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::AcquisitionTimeout { .. } | Self::ConnectionTimeout { .. }
        )
    }

    /// Returns `true` if this error came from a fault event on a connection.
    ///
    /// A faulted connection is never handed out by the pool again.
    #[inline]
    #[must_use]
    pub fn is_connection_fault(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout { .. } | Self::ConnectionClosed | Self::Transport { .. }
        )
    }

    /// Returns `true` if this error was returned by the remote service.
    #[inline]
    #[must_use]
    pub fn is_application_error(&self) -> bool {
        matches!(self, Self::Application { .. })
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Recoverable errors may succeed when the caller retries later.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::AcquisitionTimeout { .. }
                | Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed
                | Self::Transport { .. }
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::connection("not connected");
        assert_eq!(err.to_string(), "Connection failed: not connected");
    }

    #[test]
    fn test_config_error() {
        let err = Error::config("both host and port must be specified");
        assert_eq!(
            err.to_string(),
            "Configuration error: both host and port must be specified"
        );
    }

    #[test]
    fn test_acquisition_timeout_carries_pool_message() {
        let err = Error::acquisition_timeout("ResourceRequest timed out");
        assert_eq!(
            err.to_string(),
            "Pool connection acquisition timeout: ResourceRequest timed out"
        );
        assert_eq!(err.pool_message(), Some("ResourceRequest timed out"));
        assert_eq!(Error::ConnectionClosed.pool_message(), None);
    }

    #[test]
    fn test_is_timeout() {
        assert!(Error::connection_timeout(1000).is_timeout());
        assert!(Error::acquisition_timeout("busy").is_timeout());
        assert!(!Error::ConnectionClosed.is_timeout());
    }

    #[test]
    fn test_is_connection_fault() {
        let io_err = IoError::new(ErrorKind::ConnectionReset, "reset by peer");

        assert!(Error::connection_timeout(10).is_connection_fault());
        assert!(Error::ConnectionClosed.is_connection_fault());
        assert!(Error::transport(&io_err).is_connection_fault());
        assert!(!Error::acquisition_timeout("busy").is_connection_fault());
        assert!(!Error::application("add", "overflow").is_connection_fault());
    }

    #[test]
    fn test_transport_keeps_kind() {
        let io_err = IoError::new(ErrorKind::ConnectionRefused, "refused");
        match Error::transport(&io_err) {
            Error::Transport { kind, message } => {
                assert_eq!(kind, ErrorKind::ConnectionRefused);
                assert_eq!(message, "refused");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_is_recoverable() {
        assert!(Error::acquisition_timeout("busy").is_recoverable());
        assert!(Error::ConnectionClosed.is_recoverable());
        assert!(!Error::config("test").is_recoverable());
        assert!(!Error::application("add", "bad input").is_recoverable());
    }

    #[test]
    fn test_application_error() {
        let err = Error::application("divide", "division by zero");
        assert!(err.is_application_error());
        assert_eq!(err.to_string(), "Remote error in divide: division by zero");
    }

    #[test]
    fn test_from_io_error() {
        let io_err = IoError::new(ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
