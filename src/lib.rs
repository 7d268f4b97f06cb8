//! Pooled RPC - Resilient pooled client for persistent binary RPC services.
//!
//! This library wraps a set of RPC method names in a client whose every call
//! borrows a persistent TCP connection from a bounded pool, performs one
//! request/reply exchange, and returns the connection.
//!
//! # Architecture
//!
//! Data flows one way per call:
//!
//! ```text
//! caller → Invoker → ConnectionPool::acquire → factory::create (pool miss only)
//!        → Connection::call → ConnectionPool::release
//! ```
//!
//! Key design principles:
//!
//! - Each [`Client`] owns exactly one [`ConnectionPool`]
//! - A connection is handed to at most one caller at a time
//! - Any fault (timeout, peer close, socket error) kills the connection; the
//!   pool never hands it out again
//! - Faults reach the pending call through a per-call fault bridge that is
//!   always detached afterwards
//!
//! # Quick Start
//!
//! ```no_run
//! use pooled_rpc::{Client, PoolOptions, Result, ServiceDescription};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let service = ServiceDescription::new("Calculator", ["add", "subtract"]);
//!
//!     let client = Client::builder(service)
//!         .pool_options(PoolOptions::new().with_max(4))
//!         .host("127.0.0.1")
//!         .port(9090)
//!         .build()?;
//!
//!     let sum = client.call("add", json!([1, 2])).await?;
//!     println!("1 + 2 = {sum}");
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | Client assembly, invokers and options |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | Wire messages and codecs |
//! | [`transport`] | Connections, fault bridge and pool |

// ============================================================================
// Modules
// ============================================================================

/// Client assembly and per-method invokers.
///
/// Use [`build`] or [`Client::builder()`] to create a client.
pub mod client;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers for connections and fault subscriptions.
pub mod identifiers;

/// RPC wire messages and codecs.
pub mod protocol;

/// Connection transport layer.
///
/// Connections, the fault bridge, and the bounded pool.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Client types
pub use client::{
    Client, ClientBuilder, EndpointConfig, EndpointOptions, Invoker, PoolConfig, PoolOptions,
    ServiceDescription, build,
};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{ConnectionId, SubscriptionId};

// Protocol types
pub use protocol::{Codec, Message, MessageType, ProtocolKind, TransportKind};

// Transport types
pub use transport::{Connection, ConnectionPool, Fault, PoolStatus};
