//! Client assembly and per-method invokers.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `builder` | [`build`] entrypoint and [`ClientBuilder`] |
//! | `core` | [`Client`] method map |
//! | `invoker` | [`Invoker`] for one method |
//! | `options` | Pool/endpoint options and their merge |
//! | `service` | [`ServiceDescription`] |

// ============================================================================
// Submodules
// ============================================================================

/// Client assembly.
pub mod builder;

/// Assembled client.
pub mod core;

/// Per-method invoker.
pub mod invoker;

/// Configuration options.
pub mod options;

/// Service description.
pub mod service;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::{ClientBuilder, build};
pub use self::core::Client;
pub use invoker::Invoker;
pub use options::{EndpointConfig, EndpointOptions, PoolConfig, PoolOptions};
pub use service::ServiceDescription;
