//! Client assembly.
//!
//! [`build`] is the entrypoint: it merges options over the defaults,
//! creates exactly one pool, and attaches one invoker per method name.
//! [`ClientBuilder`] is the fluent form of the same call.
//!
//! # Example
//!
//! ```ignore
//! use pooled_rpc::{Client, PoolOptions, ServiceDescription};
//!
//! let service = ServiceDescription::new("Calculator", ["add", "subtract"]);
//! let client = Client::builder(service)
//!     .pool_options(PoolOptions::new().with_max(4))
//!     .host("127.0.0.1")
//!     .port(9090)
//!     .build()?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use tracing::info;

use crate::error::Result;
use crate::transport::ConnectionPool;

use super::core::Client;
use super::options::{EndpointConfig, EndpointOptions, PoolConfig, PoolOptions};
use super::service::ServiceDescription;

// ============================================================================
// build
// ============================================================================

/// Assembles a client for `service`.
///
/// Fails before any I/O is attempted; no connection is opened here.
///
/// # Errors
///
/// - [`crate::Error::Config`] if `host` or `port` is missing
/// - [`crate::Error::Config`] if the pool options are invalid
pub fn build(
    service: &ServiceDescription,
    pool_options: PoolOptions,
    endpoint_options: EndpointOptions,
) -> Result<Client> {
    let endpoint = EndpointConfig::merge(&endpoint_options)?;
    let pool_config = PoolConfig::merge(&pool_options)?;

    info!(
        service = service.name(),
        methods = service.len(),
        host = %endpoint.host,
        port = endpoint.port,
        max = pool_config.max,
        "Assembling client"
    );

    let pool = ConnectionPool::new(pool_config, Arc::new(endpoint))?;
    Ok(Client::new(service, pool))
}

// ============================================================================
// ClientBuilder
// ============================================================================

/// Builder for configuring a [`Client`].
///
/// Use [`Client::builder()`] to create a new builder.
#[derive(Debug, Clone)]
pub struct ClientBuilder {
    service: ServiceDescription,
    pool: PoolOptions,
    endpoint: EndpointOptions,
}

impl ClientBuilder {
    /// Creates a builder with default options and no endpoint.
    #[inline]
    #[must_use]
    pub fn new(service: ServiceDescription) -> Self {
        Self {
            service,
            pool: PoolOptions::default(),
            endpoint: EndpointOptions::default(),
        }
    }

    /// Replaces the pool options.
    #[inline]
    #[must_use]
    pub fn pool_options(mut self, options: PoolOptions) -> Self {
        self.pool = options;
        self
    }

    /// Replaces the endpoint options.
    #[inline]
    #[must_use]
    pub fn endpoint_options(mut self, options: EndpointOptions) -> Self {
        self.endpoint = options;
        self
    }

    /// Sets the endpoint host.
    #[inline]
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.endpoint.host = Some(host.into());
        self
    }

    /// Sets the endpoint port.
    #[inline]
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.endpoint.port = Some(port);
        self
    }

    /// Builds the client.
    ///
    /// # Errors
    ///
    /// See [`build`].
    pub fn build(self) -> Result<Client> {
        build(&self.service, self.pool, self.endpoint)
    }
}

// ============================================================================
// Tests
// ============================================================================
