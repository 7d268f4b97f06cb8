//! Assembled RPC client.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::transport::ConnectionPool;

use super::builder::ClientBuilder;
use super::invoker::Invoker;
use super::service::ServiceDescription;

// ============================================================================
// Client
// ============================================================================

/// Mapping from method name to [`Invoker`], backed by one pool.
///
/// Immutable after assembly. Cloning yields another handle sharing the same
/// pool.
///
/// # Example
///
/// ```ignore
/// let client = Client::builder(service).host("127.0.0.1").port(9090).build()?;
///
/// let sum = client.call("add", json!([1, 2])).await?;
/// let sum = client.method("add").expect("declared").invoke(json!([3, 4])).await?;
/// ```
#[derive(Debug, Clone)]
pub struct Client {
    service: Arc<str>,
    invokers: Arc<FxHashMap<String, Invoker>>,
    pool: ConnectionPool,
}

// ============================================================================
// Client - Constructor
// ============================================================================

impl Client {
    /// Creates a builder for `service`.
    #[inline]
    #[must_use]
    pub fn builder(service: ServiceDescription) -> ClientBuilder {
        ClientBuilder::new(service)
    }

    /// Attaches one invoker per declared method.
    pub(crate) fn new(service: &ServiceDescription, pool: ConnectionPool) -> Self {
        let invokers = service
            .methods()
            .iter()
            .map(|method| (method.clone(), Invoker::new(method.as_str(), pool.clone())))
            .collect();

        Self {
            service: Arc::from(service.name()),
            invokers: Arc::new(invokers),
            pool,
        }
    }
}

// ============================================================================
// Client - Public API
// ============================================================================

impl Client {
    /// Returns the service name.
    #[inline]
    #[must_use]
    pub fn service_name(&self) -> &str {
        &self.service
    }

    /// Returns the invoker for `name`.
    #[inline]
    #[must_use]
    pub fn method(&self, name: &str) -> Option<&Invoker> {
        self.invokers.get(name)
    }

    /// Invokes `method` with `args`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownMethod`] if the service does not declare
    /// `method`, otherwise see [`Invoker::invoke`].
    pub async fn call(&self, method: &str, args: Value) -> Result<Value> {
        let invoker = self
            .method(method)
            .ok_or_else(|| Error::unknown_method(method))?;

        invoker.invoke(args).await
    }

    /// Returns the method names, sorted.
    #[must_use]
    pub fn method_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.invokers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Returns the number of methods.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.invokers.len()
    }

    /// Returns `true` if the client exposes no methods.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.invokers.is_empty()
    }

    /// Returns the pool shared by every invoker.
    #[inline]
    #[must_use]
    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// Closes the pool. Later calls fail with [`Error::AcquisitionTimeout`].
    pub fn close(&self) {
        self.pool.close();
    }
}
