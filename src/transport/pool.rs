//! Bounded connection pool.
//!
//! Wraps a [`deadpool`] managed pool of [`Connection`]s to one endpoint.
//! The pool creates connections through [`factory::create`], hands out
//! only valid ones, and evicts idle connections in the background.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────┐
//! │              ConnectionPool               │
//! │  ┌─────────────────────────────────────┐  │
//! │  │ deadpool::Pool<ConnectionManager>   │  │
//! │  │   idle: conn-1, conn-3   (FIFO)     │  │
//! │  │   in use: conn-2                    │  │
//! │  │   waiters: acquire(), acquire()     │  │
//! │  └─────────────────────────────────────┘  │
//! │  maintenance task: pre-warm + eviction    │
//! └───────────────────────────────────────────┘
//! ```
//!
//! # Validation
//!
//! A connection is valid while it is both `alive` and `connected`. With
//! `test_on_borrow` an idle connection is validated before it is handed out;
//! with `test_on_return` it is validated when released. Invalid connections
//! are destroyed and never handed out again.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use deadpool::managed::{self, Metrics, Object, QueueMode, RecycleError, RecycleResult};
use futures_util::future::join_all;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval, timeout};
use tracing::{debug, info, trace};

use crate::client::options::{EndpointConfig, PoolConfig};
use crate::error::{Error, Result};

use super::connection::Connection;
use super::factory;

// ============================================================================
// Constants
// ============================================================================

/// Lower bound on the maintenance period.
const MIN_MAINTENANCE_INTERVAL: Duration = Duration::from_millis(100);

// ============================================================================
// Types
// ============================================================================

/// Connection checked out of the pool.
///
/// Returns to the pool when dropped; prefer [`ConnectionPool::release`] so
/// `test_on_return` is honored.
pub type PooledConnection = Object<ConnectionManager>;

// ============================================================================
// ConnectionManager
// ============================================================================

/// Pool resource manager: creates and validates connections.
#[derive(Debug)]
pub struct ConnectionManager {
    endpoint: Arc<EndpointConfig>,
    test_on_borrow: bool,
}

impl managed::Manager for ConnectionManager {
    type Type = Connection;
    type Error = Error;

    async fn create(&self) -> Result<Connection> {
        factory::create(Arc::clone(&self.endpoint)).await
    }

    async fn recycle(&self, connection: &mut Connection, _: &Metrics) -> RecycleResult<Error> {
        if !self.test_on_borrow || ConnectionPool::validate(connection) {
            return Ok(());
        }

        debug!(connection_id = %connection.id(), "Destroying invalid connection on borrow");
        ConnectionPool::destroy(connection);
        Err(RecycleError::Message("connection is no longer alive".into()))
    }
}

// ============================================================================
// PoolStatus
// ============================================================================

/// Snapshot of the pool state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// Maximum number of connections.
    pub max: usize,
    /// Connections currently owned by the pool (idle + in use).
    pub size: usize,
    /// Idle connections.
    pub available: usize,
    /// Callers waiting for a connection.
    pub waiting: usize,
}

// ============================================================================
// MaintenanceGuard
// ============================================================================

/// Aborts the maintenance task when the last pool handle is dropped.
#[derive(Debug)]
struct MaintenanceGuard(Option<JoinHandle<()>>);

impl MaintenanceGuard {
    fn stop(&self) {
        if let Some(task) = &self.0 {
            task.abort();
        }
    }
}

impl Drop for MaintenanceGuard {
    fn drop(&mut self) {
        self.stop();
    }
}

// ============================================================================
// ConnectionPool
// ============================================================================

/// Bounded pool of connections to one endpoint.
///
/// Cloning yields another handle to the same pool.
///
/// # Example
///
/// ```ignore
/// let pool = ConnectionPool::new(pool_config, Arc::new(endpoint_config))?;
///
/// let connection = pool.acquire().await?;
/// let reply = connection.call(message).await;
/// pool.release(connection);
/// ```
#[derive(Debug, Clone)]
pub struct ConnectionPool {
    inner: managed::Pool<ConnectionManager>,
    config: Arc<PoolConfig>,
    endpoint: Arc<EndpointConfig>,
    maintenance: Arc<MaintenanceGuard>,
}

// ============================================================================
// ConnectionPool - Constructor
// ============================================================================

impl ConnectionPool {
    /// Creates a pool. No connection is opened synchronously.
    ///
    /// When called inside a tokio runtime, a maintenance task pre-warms the
    /// pool to `min` and evicts connections idle longer than `idle_timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the pool cannot be built.
    pub fn new(config: PoolConfig, endpoint: Arc<EndpointConfig>) -> Result<Self> {
        let manager = ConnectionManager {
            endpoint: Arc::clone(&endpoint),
            test_on_borrow: config.test_on_borrow,
        };

        let inner = managed::Pool::builder(manager)
            .max_size(config.max)
            .queue_mode(QueueMode::Fifo)
            .build()
            .map_err(|e| Error::config(format!("failed to build pool: {e}")))?;

        let config = Arc::new(config);

        let maintenance = match Handle::try_current() {
            Ok(handle) => Some(handle.spawn(run_maintenance(inner.clone(), Arc::clone(&config)))),
            Err(_) => {
                debug!("No tokio runtime, pool maintenance disabled");
                None
            }
        };

        info!(
            addr = %endpoint.addr(),
            max = config.max,
            min = config.min,
            "Connection pool created"
        );

        Ok(Self {
            inner,
            config,
            endpoint,
            maintenance: Arc::new(MaintenanceGuard(maintenance)),
        })
    }
}

// ============================================================================
// ConnectionPool - Public API
// ============================================================================

impl ConnectionPool {
    /// Returns the resolved pool configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Returns the endpoint the pool connects to.
    #[inline]
    #[must_use]
    pub fn endpoint(&self) -> &EndpointConfig {
        &self.endpoint
    }

    /// Borrows a valid connection, creating one if the pool has room.
    ///
    /// Waiters are served in arrival order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AcquisitionTimeout`] wrapping the pool's message if
    /// no connection became available within `acquire_timeout`, the factory
    /// failed, or the pool is closed.
    pub async fn acquire(&self) -> Result<PooledConnection> {
        let acquire_timeout = self.config.acquire_timeout;

        match timeout(acquire_timeout, self.inner.get()).await {
            Ok(Ok(connection)) => {
                connection.mark_idle();
                trace!(connection_id = %connection.id(), "Connection acquired");
                Ok(connection)
            }
            Ok(Err(e)) => {
                debug!(error = %e, "Connection acquisition failed");
                Err(Error::acquisition_timeout(e.to_string()))
            }
            Err(_) => {
                debug!(timeout_ms = acquire_timeout.as_millis() as u64, "Connection acquisition timed out");
                Err(Error::acquisition_timeout(format!(
                    "ResourceRequest timed out after {}ms",
                    acquire_timeout.as_millis()
                )))
            }
        }
    }

    /// Returns a borrowed connection.
    ///
    /// With `test_on_return`, an invalid connection is destroyed instead of
    /// going back to the idle set.
    pub fn release(&self, connection: PooledConnection) {
        if self.config.test_on_return && !Self::validate(&connection) {
            let connection = Object::take(connection);
            debug!(connection_id = %connection.id(), "Destroying invalid connection on return");
            Self::destroy(&connection);
            return;
        }

        connection.mark_idle();
        trace!(connection_id = %connection.id(), "Connection released");
        drop(connection);
    }

    /// Returns `true` if the connection may be handed out.
    #[inline]
    #[must_use]
    pub fn validate(connection: &Connection) -> bool {
        connection.is_alive() && connection.is_connected()
    }

    /// Closes a connection's socket.
    pub fn destroy(connection: &Connection) {
        trace!(connection_id = %connection.id(), "Connection destroyed");
        connection.close();
    }

    /// Returns a snapshot of the pool state.
    #[must_use]
    pub fn status(&self) -> PoolStatus {
        let status = self.inner.status();
        PoolStatus {
            max: status.max_size,
            size: status.size,
            available: status.available,
            waiting: status.waiting,
        }
    }

    /// Returns `true` once [`close`](Self::close) was called.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Closes the pool.
    ///
    /// Idle connections are dropped, waiters fail, and connections in use
    /// are discarded when returned.
    pub fn close(&self) {
        self.maintenance.stop();

        let idle = self.inner.retain(|_, _| false);
        for connection in &idle.removed {
            Self::destroy(connection);
        }

        self.inner.close();
        info!(addr = %self.endpoint.addr(), closed = idle.removed.len(), "Connection pool closed");
    }
}

// ============================================================================
// Maintenance
// ============================================================================

/// Background loop: pre-warms to `min` and evicts idle connections.
async fn run_maintenance(pool: managed::Pool<ConnectionManager>, config: Arc<PoolConfig>) {
    let period = (config.idle_timeout / 2).max(MIN_MAINTENANCE_INTERVAL);
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        if pool.is_closed() {
            break;
        }

        evict_idle(&pool, &config);
        prewarm(&pool, &config).await;
    }

    debug!("Pool maintenance terminated");
}

/// Removes connections idle longer than `idle_timeout`, keeping `min`.
///
/// Idle time counts from the last borrow or release, so a long call does
/// not count against the connection.
fn evict_idle(pool: &managed::Pool<ConnectionManager>, config: &PoolConfig) -> usize {
    let status = pool.status();
    let mut kept = status.size.saturating_sub(status.available);

    let result = pool.retain(|connection, _| {
        if connection.idle_for() < config.idle_timeout || kept < config.min {
            kept += 1;
            return true;
        }
        false
    });

    for connection in &result.removed {
        ConnectionPool::destroy(connection);
    }

    if !result.removed.is_empty() {
        debug!(evicted = result.removed.len(), "Evicted idle connections");
    }

    result.removed.len()
}

/// Opens connections until the pool holds at least `min`.
async fn prewarm(pool: &managed::Pool<ConnectionManager>, config: &PoolConfig) {
    let status = pool.status();
    if status.size >= config.min {
        return;
    }

    let in_use = status.size.saturating_sub(status.available);
    let wanted = config.min.saturating_sub(in_use);

    let results = join_all((0..wanted).map(|_| timeout(config.acquire_timeout, pool.get()))).await;
    let ready = results.iter().filter(|r| matches!(r, Ok(Ok(_)))).count();

    debug!(wanted, ready, "Pre-warmed pool");
}

// ============================================================================
// Tests
// ============================================================================
