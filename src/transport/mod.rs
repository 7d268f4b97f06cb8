//! Connection transport layer.
//!
//! This module owns the TCP connections to the RPC endpoint and the pool
//! that hands them out.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐                              ┌─────────────────┐
//! │  Invoker        │                              │  RPC service    │
//! │                 │        framed / buffered     │                 │
//! │  ConnectionPool │◄────────────────────────────►│                 │
//! │  → Connection   │          host:PORT           │                 │
//! └─────────────────┘                              └─────────────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. `factory::create` - Connect with bounded retries (`alive = true`)
//! 2. `ConnectionPool::acquire` - Validate and hand out
//! 3. `lifecycle::guard` - Bridge faults into the pending call
//! 4. `ConnectionPool::release` - Validate and return, or destroy
//! 5. Eviction after `idle_timeout`, or destruction after a fault
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | TCP connection, event loop and fault broadcast |
//! | `factory` | Connection creation for the pool |
//! | `lifecycle` | Per-operation fault bridge |
//! | `pool` | Bounded pool with validation and idle eviction |

// ============================================================================
// Submodules
// ============================================================================

/// TCP connection and event loop.
pub mod connection;

/// Connection factory.
pub mod factory;

/// Fault bridge attach/detach.
pub mod lifecycle;

/// Bounded connection pool.
pub mod pool;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::{Connection, Fault, FaultHandler};
pub use lifecycle::{Subscription, attach, guard};
pub use pool::{ConnectionManager, ConnectionPool, PoolStatus, PooledConnection};
