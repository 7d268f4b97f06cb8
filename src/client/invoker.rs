//! Per-method RPC invoker.
//!
//! An [`Invoker`] performs one RPC per [`invoke`](Invoker::invoke):
//!
//! 1. Borrow a connection from the pool
//! 2. Attach a fault bridge to it
//! 3. Send the call and wait for the reply
//! 4. Detach the bridge and release the connection, whatever the outcome
//!
//! A fault that fires before the reply settles wins over the reply.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::protocol::Message;
use crate::transport::{Connection, ConnectionPool, guard};

// ============================================================================
// Invoker
// ============================================================================

/// Callable bound to one method name and one pool.
#[derive(Debug, Clone)]
pub struct Invoker {
    method: Arc<str>,
    pool: ConnectionPool,
}

impl Invoker {
    pub(crate) fn new(method: impl Into<Arc<str>>, pool: ConnectionPool) -> Self {
        Self {
            method: method.into(),
            pool,
        }
    }

    /// Returns the method name.
    #[inline]
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Invokes the method with `args`.
    ///
    /// Dropping the returned future detaches the fault bridge and returns the
    /// connection to the pool.
    ///
    /// # Errors
    ///
    /// - [`Error::AcquisitionTimeout`] if no connection could be borrowed
    /// - [`Error::ConnectionTimeout`], [`Error::ConnectionClosed`] or
    ///   [`Error::Transport`] if the connection faulted during the call
    /// - [`Error::Application`] if the remote service raised an error
    pub async fn invoke(&self, args: Value) -> Result<Value> {
        let connection = self.pool.acquire().await?;

        trace!(method = %self.method, connection_id = %connection.id(), "Invoking");

        let result = guard(&connection, self.dispatch(&connection, args)).await;
        self.pool.release(connection);

        if let Err(e) = &result {
            debug!(method = %self.method, error = %e, "Invocation failed");
        }

        result
    }

    /// Sends the call on a borrowed connection.
    async fn dispatch(&self, connection: &Connection, args: Value) -> Result<Value> {
        let seqid = connection.next_seqid();
        let reply = connection.call(Message::call(&*self.method, seqid, args)).await?;

        if reply.seqid != seqid {
            return Err(Error::protocol(format!(
                "reply seqid {} does not match call seqid {seqid}",
                reply.seqid
            )));
        }

        reply.into_result(&self.method)
    }
}
