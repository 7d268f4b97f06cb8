//! Fault bridge between a connection and one pending operation.
//!
//! [`attach`] registers a one-shot fault handler and returns a
//! [`Subscription`]; the first fault observed while it is attached rejects
//! the operation. Dropping or [`Subscription::detach`]ing removes the
//! handler, so a connection reused across many operations never accumulates
//! handlers.
//!
//! [`guard`] wraps an operation in attach/detach.

// ============================================================================
// Imports
// ============================================================================

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::trace;

use crate::error::{Error, Result};
use crate::identifiers::SubscriptionId;

use super::connection::{Connection, Fault};

// ============================================================================
// Subscription
// ============================================================================

/// Attached fault bridge.
///
/// Unsubscribes from the connection on drop.
#[derive(Debug)]
pub struct Subscription {
    connection: Connection,
    id: SubscriptionId,
    rejection: oneshot::Receiver<Error>,
}

impl Subscription {
    /// Returns the subscription ID.
    #[inline]
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Returns the fault error if one was observed while attached.
    pub fn try_fault(&mut self) -> Option<Error> {
        self.rejection.try_recv().ok()
    }

    /// Removes the handler from the connection.
    pub fn detach(mut self) {
        self.unsubscribe();
    }

    /// Idempotent: only the first call removes the handler.
    fn unsubscribe(&mut self) {
        if self.connection.unsubscribe(self.id) {
            trace!(connection_id = %self.connection.id(), subscription_id = %self.id, "Fault bridge detached");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

// ============================================================================
// Functions
// ============================================================================

/// Attaches a fault bridge to `connection`.
///
/// Only the first fault is forwarded; later faults are ignored.
pub fn attach(connection: &Connection) -> Subscription {
    let (reject_tx, rejection) = oneshot::channel();
    let reject_tx = Mutex::new(Some(reject_tx));

    let id = connection.subscribe(move |fault: &Fault| {
        if let Some(reject_tx) = reject_tx.lock().take() {
            let _ = reject_tx.send(fault.to_error());
        }
    });

    trace!(connection_id = %connection.id(), subscription_id = %id, "Fault bridge attached");

    Subscription {
        connection: connection.clone(),
        id,
        rejection,
    }
}

/// Runs `operation` with a fault bridge attached.
///
/// A fault observed before the operation settles wins over the operation's
/// own error; a reply that settled first is kept. The bridge is detached on
/// every exit path.
pub async fn guard<T, F>(connection: &Connection, operation: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let mut subscription = attach(connection);

    let result = tokio::select! {
        biased;

        result = operation => result,
        Ok(error) = &mut subscription.rejection => Err(error),
    };

    let result = match result {
        Err(error) => Err(subscription.try_fault().unwrap_or(error)),
        ok => ok,
    };

    subscription.detach();
    result
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::time::Duration;

    use crate::client::options::{EndpointConfig, EndpointOptions};

    fn connection() -> Connection {
        let options = EndpointOptions::new("127.0.0.1", 9090);
        Connection::new(Arc::new(EndpointConfig::merge(&options).expect("config")))
    }

    #[test]
    fn test_attach_and_detach_restore_handler_count() {
        let connection = connection();
        assert_eq!(connection.subscription_count(), 0);

        let subscription = attach(&connection);
        assert_eq!(connection.subscription_count(), 1);

        subscription.detach();
        assert_eq!(connection.subscription_count(), 0);
    }

    #[test]
    fn test_dropped_subscription_detaches() {
        let connection = connection();
        let other = attach(&connection);
        {
            let _subscription = attach(&connection);
            assert_eq!(connection.subscription_count(), 2);
        }
        assert_eq!(connection.subscription_count(), 1);

        other.detach();
        assert_eq!(connection.subscription_count(), 0);
    }

    #[test]
    fn test_only_first_fault_is_forwarded() {
        let connection = connection();
        let mut subscription = attach(&connection);

        connection.emit(&Fault::Closed);
        connection.emit(&Fault::Timeout { timeout_ms: 1 });

        assert!(matches!(subscription.try_fault(), Some(Error::ConnectionClosed)));
        assert!(subscription.try_fault().is_none());
    }

    #[test]
    fn test_detached_bridge_ignores_faults() {
        let connection = connection();
        let subscription = attach(&connection);
        subscription.detach();

        connection.emit(&Fault::Closed);
        assert_eq!(connection.subscription_count(), 0);
    }

    #[tokio::test]
    async fn test_guard_passes_through_success() {
        let connection = connection();
        let value = guard(&connection, async { Ok(7) }).await.expect("ok");

        assert_eq!(value, 7);
        assert_eq!(connection.subscription_count(), 0);
    }

    #[tokio::test]
    async fn test_guard_rejects_on_fault() {
        let connection = connection();
        let faulting = connection.clone();

        let result: Result<()> = guard(&connection, async move {
            faulting.emit(&Fault::Timeout { timeout_ms: 25 });
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        assert!(matches!(result, Err(Error::ConnectionTimeout { timeout_ms: 25 })));
        assert_eq!(connection.subscription_count(), 0);
    }

    #[tokio::test]
    async fn test_fault_wins_over_operation_error() {
        let connection = connection();
        let faulting = connection.clone();

        let result: Result<()> = guard(&connection, async move {
            faulting.emit(&Fault::Closed);
            Err(Error::connection("write failed"))
        })
        .await;

        assert!(matches!(result, Err(Error::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_guard_keeps_operation_error_without_fault() {
        let connection = connection();
        let result: Result<()> =
            guard(&connection, async { Err(Error::application("add", "overflow")) }).await;

        assert!(matches!(result, Err(Error::Application { .. })));
        assert_eq!(connection.subscription_count(), 0);
    }
}
