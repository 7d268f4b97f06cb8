//! Connection factory used by the pool.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use tracing::debug;

use crate::client::options::EndpointConfig;
use crate::error::Result;

use super::connection::Connection;
use super::lifecycle;

// ============================================================================
// Functions
// ============================================================================

/// Opens a new live connection to the endpoint.
///
/// Resolves once the connect event fires (`alive = true`). Rejects with the
/// fault error if every connect attempt fails. The fault bridge used while
/// connecting is always detached before returning.
///
/// # Errors
///
/// - [`crate::Error::ConnectionTimeout`] if the final attempt timed out
/// - [`crate::Error::Transport`] if the final attempt failed at the socket level
pub async fn create(config: Arc<EndpointConfig>) -> Result<Connection> {
    let connection = Connection::new(config);

    debug!(
        connection_id = %connection.id(),
        addr = %connection.config().addr(),
        max_attempts = connection.config().max_attempts,
        "Opening connection"
    );

    match lifecycle::guard(&connection, connection.connect()).await {
        Ok(()) => Ok(connection),
        Err(e) => {
            debug!(connection_id = %connection.id(), error = %e, "Connection failed");
            Err(e)
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::ErrorKind;

    use tokio::net::TcpListener;

    use crate::client::options::EndpointOptions;
    use crate::error::Error;

    fn config_for(port: u16, max_attempts: u32) -> Arc<EndpointConfig> {
        let options = EndpointOptions::new("127.0.0.1", port)
            .with_connect_timeout(200)
            .with_max_attempts(max_attempts);
        Arc::new(EndpointConfig::merge(&options).expect("config"))
    }

    #[tokio::test]
    async fn test_create_yields_live_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        let server = tokio::spawn(async move { listener.accept().await.map(|(stream, _)| stream) });

        let connection = create(config_for(port, 1)).await.expect("create");
        let _stream = server.await.expect("join").expect("accept");

        assert!(connection.is_alive());
        assert!(connection.is_valid());
        assert_eq!(connection.subscription_count(), 0);
    }

    #[tokio::test]
    async fn test_create_rejects_with_connect_timeout() {
        // Non-routable address: the SYN is never answered.
        let options = EndpointOptions::new("10.255.255.1", 9090)
            .with_connect_timeout(100)
            .with_max_attempts(1);
        let config = Arc::new(EndpointConfig::merge(&options).expect("config"));

        match create(config).await.unwrap_err() {
            Error::ConnectionTimeout { timeout_ms } => assert_eq!(timeout_ms, 100),
            // Hosts without a default route fail fast instead.
            Error::Transport { kind, .. } => assert!(
                matches!(kind, ErrorKind::NetworkUnreachable | ErrorKind::HostUnreachable),
                "{kind:?}"
            ),
            err => panic!("unexpected error: {err:?}"),
        }
    }

    #[tokio::test]
    async fn test_create_rejects_after_all_attempts() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        drop(listener);

        let err = create(config_for(port, 2)).await.unwrap_err();
        assert!(err.is_connection_fault(), "{err:?}");
    }
}
