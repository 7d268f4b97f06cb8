//! Shared integration test helpers.
//!
//! Runs an in-process calculator service over the crate's own codec.
//!
//! | Method | Behavior |
//! |--------|----------|
//! | `add` / `subtract` | Integer arithmetic on `[a, b]` |
//! | `ping` | Replies `"pong"` |
//! | `fail` | Replies with an exception |
//! | `sleep` | Waits `[ms]` before replying |
//! | `hang_up` | Closes the socket without replying |
//! | `bye` | Replies, then closes the socket |

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use pooled_rpc::{Codec, EndpointOptions, Message, ServiceDescription};
use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

// ============================================================================
// Tracing
// ============================================================================

/// Installs a test subscriber honoring `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ============================================================================
// Service
// ============================================================================

/// Service description matching [`TestServer`].
pub fn calculator() -> ServiceDescription {
    ServiceDescription::new(
        "Calculator",
        ["add", "subtract", "ping", "fail", "sleep", "hang_up", "bye"],
    )
}

/// Outcome of handling one call.
enum Outcome {
    Reply(Message),
    ReplyAndClose(Message),
    Close,
}

// ============================================================================
// TestServer
// ============================================================================

/// Calculator service bound to a random local port.
pub struct TestServer {
    port: u16,
    accepted: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl TestServer {
    /// Starts a server using the default codec (framed binary).
    pub async fn start() -> Self {
        Self::start_with(Codec::default()).await
    }

    /// Starts a server using `codec`.
    pub async fn start_with(codec: Codec) -> Self {
        init_tracing();

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind test server");
        let port = listener.local_addr().expect("local addr").port();
        let accepted = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&accepted);
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(serve(stream, codec));
            }
        });

        Self {
            port,
            accepted,
            task,
        }
    }

    /// Returns the bound port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Returns the number of accepted connections.
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Returns endpoint options targeting this server.
    pub fn endpoint(&self) -> EndpointOptions {
        EndpointOptions::new("127.0.0.1", self.port)
            .with_connect_timeout(500)
            .with_max_attempts(1)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Returns a local port with nothing listening on it.
pub async fn unused_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    listener.local_addr().expect("local addr").port()
}

// ============================================================================
// Connection Handling
// ============================================================================

async fn serve(mut stream: TcpStream, codec: Codec) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        let n = match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        buf.extend_from_slice(&chunk[..n]);

        while let Ok(Some(call)) = codec.decode(&mut buf) {
            let (reply, close) = match handle(call).await {
                Outcome::Reply(reply) => (Some(reply), false),
                Outcome::ReplyAndClose(reply) => (Some(reply), true),
                Outcome::Close => (None, true),
            };

            if let Some(reply) = reply {
                let bytes = codec.encode(&reply).expect("encode reply");
                if stream.write_all(&bytes).await.is_err() {
                    return;
                }
            }

            if close {
                let _ = stream.shutdown().await;
                return;
            }
        }
    }
}

async fn handle(call: Message) -> Outcome {
    let Message {
        name,
        seqid,
        payload,
        ..
    } = call;
    let args = payload.as_array().cloned().unwrap_or_default();
    let int = |i: usize| args.get(i).and_then(Value::as_i64).unwrap_or(0);
    let reply = |result: Value| Message::reply(name.clone(), seqid, result);
    let exception = |message: &str| Message::exception(name.clone(), seqid, message);

    match name.as_str() {
        "add" => Outcome::Reply(reply(json!(int(0) + int(1)))),
        "subtract" => Outcome::Reply(reply(json!(int(0) - int(1)))),
        "ping" => Outcome::Reply(reply(json!("pong"))),
        "fail" => Outcome::Reply(exception("requested failure")),
        "sleep" => {
            tokio::time::sleep(Duration::from_millis(int(0) as u64)).await;
            Outcome::Reply(reply(Value::Null))
        }
        "hang_up" => Outcome::Close,
        "bye" => Outcome::ReplyAndClose(reply(json!("bye"))),
        _ => Outcome::Reply(exception("unknown method")),
    }
}
