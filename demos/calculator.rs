//! Pooled calculator client.
//!
//! Demonstrates:
//! - Loading a service description from JSON
//! - Building a client with pool and endpoint options
//! - Concurrent calls sharing a bounded pool
//! - Telling fault errors apart from remote errors
//!
//! Starts an in-process calculator service unless `--port` is given.
//!
//! Usage:
//!   cargo run --example calculator
//!   cargo run --example calculator -- --debug
//!   cargo run --example calculator -- --port 9090

// ============================================================================
// Imports
// ============================================================================

use futures_util::future::join_all;
use pooled_rpc::{Client, Codec, Error, Message, PoolOptions, Result, ServiceDescription};
use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing_subscriber::EnvFilter;

// ============================================================================
// Constants
// ============================================================================

const SERVICE_JSON: &str = r#"{
    "name": "Calculator",
    "methods": ["add", "subtract", "divide"]
}"#;

// ============================================================================
// Args
// ============================================================================

#[derive(Debug, Clone)]
struct Args {
    debug: bool,
    port: Option<u16>,
}

impl Args {
    fn parse() -> Self {
        let args: Vec<String> = std::env::args().collect();
        let port = args
            .iter()
            .position(|a| a == "--port")
            .and_then(|i| args.get(i + 1))
            .and_then(|p| p.parse().ok());

        Self {
            debug: args.iter().any(|a| a == "--debug"),
            port,
        }
    }
}

fn init_logging(debug: bool) {
    let filter = if debug { "pooled_rpc=debug" } else { "pooled_rpc=info" };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.debug);

    if let Err(e) = run(args).await {
        eprintln!("\n[ERROR] {e}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    println!("=== Pooled Calculator ===\n");

    let port = match args.port {
        Some(port) => port,
        None => start_local_service().await?,
    };

    // ========================================================================
    // Build Client
    // ========================================================================

    println!("[1] Building client for 127.0.0.1:{port}...");
    let service = ServiceDescription::from_json(SERVICE_JSON)?;
    let client = Client::builder(service)
        .pool_options(PoolOptions::new().with_max(2).with_acquire_timeout_millis(2_000))
        .host("127.0.0.1")
        .port(port)
        .build()?;
    println!("    ✓ Methods: {}\n", client.method_names().join(", "));

    // ========================================================================
    // Concurrent Calls
    // ========================================================================

    println!("[2] Running 6 concurrent additions on a pool of 2...");
    let calls = (1..=6).map(|i| client.call("add", json!([i, i * 10])));
    for (i, result) in join_all(calls).await.into_iter().enumerate() {
        println!("    add({}, {}) = {}", i + 1, (i + 1) * 10, result?);
    }
    let status = client.pool().status();
    println!("    ✓ Pool size {} of {}\n", status.size, status.max);

    // ========================================================================
    // Remote Errors
    // ========================================================================

    println!("[3] Dividing by zero...");
    match client.call("divide", json!([1, 0])).await {
        Err(e @ Error::Application { .. }) => println!("    ✓ Remote error: {e}"),
        Err(e) if e.is_connection_fault() => println!("    ✗ Connection fault: {e}"),
        other => println!("    ? Unexpected: {other:?}"),
    }

    let difference = client.call("subtract", json!([10, 4])).await?;
    println!("    ✓ Connection still usable: subtract(10, 4) = {difference}\n");

    client.close();
    println!("=== Done ===");
    Ok(())
}

// ============================================================================
// Local Service
// ============================================================================

async fn start_local_service() -> Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(serve(stream));
        }
    });

    Ok(port)
}

async fn serve(mut stream: TcpStream) {
    let codec = Codec::default();
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    while let Ok(n) = stream.read(&mut chunk).await {
        if n == 0 {
            return;
        }
        buf.extend_from_slice(&chunk[..n]);

        while let Ok(Some(call)) = codec.decode(&mut buf) {
            let reply = calculate(call);
            let Ok(bytes) = codec.encode(&reply) else {
                return;
            };
            if stream.write_all(&bytes).await.is_err() {
                return;
            }
        }
    }
}

fn calculate(call: Message) -> Message {
    let args = call.payload.as_array().cloned().unwrap_or_default();
    let a = args.first().and_then(Value::as_i64).unwrap_or(0);
    let b = args.get(1).and_then(Value::as_i64).unwrap_or(0);

    let result = match call.name.as_str() {
        "add" => Ok(a + b),
        "subtract" => Ok(a - b),
        "divide" if b == 0 => Err("division by zero"),
        "divide" => Ok(a / b),
        _ => Err("unknown method"),
    };

    match result {
        Ok(value) => Message::reply(call.name, call.seqid, json!(value)),
        Err(message) => Message::exception(call.name, call.seqid, message),
    }
}
