//! Persistent RPC connection and event loop.
//!
//! A [`Connection`] is one TCP link to the configured endpoint. Once
//! connected it spawns a tokio task that owns the socket and handles:
//!
//! - Outgoing calls from the invoker
//! - Incoming replies, correlated to callers by sequence id
//! - Fault detection (per-call timeout, peer close, socket error)
//!
//! # Liveness
//!
//! `alive` is application-level liveness, tracked separately from the
//! transport-reported `connected` flag. It becomes `true` on the connect
//! event and `false` on the first fault; it is never set back to `true`.
//!
//! # Fault Subscriptions
//!
//! Faults are broadcast to handlers registered with
//! [`Connection::subscribe`]. The connection marks itself dead before any
//! handler runs. See [`super::lifecycle`] for the attach/detach pattern built
//! on top of this.

// ============================================================================
// Imports
// ============================================================================

use std::future::pending;
use std::io::{Error as IoError, ErrorKind};
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpSocket, TcpStream, lookup_host};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, sleep, sleep_until, timeout};
use tracing::{debug, trace, warn};

use crate::client::options::EndpointConfig;
use crate::error::{Error, Result};
use crate::identifiers::{ConnectionId, SubscriptionId};
use crate::protocol::{Codec, Message};

// ============================================================================
// Constants
// ============================================================================

/// Size of a single socket read.
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Base delay between connect attempts (multiplied by the attempt number).
const RECONNECT_DELAY: Duration = Duration::from_millis(50);

// ============================================================================
// Types
// ============================================================================

/// Map of sequence ids to reply channels.
type CorrelationMap = FxHashMap<i32, oneshot::Sender<Result<Message>>>;

/// Fault handler callback type.
///
/// Called once for each fault observed on the connection.
pub type FaultHandler = Arc<dyn Fn(&Fault) + Send + Sync>;

// ============================================================================
// Fault
// ============================================================================

/// Fault event observed on a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Connect attempt or outstanding call timed out.
    Timeout {
        /// Milliseconds waited.
        timeout_ms: u64,
    },
    /// Peer closed the connection.
    Closed,
    /// Socket-level error.
    Error {
        /// Kind of the I/O error.
        kind: ErrorKind,
        /// Description of the I/O error.
        message: String,
    },
}

impl Fault {
    /// Creates a fault from an I/O error.
    #[inline]
    #[must_use]
    pub fn from_io(err: &IoError) -> Self {
        Self::Error {
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    /// Returns the error a pending operation is rejected with.
    #[must_use]
    pub fn to_error(&self) -> Error {
        match self {
            Self::Timeout { timeout_ms } => Error::connection_timeout(*timeout_ms),
            Self::Closed => Error::ConnectionClosed,
            Self::Error { kind, message } => Error::Transport {
                kind: *kind,
                message: message.clone(),
            },
        }
    }
}

// ============================================================================
// ConnectionCommand
// ============================================================================

/// Internal commands for the event loop.
enum ConnectionCommand {
    /// Write a message and route its reply back.
    Call {
        message: Message,
        response_tx: oneshot::Sender<Result<Message>>,
    },
    /// Close the socket.
    Shutdown,
}

// ============================================================================
// Shared
// ============================================================================

/// State shared between connection handles and the event loop.
///
/// The event loop only holds a [`Weak`] reference, so dropping the last
/// [`Connection`] handle shuts the socket down.
struct Shared {
    id: ConnectionId,
    config: Arc<EndpointConfig>,
    alive: AtomicBool,
    connected: AtomicBool,
    next_seqid: AtomicI32,
    idle_since: Mutex<Instant>,
    subscribers: Mutex<FxHashMap<SubscriptionId, FaultHandler>>,
    command_tx: Mutex<Option<mpsc::UnboundedSender<ConnectionCommand>>>,
}

impl Shared {
    /// Marks the connection dead and notifies every subscriber.
    fn emit(&self, fault: &Fault) {
        self.alive.store(false, Ordering::SeqCst);

        let handlers: Vec<FaultHandler> = self.subscribers.lock().values().cloned().collect();

        debug!(
            connection_id = %self.id,
            ?fault,
            subscribers = handlers.len(),
            "Connection fault"
        );

        for handler in handlers {
            handler(fault);
        }
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        if let Some(command_tx) = self.command_tx.get_mut().take() {
            let _ = command_tx.send(ConnectionCommand::Shutdown);
        }
    }
}

// ============================================================================
// Connection
// ============================================================================

/// Persistent connection to one RPC endpoint.
///
/// Cloning yields another handle to the same socket.
#[derive(Clone)]
pub struct Connection {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.shared.id)
            .field("addr", &self.shared.config.addr())
            .field("alive", &self.is_alive())
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl Connection {
    /// Creates an unconnected connection (`alive = false`).
    pub(crate) fn new(config: Arc<EndpointConfig>) -> Self {
        Self {
            shared: Arc::new(Shared {
                id: ConnectionId::next(),
                config,
                alive: AtomicBool::new(false),
                connected: AtomicBool::new(false),
                next_seqid: AtomicI32::new(0),
                idle_since: Mutex::new(Instant::now()),
                subscribers: Mutex::new(FxHashMap::default()),
                command_tx: Mutex::new(None),
            }),
        }
    }

    /// Returns the connection ID.
    #[inline]
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.shared.id
    }

    /// Returns the endpoint this connection targets.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &EndpointConfig {
        &self.shared.config
    }

    /// Returns `true` between the connect event and the first fault.
    #[inline]
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.shared.alive.load(Ordering::SeqCst)
    }

    /// Returns `true` while the socket is open.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    /// Returns `true` if the connection may be handed to a borrower.
    #[inline]
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.is_alive() && self.is_connected()
    }

    /// Allocates the sequence id for the next call.
    #[inline]
    #[must_use]
    pub fn next_seqid(&self) -> i32 {
        self.shared.next_seqid.fetch_add(1, Ordering::Relaxed)
    }

    /// Returns how long the connection has been idle since it was last
    /// marked idle.
    #[must_use]
    pub fn idle_for(&self) -> Duration {
        self.shared.idle_since.lock().elapsed()
    }

    /// Restarts the idle clock.
    pub(crate) fn mark_idle(&self) {
        *self.shared.idle_since.lock() = Instant::now();
    }

    /// Registers a fault handler.
    pub fn subscribe(&self, handler: impl Fn(&Fault) + Send + Sync + 'static) -> SubscriptionId {
        let id = SubscriptionId::next();
        self.shared.subscribers.lock().insert(id, Arc::new(handler));
        id
    }

    /// Removes a fault handler. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.shared.subscribers.lock().remove(&id).is_some()
    }

    /// Returns the number of registered fault handlers.
    #[inline]
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.shared.subscribers.lock().len()
    }

    /// Sends a message and waits for its reply.
    ///
    /// Oneway messages resolve with an empty reply once written.
    ///
    /// # Errors
    ///
    /// - [`Error::Connection`] if the connection was never established
    /// - [`Error::ConnectionClosed`] if the event loop has stopped
    /// - The fault error if a fault ends the event loop while waiting
    pub async fn call(&self, message: Message) -> Result<Message> {
        let (response_tx, response_rx) = oneshot::channel();

        {
            let command_tx = self.shared.command_tx.lock();
            let command_tx = command_tx
                .as_ref()
                .ok_or_else(|| Error::connection("connection is not established"))?;

            command_tx
                .send(ConnectionCommand::Call {
                    message,
                    response_tx,
                })
                .map_err(|_| Error::ConnectionClosed)?;
        }

        response_rx.await.map_err(|_| Error::ConnectionClosed)?
    }

    /// Closes the socket.
    ///
    /// The connection is no longer valid afterwards.
    pub fn close(&self) {
        self.shared.alive.store(false, Ordering::SeqCst);
        if let Some(command_tx) = self.shared.command_tx.lock().as_ref() {
            let _ = command_tx.send(ConnectionCommand::Shutdown);
        }
    }

    /// Broadcasts a fault to the subscribers.
    pub(crate) fn emit(&self, fault: &Fault) {
        self.shared.emit(fault);
    }
}

// ============================================================================
// Connection - Establishment
// ============================================================================

impl Connection {
    /// Opens the socket, retrying up to `max_attempts` times.
    ///
    /// Only the final failure is emitted as a fault.
    pub(crate) async fn connect(&self) -> Result<()> {
        let config = Arc::clone(&self.shared.config);
        let mut attempt = 0;

        let fault = loop {
            attempt += 1;

            match Self::connect_once(&config).await {
                Ok(stream) => {
                    self.start(stream);
                    return Ok(());
                }
                Err(fault) if attempt < config.max_attempts => {
                    debug!(
                        connection_id = %self.id(),
                        attempt,
                        max_attempts = config.max_attempts,
                        ?fault,
                        "Connect attempt failed, retrying"
                    );
                    sleep(RECONNECT_DELAY * attempt).await;
                }
                Err(fault) => break fault,
            }
        };

        self.emit(&fault);
        Err(fault.to_error())
    }

    /// Makes one bounded connect attempt.
    async fn connect_once(config: &EndpointConfig) -> std::result::Result<TcpStream, Fault> {
        let attempt = async {
            let addr = lookup_host((config.host.as_str(), config.port))
                .await?
                .next()
                .ok_or_else(|| {
                    IoError::new(
                        ErrorKind::AddrNotAvailable,
                        format!("no address found for {}", config.addr()),
                    )
                })?;

            let socket = if addr.is_ipv4() {
                TcpSocket::new_v4()?
            } else {
                TcpSocket::new_v6()?
            };
            socket.set_keepalive(true)?;

            let stream = socket.connect(addr).await?;
            stream.set_nodelay(true)?;
            Ok::<_, IoError>(stream)
        };

        match timeout(config.connect_timeout, attempt).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(e)) => Err(Fault::from_io(&e)),
            Err(_) => Err(Fault::Timeout {
                timeout_ms: config.connect_timeout.as_millis() as u64,
            }),
        }
    }

    /// Handles the connect event: marks the connection live and spawns the event loop.
    fn start(&self, stream: TcpStream) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        *self.shared.command_tx.lock() = Some(command_tx);

        self.shared.connected.store(true, Ordering::SeqCst);
        self.shared.alive.store(true, Ordering::SeqCst);

        debug!(
            connection_id = %self.id(),
            addr = %self.shared.config.addr(),
            "Connection established"
        );

        tokio::spawn(Self::run_event_loop(
            stream,
            command_rx,
            Arc::downgrade(&self.shared),
            self.shared.id,
            self.shared.config.codec(),
            self.shared.config.timeout,
        ));
    }
}

// ============================================================================
// Connection - Event Loop
// ============================================================================

impl Connection {
    /// Event loop that owns the socket.
    async fn run_event_loop(
        stream: TcpStream,
        mut command_rx: mpsc::UnboundedReceiver<ConnectionCommand>,
        shared: Weak<Shared>,
        id: ConnectionId,
        codec: Codec,
        call_timeout: Option<Duration>,
    ) {
        let (mut reader, mut writer) = stream.into_split();
        let mut correlation = CorrelationMap::default();
        let mut read_buf: Vec<u8> = Vec::with_capacity(READ_CHUNK_SIZE);
        let mut chunk = vec![0u8; READ_CHUNK_SIZE];
        let mut deadline: Option<Instant> = None;
        let timeout_ms = call_timeout.map_or(0, |t| t.as_millis() as u64);

        let fault = loop {
            let timer = async move {
                match deadline {
                    Some(at) => sleep_until(at).await,
                    None => pending::<()>().await,
                }
            };

            tokio::select! {
                read = reader.read(&mut chunk) => {
                    match read {
                        Ok(0) => break Some(Fault::Closed),

                        Ok(n) => {
                            read_buf.extend_from_slice(&chunk[..n]);

                            if let Err(e) = Self::route_replies(&codec, &mut read_buf, &mut correlation) {
                                warn!(connection_id = %id, error = %e, "Undecodable data from server");
                                break Some(Fault::Error {
                                    kind: ErrorKind::InvalidData,
                                    message: e.to_string(),
                                });
                            }

                            deadline = Self::next_deadline(call_timeout, &correlation);
                        }

                        Err(e) => break Some(Fault::from_io(&e)),
                    }
                }

                command = command_rx.recv() => {
                    match command {
                        Some(ConnectionCommand::Call { message, response_tx }) => {
                            if let Err(e) = Self::handle_call(
                                message,
                                response_tx,
                                &codec,
                                &mut writer,
                                &mut correlation,
                            ).await {
                                break Some(Fault::from_io(&e));
                            }

                            deadline = Self::next_deadline(call_timeout, &correlation);
                        }

                        Some(ConnectionCommand::Shutdown) | None => {
                            let _ = writer.shutdown().await;
                            break None;
                        }
                    }
                }

                () = timer => break Some(Fault::Timeout { timeout_ms }),
            }
        };

        if let Some(shared) = shared.upgrade() {
            shared.connected.store(false, Ordering::SeqCst);
            if let Some(fault) = &fault {
                shared.emit(fault);
            }
        }

        // Fail outstanding calls after subscribers have seen the fault
        let pending: Vec<_> = correlation.drain().collect();
        for (_, response_tx) in pending {
            let error = fault.as_ref().map_or(Error::ConnectionClosed, Fault::to_error);
            let _ = response_tx.send(Err(error));
        }

        debug!(connection_id = %id, "Event loop terminated");
    }

    /// Writes one call to the socket.
    async fn handle_call(
        message: Message,
        response_tx: oneshot::Sender<Result<Message>>,
        codec: &Codec,
        writer: &mut OwnedWriteHalf,
        correlation: &mut CorrelationMap,
    ) -> std::io::Result<()> {
        let bytes = match codec.encode(&message) {
            Ok(bytes) => bytes,
            Err(e) => {
                let _ = response_tx.send(Err(e));
                return Ok(());
            }
        };

        let seqid = message.seqid;

        if message.expects_reply() {
            correlation.insert(seqid, response_tx);
            writer.write_all(&bytes).await?;
        } else {
            writer.write_all(&bytes).await?;
            let _ = response_tx.send(Ok(Message::reply(message.name, seqid, Value::Null)));
        }

        trace!(seqid, bytes = bytes.len(), "Request sent");
        Ok(())
    }

    /// Routes every complete reply in `buf` to its caller.
    fn route_replies(
        codec: &Codec,
        buf: &mut Vec<u8>,
        correlation: &mut CorrelationMap,
    ) -> Result<()> {
        while let Some(message) = codec.decode(buf)? {
            match correlation.remove(&message.seqid) {
                Some(response_tx) => {
                    trace!(seqid = message.seqid, "Reply received");
                    let _ = response_tx.send(Ok(message));
                }
                None => {
                    warn!(seqid = message.seqid, name = %message.name, "Reply for unknown request");
                }
            }
        }

        Ok(())
    }

    /// Arms the call timer while replies are outstanding.
    fn next_deadline(call_timeout: Option<Duration>, correlation: &CorrelationMap) -> Option<Instant> {
        call_timeout
            .filter(|_| !correlation.is_empty())
            .map(|t| Instant::now() + t)
    }
}

// ============================================================================
// Tests
// ============================================================================
