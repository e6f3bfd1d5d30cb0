//! BattlEye RCON client runtime.
//!
//! Three tasks cooperate per client: the caller(s) of [`Client::exec`], the
//! receiver task owning the read half of the socket, and the keep-alive
//! task. They share a small fixed graph of state (socket, sequence counter,
//! last-send timestamp, shutdown broadcast), all owned by the client handle.

mod receiver;
mod sequence;

pub use sequence::SequenceCounter;

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::net::{lookup_host, ToSocketAddrs, UdpSocket};
use tokio::sync::{broadcast, mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::protocol::Packet;
use crate::DISCONNECT_TIMEOUT;

use receiver::Receiver;

/// Cadence at which the keep-alive task inspects the last-send timestamp.
/// Shortened to the keep-alive interval itself when that is smaller.
const KEEP_ALIVE_CHECK: Duration = Duration::from_secs(1);

/// Capacity of the internal error channel. The receiver never blocks on
/// it; an error observed with no exchange pending is dropped.
const ERROR_CHANNEL_CAPACITY: usize = 1;

/// Async BattlEye RCON client.
///
/// Cloning yields another handle to the same connection. The client keeps
/// the association alive in the background; [`Client::close`] shuts it
/// down. A client whose exchanges keep timing out is considered
/// disconnected by the server and should be replaced, not retried.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

struct Inner {
    socket: Arc<UdpSocket>,
    config: Config,
    sequence: Arc<SequenceCounter>,
    /// Send gate. Locking the exchange serializes commands on the wire and
    /// grants access to the reply and error channels.
    exchange: AsyncMutex<Exchange>,
    /// Stamped on every outbound command; read by the keep-alive task.
    last_send: Mutex<Instant>,
    messages: Mutex<Option<mpsc::Receiver<String>>>,
    shutdown: broadcast::Sender<()>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
}

/// Receiving ends of the channels the receiver task publishes to. Lives
/// behind the send gate: whoever holds the gate owns the pending exchange.
struct Exchange {
    replies: mpsc::Receiver<String>,
    errors: mpsc::Receiver<Error>,
}

impl Client {
    /// Connect to a BattlEye server at `addr` and authenticate with
    /// `password`.
    ///
    /// On success the receiver and keep-alive tasks are running and the
    /// client is ready for [`Client::exec`]. On failure (bad credentials,
    /// timeout, I/O error) the partially-built client is torn down before
    /// the error is returned.
    pub async fn connect<A: ToSocketAddrs>(addr: A, password: &str, config: Config) -> Result<Self> {
        config.validate()?;

        let remote = lookup_host(addr).await?.next().ok_or_else(|| {
            io::Error::new(io::ErrorKind::AddrNotAvailable, "no address resolved")
        })?;

        // Match the bind family to the remote address.
        let bind: SocketAddr = if remote.is_ipv6() {
            SocketAddr::from(([0u8; 16], 0))
        } else {
            SocketAddr::from(([0u8; 4], 0))
        };
        let socket = UdpSocket::bind(bind).await?;
        socket.connect(remote).await?;
        let socket = Arc::new(socket);

        let sequence = Arc::new(SequenceCounter::new());
        let (reply_tx, reply_rx) = mpsc::channel(1);
        let (login_tx, mut login_rx) = mpsc::channel(1);
        let (error_tx, error_rx) = mpsc::channel(ERROR_CHANNEL_CAPACITY);
        let (message_tx, message_rx) = mpsc::channel(config.message_buffer);
        let (shutdown_tx, _) = broadcast::channel(1);

        let receiver = Receiver {
            socket: Arc::clone(&socket),
            timeout: config.timeout,
            sequence: Arc::clone(&sequence),
            replies: reply_tx,
            login: login_tx,
            errors: error_tx,
            messages: message_tx,
            shutdown: shutdown_tx.subscribe(),
        };
        let receiver_task = tokio::spawn(receiver.run());

        let keep_alive_interval = config.keep_alive;
        let client = Self {
            inner: Arc::new(Inner {
                socket,
                config,
                sequence,
                exchange: AsyncMutex::new(Exchange {
                    replies: reply_rx,
                    errors: error_rx,
                }),
                last_send: Mutex::new(Instant::now()),
                messages: Mutex::new(Some(message_rx)),
                shutdown: shutdown_tx,
                tasks: Mutex::new(vec![receiver_task]),
                closed: AtomicBool::new(false),
            }),
        };

        if let Err(e) = client.authenticate(password, &mut login_rx).await {
            let _ = client.close().await;
            return Err(e);
        }
        debug!(%remote, "logged in");

        let task = tokio::spawn(keep_alive(
            Arc::downgrade(&client.inner),
            keep_alive_interval,
            client.inner.shutdown.subscribe(),
        ));
        client.inner.tasks.lock().push(task);

        Ok(client)
    }

    /// Execute `command` on the server and return its reply, reassembled if
    /// the server split it across packets.
    ///
    /// Exchanges are serialized: concurrent calls queue on the send gate,
    /// so request/reply order on the wire is strictly FIFO. Timed-out
    /// attempts are retried for up to 45 seconds, after which
    /// [`Error::Timeout`] is returned and the client should be discarded.
    pub async fn exec(&self, command: &str) -> Result<String> {
        self.inner.exec(command).await
    }

    /// Take the stream of console messages broadcast by the server.
    ///
    /// The stream is bounded by [`Config::message_buffer`]; while it is
    /// full, new broadcasts are dropped. Draining it is the caller's job.
    /// The stream ends when the client is closed. There is only one
    /// stream, so every call after the first returns `None`.
    pub fn messages(&self) -> Option<mpsc::Receiver<String>> {
        self.inner.messages.lock().take()
    }

    /// Shut the client down: stop the receiver and keep-alive tasks and end
    /// the message stream. Idempotent; closing an already-closed client is
    /// a no-op.
    pub async fn close(&self) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        debug!("closing client");

        let _ = self.inner.shutdown.send(());
        let tasks: Vec<_> = std::mem::take(&mut *self.inner.tasks.lock());
        for task in tasks {
            if let Err(error) = task.await {
                warn!(%error, "client task failed");
            }
        }
        Ok(())
    }

    /// Wait for the login outcome, bounded by the I/O timeout.
    async fn authenticate(&self, password: &str, login: &mut mpsc::Receiver<bool>) -> Result<()> {
        self.inner.write(&Packet::login(password)).await?;

        let mut exchange = self.inner.exchange.lock().await;
        tokio::select! {
            _ = time::sleep(self.inner.config.timeout) => Err(Error::Timeout),
            error = exchange.errors.recv() => Err(error.unwrap_or(Error::Closed)),
            outcome = login.recv() => match outcome {
                Some(true) => Ok(()),
                Some(false) => Err(Error::LoginFailed),
                None => Err(Error::Closed),
            },
        }
    }
}

impl Inner {
    async fn exec(&self, command: &str) -> Result<String> {
        // Send gate: at most one exchange in flight, across all callers.
        let mut exchange = self.exchange.lock().await;

        let deadline = Instant::now() + DISCONNECT_TIMEOUT;
        while Instant::now() < deadline {
            match self.send(command, &mut exchange).await {
                // An I/O timeout inside the window is retried with the
                // same sequence number.
                Err(e) if e.is_retryable() => continue,
                result => return result,
            }
        }
        Err(Error::Timeout)
    }

    /// One attempt: transmit the command stamped with the current sequence
    /// number and wait for the matching reply, an internal error, or the
    /// I/O timeout.
    async fn send(&self, command: &str, exchange: &mut Exchange) -> Result<String> {
        self.write(&Packet::command(self.sequence.current(), command))
            .await?;
        *self.last_send.lock() = Instant::now();

        tokio::select! {
            _ = time::sleep(self.config.timeout) => Err(Error::Timeout),
            error = exchange.errors.recv() => Err(error.unwrap_or(Error::Closed)),
            reply = exchange.replies.recv() => reply.ok_or(Error::Closed),
        }
    }

    async fn write(&self, packet: &Packet) -> Result<()> {
        let raw = packet.encode();
        match time::timeout(self.config.timeout, self.socket.send(&raw)).await {
            Err(_) => Err(Error::Timeout),
            Ok(Err(e)) => Err(Error::Io(e)),
            Ok(Ok(_)) => Ok(()),
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        // Last handle dropped without an explicit close: the tasks must not
        // outlive the client.
        let _ = self.shutdown.send(());
    }
}

// Abbreviated output; channel and task state is not useful in logs.
impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("peer", &self.inner.socket.peer_addr().ok())
            .field("closed", &self.inner.closed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// Periodically send an empty command when the connection has been idle
/// for longer than the keep-alive interval, so the server does not drop
/// the client at its 45 second threshold.
async fn keep_alive(client: Weak<Inner>, interval: Duration, mut shutdown: broadcast::Receiver<()>) {
    let period = KEEP_ALIVE_CHECK.min(interval).max(Duration::from_millis(1));
    let mut ticker = time::interval(period);
    // A slow exchange can swallow several ticks; do not replay them.
    ticker.set_missed_tick_behavior(time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.recv() => return,
            _ = ticker.tick() => {}
        }
        let Some(inner) = client.upgrade() else { return };

        // Read the timestamp separately so the lock is not held across the
        // exchange.
        let idle = inner.last_send.lock().elapsed();
        if idle > interval {
            // Empty command. The reply body is worthless and errors only
            // rate a log line.
            if let Err(error) = inner.exec("").await {
                debug!(%error, "keep-alive failed");
            }
        }
    }
}
