//! Integration tests against a mock BattlEye server.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::seq::SliceRandom;
use rand::thread_rng;
use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time;

use bercon::protocol::checksum;
use bercon::{Client, Config, Error};

const TEST_PASSWORD: &str = "secret";
const TEST_BROADCAST: &str = "server broadcast";

fn test_config() -> Config {
    Config::new().with_timeout(Duration::from_secs(1))
}

/// Frame a payload with the 6-byte header and checksum.
fn frame(payload: &[u8]) -> Vec<u8> {
    let mut raw = vec![0x42, 0x45, 0, 0, 0, 0];
    raw[2..6].copy_from_slice(&checksum(payload).to_le_bytes());
    raw.extend_from_slice(payload);
    raw
}

fn login_response(success: bool) -> Vec<u8> {
    frame(&[0xFF, 0x00, u8::from(success)])
}

fn command_response(sequence: u8, body: &str) -> Vec<u8> {
    let mut payload = vec![0xFF, 0x01, sequence];
    payload.extend_from_slice(body.as_bytes());
    frame(&payload)
}

fn multi_response(sequence: u8, total: u8, index: u8, body: &str) -> Vec<u8> {
    let mut payload = vec![0xFF, 0x01, sequence, 0x00, total, index];
    payload.extend_from_slice(body.as_bytes());
    frame(&payload)
}

fn server_message(sequence: u8, body: &str) -> Vec<u8> {
    let mut payload = vec![0xFF, 0x02, sequence];
    payload.extend_from_slice(body.as_bytes());
    frame(&payload)
}

#[derive(Default)]
struct ServerState {
    keep_alives: AtomicUsize,
    acks: AtomicUsize,
    duplicate_next: AtomicBool,
    multi_response: Mutex<Option<String>>,
    clients: Mutex<Vec<SocketAddr>>,
}

/// Mock BattlEye server: answers logins and commands, broadcasts a console
/// message every 100 ms, and counts keep-alives and acks.
struct MockServer {
    socket: Arc<UdpSocket>,
    state: Arc<ServerState>,
    shutdown: broadcast::Sender<()>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl MockServer {
    async fn start(password: &str) -> Self {
        let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let (shutdown, _) = broadcast::channel(1);
        let state = Arc::new(ServerState::default());

        let server = Self {
            socket,
            state,
            shutdown,
            tasks: Mutex::new(Vec::new()),
        };
        server.spawn_serve(password.to_owned());
        server.spawn_messenger();
        server
    }

    fn addr(&self) -> SocketAddr {
        self.socket.local_addr().unwrap()
    }

    /// Reply to the next non-empty command with the message split on `*`
    /// into fragments, delivered in random order.
    fn set_multi_response(&self, message: &str) {
        *self.state.multi_response.lock() = Some(message.to_owned());
    }

    /// Send the next command reply twice under the same sequence number.
    fn set_duplicate_next(&self) {
        self.state.duplicate_next.store(true, Ordering::SeqCst);
    }

    fn keep_alives(&self) -> usize {
        self.state.keep_alives.load(Ordering::SeqCst)
    }

    fn acks(&self) -> usize {
        self.state.acks.load(Ordering::SeqCst)
    }

    async fn stop(&self) {
        let _ = self.shutdown.send(());
        let tasks: Vec<_> = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            let _ = task.await;
        }
    }

    fn spawn_serve(&self, password: String) {
        let socket = Arc::clone(&self.socket);
        let state = Arc::clone(&self.state);
        let mut shutdown = self.shutdown.subscribe();

        let task = tokio::spawn(async move {
            let mut buf = vec![0u8; 1500];
            loop {
                let (n, addr) = tokio::select! {
                    _ = shutdown.recv() => return,
                    result = socket.recv_from(&mut buf) => match result {
                        Ok(read) => read,
                        Err(_) => return,
                    },
                };
                if n < 9 {
                    continue;
                }

                {
                    let mut clients = state.clients.lock();
                    if !clients.contains(&addr) {
                        clients.push(addr);
                    }
                }

                let raw = &buf[..n];
                match raw[7] {
                    // Login: check the password.
                    0x00 => {
                        let success = &raw[8..] == password.as_bytes();
                        let _ = socket.send_to(&login_response(success), addr).await;
                    }
                    // Command.
                    0x01 => {
                        let sequence = raw[8];
                        if n == 9 {
                            state.keep_alives.fetch_add(1, Ordering::SeqCst);
                            let _ = socket.send_to(&command_response(sequence, ""), addr).await;
                            continue;
                        }

                        let multi = state.multi_response.lock().take();
                        if let Some(message) = multi {
                            let parts: Vec<&str> = message.split('*').collect();
                            let total = parts.len() as u8;
                            let mut order: Vec<usize> = (0..parts.len()).collect();
                            order.shuffle(&mut thread_rng());
                            for index in order {
                                let packet =
                                    multi_response(sequence, total, index as u8, parts[index]);
                                let _ = socket.send_to(&packet, addr).await;
                            }
                            continue;
                        }

                        let command = String::from_utf8_lossy(&raw[9..]).into_owned();
                        let reply = format!("Response to: {command}");
                        let _ = socket.send_to(&command_response(sequence, &reply), addr).await;
                        if state.duplicate_next.swap(false, Ordering::SeqCst) {
                            let duplicate = format!("{reply} (duplicate)");
                            let _ = socket
                                .send_to(&command_response(sequence, &duplicate), addr)
                                .await;
                        }
                    }
                    // Server message ack; no reply expected.
                    0x02 => {
                        state.acks.fetch_add(1, Ordering::SeqCst);
                    }
                    _ => {}
                }
            }
        });
        self.tasks.lock().push(task);
    }

    fn spawn_messenger(&self) {
        let socket = Arc::clone(&self.socket);
        let state = Arc::clone(&self.state);
        let mut shutdown = self.shutdown.subscribe();

        let task = tokio::spawn(async move {
            let mut ticker = time::interval(Duration::from_millis(100));
            let mut sequence: u8 = 0;
            loop {
                tokio::select! {
                    _ = shutdown.recv() => return,
                    _ = ticker.tick() => {}
                }
                let clients: Vec<SocketAddr> = state.clients.lock().clone();
                if clients.is_empty() {
                    continue;
                }
                let packet = server_message(sequence, &format!("{TEST_BROADCAST} {sequence}"));
                for addr in clients {
                    let _ = socket.send_to(&packet, addr).await;
                }
                sequence = sequence.wrapping_add(1);
            }
        });
        self.tasks.lock().push(task);
    }
}

#[tokio::test]
async fn test_login_and_execute_command() {
    let server = MockServer::start(TEST_PASSWORD).await;

    let client = Client::connect(server.addr(), TEST_PASSWORD, test_config())
        .await
        .unwrap();
    let reply = client.exec("version").await.unwrap();
    assert_eq!(reply, "Response to: version");

    client.close().await.unwrap();
    server.stop().await;
}

#[tokio::test]
async fn test_login_rejected_with_wrong_password() {
    let server = MockServer::start(TEST_PASSWORD).await;

    let result = Client::connect(server.addr(), "wrong", test_config()).await;
    assert!(matches!(result, Err(Error::LoginFailed)));

    server.stop().await;
}

#[tokio::test]
async fn test_multi_packet_response_reassembled() {
    let server = MockServer::start(TEST_PASSWORD).await;
    let client = Client::connect(server.addr(), TEST_PASSWORD, test_config())
        .await
        .unwrap();

    server.set_multi_response("part 1 *part 2 *part 3 *part 4 *part 5 *part 6");
    let reply = client.exec("status").await.unwrap();
    assert_eq!(reply, "part 1 part 2 part 3 part 4 part 5 part 6");

    client.close().await.unwrap();
    server.stop().await;
}

#[tokio::test]
async fn test_duplicate_reply_is_dropped() {
    let server = MockServer::start(TEST_PASSWORD).await;
    let client = Client::connect(server.addr(), TEST_PASSWORD, test_config())
        .await
        .unwrap();

    // The duplicate arrives with a sequence number that is already behind
    // the counter, so it must not leak into the next exchange.
    server.set_duplicate_next();
    assert_eq!(client.exec("status").await.unwrap(), "Response to: status");
    assert_eq!(client.exec("players").await.unwrap(), "Response to: players");

    client.close().await.unwrap();
    server.stop().await;
}

#[tokio::test]
async fn test_keep_alive_liveness() {
    let server = MockServer::start(TEST_PASSWORD).await;
    let config = test_config()
        .with_keep_alive(Duration::from_millis(200))
        .with_message_buffer(10);
    let client = Client::connect(server.addr(), TEST_PASSWORD, config)
        .await
        .unwrap();
    let mut messages = client.messages().unwrap();

    time::sleep(Duration::from_secs(1)).await;

    assert!(server.keep_alives() >= 1, "no keep-alive recorded");
    assert!(server.acks() >= 1, "no server message ack recorded");

    let broadcast = time::timeout(Duration::from_secs(1), messages.recv())
        .await
        .expect("no broadcast within a second")
        .expect("message stream ended");
    assert!(broadcast.starts_with(TEST_BROADCAST));

    client.close().await.unwrap();
    server.stop().await;
}

#[tokio::test]
async fn test_close_is_idempotent() {
    let server = MockServer::start(TEST_PASSWORD).await;
    let client = Client::connect(server.addr(), TEST_PASSWORD, test_config())
        .await
        .unwrap();

    client.close().await.unwrap();
    client.close().await.unwrap();

    server.stop().await;
}

#[tokio::test]
async fn test_connect_rejects_zero_message_buffer() {
    let config = test_config().with_message_buffer(0);
    let result = Client::connect("127.0.0.1:2301", TEST_PASSWORD, config).await;
    assert!(matches!(result, Err(Error::InvalidMessageBufferSize)));
}

#[tokio::test]
async fn test_concurrent_execs_get_matching_replies() {
    let server = MockServer::start(TEST_PASSWORD).await;
    let client = Client::connect(server.addr(), TEST_PASSWORD, test_config())
        .await
        .unwrap();

    // The send gate serializes exchanges, so every caller must get the
    // reply to its own command no matter how calls interleave.
    let mut workers = Vec::new();
    for worker in 0..2 {
        let client = client.clone();
        workers.push(tokio::spawn(async move {
            for i in 0..10 {
                let command = format!("cmd-{worker}-{i}");
                let reply = client.exec(&command).await.unwrap();
                assert_eq!(reply, format!("Response to: {command}"));
            }
        }));
    }
    for worker in workers {
        worker.await.unwrap();
    }

    client.close().await.unwrap();
    server.stop().await;
}

#[tokio::test]
async fn test_full_message_buffer_drops_newest() {
    let server = MockServer::start(TEST_PASSWORD).await;
    let config = test_config().with_message_buffer(1);
    let client = Client::connect(server.addr(), TEST_PASSWORD, config)
        .await
        .unwrap();

    // Broadcasts arrive every 100 ms into a single-slot queue that nobody
    // drains: the first one sticks, the rest are dropped.
    time::sleep(Duration::from_millis(650)).await;

    let mut messages = client.messages().unwrap();
    let first = messages.recv().await.unwrap();
    assert_eq!(first, format!("{TEST_BROADCAST} 0"));

    // Draining frees the slot; the next arrival is a later broadcast, not
    // one of the dropped ones.
    let next = time::timeout(Duration::from_secs(1), messages.recv())
        .await
        .expect("no broadcast within a second")
        .expect("message stream ended");
    let sequence: u8 = next
        .strip_prefix(&format!("{TEST_BROADCAST} "))
        .and_then(|s| s.parse().ok())
        .expect("malformed broadcast");
    assert!(sequence > 1);

    client.close().await.unwrap();
    server.stop().await;
}
