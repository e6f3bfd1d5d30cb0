//! Inbound datagram pump.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc};
use tokio::time;
use tracing::{debug, trace};

use super::sequence::SequenceCounter;
use crate::error::Error;
use crate::protocol::{self, FragmentBuffer, Packet, Response};
use crate::MAX_MTU;

/// Receiver half of the client: the sole reader of the socket and the sole
/// writer to the reply, login, error and message channels.
pub(super) struct Receiver {
    pub socket: Arc<UdpSocket>,
    pub timeout: Duration,
    pub sequence: Arc<SequenceCounter>,
    pub replies: mpsc::Sender<String>,
    pub login: mpsc::Sender<bool>,
    pub errors: mpsc::Sender<Error>,
    pub messages: mpsc::Sender<String>,
    pub shutdown: broadcast::Receiver<()>,
}

impl Receiver {
    pub async fn run(mut self) {
        let mut buf = vec![0u8; MAX_MTU];
        let mut fragments = FragmentBuffer::new();

        loop {
            let read = tokio::select! {
                _ = self.shutdown.recv() => return,
                read = time::timeout(self.timeout, self.socket.recv(&mut buf)) => read,
            };

            let n = match read {
                // Read deadline elapsed with nothing on the wire; the
                // deadline only exists to keep the loop responsive.
                Err(_) => continue,
                Ok(Err(e)) => {
                    self.report(Error::Io(e));
                    continue;
                }
                Ok(Ok(n)) => n,
            };

            match protocol::decode(&buf[..n]) {
                Ok(response) => {
                    if self.route(response, &mut fragments).await {
                        return;
                    }
                }
                Err(e) => self.report(e),
            }
        }
    }

    /// Route one decoded response. Returns `true` when shutdown was
    /// observed while publishing a reply.
    async fn route(&mut self, response: Response, fragments: &mut FragmentBuffer) -> bool {
        match response {
            Response::Login(success) => {
                // Single-shot: only the connect sequence listens. Anything
                // past the first outcome is dropped.
                let _ = self.login.try_send(success);
            }
            Response::Command(reply) => {
                // A reply for any other sequence number is stale or
                // unsolicited.
                if reply.sequence != self.sequence.current() {
                    trace!(sequence = reply.sequence, "dropping out-of-sequence reply");
                    return false;
                }

                let body = match reply.multi {
                    None => Some(reply.body),
                    Some(_) => fragments.push(reply),
                };
                if let Some(body) = body {
                    self.sequence.advance();
                    return self.publish(body).await;
                }
            }
            Response::Message(message) => {
                // Bounded queue; a full buffer drops the newest broadcast.
                if let Err(TrySendError::Full(_)) = self.messages.try_send(message.body) {
                    debug!("message buffer full, dropping broadcast");
                }
                // The server expects its sequence number echoed back. It
                // never replies to the ack, and write errors are ignored.
                let ack = Packet::message_ack(message.sequence);
                let _ = self.socket.send(&ack.encode()).await;
            }
        }
        false
    }

    /// Hand a complete reply to the pending exchange. Blocks until the
    /// dispatcher takes it or the client shuts down.
    async fn publish(&mut self, body: String) -> bool {
        tokio::select! {
            _ = self.shutdown.recv() => true,
            _ = self.replies.send(body) => false,
        }
    }

    fn report(&self, error: Error) {
        debug!(%error, "receive error");
        // Non-blocking: with no exchange pending there is nobody to tell,
        // and the read loop must stay live.
        let _ = self.errors.try_send(error);
    }
}
