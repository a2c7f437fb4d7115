//! The contract between greenroom and the socket layer.
//!
//! Framing, TLS and the actual sockets live outside this workspace. What the
//! engine needs from them is small:
//!
//! - a [`Client`] handle per TCP connection: identity, peer address, a
//!   liveness flag, and a queue to push answers into;
//! - a [`UdpPeer`] per inbound datagram, to reply to its sender;
//! - two ordered event streams, [`TcpEvent`] and [`UdpEvent`].
//!
//! The socket layer owns the receiving end of every outbound queue and is
//! the only party that serializes packets onto the wire.

mod error;

pub use error::TransportError;

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use greenroom_protocol::{Answer, Command, FrameFlag, Packet, Verb};
use tokio::sync::{mpsc, watch};

/// Opaque identifier for a TCP connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Receiving end of a client's outbound queue, held by the socket layer.
pub type ClientOutbox = mpsc::UnboundedReceiver<Packet>;

/// Handle to one live TCP connection.
///
/// Shared as `Arc<Client>` between the socket layer, the session table,
/// in-flight handlers and the game registry (which records the owning
/// connection of every advertised game). The liveness flag is a
/// [`watch`] channel so long-running tasks such as the heartbeat can both
/// poll it and be woken the moment it flips.
#[derive(Debug)]
pub struct Client {
    id: ConnectionId,
    addr: SocketAddr,
    active: watch::Sender<bool>,
    outbound: mpsc::UnboundedSender<Packet>,
}

impl Client {
    /// Creates an active client handle and the outbox the socket layer
    /// drains to write packets to the wire.
    pub fn new(id: ConnectionId, addr: SocketAddr) -> (Arc<Self>, ClientOutbox) {
        let (outbound, outbox) = mpsc::unbounded_channel();
        let (active, _) = watch::channel(true);
        let client = Arc::new(Self {
            id,
            addr,
            active,
            outbound,
        });
        (client, outbox)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Remote address of the connection.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// `false` once the connection has been closed by either side.
    pub fn is_active(&self) -> bool {
        *self.active.borrow()
    }

    /// Flips the liveness flag. Idempotent.
    pub fn mark_inactive(&self) {
        self.active.send_replace(false);
    }

    /// Subscribes to liveness changes.
    pub fn liveness(&self) -> watch::Receiver<bool> {
        self.active.subscribe()
    }

    /// Queues an answer for the socket layer.
    ///
    /// # Errors
    /// [`TransportError::ConnectionClosed`] when the client is inactive or
    /// the socket layer has dropped its outbox.
    pub fn write(
        &self,
        query: &str,
        answer: Answer,
        flag: FrameFlag,
    ) -> Result<(), TransportError> {
        if !self.is_active() {
            return Err(TransportError::ConnectionClosed(self.id.to_string()));
        }
        self.outbound
            .send(Packet::new(query, answer, flag))
            .map_err(|_| TransportError::ConnectionClosed(self.id.to_string()))
    }
}

// ---------------------------------------------------------------------------
// UdpPeer
// ---------------------------------------------------------------------------

/// Receiving end of the UDP socket's outbound queue.
pub type DatagramOutbox = mpsc::UnboundedReceiver<(SocketAddr, Packet)>;

/// Sender of one inbound datagram, with a way to answer it.
#[derive(Debug, Clone)]
pub struct UdpPeer {
    addr: SocketAddr,
    outbound: mpsc::UnboundedSender<(SocketAddr, Packet)>,
}

impl UdpPeer {
    pub fn new(addr: SocketAddr, outbound: mpsc::UnboundedSender<(SocketAddr, Packet)>) -> Self {
        Self { addr, outbound }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Queues a datagram back to this peer.
    pub fn write(
        &self,
        query: &str,
        answer: Answer,
        flag: FrameFlag,
    ) -> Result<(), TransportError> {
        self.outbound
            .send((self.addr, Packet::new(query, answer, flag)))
            .map_err(|_| TransportError::PeerUnreachable(self.addr))
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Events emitted by the TCP socket layer, in arrival order per client.
#[derive(Debug)]
pub enum TcpEvent {
    /// A connection was accepted.
    NewClient(Arc<Client>),
    /// A decoded command arrived on a connection.
    Command { client: Arc<Client>, command: Command },
    /// The connection is gone. Always the last event for a client.
    Close(Arc<Client>),
    /// The socket layer hit an error on a connection (decode failure,
    /// reset...). Informational; a `Close` follows if the connection died.
    Error { client: Arc<Client>, error: String },
}

impl TcpEvent {
    /// The discriminated event name (`newClient`, `client.command.CGAM`,
    /// `client.command`, `client.close`, `client.error`).
    pub fn name(&self) -> String {
        match self {
            TcpEvent::NewClient(_) => "newClient".to_string(),
            TcpEvent::Command { command, .. } => match Verb::of(command) {
                Some(verb) => format!("client.command.{verb}"),
                None => "client.command".to_string(),
            },
            TcpEvent::Close(_) => "client.close".to_string(),
            TcpEvent::Error { .. } => "client.error".to_string(),
        }
    }
}

/// Events emitted by the UDP socket layer.
#[derive(Debug)]
pub enum UdpEvent {
    Command { peer: UdpPeer, command: Command },
}

impl UdpEvent {
    /// `command.ECHO` for keep-alive probes, `command` otherwise.
    pub fn name(&self) -> String {
        match self {
            UdpEvent::Command { command, .. } => match Verb::of(command) {
                Some(Verb::Echo) => "command.ECHO".to_string(),
                _ => "command".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> SocketAddr {
        "10.0.0.5:27015".parse().unwrap()
    }

    #[test]
    fn test_connection_id_display() {
        let id = ConnectionId::new(7);
        assert_eq!(id.to_string(), "conn-7");
        assert_eq!(id.into_inner(), 7);
    }

    #[test]
    fn test_client_write_reaches_outbox() {
        let (client, mut outbox) = Client::new(ConnectionId::new(1), addr());
        client
            .write("PING", Answer::new().with("TID", 0), FrameFlag::PLAIN)
            .unwrap();

        let packet = outbox.try_recv().unwrap();
        assert_eq!(packet.query, "PING");
        assert_eq!(packet.answer.get("TID"), Some("0"));
        assert_eq!(packet.flag, FrameFlag::PLAIN);
    }

    #[test]
    fn test_client_write_after_inactive_fails() {
        let (client, mut outbox) = Client::new(ConnectionId::new(1), addr());
        client.mark_inactive();
        assert!(!client.is_active());

        let err = client
            .write("PING", Answer::new(), FrameFlag::PLAIN)
            .unwrap_err();
        assert!(matches!(err, TransportError::ConnectionClosed(_)));
        assert!(outbox.try_recv().is_err());
    }

    #[test]
    fn test_client_write_after_outbox_dropped_fails() {
        let (client, outbox) = Client::new(ConnectionId::new(1), addr());
        drop(outbox);
        assert!(client.write("PING", Answer::new(), FrameFlag::PLAIN).is_err());
    }

    #[tokio::test]
    async fn test_liveness_subscriber_sees_mark_inactive() {
        let (client, _outbox) = Client::new(ConnectionId::new(1), addr());
        let mut liveness = client.liveness();
        assert!(*liveness.borrow());

        client.mark_inactive();
        liveness.changed().await.unwrap();
        assert!(!*liveness.borrow());
    }

    #[test]
    fn test_udp_peer_write_tags_datagram_with_addr() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let peer = UdpPeer::new(addr(), tx);
        peer.write("ECHO", Answer::new(), FrameFlag::PLAIN).unwrap();
        let (to, packet) = rx.try_recv().unwrap();
        assert_eq!(to, addr());
        assert_eq!(packet.query, "ECHO");
    }

    #[test]
    fn test_tcp_event_names() {
        let (client, _outbox) = Client::new(ConnectionId::new(1), addr());
        let cgam = TcpEvent::Command {
            client: Arc::clone(&client),
            command: Command::new("CGAM"),
        };
        let unknown = TcpEvent::Command {
            client: Arc::clone(&client),
            command: Command::new("QENT"),
        };
        assert_eq!(TcpEvent::NewClient(Arc::clone(&client)).name(), "newClient");
        assert_eq!(cgam.name(), "client.command.CGAM");
        assert_eq!(unknown.name(), "client.command");
        assert_eq!(TcpEvent::Close(client).name(), "client.close");
    }

    #[test]
    fn test_udp_event_names() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let echo = UdpEvent::Command {
            peer: UdpPeer::new(addr(), tx.clone()),
            command: Command::new("ECHO"),
        };
        let other = UdpEvent::Command {
            peer: UdpPeer::new(addr(), tx),
            command: Command::new("PING"),
        };
        assert_eq!(echo.name(), "command.ECHO");
        assert_eq!(other.name(), "command");
    }
}
