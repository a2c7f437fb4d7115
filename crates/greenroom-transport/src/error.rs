use std::net::SocketAddr;

/// Errors that can occur when handing packets to the socket layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection was closed (or flagged inactive) before the write.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// The UDP socket task is gone, so the datagram cannot be sent.
    #[error("udp socket closed, cannot reach {0}")]
    PeerUnreachable(SocketAddr),
}
