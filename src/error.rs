use std::net::SocketAddr;

/// The ways [connect](crate::connection::Connection::connect) can fail. Callers are
///  expected to match on these - "the name does not exist" and "the peer did not answer"
///  call for different handling.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    /// Name resolution yielded no usable address. No socket is created and no datagram is
    ///  sent when this is returned.
    #[error("host {host:?} did not resolve to any address")]
    HostNotFound { host: String },

    /// The handshake greeting was sent but no reply was observed, either because the
    ///  engine reported a failed receive or because the configured wait bound elapsed.
    ///  The connection never became usable.
    #[error("no handshake reply from {peer}")]
    HandshakeFailed { peer: SocketAddr },

    #[error("invalid configuration: {0}")]
    Config(anyhow::Error),

    #[error("socket setup failed: {0}")]
    Io(#[from] std::io::Error),
}
