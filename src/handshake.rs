use std::net::SocketAddr;

use bytes::BytesMut;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::SessionConfig;
use crate::error::ConnectError;
use crate::session::SessionEngine;

/// The greeting sent to the peer once the receive pump is running. Any reply datagram
///  completes the handshake - the reply's content is not checked.
pub const HELLO: &[u8] = b"Hello";

/// One round trip to confirm bidirectional reachability: send the greeting, then wait for
///  the first message the engine produces, bounded by the configured timeout. A single
///  attempt - no retry, and the handshake is never re-entered after it completed.
pub async fn perform(
    engine: &dyn SessionEngine,
    config: &SessionConfig,
    peer_addr: SocketAddr,
) -> Result<(), ConnectError> {
    if let Err(e) = engine.send(HELLO).await {
        warn!("could not send handshake greeting to {:?}: {}", peer_addr, e);
        return Err(ConnectError::HandshakeFailed { peer: peer_addr });
    }
    debug!("sent handshake greeting to {:?}, waiting for a reply", peer_addr);

    let mut reply_buf = BytesMut::new();
    let replied = match config.handshake_timeout {
        Some(bound) => timeout(bound, engine.receive(&mut reply_buf))
            .await
            .unwrap_or(false),
        None => engine.receive(&mut reply_buf).await,
    };

    if !replied {
        warn!("no handshake reply from {:?}", peer_addr);
        return Err(ConnectError::HandshakeFailed { peer: peer_addr });
    }

    debug!("handshake reply ({} bytes) from {:?}", reply_buf.len(), peer_addr);
    Ok(())
}
