use std::sync::Arc;

use anyhow::bail;
use async_trait::async_trait;
use bytes::BytesMut;
#[cfg(test)] use mockall::automock;
use tokio::sync::{mpsc, Mutex};

use crate::send_socket::SendSocket;

/// The reliability layer on top of the raw datagram flow: retransmission, ordering and
///  congestion control live behind this trait, outside this crate.
///
/// A connection owns one engine instance for its whole lifetime. [setup](SessionEngine::setup)
///  is called exactly once, after the socket is connected and before the receive pump
///  starts. From then on the pump feeds every raw inbound datagram into
///  [feed_inbound](SessionEngine::feed_inbound), and application traffic goes through
///  [send](SessionEngine::send) / [receive](SessionEngine::receive).
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SessionEngine: Send + Sync + 'static {
    /// Reset sequence counters and windows, and wire the engine's outbound path to the
    ///  connection's raw send.
    async fn setup(&self, outbound: Arc<dyn SendSocket>);

    /// Hand one raw inbound datagram to the engine. The pump does not read the next
    ///  datagram until this returns.
    async fn feed_inbound(&self, buf: &[u8]);

    /// Send application data through the reliability layer.
    async fn send(&self, buf: &[u8]) -> anyhow::Result<()>;

    /// Wait for the next application-level message, appending it to `buf`. Returns `false`
    ///  if the engine cannot produce one any more.
    async fn receive(&self, buf: &mut BytesMut) -> bool;
}

/// An engine without any reliability layer: outbound data goes to the peer as a single
///  datagram, inbound datagrams are handed to the application unchanged and in arrival
///  order. For peers that do their own framing, and for tests.
pub struct PassthroughEngine {
    outbound: Mutex<Option<Arc<dyn SendSocket>>>,
    inbound_sender: mpsc::UnboundedSender<Vec<u8>>,
    inbound: Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
}

impl PassthroughEngine {
    pub fn new() -> PassthroughEngine {
        let (inbound_sender, inbound) = mpsc::unbounded_channel();
        PassthroughEngine {
            outbound: Mutex::new(None),
            inbound_sender,
            inbound: Mutex::new(inbound),
        }
    }
}

#[async_trait]
impl SessionEngine for PassthroughEngine {
    async fn setup(&self, outbound: Arc<dyn SendSocket>) {
        *self.outbound.lock().await = Some(outbound);
    }

    async fn feed_inbound(&self, buf: &[u8]) {
        // the channel is unbounded, so the pump is never blocked here
        self.inbound_sender.send(buf.to_vec()).ok();
    }

    async fn send(&self, buf: &[u8]) -> anyhow::Result<()> {
        let outbound = self.outbound.lock().await.clone();
        match outbound {
            Some(outbound) => outbound.send_packet(buf).await,
            None => bail!("engine was not set up"),
        }
    }

    async fn receive(&self, buf: &mut BytesMut) -> bool {
        match self.inbound.lock().await.recv().await {
            Some(datagram) => {
                buf.extend_from_slice(&datagram);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::send_socket::MockSendSocket;

    #[tokio::test]
    async fn test_passthrough_send() {
        let mut outbound = MockSendSocket::new();
        outbound.expect_send_packet()
            .times(1)
            .returning(|buf| {
                assert_eq!(buf, b"abc");
                Ok(())
            });

        let engine = PassthroughEngine::new();
        engine.setup(Arc::new(outbound)).await;
        engine.send(b"abc").await.unwrap();
    }

    #[tokio::test]
    async fn test_passthrough_send_without_setup() {
        let engine = PassthroughEngine::new();
        assert!(engine.send(b"abc").await.is_err());
    }

    #[tokio::test]
    async fn test_passthrough_inbound_order() {
        let engine = PassthroughEngine::new();
        engine.feed_inbound(&[1, 2, 3]).await;
        engine.feed_inbound(&[4]).await;

        let mut buf = BytesMut::new();
        assert!(engine.receive(&mut buf).await);
        assert_eq!(buf.as_ref(), &[1, 2, 3]);

        let mut buf = BytesMut::new();
        assert!(engine.receive(&mut buf).await);
        assert_eq!(buf.as_ref(), &[4]);
    }
}
