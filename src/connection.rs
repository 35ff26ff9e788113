use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::bail;
use async_trait::async_trait;
use bytes::BytesMut;
use tokio::net::UdpSocket;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::config::SessionConfig;
use crate::error::ConnectError;
use crate::handshake;
use crate::receive_pump::ReceivePump;
use crate::send_socket::SendSocket;
use crate::session::SessionEngine;
use crate::socket;

/// Lifecycle of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Socket is connected and the pump is running, but the handshake has not completed.
    Connecting,
    /// Handshake completed, the connection is usable.
    Open,
    /// Disconnected. Terminal.
    Closed,
}

/// State and socket live under one lock so that state transitions and socket release are
///  atomic: whoever observes [ConnectionState::Closed] will never get the socket handed out.
pub(crate) struct Lifecycle {
    state: ConnectionState,
    socket: Option<Arc<UdpSocket>>,
}

impl Lifecycle {
    pub(crate) fn new(socket: Arc<UdpSocket>) -> Lifecycle {
        Lifecycle {
            state: ConnectionState::Connecting,
            socket: Some(socket),
        }
    }

    pub(crate) fn state(&self) -> ConnectionState {
        self.state
    }

    fn mark_open(&mut self) {
        self.state = ConnectionState::Open;
    }

    /// Transition to [ConnectionState::Closed], releasing this connection's reference to
    ///  the socket. Safe to call repeatedly.
    fn close(&mut self) {
        self.state = ConnectionState::Closed;
        self.socket = None;
    }

    fn send_socket(&self) -> anyhow::Result<Arc<UdpSocket>> {
        match (self.state, &self.socket) {
            (ConnectionState::Closed, _) | (_, None) => bail!("connection is closed"),
            (_, Some(socket)) => Ok(socket.clone()),
        }
    }
}

/// The outbound sink handed to the session engine at setup time. It goes through the
///  connection's lifecycle, so engine sends fail once the connection is closed.
struct RawSender {
    lifecycle: Arc<Mutex<Lifecycle>>,
}

#[async_trait]
impl SendSocket for RawSender {
    async fn send_packet(&self, packet_buf: &[u8]) -> anyhow::Result<()> {
        let socket = self.lifecycle.lock().await.send_socket()?;
        socket.send_packet(packet_buf).await
    }
}

/// A client connection over UDP: owns the socket, the remote endpoint, the session engine
///  and the background receive pump.
///
/// A `Connection` only exists in connected form - [connect](Connection::connect) is the
///  sole constructor and performs the full establishment sequence, so a caller holding a
///  `Connection` knows the peer was reachable at that point.
pub struct Connection {
    peer_addr: SocketAddr,
    engine: Arc<dyn SessionEngine>,
    lifecycle: Arc<Mutex<Lifecycle>>,
    cancel_sender: broadcast::Sender<()>,
    pump_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Connection {
    /// Establish a connection: resolve the host, connect the socket, set up the session
    ///  engine, start the receive pump and perform the handshake. Returns only once the
    ///  peer has demonstrated reachability by answering the handshake greeting.
    ///
    /// On handshake failure the pump is torn down before this returns - a failed connect
    ///  leaves no background activity behind.
    pub async fn connect(
        host: &str,
        port: u16,
        engine: Arc<dyn SessionEngine>,
        config: Arc<SessionConfig>,
    ) -> Result<Connection, ConnectError> {
        config.validate().map_err(ConnectError::Config)?;

        let peer_addr = socket::resolve(host, port).await?;
        let udp_socket = Arc::new(socket::connect_socket(peer_addr, &config)?);
        info!("connected UDP socket to {:?}", peer_addr);

        let lifecycle = Arc::new(Mutex::new(Lifecycle::new(udp_socket.clone())));
        let (cancel_sender, cancel_receiver) = broadcast::channel(1);

        engine.setup(Arc::new(RawSender { lifecycle: lifecycle.clone() })).await;

        let pump = ReceivePump::new(
            udp_socket,
            engine.clone(),
            lifecycle.clone(),
            cancel_receiver,
            config.recv_buffer_size,
        );
        let connection = Connection {
            peer_addr,
            engine,
            lifecycle,
            cancel_sender,
            pump_handle: Mutex::new(Some(pump.spawn())),
        };

        if let Err(e) = handshake::perform(connection.engine.as_ref(), &config, peer_addr).await {
            connection.disconnect().await;
            return Err(e);
        }

        connection.lifecycle.lock().await.mark_open();
        debug!("handshake complete, connection to {:?} is open", peer_addr);
        Ok(connection)
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub async fn state(&self) -> ConnectionState {
        self.lifecycle.lock().await.state()
    }

    pub async fn is_open(&self) -> bool {
        self.state().await == ConnectionState::Open
    }

    /// Send one raw datagram to the peer, bypassing the session engine. Valid while the
    ///  connection is not closed; may run concurrently with the receive pump - tokio's
    ///  `UdpSocket` tolerates one sender and one receiver in parallel.
    pub async fn raw_send(&self, buf: &[u8]) -> anyhow::Result<()> {
        let socket = self.lifecycle.lock().await.send_socket()?;
        socket.send_packet(buf).await
    }

    /// Hand one raw inbound datagram to the session engine. This is the path the receive
    ///  pump routes every datagram through; datagrams arriving on a closed connection are
    ///  dropped.
    pub async fn raw_input(&self, buf: &[u8]) {
        if self.lifecycle.lock().await.state() == ConnectionState::Closed {
            trace!("dropping {} inbound bytes on closed connection", buf.len());
            return;
        }
        self.engine.feed_inbound(buf).await;
    }

    /// Send application data through the session engine.
    pub async fn send(&self, buf: &[u8]) -> anyhow::Result<()> {
        self.engine.send(buf).await
    }

    /// Wait for the next application message from the session engine, appending it to
    ///  `buf`. Returns `false` if the engine cannot produce one any more.
    pub async fn receive(&self, buf: &mut BytesMut) -> bool {
        self.engine.receive(buf).await
    }

    /// Close the connection. The first call transitions to [ConnectionState::Closed] and
    ///  releases the socket in one critical section, then signals the receive pump and
    ///  waits for it to terminate. Subsequent calls do nothing.
    pub async fn disconnect(&self) {
        {
            let mut lifecycle = self.lifecycle.lock().await;
            if lifecycle.state() == ConnectionState::Closed {
                trace!("disconnect on a closed connection - nothing to do");
                return;
            }
            lifecycle.close();
        }

        // the pump may have exited on its own already, in which case there is no receiver
        self.cancel_sender.send(()).ok();

        let pump_handle = self.pump_handle.lock().await.take();
        if let Some(handle) = pump_handle {
            if let Err(e) = handle.await {
                warn!("receive pump did not terminate cleanly: {}", e);
            }
        }
        info!("connection to {:?} closed", self.peer_addr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::PassthroughEngine;
    use std::time::Duration;
    use tokio::time::timeout;

    fn test_config(handshake_timeout: Option<Duration>) -> Arc<SessionConfig> {
        Arc::new(SessionConfig {
            recv_buffer_size: 1472,
            handshake_timeout,
            dual_stack: true,
        })
    }

    /// Bind a peer socket on localhost. With `echo` set, every received datagram is sent
    ///  straight back; without it the peer stays silent. The socket is moved into a task,
    ///  which keeps it alive (and the port reachable) until the test process ends.
    async fn spawn_peer(echo: bool) -> SocketAddr {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let peer_addr = socket.local_addr().unwrap();

        tokio::spawn(async move {
            let mut buf = [0u8; 1500];
            loop {
                let (num_read, from) = socket.recv_from(&mut buf).await.unwrap();
                if echo {
                    socket.send_to(&buf[..num_read], from).await.unwrap();
                }
            }
        });
        peer_addr
    }

    #[tokio::test]
    async fn test_connect_and_disconnect() {
        let peer_addr = spawn_peer(true).await;

        let connection = Connection::connect(
            "127.0.0.1",
            peer_addr.port(),
            Arc::new(PassthroughEngine::new()),
            test_config(Some(Duration::from_secs(5))),
        ).await.unwrap();

        assert!(connection.is_open().await);
        assert_eq!(connection.peer_addr(), peer_addr);

        connection.disconnect().await;
        assert_eq!(connection.state().await, ConnectionState::Closed);

        // idempotent
        connection.disconnect().await;
        assert_eq!(connection.state().await, ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_connect_silent_peer() {
        let peer_addr = spawn_peer(false).await;

        let result = Connection::connect(
            "127.0.0.1",
            peer_addr.port(),
            Arc::new(PassthroughEngine::new()),
            test_config(Some(Duration::from_millis(200))),
        ).await;

        match result {
            Err(ConnectError::HandshakeFailed { peer }) => assert_eq!(peer, peer_addr),
            Ok(_) => panic!("expected HandshakeFailed, connect succeeded"),
            Err(other) => panic!("expected HandshakeFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_connect_host_not_found() {
        let result = Connection::connect(
            "",
            7777,
            Arc::new(PassthroughEngine::new()),
            test_config(Some(Duration::from_secs(1))),
        ).await;

        assert!(matches!(result, Err(ConnectError::HostNotFound { .. })));
    }

    #[tokio::test]
    async fn test_raw_send_reaches_peer_unmodified() {
        let peer_addr = spawn_peer(true).await;
        let engine = Arc::new(PassthroughEngine::new());

        let connection = Connection::connect(
            "127.0.0.1",
            peer_addr.port(),
            engine.clone(),
            test_config(Some(Duration::from_secs(5))),
        ).await.unwrap();

        // the echo peer reflects whatever raw_send puts on the wire, and the pump routes
        //  it back through the passthrough engine - length for length, byte for byte
        for payload in [&[1u8, 2, 3] as &[u8], &[42], &[0; 100]] {
            connection.raw_send(payload).await.unwrap();

            let mut buf = BytesMut::new();
            assert!(timeout(Duration::from_secs(5), connection.receive(&mut buf)).await.unwrap());
            assert_eq!(buf.as_ref(), payload);
        }

        connection.disconnect().await;
    }

    #[tokio::test]
    async fn test_disconnect_terminates_pump_mid_read() {
        let peer_addr = spawn_peer(true).await;

        let connection = Connection::connect(
            "127.0.0.1",
            peer_addr.port(),
            Arc::new(PassthroughEngine::new()),
            test_config(Some(Duration::from_secs(5))),
        ).await.unwrap();

        // no traffic in flight, so the pump is blocked on a read; disconnect must still
        //  complete, and it only returns after the pump terminated
        timeout(Duration::from_secs(5), connection.disconnect()).await.unwrap();
        assert!(connection.pump_handle.lock().await.is_none());
    }

    #[tokio::test]
    async fn test_raw_send_after_disconnect_fails() {
        let peer_addr = spawn_peer(true).await;

        let connection = Connection::connect(
            "127.0.0.1",
            peer_addr.port(),
            Arc::new(PassthroughEngine::new()),
            test_config(Some(Duration::from_secs(5))),
        ).await.unwrap();

        connection.disconnect().await;
        assert!(connection.raw_send(&[1, 2, 3]).await.is_err());
    }

    #[tokio::test]
    async fn test_raw_input_dropped_after_disconnect() {
        let peer_addr = spawn_peer(true).await;
        let engine = Arc::new(PassthroughEngine::new());

        let connection = Connection::connect(
            "127.0.0.1",
            peer_addr.port(),
            engine.clone(),
            test_config(Some(Duration::from_secs(5))),
        ).await.unwrap();

        connection.disconnect().await;
        connection.raw_input(&[9, 9, 9]).await;

        // nothing must have reached the engine
        let mut buf = BytesMut::new();
        assert!(timeout(Duration::from_millis(100), engine.receive(&mut buf)).await.is_err());
    }
}
