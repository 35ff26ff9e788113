use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, span, trace, Instrument, Level};
use uuid::Uuid;

use crate::connection::{ConnectionState, Lifecycle};
use crate::session::SessionEngine;

/// The connection's background reader: blocks on the socket and routes every inbound
///  datagram into the session engine, for as long as the connection lives.
///
/// The pump does not read the next datagram until the engine is done with the current one,
///  so back-pressure from the inbound path reaches the socket's receive buffer.
pub(crate) struct ReceivePump {
    socket: Arc<UdpSocket>,
    engine: Arc<dyn SessionEngine>,
    lifecycle: Arc<Mutex<Lifecycle>>,
    cancel_receiver: broadcast::Receiver<()>,
    recv_buffer_size: usize,
}

impl ReceivePump {
    pub(crate) fn new(
        socket: Arc<UdpSocket>,
        engine: Arc<dyn SessionEngine>,
        lifecycle: Arc<Mutex<Lifecycle>>,
        cancel_receiver: broadcast::Receiver<()>,
        recv_buffer_size: usize,
    ) -> ReceivePump {
        ReceivePump {
            socket,
            engine,
            lifecycle,
            cancel_receiver,
            recv_buffer_size,
        }
    }

    /// Start the pump as a supervised task. The returned handle is retained by the
    ///  connection: disconnect awaits it, so pump termination is synchronized with rather
    ///  than merely triggered.
    pub(crate) fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        trace!("starting receive pump");
        let mut buf = vec![0u8; self.recv_buffer_size];

        loop {
            tokio::select! {
                r = self.socket.recv(&mut buf) => match r {
                    Ok(num_read) => {
                        if self.lifecycle.lock().await.state() == ConnectionState::Closed {
                            trace!("connection closed, dropping datagram and terminating pump");
                            break;
                        }

                        let correlation_id = Uuid::new_v4();
                        let span = span!(Level::TRACE, "datagram_received", ?correlation_id);
                        trace!("received {} bytes from connected peer", num_read);
                        self.engine.feed_inbound(&buf[..num_read]).instrument(span).await;
                    }
                    Err(e) => {
                        // a failed read on a released socket is the expected shutdown path
                        //  and exits silently; everything else is reported and the socket
                        //  stays in use
                        if self.lifecycle.lock().await.state() == ConnectionState::Closed {
                            trace!("socket released, terminating pump");
                            break;
                        }
                        error!("socket error: {}", e);
                    }
                },
                _ = self.cancel_receiver.recv() => {
                    trace!("receive pump canceled");
                    break;
                }
            }
        }

        trace!("receive pump terminated");
    }
}
