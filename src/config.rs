use std::time::Duration;

use anyhow::bail;

/// Configuration for a client session connection.
pub struct SessionConfig {
    /// Size of the buffer the receive pump reads datagrams into. Inbound datagrams
    ///  exceeding this size are truncated by the operating system, so it must be at least
    ///  the biggest UDP payload the peer will send.
    ///
    /// With full Ethernet frames and no optional IP headers, the UDP payload is
    ///  `1500 - 20 - 8 = 1472` for IPV4 and `1500 - 40 - 8 = 1452` for IPV6. There may be
    ///  network hardware with smaller frames on (some of) the routes, and this crate does
    ///  not attempt to guess or compensate for those - determining the payload size is the
    ///  application's responsibility.
    pub recv_buffer_size: usize,

    /// Upper bound for the handshake's wait for the first reply from the peer. `None`
    ///  waits indefinitely, leaving cancellation entirely to the caller - a peer that is
    ///  down then blocks `connect` forever, so an explicit bound is recommended.
    pub handshake_timeout: Option<Duration>,

    /// Request dual-stack operation on IP V6 sockets, accepting IP V4-mapped peers
    ///  through the same socket. This is a preference, not a requirement - on platforms
    ///  without dual-stack support the socket is left in its default mode.
    pub dual_stack: bool,
}

impl SessionConfig {
    pub fn default_client() -> SessionConfig {
        SessionConfig {
            recv_buffer_size: 1472,
            handshake_timeout: Some(Duration::from_secs(10)),
            dual_stack: true,
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.recv_buffer_size < 100 {
            bail!("receive buffer size is too small");
        }
        if self.handshake_timeout == Some(Duration::ZERO) {
            bail!("a handshake timeout of zero can never be met");
        }
        Ok(())
    }
}
