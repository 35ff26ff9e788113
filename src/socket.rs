use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::{lookup_host, UdpSocket};
use tracing::debug;

use crate::config::SessionConfig;
use crate::error::ConnectError;

/// Resolve a host name to the remote endpoint. The first resolved address wins - there is
///  no fallback to later addresses, and resolution is attempted exactly once.
pub async fn resolve(host: &str, port: u16) -> Result<SocketAddr, ConnectError> {
    let mut addrs = match lookup_host((host, port)).await {
        Ok(addrs) => addrs,
        Err(e) => {
            debug!("resolution of {:?} failed: {}", host, e);
            return Err(ConnectError::HostNotFound { host: host.to_string() });
        }
    };

    match addrs.next() {
        Some(addr) => Ok(addr),
        None => Err(ConnectError::HostNotFound { host: host.to_string() }),
    }
}

/// Create the client socket for the given remote endpoint: bound to the unspecified local
///  address, `connect`ed to the peer so subsequent sends and receives default to it, and
///  dual-stack on IP V6 if requested.
///
/// Dual-stack mode is requested before binding and failure to enable it is tolerated -
///  some platforms only offer separate V4 and V6 stacks.
pub fn connect_socket(remote_addr: SocketAddr, config: &SessionConfig) -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::for_address(remote_addr), Type::DGRAM, Some(Protocol::UDP))?;

    if remote_addr.is_ipv6() && config.dual_stack {
        if let Err(e) = socket.set_only_v6(false) {
            debug!("could not enable dual-stack mode: {}", e);
        }
    }

    let local_addr: SocketAddr = if remote_addr.is_ipv6() {
        (Ipv6Addr::UNSPECIFIED, 0).into()
    }
    else {
        (Ipv4Addr::UNSPECIFIED, 0).into()
    };
    socket.bind(&local_addr.into())?;
    socket.connect(&remote_addr.into())?;
    socket.set_nonblocking(true)?;

    UdpSocket::from_std(socket.into())
}
