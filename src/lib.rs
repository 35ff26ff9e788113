//! Client-side connection layer for session protocols running over UDP.
//!
//! UDP itself has no notion of a connection: datagrams are sent and received without any
//!  lifecycle, ordering or delivery guarantee. This crate wraps a single UDP socket with
//!  connection semantics for a client talking to one server:
//!
//! * an explicit lifecycle (`Connecting` / `Open` / `Closed`) - state transitions and
//!   socket release happen atomically under one lock
//! * a background *receive pump* that drains inbound datagrams into a reliability engine
//!   for as long as the connection lives
//! * a mandatory one-round-trip *handshake* that confirms bidirectional reachability
//!   before the connection is handed to the application
//!
//! The reliability layer itself (retransmission, ordering, congestion control) is *not*
//!  part of this crate - it is consumed through the [SessionEngine](session::SessionEngine)
//!  trait, and every inbound datagram is fed into it by the pump. A
//!  [PassthroughEngine](session::PassthroughEngine) without any reliability is provided
//!  for direct datagram exchange and for tests.
//!
//! ## Connect sequence
//!
//! ```ascii
//! resolve host          first resolved address wins, no fallback
//!   |
//! connect socket        bound to the unspecified address, connected to the peer,
//!   |                    dual-stack requested (best effort) on IP V6
//! engine setup          sequence counters / windows reset, outbound path wired up
//!   |
//! spawn receive pump    runs until the connection is closed
//!   |
//! handshake             send "Hello", await the first inbound message
//!   |
//! state = Open          connect() returns
//! ```
//!
//! The handshake sends a fixed sentinel (`"Hello"`) and succeeds on the *next* message the
//!  engine produces - the reply's content is not checked. If no reply arrives within the
//!  configured bound, `connect` fails with
//!  [HandshakeFailed](error::ConnectError::HandshakeFailed) and tears the pump down before
//!  returning, so a failed connect never leaves background activity behind.
//!
//! ## Shutdown
//!
//! [disconnect](connection::Connection::disconnect) marks the connection closed and
//!  releases the socket in one critical section, then signals the pump and *waits* for it
//!  to terminate. The pump treats the release as its expected exit signal - a read failure
//!  on a closed connection is not an error. `disconnect` is idempotent.

pub mod config;
pub mod connection;
pub mod error;
pub mod send_socket;
pub mod session;

mod handshake;
mod receive_pump;
mod socket;
