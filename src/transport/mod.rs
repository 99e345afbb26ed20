//! Connection oriented transport over both address families.
//!
//! [`Socket`] owns one connected stream and is moved, never shared.
//! [`Acceptor`] listens on one port and, unless bound to a specific IPv4
//! address, takes both IPv6 and IPv4 peers on a single dual-stack socket.

mod acceptor;
pub mod framed;
mod socket;

pub use acceptor::{Acceptor, AcceptorState, DEFAULT_BACKLOG};
pub use socket::{Socket, SocketState};
