use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use socket2::{Domain, Protocol, SockAddr, Type};
use tokio::net::TcpListener;

use crate::addr::{Address, Endpoint};
use crate::error::TransportError;

use super::Socket;

/// Default listen queue length.
pub const DEFAULT_BACKLOG: u32 = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptorState {
    Unbound,
    Listening,
    Stopped,
}

/// A listening socket.
pub struct Acceptor {
    listener: Option<TcpListener>,
    state: AcceptorState,
    dual_stack_enabled: bool,
    local: Option<Endpoint>,
    backlog: u32,
}

impl Acceptor {
    pub fn new() -> Acceptor {
        Self::with_backlog(DEFAULT_BACKLOG)
    }

    pub fn with_backlog(backlog: u32) -> Acceptor {
        Acceptor {
            listener: None,
            state: AcceptorState::Unbound,
            dual_stack_enabled: false,
            local: None,
            backlog,
        }
    }

    /// Bind and listen on `port`.
    ///
    /// Without a bind address the acceptor binds the IPv6 ANY address with
    /// IPv6-only disabled, so IPv4 peers arrive as mapped addresses on the
    /// same socket. Hosts without IPv6 fall back to IPv4 ANY. An IPv4 bind
    /// address gives an IPv4-only acceptor.
    ///
    /// Port 0 picks an ephemeral port; see [`Acceptor::local_endpoint`].
    /// Must be called from within a tokio runtime.
    pub fn listen(
        &mut self,
        port: u16,
        bind_address: Option<Address>,
    ) -> Result<Endpoint, TransportError> {
        if self.state != AcceptorState::Unbound {
            return Err(TransportError::InvalidState("acceptor already bound"));
        }

        let requested = Endpoint::new(bind_address.unwrap_or(Address::UNSPECIFIED_V6), port);
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(TransportError::ListenFailed {
                endpoint: requested,
                source: io::Error::other("no tokio runtime"),
            });
        }

        let (socket, endpoint) = match open_bound(requested) {
            Ok(s) => (s, requested),
            Err(e) if bind_address.is_none() && ipv6_unavailable(&e) => {
                warn!("IPv6 unavailable ({}), listening on IPv4 only", e);
                let fallback = Endpoint::new(Address::UNSPECIFIED_V4, port);
                let s = open_bound(fallback).map_err(|source| TransportError::BindFailed {
                    endpoint: fallback,
                    source,
                })?;
                (s, fallback)
            }
            Err(source) => {
                return Err(TransportError::BindFailed {
                    endpoint: requested,
                    source,
                })
            }
        };

        let dual_stack = endpoint.address().is_v6();
        socket
            .listen(self.backlog as i32)
            .map_err(|source| TransportError::ListenFailed { endpoint, source })?;

        let listener = TcpListener::from_std(socket.into())
            .map_err(|source| TransportError::ListenFailed { endpoint, source })?;

        let local = listener
            .local_addr()
            .map(Endpoint::from)
            .map_err(|source| TransportError::ListenFailed { endpoint, source })?;

        info!(
            "Listening on {}{}",
            local,
            if dual_stack { " (dual-stack)" } else { "" }
        );

        self.listener = Some(listener);
        self.local = Some(local);
        self.dual_stack_enabled = dual_stack;
        self.state = AcceptorState::Listening;
        Ok(local)
    }

    /// Wait for the next peer.
    ///
    /// The socket's peer endpoint reflects the family the peer used: an IPv4
    /// peer on a dual-stack acceptor shows up as IPv4.
    pub async fn accept(&self) -> Result<Socket, TransportError> {
        let listener = match self.state {
            AcceptorState::Unbound => {
                return Err(TransportError::InvalidState("acceptor is not listening"))
            }
            AcceptorState::Stopped => return Err(TransportError::Closed),
            AcceptorState::Listening => self.listener.as_ref().ok_or(TransportError::Closed)?,
        };

        let (stream, peer) = listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;
        let peer = Endpoint::from(peer).to_canonical();
        trace!("Accepted {}", peer);

        Ok(Socket::from_stream(stream, peer))
    }

    /// [`Acceptor::accept`] with a deadline. `Timeout` when nobody arrived.
    pub async fn accept_timeout(&self, timeout: Duration) -> Result<Socket, TransportError> {
        tokio::time::timeout(timeout, self.accept())
            .await
            .map_err(|_| TransportError::Timeout)?
    }

    /// Stop listening and release the port. Calling it again does nothing.
    pub fn stop_listening(&mut self) {
        if self.listener.take().is_some() {
            debug!("Stopped listening on {:?}", self.local);
        }
        self.state = AcceptorState::Stopped;
    }

    pub fn state(&self) -> AcceptorState {
        self.state
    }

    pub fn dual_stack_enabled(&self) -> bool {
        self.dual_stack_enabled
    }

    pub fn local_endpoint(&self) -> Option<Endpoint> {
        self.local
    }
}

impl Default for Acceptor {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Acceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Acceptor")
            .field("state", &self.state)
            .field("local", &self.local)
            .field("dual_stack_enabled", &self.dual_stack_enabled)
            .finish()
    }
}

/// Create the OS socket for `endpoint`'s family and bind it. IPv6 sockets
/// are made dual-stack.
fn open_bound(endpoint: Endpoint) -> io::Result<socket2::Socket> {
    let domain = match endpoint.address() {
        Address::V4(_) => Domain::IPV4,
        Address::V6 { .. } => Domain::IPV6,
    };
    let socket = socket2::Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    if domain == Domain::IPV6 {
        socket.set_only_v6(false)?;
    }
    socket.set_nonblocking(true)?;
    socket.bind(&SockAddr::from(SocketAddr::from(endpoint)))?;
    Ok(socket)
}

/// Failures of the IPv6 ANY bind that an IPv4 listener may still avoid.
/// A port conflict or a permission problem would hit IPv4 too.
fn ipv6_unavailable(e: &io::Error) -> bool {
    !matches!(
        e.kind(),
        io::ErrorKind::AddrInUse | io::ErrorKind::PermissionDenied
    )
}
