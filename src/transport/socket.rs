use std::fmt;

use socket2::{Domain, Protocol, Type};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpSocket, TcpStream};

use crate::addr::{Address, Endpoint};
use crate::error::TransportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    Unconnected,
    Connected,
    Closed,
}

/// A connected stream socket.
///
/// Not `Clone`: exactly one owner holds the OS handle, and dropping the
/// socket closes it.
pub struct Socket {
    stream: Option<TcpStream>,
    state: SocketState,
    peer: Option<Endpoint>,
    local: Option<Endpoint>,
}

impl Socket {
    /// A socket with no OS handle yet.
    pub fn new() -> Socket {
        Socket {
            stream: None,
            state: SocketState::Unconnected,
            peer: None,
            local: None,
        }
    }

    /// Connect a new socket to `endpoint`.
    pub async fn connect_to(endpoint: Endpoint) -> Result<Socket, TransportError> {
        let mut socket = Socket::new();
        socket.connect(endpoint).await?;
        Ok(socket)
    }

    pub(crate) fn from_stream(stream: TcpStream, peer: Endpoint) -> Socket {
        let local = stream.local_addr().ok().map(|a| Endpoint::from(a).to_canonical());
        Socket {
            stream: Some(stream),
            state: SocketState::Connected,
            peer: Some(peer),
            local,
        }
    }

    /// Connect to `endpoint`.
    ///
    /// IPv6 endpoints use an IPv6 socket with IPv6-only disabled, IPv4
    /// endpoints an IPv4 socket.
    pub async fn connect(&mut self, endpoint: Endpoint) -> Result<(), TransportError> {
        if self.state != SocketState::Unconnected {
            return Err(TransportError::InvalidState("socket is not unconnected"));
        }
        if endpoint.port() == 0 {
            return Err(TransportError::InvalidAddress(format!(
                "port 0 is not connectable: {}",
                endpoint
            )));
        }
        if endpoint.address().is_unspecified() {
            return Err(TransportError::InvalidAddress(format!(
                "unspecified address is not connectable: {}",
                endpoint
            )));
        }

        let failed = |source| TransportError::ConnectionFailed { endpoint, source };

        let socket = match endpoint.address() {
            Address::V6 { .. } => {
                let s = socket2::Socket::new(Domain::IPV6, Type::STREAM, Some(Protocol::TCP))
                    .map_err(failed)?;
                s.set_only_v6(false).map_err(failed)?;
                s.set_nonblocking(true).map_err(failed)?;
                TcpSocket::from_std_stream(s.into())
            }
            Address::V4(_) => TcpSocket::new_v4().map_err(failed)?,
        };

        let stream = socket.connect(endpoint.into()).await.map_err(failed)?;
        debug!("Connected to {}", endpoint);

        self.local = stream
            .local_addr()
            .ok()
            .map(|a| Endpoint::from(a).to_canonical());
        self.peer = Some(endpoint);
        self.stream = Some(stream);
        self.state = SocketState::Connected;
        Ok(())
    }

    fn stream(&mut self) -> Result<&mut TcpStream, TransportError> {
        match self.state {
            SocketState::Unconnected => Err(TransportError::InvalidState("socket is not connected")),
            SocketState::Closed => Err(TransportError::Closed),
            SocketState::Connected => self.stream.as_mut().ok_or(TransportError::Closed),
        }
    }

    /// One write. Returns how many bytes the OS took.
    pub async fn send(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        let n = self.stream()?.write(data).await?;
        Ok(n)
    }

    /// One read. `Ok(0)` is an orderly close by the peer.
    pub async fn receive(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let n = self.stream()?.read(buf).await?;
        Ok(n)
    }

    /// Shut the stream down. Calling it again does nothing.
    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                trace!("Shutdown of {:?} failed: {}", self.peer, e);
            }
        }
        self.state = SocketState::Closed;
    }

    pub fn set_nodelay(&self, nodelay: bool) -> Result<(), TransportError> {
        match &self.stream {
            Some(s) => Ok(s.set_nodelay(nodelay)?),
            None => Err(TransportError::InvalidState("socket is not connected")),
        }
    }

    pub fn state(&self) -> SocketState {
        self.state
    }

    pub fn peer_endpoint(&self) -> Option<Endpoint> {
        self.peer
    }

    pub fn local_endpoint(&self) -> Option<Endpoint> {
        self.local
    }
}

impl Default for Socket {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Socket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Socket")
            .field("state", &self.state)
            .field("peer", &self.peer)
            .field("local", &self.local)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_rejects_port_zero() {
        let mut s = Socket::new();
        let r = s.connect(Endpoint::new(Address::LOCALHOST_V4, 0)).await;
        assert!(matches!(r, Err(TransportError::InvalidAddress(_))));
        assert_eq!(s.state(), SocketState::Unconnected);
    }

    #[tokio::test]
    async fn io_on_unconnected_and_closed() {
        let mut s = Socket::new();
        let mut buf = [0u8; 4];
        assert!(matches!(
            s.send(b"x").await,
            Err(TransportError::InvalidState(_))
        ));
        s.close().await;
        s.close().await;
        assert_eq!(s.state(), SocketState::Closed);
        assert!(matches!(s.receive(&mut buf).await, Err(TransportError::Closed)));
        assert!(matches!(
            s.connect(Endpoint::new(Address::LOCALHOST_V4, 80)).await,
            Err(TransportError::InvalidState(_))
        ));
    }
}
