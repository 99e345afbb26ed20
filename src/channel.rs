//! A [`Handshake`] driven over a [`Socket`].

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::time::timeout;

use crate::addr::Endpoint;
use crate::auth::{BearerToken, SessionAuth};
use crate::cancel::StopFlag;
use crate::config::Config;
use crate::error::{AuthError, Error, HandshakeError, TransportError};
use crate::handshake::{
    Handshake, HandshakeState, Output, ResumptionTicket, ServerIdentity, SessionCache,
};
use crate::transport::framed::{read_frame, write_frame};
use crate::transport::Socket;
use crate::types::CipherSuite;

/// An established, encrypted session with one peer.
///
/// Construction runs the whole handshake. Every handshake read is bounded
/// by [`Config::step_timeout`] and raced against the [`StopFlag`]; either
/// firing aborts this connection only, with an alert to the peer.
pub struct SecureChannel {
    socket: Socket,
    handshake: Handshake,
    peer: Endpoint,
    inbox: VecDeque<Vec<u8>>,
    peer_closed: bool,
}

impl SecureChannel {
    /// Connect to `endpoint` and run a full client handshake.
    pub async fn connect(
        endpoint: Endpoint,
        config: Arc<Config>,
        stop: &StopFlag,
    ) -> Result<SecureChannel, Error> {
        let socket = Socket::connect_to(endpoint).await?;
        SecureChannel::client(socket, Handshake::client(config), stop).await
    }

    /// Connect and offer to resume the session of `ticket`.
    pub async fn connect_with_ticket(
        endpoint: Endpoint,
        config: Arc<Config>,
        ticket: ResumptionTicket,
        stop: &StopFlag,
    ) -> Result<SecureChannel, Error> {
        let socket = Socket::connect_to(endpoint).await?;
        SecureChannel::client(socket, Handshake::client_with_ticket(config, ticket), stop).await
    }

    /// Run the client side of `handshake` over an already connected socket.
    pub async fn client(
        socket: Socket,
        handshake: Handshake,
        stop: &StopFlag,
    ) -> Result<SecureChannel, Error> {
        if !handshake.is_client() {
            return Err(HandshakeError::InvalidState("server handshake passed as client").into());
        }
        SecureChannel::establish(socket, handshake, stop).await
    }

    /// Run the server side of a handshake over an accepted socket.
    pub async fn accept(
        socket: Socket,
        config: Arc<Config>,
        identity: Arc<ServerIdentity>,
        cache: Arc<SessionCache>,
        stop: &StopFlag,
    ) -> Result<SecureChannel, Error> {
        let handshake = Handshake::server(config, identity, cache);
        SecureChannel::establish(socket, handshake, stop).await
    }

    async fn establish(
        socket: Socket,
        handshake: Handshake,
        stop: &StopFlag,
    ) -> Result<SecureChannel, Error> {
        let peer = socket
            .peer_endpoint()
            .ok_or(TransportError::InvalidState("socket not connected"))?;
        if let Err(e) = socket.set_nodelay(true) {
            debug!("set_nodelay failed for {}: {}", peer, e);
        }

        let mut channel = SecureChannel {
            socket,
            handshake,
            peer,
            inbox: VecDeque::new(),
            peer_closed: false,
        };

        match channel.drive(stop).await {
            Ok(()) => {
                debug!(
                    "Established with {} using {:?} (resumed: {})",
                    channel.peer,
                    channel.handshake.cipher_suite(),
                    channel.handshake.is_resumed()
                );
                Ok(channel)
            }
            Err(e) => {
                warn!("Handshake with {} failed: {}", channel.peer, e);
                channel.teardown().await;
                Err(e)
            }
        }
    }

    async fn drive(&mut self, stop: &StopFlag) -> Result<(), Error> {
        self.handshake.start()?;
        let step = self.handshake.config().step_timeout();

        loop {
            self.flush().await?;

            match self.handshake.state() {
                HandshakeState::Established => return Ok(()),
                s if s.is_terminal() => {
                    return Err(HandshakeError::InvalidState("closed during handshake").into())
                }
                _ => {}
            }

            if stop.is_stopped() {
                return self.fail(HandshakeError::Cancelled).await;
            }

            let frame = tokio::select! {
                biased;
                _ = stop.wait() => {
                    return self.fail(HandshakeError::Cancelled).await;
                }
                read = timeout(step, read_frame(&mut self.socket)) => match read {
                    Ok(Ok(frame)) => frame,
                    Ok(Err(e)) => return Err(self.read_failed(e).await),
                    Err(_) => return self.fail(HandshakeError::StepTimeout).await,
                },
            };

            if let Err(e) = self.handshake.handle_frame(&frame) {
                // Tell the peer why before the socket goes.
                let _ = self.flush().await;
                return Err(e.into());
            }
        }
    }

    /// Abort locally, send the alert, and report `error`.
    async fn fail(&mut self, error: HandshakeError) -> Result<(), Error> {
        self.handshake.abort(&error);
        let _ = self.flush().await;
        Err(error.into())
    }

    /// A malformed frame header is a decode failure of the session.
    async fn read_failed(&mut self, error: TransportError) -> Error {
        if let TransportError::Frame(reason) = &error {
            self.handshake.abort(&HandshakeError::Decode(reason.clone()));
            let _ = self.flush().await;
        }
        error.into()
    }

    async fn flush(&mut self) -> Result<(), TransportError> {
        while let Some(output) = self.handshake.poll_output() {
            match output {
                Output::Frame(frame) => write_frame(&mut self.socket, &frame).await?,
                Output::Established => trace!("Session with {} established", self.peer),
                Output::ApplicationData(data) => self.inbox.push_back(data),
                Output::Closed => {
                    debug!("{} sent close_notify", self.peer);
                    self.peer_closed = true;
                }
            }
        }
        Ok(())
    }

    async fn teardown(&mut self) {
        self.handshake.close();
        let _ = self.flush().await;
        self.socket.close().await;
    }

    /// Encrypt and send `data`. Large payloads span several records.
    pub async fn send(&mut self, data: &[u8]) -> Result<(), Error> {
        self.handshake.send_application_data(data)?;
        self.flush().await?;
        Ok(())
    }

    /// Next application record from the peer. `None` once the peer closed
    /// the session.
    pub async fn recv(&mut self) -> Result<Option<Vec<u8>>, Error> {
        loop {
            if let Some(data) = self.inbox.pop_front() {
                return Ok(Some(data));
            }
            if self.peer_closed {
                return Ok(None);
            }

            let frame = match read_frame(&mut self.socket).await {
                Ok(frame) => frame,
                Err(e) => {
                    let e = self.read_failed(e).await;
                    if self.handshake.state().is_terminal() {
                        warn!("Session with {} failed: {}", self.peer, e);
                        self.socket.close().await;
                    }
                    return Err(e);
                }
            };
            if let Err(e) = self.handshake.handle_frame(&frame) {
                warn!("Session with {} failed: {}", self.peer, e);
                self.teardown().await;
                return Err(e.into());
            }
            self.flush().await?;

            if self.peer_closed {
                self.socket.close().await;
            }
        }
    }

    /// Send close_notify and shut the socket. Keys are zeroed.
    pub async fn close(&mut self) {
        self.teardown().await;
    }

    /// Send `token` as the next application record.
    pub async fn present_bearer(&mut self, token: &BearerToken) -> Result<(), Error> {
        self.send(token.as_str().as_bytes()).await
    }

    /// Read the next record as a bearer token and verify it against
    /// `verification_key`.
    ///
    /// A bad token is an [`AuthError`]; the session stays open either way.
    pub async fn expect_bearer(
        &mut self,
        auth: &SessionAuth,
        verification_key: &[u8],
    ) -> Result<BearerToken, Error> {
        let data = self.recv().await?.ok_or(TransportError::Closed)?;
        let s = std::str::from_utf8(&data).map_err(|_| AuthError::Malformed)?;
        let token = BearerToken::parse(s)?;
        auth.verify(&token, verification_key)?;
        Ok(token)
    }

    pub fn peer_endpoint(&self) -> Endpoint {
        self.peer
    }

    pub fn local_endpoint(&self) -> Option<Endpoint> {
        self.socket.local_endpoint()
    }

    pub fn state(&self) -> HandshakeState {
        self.handshake.state()
    }

    pub fn cipher_suite(&self) -> Option<CipherSuite> {
        self.handshake.cipher_suite()
    }

    pub fn is_resumed(&self) -> bool {
        self.handshake.is_resumed()
    }

    /// Client only: ticket for resuming this session later.
    pub fn resumption_ticket(&self) -> Option<ResumptionTicket> {
        self.handshake.resumption_ticket()
    }

    pub fn handshake(&self) -> &Handshake {
        &self.handshake
    }
}

impl std::fmt::Debug for SecureChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureChannel")
            .field("peer", &self.peer)
            .field("state", &self.handshake.state())
            .field("suite", &self.handshake.cipher_suite())
            .finish()
    }
}
