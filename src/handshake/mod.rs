//! Sans-IO handshake and session engine.
//!
//! A [`Handshake`] consumes complete frames via [`Handshake::handle_frame`]
//! and produces frames to send, plus session events, via
//! [`Handshake::poll_output`]. It never touches a socket; see
//! [`SecureChannel`](crate::SecureChannel) for the driver over TCP.
//!
//! ```text
//! Client                                   Server
//! ClientHello  (suites, key shares)  -->
//!                                    <--   ServerHello (suite, shares)
//!                                    <--   CertificateVerify
//!                                    <--   Finished
//! Finished                           -->
//! ```

use std::sync::Arc;

use crate::config::Config;
use crate::error::HandshakeError;
use crate::types::{CipherSuite, SignatureAlgorithm};

mod client;
mod engine;
mod identity;
mod key_schedule;
mod negotiate;
mod record;
mod session;
mod server;

use client::Client;
use server::Server;

pub use identity::ServerIdentity;
pub use key_schedule::SessionKeys;
pub use negotiate::select_cipher_suite;
pub use session::{ResumptionTicket, SessionCache};

/// Upper bound for [`Config::max_record_plaintext`].
pub const MAX_RECORD_PLAINTEXT: usize = 16 * 1024;

/// Prefix of the data a server signs: this string, then
/// Hash(ClientHello || ServerHello).
pub(crate) const SIGNATURE_CONTEXT: &[u8] = b"dualstack-net server signature\0";

/// Observable progress of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandshakeState {
    Idle,
    SuiteProposed,
    SuiteAgreed,
    KeysExchanged,
    Established,
    Closed,
    Aborted,
}

impl HandshakeState {
    /// `Closed` and `Aborted` accept no further input.
    pub fn is_terminal(&self) -> bool {
        matches!(self, HandshakeState::Closed | HandshakeState::Aborted)
    }
}

/// Output from [`Handshake::poll_output`].
#[derive(Debug, PartialEq, Eq)]
pub enum Output {
    /// A complete frame to write to the peer.
    Frame(Vec<u8>),
    /// The session is established. Application data may flow.
    Established,
    /// Decrypted application data from the peer.
    ApplicationData(Vec<u8>),
    /// The peer closed the session.
    Closed,
}

enum Role {
    Client(Box<Client>),
    Server(Box<Server>),
}

/// One side of one connection.
pub struct Handshake {
    role: Role,
}

impl Handshake {
    /// A client doing a full handshake.
    pub fn client(config: Arc<Config>) -> Handshake {
        Handshake {
            role: Role::Client(Box::new(Client::new(config, None))),
        }
    }

    /// A client offering to resume the session of `ticket`. Falls back to a
    /// full handshake if the ticket expired or the server declines.
    pub fn client_with_ticket(config: Arc<Config>, ticket: ResumptionTicket) -> Handshake {
        Handshake {
            role: Role::Client(Box::new(Client::new(config, Some(ticket)))),
        }
    }

    pub fn server(
        config: Arc<Config>,
        identity: Arc<ServerIdentity>,
        cache: Arc<SessionCache>,
    ) -> Handshake {
        Handshake {
            role: Role::Server(Box::new(Server::new(config, identity, cache))),
        }
    }

    pub fn is_client(&self) -> bool {
        matches!(self.role, Role::Client(_))
    }

    /// Begin the handshake. A client queues its ClientHello; a server just
    /// waits for one.
    pub fn start(&mut self) -> Result<(), HandshakeError> {
        self.guarded(|role| match role {
            Role::Client(c) => c.start(),
            Role::Server(_) => Ok(()),
        })
    }

    /// Feed one complete frame from the peer.
    ///
    /// Any error other than `InvalidState` aborts the connection and queues
    /// an alert for the peer, unless the error came from the peer's alert.
    pub fn handle_frame(&mut self, frame: &[u8]) -> Result<(), HandshakeError> {
        self.guarded(|role| match role {
            Role::Client(c) => c.handle_frame(frame),
            Role::Server(s) => s.handle_frame(frame),
        })
    }

    pub fn poll_output(&mut self) -> Option<Output> {
        self.engine_mut().poll_output()
    }

    /// Encrypt application data. Only valid once established.
    pub fn send_application_data(&mut self, data: &[u8]) -> Result<(), HandshakeError> {
        self.guarded(|role| match role {
            Role::Client(c) => c.engine.send_application_data(data),
            Role::Server(s) => s.engine.send_application_data(data),
        })
    }

    /// Close an established session with close_notify. Before that, abort
    /// as cancelled. Keys are zeroed.
    pub fn close(&mut self) {
        let engine = self.engine_mut();
        match engine.state() {
            HandshakeState::Established => engine.close(),
            s if s.is_terminal() => {}
            _ => engine.abort(&HandshakeError::Cancelled),
        }
    }

    /// Abort with `error`, telling the peer. Used by drivers for timeouts
    /// and cancellation.
    pub fn abort(&mut self, error: &HandshakeError) {
        let engine = self.engine_mut();
        if !engine.state().is_terminal() {
            warn!("Handshake aborted: {}", error);
            engine.abort(error);
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.engine().state()
    }

    pub fn config(&self) -> &Config {
        self.engine().config()
    }

    /// The negotiated suite, once the server decided.
    pub fn cipher_suite(&self) -> Option<CipherSuite> {
        self.engine().suite()
    }

    /// Current session keys. `None` before key exchange and after close.
    pub fn session_keys(&self) -> Option<&SessionKeys> {
        self.engine().keys()
    }

    pub fn is_resumed(&self) -> bool {
        match &self.role {
            Role::Client(c) => c.is_resumed(),
            Role::Server(s) => s.is_resumed(),
        }
    }

    /// Client only: ticket to resume this session later.
    pub fn resumption_ticket(&self) -> Option<ResumptionTicket> {
        match &self.role {
            Role::Client(c) => c.resumption_ticket().cloned(),
            Role::Server(_) => None,
        }
    }

    /// Client only: the server key that signed the handshake.
    pub fn server_public_key(&self, algorithm: SignatureAlgorithm) -> Option<&[u8]> {
        match &self.role {
            Role::Client(c) => c.server_key(algorithm),
            Role::Server(_) => None,
        }
    }

    fn engine(&self) -> &engine::Engine {
        match &self.role {
            Role::Client(c) => &c.engine,
            Role::Server(s) => &s.engine,
        }
    }

    fn engine_mut(&mut self) -> &mut engine::Engine {
        match &mut self.role {
            Role::Client(c) => &mut c.engine,
            Role::Server(s) => &mut s.engine,
        }
    }

    fn guarded<F>(&mut self, f: F) -> Result<(), HandshakeError>
    where
        F: FnOnce(&mut Role) -> Result<(), HandshakeError>,
    {
        let result = f(&mut self.role);
        if let Err(e) = &result {
            if !matches!(e, HandshakeError::InvalidState(_)) {
                self.abort(e);
            }
        }
        result
    }
}

impl std::fmt::Debug for Handshake {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handshake")
            .field("client", &self.is_client())
            .field("state", &self.state())
            .field("suite", &self.cipher_suite())
            .finish()
    }
}
