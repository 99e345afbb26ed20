use std::io;

use thiserror::Error;

use crate::addr::Endpoint;

/// Errors from parsing addresses, endpoints and CIDR ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("invalid address format")]
    InvalidFormat,

    #[error("value out of range")]
    OutOfRange,

    #[error("wrong number of address groups")]
    WrongGroupCount,
}

/// Errors from the socket layer.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("bind failed on {endpoint}: {source}")]
    BindFailed {
        endpoint: Endpoint,
        #[source]
        source: io::Error,
    },

    #[error("listen failed on {endpoint}: {source}")]
    ListenFailed {
        endpoint: Endpoint,
        #[source]
        source: io::Error,
    },

    #[error("accept failed: {0}")]
    AcceptFailed(#[source] io::Error),

    #[error("connection to {endpoint} failed: {source}")]
    ConnectionFailed {
        endpoint: Endpoint,
        #[source]
        source: io::Error,
    },

    #[error("operation timed out")]
    Timeout,

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("socket is closed")]
    Closed,

    #[error("invalid socket state: {0}")]
    InvalidState(&'static str),

    #[error("frame error: {0}")]
    Frame(String),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Errors that end a single handshake.
///
/// None of these are retried; the connection moves to `Aborted`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandshakeError {
    #[error("no common cipher suite")]
    NoCommonCipherSuite,

    #[error("policy violation: {0}")]
    PolicyViolation(String),

    #[error("handshake verification failed: {0}")]
    HandshakeVerificationFailed(String),

    #[error("unexpected message: {0}")]
    UnexpectedMessage(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("handshake step timed out")]
    StepTimeout,

    #[error("handshake cancelled")]
    Cancelled,

    #[error("invalid handshake state: {0}")]
    InvalidState(&'static str),
}

/// Bearer token failures. These never close the underlying connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("token expired")]
    TokenExpired,

    #[error("token signature invalid")]
    SignatureInvalid,

    #[error("malformed token")]
    Malformed,
}

/// Top level error for the crate.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// The handshake failure behind this error, if any.
    pub fn handshake(&self) -> Option<&HandshakeError> {
        match self {
            Error::Handshake(e) => Some(e),
            _ => None,
        }
    }

    /// The transport failure behind this error, if any.
    pub fn transport(&self) -> Option<&TransportError> {
        match self {
            Error::Transport(e) => Some(e),
            _ => None,
        }
    }
}
