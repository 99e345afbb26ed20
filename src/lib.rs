//! dualstack
//!
//! Dual-stack (IPv4/IPv6) TCP transport with a session handshake that
//! negotiates between classical and post-quantum cipher suites.
//!
//! # Goals
//! - **One listener, both families**: an [`Acceptor`] bound to the ANY address
//!   serves IPv6 and IPv4 peers on one socket. Peer endpoints report the
//!   family the peer actually used.
//! - **Post-quantum first**: servers prefer ML-KEM-768 and the hybrid
//!   X25519+ML-KEM-768 suites, and [`Config`] can refuse classical suites
//!   entirely.
//! - **Sans-IO core**: [`Handshake`] consumes and produces whole frames and
//!   never touches a socket. [`SecureChannel`] and [`Service`] drive it over
//!   tokio.
//! - **Pluggable crypto**: every primitive goes through
//!   [`crypto::CryptoProvider`], with a RustCrypto / pqcrypto backed default.
//!
//! # Cipher suites
//!
//! | suite                                | id     | key exchange      | signatures         |
//! |--------------------------------------|--------|-------------------|--------------------|
//! | `AES_128_GCM_SHA256`                 | 0x1301 | X25519            | Ed25519            |
//! | `AES_256_GCM_SHA384`                 | 0x1302 | X25519            | Ed25519            |
//! | `CHACHA20_POLY1305_SHA256`           | 0x1303 | X25519            | Ed25519            |
//! | `MLKEM768_AES_256_GCM_SHA384`        | 0x1304 | ML-KEM-768        | ML-DSA-65          |
//! | `X25519_MLKEM768_AES_256_GCM_SHA384` | 0x1306 | X25519+ML-KEM-768 | Ed25519+ML-DSA-65  |
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use dualstack::{Config, SecureChannel, ServerIdentity, Service, ServiceConfig, StopFlag};
//!
//! # async fn run() -> Result<(), dualstack::Error> {
//! let config = Arc::new(Config::builder().require_pqc(true).build()?);
//! let identity = Arc::new(ServerIdentity::generate(config.crypto_provider())?);
//!
//! let service = Service::new(ServiceConfig::builder().port(4433).build()?, config.clone(), identity)
//!     .start(|mut channel: SecureChannel| async move {
//!         while let Ok(Some(data)) = channel.recv().await {
//!             if channel.send(&data).await.is_err() {
//!                 break;
//!             }
//!         }
//!     })?;
//!
//! let stop = StopFlag::new();
//! let mut client = SecureChannel::connect(service.local_endpoint(), config, &stop).await?;
//! client.send(b"hello").await?;
//! assert_eq!(client.recv().await?.as_deref(), Some(&b"hello"[..]));
//!
//! service.stop();
//! service.join().await;
//! # Ok(())
//! # }
//! ```
//!
//! # Logging
//!
//! The crate logs through the `log` facade and never installs a logger.
#![forbid(unsafe_code)]
#![warn(clippy::all)]

#[macro_use]
extern crate log;

mod addr;
pub use addr::{parse_v4, parse_v6, Address, Cidr, Endpoint};

pub mod ports;

mod buffer;
mod util;

pub mod types;
pub use types::{CipherSuite, KemAlgorithm, SignatureAlgorithm};

mod error;
pub use error::{AuthError, Error, HandshakeError, ParseError, TransportError};

pub(crate) mod message;

pub mod crypto;

mod config;
pub use config::{Config, ConfigBuilder, TrustedKey};

mod handshake;
pub use handshake::{Handshake, HandshakeState, Output, MAX_RECORD_PLAINTEXT};
pub use handshake::{ResumptionTicket, ServerIdentity, SessionCache, SessionKeys};
pub use handshake::select_cipher_suite;

pub mod transport;
pub use transport::{Acceptor, AcceptorState, Socket, SocketState};

mod cancel;
pub use cancel::StopFlag;

mod channel;
pub use channel::SecureChannel;

mod service;
pub use service::{Service, ServiceConfig, ServiceConfigBuilder, ServiceHandle, ServiceStats};

mod auth;
pub use auth::{BearerToken, Claims, SessionAuth};

pub mod threat;
pub use threat::{ThreatLevel, ThreatMonitor};
