//! Cryptographic contract and the default backend.

mod provider;

pub mod hybrid;
pub mod rust_crypto;

pub use provider::{ActiveKeyExchange, Cipher, CryptoProvider, CryptoSafe};
pub use provider::{HashProvider, HkdfProvider, HmacProvider, SecureRandom};
pub use provider::{SignatureScheme, SupportedAead, SupportedKem, SupportedKxGroup};

pub use crate::buffer::Buf;

/// Secret key material, wiped on drop.
pub type SecretBytes = zeroize::Zeroizing<Vec<u8>>;
