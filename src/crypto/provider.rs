//! Cryptographic provider traits for pluggable crypto backends.
//!
//! The handshake never touches a primitive directly. Everything goes through
//! a [`CryptoProvider`], a struct of static trait objects where each field is
//! one capability:
//!
//! - **AEADs** ([`SupportedAead`]): factory for record ciphers
//! - **Key exchange groups** ([`SupportedKxGroup`]): ephemeral ECDHE
//! - **KEMs** ([`SupportedKem`]): post-quantum key encapsulation
//! - **Signatures** ([`SignatureScheme`]): server authentication and tokens
//! - **Secure random** ([`SecureRandom`])
//! - **Hash / HMAC / HKDF** for the transcript and the key schedule
//!
//! # Using a custom provider
//!
//! ```
//! use dualstack::crypto::{rust_crypto, CryptoProvider};
//! use dualstack::Config;
//!
//! let base = rust_crypto::default_provider();
//!
//! // Same backend without the ChaCha20 AEAD.
//! let provider = CryptoProvider {
//!     aeads: &base.aeads[..2],
//!     ..base
//! };
//!
//! let config = Config::builder()
//!     .with_crypto_provider(provider)
//!     .build();
//! # let _ = config;
//! ```
//!
//! # Contract
//!
//! - KEM: `decapsulate(encapsulate(pk).ciphertext, sk) == encapsulate(pk).shared_secret`.
//! - Signatures: `verify` must reject altered messages and mismatched keys.
//! - Backends return `Err(String)` on failure. The handshake maps these to
//!   [`HandshakeError::Crypto`](crate::HandshakeError::Crypto).

use std::fmt::Debug;
use std::panic::{RefUnwindSafe, UnwindSafe};
use std::sync::OnceLock;

use crate::buffer::Buf;
use crate::crypto::SecretBytes;
use crate::types::{AeadAlgorithm, CipherSuite, HashAlgorithm, KemAlgorithm};
use crate::types::{KeyExchange, NamedGroup, SignatureAlgorithm};
use crate::Error;

/// Marker trait for types that are safe to use in crypto provider components.
///
/// Automatically implemented for all types that are thread-safe, debuggable
/// and unwind safe.
pub trait CryptoSafe: Send + Sync + Debug + UnwindSafe + RefUnwindSafe {}

impl<T: Send + Sync + Debug + UnwindSafe + RefUnwindSafe> CryptoSafe for T {}

// ============================================================================
// Instance Traits
// ============================================================================

/// AEAD cipher bound to one key.
pub trait Cipher: CryptoSafe {
    /// Encrypt in place, appending the tag.
    fn encrypt(&mut self, plaintext: &mut Buf, aad: &[u8], nonce: &[u8]) -> Result<(), String>;

    /// Decrypt in place, verifying and removing the tag.
    fn decrypt(&mut self, ciphertext: &mut Buf, aad: &[u8], nonce: &[u8]) -> Result<(), String>;
}

/// Ephemeral keypair for one Diffie-Hellman exchange.
pub trait ActiveKeyExchange: CryptoSafe {
    fn pub_key(&self) -> &[u8];

    /// Complete the exchange with the peer's public key, writing the shared
    /// secret to `out`.
    fn complete(self: Box<Self>, peer_pub: &[u8], out: &mut Buf) -> Result<(), String>;

    fn group(&self) -> NamedGroup;
}

// ============================================================================
// Factory Traits
// ============================================================================

/// AEAD support (factory for [`Cipher`]).
pub trait SupportedAead: CryptoSafe {
    fn algorithm(&self) -> AeadAlgorithm;

    fn key_len(&self) -> usize;

    fn iv_len(&self) -> usize;

    fn tag_len(&self) -> usize;

    fn create_cipher(&self, key: &[u8]) -> Result<Box<dyn Cipher>, String>;
}

/// Key exchange group support (factory for [`ActiveKeyExchange`]).
pub trait SupportedKxGroup: CryptoSafe {
    fn name(&self) -> NamedGroup;

    /// Start a new exchange with a fresh ephemeral keypair.
    fn start_exchange(&self) -> Result<Box<dyn ActiveKeyExchange>, String>;
}

/// Key encapsulation mechanism.
pub trait SupportedKem: CryptoSafe {
    fn algorithm(&self) -> KemAlgorithm;

    /// Returns `(public_key, secret_key)`.
    fn generate_keypair(&self) -> Result<(Vec<u8>, SecretBytes), String>;

    /// Returns `(ciphertext, shared_secret)`.
    fn encapsulate(&self, public_key: &[u8]) -> Result<(Vec<u8>, SecretBytes), String>;

    fn decapsulate(&self, ciphertext: &[u8], secret_key: &[u8]) -> Result<SecretBytes, String>;
}

/// Signature algorithm.
pub trait SignatureScheme: CryptoSafe {
    fn algorithm(&self) -> SignatureAlgorithm;

    /// Returns `(public_key, secret_key)`.
    fn generate_keypair(&self) -> Result<(Vec<u8>, SecretBytes), String>;

    fn sign(&self, message: &[u8], secret_key: &[u8]) -> Result<Vec<u8>, String>;

    fn verify(&self, message: &[u8], signature: &[u8], public_key: &[u8]) -> bool;
}

/// Secure random number generator.
pub trait SecureRandom: CryptoSafe {
    fn fill(&self, buf: &mut [u8]) -> Result<(), String>;
}

/// One-shot hashing.
pub trait HashProvider: CryptoSafe {
    fn digest(&self, algorithm: HashAlgorithm, data: &[u8], out: &mut Buf);
}

pub trait HmacProvider: CryptoSafe {
    fn hmac(
        &self,
        algorithm: HashAlgorithm,
        key: &[u8],
        data: &[u8],
        out: &mut Buf,
    ) -> Result<(), String>;
}

/// HKDF (RFC 5869) plus the labelled expansion used by the key schedule.
pub trait HkdfProvider: CryptoSafe {
    /// PRK = HKDF-Extract(salt, IKM)
    fn hkdf_extract(
        &self,
        hash: HashAlgorithm,
        salt: &[u8],
        ikm: &[u8],
        out: &mut Buf,
    ) -> Result<(), String>;

    /// OKM = HKDF-Expand(PRK, info, L)
    fn hkdf_expand(
        &self,
        hash: HashAlgorithm,
        prk: &[u8],
        info: &[u8],
        out: &mut Buf,
        output_len: usize,
    ) -> Result<(), String>;

    /// HKDF-Expand with a structured label bound to a cipher suite.
    ///
    /// ```text
    /// HkdfLabel = struct {
    ///     uint16 length;
    ///     uint16 suite;
    ///     opaque label<6..255> = "dsn1 " + Label;
    ///     opaque context<0..255> = Context;
    /// }
    /// ```
    #[allow(clippy::too_many_arguments)]
    fn hkdf_expand_label(
        &self,
        hash: HashAlgorithm,
        secret: &[u8],
        suite: u16,
        label: &[u8],
        context: &[u8],
        out: &mut Buf,
        output_len: usize,
    ) -> Result<(), String>;
}

// ============================================================================
// Core Provider Struct
// ============================================================================

/// Cryptographic provider for the handshake, the record layer and tokens.
///
/// Components are `&'static dyn Trait` references so a provider is cheap to
/// clone and dispatch has no allocation.
#[derive(Debug, Clone)]
pub struct CryptoProvider {
    /// Record protection ciphers.
    pub aeads: &'static [&'static dyn SupportedAead],

    /// Classical key exchange groups.
    pub kx_groups: &'static [&'static dyn SupportedKxGroup],

    /// Post-quantum KEMs.
    pub kems: &'static [&'static dyn SupportedKem],

    /// Signature schemes.
    pub signatures: &'static [&'static dyn SignatureScheme],

    pub secure_random: &'static dyn SecureRandom,

    pub hash_provider: &'static dyn HashProvider,

    pub hmac_provider: &'static dyn HmacProvider,

    pub hkdf_provider: &'static dyn HkdfProvider,
}

static DEFAULT: OnceLock<CryptoProvider> = OnceLock::new();

impl CryptoProvider {
    /// Install a process wide default provider.
    ///
    /// Used by [`Config::builder()`](crate::Config::builder) when no explicit
    /// provider is set. Fails if a default is already installed.
    pub fn install_default(provider: CryptoProvider) -> Result<(), Error> {
        provider.validate()?;
        DEFAULT
            .set(provider)
            .map_err(|_| Error::Config("default crypto provider already installed".into()))
    }

    /// The installed default provider, if any.
    pub fn get_default() -> Option<&'static CryptoProvider> {
        DEFAULT.get()
    }

    pub fn find_aead(&self, algorithm: AeadAlgorithm) -> Option<&'static dyn SupportedAead> {
        self.aeads.iter().copied().find(|a| a.algorithm() == algorithm)
    }

    pub fn find_kx_group(&self, group: NamedGroup) -> Option<&'static dyn SupportedKxGroup> {
        self.kx_groups.iter().copied().find(|g| g.name() == group)
    }

    pub fn find_kem(&self, algorithm: KemAlgorithm) -> Option<&'static dyn SupportedKem> {
        self.kems.iter().copied().find(|k| k.algorithm() == algorithm)
    }

    pub fn find_signature(
        &self,
        algorithm: SignatureAlgorithm,
    ) -> Option<&'static dyn SignatureScheme> {
        self.signatures
            .iter()
            .copied()
            .find(|s| s.algorithm() == algorithm)
    }

    /// Whether every primitive the suite needs is available.
    pub fn supports_suite(&self, suite: CipherSuite) -> bool {
        let Some(kx) = suite.key_exchange() else {
            return false;
        };
        let kx_ok = match kx {
            KeyExchange::Classical(g) => self.find_kx_group(g).is_some(),
            KeyExchange::PostQuantum(k) => self.find_kem(k).is_some(),
            KeyExchange::Hybrid(g, k) => {
                self.find_kx_group(g).is_some() && self.find_kem(k).is_some()
            }
        };
        let aead_ok = suite
            .aead()
            .map(|a| self.find_aead(a).is_some())
            .unwrap_or(false);
        let sig_ok = suite
            .signature_algorithms()
            .iter()
            .all(|s| self.find_signature(*s).is_some());

        kx_ok && aead_ok && sig_ok
    }

    /// Check the provider is usable at all.
    ///
    /// At least one cipher suite must be fully supported and every AEAD must
    /// use the 12 byte nonce the record layer builds.
    pub fn validate(&self) -> Result<(), Error> {
        for aead in self.aeads {
            if aead.iv_len() != 12 {
                return Err(Error::Config(format!(
                    "{:?} uses a {} byte nonce, expected 12",
                    aead.algorithm(),
                    aead.iv_len()
                )));
            }
        }

        if !CipherSuite::all().iter().any(|s| self.supports_suite(*s)) {
            return Err(Error::Config(
                "crypto provider supports no cipher suite".into(),
            ));
        }

        let mut sample = [0u8; 16];
        self.secure_random
            .fill(&mut sample)
            .map_err(|e| Error::Config(format!("secure random failed: {}", e)))?;

        Ok(())
    }
}
