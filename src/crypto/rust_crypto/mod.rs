//! Pure Rust crypto backend.
//!
//! Classical primitives come from the [RustCrypto](https://github.com/RustCrypto)
//! and dalek crates, post-quantum ones from the `pqcrypto` family.
//!
//! ```
//! use std::sync::Arc;
//! use dualstack::Config;
//! use dualstack::crypto::rust_crypto;
//!
//! let config = Arc::new(
//!     Config::builder()
//!         .with_crypto_provider(rust_crypto::default_provider())
//!         .build()
//!         .unwrap()
//! );
//! # let _ = config;
//! ```

mod aead;
mod hash;
mod hkdf;
mod hmac;
mod kem;
mod kx_group;
mod random;
mod sign;

use crate::crypto::provider::CryptoProvider;

/// The RustCrypto based provider.
///
/// # AEADs
///
/// - AES-128-GCM, AES-256-GCM (`aes-gcm`)
/// - ChaCha20-Poly1305 (`chacha20poly1305`)
///
/// # Key exchange
///
/// - X25519 (`x25519-dalek`)
/// - ML-KEM-768 (`pqcrypto-mlkem`)
///
/// # Signatures
///
/// - Ed25519 (`ed25519-dalek`)
/// - ML-DSA-65 (`pqcrypto-mldsa`)
///
/// # Hash, HMAC, HKDF
///
/// SHA-256 and SHA-384 via `sha2`, `hmac` and `hkdf`.
pub fn default_provider() -> CryptoProvider {
    CryptoProvider {
        aeads: aead::ALL_AEADS,
        kx_groups: kx_group::ALL_KX_GROUPS,
        kems: kem::ALL_KEMS,
        signatures: sign::ALL_SIGNATURES,
        secure_random: &random::SECURE_RANDOM,
        hash_provider: &hash::HASH_PROVIDER,
        hmac_provider: &hmac::HMAC_PROVIDER,
        hkdf_provider: &hkdf::HKDF_PROVIDER,
    }
}
