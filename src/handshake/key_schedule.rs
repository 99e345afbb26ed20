//! Session key derivation.
//!
//! ```text
//! salt = "dsn1 suite" || suite_id
//! prk  = HKDF-Extract(salt, ikm)
//! key  = HKDF-Expand-Label(prk, label, Hash(ClientHello || ServerHello), len)
//! ```
//!
//! `ikm` is the key exchange output on a full handshake and the cached
//! resumption secret on a resumed one. The hello context makes every
//! session's keys unique even when the ikm repeats.

use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::buffer::Buf;
use crate::crypto::{CryptoProvider, SecretBytes};
use crate::error::HandshakeError;
use crate::types::{CipherSuite, HashAlgorithm};

const SALT_PREFIX: &[u8] = b"dsn1 suite";

/// Symmetric keys of one session.
///
/// Zeroed when dropped.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SessionKeys {
    client_write_key: Vec<u8>,
    server_write_key: Vec<u8>,
    client_write_iv: Vec<u8>,
    server_write_iv: Vec<u8>,
}

impl SessionKeys {
    pub fn client_write_key(&self) -> &[u8] {
        &self.client_write_key
    }

    pub fn server_write_key(&self) -> &[u8] {
        &self.server_write_key
    }

    pub fn client_write_iv(&self) -> &[u8] {
        &self.client_write_iv
    }

    pub fn server_write_iv(&self) -> &[u8] {
        &self.server_write_iv
    }
}

impl fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionKeys")
            .field("key_len", &self.client_write_key.len())
            .field("iv_len", &self.client_write_iv.len())
            .finish_non_exhaustive()
    }
}

/// Which side a finished key belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Side {
    Client,
    Server,
}

/// The extracted secret of one session, bound to its suite.
pub(crate) struct KeySchedule {
    provider: CryptoProvider,
    suite: CipherSuite,
    hash: HashAlgorithm,
    prk: Buf,
}

impl KeySchedule {
    pub fn new(
        provider: &CryptoProvider,
        suite: CipherSuite,
        ikm: &[u8],
    ) -> Result<KeySchedule, HandshakeError> {
        let hash = suite
            .hash_algorithm()
            .ok_or(HandshakeError::InvalidState("suite without hash"))?;

        let mut salt = Buf::with_capacity(SALT_PREFIX.len() + 2);
        salt.extend_from_slice(SALT_PREFIX);
        salt.put_u16(suite.as_u16());

        let mut prk = Buf::new();
        provider
            .hkdf_provider
            .hkdf_extract(hash, &salt, ikm, &mut prk)
            .map_err(HandshakeError::Crypto)?;

        Ok(KeySchedule {
            provider: provider.clone(),
            suite,
            hash,
            prk,
        })
    }

    fn expand(&self, label: &[u8], context: &[u8], len: usize) -> Result<Buf, HandshakeError> {
        let mut out = Buf::new();
        self.provider
            .hkdf_provider
            .hkdf_expand_label(
                self.hash,
                &self.prk,
                self.suite.as_u16(),
                label,
                context,
                &mut out,
                len,
            )
            .map_err(HandshakeError::Crypto)?;
        Ok(out)
    }

    /// Derive the record keys. `hello_hash` is Hash(ClientHello || ServerHello).
    pub fn session_keys(&self, hello_hash: &[u8]) -> Result<SessionKeys, HandshakeError> {
        let aead = self
            .suite
            .aead()
            .and_then(|a| self.provider.find_aead(a))
            .ok_or_else(|| HandshakeError::Crypto(format!("no AEAD for {}", self.suite)))?;

        let key_len = aead.key_len();
        let iv_len = aead.iv_len();

        Ok(SessionKeys {
            client_write_key: self.expand(b"c key", hello_hash, key_len)?.into_vec(),
            server_write_key: self.expand(b"s key", hello_hash, key_len)?.into_vec(),
            client_write_iv: self.expand(b"c iv", hello_hash, iv_len)?.into_vec(),
            server_write_iv: self.expand(b"s iv", hello_hash, iv_len)?.into_vec(),
        })
    }

    pub fn finished_key(&self, side: Side, hello_hash: &[u8]) -> Result<Buf, HandshakeError> {
        let label: &[u8] = match side {
            Side::Client => b"c finished",
            Side::Server => b"s finished",
        };
        self.expand(label, hello_hash, self.hash.output_len())
    }

    pub fn resumption_secret(&self, hello_hash: &[u8]) -> Result<SecretBytes, HandshakeError> {
        let secret = self.expand(b"resumption", hello_hash, self.hash.output_len())?;
        Ok(SecretBytes::new(secret.into_vec()))
    }

    /// Finished verify_data: HMAC(finished_key, transcript_hash).
    pub fn verify_data(
        &self,
        finished_key: &[u8],
        transcript_hash: &[u8],
    ) -> Result<Buf, HandshakeError> {
        let mut out = Buf::new();
        self.provider
            .hmac_provider
            .hmac(self.hash, finished_key, transcript_hash, &mut out)
            .map_err(HandshakeError::Crypto)?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::rust_crypto;

    #[test]
    fn key_lengths_follow_the_suite() {
        let provider = rust_crypto::default_provider();
        let ks = KeySchedule::new(&provider, CipherSuite::AES_128_GCM_SHA256, &[1; 32]).unwrap();
        let keys = ks.session_keys(&[0; 32]).unwrap();
        assert_eq!(keys.client_write_key().len(), 16);
        assert_eq!(keys.client_write_iv().len(), 12);
        assert_ne!(keys.client_write_key(), keys.server_write_key());

        let ks = KeySchedule::new(&provider, CipherSuite::AES_256_GCM_SHA384, &[1; 32]).unwrap();
        assert_eq!(ks.session_keys(&[0; 48]).unwrap().server_write_key().len(), 32);
        assert_eq!(ks.finished_key(Side::Client, &[0; 48]).unwrap().len(), 48);
    }

    #[test]
    fn suite_and_context_change_keys() {
        let provider = rust_crypto::default_provider();
        let a = KeySchedule::new(&provider, CipherSuite::AES_256_GCM_SHA384, &[7; 32]).unwrap();
        let b =
            KeySchedule::new(&provider, CipherSuite::MLKEM768_AES_256_GCM_SHA384, &[7; 32]).unwrap();

        let ka = a.session_keys(&[0; 48]).unwrap();
        let kb = b.session_keys(&[0; 48]).unwrap();
        assert_ne!(ka.client_write_key(), kb.client_write_key());

        let ka2 = a.session_keys(&[1; 48]).unwrap();
        assert_ne!(ka.client_write_key(), ka2.client_write_key());

        let ka3 = a.session_keys(&[0; 48]).unwrap();
        assert_eq!(ka, ka3);
    }

    #[test]
    fn debug_hides_key_material() {
        let provider = rust_crypto::default_provider();
        let ks = KeySchedule::new(&provider, CipherSuite::AES_128_GCM_SHA256, &[9; 32]).unwrap();
        let keys = ks.session_keys(&[0; 32]).unwrap();
        let s = format!("{:?}", keys);
        assert!(s.contains("key_len: 16"));
    }
}
