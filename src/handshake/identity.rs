use std::fmt;

use crate::crypto::{CryptoProvider, SecretBytes};
use crate::error::Error;
use crate::types::SignatureAlgorithm;

struct KeyPair {
    algorithm: SignatureAlgorithm,
    public_key: Vec<u8>,
    secret_key: SecretBytes,
}

/// Long term signing keys of a server.
///
/// A suite can only be selected when the identity holds a key for every
/// signature algorithm the suite requires.
pub struct ServerIdentity {
    keys: Vec<KeyPair>,
}

impl ServerIdentity {
    /// Fresh keys for every signature scheme of the provider.
    pub fn generate(provider: &CryptoProvider) -> Result<ServerIdentity, Error> {
        let mut keys = Vec::with_capacity(provider.signatures.len());
        for scheme in provider.signatures {
            let (public_key, secret_key) = scheme
                .generate_keypair()
                .map_err(|e| Error::Config(format!("{:?} keygen: {}", scheme.algorithm(), e)))?;
            keys.push(KeyPair {
                algorithm: scheme.algorithm(),
                public_key,
                secret_key,
            });
        }
        Ok(ServerIdentity { keys })
    }

    /// An identity without keys. Add keys with [`ServerIdentity::with_key`].
    pub fn empty() -> ServerIdentity {
        ServerIdentity { keys: Vec::new() }
    }

    /// Add or replace the key for one algorithm.
    pub fn with_key(
        mut self,
        algorithm: SignatureAlgorithm,
        public_key: &[u8],
        secret_key: &[u8],
    ) -> ServerIdentity {
        self.keys.retain(|k| k.algorithm != algorithm);
        self.keys.push(KeyPair {
            algorithm,
            public_key: public_key.to_vec(),
            secret_key: SecretBytes::new(secret_key.to_vec()),
        });
        self
    }

    pub fn public_key(&self, algorithm: SignatureAlgorithm) -> Option<&[u8]> {
        self.find(algorithm).map(|k| &k.public_key[..])
    }

    pub fn supports(&self, algorithms: &[SignatureAlgorithm]) -> bool {
        algorithms.iter().all(|a| self.find(*a).is_some())
    }

    pub(crate) fn secret_key(&self, algorithm: SignatureAlgorithm) -> Option<&[u8]> {
        self.find(algorithm).map(|k| &k.secret_key[..])
    }

    fn find(&self, algorithm: SignatureAlgorithm) -> Option<&KeyPair> {
        self.keys.iter().find(|k| k.algorithm == algorithm)
    }
}

impl fmt::Debug for ServerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let algs: Vec<_> = self.keys.iter().map(|k| k.algorithm).collect();
        f.debug_struct("ServerIdentity")
            .field("algorithms", &algs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::rust_crypto;

    #[test]
    fn generated_identity_covers_every_suite() {
        let provider = rust_crypto::default_provider();
        let id = ServerIdentity::generate(&provider).unwrap();
        for suite in crate::types::CipherSuite::all() {
            assert!(id.supports(suite.signature_algorithms()), "{}", suite);
        }
        assert_eq!(id.public_key(SignatureAlgorithm::Ed25519).unwrap().len(), 32);
    }

    #[test]
    fn partial_identity() {
        let provider = rust_crypto::default_provider();
        let ed = provider.find_signature(SignatureAlgorithm::Ed25519).unwrap();
        let (pk, sk) = ed.generate_keypair().unwrap();
        let id = ServerIdentity::empty().with_key(SignatureAlgorithm::Ed25519, &pk, &sk);
        assert!(id.supports(&[SignatureAlgorithm::Ed25519]));
        assert!(!id.supports(&[SignatureAlgorithm::Ed25519, SignatureAlgorithm::MlDsa65]));
    }
}
