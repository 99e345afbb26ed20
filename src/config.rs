use std::time::Duration;

use crate::crypto::{rust_crypto, CryptoProvider};
use crate::types::{CipherSuite, SignatureAlgorithm};
use crate::Error;

/// Handshake and session configuration, shared by clients and servers.
#[derive(Debug, Clone)]
pub struct Config {
    cipher_suites: Vec<CipherSuite>,
    require_pqc: bool,
    step_timeout: Duration,
    session_lifetime: Duration,
    max_record_plaintext: usize,
    trusted_keys: Vec<TrustedKey>,
    crypto_provider: CryptoProvider,
}

/// A pinned server public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustedKey {
    pub algorithm: SignatureAlgorithm,
    pub public_key: Vec<u8>,
}

impl Config {
    /// Create a new configuration builder.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder {
            cipher_suites: CipherSuite::all().to_vec(),
            require_pqc: false,
            step_timeout: Duration::from_secs(10),
            session_lifetime: Duration::from_secs(30 * 60),
            max_record_plaintext: 16 * 1024,
            trusted_keys: Vec::new(),
            crypto_provider: None,
        }
    }

    /// Cipher suites in preference order.
    ///
    /// A client offers them in this order. A server picks from this list.
    #[inline(always)]
    pub fn cipher_suites(&self) -> &[CipherSuite] {
        &self.cipher_suites
    }

    /// Refuse to complete a handshake on a classical suite.
    #[inline(always)]
    pub fn require_pqc(&self) -> bool {
        self.require_pqc
    }

    /// Longest wait for any single handshake message.
    #[inline(always)]
    pub fn step_timeout(&self) -> Duration {
        self.step_timeout
    }

    /// How long a server keeps a session resumable.
    #[inline(always)]
    pub fn session_lifetime(&self) -> Duration {
        self.session_lifetime
    }

    /// Largest plaintext in one application data record.
    #[inline(always)]
    pub fn max_record_plaintext(&self) -> usize {
        self.max_record_plaintext
    }

    /// Server keys a client accepts. Empty means any key that signs correctly.
    #[inline(always)]
    pub fn trusted_keys(&self) -> &[TrustedKey] {
        &self.trusted_keys
    }

    /// Cryptographic provider.
    #[inline(always)]
    pub fn crypto_provider(&self) -> &CryptoProvider {
        &self.crypto_provider
    }
}

/// Builder for [`Config`].
pub struct ConfigBuilder {
    cipher_suites: Vec<CipherSuite>,
    require_pqc: bool,
    step_timeout: Duration,
    session_lifetime: Duration,
    max_record_plaintext: usize,
    trusted_keys: Vec<TrustedKey>,
    crypto_provider: Option<CryptoProvider>,
}

impl ConfigBuilder {
    /// Set the cipher suites in preference order.
    ///
    /// Defaults to every known suite, post-quantum first.
    pub fn cipher_suites(mut self, suites: &[CipherSuite]) -> Self {
        self.cipher_suites = suites.to_vec();
        self
    }

    /// Set whether a post-quantum suite is mandatory.
    ///
    /// Defaults to false.
    pub fn require_pqc(mut self, require: bool) -> Self {
        self.require_pqc = require;
        self
    }

    /// Set the per message handshake timeout.
    ///
    /// Defaults to 10 seconds.
    pub fn step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = timeout;
        self
    }

    /// Set how long resumable sessions live.
    ///
    /// Defaults to 30 minutes.
    pub fn session_lifetime(mut self, lifetime: Duration) -> Self {
        self.session_lifetime = lifetime;
        self
    }

    /// Set the largest application data plaintext per record.
    ///
    /// Defaults to 16384.
    pub fn max_record_plaintext(mut self, max: usize) -> Self {
        self.max_record_plaintext = max;
        self
    }

    /// Pin a server public key. May be called more than once.
    pub fn trust_key(mut self, algorithm: SignatureAlgorithm, public_key: &[u8]) -> Self {
        self.trusted_keys.push(TrustedKey {
            algorithm,
            public_key: public_key.to_vec(),
        });
        self
    }

    /// Set a custom crypto provider.
    ///
    /// If not set, the default installed via
    /// [`CryptoProvider::install_default`] is used, and failing that the
    /// built in [`rust_crypto`] provider.
    pub fn with_crypto_provider(mut self, provider: CryptoProvider) -> Self {
        self.crypto_provider = Some(provider);
        self
    }

    /// Build the configuration.
    ///
    /// Returns `Error::Config` if the provider is invalid, if the suite list
    /// is empty, repeats a suite or names one the provider cannot run, or if
    /// `require_pqc` is set without any post-quantum suite.
    pub fn build(self) -> Result<Config, Error> {
        let crypto_provider = self
            .crypto_provider
            .or_else(|| CryptoProvider::get_default().cloned())
            .unwrap_or_else(rust_crypto::default_provider);

        crypto_provider.validate()?;

        if self.cipher_suites.is_empty() {
            return Err(Error::Config("no cipher suites configured".into()));
        }
        if self.cipher_suites.len() > crate::types::MAX_OFFERED_SUITES {
            return Err(Error::Config(format!(
                "at most {} cipher suites",
                crate::types::MAX_OFFERED_SUITES
            )));
        }

        for (i, suite) in self.cipher_suites.iter().enumerate() {
            if self.cipher_suites[..i].contains(suite) {
                return Err(Error::Config(format!("duplicate cipher suite {}", suite)));
            }
            if !crypto_provider.supports_suite(*suite) {
                return Err(Error::Config(format!(
                    "cipher suite {} not supported by the crypto provider",
                    suite
                )));
            }
        }

        if self.require_pqc && !self.cipher_suites.iter().any(|s| s.is_post_quantum()) {
            return Err(Error::Config(
                "require_pqc set but no post-quantum cipher suite configured".into(),
            ));
        }

        if self.step_timeout.is_zero() {
            return Err(Error::Config("step_timeout must be non-zero".into()));
        }

        if self.max_record_plaintext == 0
            || self.max_record_plaintext > crate::handshake::MAX_RECORD_PLAINTEXT
        {
            return Err(Error::Config(format!(
                "max_record_plaintext must be in 1..={}",
                crate::handshake::MAX_RECORD_PLAINTEXT
            )));
        }

        Ok(Config {
            cipher_suites: self.cipher_suites,
            require_pqc: self.require_pqc,
            step_timeout: self.step_timeout,
            session_lifetime: self.session_lifetime,
            max_record_plaintext: self.max_record_plaintext,
            trusted_keys: self.trusted_keys,
            crypto_provider,
        })
    }
}
