// Server flow:
//
// 1. Receive ClientHello.
//    - A known, unexpired session id whose suite is still acceptable:
//      send a resumed ServerHello and Finished, Established at once, then
//      verify the client Finished.
//    - Otherwise select a suite, run the key exchange against the client's
//      shares and send ServerHello.
// 2. Send CertificateVerify with one signature per suite signature algorithm.
// 3. Send Finished.
// 4. Receive and verify the client Finished. Established, and the session is
//    cached for resumption.

use std::sync::Arc;

use subtle::ConstantTimeEq;

use crate::buffer::Buf;
use crate::config::Config;
use crate::crypto::{hybrid, SecretBytes};
use crate::error::HandshakeError;
use crate::message::{CertificateVerify, ClientHello, Finished, Message, ServerHello};
use crate::message::SignatureEntry;
use crate::types::{CipherSuite, CipherSuiteVec, MessageType, Random, SessionId};

use super::engine::Engine;
use super::identity::ServerIdentity;
use super::key_schedule::{KeySchedule, Side};
use super::negotiate::select_cipher_suite;
use super::session::SessionCache;
use super::{HandshakeState, SIGNATURE_CONTEXT};

pub(crate) struct Server {
    pub(super) engine: Engine,

    step: Step,

    identity: Arc<ServerIdentity>,

    cache: Arc<SessionCache>,

    key_schedule: Option<KeySchedule>,

    /// Hash(ClientHello || ServerHello)
    hello_hash: Option<Buf>,

    session_id: SessionId,

    resumed: bool,
}

impl Server {
    pub fn new(
        config: Arc<Config>,
        identity: Arc<ServerIdentity>,
        cache: Arc<SessionCache>,
    ) -> Server {
        Server {
            engine: Engine::new(config, false),
            step: Step::AwaitClientHello,
            identity,
            cache,
            key_schedule: None,
            hello_hash: None,
            session_id: SessionId::empty(),
            resumed: false,
        }
    }

    pub fn handle_frame(&mut self, frame: &[u8]) -> Result<(), HandshakeError> {
        self.engine.handle_frame(frame)?;
        self.make_progress()
    }

    pub fn is_resumed(&self) -> bool {
        self.resumed
    }

    fn make_progress(&mut self) -> Result<(), HandshakeError> {
        loop {
            let prev = self.step;
            let next = prev.make_progress(self)?;
            if prev == next {
                break;
            }
            trace!("Server {:?} -> {:?}", prev, next);
            self.step = next;
        }
        Ok(())
    }

    fn key_schedule(&self) -> Result<(&KeySchedule, &Buf), HandshakeError> {
        match (&self.key_schedule, &self.hello_hash) {
            (Some(ks), Some(h)) => Ok((ks, h)),
            _ => Err(HandshakeError::InvalidState("keys not derived")),
        }
    }

    fn suite(&self) -> Result<CipherSuite, HandshakeError> {
        self.engine
            .suite()
            .ok_or(HandshakeError::InvalidState("no suite"))
    }

    /// Suites the client can actually run with us: it sent the key shares
    /// and we hold the signing keys.
    fn candidates(&self, hello: &ClientHello) -> CipherSuiteVec {
        hello
            .cipher_suites
            .iter()
            .copied()
            .filter(|s| {
                let Some(kx) = s.key_exchange() else {
                    return false;
                };
                let group_ok = kx.group().is_none() || !hello.x25519_share.is_empty();
                let kem_ok = kx.kem().is_none() || !hello.kem_share.is_empty();
                group_ok && kem_ok && self.identity.supports(s.signature_algorithms())
            })
            .collect()
    }

    /// A cached session the client can resume, if any.
    fn resumable(&self, hello: &ClientHello) -> Option<(CipherSuite, SecretBytes)> {
        if hello.session_id.is_empty() {
            return None;
        }
        let Some((suite, secret)) = self.cache.lookup(&hello.session_id) else {
            debug!("Unknown or expired session {:?}", hello.session_id);
            return None;
        };

        let config = self.engine.config();
        let acceptable = hello.cipher_suites.contains(&suite)
            && config.cipher_suites().contains(&suite)
            && (!config.require_pqc() || suite.is_post_quantum());
        if !acceptable {
            debug!("Cached {} no longer acceptable", suite);
            return None;
        }
        Some((suite, secret))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    AwaitClientHello,
    SendCertificateVerify,
    SendFinished,
    AwaitFinished,
    Connected,
}

impl Step {
    fn make_progress(self, server: &mut Server) -> Result<Self, HandshakeError> {
        match self {
            Step::AwaitClientHello => self.await_client_hello(server),
            Step::SendCertificateVerify => self.send_certificate_verify(server),
            Step::SendFinished => self.send_finished(server),
            Step::AwaitFinished => self.await_finished(server),
            Step::Connected => self.connected(server),
        }
    }

    fn await_client_hello(self, server: &mut Server) -> Result<Self, HandshakeError> {
        let Some(message) = server.engine.expect_message(MessageType::ClientHello)? else {
            return Ok(self);
        };
        let Message::ClientHello(hello) = message else {
            unreachable!()
        };

        let provider = server.engine.provider().clone();
        let random = Random::new(provider.secure_random).map_err(HandshakeError::Crypto)?;

        if let Some((suite, secret)) = server.resumable(&hello) {
            debug!("Resuming {:?} with {}", hello.session_id, suite);
            server.engine.set_suite(suite);
            server.session_id = hello.session_id.clone();
            server.resumed = true;

            server.engine.send_message(&Message::ServerHello(ServerHello {
                random,
                session_id: hello.session_id,
                cipher_suite: suite,
                resumed: true,
                x25519_share: Vec::new(),
                kem_ciphertext: Vec::new(),
            }));

            let key_schedule = KeySchedule::new(&provider, suite, &secret)?;
            derive_and_install(server, key_schedule)?;
            return Ok(Step::SendFinished);
        }

        server.engine.set_state(HandshakeState::SuiteProposed);

        let candidates = server.candidates(&hello);
        let config = server.engine.config();
        let suite = select_cipher_suite(config.cipher_suites(), &candidates)
            .ok_or(HandshakeError::NoCommonCipherSuite)?;

        if config.require_pqc() && !suite.is_post_quantum() {
            return Err(HandshakeError::PolicyViolation(format!(
                "client offered no post-quantum suite, best was {}",
                suite
            )));
        }
        server.engine.set_suite(suite);
        server.engine.set_state(HandshakeState::SuiteAgreed);
        debug!("Selected {}", suite);

        let kx = suite
            .key_exchange()
            .ok_or(HandshakeError::InvalidState("suite without key exchange"))?;

        let mut x25519_share = Vec::new();
        let classical = match kx.group() {
            Some(group) => {
                let exchange = provider
                    .find_kx_group(group)
                    .ok_or_else(|| HandshakeError::Crypto(format!("no {:?} group", group)))?
                    .start_exchange()
                    .map_err(HandshakeError::Crypto)?;
                x25519_share = exchange.pub_key().to_vec();
                let mut out = Buf::new();
                exchange
                    .complete(&hello.x25519_share, &mut out)
                    .map_err(HandshakeError::Crypto)?;
                Some(SecretBytes::new(out.to_vec()))
            }
            None => None,
        };

        let mut kem_ciphertext = Vec::new();
        let pqc = match kx.kem() {
            Some(kem) => {
                let (ct, secret) = provider
                    .find_kem(kem)
                    .ok_or_else(|| HandshakeError::Crypto(format!("no {:?} KEM", kem)))?
                    .encapsulate(&hello.kem_share)
                    .map_err(HandshakeError::Crypto)?;
                kem_ciphertext = ct;
                Some(secret)
            }
            None => None,
        };

        let ikm = match (classical, pqc) {
            (Some(c), Some(p)) => hybrid::combine(&c, &p),
            (Some(c), None) => c,
            (None, Some(p)) => p,
            (None, None) => return Err(HandshakeError::InvalidState("empty key exchange")),
        };

        server.session_id =
            SessionId::random(provider.secure_random).map_err(HandshakeError::Crypto)?;

        server.engine.send_message(&Message::ServerHello(ServerHello {
            random,
            session_id: server.session_id.clone(),
            cipher_suite: suite,
            resumed: false,
            x25519_share,
            kem_ciphertext,
        }));

        let key_schedule = KeySchedule::new(&provider, suite, &ikm)?;
        derive_and_install(server, key_schedule)?;

        Ok(Step::SendCertificateVerify)
    }

    fn send_certificate_verify(self, server: &mut Server) -> Result<Self, HandshakeError> {
        let suite = server.suite()?;
        let (_, hello_hash) = server.key_schedule()?;

        let mut signed = Buf::with_capacity(SIGNATURE_CONTEXT.len() + hello_hash.len());
        signed.extend_from_slice(SIGNATURE_CONTEXT);
        signed.extend_from_slice(hello_hash);

        let provider = server.engine.provider().clone();
        let mut cv = CertificateVerify {
            entries: Default::default(),
        };

        for algorithm in suite.signature_algorithms() {
            let scheme = provider.find_signature(*algorithm).ok_or_else(|| {
                HandshakeError::Crypto(format!("no {:?} signature scheme", algorithm))
            })?;
            let (Some(pk), Some(sk)) = (
                server.identity.public_key(*algorithm),
                server.identity.secret_key(*algorithm),
            ) else {
                return Err(HandshakeError::InvalidState("no signing key for suite"));
            };

            let signature = scheme.sign(&signed, sk).map_err(HandshakeError::Crypto)?;
            cv.entries.push(SignatureEntry {
                algorithm: *algorithm,
                public_key: pk.to_vec(),
                signature,
            });
        }

        server.engine.send_message(&Message::CertificateVerify(cv));
        Ok(Step::SendFinished)
    }

    fn send_finished(self, server: &mut Server) -> Result<Self, HandshakeError> {
        let transcript_hash = server.engine.transcript_hash()?;
        let (ks, hello_hash) = server.key_schedule()?;
        let finished_key = ks.finished_key(Side::Server, hello_hash)?;
        let verify_data = ks.verify_data(&finished_key, &transcript_hash)?;

        server.engine.send_message(&Message::Finished(Finished {
            verify_data: verify_data.to_vec(),
        }));

        if server.resumed {
            server.engine.set_state(HandshakeState::Established);
        }
        Ok(Step::AwaitFinished)
    }

    fn await_finished(self, server: &mut Server) -> Result<Self, HandshakeError> {
        let transcript_hash = server.engine.transcript_hash()?;
        let Some(message) = server.engine.expect_message(MessageType::Finished)? else {
            return Ok(self);
        };
        let Message::Finished(finished) = message else {
            unreachable!()
        };

        let (ks, hello_hash) = server.key_schedule()?;
        let finished_key = ks.finished_key(Side::Client, hello_hash)?;
        let expected = ks.verify_data(&finished_key, &transcript_hash)?;

        if !bool::from(expected.ct_eq(&finished.verify_data)) {
            return Err(HandshakeError::HandshakeVerificationFailed(
                "client Finished mismatch".into(),
            ));
        }

        if !server.resumed {
            let suite = server.suite()?;
            let secret = ks.resumption_secret(hello_hash)?;
            let lifetime = server.engine.config().session_lifetime();
            server
                .cache
                .insert(server.session_id.clone(), suite, secret, lifetime);
        }

        server.engine.set_state(HandshakeState::Established);
        Ok(Step::Connected)
    }

    fn connected(self, server: &mut Server) -> Result<Self, HandshakeError> {
        if let Some(m) = server.engine.next_message() {
            return Err(HandshakeError::UnexpectedMessage(format!(
                "{:?} after the handshake",
                m.message.msg_type()
            )));
        }
        Ok(self)
    }
}

fn derive_and_install(
    server: &mut Server,
    key_schedule: KeySchedule,
) -> Result<(), HandshakeError> {
    let hello_hash = server.engine.transcript_hash()?;
    let keys = key_schedule.session_keys(&hello_hash)?;
    server.engine.install_keys(keys)?;
    // A resumed session goes straight from Idle to Established.
    if !server.resumed {
        server.engine.set_state(HandshakeState::KeysExchanged);
    }
    server.key_schedule = Some(key_schedule);
    server.hello_hash = Some(hello_hash);
    Ok(())
}
