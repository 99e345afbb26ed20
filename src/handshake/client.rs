// Client flow:
//
// 1. Send ClientHello: suites in preference order, an X25519 share and/or an
//    ML-KEM-768 encapsulation key, and the session id of a ticket if we have
//    one that has not expired.
// 2. Receive ServerHello. The suite must be one we offered.
//    - resumed: keys come from the ticket secret, go to 5.
//    - full: finish X25519 and/or decapsulate, derive keys.
// 3. Receive CertificateVerify, one signature per suite signature algorithm
//    over Hash(ClientHello || ServerHello). Pinned keys are enforced here.
// 4. (full only) nothing more before Finished.
// 5. Receive server Finished and verify it.
// 6. Send our Finished. Established.

use std::sync::Arc;
use std::time::Instant;

use subtle::ConstantTimeEq;

use crate::buffer::Buf;
use crate::config::Config;
use crate::crypto::{hybrid, ActiveKeyExchange, SecretBytes};
use crate::error::HandshakeError;
use crate::message::{ClientHello, Finished, Message};
use crate::types::{CipherSuite, CipherSuiteVec, KeyExchange, MessageType, Random};
use crate::types::{SessionId, SignatureAlgorithm};

use super::engine::Engine;
use super::key_schedule::{KeySchedule, Side};
use super::session::ResumptionTicket;
use super::{HandshakeState, SIGNATURE_CONTEXT};

pub(crate) struct Client {
    pub(super) engine: Engine,

    step: Step,

    /// Set by `start`.
    started: bool,

    /// Ticket offered for resumption.
    ticket: Option<ResumptionTicket>,

    /// Ticket for the next connection, once established.
    new_ticket: Option<ResumptionTicket>,

    offered: CipherSuiteVec,

    x25519: Option<Box<dyn ActiveKeyExchange>>,

    kem_secret: Option<SecretBytes>,

    key_schedule: Option<KeySchedule>,

    /// Hash(ClientHello || ServerHello)
    hello_hash: Option<Buf>,

    session_id: SessionId,

    resumed: bool,

    /// Server keys that signed the transcript.
    server_keys: Vec<(SignatureAlgorithm, Vec<u8>)>,
}

impl Client {
    pub fn new(config: Arc<Config>, ticket: Option<ResumptionTicket>) -> Client {
        Client {
            engine: Engine::new(config, true),
            step: Step::SendClientHello,
            started: false,
            ticket,
            new_ticket: None,
            offered: CipherSuiteVec::new(),
            x25519: None,
            kem_secret: None,
            key_schedule: None,
            hello_hash: None,
            session_id: SessionId::empty(),
            resumed: false,
            server_keys: Vec::new(),
        }
    }

    pub fn start(&mut self) -> Result<(), HandshakeError> {
        if self.started {
            return Err(HandshakeError::InvalidState("handshake already started"));
        }
        self.started = true;
        self.make_progress()
    }

    pub fn handle_frame(&mut self, frame: &[u8]) -> Result<(), HandshakeError> {
        if !self.started {
            return Err(HandshakeError::InvalidState("handshake not started"));
        }
        self.engine.handle_frame(frame)?;
        self.make_progress()
    }

    pub fn is_resumed(&self) -> bool {
        self.resumed
    }

    pub fn resumption_ticket(&self) -> Option<&ResumptionTicket> {
        self.new_ticket.as_ref()
    }

    pub fn server_key(&self, algorithm: SignatureAlgorithm) -> Option<&[u8]> {
        self.server_keys
            .iter()
            .find(|(a, _)| *a == algorithm)
            .map(|(_, k)| &k[..])
    }

    fn make_progress(&mut self) -> Result<(), HandshakeError> {
        loop {
            let prev = self.step;
            let next = prev.make_progress(self)?;
            if prev == next {
                break;
            }
            trace!("Client {:?} -> {:?}", prev, next);
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
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    SendClientHello,
    AwaitServerHello,
    AwaitCertificateVerify,
    AwaitFinished,
    SendFinished,
    Connected,
}

impl Step {
    fn make_progress(self, client: &mut Client) -> Result<Self, HandshakeError> {
        match self {
            Step::SendClientHello => self.send_client_hello(client),
            Step::AwaitServerHello => self.await_server_hello(client),
            Step::AwaitCertificateVerify => self.await_certificate_verify(client),
            Step::AwaitFinished => self.await_finished(client),
            Step::SendFinished => self.send_finished(client),
            Step::Connected => self.connected(client),
        }
    }

    fn send_client_hello(self, client: &mut Client) -> Result<Self, HandshakeError> {
        let provider = client.engine.provider().clone();

        if client.ticket.as_ref().map(|t| t.is_expired()).unwrap_or(false) {
            debug!("Resumption ticket expired, full handshake");
            client.ticket = None;
        }
        let session_id = client
            .ticket
            .as_ref()
            .map(|t| t.session_id().clone())
            .unwrap_or_else(SessionId::empty);

        client.offered = client.engine.config().cipher_suites().iter().copied().collect();

        let kx: Vec<KeyExchange> = client
            .offered
            .iter()
            .filter_map(|s| s.key_exchange())
            .collect();

        let mut x25519_share = Vec::new();
        if let Some(group) = kx.iter().find_map(|k| k.group()) {
            let exchange = provider
                .find_kx_group(group)
                .ok_or_else(|| HandshakeError::Crypto(format!("no {:?} group", group)))?
                .start_exchange()
                .map_err(HandshakeError::Crypto)?;
            x25519_share = exchange.pub_key().to_vec();
            client.x25519 = Some(exchange);
        }

        let mut kem_share = Vec::new();
        if let Some(kem) = kx.iter().find_map(|k| k.kem()) {
            let (pk, sk) = provider
                .find_kem(kem)
                .ok_or_else(|| HandshakeError::Crypto(format!("no {:?} KEM", kem)))?
                .generate_keypair()
                .map_err(HandshakeError::Crypto)?;
            kem_share = pk;
            client.kem_secret = Some(sk);
        }

        let random = Random::new(provider.secure_random).map_err(HandshakeError::Crypto)?;

        let hello = ClientHello {
            random,
            session_id,
            cipher_suites: client.offered.clone(),
            x25519_share,
            kem_share,
        };
        client.engine.send_message(&Message::ClientHello(hello));
        client.engine.set_state(HandshakeState::SuiteProposed);

        Ok(Step::AwaitServerHello)
    }

    fn await_server_hello(self, client: &mut Client) -> Result<Self, HandshakeError> {
        let Some(message) = client.engine.expect_message(MessageType::ServerHello)? else {
            return Ok(self);
        };
        let Message::ServerHello(server_hello) = message else {
            unreachable!()
        };

        let suite = server_hello.cipher_suite;
        if !client.offered.contains(&suite) {
            return Err(HandshakeError::UnexpectedMessage(format!(
                "server selected {} which was not offered",
                suite
            )));
        }
        client.engine.set_suite(suite);

        if client.engine.config().require_pqc() && !suite.is_post_quantum() {
            return Err(HandshakeError::PolicyViolation(format!(
                "server selected classical suite {}",
                suite
            )));
        }
        client.engine.set_state(HandshakeState::SuiteAgreed);
        debug!("Negotiated {}", suite);

        let provider = client.engine.provider().clone();
        let hello_hash = client.engine.transcript_hash()?;
        client.session_id = server_hello.session_id.clone();

        let key_schedule = if server_hello.resumed {
            let ticket = client
                .ticket
                .as_ref()
                .filter(|t| t.session_id() == &server_hello.session_id && t.cipher_suite() == suite)
                .ok_or_else(|| {
                    HandshakeError::UnexpectedMessage("resumption of an unknown session".into())
                })?;
            debug!("Resuming {:?}", ticket.session_id());
            client.resumed = true;
            client.new_ticket = Some(ticket.clone());
            KeySchedule::new(&provider, suite, ticket.secret())?
        } else {
            let ikm = client_key_exchange(
                client,
                suite,
                &server_hello.x25519_share,
                &server_hello.kem_ciphertext,
            )?;
            KeySchedule::new(&provider, suite, &ikm)?
        };

        let keys = key_schedule.session_keys(&hello_hash)?;
        client.engine.install_keys(keys)?;
        client.engine.set_state(HandshakeState::KeysExchanged);

        client.key_schedule = Some(key_schedule);
        client.hello_hash = Some(hello_hash);

        // Drop what the exchange no longer needs.
        client.x25519 = None;
        client.kem_secret = None;

        if client.resumed {
            Ok(Step::AwaitFinished)
        } else {
            Ok(Step::AwaitCertificateVerify)
        }
    }

    fn await_certificate_verify(self, client: &mut Client) -> Result<Self, HandshakeError> {
        let Some(message) = client.engine.expect_message(MessageType::CertificateVerify)? else {
            return Ok(self);
        };
        let Message::CertificateVerify(cv) = message else {
            unreachable!()
        };

        let suite = client
            .engine
            .suite()
            .ok_or(HandshakeError::InvalidState("no suite"))?;
        let algorithms = suite.signature_algorithms();
        if cv.entries.len() != algorithms.len() {
            return Err(HandshakeError::HandshakeVerificationFailed(format!(
                "expected {} signatures, got {}",
                algorithms.len(),
                cv.entries.len()
            )));
        }

        let (_, hello_hash) = client.key_schedule()?;
        let mut signed = Buf::with_capacity(SIGNATURE_CONTEXT.len() + hello_hash.len());
        signed.extend_from_slice(SIGNATURE_CONTEXT);
        signed.extend_from_slice(hello_hash);

        let provider = client.engine.provider().clone();
        let trusted = client.engine.config().trusted_keys().to_vec();

        for algorithm in algorithms {
            let entry = cv.entry(*algorithm).ok_or_else(|| {
                HandshakeError::HandshakeVerificationFailed(format!(
                    "missing {:?} signature",
                    algorithm
                ))
            })?;

            let scheme = provider.find_signature(*algorithm).ok_or_else(|| {
                HandshakeError::Crypto(format!("no {:?} signature scheme", algorithm))
            })?;

            if !scheme.verify(&signed, &entry.signature, &entry.public_key) {
                return Err(HandshakeError::HandshakeVerificationFailed(format!(
                    "bad {:?} signature",
                    algorithm
                )));
            }

            if !trusted.is_empty()
                && !trusted
                    .iter()
                    .any(|t| t.algorithm == *algorithm && t.public_key == entry.public_key)
            {
                return Err(HandshakeError::HandshakeVerificationFailed(format!(
                    "untrusted {:?} server key",
                    algorithm
                )));
            }

            client
                .server_keys
                .push((*algorithm, entry.public_key.clone()));
        }

        Ok(Step::AwaitFinished)
    }

    fn await_finished(self, client: &mut Client) -> Result<Self, HandshakeError> {
        // The server's Finished covers everything before itself.
        let transcript_hash = client.engine.transcript_hash()?;
        let Some(message) = client.engine.expect_message(MessageType::Finished)? else {
            return Ok(self);
        };
        let Message::Finished(finished) = message else {
            unreachable!()
        };

        let (ks, hello_hash) = client.key_schedule()?;
        let finished_key = ks.finished_key(Side::Server, hello_hash)?;
        let expected = ks.verify_data(&finished_key, &transcript_hash)?;

        if !bool::from(expected.ct_eq(&finished.verify_data)) {
            return Err(HandshakeError::HandshakeVerificationFailed(
                "server Finished mismatch".into(),
            ));
        }

        Ok(Step::SendFinished)
    }

    fn send_finished(self, client: &mut Client) -> Result<Self, HandshakeError> {
        let transcript_hash = client.engine.transcript_hash()?;
        let (ks, hello_hash) = client.key_schedule()?;
        let finished_key = ks.finished_key(Side::Client, hello_hash)?;
        let verify_data = ks.verify_data(&finished_key, &transcript_hash)?;

        if !client.resumed && !client.session_id.is_empty() {
            let suite = client
                .engine
                .suite()
                .ok_or(HandshakeError::InvalidState("no suite"))?;
            let secret = ks.resumption_secret(hello_hash)?;
            let expires = Instant::now() + client.engine.config().session_lifetime();
            client.new_ticket = Some(ResumptionTicket::new(
                client.session_id.clone(),
                suite,
                secret,
                expires,
            ));
        }

        client.engine.send_message(&Message::Finished(Finished {
            verify_data: verify_data.to_vec(),
        }));
        client.engine.set_state(HandshakeState::Established);

        Ok(Step::Connected)
    }

    fn connected(self, client: &mut Client) -> Result<Self, HandshakeError> {
        if let Some(m) = client.engine.next_message() {
            return Err(HandshakeError::UnexpectedMessage(format!(
                "{:?} after the handshake",
                m.message.msg_type()
            )));
        }
        Ok(self)
    }
}

/// Shared secret of a full handshake: X25519, ML-KEM or both.
fn client_key_exchange(
    client: &mut Client,
    suite: CipherSuite,
    x25519_share: &[u8],
    kem_ciphertext: &[u8],
) -> Result<SecretBytes, HandshakeError> {
    let kx = suite
        .key_exchange()
        .ok_or(HandshakeError::InvalidState("suite without key exchange"))?;

    let classical = match kx.group() {
        Some(_) => {
            let exchange = client
                .x25519
                .take()
                .ok_or(HandshakeError::InvalidState("no key share"))?;
            let mut out = Buf::new();
            exchange
                .complete(x25519_share, &mut out)
                .map_err(HandshakeError::Crypto)?;
            Some(SecretBytes::new(out.to_vec()))
        }
        None => None,
    };

    let pqc = match kx.kem() {
        Some(kem) => {
            let sk = client
                .kem_secret
                .as_ref()
                .ok_or(HandshakeError::InvalidState("no KEM key"))?;
            let secret = client
                .engine
                .provider()
                .find_kem(kem)
                .ok_or_else(|| HandshakeError::Crypto(format!("no {:?} KEM", kem)))?
                .decapsulate(kem_ciphertext, sk)
                .map_err(HandshakeError::Crypto)?;
            Some(secret)
        }
        None => None,
    };

    match (classical, pqc) {
        (Some(c), Some(p)) => Ok(hybrid::combine(&c, &p)),
        (Some(c), None) => Ok(c),
        (None, Some(p)) => Ok(p),
        (None, None) => Err(HandshakeError::InvalidState("empty key exchange")),
    }
}
