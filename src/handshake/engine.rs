use std::collections::VecDeque;
use std::sync::Arc;

use crate::buffer::Buf;
use crate::config::Config;
use crate::crypto::CryptoProvider;
use crate::error::HandshakeError;
use crate::message::{Alert, AlertDescription, Frame, Message};
use crate::types::{CipherSuite, ContentType, MessageType};

use super::key_schedule::SessionKeys;
use super::record::RecordProtection;
use super::{HandshakeState, Output};

/// A parsed handshake message and the bytes it came in, for the transcript.
pub(crate) struct Incoming {
    pub message: Message,
    raw: Vec<u8>,
}

/// State shared by both roles: framing, transcript, record protection and
/// the output queue.
pub(crate) struct Engine {
    config: Arc<Config>,
    is_client: bool,
    state: HandshakeState,
    transcript: Buf,
    incoming: VecDeque<Incoming>,
    outputs: VecDeque<Output>,
    suite: Option<CipherSuite>,
    keys: Option<SessionKeys>,
    send: Option<RecordProtection>,
    recv: Option<RecordProtection>,
}

impl Engine {
    pub fn new(config: Arc<Config>, is_client: bool) -> Engine {
        Engine {
            config,
            is_client,
            state: HandshakeState::Idle,
            transcript: Buf::new(),
            incoming: VecDeque::new(),
            outputs: VecDeque::new(),
            suite: None,
            keys: None,
            send: None,
            recv: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn provider(&self) -> &CryptoProvider {
        self.config.crypto_provider()
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    pub fn set_state(&mut self, state: HandshakeState) {
        if self.state != state {
            trace!("{:?} -> {:?}", self.state, state);
            self.state = state;
            if state == HandshakeState::Established {
                self.outputs.push_back(Output::Established);
            }
        }
    }

    pub fn suite(&self) -> Option<CipherSuite> {
        self.suite
    }

    pub fn set_suite(&mut self, suite: CipherSuite) {
        self.suite = Some(suite);
    }

    pub fn keys(&self) -> Option<&SessionKeys> {
        self.keys.as_ref()
    }

    /// Parse one complete frame. Handshake messages are queued for the role,
    /// alerts and application data are handled here.
    pub fn handle_frame(&mut self, data: &[u8]) -> Result<(), HandshakeError> {
        if self.state.is_terminal() {
            return Err(HandshakeError::InvalidState("connection is finished"));
        }

        let (rest, frame) =
            Frame::parse(data).map_err(|_| HandshakeError::Decode("malformed frame".into()))?;
        if !rest.is_empty() {
            return Err(HandshakeError::Decode("trailing bytes after frame".into()));
        }

        match frame.header.content_type {
            ContentType::Handshake => {
                let (_, message) = Message::parse(frame.body).map_err(|_| {
                    HandshakeError::Decode("malformed handshake message".into())
                })?;
                trace!("Received {:?}", message.msg_type());
                self.incoming.push_back(Incoming {
                    message,
                    raw: frame.body.to_vec(),
                });
                Ok(())
            }
            ContentType::Alert => {
                let (_, alert) = Alert::parse(frame.body)
                    .map_err(|_| HandshakeError::Decode("malformed alert".into()))?;
                self.handle_alert(alert)
            }
            ContentType::ApplicationData => {
                if self.state != HandshakeState::Established {
                    return Err(HandshakeError::UnexpectedMessage(
                        "application data before the handshake completed".into(),
                    ));
                }
                let recv = self
                    .recv
                    .as_mut()
                    .ok_or(HandshakeError::InvalidState("no receive keys"))?;
                let plaintext = recv.open(&frame)?;
                self.outputs
                    .push_back(Output::ApplicationData(plaintext.into_vec()));
                Ok(())
            }
            ContentType::Unknown(v) => Err(HandshakeError::Decode(format!(
                "unknown content type {}",
                v
            ))),
        }
    }

    fn handle_alert(&mut self, alert: Alert) -> Result<(), HandshakeError> {
        if alert.description == AlertDescription::CloseNotify
            && self.state == HandshakeState::Established
        {
            debug!("Peer closed the session");
            self.teardown(HandshakeState::Closed);
            self.outputs.push_back(Output::Closed);
            return Ok(());
        }

        let error = if alert.description == AlertDescription::CloseNotify {
            HandshakeError::Cancelled
        } else {
            alert.description.to_error()
        };
        debug!("Peer alert {:?}: {}", alert.description, error);

        // No alert goes back for a peer alert.
        self.teardown(HandshakeState::Aborted);
        Err(error)
    }

    /// Next queued message, if any.
    pub fn next_message(&mut self) -> Option<Incoming> {
        self.incoming.pop_front()
    }

    /// Next queued message, which must be of type `expected`. The message
    /// joins the transcript.
    pub fn expect_message(
        &mut self,
        expected: MessageType,
    ) -> Result<Option<Message>, HandshakeError> {
        let Some(incoming) = self.next_message() else {
            return Ok(None);
        };
        if incoming.message.msg_type() != expected {
            return Err(HandshakeError::UnexpectedMessage(format!(
                "expected {:?}, got {:?}",
                expected,
                incoming.message.msg_type()
            )));
        }
        self.transcript.extend_from_slice(&incoming.raw);
        Ok(Some(incoming.message))
    }

    /// Serialize `message`, add it to the transcript and queue its frame.
    pub fn send_message(&mut self, message: &Message) {
        let mut body = Buf::new();
        message.serialize(&mut body);
        self.transcript.extend_from_slice(&body);

        let mut frame = Buf::with_capacity(body.len() + 8);
        Frame::write(ContentType::Handshake, &body, &mut frame);
        trace!("Send {:?} ({} bytes)", message.msg_type(), body.len());
        self.outputs.push_back(Output::Frame(frame.into_vec()));
    }

    fn send_alert(&mut self, alert: Alert) {
        let mut body = Buf::new();
        alert.serialize(&mut body);
        let mut frame = Buf::new();
        Frame::write(ContentType::Alert, &body, &mut frame);
        self.outputs.push_back(Output::Frame(frame.into_vec()));
    }

    /// Hash of everything in the transcript so far, with the suite's hash.
    pub fn transcript_hash(&self) -> Result<Buf, HandshakeError> {
        let hash = self
            .suite
            .and_then(|s| s.hash_algorithm())
            .ok_or(HandshakeError::InvalidState("no suite for transcript hash"))?;
        let mut out = Buf::new();
        self.provider()
            .hash_provider
            .digest(hash, &self.transcript, &mut out);
        Ok(out)
    }

    /// Take the session keys into use for application data.
    pub fn install_keys(&mut self, keys: SessionKeys) -> Result<(), HandshakeError> {
        let suite = self
            .suite
            .ok_or(HandshakeError::InvalidState("keys without suite"))?;
        let provider = self.config.crypto_provider();

        let client = RecordProtection::new(
            provider,
            suite,
            keys.client_write_key(),
            keys.client_write_iv(),
        )?;
        let server = RecordProtection::new(
            provider,
            suite,
            keys.server_write_key(),
            keys.server_write_iv(),
        )?;

        if self.is_client {
            self.send = Some(client);
            self.recv = Some(server);
        } else {
            self.send = Some(server);
            self.recv = Some(client);
        }
        self.keys = Some(keys);
        Ok(())
    }

    pub fn send_application_data(&mut self, data: &[u8]) -> Result<(), HandshakeError> {
        if self.state != HandshakeState::Established {
            return Err(HandshakeError::InvalidState("session not established"));
        }
        let max = self.config.max_record_plaintext();
        let send = self
            .send
            .as_mut()
            .ok_or(HandshakeError::InvalidState("no send keys"))?;

        // An empty write still produces one record.
        let mut chunks: Vec<&[u8]> = data.chunks(max).collect();
        if chunks.is_empty() {
            chunks.push(&[]);
        }

        for chunk in chunks {
            let mut frame = Buf::new();
            send.seal(ContentType::ApplicationData, chunk, &mut frame)?;
            self.outputs.push_back(Output::Frame(frame.into_vec()));
        }
        Ok(())
    }

    pub fn poll_output(&mut self) -> Option<Output> {
        self.outputs.pop_front()
    }

    /// Orderly shutdown of an established session.
    pub fn close(&mut self) {
        if self.state == HandshakeState::Established {
            self.send_alert(Alert::close_notify());
            self.teardown(HandshakeState::Closed);
        }
    }

    /// Fail the connection, telling the peer why.
    pub fn abort(&mut self, error: &HandshakeError) {
        if self.state.is_terminal() {
            return;
        }
        self.send_alert(Alert::fatal(AlertDescription::for_error(error)));
        self.teardown(HandshakeState::Aborted);
    }

    fn teardown(&mut self, state: HandshakeState) {
        // SessionKeys zero themselves on drop.
        self.keys = None;
        self.send = None;
        self.recv = None;
        self.incoming.clear();
        self.transcript.clear();
        self.set_state(state);
    }
}
