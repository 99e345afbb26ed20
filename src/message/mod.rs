//! Wire format of the handshake.
//!
//! Every message travels in a [`Frame`]. A handshake frame body is one
//! message: `msg_type:u8` followed by the message encoding. The transcript
//! hash covers these bodies exactly as sent.

mod alert;
mod certificate_verify;
mod client_hello;
mod finished;
mod frame;
mod server_hello;

pub use alert::{Alert, AlertDescription};
pub use certificate_verify::{CertificateVerify, SignatureEntry};
pub use client_hello::ClientHello;
pub use finished::Finished;
pub use frame::{Frame, FrameHeader, FRAME_HEADER_LEN};
pub use server_hello::ServerHello;

use nom::error::ErrorKind;
use nom::IResult;

use crate::buffer::Buf;
use crate::types::MessageType;
use crate::util::{all_consumed, failure};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    ClientHello(ClientHello),
    ServerHello(ServerHello),
    CertificateVerify(CertificateVerify),
    Finished(Finished),
}

impl Message {
    pub fn msg_type(&self) -> MessageType {
        match self {
            Message::ClientHello(_) => MessageType::ClientHello,
            Message::ServerHello(_) => MessageType::ServerHello,
            Message::CertificateVerify(_) => MessageType::CertificateVerify,
            Message::Finished(_) => MessageType::Finished,
        }
    }

    /// Parse one complete handshake body. Trailing bytes are an error.
    pub fn parse(input: &[u8]) -> IResult<&[u8], Message> {
        let (body, msg_type) = MessageType::parse(input)?;
        match msg_type {
            MessageType::ClientHello => {
                all_consumed(ClientHello::parse(body)).map(|(r, m)| (r, Message::ClientHello(m)))
            }
            MessageType::ServerHello => {
                all_consumed(ServerHello::parse(body)).map(|(r, m)| (r, Message::ServerHello(m)))
            }
            MessageType::CertificateVerify => all_consumed(CertificateVerify::parse(body))
                .map(|(r, m)| (r, Message::CertificateVerify(m))),
            MessageType::Finished => {
                all_consumed(Finished::parse(body)).map(|(r, m)| (r, Message::Finished(m)))
            }
            MessageType::Unknown(_) => failure(input, ErrorKind::Tag),
        }
    }

    pub fn serialize(&self, out: &mut Buf) {
        out.push(self.msg_type().as_u8());
        match self {
            Message::ClientHello(m) => m.serialize(out),
            Message::ServerHello(m) => m.serialize(out),
            Message::CertificateVerify(m) => m.serialize(out),
            Message::Finished(m) => m.serialize(out),
        }
    }
}
