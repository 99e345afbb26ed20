use nom::error::ErrorKind;
use nom::number::complete::be_u8;
use nom::IResult;

use crate::buffer::Buf;
use crate::types::{CipherSuite, Random, SessionId};
use crate::util::{failure, vec16};

/// The responder's decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerHello {
    pub random: Random,
    pub session_id: SessionId,
    pub cipher_suite: CipherSuite,
    /// The session is resumed from the cache. No key shares follow.
    pub resumed: bool,
    pub x25519_share: Vec<u8>,
    pub kem_ciphertext: Vec<u8>,
}

impl ServerHello {
    pub fn parse(input: &[u8]) -> IResult<&[u8], ServerHello> {
        let (input, random) = Random::parse(input)?;
        let (input, session_id) = SessionId::parse(input)?;
        let (input, cipher_suite) = CipherSuite::parse(input)?;
        let (input, resumed) = be_u8(input)?;
        let resumed = match resumed {
            0 => false,
            1 => true,
            _ => return failure(input, ErrorKind::Verify),
        };
        let (input, x25519_share) = vec16(input)?;
        let (input, kem_ciphertext) = vec16(input)?;

        Ok((
            input,
            ServerHello {
                random,
                session_id,
                cipher_suite,
                resumed,
                x25519_share: x25519_share.to_vec(),
                kem_ciphertext: kem_ciphertext.to_vec(),
            },
        ))
    }

    pub fn serialize(&self, out: &mut Buf) {
        out.extend_from_slice(&self.random.0);
        out.put_vec8(self.session_id.as_slice());
        out.put_u16(self.cipher_suite.as_u16());
        out.push(self.resumed as u8);
        out.put_vec16(&self.x25519_share);
        out.put_vec16(&self.kem_ciphertext);
    }
}
