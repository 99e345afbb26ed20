use nom::error::ErrorKind;
use nom::number::complete::be_u16;
use nom::IResult;

use crate::buffer::Buf;
use crate::types::{CipherSuite, CipherSuiteVec, Random, SessionId};
use crate::util::{failure, vec16};

/// The initiator's proposal.
///
/// Carries key shares for every key exchange its suites need, so the server
/// can finish its side in one round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientHello {
    pub random: Random,
    pub session_id: SessionId,
    pub cipher_suites: CipherSuiteVec,
    pub x25519_share: Vec<u8>,
    pub kem_share: Vec<u8>,
}

impl ClientHello {
    pub fn parse(input: &[u8]) -> IResult<&[u8], ClientHello> {
        let (input, random) = Random::parse(input)?;
        let (input, session_id) = SessionId::parse(input)?;

        let (input, suites) = vec16(input)?;
        if suites.len() % 2 != 0 {
            return failure(suites, ErrorKind::LengthValue);
        }
        let mut cipher_suites = CipherSuiteVec::new();
        let mut rest = suites;
        while !rest.is_empty() {
            let (r, value) = be_u16(rest)?;
            rest = r;
            let suite = CipherSuite::from_u16(value);
            // unknown ids are skipped, not rejected
            if suite.is_known() && !cipher_suites.contains(&suite) {
                cipher_suites
                    .try_push(suite)
                    .or_else(|_| failure::<()>(rest, ErrorKind::TooLarge).map(|_| ()))?;
            }
        }

        let (input, x25519_share) = vec16(input)?;
        let (input, kem_share) = vec16(input)?;

        Ok((
            input,
            ClientHello {
                random,
                session_id,
                cipher_suites,
                x25519_share: x25519_share.to_vec(),
                kem_share: kem_share.to_vec(),
            },
        ))
    }

    pub fn serialize(&self, out: &mut Buf) {
        out.extend_from_slice(&self.random.0);
        out.put_vec8(self.session_id.as_slice());
        out.put_u16((self.cipher_suites.len() * 2) as u16);
        for s in &self.cipher_suites {
            out.put_u16(s.as_u16());
        }
        out.put_vec16(&self.x25519_share);
        out.put_vec16(&self.kem_share);
    }
}
