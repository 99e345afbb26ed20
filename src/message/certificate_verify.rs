use arrayvec::ArrayVec;
use nom::error::ErrorKind;
use nom::number::complete::be_u8;
use nom::IResult;

use crate::buffer::Buf;
use crate::types::SignatureAlgorithm;
use crate::util::{failure, vec16};

/// One signature over the handshake transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureEntry {
    pub algorithm: SignatureAlgorithm,
    pub public_key: Vec<u8>,
    pub signature: Vec<u8>,
}

/// Server proof of identity. Hybrid suites carry one entry per algorithm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateVerify {
    pub entries: ArrayVec<SignatureEntry, 2>,
}

impl CertificateVerify {
    pub fn parse(input: &[u8]) -> IResult<&[u8], CertificateVerify> {
        let (mut input, count) = be_u8(input)?;
        if count == 0 || count > 2 {
            return failure(input, ErrorKind::Count);
        }

        let mut entries = ArrayVec::new();
        for _ in 0..count {
            let (rest, algorithm) = SignatureAlgorithm::parse(input)?;
            let (rest, public_key) = vec16(rest)?;
            let (rest, signature) = vec16(rest)?;
            entries.push(SignatureEntry {
                algorithm,
                public_key: public_key.to_vec(),
                signature: signature.to_vec(),
            });
            input = rest;
        }

        Ok((input, CertificateVerify { entries }))
    }

    pub fn serialize(&self, out: &mut Buf) {
        out.push(self.entries.len() as u8);
        for e in &self.entries {
            out.put_u16(e.algorithm.as_u16());
            out.put_vec16(&e.public_key);
            out.put_vec16(&e.signature);
        }
    }

    pub fn entry(&self, algorithm: SignatureAlgorithm) -> Option<&SignatureEntry> {
        self.entries.iter().find(|e| e.algorithm == algorithm)
    }
}
