use nom::error::ErrorKind;
use nom::IResult;

use crate::buffer::Buf;
use crate::util::failure;

/// Largest verify_data (SHA-512 sized, above anything negotiated today).
const MAX_VERIFY_DATA: usize = 64;

/// HMAC over the transcript, keyed by the sender's finished key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finished {
    pub verify_data: Vec<u8>,
}

impl Finished {
    /// Finished takes the whole message body.
    pub fn parse(input: &[u8]) -> IResult<&[u8], Finished> {
        if input.is_empty() || input.len() > MAX_VERIFY_DATA {
            return failure(input, ErrorKind::LengthValue);
        }
        Ok((
            &input[input.len()..],
            Finished {
                verify_data: input.to_vec(),
            },
        ))
    }

    pub fn serialize(&self, out: &mut Buf) {
        out.extend_from_slice(&self.verify_data);
    }
}
