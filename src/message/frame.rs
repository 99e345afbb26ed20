use nom::bytes::complete::take;
use nom::error::ErrorKind;
use nom::number::complete::be_u32;
use nom::IResult;

use crate::buffer::Buf;
use crate::types::{ContentType, ProtocolVersion};
use crate::util::failure;

/// Bytes in a frame header.
pub const FRAME_HEADER_LEN: usize = 7;

/// Largest accepted frame body.
pub const MAX_FRAME_BODY: usize = 1 << 16;

/// `content_type:u8 || version:u16 || length:u32`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub content_type: ContentType,
    pub version: ProtocolVersion,
    pub length: u32,
}

impl FrameHeader {
    pub fn new(content_type: ContentType, length: usize) -> Self {
        FrameHeader {
            content_type,
            version: ProtocolVersion::V1,
            length: length as u32,
        }
    }

    /// Parse and validate a header. Unknown content types, unknown versions
    /// and oversized bodies are failures.
    pub fn parse(input: &[u8]) -> IResult<&[u8], FrameHeader> {
        let original = input;
        let (input, content_type) = ContentType::parse(input)?;
        if let ContentType::Unknown(_) = content_type {
            return failure(original, ErrorKind::Tag);
        }
        let (input, version) = ProtocolVersion::parse(input)?;
        if version != ProtocolVersion::V1 {
            return failure(original, ErrorKind::Verify);
        }
        let (input, length) = be_u32(input)?;
        if length as usize > MAX_FRAME_BODY {
            return failure(original, ErrorKind::TooLarge);
        }

        Ok((
            input,
            FrameHeader {
                content_type,
                version,
                length,
            },
        ))
    }

    pub fn serialize(&self, out: &mut Buf) {
        out.push(self.content_type.as_u8());
        out.put_u16(self.version.as_u16());
        out.put_u32(self.length);
    }

    pub fn to_bytes(&self) -> [u8; FRAME_HEADER_LEN] {
        let mut out = [0u8; FRAME_HEADER_LEN];
        out[0] = self.content_type.as_u8();
        out[1..3].copy_from_slice(&self.version.as_u16().to_be_bytes());
        out[3..].copy_from_slice(&self.length.to_be_bytes());
        out
    }
}

/// A header and its body, borrowed from the input.
#[derive(Debug, PartialEq, Eq)]
pub struct Frame<'a> {
    pub header: FrameHeader,
    pub body: &'a [u8],
}

impl<'a> Frame<'a> {
    pub fn parse(input: &'a [u8]) -> IResult<&'a [u8], Frame<'a>> {
        let (input, header) = FrameHeader::parse(input)?;
        let (input, body) = take(header.length as usize)(input)?;
        Ok((input, Frame { header, body }))
    }

    /// Write a complete frame carrying `body`.
    pub fn write(content_type: ContentType, body: &[u8], out: &mut Buf) {
        FrameHeader::new(content_type, body.len()).serialize(out);
        out.extend_from_slice(body);
    }
}
