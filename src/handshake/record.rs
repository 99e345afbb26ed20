//! AEAD protection of application data records.
//!
//! Each direction keeps its own sequence number. The nonce is the write IV
//! XOR the big endian sequence number in its last eight bytes, and the frame
//! header (including the ciphertext length) is the additional data.

use crate::buffer::Buf;
use crate::crypto::{Cipher, CryptoProvider};
use crate::error::HandshakeError;
use crate::message::{Frame, FrameHeader};
use crate::types::{CipherSuite, ContentType};

const IV_LEN: usize = 12;

pub(crate) struct RecordProtection {
    cipher: Box<dyn Cipher>,
    iv: [u8; IV_LEN],
    tag_len: usize,
    seq: u64,
}

impl RecordProtection {
    pub fn new(
        provider: &CryptoProvider,
        suite: CipherSuite,
        key: &[u8],
        iv: &[u8],
    ) -> Result<RecordProtection, HandshakeError> {
        let aead = suite
            .aead()
            .and_then(|a| provider.find_aead(a))
            .ok_or_else(|| HandshakeError::Crypto(format!("no AEAD for {}", suite)))?;

        let iv: [u8; IV_LEN] = iv
            .try_into()
            .map_err(|_| HandshakeError::Crypto(format!("bad IV length {}", iv.len())))?;

        let cipher = aead.create_cipher(key).map_err(HandshakeError::Crypto)?;

        Ok(RecordProtection {
            cipher,
            iv,
            tag_len: aead.tag_len(),
            seq: 0,
        })
    }

    fn next_nonce(&mut self) -> Result<[u8; IV_LEN], HandshakeError> {
        let seq = self.seq;
        self.seq = seq
            .checked_add(1)
            .ok_or_else(|| HandshakeError::Crypto("record sequence exhausted".into()))?;

        let mut nonce = self.iv;
        for (n, s) in nonce[IV_LEN - 8..].iter_mut().zip(seq.to_be_bytes()) {
            *n ^= s;
        }
        Ok(nonce)
    }

    /// Seal `plaintext` into a complete frame appended to `out`.
    pub fn seal(
        &mut self,
        content_type: ContentType,
        plaintext: &[u8],
        out: &mut Buf,
    ) -> Result<(), HandshakeError> {
        let header = FrameHeader::new(content_type, plaintext.len() + self.tag_len);
        let aad = header.to_bytes();
        let nonce = self.next_nonce()?;

        let mut body = Buf::from_slice(plaintext);
        self.cipher
            .encrypt(&mut body, &aad, &nonce)
            .map_err(HandshakeError::Crypto)?;

        out.extend_from_slice(&aad);
        out.extend_from_slice(&body);
        Ok(())
    }

    /// Open the body of a received frame.
    pub fn open(&mut self, frame: &Frame<'_>) -> Result<Buf, HandshakeError> {
        let aad = frame.header.to_bytes();
        let nonce = self.next_nonce()?;

        let mut body = Buf::from_slice(frame.body);
        self.cipher
            .decrypt(&mut body, &aad, &nonce)
            .map_err(|_| HandshakeError::HandshakeVerificationFailed("bad record mac".into()))?;
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::rust_crypto;

    fn pair(suite: CipherSuite) -> (RecordProtection, RecordProtection) {
        let provider = rust_crypto::default_provider();
        let key = vec![4u8; if suite == CipherSuite::AES_128_GCM_SHA256 { 16 } else { 32 }];
        let iv = [8u8; 12];
        (
            RecordProtection::new(&provider, suite, &key, &iv).unwrap(),
            RecordProtection::new(&provider, suite, &key, &iv).unwrap(),
        )
    }

    #[test]
    fn sealed_frames_open_in_order() {
        for suite in CipherSuite::all() {
            let (mut tx, mut rx) = pair(*suite);
            for msg in [&b"one"[..], b"two", b""] {
                let mut out = Buf::new();
                tx.seal(ContentType::ApplicationData, msg, &mut out).unwrap();
                let (_, frame) = Frame::parse(&out).unwrap();
                assert_eq!(&*rx.open(&frame).unwrap(), msg);
            }
        }
    }

    #[test]
    fn replayed_record_fails() {
        let (mut tx, mut rx) = pair(CipherSuite::CHACHA20_POLY1305_SHA256);
        let mut out = Buf::new();
        tx.seal(ContentType::ApplicationData, b"once", &mut out).unwrap();
        let (_, frame) = Frame::parse(&out).unwrap();
        rx.open(&frame).unwrap();
        // second open uses the next sequence number
        assert!(rx.open(&frame).is_err());
    }

    #[test]
    fn header_is_authenticated() {
        let (mut tx, mut rx) = pair(CipherSuite::AES_128_GCM_SHA256);
        let mut out = Buf::new();
        tx.seal(ContentType::ApplicationData, b"data", &mut out).unwrap();
        // flip the content type to alert
        out[0] = 21;
        let (_, frame) = Frame::parse(&out).unwrap();
        assert!(matches!(
            rx.open(&frame),
            Err(HandshakeError::HandshakeVerificationFailed(_))
        ));
    }
}
