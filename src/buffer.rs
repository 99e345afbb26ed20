//! Byte buffer used for wire encoding and key material.
//!
//! [`Buf`] wraps `Vec<u8>` and wipes its contents when dropped or cleared,
//! since the same type carries serialized frames, shared secrets and derived
//! keys.

use std::fmt;
use std::ops::{Deref, DerefMut};

use zeroize::Zeroize;

/// Growable byte buffer that zeroizes on clear and drop.
#[derive(Default, Clone, PartialEq, Eq)]
pub struct Buf(Vec<u8>);

impl Buf {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Buf(Vec::with_capacity(capacity))
    }

    pub fn from_slice(data: &[u8]) -> Self {
        Buf(data.to_vec())
    }

    /// Clear the buffer, wiping the previous contents.
    pub fn clear(&mut self) {
        self.0.zeroize();
    }

    pub fn extend_from_slice(&mut self, other: &[u8]) {
        self.0.extend_from_slice(other);
    }

    pub fn push(&mut self, byte: u8) {
        self.0.push(byte);
    }

    pub fn put_u16(&mut self, v: u16) {
        self.0.extend_from_slice(&v.to_be_bytes());
    }

    pub fn put_u32(&mut self, v: u32) {
        self.0.extend_from_slice(&v.to_be_bytes());
    }

    /// Write `data` behind a one byte length prefix.
    pub fn put_vec8(&mut self, data: &[u8]) {
        debug_assert!(data.len() <= u8::MAX as usize);
        self.0.push(data.len() as u8);
        self.0.extend_from_slice(data);
    }

    /// Write `data` behind a two byte length prefix.
    pub fn put_vec16(&mut self, data: &[u8]) {
        debug_assert!(data.len() <= u16::MAX as usize);
        self.put_u16(data.len() as u16);
        self.0.extend_from_slice(data);
    }

    pub fn truncate(&mut self, len: usize) {
        self.0.truncate(len);
    }

    pub fn into_vec(mut self) -> Vec<u8> {
        std::mem::take(&mut self.0)
    }
}

impl Drop for Buf {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl Deref for Buf {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Buf {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl AsRef<[u8]> for Buf {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl AsMut<[u8]> for Buf {
    fn as_mut(&mut self) -> &mut [u8] {
        &mut self.0
    }
}

impl fmt::Debug for Buf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buf").field("len", &self.0.len()).finish()
    }
}

/// In-place AEAD over a `Buf`. aes-gcm and chacha20poly1305 share the
/// same `aead` crate.
impl aes_gcm::aead::Buffer for Buf {
    fn extend_from_slice(&mut self, other: &[u8]) -> Result<(), aes_gcm::aead::Error> {
        self.0.extend_from_slice(other);
        Ok(())
    }

    fn truncate(&mut self, len: usize) {
        self.0.truncate(len);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_prefixed_writes() {
        let mut b = Buf::new();
        b.put_vec8(&[1, 2]);
        b.put_vec16(&[3]);
        b.put_u32(0x0102_0304);
        assert_eq!(&*b, &[2, 1, 2, 0, 1, 3, 1, 2, 3, 4]);
    }

    #[test]
    fn clear_empties() {
        let mut b = Buf::from_slice(&[9; 16]);
        b.clear();
        assert!(b.is_empty());
    }
}
