//! Joining a classical and a post-quantum shared secret.
//!
//! The combined value is key derivation input only. It is never used as a
//! key by itself.

use crate::crypto::SecretBytes;

/// Deterministically join two shared secrets.
///
/// Layout: `len(classical):u16 || classical || pqc`. The length prefix keeps
/// the encoding injective for secrets of any size.
pub fn combine(classical: &[u8], pqc: &[u8]) -> SecretBytes {
    let mut out = Vec::with_capacity(2 + classical.len() + pqc.len());
    out.extend_from_slice(&(classical.len() as u16).to_be_bytes());
    out.extend_from_slice(classical);
    out.extend_from_slice(pqc);
    SecretBytes::new(out)
}

/// Inverse of [`combine`].
#[doc(hidden)]
pub fn split(combined: &[u8]) -> Option<(&[u8], &[u8])> {
    let (len, rest) = combined.split_first_chunk::<2>()?;
    let len = u16::from_be_bytes(*len) as usize;
    if rest.len() < len {
        return None;
    }
    Some(rest.split_at(len))
}
