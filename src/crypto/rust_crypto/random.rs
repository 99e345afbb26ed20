//! Secure random number generation.

use rand::rngs::OsRng;
use rand::RngCore;

use crate::crypto::provider::SecureRandom;

#[derive(Debug)]
pub(super) struct RustCryptoSecureRandom;

impl SecureRandom for RustCryptoSecureRandom {
    fn fill(&self, buf: &mut [u8]) -> Result<(), String> {
        OsRng
            .try_fill_bytes(buf)
            .map_err(|e| format!("OS random source failed: {}", e))
    }
}

pub(super) static SECURE_RANDOM: RustCryptoSecureRandom = RustCryptoSecureRandom;
