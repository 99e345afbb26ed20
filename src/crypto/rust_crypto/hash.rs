//! SHA-2 digests using RustCrypto.

use sha2::{Digest, Sha256, Sha384};

use crate::buffer::Buf;
use crate::crypto::provider::HashProvider;
use crate::types::HashAlgorithm;

#[derive(Debug)]
pub(super) struct RustCryptoHashProvider;

impl HashProvider for RustCryptoHashProvider {
    fn digest(&self, algorithm: HashAlgorithm, data: &[u8], out: &mut Buf) {
        out.clear();
        match algorithm {
            HashAlgorithm::SHA256 => out.extend_from_slice(&Sha256::digest(data)),
            HashAlgorithm::SHA384 => out.extend_from_slice(&Sha384::digest(data)),
        }
    }
}

pub(super) static HASH_PROVIDER: RustCryptoHashProvider = RustCryptoHashProvider;
