//! HMAC using RustCrypto.

use hmac::{Hmac, Mac};
use sha2::{Sha256, Sha384};

use crate::buffer::Buf;
use crate::crypto::provider::HmacProvider;
use crate::types::HashAlgorithm;

#[derive(Debug)]
pub(super) struct RustCryptoHmacProvider;

impl HmacProvider for RustCryptoHmacProvider {
    fn hmac(
        &self,
        algorithm: HashAlgorithm,
        key: &[u8],
        data: &[u8],
        out: &mut Buf,
    ) -> Result<(), String> {
        out.clear();
        match algorithm {
            HashAlgorithm::SHA256 => {
                let mut mac = Hmac::<Sha256>::new_from_slice(key)
                    .map_err(|_| "Invalid HMAC key".to_string())?;
                mac.update(data);
                out.extend_from_slice(&mac.finalize().into_bytes());
            }
            HashAlgorithm::SHA384 => {
                let mut mac = Hmac::<Sha384>::new_from_slice(key)
                    .map_err(|_| "Invalid HMAC key".to_string())?;
                mac.update(data);
                out.extend_from_slice(&mac.finalize().into_bytes());
            }
        }
        Ok(())
    }
}

pub(super) static HMAC_PROVIDER: RustCryptoHmacProvider = RustCryptoHmacProvider;
