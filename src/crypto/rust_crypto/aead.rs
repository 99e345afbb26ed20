//! AEAD ciphers using RustCrypto.

use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::{Aes128Gcm, Aes256Gcm};
use chacha20poly1305::ChaCha20Poly1305;

use crate::buffer::Buf;
use crate::crypto::provider::{Cipher, SupportedAead};
use crate::types::AeadAlgorithm;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

enum AeadCipher {
    Aes128(Box<Aes128Gcm>),
    Aes256(Box<Aes256Gcm>),
    ChaCha(Box<ChaCha20Poly1305>),
}

impl std::fmt::Debug for AeadCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AeadCipher::Aes128(_) => "AeadCipher::Aes128",
            AeadCipher::Aes256(_) => "AeadCipher::Aes256",
            AeadCipher::ChaCha(_) => "AeadCipher::ChaCha",
        };
        f.debug_tuple(name).finish()
    }
}

impl AeadCipher {
    fn new(algorithm: AeadAlgorithm, key: &[u8]) -> Result<Self, String> {
        let bad_key = |_| format!("Invalid key size for {:?}: {}", algorithm, key.len());
        Ok(match algorithm {
            AeadAlgorithm::Aes128Gcm => {
                AeadCipher::Aes128(Box::new(Aes128Gcm::new_from_slice(key).map_err(bad_key)?))
            }
            AeadAlgorithm::Aes256Gcm => {
                AeadCipher::Aes256(Box::new(Aes256Gcm::new_from_slice(key).map_err(bad_key)?))
            }
            AeadAlgorithm::ChaCha20Poly1305 => AeadCipher::ChaCha(Box::new(
                ChaCha20Poly1305::new_from_slice(key).map_err(bad_key)?,
            )),
        })
    }
}

fn check_nonce(nonce: &[u8]) -> Result<(), String> {
    if nonce.len() != NONCE_LEN {
        return Err(format!(
            "Invalid nonce length: expected {}, got {}",
            NONCE_LEN,
            nonce.len()
        ));
    }
    Ok(())
}

impl Cipher for AeadCipher {
    fn encrypt(&mut self, data: &mut Buf, aad: &[u8], nonce: &[u8]) -> Result<(), String> {
        check_nonce(nonce)?;
        let nonce = GenericArray::from_slice(nonce);

        let result = match self {
            AeadCipher::Aes128(c) => c.encrypt_in_place(nonce, aad, data),
            AeadCipher::Aes256(c) => c.encrypt_in_place(nonce, aad, data),
            AeadCipher::ChaCha(c) => c.encrypt_in_place(nonce, aad, data),
        };

        result.map_err(|_| "AEAD encryption failed".to_string())
    }

    fn decrypt(&mut self, data: &mut Buf, aad: &[u8], nonce: &[u8]) -> Result<(), String> {
        if data.len() < TAG_LEN {
            return Err(format!("Ciphertext too short: {}", data.len()));
        }
        check_nonce(nonce)?;
        let nonce = GenericArray::from_slice(nonce);

        // decrypt_in_place strips the tag
        let result = match self {
            AeadCipher::Aes128(c) => c.decrypt_in_place(nonce, aad, data),
            AeadCipher::Aes256(c) => c.decrypt_in_place(nonce, aad, data),
            AeadCipher::ChaCha(c) => c.decrypt_in_place(nonce, aad, data),
        };

        result.map_err(|_| "AEAD decryption failed".to_string())
    }
}

#[derive(Debug)]
struct RustCryptoAead {
    algorithm: AeadAlgorithm,
    key_len: usize,
}

impl SupportedAead for RustCryptoAead {
    fn algorithm(&self) -> AeadAlgorithm {
        self.algorithm
    }

    fn key_len(&self) -> usize {
        self.key_len
    }

    fn iv_len(&self) -> usize {
        NONCE_LEN
    }

    fn tag_len(&self) -> usize {
        TAG_LEN
    }

    fn create_cipher(&self, key: &[u8]) -> Result<Box<dyn Cipher>, String> {
        Ok(Box::new(AeadCipher::new(self.algorithm, key)?))
    }
}

static AES_128_GCM: RustCryptoAead = RustCryptoAead {
    algorithm: AeadAlgorithm::Aes128Gcm,
    key_len: 16,
};

static AES_256_GCM: RustCryptoAead = RustCryptoAead {
    algorithm: AeadAlgorithm::Aes256Gcm,
    key_len: 32,
};

static CHACHA20_POLY1305: RustCryptoAead = RustCryptoAead {
    algorithm: AeadAlgorithm::ChaCha20Poly1305,
    key_len: 32,
};

pub(super) static ALL_AEADS: &[&dyn SupportedAead] =
    &[&AES_128_GCM, &AES_256_GCM, &CHACHA20_POLY1305];
