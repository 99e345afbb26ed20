//! ML-KEM-768 using pqcrypto-mlkem.

use pqcrypto_mlkem::mlkem768;
use pqcrypto_traits::kem::{Ciphertext, PublicKey, SecretKey, SharedSecret};

use crate::crypto::provider::SupportedKem;
use crate::crypto::SecretBytes;
use crate::types::KemAlgorithm;

#[derive(Debug)]
struct MlKem768;

impl SupportedKem for MlKem768 {
    fn algorithm(&self) -> KemAlgorithm {
        KemAlgorithm::MlKem768
    }

    fn generate_keypair(&self) -> Result<(Vec<u8>, SecretBytes), String> {
        let (pk, sk) = mlkem768::keypair();
        Ok((pk.as_bytes().to_vec(), SecretBytes::new(sk.as_bytes().to_vec())))
    }

    fn encapsulate(&self, public_key: &[u8]) -> Result<(Vec<u8>, SecretBytes), String> {
        let pk = mlkem768::PublicKey::from_bytes(public_key)
            .map_err(|_| format!("Invalid ML-KEM-768 public key length: {}", public_key.len()))?;
        let (ss, ct) = mlkem768::encapsulate(&pk);
        Ok((ct.as_bytes().to_vec(), SecretBytes::new(ss.as_bytes().to_vec())))
    }

    fn decapsulate(&self, ciphertext: &[u8], secret_key: &[u8]) -> Result<SecretBytes, String> {
        let ct = mlkem768::Ciphertext::from_bytes(ciphertext)
            .map_err(|_| format!("Invalid ML-KEM-768 ciphertext length: {}", ciphertext.len()))?;
        let sk = mlkem768::SecretKey::from_bytes(secret_key)
            .map_err(|_| "Invalid ML-KEM-768 secret key".to_string())?;
        let ss = mlkem768::decapsulate(&ct, &sk);
        Ok(SecretBytes::new(ss.as_bytes().to_vec()))
    }
}

static MLKEM768: MlKem768 = MlKem768;

pub(super) static ALL_KEMS: &[&dyn SupportedKem] = &[&MLKEM768];
