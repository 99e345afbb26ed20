//! Signature schemes: Ed25519 via ed25519-dalek, ML-DSA-65 via pqcrypto-mldsa.

use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use pqcrypto_mldsa::mldsa65;
use pqcrypto_traits::sign::{DetachedSignature, PublicKey, SecretKey};
use rand::rngs::OsRng;

use crate::crypto::provider::SignatureScheme;
use crate::crypto::SecretBytes;
use crate::types::SignatureAlgorithm;

#[derive(Debug)]
struct Ed25519;

impl SignatureScheme for Ed25519 {
    fn algorithm(&self) -> SignatureAlgorithm {
        SignatureAlgorithm::Ed25519
    }

    fn generate_keypair(&self) -> Result<(Vec<u8>, SecretBytes), String> {
        let sk = SigningKey::generate(&mut OsRng);
        let pk = sk.verifying_key().to_bytes().to_vec();
        Ok((pk, SecretBytes::new(sk.to_bytes().to_vec())))
    }

    fn sign(&self, message: &[u8], secret_key: &[u8]) -> Result<Vec<u8>, String> {
        let seed: &[u8; 32] = secret_key
            .try_into()
            .map_err(|_| format!("Invalid Ed25519 secret key length: {}", secret_key.len()))?;
        let sk = SigningKey::from_bytes(seed);
        Ok(sk.sign(message).to_bytes().to_vec())
    }

    fn verify(&self, message: &[u8], signature: &[u8], public_key: &[u8]) -> bool {
        let Ok(pk) = <&[u8; 32]>::try_from(public_key) else {
            return false;
        };
        let Ok(vk) = VerifyingKey::from_bytes(pk) else {
            return false;
        };
        let Ok(sig) = Signature::from_slice(signature) else {
            return false;
        };
        vk.verify_strict(message, &sig).is_ok()
    }
}

#[derive(Debug)]
struct MlDsa65;

impl SignatureScheme for MlDsa65 {
    fn algorithm(&self) -> SignatureAlgorithm {
        SignatureAlgorithm::MlDsa65
    }

    fn generate_keypair(&self) -> Result<(Vec<u8>, SecretBytes), String> {
        let (pk, sk) = mldsa65::keypair();
        Ok((pk.as_bytes().to_vec(), SecretBytes::new(sk.as_bytes().to_vec())))
    }

    fn sign(&self, message: &[u8], secret_key: &[u8]) -> Result<Vec<u8>, String> {
        let sk = mldsa65::SecretKey::from_bytes(secret_key)
            .map_err(|_| "Invalid ML-DSA-65 secret key".to_string())?;
        Ok(mldsa65::detached_sign(message, &sk).as_bytes().to_vec())
    }

    fn verify(&self, message: &[u8], signature: &[u8], public_key: &[u8]) -> bool {
        let Ok(pk) = mldsa65::PublicKey::from_bytes(public_key) else {
            return false;
        };
        let Ok(sig) = mldsa65::DetachedSignature::from_bytes(signature) else {
            return false;
        };
        mldsa65::verify_detached_signature(&sig, message, &pk).is_ok()
    }
}

static ED25519: Ed25519 = Ed25519;
static MLDSA65: MlDsa65 = MlDsa65;

pub(super) static ALL_SIGNATURES: &[&dyn SignatureScheme] = &[&ED25519, &MLDSA65];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_verify_each_scheme() {
        for scheme in ALL_SIGNATURES {
            let (pk, sk) = scheme.generate_keypair().unwrap();
            let sig = scheme.sign(b"hello", &sk).unwrap();
            assert!(scheme.verify(b"hello", &sig, &pk), "{:?}", scheme);
            assert!(!scheme.verify(b"hellp", &sig, &pk), "{:?}", scheme);

            let (other_pk, _) = scheme.generate_keypair().unwrap();
            assert!(!scheme.verify(b"hello", &sig, &other_pk), "{:?}", scheme);
        }
    }

    #[test]
    fn garbage_is_rejected_not_panicking() {
        for scheme in ALL_SIGNATURES {
            assert!(!scheme.verify(b"m", &[1, 2, 3], &[4, 5, 6]));
            assert!(scheme.sign(b"m", &[0u8; 3]).is_err());
        }
    }
}
