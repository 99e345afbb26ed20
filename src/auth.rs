//! Bearer token session authorization.
//!
//! Tokens use the JWT layout, `base64url(header).base64url(payload).base64url(signature)`,
//! signed with Ed25519 (`"alg": "EdDSA"`) or ML-DSA-65 (`"alg": "ML-DSA-65"`).
//! A token is valid when its signature verifies and it has not expired.
//! Signature is always checked first.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD as B64, Engine};
use serde::{Deserialize, Serialize};

use crate::crypto::{rust_crypto, CryptoProvider, SecretBytes, SignatureScheme};
use crate::error::AuthError;
use crate::types::SignatureAlgorithm;
use crate::Error;

const TOKEN_TYPE: &str = "JWT";

/// Claim names owned by the token itself. Extra claims cannot override them.
const RESERVED_CLAIMS: &[&str] = &["sub", "iat", "exp"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Header {
    alg: String,
    typ: String,
}

/// Token payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject the token was issued to.
    pub sub: String,
    /// Issued at, seconds since the unix epoch.
    pub iat: u64,
    /// Expiry, seconds since the unix epoch. Valid while `now <= exp`.
    pub exp: u64,
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

/// A parsed, immutable bearer token.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken {
    encoded: String,
    /// Length of `header.payload`, the signed part.
    signed_len: usize,
    algorithm: SignatureAlgorithm,
    claims: Claims,
    signature: Vec<u8>,
}

impl BearerToken {
    /// Parse the compact form. Does not check the signature.
    pub fn parse(s: &str) -> Result<BearerToken, AuthError> {
        let mut parts = s.split('.');
        let (Some(h), Some(p), Some(sig), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(AuthError::Malformed);
        };

        let header: Header = decode_json(h)?;
        if header.typ != TOKEN_TYPE {
            return Err(AuthError::Malformed);
        }
        let algorithm =
            SignatureAlgorithm::from_token_name(&header.alg).ok_or(AuthError::Malformed)?;

        let claims: Claims = decode_json(p)?;
        let signature = B64.decode(sig).map_err(|_| AuthError::Malformed)?;

        Ok(BearerToken {
            encoded: s.to_string(),
            signed_len: h.len() + 1 + p.len(),
            algorithm,
            claims,
            signature,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.encoded
    }

    pub fn algorithm(&self) -> SignatureAlgorithm {
        self.algorithm
    }

    pub fn claims(&self) -> &Claims {
        &self.claims
    }

    pub fn subject(&self) -> &str {
        &self.claims.sub
    }

    pub fn claim(&self, name: &str) -> Option<&str> {
        self.claims.extra.get(name).map(|s| s.as_str())
    }

    /// Pure time check, for diagnostics. Says nothing about the signature.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(unix_now())
    }

    pub fn is_expired_at(&self, now: u64) -> bool {
        now > self.claims.exp
    }

    fn signing_input(&self) -> &[u8] {
        &self.encoded.as_bytes()[..self.signed_len]
    }
}

impl fmt::Display for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encoded)
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerToken")
            .field("algorithm", &self.algorithm)
            .field("claims", &self.claims)
            .finish_non_exhaustive()
    }
}

impl FromStr for BearerToken {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BearerToken::parse(s)
    }
}

/// Issues and checks bearer tokens with one signing key.
pub struct SessionAuth {
    scheme: &'static dyn SignatureScheme,
    public_key: Vec<u8>,
    secret_key: SecretBytes,
}

impl SessionAuth {
    /// Fresh signing key from the built in provider.
    pub fn generate(algorithm: SignatureAlgorithm) -> Result<SessionAuth, Error> {
        Self::generate_with(&rust_crypto::default_provider(), algorithm)
    }

    pub fn generate_with(
        provider: &CryptoProvider,
        algorithm: SignatureAlgorithm,
    ) -> Result<SessionAuth, Error> {
        let scheme = find_scheme(provider, algorithm)?;
        let (public_key, secret_key) = scheme
            .generate_keypair()
            .map_err(|e| Error::Config(format!("{:?} keygen: {}", algorithm, e)))?;
        Ok(SessionAuth {
            scheme,
            public_key,
            secret_key,
        })
    }

    /// Use an existing key pair.
    pub fn from_keys(
        provider: &CryptoProvider,
        algorithm: SignatureAlgorithm,
        public_key: &[u8],
        secret_key: &[u8],
    ) -> Result<SessionAuth, Error> {
        Ok(SessionAuth {
            scheme: find_scheme(provider, algorithm)?,
            public_key: public_key.to_vec(),
            secret_key: SecretBytes::new(secret_key.to_vec()),
        })
    }

    pub fn algorithm(&self) -> SignatureAlgorithm {
        self.scheme.algorithm()
    }

    /// Key that verifies the tokens this instance creates.
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    /// Issue a token for `subject`, valid for `ttl` from now.
    pub fn create(
        &self,
        subject: &str,
        ttl: Duration,
        claims: BTreeMap<String, String>,
    ) -> Result<BearerToken, Error> {
        self.create_at(subject, ttl, claims, unix_now())
    }

    pub fn create_at(
        &self,
        subject: &str,
        ttl: Duration,
        mut claims: BTreeMap<String, String>,
        now: u64,
    ) -> Result<BearerToken, Error> {
        claims.retain(|k, _| !RESERVED_CLAIMS.contains(&k.as_str()));

        let algorithm = self.algorithm();
        let header = Header {
            alg: algorithm
                .token_name()
                .ok_or_else(|| Error::Config(format!("{:?} cannot sign tokens", algorithm)))?
                .to_string(),
            typ: TOKEN_TYPE.to_string(),
        };
        let payload = Claims {
            sub: subject.to_string(),
            iat: now,
            exp: now.saturating_add(ttl.as_secs()),
            extra: claims,
        };

        let mut encoded = encode_json(&header)?;
        encoded.push('.');
        encoded.push_str(&encode_json(&payload)?);
        let signed_len = encoded.len();

        let signature = self
            .scheme
            .sign(encoded.as_bytes(), &self.secret_key)
            .map_err(|e| Error::Config(format!("token signing failed: {}", e)))?;
        encoded.push('.');
        encoded.push_str(&B64.encode(&signature));

        Ok(BearerToken {
            encoded,
            signed_len,
            algorithm,
            claims: payload,
            signature,
        })
    }

    /// True when the signature verifies with `verification_key` and the
    /// token has not expired.
    pub fn validate(&self, token: &BearerToken, verification_key: &[u8]) -> bool {
        self.verify(token, verification_key).is_ok()
    }

    /// Like [`SessionAuth::validate`], with the reason for rejection.
    pub fn verify(&self, token: &BearerToken, verification_key: &[u8]) -> Result<(), AuthError> {
        self.verify_at(token, verification_key, unix_now())
    }

    pub fn verify_at(
        &self,
        token: &BearerToken,
        verification_key: &[u8],
        now: u64,
    ) -> Result<(), AuthError> {
        if token.algorithm != self.algorithm() {
            return Err(AuthError::SignatureInvalid);
        }
        if !self
            .scheme
            .verify(token.signing_input(), &token.signature, verification_key)
        {
            return Err(AuthError::SignatureInvalid);
        }
        if token.is_expired_at(now) {
            return Err(AuthError::TokenExpired);
        }
        Ok(())
    }

    /// Expiry only, see [`BearerToken::is_expired`].
    pub fn is_expired(&self, token: &BearerToken) -> bool {
        token.is_expired()
    }
}

impl fmt::Debug for SessionAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionAuth")
            .field("algorithm", &self.algorithm())
            .finish_non_exhaustive()
    }
}

fn find_scheme(
    provider: &CryptoProvider,
    algorithm: SignatureAlgorithm,
) -> Result<&'static dyn SignatureScheme, Error> {
    provider
        .find_signature(algorithm)
        .ok_or_else(|| Error::Config(format!("no {:?} signature scheme", algorithm)))
}

fn encode_json<T: Serialize>(value: &T) -> Result<String, Error> {
    let json = serde_json::to_vec(value).map_err(|e| Error::Config(e.to_string()))?;
    Ok(B64.encode(json))
}

fn decode_json<T: for<'de> Deserialize<'de>>(part: &str) -> Result<T, AuthError> {
    let json = B64.decode(part).map_err(|_| AuthError::Malformed)?;
    serde_json::from_slice(&json).map_err(|_| AuthError::Malformed)
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: Duration = Duration::from_secs(3600);

    fn claims() -> BTreeMap<String, String> {
        let mut m = BTreeMap::new();
        m.insert("role".to_string(), "operator".to_string());
        m
    }

    #[test]
    fn token_from_create_validates() {
        for alg in [SignatureAlgorithm::Ed25519, SignatureAlgorithm::MlDsa65] {
            let auth = SessionAuth::generate(alg).unwrap();
            let token = auth.create("alice", HOUR, claims()).unwrap();
            assert!(auth.validate(&token, auth.public_key()));
            assert!(!token.is_expired());
            assert_eq!(token.subject(), "alice");
            assert_eq!(token.claim("role"), Some("operator"));

            let reparsed: BearerToken = token.to_string().parse().unwrap();
            assert_eq!(reparsed, token);
            assert!(auth.validate(&reparsed, auth.public_key()));
        }
    }

    #[test]
    fn expiry_boundary() {
        let auth = SessionAuth::generate(SignatureAlgorithm::Ed25519).unwrap();
        let token = auth.create_at("bob", HOUR, claims(), 1_000).unwrap();
        assert_eq!(token.claims().exp, 4_600);
        assert_eq!(auth.verify_at(&token, auth.public_key(), 4_600), Ok(()));
        assert_eq!(
            auth.verify_at(&token, auth.public_key(), 4_601),
            Err(AuthError::TokenExpired)
        );
        assert!(token.is_expired_at(4_601));
    }

    #[test]
    fn signature_is_checked_before_expiry() {
        let auth = SessionAuth::generate(SignatureAlgorithm::Ed25519).unwrap();
        let other = SessionAuth::generate(SignatureAlgorithm::Ed25519).unwrap();
        let token = auth.create_at("carol", HOUR, claims(), 0).unwrap();
        // expired and wrongly keyed: the signature failure wins
        assert_eq!(
            auth.verify_at(&token, other.public_key(), 1_000_000),
            Err(AuthError::SignatureInvalid)
        );
    }

    #[test]
    fn altered_payload_is_rejected() {
        let auth = SessionAuth::generate(SignatureAlgorithm::Ed25519).unwrap();
        let token = auth.create("dave", HOUR, claims()).unwrap();

        let parts: Vec<&str> = token.as_str().split('.').collect();
        let mut payload: serde_json::Value =
            serde_json::from_slice(&B64.decode(parts[1]).unwrap()).unwrap();
        payload["sub"] = serde_json::Value::String("mallory".into());
        let forged = format!(
            "{}.{}.{}",
            parts[0],
            B64.encode(serde_json::to_vec(&payload).unwrap()),
            parts[2]
        );

        let forged = BearerToken::parse(&forged).unwrap();
        assert_eq!(forged.subject(), "mallory");
        assert!(!auth.validate(&forged, auth.public_key()));
    }

    #[test]
    fn reserved_claims_cannot_be_overridden() {
        let auth = SessionAuth::generate(SignatureAlgorithm::Ed25519).unwrap();
        let mut extra = claims();
        extra.insert("exp".to_string(), "999999999999".to_string());
        let token = auth.create_at("erin", HOUR, extra, 10).unwrap();
        assert_eq!(token.claims().exp, 3_610);
        assert!(token.claim("exp").is_none());
    }

    #[test]
    fn malformed_tokens() {
        for s in ["", "a.b", "a.b.c.d", "!!!.e30.AA", "e30.e30.AA"] {
            assert_eq!(BearerToken::parse(s), Err(AuthError::Malformed), "{}", s);
        }
    }

    #[test]
    fn algorithm_mismatch_is_invalid() {
        let ed = SessionAuth::generate(SignatureAlgorithm::Ed25519).unwrap();
        let ml = SessionAuth::generate(SignatureAlgorithm::MlDsa65).unwrap();
        let token = ed.create("frank", HOUR, claims()).unwrap();
        assert_eq!(
            ml.verify(&token, ed.public_key()),
            Err(AuthError::SignatureInvalid)
        );
    }
}
