//! Protocol identifiers shared by the wire codec, the key schedule and the
//! crypto provider.

use std::fmt;

use arrayvec::ArrayVec;
use nom::bytes::complete::take;
use nom::error::{Error as NomError, ErrorKind};
use nom::number::complete::{be_u16, be_u8};
use nom::{Err, IResult};

use crate::crypto::SecureRandom;

// ============================================================================
// Framing
// ============================================================================

/// Outer frame type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Alert,
    Handshake,
    ApplicationData,
    Unknown(u8),
}

impl ContentType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            21 => ContentType::Alert,
            22 => ContentType::Handshake,
            23 => ContentType::ApplicationData,
            _ => ContentType::Unknown(value),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            ContentType::Alert => 21,
            ContentType::Handshake => 22,
            ContentType::ApplicationData => 23,
            ContentType::Unknown(value) => *value,
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], ContentType> {
        let (input, byte) = be_u8(input)?;
        Ok((input, ContentType::from_u8(byte)))
    }
}

/// Version of the framing and handshake format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolVersion {
    V1,
    Unknown(u16),
}

impl ProtocolVersion {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0x0001 => ProtocolVersion::V1,
            _ => ProtocolVersion::Unknown(value),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            ProtocolVersion::V1 => 0x0001,
            ProtocolVersion::Unknown(value) => *value,
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], ProtocolVersion> {
        let (input, v) = be_u16(input)?;
        Ok((input, ProtocolVersion::from_u16(v)))
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolVersion::V1 => write!(f, "v1"),
            ProtocolVersion::Unknown(v) => write!(f, "unknown(0x{:04x})", v),
        }
    }
}

/// Handshake message type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    ClientHello,
    ServerHello,
    CertificateVerify,
    Finished,
    Unknown(u8),
}

impl MessageType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => MessageType::ClientHello,
            2 => MessageType::ServerHello,
            15 => MessageType::CertificateVerify,
            20 => MessageType::Finished,
            _ => MessageType::Unknown(value),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            MessageType::ClientHello => 1,
            MessageType::ServerHello => 2,
            MessageType::CertificateVerify => 15,
            MessageType::Finished => 20,
            MessageType::Unknown(value) => *value,
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], MessageType> {
        let (input, byte) = be_u8(input)?;
        Ok((input, MessageType::from_u8(byte)))
    }
}

// ============================================================================
// Algorithms
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    SHA256,
    SHA384,
}

impl HashAlgorithm {
    /// Digest length in bytes.
    pub fn output_len(&self) -> usize {
        match self {
            HashAlgorithm::SHA256 => 32,
            HashAlgorithm::SHA384 => 48,
        }
    }
}

/// Classical (EC)DH groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NamedGroup {
    X25519,
    Unknown(u16),
}

impl NamedGroup {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0x001d => NamedGroup::X25519,
            _ => NamedGroup::Unknown(value),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            NamedGroup::X25519 => 0x001d,
            NamedGroup::Unknown(value) => *value,
        }
    }
}

/// Post-quantum key encapsulation mechanisms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KemAlgorithm {
    MlKem768,
}

/// Signature algorithms used to authenticate the server and to sign tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignatureAlgorithm {
    Ed25519,
    MlDsa65,
    Unknown(u16),
}

impl SignatureAlgorithm {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0x0807 => SignatureAlgorithm::Ed25519,
            0x0905 => SignatureAlgorithm::MlDsa65,
            _ => SignatureAlgorithm::Unknown(value),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            SignatureAlgorithm::Ed25519 => 0x0807,
            SignatureAlgorithm::MlDsa65 => 0x0905,
            SignatureAlgorithm::Unknown(value) => *value,
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], SignatureAlgorithm> {
        let (input, v) = be_u16(input)?;
        Ok((input, SignatureAlgorithm::from_u16(v)))
    }

    pub fn is_post_quantum(&self) -> bool {
        matches!(self, SignatureAlgorithm::MlDsa65)
    }

    /// JOSE style name carried in bearer token headers.
    pub fn token_name(&self) -> Option<&'static str> {
        match self {
            SignatureAlgorithm::Ed25519 => Some("EdDSA"),
            SignatureAlgorithm::MlDsa65 => Some("ML-DSA-65"),
            SignatureAlgorithm::Unknown(_) => None,
        }
    }

    pub fn from_token_name(name: &str) -> Option<SignatureAlgorithm> {
        match name {
            "EdDSA" => Some(SignatureAlgorithm::Ed25519),
            "ML-DSA-65" => Some(SignatureAlgorithm::MlDsa65),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AeadAlgorithm {
    Aes128Gcm,
    Aes256Gcm,
    ChaCha20Poly1305,
}

/// How a suite establishes its shared secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyExchange {
    /// Ephemeral Diffie-Hellman only.
    Classical(NamedGroup),
    /// A KEM only.
    PostQuantum(KemAlgorithm),
    /// Both, with the secrets combined before key derivation.
    Hybrid(NamedGroup, KemAlgorithm),
}

impl KeyExchange {
    pub fn group(&self) -> Option<NamedGroup> {
        match self {
            KeyExchange::Classical(g) | KeyExchange::Hybrid(g, _) => Some(*g),
            KeyExchange::PostQuantum(_) => None,
        }
    }

    pub fn kem(&self) -> Option<KemAlgorithm> {
        match self {
            KeyExchange::PostQuantum(k) | KeyExchange::Hybrid(_, k) => Some(*k),
            KeyExchange::Classical(_) => None,
        }
    }
}

// ============================================================================
// Cipher Suites
// ============================================================================

/// Negotiable cipher suites.
///
/// A suite fixes the key exchange, the server signature algorithm(s), the
/// AEAD and the hash used by the key schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(non_camel_case_types)]
pub enum CipherSuite {
    /// X25519, Ed25519, AES-128-GCM, SHA-256.
    AES_128_GCM_SHA256,
    /// X25519, Ed25519, AES-256-GCM, SHA-384.
    AES_256_GCM_SHA384,
    /// X25519, Ed25519, ChaCha20-Poly1305, SHA-256.
    CHACHA20_POLY1305_SHA256,
    /// ML-KEM-768, ML-DSA-65, AES-256-GCM, SHA-384.
    MLKEM768_AES_256_GCM_SHA384,
    /// X25519 + ML-KEM-768, Ed25519 + ML-DSA-65, AES-256-GCM, SHA-384.
    X25519_MLKEM768_AES_256_GCM_SHA384,
    Unknown(u16),
}

/// Maximum number of suites carried in a ClientHello.
pub const MAX_OFFERED_SUITES: usize = 16;

pub type CipherSuiteVec = ArrayVec<CipherSuite, MAX_OFFERED_SUITES>;

impl CipherSuite {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0x1301 => CipherSuite::AES_128_GCM_SHA256,
            0x1302 => CipherSuite::AES_256_GCM_SHA384,
            0x1303 => CipherSuite::CHACHA20_POLY1305_SHA256,
            0x1304 => CipherSuite::MLKEM768_AES_256_GCM_SHA384,
            0x1306 => CipherSuite::X25519_MLKEM768_AES_256_GCM_SHA384,
            _ => CipherSuite::Unknown(value),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            CipherSuite::AES_128_GCM_SHA256 => 0x1301,
            CipherSuite::AES_256_GCM_SHA384 => 0x1302,
            CipherSuite::CHACHA20_POLY1305_SHA256 => 0x1303,
            CipherSuite::MLKEM768_AES_256_GCM_SHA384 => 0x1304,
            CipherSuite::X25519_MLKEM768_AES_256_GCM_SHA384 => 0x1306,
            CipherSuite::Unknown(value) => *value,
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], CipherSuite> {
        let (input, value) = be_u16(input)?;
        Ok((input, CipherSuite::from_u16(value)))
    }

    /// All known suites, post-quantum first.
    pub const fn all() -> &'static [CipherSuite] {
        &[
            CipherSuite::X25519_MLKEM768_AES_256_GCM_SHA384,
            CipherSuite::MLKEM768_AES_256_GCM_SHA384,
            CipherSuite::AES_256_GCM_SHA384,
            CipherSuite::AES_128_GCM_SHA256,
            CipherSuite::CHACHA20_POLY1305_SHA256,
        ]
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, CipherSuite::Unknown(_))
    }

    /// KEM-only and hybrid suites.
    pub fn is_post_quantum(&self) -> bool {
        matches!(
            self.key_exchange(),
            Some(KeyExchange::PostQuantum(_)) | Some(KeyExchange::Hybrid(_, _))
        )
    }

    pub fn key_exchange(&self) -> Option<KeyExchange> {
        use CipherSuite::*;
        match self {
            AES_128_GCM_SHA256 | AES_256_GCM_SHA384 | CHACHA20_POLY1305_SHA256 => {
                Some(KeyExchange::Classical(NamedGroup::X25519))
            }
            MLKEM768_AES_256_GCM_SHA384 => Some(KeyExchange::PostQuantum(KemAlgorithm::MlKem768)),
            X25519_MLKEM768_AES_256_GCM_SHA384 => Some(KeyExchange::Hybrid(
                NamedGroup::X25519,
                KemAlgorithm::MlKem768,
            )),
            Unknown(_) => None,
        }
    }

    /// Signatures the server produces over the handshake transcript.
    pub fn signature_algorithms(&self) -> &'static [SignatureAlgorithm] {
        use CipherSuite::*;
        match self {
            AES_128_GCM_SHA256 | AES_256_GCM_SHA384 | CHACHA20_POLY1305_SHA256 => {
                &[SignatureAlgorithm::Ed25519]
            }
            MLKEM768_AES_256_GCM_SHA384 => &[SignatureAlgorithm::MlDsa65],
            X25519_MLKEM768_AES_256_GCM_SHA384 => {
                &[SignatureAlgorithm::Ed25519, SignatureAlgorithm::MlDsa65]
            }
            Unknown(_) => &[],
        }
    }

    pub fn aead(&self) -> Option<AeadAlgorithm> {
        use CipherSuite::*;
        match self {
            AES_128_GCM_SHA256 => Some(AeadAlgorithm::Aes128Gcm),
            AES_256_GCM_SHA384
            | MLKEM768_AES_256_GCM_SHA384
            | X25519_MLKEM768_AES_256_GCM_SHA384 => Some(AeadAlgorithm::Aes256Gcm),
            CHACHA20_POLY1305_SHA256 => Some(AeadAlgorithm::ChaCha20Poly1305),
            Unknown(_) => None,
        }
    }

    pub fn hash_algorithm(&self) -> Option<HashAlgorithm> {
        use CipherSuite::*;
        match self {
            AES_128_GCM_SHA256 | CHACHA20_POLY1305_SHA256 => Some(HashAlgorithm::SHA256),
            AES_256_GCM_SHA384
            | MLKEM768_AES_256_GCM_SHA384
            | X25519_MLKEM768_AES_256_GCM_SHA384 => Some(HashAlgorithm::SHA384),
            Unknown(_) => None,
        }
    }
}

impl fmt::Display for CipherSuite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CipherSuite::Unknown(v) => write!(f, "Unknown(0x{:04x})", v),
            known => write!(f, "{:?}", known),
        }
    }
}

// ============================================================================
// Hello values
// ============================================================================

/// 32 bytes of hello randomness.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Random(pub [u8; 32]);

impl Random {
    pub fn new(rng: &dyn SecureRandom) -> Result<Self, String> {
        let mut bytes = [0u8; 32];
        rng.fill(&mut bytes)?;
        Ok(Random(bytes))
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Random> {
        let (input, bytes) = take(32usize)(input)?;
        let mut out = [0u8; 32];
        out.copy_from_slice(bytes);
        Ok((input, Random(out)))
    }
}

impl fmt::Debug for Random {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Random({:02x}{:02x}..)", self.0[0], self.0[1])
    }
}

/// Session identifier, empty or up to 32 bytes.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct SessionId(ArrayVec<u8, 32>);

impl SessionId {
    pub fn empty() -> Self {
        SessionId::default()
    }

    pub fn random(rng: &dyn SecureRandom) -> Result<Self, String> {
        let mut bytes = [0u8; 32];
        rng.fill(&mut bytes)?;
        Ok(SessionId(ArrayVec::from(bytes)))
    }

    pub fn try_new(bytes: &[u8]) -> Option<Self> {
        let mut v = ArrayVec::new();
        v.try_extend_from_slice(bytes).ok()?;
        Some(SessionId(v))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], SessionId> {
        let (rest, len) = be_u8(input)?;
        let (rest, bytes) = take(len as usize)(rest)?;
        let id = SessionId::try_new(bytes)
            .ok_or_else(|| Err::Failure(NomError::new(input, ErrorKind::LengthValue)))?;
        Ok((rest, id))
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "SessionId(empty)");
        }
        write!(f, "SessionId(")?;
        for b in self.0.iter().take(4) {
            write!(f, "{:02x}", b)?;
        }
        write!(f, "..)")
    }
}
