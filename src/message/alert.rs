use nom::number::complete::be_u8;
use nom::IResult;

use crate::buffer::Buf;
use crate::error::HandshakeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertLevel {
    Warning,
    Fatal,
    Unknown(u8),
}

impl AlertLevel {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => AlertLevel::Warning,
            2 => AlertLevel::Fatal,
            _ => AlertLevel::Unknown(value),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            AlertLevel::Warning => 1,
            AlertLevel::Fatal => 2,
            AlertLevel::Unknown(v) => *v,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertDescription {
    CloseNotify,
    UnexpectedMessage,
    BadRecordMac,
    HandshakeFailure,
    IllegalParameter,
    DecodeError,
    DecryptError,
    InsufficientSecurity,
    InternalError,
    UserCanceled,
    Unknown(u8),
}

impl AlertDescription {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => AlertDescription::CloseNotify,
            10 => AlertDescription::UnexpectedMessage,
            20 => AlertDescription::BadRecordMac,
            40 => AlertDescription::HandshakeFailure,
            47 => AlertDescription::IllegalParameter,
            50 => AlertDescription::DecodeError,
            51 => AlertDescription::DecryptError,
            71 => AlertDescription::InsufficientSecurity,
            80 => AlertDescription::InternalError,
            90 => AlertDescription::UserCanceled,
            _ => AlertDescription::Unknown(value),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            AlertDescription::CloseNotify => 0,
            AlertDescription::UnexpectedMessage => 10,
            AlertDescription::BadRecordMac => 20,
            AlertDescription::HandshakeFailure => 40,
            AlertDescription::IllegalParameter => 47,
            AlertDescription::DecodeError => 50,
            AlertDescription::DecryptError => 51,
            AlertDescription::InsufficientSecurity => 71,
            AlertDescription::InternalError => 80,
            AlertDescription::UserCanceled => 90,
            AlertDescription::Unknown(v) => *v,
        }
    }

    /// The alert a local failure is reported with.
    pub fn for_error(e: &HandshakeError) -> AlertDescription {
        match e {
            HandshakeError::NoCommonCipherSuite => AlertDescription::HandshakeFailure,
            HandshakeError::PolicyViolation(_) => AlertDescription::InsufficientSecurity,
            HandshakeError::HandshakeVerificationFailed(_) => AlertDescription::DecryptError,
            HandshakeError::UnexpectedMessage(_) => AlertDescription::UnexpectedMessage,
            HandshakeError::Decode(_) => AlertDescription::DecodeError,
            HandshakeError::Crypto(_) => AlertDescription::InternalError,
            HandshakeError::StepTimeout | HandshakeError::Cancelled => {
                AlertDescription::UserCanceled
            }
            HandshakeError::InvalidState(_) => AlertDescription::InternalError,
        }
    }

    /// The error a fatal alert from the peer surfaces as.
    pub fn to_error(self) -> HandshakeError {
        match self {
            AlertDescription::HandshakeFailure => HandshakeError::NoCommonCipherSuite,
            AlertDescription::InsufficientSecurity => {
                HandshakeError::PolicyViolation("rejected by peer".into())
            }
            AlertDescription::DecryptError | AlertDescription::BadRecordMac => {
                HandshakeError::HandshakeVerificationFailed("rejected by peer".into())
            }
            AlertDescription::UserCanceled => HandshakeError::Cancelled,
            AlertDescription::DecodeError | AlertDescription::IllegalParameter => {
                HandshakeError::Decode("rejected by peer".into())
            }
            other => HandshakeError::UnexpectedMessage(format!("peer alert {:?}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Alert {
    pub level: AlertLevel,
    pub description: AlertDescription,
}

impl Alert {
    pub fn fatal(description: AlertDescription) -> Self {
        Alert {
            level: AlertLevel::Fatal,
            description,
        }
    }

    pub fn close_notify() -> Self {
        Alert {
            level: AlertLevel::Warning,
            description: AlertDescription::CloseNotify,
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Alert> {
        let (input, level) = be_u8(input)?;
        let (input, description) = be_u8(input)?;
        Ok((
            input,
            Alert {
                level: AlertLevel::from_u8(level),
                description: AlertDescription::from_u8(description),
            },
        ))
    }

    pub fn serialize(&self, out: &mut Buf) {
        out.push(self.level.as_u8());
        out.push(self.description.as_u8());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_mapping_survives_the_wire() {
        for e in [
            HandshakeError::NoCommonCipherSuite,
            HandshakeError::Cancelled,
        ] {
            assert_eq!(AlertDescription::for_error(&e).to_error(), e);
        }
        assert!(matches!(
            AlertDescription::for_error(&HandshakeError::PolicyViolation("x".into())).to_error(),
            HandshakeError::PolicyViolation(_)
        ));
        assert!(matches!(
            AlertDescription::for_error(&HandshakeError::HandshakeVerificationFailed("x".into()))
                .to_error(),
            HandshakeError::HandshakeVerificationFailed(_)
        ));
    }
}
