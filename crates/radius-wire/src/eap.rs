//! EAP messages carried in the EAP-Message attribute (RFC 3748, RFC 3579)
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |     Code      |  Identifier   |            Length             |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |     Type      |  Type-Data ...
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! The header is always five bytes here, Success and Failure included, so a
//! message never encodes shorter than [`EapMessage::HEADER_LENGTH`]. A message
//! must fit in one attribute; splitting across several EAP-Message attributes
//! is left to the caller (see [`Attributes::get_all`](crate::attributes::Attributes::get_all)).

use crate::attributes::{Attribute, AttributeType};
use thiserror::Error;

/// EAP packet code (first byte of EAP packet)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EapCode {
    /// Request packet (Code 1)
    Request = 1,
    /// Response packet (Code 2)
    Response = 2,
    /// Success packet (Code 3)
    Success = 3,
    /// Failure packet (Code 4)
    Failure = 4,
}

impl EapCode {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(EapCode::Request),
            2 => Some(EapCode::Response),
            3 => Some(EapCode::Success),
            4 => Some(EapCode::Failure),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl std::fmt::Display for EapCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EapCode::Request => "Request",
            EapCode::Response => "Response",
            EapCode::Success => "Success",
            EapCode::Failure => "Failure",
        };
        f.write_str(name)
    }
}

/// EAP method types (RFC 3748 and IANA registry)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EapType {
    /// Identity (Type 1)
    Identity = 1,
    /// Notification (Type 2)
    Notification = 2,
    /// Nak (Type 3), response only
    Nak = 3,
    /// MD5-Challenge (Type 4)
    Md5Challenge = 4,
    /// One-Time Password (Type 5)
    OneTimePassword = 5,
    /// Generic Token Card (Type 6)
    GenericTokenCard = 6,
    /// EAP-TLS (Type 13) - RFC 5216
    Tls = 13,
    /// EAP-TTLS (Type 21) - RFC 5281
    Ttls = 21,
    /// PEAP (Type 25)
    Peap = 25,
    /// EAP-MSCHAPv2 (Type 26)
    MsChapV2 = 26,
    /// Expanded Types (Type 254)
    Expanded = 254,
    /// Experimental use (Type 255)
    Experimental = 255,
}

impl EapType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(EapType::Identity),
            2 => Some(EapType::Notification),
            3 => Some(EapType::Nak),
            4 => Some(EapType::Md5Challenge),
            5 => Some(EapType::OneTimePassword),
            6 => Some(EapType::GenericTokenCard),
            13 => Some(EapType::Tls),
            21 => Some(EapType::Ttls),
            25 => Some(EapType::Peap),
            26 => Some(EapType::MsChapV2),
            254 => Some(EapType::Expanded),
            255 => Some(EapType::Experimental),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl std::fmt::Display for EapType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EapType::Identity => "Identity",
            EapType::Notification => "Notification",
            EapType::Nak => "Nak",
            EapType::Md5Challenge => "MD5-Challenge",
            EapType::OneTimePassword => "One-Time-Password",
            EapType::GenericTokenCard => "Generic-Token-Card",
            EapType::Tls => "EAP-TLS",
            EapType::Ttls => "EAP-TTLS",
            EapType::Peap => "PEAP",
            EapType::MsChapV2 => "EAP-MSCHAPv2",
            EapType::Expanded => "Expanded",
            EapType::Experimental => "Experimental",
        };
        f.write_str(name)
    }
}

/// EAP-related errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EapError {
    #[error("EAP message too short: expected at least {expected} bytes, got {actual}")]
    PacketTooShort { expected: usize, actual: usize },

    #[error("Invalid EAP length field: {0}")]
    InvalidLength(usize),

    #[error("Invalid EAP code: {0}")]
    InvalidCode(u8),

    #[error("EAP message too large: {0} bytes")]
    TooLarge(usize),
}

/// One EAP message
///
/// `eap_type` is kept as the raw byte so that methods outside [`EapType`]
/// survive a decode/encode cycle unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EapMessage {
    pub code: EapCode,
    pub identifier: u8,
    pub eap_type: u8,
    pub data: Vec<u8>,
}

impl EapMessage {
    /// Code + Identifier + Length + Type
    pub const HEADER_LENGTH: usize = 5;

    pub fn new(code: EapCode, identifier: u8, eap_type: EapType, data: Vec<u8>) -> Self {
        EapMessage {
            code,
            identifier,
            eap_type: eap_type.as_u8(),
            data,
        }
    }

    /// Create an EAP Identity Request
    pub fn identity_request(identifier: u8, prompt: &str) -> Self {
        Self::new(
            EapCode::Request,
            identifier,
            EapType::Identity,
            prompt.as_bytes().to_vec(),
        )
    }

    /// Create an EAP Identity Response
    pub fn identity_response(identifier: u8, identity: &str) -> Self {
        Self::new(
            EapCode::Response,
            identifier,
            EapType::Identity,
            identity.as_bytes().to_vec(),
        )
    }

    /// Create an EAP Success message (type byte 0, no data)
    pub fn success(identifier: u8) -> Self {
        EapMessage {
            code: EapCode::Success,
            identifier,
            eap_type: 0,
            data: Vec::new(),
        }
    }

    /// Create an EAP Failure message (type byte 0, no data)
    pub fn failure(identifier: u8) -> Self {
        EapMessage {
            code: EapCode::Failure,
            identifier,
            eap_type: 0,
            data: Vec::new(),
        }
    }

    /// The method type, if it is a known one
    pub fn eap_type(&self) -> Option<EapType> {
        EapType::from_u8(self.eap_type)
    }

    /// Encoded size, equal to the embedded Length field
    pub fn length(&self) -> usize {
        Self::HEADER_LENGTH + self.data.len()
    }

    /// Decode an EAP message from an attribute value.
    ///
    /// The embedded length is trusted only up to `value.len()`: a message
    /// claiming more than it was given is rejected before any data is read.
    /// Bytes past the embedded length are ignored.
    pub fn decode(value: &[u8]) -> Result<Self, EapError> {
        if value.len() < Self::HEADER_LENGTH {
            return Err(EapError::PacketTooShort {
                expected: Self::HEADER_LENGTH,
                actual: value.len(),
            });
        }

        let length = u16::from_be_bytes([value[2], value[3]]) as usize;
        if length < Self::HEADER_LENGTH {
            return Err(EapError::InvalidLength(length));
        }
        if length > value.len() {
            return Err(EapError::PacketTooShort {
                expected: length,
                actual: value.len(),
            });
        }

        let code = EapCode::from_u8(value[0]).ok_or(EapError::InvalidCode(value[0]))?;

        Ok(EapMessage {
            code,
            identifier: value[1],
            eap_type: value[4],
            data: value[Self::HEADER_LENGTH..length].to_vec(),
        })
    }

    /// Encode to an attribute value; the Length field is recomputed
    ///
    /// Fails with [`EapError::TooLarge`] when the message does not fit the
    /// 16-bit Length field.
    pub fn encode(&self) -> Result<Vec<u8>, EapError> {
        let length = self.length();
        if length > u16::MAX as usize {
            return Err(EapError::TooLarge(length));
        }
        let mut bytes = Vec::with_capacity(length);
        bytes.push(self.code.as_u8());
        bytes.push(self.identifier);
        bytes.extend_from_slice(&(length as u16).to_be_bytes());
        bytes.push(self.eap_type);
        bytes.extend_from_slice(&self.data);
        Ok(bytes)
    }

    /// Wrap in a single EAP-Message attribute
    pub fn to_attribute(&self) -> Result<Attribute, EapError> {
        let length = self.length();
        if length > Attribute::MAX_VALUE_LENGTH {
            return Err(EapError::TooLarge(length));
        }
        Ok(Attribute {
            attr_type: AttributeType::EapMessage as u8,
            value: self.encode()?,
        })
    }
}
