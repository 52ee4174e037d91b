use super::Code;
use crate::attributes::{Attribute, AttributeType, Attributes};
use crate::auth;
use crate::eap::{EapError, EapMessage};
use crate::message_auth;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
    #[error("Invalid packet length: {0}")]
    InvalidLength(usize),
    #[error("Length field {declared} does not match datagram size {actual}")]
    LengthMismatch { declared: usize, actual: usize },
    #[error("Invalid packet code: {0}")]
    InvalidCode(u8),
    #[error("Malformed attribute: {0}")]
    MalformedAttribute(String),
    #[error("Invalid attribute type: {0}")]
    InvalidAttributeType(u8),
    #[error("Attribute value too long: {0} bytes (max 253)")]
    AttributeTooLong(usize),
    #[error("Invalid attribute value: {0}")]
    InvalidValue(String),
    #[error("Packet too large: {0} bytes")]
    PacketTooLarge(usize),
    #[error("Shared secret is empty")]
    EmptySecret,
    #[error("Request Authenticator mismatch")]
    AuthenticatorMismatch,
    #[error("Message-Authenticator mismatch")]
    MessageAuthenticatorMismatch,
    #[error("Invalid User-Password length: {0}")]
    InvalidPasswordLength(usize),
}

impl PacketError {
    /// Header-level damage: the datagram is not a RADIUS packet at all
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            PacketError::InvalidLength(_)
                | PacketError::LengthMismatch { .. }
                | PacketError::InvalidCode(_)
                | PacketError::MalformedAttribute(_)
        )
    }

    /// The packet parsed but failed an integrity check
    pub fn is_integrity_failure(&self) -> bool {
        matches!(
            self,
            PacketError::AuthenticatorMismatch | PacketError::MessageAuthenticatorMismatch
        )
    }
}

/// RADIUS Packet structure as defined in RFC 2865 Section 3
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |     Code      |  Identifier   |            Length             |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                                                               |
/// |                         Authenticator                         |
/// |                                                               |
/// |                                                               |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |  Attributes ...
/// +-+-+-+-+-+-+-+-+-+-+-+-+-
/// ```
///
/// The shared secret rides along with the packet but is never written to the
/// wire.
#[derive(Clone)]
pub struct Packet {
    /// Packet type (1 byte)
    pub code: Code,
    /// Packet identifier for matching requests/responses (1 byte)
    pub identifier: u8,
    /// Authenticator (16 bytes)
    pub authenticator: [u8; 16],
    /// Attributes in wire order
    pub attributes: Attributes,
    /// Shared secret used to sign this packet and hide its password
    pub secret: Vec<u8>,
}

impl std::fmt::Debug for Packet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Packet")
            .field("code", &self.code)
            .field("identifier", &self.identifier)
            .field("authenticator", &self.authenticator)
            .field("attributes", &self.attributes)
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl Packet {
    /// Minimum RADIUS packet size (20 bytes: 1 code + 1 id + 2 length + 16 authenticator)
    pub const MIN_PACKET_SIZE: usize = 20;
    /// Maximum RADIUS packet size (4096 bytes as per RFC 2865)
    pub const MAX_PACKET_SIZE: usize = 4096;

    pub fn new(code: Code, identifier: u8, authenticator: [u8; 16]) -> Self {
        Packet {
            code,
            identifier,
            authenticator,
            attributes: Attributes::new(),
            secret: Vec::new(),
        }
    }

    /// New request with a random authenticator
    pub fn request(code: Code, identifier: u8, secret: impl AsRef<[u8]>) -> Self {
        Packet::new(code, identifier, auth::generate_request_authenticator()).with_secret(secret)
    }

    pub fn with_secret(mut self, secret: impl AsRef<[u8]>) -> Self {
        self.secret = secret.as_ref().to_vec();
        self
    }

    /// Empty reply to this packet: same identifier and secret, new code.
    ///
    /// The authenticator is left as this packet's so that
    /// `reply.encode(&request.authenticator)` reads naturally; encoding
    /// always overwrites it.
    pub fn response(&self, code: Code) -> Packet {
        Packet {
            code,
            identifier: self.identifier,
            authenticator: self.authenticator,
            attributes: Attributes::new(),
            secret: self.secret.clone(),
        }
    }

    pub fn add_attribute(&mut self, attribute: Attribute) {
        self.attributes.add(attribute);
    }

    /// Find first attribute by type
    pub fn find_attribute(&self, attr_type: u8) -> Option<&Attribute> {
        self.attributes.get(attr_type)
    }

    /// Find all attributes by type
    pub fn find_all_attributes(&self, attr_type: u8) -> Vec<&Attribute> {
        self.attributes.get_all(attr_type).collect()
    }

    /// Get the length of the encoded packet
    pub fn length(&self) -> usize {
        Self::MIN_PACKET_SIZE + self.attributes.encoded_len()
    }

    /// Decode a packet from one datagram.
    ///
    /// The Length field must equal `data.len()` exactly. The authenticator is
    /// not checked here; see [`Packet::verify_request`].
    pub fn decode(data: &[u8], secret: &[u8]) -> Result<Self, PacketError> {
        if data.len() < Self::MIN_PACKET_SIZE || data.len() > Self::MAX_PACKET_SIZE {
            return Err(PacketError::InvalidLength(data.len()));
        }

        let code = Code::from_u8(data[0]).ok_or(PacketError::InvalidCode(data[0]))?;
        let identifier = data[1];

        let length = u16::from_be_bytes([data[2], data[3]]) as usize;
        if length != data.len() {
            return Err(PacketError::LengthMismatch {
                declared: length,
                actual: data.len(),
            });
        }

        let mut authenticator = [0u8; 16];
        authenticator.copy_from_slice(&data[4..20]);

        let attributes = Attributes::parse(&data[Self::MIN_PACKET_SIZE..])?;

        Ok(Packet {
            code,
            identifier,
            authenticator,
            attributes,
            secret: secret.to_vec(),
        })
    }

    /// Check the integrity of a received request datagram.
    ///
    /// Accounting-Request authenticators are recomputed from the secret; a
    /// present Message-Authenticator is checked for every code. A failure
    /// means the packet is well-formed but must not be trusted.
    pub fn verify_request(data: &[u8], secret: &[u8]) -> Result<(), PacketError> {
        if data.len() < Self::MIN_PACKET_SIZE {
            return Err(PacketError::InvalidLength(data.len()));
        }
        let code = Code::from_u8(data[0]).ok_or(PacketError::InvalidCode(data[0]))?;

        if !auth::request_is_authentic(code, data, secret) {
            return Err(PacketError::AuthenticatorMismatch);
        }

        Self::verify_message_authenticator(data, secret)
    }

    /// Check the Message-Authenticator of a received request, if present.
    ///
    /// Accounting-Request is signed with a zeroed Authenticator field, other
    /// requests with the authenticator they carry.
    pub fn verify_message_authenticator(data: &[u8], secret: &[u8]) -> Result<(), PacketError> {
        if data.len() < Self::MIN_PACKET_SIZE {
            return Err(PacketError::InvalidLength(data.len()));
        }
        let code = Code::from_u8(data[0]).ok_or(PacketError::InvalidCode(data[0]))?;

        let mut field = [0u8; 16];
        if !code.has_verifiable_authenticator() {
            field.copy_from_slice(&data[4..20]);
        }
        message_auth::verify_message_authenticator(data, secret, &field)
    }

    /// Encode as a reply to the request whose authenticator is given.
    ///
    /// The Authenticator field is computed as
    /// MD5(Code + ID + Length + `request_authenticator` + Attributes + Secret),
    /// after filling in any Message-Authenticator. Passing sixteen zero
    /// octets yields an Accounting-Request authenticator.
    pub fn encode(&self, request_authenticator: &[u8; 16]) -> Result<Vec<u8>, PacketError> {
        if self.secret.is_empty() {
            return Err(PacketError::EmptySecret);
        }

        let mut buffer = self.encode_signed(request_authenticator, &self.secret)?;
        let authenticator = auth::digest_with_secret(&buffer, &self.secret);
        buffer[4..20].copy_from_slice(&authenticator);
        Ok(buffer)
    }

    /// Encode as a request.
    ///
    /// Access-Request and Status-Server keep their own (random)
    /// authenticator; other codes use the Accounting-Request construction,
    /// and the computed value is stored in `self.authenticator` so the reply
    /// can be checked against it.
    pub fn encode_request(&mut self) -> Result<Vec<u8>, PacketError> {
        match self.code {
            Code::AccessRequest | Code::StatusServer => {
                if self.secret.is_empty() {
                    return Err(PacketError::EmptySecret);
                }
                self.encode_signed(&self.authenticator, &self.secret)
            }
            _ => {
                let buffer = self.encode(&[0u8; auth::AUTHENTICATOR_LENGTH])?;
                self.authenticator.copy_from_slice(&buffer[4..20]);
                Ok(buffer)
            }
        }
    }

    /// Header and attributes with `authenticator` in the Authenticator field
    /// and any Message-Authenticator filled in.
    pub(crate) fn encode_signed(
        &self,
        authenticator: &[u8; 16],
        secret: &[u8],
    ) -> Result<Vec<u8>, PacketError> {
        let mut buffer = self.encode_raw(authenticator)?;
        message_auth::sign(&mut buffer, secret)?;
        Ok(buffer)
    }

    fn encode_raw(&self, authenticator: &[u8; 16]) -> Result<Vec<u8>, PacketError> {
        let total_length = self.length();
        if total_length > Self::MAX_PACKET_SIZE {
            return Err(PacketError::PacketTooLarge(total_length));
        }

        let mut buffer = Vec::with_capacity(total_length);
        buffer.push(self.code.as_u8());
        buffer.push(self.identifier);
        buffer.extend_from_slice(&(total_length as u16).to_be_bytes());
        buffer.extend_from_slice(authenticator);
        self.attributes.encode_into(&mut buffer)?;

        Ok(buffer)
    }

    /// Add a zeroed Message-Authenticator, replacing any existing one.
    /// Its value is computed when the packet is encoded.
    pub fn add_message_authenticator(&mut self) {
        self.attributes.set(Attribute {
            attr_type: AttributeType::MessageAuthenticator as u8,
            value: vec![0u8; message_auth::MESSAGE_AUTHENTICATOR_LENGTH],
        });
    }

    /// Recover the User-Password using this packet's secret and authenticator.
    ///
    /// Returns `Ok(None)` when the attribute is absent.
    pub fn user_password(&self) -> Result<Option<Vec<u8>>, PacketError> {
        if self.secret.is_empty() {
            return Err(PacketError::EmptySecret);
        }
        self.find_attribute(AttributeType::UserPassword as u8)
            .map(|attr| auth::decrypt_user_password(&attr.value, &self.secret, &self.authenticator))
            .transpose()
    }

    /// Hide `password` into the User-Password attribute.
    ///
    /// Uses the current authenticator, so set that first.
    pub fn set_user_password(&mut self, password: &[u8]) -> Result<(), PacketError> {
        if self.secret.is_empty() {
            return Err(PacketError::EmptySecret);
        }
        let hidden = auth::encrypt_user_password(password, &self.secret, &self.authenticator)?;
        self.attributes
            .set(Attribute::new(AttributeType::UserPassword as u8, hidden)?);
        Ok(())
    }

    /// Decode the first EAP-Message attribute, if any
    pub fn eap_message(&self) -> Result<Option<EapMessage>, EapError> {
        self.find_attribute(AttributeType::EapMessage as u8)
            .map(Attribute::as_eap)
            .transpose()
    }

    /// Replace the EAP-Message attributes with `message`
    pub fn set_eap_message(&mut self, message: &EapMessage) -> Result<(), EapError> {
        self.attributes.set(message.to_attribute()?);
        Ok(())
    }
}
