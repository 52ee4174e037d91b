use crate::eap::{EapError, EapMessage};
use crate::packet::PacketError;
use chrono::{DateTime, Utc};
use std::net::{Ipv4Addr, Ipv6Addr};

/// RADIUS Attribute structure as defined in RFC 2865 Section 5
///
/// ```text
///  0                   1                   2
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |     Type      |    Length     |  Value ...
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// The type is an opaque tag; [`AttributeType`](super::AttributeType) only
/// names the well-known ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Attribute type (1 byte, 0 is reserved)
    pub attr_type: u8,
    /// Attribute value (0-253 bytes)
    pub value: Vec<u8>,
}

impl Attribute {
    /// Minimum attribute length (type + length fields = 2 bytes)
    pub const MIN_LENGTH: usize = 2;
    /// Maximum attribute length (255 bytes including type and length)
    pub const MAX_LENGTH: usize = 255;
    /// Maximum value length (253 bytes)
    pub const MAX_VALUE_LENGTH: usize = 253;

    /// Create an attribute from a raw value.
    ///
    /// Values longer than 253 bytes and the reserved type 0 are rejected here,
    /// so an `Attribute` always fits its one-byte length field.
    pub fn new(attr_type: u8, value: Vec<u8>) -> Result<Self, PacketError> {
        if attr_type == 0 {
            return Err(PacketError::InvalidAttributeType(attr_type));
        }
        if value.len() > Self::MAX_VALUE_LENGTH {
            return Err(PacketError::AttributeTooLong(value.len()));
        }
        Ok(Attribute { attr_type, value })
    }

    /// Create an attribute from a borrowed byte slice
    pub fn bytes(attr_type: u8, value: &[u8]) -> Result<Self, PacketError> {
        Self::new(attr_type, value.to_vec())
    }

    /// Create a string attribute
    pub fn string(attr_type: u8, value: impl Into<String>) -> Result<Self, PacketError> {
        Self::new(attr_type, value.into().into_bytes())
    }

    /// Create an integer attribute (32-bit big-endian)
    pub fn integer(attr_type: u8, value: u32) -> Result<Self, PacketError> {
        Self::new(attr_type, value.to_be_bytes().to_vec())
    }

    /// Create a 64-bit integer attribute (big-endian)
    pub fn integer64(attr_type: u8, value: u64) -> Result<Self, PacketError> {
        Self::new(attr_type, value.to_be_bytes().to_vec())
    }

    /// Create a time attribute (seconds since the Unix epoch, 32-bit)
    pub fn time(attr_type: u8, value: DateTime<Utc>) -> Result<Self, PacketError> {
        let secs = u32::try_from(value.timestamp()).map_err(|_| {
            PacketError::InvalidValue(format!("time out of range: {}", value.to_rfc3339()))
        })?;
        Self::new(attr_type, secs.to_be_bytes().to_vec())
    }

    /// Create an IPv4 address attribute
    pub fn ipv4(attr_type: u8, value: Ipv4Addr) -> Result<Self, PacketError> {
        Self::new(attr_type, value.octets().to_vec())
    }

    /// Create an IPv6 address attribute
    pub fn ipv6(attr_type: u8, value: Ipv6Addr) -> Result<Self, PacketError> {
        Self::new(attr_type, value.octets().to_vec())
    }

    /// Create an EAP-Message attribute carrying `message`
    pub fn eap(message: &EapMessage) -> Result<Self, EapError> {
        message.to_attribute()
    }

    /// Append the wire form of this attribute to `buffer`
    pub fn encode_into(&self, buffer: &mut Vec<u8>) -> Result<(), PacketError> {
        let length = self.encoded_length();
        if length > Self::MAX_LENGTH {
            return Err(PacketError::AttributeTooLong(self.value.len()));
        }

        buffer.push(self.attr_type);
        buffer.push(length as u8);
        buffer.extend_from_slice(&self.value);
        Ok(())
    }

    /// Encode attribute to bytes
    pub fn encode(&self) -> Result<Vec<u8>, PacketError> {
        let mut buffer = Vec::with_capacity(self.encoded_length());
        self.encode_into(&mut buffer)?;
        Ok(buffer)
    }

    /// Decode one attribute from the front of `data`.
    ///
    /// Trailing bytes after the attribute are left for the caller; use
    /// [`encoded_length`](Self::encoded_length) to advance.
    pub fn decode(data: &[u8]) -> Result<Self, PacketError> {
        if data.len() < Self::MIN_LENGTH {
            return Err(PacketError::MalformedAttribute(format!(
                "truncated header: {} bytes remaining",
                data.len()
            )));
        }

        let attr_type = data[0];
        let length = data[1] as usize;

        if attr_type == 0 {
            return Err(PacketError::MalformedAttribute(
                "reserved attribute type 0".to_string(),
            ));
        }

        if length < Self::MIN_LENGTH {
            return Err(PacketError::MalformedAttribute(format!(
                "invalid attribute length: {}",
                length
            )));
        }

        if data.len() < length {
            return Err(PacketError::MalformedAttribute(format!(
                "insufficient data for attribute: expected {}, got {}",
                length,
                data.len()
            )));
        }

        Ok(Attribute {
            attr_type,
            value: data[Self::MIN_LENGTH..length].to_vec(),
        })
    }

    /// Get the encoded length of this attribute
    pub fn encoded_length(&self) -> usize {
        Self::MIN_LENGTH + self.value.len()
    }

    /// Try to interpret value as a string
    pub fn as_string(&self) -> Result<String, std::string::FromUtf8Error> {
        String::from_utf8(self.value.clone())
    }

    /// Try to interpret value as an integer (32-bit big-endian)
    pub fn as_integer(&self) -> Result<u32, PacketError> {
        Ok(u32::from_be_bytes(self.fixed::<4>("integer")?))
    }

    /// Try to interpret value as a 64-bit integer (big-endian)
    pub fn as_integer64(&self) -> Result<u64, PacketError> {
        Ok(u64::from_be_bytes(self.fixed::<8>("integer64")?))
    }

    /// Try to interpret value as a timestamp
    pub fn as_time(&self) -> Result<DateTime<Utc>, PacketError> {
        let secs = u32::from_be_bytes(self.fixed::<4>("time")?);
        DateTime::from_timestamp(i64::from(secs), 0)
            .ok_or_else(|| PacketError::InvalidValue(format!("invalid timestamp: {}", secs)))
    }

    /// Try to interpret value as an IPv4 address
    pub fn as_ipv4(&self) -> Result<Ipv4Addr, PacketError> {
        Ok(Ipv4Addr::from(self.fixed::<4>("IPv4")?))
    }

    /// Try to interpret value as an IPv6 address
    pub fn as_ipv6(&self) -> Result<Ipv6Addr, PacketError> {
        Ok(Ipv6Addr::from(self.fixed::<16>("IPv6")?))
    }

    /// Try to decode value as an embedded EAP message
    pub fn as_eap(&self) -> Result<EapMessage, EapError> {
        EapMessage::decode(&self.value)
    }

    fn fixed<const N: usize>(&self, kind: &str) -> Result<[u8; N], PacketError> {
        self.value.as_slice().try_into().map_err(|_| {
            PacketError::InvalidValue(format!(
                "expected {} bytes for {}, got {}",
                N,
                kind,
                self.value.len()
            ))
        })
    }
}
