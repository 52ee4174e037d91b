//! Message-Authenticator Support (RFC 2869 Section 5.14, RFC 3579 Section 3.2)
//!
//! HMAC-MD5 keyed with the shared secret over the whole packet, with the
//! attribute's own 16-byte value zeroed while computing. The Authenticator
//! field holds the Request Authenticator during the computation: the random
//! one for Access-Request, the request's one for responses, and zeros for
//! Accounting-Request.

use crate::attributes::{Attribute, AttributeType};
use crate::packet::{Packet, PacketError};
use hmac::{Hmac, Mac};
use md5_digest::Md5;
use subtle::ConstantTimeEq;

type HmacMd5 = Hmac<Md5>;

/// Length of the Message-Authenticator value
pub const MESSAGE_AUTHENTICATOR_LENGTH: usize = 16;

/// Calculate Message-Authenticator for a RADIUS packet
///
/// `packet_bytes` must have the Message-Authenticator value set to zeros.
pub fn calculate_message_authenticator(packet_bytes: &[u8], secret: &[u8]) -> [u8; 16] {
    // HMAC accepts keys of any length
    let mut mac = HmacMd5::new_from_slice(secret).expect("HMAC can take key of any size");
    mac.update(packet_bytes);
    let bytes = mac.finalize().into_bytes();

    let mut output = [0u8; 16];
    output.copy_from_slice(&bytes);
    output
}

/// Offset of the first Message-Authenticator value in an encoded packet.
///
/// Returns `Ok(None)` when the packet has no such attribute.
pub fn find_message_authenticator(packet_bytes: &[u8]) -> Result<Option<usize>, PacketError> {
    let mut offset = Packet::MIN_PACKET_SIZE;
    while offset < packet_bytes.len() {
        let attr = Attribute::decode(&packet_bytes[offset..])?;
        if attr.attr_type == AttributeType::MessageAuthenticator as u8 {
            if attr.value.len() != MESSAGE_AUTHENTICATOR_LENGTH {
                return Err(PacketError::MalformedAttribute(format!(
                    "Message-Authenticator must be {} bytes, got {}",
                    MESSAGE_AUTHENTICATOR_LENGTH,
                    attr.value.len()
                )));
            }
            return Ok(Some(offset + Attribute::MIN_LENGTH));
        }
        offset += attr.encoded_length();
    }
    Ok(None)
}

/// Fill in the Message-Authenticator of an encoded packet, if it has one.
///
/// The Authenticator field of `buffer` must already hold the value the
/// construction calls for. Returns whether an attribute was signed.
pub(crate) fn sign(buffer: &mut [u8], secret: &[u8]) -> Result<bool, PacketError> {
    let Some(offset) = find_message_authenticator(buffer)? else {
        return Ok(false);
    };

    let range = offset..offset + MESSAGE_AUTHENTICATOR_LENGTH;
    buffer[range.clone()].fill(0);
    let mac = calculate_message_authenticator(buffer, secret);
    buffer[range].copy_from_slice(&mac);
    Ok(true)
}

/// Verify the Message-Authenticator of a received packet
///
/// `authenticator` is what the Authenticator field held when the sender
/// computed the HMAC. A packet without the attribute verifies trivially.
pub fn verify_message_authenticator(
    packet_bytes: &[u8],
    secret: &[u8],
    authenticator: &[u8; 16],
) -> Result<(), PacketError> {
    if packet_bytes.len() < Packet::MIN_PACKET_SIZE {
        return Err(PacketError::InvalidLength(packet_bytes.len()));
    }
    let Some(offset) = find_message_authenticator(packet_bytes)? else {
        return Ok(());
    };

    let range = offset..offset + MESSAGE_AUTHENTICATOR_LENGTH;
    let mut copy = packet_bytes.to_vec();
    copy[4..20].copy_from_slice(authenticator);
    copy[range.clone()].fill(0);

    let expected = calculate_message_authenticator(&copy, secret);
    if bool::from(expected.as_slice().ct_eq(&packet_bytes[range])) {
        Ok(())
    } else {
        Err(PacketError::MessageAuthenticatorMismatch)
    }
}
