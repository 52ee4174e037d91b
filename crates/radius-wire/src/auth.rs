//! Authenticator and User-Password hiding (RFC 2865 Section 3 and 5.2,
//! RFC 2866 Section 3)
//!
//! Every construction here is a single MD5 over concatenated byte strings.
//! The codec threads the request authenticator in explicitly: a response
//! authenticator is never derived from the response alone.

use crate::packet::{Code, Packet, PacketError};
use rand::Rng;
use subtle::ConstantTimeEq;

/// Length of the Authenticator field
pub const AUTHENTICATOR_LENGTH: usize = 16;

/// Longest User-Password value the hiding construction accepts (RFC 2865 5.2)
pub const MAX_PASSWORD_LENGTH: usize = 128;

const BLOCK: usize = 16;

/// Generate a random Request Authenticator (16 bytes) per RFC 2865 Section 3
pub fn generate_request_authenticator() -> [u8; 16] {
    let mut rng = rand::rng();
    let mut authenticator = [0u8; 16];
    rng.fill(&mut authenticator);
    authenticator
}

/// MD5 over an encoded packet followed by the shared secret.
///
/// `packet_bytes` must already carry whatever belongs in the Authenticator
/// field for the construction being computed (request authenticator for
/// responses, zeros for Accounting-Request).
pub(crate) fn digest_with_secret(packet_bytes: &[u8], secret: &[u8]) -> [u8; 16] {
    let mut context = md5::Context::new();
    context.consume(packet_bytes);
    context.consume(secret);
    context.compute().0
}

/// Calculate Response Authenticator per RFC 2865 Section 3
///
/// Response Authenticator = MD5(Code + ID + Length + Request Authenticator + Attributes + Secret)
///
/// Used for Access-Accept, Access-Reject, Access-Challenge and
/// Accounting-Response packets.
pub fn calculate_response_authenticator(
    packet: &Packet,
    request_authenticator: &[u8; 16],
    secret: &[u8],
) -> Result<[u8; 16], PacketError> {
    let bytes = packet.encode_signed(request_authenticator, secret)?;
    Ok(digest_with_secret(&bytes, secret))
}

/// Verify the Response Authenticator of a decoded response against the
/// request it answers.
pub fn verify_response_authenticator(
    response: &Packet,
    request_authenticator: &[u8; 16],
    secret: &[u8],
) -> bool {
    match calculate_response_authenticator(response, request_authenticator, secret) {
        Ok(expected) => bool::from(expected.as_slice().ct_eq(response.authenticator.as_slice())),
        Err(_) => false,
    }
}

/// Calculate the Request Authenticator of an Accounting-Request
/// (RFC 2866 Section 3): the response construction with sixteen zero octets
/// in place of the request authenticator.
pub fn calculate_accounting_request_authenticator(
    packet: &Packet,
    secret: &[u8],
) -> Result<[u8; 16], PacketError> {
    calculate_response_authenticator(packet, &[0u8; AUTHENTICATOR_LENGTH], secret)
}

/// Check the Request Authenticator of a received request.
///
/// Works on the raw datagram so the check covers exactly the bytes that were
/// received. Only meaningful for codes where
/// [`Code::has_verifiable_authenticator`] holds; an Access-Request
/// authenticator is random and cannot be checked here.
pub fn verify_request_authenticator(packet_bytes: &[u8], secret: &[u8]) -> bool {
    if packet_bytes.len() < Packet::MIN_PACKET_SIZE {
        return false;
    }

    let mut zeroed = packet_bytes.to_vec();
    zeroed[4..20].fill(0);
    let expected = digest_with_secret(&zeroed, secret);

    bool::from(expected.as_slice().ct_eq(&packet_bytes[4..20]))
}

/// Whether a received request's authenticator can be checked, and passes.
///
/// Codes without a verifiable authenticator are reported as passing.
pub fn request_is_authentic(code: Code, packet_bytes: &[u8], secret: &[u8]) -> bool {
    !code.has_verifiable_authenticator() || verify_request_authenticator(packet_bytes, secret)
}

/// Hide a User-Password value per RFC 2865 Section 5.2
///
/// The password is padded with NULs to a multiple of 16 bytes, then XORed
/// with MD5(secret + request_authenticator) for the first 16 bytes and
/// MD5(secret + previous ciphertext block) for each subsequent block.
pub fn encrypt_user_password(
    password: &[u8],
    secret: &[u8],
    authenticator: &[u8; 16],
) -> Result<Vec<u8>, PacketError> {
    if password.len() > MAX_PASSWORD_LENGTH {
        return Err(PacketError::InvalidPasswordLength(password.len()));
    }

    let padded_len = password.len().div_ceil(BLOCK).max(1) * BLOCK;
    let mut padded = password.to_vec();
    padded.resize(padded_len, 0);

    let mut result = Vec::with_capacity(padded_len);
    let mut previous: [u8; 16] = *authenticator;

    for chunk in padded.chunks(BLOCK) {
        let keystream = keystream_block(secret, &previous);
        for (i, byte) in chunk.iter().enumerate() {
            previous[i] = byte ^ keystream[i];
        }
        result.extend_from_slice(&previous);
    }

    Ok(result)
}

/// Recover a hidden User-Password value per RFC 2865 Section 5.2
///
/// The value must be a positive multiple of 16 bytes, at most 128. The NUL
/// padding is stripped from the result.
pub fn decrypt_user_password(
    encrypted: &[u8],
    secret: &[u8],
    authenticator: &[u8; 16],
) -> Result<Vec<u8>, PacketError> {
    if encrypted.is_empty()
        || encrypted.len() % BLOCK != 0
        || encrypted.len() > MAX_PASSWORD_LENGTH
    {
        return Err(PacketError::InvalidPasswordLength(encrypted.len()));
    }

    let mut result = Vec::with_capacity(encrypted.len());
    let mut previous: &[u8] = authenticator;

    for chunk in encrypted.chunks(BLOCK) {
        let keystream = keystream_block(secret, previous);
        result.extend(chunk.iter().zip(keystream.iter()).map(|(c, k)| c ^ k));
        previous = chunk;
    }

    while result.last() == Some(&0) {
        result.pop();
    }

    Ok(result)
}

fn keystream_block(secret: &[u8], previous: &[u8]) -> [u8; 16] {
    let mut context = md5::Context::new();
    context.consume(secret);
    context.consume(previous);
    context.compute().0
}
