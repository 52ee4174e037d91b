//! RADIUS wire format
//!
//! Encoding and decoding of RADIUS packets over UDP as defined in RFC 2865
//! and RFC 2866, with Message-Authenticator (RFC 2869/3579) and the EAP
//! messages carried inside it.
//!
//! # Features
//!
//! - Packet encoding and decoding with strict length checks
//! - Ordered attribute container allowing repeated types
//! - Request/Response/Accounting-Request Authenticator calculation
//! - MD5-based User-Password hiding
//! - EAP-Message sub-codec
//!
//! # Example
//!
//! ```rust
//! use radius_wire::{Attribute, AttributeType, Code, Packet};
//!
//! let secret = b"testing123";
//! let mut request = Packet::request(Code::AccessRequest, 1, secret);
//! request.add_attribute(Attribute::string(AttributeType::UserName as u8, "alice").unwrap());
//! request.set_user_password(b"password").unwrap();
//! let bytes = request.encode_request().unwrap();
//!
//! // Server side
//! let received = Packet::decode(&bytes, secret).unwrap();
//! assert_eq!(received.user_password().unwrap().as_deref(), Some(&b"password"[..]));
//!
//! let reply = received.response(Code::AccessAccept);
//! let reply_bytes = reply.encode(&received.authenticator).unwrap();
//! assert_eq!(reply_bytes[1], 1);
//! ```

pub mod attributes;
pub mod auth;
pub mod eap;
pub mod message_auth;
pub mod packet;

pub use attributes::{Attribute, AttributeType, Attributes};
pub use auth::{
    calculate_accounting_request_authenticator, calculate_response_authenticator,
    decrypt_user_password, encrypt_user_password, generate_request_authenticator,
    verify_request_authenticator, verify_response_authenticator,
};
pub use eap::{EapCode, EapError, EapMessage, EapType};
pub use message_auth::{calculate_message_authenticator, verify_message_authenticator};
pub use packet::{Code, Packet, PacketError};
