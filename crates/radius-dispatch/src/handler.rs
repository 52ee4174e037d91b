use crate::config::Config;
use crate::server::{ServerError, Transport};
use async_trait::async_trait;
use radius_wire::attributes::{Attribute, AttributeType};
use radius_wire::eap::{EapCode, EapMessage, EapType};
use radius_wire::{Code, Packet};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A decoded request and the addresses it travelled between
#[derive(Debug, Clone)]
pub struct Request {
    pub packet: Packet,
    pub local_addr: SocketAddr,
    pub remote_addr: SocketAddr,
}

/// Sends replies to the client a request came from
///
/// Each [`write`](Self::write) encodes the packet against the authenticator of
/// the request the writer was created for, so handlers never compute
/// authenticators themselves.
pub struct ResponseWriter {
    transport: Arc<Transport>,
    remote_addr: SocketAddr,
    request_authenticator: [u8; 16],
    secret: Vec<u8>,
}

impl ResponseWriter {
    pub(crate) fn new(transport: Arc<Transport>, request: &Request) -> Self {
        ResponseWriter {
            transport,
            remote_addr: request.remote_addr,
            request_authenticator: request.packet.authenticator,
            secret: request.packet.secret.clone(),
        }
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// Encode and send one reply.
    ///
    /// A packet without a secret of its own is signed with the one the request
    /// arrived under. Fails with [`ServerError::SocketClosed`] once the server
    /// has shut down; nothing partial is ever sent.
    pub async fn write(&self, packet: &Packet) -> Result<(), ServerError> {
        let bytes = if packet.secret.is_empty() {
            packet
                .clone()
                .with_secret(&self.secret)
                .encode(&self.request_authenticator)?
        } else {
            packet.encode(&self.request_authenticator)?
        };

        let socket = self.transport.socket()?;
        socket.send_to(&bytes, self.remote_addr).await?;

        debug!(
            response_type = %packet.code,
            client_addr = %self.remote_addr,
            request_id = packet.identifier,
            "Sent RADIUS response"
        );
        Ok(())
    }
}

/// Request handler
///
/// Called once per authenticated datagram. The handler may write any number
/// of replies, including none.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn serve_radius(&self, writer: &ResponseWriter, request: Request);
}

/// In-memory reference handler
///
/// - Access-Request with EAP Identity: Access-Accept carrying EAP Success
/// - Access-Request with User-Password: PAP check against the user table
/// - Accounting-Request: Accounting-Response
/// - Status-Server: Access-Accept
///
/// Proxy-State attributes are copied into every reply (RFC 2865 Section 5.33).
#[derive(Default)]
pub struct SimpleHandler {
    users: HashMap<String, String>,
}

impl SimpleHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &Config) -> Self {
        let mut handler = SimpleHandler::new();
        for user in &config.users {
            handler.add_user(&user.username, &user.password);
        }
        handler
    }

    pub fn add_user(&mut self, username: impl Into<String>, password: impl Into<String>) {
        self.users.insert(username.into(), password.into());
    }

    pub fn authenticate(&self, username: &str, password: &[u8]) -> bool {
        self.users
            .get(username)
            .map(|p| p.as_bytes() == password)
            .unwrap_or(false)
    }

    fn access_reply(&self, request: &Packet) -> Packet {
        let username = request
            .find_attribute(AttributeType::UserName as u8)
            .and_then(|attr| attr.as_string().ok())
            .unwrap_or_default();

        match request.eap_message() {
            Ok(Some(eap)) => return self.eap_reply(request, &username, &eap),
            Ok(None) => {}
            Err(e) => {
                // Not fatal: fall back to PAP
                warn!(
                    username = %username,
                    request_id = request.identifier,
                    error = %e,
                    "Ignoring malformed EAP-Message"
                );
            }
        }

        let password = match request.user_password() {
            Ok(Some(password)) => password,
            Ok(None) => {
                debug!(username = %username, "No password attribute found");
                return reject(request);
            }
            Err(e) => {
                warn!(username = %username, error = %e, "Invalid User-Password attribute");
                return reject(request);
            }
        };

        if self.authenticate(&username, &password) {
            info!(
                username = %username,
                request_id = request.identifier,
                "Authentication successful"
            );
            request.response(Code::AccessAccept)
        } else {
            warn!(
                username = %username,
                request_id = request.identifier,
                "Authentication failed"
            );
            reject(request)
        }
    }

    fn eap_reply(&self, request: &Packet, username: &str, eap: &EapMessage) -> Packet {
        let identity = matches!(eap.code, EapCode::Request | EapCode::Response)
            && eap.eap_type() == Some(EapType::Identity);

        let (code, outcome) = if identity {
            info!(
                username = %username,
                request_id = request.identifier,
                eap_id = eap.identifier,
                "EAP identity accepted"
            );
            (Code::AccessAccept, EapMessage::success(eap.identifier))
        } else {
            let method = match eap.eap_type() {
                Some(known) => known.to_string(),
                None => format!("type {}", eap.eap_type),
            };
            warn!(
                username = %username,
                eap_code = %eap.code,
                eap_method = %method,
                "Unsupported EAP method"
            );
            (Code::AccessReject, EapMessage::failure(eap.identifier))
        };

        let mut reply = request.response(code);
        match outcome.to_attribute() {
            Ok(attr) => reply.add_attribute(attr),
            Err(e) => warn!(error = %e, "Could not encode EAP reply"),
        }
        // RFC 3579 Section 3.2: required alongside EAP-Message
        reply.add_message_authenticator();
        reply
    }
}

fn reject(request: &Packet) -> Packet {
    let mut reply = request.response(Code::AccessReject);
    if let Ok(attr) = Attribute::string(AttributeType::ReplyMessage as u8, "Authentication failed")
    {
        reply.add_attribute(attr);
    }
    reply
}

#[async_trait]
impl Handler for SimpleHandler {
    async fn serve_radius(&self, writer: &ResponseWriter, request: Request) {
        let packet = &request.packet;
        let mut reply = match packet.code {
            Code::AccessRequest => self.access_reply(packet),
            Code::AccountingRequest => packet.response(Code::AccountingResponse),
            Code::StatusServer => packet.response(Code::AccessAccept),
            other => {
                debug!(packet_type = %other, "Unsupported packet type");
                return;
            }
        };

        for attr in packet.find_all_attributes(AttributeType::ProxyState as u8) {
            reply.add_attribute(attr.clone());
        }

        if let Err(e) = writer.write(&reply).await {
            warn!(
                client_addr = %request.remote_addr,
                request_id = packet.identifier,
                error = %e,
                "Failed to send response"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"testing123";

    fn handler() -> SimpleHandler {
        let mut handler = SimpleHandler::new();
        handler.add_user("alice", "wonderland");
        handler
    }

    fn pap_request(username: &str, password: &[u8]) -> Packet {
        let mut packet = Packet::request(Code::AccessRequest, 5, SECRET);
        packet.add_attribute(Attribute::string(AttributeType::UserName as u8, username).unwrap());
        packet.set_user_password(password).unwrap();
        packet
    }

    #[test]
    fn test_authenticate() {
        let handler = handler();
        assert!(handler.authenticate("alice", b"wonderland"));
        assert!(!handler.authenticate("alice", b"wrong"));
        assert!(!handler.authenticate("bob", b"wonderland"));
    }

    #[test]
    fn test_pap_accept_and_reject() {
        let handler = handler();

        let reply = handler.access_reply(&pap_request("alice", b"wonderland"));
        assert_eq!(reply.code, Code::AccessAccept);
        assert_eq!(reply.identifier, 5);

        let reply = handler.access_reply(&pap_request("alice", b"nope"));
        assert_eq!(reply.code, Code::AccessReject);
        assert!(reply.find_attribute(AttributeType::ReplyMessage as u8).is_some());
    }

    #[test]
    fn test_eap_identity_gets_success() {
        let mut request = Packet::request(Code::AccessRequest, 7, SECRET);
        request.add_attribute(Attribute::string(AttributeType::UserName as u8, "alice").unwrap());
        request
            .add_attribute(Attribute::eap(&EapMessage::identity_request(42, "")).unwrap());

        let reply = handler().access_reply(&request);
        assert_eq!(reply.code, Code::AccessAccept);
        let eap = reply.eap_message().unwrap().unwrap();
        assert_eq!(eap.code, EapCode::Success);
        assert_eq!(eap.identifier, 42);
        assert!(reply
            .find_attribute(AttributeType::MessageAuthenticator as u8)
            .is_some());
    }

    #[test]
    fn test_other_eap_method_gets_failure() {
        let mut request = Packet::request(Code::AccessRequest, 7, SECRET);
        request.add_attribute(
            Attribute::eap(&EapMessage::new(EapCode::Response, 3, EapType::Md5Challenge, vec![1]))
                .unwrap(),
        );

        let reply = handler().access_reply(&request);
        assert_eq!(reply.code, Code::AccessReject);
        assert_eq!(reply.eap_message().unwrap().unwrap().code, EapCode::Failure);
    }

    #[test]
    fn test_malformed_eap_falls_back_to_pap() {
        let mut request = pap_request("alice", b"wonderland");
        request.add_attribute(Attribute::new(AttributeType::EapMessage as u8, vec![1, 2]).unwrap());

        let reply = handler().access_reply(&request);
        assert_eq!(reply.code, Code::AccessAccept);
        assert!(reply.eap_message().unwrap().is_none());
    }
}
