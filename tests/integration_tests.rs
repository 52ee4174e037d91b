//! Integration tests for the RADIUS dispatch server
//!
//! These tests run a server on a loopback socket and talk to it over UDP:
//! - PAP and EAP Identity authentication
//! - Accounting-Request integrity checks
//! - Message-Authenticator checks
//! - Client secret lookup
//! - Shutdown with in-flight requests

use async_trait::async_trait;
use radius_dispatch::{
    Client, Config, Handler, RadiusServer, Request, ResponseWriter, ServerConfig, ServerError,
    ServerState, SimpleHandler, StaticSecret,
};
use radius_wire::auth::verify_response_authenticator;
use radius_wire::eap::{EapCode, EapMessage};
use radius_wire::{Attribute, AttributeType, Code, Packet};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

/// Serve on an OS-assigned loopback port
async fn start_server(config: ServerConfig) -> (Arc<RadiusServer>, SocketAddr) {
    let socket = UdpSocket::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind server socket");
    let server_addr = socket.local_addr().expect("Failed to get server address");

    let server = Arc::new(RadiusServer::new(config));
    let running = Arc::clone(&server);
    tokio::spawn(async move {
        running.serve(socket).await.ok();
    });

    while server.state() == ServerState::Idle {
        sleep(Duration::from_millis(5)).await;
    }
    (server, server_addr)
}

fn static_config(secret: &str, handler: Arc<dyn Handler>) -> ServerConfig {
    ServerConfig::new(
        "127.0.0.1:0".parse().unwrap(),
        Arc::new(StaticSecret::new(secret)),
        handler,
    )
}

fn users_handler() -> Arc<SimpleHandler> {
    let mut handler = SimpleHandler::new();
    handler.add_user("testuser", "testpass");
    Arc::new(handler)
}

/// Send raw bytes and wait for at most one reply
async fn exchange(bytes: &[u8], server_addr: SocketAddr, wait: Duration) -> Option<Vec<u8>> {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    socket.send_to(bytes, server_addr).await.unwrap();

    let mut buf = [0u8; 4096];
    match timeout(wait, socket.recv_from(&mut buf)).await {
        Ok(Ok((len, _))) => Some(buf[..len].to_vec()),
        _ => None,
    }
}

/// Send a request and decode the reply, checking its authenticator
async fn send_radius_request(request: &mut Packet, server_addr: SocketAddr) -> Packet {
    let bytes = request.encode_request().expect("Failed to encode request");
    let reply = exchange(&bytes, server_addr, Duration::from_secs(5))
        .await
        .expect("No response from server");

    let response = Packet::decode(&reply, &request.secret).expect("Failed to decode response");
    assert!(
        verify_response_authenticator(&response, &request.authenticator, &request.secret),
        "Response Authenticator does not verify"
    );
    response
}

fn access_request(username: &str, password: &str, secret: &[u8], identifier: u8) -> Packet {
    let mut packet = Packet::request(Code::AccessRequest, identifier, secret);
    packet.add_attribute(Attribute::string(AttributeType::UserName as u8, username).unwrap());
    packet.set_user_password(password.as_bytes()).unwrap();
    packet
}

fn accounting_request(secret: &[u8], identifier: u8) -> Packet {
    let mut packet = Packet::new(Code::AccountingRequest, identifier, [0u8; 16]).with_secret(secret);
    packet.add_attribute(Attribute::integer(AttributeType::AcctStatusType as u8, 1).unwrap());
    packet.add_attribute(Attribute::string(AttributeType::AcctSessionId as u8, "sess-0001").unwrap());
    packet
}

#[tokio::test]
async fn test_eap_identity_scenario() {
    let (server, server_addr) =
        start_server(static_config("secret1234", Arc::new(SimpleHandler::new()))).await;

    let mut request = Packet::request(Code::AccessRequest, 7, b"secret1234");
    request.add_attribute(Attribute::string(AttributeType::UserName as u8, "alice").unwrap());
    let eap = EapMessage::identity_request(3, "");
    request.add_attribute(Attribute::eap(&eap).unwrap());

    let response = send_radius_request(&mut request, server_addr).await;
    assert_eq!(response.code, Code::AccessAccept);
    assert_eq!(response.identifier, 7);

    let reply_eap = response.eap_message().unwrap().expect("No EAP-Message in reply");
    assert_eq!(reply_eap.code, EapCode::Success);
    assert_eq!(reply_eap.identifier, 3);

    server.shutdown(Some(Duration::from_secs(1))).await.unwrap();
}

#[tokio::test]
async fn test_pap_accept_and_reject() {
    let (server, server_addr) = start_server(static_config("testing123", users_handler())).await;

    let response =
        send_radius_request(&mut access_request("testuser", "testpass", b"testing123", 1), server_addr)
            .await;
    assert_eq!(response.code, Code::AccessAccept);
    assert_eq!(response.identifier, 1);

    let response =
        send_radius_request(&mut access_request("testuser", "wrongpass", b"testing123", 2), server_addr)
            .await;
    assert_eq!(response.code, Code::AccessReject);
    assert_eq!(response.identifier, 2);

    let response =
        send_radius_request(&mut access_request("nobody", "testpass", b"testing123", 3), server_addr)
            .await;
    assert_eq!(response.code, Code::AccessReject);

    server.shutdown(Some(Duration::from_secs(1))).await.unwrap();
}

#[tokio::test]
async fn test_proxy_state_echoed_in_order() {
    let (server, server_addr) = start_server(static_config("testing123", users_handler())).await;

    let mut request = access_request("testuser", "testpass", b"testing123", 9);
    request.add_attribute(Attribute::string(AttributeType::ProxyState as u8, "hop-1").unwrap());
    request.add_attribute(Attribute::string(AttributeType::ProxyState as u8, "hop-2").unwrap());

    let response = send_radius_request(&mut request, server_addr).await;
    let states: Vec<String> = response
        .find_all_attributes(AttributeType::ProxyState as u8)
        .iter()
        .map(|attr| attr.as_string().unwrap())
        .collect();
    assert_eq!(states, vec!["hop-1", "hop-2"]);

    server.shutdown(Some(Duration::from_secs(1))).await.unwrap();
}

#[tokio::test]
async fn test_accounting_request_answered() {
    let (server, server_addr) = start_server(static_config("testing123", users_handler())).await;

    let response = send_radius_request(&mut accounting_request(b"testing123", 20), server_addr).await;
    assert_eq!(response.code, Code::AccountingResponse);
    assert_eq!(response.identifier, 20);

    server.shutdown(Some(Duration::from_secs(1))).await.unwrap();
}

#[tokio::test]
async fn test_tampered_accounting_request_gets_no_reply() {
    let (server, server_addr) = start_server(static_config("testing123", users_handler())).await;

    let mut bytes = accounting_request(b"testing123", 21).encode_request().unwrap();
    bytes[10] ^= 0xff;

    let reply = exchange(&bytes, server_addr, Duration::from_millis(500)).await;
    assert!(reply.is_none(), "Server answered a tampered Accounting-Request");

    // Signed with the wrong secret
    let bytes = accounting_request(b"not-the-secret", 22).encode_request().unwrap();
    assert!(exchange(&bytes, server_addr, Duration::from_millis(500)).await.is_none());

    server.shutdown(Some(Duration::from_secs(1))).await.unwrap();
}

#[tokio::test]
async fn test_bad_message_authenticator_gets_no_reply() {
    let (server, server_addr) = start_server(static_config("testing123", users_handler())).await;

    let mut request = access_request("testuser", "testpass", b"testing123", 30);
    request.add_message_authenticator();
    let bytes = request.encode_request().unwrap();

    // Signed correctly: answered
    assert!(exchange(&bytes, server_addr, Duration::from_secs(2)).await.is_some());

    let mut tampered = bytes.clone();
    let last = tampered.len() - 1;
    tampered[last] ^= 0x01;
    assert!(exchange(&tampered, server_addr, Duration::from_millis(500)).await.is_none());

    server.shutdown(Some(Duration::from_secs(1))).await.unwrap();
}

#[tokio::test]
async fn test_status_server() {
    let (server, server_addr) = start_server(static_config("testing123", users_handler())).await;

    let mut request = Packet::request(Code::StatusServer, 40, b"testing123");
    let response = send_radius_request(&mut request, server_addr).await;
    assert_eq!(response.code, Code::AccessAccept);
    assert_eq!(response.identifier, 40);

    server.shutdown(Some(Duration::from_secs(1))).await.unwrap();
}

#[tokio::test]
async fn test_client_table_secrets() {
    let mut config = Config::default();
    config.listen_address = "127.0.0.1".to_string();
    config.clients = vec![Client {
        address: "127.0.0.0/8".to_string(),
        secret: "loopback-secret".to_string(),
        name: Some("Loopback".to_string()),
        enabled: true,
    }];

    let server_config =
        ServerConfig::from_config(&config, users_handler()).expect("Failed to create server config");
    let (server, server_addr) = start_server(server_config).await;

    let response = send_radius_request(
        &mut access_request("testuser", "testpass", b"loopback-secret", 50),
        server_addr,
    )
    .await;
    assert_eq!(response.code, Code::AccessAccept);

    server.shutdown(Some(Duration::from_secs(1))).await.unwrap();
}

#[tokio::test]
async fn test_unknown_client_gets_no_reply() {
    let mut config = Config::default();
    config.clients = vec![Client {
        address: "10.0.0.1".to_string(),
        secret: "nas-secret".to_string(),
        name: None,
        enabled: true,
    }];

    let server_config = ServerConfig::from_config(&config, users_handler()).unwrap();
    let (server, server_addr) = start_server(server_config).await;

    let bytes = access_request("testuser", "testpass", b"nas-secret", 60)
        .encode_request()
        .unwrap();
    assert!(exchange(&bytes, server_addr, Duration::from_millis(500)).await.is_none());

    server.shutdown(Some(Duration::from_secs(1))).await.unwrap();
}

/// Replies only after a delay and reports how the write went
struct SlowHandler {
    delay: Duration,
    started: mpsc::UnboundedSender<()>,
    outcome: mpsc::UnboundedSender<Result<(), ServerError>>,
}

#[async_trait]
impl Handler for SlowHandler {
    async fn serve_radius(&self, writer: &ResponseWriter, request: Request) {
        let _ = self.started.send(());
        sleep(self.delay).await;
        let result = writer
            .write(&request.packet.response(Code::AccessAccept))
            .await;
        let _ = self.outcome.send(result);
    }
}

#[tokio::test]
async fn test_shutdown_timeout_with_slow_handler() {
    let (started_tx, mut started_rx) = mpsc::unbounded_channel();
    let (outcome_tx, mut outcome_rx) = mpsc::unbounded_channel();
    let handler = Arc::new(SlowHandler {
        delay: Duration::from_millis(500),
        started: started_tx,
        outcome: outcome_tx,
    });

    let (server, server_addr) = start_server(static_config("testing123", handler)).await;

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let bytes = access_request("testuser", "testpass", b"testing123", 70)
        .encode_request()
        .unwrap();
    client.send_to(&bytes, server_addr).await.unwrap();

    timeout(Duration::from_secs(2), started_rx.recv())
        .await
        .expect("Handler never started");

    let result = server.shutdown(Some(Duration::from_millis(100))).await;
    assert!(matches!(result, Err(ServerError::ShutdownTimeout(_))));
    assert_eq!(server.state(), ServerState::Closed);

    // The handler finishes on its own and its write fails cleanly
    let outcome = timeout(Duration::from_secs(2), outcome_rx.recv())
        .await
        .expect("Handler never finished")
        .expect("Handler dropped the channel");
    assert!(matches!(outcome, Err(ServerError::SocketClosed)));

    let mut buf = [0u8; 4096];
    assert!(timeout(Duration::from_millis(200), client.recv_from(&mut buf))
        .await
        .is_err());
}

#[tokio::test]
async fn test_shutdown_waits_for_handlers() {
    let (started_tx, mut started_rx) = mpsc::unbounded_channel();
    let (outcome_tx, mut outcome_rx) = mpsc::unbounded_channel();
    let handler = Arc::new(SlowHandler {
        delay: Duration::from_millis(100),
        started: started_tx,
        outcome: outcome_tx,
    });

    let (server, server_addr) = start_server(static_config("testing123", handler)).await;

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let bytes = access_request("testuser", "testpass", b"testing123", 71)
        .encode_request()
        .unwrap();
    client.send_to(&bytes, server_addr).await.unwrap();
    timeout(Duration::from_secs(2), started_rx.recv()).await.unwrap();

    server.shutdown(Some(Duration::from_secs(2))).await.unwrap();
    assert!(outcome_rx.try_recv().unwrap().is_ok());

    let mut buf = [0u8; 4096];
    let (len, _) = timeout(Duration::from_secs(1), client.recv_from(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(Packet::decode(&buf[..len], b"testing123").unwrap().identifier, 71);
}
