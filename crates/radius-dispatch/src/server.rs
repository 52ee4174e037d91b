use crate::config::{Config, ConfigError, OverloadPolicy};
use crate::handler::{Handler, Request, ResponseWriter};
use crate::secret::{ClientSecrets, SecretError, SecretSource};
use radius_wire::{Packet, PacketError};
use std::net::SocketAddr;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// Conventional RADIUS authentication port
pub const AUTH_PORT: u16 = 1812;
/// Conventional RADIUS accounting port
pub const ACCOUNTING_PORT: u16 = 1813;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Packet error: {0}")]
    Packet(#[from] PacketError),
    #[error("Secret unavailable: {0}")]
    SecretUnavailable(#[from] SecretError),
    #[error("Shutdown did not finish within {0:?}")]
    ShutdownTimeout(Duration),
    #[error("Socket is closed")]
    SocketClosed,
    #[error("Server already started")]
    AlreadyStarted,
    #[error("Server not started")]
    NotStarted,
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Lifecycle of a [`RadiusServer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Created, no socket yet
    Idle,
    /// Accepting datagrams
    Listening,
    /// No longer accepting; in-flight requests are finishing
    Draining,
    /// Socket released; writes fail with [`ServerError::SocketClosed`]
    Closed,
}

enum Slot {
    Vacant,
    Open(Arc<UdpSocket>),
    Closed,
}

/// The listening socket, shared by the accept loop and every response writer
pub(crate) struct Transport {
    slot: RwLock<Slot>,
}

impl Transport {
    fn new() -> Self {
        Transport {
            slot: RwLock::new(Slot::Vacant),
        }
    }

    fn install(&self, socket: UdpSocket) -> Result<Arc<UdpSocket>, ServerError> {
        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        match *slot {
            Slot::Vacant => {
                let socket = Arc::new(socket);
                *slot = Slot::Open(Arc::clone(&socket));
                Ok(socket)
            }
            Slot::Open(_) => Err(ServerError::AlreadyStarted),
            Slot::Closed => Err(ServerError::SocketClosed),
        }
    }

    pub(crate) fn socket(&self) -> Result<Arc<UdpSocket>, ServerError> {
        match &*self.slot.read().unwrap_or_else(PoisonError::into_inner) {
            Slot::Open(socket) => Ok(Arc::clone(socket)),
            Slot::Vacant => Err(ServerError::NotStarted),
            Slot::Closed => Err(ServerError::SocketClosed),
        }
    }

    /// Drop the server's handle; the socket itself closes once the last
    /// in-progress send releases its clone.
    fn close(&self) {
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = Slot::Closed;
    }

    fn state(&self) -> ServerState {
        match *self.slot.read().unwrap_or_else(PoisonError::into_inner) {
            Slot::Vacant => ServerState::Idle,
            Slot::Open(_) => ServerState::Listening,
            Slot::Closed => ServerState::Closed,
        }
    }
}

/// RADIUS Server configuration
pub struct ServerConfig {
    /// Bind address for [`RadiusServer::listen_and_serve`]
    pub bind_addr: SocketAddr,
    /// Shared secret lookup
    pub secret_source: Arc<dyn SecretSource>,
    /// Request handler
    pub handler: Arc<dyn Handler>,
    /// Upper bound on requests handled at once (None = unbounded)
    pub max_in_flight: Option<usize>,
    /// What to do with datagrams once `max_in_flight` is reached
    pub overload_policy: OverloadPolicy,
}

impl ServerConfig {
    pub fn new(
        bind_addr: SocketAddr,
        secret_source: Arc<dyn SecretSource>,
        handler: Arc<dyn Handler>,
    ) -> Self {
        ServerConfig {
            bind_addr,
            secret_source,
            handler,
            max_in_flight: None,
            overload_policy: OverloadPolicy::default(),
        }
    }

    /// Create server config from a full Config object
    pub fn from_config(config: &Config, handler: Arc<dyn Handler>) -> Result<Self, ServerError> {
        let secrets = ClientSecrets::from_config(config)?;
        Ok(ServerConfig {
            bind_addr: config.socket_addr()?,
            secret_source: Arc::new(secrets),
            handler,
            max_in_flight: config.max_in_flight,
            overload_policy: config.overload_policy,
        })
    }

    pub fn with_max_in_flight(mut self, limit: usize, policy: OverloadPolicy) -> Self {
        self.max_in_flight = Some(limit.max(1));
        self.overload_policy = policy;
        self
    }
}

struct Shared {
    secret_source: Arc<dyn SecretSource>,
    handler: Arc<dyn Handler>,
    transport: Arc<Transport>,
}

/// RADIUS Server
///
/// One accept loop reads datagrams and hands each to its own task. Share the
/// server behind an `Arc` to call [`shutdown`](Self::shutdown) while
/// [`serve`](Self::serve) is running.
pub struct RadiusServer {
    bind_addr: SocketAddr,
    shared: Arc<Shared>,
    limiter: Option<Arc<Semaphore>>,
    overload_policy: OverloadPolicy,
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl RadiusServer {
    pub fn new(config: ServerConfig) -> Self {
        RadiusServer {
            bind_addr: config.bind_addr,
            shared: Arc::new(Shared {
                secret_source: config.secret_source,
                handler: config.handler,
                transport: Arc::new(Transport::new()),
            }),
            limiter: config
                .max_in_flight
                .map(|limit| Arc::new(Semaphore::new(limit.max(1)))),
            overload_policy: config.overload_policy,
            cancel: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    pub fn state(&self) -> ServerState {
        match self.shared.transport.state() {
            ServerState::Closed => ServerState::Closed,
            _ if self.cancel.is_cancelled() => ServerState::Draining,
            state => state,
        }
    }

    /// Get the local address the server is listening on
    ///
    /// This is useful for testing when binding to port 0 (OS-assigned port)
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.shared.transport.socket()?.local_addr()?)
    }

    /// Bind the configured address and serve until shutdown
    pub async fn listen_and_serve(&self) -> Result<(), ServerError> {
        let socket = UdpSocket::bind(self.bind_addr).await?;
        self.serve(socket).await
    }

    /// Serve an already-bound socket until shutdown.
    ///
    /// Returns `Ok` after [`shutdown`](Self::shutdown), or the receive error
    /// that stopped the accept loop.
    pub async fn serve(&self, socket: UdpSocket) -> Result<(), ServerError> {
        let socket = self.shared.transport.install(socket)?;
        let local_addr = socket.local_addr()?;

        // Shutdown waits for the accept loop as well as the requests it spawned
        let _running = self.tracker.token();
        info!(local_addr = %local_addr, "RADIUS server listening");

        let mut buf = vec![0u8; Packet::MAX_PACKET_SIZE];

        loop {
            let reserved = match (&self.limiter, self.overload_policy) {
                (Some(limiter), OverloadPolicy::Queue) => tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    permit = Arc::clone(limiter).acquire_owned() => match permit {
                        Ok(permit) => Some(permit),
                        Err(_) => break,
                    },
                },
                _ => None,
            };

            let (len, remote_addr) = tokio::select! {
                _ = self.cancel.cancelled() => break,
                received = socket.recv_from(&mut buf) => match received {
                    Ok(received) => received,
                    Err(e) => {
                        error!(local_addr = %local_addr, error = %e, "Receive failed, stopping accept loop");
                        self.cancel.cancel();
                        return Err(e.into());
                    }
                },
            };

            let permit = match (reserved, &self.limiter) {
                (Some(permit), _) => Some(permit),
                (None, Some(limiter)) => match Arc::clone(limiter).try_acquire_owned() {
                    Ok(permit) => Some(permit),
                    Err(_) => {
                        warn!(client_addr = %remote_addr, "Server saturated, dropping request");
                        continue;
                    }
                },
                (None, None) => None,
            };

            let data = buf[..len].to_vec();
            let shared = Arc::clone(&self.shared);

            self.tracker.spawn(async move {
                match Self::handle_datagram(&shared, data, local_addr, remote_addr).await {
                    Ok(()) => {}
                    Err(ServerError::Packet(e)) if e.is_malformed() => {
                        debug!(client_addr = %remote_addr, error = %e, "Discarded malformed datagram");
                    }
                    Err(e) => {
                        debug!(client_addr = %remote_addr, error = %e, "Dropped request");
                    }
                }
                drop(permit);
            });
        }

        info!(local_addr = %local_addr, "Accept loop stopped");
        Ok(())
    }

    /// Stop accepting and wait for in-flight requests.
    ///
    /// With a deadline, gives up waiting once it passes and returns
    /// [`ServerError::ShutdownTimeout`]; the remaining requests keep running
    /// but their writes fail with [`ServerError::SocketClosed`]. The socket is
    /// released either way.
    pub async fn shutdown(&self, deadline: Option<Duration>) -> Result<(), ServerError> {
        info!("Shutting down RADIUS server");
        self.cancel.cancel();
        self.tracker.close();

        let result = match deadline {
            Some(limit) => tokio::time::timeout(limit, self.tracker.wait())
                .await
                .map_err(|_| ServerError::ShutdownTimeout(limit)),
            None => {
                self.tracker.wait().await;
                Ok(())
            }
        };

        self.shared.transport.close();
        match &result {
            Ok(()) => info!("All requests finished, socket closed"),
            Err(_) => warn!(
                in_flight = self.tracker.len(),
                "Shutdown deadline passed with requests in flight, socket closed"
            ),
        }
        result
    }

    /// Handle a single datagram
    async fn handle_datagram(
        shared: &Shared,
        data: Vec<u8>,
        local_addr: SocketAddr,
        remote_addr: SocketAddr,
    ) -> Result<(), ServerError> {
        let secret = shared.secret_source.secret_for(remote_addr).await?;
        if secret.is_empty() {
            return Err(SecretError::Empty(remote_addr).into());
        }

        let packet = Packet::decode(&data, &secret)?;

        if let Err(e) = Packet::verify_request(&data, &secret) {
            if !e.is_integrity_failure() {
                return Err(e.into());
            }
            warn!(
                client_addr = %remote_addr,
                packet_type = %packet.code,
                request_id = packet.identifier,
                error = %e,
                "Request failed integrity check, possible spoofing"
            );
            return Err(e.into());
        }

        debug!(
            packet_type = %packet.code,
            client_addr = %remote_addr,
            request_id = packet.identifier,
            "Received RADIUS packet"
        );

        let request = Request {
            packet,
            local_addr,
            remote_addr,
        };
        let writer = ResponseWriter::new(Arc::clone(&shared.transport), &request);
        shared.handler.serve_radius(&writer, request).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secret::StaticSecret;
    use async_trait::async_trait;
    use radius_wire::Code;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const SECRET: &[u8] = b"testing123";

    /// Accepts everything after an optional delay
    struct AcceptHandler {
        delay: Duration,
        served: AtomicUsize,
    }

    impl AcceptHandler {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(AcceptHandler {
                delay,
                served: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Handler for AcceptHandler {
        async fn serve_radius(&self, writer: &ResponseWriter, request: Request) {
            self.served.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            let _ = writer
                .write(&request.packet.response(Code::AccessAccept))
                .await;
        }
    }

    async fn start(config: ServerConfig) -> (Arc<RadiusServer>, SocketAddr) {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        let server = Arc::new(RadiusServer::new(config));
        let running = Arc::clone(&server);
        tokio::spawn(async move { running.serve(socket).await });

        while server.state() == ServerState::Idle {
            tokio::task::yield_now().await;
        }
        (server, addr)
    }

    fn config(secret: &[u8], handler: Arc<dyn Handler>) -> ServerConfig {
        ServerConfig::new(
            "127.0.0.1:0".parse().unwrap(),
            Arc::new(StaticSecret::new(secret)),
            handler,
        )
    }

    async fn send_request(client: &UdpSocket, server_addr: SocketAddr, id: u8) {
        let mut request = Packet::request(Code::AccessRequest, id, SECRET);
        client
            .send_to(&request.encode_request().unwrap(), server_addr)
            .await
            .unwrap();
    }

    async fn count_replies(client: &UdpSocket, window: Duration) -> usize {
        let mut buf = [0u8; 4096];
        let mut count = 0;
        while let Ok(Ok(_)) = tokio::time::timeout(window, client.recv_from(&mut buf)).await {
            count += 1;
        }
        count
    }

    #[tokio::test]
    async fn test_lifecycle_states() {
        let handler = AcceptHandler::new(Duration::ZERO);
        let server = RadiusServer::new(config(SECRET, handler));
        assert_eq!(server.state(), ServerState::Idle);
        assert!(matches!(server.local_addr(), Err(ServerError::NotStarted)));

        let server = Arc::new(server);
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        let running = Arc::clone(&server);
        let serve = tokio::spawn(async move { running.serve(socket).await });

        while server.state() == ServerState::Idle {
            tokio::task::yield_now().await;
        }
        assert_eq!(server.state(), ServerState::Listening);
        assert_eq!(server.local_addr().unwrap(), addr);

        server.shutdown(None).await.unwrap();
        assert_eq!(server.state(), ServerState::Closed);
        assert!(serve.await.unwrap().is_ok());
        assert!(matches!(server.local_addr(), Err(ServerError::SocketClosed)));
    }

    #[tokio::test]
    async fn test_serve_twice_rejected() {
        let (server, _) = start(config(SECRET, AcceptHandler::new(Duration::ZERO))).await;
        let other = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        assert!(matches!(
            server.serve(other).await,
            Err(ServerError::AlreadyStarted)
        ));
        server.shutdown(Some(Duration::from_secs(1))).await.unwrap();
    }

    #[tokio::test]
    async fn test_replies_to_request() {
        let (server, addr) = start(config(SECRET, AcceptHandler::new(Duration::ZERO))).await;
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        send_request(&client, addr, 11).await;
        let mut buf = [0u8; 4096];
        let (len, _) = tokio::time::timeout(Duration::from_secs(2), client.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        let reply = Packet::decode(&buf[..len], SECRET).unwrap();
        assert_eq!(reply.code, Code::AccessAccept);
        assert_eq!(reply.identifier, 11);

        server.shutdown(Some(Duration::from_secs(1))).await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_secret_drops() {
        let handler = AcceptHandler::new(Duration::ZERO);
        let (server, addr) = start(config(b"", handler.clone())).await;
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        send_request(&client, addr, 1).await;
        assert_eq!(count_replies(&client, Duration::from_millis(300)).await, 0);
        assert_eq!(handler.served.load(Ordering::SeqCst), 0);

        server.shutdown(Some(Duration::from_secs(1))).await.unwrap();
    }

    #[tokio::test]
    async fn test_garbage_does_not_stop_server() {
        let (server, addr) = start(config(SECRET, AcceptHandler::new(Duration::ZERO))).await;
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        client.send_to(&[1, 2, 3], addr).await.unwrap();
        client.send_to(&[0u8; 40], addr).await.unwrap();
        send_request(&client, addr, 2).await;

        assert_eq!(count_replies(&client, Duration::from_millis(500)).await, 1);
        assert_eq!(server.state(), ServerState::Listening);
        server.shutdown(Some(Duration::from_secs(1))).await.unwrap();
    }

    #[tokio::test]
    async fn test_drop_policy_sheds_load() {
        let handler = AcceptHandler::new(Duration::from_millis(400));
        let config = config(SECRET, handler.clone()).with_max_in_flight(1, OverloadPolicy::Drop);
        let (server, addr) = start(config).await;
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        send_request(&client, addr, 1).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        send_request(&client, addr, 2).await;

        assert_eq!(count_replies(&client, Duration::from_millis(800)).await, 1);
        assert_eq!(handler.served.load(Ordering::SeqCst), 1);
        server.shutdown(Some(Duration::from_secs(1))).await.unwrap();
    }

    #[tokio::test]
    async fn test_queue_policy_serves_all() {
        let handler = AcceptHandler::new(Duration::from_millis(100));
        let config = config(SECRET, handler.clone()).with_max_in_flight(1, OverloadPolicy::Queue);
        let (server, addr) = start(config).await;
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        for id in 0..3 {
            send_request(&client, addr, id).await;
        }

        assert_eq!(count_replies(&client, Duration::from_millis(800)).await, 3);
        assert_eq!(handler.served.load(Ordering::SeqCst), 3);
        server.shutdown(Some(Duration::from_secs(1))).await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_timeout() {
        let handler = AcceptHandler::new(Duration::from_millis(500));
        let (server, addr) = start(config(SECRET, handler.clone())).await;
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        send_request(&client, addr, 1).await;
        while handler.served.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let result = server.shutdown(Some(Duration::from_millis(50))).await;
        assert!(matches!(result, Err(ServerError::ShutdownTimeout(_))));
        assert_eq!(server.state(), ServerState::Closed);

        // The late reply is never sent
        assert_eq!(count_replies(&client, Duration::from_millis(700)).await, 0);
    }
}
