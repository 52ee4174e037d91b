//! Shared secret lookup by client address
//!
//! The server asks a [`SecretSource`] for the secret of every datagram it
//! receives. An empty secret or an error both mean the datagram is dropped
//! without a reply.

use crate::config::{Config, ConfigError};
use async_trait::async_trait;
use ipnetwork::IpNetwork;
use std::net::{IpAddr, SocketAddr};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SecretError {
    #[error("Unknown client: {0}")]
    UnknownClient(IpAddr),
    #[error("Empty shared secret for {0}")]
    Empty(SocketAddr),
    #[error("Secret lookup failed: {0}")]
    Lookup(String),
}

/// Resolves the shared secret for a remote address
#[async_trait]
pub trait SecretSource: Send + Sync {
    async fn secret_for(&self, remote_addr: SocketAddr) -> Result<Vec<u8>, SecretError>;
}

/// Any synchronous closure works as a secret source
#[async_trait]
impl<F> SecretSource for F
where
    F: Fn(SocketAddr) -> Result<Vec<u8>, SecretError> + Send + Sync,
{
    async fn secret_for(&self, remote_addr: SocketAddr) -> Result<Vec<u8>, SecretError> {
        self(remote_addr)
    }
}

/// The same secret for every client
#[derive(Clone)]
pub struct StaticSecret(Vec<u8>);

impl StaticSecret {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        StaticSecret(secret.into())
    }
}

#[async_trait]
impl SecretSource for StaticSecret {
    async fn secret_for(&self, _remote_addr: SocketAddr) -> Result<Vec<u8>, SecretError> {
        Ok(self.0.clone())
    }
}

/// Per-network secrets from the `clients` table, first match wins
#[derive(Clone, Default)]
pub struct ClientSecrets {
    clients: Vec<(IpNetwork, Vec<u8>)>,
    default_secret: Option<Vec<u8>>,
}

impl ClientSecrets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from the enabled clients in `config`, with its default secret
    /// as the fallback
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let mut secrets = ClientSecrets::new();
        for client in config.clients.iter().filter(|c| c.enabled) {
            secrets.add_client(client.parse_network()?, client.secret.as_bytes());
        }
        secrets.default_secret = config.secret.as_ref().map(|s| s.clone().into_bytes());
        Ok(secrets)
    }

    pub fn add_client(&mut self, network: IpNetwork, secret: impl Into<Vec<u8>>) {
        self.clients.push((network, secret.into()));
    }

    pub fn with_default(mut self, secret: impl Into<Vec<u8>>) -> Self {
        self.default_secret = Some(secret.into());
        self
    }

    pub fn lookup(&self, ip: IpAddr) -> Option<&[u8]> {
        self.clients
            .iter()
            .find(|(network, _)| network.contains(ip))
            .map(|(_, secret)| secret.as_slice())
            .or(self.default_secret.as_deref())
    }
}

#[async_trait]
impl SecretSource for ClientSecrets {
    async fn secret_for(&self, remote_addr: SocketAddr) -> Result<Vec<u8>, SecretError> {
        self.lookup(remote_addr.ip())
            .map(<[u8]>::to_vec)
            .ok_or(SecretError::UnknownClient(remote_addr.ip()))
    }
}
