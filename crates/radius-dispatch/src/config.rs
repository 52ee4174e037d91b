use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// User configuration for [`SimpleHandler`](crate::SimpleHandler)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    pub password: String,
}

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    /// Client IP address or network (supports CIDR notation)
    pub address: String,
    /// Shared secret for this client
    pub secret: String,
    /// Optional client name/description
    #[serde(default)]
    pub name: Option<String>,
    /// Enable/disable this client
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl Client {
    /// Parse the client address as an IP network
    pub fn parse_network(&self) -> Result<IpNetwork, ConfigError> {
        if let Ok(network) = self.address.parse::<IpNetwork>() {
            return Ok(network);
        }

        // A bare address is a /32 or /128
        if let Ok(ip) = self.address.parse::<IpAddr>() {
            return Ok(IpNetwork::from(ip));
        }

        Err(ConfigError::Invalid(format!(
            "Invalid client address: {}",
            self.address
        )))
    }
}

/// What the accept loop does when `max_in_flight` requests are being handled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverloadPolicy {
    /// Discard datagrams that arrive while saturated
    #[default]
    Drop,
    /// Stop reading from the socket until a slot frees
    Queue,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server listen address
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Server listen port
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Shared secret for sources not covered by `clients`.
    ///
    /// Without it, datagrams from unlisted addresses are dropped.
    #[serde(default)]
    pub secret: Option<String>,

    /// List of authorized clients
    #[serde(default)]
    pub clients: Vec<Client>,

    /// List of users for authentication
    #[serde(default)]
    pub users: Vec<User>,

    /// Log level: "trace", "debug", "info", "warn", "error" (default: "info")
    #[serde(default)]
    pub log_level: Option<String>,

    /// Upper bound on concurrently handled requests (default: unbounded)
    #[serde(default)]
    pub max_in_flight: Option<usize>,

    /// Behaviour once `max_in_flight` is reached
    #[serde(default)]
    pub overload_policy: OverloadPolicy,

    /// How long shutdown waits for in-flight requests, in seconds
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

fn default_listen_address() -> String {
    "0.0.0.0".to_string()
}

fn default_listen_port() -> u16 {
    crate::AUTH_PORT
}

fn default_shutdown_timeout_secs() -> u64 {
    5
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listen_address: default_listen_address(),
            listen_port: default_listen_port(),
            secret: None,
            clients: vec![],
            users: vec![],
            log_level: None,
            max_in_flight: None,
            overload_policy: OverloadPolicy::default(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Get socket address for binding
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let addr: IpAddr = self.listen_address.parse().map_err(|_| {
            ConfigError::Invalid(format!("Invalid IP address: {}", self.listen_address))
        })?;
        Ok(SocketAddr::new(addr, self.listen_port))
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.socket_addr()?;

        if self.listen_port == 0 {
            return Err(ConfigError::Invalid("Port cannot be 0".to_string()));
        }

        if matches!(self.secret.as_deref(), Some("")) {
            return Err(ConfigError::Invalid(
                "Default secret cannot be empty; omit it instead".to_string(),
            ));
        }

        if self.secret.is_none() && !self.clients.iter().any(|c| c.enabled) {
            return Err(ConfigError::Invalid(
                "No default secret and no enabled clients: every request would be dropped"
                    .to_string(),
            ));
        }

        for client in &self.clients {
            if client.secret.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "Client {} has empty secret",
                    client.address
                )));
            }
            client.parse_network()?;
        }

        for user in &self.users {
            if user.username.is_empty() {
                return Err(ConfigError::Invalid("User has empty username".to_string()));
            }
        }

        if self.max_in_flight == Some(0) {
            return Err(ConfigError::Invalid(
                "max_in_flight must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Create an example configuration file
    pub fn example() -> Self {
        Config {
            listen_address: "0.0.0.0".to_string(),
            listen_port: crate::AUTH_PORT,
            secret: None,
            clients: vec![
                Client {
                    address: "192.168.1.0/24".to_string(),
                    secret: "client_secret_1".to_string(),
                    name: Some("Internal Network".to_string()),
                    enabled: true,
                },
                Client {
                    address: "127.0.0.1".to_string(),
                    secret: "testing123".to_string(),
                    name: Some("Localhost".to_string()),
                    enabled: true,
                },
            ],
            users: vec![
                User {
                    username: "admin".to_string(),
                    password: "admin123".to_string(),
                },
                User {
                    username: "user1".to_string(),
                    password: "password1".to_string(),
                },
            ],
            log_level: Some("info".to_string()),
            max_in_flight: Some(1024),
            overload_policy: OverloadPolicy::Drop,
            shutdown_timeout_secs: 5,
        }
    }
}
