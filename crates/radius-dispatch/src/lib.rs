//! RADIUS dispatch server
//!
//! A UDP server built on the `radius-wire` codec: it resolves the shared
//! secret for each datagram, decodes and checks it, and hands the request to
//! a [`Handler`] together with a [`ResponseWriter`] bound to the sender.
//!
//! # Example
//!
//! ```rust,no_run
//! use radius_dispatch::{RadiusServer, ServerConfig, SimpleHandler, StaticSecret};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut handler = SimpleHandler::new();
//!     handler.add_user("alice", "password");
//!
//!     let config = ServerConfig::new(
//!         "0.0.0.0:1812".parse()?,
//!         Arc::new(StaticSecret::new("secret")),
//!         Arc::new(handler),
//!     );
//!     let server = Arc::new(RadiusServer::new(config));
//!
//!     let running = Arc::clone(&server);
//!     tokio::spawn(async move { running.listen_and_serve().await });
//!
//!     tokio::signal::ctrl_c().await?;
//!     server.shutdown(Some(Duration::from_secs(5))).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod handler;
pub mod secret;
pub mod server;

pub use config::{Client, Config, ConfigError, OverloadPolicy, User};
pub use handler::{Handler, Request, ResponseWriter, SimpleHandler};
pub use secret::{ClientSecrets, SecretError, SecretSource, StaticSecret};
pub use server::{
    RadiusServer, ServerConfig, ServerError, ServerState, ACCOUNTING_PORT, AUTH_PORT,
};
