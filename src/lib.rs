//! RADIUS over UDP
//!
//! Umbrella crate for the workspace:
//!
//! - [`wire`]: packet, attribute, authenticator and EAP codecs
//! - [`dispatch`]: the concurrent UDP server that decodes requests,
//!   resolves per-client secrets and hands them to a [`dispatch::Handler`]

pub use radius_dispatch as dispatch;
pub use radius_wire as wire;
