//! A lightweight SOCKS5 proxy library
//!
//! ## SOCKS5 Implementation
//!
//! - Features:
//!     - CONNECT to IPv4 destinations
//!     - No Authentication
//!     - Error replies for BIND, UDP ASSOCIATE and unknown commands
//!     - Domain name and IPv6 destinations are decoded and refused with
//!       "address type not supported"
//!     - Async using tokio, one task per session and two per relay
//!     - Optional handshake and connect timeouts
//! - [SOCKS5 (RFC 1928)](https://datatracker.ietf.org/doc/html/rfc1928)
//!
//! # Example
//! ```no_run
//! use ss5::{ServerConfig, Socks5Server};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ServerConfig::default()
//!         .with_connect_timeout(Some(Duration::from_secs(10)));
//!     let mut server = Socks5Server::new("127.0.0.1:1080").with_config(config);
//!     server.run().await
//! }
//! ```

pub mod address;
pub mod auth;
pub mod config;
pub mod error;
pub mod protocol;
pub mod relay;
pub mod request;
pub mod server;
pub mod session;

// Re-export main types at crate root for convenience
pub use address::{DestinationAddress, Host};
pub use config::{MethodPolicy, ServerConfig};
pub use error::SessionError;
pub use protocol::{AddressType, AuthMethod, Command, ReplyCode, Version};
pub use relay::RelayStats;
pub use server::Socks5Server;
pub use session::{Session, SessionState};
