//! # socksd - SOCKS5 Proxy Server
//!
//! A SOCKS version 5 proxy server (RFC 1928) with username/password
//! authentication (RFC 1929), CONNECT relaying, and full UDP ASSOCIATE
//! support.
//!
//! ## Features
//!
//! - **CONNECT**: bidirectional TCP relay with half-close propagation and
//!   per-direction byte accounting
//! - **UDP ASSOCIATE**: per-session datagram relay with a NAT table, TTL
//!   sweep, and teardown driven by the controlling TCP connection
//! - **Username/password authentication** against a pluggable credential
//!   store with a bounded lookup deadline
//! - **Access rules**: command allow-list, destination block-list, and
//!   source-IP allow-list
//! - **Pluggable transport driver**, so listeners and dialers can be
//!   wrapped in TLS
//!
//! ## Usage
//!
//! ```rust,no_run
//! use socksd::{load_config, Server};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config("socksd.toml")?;
//!     let server = Server::new(config);
//!
//!     server.listen_and_serve().await
//! }
//! ```
//!
//! BIND is not supported and is answered with `command not supported`.
//! Fragmented UDP datagrams are dropped.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod driver;
pub mod error;
pub mod metrics;
pub mod pool;
pub mod rules;
pub mod server;
pub mod session;
pub mod socks;
pub mod store;

// Re-export commonly used items
pub use config::{load_config, parse_config, Config};
pub use driver::{Driver, NetDriver};
pub use error::ReplyCode;
pub use metrics::Metrics;
pub use rules::Rules;
pub use server::Server;
pub use store::Store;

/// Version of the socksd library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the application
pub const NAME: &str = env!("CARGO_PKG_NAME");
