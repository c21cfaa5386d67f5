//! SOCKS5 protocol implementation
//!
//! Codec, authentication, relays, and the per-session orchestrator.

mod addr;
mod auth;
mod consts;
mod handler;
mod reply;
mod request;
mod tcp_relay;
pub mod udp;

pub use addr::Address;
pub use auth::{authenticate, negotiate, AuthMethod};
pub use consts::*;
pub use reply::send_reply;
pub use request::{read_request, Command, Request};
pub use tcp_relay::{relay, RelayTotals};

pub(crate) use handler::handle_session;
