//! UDP ASSOCIATE support
//!
//! The envelope codec, the NAT table with its TTL sweep, and the relay
//! engine driven by the controlling TCP connection.

mod associate;
mod nat;
pub mod packet;

pub use nat::{NatEntry, NatTable};
pub use packet::UdpPacket;

pub(crate) use associate::handle_udp_associate;
