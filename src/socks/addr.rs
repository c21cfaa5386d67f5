//! SOCKS5 address type
//!
//! The destination address carried in requests, replies, and UDP envelopes.

use super::consts::*;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

/// Destination address in a SOCKS5 message
///
/// Either an IP address (v4 or v6) or a domain name, always with a port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    /// IP address with port
    Ip(SocketAddr),
    /// Domain name with port
    Domain(String, u16),
}

impl Address {
    /// Create an address from an IPv4 address and port
    pub fn ipv4(ip: Ipv4Addr, port: u16) -> Self {
        Address::Ip(SocketAddr::new(IpAddr::V4(ip), port))
    }

    /// Create an address from an IPv6 address and port
    pub fn ipv6(ip: Ipv6Addr, port: u16) -> Self {
        Address::Ip(SocketAddr::new(IpAddr::V6(ip), port))
    }

    /// Create an address from a domain name and port
    pub fn domain(domain: String, port: u16) -> Self {
        Address::Domain(domain, port)
    }

    /// Synthetic 0.0.0.0:0 bound address for replies that carry no
    /// meaningful address
    pub fn unspecified() -> Self {
        Address::ipv4(Ipv4Addr::UNSPECIFIED, 0)
    }

    /// Port number
    pub fn port(&self) -> u16 {
        match self {
            Address::Ip(addr) => addr.port(),
            Address::Domain(_, port) => *port,
        }
    }

    /// ATYP byte for this address
    pub fn addr_type(&self) -> u8 {
        match self {
            Address::Ip(SocketAddr::V4(_)) => ATYP_IPV4,
            Address::Ip(SocketAddr::V6(_)) => ATYP_IPV6,
            Address::Domain(_, _) => ATYP_DOMAIN,
        }
    }

    /// The host part tested against the destination rules: the domain for
    /// FQDN addresses, the textual IP otherwise.
    pub fn host(&self) -> String {
        match self {
            Address::Ip(addr) => addr.ip().to_string(),
            Address::Domain(domain, _) => domain.clone(),
        }
    }

    /// Serialize as `ATYP ADDR PORT` wire bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();

        match self {
            Address::Ip(SocketAddr::V4(addr)) => {
                bytes.push(ATYP_IPV4);
                bytes.extend_from_slice(&addr.ip().octets());
                bytes.extend_from_slice(&addr.port().to_be_bytes());
            }
            Address::Ip(SocketAddr::V6(addr)) => {
                bytes.push(ATYP_IPV6);
                bytes.extend_from_slice(&addr.ip().octets());
                bytes.extend_from_slice(&addr.port().to_be_bytes());
            }
            Address::Domain(domain, port) => {
                bytes.push(ATYP_DOMAIN);
                bytes.push(domain.len() as u8);
                bytes.extend_from_slice(domain.as_bytes());
                bytes.extend_from_slice(&port.to_be_bytes());
            }
        }

        bytes
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Ip(addr) => write!(f, "{}", addr),
            Address::Domain(domain, port) => write!(f, "{}:{}", domain, port),
        }
    }
}

impl From<SocketAddr> for Address {
    fn from(addr: SocketAddr) -> Self {
        Address::Ip(addr)
    }
}
