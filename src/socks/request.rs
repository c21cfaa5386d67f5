//! SOCKS5 request parsing
//!
//! Reads `VER CMD RSV ATYP DST.ADDR DST.PORT` from the control connection.

use super::addr::Address;
use super::consts::*;
use crate::error::ProtocolError;
use crate::session::Conn;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::io::AsyncRead;

/// SOCKS5 command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Command {
    /// Establish a TCP connection to the destination
    Connect,
    /// Wait for an inbound connection (not supported)
    Bind,
    /// Open a UDP relay governed by this control connection
    UdpAssociate,
}

impl Command {
    /// Parse a command byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            CMD_CONNECT => Some(Command::Connect),
            CMD_BIND => Some(Command::Bind),
            CMD_UDP_ASSOCIATE => Some(Command::UdpAssociate),
            _ => None,
        }
    }

    /// Wire byte for this command
    pub fn to_byte(self) -> u8 {
        match self {
            Command::Connect => CMD_CONNECT,
            Command::Bind => CMD_BIND,
            Command::UdpAssociate => CMD_UDP_ASSOCIATE,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Connect => write!(f, "CONNECT"),
            Command::Bind => write!(f, "BIND"),
            Command::UdpAssociate => write!(f, "UDP ASSOCIATE"),
        }
    }
}

/// A parsed proxy request
///
/// The command byte is kept raw: unknown commands still carry a complete
/// destination address, which the reply echoing them back needs.
#[derive(Debug, Clone)]
pub struct Request {
    /// Raw command byte from the wire
    pub command: u8,
    /// Requested destination
    pub addr: Address,
}

/// Read a proxy request from the control connection.
///
/// A wrong version byte aborts without touching the rest of the frame; an
/// unsupported ATYP is reported after the header so the caller can reply
/// with `address type not supported`.
pub async fn read_request<S>(conn: &mut Conn<S>) -> Result<Request, ProtocolError>
where
    S: AsyncRead + Unpin,
{
    let version = conn.read_u8().await?;
    if version != SOCKS5_VERSION {
        return Err(ProtocolError::BadVersion(version));
    }

    let command = conn.read_u8().await?;
    let _reserved = conn.read_u8().await?;

    let addr = read_address(conn).await?;

    Ok(Request { command, addr })
}

/// Read `ATYP DST.ADDR DST.PORT` from the control connection
pub(crate) async fn read_address<S>(conn: &mut Conn<S>) -> Result<Address, ProtocolError>
where
    S: AsyncRead + Unpin,
{
    let addr_type = conn.read_u8().await?;

    match addr_type {
        ATYP_IPV4 => {
            let mut octets = [0u8; 4];
            conn.read_exact(&mut octets).await?;
            let port = read_port(conn).await?;
            Ok(Address::ipv4(octets.into(), port))
        }
        ATYP_DOMAIN => {
            let len = conn.read_u8().await?;
            if len == 0 {
                return Err(ProtocolError::DomainLength(len));
            }

            let mut domain = vec![0u8; len as usize];
            conn.read_exact(&mut domain).await?;
            let domain = String::from_utf8(domain)?;

            let port = read_port(conn).await?;
            Ok(Address::domain(domain, port))
        }
        ATYP_IPV6 => {
            let mut octets = [0u8; 16];
            conn.read_exact(&mut octets).await?;
            let port = read_port(conn).await?;
            Ok(Address::ipv6(octets.into(), port))
        }
        other => Err(ProtocolError::AddressType(other)),
    }
}

async fn read_port<S>(conn: &mut Conn<S>) -> Result<u16, ProtocolError>
where
    S: AsyncRead + Unpin,
{
    let mut port = [0u8; 2];
    conn.read_exact(&mut port).await?;
    Ok(u16::from_be_bytes(port))
}
