//! UDP envelope codec
//!
//! Datagrams between client and proxy are wrapped as
//! `RSV(2) FRAG(1) ATYP DST.ADDR DST.PORT DATA`. Fragments are not
//! supported: any nonzero FRAG fails decoding and the datagram is dropped.

use crate::error::PacketError;
use crate::socks::addr::Address;
use crate::socks::consts::*;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::net::{Ipv4Addr, Ipv6Addr};

/// A decoded UDP envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UdpPacket {
    /// Destination carried in the envelope header
    pub addr: Address,
    /// Payload bytes following the header
    pub data: Bytes,
}

/// Decode an envelope received from the client
pub fn decode(data: &[u8]) -> Result<UdpPacket, PacketError> {
    if data.len() < 4 {
        return Err(PacketError::Truncated);
    }

    let mut buf = data;

    let _reserved = buf.get_u16();

    let frag = buf.get_u8();
    if frag != 0 {
        return Err(PacketError::Fragmented(frag));
    }

    let atyp = buf.get_u8();
    let (addr, payload) = parse_address(atyp, buf)?;

    Ok(UdpPacket {
        addr,
        data: Bytes::copy_from_slice(payload),
    })
}

/// Encode an envelope for delivery to the client
pub fn encode(addr: &Address, payload: &[u8]) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(4 + payload.len());

    buf.put_u16(0); // reserved
    buf.put_u8(0); // fragment number
    buf.extend_from_slice(&addr.to_bytes());
    buf.extend_from_slice(payload);

    buf.to_vec()
}

fn parse_address(atyp: u8, mut buf: &[u8]) -> Result<(Address, &[u8]), PacketError> {
    match atyp {
        ATYP_IPV4 => {
            if buf.len() < 6 {
                return Err(PacketError::Truncated);
            }
            let ip = Ipv4Addr::new(buf[0], buf[1], buf[2], buf[3]);
            buf.advance(4);
            let port = buf.get_u16();
            Ok((Address::ipv4(ip, port), buf))
        }
        ATYP_DOMAIN => {
            if buf.is_empty() {
                return Err(PacketError::Truncated);
            }
            let len = buf[0] as usize;
            buf.advance(1);

            if buf.len() < len + 2 {
                return Err(PacketError::Truncated);
            }
            let domain = String::from_utf8(buf[..len].to_vec())?;
            buf.advance(len);
            let port = buf.get_u16();
            Ok((Address::domain(domain, port), buf))
        }
        ATYP_IPV6 => {
            if buf.len() < 18 {
                return Err(PacketError::Truncated);
            }
            let mut octets = [0u8; 16];
            octets.copy_from_slice(&buf[..16]);
            buf.advance(16);
            let port = buf.get_u16();
            Ok((Address::ipv6(Ipv6Addr::from(octets), port), buf))
        }
        other => Err(PacketError::AddressType(other)),
    }
}
