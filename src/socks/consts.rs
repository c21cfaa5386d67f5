//! SOCKS5 protocol constants

/// SOCKS5 protocol version
pub const SOCKS5_VERSION: u8 = 0x05;

/// Username/password sub-negotiation version (RFC 1929)
pub const AUTH_VERSION: u8 = 0x01;

// Authentication methods
/// No authentication required
pub const AUTH_METHOD_NONE: u8 = 0x00;
/// Username/password authentication
pub const AUTH_METHOD_PASSWORD: u8 = 0x02;
/// No acceptable methods
pub const AUTH_METHOD_NO_ACCEPTABLE: u8 = 0xFF;

// Sub-negotiation status
/// Authentication succeeded
pub const AUTH_SUCCESS: u8 = 0x00;
/// Authentication failed
pub const AUTH_FAILURE: u8 = 0x01;

// Commands
/// TCP CONNECT command
pub const CMD_CONNECT: u8 = 0x01;
/// TCP BIND command (not supported)
pub const CMD_BIND: u8 = 0x02;
/// UDP ASSOCIATE command
pub const CMD_UDP_ASSOCIATE: u8 = 0x03;

// Address types
/// IPv4 address
pub const ATYP_IPV4: u8 = 0x01;
/// Fully qualified domain name
pub const ATYP_DOMAIN: u8 = 0x03;
/// IPv6 address
pub const ATYP_IPV6: u8 = 0x04;

/// Reserved byte value (always 0x00)
pub const RESERVED: u8 = 0x00;

/// Maximum domain name length
pub const MAX_DOMAIN_LEN: usize = 255;

/// Copy buffer size for the TCP relay
pub const RELAY_BUFFER_SIZE: usize = 8192;

/// Largest safe IPv4 UDP payload
pub const MAX_UDP_PACKET: usize = 65507;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_bytes() {
        assert_eq!(SOCKS5_VERSION, 5);
        assert_eq!(AUTH_VERSION, 1);
    }

    #[test]
    fn test_commands() {
        assert_eq!(CMD_CONNECT, 1);
        assert_eq!(CMD_BIND, 2);
        assert_eq!(CMD_UDP_ASSOCIATE, 3);
    }

    #[test]
    fn test_address_types() {
        assert_eq!(ATYP_IPV4, 1);
        assert_eq!(ATYP_DOMAIN, 3);
        assert_eq!(ATYP_IPV6, 4);
    }
}
