//! Error types for socksd
//!
//! Defines the typed protocol errors and the SOCKS5 reply code set,
//! including the mapping from dial errors to reply codes.

use std::io;
use thiserror::Error;

/// Reply codes for the SOCKS5 protocol (RFC 1928)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReplyCode {
    /// Command succeeded
    Succeeded = 0x00,
    /// General SOCKS server failure
    GeneralFailure = 0x01,
    /// Connection not allowed by ruleset
    NotAllowed = 0x02,
    /// Network unreachable
    NetworkUnreachable = 0x03,
    /// Host unreachable
    HostUnreachable = 0x04,
    /// Connection refused
    ConnectionRefused = 0x05,
    /// TTL expired
    TtlExpired = 0x06,
    /// Command not supported
    CommandNotSupported = 0x07,
    /// Address type not supported
    AddressTypeNotSupported = 0x08,
}

impl From<ReplyCode> for u8 {
    fn from(code: ReplyCode) -> Self {
        code as u8
    }
}

impl TryFrom<u8> for ReplyCode {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(ReplyCode::Succeeded),
            0x01 => Ok(ReplyCode::GeneralFailure),
            0x02 => Ok(ReplyCode::NotAllowed),
            0x03 => Ok(ReplyCode::NetworkUnreachable),
            0x04 => Ok(ReplyCode::HostUnreachable),
            0x05 => Ok(ReplyCode::ConnectionRefused),
            0x06 => Ok(ReplyCode::TtlExpired),
            0x07 => Ok(ReplyCode::CommandNotSupported),
            0x08 => Ok(ReplyCode::AddressTypeNotSupported),
            _ => Err(ProtocolError::ReplyCode(value)),
        }
    }
}

/// Errors raised while reading SOCKS5 frames from the control connection
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Version byte was not 0x05 (or 0x01 in the sub-negotiation)
    #[error("unsupported protocol version: {0}")]
    BadVersion(u8),

    /// ATYP byte outside {0x01, 0x03, 0x04}
    #[error("address type not supported: {0}")]
    AddressType(u8),

    /// Domain length byte was zero
    #[error("invalid domain length: {0}")]
    DomainLength(u8),

    /// Domain bytes were not valid UTF-8
    #[error("invalid domain name: {0}")]
    InvalidDomain(#[from] std::string::FromUtf8Error),

    /// Unknown reply code byte
    #[error("unknown reply code: {0}")]
    ReplyCode(u8),

    /// Short read, deadline expiry, or connection loss
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Errors raised while decoding a UDP envelope
#[derive(Error, Debug)]
pub enum PacketError {
    /// FRAG byte was nonzero; fragments are dropped
    #[error("fragmented datagrams are not supported: frag {0}")]
    Fragmented(u8),

    /// Datagram shorter than its header claims
    #[error("datagram truncated")]
    Truncated,

    /// ATYP byte outside {0x01, 0x03, 0x04}
    #[error("address type not supported: {0}")]
    AddressType(u8),

    /// Domain bytes were not valid UTF-8
    #[error("invalid domain name: {0}")]
    InvalidDomain(#[from] std::string::FromUtf8Error),
}

/// Map a dial error to the reply code sent back to the client.
///
/// Structured error kinds are inspected first. Some platforms surface
/// resolver and route failures as uncategorized errors with only a message,
/// so unmatched kinds fall back to substring matching on the error text.
pub fn reply_code_for_dial_error(err: &io::Error) -> ReplyCode {
    if err.kind() == io::ErrorKind::ConnectionRefused {
        return ReplyCode::ConnectionRefused;
    }

    let text = err.to_string();

    if text.contains("network is unreachable") {
        ReplyCode::NetworkUnreachable
    } else if text.contains("no such host") || text.contains("failed to lookup") {
        ReplyCode::HostUnreachable
    } else if text.contains("refused") {
        ReplyCode::ConnectionRefused
    } else {
        ReplyCode::GeneralFailure
    }
}

/// Whether an I/O error means the socket or listener was closed under us.
///
/// Such errors are expected during shutdown and are suppressed from logs.
pub fn is_closed_error(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::NotConnected || err.to_string().contains("closed")
}
