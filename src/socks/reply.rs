//! SOCKS5 reply emission
//!
//! Writes `VER REP RSV ATYP BND.ADDR BND.PORT` frames to the control
//! connection.

use super::addr::Address;
use super::consts::*;
use crate::error::ReplyCode;
use crate::session::Conn;
use std::io;
use tokio::io::{AsyncRead, AsyncWrite};

/// Send a reply echoing the given bound address.
///
/// Early failures that have no meaningful address to report pass
/// [`Address::unspecified`], the synthetic 0.0.0.0:0 form.
pub async fn send_reply<S>(
    conn: &mut Conn<S>,
    code: ReplyCode,
    addr: &Address,
) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut frame = vec![SOCKS5_VERSION, code.into(), RESERVED];
    frame.extend_from_slice(&addr.to_bytes());

    conn.write_all(&frame).await
}
