//! Bidirectional TCP relay
//!
//! After a CONNECT succeeds, two copy loops pump bytes client-to-target and
//! target-to-client concurrently. When one direction hits EOF or an error,
//! the corresponding write half is shut down so the other direction can
//! drain, and the relay ends only when both directions have finished. Each
//! direction counts the bytes it delivered.

use crate::error::is_closed_error;
use crate::socks::consts::RELAY_BUFFER_SIZE;
use std::io;
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Bytes delivered in each direction by a finished relay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayTotals {
    /// Client-to-target bytes
    pub upload: u64,
    /// Target-to-client bytes
    pub download: u64,
}

/// Pump bytes between the client and the target until both directions have
/// terminated.
pub async fn relay<C, T>(client: C, target: T, peer: SocketAddr) -> RelayTotals
where
    C: AsyncRead + AsyncWrite + Unpin,
    T: AsyncRead + AsyncWrite + Unpin,
{
    let (mut client_read, mut client_write) = tokio::io::split(client);
    let (mut target_read, mut target_write) = tokio::io::split(target);

    let (upload, download) = tokio::join!(
        copy_half(&mut client_read, &mut target_write),
        copy_half(&mut target_read, &mut client_write),
    );

    if let (_, Some(e)) = &upload {
        if !is_closed_error(e) {
            debug!(peer = %peer, error = %e, "client to target copy interrupted");
        }
    }
    if let (_, Some(e)) = &download {
        if !is_closed_error(e) {
            debug!(peer = %peer, error = %e, "target to client copy interrupted");
        }
    }

    RelayTotals {
        upload: upload.0,
        download: download.0,
    }
}

/// Copy until EOF or error, then shut down the writer so the peer sees EOF.
/// Returns the bytes actually delivered to the writer.
async fn copy_half<R, W>(reader: &mut R, writer: &mut W) -> (u64, Option<io::Error>)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; RELAY_BUFFER_SIZE];
    let mut total = 0u64;

    let error = loop {
        match reader.read(&mut buf).await {
            Ok(0) => break None,
            Ok(n) => {
                if let Err(e) = writer.write_all(&buf[..n]).await {
                    break Some(e);
                }
                total += n as u64;
            }
            Err(e) => break Some(e),
        }
    };

    let _ = writer.shutdown().await;

    (total, error)
}
