//! Per-session state
//!
//! A session owns its control connection exclusively. `Conn` wraps the
//! accepted stream with buffered reads and applies the configured read and
//! write deadlines to every control-connection operation; deadline expiry
//! surfaces as a timed-out I/O error that ends the session.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::time;

/// Request-scoped context shared with the metrics collaborator
#[derive(Debug, Clone)]
pub struct SessionContext {
    /// Remote address of the accepted connection
    pub peer: SocketAddr,
    /// Username established by the sub-negotiation, if any
    pub username: Option<String>,
}

impl SessionContext {
    /// Create a context for a freshly accepted connection
    pub fn new(peer: SocketAddr) -> Self {
        SessionContext {
            peer,
            username: None,
        }
    }
}

pub(crate) async fn io_deadline<T, F>(deadline: Option<Duration>, op: F) -> io::Result<T>
where
    F: Future<Output = io::Result<T>>,
{
    match deadline {
        Some(duration) if !duration.is_zero() => time::timeout(duration, op)
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "i/o deadline exceeded"))?,
        _ => op.await,
    }
}

/// Control connection with buffered reads and per-operation deadlines
pub struct Conn<S> {
    stream: BufReader<S>,
    read_deadline: Option<Duration>,
    write_deadline: Option<Duration>,
}

impl<S: AsyncRead + Unpin> Conn<S> {
    /// Wrap an accepted stream with the configured deadlines
    pub fn new(
        stream: S,
        read_deadline: Option<Duration>,
        write_deadline: Option<Duration>,
    ) -> Self {
        Conn {
            stream: BufReader::new(stream),
            read_deadline,
            write_deadline,
        }
    }

    /// Read a single byte
    pub async fn read_u8(&mut self) -> io::Result<u8> {
        io_deadline(self.read_deadline, self.stream.read_u8()).await
    }

    /// Fill the buffer completely
    pub async fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        io_deadline(self.read_deadline, async {
            self.stream.read_exact(buf).await.map(|_| ())
        })
        .await
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> Conn<S> {
    /// Write the whole buffer and flush
    pub async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        io_deadline(self.write_deadline, async {
            self.stream.write_all(data).await?;
            self.stream.flush().await
        })
        .await
    }

    /// Surrender the underlying stream for the relay phase.
    ///
    /// The buffered reader is kept: it may already hold bytes the client
    /// pipelined behind the request.
    pub fn into_inner(self) -> BufReader<S> {
        self.stream
    }
}
