//! Transport driver
//!
//! The server listens, dials, and resolves through this trait, so the
//! transport can be swapped out, e.g. for a TLS-wrapped listener and
//! dialer. The default driver uses plain TCP and UDP sockets with
//! keepalive applied.

use async_trait::async_trait;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{lookup_host, TcpListener, TcpStream, UdpSocket};
use tokio::time;

/// Byte stream produced by a driver
pub trait Stream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Stream for T {}

/// Accept side of a driver
#[async_trait]
pub trait Listener: Send + Sync {
    /// Accept the next inbound connection
    async fn accept(&self) -> io::Result<(Box<dyn Stream>, SocketAddr)>;

    /// Address the listener is bound to
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

/// Pluggable transport: TCP listen, UDP listen-packet, TCP dial, and
/// address resolution
#[async_trait]
pub trait Driver: Send + Sync {
    /// Bind a TCP listener on `address`
    async fn listen(&self, address: &str) -> io::Result<Box<dyn Listener>>;

    /// Bind a UDP socket on `address`
    async fn listen_packet(&self, address: &str) -> io::Result<Arc<UdpSocket>>;

    /// Open a TCP connection to `address` (an IP or domain with port)
    async fn dial(&self, address: &str) -> io::Result<Box<dyn Stream>>;

    /// Resolve `address` to a socket address
    async fn resolve(&self, address: &str) -> io::Result<SocketAddr>;
}

/// Tune a TCP stream the driver hands out: disable Nagle, and arm
/// keepalive probes after the configured idle time so dead control
/// connections are noticed even when a session sits in the UDP phase.
fn tune_stream(stream: &TcpStream, keepalive_idle: Option<Duration>) -> io::Result<()> {
    stream.set_nodelay(true)?;

    if let Some(idle) = keepalive_idle {
        let probes = socket2::TcpKeepalive::new()
            .with_time(idle)
            .with_interval(probe_interval(idle));
        socket2::SockRef::from(stream).set_tcp_keepalive(&probes)?;
    }

    Ok(())
}

// Probe at a quarter of the idle time, at least once a second.
fn probe_interval(idle: Duration) -> Duration {
    Duration::from_secs((idle.as_secs() / 4).max(1))
}

/// Strip the IPv4-mapped form so targets named as `::ffff:a.b.c.d` stay
/// reachable from a socket bound to an IPv4 host.
fn unmap(addr: SocketAddr) -> SocketAddr {
    if let std::net::IpAddr::V6(ip) = addr.ip() {
        if let Some(v4) = ip.to_ipv4_mapped() {
            return SocketAddr::new(std::net::IpAddr::V4(v4), addr.port());
        }
    }
    addr
}

/// Default driver over the operating system network stack
#[derive(Debug)]
pub struct NetDriver {
    dial_timeout: Option<Duration>,
    keepalive_idle: Option<Duration>,
}

impl NetDriver {
    /// Create a driver with the given dial deadline and TCP keepalive
    /// idle time (both optional)
    pub fn new(dial_timeout: Option<Duration>, keepalive_idle: Option<Duration>) -> Self {
        NetDriver {
            dial_timeout,
            keepalive_idle,
        }
    }
}

impl Default for NetDriver {
    fn default() -> Self {
        Self::new(None, None)
    }
}

#[async_trait]
impl Driver for NetDriver {
    async fn listen(&self, address: &str) -> io::Result<Box<dyn Listener>> {
        let listener = TcpListener::bind(address).await?;
        Ok(Box::new(NetListener {
            listener,
            keepalive_idle: self.keepalive_idle,
        }))
    }

    async fn listen_packet(&self, address: &str) -> io::Result<Arc<UdpSocket>> {
        Ok(Arc::new(UdpSocket::bind(address).await?))
    }

    async fn dial(&self, address: &str) -> io::Result<Box<dyn Stream>> {
        let connect = TcpStream::connect(address);

        let stream = match self.dial_timeout {
            Some(deadline) if !deadline.is_zero() => time::timeout(deadline, connect)
                .await
                .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "dial deadline exceeded"))??,
            _ => connect.await?,
        };

        tune_stream(&stream, self.keepalive_idle)?;
        Ok(Box::new(stream))
    }

    async fn resolve(&self, address: &str) -> io::Result<SocketAddr> {
        let mut addrs = lookup_host(address).await?.map(unmap);

        let first = addrs.next().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no addresses found for {}", address),
            )
        })?;

        // Prefer IPv4: the relay socket is bound to an IPv4 host by default
        // and dual-stack resolvers often list IPv6 first.
        if first.is_ipv4() {
            return Ok(first);
        }
        Ok(addrs.find(SocketAddr::is_ipv4).unwrap_or(first))
    }
}

struct NetListener {
    listener: TcpListener,
    keepalive_idle: Option<Duration>,
}

#[async_trait]
impl Listener for NetListener {
    async fn accept(&self) -> io::Result<(Box<dyn Stream>, SocketAddr)> {
        let (stream, peer) = self.listener.accept().await?;
        tune_stream(&stream, self.keepalive_idle)?;
        Ok((Box::new(stream), peer))
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}
