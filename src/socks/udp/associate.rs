//! UDP ASSOCIATE engine
//!
//! Binds a datagram socket on an ephemeral port, advertises it to the
//! client, then forwards datagrams both ways through a NAT table until the
//! controlling TCP connection goes away. A background watcher reads and
//! discards control-connection data; the read returning is the sole
//! cancellation signal for the relay.

use super::nat::NatTable;
use super::packet;
use crate::error::{is_closed_error, reply_code_for_dial_error, PacketError, ReplyCode};
use crate::server::Shared;
use crate::session::{io_deadline, Conn, SessionContext};
use crate::socks::addr::Address;
use crate::socks::reply::send_reply;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::net::UdpSocket;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Serve a UDP ASSOCIATE request on its control connection.
///
/// The reply advertises the configured public IP and the ephemeral port the
/// relay socket bound to. The function returns when the control connection
/// closes or the relay socket fails.
pub(crate) async fn handle_udp_associate<S>(
    mut conn: Conn<S>,
    requested: Address,
    ctx: SessionContext,
    shared: &Shared,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let listen_address = shared.config.server.udp_listen_address();

    let socket = match shared.driver.listen_packet(&listen_address).await {
        Ok(socket) => socket,
        Err(e) => {
            let _ = send_reply(&mut conn, reply_code_for_dial_error(&e), &requested).await;
            error!(peer = %ctx.peer, error = %e, "failed to bind udp relay socket");
            return;
        }
    };

    let local_port = match socket.local_addr() {
        Ok(addr) => addr.port(),
        Err(e) => {
            let _ = send_reply(&mut conn, ReplyCode::GeneralFailure, &requested).await;
            error!(peer = %ctx.peer, error = %e, "udp relay socket has no local address");
            return;
        }
    };

    let bound = Address::Ip(SocketAddr::new(shared.config.server.public_ip, local_port));
    if let Err(e) = send_reply(&mut conn, ReplyCode::Succeeded, &bound).await {
        error!(peer = %ctx.peer, error = %e, "failed to send udp associate reply");
        return;
    }

    info!(peer = %ctx.peer, port = local_port, "udp datagram forwarding started");

    // The control connection stays open for the lifetime of the
    // association. Its read returning, EOF or error, cancels the relay.
    let token = CancellationToken::new();
    let (mut control_read, _control_write) = tokio::io::split(conn.into_inner());
    let watcher = {
        let token = token.clone();
        let peer = ctx.peer;
        tokio::spawn(async move {
            let mut sink = [0u8; 256];
            loop {
                match control_read.read(&mut sink).await {
                    Ok(0) | Err(_) => break,
                    Ok(_) => debug!(peer = %peer, "discarding data on udp control connection"),
                }
            }
            token.cancel();
        })
    };

    let nat = Arc::new(NatTable::new());
    let sweeper = nat.clone().start_sweeper(
        shared.config.udp.nat_cleanup_period(),
        shared.config.udp.packet_ttl(),
        token.clone(),
    );

    let read_deadline = shared.config.timeouts.udp_read();
    let write_deadline = shared.config.timeouts.udp_write();

    let mut buf = shared.pool.get();

    loop {
        let received = tokio::select! {
            _ = token.cancelled() => break,
            received = recv_from(&socket, &mut buf, read_deadline) => received,
        };

        let (n, source) = match received {
            Ok(Some(received)) => received,
            Ok(None) => continue, // read deadline tick
            Err(e) => {
                if is_closed_error(&e) {
                    break;
                }
                error!(peer = %ctx.peer, error = %e, "udp receive failed");
                continue;
            }
        };

        // A datagram from a target we recently forwarded to is a reply on
        // its way back. The NAT lookup runs first: on loopback setups the
        // client host and the target host coincide, and only the lookup
        // can tell the directions apart.
        if let Some(entry) = nat.take(&source) {
            let frame = packet::encode(&entry.reply_addr, &buf[..n]);
            if let Err(e) = send_to(&socket, &frame, entry.client, write_deadline).await {
                if !is_closed_error(&e) {
                    error!(peer = %ctx.peer, client = %entry.client, error = %e, "udp reply send failed");
                }
            }
            continue;
        }

        // Datagrams from the client's host carry an envelope naming the
        // target. Anything else is noise.
        if source.ip() == ctx.peer.ip() {
            match packet::decode(&buf[..n]) {
                Ok(envelope) => {
                    forward_to_target(&socket, shared, &nat, source, envelope, write_deadline, ctx.peer)
                        .await;
                }
                Err(PacketError::Fragmented(frag)) => {
                    debug!(peer = %ctx.peer, frag, "dropping fragmented datagram");
                }
                Err(e) => {
                    debug!(peer = %ctx.peer, error = %e, "dropping undecodable datagram");
                }
            }
        } else {
            debug!(peer = %ctx.peer, source = %source, "dropping datagram from unknown source");
        }
    }

    shared.pool.put(buf);

    token.cancel();
    watcher.abort();
    if let Some(sweeper) = sweeper {
        let _ = sweeper.await;
    }

    info!(peer = %ctx.peer, "udp datagram forwarding finished");
}

/// Resolve the envelope target, send the payload, and record the NAT entry
/// used to route the answer back.
async fn forward_to_target(
    socket: &UdpSocket,
    shared: &Shared,
    nat: &NatTable,
    client: SocketAddr,
    envelope: packet::UdpPacket,
    write_deadline: Option<Duration>,
    peer: SocketAddr,
) {
    let target = match shared.driver.resolve(&envelope.addr.to_string()).await {
        Ok(target) => target,
        Err(e) => {
            error!(peer = %peer, addr = %envelope.addr, error = %e, "failed to resolve udp target");
            return;
        }
    };

    if let Err(e) = send_to(socket, &envelope.data, target, write_deadline).await {
        if !is_closed_error(&e) {
            error!(peer = %peer, target = %target, error = %e, "udp forward failed");
        }
        return;
    }

    nat.insert(target, client, envelope.addr);
}

async fn recv_from(
    socket: &UdpSocket,
    buf: &mut [u8],
    deadline: Option<Duration>,
) -> io::Result<Option<(usize, SocketAddr)>> {
    match deadline {
        Some(duration) if !duration.is_zero() => {
            match time::timeout(duration, socket.recv_from(buf)).await {
                Ok(received) => received.map(Some),
                Err(_) => Ok(None),
            }
        }
        _ => socket.recv_from(buf).await.map(Some),
    }
}

async fn send_to(
    socket: &UdpSocket,
    data: &[u8],
    target: SocketAddr,
    deadline: Option<Duration>,
) -> io::Result<usize> {
    io_deadline(deadline, socket.send_to(data, target)).await
}
