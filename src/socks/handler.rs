//! Session orchestrator
//!
//! Runs the per-connection state machine: source admission, method
//! negotiation, optional username/password authentication, request
//! parsing, rule gating, and dispatch to the TCP relay or the UDP
//! associator. The session is the error boundary: every failure is logged
//! here and ends the session without propagating.

use super::addr::Address;
use super::auth::{self, AuthMethod};
use super::reply::send_reply;
use super::request::{read_request, Command};
use super::tcp_relay::relay;
use super::udp::handle_udp_associate;
use crate::error::{reply_code_for_dial_error, ProtocolError, ReplyCode};
use crate::server::Shared;
use crate::session::{Conn, SessionContext};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, error, info, warn};

/// Serve one accepted connection to completion.
pub(crate) async fn handle_session<S>(stream: S, peer: SocketAddr, shared: Arc<Shared>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    if !shared.rules.allow_connection(peer.ip()) {
        debug!(peer = %peer, "connection refused by source rules");
        return;
    }

    let mut ctx = SessionContext::new(peer);
    let mut conn = Conn::new(
        stream,
        shared.config.timeouts.tcp_read(),
        shared.config.timeouts.tcp_write(),
    );

    let method = match auth::negotiate(&mut conn, shared.config.auth.password_authentication).await
    {
        Ok(Some(method)) => method,
        Ok(None) => {
            warn!(peer = %peer, "no acceptable authentication methods");
            return;
        }
        Err(ProtocolError::BadVersion(version)) => {
            debug!(peer = %peer, version, "handshake with unsupported protocol version");
            return;
        }
        Err(e) => {
            error!(peer = %peer, error = %e, "handshake failed");
            return;
        }
    };

    if method == AuthMethod::Password {
        let authenticated = auth::authenticate(
            &mut conn,
            shared.store.as_ref(),
            shared.config.timeouts.get_password(),
            &mut ctx,
        )
        .await;

        match authenticated {
            Ok(true) => {}
            Ok(false) => return,
            Err(ProtocolError::BadVersion(version)) => {
                debug!(peer = %peer, version, "sub-negotiation with unsupported version");
                return;
            }
            Err(e) => {
                error!(peer = %peer, error = %e, "authentication failed");
                return;
            }
        }
    }

    let request = match read_request(&mut conn).await {
        Ok(request) => request,
        Err(ProtocolError::BadVersion(version)) => {
            debug!(peer = %peer, version, "request with unsupported protocol version");
            return;
        }
        Err(ProtocolError::AddressType(atyp)) => {
            let _ = send_reply(
                &mut conn,
                ReplyCode::AddressTypeNotSupported,
                &Address::unspecified(),
            )
            .await;
            debug!(peer = %peer, atyp, "request with unsupported address type");
            return;
        }
        Err(e) => {
            error!(peer = %peer, error = %e, "failed to read request");
            return;
        }
    };

    if !shared.rules.allow_destination(&request.addr.host()) {
        warn!(peer = %peer, addr = %request.addr, "destination refused by ruleset");
        let _ = send_reply(&mut conn, ReplyCode::NotAllowed, &request.addr).await;
        return;
    }

    match Command::from_byte(request.command) {
        Some(command @ (Command::Connect | Command::UdpAssociate))
            if !shared.rules.allow_command(command) =>
        {
            warn!(peer = %peer, %command, "command refused by ruleset");
            let _ = send_reply(&mut conn, ReplyCode::NotAllowed, &request.addr).await;
        }
        Some(Command::Connect) => {
            connect(conn, request.addr, &ctx, &shared).await;
        }
        Some(Command::UdpAssociate) => {
            handle_udp_associate(conn, request.addr, ctx, &shared).await;
        }
        _ => {
            debug!(peer = %peer, command = request.command, "command not supported");
            let _ = send_reply(&mut conn, ReplyCode::CommandNotSupported, &request.addr).await;
        }
    }
}

/// Dial the destination and run the relay.
async fn connect<S>(mut conn: Conn<S>, addr: Address, ctx: &SessionContext, shared: &Shared)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let target = match shared.driver.dial(&addr.to_string()).await {
        Ok(target) => target,
        Err(e) => {
            let _ = send_reply(&mut conn, reply_code_for_dial_error(&e), &addr).await;
            error!(peer = %ctx.peer, addr = %addr, error = %e, "dial failed");
            return;
        }
    };

    if let Err(e) = send_reply(&mut conn, ReplyCode::Succeeded, &addr).await {
        error!(peer = %ctx.peer, error = %e, "failed to send connect reply");
        return;
    }

    info!(peer = %ctx.peer, addr = %addr, "dial");

    let totals = relay(conn.into_inner(), target, ctx.peer).await;

    shared.metrics.upload_bytes(ctx, totals.upload);
    shared.metrics.download_bytes(ctx, totals.download);

    debug!(
        peer = %ctx.peer,
        upload = totals.upload,
        download = totals.download,
        "session finished"
    );
}
