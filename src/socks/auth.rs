//! Method negotiation and username/password authentication
//!
//! The server picks the first client-offered method it supports, then, for
//! username/password, drives the RFC 1929 sub-negotiation against the
//! credential store under the configured lookup deadline.

use super::consts::*;
use crate::error::ProtocolError;
use crate::session::{Conn, SessionContext};
use crate::store::Store;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time;
use tracing::{error, warn};

/// Negotiated authentication method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    /// No authentication required
    None,
    /// Username/password authentication
    Password,
}

impl AuthMethod {
    /// Wire byte for this method
    pub fn to_byte(self) -> u8 {
        match self {
            AuthMethod::None => AUTH_METHOD_NONE,
            AuthMethod::Password => AUTH_METHOD_PASSWORD,
        }
    }
}

/// Run method selection on a fresh connection.
///
/// Returns the accepted method, or `None` after replying `no acceptable
/// methods` (0xFF), in which case the session ends.
pub async fn negotiate<S>(
    conn: &mut Conn<S>,
    password_authentication: bool,
) -> Result<Option<AuthMethod>, ProtocolError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let version = conn.read_u8().await?;
    if version != SOCKS5_VERSION {
        return Err(ProtocolError::BadVersion(version));
    }

    let count = conn.read_u8().await?;
    let mut methods = vec![0u8; count as usize];
    conn.read_exact(&mut methods).await?;

    let supported = if password_authentication {
        AuthMethod::Password
    } else {
        AuthMethod::None
    };

    // First client-offered method the server supports, in client order.
    let selected = methods
        .iter()
        .find(|&&method| method == supported.to_byte())
        .map(|_| supported);

    let reply = selected.map_or(AUTH_METHOD_NO_ACCEPTABLE, AuthMethod::to_byte);
    conn.write_all(&[SOCKS5_VERSION, reply]).await?;

    Ok(selected)
}

/// Drive the username/password sub-negotiation.
///
/// Returns `Ok(true)` when the client authenticated (the context carries
/// the username), `Ok(false)` when the session must end: a credential
/// mismatch (after replying `01 01`) or a store failure (no reply).
pub async fn authenticate<S>(
    conn: &mut Conn<S>,
    store: &dyn Store,
    deadline: Option<Duration>,
    ctx: &mut SessionContext,
) -> Result<bool, ProtocolError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let version = conn.read_u8().await?;
    if version != AUTH_VERSION {
        return Err(ProtocolError::BadVersion(version));
    }

    let username_len = conn.read_u8().await?;
    let mut username = vec![0u8; username_len as usize];
    conn.read_exact(&mut username).await?;
    let username = String::from_utf8_lossy(&username).into_owned();

    ctx.username = Some(username.clone());

    let password_len = conn.read_u8().await?;
    let mut password = vec![0u8; password_len as usize];
    conn.read_exact(&mut password).await?;

    let lookup = store.get_password(&username);
    let stored = match deadline {
        Some(duration) if !duration.is_zero() => match time::timeout(duration, lookup).await {
            Ok(result) => result,
            Err(_) => Err(anyhow::anyhow!("credential lookup deadline exceeded")),
        },
        _ => lookup.await,
    };

    let stored = match stored {
        Ok(stored) => stored,
        Err(e) => {
            error!(peer = %ctx.peer, username = %username, error = %e, "credential store lookup failed");
            return Ok(false);
        }
    };

    if stored.as_deref() != Some(String::from_utf8_lossy(&password).as_ref()) {
        warn!(peer = %ctx.peer, username = %username, "authentication failed");
        conn.write_all(&[AUTH_VERSION, AUTH_FAILURE]).await?;
        return Ok(false);
    }

    conn.write_all(&[AUTH_VERSION, AUTH_SUCCESS]).await?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StaticStore;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

    async fn conn_with(bytes: &[u8]) -> (DuplexStream, Conn<DuplexStream>) {
        let (mut client, server) = tokio::io::duplex(512);
        client.write_all(bytes).await.unwrap();
        (client, Conn::new(server, None, None))
    }

    fn store(username: &str, password: &str) -> StaticStore {
        let mut credentials = HashMap::new();
        credentials.insert(username.to_string(), password.to_string());
        StaticStore::new(credentials)
    }

    fn sub_negotiation(username: &str, password: &str) -> Vec<u8> {
        let mut frame = vec![AUTH_VERSION, username.len() as u8];
        frame.extend_from_slice(username.as_bytes());
        frame.push(password.len() as u8);
        frame.extend_from_slice(password.as_bytes());
        frame
    }

    #[tokio::test]
    async fn test_negotiate_no_auth() {
        let (mut client, mut conn) = conn_with(&[0x05, 0x01, 0x00]).await;

        let method = negotiate(&mut conn, false).await.unwrap();
        assert_eq!(method, Some(AuthMethod::None));

        let mut reply = [0u8; 2];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply, [0x05, 0x00]);
    }

    #[tokio::test]
    async fn test_negotiate_password() {
        let (mut client, mut conn) = conn_with(&[0x05, 0x02, 0x00, 0x02]).await;

        let method = negotiate(&mut conn, true).await.unwrap();
        assert_eq!(method, Some(AuthMethod::Password));

        let mut reply = [0u8; 2];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply, [0x05, 0x02]);
    }

    #[tokio::test]
    async fn test_negotiate_no_acceptable_methods() {
        // Client only offers no-auth while the server requires passwords.
        let (mut client, mut conn) = conn_with(&[0x05, 0x01, 0x00]).await;

        let method = negotiate(&mut conn, true).await.unwrap();
        assert_eq!(method, None);

        let mut reply = [0u8; 2];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply, [0x05, 0xFF]);
    }

    #[tokio::test]
    async fn test_negotiate_bad_version() {
        let (_client, mut conn) = conn_with(&[0x04, 0x01, 0x00]).await;

        let err = negotiate(&mut conn, false).await.unwrap_err();
        assert!(matches!(err, ProtocolError::BadVersion(0x04)));
    }

    #[tokio::test]
    async fn test_authenticate_success() {
        let frame = sub_negotiation("root", "password");
        let (mut client, mut conn) = conn_with(&frame).await;
        let store = store("root", "password");
        let mut ctx = SessionContext::new("127.0.0.1:50000".parse().unwrap());

        let ok = authenticate(&mut conn, &store, None, &mut ctx).await.unwrap();
        assert!(ok);
        assert_eq!(ctx.username.as_deref(), Some("root"));

        let mut reply = [0u8; 2];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply, [0x01, 0x00]);
    }

    #[tokio::test]
    async fn test_authenticate_wrong_password() {
        let frame = sub_negotiation("root", "password");
        let (mut client, mut conn) = conn_with(&frame).await;
        let store = store("root", "password123");
        let mut ctx = SessionContext::new("127.0.0.1:50000".parse().unwrap());

        let ok = authenticate(&mut conn, &store, None, &mut ctx).await.unwrap();
        assert!(!ok);

        let mut reply = [0u8; 2];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply, [0x01, 0x01]);
    }

    #[tokio::test]
    async fn test_authenticate_unknown_user() {
        let frame = sub_negotiation("nobody", "password");
        let (mut client, mut conn) = conn_with(&frame).await;
        let store = store("root", "password");
        let mut ctx = SessionContext::new("127.0.0.1:50000".parse().unwrap());

        let ok = authenticate(&mut conn, &store, None, &mut ctx).await.unwrap();
        assert!(!ok);

        let mut reply = [0u8; 2];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply, [0x01, 0x01]);
    }

    #[tokio::test]
    async fn test_authenticate_bad_version() {
        let (_client, mut conn) = conn_with(&[0x05, 0x04]).await;
        let store = store("root", "password");
        let mut ctx = SessionContext::new("127.0.0.1:50000".parse().unwrap());

        let err = authenticate(&mut conn, &store, None, &mut ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, ProtocolError::BadVersion(0x05)));
    }

    struct StalledStore;

    #[async_trait]
    impl Store for StalledStore {
        async fn get_password(&self, _username: &str) -> anyhow::Result<Option<String>> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_authenticate_lookup_deadline() {
        let frame = sub_negotiation("root", "password");
        let (mut client, mut conn) = conn_with(&frame).await;
        let mut ctx = SessionContext::new("127.0.0.1:50000".parse().unwrap());

        let ok = authenticate(
            &mut conn,
            &StalledStore,
            Some(Duration::from_millis(20)),
            &mut ctx,
        )
        .await
        .unwrap();
        assert!(!ok);

        // Store failures terminate without a status reply.
        drop(conn);
        let mut rest = Vec::new();
        client.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }
}
