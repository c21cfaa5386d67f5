//! SOCKS5 server
//!
//! Owns the listener and the shared collaborators, accepts connections,
//! and runs one session task per client. Shutdown closes the listener and
//! waits for in-flight sessions to finish.

use crate::config::Config;
use crate::driver::{Driver, NetDriver};
use crate::error::is_closed_error;
use crate::metrics::{Metrics, NopMetrics};
use crate::pool::BytePool;
use crate::rules::{Rules, ServerRules};
use crate::socks::handle_session;
use crate::store::{StaticStore, Store};
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info};

/// Collaborators every session shares by reference
pub(crate) struct Shared {
    pub(crate) config: Config,
    pub(crate) store: Arc<dyn Store>,
    pub(crate) driver: Arc<dyn Driver>,
    pub(crate) rules: Arc<dyn Rules>,
    pub(crate) metrics: Arc<dyn Metrics>,
    pub(crate) pool: Arc<BytePool>,
}

/// A SOCKS5 proxy server
///
/// Built from a [`Config`]; the credential store, transport driver, rules,
/// and metrics sink can each be swapped out before serving:
///
/// ```rust,no_run
/// use socksd::{Config, Server};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let server = Server::new(Config::default());
///     server.listen_and_serve().await
/// }
/// ```
pub struct Server {
    config: Config,
    store: Arc<dyn Store>,
    driver: Arc<dyn Driver>,
    rules: Arc<dyn Rules>,
    metrics: Arc<dyn Metrics>,
    pool: Arc<BytePool>,
    shutdown_tx: Mutex<Option<oneshot::Sender<()>>>,
    shutdown_rx: Mutex<Option<oneshot::Receiver<()>>>,
    done: watch::Sender<bool>,
    bound: watch::Sender<Option<SocketAddr>>,
}

impl Server {
    /// Create a server with default collaborators: a static credential
    /// store, the OS network driver, rules from the configured sets, and
    /// no metrics.
    pub fn new(config: Config) -> Self {
        let mut credentials = config.auth.static_credentials.clone();
        if config.auth.password_authentication && credentials.is_empty() {
            credentials.insert("root".to_string(), "password".to_string());
        }

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (done, _) = watch::channel(false);
        let (bound, _) = watch::channel(None);

        Server {
            store: Arc::new(StaticStore::new(credentials)),
            driver: Arc::new(NetDriver::new(
                config.timeouts.dial(),
                config.timeouts.tcp_keepalive(),
            )),
            rules: Arc::new(ServerRules::from_config(&config.rules)),
            metrics: Arc::new(NopMetrics),
            pool: Arc::new(BytePool::new(config.udp.max_packet_size)),
            config,
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            shutdown_rx: Mutex::new(Some(shutdown_rx)),
            done,
            bound,
        }
    }

    /// Replace the credential store
    pub fn with_store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = store;
        self
    }

    /// Replace the transport driver
    pub fn with_driver(mut self, driver: Arc<dyn Driver>) -> Self {
        self.driver = driver;
        self
    }

    /// Replace the rule set
    pub fn with_rules(mut self, rules: Arc<dyn Rules>) -> Self {
        self.rules = rules;
        self
    }

    /// Replace the metrics sink
    pub fn with_metrics(mut self, metrics: Arc<dyn Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Accept and serve clients until [`Server::shutdown`] is called.
    ///
    /// Returns after the listener has closed and every in-flight session
    /// has finished.
    pub async fn listen_and_serve(&self) -> Result<()> {
        let mut shutdown = self
            .shutdown_rx
            .lock()
            .expect("server lock poisoned")
            .take()
            .context("server is already running or was shut down")?;

        let listen_address = self.config.server.listen_address();
        let listener = self
            .driver
            .listen(&listen_address)
            .await
            .with_context(|| format!("failed to listen on {}", listen_address))?;

        if let Ok(addr) = listener.local_addr() {
            // send_replace updates the value even before anyone subscribes.
            self.bound.send_replace(Some(addr));
        }

        info!(address = %listen_address, "server starting");

        let shared = Arc::new(Shared {
            config: self.config.clone(),
            store: self.store.clone(),
            driver: self.driver.clone(),
            rules: self.rules.clone(),
            metrics: self.metrics.clone(),
            pool: self.pool.clone(),
        });

        let mut sessions = JoinSet::new();

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!(peer = %peer, "accepted connection");
                        sessions.spawn(handle_session(stream, peer, shared.clone()));
                    }
                    Err(e) => {
                        if is_closed_error(&e) {
                            break;
                        }
                        error!(error = %e, "failed to accept connection");
                    }
                },
            }
        }

        drop(listener);
        info!("server stopping");

        while sessions.join_next().await.is_some() {}

        self.done.send_replace(true);
        Ok(())
    }

    /// Signal the accept loop to stop and wait for the server to finish.
    ///
    /// Idempotent: later calls return immediately.
    pub async fn shutdown(&self) {
        let sender = self.shutdown_tx.lock().expect("server lock poisoned").take();
        let sender = match sender {
            Some(sender) => sender,
            None => return,
        };

        let _ = sender.send(());

        let mut done = self.done.subscribe();
        let _ = done.wait_for(|finished| *finished).await;
    }

    /// Address the listener is bound to; waits until the server has
    /// started. Useful with port 0.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        let mut bound = self.bound.subscribe();
        let result = match bound.wait_for(|addr| addr.is_some()).await {
            Ok(addr) => *addr,
            Err(_) => None,
        };
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpStream;

    fn test_config() -> Config {
        let mut config = Config::default();
        config.server.port = 0;
        config
    }

    #[tokio::test]
    async fn test_listen_shutdown_round_trip() {
        let server = Arc::new(Server::new(test_config()));

        let serve = {
            let server = server.clone();
            tokio::spawn(async move { server.listen_and_serve().await })
        };

        let addr = server.local_addr().await.unwrap();
        assert_ne!(addr.port(), 0);

        // The listener is live.
        let conn = TcpStream::connect(addr).await;
        assert!(conn.is_ok());
        drop(conn);

        server.shutdown().await;
        serve.await.unwrap().unwrap();

        // New connections are refused once the listener is gone.
        assert!(TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn test_second_serve_fails() {
        let server = Arc::new(Server::new(test_config()));

        let serve = {
            let server = server.clone();
            tokio::spawn(async move { server.listen_and_serve().await })
        };

        server.local_addr().await.unwrap();
        assert!(server.listen_and_serve().await.is_err());

        server.shutdown().await;
        serve.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let server = Arc::new(Server::new(test_config()));

        let serve = {
            let server = server.clone();
            tokio::spawn(async move { server.listen_and_serve().await })
        };

        server.local_addr().await.unwrap();
        server.shutdown().await;
        server.shutdown().await;
        serve.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_default_credentials_installed() {
        let mut config = test_config();
        config.auth.password_authentication = true;

        let server = Server::new(config);
        let password = server.store.get_password("root").await.unwrap();
        assert_eq!(password, Some("password".to_string()));
    }
}
