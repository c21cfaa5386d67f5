//! NAT table for UDP relays
//!
//! Maps each resolved target address to the client that sent to it and the
//! address template needed to rebuild the reply envelope. The datagram loop
//! and the sweep task share the table; operations never suspend.

use crate::socks::addr::Address;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// One forwarding entry, valid until swept or consumed
#[derive(Debug, Clone)]
pub struct NatEntry {
    /// Client source address the reply envelope is sent to
    pub client: SocketAddr,
    /// Destination address the client named, restored into the reply header
    pub reply_addr: Address,
    last_activity: Instant,
}

/// Target-keyed forwarding table
#[derive(Debug, Default)]
pub struct NatTable {
    entries: RwLock<HashMap<String, NatEntry>>,
}

impl NatTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a client-to-target forward. A second send to the same target
    /// replaces the entry and refreshes its activity time.
    pub fn insert(&self, target: SocketAddr, client: SocketAddr, reply_addr: Address) {
        let entry = NatEntry {
            client,
            reply_addr,
            last_activity: Instant::now(),
        };

        self.entries
            .write()
            .expect("nat table lock poisoned")
            .insert(target.to_string(), entry);
    }

    /// Remove and return the entry for a datagram source, if the source is
    /// a known target. Forwarding is one-shot: a long-lived flow re-inserts
    /// on the next upstream send.
    pub fn take(&self, source: &SocketAddr) -> Option<NatEntry> {
        self.entries
            .write()
            .expect("nat table lock poisoned")
            .remove(&source.to_string())
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.entries.read().expect("nat table lock poisoned").len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Evict entries idle longer than `ttl`; returns the eviction count
    pub fn sweep(&self, ttl: Duration) -> usize {
        let mut entries = self.entries.write().expect("nat table lock poisoned");
        let before = entries.len();
        entries.retain(|_, entry| entry.last_activity.elapsed() < ttl);
        before - entries.len()
    }

    /// Start the periodic sweep task. Disabled (returns `None`) unless both
    /// a period and a TTL are configured. The task stops when `token` is
    /// cancelled.
    pub fn start_sweeper(
        self: Arc<Self>,
        period: Option<Duration>,
        ttl: Option<Duration>,
        token: CancellationToken,
    ) -> Option<JoinHandle<()>> {
        let (period, ttl) = match (period, ttl) {
            (Some(period), Some(ttl)) => (period, ttl),
            _ => return None,
        };

        let table = self;

        Some(tokio::spawn(async move {
            let mut ticker = time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let evicted = table.sweep(ttl);
                        if evicted > 0 {
                            debug!(evicted, "swept stale nat entries");
                        }
                    }
                }
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn client() -> SocketAddr {
        "127.0.0.1:46809".parse().unwrap()
    }

    fn target() -> SocketAddr {
        "127.0.0.1:7444".parse().unwrap()
    }

    #[test]
    fn test_insert_and_take() {
        let table = NatTable::new();
        let addr = Address::ipv4(Ipv4Addr::new(127, 0, 0, 1), 7444);

        table.insert(target(), client(), addr.clone());
        assert_eq!(table.len(), 1);

        let entry = table.take(&target()).unwrap();
        assert_eq!(entry.client, client());
        assert_eq!(entry.reply_addr, addr);

        // One-shot: a second take misses until the client sends again.
        assert!(table.take(&target()).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn test_take_unknown_source() {
        let table = NatTable::new();
        let unknown: SocketAddr = "10.0.0.9:53".parse().unwrap();
        assert!(table.take(&unknown).is_none());
    }

    #[test]
    fn test_insert_replaces_entry() {
        let table = NatTable::new();
        let first = Address::domain("localhost".to_string(), 7444);
        let second = Address::ipv4(Ipv4Addr::new(127, 0, 0, 1), 7444);

        table.insert(target(), client(), first);
        table.insert(target(), client(), second.clone());
        assert_eq!(table.len(), 1);

        let entry = table.take(&target()).unwrap();
        assert_eq!(entry.reply_addr, second);
    }

    #[tokio::test]
    async fn test_sweep_evicts_stale_entries() {
        let table = NatTable::new();
        table.insert(target(), client(), Address::unspecified());

        tokio::time::sleep(Duration::from_millis(30)).await;

        // A fresh entry survives the sweep the stale one does not.
        let fresh: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        table.insert(fresh, client(), Address::unspecified());

        let evicted = table.sweep(Duration::from_millis(20));
        assert_eq!(evicted, 1);
        assert_eq!(table.len(), 1);
        assert!(table.take(&fresh).is_some());
    }

    #[tokio::test]
    async fn test_sweeper_disabled_without_ttl() {
        let table = Arc::new(NatTable::new());
        let token = CancellationToken::new();

        assert!(table
            .clone()
            .start_sweeper(Some(Duration::from_secs(1)), None, token.clone())
            .is_none());
        assert!(table
            .clone()
            .start_sweeper(None, Some(Duration::from_secs(1)), token)
            .is_none());
    }

    #[tokio::test]
    async fn test_sweeper_runs_and_stops() {
        let table = Arc::new(NatTable::new());
        table.insert(target(), client(), Address::unspecified());

        let token = CancellationToken::new();
        let handle = table
            .clone()
            .start_sweeper(
                Some(Duration::from_millis(10)),
                Some(Duration::from_millis(10)),
                token.clone(),
            )
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(table.is_empty());

        token.cancel();
        handle.await.unwrap();
    }
}
