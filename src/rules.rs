//! Access rules
//!
//! Three predicates gate every session: is the source IP admitted, is the
//! command permitted, is the destination host permitted. All three are
//! synchronous and called from many sessions concurrently.

use crate::config::RulesConfig;
use crate::socks::Command;
use std::collections::HashSet;
use std::net::IpAddr;

/// Rule set consulted by the session orchestrator
pub trait Rules: Send + Sync {
    /// Whether a connection from this source IP is admitted at all.
    /// Refused peers are closed before any bytes are read.
    fn allow_connection(&self, peer: IpAddr) -> bool;

    /// Whether clients may issue this command
    fn allow_command(&self, command: Command) -> bool;

    /// Whether the destination host is permitted. `host` is the domain for
    /// FQDN requests and the textual IP otherwise.
    fn allow_destination(&self, host: &str) -> bool;
}

/// Default rules built from the configured allow/block sets
#[derive(Debug)]
pub struct ServerRules {
    allow_commands: HashSet<Command>,
    block_hosts: HashSet<String>,
    allow_source_ips: Vec<IpAddr>,
}

impl ServerRules {
    /// Build rules from configuration
    pub fn from_config(config: &RulesConfig) -> Self {
        ServerRules {
            allow_commands: config.allow_commands.iter().copied().collect(),
            block_hosts: config.block_hosts.iter().cloned().collect(),
            allow_source_ips: config.allow_source_ips.clone(),
        }
    }
}

impl Default for ServerRules {
    fn default() -> Self {
        Self::from_config(&RulesConfig::default())
    }
}

impl Rules for ServerRules {
    fn allow_connection(&self, peer: IpAddr) -> bool {
        self.allow_source_ips.is_empty() || self.allow_source_ips.contains(&peer)
    }

    fn allow_command(&self, command: Command) -> bool {
        self.allow_commands.contains(&command)
    }

    fn allow_destination(&self, host: &str) -> bool {
        !self.block_hosts.contains(host)
    }
}
