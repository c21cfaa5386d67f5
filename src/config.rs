//! Configuration for the socksd server
//!
//! Configuration is loaded from a TOML file. Every section and field has a
//! default, so an empty file (or no file at all) yields a working server on
//! 127.0.0.1:1080 with no authentication.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use std::time::Duration;

use crate::socks::Command;

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    1080
}

fn default_public_ip() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_allow_commands() -> Vec<Command> {
    vec![Command::Connect, Command::UdpAssociate]
}

fn default_tcp_keepalive() -> u64 {
    60
}

fn default_max_packet_size() -> usize {
    1500
}

fn default_packet_ttl() -> u64 {
    120
}

fn default_nat_cleanup_period() -> u64 {
    30
}

/// Root configuration structure
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    /// Listener settings
    #[serde(default)]
    pub server: ServerConfig,

    /// I/O and lookup deadlines
    #[serde(default)]
    pub timeouts: TimeoutConfig,

    /// Authentication settings
    #[serde(default)]
    pub auth: AuthConfig,

    /// Access rules
    #[serde(default)]
    pub rules: RulesConfig,

    /// UDP ASSOCIATE settings
    #[serde(default)]
    pub udp: UdpConfig,
}

impl Config {
    /// Validate cross-field constraints
    pub fn validate(&self) -> Result<()> {
        if self.udp.max_packet_size == 0 {
            anyhow::bail!("udp.max_packet_size must be greater than zero");
        }
        Ok(())
    }
}

/// Listener settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerConfig {
    /// Bind address for the TCP listener and UDP relay sockets
    #[serde(default = "default_host")]
    pub host: String,

    /// TCP listener port
    #[serde(default = "default_port")]
    pub port: u16,

    /// IP advertised to clients in the UDP ASSOCIATE reply
    #[serde(default = "default_public_ip")]
    pub public_ip: IpAddr,
}

// IPv6 literals need brackets before a port can be appended.
fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

impl ServerConfig {
    /// The `host:port` string the TCP listener binds to
    pub fn listen_address(&self) -> String {
        join_host_port(&self.host, self.port)
    }

    /// The `host:0` string each UDP relay socket binds to
    pub fn udp_listen_address(&self) -> String {
        join_host_port(&self.host, 0)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_ip: default_public_ip(),
        }
    }
}

/// Deadlines in seconds; zero disables the deadline
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TimeoutConfig {
    /// Read deadline on the TCP control connection
    #[serde(default)]
    pub tcp_read: u64,

    /// Write deadline on the TCP control connection
    #[serde(default)]
    pub tcp_write: u64,

    /// Read deadline on the UDP relay socket
    #[serde(default)]
    pub udp_read: u64,

    /// Write deadline on the UDP relay socket
    #[serde(default)]
    pub udp_write: u64,

    /// Deadline for dialing the destination
    #[serde(default)]
    pub dial: u64,

    /// Deadline for credential store lookups
    #[serde(default)]
    pub get_password: u64,

    /// Idle seconds before TCP keepalive probes start on proxied
    /// connections; zero disables keepalive
    #[serde(default = "default_tcp_keepalive")]
    pub tcp_keepalive: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            tcp_read: 0,
            tcp_write: 0,
            udp_read: 0,
            udp_write: 0,
            dial: 0,
            get_password: 0,
            tcp_keepalive: default_tcp_keepalive(),
        }
    }
}

fn seconds(value: u64) -> Option<Duration> {
    (value > 0).then(|| Duration::from_secs(value))
}

impl TimeoutConfig {
    /// TCP read deadline, if enabled
    pub fn tcp_read(&self) -> Option<Duration> {
        seconds(self.tcp_read)
    }

    /// TCP write deadline, if enabled
    pub fn tcp_write(&self) -> Option<Duration> {
        seconds(self.tcp_write)
    }

    /// UDP read deadline, if enabled
    pub fn udp_read(&self) -> Option<Duration> {
        seconds(self.udp_read)
    }

    /// UDP write deadline, if enabled
    pub fn udp_write(&self) -> Option<Duration> {
        seconds(self.udp_write)
    }

    /// Dial deadline, if enabled
    pub fn dial(&self) -> Option<Duration> {
        seconds(self.dial)
    }

    /// Credential lookup deadline, if enabled
    pub fn get_password(&self) -> Option<Duration> {
        seconds(self.get_password)
    }

    /// TCP keepalive idle time, if enabled
    pub fn tcp_keepalive(&self) -> Option<Duration> {
        seconds(self.tcp_keepalive)
    }
}

/// Authentication settings
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct AuthConfig {
    /// Require username/password authentication (RFC 1929)
    #[serde(default)]
    pub password_authentication: bool,

    /// Username to password map for the default credential store
    #[serde(default)]
    pub static_credentials: HashMap<String, String>,
}

/// Access rules: permitted commands, blocked destinations, admitted sources
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RulesConfig {
    /// Commands clients may issue
    #[serde(default = "default_allow_commands")]
    pub allow_commands: Vec<Command>,

    /// Destination hosts to refuse (domain names or textual IPs)
    #[serde(default)]
    pub block_hosts: Vec<String>,

    /// Source IPs admitted to connect; empty admits everyone
    #[serde(default)]
    pub allow_source_ips: Vec<IpAddr>,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            allow_commands: default_allow_commands(),
            block_hosts: Vec::new(),
            allow_source_ips: Vec::new(),
        }
    }
}

/// UDP ASSOCIATE settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UdpConfig {
    /// Receive buffer size for relay datagrams
    #[serde(default = "default_max_packet_size")]
    pub max_packet_size: usize,

    /// Seconds a NAT entry may stay idle before eviction; zero disables
    /// the sweep
    #[serde(default = "default_packet_ttl")]
    pub packet_ttl: u64,

    /// Seconds between NAT sweep ticks; zero disables the sweep
    #[serde(default = "default_nat_cleanup_period")]
    pub nat_cleanup_period: u64,
}

impl UdpConfig {
    /// NAT entry TTL, if the sweep is enabled
    pub fn packet_ttl(&self) -> Option<Duration> {
        seconds(self.packet_ttl)
    }

    /// Sweep period, if the sweep is enabled
    pub fn nat_cleanup_period(&self) -> Option<Duration> {
        seconds(self.nat_cleanup_period)
    }
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self {
            max_packet_size: default_max_packet_size(),
            packet_ttl: default_packet_ttl(),
            nat_cleanup_period: default_nat_cleanup_period(),
        }
    }
}

/// Load configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = std::fs::read_to_string(path.as_ref())
        .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

    parse_config(&content)
}

/// Parse configuration from a TOML string
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse configuration")?;
    config.validate()?;
    Ok(config)
}
