//! Load config from file and environment.

use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use peerlink_core::{DEFAULT_CHUNK_SIZE, DEFAULT_DISCOVERY_PORT};

/// Node configuration. File: `$PEERLINK_CONFIG`, ~/.config/peerlink/config.toml or /etc/peerlink/config.toml.
/// Env overrides: PEERLINK_NICKNAME, PEERLINK_PORT, PEERLINK_DISCOVERY_PORT, PEERLINK_DOWNLOAD_DIR.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    /// Nickname advertised in handshakes and discovery.
    pub nickname: String,
    /// TCP listen port; 0 lets the OS choose.
    pub listen_port: u16,
    /// Advertised IP. Resolved from the outbound route when unset.
    pub advertise_ip: Option<IpAddr>,
    pub discovery_enabled: bool,
    /// Discovery UDP port (default 35000).
    pub discovery_port: u16,
    pub broadcast_addr: Ipv4Addr,
    pub broadcast_interval_secs: u64,
    /// Where received files are written.
    pub download_dir: PathBuf,
    pub chunk_size: usize,
    /// Idle time on a connection before a heartbeat is sent.
    pub read_timeout_secs: u64,
    /// Bound on TCP connect and on waiting for the peer's handshake.
    pub connect_timeout_secs: u64,
    /// How long a sender waits for `file-ack`.
    pub ack_timeout_secs: u64,
    /// How long shutdown waits for tasks before aborting them.
    pub shutdown_grace_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            nickname: "anonymous".to_string(),
            listen_port: 0,
            advertise_ip: None,
            discovery_enabled: true,
            discovery_port: DEFAULT_DISCOVERY_PORT,
            broadcast_addr: Ipv4Addr::BROADCAST,
            broadcast_interval_secs: 30,
            download_dir: PathBuf::from("downloads"),
            chunk_size: DEFAULT_CHUNK_SIZE,
            read_timeout_secs: 30,
            connect_timeout_secs: 5,
            ack_timeout_secs: 10,
            shutdown_grace_secs: 3,
        }
    }
}

impl Config {
    pub fn broadcast_interval(&self) -> Duration {
        Duration::from_secs(self.broadcast_interval_secs.max(1))
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs.max(1))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs.max(1))
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_secs(self.ack_timeout_secs.max(1))
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

/// Parse a TOML document. Missing keys take their defaults.
pub fn parse(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str(s)
}

/// Load config: merge default, then config file (if present), then env vars.
pub fn load(explicit: Option<&Path>) -> Config {
    let mut c = load_file(explicit).unwrap_or_default();
    apply_env(&mut c, |key| std::env::var(key).ok());
    c
}

/// Apply `PEERLINK_*` overrides. Unparseable values are ignored.
pub fn apply_env(c: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(s) = var("PEERLINK_NICKNAME") {
        if !s.trim().is_empty() {
            c.nickname = s.trim().to_string();
        }
    }
    if let Some(p) = var("PEERLINK_PORT").and_then(|s| s.parse::<u16>().ok()) {
        c.listen_port = p;
    }
    if let Some(p) = var("PEERLINK_DISCOVERY_PORT").and_then(|s| s.parse::<u16>().ok()) {
        c.discovery_port = p;
    }
    if let Some(dir) = var("PEERLINK_DOWNLOAD_DIR") {
        c.download_dir = PathBuf::from(dir);
    }
}

fn config_paths(explicit: Option<&Path>) -> Vec<PathBuf> {
    let mut out = Vec::new();
    if let Some(p) = explicit {
        out.push(p.to_path_buf());
    }
    if let Some(p) = std::env::var_os("PEERLINK_CONFIG") {
        out.push(PathBuf::from(p));
    }
    if let Some(h) = std::env::var_os("HOME").map(PathBuf::from) {
        out.push(h.join(".config/peerlink/config.toml"));
    }
    out.push(PathBuf::from("/etc/peerlink/config.toml"));
    out
}

fn load_file(explicit: Option<&Path>) -> Option<Config> {
    let path = config_paths(explicit).into_iter().find(|p| p.exists())?;
    let text = match std::fs::read_to_string(&path) {
        Ok(s) => s,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read config file, using defaults");
            return None;
        }
    };
    match parse(&text) {
        Ok(c) => {
            debug!(path = %path.display(), "Loaded config file");
            Some(c)
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Invalid config file, using defaults");
            None
        }
    }
}
