//! Load config from file and environment.

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Node configuration. File: ~/.config/hopchat/config.toml or /etc/hopchat/config.toml.
/// Env overrides: HOPCHAT_LISTEN_PORT, HOPCHAT_NICK, HOPCHAT_TTL, HOPCHAT_LIVENESS_SECS.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeConfig {
    /// TCP listen port for neighbor links (default 47800).
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
    /// Overlay identifier. Generated per session when absent.
    #[serde(default)]
    pub node_id: Option<String>,
    /// Display name announced to neighbors (default User-<id prefix>).
    #[serde(default)]
    pub nick: Option<String>,
    /// Seconds between liveness sweeps (default 5).
    #[serde(default = "default_liveness_interval_secs")]
    pub liveness_interval_secs: u64,
    /// Neighbor addresses dialed at startup.
    #[serde(default)]
    pub peers: Vec<String>,
    /// Protocol tuning.
    #[serde(default)]
    pub protocol: hopchat_core::Config,
}

fn default_listen_port() -> u16 {
    47800
}
fn default_liveness_interval_secs() -> u64 {
    hopchat_core::liveness::DEFAULT_LIVENESS_INTERVAL_SECS
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen_port: default_listen_port(),
            node_id: None,
            nick: None,
            liveness_interval_secs: default_liveness_interval_secs(),
            peers: Vec::new(),
            protocol: hopchat_core::Config::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Load config: merge default, then config file (explicit path, or the first standard location
/// that exists), then env vars. An explicit path must exist and parse.
pub fn load(explicit: Option<&Path>) -> Result<NodeConfig, ConfigError> {
    let mut c = match explicit {
        Some(p) => read_file(p)?,
        None => load_standard_file().unwrap_or_default(),
    };
    apply_env(&mut c, |k| std::env::var(k).ok());
    Ok(c)
}

fn apply_env(c: &mut NodeConfig, var: impl Fn(&str) -> Option<String>) {
    if let Some(p) = var("HOPCHAT_LISTEN_PORT").and_then(|s| s.parse::<u16>().ok()) {
        c.listen_port = p;
    }
    if let Some(n) = var("HOPCHAT_NICK").filter(|s| !s.trim().is_empty()) {
        c.nick = Some(n);
    }
    if let Some(t) = var("HOPCHAT_TTL").and_then(|s| s.parse::<u32>().ok()) {
        c.protocol.default_ttl = t;
    }
    if let Some(s) = var("HOPCHAT_LIVENESS_SECS").and_then(|s| s.parse::<u64>().ok()) {
        c.liveness_interval_secs = s;
    }
}

fn config_paths() -> Vec<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let mut out = Vec::new();
    if let Some(h) = home {
        out.push(h.join(".config/hopchat/config.toml"));
    }
    out.push(PathBuf::from("/etc/hopchat/config.toml"));
    out
}

fn load_standard_file() -> Option<NodeConfig> {
    let path = config_paths().into_iter().find(|p| p.exists())?;
    match read_file(&path) {
        Ok(c) => Some(c),
        Err(e) => {
            tracing::warn!(error = %e, "ignoring config file");
            None
        }
    }
}

fn read_file(path: &Path) -> Result<NodeConfig, ConfigError> {
    let s = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&s).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
