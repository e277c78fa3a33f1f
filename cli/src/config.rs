use anyhow::{Context, Result};
use notify::{Config as NotifyConfig, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::event::SupervisorEvent;

pub const DEFAULT_EDGE_COMMAND: &str = "gladius-edged";
pub const DEFAULT_STOP_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_STARTUP_GRACE_MS: u64 = 500;
pub const DEFAULT_CONTROL_URL: &str = "http://localhost:3000/api";
pub const DEFAULT_IP_ADDRESS: &str = "1.1.1.1";
pub const DEFAULT_TX_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_TX_POLL_MS: u64 = 1000;
/// Placeholder pool address shipped in fresh settings files.
pub const UNSET_POOL_ADDRESS: &str = "0x";

/// Root configuration structure. Deserialized from `env.toml`.
#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub environment: EnvironmentConfig,
    #[serde(default)]
    pub node: NodeConfig,
    #[serde(default)]
    pub edge: EdgeConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentConfig {
    /// Address of the pool this node applies to.
    #[serde(default = "default_pool_address")]
    pub pool_address: String,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            pool_address: UNSET_POOL_ADDRESS.to_string(),
        }
    }
}

impl EnvironmentConfig {
    /// Returns the pool address, or `None` while it is still the placeholder.
    pub fn pool_address(&self) -> Option<&str> {
        let addr = self.pool_address.trim();
        if addr.is_empty() || addr == UNSET_POOL_ADDRESS {
            None
        } else {
            Some(addr)
        }
    }
}

/// Settings for the node control endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeConfig {
    #[serde(default = "default_control_url")]
    pub control_url: String,
    /// Address advertised in the node's on-chain data.
    #[serde(default = "default_ip_address")]
    pub ip_address: String,
    #[serde(default = "default_tx_timeout")]
    pub tx_timeout_secs: u64,
    #[serde(default = "default_tx_poll")]
    pub tx_poll_ms: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            control_url: DEFAULT_CONTROL_URL.to_string(),
            ip_address: DEFAULT_IP_ADDRESS.to_string(),
            tx_timeout_secs: DEFAULT_TX_TIMEOUT_SECS,
            tx_poll_ms: DEFAULT_TX_POLL_MS,
        }
    }
}

/// How the edge daemon is launched and stopped.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeConfig {
    /// Program to execute. Resolved through `PATH` when not absolute.
    #[serde(default = "default_edge_command")]
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// How long `stop` waits for the daemon to exit after SIGTERM.
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout_secs: u64,
    /// The daemon must survive this long for `start` to report success.
    #[serde(default = "default_startup_grace")]
    pub startup_grace_ms: u64,
    /// Send SIGKILL once the stop timeout has elapsed.
    #[serde(default)]
    pub kill_after_timeout: bool,
    /// File the daemon's stdout/stderr are appended to.
    #[serde(default)]
    pub log_file: Option<PathBuf>,
    /// Overrides the state directory (`edge.pid`, `edge.lock`, `status.toml`).
    #[serde(default)]
    pub state_dir: Option<PathBuf>,
}

impl Default for EdgeConfig {
    fn default() -> Self {
        Self {
            command: DEFAULT_EDGE_COMMAND.to_string(),
            args: Vec::new(),
            stop_timeout_secs: DEFAULT_STOP_TIMEOUT_SECS,
            startup_grace_ms: DEFAULT_STARTUP_GRACE_MS,
            kill_after_timeout: false,
            log_file: None,
            state_dir: None,
        }
    }
}

impl EdgeConfig {
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }

    pub fn startup_grace(&self) -> Duration {
        Duration::from_millis(self.startup_grace_ms)
    }
}

/// Loads the config file at `path`, returning `Config::default()` if the file does not exist.
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Spawns a file watcher on the parent directory of `path`.  Whenever the config
/// file is created or modified, reloads it and sends a `ConfigReloaded` event.
pub async fn watch_config(path: PathBuf, tx: mpsc::Sender<SupervisorEvent>) {
    let (watch_tx, mut watch_rx) = mpsc::channel::<notify::Event>(16);

    let mut watcher = match RecommendedWatcher::new(
        move |res: notify::Result<notify::Event>| {
            if let Ok(event) = res {
                let _ = watch_tx.blocking_send(event);
            }
        },
        NotifyConfig::default(),
    ) {
        Ok(w) => w,
        Err(e) => {
            warn!("Failed to create config watcher: {e}");
            return;
        }
    };

    // Watch the directory so editor-style atomic saves (write-new + rename) are seen.
    let watch_dir = match path.parent() {
        Some(d) if !d.as_os_str().is_empty() => d.to_path_buf(),
        _ => PathBuf::from("."),
    };

    if let Err(e) = watcher.watch(&watch_dir, RecursiveMode::NonRecursive) {
        warn!("Failed to watch config directory {}: {e}", watch_dir.display());
        return;
    }

    let file_name = path.file_name().map(|n| n.to_os_string());

    while let Some(event) = watch_rx.recv().await {
        let affects_config = event
            .paths
            .iter()
            .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
        let is_write = matches!(
            event.kind,
            notify::EventKind::Create(_) | notify::EventKind::Modify(_)
        );

        if affects_config && is_write {
            match load_or_default(&path) {
                Ok(config) => {
                    debug!("Config file changed: {}", path.display());
                    if tx.send(SupervisorEvent::ConfigReloaded(config)).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!("Failed to reload config: {e:#}"),
            }
        }
    }
}

fn default_pool_address() -> String {
    UNSET_POOL_ADDRESS.to_string()
}

fn default_control_url() -> String {
    DEFAULT_CONTROL_URL.to_string()
}

fn default_ip_address() -> String {
    DEFAULT_IP_ADDRESS.to_string()
}

fn default_tx_timeout() -> u64 {
    DEFAULT_TX_TIMEOUT_SECS
}

fn default_tx_poll() -> u64 {
    DEFAULT_TX_POLL_MS
}

fn default_edge_command() -> String {
    DEFAULT_EDGE_COMMAND.to_string()
}

fn default_stop_timeout() -> u64 {
    DEFAULT_STOP_TIMEOUT_SECS
}

fn default_startup_grace() -> u64 {
    DEFAULT_STARTUP_GRACE_MS
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── defaults ──────────────────────────────────────────────────────────────

    #[test]
    fn edge_config_default_values() {
        let e = EdgeConfig::default();
        assert_eq!(e.command, DEFAULT_EDGE_COMMAND);
        assert!(e.args.is_empty());
        assert_eq!(e.stop_timeout(), Duration::from_secs(DEFAULT_STOP_TIMEOUT_SECS));
        assert_eq!(e.startup_grace(), Duration::from_millis(DEFAULT_STARTUP_GRACE_MS));
        assert!(!e.kill_after_timeout);
        assert!(e.log_file.is_none());
        assert!(e.state_dir.is_none());
    }

    #[test]
    fn default_pool_address_is_unset() {
        let c = Config::default();
        assert_eq!(c.environment.pool_address, UNSET_POOL_ADDRESS);
        assert!(c.environment.pool_address().is_none());
    }

    #[test]
    fn pool_address_is_trimmed() {
        let env = EnvironmentConfig {
            pool_address: "  0xabc  ".to_string(),
        };
        assert_eq!(env.pool_address(), Some("0xabc"));
    }

    #[test]
    fn blank_pool_address_is_unset() {
        let env = EnvironmentConfig {
            pool_address: "   ".to_string(),
        };
        assert!(env.pool_address().is_none());
    }

    // ── load_or_default ───────────────────────────────────────────────────────

    #[test]
    fn load_or_default_missing_file_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nonexistent.toml");
        let config = load_or_default(&path).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn load_or_default_parses_camel_case_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("env.toml");
        std::fs::write(
            &path,
            r#"
[environment]
poolAddress = "0xC88a29cf8F0Baf07fc822DEaA24b383Fc30f27e4"

[node]
controlUrl = "http://127.0.0.1:3001/api"
ipAddress = "10.0.0.7"

[edge]
command = "/usr/local/bin/edged"
args = ["--port", "8080"]
stopTimeoutSecs = 3
killAfterTimeout = true
"#,
        )
        .unwrap();

        let config = load_or_default(&path).unwrap();
        assert_eq!(
            config.environment.pool_address(),
            Some("0xC88a29cf8F0Baf07fc822DEaA24b383Fc30f27e4")
        );
        assert_eq!(config.node.control_url, "http://127.0.0.1:3001/api");
        assert_eq!(config.node.ip_address, "10.0.0.7");
        assert_eq!(config.node.tx_timeout_secs, DEFAULT_TX_TIMEOUT_SECS);
        assert_eq!(config.edge.command, "/usr/local/bin/edged");
        assert_eq!(config.edge.args, vec!["--port", "8080"]);
        assert_eq!(config.edge.stop_timeout_secs, 3);
        assert_eq!(config.edge.startup_grace_ms, DEFAULT_STARTUP_GRACE_MS);
        assert!(config.edge.kill_after_timeout);
    }

    #[test]
    fn load_or_default_partial_toml_uses_field_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("env.toml");
        std::fs::write(&path, "[edge]\nstartupGraceMs = 50\n").unwrap();

        let config = load_or_default(&path).unwrap();
        assert_eq!(config.edge.startup_grace_ms, 50);
        assert_eq!(config.edge.command, DEFAULT_EDGE_COMMAND);
        assert_eq!(config.node, NodeConfig::default());
        assert!(config.environment.pool_address().is_none());
    }

    #[test]
    fn load_or_default_ignores_unknown_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("env.toml");
        std::fs::write(&path, "[misc]\nHello = \"World\"\n").unwrap();
        assert_eq!(load_or_default(&path).unwrap(), Config::default());
    }

    #[test]
    fn load_or_default_invalid_toml_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("env.toml");
        std::fs::write(&path, "this is not valid toml ][[[").unwrap();
        assert!(load_or_default(&path).is_err());
    }
}
