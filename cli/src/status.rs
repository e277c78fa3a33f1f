use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::warn;

/// Lifecycle state of the edge daemon.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum DaemonState {
    /// No edge daemon is running.
    Stopped,
    /// A launch is in flight.
    Starting,
    /// The edge daemon process is alive.
    Running,
    /// A graceful shutdown is in flight.
    Stopping,
    /// The last start failed or the daemon exited on its own. `start` recovers.
    Failed,
}

impl DaemonState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Failed => "failed",
        }
    }

    /// Starting or Stopping.
    pub fn is_transitional(self) -> bool {
        matches!(self, Self::Starting | Self::Stopping)
    }
}

impl fmt::Display for DaemonState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Edge daemon status written to `status.toml` on every transition.
/// Read back by later invocations to recover a Failed state and its error.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EdgeStatus {
    /// nodectl version that wrote the file.
    pub version: String,
    pub state: DaemonState,
    /// PID of the edge daemon while it is running.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    /// RFC 3339 timestamp of the last transition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<String>,
    /// Human-readable reason for a Failed state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EdgeStatus {
    /// Constructs the status for a fresh install: stopped, nothing recorded.
    pub fn new() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            state: DaemonState::Stopped,
            pid: None,
            since: None,
            error: None,
        }
    }

    /// Status for `state` stamped with the current local time.
    pub fn at(state: DaemonState, pid: Option<u32>, error: Option<String>) -> Self {
        Self {
            state,
            pid,
            error,
            since: Some(chrono::Local::now().to_rfc3339()),
            ..Self::new()
        }
    }
}

impl Default for EdgeStatus {
    fn default() -> Self {
        Self::new()
    }
}

/// Serializes `status` to TOML and writes it to `path`.
/// Creates the parent directory if it does not exist.
/// Failures are logged, never returned: the status file is informational.
pub fn write_status(path: &Path, status: &EdgeStatus) {
    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            warn!("Failed to create directory {}: {e}", parent.display());
            return;
        }
    }
    match toml::to_string_pretty(status) {
        Ok(content) => {
            if let Err(e) = std::fs::write(path, content) {
                warn!("Failed to write status file {}: {e}", path.display());
            }
        }
        Err(e) => warn!("Failed to serialize status: {e}"),
    }
}

/// Reads the status file, returning `None` if it is missing or unreadable.
pub fn read_status(path: &Path) -> Option<EdgeStatus> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(status) => Some(status),
        Err(e) => {
            warn!("Ignoring malformed status file {}: {e}", path.display());
            None
        }
    }
}
