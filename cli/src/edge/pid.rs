//! PID marker recording the running edge daemon.
//!
//! Unlike a guard-style PID file the marker outlives the process that wrote
//! it: `edge start` exits while the daemon keeps running, and a later
//! `edge stop` removes the marker. The process name and start time are kept
//! next to the PID so a recycled PID is never mistaken for the daemon.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::EdgeError;
use crate::process_monitor::{is_same_process, ProcessIdentity};

/// Contents of `edge.pid`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerRecord {
    pub pid: u32,
    pub name: String,
    pub start_time: u64,
}

impl MarkerRecord {
    pub fn new(pid: u32, identity: &ProcessIdentity) -> Self {
        Self {
            pid,
            name: identity.name.clone(),
            start_time: identity.start_time,
        }
    }

    pub fn identity(&self) -> ProcessIdentity {
        ProcessIdentity {
            name: self.name.clone(),
            start_time: self.start_time,
        }
    }

    /// True while the recorded process is alive and has not been replaced.
    pub fn is_live(&self) -> bool {
        is_same_process(self.pid, &self.identity())
    }
}

#[derive(Debug, Clone)]
pub struct PidMarker {
    path: PathBuf,
}

impl PidMarker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records `record`, creating the parent directory if needed.
    pub fn write(&self, record: &MarkerRecord) -> Result<(), EdgeError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }
        let content = toml::to_string(record).map_err(|e| {
            self.io_error(io::Error::new(io::ErrorKind::InvalidData, e))
        })?;
        fs::write(&self.path, content).map_err(|e| self.io_error(e))
    }

    /// Returns the record, or `None` if the marker is missing or garbled.
    pub fn read(&self) -> Option<MarkerRecord> {
        toml::from_str(&fs::read_to_string(&self.path).ok()?).ok()
    }

    /// Returns the record if it still names the live daemon. Never touches
    /// the file, so read-only callers can use it freely.
    pub fn live(&self) -> Option<MarkerRecord> {
        self.read().filter(MarkerRecord::is_live)
    }

    /// Removes a marker that is garbled or names a dead or foreign process.
    /// Only call this while holding the transition lock. Returns true if a
    /// stale marker was removed.
    pub fn clear_stale(&self) -> bool {
        if !self.path.exists() || self.live().is_some() {
            return false;
        }
        tracing::debug!("Removing stale pid marker {}", self.path.display());
        self.remove().is_ok()
    }

    /// Removes the marker. Missing markers are not an error.
    pub fn remove(&self) -> Result<(), EdgeError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_error(e)),
        }
    }

    fn io_error(&self, source: io::Error) -> EdgeError {
        EdgeError::Io {
            path: self.path.clone(),
            source,
        }
    }
}
