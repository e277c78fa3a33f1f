use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::warn;

use crate::config::{self, Config};
use crate::edge::{EdgeController, ProcessLauncher};
use crate::node::HttpNodeClient;
use crate::paths;

/// Everything a command handler needs, loaded once per invocation.
#[derive(Debug, Clone)]
pub struct AppContext {
    pub config_path: PathBuf,
    pub config: Config,
    pub state_dir: PathBuf,
}

impl AppContext {
    /// Loads the settings file. A file that fails to parse is reported and
    /// replaced by defaults so that `edge status` keeps working.
    pub fn load(config_path: PathBuf) -> Result<Self> {
        Self::load_in(config_path, paths::app_data_dir)
    }

    /// Like [`load`](Self::load), with `default_state_dir` consulted only
    /// when the settings name no state directory.
    fn load_in(
        config_path: PathBuf,
        default_state_dir: impl FnOnce() -> Result<PathBuf>,
    ) -> Result<Self> {
        let config = config::load_or_default(&config_path).unwrap_or_else(|e| {
            warn!("{e:#} (using defaults)");
            Config::default()
        });
        let state_dir = match &config.edge.state_dir {
            Some(dir) => dir.clone(),
            None => default_state_dir().context("Failed to resolve the state directory")?,
        };
        Ok(Self {
            config_path,
            config,
            state_dir,
        })
    }

    /// Builds a controller for the configured edge daemon, recovering any
    /// instance recorded in the state directory.
    pub fn edge_controller(&self) -> EdgeController<ProcessLauncher> {
        let launcher = ProcessLauncher::new(&self.config.edge, paths::pid_file_path(&self.state_dir));
        EdgeController::new(launcher, self.config.edge.stop_timeout())
            .with_lock_file(paths::lock_file_path(&self.state_dir))
            .with_status_file(paths::status_file_path(&self.state_dir))
    }

    pub fn node_client(&self) -> Result<HttpNodeClient> {
        HttpNodeClient::new(&self.config.node).context("Failed to build the node control client")
    }
}
