/// Canonical file paths for nodectl data files.
///
/// The settings file defaults to `env.toml` in the working directory. Edge
/// daemon bookkeeping lives in the state directory (`$NODECTL_HOME`, or
/// `~/.nodectl` when unset, or `[edge] stateDir` in the settings file):
///   - edge.pid     PID of the running edge daemon.
///   - edge.lock    Held exclusively while a start/stop is in flight.
///   - status.toml  Last lifecycle state written by the controller.
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

const APP_DIR_NAME: &str = ".nodectl";
const HOME_OVERRIDE_VAR: &str = "NODECTL_HOME";
pub const CONFIG_FILE_NAME: &str = "env.toml";
pub const PID_FILE_NAME: &str = "edge.pid";
pub const LOCK_FILE_NAME: &str = "edge.lock";
pub const STATUS_FILE_NAME: &str = "status.toml";

/// Returns the default state directory.
pub fn app_data_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(HOME_OVERRIDE_VAR) {
        return Ok(PathBuf::from(dir));
    }
    #[cfg(windows)]
    let home = std::env::var("APPDATA").context("APPDATA environment variable not set")?;
    #[cfg(not(windows))]
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(APP_DIR_NAME))
}

pub fn pid_file_path(state_dir: &Path) -> PathBuf {
    state_dir.join(PID_FILE_NAME)
}

pub fn lock_file_path(state_dir: &Path) -> PathBuf {
    state_dir.join(LOCK_FILE_NAME)
}

pub fn status_file_path(state_dir: &Path) -> PathBuf {
    state_dir.join(STATUS_FILE_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_files_share_the_state_dir() {
        let dir = Path::new("/var/lib/nodectl");
        assert_eq!(pid_file_path(dir).parent(), Some(dir));
        assert_eq!(lock_file_path(dir).parent(), Some(dir));
        assert_eq!(status_file_path(dir).parent(), Some(dir));
    }

    #[test]
    fn state_file_names() {
        let dir = Path::new("state");
        assert_eq!(pid_file_path(dir).file_name().unwrap(), PID_FILE_NAME);
        assert_eq!(lock_file_path(dir).file_name().unwrap(), LOCK_FILE_NAME);
        assert_eq!(status_file_path(dir).file_name().unwrap(), STATUS_FILE_NAME);
    }
}
