//! Edge daemon lifecycle control.
//!
//! [`EdgeController`] owns the state machine and serializes start/stop;
//! a [`Launcher`] performs the actual process work. [`ProcessLauncher`] runs
//! the configured edge program as a detached process tracked by a PID marker.

mod controller;
mod launcher;
mod lock;
mod pid;

pub use controller::{EdgeController, Snapshot};
pub use launcher::{EdgeProcess, Launcher, ProcessLauncher};
pub use lock::TransitionLock;
pub use pid::{MarkerRecord, PidMarker};

pub use crate::status::DaemonState;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

/// Reply text for a verb other than start/stop/status.
pub const NOT_RECOGNIZED: &str = "command not recognized";

/// A lifecycle verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    Status,
}

impl FromStr for Command {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(Self::Start),
            "stop" => Ok(Self::Stop),
            "status" => Ok(Self::Status),
            other => Err(UnknownCommand(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("command not recognized: {0}")]
pub struct UnknownCommand(pub String);

/// What a lifecycle request did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Started,
    AlreadyRunning,
    Stopped,
    NotRunning,
    Status,
    Failed,
    Unrecognized,
}

/// Typed answer to a lifecycle request. `Display` renders the message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub outcome: Outcome,
    /// Controller state after the request.
    pub state: DaemonState,
    pub message: String,
}

impl Reply {
    pub fn new(outcome: Outcome, state: DaemonState, message: impl Into<String>) -> Self {
        Self {
            outcome,
            state,
            message: message.into(),
        }
    }

    /// Reply for an unparseable verb. `state` is the observed state, which
    /// the verb leaves untouched.
    pub fn unrecognized(state: DaemonState) -> Self {
        Self::new(Outcome::Unrecognized, state, NOT_RECOGNIZED)
    }

    pub fn is_failure(&self) -> bool {
        self.outcome == Outcome::Failed
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

#[derive(Debug, Error)]
pub enum EdgeError {
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("edge daemon exited during startup ({0})")]
    ExitedDuringStartup(String),

    #[error("edge daemon (pid {pid}) did not stop within {timeout:?}")]
    StopTimeout { pid: u32, timeout: Duration },

    #[error("failed to signal edge daemon (pid {pid}): {reason}")]
    Signal { pid: u32, reason: String },

    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to lock {}: {reason}", .path.display())]
    Lock { path: PathBuf, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_lifecycle_verbs() {
        assert_eq!("start".parse::<Command>(), Ok(Command::Start));
        assert_eq!("stop".parse::<Command>(), Ok(Command::Stop));
        assert_eq!("status".parse::<Command>(), Ok(Command::Status));
    }

    #[test]
    fn verbs_are_case_sensitive() {
        assert!("START".parse::<Command>().is_err());
        assert!("".parse::<Command>().is_err());
    }

    #[test]
    fn unknown_verb_reports_the_verb() {
        let err = "bogus".parse::<Command>().unwrap_err();
        assert_eq!(err.to_string(), "command not recognized: bogus");
    }

    #[test]
    fn unrecognized_reply_message() {
        let reply = Reply::unrecognized(DaemonState::Running);
        assert_eq!(reply.outcome, Outcome::Unrecognized);
        assert_eq!(reply.state, DaemonState::Running);
        assert_eq!(reply.to_string(), NOT_RECOGNIZED);
        assert!(!reply.is_failure());
    }

    #[test]
    fn stop_timeout_error_names_the_pid() {
        let err = EdgeError::StopTimeout {
            pid: 77,
            timeout: Duration::from_secs(2),
        };
        assert_eq!(err.to_string(), "edge daemon (pid 77) did not stop within 2s");
    }
}
