use sysinfo::{Pid, ProcessStatus, ProcessesToUpdate, System};
use tokio::sync::mpsc;
use tokio::time::{interval, Duration};
use tracing::{debug, info};

use crate::event::SupervisorEvent;

const POLL_INTERVAL_SECS: u64 = 2;

/// Returns true if `pid` names a live process. Zombies count as dead: an
/// exited child nobody has reaped yet still has a process table entry.
pub fn is_process_alive(pid: u32) -> bool {
    let pid = Pid::from_u32(pid);
    let mut sys = System::new();
    sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    match sys.process(pid) {
        Some(process) => !matches!(process.status(), ProcessStatus::Zombie | ProcessStatus::Dead),
        None => false,
    }
}

/// What distinguishes one process from a later one that reuses its PID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessIdentity {
    pub name: String,
    /// Seconds since the epoch.
    pub start_time: u64,
}

impl ProcessIdentity {
    /// Start times are rounded to seconds and may drift by one between reads.
    pub fn matches(&self, other: &ProcessIdentity) -> bool {
        self.name == other.name && self.start_time.abs_diff(other.start_time) <= 1
    }
}

/// Name and start time of `pid`, or `None` if it is not alive.
pub fn process_identity(pid: u32) -> Option<ProcessIdentity> {
    let pid = Pid::from_u32(pid);
    let mut sys = System::new();
    sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    let process = sys.process(pid)?;
    if matches!(process.status(), ProcessStatus::Zombie | ProcessStatus::Dead) {
        return None;
    }
    Some(ProcessIdentity {
        name: process.name().to_string_lossy().into_owned(),
        start_time: process.start_time(),
    })
}

/// True if `pid` is alive and is still the process described by `identity`.
pub fn is_same_process(pid: u32, identity: &ProcessIdentity) -> bool {
    process_identity(pid).is_some_and(|current| current.matches(identity))
}

/// Asks the OS to terminate `pid` without going through POSIX signals.
/// Returns false if the process is gone or could not be signalled.
#[cfg(not(unix))]
pub fn kill_process(pid: u32) -> bool {
    let pid = Pid::from_u32(pid);
    let mut sys = System::new();
    sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    sys.process(pid).map(|p| p.kill()).unwrap_or(false)
}

/// Polls the process table every [`POLL_INTERVAL_SECS`] seconds and emits
/// [`SupervisorEvent::EdgeExited`] once `pid` is no longer alive.
pub async fn run(pid: u32, tx: mpsc::Sender<SupervisorEvent>) {
    let mut ticker = interval(Duration::from_secs(POLL_INTERVAL_SECS));
    debug!("Watching edge daemon pid {pid}");

    loop {
        ticker.tick().await;

        if !is_process_alive(pid) {
            info!("Edge daemon pid {pid} exited");
            let _ = tx.send(SupervisorEvent::EdgeExited { pid }).await;
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_process_is_alive() {
        assert!(is_process_alive(std::process::id()));
    }

    #[test]
    fn unused_pid_is_not_alive() {
        // Above the default pid_max on Linux.
        assert!(!is_process_alive(4_194_305));
    }

    #[test]
    fn identity_of_current_process_matches_itself() {
        let me = process_identity(std::process::id()).unwrap();
        assert!(!me.name.is_empty());
        assert!(is_same_process(std::process::id(), &me));
    }

    #[test]
    fn identity_with_other_name_does_not_match() {
        let me = process_identity(std::process::id()).unwrap();
        let other = ProcessIdentity {
            name: "gladius-edged".to_string(),
            ..me.clone()
        };
        assert!(!is_same_process(std::process::id(), &other));
    }

    #[test]
    fn identity_with_other_start_time_does_not_match() {
        let me = process_identity(std::process::id()).unwrap();
        let earlier = ProcessIdentity {
            start_time: me.start_time.saturating_sub(3600),
            ..me.clone()
        };
        assert!(!is_same_process(std::process::id(), &earlier));
    }

    #[test]
    fn unused_pid_has_no_identity() {
        assert!(process_identity(4_194_305).is_none());
    }

    #[cfg(unix)]
    #[test]
    fn reaped_child_is_not_alive() {
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();
        assert!(!is_process_alive(pid));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn run_reports_exit_of_dead_pid() {
        let (tx, mut rx) = mpsc::channel(1);
        tokio::spawn(run(4_194_305, tx));
        match rx.recv().await {
            Some(SupervisorEvent::EdgeExited { pid }) => assert_eq!(pid, 4_194_305),
            _ => panic!("expected EdgeExited"),
        }
    }
}
