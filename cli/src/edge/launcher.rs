use std::fs::OpenOptions;
use std::future::Future;
use std::path::PathBuf;
use std::process::{Child, ExitStatus, Stdio};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use super::{EdgeError, MarkerRecord, PidMarker};
use crate::config::EdgeConfig;
use crate::process_monitor::{is_same_process, process_identity, ProcessIdentity};

/// Interval between liveness checks while starting or stopping.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How long to wait for the process table to clear after SIGKILL.
const KILL_GRACE: Duration = Duration::from_secs(2);

/// Process-level operations the controller drives. The controller owns the
/// state machine and serialization; implementors only touch the OS.
pub trait Launcher: Send + Sync {
    type Handle: Send + Sync;

    fn pid(&self, handle: &Self::Handle) -> u32;

    /// Reattaches to an instance left running by an earlier invocation.
    fn recover(&self) -> Option<Self::Handle>;

    /// Launches a new instance and waits until it is known to be up.
    fn launch(&self) -> impl Future<Output = Result<Self::Handle, EdgeError>> + Send;

    fn is_alive(&self, handle: &Self::Handle) -> bool;

    /// True while the on-disk marker still names `handle`. A dead instance
    /// whose marker is gone was stopped deliberately by someone else.
    fn is_tracked(&self, handle: &Self::Handle) -> bool;

    /// Requests a graceful shutdown and waits up to `timeout` for the exit.
    fn shutdown(
        &self,
        handle: &Self::Handle,
        timeout: Duration,
    ) -> impl Future<Output = Result<(), EdgeError>> + Send;

    /// Forgets a dead instance, clearing any marker that still names it.
    fn release(&self, handle: &Self::Handle);

    /// Clears leftovers of an instance that is gone. Only called while the
    /// transition lock is held.
    fn discard_stale(&self);
}

/// A running edge daemon. `child` is only present in the invocation that
/// spawned it; recovered instances are tracked by PID and identity.
#[derive(Debug)]
pub struct EdgeProcess {
    pid: u32,
    identity: ProcessIdentity,
    child: Option<Mutex<Child>>,
}

impl EdgeProcess {
    /// Reaps the child if it has exited. Always `None` for recovered instances.
    fn exit_status(&self) -> Option<ExitStatus> {
        let child = self.child.as_ref()?;
        let mut child = child.lock().unwrap_or_else(PoisonError::into_inner);
        child.try_wait().ok().flatten()
    }

    fn is_alive(&self) -> bool {
        match &self.child {
            Some(child) => {
                let mut child = child.lock().unwrap_or_else(PoisonError::into_inner);
                match child.try_wait() {
                    Ok(Some(_)) => false,
                    Ok(None) => true,
                    Err(_) => is_same_process(self.pid, &self.identity),
                }
            }
            None => is_same_process(self.pid, &self.identity),
        }
    }
}

/// Runs the configured edge program as a detached background process.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: String,
    args: Vec<String>,
    log_file: Option<PathBuf>,
    startup_grace: Duration,
    kill_after_timeout: bool,
    marker: PidMarker,
}

impl ProcessLauncher {
    pub fn new(edge: &EdgeConfig, pid_path: PathBuf) -> Self {
        Self {
            program: edge.command.clone(),
            args: edge.args.clone(),
            log_file: edge.log_file.clone(),
            startup_grace: edge.startup_grace(),
            kill_after_timeout: edge.kill_after_timeout,
            marker: PidMarker::new(pid_path),
        }
    }

    fn spawn(&self) -> Result<Child, EdgeError> {
        let mut cmd = std::process::Command::new(&self.program);
        cmd.args(&self.args).stdin(Stdio::null());

        match &self.log_file {
            Some(path) => {
                let io_err = |source| EdgeError::Io {
                    path: path.clone(),
                    source,
                };
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent).map_err(io_err)?;
                }
                let log = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(io_err)?;
                let log_err = log.try_clone().map_err(io_err)?;
                cmd.stdout(log).stderr(log_err);
            }
            None => {
                cmd.stdout(Stdio::null()).stderr(Stdio::null());
            }
        }

        // New session so the daemon outlives this invocation and its terminal.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            // SAFETY: setsid is async-signal-safe and touches no parent state.
            unsafe {
                cmd.pre_exec(|| {
                    nix::unistd::setsid()
                        .map(drop)
                        .map_err(std::io::Error::from)
                });
            }
        }

        cmd.spawn().map_err(|source| EdgeError::Spawn {
            program: self.program.clone(),
            source,
        })
    }

    /// Polls until the process is gone or `timeout` elapses.
    async fn wait_for_exit(&self, process: &EdgeProcess, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if !process.is_alive() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            sleep(POLL_INTERVAL).await;
        }
    }
}

impl Launcher for ProcessLauncher {
    type Handle = EdgeProcess;

    fn pid(&self, handle: &EdgeProcess) -> u32 {
        handle.pid
    }

    fn recover(&self) -> Option<EdgeProcess> {
        self.marker.live().map(|record| EdgeProcess {
            pid: record.pid,
            identity: record.identity(),
            child: None,
        })
    }

    async fn launch(&self) -> Result<EdgeProcess, EdgeError> {
        let mut child = self.spawn()?;
        let pid = child.id();
        let Some(identity) = process_identity(pid) else {
            let reason = match child.try_wait() {
                Ok(Some(status)) => status.to_string(),
                _ => {
                    send_signal(pid, Signal::Kill).ok();
                    child.wait().ok();
                    "process could not be inspected".to_string()
                }
            };
            return Err(EdgeError::ExitedDuringStartup(reason));
        };
        debug!("Spawned `{}` as pid {pid} ({})", self.program, identity.name);

        let record = MarkerRecord::new(pid, &identity);
        let process = EdgeProcess {
            pid,
            identity,
            child: Some(Mutex::new(child)),
        };

        if let Err(e) = self.marker.write(&record) {
            // An untracked daemon could never be stopped; take it down again.
            send_signal(process.pid, Signal::Kill).ok();
            return Err(e);
        }

        let deadline = Instant::now() + self.startup_grace;
        loop {
            if let Some(status) = process.exit_status() {
                self.marker.remove().ok();
                return Err(EdgeError::ExitedDuringStartup(status.to_string()));
            }
            if Instant::now() >= deadline {
                break;
            }
            sleep(POLL_INTERVAL).await;
        }

        info!("Edge daemon `{}` running as pid {}", self.program, process.pid);
        Ok(process)
    }

    fn is_alive(&self, handle: &EdgeProcess) -> bool {
        handle.is_alive()
    }

    fn is_tracked(&self, handle: &EdgeProcess) -> bool {
        self.marker.read().is_some_and(|record| record.pid == handle.pid)
    }

    async fn shutdown(&self, handle: &EdgeProcess, timeout: Duration) -> Result<(), EdgeError> {
        // The PID may already belong to someone else.
        if !handle.is_alive() {
            self.release(handle);
            return Ok(());
        }
        send_signal(handle.pid, Signal::Term)?;
        if self.wait_for_exit(handle, timeout).await {
            self.marker.remove()?;
            info!("Edge daemon pid {} stopped", handle.pid);
            return Ok(());
        }

        if self.kill_after_timeout {
            warn!(
                "Edge daemon pid {} ignored SIGTERM for {timeout:?}; sending SIGKILL",
                handle.pid
            );
            send_signal(handle.pid, Signal::Kill)?;
            if self.wait_for_exit(handle, KILL_GRACE).await {
                self.marker.remove()?;
                return Ok(());
            }
        }

        Err(EdgeError::StopTimeout {
            pid: handle.pid,
            timeout,
        })
    }

    fn release(&self, handle: &EdgeProcess) {
        if self.is_tracked(handle) {
            self.marker.remove().ok();
        }
    }

    fn discard_stale(&self) {
        self.marker.clear_stale();
    }
}

#[derive(Debug, Clone, Copy)]
enum Signal {
    Term,
    Kill,
}

/// Signals `pid`. A process that is already gone counts as success.
#[cfg(unix)]
fn send_signal(pid: u32, signal: Signal) -> Result<(), EdgeError> {
    use nix::errno::Errno;
    use nix::sys::signal::{kill, Signal as NixSignal};
    use nix::unistd::Pid;

    let raw = i32::try_from(pid).map_err(|_| EdgeError::Signal {
        pid,
        reason: "pid out of range".to_string(),
    })?;
    let signal = match signal {
        Signal::Term => NixSignal::SIGTERM,
        Signal::Kill => NixSignal::SIGKILL,
    };
    match kill(Pid::from_raw(raw), signal) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(errno) => Err(EdgeError::Signal {
            pid,
            reason: errno.to_string(),
        }),
    }
}

/// No graceful signal off unix: both requests terminate the process.
#[cfg(not(unix))]
fn send_signal(pid: u32, _signal: Signal) -> Result<(), EdgeError> {
    if crate::process_monitor::kill_process(pid) || !crate::process_monitor::is_process_alive(pid) {
        Ok(())
    } else {
        Err(EdgeError::Signal {
            pid,
            reason: "terminate request refused".to_string(),
        })
    }
}
