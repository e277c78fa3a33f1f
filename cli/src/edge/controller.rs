use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tracing::{info, warn};

use super::{Command, DaemonState, EdgeError, Launcher, Outcome, Reply, TransitionLock};
use crate::status::{read_status, write_status, EdgeStatus};

const EXITED_UNEXPECTEDLY: &str = "edge daemon exited unexpectedly";

/// Point-in-time view of the controller, readable without the transition lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub state: DaemonState,
    pub pid: Option<u32>,
    pub error: Option<String>,
}

impl Snapshot {
    fn new(state: DaemonState, pid: Option<u32>, error: Option<String>) -> Self {
        Self { state, pid, error }
    }
}

/// Single-instance lifecycle state machine for the edge daemon.
///
/// `start` and `stop` are serialized by an async mutex around the instance
/// handle and, when configured, by a `flock` on a lock file shared with other
/// invocations. `status` reads a `watch` snapshot and never waits on either.
pub struct EdgeController<L: Launcher> {
    launcher: L,
    instance: Mutex<Option<L::Handle>>,
    snapshot: watch::Sender<Snapshot>,
    stop_timeout: Duration,
    lock_path: Option<PathBuf>,
    status_path: Option<PathBuf>,
}

impl<L: Launcher> EdgeController<L> {
    /// Creates a controller, adopting an instance the launcher can recover.
    pub fn new(launcher: L, stop_timeout: Duration) -> Self {
        let recovered = launcher.recover();
        let initial = match &recovered {
            Some(handle) => Snapshot::new(DaemonState::Running, Some(launcher.pid(handle)), None),
            None => Snapshot::new(DaemonState::Stopped, None, None),
        };
        let (snapshot, _) = watch::channel(initial);
        Self {
            launcher,
            instance: Mutex::new(recovered),
            snapshot,
            stop_timeout,
            lock_path: None,
            status_path: None,
        }
    }

    /// Serializes transitions with other processes through `path`.
    pub fn with_lock_file(mut self, path: PathBuf) -> Self {
        self.lock_path = Some(path);
        self
    }

    /// Persists every transition to `path`. A previously recorded failure is
    /// restored when no instance was recovered. Call after
    /// [`with_lock_file`](Self::with_lock_file) so a transition whose
    /// invocation died can be told apart from one still in flight.
    pub fn with_status_file(mut self, path: PathBuf) -> Self {
        if self.snapshot.borrow().state == DaemonState::Stopped {
            if let Some(persisted) = read_status(&path) {
                let restored = match persisted.state {
                    DaemonState::Failed => Some(Snapshot::new(DaemonState::Failed, None, persisted.error)),
                    DaemonState::Running => Some(Snapshot::new(
                        DaemonState::Failed,
                        None,
                        Some(EXITED_UNEXPECTEDLY.to_string()),
                    )),
                    DaemonState::Starting | DaemonState::Stopping => {
                        if self.transition_in_flight() {
                            Some(Snapshot::new(persisted.state, persisted.pid, None))
                        } else {
                            // Whoever wrote it died mid-transition and left nothing running.
                            None
                        }
                    }
                    DaemonState::Stopped => None,
                };
                if let Some(snapshot) = restored {
                    self.snapshot.send_replace(snapshot);
                }
            }
        }
        self.status_path = Some(path);
        self
    }

    pub fn snapshot(&self) -> Snapshot {
        self.snapshot.borrow().clone()
    }

    pub async fn handle(&self, command: Command) -> Reply {
        match command {
            Command::Start => self.start().await,
            Command::Stop => self.stop().await,
            Command::Status => self.status(),
        }
    }

    /// Launches the edge daemon unless one is already running.
    pub async fn start(&self) -> Reply {
        let mut instance = self.instance.lock().await;
        let _lock = match self.lock_transitions().await {
            Ok(lock) => lock,
            Err(e) => return self.error_reply(format!("failed to start edge daemon: {e}")),
        };

        self.settle_transitional();
        self.refresh(&mut instance);
        if let Some(handle) = instance.as_ref() {
            let pid = self.launcher.pid(handle);
            self.set(Snapshot::new(DaemonState::Running, Some(pid), None));
            return Reply::new(
                Outcome::AlreadyRunning,
                DaemonState::Running,
                format!("edge daemon is already running (pid {pid})"),
            );
        }

        self.set(Snapshot::new(DaemonState::Starting, None, None));
        match self.launcher.launch().await {
            Ok(handle) => {
                let pid = self.launcher.pid(&handle);
                *instance = Some(handle);
                self.set(Snapshot::new(DaemonState::Running, Some(pid), None));
                info!("Edge daemon started (pid {pid})");
                Reply::new(
                    Outcome::Started,
                    DaemonState::Running,
                    format!("edge daemon started (pid {pid})"),
                )
            }
            Err(e) => {
                warn!("Edge daemon failed to start: {e}");
                self.set(Snapshot::new(DaemonState::Failed, None, Some(e.to_string())));
                Reply::new(
                    Outcome::Failed,
                    DaemonState::Failed,
                    format!("failed to start edge daemon: {e}"),
                )
            }
        }
    }

    /// Stops the running edge daemon, waiting up to the stop timeout.
    pub async fn stop(&self) -> Reply {
        let mut instance = self.instance.lock().await;
        let _lock = match self.lock_transitions().await {
            Ok(lock) => lock,
            Err(e) => return self.error_reply(format!("failed to stop edge daemon: {e}")),
        };

        self.settle_transitional();
        let dropped_dead = self.refresh(&mut instance);
        let Some(handle) = instance.as_ref() else {
            if dropped_dead {
                self.set(Snapshot::new(DaemonState::Stopped, None, None));
            }
            return Reply::new(
                Outcome::NotRunning,
                self.snapshot.borrow().state,
                "edge daemon is not running",
            );
        };

        let pid = self.launcher.pid(handle);
        self.set(Snapshot::new(DaemonState::Stopping, Some(pid), None));

        match self.launcher.shutdown(handle, self.stop_timeout).await {
            Ok(()) => {
                *instance = None;
                self.set(Snapshot::new(DaemonState::Stopped, None, None));
                Reply::new(Outcome::Stopped, DaemonState::Stopped, "edge daemon stopped")
            }
            Err(e) if self.launcher.is_alive(handle) => {
                warn!("Edge daemon pid {pid} did not stop: {e}");
                self.set(Snapshot::new(DaemonState::Running, Some(pid), None));
                Reply::new(
                    Outcome::Failed,
                    DaemonState::Running,
                    format!("failed to stop edge daemon: {e}"),
                )
            }
            Err(e) => {
                // It exited anyway; only the bookkeeping failed.
                warn!("Edge daemon pid {pid} stopped with error: {e}");
                self.launcher.release(handle);
                *instance = None;
                self.set(Snapshot::new(DaemonState::Stopped, None, None));
                Reply::new(Outcome::Stopped, DaemonState::Stopped, "edge daemon stopped")
            }
        }
    }

    /// Reports the current state. Never waits on an in-flight transition.
    pub fn status(&self) -> Reply {
        let snapshot = self.snapshot();
        let message = match (&snapshot.state, snapshot.pid, &snapshot.error) {
            (DaemonState::Running, Some(pid), _) => format!("running (pid {pid})"),
            (DaemonState::Failed, _, Some(error)) => format!("failed: {error}"),
            (state, _, _) => state.to_string(),
        };
        Reply::new(Outcome::Status, snapshot.state, message)
    }

    /// Records the exit of an instance that died on its own.
    pub async fn reconcile(&self) -> Reply {
        let mut instance = self.instance.lock().await;
        let Some(handle) = instance.as_ref() else {
            return self.status();
        };
        if self.launcher.is_alive(handle) {
            return self.status();
        }

        let tracked = self.launcher.is_tracked(handle);
        self.launcher.release(handle);
        *instance = None;

        if tracked {
            warn!("{EXITED_UNEXPECTEDLY}");
            self.set(Snapshot::new(
                DaemonState::Failed,
                None,
                Some(EXITED_UNEXPECTEDLY.to_string()),
            ));
            Reply::new(Outcome::Failed, DaemonState::Failed, EXITED_UNEXPECTEDLY)
        } else {
            self.set(Snapshot::new(DaemonState::Stopped, None, None));
            Reply::new(Outcome::Stopped, DaemonState::Stopped, "edge daemon stopped")
        }
    }

    /// Drops a dead handle or adopts an instance launched elsewhere.
    /// Returns true if a dead handle was dropped.
    fn refresh(&self, instance: &mut Option<L::Handle>) -> bool {
        match instance.as_ref() {
            Some(handle) if self.launcher.is_alive(handle) => false,
            Some(handle) => {
                self.launcher.release(handle);
                *instance = None;
                true
            }
            None => {
                *instance = self.launcher.recover();
                if instance.is_none() {
                    self.launcher.discard_stale();
                }
                false
            }
        }
    }

    /// True unless the lock file shows that nobody is mid-transition.
    fn transition_in_flight(&self) -> bool {
        match &self.lock_path {
            Some(path) => TransitionLock::is_held(path).unwrap_or_else(|e| {
                warn!("Cannot inspect transition lock: {e}");
                true
            }),
            None => true,
        }
    }

    /// Resolves a Starting/Stopping state left by another invocation. Called
    /// with both locks held, so that transition has finished or was abandoned.
    fn settle_transitional(&self) {
        let current = self.snapshot.borrow().state;
        let persisted = self.status_path.as_deref().and_then(read_status);
        let settled = match persisted {
            Some(status) if status.state.is_transitional() => {
                Snapshot::new(DaemonState::Stopped, None, None)
            }
            Some(status) if current.is_transitional() && status.state == DaemonState::Failed => {
                Snapshot::new(DaemonState::Failed, None, status.error)
            }
            _ if current.is_transitional() => Snapshot::new(DaemonState::Stopped, None, None),
            _ => return,
        };
        self.set(settled);
    }

    async fn lock_transitions(&self) -> Result<Option<TransitionLock>, EdgeError> {
        match &self.lock_path {
            Some(path) => TransitionLock::acquire(path).await.map(Some),
            None => Ok(None),
        }
    }

    fn error_reply(&self, message: String) -> Reply {
        warn!("{message}");
        Reply::new(Outcome::Failed, self.snapshot.borrow().state, message)
    }

    fn set(&self, snapshot: Snapshot) {
        if let Some(path) = &self.status_path {
            let status = EdgeStatus::at(snapshot.state, snapshot.pid, snapshot.error.clone());
            write_status(path, &status);
        }
        self.snapshot.send_replace(snapshot);
    }
}
