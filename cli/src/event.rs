use crate::config::Config;

pub enum SupervisorEvent {
    /// The settings file changed on disk and was successfully re-parsed.
    ConfigReloaded(Config),
    /// The supervised edge daemon is no longer alive.
    EdgeExited { pid: u32 },
    /// Ctrl+C received; stop the edge daemon and exit.
    Shutdown,
}
