//! Foreground supervision of the edge daemon (`nodectl supervise`).
//!
//! Starts the daemon, then reacts to three things until one of them ends the
//! session: the daemon exiting, the settings file changing and Ctrl+C.
//! An exited daemon is recorded, not restarted.

use anyhow::{bail, Result};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::commands::edge::render;
use crate::config::{self, Config};
use crate::context::AppContext;
use crate::edge::{EdgeController, ProcessLauncher};
use crate::event::SupervisorEvent;
use crate::process_monitor;

pub async fn run(mut ctx: AppContext) -> Result<()> {
    let (event_tx, mut event_rx) = mpsc::channel::<SupervisorEvent>(32);

    // ── Background tasks ──────────────────────────────────────────────────────
    tokio::spawn(config::watch_config(ctx.config_path.clone(), event_tx.clone()));

    // Graceful shutdown on Ctrl+C.
    {
        let tx = event_tx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = tx.send(SupervisorEvent::Shutdown).await;
            }
        });
    }

    let mut controller = ctx.edge_controller();
    let mut monitor = start_and_watch(&controller, &event_tx).await?;

    info!("Supervising edge daemon `{}`", ctx.config.edge.command);

    // ── Event loop ────────────────────────────────────────────────────────────
    while let Some(evt) = event_rx.recv().await {
        match evt {
            SupervisorEvent::ConfigReloaded(new_config) => {
                if new_config.edge == ctx.config.edge {
                    ctx.config = new_config;
                    continue;
                }

                info!("Edge settings changed; restarting edge daemon");
                monitor.abort();
                let reply = controller.stop().await;
                println!("{}", render(&reply));
                if reply.is_failure() {
                    bail!("{reply}");
                }

                apply_config(&mut ctx, new_config);
                controller = ctx.edge_controller();
                monitor = start_and_watch(&controller, &event_tx).await?;
            }

            SupervisorEvent::EdgeExited { pid } => {
                let reply = controller.reconcile().await;
                println!("{}", render(&reply));
                if reply.is_failure() {
                    bail!("edge daemon (pid {pid}) exited unexpectedly");
                }
                break;
            }

            SupervisorEvent::Shutdown => {
                info!("Shutting down");
                monitor.abort();
                let reply = controller.stop().await;
                println!("{}", render(&reply));
                if reply.is_failure() {
                    bail!("{reply}");
                }
                break;
            }
        }
    }

    Ok(())
}

/// Starts the daemon and spawns a liveness watcher for it.
async fn start_and_watch(
    controller: &EdgeController<ProcessLauncher>,
    tx: &mpsc::Sender<SupervisorEvent>,
) -> Result<JoinHandle<()>> {
    let reply = controller.start().await;
    println!("{}", render(&reply));
    let Some(pid) = controller.snapshot().pid.filter(|_| !reply.is_failure()) else {
        bail!("{reply}");
    };
    Ok(tokio::spawn(process_monitor::run(pid, tx.clone())))
}

/// Swaps in a reloaded config. The state directory is fixed for the session
/// so the running bookkeeping is never orphaned.
fn apply_config(ctx: &mut AppContext, mut new_config: Config) {
    if new_config.edge.state_dir != ctx.config.edge.state_dir {
        warn!("Ignoring stateDir change until the next run");
        new_config.edge.state_dir = ctx.config.edge.state_dir.clone();
    }
    ctx.config = new_config;
}
