//! `edge start|stop|status`

use anyhow::Result;
use clap::Args;

use crate::context::AppContext;
use crate::edge::{Command, Reply};

/// Arguments for the edge command
#[derive(Debug, Args)]
pub struct EdgeArgs {
    /// Lifecycle verb: start, stop or status
    pub command: String,
}

/// Runs one lifecycle verb and prints the reply line. Unknown verbs and
/// failed transitions are reported, not returned as errors.
pub async fn run(ctx: &AppContext, args: EdgeArgs) -> Result<()> {
    let reply = reply_for(ctx, &args.command).await;
    println!("{}", render(&reply));
    Ok(())
}

pub async fn reply_for(ctx: &AppContext, verb: &str) -> Reply {
    let controller = ctx.edge_controller();
    match verb.parse::<Command>() {
        Ok(command) => controller.handle(command).await,
        Err(e) => {
            tracing::debug!("{e}");
            Reply::unrecognized(controller.snapshot().state)
        }
    }
}

pub fn render(reply: &Reply) -> String {
    format!("Edge Daemon:\t {reply}")
}
