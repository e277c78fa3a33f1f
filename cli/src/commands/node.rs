//! Node contract commands: `create`, `apply`, `check`.
//!
//! Each handler takes validated parameters instead of prompting, so the flow
//! runs the same from a terminal, a script or a test.

use std::io::Write;

use anyhow::{bail, Context, Result};
use clap::Args;

use crate::context::AppContext;
use crate::node::{NodeClient, NodeData};

/// Status written into a freshly created node's data.
const ACTIVE_STATUS: &str = "active";

/// Arguments for the create command
#[derive(Debug, Args)]
pub struct CreateArgs {
    /// Operator name
    #[arg(long)]
    pub name: String,
    /// Operator contact email
    #[arg(long)]
    pub email: String,
    /// Address advertised for the node (defaults to node.ipAddress)
    #[arg(long)]
    pub ip_address: Option<String>,
}

/// Arguments for the apply command
#[derive(Debug, Args)]
pub struct ApplyArgs {
    /// Node contract address
    #[arg(long)]
    pub node: String,
}

/// Arguments for the check command
#[derive(Debug, Args)]
pub struct CheckArgs {
    /// Node contract address
    #[arg(long)]
    pub node: String,
    /// Pool contract address
    #[arg(long)]
    pub pool: String,
}

/// Validated input for [`create`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateNodeParams {
    pub name: String,
    pub email: String,
    pub ip_address: String,
}

impl CreateNodeParams {
    /// Trims every field, rejects blanks and title-cases the name.
    pub fn new(name: &str, email: &str, ip_address: &str) -> Result<Self> {
        Ok(Self {
            name: title_case(required("name", name)?),
            email: required("email", email)?.to_string(),
            ip_address: required("ip address", ip_address)?.to_string(),
        })
    }
}

/// Deploys a node contract, then stores the operator's data in it.
/// Returns the new node's address.
pub async fn create<C: NodeClient>(
    client: &C,
    params: &CreateNodeParams,
    out: &mut impl Write,
) -> Result<String> {
    let tx = client.create_node().await.context("Failed to create node")?;
    client.wait_for_tx(&tx).await?;
    let node_address = client.node_address().await?;
    writeln!(out, "Node created!")?;

    let data = NodeData {
        name: params.name.clone(),
        email: params.email.clone(),
        ip_address: params.ip_address.clone(),
        status: ACTIVE_STATUS.to_string(),
    };
    let tx = client
        .set_node_data(&node_address, &data)
        .await
        .context("Failed to set node data")?;
    client.wait_for_tx(&tx).await?;
    writeln!(out, "Node data set!")?;

    writeln!(out, "\n{node_address}")?;
    Ok(node_address)
}

/// Submits the node's application to `pool_address`.
pub async fn apply<C: NodeClient>(
    client: &C,
    node_address: &str,
    pool_address: Option<&str>,
    out: &mut impl Write,
) -> Result<()> {
    let node_address = required("node address", node_address)?;
    let Some(pool_address) = pool_address else {
        bail!("No pool configured: set environment.poolAddress in the settings file");
    };

    let tx = client
        .apply_to_pool(node_address, pool_address)
        .await
        .context("Failed to apply to pool")?;
    client.wait_for_tx(&tx).await?;
    writeln!(out, "Application sent to pool!")?;
    Ok(())
}

/// Prints the status of the node's application to `pool_address`.
pub async fn check<C: NodeClient>(
    client: &C,
    node_address: &str,
    pool_address: &str,
    out: &mut impl Write,
) -> Result<String> {
    let node_address = required("node address", node_address)?;
    let pool_address = required("pool address", pool_address)?;

    let status = client
        .check_pool_application(node_address, pool_address)
        .await
        .context("Failed to check pool application")?;
    writeln!(out, "Pool: {pool_address}\t Status: {status}")?;
    Ok(status)
}

pub async fn run_create(ctx: &AppContext, args: CreateArgs) -> Result<()> {
    let ip_address = args
        .ip_address
        .as_deref()
        .unwrap_or(&ctx.config.node.ip_address);
    let params = CreateNodeParams::new(&args.name, &args.email, ip_address)?;
    create(&ctx.node_client()?, &params, &mut std::io::stdout()).await?;
    Ok(())
}

pub async fn run_apply(ctx: &AppContext, args: ApplyArgs) -> Result<()> {
    let pool = ctx.config.environment.pool_address();
    apply(&ctx.node_client()?, &args.node, pool, &mut std::io::stdout()).await
}

pub async fn run_check(ctx: &AppContext, args: CheckArgs) -> Result<()> {
    check(&ctx.node_client()?, &args.node, &args.pool, &mut std::io::stdout()).await?;
    Ok(())
}

fn required<'a>(field: &str, value: &'a str) -> Result<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        bail!("{field} is required");
    }
    Ok(value)
}

/// Upper-cases the first letter of every whitespace-separated word.
fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}
