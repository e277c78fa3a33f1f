//! Port to the node collaborator: on-chain node and pool operations.
//!
//! The commands only see [`NodeClient`]; [`HttpNodeClient`] forwards each
//! call to the local control endpoint, which owns contracts and signing.

mod http;

pub use http::HttpNodeClient;

use std::fmt;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Opaque reference to a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxHandle(pub String);

impl fmt::Display for TxHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Data stored in a node's contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeData {
    pub name: String,
    pub email: String,
    pub ip_address: String,
    pub status: String,
}

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("node control request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("node control rejected the request: {0}")]
    Rejected(String),

    #[error("transaction {tx} not confirmed within {timeout:?}")]
    TxTimeout { tx: TxHandle, timeout: Duration },
}

pub trait NodeClient: Send + Sync {
    /// Deploys a new node contract owned by the operator's account.
    fn create_node(&self) -> impl Future<Output = Result<TxHandle, NodeError>> + Send;

    /// Address of the operator's node contract.
    fn node_address(&self) -> impl Future<Output = Result<String, NodeError>> + Send;

    fn set_node_data(
        &self,
        node_address: &str,
        data: &NodeData,
    ) -> impl Future<Output = Result<TxHandle, NodeError>> + Send;

    fn apply_to_pool(
        &self,
        node_address: &str,
        pool_address: &str,
    ) -> impl Future<Output = Result<TxHandle, NodeError>> + Send;

    /// Human-readable status of the node's application to the pool.
    fn check_pool_application(
        &self,
        node_address: &str,
        pool_address: &str,
    ) -> impl Future<Output = Result<String, NodeError>> + Send;

    /// Resolves once `tx` is mined.
    fn wait_for_tx(&self, tx: &TxHandle) -> impl Future<Output = Result<(), NodeError>> + Send;
}
