use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::time::{sleep, Instant};
use tracing::debug;

use super::{NodeClient, NodeData, NodeError, TxHandle};
use crate::config::NodeConfig;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Response envelope used by every control endpoint.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    #[serde(default)]
    error: Option<String>,
    response: Option<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TxResponse {
    tx_hash: TxHandle,
}

#[derive(Debug, Deserialize)]
struct AddressResponse {
    address: String,
}

#[derive(Debug, Deserialize)]
struct ApplicationResponse {
    status: String,
}

#[derive(Debug, Deserialize)]
struct TxStatusResponse {
    complete: bool,
}

/// JSON-over-HTTP client for the node control endpoint.
#[derive(Debug, Clone)]
pub struct HttpNodeClient {
    client: Client,
    base_url: String,
    tx_timeout: Duration,
    tx_poll: Duration,
}

impl HttpNodeClient {
    pub fn new(config: &NodeConfig) -> Result<Self, NodeError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: config.control_url.trim_end_matches('/').to_string(),
            tx_timeout: Duration::from_secs(config.tx_timeout_secs),
            tx_poll: Duration::from_millis(config.tx_poll_ms),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, NodeError> {
        let envelope: Envelope<T> = request.send().await?.error_for_status()?.json().await?;
        match envelope {
            Envelope {
                success: true,
                response: Some(response),
                ..
            } => Ok(response),
            Envelope { success: true, .. } => Err(NodeError::Rejected("empty response".to_string())),
            Envelope { error: Some(e), .. } => Err(NodeError::Rejected(e)),
            _ => Err(NodeError::Rejected("no reason given".to_string())),
        }
    }

    async fn send_tx(&self, request: RequestBuilder) -> Result<TxHandle, NodeError> {
        let tx: TxResponse = self.send(request).await?;
        debug!("Submitted transaction {}", tx.tx_hash);
        Ok(tx.tx_hash)
    }
}

impl NodeClient for HttpNodeClient {
    async fn create_node(&self) -> Result<TxHandle, NodeError> {
        self.send_tx(self.client.post(self.url("node/create"))).await
    }

    async fn node_address(&self) -> Result<String, NodeError> {
        let response: AddressResponse = self.send(self.client.get(self.url("node"))).await?;
        Ok(response.address)
    }

    async fn set_node_data(&self, node_address: &str, data: &NodeData) -> Result<TxHandle, NodeError> {
        let request = self
            .client
            .post(self.url(&format!("node/{node_address}/data")))
            .json(data);
        self.send_tx(request).await
    }

    async fn apply_to_pool(&self, node_address: &str, pool_address: &str) -> Result<TxHandle, NodeError> {
        let url = self.url(&format!("node/{node_address}/apply/{pool_address}"));
        self.send_tx(self.client.post(url)).await
    }

    async fn check_pool_application(
        &self,
        node_address: &str,
        pool_address: &str,
    ) -> Result<String, NodeError> {
        let url = self.url(&format!("node/{node_address}/application/{pool_address}"));
        let response: ApplicationResponse = self.send(self.client.get(url)).await?;
        Ok(response.status)
    }

    async fn wait_for_tx(&self, tx: &TxHandle) -> Result<(), NodeError> {
        let deadline = Instant::now() + self.tx_timeout;
        let url = self.url(&format!("status/tx/{tx}"));
        loop {
            let status: TxStatusResponse = self.send(self.client.get(&url)).await?;
            if status.complete {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(NodeError::TxTimeout {
                    tx: tx.clone(),
                    timeout: self.tx_timeout,
                });
            }
            debug!("Transaction {tx} pending");
            sleep(self.tx_poll).await;
        }
    }
}
