//! HTTP client for the node REST API

use super::types::{ErgoBox, Transaction};
use crate::{config::ErgoNodeConfig, errors::NodeError};
use rand::Rng;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

const API_KEY_HEADER: &str = "api_key";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// How many times, and how long apart, failed calls are retried
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub wait_min: Duration,
    pub wait_max: Duration,
}

impl RetryPolicy {
    /// Random wait in `[wait_min, wait_max]`
    pub fn backoff(&self) -> Duration {
        if self.wait_max <= self.wait_min {
            return self.wait_min;
        }
        let min = self.wait_min.as_millis() as u64;
        let max = self.wait_max.as_millis() as u64;
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }
}

impl From<&ErgoNodeConfig> for RetryPolicy {
    fn from(config: &ErgoNodeConfig) -> Self {
        Self {
            max_retries: config.retry_max,
            wait_min: Duration::from_millis(config.retry_wait_min_ms),
            wait_max: Duration::from_millis(config.retry_wait_max_ms),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ErgoNodeClient {
    base_url: String,
    api_key: String,
    retry: RetryPolicy,
    http: Client,
}

impl ErgoNodeClient {
    pub fn new(config: &ErgoNodeConfig) -> Result<Self, NodeError> {
        if config.endpoint.trim().is_empty() {
            return Err(NodeError::Config("ergo_node.endpoint is empty".to_string()));
        }
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| NodeError::Config("ergo_node.api_key is absent".to_string()))?;

        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| NodeError::Config(format!("failed to build http client: {e}")))?;

        Ok(Self {
            base_url: config.endpoint.trim_end_matches('/').to_string(),
            api_key,
            retry: RetryPolicy::from(config),
            http,
        })
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Recommended fee (nanoERG) for a transaction of `tx_size` bytes
    pub async fn get_tx_fee(&self, tx_size: u32) -> Result<u64, NodeError> {
        let url = self.url("transactions/getFee");
        self.send_with_retry(|| {
            self.http
                .get(&url)
                .query(&[("waitTime", 1), ("txSize", tx_size)])
        })
        .await
    }

    /// Page through the node's mempool
    pub async fn get_unconfirmed_txs(&self, limit: u32, offset: u32) -> Result<Vec<Transaction>, NodeError> {
        let url = self.url("transactions/unconfirmed");
        self.send_with_retry(|| {
            self.http
                .get(&url)
                .query(&[("limit", limit), ("offset", offset)])
        })
        .await
    }

    /// Unconfirmed outputs locked by `ergo_tree`
    pub async fn get_unconfirmed_outputs_by_ergo_tree(
        &self,
        ergo_tree: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ErgoBox>, NodeError> {
        let url = self.url("transactions/unconfirmed/outputs/byErgoTree");
        self.send_with_retry(|| {
            self.http
                .post(&url)
                .query(&[("limit", limit), ("offset", offset)])
                .json(ergo_tree)
        })
        .await
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn send_with_retry<T, F>(&self, build: F) -> Result<T, NodeError>
    where
        T: DeserializeOwned,
        F: Fn() -> RequestBuilder,
    {
        let mut attempt = 0;
        loop {
            match self.execute(build()).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.retry.max_retries => {
                    attempt += 1;
                    let wait = self.retry.backoff();
                    warn!(error = %e, attempt, wait_ms = wait.as_millis() as u64, "retrying node request");
                    tokio::time::sleep(wait).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, NodeError> {
        let resp = request
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
            .map_err(|e| NodeError::Transport(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| NodeError::Transport(e.to_string()))?;
        debug!(status = status.as_u16(), bytes = body.len(), "node response");

        if !status.is_success() {
            return Err(NodeError::Status {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|e| NodeError::Decode(e.to_string()))
    }
}
