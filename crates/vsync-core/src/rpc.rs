//! JSON-RPC access to the local validator and the cluster gossip directory

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::{Error, Result};
use crate::http;

/// JSON-RPC 2.0 Request
#[derive(Debug, Serialize)]
pub struct JsonRpcRequest<'a> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'a str,
    pub params: Value,
}

/// JSON-RPC 2.0 Response
#[derive(Debug, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
}

/// One live peer in the gossip directory
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClusterNode {
    pub pubkey: String,
    #[serde(default)]
    pub gossip: Option<String>,
}

/// Queries answered by the local validator
#[async_trait]
pub trait ValidatorRpc: Send + Sync {
    /// Running software version string
    async fn version(&self) -> Result<String>;
    /// Identity public key the validator is currently running with
    async fn identity(&self) -> Result<String>;
    /// Health status string (`ok` when healthy)
    async fn health(&self) -> Result<String>;
}

/// Snapshot of the network's live peers
#[async_trait]
pub trait PeerDirectory: Send + Sync {
    async fn cluster_nodes(&self) -> Result<Vec<ClusterNode>>;
}

/// HTTP JSON-RPC client
#[derive(Debug)]
pub struct JsonRpcClient {
    url: String,
    client: reqwest::Client,
    next_id: AtomicU64,
}

impl JsonRpcClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            url: url.into(),
            client: http::client(timeout)?,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Issue a call and return its `result` member
    pub async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let failed = |reason: String| Error::RpcFailed {
            method: method.to_string(),
            url: self.url.clone(),
            reason,
        };

        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };
        let response: JsonRpcResponse = http::post_json(&self.client, &self.url, &request)
            .await
            .map_err(failed)?;

        if let Some(error) = response.error {
            return Err(failed(format!("RPC error {}: {}", error.code, error.message)));
        }
        response
            .result
            .ok_or_else(|| failed("response carries neither result nor error".to_string()))
    }

    fn malformed(&self, method: &str, result: &Value) -> Error {
        Error::RpcFailed {
            method: method.to_string(),
            url: self.url.clone(),
            reason: format!("unexpected result shape: {result}"),
        }
    }
}

#[async_trait]
impl ValidatorRpc for JsonRpcClient {
    async fn version(&self) -> Result<String> {
        let result = self.call("getVersion", json!([])).await?;
        result
            .get("solana-core")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| self.malformed("getVersion", &result))
    }

    async fn identity(&self) -> Result<String> {
        let result = self.call("getIdentity", json!([])).await?;
        result
            .get("identity")
            .or_else(|| result.get("value"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| self.malformed("getIdentity", &result))
    }

    async fn health(&self) -> Result<String> {
        let result = self.call("getHealth", json!([])).await?;
        result
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| self.malformed("getHealth", &result))
    }
}

#[async_trait]
impl PeerDirectory for JsonRpcClient {
    async fn cluster_nodes(&self) -> Result<Vec<ClusterNode>> {
        let result = self.call("getClusterNodes", json!([])).await?;
        serde_json::from_value(result).map_err(|e| Error::RpcFailed {
            method: "getClusterNodes".to_string(),
            url: self.url.clone(),
            reason: e.to_string(),
        })
    }
}
