use anyhow::{Context, Result};
use async_trait::async_trait;
use fm_chain_client::{Eip1193Provider, ProviderError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

pub const DEFAULT_RPC_URL: &str = "http://localhost:8545";

/// Methods that need a wallet; a plain node cannot serve them.
const WALLET_METHODS: &[&str] = &[
    "eth_requestAccounts",
    "eth_sendTransaction",
    "eth_sign",
    "personal_sign",
];

/// Read-only JSON-RPC provider over HTTP.
///
/// Reads `FUNDME_RPC_URL` from environment at construction time
/// (default: `http://localhost:8545`).
pub struct HttpRpcProvider {
    endpoint: String,
    http: reqwest::Client,
    next_id: AtomicU64,
}

impl Default for HttpRpcProvider {
    fn default() -> Self {
        Self::new(None)
    }
}

impl HttpRpcProvider {
    pub fn new(endpoint: Option<String>) -> Self {
        let endpoint = endpoint
            .or_else(|| std::env::var("FUNDME_RPC_URL").ok())
            .unwrap_or_else(|| DEFAULT_RPC_URL.to_string());
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn transport(&self, body: &RpcRequest<'_>) -> Result<RpcResponse> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(body)
            .send()
            .await
            .with_context(|| format!("{} transport", body.method))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("{} HTTP {status}: {text}", body.method);
        }

        response
            .json::<RpcResponse>()
            .await
            .with_context(|| format!("{} parse", body.method))
    }
}

// ── JSON-RPC 2.0 envelope ────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

impl RpcResponse {
    fn into_result(self) -> Result<Value, ProviderError> {
        match self.error {
            Some(err) => Err(ProviderError {
                code: err.code,
                message: err.message,
                data: err.data,
            }),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

#[async_trait(?Send)]
impl Eip1193Provider for HttpRpcProvider {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        if method == "eth_accounts" {
            return Ok(Value::Array(Vec::new()));
        }
        if WALLET_METHODS.contains(&method) {
            return Err(ProviderError {
                code: ProviderError::UNSUPPORTED_METHOD,
                message: format!("{method} requires a wallet; {} is read-only", self.endpoint),
                data: None,
            });
        }

        let body = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };
        debug!(method, id = body.id, endpoint = %self.endpoint, "json-rpc request");

        match self.transport(&body).await {
            Ok(response) => response.into_result(),
            Err(err) => {
                warn!(method, "json-rpc transport failed: {err:#}");
                Err(ProviderError::internal(format!("{err:#}")))
            }
        }
    }
}
