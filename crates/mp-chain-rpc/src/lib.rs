use alloy_primitives::{Address, B256, hex};
use async_trait::async_trait;
use mp_api_types::{MintError, TxHash};
use mp_contract::{ContractTransport, LogFilter, RawLog, TxReceipt, TxRequest};
use mp_wallet_provider::{
    DISCONNECTED, ProviderRpcError, UNSUPPORTED_METHOD, WalletCapability, WalletMethod,
};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

pub const DEFAULT_RPC_URL: &str = "http://localhost:8545";

const METHOD_NOT_FOUND: i64 = -32601;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RpcError {
    #[error("rpc transport: {0}")]
    Transport(String),
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("rpc decode: {0}")]
    Decode(String),
}

/// Minimal Ethereum JSON-RPC client.
pub struct JsonRpcClient {
    endpoint: String,
    http: reqwest::Client,
    next_id: AtomicU64,
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
}

impl JsonRpcClient {
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
            next_id: AtomicU64::new(1),
        }
    }

    pub async fn call<R: DeserializeOwned>(&self, method: &str, params: Value) -> Result<R, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(method, id, "json-rpc call");

        let response = self
            .http
            .post(&self.endpoint)
            .json(&json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params }))
            .send()
            .await
            .map_err(|err| RpcError::Transport(format!("{method}: {err}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| RpcError::Transport(format!("{method}: {err}")))?;

        let envelope: RpcResponse = match serde_json::from_str(&text) {
            Ok(envelope) => envelope,
            Err(_) if !status.is_success() => {
                return Err(RpcError::Transport(format!("{method} HTTP {status}: {text}")));
            }
            Err(err) => return Err(RpcError::Decode(format!("{method}: {err}"))),
        };

        if let Some(error) = envelope.error {
            return Err(RpcError::Rpc {
                code: error.code,
                message: error.message,
            });
        }

        serde_json::from_value(envelope.result.unwrap_or(Value::Null))
            .map_err(|err| RpcError::Decode(format!("{method}: {err}")))
    }
}

// ── Wallet capability ─────────────────────────────────────────────────

/// Wallet capability backed by a node that manages its own accounts.
pub struct RpcWallet {
    client: Arc<JsonRpcClient>,
}

impl RpcWallet {
    pub fn new(client: Arc<JsonRpcClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl WalletCapability for RpcWallet {
    async fn request(&self, method: WalletMethod) -> Result<Vec<String>, ProviderRpcError> {
        self.client
            .call::<Vec<String>>(method.as_str(), json!([]))
            .await
            .map_err(|err| match err {
                RpcError::Transport(message) => ProviderRpcError::new(DISCONNECTED, message),
                RpcError::Rpc { code: METHOD_NOT_FOUND, message } => {
                    ProviderRpcError::new(UNSUPPORTED_METHOD, message)
                }
                RpcError::Rpc { code, message } => ProviderRpcError::new(code, message),
                RpcError::Decode(message) => ProviderRpcError::new(DISCONNECTED, message),
            })
    }
}

// ── Contract transport ────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReceiptJson {
    transaction_hash: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    block_number: Option<String>,
    #[serde(default)]
    logs: Vec<LogJson>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogJson {
    address: String,
    #[serde(default)]
    topics: Vec<String>,
    #[serde(default)]
    data: String,
    #[serde(default)]
    transaction_hash: Option<String>,
    #[serde(default)]
    block_number: Option<String>,
}

pub struct RpcTransport {
    client: Arc<JsonRpcClient>,
    poll_interval: Duration,
    confirm_timeout: Option<Duration>,
}

impl RpcTransport {
    pub fn new(client: Arc<JsonRpcClient>, poll_interval: Duration, confirm_timeout: Option<Duration>) -> Self {
        Self {
            client,
            poll_interval,
            confirm_timeout,
        }
    }

    async fn poll_receipt(&self, hash: &TxHash) -> Result<TxReceipt, MintError> {
        loop {
            let receipt: Option<ReceiptJson> = self
                .client
                .call("eth_getTransactionReceipt", json!([hash.0]))
                .await
                .map_err(|err| MintError::Transport(err.to_string()))?;

            match receipt {
                Some(receipt) => return to_receipt(receipt),
                None => tokio::time::sleep(self.poll_interval).await,
            }
        }
    }
}

#[async_trait]
impl ContractTransport for RpcTransport {
    async fn send_transaction(&self, request: TxRequest) -> Result<TxHash, MintError> {
        let params = json!([{
            "from": request.from.as_str(),
            "to": request.to.to_string(),
            "data": hex::encode_prefixed(&request.data),
        }]);

        match self.client.call::<String>("eth_sendTransaction", params).await {
            Ok(hash) => Ok(TxHash(hash)),
            Err(RpcError::Rpc { message, .. }) => Err(MintError::SubmissionRejected(message)),
            Err(err) => Err(MintError::Transport(err.to_string())),
        }
    }

    async fn wait_for_receipt(&self, hash: &TxHash) -> Result<TxReceipt, MintError> {
        match self.confirm_timeout {
            Some(limit) => tokio::time::timeout(limit, self.poll_receipt(hash))
                .await
                .map_err(|_| {
                    MintError::Transport(format!("timed out after {limit:?} waiting for {hash}"))
                })?,
            None => self.poll_receipt(hash).await,
        }
    }

    async fn watch_logs(&self, filter: LogFilter) -> Result<mpsc::UnboundedReceiver<RawLog>, MintError> {
        let mut next_block = block_number(&self.client)
            .await
            .map_err(|err| MintError::Transport(err.to_string()))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let client = self.client.clone();
        let poll_interval = self.poll_interval;

        tokio::spawn(async move {
            // The subscription block itself is included; earlier events in it may replay.
            while !tx.is_closed() {
                let latest = match block_number(&client).await {
                    Ok(latest) => latest,
                    Err(err) => {
                        warn!("log poll failed to read block number: {}", err);
                        tokio::time::sleep(poll_interval).await;
                        continue;
                    }
                };

                if latest >= next_block {
                    let params = json!([{
                        "address": filter.address.to_string(),
                        "topics": [filter.topic.to_string()],
                        "fromBlock": format!("{next_block:#x}"),
                        "toBlock": format!("{latest:#x}"),
                    }]);
                    match client.call::<Vec<LogJson>>("eth_getLogs", params).await {
                        Ok(logs) => {
                            for log in logs {
                                match to_log(log) {
                                    Ok(log) => {
                                        if tx.send(log).is_err() {
                                            return;
                                        }
                                    }
                                    Err(err) => warn!("skipping malformed log: {}", err),
                                }
                            }
                            next_block = latest + 1;
                        }
                        Err(err) => warn!("log poll failed: {}", err),
                    }
                }

                tokio::time::sleep(poll_interval).await;
            }
            debug!("log watcher stopped; receiver dropped");
        });

        Ok(rx)
    }
}

fn to_receipt(receipt: ReceiptJson) -> Result<TxReceipt, MintError> {
    // Receipts from before status codes existed carry no status; treat as included.
    let status = receipt.status.as_deref().map(|s| parse_quantity(s) == Some(1)).unwrap_or(true);
    let logs = receipt
        .logs
        .into_iter()
        .map(to_log)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| MintError::Transport(format!("malformed receipt log: {err}")))?;

    Ok(TxReceipt {
        hash: TxHash(receipt.transaction_hash),
        status,
        block_number: receipt.block_number.as_deref().and_then(parse_quantity),
        logs,
    })
}

fn to_log(log: LogJson) -> Result<RawLog, String> {
    let address = Address::from_str(&log.address).map_err(|err| format!("address {}: {err}", log.address))?;
    let topics = log
        .topics
        .iter()
        .map(|topic| B256::from_str(topic).map_err(|err| format!("topic {topic}: {err}")))
        .collect::<Result<Vec<_>, _>>()?;
    let data = hex::decode(&log.data).map_err(|err| format!("data: {err}"))?;

    Ok(RawLog {
        address,
        topics,
        data,
        transaction_hash: log.transaction_hash.map(TxHash),
        block_number: log.block_number.as_deref().and_then(parse_quantity),
    })
}

async fn block_number(client: &JsonRpcClient) -> Result<u64, RpcError> {
    let raw: String = client.call("eth_blockNumber", json!([])).await?;
    parse_quantity(&raw).ok_or_else(|| RpcError::Decode(format!("bad block number {raw}")))
}

fn parse_quantity(raw: &str) -> Option<u64> {
    u64::from_str_radix(raw.strip_prefix("0x")?, 16).ok()
}
