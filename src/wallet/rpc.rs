//! JSON-RPC Wallet Provider
//!
//! Wallet provider backed by an Ethereum JSON-RPC endpoint whose node
//! manages the accounts (Ganache, a local dev node, or a wallet bridge).

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use ethers_core::types::{Address, Bytes, H256, U64};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{parse_chain_id_hex, TxReceipt, WalletProvider};
use crate::error::RawFailure;

/// JSON-RPC "method not found"
const METHOD_NOT_FOUND: i64 = -32601;

/// JSON-RPC wallet provider
pub struct JsonRpcWallet {
    client: Client,
    url: String,
    next_id: AtomicU64,
    poll_interval: Duration,
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
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    transaction_hash: H256,
    #[serde(default)]
    block_number: Option<U64>,
    #[serde(default)]
    status: Option<U64>,
}

impl JsonRpcWallet {
    /// Create a new provider for the given endpoint
    pub fn new(url: &str) -> Self {
        Self {
            client: Client::new(),
            url: url.to_string(),
            next_id: AtomicU64::new(1),
            poll_interval: Duration::from_secs(1),
        }
    }

    /// Set how often pending receipts are polled
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    async fn request<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, RawFailure> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        debug!("RPC {} #{}", method, id);

        let resp = self.client.post(&self.url).json(&body).send().await?;
        let envelope: RpcResponse = resp.json().await?;

        if let Some(error) = envelope.error {
            return Err(failure_from_rpc_error(&error));
        }
        Ok(serde_json::from_value(envelope.result.unwrap_or(Value::Null))?)
    }
}

#[async_trait]
impl WalletProvider for JsonRpcWallet {
    async fn get_network(&self) -> Result<u64, RawFailure> {
        let chain_id: String = self.request("eth_chainId", json!([])).await?;
        parse_chain_id_hex(&chain_id).map_err(|e| RawFailure::message(e.to_string()))
    }

    async fn accounts(&self) -> Result<Vec<Address>, RawFailure> {
        self.request("eth_accounts", json!([])).await
    }

    async fn request_accounts(&self) -> Result<Vec<Address>, RawFailure> {
        match self.request("eth_requestAccounts", json!([])).await {
            // Plain nodes expose their managed accounts without a prompt.
            Err(failure) if failure.code == Some(METHOD_NOT_FOUND) => self.accounts().await,
            other => other,
        }
    }

    async fn call(&self, to: Address, data: Vec<u8>) -> Result<Vec<u8>, RawFailure> {
        let params = json!([{ "to": to, "data": Bytes::from(data) }, "latest"]);
        let result: Bytes = self.request("eth_call", params).await?;
        Ok(result.to_vec())
    }

    async fn send_transaction(
        &self,
        from: Address,
        to: Address,
        data: Vec<u8>,
    ) -> Result<H256, RawFailure> {
        let params = json!([{ "from": from, "to": to, "data": Bytes::from(data) }]);
        self.request("eth_sendTransaction", params).await
    }

    async fn wait_for_receipt(&self, tx_hash: H256) -> Result<TxReceipt, RawFailure> {
        loop {
            let receipt: Option<RpcReceipt> = self
                .request("eth_getTransactionReceipt", json!([tx_hash]))
                .await?;

            if let Some(receipt) = receipt {
                return Ok(TxReceipt {
                    tx_hash: receipt.transaction_hash,
                    block_number: receipt.block_number.map(|n| n.as_u64()),
                    // Pre-Byzantium receipts carry no status
                    success: receipt.status.map(|s| !s.is_zero()).unwrap_or(true),
                    confirmed_at: chrono::Utc::now().timestamp_millis(),
                });
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

/// Map a JSON-RPC error object onto a [`RawFailure`].
///
/// `data` comes in several shapes: a hex revert payload, a nested error
/// object (wallets wrapping the node's error), or a node-specific object
/// carrying `reason` and `result`.
fn failure_from_rpc_error(error: &RpcErrorObject) -> RawFailure {
    let mut failure = RawFailure::message(error.message.clone()).with_code(error.code);
    if let Some(data) = &error.data {
        absorb_error_data(&mut failure, data, true);
    }
    failure
}

fn absorb_error_data(failure: &mut RawFailure, data: &Value, top_level: bool) {
    match data {
        Value::String(s) => {
            if let Some(bytes) = decode_hex(s) {
                failure.revert_data.get_or_insert(bytes);
            }
        }
        Value::Object(map) => {
            if top_level && map.contains_key("code") {
                if let Some(message) = map.get("message").and_then(Value::as_str) {
                    failure.provider_message = Some(message.to_string());
                }
            }
            if let Some(reason) = map.get("reason").and_then(Value::as_str) {
                failure.reason.get_or_insert_with(|| reason.to_string());
            }
            for key in ["data", "result"] {
                if let Some(nested) = map.get(key) {
                    absorb_error_data(failure, nested, false);
                }
            }
        }
        _ => {
            warn!("Ignoring unrecognized RPC error data: {}", data);
        }
    }
}

fn decode_hex(s: &str) -> Option<Vec<u8>> {
    let digits = s.strip_prefix("0x")?;
    if digits.is_empty() {
        return None;
    }
    hex::decode(digits).ok()
}
