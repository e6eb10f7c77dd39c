//! The external chain collaborator. `ChainAdapter` is the boundary
//! spec §5 requires ("all chain I/O must be driven through the
//! application-supplied chain adapter... responsible for timeouts and
//! retries"); `JsonRpcChainAdapter` is a concrete implementation over
//! `reqwest`, grounded on `ouro_sdk::client::OuroClient`.

use crate::encoding::{address_from_word, encode_hex, Address};
use crate::error::{EngineError, Result};
use crate::events::LogEntry;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

/// Everything the engine needs from the chain: reads, an eth_call for
/// the remote verifier fallback, and signed submission. Object-safe via
/// `async_trait` so operators can hold `Box<dyn ChainAdapter>`.
#[async_trait]
pub trait ChainAdapter: Send + Sync {
    async fn get_transaction_input(&self, tx_id: &str) -> Result<Vec<u8>>;
    async fn get_receipt_logs(&self, tx_id: &str) -> Result<Vec<LogEntry>>;
    async fn eth_call(&self, to: &Address, data: &[u8]) -> Result<[u8; 32]>;
    async fn account_state(&self, user: &Address) -> Result<[u8; 32]>;
    async fn block_timestamp(&self) -> Result<u64>;
    /// Arbiter-side read-only set (spec §6.1), alongside `account_state`
    /// above: bond balance, current locker (zero address if unlocked),
    /// lock timestamp (zero if unlocked), and the size the account was
    /// last rolled back to (zero if never rolled back).
    async fn balance(&self, user: &Address) -> Result<u128>;
    async fn locker(&self, user: &Address) -> Result<Address>;
    async fn locked_timestamp(&self, user: &Address) -> Result<u64>;
    async fn rollback_size(&self, user: &Address) -> Result<u64>;
    /// Submit a signed transaction and return its transaction id once
    /// mined. Key management is out of scope (spec §1); the adapter is
    /// trusted to already hold signing material.
    async fn send_transaction(&self, to: &Address, data: &[u8], value_wei: u128) -> Result<String>;
}

/// Reference `ChainAdapter` over a JSON-RPC endpoint.
pub struct JsonRpcChainAdapter {
    client: reqwest::Client,
    rpc_url: String,
}

impl JsonRpcChainAdapter {
    pub fn new(rpc_url: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), rpc_url: rpc_url.into() }
    }

    async fn call(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value> {
        #[derive(Deserialize)]
        struct RpcResponse {
            result: Option<serde_json::Value>,
            error: Option<RpcError>,
        }
        #[derive(Deserialize)]
        struct RpcError {
            message: String,
        }

        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let resp: RpcResponse = self.client.post(&self.rpc_url).json(&body).send().await?.json().await?;
        if let Some(err) = resp.error {
            return Err(EngineError::ChainError(err.message));
        }
        resp.result.ok_or_else(|| EngineError::ChainError("missing result in rpc response".into()))
    }
}

#[async_trait]
impl ChainAdapter for JsonRpcChainAdapter {
    async fn get_transaction_input(&self, tx_id: &str) -> Result<Vec<u8>> {
        let result = self.call("eth_getTransactionByHash", json!([tx_id])).await?;
        let input = result
            .get("input")
            .and_then(|v| v.as_str())
            .ok_or_else(|| EngineError::ChainError("transaction missing input field".into()))?;
        crate::encoding::decode_hex(input)
    }

    async fn get_receipt_logs(&self, tx_id: &str) -> Result<Vec<LogEntry>> {
        let result = self.call("eth_getTransactionReceipt", json!([tx_id])).await?;
        let logs = result
            .get("logs")
            .and_then(|v| v.as_array())
            .ok_or_else(|| EngineError::ChainError("receipt missing logs field".into()))?;
        let mut out = Vec::with_capacity(logs.len());
        for log in logs {
            let topics: Vec<[u8; 32]> = log
                .get("topics")
                .and_then(|v| v.as_array())
                .ok_or_else(|| EngineError::ChainError("log missing topics".into()))?
                .iter()
                .map(|t| {
                    let s = t.as_str().ok_or_else(|| EngineError::ChainError("topic not a string".into()))?;
                    crate::encoding::word_from_slice(&crate::encoding::decode_hex(s)?)
                })
                .collect::<Result<_>>()?;
            let data = log
                .get("data")
                .and_then(|v| v.as_str())
                .map(crate::encoding::decode_hex)
                .transpose()?
                .unwrap_or_default();
            out.push(LogEntry { topics, data });
        }
        Ok(out)
    }

    async fn eth_call(&self, to: &Address, data: &[u8]) -> Result<[u8; 32]> {
        let result = self
            .call("eth_call", json!([{"to": encode_hex(to), "data": encode_hex(data)}, "latest"]))
            .await?;
        let hex_str = result.as_str().ok_or_else(|| EngineError::ChainError("eth_call result not a string".into()))?;
        crate::encoding::word_from_slice(&crate::encoding::decode_hex(hex_str)?)
    }

    async fn account_state(&self, user: &Address) -> Result<[u8; 32]> {
        let result = self.call("eth_getStorageAt", json!([encode_hex(user), "0x0", "latest"])).await?;
        let hex_str = result.as_str().ok_or_else(|| EngineError::ChainError("storage result not a string".into()))?;
        crate::encoding::word_from_slice(&crate::encoding::decode_hex(hex_str)?)
    }

    async fn block_timestamp(&self) -> Result<u64> {
        let result = self.call("eth_getBlockByNumber", json!(["latest", false])).await?;
        let hex_str = result
            .get("timestamp")
            .and_then(|v| v.as_str())
            .ok_or_else(|| EngineError::ChainError("block missing timestamp".into()))?;
        let bytes = crate::encoding::decode_hex(hex_str)?;
        let mut padded = [0u8; 32];
        padded[32 - bytes.len()..].copy_from_slice(&bytes);
        crate::encoding::u64_from_u256_be(&padded)
    }

    async fn balance(&self, user: &Address) -> Result<u128> {
        let result = self.call("eth_getStorageAt", json!([encode_hex(user), "0x1", "latest"])).await?;
        let hex_str = result.as_str().ok_or_else(|| EngineError::ChainError("storage result not a string".into()))?;
        let word = crate::encoding::word_from_slice(&crate::encoding::decode_hex(hex_str)?)?;
        Ok(u128::from_be_bytes(word[16..].try_into().unwrap()))
    }

    async fn locker(&self, user: &Address) -> Result<Address> {
        let result = self.call("eth_getStorageAt", json!([encode_hex(user), "0x2", "latest"])).await?;
        let hex_str = result.as_str().ok_or_else(|| EngineError::ChainError("storage result not a string".into()))?;
        let word = crate::encoding::word_from_slice(&crate::encoding::decode_hex(hex_str)?)?;
        Ok(address_from_word(&word))
    }

    async fn locked_timestamp(&self, user: &Address) -> Result<u64> {
        let result = self.call("eth_getStorageAt", json!([encode_hex(user), "0x3", "latest"])).await?;
        let hex_str = result.as_str().ok_or_else(|| EngineError::ChainError("storage result not a string".into()))?;
        let word = crate::encoding::word_from_slice(&crate::encoding::decode_hex(hex_str)?)?;
        crate::encoding::u64_from_u256_be(&word)
    }

    async fn rollback_size(&self, user: &Address) -> Result<u64> {
        let result = self.call("eth_getStorageAt", json!([encode_hex(user), "0x4", "latest"])).await?;
        let hex_str = result.as_str().ok_or_else(|| EngineError::ChainError("storage result not a string".into()))?;
        let word = crate::encoding::word_from_slice(&crate::encoding::decode_hex(hex_str)?)?;
        crate::encoding::u64_from_u256_be(&word)
    }

    async fn send_transaction(&self, to: &Address, data: &[u8], value_wei: u128) -> Result<String> {
        let result = self
            .call(
                "eth_sendTransaction",
                json!([{"to": encode_hex(to), "data": encode_hex(data), "value": format!("0x{value_wei:x}")}]),
            )
            .await?;
        result
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| EngineError::ChainError("send_transaction result not a string".into()))
    }
}
