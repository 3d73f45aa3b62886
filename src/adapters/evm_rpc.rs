//! EVM JSON-RPC chain client
//!
//! Pulls blocks, logs and sampled balances over plain HTTP JSON-RPC. Stays
//! `confirmations` blocks behind the head so reorged data is never evaluated.

use alloy::primitives::{Address, B256, U256};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, instrument};

use crate::config::ChainConfig;
use crate::domain::{Block, ChainTarget, Cursor, DataBatch, FetchRequest, Log, Transaction};
use crate::error::{Result, VigilError};

use super::chain_client::ChainClient;

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: JsonValue,
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<JsonValue>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcBlock {
    number: String,
    hash: String,
    timestamp: String,
    #[serde(default)]
    transactions: Vec<RpcTransaction>,
}

#[derive(Deserialize)]
struct RpcTransaction {
    hash: String,
    from: String,
    #[serde(default)]
    to: Option<String>,
    value: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcLog {
    address: String,
    #[serde(default)]
    topics: Vec<String>,
    #[serde(default)]
    data: String,
    block_number: String,
    transaction_hash: String,
    log_index: String,
}

/// JSON-RPC client for one EVM chain
pub struct EvmRpcClient {
    client: Client,
    target: ChainTarget,
    url: String,
    confirmations: u64,
    request_id: AtomicU64,
}

impl EvmRpcClient {
    pub fn new(target: ChainTarget, config: &ChainConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;

        Ok(Self {
            client,
            target,
            url: config.rpc_url.clone(),
            confirmations: config.confirmations,
            request_id: AtomicU64::new(1),
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: JsonValue) -> Result<T> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.request_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await?
            .error_for_status()?;

        let body: RpcResponse = response.json().await?;
        if let Some(error) = body.error {
            return Err(VigilError::Rpc {
                code: error.code,
                message: error.message,
            });
        }

        let result = body.result.unwrap_or(JsonValue::Null);
        if result.is_null() {
            return Err(VigilError::TransientFetch(format!(
                "{} returned null on {}",
                method, self.target
            )));
        }
        Ok(serde_json::from_value(result)?)
    }

    async fn head(&self) -> Result<u64> {
        let raw: String = self.call("eth_blockNumber", json!([])).await?;
        parse_quantity(&raw)
    }

    async fn block(&self, height: u64) -> Result<Block> {
        let raw: RpcBlock = self
            .call("eth_getBlockByNumber", json!([to_quantity(height), true]))
            .await?;

        let mut block = Block::new(parse_quantity(&raw.number)?);
        block.hash = parse_b256(&raw.hash)?;
        block.timestamp = parse_quantity(&raw.timestamp)?;
        block.transactions = raw
            .transactions
            .iter()
            .map(|tx| {
                Ok(Transaction {
                    hash: parse_b256(&tx.hash)?,
                    from: parse_address(&tx.from)?,
                    to: tx.to.as_deref().map(parse_address).transpose()?,
                    value: parse_u256(&tx.value)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(block)
    }

    async fn logs(&self, from: u64, to: u64) -> Result<Vec<(u64, Log)>> {
        let raw: Vec<RpcLog> = self
            .call(
                "eth_getLogs",
                json!([{ "fromBlock": to_quantity(from), "toBlock": to_quantity(to) }]),
            )
            .await?;

        raw.iter()
            .map(|log| {
                let topics = log
                    .topics
                    .iter()
                    .map(|t| parse_b256(t))
                    .collect::<Result<Vec<_>>>()?;
                Ok((
                    parse_quantity(&log.block_number)?,
                    Log {
                        address: parse_address(&log.address)?,
                        topics,
                        data: parse_bytes(&log.data)?,
                        transaction_hash: parse_b256(&log.transaction_hash)?,
                        log_index: parse_quantity(&log.log_index)?,
                    },
                ))
            })
            .collect()
    }

    async fn balance(&self, account: Address, height: u64) -> Result<U256> {
        let raw: String = self
            .call(
                "eth_getBalance",
                json!([account.to_string(), to_quantity(height)]),
            )
            .await?;
        parse_u256(&raw)
    }
}

#[async_trait]
impl ChainClient for EvmRpcClient {
    #[instrument(skip(self), fields(chain = %self.target))]
    async fn latest_height(&self) -> Result<u64> {
        Ok(self.head().await?.saturating_sub(self.confirmations))
    }

    #[instrument(skip(self, request), fields(chain = %self.target, from = %request.from))]
    async fn fetch_since(&self, request: &FetchRequest) -> Result<DataBatch> {
        let safe_head = self.latest_height().await?;
        let from = request.from.height();
        if from > safe_head {
            return Ok(DataBatch::empty(self.target.clone(), request.from));
        }

        let to = safe_head.min(from.saturating_add(request.max_blocks.max(1) - 1));
        debug!("Fetching blocks {}..={} from {}", from, to, self.target);

        let mut blocks = Vec::with_capacity((to - from + 1) as usize);
        for height in from..=to {
            let mut block = self.block(height).await?;
            for account in &request.accounts {
                let balance = self.balance(*account, height).await?;
                block.balances.insert(*account, balance);
            }
            blocks.push(block);
        }

        let mut by_height: HashMap<u64, Vec<Log>> = HashMap::new();
        for (height, log) in self.logs(from, to).await? {
            by_height.entry(height).or_default().push(log);
        }
        for block in &mut blocks {
            if let Some(mut logs) = by_height.remove(&block.number) {
                logs.sort_by_key(|l| l.log_index);
                block.logs = logs;
            }
        }

        Ok(DataBatch::from_blocks(
            self.target.clone(),
            Cursor(from),
            blocks,
        ))
    }
}

fn to_quantity(value: u64) -> String {
    format!("0x{:x}", value)
}

fn malformed(what: &str, raw: &str) -> VigilError {
    VigilError::TransientFetch(format!("malformed {} in RPC response: {}", what, raw))
}

fn parse_quantity(raw: &str) -> Result<u64> {
    let digits = raw.trim_start_matches("0x");
    u64::from_str_radix(digits, 16).map_err(|_| malformed("quantity", raw))
}

fn parse_u256(raw: &str) -> Result<U256> {
    let digits = raw.trim_start_matches("0x");
    if digits.is_empty() {
        return Ok(U256::ZERO);
    }
    U256::from_str_radix(digits, 16).map_err(|_| malformed("quantity", raw))
}

fn parse_address(raw: &str) -> Result<Address> {
    Address::from_str(raw).map_err(|_| malformed("address", raw))
}

fn parse_b256(raw: &str) -> Result<B256> {
    B256::from_str(raw).map_err(|_| malformed("hash", raw))
}

fn parse_bytes(raw: &str) -> Result<Vec<u8>> {
    hex::decode(raw.trim_start_matches("0x")).map_err(|_| malformed("data", raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantity_round_trip() {
        assert_eq!(to_quantity(255), "0xff");
        assert_eq!(parse_quantity("0xff").unwrap(), 255);
        assert_eq!(parse_quantity("0x0").unwrap(), 0);
        assert!(parse_quantity("0xzz").is_err());
    }

    #[test]
    fn test_parse_wei_amounts() {
        assert_eq!(
            parse_u256("0xde0b6b3a7640000").unwrap(),
            U256::from(1_000_000_000_000_000_000u128)
        );
        assert_eq!(parse_u256("0x").unwrap(), U256::ZERO);
    }

    #[test]
    fn test_parse_log_payload() {
        let raw: RpcLog = serde_json::from_value(json!({
            "address": "0x00000000000000000000000000000000000000aa",
            "topics": ["0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"],
            "data": "0x01",
            "blockNumber": "0x10",
            "transactionHash": "0x0000000000000000000000000000000000000000000000000000000000000001",
            "logIndex": "0x2"
        }))
        .unwrap();

        assert_eq!(parse_quantity(&raw.block_number).unwrap(), 16);
        assert_eq!(parse_bytes(&raw.data).unwrap(), vec![1u8]);
        assert!(parse_address(&raw.address).is_ok());
        assert!(parse_b256(&raw.topics[0]).is_ok());
    }

    #[test]
    fn test_malformed_payload_is_transient() {
        assert!(parse_address("nope").unwrap_err().is_transient());
    }
}
