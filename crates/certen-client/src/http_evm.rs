//! `HttpEvmClient`: a `reqwest`-based `EvmClient` speaking standard Ethereum
//! JSON-RPC, using the same retry/backoff idiom as `HttpLedgerClient`.

use crate::traits::{EvmBlock, EvmClient, EvmLogEntry, EvmReceipt, EvmTransaction};
use async_trait::async_trait;
use certen_types::error::{ClientError, ErrorCode};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::sleep;

const HTTP_RETRIES: usize = 8;
const BASE_BACKOFF_MS: u64 = 50;

fn retry_delay(attempt: usize) -> Duration {
    Duration::from_millis(BASE_BACKOFF_MS.saturating_mul(1u64 << attempt).min(5_000))
}

fn parse_hex_u64(v: &Value) -> Option<u64> {
    u64::from_str_radix(v.as_str()?.trim_start_matches("0x"), 16).ok()
}

fn parse_hex_u128(v: &Value) -> Option<u128> {
    u128::from_str_radix(v.as_str()?.trim_start_matches("0x"), 16).ok()
}

fn parse_hex_bytes(v: &Value) -> Option<Vec<u8>> {
    hex::decode(v.as_str()?.trim_start_matches("0x")).ok()
}

fn parse_hex_32(v: &Value) -> Option<[u8; 32]> {
    let bytes = parse_hex_bytes(v)?;
    bytes.try_into().ok()
}

fn parse_hex_20(v: &Value) -> Option<[u8; 20]> {
    let bytes = parse_hex_bytes(v)?;
    bytes.try_into().ok()
}

/// A standard Ethereum JSON-RPC client over a single HTTP endpoint.
#[derive(Clone)]
pub struct HttpEvmClient {
    rpc_url: String,
    client: Client,
}

impl HttpEvmClient {
    pub fn new(rpc_url: String) -> Self {
        Self {
            rpc_url,
            client: Client::new(),
        }
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, ClientError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let start = std::time::Instant::now();

        let mut attempt = 0;
        let result = loop {
            let resp = self.client.post(&self.rpc_url).json(&body).send().await;
            let resp = match resp {
                Ok(r) => r,
                Err(e) => {
                    if attempt < HTTP_RETRIES {
                        tracing::debug!(target = "certen_client", method, attempt, error = %e, "evm rpc send error, retrying");
                        sleep(retry_delay(attempt)).await;
                        attempt += 1;
                        continue;
                    }
                    break Err(ClientError::Transport {
                        endpoint: self.rpc_url.clone(),
                        source: e.to_string(),
                    });
                }
            };

            let status = resp.status();
            if status.as_u16() == 429 || status.is_server_error() {
                if attempt < HTTP_RETRIES {
                    sleep(retry_delay(attempt)).await;
                    attempt += 1;
                    continue;
                }
                break Err(ClientError::Transport {
                    endpoint: self.rpc_url.clone(),
                    source: format!("HTTP {} after {} retries", status.as_u16(), HTTP_RETRIES),
                });
            }
            if status == StatusCode::NOT_FOUND {
                break Err(ClientError::NotFound(method.to_string()));
            }
            if !status.is_success() {
                let text = resp.text().await.unwrap_or_default();
                break Err(ClientError::Transport {
                    endpoint: self.rpc_url.clone(),
                    source: format!("HTTP {}: {}", status.as_u16(), text),
                });
            }

            let parsed: Result<Value, ClientError> = async {
                let v: Value = resp.json().await.map_err(|e| ClientError::Decode {
                    endpoint: self.rpc_url.clone(),
                    source: e.to_string(),
                })?;
                if let Some(err) = v.get("error") {
                    return Err(ClientError::Decode {
                        endpoint: self.rpc_url.clone(),
                        source: format!("rpc error: {err}"),
                    });
                }
                Ok(v.get("result").cloned().unwrap_or(Value::Null))
            }
            .await;
            break parsed;
        };

        let outcome = if result.is_ok() { "success" } else { "error" };
        certen_telemetry::rpc_metrics().observe_request_duration("evm", method, start.elapsed().as_secs_f64());
        certen_telemetry::rpc_metrics().inc_requests_total("evm", method, outcome);
        if let Err(e) = &result {
            certen_telemetry::error_metrics().inc_error("client", e.code());
        }
        result
    }
}

#[async_trait]
impl EvmClient for HttpEvmClient {
    async fn get_transaction_receipt(
        &self,
        tx_hash: [u8; 32],
    ) -> Result<Option<EvmReceipt>, ClientError> {
        let v = self
            .call(
                "eth_getTransactionReceipt",
                json!([format!("0x{}", hex::encode(tx_hash))]),
            )
            .await?;
        if v.is_null() {
            return Ok(None);
        }
        let logs = v
            .get("logs")
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(|log| {
                        Some(EvmLogEntry {
                            address: parse_hex_20(log.get("address")?)?,
                            topics: log
                                .get("topics")?
                                .as_array()?
                                .iter()
                                .filter_map(parse_hex_32)
                                .collect(),
                            data: parse_hex_bytes(log.get("data")?)?,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(Some(EvmReceipt {
            tx_hash,
            block_number: v
                .get("blockNumber")
                .and_then(parse_hex_u64)
                .ok_or_else(|| ClientError::Decode {
                    endpoint: self.rpc_url.clone(),
                    source: "missing blockNumber".into(),
                })?,
            block_hash: v
                .get("blockHash")
                .and_then(parse_hex_32)
                .ok_or_else(|| ClientError::Decode {
                    endpoint: self.rpc_url.clone(),
                    source: "missing blockHash".into(),
                })?,
            status_success: v
                .get("status")
                .and_then(parse_hex_u64)
                .map(|s| s == 1)
                .unwrap_or(false),
            gas_used: v.get("gasUsed").and_then(parse_hex_u64).unwrap_or(0),
            logs,
        }))
    }

    async fn get_transaction(&self, tx_hash: [u8; 32]) -> Result<Option<EvmTransaction>, ClientError> {
        let v = self
            .call(
                "eth_getTransactionByHash",
                json!([format!("0x{}", hex::encode(tx_hash))]),
            )
            .await?;
        if v.is_null() {
            return Ok(None);
        }
        Ok(Some(EvmTransaction {
            hash: tx_hash,
            to: v.get("to").and_then(parse_hex_20),
            from: v
                .get("from")
                .and_then(parse_hex_20)
                .ok_or_else(|| ClientError::Decode {
                    endpoint: self.rpc_url.clone(),
                    source: "missing from".into(),
                })?,
            value: v.get("value").and_then(parse_hex_u128).unwrap_or(0),
            input: v.get("input").and_then(parse_hex_bytes).unwrap_or_default(),
        }))
    }

    async fn get_block_by_number(&self, number: u64) -> Result<Option<EvmBlock>, ClientError> {
        let v = self
            .call(
                "eth_getBlockByNumber",
                json!([format!("0x{number:x}"), false]),
            )
            .await?;
        if v.is_null() {
            return Ok(None);
        }
        let transaction_hashes = v
            .get("transactions")
            .and_then(Value::as_array)
            .map(|arr| arr.iter().filter_map(parse_hex_32).collect())
            .unwrap_or_default();
        Ok(Some(EvmBlock {
            number,
            hash: v.get("hash").and_then(parse_hex_32).ok_or_else(|| ClientError::Decode {
                endpoint: self.rpc_url.clone(),
                source: "missing hash".into(),
            })?,
            state_root: v.get("stateRoot").and_then(parse_hex_32).unwrap_or([0u8; 32]),
            transactions_root: v
                .get("transactionsRoot")
                .and_then(parse_hex_32)
                .unwrap_or([0u8; 32]),
            receipts_root: v
                .get("receiptsRoot")
                .and_then(parse_hex_32)
                .unwrap_or([0u8; 32]),
            transaction_hashes,
        }))
    }

    async fn get_block_number(&self) -> Result<u64, ClientError> {
        let v = self.call("eth_blockNumber", json!([])).await?;
        parse_hex_u64(&v).ok_or_else(|| ClientError::Decode {
            endpoint: self.rpc_url.clone(),
            source: "malformed eth_blockNumber response".into(),
        })
    }
}
