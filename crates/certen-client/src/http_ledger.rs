//! `HttpLedgerClient`: a `reqwest`-based `LedgerClient`, following the
//! polling/backoff/defensive-decoding style of the teacher's relayer gateway
//! client. This is a reference implementation; callers may swap in any other
//! `LedgerClient`.

use crate::traits::{EntryRange, LedgerClient, LedgerTxStatus};
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

/// A source-ledger JSON-RPC client, posting to a single `{base}/v2` endpoint
/// with a `method`/`params` envelope, matching the ledger's query API.
#[derive(Clone)]
pub struct HttpLedgerClient {
    base: String,
    client: Client,
}

impl HttpLedgerClient {
    pub fn new(base: String) -> Self {
        Self {
            base,
            client: Client::new(),
        }
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, ClientError> {
        let url = format!("{}/v2", self.base);
        let body = json!({ "method": method, "params": params });
        let start = std::time::Instant::now();

        let mut attempt = 0;
        let result = loop {
            let resp = self.client.post(&url).json(&body).send().await;
            let resp = match resp {
                Ok(r) => r,
                Err(e) => {
                    if attempt < HTTP_RETRIES {
                        tracing::debug!(target = "certen_client", method, attempt, error = %e, "ledger send error, retrying");
                        sleep(retry_delay(attempt)).await;
                        attempt += 1;
                        continue;
                    }
                    break Err(ClientError::Transport {
                        endpoint: url.clone(),
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
                    endpoint: url.clone(),
                    source: format!("HTTP {} after {} retries", status.as_u16(), HTTP_RETRIES),
                });
            }
            if status == StatusCode::NOT_FOUND {
                break Err(ClientError::NotFound(format!("{method} {params}")));
            }
            if !status.is_success() {
                let text = resp.text().await.unwrap_or_default();
                break Err(ClientError::Transport {
                    endpoint: url.clone(),
                    source: format!("HTTP {}: {}", status.as_u16(), text),
                });
            }

            break resp.json::<Value>().await.map_err(|e| ClientError::Decode {
                endpoint: url.clone(),
                source: e.to_string(),
            });
        };

        let outcome = if result.is_ok() { "success" } else { "error" };
        certen_telemetry::rpc_metrics().observe_request_duration("ledger", method, start.elapsed().as_secs_f64());
        certen_telemetry::rpc_metrics().inc_requests_total("ledger", method, outcome);
        if let Err(e) = &result {
            certen_telemetry::error_metrics().inc_error("client", e.code());
        }
        result
    }
}

#[async_trait]
impl LedgerClient for HttpLedgerClient {
    async fn query_block(
        &self,
        partition_url: &str,
        block_number: u64,
        expand: bool,
        entry_range: Option<EntryRange>,
    ) -> Result<Value, ClientError> {
        let mut params = json!({
            "partition": partition_url,
            "block": block_number,
            "expand": expand,
        });
        if let Some(range) = entry_range {
            params["entryRange"] = json!({ "start": range.start, "count": range.count });
        }
        self.call("query-block", params).await
    }

    async fn query_account(&self, url: &str) -> Result<Value, ClientError> {
        self.call("query", json!({ "url": url })).await
    }

    async fn query_chain(
        &self,
        url: &str,
        chain_name: &str,
        include_receipt: bool,
    ) -> Result<Value, ClientError> {
        self.call(
            "query-chain",
            json!({ "url": url, "chain": chain_name, "includeReceipt": include_receipt }),
        )
        .await
    }

    async fn get_signer_nonce(&self, signer_url: &str) -> Result<u64, ClientError> {
        let v = self.query_account(signer_url).await?;
        v.get("data")
            .and_then(|d| d.get("nonce"))
            .and_then(Value::as_u64)
            .ok_or_else(|| ClientError::Decode {
                endpoint: signer_url.to_string(),
                source: "missing data.nonce field".into(),
            })
    }

    async fn get_credit_balance(&self, signer_url: &str) -> Result<u64, ClientError> {
        let v = self.query_account(signer_url).await?;
        v.get("data")
            .and_then(|d| d.get("creditBalance"))
            .and_then(Value::as_u64)
            .ok_or_else(|| ClientError::Decode {
                endpoint: signer_url.to_string(),
                source: "missing data.creditBalance field".into(),
            })
    }

    async fn submit_envelope(&self, envelope_json: Value) -> Result<String, ClientError> {
        let v = self.call("execute", envelope_json).await?;
        v.get("txid")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ClientError::Decode {
                endpoint: format!("{}/v2", self.base),
                source: "missing txid field in submit response".into(),
            })
    }

    async fn get_transaction_status(&self, tx_hash: &str) -> Result<LedgerTxStatus, ClientError> {
        let v = self.call("query-tx", json!({ "txid": tx_hash })).await?;
        let status = v
            .get("status")
            .and_then(|s| s.get("delivered"))
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let failed = v
            .get("status")
            .and_then(|s| s.get("failed"))
            .and_then(Value::as_bool)
            .unwrap_or(false);
        Ok(if failed {
            LedgerTxStatus::Failed
        } else if status {
            LedgerTxStatus::Delivered
        } else {
            LedgerTxStatus::Pending
        })
    }
}
