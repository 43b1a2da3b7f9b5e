//! `IntentDiscovery` (spec.md §4.7 first half): polls source-ledger
//! partitions for blocks, filters entries for the protocol marker, and
//! parses the four canonical JSON blobs into a typed `Intent`.

use certen_client::LedgerClient;
use certen_crypto::hash::CERTEN_INTENT_MARKER;
use certen_types::error::DiscoveryError;
use certen_types::model::{Intent, ProofClass};
use serde_json::Value;

/// One block-number window to scan on one partition.
#[derive(Debug, Clone)]
pub struct ScanRange {
    pub partition_url: String,
    pub start_block: u64,
    pub end_block: u64,
}

/// Polls partitions for blocks and yields the intents found within them.
pub struct IntentDiscovery<C> {
    client: C,
}

/// The two structural shapes the source ledger uses for transaction
/// placement; both must be probed (§9 design note — never plumb dynamic
/// maps through the core beyond this single parse boundary).
enum TxPayload<'a> {
    Direct(&'a Value),
    Wrapped(&'a Value),
}

fn extract_tx_payload(entry: &Value) -> Option<TxPayload<'_>> {
    if let Some(v) = entry.pointer("/value/message/transaction") {
        return Some(TxPayload::Wrapped(v));
    }
    if let Some(v) = entry.pointer("/value/transaction") {
        return Some(TxPayload::Direct(v));
    }
    None
}

/// True if `CERTEN_INTENT` appears as any object value anywhere in the
/// payload tree (§9 open question a: relaxed by design, not guessed stricter).
fn contains_intent_marker(value: &Value) -> bool {
    match value {
        Value::String(s) => s == CERTEN_INTENT_MARKER,
        Value::Array(items) => items.iter().any(contains_intent_marker),
        Value::Object(map) => map.values().any(contains_intent_marker),
        _ => false,
    }
}

/// Derives the organization ADI (authority/namespace root, e.g.
/// `acc://demo.acme`) from a full account URL (e.g. `acc://demo.acme/tokens`),
/// per §3's distinction between `organizationADI` and `accountURL`.
fn authority_of(account_url: &str) -> String {
    let without_scheme = account_url.strip_prefix("acc://").unwrap_or(account_url);
    let authority = without_scheme.split('/').next().unwrap_or(without_scheme);
    format!("acc://{authority}")
}

fn parse_intent_from_payload(tx: &Value) -> Option<Intent> {
    let body = tx.get("body")?;
    let intent_data = body.get("intentData")?.clone();
    let cross_chain_data = body.get("crossChainData")?.clone();
    let governance_data = body.get("governanceData").cloned().unwrap_or(Value::Null);
    let replay_data = body.get("replayData").cloned().unwrap_or(Value::Null);

    let source_tx_hash_hex = tx.get("hash")?.as_str()?;
    let source_tx_hash: [u8; 32] = hex::decode(source_tx_hash_hex.trim_start_matches("0x"))
        .ok()?
        .try_into()
        .ok()?;

    let intent_id_hex = intent_data.get("intentId").and_then(Value::as_str)?;
    let intent_id: [u8; 32] = hex::decode(intent_id_hex.trim_start_matches("0x"))
        .ok()?
        .try_into()
        .ok()?;

    let account_url = tx
        .pointer("/header/principal")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let organization_adi = authority_of(&account_url);

    let proof_class = match intent_data.get("proofClass").and_then(Value::as_str) {
        Some("on_demand") => ProofClass::OnDemand,
        _ => ProofClass::OnCadence,
    };

    Some(Intent {
        intent_id,
        source_tx_hash,
        intent_data,
        cross_chain_data,
        governance_data,
        replay_data,
        organization_adi,
        account_url,
        proof_class,
    })
}

impl<C: LedgerClient> IntentDiscovery<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    /// Scans one block range on one partition, returning every intent found.
    /// Parse failures on individual entries are dropped silently with a
    /// diagnostic log, per §4.7 — false positives on the marker filter are
    /// harmless.
    pub async fn scan(&self, range: &ScanRange) -> Result<Vec<Intent>, DiscoveryError> {
        let mut found = Vec::new();
        for block_number in range.start_block..=range.end_block {
            let block = self
                .client
                .query_block(&range.partition_url, block_number, true, None)
                .await
                .map_err(|e| DiscoveryError::PartitionQueryFailed(e.to_string()))?;

            let entries = block
                .pointer("/result/entries")
                .or_else(|| block.pointer("/entries"))
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();

            for entry in &entries {
                let payload = match extract_tx_payload(entry) {
                    Some(p) => p,
                    None => continue,
                };
                let tx = match payload {
                    TxPayload::Direct(v) | TxPayload::Wrapped(v) => v,
                };
                if !contains_intent_marker(tx) {
                    continue;
                }
                match parse_intent_from_payload(tx) {
                    Some(intent) => found.push(intent),
                    None => {
                        tracing::debug!(
                            target = "certen_core",
                            partition = %range.partition_url,
                            block_number,
                            "dropped entry carrying the intent marker that failed to parse"
                        );
                    }
                }
            }
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use certen_client::{EntryRange, LedgerTxStatus};
    use certen_types::error::ClientError;

    struct FakeLedger {
        block: Value,
    }

    #[async_trait]
    impl LedgerClient for FakeLedger {
        async fn query_block(
            &self,
            _partition_url: &str,
            _block_number: u64,
            _expand: bool,
            _entry_range: Option<EntryRange>,
        ) -> Result<Value, ClientError> {
            Ok(self.block.clone())
        }
        async fn query_account(&self, _url: &str) -> Result<Value, ClientError> {
            unimplemented!()
        }
        async fn query_chain(&self, _url: &str, _chain_name: &str, _include_receipt: bool) -> Result<Value, ClientError> {
            unimplemented!()
        }
        async fn get_signer_nonce(&self, _signer_url: &str) -> Result<u64, ClientError> {
            unimplemented!()
        }
        async fn get_credit_balance(&self, _signer_url: &str) -> Result<u64, ClientError> {
            unimplemented!()
        }
        async fn submit_envelope(&self, _envelope_json: Value) -> Result<String, ClientError> {
            unimplemented!()
        }
        async fn get_transaction_status(&self, _tx_hash: &str) -> Result<LedgerTxStatus, ClientError> {
            unimplemented!()
        }
    }

    fn sample_block(shape_wrapped: bool) -> Value {
        let tx_hash = "01".repeat(32);
        let intent_id = "02".repeat(32);
        let tx = serde_json::json!({
            "hash": tx_hash,
            "header": { "principal": "acc://demo.acme/tokens" },
            "body": {
                "intentData": { "intentId": intent_id, "marker": "CERTEN_INTENT", "proofClass": "on_demand" },
                "crossChainData": { "legs": [] },
            }
        });
        let wrapped = if shape_wrapped {
            serde_json::json!({ "value": { "message": { "transaction": tx } } })
        } else {
            serde_json::json!({ "value": { "transaction": tx } })
        };
        serde_json::json!({ "result": { "entries": [wrapped] } })
    }

    #[tokio::test]
    async fn probes_both_transaction_shapes() {
        for wrapped in [true, false] {
            let discovery = IntentDiscovery::new(FakeLedger { block: sample_block(wrapped) });
            let range = ScanRange {
                partition_url: "acc://bvn0.acme".into(),
                start_block: 10,
                end_block: 10,
            };
            let found = discovery.scan(&range).await.unwrap();
            assert_eq!(found.len(), 1, "shape wrapped={wrapped}");
        }
    }

    #[tokio::test]
    async fn entries_without_marker_are_skipped() {
        let mut block = sample_block(false);
        block["result"]["entries"][0]["value"]["transaction"]["body"]["intentData"]["marker"] =
            Value::String("not-the-marker".into());
        let discovery = IntentDiscovery::new(FakeLedger { block });
        let range = ScanRange {
            partition_url: "acc://bvn0.acme".into(),
            start_block: 10,
            end_block: 10,
        };
        let found = discovery.scan(&range).await.unwrap();
        assert!(found.is_empty());
    }
}
