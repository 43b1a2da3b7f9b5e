//! `SyntheticTxBuilder` and `WriteBackSubmitter` (spec.md §4.5): build the
//! fixed 51-field write-back payload and submit it to the source ledger
//! under nonce and credit discipline.

use certen_client::LedgerClient;
use certen_crypto::hash::sha256;
use certen_crypto::sign::eddsa::Ed25519KeyPair;
use certen_types::error::WriteBackError;
use certen_types::model::{
    AggregatedAttestation, ExecutionCommitment, ExternalChainResult, GovernanceLevel, Intent,
};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tokio::time::sleep;

/// The fixed, positional order of the ~51 write-back fields (§4.5). Every
/// position has a documented semantic meaning; unknown optionals are the
/// empty string, never omitted.
pub const FIELD_ORDER: [&str; 51] = [
    // entry identification (3)
    "entry_type",
    "entry_version",
    "entry_id",
    // intent reference (4)
    "intent_id",
    "intent_tx_hash",
    "organization_adi",
    "account_url",
    // execution commitment summary (6)
    "bundle_id",
    "operation_id",
    "target_chain",
    "chain_id",
    "commitment_hash",
    "final_target",
    // 3-step transaction details (9)
    "step1_tx_hash",
    "step1_status",
    "step1_gas_used",
    "step2_tx_hash",
    "step2_status",
    "step2_gas_used",
    "step3_tx_hash",
    "step3_status",
    "step3_gas_used",
    // observed execution result (8)
    "step1_block_number",
    "step1_block_hash",
    "step2_block_number",
    "step2_block_hash",
    "step3_block_number",
    "step3_block_hash",
    "confirmation_blocks",
    "all_txs_confirmed",
    // event verification (4)
    "anchor_created_observed",
    "proof_verified_observed",
    "governance_executed_observed",
    "events_matched",
    // state binding roots (3)
    "state_root",
    "receipts_root",
    "transactions_root",
    // governance proof reference (4)
    "governance_level",
    "governance_proof_hash",
    "g1_authority_validated",
    "g2_outcome_bound",
    // audit linkage (4)
    "proof_artifact_id",
    "anchor_proof_hash",
    "previous_result_hash",
    "sequence_number",
    // result hashes (3)
    "step1_result_hash",
    "step2_result_hash",
    "step3_result_hash",
    // finalization metadata (3)
    "threshold_met",
    "signed_voting_power",
    "write_back_submitted_at",
];

fn bool_str(b: bool) -> String {
    if b { "true".into() } else { "false".into() }
}

fn hex_or_empty(bytes: Option<&[u8]>) -> String {
    bytes.map(hex::encode).unwrap_or_default()
}

/// Builds the canonical write-back fields for one completed cycle.
pub struct SyntheticTxBuilder;

impl SyntheticTxBuilder {
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        intent: &Intent,
        commitment: &ExecutionCommitment,
        step_results: &[Option<ExternalChainResult>; 3],
        attestation: Option<&AggregatedAttestation>,
        governance_level: GovernanceLevel,
        governance_proof_hash: [u8; 32],
        proof_artifact_id: uuid::Uuid,
        anchor_proof_hash: [u8; 32],
        previous_result_hash: [u8; 32],
        sequence_number: u64,
        submitted_at: i64,
    ) -> BTreeMap<&'static str, String> {
        let mut f: BTreeMap<&'static str, String> = BTreeMap::new();
        f.insert("entry_type", "certen_writeback_v1".into());
        f.insert("entry_version", "1".into());
        f.insert("entry_id", hex::encode(proof_artifact_id.as_bytes()));

        f.insert("intent_id", hex::encode(intent.intent_id));
        f.insert("intent_tx_hash", hex::encode(intent.source_tx_hash));
        f.insert("organization_adi", intent.organization_adi.clone());
        f.insert("account_url", intent.account_url.clone());

        f.insert("bundle_id", hex::encode(commitment.bundle_id));
        f.insert("operation_id", hex::encode(commitment.operation_id));
        f.insert("target_chain", commitment.target_chain.clone());
        f.insert("chain_id", commitment.chain_id.to_string());
        f.insert("commitment_hash", hex::encode(commitment.commitment_hash));
        f.insert("final_target", hex::encode(commitment.final_target));

        let mut all_confirmed = true;
        let mut confirmation_blocks = 0u64;
        let mut anchor_created_observed = false;
        let mut proof_verified_observed = false;
        let mut governance_executed_observed = false;
        let mut state_root = String::new();
        let mut receipts_root = String::new();
        let mut transactions_root = String::new();

        for (i, step) in step_results.iter().enumerate() {
            let n = i + 1;
            match step {
                Some(r) => {
                    f.insert(step_key(n, "tx_hash"), hex::encode(r.tx_hash));
                    f.insert(
                        step_key(n, "status"),
                        match r.status {
                            certen_types::model::TxStatus::Success => "success".into(),
                            certen_types::model::TxStatus::Failed => "failed".into(),
                        },
                    );
                    f.insert(step_key(n, "gas_used"), r.tx_gas_used.to_string());
                    f.insert(step_key(n, "block_number"), r.block_number.to_string());
                    f.insert(step_key(n, "block_hash"), hex::encode(r.block_hash));
                    f.insert(step_key(n, "result_hash"), hex::encode(r.result_hash));
                    confirmation_blocks = confirmation_blocks.max(r.confirmation_blocks);
                    state_root = hex::encode(r.state_root);
                    receipts_root = hex::encode(r.receipts_root);
                    transactions_root = hex::encode(r.transactions_root);
                    if i == 0 {
                        anchor_created_observed =
                            r.logs.iter().any(|l| l.contract == commitment.create.target_contract);
                    }
                    if i == 1 {
                        proof_verified_observed = r
                            .logs
                            .iter()
                            .any(|l| l.contract == commitment.verify_proof.target_contract);
                    }
                    if i == 2 {
                        governance_executed_observed = r.logs.iter().any(|l| {
                            l.contract == commitment.execute_with_governance.target_contract
                        });
                    }
                }
                None => {
                    for field in ["tx_hash", "status", "gas_used", "block_number", "block_hash", "result_hash"] {
                        f.insert(step_key(n, field), String::new());
                    }
                    all_confirmed = false;
                }
            }
        }

        f.insert("confirmation_blocks", confirmation_blocks.to_string());
        f.insert("all_txs_confirmed", bool_str(all_confirmed));
        f.insert("anchor_created_observed", bool_str(anchor_created_observed));
        f.insert("proof_verified_observed", bool_str(proof_verified_observed));
        f.insert(
            "governance_executed_observed",
            bool_str(governance_executed_observed),
        );
        f.insert(
            "events_matched",
            bool_str(anchor_created_observed && proof_verified_observed && governance_executed_observed),
        );

        f.insert("state_root", state_root);
        f.insert("receipts_root", receipts_root);
        f.insert("transactions_root", transactions_root);

        f.insert(
            "governance_level",
            match governance_level {
                GovernanceLevel::G0 => "g0",
                GovernanceLevel::G1 => "g1",
                GovernanceLevel::G2 => "g2",
            }
            .into(),
        );
        f.insert("governance_proof_hash", hex::encode(governance_proof_hash));
        f.insert(
            "g1_authority_validated",
            bool_str(matches!(governance_level, GovernanceLevel::G1 | GovernanceLevel::G2)),
        );
        f.insert(
            "g2_outcome_bound",
            bool_str(matches!(governance_level, GovernanceLevel::G2)),
        );

        f.insert("proof_artifact_id", proof_artifact_id.to_string());
        f.insert("anchor_proof_hash", hex::encode(anchor_proof_hash));
        f.insert("previous_result_hash", hex_or_empty(Some(&previous_result_hash)));
        f.insert("sequence_number", sequence_number.to_string());

        f.insert(
            "threshold_met",
            bool_str(attestation.map(|a| a.threshold_met).unwrap_or(false)),
        );
        f.insert(
            "signed_voting_power",
            attestation.map(|a| a.signed_voting_power).unwrap_or(0).to_string(),
        );
        f.insert("write_back_submitted_at", submitted_at.to_string());

        f
    }

    /// Renders fields into the fixed-order `key=value` byte list the
    /// write-back envelope carries.
    pub fn encode(fields: &BTreeMap<&'static str, String>) -> Vec<String> {
        FIELD_ORDER
            .iter()
            .map(|k| format!("{k}={}", fields.get(k).cloned().unwrap_or_default()))
            .collect()
    }

    /// Parses an encoded field list back into a name→value map.
    pub fn decode(lines: &[String]) -> BTreeMap<&'static str, String> {
        let mut out = BTreeMap::new();
        for (line, key) in lines.iter().zip(FIELD_ORDER.iter()) {
            if let Some((_, v)) = line.split_once('=') {
                out.insert(*key, v.to_string());
            }
        }
        out
    }
}

fn step_key(n: usize, field: &str) -> &'static str {
    match (n, field) {
        (1, "tx_hash") => "step1_tx_hash",
        (1, "status") => "step1_status",
        (1, "gas_used") => "step1_gas_used",
        (1, "block_number") => "step1_block_number",
        (1, "block_hash") => "step1_block_hash",
        (1, "result_hash") => "step1_result_hash",
        (2, "tx_hash") => "step2_tx_hash",
        (2, "status") => "step2_status",
        (2, "gas_used") => "step2_gas_used",
        (2, "block_number") => "step2_block_number",
        (2, "block_hash") => "step2_block_hash",
        (2, "result_hash") => "step2_result_hash",
        (3, "tx_hash") => "step3_tx_hash",
        (3, "status") => "step3_status",
        (3, "gas_used") => "step3_gas_used",
        (3, "block_number") => "step3_block_number",
        (3, "block_hash") => "step3_block_hash",
        (3, "result_hash") => "step3_result_hash",
        _ => unreachable!("step index out of range"),
    }
}

const WRITE_DATA_BASE_COST: u64 = 10;
const PER_ENTRY_COST: u64 = 1;
const CREDIT_SAFETY_MARGIN_PCT: u64 = 10;
const NONCE_GC_AGE: Duration = Duration::from_secs(300);
const MAX_RETRIES: usize = 5;
const BASE_BACKOFF: Duration = Duration::from_millis(200);

struct PendingNonce {
    reserved_at: Instant,
    confirmed: bool,
    failed: bool,
}

/// Tracks locally-reserved nonces for one signer, bounded by `max_pending`.
pub struct NonceTracker {
    last_known_chain_nonce: std::sync::Mutex<u64>,
    pending: std::sync::Mutex<BTreeMap<u64, PendingNonce>>,
    max_pending: usize,
}

impl NonceTracker {
    pub fn new(max_pending: usize) -> Self {
        Self {
            last_known_chain_nonce: std::sync::Mutex::new(0),
            pending: std::sync::Mutex::new(BTreeMap::new()),
            max_pending,
        }
    }

    /// Reserves the next free nonce, skipping any already pending locally.
    pub fn reserve(&self, chain_nonce: u64) -> Result<u64, WriteBackError> {
        let mut last_known = self.last_known_chain_nonce.lock().unwrap_or_else(|e| e.into_inner());
        *last_known = chain_nonce.max(*last_known);
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        self.gc_locked(&mut pending);
        if pending.len() >= self.max_pending {
            return Err(WriteBackError::NoncePoolFull(pending.len()));
        }
        let mut candidate = *last_known;
        while pending.contains_key(&candidate) {
            candidate += 1;
        }
        pending.insert(
            candidate,
            PendingNonce {
                reserved_at: Instant::now(),
                confirmed: false,
                failed: false,
            },
        );
        Ok(candidate)
    }

    pub fn mark_confirmed(&self, nonce: u64) {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = pending.get_mut(&nonce) {
            entry.confirmed = true;
        }
        let mut last_known = self.last_known_chain_nonce.lock().unwrap_or_else(|e| e.into_inner());
        *last_known = (*last_known).max(nonce + 1);
    }

    pub fn mark_failed(&self, nonce: u64) {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = pending.get_mut(&nonce) {
            entry.failed = true;
        }
    }

    fn gc_locked(&self, pending: &mut BTreeMap<u64, PendingNonce>) {
        pending.retain(|_, v| {
            let terminal = v.confirmed || v.failed;
            !(terminal && v.reserved_at.elapsed() >= NONCE_GC_AGE)
        });
    }
}

/// Signs and submits the write-back envelope, under nonce and credit
/// discipline, tracking confirmation with retry on transient failure.
pub struct WriteBackSubmitter<C> {
    client: C,
    signer_url: String,
    key_pair: Ed25519KeyPair,
    nonce_tracker: NonceTracker,
}

impl<C: LedgerClient> WriteBackSubmitter<C> {
    pub fn new(client: C, signer_url: String, key_pair: Ed25519KeyPair, nonce_max_pending: usize) -> Self {
        Self {
            client,
            signer_url,
            key_pair,
            nonce_tracker: NonceTracker::new(nonce_max_pending),
        }
    }

    /// Submits the write-back entries, polling until the ledger reports a
    /// terminal status.
    pub async fn submit(&self, fields: &BTreeMap<&'static str, String>) -> Result<String, WriteBackError> {
        let entries = SyntheticTxBuilder::encode(fields);

        let chain_nonce = self
            .client
            .get_signer_nonce(&self.signer_url)
            .await
            .map_err(|e| WriteBackError::SubmissionFailed(e.to_string()))?;
        let nonce = self.nonce_tracker.reserve(chain_nonce)?;

        let credit_balance = self
            .client
            .get_credit_balance(&self.signer_url)
            .await
            .map_err(|e| WriteBackError::SubmissionFailed(e.to_string()))?;
        let required = (WRITE_DATA_BASE_COST + PER_ENTRY_COST * entries.len() as u64)
            * (100 + CREDIT_SAFETY_MARGIN_PCT)
            / 100;
        if credit_balance < required {
            self.nonce_tracker.mark_failed(nonce);
            return Err(WriteBackError::InsufficientCredits {
                have: credit_balance,
                need: required,
            });
        }

        let envelope = self.build_envelope(&entries, nonce)?;

        let mut attempt = 0;
        let tx_id = loop {
            match self.client.submit_envelope(envelope.clone()).await {
                Ok(id) => break id,
                Err(e) if attempt < MAX_RETRIES => {
                    tracing::warn!(target = "certen_core", attempt, error = %e, "write-back submission failed, retrying");
                    sleep(BASE_BACKOFF * 2u32.pow(attempt as u32)).await;
                    attempt += 1;
                }
                Err(e) => {
                    self.nonce_tracker.mark_failed(nonce);
                    return Err(WriteBackError::SubmissionFailed(e.to_string()));
                }
            }
        };

        self.poll_confirmation(&tx_id, nonce).await?;
        Ok(tx_id)
    }

    fn build_envelope(
        &self,
        entries: &[String],
        nonce: u64,
    ) -> Result<serde_json::Value, WriteBackError> {
        let entry_bytes: Vec<u8> = entries.join("\n").into_bytes();
        let public_key_bytes = self.key_pair.public_key().to_bytes();
        let nonce_bytes = nonce.to_be_bytes();
        let principal_bytes = self.signer_url.as_bytes();
        let signature_metadata_hash = sha256(
            [public_key_bytes.as_slice(), nonce_bytes.as_slice(), principal_bytes].concat(),
        )
        .map_err(|e| WriteBackError::SigningFailed(e.to_string()))?;

        let body_hash = sha256(&entry_bytes).map_err(|e| WriteBackError::SigningFailed(e.to_string()))?;
        let transaction_hash = sha256(
            [signature_metadata_hash.as_slice(), body_hash.as_slice()].concat(),
        )
        .map_err(|e| WriteBackError::SigningFailed(e.to_string()))?;

        // §4.5/§6: the signed hash is one layer outer than the transaction
        // hash itself, binding the metadata hash a second time over the top.
        let signing_hash = sha256(
            [signature_metadata_hash.as_slice(), transaction_hash.as_slice()].concat(),
        )
        .map_err(|e| WriteBackError::SigningFailed(e.to_string()))?;

        let signature = self
            .key_pair
            .sign(&signing_hash)
            .map_err(|e| WriteBackError::SigningFailed(e.to_string()))?;

        Ok(serde_json::json!({
            "envelope": {
                "transaction": [{
                    "header": {
                        "principal": self.signer_url,
                        "nonce": nonce,
                        "initiator": hex::encode(signature_metadata_hash),
                    },
                    "body": {
                        "type": "writeData",
                        "entry": {
                            "type": "doubleHash",
                            "data": entries,
                        },
                    },
                    "hash": hex::encode(transaction_hash),
                }],
                "signatures": [{
                    "type": "ed25519",
                    "publicKey": hex::encode(self.key_pair.public_key().to_bytes()),
                    "signature": hex::encode(signature.to_bytes()),
                }],
            }
        }))
    }

    async fn poll_confirmation(&self, tx_id: &str, nonce: u64) -> Result<(), WriteBackError> {
        use certen_client::LedgerTxStatus;
        let deadline = Instant::now() + Duration::from_secs(120);
        loop {
            match self
                .client
                .get_transaction_status(tx_id)
                .await
                .map_err(|e| WriteBackError::SubmissionFailed(e.to_string()))?
            {
                LedgerTxStatus::Delivered => {
                    self.nonce_tracker.mark_confirmed(nonce);
                    return Ok(());
                }
                LedgerTxStatus::Failed => {
                    self.nonce_tracker.mark_failed(nonce);
                    return Err(WriteBackError::SubmissionFailed(format!(
                        "write-back tx {tx_id} failed"
                    )));
                }
                LedgerTxStatus::Pending => {
                    if Instant::now() >= deadline {
                        return Err(WriteBackError::ConfirmationTimeout(tx_id.to_string()));
                    }
                    sleep(Duration::from_secs(2)).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_order_encodes_and_decodes_round_trip() {
        let mut fields = BTreeMap::new();
        fields.insert("entry_type", "certen_writeback_v1".to_string());
        fields.insert("sequence_number", "42".to_string());

        let encoded = SyntheticTxBuilder::encode(&fields);
        assert_eq!(encoded.len(), 51);
        assert_eq!(encoded[0], "entry_type=certen_writeback_v1");

        let decoded = SyntheticTxBuilder::decode(&encoded);
        assert_eq!(decoded.get("entry_type"), Some(&"certen_writeback_v1".to_string()));
        assert_eq!(decoded.get("sequence_number"), Some(&"42".to_string()));
        assert_eq!(decoded.get("intent_id"), Some(&String::new()));
    }

    #[test]
    fn nonce_tracker_skips_pending_and_rejects_when_full() {
        let tracker = NonceTracker::new(2);
        let n1 = tracker.reserve(5).unwrap();
        let n2 = tracker.reserve(5).unwrap();
        assert_ne!(n1, n2);
        let err = tracker.reserve(5).unwrap_err();
        assert!(matches!(err, WriteBackError::NoncePoolFull(2)));
    }
}
