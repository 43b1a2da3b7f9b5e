//! Row shapes the core writes to or reads from a relational mapping layer
//! (spec.md §6 "Persistence layer (published shapes)"). These are passive
//! data-transfer structs; this crate owns no migrations or connection pool.

use certen_types::model::{AnchorRecord, BatchStatus, GovernanceLevel, ProofClass};
use serde::{Deserialize, Serialize};

/// Mirrors `ProofCycleCompletion`. Master table, keyed by UUID, indexed by intent tx hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofArtifactRow {
    pub id: uuid::Uuid,
    pub intent_tx_hash: [u8; 32],
    pub bundle_id: [u8; 32],
    /// JSON-encoded `ExternalChainResult` for the `create` step, if observed.
    pub create_result_json: Option<String>,
    /// JSON-encoded `ExternalChainResult` for the `verify_proof` step, if observed.
    pub verify_proof_result_json: Option<String>,
    /// JSON-encoded `ExternalChainResult` for the `execute_with_governance` step, if observed.
    pub execute_result_json: Option<String>,
    /// JSON-encoded `AggregatedAttestation`, once the cycle's threshold is reached.
    pub attestation_summary_json: Option<String>,
    pub write_back_tx_id: Option<String>,
    pub intent_observed_at: i64,
    pub execution_completed_at: Option<i64>,
    pub attestation_completed_at: Option<i64>,
    pub writeback_completed_at: Option<i64>,
    pub all_txs_confirmed: bool,
    pub cycle_hash: [u8; 32],
}

/// One row per layer (L1/L2/L3) of a `ChainedInclusionProof`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProofLayerIndex {
    L1AccountToBvn,
    L2BvnToDn,
    L3DnToHeight,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainedProofLayerRow {
    pub proof_artifact_id: uuid::Uuid,
    pub layer: ProofLayerIndex,
    pub source_hash: [u8; 32],
    pub target_hash: [u8; 32],
    /// JSON-encoded `Vec<MerkleStep>`.
    pub steps_json: String,
}

/// One row per governance level (G0/G1/G2) reached during a cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GovernanceProofLevelRow {
    pub proof_artifact_id: uuid::Uuid,
    pub level: GovernanceLevel,
    pub reached_at: i64,
    /// Opaque per-level proof payload, JSON-encoded.
    pub detail_json: String,
}

/// Mirrors `Batch`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnchorBatchRow {
    pub batch_id: uuid::Uuid,
    pub batch_type: ProofClass,
    pub start_time: i64,
    pub tx_count: usize,
    pub merkle_root: Option<[u8; 32]>,
    pub status: BatchStatus,
}

/// One leaf of a batch's Merkle tree, with its insertion position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchTransactionRow {
    pub batch_id: uuid::Uuid,
    pub leaf_index: usize,
    pub tx_hash: [u8; 32],
}

/// Mirrors `AnchorRecord`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnchorRecordRow {
    pub batch_id: uuid::Uuid,
    pub anchor_tx_hash: [u8; 32],
    pub anchor_block_number: u64,
    pub merkle_root: [u8; 32],
    pub confirmations: u64,
    pub required_confirmations: u64,
    pub is_final: bool,
}

impl From<(uuid::Uuid, AnchorRecord)> for AnchorRecordRow {
    fn from((batch_id, anchor): (uuid::Uuid, AnchorRecord)) -> Self {
        Self {
            batch_id,
            anchor_tx_hash: anchor.anchor_tx_hash,
            anchor_block_number: anchor.anchor_block_number,
            merkle_root: anchor.merkle_root,
            confirmations: anchor.confirmations,
            required_confirmations: anchor.required_confirmations,
            is_final: anchor.is_final,
        }
    }
}

/// One row per accepted individual validator attestation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorAttestationRow {
    pub result_hash: [u8; 32],
    pub validator_index: u32,
    /// Compressed BLS12-381 G1 signature bytes.
    pub signature: Vec<u8>,
    pub accepted_at: i64,
}

/// One row per finalized BLS aggregate, once a cycle's threshold is reached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlsResultAttestationRow {
    pub result_hash: [u8; 32],
    pub validator_indices: Vec<u32>,
    pub signed_voting_power: u64,
    pub total_voting_power: u64,
    pub aggregate_signature: Vec<u8>,
    pub message_hash: [u8; 32],
    pub finalized_at: i64,
}
