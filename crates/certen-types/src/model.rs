//! Data model shared across the proof-cycle engine (spec.md §3).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which admission policy produced a batch or its anchoring intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProofClass {
    OnCadence,
    OnDemand,
}

/// An intent observed on the source ledger, carrying the four canonical raw
/// JSON blobs verbatim plus the convenience fields callers need without
/// re-parsing them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Intent {
    /// Uniquely identifies this intent across its lifetime.
    pub intent_id: [u8; 32],
    /// The source-ledger transaction hash that carried this intent.
    pub source_tx_hash: [u8; 32],
    /// Raw `intentData` blob, immutable post-discovery.
    pub intent_data: serde_json::Value,
    /// Raw `crossChainData` blob, immutable post-discovery.
    pub cross_chain_data: serde_json::Value,
    /// Raw `governanceData` blob, immutable post-discovery.
    pub governance_data: serde_json::Value,
    /// Raw `replayData` blob, immutable post-discovery.
    pub replay_data: serde_json::Value,
    /// Principal namespace the intent was filed under.
    pub organization_adi: String,
    /// Principal data account that carried the intent.
    pub account_url: String,
    pub proof_class: ProofClass,
}

/// One of the three EVM calls a commitment binds: create, verify-proof, execute-with-governance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepCommitment {
    /// 20-byte contract address this step is expected to target.
    pub target_contract: [u8; 20],
    /// 4-byte function selector (first 4 bytes of keccak256 of the canonical signature).
    pub selector: [u8; 4],
    /// msg.value expected for this step, in wei.
    pub expected_value: u128,
    /// keccak256 of the expected calldata, if the step's calldata is fully determined up-front.
    pub expected_calldata_hash: Option<[u8; 32]>,
}

/// An event a successful execution must emit, matched by contract address,
/// topic0, and (where specified) indexed parameter values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpectedEvent {
    pub contract: [u8; 20],
    pub topic0: [u8; 32],
    /// Indexed parameter values (topic1..topic3) that must match when present.
    pub indexed_params: Vec<[u8; 32]>,
}

/// Derived once from an intent before execution; binds the cycle to the
/// exact external-chain behavior the validator expects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionCommitment {
    pub bundle_id: [u8; 32],
    pub operation_id: [u8; 32],
    pub target_chain: String,
    pub chain_id: u64,
    pub create: StepCommitment,
    pub verify_proof: StepCommitment,
    pub execute_with_governance: StepCommitment,
    /// Recipient of the final-step value transfer.
    pub final_target: [u8; 20],
    pub final_value: u128,
    pub final_calldata: Vec<u8>,
    pub expected_events: Vec<ExpectedEvent>,
    /// SHA-256 over the fixed versioned encoding of the fields above.
    pub commitment_hash: [u8; 32],
}

/// Execution status of an observed external-chain transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    Success,
    Failed,
}

/// One EVM log entry, as needed for event matching and the result digest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub contract: [u8; 20],
    pub topics: Vec<[u8; 32]>,
    pub data: Vec<u8>,
}

/// An ordered Merkle inclusion step: the sibling hash and which side it sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Position {
    Left,
    Right,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerkleStep {
    pub sibling: [u8; 32],
    pub position: Position,
}

/// A self-contained binary Merkle inclusion proof: fold `leaf` with `steps`
/// in order and compare to `root`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerkleProof {
    pub leaf: [u8; 32],
    pub root: [u8; 32],
    pub steps: Vec<MerkleStep>,
}

/// The observed outcome of a single external-chain transaction, including
/// the two inclusion proofs (transactions_root, receipts_root) needed to
/// bind it back to the block it was mined in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalChainResult {
    pub tx_hash: [u8; 32],
    pub block_number: u64,
    pub block_hash: [u8; 32],
    pub tx_to: [u8; 20],
    pub tx_from: [u8; 20],
    pub tx_value: u128,
    pub tx_data: Vec<u8>,
    pub tx_gas_used: u64,
    pub status: TxStatus,
    pub logs: Vec<LogEntry>,
    pub confirmation_blocks: u64,
    pub state_root: [u8; 32],
    pub receipts_root: [u8; 32],
    pub transactions_root: [u8; 32],
    pub tx_inclusion_proof: MerkleProof,
    pub receipt_inclusion_proof: MerkleProof,
    /// Deterministic hash of (tx_hash, block_hash, status, logs_digest).
    pub result_hash: [u8; 32],
}

/// A validator-signed aggregate attestation over a `result_hash`, produced
/// once signed voting power crosses the configured threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedAttestation {
    pub result_hash: [u8; 32],
    /// Ordered, unique validator indices that contributed to the aggregate.
    pub validator_indices: Vec<u32>,
    pub signed_voting_power: u64,
    pub total_voting_power: u64,
    pub threshold_met: bool,
    /// Compressed BLS12-381 G1 aggregate signature.
    pub aggregate_signature: Vec<u8>,
    pub message_hash: [u8; 32],
}

/// One governance escalation level reached during a cycle: G0 inclusion, G1
/// authority validation, G2 outcome binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GovernanceLevel {
    G0,
    G1,
    G2,
}

/// The complete audit record for one intent's proof cycle, persisted at
/// completion to the artifact store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofCycleCompletion {
    pub intent_id: [u8; 32],
    pub intent_tx_hash: [u8; 32],
    pub bundle_id: [u8; 32],
    /// Per-step results: create, verify_proof, execute_with_governance. May be absent for skipped steps.
    pub step_results: [Option<ExternalChainResult>; 3],
    pub attestation: Option<AggregatedAttestation>,
    pub write_back_tx: Option<String>,
    pub intent_observed_at: i64,
    pub execution_completed_at: Option<i64>,
    pub attestation_completed_at: Option<i64>,
    pub writeback_completed_at: Option<i64>,
    pub all_txs_confirmed: bool,
    /// Hash binding this completion record for the custody chain.
    pub cycle_hash: [u8; 32],
}

/// Lifecycle status of a sealed or in-flight batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Open,
    Sealing,
    Anchored,
    Finalized,
    Failed,
}

/// A set of transaction hashes accumulated into one Merkle tree for anchoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    pub batch_id: uuid::Uuid,
    pub batch_type: ProofClass,
    pub start_time: i64,
    pub tx_count: usize,
    /// Ordered leaves in insertion order; frozen once sealed.
    pub leaves: Vec<[u8; 32]>,
    pub merkle_root: Option<[u8; 32]>,
    pub status: BatchStatus,
    pub anchor: Option<AnchorRecord>,
}

/// The on-chain anchoring record for one sealed batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnchorRecord {
    pub anchor_tx_hash: [u8; 32],
    pub anchor_block_number: u64,
    pub merkle_root: [u8; 32],
    pub confirmations: u64,
    pub required_confirmations: u64,
    pub is_final: bool,
}

/// One layer of a chained inclusion proof (account→BVN, BVN→DN, DN→height).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofLayer {
    pub source_hash: [u8; 32],
    pub target_hash: [u8; 32],
    pub steps: Vec<MerkleStep>,
}

/// The full three-layer inclusion proof returned by `ChainedProofGenerator`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainedInclusionProof {
    /// account → BVN root
    pub l1_account_to_bvn: ProofLayer,
    /// BVN → DN root
    pub l2_bvn_to_dn: ProofLayer,
    /// DN → consensus height
    pub l3_dn_to_height: ProofLayer,
}

impl ProofLayer {
    /// Folds `source_hash` with `steps` in order; `Ok(true)` iff the result equals `target_hash`.
    pub fn verify(&self, fold: impl Fn(&[u8; 32], &crate::model::MerkleStep) -> [u8; 32]) -> bool {
        let mut acc = self.source_hash;
        for step in &self.steps {
            acc = fold(&acc, step);
        }
        acc == self.target_hash
    }
}

impl ChainedInclusionProof {
    pub fn verify_all(&self, fold: impl Fn(&[u8; 32], &MerkleStep) -> [u8; 32]) -> bool {
        self.l1_account_to_bvn.verify(&fold)
            && self.l2_bvn_to_dn.verify(&fold)
            && self.l3_dn_to_height.verify(&fold)
    }
}

/// The fixed, positional key/value list the write-back envelope carries.
/// Every position has a documented semantic meaning; unknown optional values
/// are the empty string, never omitted.
pub type SyntheticTxFields = BTreeMap<&'static str, String>;

/// Stage identifiers used in `Failed(stage, kind, message)` terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleStage {
    Observation,
    Attestation,
    WriteBack,
}

/// Terminal or in-flight status of a proof cycle as tracked by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CycleStatus {
    Observing,
    Attesting,
    WritingBack,
    Complete,
    Failed {
        stage: CycleStage,
        kind: crate::error::ErrorKind,
        message: String,
    },
}
