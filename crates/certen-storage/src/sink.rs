//! The `ArtifactSink` trait the orchestrator persists through (§4.6, §4.10),
//! plus an in-memory reference implementation for tests and single-process
//! deployments.

use crate::rows::{
    AnchorBatchRow, AnchorRecordRow, BatchTransactionRow, BlsResultAttestationRow,
    ChainedProofLayerRow, GovernanceProofLevelRow, ProofArtifactRow, ValidatorAttestationRow,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("no proof artifact with id {0}")]
    ArtifactNotFound(uuid::Uuid),
    #[error("no batch with id {0}")]
    BatchNotFound(uuid::Uuid),
    #[error("underlying store error: {0}")]
    Backend(String),
}

/// The persistence surface the orchestrator and batch pipeline depend on.
/// A caller binds this to whatever relational store it runs; this crate
/// provides only the shapes and an in-memory implementation.
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    async fn upsert_proof_artifact(&self, row: ProofArtifactRow) -> Result<(), StorageError>;
    async fn record_chained_proof_layer(
        &self,
        row: ChainedProofLayerRow,
    ) -> Result<(), StorageError>;
    async fn record_governance_level(
        &self,
        row: GovernanceProofLevelRow,
    ) -> Result<(), StorageError>;
    async fn record_attestation(&self, row: ValidatorAttestationRow) -> Result<(), StorageError>;
    async fn record_bls_result_attestation(
        &self,
        row: BlsResultAttestationRow,
    ) -> Result<(), StorageError>;
    async fn record_anchor_batch(
        &self,
        batch: AnchorBatchRow,
        transactions: Vec<BatchTransactionRow>,
    ) -> Result<(), StorageError>;
    async fn record_anchor(&self, row: AnchorRecordRow) -> Result<(), StorageError>;
    async fn get_proof_artifact(
        &self,
        id: uuid::Uuid,
    ) -> Result<Option<ProofArtifactRow>, StorageError>;
}

/// An in-process `ArtifactSink` backed by plain `HashMap`s behind a mutex.
/// Suitable for tests and single-node deployments that don't need a
/// relational store; not durable across restarts.
#[derive(Default)]
pub struct InMemoryArtifactSink {
    artifacts: Mutex<HashMap<uuid::Uuid, ProofArtifactRow>>,
    chained_layers: Mutex<Vec<ChainedProofLayerRow>>,
    governance_levels: Mutex<Vec<GovernanceProofLevelRow>>,
    attestations: Mutex<Vec<ValidatorAttestationRow>>,
    bls_results: Mutex<Vec<BlsResultAttestationRow>>,
    batches: Mutex<HashMap<uuid::Uuid, AnchorBatchRow>>,
    batch_transactions: Mutex<Vec<BatchTransactionRow>>,
    anchors: Mutex<Vec<AnchorRecordRow>>,
}

impl InMemoryArtifactSink {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ArtifactSink for InMemoryArtifactSink {
    async fn upsert_proof_artifact(&self, row: ProofArtifactRow) -> Result<(), StorageError> {
        self.artifacts.lock().insert(row.id, row);
        Ok(())
    }

    async fn record_chained_proof_layer(
        &self,
        row: ChainedProofLayerRow,
    ) -> Result<(), StorageError> {
        self.chained_layers.lock().push(row);
        Ok(())
    }

    async fn record_governance_level(
        &self,
        row: GovernanceProofLevelRow,
    ) -> Result<(), StorageError> {
        self.governance_levels.lock().push(row);
        Ok(())
    }

    async fn record_attestation(&self, row: ValidatorAttestationRow) -> Result<(), StorageError> {
        self.attestations.lock().push(row);
        Ok(())
    }

    async fn record_bls_result_attestation(
        &self,
        row: BlsResultAttestationRow,
    ) -> Result<(), StorageError> {
        self.bls_results.lock().push(row);
        Ok(())
    }

    async fn record_anchor_batch(
        &self,
        batch: AnchorBatchRow,
        transactions: Vec<BatchTransactionRow>,
    ) -> Result<(), StorageError> {
        self.batches.lock().insert(batch.batch_id, batch);
        self.batch_transactions.lock().extend(transactions);
        Ok(())
    }

    async fn record_anchor(&self, row: AnchorRecordRow) -> Result<(), StorageError> {
        if !self.batches.lock().contains_key(&row.batch_id) {
            return Err(StorageError::BatchNotFound(row.batch_id));
        }
        self.anchors.lock().push(row);
        Ok(())
    }

    async fn get_proof_artifact(
        &self,
        id: uuid::Uuid,
    ) -> Result<Option<ProofArtifactRow>, StorageError> {
        Ok(self.artifacts.lock().get(&id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use certen_types::model::{BatchStatus, ProofClass};

    fn sample_artifact(id: uuid::Uuid) -> ProofArtifactRow {
        ProofArtifactRow {
            id,
            intent_tx_hash: [1u8; 32],
            bundle_id: [2u8; 32],
            create_result_json: None,
            verify_proof_result_json: None,
            execute_result_json: None,
            attestation_summary_json: None,
            write_back_tx_id: None,
            intent_observed_at: 0,
            execution_completed_at: None,
            attestation_completed_at: None,
            writeback_completed_at: None,
            all_txs_confirmed: false,
            cycle_hash: [3u8; 32],
        }
    }

    #[tokio::test]
    async fn upsert_then_get_round_trips() {
        let sink = InMemoryArtifactSink::new();
        let id = uuid::Uuid::new_v4();
        sink.upsert_proof_artifact(sample_artifact(id)).await.unwrap();
        let fetched = sink.get_proof_artifact(id).await.unwrap();
        assert_eq!(fetched.unwrap().id, id);
    }

    #[tokio::test]
    async fn anchor_without_batch_is_rejected() {
        let sink = InMemoryArtifactSink::new();
        let row = AnchorRecordRow {
            batch_id: uuid::Uuid::new_v4(),
            anchor_tx_hash: [0u8; 32],
            anchor_block_number: 1,
            merkle_root: [0u8; 32],
            confirmations: 0,
            required_confirmations: 12,
            is_final: false,
        };
        assert!(matches!(
            sink.record_anchor(row).await,
            Err(StorageError::BatchNotFound(_))
        ));
    }

    #[tokio::test]
    async fn anchor_with_known_batch_succeeds() {
        let sink = InMemoryArtifactSink::new();
        let batch_id = uuid::Uuid::new_v4();
        sink.record_anchor_batch(
            AnchorBatchRow {
                batch_id,
                batch_type: ProofClass::OnCadence,
                start_time: 0,
                tx_count: 1,
                merkle_root: Some([9u8; 32]),
                status: BatchStatus::Sealing,
            },
            vec![BatchTransactionRow {
                batch_id,
                leaf_index: 0,
                tx_hash: [9u8; 32],
            }],
        )
        .await
        .unwrap();

        let row = AnchorRecordRow {
            batch_id,
            anchor_tx_hash: [5u8; 32],
            anchor_block_number: 100,
            merkle_root: [9u8; 32],
            confirmations: 1,
            required_confirmations: 12,
            is_final: false,
        };
        assert!(sink.record_anchor(row).await.is_ok());
    }
}
