//! `BatchAnchorPipeline` (spec.md §4.8): accumulates transactions into
//! on-cadence or on-demand batches, builds a Merkle tree over each sealed
//! batch, anchors the root externally, and tracks confirmations to
//! finality.

use certen_client::EvmClient;
use certen_crypto::merkle;
use certen_storage::{AnchorBatchRow, AnchorRecordRow, ArtifactSink, BatchTransactionRow};
use certen_types::error::BatchError;
use certen_types::model::{AnchorRecord, Batch, BatchStatus, ProofClass};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Admission parameters for the cadence batch.
#[derive(Debug, Clone, Copy)]
pub struct BatchConfig {
    pub deadline: Duration,
    pub max_size: usize,
    pub required_confirmations: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            deadline: Duration::from_secs(900),
            max_size: 1024,
            required_confirmations: 12,
        }
    }
}

struct OpenBatch {
    id: Uuid,
    opened_at: Instant,
    leaves: Vec<[u8; 32]>,
}

/// Owns the two concurrently-open batches (one per `ProofClass`) and the
/// sealed batches awaiting anchor confirmation.
pub struct BatchAnchorPipeline<C, A> {
    client: C,
    sink: Arc<A>,
    config: BatchConfig,
    open_cadence: std::sync::Mutex<OpenBatch>,
}

impl<C: EvmClient, A: ArtifactSink> BatchAnchorPipeline<C, A> {
    pub fn new(client: C, config: BatchConfig, sink: Arc<A>) -> Self {
        Self {
            client,
            sink,
            config,
            open_cadence: std::sync::Mutex::new(OpenBatch {
                id: Uuid::new_v4(),
                opened_at: Instant::now(),
                leaves: Vec::new(),
            }),
        }
    }

    /// Admits `tx_hash` under `batch_type`. On-demand transactions seal and
    /// anchor immediately; on-cadence transactions accumulate until the
    /// deadline or size cap is reached, at which point the caller receives
    /// the sealed batch back (still unanchored — the caller drives
    /// `anchor`).
    pub async fn admit(&self, tx_hash: [u8; 32], batch_type: ProofClass) -> Result<Option<Batch>, BatchError> {
        match batch_type {
            ProofClass::OnDemand => Ok(Some(self.seal(vec![tx_hash], ProofClass::OnDemand).await?)),
            ProofClass::OnCadence => {
                let mut open = self.open_cadence.lock().unwrap_or_else(|e| e.into_inner());
                open.leaves.push(tx_hash);
                let should_seal =
                    open.opened_at.elapsed() >= self.config.deadline || open.leaves.len() >= self.config.max_size;
                if !should_seal {
                    return Ok(None);
                }
                let leaves = std::mem::take(&mut open.leaves);
                let sealed_id = open.id;
                open.id = Uuid::new_v4();
                open.opened_at = Instant::now();
                drop(open);
                Ok(Some(self.seal_with_id(sealed_id, leaves, ProofClass::OnCadence).await?))
            }
        }
    }

    async fn seal(&self, leaves: Vec<[u8; 32]>, batch_type: ProofClass) -> Result<Batch, BatchError> {
        self.seal_with_id(Uuid::new_v4(), leaves, batch_type).await
    }

    async fn seal_with_id(
        &self,
        batch_id: Uuid,
        leaves: Vec<[u8; 32]>,
        batch_type: ProofClass,
    ) -> Result<Batch, BatchError> {
        if leaves.is_empty() {
            return Err(BatchError::SealFailed("batch has zero leaves".into()));
        }
        let tree = merkle::build_tree(&leaves).map_err(|e| BatchError::SealFailed(e.to_string()))?;
        let batch = Batch {
            batch_id,
            batch_type,
            start_time: 0,
            tx_count: leaves.len(),
            leaves,
            merkle_root: Some(tree.root),
            status: BatchStatus::Sealing,
            anchor: None,
        };

        let batch_row = AnchorBatchRow {
            batch_id: batch.batch_id,
            batch_type: batch.batch_type,
            start_time: batch.start_time,
            tx_count: batch.tx_count,
            merkle_root: batch.merkle_root,
            status: batch.status,
        };
        let tx_rows = batch
            .leaves
            .iter()
            .enumerate()
            .map(|(leaf_index, tx_hash)| BatchTransactionRow {
                batch_id: batch.batch_id,
                leaf_index,
                tx_hash: *tx_hash,
            })
            .collect();
        if let Err(e) = self.sink.record_anchor_batch(batch_row, tx_rows).await {
            tracing::warn!(target = "certen_core", error = %e, "failed to persist sealed batch");
        }
        certen_telemetry::cycle_metrics().observe_batch_size(batch.tx_count as f64);
        certen_telemetry::cycle_metrics().inc_batches_sealed();

        Ok(batch)
    }

    /// Submits the sealed batch's root for anchoring and returns the
    /// initial (unconfirmed) `AnchorRecord`. The EVM submission itself goes
    /// through `certen_client::LedgerClient::submit_envelope`-style
    /// collaborators out of this pipeline's scope; here the pipeline
    /// records the observed anchor transaction.
    pub async fn anchor(&self, batch: &Batch, anchor_tx_hash: [u8; 32], anchor_block_number: u64) -> AnchorRecord {
        let record = AnchorRecord {
            anchor_tx_hash,
            anchor_block_number,
            merkle_root: batch.merkle_root.unwrap_or_default(),
            confirmations: 0,
            required_confirmations: self.config.required_confirmations,
            is_final: false,
        };
        let row = AnchorRecordRow::from((batch.batch_id, record.clone()));
        if let Err(e) = self.sink.record_anchor(row).await {
            tracing::warn!(target = "certen_core", error = %e, "failed to persist anchor record");
        }
        record
    }

    /// Polls the external chain's head and returns an updated `AnchorRecord`
    /// with confirmations advanced; fails with `AnchorReverted` if the
    /// anchor transaction's receipt is absent or failed.
    pub async fn track_confirmation(&self, record: &AnchorRecord) -> Result<AnchorRecord, BatchError> {
        let receipt = self
            .client
            .get_transaction_receipt(record.anchor_tx_hash)
            .await
            .map_err(|e| BatchError::AnchorReverted(e.to_string()))?;
        let receipt = receipt.ok_or_else(|| BatchError::AnchorReverted("anchor receipt not found".into()))?;
        if !receipt.status_success {
            certen_telemetry::cycle_metrics().inc_anchors_reverted();
            return Err(BatchError::AnchorReverted(format!(
                "anchor tx {} reverted",
                hex::encode(record.anchor_tx_hash)
            )));
        }
        let head = self
            .client
            .get_block_number()
            .await
            .map_err(|e| BatchError::AnchorReverted(e.to_string()))?;
        let confirmations = head.saturating_sub(record.anchor_block_number);
        Ok(AnchorRecord {
            anchor_tx_hash: record.anchor_tx_hash,
            anchor_block_number: record.anchor_block_number,
            merkle_root: record.merkle_root,
            confirmations,
            required_confirmations: record.required_confirmations,
            is_final: confirmations >= record.required_confirmations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use certen_client::{EvmBlock, EvmReceipt, EvmTransaction};
    use certen_storage::InMemoryArtifactSink;
    use certen_types::error::ClientError;

    struct FakeEvm {
        head: u64,
        receipt_ok: bool,
    }

    #[async_trait]
    impl EvmClient for FakeEvm {
        async fn get_transaction_receipt(&self, tx_hash: [u8; 32]) -> Result<Option<EvmReceipt>, ClientError> {
            Ok(Some(EvmReceipt {
                tx_hash,
                block_number: 100,
                block_hash: [1u8; 32],
                status_success: self.receipt_ok,
                gas_used: 50_000,
                logs: vec![],
            }))
        }
        async fn get_transaction(&self, _tx_hash: [u8; 32]) -> Result<Option<EvmTransaction>, ClientError> {
            unimplemented!()
        }
        async fn get_block_by_number(&self, _number: u64) -> Result<Option<EvmBlock>, ClientError> {
            unimplemented!()
        }
        async fn get_block_number(&self) -> Result<u64, ClientError> {
            Ok(self.head)
        }
    }

    #[tokio::test]
    async fn on_demand_seals_a_single_leaf_batch_immediately() {
        let pipeline = BatchAnchorPipeline::new(
            FakeEvm { head: 100, receipt_ok: true },
            BatchConfig::default(),
            Arc::new(InMemoryArtifactSink::new()),
        );
        let leaf = [7u8; 32];
        let batch = pipeline.admit(leaf, ProofClass::OnDemand).await.unwrap().unwrap();
        assert_eq!(batch.tx_count, 1);
        assert_eq!(batch.merkle_root, Some(merkle::leaf_hash(&leaf).unwrap()));
    }

    #[tokio::test]
    async fn on_cadence_does_not_seal_before_the_size_cap() {
        let mut config = BatchConfig::default();
        config.max_size = 3;
        let pipeline = BatchAnchorPipeline::new(
            FakeEvm { head: 100, receipt_ok: true },
            config,
            Arc::new(InMemoryArtifactSink::new()),
        );
        assert!(pipeline.admit([1u8; 32], ProofClass::OnCadence).await.unwrap().is_none());
        assert!(pipeline.admit([2u8; 32], ProofClass::OnCadence).await.unwrap().is_none());
        let sealed = pipeline.admit([3u8; 32], ProofClass::OnCadence).await.unwrap();
        assert!(sealed.is_some());
        assert_eq!(sealed.unwrap().tx_count, 3);
    }

    #[tokio::test]
    async fn track_confirmation_marks_final_once_depth_reached() {
        let pipeline = BatchAnchorPipeline::new(
            FakeEvm { head: 112, receipt_ok: true },
            BatchConfig::default(),
            Arc::new(InMemoryArtifactSink::new()),
        );
        let batch = pipeline.admit([9u8; 32], ProofClass::OnDemand).await.unwrap().unwrap();
        let record = pipeline.anchor(&batch, [5u8; 32], 100).await;
        let updated = pipeline.track_confirmation(&record).await.unwrap();
        assert_eq!(updated.confirmations, 12);
        assert!(updated.is_final);
    }

    #[tokio::test]
    async fn reverted_anchor_tx_is_reported() {
        let pipeline = BatchAnchorPipeline::new(
            FakeEvm { head: 112, receipt_ok: false },
            BatchConfig::default(),
            Arc::new(InMemoryArtifactSink::new()),
        );
        let batch = pipeline.admit([9u8; 32], ProofClass::OnDemand).await.unwrap().unwrap();
        let record = pipeline.anchor(&batch, [5u8; 32], 100).await;
        let err = pipeline.track_confirmation(&record).await.unwrap_err();
        assert!(matches!(err, BatchError::AnchorReverted(_)));
    }
}
