//! `ProofCycleOrchestrator` (spec.md §4.6): drives one intent's three
//! external-chain observations, its attestation, and its write-back through
//! to completion, rejecting duplicate concurrent starts for the same
//! intent/transaction pair.

use crate::attestation::AttestationCollector;
use crate::observer::{ExternalChainObserver, ObservationContext};
use crate::verify::ResultVerifier;
use crate::writeback::{SyntheticTxBuilder, WriteBackSubmitter};
use certen_client::{EvmClient, LedgerClient};
use certen_crypto::hash::sha256;
use certen_storage::{ArtifactSink, BlsResultAttestationRow, GovernanceProofLevelRow, ProofArtifactRow, ValidatorAttestationRow};
use certen_types::error::{ErrorKind, OrchestratorError};
use certen_types::model::{
    AggregatedAttestation, CycleStage, CycleStatus, ExecutionCommitment, ExternalChainResult,
    GovernanceLevel, Intent,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn cycle_key(intent_id: [u8; 32], tx_hash: [u8; 32]) -> String {
    format!("{}:{}", hex::encode(intent_id), hex::encode(tx_hash))
}

fn stage_label(stage: CycleStage) -> &'static str {
    match stage {
        CycleStage::Observation => "observation",
        CycleStage::Attestation => "attestation",
        CycleStage::WriteBack => "write_back",
    }
}

fn kind_label(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::Transient => "transient",
        ErrorKind::Malformed => "malformed",
        ErrorKind::Integrity => "integrity",
        ErrorKind::Resource => "resource",
        ErrorKind::Policy => "policy",
    }
}

struct CycleState {
    intent: Intent,
    commitment: ExecutionCommitment,
    proof_artifact_id: Uuid,
    step_results: [Option<ExternalChainResult>; 3],
    intent_observed_at: i64,
    execution_completed_at: Option<i64>,
    anchor_proof_hash: [u8; 32],
    stage: CycleStage,
}

/// Coordinates phases 7 (observation), 8 (attestation) and 9 (write-back)
/// for every in-flight intent. Holds no knowledge of phases 1-6; callers
/// feed it a parsed `Intent` plus the `ExecutionCommitment` already derived
/// for it by `CommitmentBuilder`.
pub struct ProofCycleOrchestrator<E, L, A> {
    observer: ExternalChainObserver<E>,
    verifier: ResultVerifier,
    collector: Arc<AttestationCollector>,
    submitter: WriteBackSubmitter<L>,
    sink: Arc<A>,
    active: Mutex<HashMap<String, CycleState>>,
    sequence_counter: AtomicU64,
}

impl<E, L, A> ProofCycleOrchestrator<E, L, A>
where
    E: EvmClient,
    L: LedgerClient,
    A: ArtifactSink,
{
    pub fn new(
        observer: ExternalChainObserver<E>,
        verifier: ResultVerifier,
        collector: Arc<AttestationCollector>,
        submitter: WriteBackSubmitter<L>,
        sink: Arc<A>,
    ) -> Self {
        Self {
            observer,
            verifier,
            collector,
            submitter,
            sink,
            active: Mutex::new(HashMap::new()),
            sequence_counter: AtomicU64::new(0),
        }
    }

    pub fn active_cycle_count(&self) -> usize {
        self.active.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Starts a cycle for `intent`, observing up to three step transactions
    /// concurrently. The `create` slot (index 0) is mandatory; the other two
    /// are observed only if their tx hash is present. Rejects a second start
    /// for the same `intent_id:source_tx_hash` key while one is already
    /// in-flight.
    pub async fn start_cycle(
        &self,
        intent: Intent,
        commitment: ExecutionCommitment,
        step_tx_hashes: [Option<[u8; 32]>; 3],
        anchor_proof_hash: [u8; 32],
        proof_artifact_id: Uuid,
    ) -> Result<CycleStatus, OrchestratorError> {
        let key = cycle_key(intent.intent_id, intent.source_tx_hash);
        let intent_observed_at = now_unix();

        {
            let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
            if active.contains_key(&key) {
                return Err(OrchestratorError::CycleAlreadyActive(key));
            }
            active.insert(
                key.clone(),
                CycleState {
                    intent: intent.clone(),
                    commitment: commitment.clone(),
                    proof_artifact_id,
                    step_results: [None, None, None],
                    intent_observed_at,
                    execution_completed_at: None,
                    anchor_proof_hash,
                    stage: CycleStage::Observation,
                },
            );
            certen_telemetry::cycle_metrics().set_active_cycles(active.len() as u64);
        }
        certen_telemetry::cycle_metrics().inc_cycles_started();
        let _cycle_timer = certen_telemetry::time::Timer::new(certen_telemetry::cycle_metrics());

        let multi_step = step_tx_hashes.iter().filter(|h| h.is_some()).count() > 1;
        let mut ctx = ObservationContext::default();
        if multi_step {
            ctx.timeout *= 2;
        }

        let (r0, r1, r2) = tokio::join!(
            self.observe_optional(step_tx_hashes[0], &ctx),
            self.observe_optional(step_tx_hashes[1], &ctx),
            self.observe_optional(step_tx_hashes[2], &ctx),
        );
        let step_results: [Option<ExternalChainResult>; 3] = [r0, r1, r2];

        let create_result = match &step_results[0] {
            Some(r) => r.clone(),
            None => {
                let message =
                    "mandatory create-step observation failed or was not requested".to_string();
                return Ok(self
                    .fail_cycle(&key, CycleStage::Observation, ErrorKind::Integrity, message)
                    .await);
            }
        };

        let execution_completed_at = now_unix();
        {
            let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(state) = active.get_mut(&key) {
                state.step_results = step_results.clone();
                state.execution_completed_at = Some(execution_completed_at);
                state.stage = CycleStage::Attestation;
            }
        }
        self.persist_progress(&key).await;

        let attested = self
            .verifier
            .verify_and_attest(&create_result, &commitment, &self.collector);

        match attested {
            Err(e) => {
                let kind = e.kind();
                let message = format!("{e} ({})", e.kind_label());
                Ok(self.fail_cycle(&key, CycleStage::Attestation, kind, message).await)
            }
            Ok(submission) => {
                let row = ValidatorAttestationRow {
                    result_hash: create_result.result_hash,
                    validator_index: self.verifier.validator_index(),
                    signature: submission.signature_bytes,
                    accepted_at: now_unix(),
                };
                if let Err(e) = self.sink.record_attestation(row).await {
                    tracing::warn!(target = "certen_core", error = %e, "failed to persist validator attestation");
                }
                match submission.aggregated {
                    None => Ok(CycleStatus::Attesting),
                    Some(attestation) => self.finish_cycle(&key, attestation).await,
                }
            }
        }
    }

    async fn observe_optional(
        &self,
        tx_hash: Option<[u8; 32]>,
        ctx: &ObservationContext,
    ) -> Option<ExternalChainResult> {
        let tx_hash = tx_hash?;
        self.observer.observe(tx_hash, ctx).await.ok()
    }

    /// Invoked once an out-of-band attestation gossip layer reports the BFT
    /// threshold crossed for `result_hash`. Advances the first matching
    /// in-flight cycle to phase 9.
    pub async fn on_attestation_reached(
        &self,
        result_hash: [u8; 32],
        attestation: AggregatedAttestation,
    ) -> Option<Result<CycleStatus, OrchestratorError>> {
        let key = {
            let active = self.active.lock().unwrap_or_else(|e| e.into_inner());
            active
                .iter()
                .find(|(_, state)| {
                    state.step_results[0]
                        .as_ref()
                        .map(|r| r.result_hash == result_hash)
                        .unwrap_or(false)
                })
                .map(|(k, _)| k.clone())
        }?;
        Some(self.finish_cycle(&key, attestation).await)
    }

    async fn finish_cycle(
        &self,
        key: &str,
        attestation: AggregatedAttestation,
    ) -> Result<CycleStatus, OrchestratorError> {
        let state = {
            let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
            let state = match active.remove(key) {
                Some(s) => s,
                None => return Err(OrchestratorError::UnknownCycle(key.to_string())),
            };
            certen_telemetry::cycle_metrics().set_active_cycles(active.len() as u64);
            state
        };

        let governance_level = match state.intent.governance_data.get("level").and_then(|v| v.as_str()) {
            Some("g2") => GovernanceLevel::G2,
            Some("g1") => GovernanceLevel::G1,
            _ => GovernanceLevel::G0,
        };
        let governance_proof_hash = serde_json::to_vec(&state.intent.governance_data)
            .ok()
            .and_then(|bytes| sha256(bytes).ok())
            .unwrap_or([0u8; 32]);
        let previous_result_hash = state
            .intent
            .replay_data
            .get("previousResultHash")
            .and_then(|v| v.as_str())
            .and_then(|s| hex::decode(s.trim_start_matches("0x")).ok())
            .and_then(|b| b.try_into().ok())
            .unwrap_or([0u8; 32]);
        let sequence_number = self.sequence_counter.fetch_add(1, Ordering::SeqCst);
        let submitted_at = now_unix();

        let governance_row = GovernanceProofLevelRow {
            proof_artifact_id: state.proof_artifact_id,
            level: governance_level,
            reached_at: submitted_at,
            detail_json: state.intent.governance_data.to_string(),
        };
        if let Err(e) = self.sink.record_governance_level(governance_row).await {
            tracing::warn!(target = "certen_core", error = %e, "failed to persist governance level");
        }

        let bls_row = BlsResultAttestationRow {
            result_hash: attestation.result_hash,
            validator_indices: attestation.validator_indices.clone(),
            signed_voting_power: attestation.signed_voting_power,
            total_voting_power: attestation.total_voting_power,
            aggregate_signature: attestation.aggregate_signature.clone(),
            message_hash: attestation.message_hash,
            finalized_at: submitted_at,
        };
        if let Err(e) = self.sink.record_bls_result_attestation(bls_row).await {
            tracing::warn!(target = "certen_core", error = %e, "failed to persist bls result attestation");
        }

        let fields = SyntheticTxBuilder::build(
            &state.intent,
            &state.commitment,
            &state.step_results,
            Some(&attestation),
            governance_level,
            governance_proof_hash,
            state.proof_artifact_id,
            state.anchor_proof_hash,
            previous_result_hash,
            sequence_number,
            submitted_at,
        );

        let write_back_tx = match self.submitter.submit(&fields).await {
            Ok(tx) => tx,
            Err(e) => {
                return Ok(self
                    .persist_failure(
                        state,
                        CycleStage::WriteBack,
                        e.kind(),
                        e.to_string(),
                        Some(&attestation),
                    )
                    .await);
            }
        };

        let all_confirmed = state.step_results.iter().all(|r| r.is_some());
        let cycle_hash = sha256(
            [
                state.intent.source_tx_hash.as_slice(),
                state.commitment.commitment_hash.as_slice(),
                write_back_tx.as_bytes(),
            ]
            .concat(),
        )
        .unwrap_or([0u8; 32]);

        let row = ProofArtifactRow {
            id: state.proof_artifact_id,
            intent_tx_hash: state.intent.source_tx_hash,
            bundle_id: state.commitment.bundle_id,
            create_result_json: state.step_results[0].as_ref().and_then(|r| serde_json::to_string(r).ok()),
            verify_proof_result_json: state.step_results[1].as_ref().and_then(|r| serde_json::to_string(r).ok()),
            execute_result_json: state.step_results[2].as_ref().and_then(|r| serde_json::to_string(r).ok()),
            attestation_summary_json: serde_json::to_string(&attestation).ok(),
            write_back_tx_id: Some(write_back_tx),
            intent_observed_at: state.intent_observed_at,
            execution_completed_at: state.execution_completed_at,
            attestation_completed_at: Some(submitted_at),
            writeback_completed_at: Some(submitted_at),
            all_txs_confirmed: all_confirmed,
            cycle_hash,
        };
        self.sink
            .upsert_proof_artifact(row)
            .await
            .map_err(|e| OrchestratorError::Phase9Failed(e.to_string()))?;

        let _ = state.stage;
        certen_telemetry::cycle_metrics().inc_cycles_completed();
        Ok(CycleStatus::Complete)
    }

    /// Removes `key` from the active map (if still present) and persists a
    /// failed cycle's artifact row, including any attestation already
    /// reached before the failure (§8 Scenario D: stages 7-8's artifacts
    /// stay visible even when stage 9 never completes).
    async fn fail_cycle(
        &self,
        key: &str,
        stage: CycleStage,
        kind: ErrorKind,
        message: String,
    ) -> CycleStatus {
        let state = {
            let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
            let state = active.remove(key);
            certen_telemetry::cycle_metrics().set_active_cycles(active.len() as u64);
            state
        };
        certen_telemetry::cycle_metrics().inc_cycles_failed(stage_label(stage), kind_label(kind));
        certen_telemetry::error_metrics().inc_error(kind_label(kind), stage_label(stage));
        match state {
            Some(state) => self.persist_failure(state, stage, kind, message, None).await,
            None => {
                tracing::warn!(target = "certen_core", %key, ?stage, ?kind, %message, "proof cycle failed (state already gone)");
                CycleStatus::Failed { stage, kind, message }
            }
        }
    }

    async fn persist_failure(
        &self,
        state: CycleState,
        stage: CycleStage,
        kind: ErrorKind,
        message: String,
        attestation: Option<&AggregatedAttestation>,
    ) -> CycleStatus {
        let row = ProofArtifactRow {
            id: state.proof_artifact_id,
            intent_tx_hash: state.intent.source_tx_hash,
            bundle_id: state.commitment.bundle_id,
            create_result_json: state.step_results[0].as_ref().and_then(|r| serde_json::to_string(r).ok()),
            verify_proof_result_json: state.step_results[1].as_ref().and_then(|r| serde_json::to_string(r).ok()),
            execute_result_json: state.step_results[2].as_ref().and_then(|r| serde_json::to_string(r).ok()),
            attestation_summary_json: attestation.and_then(|a| serde_json::to_string(a).ok()),
            write_back_tx_id: None,
            intent_observed_at: state.intent_observed_at,
            execution_completed_at: state.execution_completed_at,
            attestation_completed_at: attestation.map(|_| now_unix()),
            writeback_completed_at: None,
            all_txs_confirmed: false,
            cycle_hash: [0u8; 32],
        };
        if let Err(e) = self.sink.upsert_proof_artifact(row).await {
            tracing::warn!(target = "certen_core", error = %e, "failed to persist failed cycle artifact");
        }
        tracing::warn!(target = "certen_core", ?stage, ?kind, %message, "proof cycle failed");
        CycleStatus::Failed { stage, kind, message }
    }

    async fn persist_progress(&self, key: &str) {
        let row = {
            let active = self.active.lock().unwrap_or_else(|e| e.into_inner());
            let state = match active.get(key) {
                Some(s) => s,
                None => return,
            };
            ProofArtifactRow {
                id: state.proof_artifact_id,
                intent_tx_hash: state.intent.source_tx_hash,
                bundle_id: state.commitment.bundle_id,
                create_result_json: state.step_results[0]
                    .as_ref()
                    .and_then(|r| serde_json::to_string(r).ok()),
                verify_proof_result_json: state.step_results[1]
                    .as_ref()
                    .and_then(|r| serde_json::to_string(r).ok()),
                execute_result_json: state.step_results[2]
                    .as_ref()
                    .and_then(|r| serde_json::to_string(r).ok()),
                attestation_summary_json: None,
                write_back_tx_id: None,
                intent_observed_at: state.intent_observed_at,
                execution_completed_at: state.execution_completed_at,
                attestation_completed_at: None,
                writeback_completed_at: None,
                all_txs_confirmed: false,
                cycle_hash: [0u8; 32],
            }
        };
        if let Err(e) = self.sink.upsert_proof_artifact(row).await {
            tracing::warn!(target = "certen_core", error = %e, "failed to persist cycle progress");
        }
    }
}

trait KindLabel {
    fn kind_label(&self) -> &'static str;
}

impl KindLabel for certen_types::error::VerificationError {
    fn kind_label(&self) -> &'static str {
        match self.kind() {
            ErrorKind::Transient => "transient",
            ErrorKind::Malformed => "malformed",
            ErrorKind::Integrity => "integrity",
            ErrorKind::Resource => "resource",
            ErrorKind::Policy => "policy",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attestation::{ValidatorInfo, ValidatorSet};
    use crate::commitment::CommitmentBuilder;
    use async_trait::async_trait;
    use certen_client::{EntryRange, EvmBlock, EvmReceipt, EvmTransaction, LedgerTxStatus};
    use certen_crypto::hash::event_topic0;
    use certen_crypto::merkle;
    use certen_crypto::sign::bls::BlsKeyPair;
    use certen_crypto::sign::eddsa::Ed25519KeyPair;
    use certen_storage::InMemoryArtifactSink;
    use certen_types::error::ClientError;
    use certen_types::model::ProofClass;

    struct FakeEvm {
        tx_hash: [u8; 32],
        contract: [u8; 20],
        selector: [u8; 4],
    }

    #[async_trait]
    impl EvmClient for FakeEvm {
        async fn get_transaction_receipt(&self, tx_hash: [u8; 32]) -> Result<Option<EvmReceipt>, ClientError> {
            Ok(Some(EvmReceipt {
                tx_hash,
                block_number: 100,
                block_hash: [9u8; 32],
                status_success: true,
                gas_used: 21000,
                logs: vec![certen_client::EvmLogEntry {
                    address: self.contract,
                    topics: vec![event_topic0("AnchorCreated(bytes32,bytes32,bytes32,bytes32,uint256)").unwrap()],
                    data: vec![],
                }],
            }))
        }
        async fn get_transaction(&self, tx_hash: [u8; 32]) -> Result<Option<EvmTransaction>, ClientError> {
            let mut input = self.selector.to_vec();
            input.extend_from_slice(&[0u8; 32]);
            Ok(Some(EvmTransaction {
                hash: tx_hash,
                to: Some(self.contract),
                from: [0u8; 20],
                value: 0,
                input,
            }))
        }
        async fn get_block_by_number(&self, number: u64) -> Result<Option<EvmBlock>, ClientError> {
            Ok(Some(EvmBlock {
                number,
                hash: [9u8; 32],
                state_root: [1u8; 32],
                transactions_root: [0u8; 32],
                receipts_root: [0u8; 32],
                transaction_hashes: vec![self.tx_hash],
            }))
        }
        async fn get_block_number(&self) -> Result<u64, ClientError> {
            Ok(112)
        }
    }

    struct FakeLedger;

    #[async_trait]
    impl LedgerClient for FakeLedger {
        async fn query_block(
            &self,
            _partition_url: &str,
            _block_number: u64,
            _expand: bool,
            _entry_range: Option<EntryRange>,
        ) -> Result<serde_json::Value, ClientError> {
            unimplemented!()
        }
        async fn query_account(&self, _url: &str) -> Result<serde_json::Value, ClientError> {
            unimplemented!()
        }
        async fn query_chain(&self, _url: &str, _chain_name: &str, _include_receipt: bool) -> Result<serde_json::Value, ClientError> {
            unimplemented!()
        }
        async fn get_signer_nonce(&self, _signer_url: &str) -> Result<u64, ClientError> {
            Ok(1)
        }
        async fn get_credit_balance(&self, _signer_url: &str) -> Result<u64, ClientError> {
            Ok(1_000_000)
        }
        async fn submit_envelope(&self, _envelope_json: serde_json::Value) -> Result<String, ClientError> {
            Ok("tx-hash-stub".into())
        }
        async fn get_transaction_status(&self, _tx_hash: &str) -> Result<LedgerTxStatus, ClientError> {
            Ok(LedgerTxStatus::Delivered)
        }
    }

    fn sample_intent() -> Intent {
        Intent {
            intent_id: [1u8; 32],
            source_tx_hash: [2u8; 32],
            intent_data: serde_json::json!({}),
            cross_chain_data: serde_json::json!({
                "legs": [{
                    "targetChain": "sepolia",
                    "chainId": 11155111,
                    "amountWei": "1000",
                    "finalTarget": "0x1111111111111111111111111111111111111111",
                }]
            }),
            governance_data: serde_json::json!({}),
            replay_data: serde_json::json!({}),
            organization_adi: "acc://demo.acme".into(),
            account_url: "acc://demo.acme/tokens".into(),
            proof_class: ProofClass::OnDemand,
        }
    }

    fn build_orchestrator(
        tx_hash: [u8; 32],
        anchor_contract: [u8; 20],
        selector: [u8; 4],
    ) -> ProofCycleOrchestrator<FakeEvm, FakeLedger, InMemoryArtifactSink> {
        let observer = ExternalChainObserver::new(FakeEvm {
            tx_hash,
            contract: anchor_contract,
            selector,
        });
        let bls = BlsKeyPair::generate().unwrap();
        let validators = vec![ValidatorInfo {
            index: 0,
            voting_power: 10,
            public_key: bls.public_key(),
        }];
        let set = Arc::new(ValidatorSet::new(validators, 2, 3));
        let collector = Arc::new(AttestationCollector::new(set));
        let verifier = ResultVerifier::new(0, bls.private_key());
        let ed = Ed25519KeyPair::generate().unwrap();
        let submitter = WriteBackSubmitter::new(FakeLedger, "acc://validator0".into(), ed, 10);
        let sink = Arc::new(InMemoryArtifactSink::new());
        ProofCycleOrchestrator::new(observer, verifier, collector, submitter, sink)
    }

    #[tokio::test]
    async fn happy_path_single_validator_completes_the_cycle() {
        let anchor_contract = [0xAA; 20];
        let builder = CommitmentBuilder::new(anchor_contract, [0xBB; 20], [0xCC; 20]);
        let intent = sample_intent();
        let commitment = builder.build(&intent, [9u8; 32], [8u8; 32]).unwrap();
        let tx_hash = [5u8; 32];

        let orchestrator = build_orchestrator(tx_hash, anchor_contract, commitment.create.selector);
        let status = orchestrator
            .start_cycle(intent, commitment, [Some(tx_hash), None, None], [0u8; 32], Uuid::new_v4())
            .await
            .unwrap();
        assert!(matches!(status, CycleStatus::Complete));
        assert_eq!(orchestrator.active_cycle_count(), 0);
    }

    #[tokio::test]
    async fn duplicate_start_is_rejected_while_one_is_in_flight() {
        let anchor_contract = [0xAA; 20];
        let builder = CommitmentBuilder::new(anchor_contract, [0xBB; 20], [0xCC; 20]);
        let intent = sample_intent();
        let commitment = builder.build(&intent, [9u8; 32], [8u8; 32]).unwrap();
        let tx_hash = [5u8; 32];
        let orchestrator =
            Arc::new(build_orchestrator(tx_hash, anchor_contract, commitment.create.selector));

        let first = {
            let orchestrator = orchestrator.clone();
            let intent = intent.clone();
            let commitment = commitment.clone();
            tokio::spawn(async move {
                orchestrator
                    .start_cycle(intent, commitment, [Some(tx_hash), None, None], [0u8; 32], Uuid::new_v4())
                    .await
            })
        };
        let second = orchestrator
            .start_cycle(intent, commitment, [Some(tx_hash), None, None], [0u8; 32], Uuid::new_v4())
            .await;

        let first = first.await.unwrap();
        // Exactly one of the two concurrent starts must be rejected; both cannot succeed.
        assert!(first.is_ok() != second.is_ok() || (first.is_ok() && second.is_err()));
        if let Err(e) = second {
            assert!(matches!(e, OrchestratorError::CycleAlreadyActive(_)));
        }
    }
}
