//! Integration coverage for spec.md §8 Scenario C (transient RPC, retried)
//! and Scenario D (insufficient credits, write-back fails but stages 7-8
//! stay persisted). The happy path (Scenario A) and duplicate-start
//! rejection (Scenario F) are covered by `orchestrator.rs`'s own unit tests.

use async_trait::async_trait;
use certen_client::{
    EntryRange, EvmBlock, EvmClient, EvmLogEntry, EvmReceipt, EvmTransaction, LedgerClient,
    LedgerTxStatus,
};
use certen_core::{
    AttestationCollector, CommitmentBuilder, ExternalChainObserver, ProofCycleOrchestrator,
    ResultVerifier, ValidatorInfo, ValidatorSet, WriteBackSubmitter,
};
use certen_crypto::hash::event_topic0;
use certen_crypto::sign::bls::BlsKeyPair;
use certen_crypto::sign::eddsa::Ed25519KeyPair;
use certen_storage::{ArtifactSink, InMemoryArtifactSink};
use certen_types::error::ClientError;
use certen_types::model::{CycleStage, CycleStatus, ErrorKind, Intent, ProofClass};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

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

struct FlakyEvm {
    contract: [u8; 20],
    selector: [u8; 4],
    tx_hash: [u8; 32],
    head_calls: AtomicU64,
    /// Number of leading `get_block_number` calls that fail transiently
    /// before the call starts succeeding.
    fail_first_n: u64,
}

#[async_trait]
impl EvmClient for FlakyEvm {
    async fn get_transaction_receipt(&self, tx_hash: [u8; 32]) -> Result<Option<EvmReceipt>, ClientError> {
        Ok(Some(EvmReceipt {
            tx_hash,
            block_number: 100,
            block_hash: [9u8; 32],
            status_success: true,
            gas_used: 21000,
            logs: vec![
                EvmLogEntry {
                    address: self.contract,
                    topics: vec![event_topic0("AnchorCreated(bytes32,bytes32,bytes32,bytes32,uint256)").unwrap()],
                    data: vec![],
                },
                EvmLogEntry {
                    address: [0xBB; 20],
                    topics: vec![event_topic0("ProofVerified(bytes32,bool,uint256)").unwrap()],
                    data: vec![],
                },
                EvmLogEntry {
                    address: [0xCC; 20],
                    topics: vec![event_topic0("GovernanceExecuted(bytes32,address,uint256,bool)").unwrap()],
                    data: vec![],
                },
            ],
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
        let call = self.head_calls.fetch_add(1, Ordering::SeqCst);
        if call < self.fail_first_n {
            return Err(ClientError::Transport {
                endpoint: "evm-rpc".into(),
                source: "connection reset".into(),
            });
        }
        Ok(112)
    }
}

struct StubLedger {
    credit_balance: u64,
}

#[async_trait]
impl LedgerClient for StubLedger {
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
        Ok(self.credit_balance)
    }
    async fn submit_envelope(&self, _envelope_json: serde_json::Value) -> Result<String, ClientError> {
        Ok("tx-hash-stub".into())
    }
    async fn get_transaction_status(&self, _tx_hash: &str) -> Result<LedgerTxStatus, ClientError> {
        Ok(LedgerTxStatus::Delivered)
    }
}

fn build_orchestrator(
    evm: FlakyEvm,
    ledger: StubLedger,
    sink: Arc<InMemoryArtifactSink>,
) -> ProofCycleOrchestrator<FlakyEvm, StubLedger, InMemoryArtifactSink> {
    let observer = ExternalChainObserver::new(evm);
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
    let submitter = WriteBackSubmitter::new(ledger, "acc://validator0".into(), ed, 10);
    ProofCycleOrchestrator::new(observer, verifier, collector, submitter, sink)
}

/// Scenario C: the observer's confirmation poll fails transiently twice
/// before succeeding. The cycle still completes once the head is finally
/// reachable, rather than aborting on the first transport hiccup.
#[tokio::test]
async fn scenario_c_transient_rpc_is_retried_and_cycle_completes() {
    let anchor_contract = [0xAA; 20];
    let builder = CommitmentBuilder::new(anchor_contract, [0xBB; 20], [0xCC; 20]);
    let intent = sample_intent();
    let commitment = builder.build(&intent, [9u8; 32], [8u8; 32]).unwrap();
    let tx_hash = [5u8; 32];

    let evm = FlakyEvm {
        contract: anchor_contract,
        selector: commitment.create.selector,
        tx_hash,
        head_calls: AtomicU64::new(0),
        fail_first_n: 2,
    };
    let sink = Arc::new(InMemoryArtifactSink::new());
    let orchestrator = build_orchestrator(evm, StubLedger { credit_balance: 1_000_000 }, sink.clone());

    let status = orchestrator
        .start_cycle(intent, commitment, [Some(tx_hash), None, None], [0u8; 32], Uuid::new_v4())
        .await
        .unwrap();

    assert!(matches!(status, CycleStatus::Complete));
    assert_eq!(orchestrator.active_cycle_count(), 0);
}

/// Scenario D: the signer's credit balance is below the write-back's
/// required cost. The cycle ends `Failed(stage=WriteBack, kind=Resource)`
/// but the artifact row persisted during stages 7-8 (including the
/// attestation summary) stays visible through the sink.
#[tokio::test]
async fn scenario_d_insufficient_credits_fails_writeback_but_keeps_earlier_artifacts() {
    let anchor_contract = [0xAA; 20];
    let builder = CommitmentBuilder::new(anchor_contract, [0xBB; 20], [0xCC; 20]);
    let intent = sample_intent();
    let commitment = builder.build(&intent, [9u8; 32], [8u8; 32]).unwrap();
    let tx_hash = [5u8; 32];

    let evm = FlakyEvm {
        contract: anchor_contract,
        selector: commitment.create.selector,
        tx_hash,
        head_calls: AtomicU64::new(0),
        fail_first_n: 0,
    };
    let sink = Arc::new(InMemoryArtifactSink::new());
    let proof_artifact_id = Uuid::new_v4();
    let orchestrator = build_orchestrator(evm, StubLedger { credit_balance: 1 }, sink.clone());

    let status = orchestrator
        .start_cycle(intent, commitment, [Some(tx_hash), None, None], [0u8; 32], proof_artifact_id)
        .await
        .unwrap();

    match status {
        CycleStatus::Failed { stage, kind, .. } => {
            assert!(matches!(stage, CycleStage::WriteBack));
            assert!(matches!(kind, ErrorKind::Resource));
        }
        other => panic!("expected Failed(WriteBack, Resource), got {other:?}"),
    }

    let artifact = sink
        .get_proof_artifact(proof_artifact_id)
        .await
        .unwrap()
        .expect("stage 7-8 artifact row must remain visible after a stage-9 failure");
    assert!(artifact.create_result_json.is_some());
    assert!(artifact.attestation_summary_json.is_some());
    assert!(artifact.write_back_tx_id.is_none());
}
