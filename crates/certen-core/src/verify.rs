//! `ResultVerifier` (spec.md §4.3): verifies an observed `ExternalChainResult`
//! against its `ExecutionCommitment`, then signs and submits this
//! validator's attestation into the `AttestationCollector`.

use crate::attestation::AttestationCollector;
use crate::commitment::verify_commitment;
use certen_crypto::hash::{tagged_sha256, CERTEN_RESULT_V1};
use certen_crypto::merkle::verify_proof;
use certen_crypto::sign::bls::BlsPrivateKey;
use certen_types::error::{AttestationError, VerificationError};
use certen_types::model::{AggregatedAttestation, ExecutionCommitment, ExternalChainResult};

/// The outcome of one validator's submission: its own signature bytes
/// (recorded regardless of whether threshold was reached) plus the
/// aggregate, if this submission is the one that crossed it.
pub struct AttestationSubmission {
    pub signature_bytes: Vec<u8>,
    pub aggregated: Option<AggregatedAttestation>,
}

pub struct ResultVerifier {
    validator_index: u32,
    bls_key: BlsPrivateKey,
}

impl ResultVerifier {
    pub fn new(validator_index: u32, bls_key: BlsPrivateKey) -> Self {
        Self {
            validator_index,
            bls_key,
        }
    }

    pub fn validator_index(&self) -> u32 {
        self.validator_index
    }

    /// Verifies `result` against `commitment`, then signs and submits this
    /// validator's attestation. Returns the aggregate the instant it is
    /// first produced.
    pub fn verify_and_attest(
        &self,
        result: &ExternalChainResult,
        commitment: &ExecutionCommitment,
        collector: &AttestationCollector,
    ) -> Result<AttestationSubmission, VerificationError> {
        verify_commitment(commitment, result)?;

        if !verify_proof(&result.tx_inclusion_proof)
            .map_err(|e| VerificationError::InclusionProofInvalid(e.to_string()))?
        {
            return Err(VerificationError::InclusionProofInvalid(
                "transaction inclusion proof did not fold to its recorded root".into(),
            ));
        }
        if !verify_proof(&result.receipt_inclusion_proof)
            .map_err(|e| VerificationError::InclusionProofInvalid(e.to_string()))?
        {
            return Err(VerificationError::InclusionProofInvalid(
                "receipt inclusion proof did not fold to its recorded root".into(),
            ));
        }

        let message_hash = tagged_sha256(
            CERTEN_RESULT_V1,
            &[&result.result_hash, &commitment.commitment_hash],
        )
        .map_err(|e| VerificationError::InclusionProofInvalid(e.to_string()))?;

        let signature = self
            .bls_key
            .sign(&message_hash)
            .map_err(|e| VerificationError::InclusionProofInvalid(e.to_string()))?;
        let signature_bytes = signature.to_bytes();

        let aggregated = collector
            .submit(result.result_hash, message_hash, self.validator_index, signature)
            .map_err(|e: AttestationError| VerificationError::InclusionProofInvalid(e.to_string()))?;

        Ok(AttestationSubmission {
            signature_bytes,
            aggregated,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attestation::{ValidatorInfo, ValidatorSet};
    use crate::commitment::CommitmentBuilder;
    use certen_crypto::hash::event_topic0;
    use certen_crypto::merkle;
    use certen_crypto::sign::bls::BlsKeyPair;
    use certen_types::model::{Intent, LogEntry, ProofClass, TxStatus};
    use std::sync::Arc;

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

    #[test]
    fn verify_and_attest_reaches_threshold_on_single_validator() {
        let builder = CommitmentBuilder::new([0xAA; 20], [0xBB; 20], [0xCC; 20]);
        let intent = sample_intent();
        let commitment = builder.build(&intent, [9u8; 32], [8u8; 32]).unwrap();

        let tx_hash = [5u8; 32];
        let tree = merkle::build_tree(&[tx_hash]).unwrap();
        let tx_proof = certen_types::model::MerkleProof {
            leaf: merkle::leaf_hash(&tx_hash).unwrap(),
            root: tree.root,
            steps: tree.paths[0].clone(),
        };

        let mut calldata = commitment.create.selector.to_vec();
        calldata.extend_from_slice(&[0u8; 32]);

        let result = ExternalChainResult {
            tx_hash,
            block_number: 100,
            block_hash: [9u8; 32],
            tx_to: commitment.create.target_contract,
            tx_from: [0u8; 20],
            tx_value: 0,
            tx_data: calldata,
            tx_gas_used: 21000,
            status: TxStatus::Success,
            logs: vec![
                LogEntry {
                    contract: commitment.create.target_contract,
                    topics: vec![event_topic0(
                        "AnchorCreated(bytes32,bytes32,bytes32,bytes32,uint256)",
                    )
                    .unwrap()],
                    data: vec![],
                },
                LogEntry {
                    contract: commitment.verify_proof.target_contract,
                    topics: vec![event_topic0("ProofVerified(bytes32,bool,uint256)").unwrap()],
                    data: vec![],
                },
                LogEntry {
                    contract: commitment.execute_with_governance.target_contract,
                    topics: vec![event_topic0(
                        "GovernanceExecuted(bytes32,address,uint256,bool)",
                    )
                    .unwrap()],
                    data: vec![],
                },
            ],
            confirmation_blocks: 12,
            state_root: [0u8; 32],
            receipts_root: [0u8; 32],
            transactions_root: tree.root,
            tx_inclusion_proof: tx_proof.clone(),
            receipt_inclusion_proof: tx_proof,
            result_hash: [7u8; 32],
        };

        let kp = BlsKeyPair::generate().unwrap();
        let validators = vec![ValidatorInfo {
            index: 0,
            voting_power: 100,
            public_key: kp.public_key(),
        }];
        let set = Arc::new(ValidatorSet::new(validators, 2, 3));
        let collector = AttestationCollector::new(set);
        let verifier = ResultVerifier::new(0, kp.private_key());

        let submission = verifier
            .verify_and_attest(&result, &commitment, &collector)
            .unwrap();
        assert!(!submission.signature_bytes.is_empty());
        assert!(submission.aggregated.is_some());
        assert!(submission.aggregated.unwrap().threshold_met);
    }
}
