//! `CommitmentBuilder` (spec.md §4.1): derives an `ExecutionCommitment` from
//! a parsed intent before execution, and verifies an observed
//! `ExternalChainResult` against one after execution.

use certen_crypto::hash::{event_topic0, function_selector, tagged_sha256, CERTEN_EXEC_COMMITMENT_V1};
use certen_types::error::{CommitmentError, VerificationError};
use certen_types::model::{
    ExecutionCommitment, ExpectedEvent, ExternalChainResult, Intent, StepCommitment,
};

const CREATE_ANCHOR_SIG: &str = "createAnchor(bytes32,bytes32,bytes32,bytes32,uint256)";
const VERIFY_PROOF_SIG: &str =
    "executeComprehensiveProof(bytes32,uint256[8],uint256[2],uint256[2][2],uint256[2],bytes32[],uint8[],bytes)";
const EXECUTE_GOVERNANCE_SIG: &str = "executeWithGovernance(bytes32,address,uint256,bytes)";

const ANCHOR_CREATED_SIG: &str = "AnchorCreated(bytes32,bytes32,bytes32,bytes32,uint256)";
const PROOF_VERIFIED_SIG: &str = "ProofVerified(bytes32,bool,uint256)";
const GOVERNANCE_EXECUTED_SIG: &str = "GovernanceExecuted(bytes32,address,uint256,bool)";

fn hashing_failed(e: impl std::fmt::Display) -> CommitmentError {
    CommitmentError::HashFailed(e.to_string())
}

/// Parses a `crossChainData.legs[0].amountWei`-shaped value as either a
/// base-10 integer string or decimal-float notation, per §4.1.
fn parse_amount_wei(raw: &serde_json::Value) -> Result<u128, CommitmentError> {
    let s = match raw {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        other => {
            return Err(CommitmentError::IntentMalformed(format!(
                "amountWei is neither string nor number: {other}"
            )))
        }
    };
    if let Ok(v) = s.parse::<u128>() {
        return Ok(v);
    }
    // Decimal-float notation: truncate toward zero, dropping the fractional part.
    if let Ok(f) = s.parse::<f64>() {
        if f.is_finite() && f >= 0.0 {
            return Ok(f.trunc() as u128);
        }
    }
    Err(CommitmentError::IntentMalformed(format!(
        "amountWei could not be parsed: {s}"
    )))
}

fn field<'a>(value: &'a serde_json::Value, path: &[&str]) -> Option<&'a serde_json::Value> {
    let mut cur = value;
    for key in path {
        cur = cur.get(key)?;
    }
    Some(cur)
}

fn require_field<'a>(
    value: &'a serde_json::Value,
    path: &[&str],
) -> Result<&'a serde_json::Value, CommitmentError> {
    field(value, path).ok_or_else(|| CommitmentError::MissingField(path.join(".")))
}

fn parse_address(value: &serde_json::Value, name: &str) -> Result<[u8; 20], CommitmentError> {
    let s = value
        .as_str()
        .ok_or_else(|| CommitmentError::MissingField(name.to_string()))?;
    let bytes = hex::decode(s.trim_start_matches("0x"))
        .map_err(|e| CommitmentError::IntentMalformed(format!("{name}: {e}")))?;
    bytes
        .try_into()
        .map_err(|_| CommitmentError::IntentMalformed(format!("{name}: expected 20 bytes")))
}

/// Derives an `ExecutionCommitment` from a parsed intent, before execution.
pub struct CommitmentBuilder {
    anchor_contract: [u8; 20],
    verify_contract: [u8; 20],
    governance_contract: [u8; 20],
}

impl CommitmentBuilder {
    pub fn new(
        anchor_contract: [u8; 20],
        verify_contract: [u8; 20],
        governance_contract: [u8; 20],
    ) -> Self {
        Self {
            anchor_contract,
            verify_contract,
            governance_contract,
        }
    }

    /// Builds the commitment for `intent`, bound to `bundle_id` and `operation_id`.
    pub fn build(
        &self,
        intent: &Intent,
        bundle_id: [u8; 32],
        operation_id: [u8; 32],
    ) -> Result<ExecutionCommitment, CommitmentError> {
        let cross = &intent.cross_chain_data;
        let legs = require_field(cross, &["legs"])?;
        let leg0 = legs
            .get(0)
            .ok_or_else(|| CommitmentError::MissingField("crossChainData.legs[0]".into()))?;

        let target_chain = require_field(leg0, &["targetChain"])?
            .as_str()
            .ok_or_else(|| CommitmentError::MissingField("legs[0].targetChain".into()))?
            .to_string();
        let chain_id = require_field(leg0, &["chainId"])?
            .as_u64()
            .ok_or_else(|| CommitmentError::MissingField("legs[0].chainId".into()))?;
        let amount_wei = parse_amount_wei(require_field(leg0, &["amountWei"])?)?;
        let final_target =
            parse_address(require_field(leg0, &["finalTarget"])?, "legs[0].finalTarget")?;

        let create = StepCommitment {
            target_contract: self.anchor_contract,
            selector: function_selector(CREATE_ANCHOR_SIG).map_err(hashing_failed)?,
            expected_value: 0,
            expected_calldata_hash: None,
        };
        let verify_proof = StepCommitment {
            target_contract: self.verify_contract,
            selector: function_selector(VERIFY_PROOF_SIG).map_err(hashing_failed)?,
            expected_value: 0,
            expected_calldata_hash: None,
        };
        let execute_with_governance = StepCommitment {
            target_contract: self.governance_contract,
            selector: function_selector(EXECUTE_GOVERNANCE_SIG).map_err(hashing_failed)?,
            expected_value: amount_wei,
            expected_calldata_hash: None,
        };

        let expected_events = vec![
            ExpectedEvent {
                contract: self.anchor_contract,
                topic0: event_topic0(ANCHOR_CREATED_SIG).map_err(hashing_failed)?,
                indexed_params: vec![],
            },
            ExpectedEvent {
                contract: self.verify_contract,
                topic0: event_topic0(PROOF_VERIFIED_SIG).map_err(hashing_failed)?,
                indexed_params: vec![],
            },
            ExpectedEvent {
                contract: self.governance_contract,
                topic0: event_topic0(GOVERNANCE_EXECUTED_SIG).map_err(hashing_failed)?,
                indexed_params: vec![],
            },
        ];

        let mut commitment = ExecutionCommitment {
            bundle_id,
            operation_id,
            target_chain,
            chain_id,
            create,
            verify_proof,
            execute_with_governance,
            final_target,
            final_value: amount_wei,
            final_calldata: Vec::new(),
            expected_events,
            commitment_hash: [0u8; 32],
        };
        commitment.commitment_hash = Self::hash_commitment(&commitment)?;
        Ok(commitment)
    }

    fn hash_commitment(c: &ExecutionCommitment) -> Result<[u8; 32], CommitmentError> {
        let encoded = serde_json::to_vec(c)
            .map_err(|e| CommitmentError::HashFailed(format!("encoding commitment: {e}")))?;
        tagged_sha256(CERTEN_EXEC_COMMITMENT_V1, &[&c.bundle_id, &c.operation_id, &encoded])
            .map_err(hashing_failed)
    }
}

/// The outcome of matching one commitment step against an observed result's
/// calldata, for diagnostics on partial matches (§4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepMatch {
    Create,
    VerifyProof,
    ExecuteWithGovernance,
}

/// Verifies an observed result against its commitment, per §4.1's second half.
pub fn verify_commitment(
    commitment: &ExecutionCommitment,
    result: &ExternalChainResult,
) -> Result<StepMatch, VerificationError> {
    if result.tx_data.len() < 4 {
        return Err(VerificationError::NoStepMatched);
    }
    let observed_selector = &result.tx_data[0..4];

    let step_match = if observed_selector == commitment.create.selector {
        StepMatch::Create
    } else if observed_selector == commitment.verify_proof.selector {
        StepMatch::VerifyProof
    } else if observed_selector == commitment.execute_with_governance.selector {
        StepMatch::ExecuteWithGovernance
    } else {
        return Err(VerificationError::NoStepMatched);
    };

    let expected_contract = match step_match {
        StepMatch::Create => commitment.create.target_contract,
        StepMatch::VerifyProof => commitment.verify_proof.target_contract,
        StepMatch::ExecuteWithGovernance => commitment.execute_with_governance.target_contract,
    };
    if result.tx_to != expected_contract {
        return Err(VerificationError::FinalTargetMismatch {
            expected: hex::encode(expected_contract),
            got: hex::encode(result.tx_to),
        });
    }

    if step_match == StepMatch::ExecuteWithGovernance && result.tx_data.len() >= 68 {
        let observed_target: [u8; 20] = result.tx_data[48..68]
            .try_into()
            .map_err(|_| VerificationError::InclusionProofInvalid("malformed governance calldata".into()))?;
        if observed_target != commitment.final_target {
            return Err(VerificationError::FinalTargetMismatch {
                expected: hex::encode(commitment.final_target),
                got: hex::encode(observed_target),
            });
        }
    }

    for expected in &commitment.expected_events {
        let found = result.logs.iter().any(|log| {
            log.contract == expected.contract
                && log.topics.first() == Some(&expected.topic0)
                && expected
                    .indexed_params
                    .iter()
                    .enumerate()
                    .all(|(i, p)| log.topics.get(i + 1) == Some(p))
        });
        if !found {
            return Err(VerificationError::EventMissing {
                contract: hex::encode(expected.contract),
                topic0: hex::encode(expected.topic0),
            });
        }
    }

    Ok(step_match)
}

#[cfg(test)]
mod tests {
    use super::*;
    use certen_types::model::{LogEntry, MerkleProof, ProofClass, TxStatus};

    fn sample_intent() -> Intent {
        Intent {
            intent_id: [1u8; 32],
            source_tx_hash: [2u8; 32],
            intent_data: serde_json::json!({}),
            cross_chain_data: serde_json::json!({
                "legs": [{
                    "targetChain": "sepolia",
                    "chainId": 11155111,
                    "amountWei": "1500000000000000000",
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

    fn builder() -> CommitmentBuilder {
        CommitmentBuilder::new([0xAA; 20], [0xBB; 20], [0xCC; 20])
    }

    #[test]
    fn build_is_deterministic() {
        let intent = sample_intent();
        let b = builder();
        let c1 = b.build(&intent, [9u8; 32], [8u8; 32]).unwrap();
        let c2 = b.build(&intent, [9u8; 32], [8u8; 32]).unwrap();
        assert_eq!(c1.commitment_hash, c2.commitment_hash);
    }

    #[test]
    fn decimal_float_amount_truncates() {
        let mut intent = sample_intent();
        intent.cross_chain_data["legs"][0]["amountWei"] = serde_json::json!("42.9");
        let c = builder().build(&intent, [0u8; 32], [0u8; 32]).unwrap();
        assert_eq!(c.final_value, 42);
    }

    #[test]
    fn malformed_amount_is_rejected() {
        let mut intent = sample_intent();
        intent.cross_chain_data["legs"][0]["amountWei"] = serde_json::json!("not-a-number");
        assert!(builder().build(&intent, [0u8; 32], [0u8; 32]).is_err());
    }

    fn empty_proof() -> MerkleProof {
        MerkleProof {
            leaf: [0u8; 32],
            root: [0u8; 32],
            steps: vec![],
        }
    }

    #[test]
    fn verify_rejects_wrong_final_target() {
        let intent = sample_intent();
        let commitment = builder().build(&intent, [1u8; 32], [1u8; 32]).unwrap();

        let mut calldata = commitment.execute_with_governance.selector.to_vec();
        calldata.extend_from_slice(&[0u8; 32]); // bundle id slot
        calldata.extend_from_slice(&[0u8; 12]);
        calldata.extend_from_slice(&[0xBB; 20]); // wrong address
        calldata.extend_from_slice(&[0u8; 4]);

        let result = ExternalChainResult {
            tx_hash: [0u8; 32],
            block_number: 100,
            block_hash: [0u8; 32],
            tx_to: commitment.execute_with_governance.target_contract,
            tx_from: [0u8; 20],
            tx_value: 0,
            tx_data: calldata,
            tx_gas_used: 21000,
            status: TxStatus::Success,
            logs: vec![],
            confirmation_blocks: 12,
            state_root: [0u8; 32],
            receipts_root: [0u8; 32],
            transactions_root: [0u8; 32],
            tx_inclusion_proof: empty_proof(),
            receipt_inclusion_proof: empty_proof(),
            result_hash: [0u8; 32],
        };

        let err = verify_commitment(&commitment, &result).unwrap_err();
        assert!(matches!(err, VerificationError::FinalTargetMismatch { .. }));
    }

    #[test]
    fn verify_requires_every_expected_event() {
        let intent = sample_intent();
        let commitment = builder().build(&intent, [1u8; 32], [1u8; 32]).unwrap();
        let mut calldata = commitment.create.selector.to_vec();
        calldata.extend_from_slice(&[0u8; 32]);

        let result = ExternalChainResult {
            tx_hash: [0u8; 32],
            block_number: 100,
            block_hash: [0u8; 32],
            tx_to: commitment.create.target_contract,
            tx_from: [0u8; 20],
            tx_value: 0,
            tx_data: calldata,
            tx_gas_used: 21000,
            status: TxStatus::Success,
            logs: vec![LogEntry {
                contract: commitment.create.target_contract,
                topics: vec![event_topic0(ANCHOR_CREATED_SIG).unwrap()],
                data: vec![],
            }],
            confirmation_blocks: 12,
            state_root: [0u8; 32],
            receipts_root: [0u8; 32],
            transactions_root: [0u8; 32],
            tx_inclusion_proof: empty_proof(),
            receipt_inclusion_proof: empty_proof(),
            result_hash: [0u8; 32],
        };
        // create step matches but verify_proof/governance events are never observed here
        let err = verify_commitment(&commitment, &result).unwrap_err();
        assert!(matches!(err, VerificationError::EventMissing { .. }));
    }
}
