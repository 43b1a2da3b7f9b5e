//! `AttestationCollector` (spec.md §4.4): accumulates per-validator BLS
//! signatures over a result hash and aggregates once the BFT threshold is
//! crossed.

use certen_crypto::sign::bls::{aggregate_public_keys, aggregate_signatures, BlsPublicKey, BlsSignature};
use certen_types::error::AttestationError;
use certen_types::model::AggregatedAttestation;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A validator's entry in the configured set: its index, voting power, and
/// BLS public key.
#[derive(Debug, Clone)]
pub struct ValidatorInfo {
    pub index: u32,
    pub voting_power: u64,
    pub public_key: BlsPublicKey,
}

/// The fixed validator set and BFT threshold an `AttestationCollector`
/// verifies against (§9 open question c: a startup parameter, not an
/// on-chain registry lookup).
#[derive(Debug, Clone)]
pub struct ValidatorSet {
    pub validators: BTreeMap<u32, ValidatorInfo>,
    pub total_voting_power: u64,
    pub threshold_numerator: u64,
    pub threshold_denominator: u64,
}

impl ValidatorSet {
    pub fn new(validators: Vec<ValidatorInfo>, threshold_numerator: u64, threshold_denominator: u64) -> Self {
        let total_voting_power = validators.iter().map(|v| v.voting_power).sum();
        Self {
            validators: validators.into_iter().map(|v| (v.index, v)).collect(),
            total_voting_power,
            threshold_numerator,
            threshold_denominator,
        }
    }

    fn threshold_met(&self, signed_voting_power: u64) -> bool {
        signed_voting_power * self.threshold_denominator >= self.total_voting_power * self.threshold_numerator
    }
}

struct ResultEntry {
    attestations: BTreeMap<u32, BlsSignature>,
    refused: std::collections::BTreeSet<u32>,
    aggregated: Option<AggregatedAttestation>,
}

/// Accumulates attestations keyed by `result_hash` and aggregates once
/// threshold is crossed, invoking the threshold callback exactly once per
/// result hash.
pub struct AttestationCollector {
    validators: Arc<ValidatorSet>,
    entries: std::sync::Mutex<BTreeMap<[u8; 32], ResultEntry>>,
}

impl AttestationCollector {
    pub fn new(validators: Arc<ValidatorSet>) -> Self {
        Self {
            validators,
            entries: std::sync::Mutex::new(BTreeMap::new()),
        }
    }

    /// Submits one validator's signature over `message_hash` for `result_hash`.
    /// Returns the aggregate the instant threshold is first crossed, `None`
    /// otherwise (including on subsequent calls after aggregation already ran).
    pub fn submit(
        &self,
        result_hash: [u8; 32],
        message_hash: [u8; 32],
        validator_index: u32,
        signature: BlsSignature,
    ) -> Result<Option<AggregatedAttestation>, AttestationError> {
        let validator = self
            .validators
            .validators
            .get(&validator_index)
            .ok_or(AttestationError::UnknownValidator(validator_index))?;

        validator
            .public_key
            .verify(&message_hash, &signature)
            .map_err(|_| AttestationError::InvalidSignature(validator_index))?;

        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let entry = entries.entry(result_hash).or_insert_with(|| ResultEntry {
            attestations: BTreeMap::new(),
            refused: std::collections::BTreeSet::new(),
            aggregated: None,
        });

        if entry.aggregated.is_some() {
            return Ok(None);
        }
        if entry.attestations.contains_key(&validator_index) {
            return Err(AttestationError::DuplicateValidator(validator_index));
        }
        entry.attestations.insert(validator_index, signature);
        certen_telemetry::cycle_metrics().inc_attestations_received();

        let signed_voting_power: u64 = entry
            .attestations
            .keys()
            .filter_map(|i| self.validators.validators.get(i))
            .map(|v| v.voting_power)
            .sum();

        if !self.validators.threshold_met(signed_voting_power) {
            let refused: u64 = entry
                .refused
                .iter()
                .filter_map(|i| self.validators.validators.get(i))
                .map(|v| v.voting_power)
                .sum();
            let max_tolerable_refusals = self.validators.total_voting_power
                - (self.validators.total_voting_power * self.validators.threshold_numerator)
                    / self.validators.threshold_denominator;
            if refused > max_tolerable_refusals {
                return Err(AttestationError::ThresholdImpossible {
                    signed: signed_voting_power,
                    refused,
                    total: self.validators.total_voting_power,
                });
            }
            return Ok(None);
        }

        let indices: Vec<u32> = entry.attestations.keys().copied().collect();
        let sigs: Vec<BlsSignature> = entry.attestations.values().cloned().collect();
        let pks: Vec<BlsPublicKey> = indices
            .iter()
            .filter_map(|i| self.validators.validators.get(i).map(|v| v.public_key.clone()))
            .collect();

        let aggregate_signature = aggregate_signatures(&sigs).map_err(|e| {
            tracing::error!(target = "certen_core", error = %e, "bls signature aggregation failed");
            AttestationError::InvalidSignature(0)
        })?;
        aggregate_public_keys(&pks).map_err(|e| {
            tracing::error!(target = "certen_core", error = %e, "bls public key aggregation failed");
            AttestationError::InvalidSignature(0)
        })?;

        let attestation = AggregatedAttestation {
            result_hash,
            validator_indices: indices,
            signed_voting_power,
            total_voting_power: self.validators.total_voting_power,
            threshold_met: true,
            aggregate_signature: aggregate_signature.to_bytes(),
            message_hash,
        };
        entry.aggregated = Some(attestation.clone());
        certen_telemetry::cycle_metrics().inc_attestation_thresholds_reached();
        Ok(Some(attestation))
    }

    /// Records that a validator explicitly refused to attest, for the
    /// `ThresholdImpossible` refusal-count check.
    pub fn record_refusal(&self, result_hash: [u8; 32], validator_index: u32) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries
            .entry(result_hash)
            .or_insert_with(|| ResultEntry {
                attestations: BTreeMap::new(),
                refused: std::collections::BTreeSet::new(),
                aggregated: None,
            })
            .refused
            .insert(validator_index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use certen_crypto::sign::bls::BlsKeyPair;

    fn build_set(n: usize, power_each: u64) -> (Arc<ValidatorSet>, Vec<BlsKeyPair>) {
        let kps: Vec<BlsKeyPair> = (0..n).map(|_| BlsKeyPair::generate().unwrap()).collect();
        let validators = kps
            .iter()
            .enumerate()
            .map(|(i, kp)| ValidatorInfo {
                index: i as u32,
                voting_power: power_each,
                public_key: kp.public_key(),
            })
            .collect();
        (Arc::new(ValidatorSet::new(validators, 2, 3)), kps)
    }

    #[test]
    fn threshold_exactly_at_fraction_is_met() {
        // total=9, threshold (2,3): signed=6 must satisfy 6*3 >= 9*2 (§8 boundary behavior).
        let (set, kps) = build_set(3, 3);
        let collector = AttestationCollector::new(set);
        let message = [1u8; 32];
        let result_hash = [2u8; 32];

        let sig0 = kps[0].sign(&message).unwrap();
        assert!(collector.submit(result_hash, message, 0, sig0).unwrap().is_none());

        let sig1 = kps[1].sign(&message).unwrap();
        let aggregated = collector.submit(result_hash, message, 1, sig1).unwrap();
        assert!(aggregated.is_some());
        let aggregated = aggregated.unwrap();
        assert!(aggregated.threshold_met);
        assert_eq!(aggregated.signed_voting_power, 6);
        assert_eq!(aggregated.validator_indices, vec![0, 1]);
    }

    #[test]
    fn duplicate_validator_is_rejected() {
        let (set, kps) = build_set(3, 3);
        let collector = AttestationCollector::new(set);
        let message = [1u8; 32];
        let result_hash = [2u8; 32];
        let sig0 = kps[0].sign(&message).unwrap();
        collector.submit(result_hash, message, 0, sig0.clone()).unwrap();
        let err = collector.submit(result_hash, message, 0, sig0).unwrap_err();
        assert!(matches!(err, AttestationError::DuplicateValidator(0)));
    }

    #[test]
    fn unknown_validator_is_rejected() {
        let (set, kps) = build_set(1, 10);
        let collector = AttestationCollector::new(set);
        let message = [1u8; 32];
        let sig = kps[0].sign(&message).unwrap();
        let err = collector.submit([2u8; 32], message, 99, sig).unwrap_err();
        assert!(matches!(err, AttestationError::UnknownValidator(99)));
    }

    #[test]
    fn invalid_signature_is_rejected() {
        let (set, kps) = build_set(2, 10);
        let collector = AttestationCollector::new(set);
        let sig_over_wrong_message = kps[0].sign(b"wrong").unwrap();
        let err = collector
            .submit([2u8; 32], [1u8; 32], 0, sig_over_wrong_message)
            .unwrap_err();
        assert!(matches!(err, AttestationError::InvalidSignature(0)));
    }
}
