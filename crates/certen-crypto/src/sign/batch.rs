//! CPU-parallel batch verification of validator attestations.
//!
//! `AttestationCollector` calls this when replaying a backlog of
//! attestations (e.g. after a restart) instead of verifying them one at a
//! time; each individual attestation still goes through the same
//! `BlsPublicKey::verify` a live accept does.

use crate::sign::bls::{BlsPublicKey, BlsSignature};
use rayon::prelude::*;

/// One attestation as submitted for batch verification: the signer's index,
/// public key, the message it signed, and its signature.
pub struct AttestationBatchItem<'a> {
    pub validator_index: u32,
    pub public_key: &'a BlsPublicKey,
    pub message: &'a [u8],
    pub signature: &'a BlsSignature,
}

/// A CPU-based batch verifier using Rayon for parallelism across independent
/// pairing checks — each item's verification is embarrassingly parallel.
#[derive(Default, Debug)]
pub struct CpuBatchVerifier;

impl CpuBatchVerifier {
    pub fn new() -> Self {
        Self
    }

    /// Verifies every item independently and returns, per item, whether it
    /// was valid. Order of the output matches order of the input.
    pub fn verify_batch(&self, items: &[AttestationBatchItem<'_>]) -> Vec<bool> {
        items
            .par_iter()
            .map(|item| item.public_key.verify(item.message, item.signature).is_ok())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sign::bls::BlsKeyPair;

    #[test]
    fn batch_verify_flags_the_tampered_item() {
        let kps: Vec<BlsKeyPair> = (0..3).map(|_| BlsKeyPair::generate().unwrap()).collect();
        let msg = b"batch-attest";
        let sigs: Vec<BlsSignature> = kps.iter().map(|k| k.sign(msg).unwrap()).collect();
        let pks: Vec<BlsPublicKey> = kps.iter().map(|k| k.public_key()).collect();

        let items: Vec<AttestationBatchItem<'_>> = (0..3)
            .map(|i| AttestationBatchItem {
                validator_index: i as u32,
                public_key: &pks[i],
                message: if i == 1 { b"wrong-message" } else { msg.as_slice() },
                signature: &sigs[i],
            })
            .collect();

        let verifier = CpuBatchVerifier::new();
        let results = verifier.verify_batch(&items);
        assert_eq!(results, vec![true, false, true]);
    }
}
