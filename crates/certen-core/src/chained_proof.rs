//! `ChainedProofGenerator` (spec.md §4.7 second half): produces the
//! three-layer inclusion proof binding an account-level transaction to the
//! source ledger's consensus height.

use certen_client::LedgerClient;
use certen_crypto::hash::sha256;
use certen_crypto::merkle;
use certen_types::error::DiscoveryError;
use certen_types::model::ChainedInclusionProof;

/// Derives the BVN partition an account URL routes to from the first byte
/// of `SHA-256(account_url)`, modulo the configured partition count.
/// Fails with `RoutingUndetermined` rather than guessing when the partition
/// count is zero.
pub fn route_to_partition(account_url: &str, partition_count: usize) -> Result<usize, DiscoveryError> {
    if partition_count == 0 {
        return Err(DiscoveryError::RoutingUndetermined(account_url.to_string()));
    }
    let digest = sha256(account_url.as_bytes())
        .map_err(|e| DiscoveryError::RoutingUndetermined(format!("{account_url}: {e}")))?;
    Ok(digest[0] as usize % partition_count)
}

pub struct ChainedProofGenerator<C> {
    client: C,
}

impl<C: LedgerClient> ChainedProofGenerator<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    /// Produces the three-layer proof for `tx_hash` filed under
    /// `account_url`, routed through `bvn_partition`.
    pub async fn generate(
        &self,
        account_url: &str,
        tx_hash: [u8; 32],
        bvn_partition: &str,
    ) -> Result<ChainedInclusionProof, DiscoveryError> {
        let account_chain = self
            .client
            .query_chain(account_url, "main", true)
            .await
            .map_err(|e| DiscoveryError::PartitionQueryFailed(e.to_string()))?;

        let bvn_root = extract_root(&account_chain, "bvnRoot")?;
        let l1 = self
            .fold_layer_from_receipt(&account_chain, tx_hash, bvn_root)
            .await?;

        let bvn_chain = self
            .client
            .query_chain(bvn_partition, "anchor", true)
            .await
            .map_err(|e| DiscoveryError::PartitionQueryFailed(e.to_string()))?;
        let dn_root = extract_root(&bvn_chain, "dnRoot")?;
        let l2 = self.fold_layer_from_receipt(&bvn_chain, bvn_root, dn_root).await?;

        let dn_chain = self
            .client
            .query_chain("acc://dn.acme/network", "anchor", true)
            .await
            .map_err(|e| DiscoveryError::PartitionQueryFailed(e.to_string()))?;
        let height_root = extract_root(&dn_chain, "consensusHeight")?;
        let l3 = self.fold_layer_from_receipt(&dn_chain, dn_root, height_root).await?;

        Ok(ChainedInclusionProof {
            l1_account_to_bvn: l1,
            l2_bvn_to_dn: l2,
            l3_dn_to_height: l3,
        })
    }

    async fn fold_layer_from_receipt(
        &self,
        chain_response: &serde_json::Value,
        source_hash: [u8; 32],
        target_hash: [u8; 32],
    ) -> Result<certen_types::model::ProofLayer, DiscoveryError> {
        let steps = chain_response
            .pointer("/receipt/entries")
            .and_then(serde_json::Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|e| {
                        let sibling: [u8; 32] = hex::decode(e.get("hash")?.as_str()?.trim_start_matches("0x"))
                            .ok()?
                            .try_into()
                            .ok()?;
                        let position = if e.get("right").and_then(serde_json::Value::as_bool).unwrap_or(false)
                        {
                            certen_types::model::Position::Right
                        } else {
                            certen_types::model::Position::Left
                        };
                        Some(certen_types::model::MerkleStep { sibling, position })
                    })
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        let layer = certen_types::model::ProofLayer {
            source_hash,
            target_hash,
            steps,
        };
        if !layer.verify(merkle::fold_step) {
            return Err(DiscoveryError::PartitionQueryFailed(
                "chained inclusion proof layer did not fold to its target".into(),
            ));
        }
        Ok(layer)
    }
}

fn extract_root(chain_response: &serde_json::Value, field: &str) -> Result<[u8; 32], DiscoveryError> {
    let s = chain_response
        .get(field)
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| DiscoveryError::PartitionQueryFailed(format!("missing {field}")))?;
    hex::decode(s.trim_start_matches("0x"))
        .ok()
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| DiscoveryError::PartitionQueryFailed(format!("malformed {field}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routing_is_deterministic_for_the_same_account() {
        let a = route_to_partition("acc://demo.acme/tokens", 8).unwrap();
        let b = route_to_partition("acc://demo.acme/tokens", 8).unwrap();
        assert_eq!(a, b);
        assert!(a < 8);
    }

    #[test]
    fn zero_partitions_is_undetermined() {
        let err = route_to_partition("acc://demo.acme/tokens", 0).unwrap_err();
        assert!(matches!(err, DiscoveryError::RoutingUndetermined(_)));
    }
}
