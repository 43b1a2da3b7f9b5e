//! Runtime configuration shape the core recognizes (spec.md §6 "Configuration").

use serde::{Deserialize, Serialize};

fn default_required_confirmations() -> u64 {
    12
}
fn default_observation_timeout_secs() -> u64 {
    600
}
fn default_threshold_num() -> u64 {
    2
}
fn default_threshold_den() -> u64 {
    3
}
fn default_cache_valid_window_secs() -> u64 {
    30
}
fn default_nonce_max_pending() -> usize {
    100
}
fn default_batch_deadline_secs() -> u64 {
    900
}
fn default_batch_max_size() -> usize {
    1024
}

/// Validator configuration, loaded from TOML. Every field here maps to an
/// entry in the published configuration table; this struct is the only
/// consumer-visible description of the schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorConfig {
    pub ethereum_rpc_url: String,
    pub chain_id: u64,
    #[serde(default = "default_required_confirmations")]
    pub required_confirmations: u64,
    #[serde(default = "default_observation_timeout_secs")]
    pub observation_timeout_secs: u64,
    #[serde(default = "default_threshold_num")]
    pub threshold_num: u64,
    #[serde(default = "default_threshold_den")]
    pub threshold_den: u64,
    pub accumulate_principal: String,
    pub writeback_enabled: bool,
    /// Hex-encoded 32-byte BLS secret scalar. Loaded from an encrypted file in production;
    /// present in plaintext here only to describe the shape the core consumes.
    pub bls_private_key: String,
    pub signer_url: String,
    pub key_page_index: u64,
    pub key_index: u64,
    #[serde(default = "default_cache_valid_window_secs")]
    pub cache_valid_window_secs: u64,
    #[serde(default = "default_nonce_max_pending")]
    pub nonce_max_pending: usize,
    #[serde(default = "default_batch_deadline_secs")]
    pub batch_deadline_secs: u64,
    #[serde(default = "default_batch_max_size")]
    pub batch_max_size: usize,
    pub partitions_to_scan: Vec<String>,
    /// Hex-encoded 20-byte address of the anchor-commitment contract (`create` step).
    pub anchor_contract: String,
    /// Hex-encoded 20-byte address of the proof-verification contract (`verify_proof` step).
    pub verify_contract: String,
    /// Hex-encoded 20-byte address of the governed-execution contract (`execute_with_governance` step).
    pub governance_contract: String,
    #[serde(default)]
    pub validator_index: u32,
}

/// Errors raised while loading or validating a `ValidatorConfig`.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl ValidatorConfig {
    /// Parses a `ValidatorConfig` from TOML text and validates it.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let cfg: Self = toml::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Rejects zero thresholds, a zero chain id, and empty partition lists —
    /// the misconfigurations that would otherwise surface only much later,
    /// deep inside a running cycle.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.threshold_den == 0 {
            return Err(ConfigError::Invalid("threshold_den must be non-zero".into()));
        }
        if self.threshold_num == 0 || self.threshold_num > self.threshold_den {
            return Err(ConfigError::Invalid(
                "threshold_num must be in (0, threshold_den]".into(),
            ));
        }
        if self.chain_id == 0 {
            return Err(ConfigError::Invalid("chain_id must be non-zero".into()));
        }
        if self.ethereum_rpc_url.is_empty() {
            return Err(ConfigError::Invalid("ethereum_rpc_url must not be empty".into()));
        }
        if self.partitions_to_scan.is_empty() {
            return Err(ConfigError::Invalid(
                "partitions_to_scan must list at least one partition".into(),
            ));
        }
        if self.nonce_max_pending == 0 {
            return Err(ConfigError::Invalid("nonce_max_pending must be non-zero".into()));
        }
        for (name, addr) in [
            ("anchor_contract", &self.anchor_contract),
            ("verify_contract", &self.verify_contract),
            ("governance_contract", &self.governance_contract),
        ] {
            if hex::decode(addr.trim_start_matches("0x")).map(|b| b.len()) != Ok(20) {
                return Err(ConfigError::Invalid(format!("{name} must be a 20-byte hex address")));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_toml() -> &'static str {
        r#"
            ethereum_rpc_url = "http://localhost:8545"
            chain_id = 1
            accumulate_principal = "acc://certen.acme"
            writeback_enabled = true
            bls_private_key = "00"
            signer_url = "acc://certen.acme/signer"
            key_page_index = 0
            key_index = 0
            partitions_to_scan = ["directory", "bvn-0"]
            anchor_contract = "0xAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA"
            verify_contract = "0xBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBB"
            governance_contract = "0xCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCC"
        "#
    }

    #[test]
    fn defaults_populate_when_absent() {
        let cfg = ValidatorConfig::from_toml_str(sample_toml()).unwrap();
        assert_eq!(cfg.required_confirmations, 12);
        assert_eq!(cfg.threshold_num, 2);
        assert_eq!(cfg.threshold_den, 3);
        assert_eq!(cfg.nonce_max_pending, 100);
    }

    #[test]
    fn rejects_zero_threshold_denominator() {
        let mut text = sample_toml().to_string();
        text.push_str("\nthreshold_den = 0\n");
        let err = ValidatorConfig::from_toml_str(&text).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_empty_partition_list() {
        let text = sample_toml().replace(
            "partitions_to_scan = [\"directory\", \"bvn-0\"]",
            "partitions_to_scan = []",
        );
        let err = ValidatorConfig::from_toml_str(&text).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_malformed_contract_address() {
        let text = sample_toml().replace(
            "anchor_contract = \"0xAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA\"",
            "anchor_contract = \"not-hex\"",
        );
        let err = ValidatorConfig::from_toml_str(&text).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
