//! The `certen-validator` binary: loads configuration, derives this
//! validator's signing identity, wires the proof-cycle core to concrete
//! clients, and runs the discovery/observation loop alongside the telemetry
//! HTTP server.

use anyhow::{Context, Result};
use certen_client::{HttpEvmClient, HttpLedgerClient};
use certen_config::ValidatorConfig;
use certen_core::{
    route_to_partition, AttestationCollector, BatchAnchorPipeline, BatchConfig, ChainedProofGenerator,
    CommitmentBuilder, ExternalChainObserver, IntentDiscovery, ProofCycleOrchestrator, ResultVerifier,
    ScanRange, ValidatorInfo, ValidatorSet, WriteBackSubmitter,
};
use certen_crypto::sign::bls::BlsKeyPair;
use certen_crypto::sign::eddsa::{Ed25519KeyPair, Ed25519PrivateKey};
use certen_storage::{ArtifactSink, ChainedProofLayerRow, InMemoryArtifactSink, ProofLayerIndex};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "certen-validator", about = "Runs one Certen proof-cycle validator node")]
struct Opts {
    /// Path to the validator's TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Path to the file holding this validator's raw 32-byte Ed25519 seed.
    /// Created on first run if absent. Stored unencrypted; deployments that
    /// need encryption-at-rest should wrap this directory accordingly.
    #[arg(long)]
    ed25519_key_file: PathBuf,

    /// Address the `/metrics`, `/healthz` and `/readyz` endpoints listen on.
    #[arg(long, default_value = "0.0.0.0:9600")]
    metrics_addr: SocketAddr,
}

fn decode_contract(hex_addr: &str) -> Result<[u8; 20]> {
    let bytes = hex::decode(hex_addr.trim_start_matches("0x")).context("decoding contract address")?;
    bytes
        .try_into()
        .map_err(|_| anyhow::anyhow!("contract address must be 20 bytes"))
}

fn load_or_create_ed25519_key(path: &PathBuf) -> Result<Ed25519KeyPair> {
    if path.exists() {
        let seed = std::fs::read(path).context("reading ed25519 key file")?;
        let private_key = Ed25519PrivateKey::from_seed(&seed).map_err(|e| anyhow::anyhow!(e))?;
        return Ed25519KeyPair::from_private_key(&private_key).map_err(|e| anyhow::anyhow!(e));
    }
    let key_pair = Ed25519KeyPair::generate().map_err(|e| anyhow::anyhow!(e))?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).context("creating ed25519 key file directory")?;
    }
    std::fs::write(path, key_pair.private_key().seed_bytes()).context("writing ed25519 key file")?;
    tracing::info!(target = "certen_node", path = %path.display(), "generated a new ed25519 signing identity");
    Ok(key_pair)
}

#[tokio::main]
async fn main() -> Result<()> {
    let opts = Opts::parse();

    certen_telemetry::init::init_tracing().context("initializing tracing")?;
    let _sink = certen_telemetry::prometheus::install().context("installing prometheus sink")?;

    let config_text = std::fs::read_to_string(&opts.config).context("reading config file")?;
    let config = ValidatorConfig::from_toml_str(&config_text).context("parsing config file")?;

    let ed25519_key_pair = load_or_create_ed25519_key(&opts.ed25519_key_file)?;

    // BLS identity is generated fresh every startup: the crypto crate has no
    // constructor that rebuilds a paired `BlsKeyPair` from a persisted
    // private scalar, so there is no reload path yet. A single-validator
    // deployment still reaches threshold on its own signature; a multi-node
    // deployment would need that reload path added before this matters.
    let bls_key_pair = BlsKeyPair::generate().map_err(|e| anyhow::anyhow!(e))?;

    let anchor_contract = decode_contract(&config.anchor_contract)?;
    let verify_contract = decode_contract(&config.verify_contract)?;
    let governance_contract = decode_contract(&config.governance_contract)?;

    let ledger_client = HttpLedgerClient::new(config.signer_url.clone());
    let evm_client = HttpEvmClient::new(config.ethereum_rpc_url.clone());
    let evm_client_for_batch = HttpEvmClient::new(config.ethereum_rpc_url.clone());

    let sink = Arc::new(InMemoryArtifactSink::new());
    let batch_sink = sink.clone();

    let validators = vec![ValidatorInfo {
        index: config.validator_index,
        voting_power: 1,
        public_key: bls_key_pair.public_key(),
    }];
    let validator_set = Arc::new(ValidatorSet::new(validators, config.threshold_num, config.threshold_den));

    let collector = Arc::new(AttestationCollector::new(validator_set));
    let verifier = ResultVerifier::new(config.validator_index, bls_key_pair.private_key());
    let observer = ExternalChainObserver::new(evm_client);
    let submitter = WriteBackSubmitter::new(
        ledger_client.clone(),
        config.signer_url.clone(),
        ed25519_key_pair,
        config.nonce_max_pending,
    );
    let commitment_builder = CommitmentBuilder::new(anchor_contract, verify_contract, governance_contract);
    let chained_proof_generator = ChainedProofGenerator::new(ledger_client.clone());
    let discovery = IntentDiscovery::new(ledger_client);
    let batch_pipeline = BatchAnchorPipeline::new(
        evm_client_for_batch,
        BatchConfig {
            deadline: std::time::Duration::from_secs(config.batch_deadline_secs),
            max_size: config.batch_max_size,
            required_confirmations: config.required_confirmations,
        },
        batch_sink,
    );

    let artifact_sink = sink.clone();
    let orchestrator = Arc::new(ProofCycleOrchestrator::new(observer, verifier, collector, submitter, sink));

    let metrics_server = tokio::spawn(certen_telemetry::http::run_server(opts.metrics_addr));

    let discovery_loop = tokio::spawn(run_discovery_loop(
        config,
        discovery,
        chained_proof_generator,
        commitment_builder,
        batch_pipeline,
        orchestrator,
        artifact_sink,
    ));

    tokio::select! {
        res = metrics_server => {
            if let Err(e) = res {
                tracing::error!(target = "certen_node", error = %e, "telemetry server task panicked");
            }
        }
        res = discovery_loop => {
            if let Err(e) = res {
                tracing::error!(target = "certen_node", error = %e, "discovery loop task panicked");
            }
        }
    }

    Ok(())
}

/// Polls every configured partition in turn for new intents, derives each
/// intent's chained inclusion proof and execution commitment, and starts a
/// proof cycle for it. A partition's scan window advances one block at a
/// time so a slow partition never starves the others.
#[allow(clippy::too_many_arguments)]
async fn run_discovery_loop(
    config: ValidatorConfig,
    discovery: IntentDiscovery<HttpLedgerClient>,
    chained_proof_generator: ChainedProofGenerator<HttpLedgerClient>,
    commitment_builder: CommitmentBuilder,
    batch_pipeline: BatchAnchorPipeline<HttpEvmClient, InMemoryArtifactSink>,
    orchestrator: Arc<
        ProofCycleOrchestrator<HttpEvmClient, HttpLedgerClient, InMemoryArtifactSink>,
    >,
    sink: Arc<InMemoryArtifactSink>,
) {
    let mut next_block: std::collections::HashMap<String, u64> = config
        .partitions_to_scan
        .iter()
        .map(|p| (p.clone(), 0u64))
        .collect();
    let partition_count = config.partitions_to_scan.len();

    loop {
        for partition in &config.partitions_to_scan {
            let start_block = *next_block.get(partition).unwrap_or(&0);
            let range = ScanRange {
                partition_url: partition.clone(),
                start_block,
                end_block: start_block,
            };
            let intents = match discovery.scan(&range).await {
                Ok(intents) => intents,
                Err(e) => {
                    tracing::warn!(target = "certen_node", %partition, error = %e, "partition scan failed");
                    continue;
                }
            };
            next_block.insert(partition.clone(), start_block + 1);

            for intent in intents {
                if let Err(e) = batch_pipeline.admit(intent.source_tx_hash, intent.proof_class).await {
                    tracing::warn!(target = "certen_node", error = %e, "batch admission failed");
                }

                let bvn_partition = match route_to_partition(&intent.account_url, partition_count.max(1)) {
                    Ok(idx) => config.partitions_to_scan.get(idx).cloned().unwrap_or_else(|| partition.clone()),
                    Err(e) => {
                        tracing::warn!(target = "certen_node", error = %e, "routing undetermined for account");
                        partition.clone()
                    }
                };

                let proof_artifact_id = Uuid::new_v4();
                match chained_proof_generator
                    .generate(&intent.account_url, intent.source_tx_hash, &bvn_partition)
                    .await
                {
                    Ok(proof) => {
                        let layers = [
                            (ProofLayerIndex::L1AccountToBvn, &proof.l1_account_to_bvn),
                            (ProofLayerIndex::L2BvnToDn, &proof.l2_bvn_to_dn),
                            (ProofLayerIndex::L3DnToHeight, &proof.l3_dn_to_height),
                        ];
                        for (layer, proof_layer) in layers {
                            let row = ChainedProofLayerRow {
                                proof_artifact_id,
                                layer,
                                source_hash: proof_layer.source_hash,
                                target_hash: proof_layer.target_hash,
                                steps_json: serde_json::to_string(&proof_layer.steps).unwrap_or_default(),
                            };
                            if let Err(e) = sink.record_chained_proof_layer(row).await {
                                tracing::warn!(target = "certen_node", error = %e, "failed to persist chained inclusion proof layer");
                            }
                        }
                    }
                    Err(e) => {
                        tracing::warn!(target = "certen_node", error = %e, "chained inclusion proof generation failed");
                    }
                }

                let bundle_id = Uuid::new_v4().into_bytes();
                let operation_id = Uuid::new_v4().into_bytes();
                let commitment = match commitment_builder.build(&intent, bundle_id, operation_id) {
                    Ok(c) => c,
                    Err(e) => {
                        tracing::warn!(target = "certen_node", error = %e, "commitment construction failed, skipping intent");
                        continue;
                    }
                };

                // The three external-chain step transaction hashes are produced
                // by a relaying/execution system outside this core's modeled
                // components; here they are read back from the intent's own
                // cross-chain data once a relayer has annotated it post-execution.
                let step_tx_hashes = extract_step_tx_hashes(&intent);
                if step_tx_hashes[0].is_none() {
                    tracing::debug!(
                        target = "certen_node",
                        intent_id = %hex::encode(intent.intent_id),
                        "create-step tx hash not yet observed, deferring this intent"
                    );
                    continue;
                }

                let orchestrator = orchestrator.clone();
                tokio::spawn(async move {
                    match orchestrator
                        .start_cycle(intent.clone(), commitment, step_tx_hashes, [0u8; 32], proof_artifact_id)
                        .await
                    {
                        Ok(status) => {
                            tracing::info!(target = "certen_node", intent_id = %hex::encode(intent.intent_id), ?status, "proof cycle progressed");
                        }
                        Err(e) => {
                            tracing::warn!(target = "certen_node", intent_id = %hex::encode(intent.intent_id), error = %e, "proof cycle failed");
                        }
                    }
                });
            }
        }
        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
    }
}

fn extract_step_tx_hashes(intent: &certen_types::model::Intent) -> [Option<[u8; 32]>; 3] {
    let mut out = [None, None, None];
    if let Some(hashes) = intent
        .cross_chain_data
        .get("executedTxHashes")
        .and_then(serde_json::Value::as_array)
    {
        for (slot, value) in out.iter_mut().zip(hashes.iter()) {
            *slot = value
                .as_str()
                .and_then(|s| hex::decode(s.trim_start_matches("0x")).ok())
                .and_then(|b| b.try_into().ok());
        }
    }
    out
}
