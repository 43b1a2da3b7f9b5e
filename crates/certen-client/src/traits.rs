//! The two external-chain traits the core depends on (§4.10): the
//! source-ledger client and the EVM chain client. `ArtifactSink` lives in
//! `certen-storage` alongside the row shapes it persists and is re-exported
//! here for convenience.

use async_trait::async_trait;
use certen_types::error::ClientError;
use serde_json::Value;

/// A source-ledger transaction's delivery state, as returned by
/// `get_transaction_status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerTxStatus {
    Pending,
    Delivered,
    Failed,
}

/// An optional `(start, count)` window into a block's entries, as accepted
/// by `query_block`.
#[derive(Debug, Clone, Copy)]
pub struct EntryRange {
    pub start: u64,
    pub count: u64,
}

/// Source-ledger queries the core issues (spec.md §6). Responses are the
/// ledger's own JSON record types; callers parse them defensively since the
/// transaction payload may appear under either `value.message.transaction`
/// or `value.transaction`.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn query_block(
        &self,
        partition_url: &str,
        block_number: u64,
        expand: bool,
        entry_range: Option<EntryRange>,
    ) -> Result<Value, ClientError>;

    async fn query_account(&self, url: &str) -> Result<Value, ClientError>;

    async fn query_chain(
        &self,
        url: &str,
        chain_name: &str,
        include_receipt: bool,
    ) -> Result<Value, ClientError>;

    async fn get_signer_nonce(&self, signer_url: &str) -> Result<u64, ClientError>;

    async fn get_credit_balance(&self, signer_url: &str) -> Result<u64, ClientError>;

    async fn submit_envelope(&self, envelope_json: Value) -> Result<String, ClientError>;

    async fn get_transaction_status(&self, tx_hash: &str) -> Result<LedgerTxStatus, ClientError>;
}

/// A raw EVM log entry, as returned by a transaction receipt.
#[derive(Debug, Clone)]
pub struct EvmLogEntry {
    pub address: [u8; 20],
    pub topics: Vec<[u8; 32]>,
    pub data: Vec<u8>,
}

/// A transaction receipt, carrying just the fields the observer needs.
#[derive(Debug, Clone)]
pub struct EvmReceipt {
    pub tx_hash: [u8; 32],
    pub block_number: u64,
    pub block_hash: [u8; 32],
    pub status_success: bool,
    pub gas_used: u64,
    pub logs: Vec<EvmLogEntry>,
}

/// A minimal transaction record, as needed for `tx_to`/`tx_from`/`tx_value`/`tx_data`.
#[derive(Debug, Clone)]
pub struct EvmTransaction {
    pub hash: [u8; 32],
    pub to: Option<[u8; 20]>,
    pub from: [u8; 20],
    pub value: u128,
    pub input: Vec<u8>,
}

/// A block header, carrying the three roots the inclusion proofs bind
/// against plus the transaction hash list used to build them.
#[derive(Debug, Clone)]
pub struct EvmBlock {
    pub number: u64,
    pub hash: [u8; 32],
    pub state_root: [u8; 32],
    pub transactions_root: [u8; 32],
    pub receipts_root: [u8; 32],
    pub transaction_hashes: Vec<[u8; 32]>,
}

/// External EVM chain queries the observer issues (spec.md §6).
#[async_trait]
pub trait EvmClient: Send + Sync {
    async fn get_transaction_receipt(
        &self,
        tx_hash: [u8; 32],
    ) -> Result<Option<EvmReceipt>, ClientError>;

    async fn get_transaction(&self, tx_hash: [u8; 32]) -> Result<Option<EvmTransaction>, ClientError>;

    async fn get_block_by_number(&self, number: u64) -> Result<Option<EvmBlock>, ClientError>;

    /// Used for confirmation counting: `confirmations = get_block_number() - tx.block_number`.
    async fn get_block_number(&self) -> Result<u64, ClientError>;
}
