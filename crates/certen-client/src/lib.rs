#![cfg_attr(
    not(test),
    deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)
)]

//! External collaborator traits (spec.md §6, §4.10): the source-ledger
//! client and the EVM chain client, plus one `reqwest`-based reference
//! implementation of each. The core depends only on the traits; these
//! implementations are swappable.

pub mod http_evm;
pub mod http_ledger;
pub mod traits;

pub use http_evm::HttpEvmClient;
pub use http_ledger::HttpLedgerClient;
pub use traits::{
    EntryRange, EvmBlock, EvmClient, EvmLogEntry, EvmReceipt, EvmTransaction, LedgerClient,
    LedgerTxStatus,
};
