//! Transactional Ledger
//!
//! Accounts, an append-only entry log and transfers, plus the executor that
//! moves money between two accounts in one unit of work.
//!
//! # Architecture
//!
//! ```text
//! caller ──▶ TransferExecutor ──▶ Store::run_in_transaction
//!                                   ├─ TransferRepository::create_transfer
//!                                   ├─ EntryLog::create_entry ×2
//!                                   └─ balance::apply_transfer_deltas (ascending id)
//! ```
//!
//! # Safety Invariants
//!
//! 1. **All-or-nothing**: a transfer, its two entries and both balance
//!    updates commit together or not at all
//! 2. **Lock ordering**: balances are updated in ascending account id, so
//!    concurrent transfers over the same accounts cannot deadlock
//! 3. **Indivisible update**: a balance read-modify-write never interleaves
//!    with another mutator of the same account
//! 4. **Conservation**: transfers never change the sum of balances

pub mod balance;
pub mod error;
pub mod executor;
pub mod memory;
pub mod models;
pub mod postgres;
pub mod store;


// Re-exports for convenience
pub use balance::{BalanceDelta, apply_delta, apply_transfer_deltas};
pub use error::LedgerError;
pub use executor::TransferExecutor;
pub use memory::MemoryStore;
pub use models::{
    Account, CreateAccountParams, CreateEntryParams, CreateTransferParams, Currency, Entry,
    ListAccountsParams, ListEntriesParams, ListTransfersParams, MAX_PAGE_LIMIT, Page, Transfer,
    TransferTxParams, TransferTxResult, UpdateAccountParams, UpdateEntryParams,
    UpdateTransferParams,
};
pub use postgres::{IsolationLevel, PgStore};
pub use store::{AccountRepository, EntryLog, Queries, Store, TransferRepository, TxWork};
