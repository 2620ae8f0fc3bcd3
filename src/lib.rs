//! Ledger Core - Transactional Money Transfers
//!
//! Moves money between accounts on PostgreSQL with all-or-nothing
//! semantics, balanced ledger entries and deadlock-free lock ordering.
//!
//! # Modules
//!
//! - [`ledger`] - Accounts, entries, transfers, stores and the transfer executor
//! - [`db`] - Connection pool lifecycle and schema bootstrap
//! - [`config`] - YAML configuration
//! - [`logging`] - Tracing subscriber setup
//! - [`random`] - Random fixture data for tests

pub mod config;
pub mod db;
pub mod ledger;
pub mod logging;
pub mod random;

// Convenient re-exports at crate root
pub use db::Database;
pub use ledger::{
    Account, Currency, Entry, LedgerError, MemoryStore, PgStore, Store, Transfer,
    TransferExecutor, TransferTxParams, TransferTxResult,
};
