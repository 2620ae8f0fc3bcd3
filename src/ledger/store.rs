//! Store traits
//!
//! The capability set of a ledger store: three repositories and a
//! transaction manager. Repository methods take `&mut self` because a
//! handle is bound to exactly one connection, either a pooled connection
//! in autocommit mode (`Store::connect`) or the connection owning an open
//! unit of work (`Store::run_in_transaction`).

use async_trait::async_trait;
use futures::future::BoxFuture;

use super::error::LedgerError;
use super::models::{
    Account, CreateAccountParams, CreateEntryParams, CreateTransferParams, Entry,
    ListAccountsParams, ListEntriesParams, ListTransfersParams, Transfer, UpdateAccountParams,
    UpdateEntryParams, UpdateTransferParams,
};

/// Future returned by a unit-of-work body, borrowing the scoped handle
pub type TxWork<'c, T> = BoxFuture<'c, Result<T, LedgerError>>;

#[async_trait]
pub trait AccountRepository: Send {
    async fn create_account(&mut self, params: CreateAccountParams)
    -> Result<Account, LedgerError>;

    /// Fails with `NotFound` when the account does not exist
    async fn get_account(&mut self, id: i64) -> Result<Account, LedgerError>;

    /// Like `get_account`, holding the row lock until the unit of work ends
    async fn get_account_for_update(&mut self, id: i64) -> Result<Account, LedgerError>;

    async fn list_accounts(
        &mut self,
        params: ListAccountsParams,
    ) -> Result<Vec<Account>, LedgerError>;

    async fn update_account(&mut self, params: UpdateAccountParams)
    -> Result<Account, LedgerError>;

    /// Indivisible `balance = balance + delta`, returning the updated row.
    ///
    /// The only write path for `balance`.
    async fn add_account_balance(&mut self, id: i64, delta: i64) -> Result<Account, LedgerError>;

    async fn delete_account(&mut self, id: i64) -> Result<(), LedgerError>;
}

/// Append-only log of signed balance deltas
#[async_trait]
pub trait EntryLog: Send {
    async fn create_entry(&mut self, params: CreateEntryParams) -> Result<Entry, LedgerError>;

    async fn get_entry(&mut self, id: i64) -> Result<Entry, LedgerError>;

    async fn list_entries(&mut self, params: ListEntriesParams) -> Result<Vec<Entry>, LedgerError>;

    /// Administrative correction path; the executor never calls it
    async fn update_entry(&mut self, params: UpdateEntryParams) -> Result<Entry, LedgerError>;

    async fn delete_entry(&mut self, id: i64) -> Result<(), LedgerError>;
}

#[async_trait]
pub trait TransferRepository: Send {
    async fn create_transfer(
        &mut self,
        params: CreateTransferParams,
    ) -> Result<Transfer, LedgerError>;

    async fn get_transfer(&mut self, id: i64) -> Result<Transfer, LedgerError>;

    async fn list_transfers(
        &mut self,
        params: ListTransfersParams,
    ) -> Result<Vec<Transfer>, LedgerError>;

    async fn update_transfer(
        &mut self,
        params: UpdateTransferParams,
    ) -> Result<Transfer, LedgerError>;

    async fn delete_transfer(&mut self, id: i64) -> Result<(), LedgerError>;
}

/// All repositories behind one connection-bound handle
pub trait Queries: AccountRepository + EntryLog + TransferRepository {}

impl<T> Queries for T where T: AccountRepository + EntryLog + TransferRepository {}

/// Transaction manager plus access to standalone handles
#[async_trait]
pub trait Store: Clone + Send + Sync + 'static {
    /// Handle for operations outside any unit of work
    type Conn: Queries + 'static;

    async fn connect(&self) -> Result<Self::Conn, LedgerError>;

    /// Run `work` inside one unit of work.
    ///
    /// Commits when `work` returns `Ok`, rolls back when it returns `Err`. A
    /// failed rollback yields `RollbackFailed` carrying both errors. If the
    /// returned future is dropped, or `work` panics, the unit of work is
    /// rolled back.
    async fn run_in_transaction<T, F>(&self, work: F) -> Result<T, LedgerError>
    where
        T: Send + 'static,
        F: for<'c> FnOnce(&'c mut dyn Queries) -> TxWork<'c, T> + Send + 'static;
}
