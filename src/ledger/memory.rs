//! In-memory ledger store
//!
//! Test double for the PostgreSQL store. A single async mutex serializes
//! every unit of work, so isolation is trivially serializable; atomicity is
//! real: each unit of work snapshots the state and restores it on rollback,
//! on drop (cancellation) and on panic.
//!
//! Fault injection mirrors what the database can do to a transfer:
//! failing a balance update, failing the rollback itself, or being slow.

use std::collections::BTreeMap;
use std::ops::DerefMut;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

use super::balance::BalanceDelta;
use super::error::LedgerError;
use super::models::{
    Account, CreateAccountParams, CreateEntryParams, CreateTransferParams, Entry,
    ListAccountsParams, ListEntriesParams, ListTransfersParams, Transfer, UpdateAccountParams,
    UpdateEntryParams, UpdateTransferParams,
};
use super::store::{AccountRepository, EntryLog, Queries, Store, TransferRepository, TxWork};

/// Tables and id sequences of one in-memory store
#[derive(Debug, Clone, Default)]
pub struct MemoryState {
    accounts: BTreeMap<i64, Account>,
    entries: BTreeMap<i64, Entry>,
    transfers: BTreeMap<i64, Transfer>,
    last_account_id: i64,
    last_entry_id: i64,
    last_transfer_id: i64,
    /// Every committed `add_account_balance`, in application order
    balance_journal: Vec<BalanceDelta>,
}

impl MemoryState {
    fn account_mut(&mut self, id: i64) -> Result<&mut Account, LedgerError> {
        self.accounts
            .get_mut(&id)
            .ok_or_else(|| LedgerError::not_found("account", id))
    }

    fn require_account(&self, id: i64) -> Result<(), LedgerError> {
        if self.accounts.contains_key(&id) {
            Ok(())
        } else {
            Err(LedgerError::not_found("account", id))
        }
    }

    fn is_referenced(&self, account_id: i64) -> bool {
        self.entries.values().any(|e| e.account_id == account_id)
            || self
                .transfers
                .values()
                .any(|t| t.from_account_id == account_id || t.to_account_id == account_id)
    }
}

/// Injected failures, shared by every handle of one store
#[derive(Debug, Default)]
struct Faults {
    /// Account id whose balance update fails; 0 disables
    fail_balance_update_for: AtomicI64,
    fail_rollback: AtomicBool,
    op_delay_ms: AtomicU64,
}

/// In-memory `Store`
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    faults: Arc<Faults>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `add_account_balance` on `account_id` fail
    pub fn set_fail_balance_update(&self, account_id: Option<i64>) {
        self.faults
            .fail_balance_update_for
            .store(account_id.unwrap_or(0), Ordering::SeqCst);
    }

    /// Make rollbacks report failure (state is still restored)
    pub fn set_fail_rollback(&self, fail: bool) {
        self.faults.fail_rollback.store(fail, Ordering::SeqCst);
    }

    /// Delay every repository call, to widen interleavings or trip timeouts
    pub fn set_op_delay(&self, delay: Duration) {
        self.faults
            .op_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Committed balance updates in the order they were applied
    pub async fn balance_journal(&self) -> Vec<BalanceDelta> {
        self.state.lock().await.balance_journal.clone()
    }

    pub async fn accounts(&self) -> Vec<Account> {
        self.state.lock().await.accounts.values().cloned().collect()
    }

    pub async fn entries(&self) -> Vec<Entry> {
        self.state.lock().await.entries.values().cloned().collect()
    }

    pub async fn transfers(&self) -> Vec<Transfer> {
        self.state.lock().await.transfers.values().cloned().collect()
    }
}

#[async_trait]
impl Store for MemoryStore {
    /// Holds the store lock until dropped, like a single shared connection
    type Conn = MemoryQueries<OwnedMutexGuard<MemoryState>>;

    async fn connect(&self) -> Result<Self::Conn, LedgerError> {
        Ok(MemoryQueries {
            state: self.state.clone().lock_owned().await,
            faults: self.faults.clone(),
        })
    }

    async fn run_in_transaction<T, F>(&self, work: F) -> Result<T, LedgerError>
    where
        T: Send + 'static,
        F: for<'c> FnOnce(&'c mut dyn Queries) -> TxWork<'c, T> + Send + 'static,
    {
        let mut tx = MemoryTx::begin(self.state.clone().lock_owned().await);

        let result = {
            let mut q = MemoryQueries {
                state: &mut *tx.guard,
                faults: self.faults.clone(),
            };
            work(&mut q).await
        };

        match result {
            Ok(value) => {
                tx.commit();
                Ok(value)
            }
            Err(error) => {
                let fail_rollback = self.faults.fail_rollback.load(Ordering::SeqCst);
                match tx.rollback(fail_rollback) {
                    Ok(()) => Err(error),
                    Err(rollback) => {
                        warn!(error = %error, rollback = %rollback, "Rollback failed");
                        Err(LedgerError::RollbackFailed {
                            error: Box::new(error),
                            rollback,
                        })
                    }
                }
            }
        }
    }
}

/// Open unit of work: exclusive state access plus the pre-image
struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    snapshot: Option<MemoryState>,
}

impl MemoryTx {
    fn begin(guard: OwnedMutexGuard<MemoryState>) -> Self {
        let snapshot = Some(guard.clone());
        Self { guard, snapshot }
    }

    fn commit(mut self) {
        self.snapshot = None;
    }

    fn rollback(mut self, fail: bool) -> Result<(), String> {
        self.restore();
        if fail {
            return Err("injected rollback failure".to_string());
        }
        Ok(())
    }

    fn restore(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            *self.guard = snapshot;
        }
    }
}

impl Drop for MemoryTx {
    fn drop(&mut self) {
        if self.snapshot.is_some() {
            debug!("Unit of work dropped before commit - rolling back");
            self.restore();
        }
    }
}

/// Repository handle over a borrowed or owned `MemoryState`
pub struct MemoryQueries<G> {
    state: G,
    faults: Arc<Faults>,
}

impl<G> MemoryQueries<G> {
    async fn pause(&self) {
        let delay = self.faults.op_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
    }
}

#[async_trait]
impl<G> AccountRepository for MemoryQueries<G>
where
    G: DerefMut<Target = MemoryState> + Send + Sync,
{
    async fn create_account(
        &mut self,
        params: CreateAccountParams,
    ) -> Result<Account, LedgerError> {
        self.pause().await;
        let state = &mut *self.state;
        state.last_account_id += 1;
        let account = Account {
            id: state.last_account_id,
            owner: params.owner,
            balance: params.balance,
            currency: params.currency,
            created_at: Utc::now(),
        };
        state.accounts.insert(account.id, account.clone());
        Ok(account)
    }

    async fn get_account(&mut self, id: i64) -> Result<Account, LedgerError> {
        self.pause().await;
        self.state
            .accounts
            .get(&id)
            .cloned()
            .ok_or_else(|| LedgerError::not_found("account", id))
    }

    async fn get_account_for_update(&mut self, id: i64) -> Result<Account, LedgerError> {
        // The handle already has exclusive access
        self.get_account(id).await
    }

    async fn list_accounts(
        &mut self,
        params: ListAccountsParams,
    ) -> Result<Vec<Account>, LedgerError> {
        self.pause().await;
        let rows = self
            .state
            .accounts
            .values()
            .filter(|a| a.owner == params.owner)
            .cloned();
        Ok(params.page.window(rows))
    }

    async fn update_account(
        &mut self,
        params: UpdateAccountParams,
    ) -> Result<Account, LedgerError> {
        self.pause().await;
        let account = self.state.account_mut(params.id)?;
        account.owner = params.owner;
        Ok(account.clone())
    }

    async fn add_account_balance(&mut self, id: i64, delta: i64) -> Result<Account, LedgerError> {
        self.pause().await;
        if self.faults.fail_balance_update_for.load(Ordering::SeqCst) == id {
            return Err(LedgerError::DatabaseError(format!(
                "injected balance update failure on account {}",
                id
            )));
        }

        let state = &mut *self.state;
        let account = state.account_mut(id)?;
        account.balance = account
            .balance
            .checked_add(delta)
            .ok_or(LedgerError::BalanceOverflow { account_id: id })?;
        let updated = account.clone();
        state.balance_journal.push(BalanceDelta::new(id, delta));
        Ok(updated)
    }

    async fn delete_account(&mut self, id: i64) -> Result<(), LedgerError> {
        self.pause().await;
        self.state.require_account(id)?;
        if self.state.is_referenced(id) {
            return Err(LedgerError::StillReferenced(format!("account {}", id)));
        }
        self.state.accounts.remove(&id);
        Ok(())
    }
}

#[async_trait]
impl<G> EntryLog for MemoryQueries<G>
where
    G: DerefMut<Target = MemoryState> + Send + Sync,
{
    async fn create_entry(&mut self, params: CreateEntryParams) -> Result<Entry, LedgerError> {
        self.pause().await;
        let state = &mut *self.state;
        state.require_account(params.account_id)?;
        state.last_entry_id += 1;
        let entry = Entry {
            id: state.last_entry_id,
            account_id: params.account_id,
            amount: params.amount,
            created_at: Utc::now(),
        };
        state.entries.insert(entry.id, entry.clone());
        Ok(entry)
    }

    async fn get_entry(&mut self, id: i64) -> Result<Entry, LedgerError> {
        self.pause().await;
        self.state
            .entries
            .get(&id)
            .cloned()
            .ok_or_else(|| LedgerError::not_found("entry", id))
    }

    async fn list_entries(&mut self, params: ListEntriesParams) -> Result<Vec<Entry>, LedgerError> {
        self.pause().await;
        let rows = self
            .state
            .entries
            .values()
            .filter(|e| e.account_id == params.account_id)
            .cloned();
        Ok(params.page.window(rows))
    }

    async fn update_entry(&mut self, params: UpdateEntryParams) -> Result<Entry, LedgerError> {
        self.pause().await;
        let entry = self
            .state
            .entries
            .get_mut(&params.id)
            .ok_or_else(|| LedgerError::not_found("entry", params.id))?;
        entry.amount = params.amount;
        Ok(entry.clone())
    }

    async fn delete_entry(&mut self, id: i64) -> Result<(), LedgerError> {
        self.pause().await;
        self.state
            .entries
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| LedgerError::not_found("entry", id))
    }
}

#[async_trait]
impl<G> TransferRepository for MemoryQueries<G>
where
    G: DerefMut<Target = MemoryState> + Send + Sync,
{
    async fn create_transfer(
        &mut self,
        params: CreateTransferParams,
    ) -> Result<Transfer, LedgerError> {
        self.pause().await;
        check_transfer_amount(params.amount)?;
        if params.from_account_id == params.to_account_id {
            return Err(LedgerError::ConstraintViolation(format!(
                "transfer from account {} to itself",
                params.from_account_id
            )));
        }

        let state = &mut *self.state;
        state.require_account(params.from_account_id)?;
        state.require_account(params.to_account_id)?;
        state.last_transfer_id += 1;
        let transfer = Transfer {
            id: state.last_transfer_id,
            from_account_id: params.from_account_id,
            to_account_id: params.to_account_id,
            amount: params.amount,
            created_at: Utc::now(),
        };
        state.transfers.insert(transfer.id, transfer.clone());
        Ok(transfer)
    }

    async fn get_transfer(&mut self, id: i64) -> Result<Transfer, LedgerError> {
        self.pause().await;
        self.state
            .transfers
            .get(&id)
            .cloned()
            .ok_or_else(|| LedgerError::not_found("transfer", id))
    }

    async fn list_transfers(
        &mut self,
        params: ListTransfersParams,
    ) -> Result<Vec<Transfer>, LedgerError> {
        self.pause().await;
        let rows = self
            .state
            .transfers
            .values()
            .filter(|t| {
                t.from_account_id == params.from_account_id
                    || t.to_account_id == params.to_account_id
            })
            .cloned();
        Ok(params.page.window(rows))
    }

    async fn update_transfer(
        &mut self,
        params: UpdateTransferParams,
    ) -> Result<Transfer, LedgerError> {
        self.pause().await;
        check_transfer_amount(params.amount)?;
        let transfer = self
            .state
            .transfers
            .get_mut(&params.id)
            .ok_or_else(|| LedgerError::not_found("transfer", params.id))?;
        transfer.amount = params.amount;
        Ok(transfer.clone())
    }

    async fn delete_transfer(&mut self, id: i64) -> Result<(), LedgerError> {
        self.pause().await;
        self.state
            .transfers
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| LedgerError::not_found("transfer", id))
    }
}

fn check_transfer_amount(amount: i64) -> Result<(), LedgerError> {
    if amount <= 0 {
        return Err(LedgerError::ConstraintViolation(format!(
            "transfer amount must be positive, got {}",
            amount
        )));
    }
    Ok(())
}
