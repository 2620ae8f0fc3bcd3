//! Transfer Executor
//!
//! Orchestrates one money transfer inside one unit of work:
//!
//! ```text
//! BEGIN
//!   INSERT transfer {from, to, amount}
//!   INSERT entry    {from, -amount}
//!   INSERT entry    {to,   +amount}
//!   UPDATE balance  (smaller account id first)
//!   UPDATE balance  (larger account id second)
//! COMMIT
//! ```
//!
//! # Boundary
//!
//! The executor is an unconditional ledger-mutation primitive. It checks
//! neither funds nor currencies; callers layer those policies above it.
//! It also retries nothing: a failed transfer is reported once and the
//! caller decides, using [`LedgerError::is_retryable`], whether to resubmit.

use std::future::Future;
use std::time::Duration;

use tracing::{info, warn};

use super::balance::{BalanceDelta, apply_transfer_deltas};
use super::error::LedgerError;
use super::models::{
    CreateEntryParams, CreateTransferParams, TransferTxParams, TransferTxResult,
};
use super::store::{Queries, Store};

/// Runs transfers against a `Store`
#[derive(Debug, Clone)]
pub struct TransferExecutor<S> {
    store: S,
    timeout: Option<Duration>,
}

impl<S: Store> TransferExecutor<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            timeout: None,
        }
    }

    /// Abort (and roll back) any transfer that runs longer than `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Execute one transfer atomically
    pub async fn transfer(&self, params: TransferTxParams) -> Result<TransferTxResult, LedgerError> {
        let result = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, self.run(params)).await {
                Ok(result) => result,
                Err(_) => Err(LedgerError::Timeout(limit)),
            },
            None => self.run(params).await,
        };

        self.log_outcome(&params, &result);
        result
    }

    /// Execute one transfer unless `cancel` resolves first.
    ///
    /// On cancellation the in-flight unit of work is dropped, which rolls it
    /// back, and `Cancelled` is returned.
    pub async fn transfer_until<C>(
        &self,
        params: TransferTxParams,
        cancel: C,
    ) -> Result<TransferTxResult, LedgerError>
    where
        C: Future<Output = ()> + Send,
    {
        tokio::select! {
            biased;
            _ = cancel => {
                let result = Err(LedgerError::Cancelled);
                self.log_outcome(&params, &result);
                result
            }
            result = self.transfer(params) => result,
        }
    }

    async fn run(&self, params: TransferTxParams) -> Result<TransferTxResult, LedgerError> {
        self.store
            .run_in_transaction(move |q| Box::pin(transfer_tx(q, params)))
            .await
    }

    fn log_outcome(&self, params: &TransferTxParams, result: &Result<TransferTxResult, LedgerError>) {
        match result {
            Ok(r) => info!(
                transfer_id = r.transfer.id,
                from_account_id = params.from_account_id,
                to_account_id = params.to_account_id,
                amount = params.amount,
                "Transfer committed"
            ),
            Err(e) => warn!(
                from_account_id = params.from_account_id,
                to_account_id = params.to_account_id,
                amount = params.amount,
                code = e.code(),
                retryable = e.is_retryable(),
                error = %e,
                "Transfer aborted"
            ),
        }
    }
}

/// Body of the transfer unit of work
async fn transfer_tx(
    q: &mut dyn Queries,
    params: TransferTxParams,
) -> Result<TransferTxResult, LedgerError> {
    let transfer = q
        .create_transfer(CreateTransferParams {
            from_account_id: params.from_account_id,
            to_account_id: params.to_account_id,
            amount: params.amount,
        })
        .await?;

    let from_entry = q
        .create_entry(CreateEntryParams {
            account_id: params.from_account_id,
            amount: -params.amount,
        })
        .await?;

    let to_entry = q
        .create_entry(CreateEntryParams {
            account_id: params.to_account_id,
            amount: params.amount,
        })
        .await?;

    let (from_account, to_account) = apply_transfer_deltas(
        q,
        BalanceDelta::new(params.from_account_id, -params.amount),
        BalanceDelta::new(params.to_account_id, params.amount),
    )
    .await?;

    Ok(TransferTxResult {
        transfer,
        from_entry,
        to_entry,
        from_account,
        to_account,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::memory::MemoryStore;
    use crate::ledger::models::{Account, CreateAccountParams, Currency};
    use crate::ledger::store::{AccountRepository, EntryLog, TransferRepository};

    async fn open_account(store: &MemoryStore, balance: i64) -> Account {
        store
            .connect()
            .await
            .unwrap()
            .create_account(CreateAccountParams {
                owner: "owner".to_string(),
                balance,
                currency: Currency::Usd,
            })
            .await
            .unwrap()
    }

    fn params(from: &Account, to: &Account, amount: i64) -> TransferTxParams {
        TransferTxParams {
            from_account_id: from.id,
            to_account_id: to.id,
            amount,
        }
    }

    #[tokio::test]
    async fn test_transfer_scenario() {
        let store = MemoryStore::new();
        let a = open_account(&store, 100).await;
        let b = open_account(&store, 50).await;
        assert_eq!((a.id, b.id), (1, 2));

        let executor = TransferExecutor::new(store.clone());
        let result = executor.transfer(params(&a, &b, 30)).await.unwrap();

        assert_eq!(result.transfer.amount, 30);
        assert_eq!(result.transfer.from_account_id, 1);
        assert_eq!(result.transfer.to_account_id, 2);
        assert_eq!(result.from_entry.account_id, 1);
        assert_eq!(result.from_entry.amount, -30);
        assert_eq!(result.to_entry.account_id, 2);
        assert_eq!(result.to_entry.amount, 30);
        assert_eq!(result.from_account.balance, 70);
        assert_eq!(result.to_account.balance, 80);

        let mut q = store.connect().await.unwrap();
        assert_eq!(q.get_transfer(result.transfer.id).await.unwrap(), result.transfer);
        assert_eq!(q.get_entry(result.from_entry.id).await.unwrap(), result.from_entry);
        assert_eq!(q.get_entry(result.to_entry.id).await.unwrap(), result.to_entry);
    }

    #[tokio::test]
    async fn test_failed_balance_update_leaves_no_trace() {
        let store = MemoryStore::new();
        let a = open_account(&store, 100).await;
        let b = open_account(&store, 100).await;
        let accounts_before = store.accounts().await;

        // The larger id is updated last, after transfer and entries exist
        store.set_fail_balance_update(Some(b.id));
        let executor = TransferExecutor::new(store.clone());
        let err = executor.transfer(params(&a, &b, 10)).await.unwrap_err();
        assert_eq!(err.code(), "DATABASE_ERROR");

        assert_eq!(store.accounts().await, accounts_before);
        assert!(store.transfers().await.is_empty());
        assert!(store.entries().await.is_empty());
        assert!(store.balance_journal().await.is_empty());
    }

    #[tokio::test]
    async fn test_missing_account_is_not_found() {
        let store = MemoryStore::new();
        let a = open_account(&store, 100).await;
        let executor = TransferExecutor::new(store.clone());

        let err = executor
            .transfer(TransferTxParams {
                from_account_id: a.id,
                to_account_id: 404,
                amount: 10,
            })
            .await
            .unwrap_err();

        assert!(err.is_not_found());
        assert!(!err.is_retryable());
        assert_eq!(store.accounts().await[0].balance, 100);
    }

    #[tokio::test]
    async fn test_precondition_violations_do_not_corrupt_state() {
        let store = MemoryStore::new();
        let a = open_account(&store, 100).await;
        let b = open_account(&store, 100).await;
        let executor = TransferExecutor::new(store.clone());

        for bad in [params(&a, &b, 0), params(&a, &b, -5), params(&a, &a, 10)] {
            let err = executor.transfer(bad).await.unwrap_err();
            assert_eq!(err.code(), "CONSTRAINT_VIOLATION");
        }

        let total: i64 = store.accounts().await.iter().map(|a| a.balance).sum();
        assert_eq!(total, 200);
        assert!(store.transfers().await.is_empty());
    }

    #[tokio::test]
    async fn test_overdraft_is_not_rejected_by_core() {
        let store = MemoryStore::new();
        let a = open_account(&store, 10).await;
        let b = open_account(&store, 0).await;
        let executor = TransferExecutor::new(store);

        let result = executor.transfer(params(&a, &b, 25)).await.unwrap();
        assert_eq!(result.from_account.balance, -15);
        assert_eq!(result.to_account.balance, 25);
    }

    #[tokio::test]
    async fn test_reverse_direction_updates_smaller_id_first() {
        let store = MemoryStore::new();
        let a = open_account(&store, 100).await;
        let b = open_account(&store, 100).await;
        let executor = TransferExecutor::new(store.clone());

        executor.transfer(params(&b, &a, 10)).await.unwrap();
        executor.transfer(params(&a, &b, 5)).await.unwrap();

        let journal = store.balance_journal().await;
        let ids: Vec<i64> = journal.iter().map(|d| d.account_id).collect();
        assert_eq!(ids, vec![a.id, b.id, a.id, b.id]);
        let deltas: Vec<i64> = journal.iter().map(|d| d.delta).collect();
        assert_eq!(deltas, vec![10, -10, -5, 5]);
    }

    #[tokio::test]
    async fn test_timeout_rolls_back() {
        let store = MemoryStore::new();
        let a = open_account(&store, 100).await;
        let b = open_account(&store, 100).await;
        store.set_op_delay(Duration::from_millis(50));

        let executor =
            TransferExecutor::new(store.clone()).with_timeout(Duration::from_millis(10));
        let err = executor.transfer(params(&a, &b, 10)).await.unwrap_err();
        assert!(matches!(err, LedgerError::Timeout(_)));

        store.set_op_delay(Duration::ZERO);
        assert!(store.transfers().await.is_empty());
        assert!(store.entries().await.is_empty());
        let balances: Vec<i64> = store.accounts().await.iter().map(|a| a.balance).collect();
        assert_eq!(balances, vec![100, 100]);
    }

    #[tokio::test]
    async fn test_cancellation_rolls_back() {
        let store = MemoryStore::new();
        let a = open_account(&store, 100).await;
        let b = open_account(&store, 100).await;
        store.set_op_delay(Duration::from_millis(20));

        let executor = TransferExecutor::new(store.clone());
        let (cancel_tx, cancel_rx) = tokio::sync::oneshot::channel::<()>();
        let cancel = async move {
            let _ = cancel_rx.await;
        };

        let handle = tokio::spawn(async move { executor.transfer_until(params(&a, &b, 10), cancel).await });
        tokio::time::sleep(Duration::from_millis(30)).await;
        cancel_tx.send(()).unwrap();

        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, LedgerError::Cancelled));

        store.set_op_delay(Duration::ZERO);
        assert!(store.transfers().await.is_empty());
        assert!(store.entries().await.is_empty());
    }

    #[tokio::test]
    async fn test_transfer_until_completes_when_not_cancelled() {
        let store = MemoryStore::new();
        let a = open_account(&store, 100).await;
        let b = open_account(&store, 100).await;
        let executor = TransferExecutor::new(store.clone());

        let result = executor
            .transfer_until(params(&a, &b, 10), std::future::pending())
            .await
            .unwrap();
        assert_eq!(result.from_account.balance, 90);

        let mut q = store.connect().await.unwrap();
        let entries = q
            .list_entries(crate::ledger::models::ListEntriesParams {
                account_id: b.id,
                page: crate::ledger::models::Page::first(),
            })
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].amount, 10);
    }
}
