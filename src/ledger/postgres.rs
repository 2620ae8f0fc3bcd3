//! PostgreSQL ledger store
//!
//! Repositories run against whichever connection the handle owns: a pooled
//! connection for standalone calls, or the connection of an open
//! transaction inside `run_in_transaction`. Balance updates are a single
//! `UPDATE ... SET balance = balance + $delta` statement, so the read and
//! the write happen under one row lock held until the transaction ends.

use std::ops::DerefMut;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::pool::PoolConnection;
use sqlx::{PgConnection, PgPool, Postgres};
use tracing::{debug, warn};

use super::error::LedgerError;
use super::models::{
    Account, CreateAccountParams, CreateEntryParams, CreateTransferParams, Entry,
    ListAccountsParams, ListEntriesParams, ListTransfersParams, Transfer, UpdateAccountParams,
    UpdateEntryParams, UpdateTransferParams,
};
use super::store::{AccountRepository, EntryLog, Queries, Store, TransferRepository, TxWork};

/// Transaction isolation level applied to every unit of work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    #[default]
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    fn set_statement(&self) -> &'static str {
        match self {
            IsolationLevel::ReadCommitted => "SET TRANSACTION ISOLATION LEVEL READ COMMITTED",
            IsolationLevel::RepeatableRead => "SET TRANSACTION ISOLATION LEVEL REPEATABLE READ",
            IsolationLevel::Serializable => "SET TRANSACTION ISOLATION LEVEL SERIALIZABLE",
        }
    }
}

/// PostgreSQL `Store` over a shared connection pool
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
    isolation: IsolationLevel,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            isolation: IsolationLevel::default(),
        }
    }

    pub fn with_isolation(mut self, isolation: IsolationLevel) -> Self {
        self.isolation = isolation;
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    type Conn = PgQueries<PoolConnection<Postgres>>;

    async fn connect(&self) -> Result<Self::Conn, LedgerError> {
        let conn = self.pool.acquire().await?;
        Ok(PgQueries { conn })
    }

    async fn run_in_transaction<T, F>(&self, work: F) -> Result<T, LedgerError>
    where
        T: Send + 'static,
        F: for<'c> FnOnce(&'c mut dyn Queries) -> TxWork<'c, T> + Send + 'static,
    {
        // A Transaction dropped without commit is rolled back by sqlx, which
        // covers cancellation and panics inside `work`.
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| LedgerError::TransactionFailure(format!("begin: {}", e)))?;

        sqlx::query(self.isolation.set_statement())
            .execute(&mut *tx)
            .await
            .map_err(|e| LedgerError::TransactionFailure(format!("set isolation: {}", e)))?;

        let result = {
            let mut q = PgQueries { conn: &mut *tx };
            work(&mut q).await
        };

        match result {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(error) => match tx.rollback().await {
                Ok(()) => {
                    debug!(code = error.code(), "Unit of work rolled back");
                    Err(error)
                }
                Err(rb) => {
                    warn!(error = %error, rollback = %rb, "Rollback failed");
                    Err(LedgerError::RollbackFailed {
                        error: Box::new(error),
                        rollback: rb.to_string(),
                    })
                }
            },
        }
    }
}

/// Repository handle bound to one PostgreSQL connection
pub struct PgQueries<C> {
    conn: C,
}

#[async_trait]
impl<C> AccountRepository for PgQueries<C>
where
    C: DerefMut<Target = PgConnection> + Send,
{
    async fn create_account(
        &mut self,
        params: CreateAccountParams,
    ) -> Result<Account, LedgerError> {
        let account = sqlx::query_as::<_, Account>(
            r#"
            INSERT INTO accounts (owner, balance, currency)
            VALUES ($1, $2, $3)
            RETURNING id, owner, balance, currency, created_at
            "#,
        )
        .bind(&params.owner)
        .bind(params.balance)
        .bind(params.currency.as_str())
        .fetch_one(&mut *self.conn)
        .await?;

        Ok(account)
    }

    async fn get_account(&mut self, id: i64) -> Result<Account, LedgerError> {
        sqlx::query_as::<_, Account>(
            r#"
            SELECT id, owner, balance, currency, created_at
            FROM accounts
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *self.conn)
        .await?
        .ok_or_else(|| LedgerError::not_found("account", id))
    }

    async fn get_account_for_update(&mut self, id: i64) -> Result<Account, LedgerError> {
        // NO KEY UPDATE does not block the KEY SHARE locks taken by entry and
        // transfer inserts referencing this row.
        sqlx::query_as::<_, Account>(
            r#"
            SELECT id, owner, balance, currency, created_at
            FROM accounts
            WHERE id = $1
            FOR NO KEY UPDATE
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *self.conn)
        .await?
        .ok_or_else(|| LedgerError::not_found("account", id))
    }

    async fn list_accounts(
        &mut self,
        params: ListAccountsParams,
    ) -> Result<Vec<Account>, LedgerError> {
        let rows = sqlx::query_as::<_, Account>(
            r#"
            SELECT id, owner, balance, currency, created_at
            FROM accounts
            WHERE owner = $1
            ORDER BY id
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(&params.owner)
        .bind(params.page.limit())
        .bind(params.page.offset())
        .fetch_all(&mut *self.conn)
        .await?;

        Ok(rows)
    }

    async fn update_account(
        &mut self,
        params: UpdateAccountParams,
    ) -> Result<Account, LedgerError> {
        sqlx::query_as::<_, Account>(
            r#"
            UPDATE accounts SET owner = $2
            WHERE id = $1
            RETURNING id, owner, balance, currency, created_at
            "#,
        )
        .bind(params.id)
        .bind(&params.owner)
        .fetch_optional(&mut *self.conn)
        .await?
        .ok_or_else(|| LedgerError::not_found("account", params.id))
    }

    async fn add_account_balance(&mut self, id: i64, delta: i64) -> Result<Account, LedgerError> {
        sqlx::query_as::<_, Account>(
            r#"
            UPDATE accounts SET balance = balance + $2
            WHERE id = $1
            RETURNING id, owner, balance, currency, created_at
            "#,
        )
        .bind(id)
        .bind(delta)
        .fetch_optional(&mut *self.conn)
        .await?
        .ok_or_else(|| LedgerError::not_found("account", id))
    }

    async fn delete_account(&mut self, id: i64) -> Result<(), LedgerError> {
        let result = sqlx::query("DELETE FROM accounts WHERE id = $1")
            .bind(id)
            .execute(&mut *self.conn)
            .await
            .map_err(|e| match LedgerError::from(e) {
                // FK violation on delete means dependents exist, not a missing row
                LedgerError::NotFound(msg) => LedgerError::StillReferenced(msg),
                other => other,
            })?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::not_found("account", id));
        }
        Ok(())
    }
}

#[async_trait]
impl<C> EntryLog for PgQueries<C>
where
    C: DerefMut<Target = PgConnection> + Send,
{
    async fn create_entry(&mut self, params: CreateEntryParams) -> Result<Entry, LedgerError> {
        let entry = sqlx::query_as::<_, Entry>(
            r#"
            INSERT INTO entries (account_id, amount)
            VALUES ($1, $2)
            RETURNING id, account_id, amount, created_at
            "#,
        )
        .bind(params.account_id)
        .bind(params.amount)
        .fetch_one(&mut *self.conn)
        .await?;

        Ok(entry)
    }

    async fn get_entry(&mut self, id: i64) -> Result<Entry, LedgerError> {
        sqlx::query_as::<_, Entry>(
            "SELECT id, account_id, amount, created_at FROM entries WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&mut *self.conn)
        .await?
        .ok_or_else(|| LedgerError::not_found("entry", id))
    }

    async fn list_entries(&mut self, params: ListEntriesParams) -> Result<Vec<Entry>, LedgerError> {
        let rows = sqlx::query_as::<_, Entry>(
            r#"
            SELECT id, account_id, amount, created_at
            FROM entries
            WHERE account_id = $1
            ORDER BY id
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(params.account_id)
        .bind(params.page.limit())
        .bind(params.page.offset())
        .fetch_all(&mut *self.conn)
        .await?;

        Ok(rows)
    }

    async fn update_entry(&mut self, params: UpdateEntryParams) -> Result<Entry, LedgerError> {
        sqlx::query_as::<_, Entry>(
            r#"
            UPDATE entries SET amount = $2
            WHERE id = $1
            RETURNING id, account_id, amount, created_at
            "#,
        )
        .bind(params.id)
        .bind(params.amount)
        .fetch_optional(&mut *self.conn)
        .await?
        .ok_or_else(|| LedgerError::not_found("entry", params.id))
    }

    async fn delete_entry(&mut self, id: i64) -> Result<(), LedgerError> {
        let result = sqlx::query("DELETE FROM entries WHERE id = $1")
            .bind(id)
            .execute(&mut *self.conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::not_found("entry", id));
        }
        Ok(())
    }
}

#[async_trait]
impl<C> TransferRepository for PgQueries<C>
where
    C: DerefMut<Target = PgConnection> + Send,
{
    async fn create_transfer(
        &mut self,
        params: CreateTransferParams,
    ) -> Result<Transfer, LedgerError> {
        let transfer = sqlx::query_as::<_, Transfer>(
            r#"
            INSERT INTO transfers (from_account_id, to_account_id, amount)
            VALUES ($1, $2, $3)
            RETURNING id, from_account_id, to_account_id, amount, created_at
            "#,
        )
        .bind(params.from_account_id)
        .bind(params.to_account_id)
        .bind(params.amount)
        .fetch_one(&mut *self.conn)
        .await?;

        Ok(transfer)
    }

    async fn get_transfer(&mut self, id: i64) -> Result<Transfer, LedgerError> {
        sqlx::query_as::<_, Transfer>(
            r#"
            SELECT id, from_account_id, to_account_id, amount, created_at
            FROM transfers
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *self.conn)
        .await?
        .ok_or_else(|| LedgerError::not_found("transfer", id))
    }

    async fn list_transfers(
        &mut self,
        params: ListTransfersParams,
    ) -> Result<Vec<Transfer>, LedgerError> {
        let rows = sqlx::query_as::<_, Transfer>(
            r#"
            SELECT id, from_account_id, to_account_id, amount, created_at
            FROM transfers
            WHERE from_account_id = $1 OR to_account_id = $2
            ORDER BY id
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(params.from_account_id)
        .bind(params.to_account_id)
        .bind(params.page.limit())
        .bind(params.page.offset())
        .fetch_all(&mut *self.conn)
        .await?;

        Ok(rows)
    }

    async fn update_transfer(
        &mut self,
        params: UpdateTransferParams,
    ) -> Result<Transfer, LedgerError> {
        sqlx::query_as::<_, Transfer>(
            r#"
            UPDATE transfers SET amount = $2
            WHERE id = $1
            RETURNING id, from_account_id, to_account_id, amount, created_at
            "#,
        )
        .bind(params.id)
        .bind(params.amount)
        .fetch_optional(&mut *self.conn)
        .await?
        .ok_or_else(|| LedgerError::not_found("transfer", params.id))
    }

    async fn delete_transfer(&mut self, id: i64) -> Result<(), LedgerError> {
        let result = sqlx::query("DELETE FROM transfers WHERE id = $1")
            .bind(id)
            .execute(&mut *self.conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::not_found("transfer", id));
        }
        Ok(())
    }
}
