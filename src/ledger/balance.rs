//! Balance Updater
//!
//! Applies signed deltas to account balances. Every balance mutation in a
//! transfer goes through here so the lock-ordering rule holds globally:
//! when one unit of work touches two accounts, the smaller account id is
//! always updated (and therefore locked) first.

use tracing::debug;

use super::error::LedgerError;
use super::models::Account;
use super::store::Queries;

/// A pending balance change on one account
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceDelta {
    pub account_id: i64,
    pub delta: i64,
}

impl BalanceDelta {
    pub fn new(account_id: i64, delta: i64) -> Self {
        Self { account_id, delta }
    }
}

/// Read-modify-write of one balance, indivisible with respect to other
/// mutators of the same account.
pub async fn apply_delta(
    q: &mut dyn Queries,
    account_id: i64,
    delta: i64,
) -> Result<Account, LedgerError> {
    let account = q.add_account_balance(account_id, delta).await?;
    debug!(
        account_id = account_id,
        delta = delta,
        balance = account.balance,
        "Balance updated"
    );
    Ok(account)
}

/// Apply both sides of a transfer in ascending account id order.
///
/// Returns the updated accounts in request order `(from, to)`.
pub async fn apply_transfer_deltas(
    q: &mut dyn Queries,
    from: BalanceDelta,
    to: BalanceDelta,
) -> Result<(Account, Account), LedgerError> {
    if from.account_id < to.account_id {
        let from_account = apply_delta(q, from.account_id, from.delta).await?;
        let to_account = apply_delta(q, to.account_id, to.delta).await?;
        Ok((from_account, to_account))
    } else {
        let to_account = apply_delta(q, to.account_id, to.delta).await?;
        let from_account = apply_delta(q, from.account_id, from.delta).await?;
        Ok((from_account, to_account))
    }
}
