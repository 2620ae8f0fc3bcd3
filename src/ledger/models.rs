//! Ledger data models
//!
//! Rows of the `accounts`, `entries` and `transfers` tables plus the
//! parameter structs the repositories accept.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use thiserror::Error;

use super::error::LedgerError;

/// Largest page a list query may return
pub const MAX_PAGE_LIMIT: i64 = 10;

// ============================================================================
// Currency
// ============================================================================

/// Supported account currencies (stored as ISO code text)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Usd,
    Eur,
    Uah,
}

impl Currency {
    pub const ALL: [Currency; 3] = [Currency::Usd, Currency::Eur, Currency::Uah];

    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
            Currency::Uah => "UAH",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unsupported currency: {0}")]
pub struct UnsupportedCurrency(pub String);

impl FromStr for Currency {
    type Err = UnsupportedCurrency;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "USD" => Ok(Currency::Usd),
            "EUR" => Ok(Currency::Eur),
            "UAH" => Ok(Currency::Uah),
            other => Err(UnsupportedCurrency(other.to_string())),
        }
    }
}

impl TryFrom<String> for Currency {
    type Error = UnsupportedCurrency;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

// ============================================================================
// Rows
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Account {
    pub id: i64,
    pub owner: String,
    pub balance: i64,
    #[sqlx(try_from = "String")]
    pub currency: Currency,
    pub created_at: DateTime<Utc>,
}

/// One signed balance delta. Negative debits, positive credits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Entry {
    pub id: i64,
    pub account_id: i64,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Transfer {
    pub id: i64,
    pub from_account_id: i64,
    pub to_account_id: i64,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Pagination
// ============================================================================

/// Bounded limit/offset window for list queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    limit: i64,
    offset: i64,
}

impl Page {
    /// Build a page, rejecting `limit` outside `1..=MAX_PAGE_LIMIT` or a
    /// negative `offset`.
    pub fn new(limit: i64, offset: i64) -> Result<Self, LedgerError> {
        if !(1..=MAX_PAGE_LIMIT).contains(&limit) || offset < 0 {
            return Err(LedgerError::InvalidPage { limit, offset });
        }
        Ok(Self { limit, offset })
    }

    /// First page of the maximum size
    pub fn first() -> Self {
        Self {
            limit: MAX_PAGE_LIMIT,
            offset: 0,
        }
    }

    pub fn limit(&self) -> i64 {
        self.limit
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }

    pub(crate) fn window<T>(&self, rows: impl Iterator<Item = T>) -> Vec<T> {
        rows.skip(self.offset as usize)
            .take(self.limit as usize)
            .collect()
    }
}

// ============================================================================
// Repository parameters
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateAccountParams {
    pub owner: String,
    pub balance: i64,
    pub currency: Currency,
}

/// Owner is the only mutable account field; balances move through entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateAccountParams {
    pub id: i64,
    pub owner: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListAccountsParams {
    pub owner: String,
    pub page: Page,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateEntryParams {
    pub account_id: i64,
    pub amount: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateEntryParams {
    pub id: i64,
    pub amount: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListEntriesParams {
    pub account_id: i64,
    pub page: Page,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTransferParams {
    pub from_account_id: i64,
    pub to_account_id: i64,
    pub amount: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateTransferParams {
    pub id: i64,
    pub amount: i64,
}

/// Transfers where `from_account_id` matches the first id OR
/// `to_account_id` matches the second.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListTransfersParams {
    pub from_account_id: i64,
    pub to_account_id: i64,
    pub page: Page,
}

// ============================================================================
// Transfer transaction
// ============================================================================

/// Input of one transfer. Callers validate amount, distinct accounts,
/// matching currencies and funds before submitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferTxParams {
    pub from_account_id: i64,
    pub to_account_id: i64,
    pub amount: i64,
}

/// Everything one committed transfer created or updated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferTxResult {
    pub transfer: Transfer,
    pub from_entry: Entry,
    pub to_entry: Entry,
    pub from_account: Account,
    pub to_account: Account,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_currency_round_trip_text() {
        for currency in Currency::ALL {
            assert_eq!(currency.as_str().parse::<Currency>(), Ok(currency));
        }
        assert!("GBP".parse::<Currency>().is_err());
        assert!(Currency::try_from("usd".to_string()).is_err());
    }

    #[test]
    fn test_currency_serde_uses_iso_code() {
        let json = serde_json::to_string(&Currency::Uah).unwrap();
        assert_eq!(json, "\"UAH\"");
        let back: Currency = serde_json::from_str("\"EUR\"").unwrap();
        assert_eq!(back, Currency::Eur);
    }

    #[test]
    fn test_page_bounds() {
        assert!(Page::new(1, 0).is_ok());
        assert!(Page::new(MAX_PAGE_LIMIT, 100).is_ok());

        assert!(matches!(
            Page::new(0, 0),
            Err(LedgerError::InvalidPage { limit: 0, offset: 0 })
        ));
        assert!(Page::new(MAX_PAGE_LIMIT + 1, 0).is_err());
        assert!(Page::new(5, -1).is_err());
    }

    #[test]
    fn test_page_window() {
        let page = Page::new(3, 2).unwrap();
        assert_eq!(page.window(1..=10), vec![3, 4, 5]);

        let past_end = Page::new(5, 20).unwrap();
        assert!(past_end.window(1..=10).is_empty());
    }
}
