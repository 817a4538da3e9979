//! CSV ingestion
//!
//! Materializes an [`InputDataset`] from a directory laid out like the
//! synthetic-data generator's output:
//!
//! - `users.csv` - `user_id`, optional `full_name`, `consent_granted`, `credit_limit`
//! - `accounts.csv` - `account_id`, `user_id`, `account_type`, `current_balance`,
//!   optional `credit_limit` (or `limit`), `iso_currency_code`
//! - `transactions.csv` - `transaction_id`, `user_id`, `account_id`, `date`,
//!   `amount`, `merchant_name`, `category`, optional `is_transfer`
//! - `liabilities.csv` (optional) - `account_id`, `is_overdue`
//!
//! Unknown columns are ignored. Credit accounts without a limit column take
//! the owning user's `credit_limit` from `users.csv` when one is present;
//! otherwise the limit stays missing and the metric calculator rejects the
//! account.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::path::Path;

use chrono::NaiveDate;
use csv::ReaderBuilder;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::models::{Account, AccountType, InputDataset, Transaction, UserProfile};

pub const USERS_FILE: &str = "users.csv";
pub const ACCOUNTS_FILE: &str = "accounts.csv";
pub const TRANSACTIONS_FILE: &str = "transactions.csv";
pub const LIABILITIES_FILE: &str = "liabilities.csv";

/// Accepts `1`, `true`, `yes` (any case) as true; anything else is false
fn flexible_bool<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.is_some_and(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes")))
}

fn default_consent() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct UserRow {
    user_id: String,
    #[serde(default, alias = "name")]
    full_name: Option<String>,
    #[serde(default = "default_consent", deserialize_with = "flexible_bool")]
    consent_granted: bool,
    #[serde(default)]
    credit_limit: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
struct AccountRow {
    #[serde(alias = "id")]
    account_id: String,
    user_id: String,
    #[serde(alias = "type")]
    account_type: String,
    #[serde(alias = "balance")]
    current_balance: Decimal,
    #[serde(default, alias = "limit")]
    credit_limit: Option<Decimal>,
    #[serde(default, alias = "currency")]
    iso_currency_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TransactionRow {
    #[serde(alias = "id")]
    transaction_id: String,
    user_id: String,
    account_id: String,
    #[serde(alias = "posted")]
    date: NaiveDate,
    amount: Decimal,
    #[serde(default, alias = "merchant")]
    merchant_name: Option<String>,
    #[serde(default, alias = "category_primary")]
    category: Option<String>,
    #[serde(default, alias = "transfer", deserialize_with = "flexible_bool")]
    is_transfer: bool,
}

#[derive(Debug, Deserialize)]
struct LiabilityRow {
    account_id: String,
    #[serde(default, deserialize_with = "flexible_bool")]
    is_overdue: bool,
}

fn read_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let file = File::open(path).map_err(|e| {
        Error::InvalidData(format!("Failed to open {}: {}", path.display(), e))
    })?;
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(file);

    let mut rows = Vec::new();
    for result in rdr.deserialize() {
        rows.push(result?);
    }
    debug!(path = %path.display(), rows = rows.len(), "CSV loaded");
    Ok(rows)
}

/// Load the dataset from a directory of CSV files
pub fn load_dataset(dir: &Path) -> Result<InputDataset> {
    if !dir.is_dir() {
        return Err(Error::NotFound(format!("Data directory {}", dir.display())));
    }
    let missing: Vec<&str> = [USERS_FILE, ACCOUNTS_FILE, TRANSACTIONS_FILE]
        .into_iter()
        .filter(|name| !dir.join(name).exists())
        .collect();
    if !missing.is_empty() {
        return Err(Error::NotFound(format!(
            "Missing files in {}: {}",
            dir.display(),
            missing.join(", ")
        )));
    }

    let user_rows: Vec<UserRow> = read_rows(&dir.join(USERS_FILE))?;
    let account_rows: Vec<AccountRow> = read_rows(&dir.join(ACCOUNTS_FILE))?;
    let transaction_rows: Vec<TransactionRow> = read_rows(&dir.join(TRANSACTIONS_FILE))?;
    let liabilities_path = dir.join(LIABILITIES_FILE);
    let liability_rows: Vec<LiabilityRow> = if liabilities_path.exists() {
        read_rows(&liabilities_path)?
    } else {
        Vec::new()
    };

    let user_limits: HashMap<&str, Decimal> = user_rows
        .iter()
        .filter_map(|u| u.credit_limit.map(|limit| (u.user_id.as_str(), limit)))
        .collect();
    let overdue: HashSet<&str> = liability_rows
        .iter()
        .filter(|l| l.is_overdue)
        .map(|l| l.account_id.as_str())
        .collect();

    let mut accounts = Vec::with_capacity(account_rows.len());
    for row in &account_rows {
        let account_type: AccountType = row.account_type.parse().map_err(|e| {
            Error::InvalidData(format!("Account {}: {}", row.account_id, e))
        })?;
        let credit_limit = match account_type {
            AccountType::Credit => row
                .credit_limit
                .or_else(|| user_limits.get(row.user_id.as_str()).copied()),
            _ => None,
        };
        accounts.push(Account {
            id: row.account_id.clone(),
            user_id: row.user_id.clone(),
            account_type,
            balance: row.current_balance,
            credit_limit,
            currency: row
                .iso_currency_code
                .clone()
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| "USD".to_string()),
            past_due: overdue.contains(row.account_id.as_str()),
        });
    }

    let transactions: Vec<Transaction> = transaction_rows
        .into_iter()
        .map(|row| {
            let category = row.category.unwrap_or_default();
            let transfer = row.is_transfer
                || category
                    .split('>')
                    .any(|segment| segment.trim().eq_ignore_ascii_case("transfer"));
            Transaction {
                id: row.transaction_id,
                account_id: row.account_id,
                user_id: row.user_id,
                posted: row.date,
                amount: row.amount,
                merchant: row.merchant_name.unwrap_or_default(),
                category,
                transfer,
            }
        })
        .collect();

    let users: Vec<UserProfile> = user_rows
        .into_iter()
        .map(|row| UserProfile {
            user_id: row.user_id,
            name: row.full_name.filter(|n| !n.is_empty()),
            consent_granted: row.consent_granted,
        })
        .collect();

    let dataset = InputDataset {
        users,
        accounts,
        transactions,
    };
    dataset.validate()?;

    info!(
        users = dataset.users.len(),
        accounts = dataset.accounts.len(),
        transactions = dataset.transactions.len(),
        "Dataset loaded"
    );

    Ok(dataset)
}
