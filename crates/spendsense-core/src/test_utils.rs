//! Test utilities for spendsense-core
//!
//! Record builders shared by the unit tests of the metric, classifier,
//! recommendation and pipeline modules.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::models::{Account, AccountType, Transaction};

static COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_id(prefix: &str) -> String {
    format!("{}{:06}", prefix, COUNTER.fetch_add(1, Ordering::SeqCst))
}

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

pub fn account(user_id: &str, account_type: AccountType, balance: Decimal) -> Account {
    Account {
        id: next_id("ACC"),
        user_id: user_id.to_string(),
        account_type,
        balance,
        credit_limit: None,
        currency: "USD".to_string(),
        past_due: false,
    }
}

/// The user's checking account, `<user>_CHK`; builder transactions post here
pub fn checking(user_id: &str, balance: Decimal) -> Account {
    Account {
        id: format!("{}_CHK", user_id),
        ..account(user_id, AccountType::Checking, balance)
    }
}

pub fn savings(user_id: &str, balance: Decimal) -> Account {
    account(user_id, AccountType::Savings, balance)
}

pub fn credit(user_id: &str, balance: Decimal, limit: Decimal) -> Account {
    Account {
        credit_limit: Some(limit),
        ..account(user_id, AccountType::Credit, balance)
    }
}

pub fn transaction(
    user_id: &str,
    posted: NaiveDate,
    amount: Decimal,
    merchant: &str,
    category: &str,
) -> Transaction {
    Transaction {
        id: next_id("TXN"),
        account_id: format!("{}_CHK", user_id),
        user_id: user_id.to_string(),
        posted,
        amount,
        merchant: merchant.to_string(),
        category: category.to_string(),
        transfer: false,
    }
}

/// Outflow of `amount` (pass a positive number)
pub fn spend(user_id: &str, posted: NaiveDate, amount: Decimal, merchant: &str) -> Transaction {
    transaction(user_id, posted, -amount, merchant, "Shops > Retail")
}

pub fn paycheck(user_id: &str, posted: NaiveDate, amount: Decimal) -> Transaction {
    transaction(user_id, posted, amount, "Acme Corp Payroll", "Income > Payroll")
}

pub fn interest_charge(user_id: &str, posted: NaiveDate, amount: Decimal) -> Transaction {
    transaction(user_id, posted, -amount, "Card APR Charge", "Finance > Interest")
}

pub fn transfer(user_id: &str, posted: NaiveDate, amount: Decimal) -> Transaction {
    Transaction {
        transfer: true,
        ..transaction(user_id, posted, amount, "Internal Transfer", "Transfer")
    }
}

/// One outflow on `day` of each month for `months` consecutive months starting at `start`
pub fn monthly_charges(
    user_id: &str,
    merchant: &str,
    amount: Decimal,
    start: NaiveDate,
    months: u32,
) -> Vec<Transaction> {
    (0..months)
        .map(|i| {
            let posted = start
                .checked_add_months(chrono::Months::new(i))
                .unwrap();
            spend(user_id, posted, amount, merchant)
        })
        .collect()
}
