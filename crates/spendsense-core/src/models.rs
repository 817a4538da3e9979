//! Domain models for SpendSense
//!
//! Input records (users, accounts, transactions) arrive already materialized in
//! memory; the derived [`MetricSnapshot`] is produced by the metric calculator.
//! Money is always [`Decimal`]; ratios are `f64` computed from decimals.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Account types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    Checking,
    Savings,
    Credit,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Checking => "checking",
            Self::Savings => "savings",
            Self::Credit => "credit",
        }
    }

    /// Checking and savings balances count toward liquid cash
    pub fn is_liquid(&self) -> bool {
        matches!(self, Self::Checking | Self::Savings)
    }
}

impl std::str::FromStr for AccountType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "checking" | "depository" => Ok(Self::Checking),
            "savings" => Ok(Self::Savings),
            "credit" | "credit card" | "credit_card" => Ok(Self::Credit),
            _ => Err(format!("Unknown account type: {}", s)),
        }
    }
}

impl std::fmt::Display for AccountType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A user known to the ingestion collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    pub name: Option<String>,
    /// Recommendations are only produced for users who granted consent
    pub consent_granted: bool,
}

impl UserProfile {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            name: None,
            consent_granted: true,
        }
    }
}

/// A bank or card account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub user_id: String,
    pub account_type: AccountType,
    /// Signed balance. For credit accounts a positive balance is the amount owed.
    pub balance: Decimal,
    /// Required (and positive) for credit accounts
    pub credit_limit: Option<Decimal>,
    pub currency: String,
    /// Supplied by the servicer, not derived
    #[serde(default)]
    pub past_due: bool,
}

impl Account {
    /// Check the account invariants
    ///
    /// Credit accounts must carry a positive limit. The limit is never
    /// defaulted because a guessed limit would change utilization.
    pub fn validate(&self) -> Result<()> {
        if self.account_type != AccountType::Credit {
            return Ok(());
        }

        match self.credit_limit {
            None => Err(Error::InvalidAccountConfiguration {
                account_id: self.id.clone(),
                reason: "credit account has no credit limit".to_string(),
            }),
            Some(limit) if limit <= Decimal::ZERO => Err(Error::InvalidAccountConfiguration {
                account_id: self.id.clone(),
                reason: format!("credit limit must be positive, got {}", limit),
            }),
            Some(_) => Ok(()),
        }
    }
}

/// A posted transaction. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub account_id: String,
    pub user_id: String,
    pub posted: NaiveDate,
    /// Negative = outflow, positive = inflow
    pub amount: Decimal,
    pub merchant: String,
    /// Category code, possibly hierarchical ("Income > Payroll")
    pub category: String,
    /// Internal movement between the user's own accounts
    #[serde(default)]
    pub transfer: bool,
}

impl Transaction {
    pub fn is_outflow(&self) -> bool {
        self.amount < Decimal::ZERO
    }

    pub fn is_inflow(&self) -> bool {
        self.amount > Decimal::ZERO
    }

    /// True when any ` > `-separated segment of the category equals one of the labels
    pub fn in_category<S: AsRef<str>>(&self, labels: &[S]) -> bool {
        self.category.split('>').map(str::trim).any(|segment| {
            labels
                .iter()
                .any(|label| segment.eq_ignore_ascii_case(label.as_ref().trim()))
        })
    }
}

/// In-memory input collections for one evaluation run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InputDataset {
    pub users: Vec<UserProfile>,
    pub accounts: Vec<Account>,
    pub transactions: Vec<Transaction>,
}

impl InputDataset {
    /// Accounts owned by a user
    pub fn accounts_for<'a>(&'a self, user_id: &'a str) -> impl Iterator<Item = &'a Account> + 'a {
        self.accounts.iter().filter(move |a| a.user_id == user_id)
    }

    /// Transactions belonging to a user
    pub fn transactions_for<'a>(
        &'a self,
        user_id: &'a str,
    ) -> impl Iterator<Item = &'a Transaction> + 'a {
        self.transactions.iter().filter(move |t| t.user_id == user_id)
    }

    pub fn user(&self, user_id: &str) -> Option<&UserProfile> {
        self.users.iter().find(|u| u.user_id == user_id)
    }

    /// Reject datasets whose identifiers collide or dangle
    ///
    /// Every account must belong to a known user, and every transaction must
    /// reference a known account owned by the same user.
    pub fn validate(&self) -> Result<()> {
        let mut users = HashSet::new();
        for user in &self.users {
            if !users.insert(user.user_id.as_str()) {
                return Err(Error::InvalidData(format!(
                    "Duplicate user id: {}",
                    user.user_id
                )));
            }
        }

        let mut owners: HashMap<&str, &str> = HashMap::new();
        for account in &self.accounts {
            if owners
                .insert(account.id.as_str(), account.user_id.as_str())
                .is_some()
            {
                return Err(Error::InvalidData(format!(
                    "Duplicate account id: {}",
                    account.id
                )));
            }
            if !users.contains(account.user_id.as_str()) {
                return Err(Error::InvalidData(format!(
                    "Account {} belongs to unknown user {}",
                    account.id, account.user_id
                )));
            }
        }

        let mut seen = HashSet::new();
        for tx in &self.transactions {
            if !seen.insert(tx.id.as_str()) {
                return Err(Error::InvalidData(format!(
                    "Duplicate transaction id: {}",
                    tx.id
                )));
            }
            match owners.get(tx.account_id.as_str()) {
                None => {
                    return Err(Error::InvalidData(format!(
                        "Transaction {} references unknown account {}",
                        tx.id, tx.account_id
                    )))
                }
                Some(owner) if *owner != tx.user_id => {
                    return Err(Error::InvalidData(format!(
                        "Transaction {} is for user {} but account {} belongs to {}",
                        tx.id, tx.user_id, tx.account_id, owner
                    )))
                }
                Some(_) => {}
            }
        }

        Ok(())
    }
}

/// Personas, one per user per evaluation date
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Persona {
    DebtFighter,
    GigWorker,
    AutoPayer,
    WealthCompounder,
    Optimizer,
    /// Terminal fallback when no rule matches
    Unclassified,
}

impl Persona {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DebtFighter => "debt_fighter",
            Self::GigWorker => "gig_worker",
            Self::AutoPayer => "auto_payer",
            Self::WealthCompounder => "wealth_compounder",
            Self::Optimizer => "optimizer",
            Self::Unclassified => "unclassified",
        }
    }

    /// Human-readable label
    pub fn label(&self) -> &'static str {
        match self {
            Self::DebtFighter => "Debt Fighter",
            Self::GigWorker => "Gig Worker",
            Self::AutoPayer => "Auto-Payer",
            Self::WealthCompounder => "Wealth Compounder",
            Self::Optimizer => "Optimizer",
            Self::Unclassified => "Unclassified",
        }
    }

    pub fn all() -> &'static [Persona] {
        &[
            Self::DebtFighter,
            Self::GigWorker,
            Self::AutoPayer,
            Self::WealthCompounder,
            Self::Optimizer,
            Self::Unclassified,
        ]
    }
}

impl std::str::FromStr for Persona {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "debt_fighter" => Ok(Self::DebtFighter),
            "gig_worker" => Ok(Self::GigWorker),
            "auto_payer" => Ok(Self::AutoPayer),
            "wealth_compounder" | "henry" => Ok(Self::WealthCompounder),
            "optimizer" => Ok(Self::Optimizer),
            "unclassified" => Ok(Self::Unclassified),
            _ => Err(format!("Unknown persona: {}", s)),
        }
    }
}

impl std::fmt::Display for Persona {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Liquid runway in months
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "months", rename_all = "snake_case")]
pub enum Runway {
    Months(f64),
    /// Burn rate is zero: the balance never runs out
    Unbounded,
}

impl std::fmt::Display for Runway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Months(m) => write!(f, "{:.1}", m),
            Self::Unbounded => write!(f, "unbounded"),
        }
    }
}

/// A merchant charging at a stable interval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurringMerchant {
    pub merchant: String,
    pub occurrences: usize,
    pub median_interval_days: f64,
    /// Sum of outflows to this merchant over the window (positive)
    pub total_outflow: Decimal,
}

/// Derived signals for one user on one evaluation date
///
/// `None` always means "undefined"; the reason is recorded in `diagnostics`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSnapshot {
    pub user_id: String,
    pub evaluation_date: NaiveDate,
    pub window_months: u32,
    pub income_window_months: u32,

    /// Non-transfer outflow per calendar month, oldest first
    pub monthly_outflows: Vec<Decimal>,
    pub transaction_count: usize,
    pub total_outflow: Decimal,
    pub total_income: Decimal,
    pub liquid_balance: Decimal,

    pub burn_rate: Option<Decimal>,
    pub liquid_runway: Option<Runway>,

    pub credit_balance: Option<Decimal>,
    pub credit_limit: Option<Decimal>,
    pub credit_utilization: Option<f64>,

    pub interest_charges: Decimal,
    pub has_interest: bool,
    pub past_due: bool,
    pub past_due_accounts: usize,

    pub income_events: usize,
    pub income_volatility: Option<f64>,
    pub pay_gap_days: Option<i64>,

    pub recurring_merchants: Vec<RecurringMerchant>,
    pub recurring_merchant_count: usize,
    pub subscription_outflow: Decimal,
    pub subscription_outflow_ratio: Option<f64>,

    pub average_monthly_income: Decimal,
    pub income_percentile: Option<f64>,
    pub savings_rate: Option<f64>,
    /// Liquid cash needed to cover the configured months of burn
    pub idle_cash_floor: Option<Decimal>,
    pub inefficiency_score: Option<Decimal>,

    pub diagnostics: Vec<Diagnostic>,
}

impl MetricSnapshot {
    /// Snapshot with no activity and every optional signal undefined
    pub fn new(user_id: impl Into<String>, evaluation_date: NaiveDate) -> Self {
        Self {
            user_id: user_id.into(),
            evaluation_date,
            window_months: 6,
            income_window_months: 3,
            monthly_outflows: Vec::new(),
            transaction_count: 0,
            total_outflow: Decimal::ZERO,
            total_income: Decimal::ZERO,
            liquid_balance: Decimal::ZERO,
            burn_rate: None,
            liquid_runway: None,
            credit_balance: None,
            credit_limit: None,
            credit_utilization: None,
            interest_charges: Decimal::ZERO,
            has_interest: false,
            past_due: false,
            past_due_accounts: 0,
            income_events: 0,
            income_volatility: None,
            pay_gap_days: None,
            recurring_merchants: Vec::new(),
            recurring_merchant_count: 0,
            subscription_outflow: Decimal::ZERO,
            subscription_outflow_ratio: None,
            average_monthly_income: Decimal::ZERO,
            income_percentile: None,
            savings_rate: None,
            idle_cash_floor: None,
            inefficiency_score: None,
            diagnostics: Vec::new(),
        }
    }

    /// Monthly surplus (income minus outflow) averaged over the window
    pub fn monthly_surplus(&self) -> Decimal {
        if self.window_months == 0 {
            return Decimal::ZERO;
        }
        (self.total_income - self.total_outflow) / Decimal::from(self.window_months)
    }
}

/// Kinds of structured diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    InsufficientData,
    InvalidAccountConfiguration,
    GuardrailPolicyMissing,
    CohortIncomplete,
    ConsentWithheld,
}

impl DiagnosticKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InsufficientData => "insufficient_data",
            Self::InvalidAccountConfiguration => "invalid_account_configuration",
            Self::GuardrailPolicyMissing => "guardrail_policy_missing",
            Self::CohortIncomplete => "cohort_incomplete",
            Self::ConsentWithheld => "consent_withheld",
        }
    }
}

impl std::fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A structured record of anything that was undefined, skipped, or rejected
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    /// None for run-level diagnostics
    pub user_id: Option<String>,
    /// Signal name, account id, or configuration key
    pub subject: String,
    pub message: String,
}

impl Diagnostic {
    pub fn for_user(
        kind: DiagnosticKind,
        user_id: impl Into<String>,
        subject: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            user_id: Some(user_id.into()),
            subject: subject.into(),
            message: message.into(),
        }
    }

    pub fn run(kind: DiagnosticKind, subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            user_id: None,
            subject: subject.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::str::FromStr;

    fn credit(limit: Option<Decimal>) -> Account {
        Account {
            id: "A1".to_string(),
            user_id: "U1".to_string(),
            account_type: AccountType::Credit,
            balance: dec!(100),
            credit_limit: limit,
            currency: "USD".to_string(),
            past_due: false,
        }
    }

    #[test]
    fn test_credit_account_requires_limit() {
        assert!(credit(Some(dec!(1000))).validate().is_ok());

        let err = credit(None).validate().unwrap_err();
        assert!(matches!(err, Error::InvalidAccountConfiguration { .. }));
        assert!(credit(Some(Decimal::ZERO)).validate().is_err());
    }

    #[test]
    fn test_category_segments() {
        let tx = Transaction {
            id: "T1".to_string(),
            account_id: "A1".to_string(),
            user_id: "U1".to_string(),
            posted: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            amount: dec!(2500),
            merchant: "Acme Corp Payroll".to_string(),
            category: "Income > Payroll".to_string(),
            transfer: false,
        };

        assert!(tx.in_category(&["income"]));
        assert!(tx.in_category(&["PAYROLL"]));
        assert!(!tx.in_category(&["interest"]));
    }

    #[test]
    fn test_persona_parsing() {
        assert_eq!(Persona::from_str("Debt Fighter").unwrap(), Persona::DebtFighter);
        assert_eq!(Persona::from_str("auto-payer").unwrap(), Persona::AutoPayer);
        assert_eq!(Persona::from_str("HENRY").unwrap(), Persona::WealthCompounder);
        assert!(Persona::from_str("spender").is_err());
        assert_eq!(Persona::AutoPayer.to_string(), "Auto-Payer");
    }

    #[test]
    fn test_runway_display() {
        assert_eq!(Runway::Unbounded.to_string(), "unbounded");
        assert_eq!(Runway::Months(9.0).to_string(), "9.0");
    }

    fn payment(id: &str, user_id: &str, account_id: &str) -> Transaction {
        Transaction {
            id: id.to_string(),
            account_id: account_id.to_string(),
            user_id: user_id.to_string(),
            posted: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            amount: dec!(-40),
            merchant: "Card Payment".to_string(),
            category: "Payment".to_string(),
            transfer: false,
        }
    }

    /// U1 owns A1, U2 owns A2
    fn two_user_dataset(transactions: Vec<Transaction>) -> InputDataset {
        let mut second = credit(Some(dec!(500)));
        second.id = "A2".to_string();
        second.user_id = "U2".to_string();
        InputDataset {
            users: vec![UserProfile::new("U1"), UserProfile::new("U2")],
            accounts: vec![credit(Some(dec!(1000))), second],
            transactions,
        }
    }

    fn invalid_data_message(dataset: &InputDataset) -> String {
        match dataset.validate().unwrap_err() {
            Error::InvalidData(message) => message,
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_dataset_accepts_consistent_references() {
        let dataset = two_user_dataset(vec![payment("T1", "U1", "A1"), payment("T2", "U2", "A2")]);
        assert!(dataset.validate().is_ok());
    }

    #[test]
    fn test_dataset_rejects_duplicate_transactions() {
        let dataset = two_user_dataset(vec![payment("T1", "U1", "A1"), payment("T1", "U1", "A1")]);
        assert!(invalid_data_message(&dataset).contains("Duplicate transaction id: T1"));
    }

    #[test]
    fn test_dataset_rejects_unknown_transaction_account() {
        let dataset = two_user_dataset(vec![payment("T1", "U1", "A9")]);
        assert!(invalid_data_message(&dataset).contains("unknown account A9"));
    }

    #[test]
    fn test_dataset_rejects_account_without_user() {
        let mut dataset = two_user_dataset(vec![]);
        dataset.users.pop();
        assert!(invalid_data_message(&dataset).contains("unknown user U2"));
    }

    #[test]
    fn test_dataset_rejects_transaction_owner_mismatch() {
        let dataset = two_user_dataset(vec![payment("T1", "U2", "A1")]);
        assert!(invalid_data_message(&dataset).contains("belongs to U1"));
    }

    #[test]
    fn test_dataset_rejects_duplicate_accounts() {
        let dataset = InputDataset {
            users: vec![UserProfile::new("U1")],
            accounts: vec![credit(Some(dec!(10))), credit(Some(dec!(20)))],
            transactions: vec![],
        };
        assert!(dataset.validate().is_err());
    }
}
