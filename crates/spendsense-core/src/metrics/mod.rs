//! Metric calculation
//!
//! Derives per-user financial signals from already-loaded account and
//! transaction records over trailing calendar-month windows:
//!
//! - **Burn rate** and **liquid runway**
//! - **Credit utilization**, interest charges, past-due flag
//! - **Income volatility** and **pay gap** (income window)
//! - **Recurring merchants** and subscription outflow ratio
//! - **Income percentile** (against a cohort table), savings rate, inefficiency score
//!
//! Every calculation is a pure function of its inputs and the caller-supplied
//! evaluation date. Undefined signals stay `None` and leave a diagnostic.

pub mod cohort;
pub mod recurring;

pub use cohort::CohortTable;
pub use recurring::detect_recurring;

use chrono::{Months, NaiveDate};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::debug;

use crate::config::{CategoryConfig, PipelineConfig, RecurringConfig, WindowConfig};
use crate::error::{Error, Result};
use crate::models::{
    Account, AccountType, Diagnostic, DiagnosticKind, MetricSnapshot, Runway, Transaction,
};

/// Half-open date range `(start, end]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Window {
    start: NaiveDate,
    end: NaiveDate,
}

impl Window {
    fn trailing(end: NaiveDate, months: u32) -> Result<Self> {
        let start = end.checked_sub_months(Months::new(months)).ok_or_else(|| {
            Error::InvalidData(format!("Window of {} months before {} is out of range", months, end))
        })?;
        Ok(Self { start, end })
    }

    fn contains(&self, date: NaiveDate) -> bool {
        date > self.start && date <= self.end
    }
}

/// Derives [`MetricSnapshot`]s from in-memory records
#[derive(Debug, Clone)]
pub struct MetricCalculator {
    windows: WindowConfig,
    recurring: RecurringConfig,
    categories: CategoryConfig,
    idle_cash_burn_multiple: Decimal,
}

impl Default for MetricCalculator {
    fn default() -> Self {
        Self::new(&PipelineConfig::default())
    }
}

impl MetricCalculator {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            windows: config.windows.clone(),
            recurring: config.recurring.clone(),
            categories: config.categories.clone(),
            idle_cash_burn_multiple: config.idle_cash_burn_multiple,
        }
    }

    fn is_income(&self, tx: &Transaction) -> bool {
        !tx.transfer && tx.is_inflow() && tx.in_category(&self.categories.income)
    }

    /// Average monthly income over the transaction window
    ///
    /// Used both for the snapshot and for building the cohort table, so the
    /// two always agree.
    pub fn average_monthly_income<'a>(
        &self,
        evaluation_date: NaiveDate,
        transactions: impl IntoIterator<Item = &'a Transaction>,
    ) -> Result<Decimal> {
        let window = Window::trailing(evaluation_date, self.windows.transaction_months)?;
        let total: Decimal = transactions
            .into_iter()
            .filter(|t| window.contains(t.posted) && self.is_income(t))
            .map(|t| t.amount)
            .sum();
        Ok(total / Decimal::from(self.windows.transaction_months))
    }

    /// Calculate the snapshot for one user
    ///
    /// Fails only with `InvalidAccountConfiguration`; every other gap in the
    /// data becomes an undefined signal.
    pub fn calculate<'a>(
        &self,
        user_id: &str,
        evaluation_date: NaiveDate,
        accounts: impl IntoIterator<Item = &'a Account>,
        transactions: impl IntoIterator<Item = &'a Transaction>,
        cohort: Option<&CohortTable>,
    ) -> Result<MetricSnapshot> {
        let accounts: Vec<&Account> = accounts.into_iter().collect();
        for account in &accounts {
            account.validate()?;
        }

        let months = self.windows.transaction_months;
        let window = Window::trailing(evaluation_date, months)?;
        let income_window = Window::trailing(evaluation_date, self.windows.income_months)?;

        let mut snapshot = MetricSnapshot::new(user_id, evaluation_date);
        snapshot.window_months = months;
        snapshot.income_window_months = self.windows.income_months;

        let transactions: Vec<&Transaction> = transactions.into_iter().collect();
        let in_window: Vec<&Transaction> = transactions
            .iter()
            .copied()
            .filter(|t| !t.transfer && window.contains(t.posted))
            .collect();
        let outflows: Vec<&Transaction> =
            in_window.iter().copied().filter(|t| t.is_outflow()).collect();

        snapshot.transaction_count = in_window.len();
        snapshot.monthly_outflows = monthly_outflows(evaluation_date, months, &outflows)?;
        snapshot.total_outflow = outflows.iter().map(|t| -t.amount).sum();
        snapshot.total_income = in_window
            .iter()
            .filter(|t| self.is_income(t))
            .map(|t| t.amount)
            .sum();
        snapshot.average_monthly_income = snapshot.total_income / Decimal::from(months);

        self.cash_signals(&mut snapshot, &accounts);
        self.credit_signals(&mut snapshot, &accounts, &outflows);
        self.income_signals(&mut snapshot, &transactions, income_window);
        self.recurring_signals(&mut snapshot, &outflows);
        self.relative_signals(&mut snapshot, cohort);

        debug!(
            user = user_id,
            transactions = snapshot.transaction_count,
            undefined = snapshot.diagnostics.len(),
            "Metric snapshot calculated"
        );

        Ok(snapshot)
    }

    /// Burn rate, runway, idle cash
    fn cash_signals(&self, snapshot: &mut MetricSnapshot, accounts: &[&Account]) {
        snapshot.liquid_balance = accounts
            .iter()
            .filter(|a| a.account_type.is_liquid())
            .map(|a| a.balance)
            .sum();

        if snapshot.transaction_count == 0 {
            let message = format!(
                "No transactions in the trailing {} months",
                snapshot.window_months
            );
            for signal in ["burn_rate", "liquid_runway", "inefficiency_score"] {
                push_undefined(snapshot, DiagnosticKind::InsufficientData, signal, &message);
            }
            return;
        }

        // Empty months stay in the denominator
        let burn = snapshot.monthly_outflows.iter().copied().sum::<Decimal>()
            / Decimal::from(snapshot.window_months);
        snapshot.burn_rate = Some(burn);

        snapshot.liquid_runway = if burn.is_zero() {
            Some(Runway::Unbounded)
        } else {
            ratio(snapshot.liquid_balance, burn).map(Runway::Months)
        };

        let floor = burn * self.idle_cash_burn_multiple;
        snapshot.idle_cash_floor = Some(floor);
        snapshot.inefficiency_score = Some((snapshot.liquid_balance - floor).max(Decimal::ZERO));
    }

    /// Utilization, interest, past-due
    fn credit_signals(
        &self,
        snapshot: &mut MetricSnapshot,
        accounts: &[&Account],
        outflows: &[&Transaction],
    ) {
        let credit: Vec<&&Account> = accounts
            .iter()
            .filter(|a| a.account_type == AccountType::Credit)
            .collect();

        if credit.is_empty() {
            push_undefined(
                snapshot,
                DiagnosticKind::InsufficientData,
                "credit_utilization",
                "No credit accounts",
            );
        } else {
            let balance: Decimal = credit.iter().map(|a| a.balance).sum();
            // Limits were validated as present and positive
            let limit: Decimal = credit.iter().filter_map(|a| a.credit_limit).sum();
            snapshot.credit_balance = Some(balance);
            snapshot.credit_limit = Some(limit);
            snapshot.credit_utilization = ratio(balance, limit);
        }

        snapshot.interest_charges = outflows
            .iter()
            .filter(|t| t.in_category(&self.categories.interest))
            .map(|t| -t.amount)
            .sum();
        snapshot.has_interest = snapshot.interest_charges > Decimal::ZERO;

        snapshot.past_due_accounts = accounts.iter().filter(|a| a.past_due).count();
        snapshot.past_due = snapshot.past_due_accounts > 0;
    }

    /// Volatility and pay gap over the income window
    fn income_signals(
        &self,
        snapshot: &mut MetricSnapshot,
        transactions: &[&Transaction],
        income_window: Window,
    ) {
        let mut events: Vec<&Transaction> = transactions
            .iter()
            .copied()
            .filter(|t| income_window.contains(t.posted) && self.is_income(t))
            .collect();
        events.sort_by(|a, b| a.posted.cmp(&b.posted).then_with(|| a.id.cmp(&b.id)));
        snapshot.income_events = events.len();

        if events.len() < 2 {
            let message = format!(
                "{} income events in the trailing {} months, need at least 2",
                events.len(),
                snapshot.income_window_months
            );
            push_undefined(snapshot, DiagnosticKind::InsufficientData, "income_volatility", &message);
            push_undefined(snapshot, DiagnosticKind::InsufficientData, "pay_gap_days", &message);
            return;
        }

        let amounts: Vec<Decimal> = events.iter().map(|t| t.amount).collect();
        snapshot.income_volatility = coefficient_of_variation(&amounts);
        snapshot.pay_gap_days = events
            .windows(2)
            .map(|w| (w[1].posted - w[0].posted).num_days())
            .max();
    }

    fn recurring_signals(&self, snapshot: &mut MetricSnapshot, outflows: &[&Transaction]) {
        let recurring = detect_recurring(outflows, &self.recurring);
        snapshot.recurring_merchant_count = recurring.len();
        snapshot.subscription_outflow = recurring.iter().map(|r| r.total_outflow).sum();
        snapshot.recurring_merchants = recurring;

        if snapshot.total_outflow.is_zero() {
            push_undefined(
                snapshot,
                DiagnosticKind::InsufficientData,
                "subscription_outflow_ratio",
                "No outflow in the window",
            );
        } else {
            snapshot.subscription_outflow_ratio =
                ratio(snapshot.subscription_outflow, snapshot.total_outflow);
        }
    }

    /// Savings rate and cohort percentile
    fn relative_signals(&self, snapshot: &mut MetricSnapshot, cohort: Option<&CohortTable>) {
        if snapshot.total_income.is_zero() {
            push_undefined(
                snapshot,
                DiagnosticKind::InsufficientData,
                "savings_rate",
                "No income in the window",
            );
        } else {
            snapshot.savings_rate = ratio(
                snapshot.total_income - snapshot.total_outflow,
                snapshot.total_income,
            );
        }

        match cohort {
            Some(table) => {
                snapshot.income_percentile = Some(table.percentile(snapshot.average_monthly_income));
            }
            None => push_undefined(
                snapshot,
                DiagnosticKind::CohortIncomplete,
                "income_percentile",
                "Cohort income table unavailable for this run",
            ),
        }
    }
}

/// Non-transfer outflow per trailing month, oldest first
///
/// Bucket edges are `evaluation_date - k months` for k = 0..=months, so the
/// buckets tile the transaction window exactly even when month-end dates clamp.
fn monthly_outflows(
    evaluation_date: NaiveDate,
    months: u32,
    outflows: &[&Transaction],
) -> Result<Vec<Decimal>> {
    let mut edges = Vec::with_capacity(months as usize + 1);
    for offset in (0..=months).rev() {
        let edge = evaluation_date
            .checked_sub_months(Months::new(offset))
            .ok_or_else(|| Error::InvalidData(format!("Month bucket {} out of range", offset)))?;
        edges.push(edge);
    }

    Ok(edges
        .windows(2)
        .map(|pair| {
            let bucket = Window {
                start: pair[0],
                end: pair[1],
            };
            outflows
                .iter()
                .filter(|t| bucket.contains(t.posted))
                .map(|t| -t.amount)
                .sum()
        })
        .collect())
}

/// Population standard deviation over mean
fn coefficient_of_variation(amounts: &[Decimal]) -> Option<f64> {
    if amounts.len() < 2 {
        return None;
    }

    let n = Decimal::from(amounts.len());
    let mean = amounts
        .iter()
        .try_fold(Decimal::ZERO, |acc, a| acc.checked_add(*a))?
        / n;
    if mean.is_zero() {
        return None;
    }

    let mut squares = Decimal::ZERO;
    for amount in amounts {
        let deviation = amount.checked_sub(mean)?;
        squares = squares.checked_add(deviation.checked_mul(deviation)?)?;
    }
    let variance = squares / n;

    Some(variance.to_f64()?.sqrt() / mean.to_f64()?)
}

fn ratio(numerator: Decimal, denominator: Decimal) -> Option<f64> {
    numerator.checked_div(denominator)?.to_f64()
}

fn push_undefined(snapshot: &mut MetricSnapshot, kind: DiagnosticKind, signal: &str, message: &str) {
    let diagnostic = Diagnostic::for_user(kind, snapshot.user_id.clone(), signal, message);
    snapshot.diagnostics.push(diagnostic);
}
