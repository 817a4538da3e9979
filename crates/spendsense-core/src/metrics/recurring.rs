//! Recurring merchant detection
//!
//! A merchant is recurring when it charges at a stable interval:
//! 1. Same merchant name (exact match after trimming)
//! 2. At least `min_occurrences` outflows in the window
//! 3. Every gap between consecutive charges within ±tolerance days of the median gap
//!
//! Amounts are allowed to vary (utility bills, metered services).

use std::collections::BTreeMap;

use rust_decimal::Decimal;

use crate::config::RecurringConfig;
use crate::models::{RecurringMerchant, Transaction};

/// Find recurring merchants among the given outflows
///
/// Results are ordered by merchant name so snapshots compare byte-for-byte.
pub fn detect_recurring(
    outflows: &[&Transaction],
    config: &RecurringConfig,
) -> Vec<RecurringMerchant> {
    let mut by_merchant: BTreeMap<&str, Vec<&Transaction>> = BTreeMap::new();
    for tx in outflows {
        if !tx.is_outflow() || tx.transfer {
            continue;
        }
        let merchant = tx.merchant.trim();
        if merchant.is_empty() {
            continue;
        }
        by_merchant.entry(merchant).or_default().push(tx);
    }

    by_merchant
        .into_iter()
        .filter_map(|(merchant, txs)| detect_pattern(merchant, txs, config))
        .collect()
}

fn detect_pattern(
    merchant: &str,
    mut txs: Vec<&Transaction>,
    config: &RecurringConfig,
) -> Option<RecurringMerchant> {
    if txs.len() < config.min_occurrences {
        return None;
    }

    txs.sort_by(|a, b| a.posted.cmp(&b.posted).then_with(|| a.id.cmp(&b.id)));

    let intervals: Vec<i64> = txs
        .windows(2)
        .map(|w| (w[1].posted - w[0].posted).num_days())
        .collect();

    let median_interval = median(&intervals)?;
    // Same-day repeats are not an interval
    if median_interval < 1.0 {
        return None;
    }

    let tolerance = config.interval_tolerance_days as f64;
    let stable = intervals
        .iter()
        .all(|&interval| (interval as f64 - median_interval).abs() <= tolerance);
    if !stable {
        return None;
    }

    let total_outflow = txs.iter().map(|t| -t.amount).sum::<Decimal>();

    Some(RecurringMerchant {
        merchant: merchant.to_string(),
        occurrences: txs.len(),
        median_interval_days: median_interval,
        total_outflow,
    })
}

/// Calculate median of a slice
fn median(values: &[i64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_unstable();

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) as f64 / 2.0)
    } else {
        Some(sorted[mid] as f64)
    }
}
