//! Cohort income table
//!
//! Built once per batch before any per-user work and shared read-only by the
//! per-user pipelines. It is the only cross-user dependency of a run.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::config::CohortScope;
use crate::error::{Error, Result};

/// Average monthly incomes of every cohort member
#[derive(Debug, Clone, Serialize)]
pub struct CohortTable {
    scope: CohortScope,
    members: BTreeMap<String, Decimal>,
    /// Ascending, for rank lookups
    sorted: Vec<Decimal>,
}

impl CohortTable {
    /// Build the table, failing when the population is below `min_size`
    pub fn build<I>(scope: CohortScope, incomes: I, min_size: usize) -> Result<Self>
    where
        I: IntoIterator<Item = (String, Decimal)>,
    {
        let members: BTreeMap<String, Decimal> = incomes.into_iter().collect();
        if members.is_empty() || members.len() < min_size {
            return Err(Error::CohortIncomplete {
                required: min_size.max(1),
                available: members.len(),
            });
        }

        let mut sorted: Vec<Decimal> = members.values().copied().collect();
        sorted.sort();

        Ok(Self {
            scope,
            members,
            sorted,
        })
    }

    pub fn scope(&self) -> CohortScope {
        self.scope
    }

    pub fn len(&self) -> usize {
        self.sorted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sorted.is_empty()
    }

    pub fn income_of(&self, user_id: &str) -> Option<Decimal> {
        self.members.get(user_id).copied()
    }

    /// Weak percentile rank: share of members whose income is at or below `income`
    pub fn percentile(&self, income: Decimal) -> f64 {
        if self.sorted.is_empty() {
            return 0.0;
        }
        let at_or_below = self.sorted.partition_point(|x| *x <= income);
        at_or_below as f64 / self.sorted.len() as f64
    }
}
