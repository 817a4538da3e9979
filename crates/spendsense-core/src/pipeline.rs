//! Batch recompute
//!
//! `recompute(date, users)` runs every selected user through
//! metrics → persona → recommendations → guardrail.
//!
//! The cohort income table is built once before fan-out; it is the only state
//! shared between users. Each user then runs independently on a scoped worker
//! thread, and a failure for one user becomes a failed outcome for that user
//! only. Outcomes come back sorted by user id regardless of scheduling.

use std::collections::{BTreeMap, BTreeSet};
use std::thread;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::classifier::{PersonaAssignment, PersonaClassifier, PersonaOverride};
use crate::config::{CohortScope, PipelineConfig};
use crate::error::{Error, Result};
use crate::guardrail::ToneGuardrail;
use crate::metrics::{CohortTable, MetricCalculator};
use crate::models::{Diagnostic, DiagnosticKind, InputDataset, MetricSnapshot};
use crate::recommend::{Recommendation, RecommendationGenerator};

/// Which users a recompute covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserSelection {
    All,
    Only(Vec<String>),
}

/// Everything produced for one user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserReport {
    pub user_id: String,
    pub consent_granted: bool,
    pub snapshot: MetricSnapshot,
    pub assignment: PersonaAssignment,
    /// Passed the guardrail, in output order
    pub accepted: Vec<Recommendation>,
    /// Held back for operator review
    pub rejected: Vec<Recommendation>,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UserOutcome {
    Completed(Box<UserReport>),
    Failed {
        user_id: String,
        kind: Option<DiagnosticKind>,
        error: String,
    },
}

impl UserOutcome {
    pub fn user_id(&self) -> &str {
        match self {
            Self::Completed(report) => &report.user_id,
            Self::Failed { user_id, .. } => user_id,
        }
    }

    pub fn report(&self) -> Option<&UserReport> {
        match self {
            Self::Completed(report) => Some(report),
            Self::Failed { .. } => None,
        }
    }
}

/// Result of one recompute run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecomputeOutput {
    pub evaluation_date: NaiveDate,
    /// None when the cohort was incomplete
    pub cohort_size: Option<usize>,
    /// Sorted by user id
    pub outcomes: Vec<UserOutcome>,
    /// Run-level diagnostics plus one per failed user
    pub diagnostics: Vec<Diagnostic>,
}

impl RecomputeOutput {
    pub fn outcome(&self, user_id: &str) -> Option<&UserOutcome> {
        self.outcomes.iter().find(|o| o.user_id() == user_id)
    }

    pub fn completed(&self) -> impl Iterator<Item = &UserReport> {
        self.outcomes.iter().filter_map(|o| o.report())
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, UserOutcome::Failed { .. }))
            .count()
    }
}

/// Wires the four components together for batch runs
pub struct Pipeline {
    config: PipelineConfig,
    calculator: MetricCalculator,
    classifier: PersonaClassifier,
    generator: RecommendationGenerator,
    guardrail: ToneGuardrail,
}

impl Pipeline {
    /// Build all components from configuration
    pub fn new(config: PipelineConfig) -> Result<Self> {
        let guardrail = ToneGuardrail::from_source(&config.guardrail)?;
        Ok(Self {
            calculator: MetricCalculator::new(&config),
            classifier: PersonaClassifier::new(&config.thresholds),
            generator: RecommendationGenerator::new(),
            guardrail,
            config,
        })
    }

    /// Replace the configured guardrail
    pub fn with_guardrail(mut self, guardrail: ToneGuardrail) -> Self {
        self.guardrail = guardrail;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn guardrail(&self) -> &ToneGuardrail {
        &self.guardrail
    }

    /// Recompute every selected user for `evaluation_date`
    pub fn recompute(
        &self,
        dataset: &InputDataset,
        evaluation_date: NaiveDate,
        selection: &UserSelection,
    ) -> Result<RecomputeOutput> {
        self.recompute_with_overrides(dataset, evaluation_date, selection, &BTreeMap::new())
    }

    /// Recompute with operator overrides keyed by user id
    ///
    /// An overridden user keeps the rule-derived persona and trace, but
    /// recommendations follow the override.
    pub fn recompute_with_overrides(
        &self,
        dataset: &InputDataset,
        evaluation_date: NaiveDate,
        selection: &UserSelection,
        overrides: &BTreeMap<String, PersonaOverride>,
    ) -> Result<RecomputeOutput> {
        dataset.validate()?;
        let users = resolve_users(dataset, selection)?;
        let mut diagnostics = Vec::new();

        let cohort = match self.build_cohort(dataset, evaluation_date, &users) {
            Ok(table) => Some(table),
            Err(Error::CohortIncomplete {
                required,
                available,
            }) => {
                warn!(required, available, "Cohort incomplete; percentiles undefined");
                diagnostics.push(Diagnostic::run(
                    DiagnosticKind::CohortIncomplete,
                    "cohort",
                    format!(
                        "{} of {} required cohort members available",
                        available, required
                    ),
                ));
                None
            }
            Err(e) => return Err(e),
        };

        if let Some(diagnostic) = self.guardrail.policy_diagnostic() {
            diagnostics.push(diagnostic);
        }

        let mut outcomes =
            self.fan_out(dataset, evaluation_date, &users, cohort.as_ref(), overrides);
        outcomes.sort_by(|a, b| a.user_id().cmp(b.user_id()));

        for outcome in &outcomes {
            if let UserOutcome::Failed {
                user_id,
                kind,
                error,
            } = outcome
            {
                diagnostics.push(Diagnostic::for_user(
                    kind.unwrap_or(DiagnosticKind::InsufficientData),
                    user_id.clone(),
                    "pipeline",
                    error.clone(),
                ));
            }
        }

        let output = RecomputeOutput {
            evaluation_date,
            cohort_size: cohort.as_ref().map(|c| c.len()),
            outcomes,
            diagnostics,
        };

        info!(
            date = %evaluation_date,
            users = output.outcomes.len(),
            failed = output.failed_count(),
            diagnostics = output.diagnostics.len(),
            "Recompute complete"
        );

        Ok(output)
    }

    fn build_cohort(
        &self,
        dataset: &InputDataset,
        evaluation_date: NaiveDate,
        selected: &[String],
    ) -> Result<CohortTable> {
        let members: Vec<&str> = match self.config.cohort.scope {
            CohortScope::AllUsers => dataset.users.iter().map(|u| u.user_id.as_str()).collect(),
            CohortScope::SelectedUsers => selected.iter().map(String::as_str).collect(),
        };

        let mut incomes = Vec::with_capacity(members.len());
        for user_id in members {
            let income = self
                .calculator
                .average_monthly_income(evaluation_date, dataset.transactions_for(user_id))?;
            incomes.push((user_id.to_string(), income));
        }

        let table = CohortTable::build(self.config.cohort.scope, incomes, self.config.cohort.min_size)?;
        debug!(
            scope = table.scope().as_str(),
            members = table.len(),
            "Cohort table built"
        );
        Ok(table)
    }

    fn fan_out(
        &self,
        dataset: &InputDataset,
        evaluation_date: NaiveDate,
        users: &[String],
        cohort: Option<&CohortTable>,
        overrides: &BTreeMap<String, PersonaOverride>,
    ) -> Vec<UserOutcome> {
        if users.is_empty() {
            return Vec::new();
        }

        let workers = self.config.worker_count().clamp(1, users.len());
        let chunk_size = users.len().div_ceil(workers);

        thread::scope(|scope| {
            let handles: Vec<_> = users
                .chunks(chunk_size)
                .map(|chunk| {
                    scope.spawn(move || {
                        chunk
                            .iter()
                            .map(|user_id| {
                                let override_ = overrides.get(user_id);
                                self.run_user(dataset, evaluation_date, user_id, cohort, override_)
                            })
                            .collect::<Vec<_>>()
                    })
                })
                .collect();

            handles
                .into_iter()
                .flat_map(|handle| match handle.join() {
                    Ok(outcomes) => outcomes,
                    Err(panic) => std::panic::resume_unwind(panic),
                })
                .collect()
        })
    }

    fn run_user(
        &self,
        dataset: &InputDataset,
        evaluation_date: NaiveDate,
        user_id: &str,
        cohort: Option<&CohortTable>,
        override_: Option<&PersonaOverride>,
    ) -> UserOutcome {
        match self.evaluate_user(dataset, evaluation_date, user_id, cohort, override_) {
            Ok(report) => UserOutcome::Completed(Box::new(report)),
            Err(e) => {
                warn!(user = user_id, error = %e, "User evaluation failed");
                UserOutcome::Failed {
                    user_id: user_id.to_string(),
                    kind: e.diagnostic_kind(),
                    error: e.to_string(),
                }
            }
        }
    }

    /// Run one user through the full chain
    pub fn evaluate_user(
        &self,
        dataset: &InputDataset,
        evaluation_date: NaiveDate,
        user_id: &str,
        cohort: Option<&CohortTable>,
        override_: Option<&PersonaOverride>,
    ) -> Result<UserReport> {
        let snapshot = self.calculator.calculate(
            user_id,
            evaluation_date,
            dataset.accounts_for(user_id),
            dataset.transactions_for(user_id),
            cohort,
        )?;
        let mut assignment = self.classifier.classify(&snapshot);
        assignment.override_ = override_.cloned();
        let mut diagnostics = snapshot.diagnostics.clone();

        let consent_granted = dataset.user(user_id).map_or(true, |u| u.consent_granted);
        let (accepted, rejected) = if consent_granted {
            self.recommend(&assignment, &snapshot)?
        } else {
            diagnostics.push(Diagnostic::for_user(
                DiagnosticKind::ConsentWithheld,
                user_id,
                "recommendations",
                "User has not granted consent; recommendations withheld",
            ));
            (Vec::new(), Vec::new())
        };

        Ok(UserReport {
            user_id: user_id.to_string(),
            consent_granted,
            snapshot,
            assignment,
            accepted,
            rejected,
            diagnostics,
        })
    }

    /// Generate for the effective persona and split by guardrail verdict
    pub fn recommend(
        &self,
        assignment: &PersonaAssignment,
        snapshot: &MetricSnapshot,
    ) -> Result<(Vec<Recommendation>, Vec<Recommendation>)> {
        let candidates = self.generator.generate(assignment, snapshot)?;
        self.guardrail.vet(candidates)
    }
}

/// Selected user ids, sorted and de-duplicated
fn resolve_users(dataset: &InputDataset, selection: &UserSelection) -> Result<Vec<String>> {
    let users: BTreeSet<String> = match selection {
        UserSelection::All => dataset.users.iter().map(|u| u.user_id.clone()).collect(),
        UserSelection::Only(ids) => {
            for id in ids {
                if dataset.user(id).is_none() {
                    return Err(Error::NotFound(format!("User {}", id)));
                }
            }
            ids.iter().cloned().collect()
        }
    };
    Ok(users.into_iter().collect())
}
