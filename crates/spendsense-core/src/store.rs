//! Output store
//!
//! Holds recompute results keyed by (user, evaluation date) and serves the
//! operator interface: decision trace lookup, the review queue of rejected
//! recommendations, and persona overrides.
//!
//! The store is a plain JSON document. Saves go through a temp file in the
//! same directory and are renamed into place.

use std::collections::BTreeMap;
use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::classifier::{PersonaAssignment, PersonaOverride};
use crate::error::{Error, Result};
use crate::models::{Diagnostic, DiagnosticKind, MetricSnapshot, Persona};
use crate::pipeline::{Pipeline, RecomputeOutput, UserOutcome};
use crate::recommend::{GuardrailStatus, Recommendation};

/// Everything kept for one (user, date)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEvaluation {
    pub snapshot: MetricSnapshot,
    pub assignment: PersonaAssignment,
    pub accepted: Vec<Recommendation>,
    pub rejected: Vec<Recommendation>,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredFailure {
    pub kind: Option<DiagnosticKind>,
    pub error: String,
}

/// A rejected recommendation awaiting operator review
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewItem {
    pub user_id: String,
    pub evaluation_date: NaiveDate,
    pub recommendation_id: String,
    pub template: String,
    pub headline: String,
    pub rationale: String,
    pub matched_terms: Vec<String>,
}

/// Counts from recording one recompute output
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordSummary {
    pub stored: usize,
    pub failed: usize,
    /// Overrides carried over from a previous run of the same (user, date)
    pub overrides_kept: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputStore {
    evaluations: BTreeMap<String, BTreeMap<NaiveDate, StoredEvaluation>>,
    #[serde(default)]
    failures: BTreeMap<String, BTreeMap<NaiveDate, StoredFailure>>,
}

impl OutputStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a store file, or an empty store if the file does not exist yet
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No store file yet, starting empty");
            return Ok(Self::default());
        }
        let file = fs::File::open(path)?;
        let store: Self = serde_json::from_reader(BufReader::new(file))?;
        debug!(
            path = %path.display(),
            users = store.evaluations.len(),
            "Store loaded"
        );
        Ok(store)
    }

    /// Write the store atomically
    pub fn save(&self, path: &Path) -> Result<()> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        let temp = NamedTempFile::new_in(dir)?;
        {
            let mut writer = BufWriter::new(temp.as_file());
            serde_json::to_writer_pretty(&mut writer, self)?;
            writer.flush()?;
        }
        temp.persist(path).map_err(|e| Error::Io(e.error))?;

        info!(path = %path.display(), "Store saved");
        Ok(())
    }

    /// Record a recompute output, overwriting earlier runs of the same
    /// (user, date). Existing overrides are carried over.
    pub fn record(&mut self, output: &RecomputeOutput) -> RecordSummary {
        let date = output.evaluation_date;
        let mut summary = RecordSummary::default();

        for outcome in &output.outcomes {
            match outcome {
                UserOutcome::Completed(report) => {
                    let mut assignment = report.assignment.clone();
                    if assignment.override_.is_none() {
                        assignment.override_ = self
                            .evaluation(&report.user_id, date)
                            .and_then(|e| e.assignment.override_.clone());
                        if assignment.override_.is_some() {
                            warn!(
                                user = report.user_id.as_str(),
                                date = %date,
                                "Override re-attached to a run that did not apply it"
                            );
                        }
                    }
                    if assignment.override_.is_some() {
                        summary.overrides_kept += 1;
                    }

                    self.evaluations
                        .entry(report.user_id.clone())
                        .or_default()
                        .insert(
                            date,
                            StoredEvaluation {
                                snapshot: report.snapshot.clone(),
                                assignment,
                                accepted: report.accepted.clone(),
                                rejected: report.rejected.clone(),
                                diagnostics: report.diagnostics.clone(),
                            },
                        );
                    if let Some(failures) = self.failures.get_mut(&report.user_id) {
                        failures.remove(&date);
                    }
                    summary.stored += 1;
                }
                UserOutcome::Failed {
                    user_id,
                    kind,
                    error,
                } => {
                    let stale = self
                        .evaluations
                        .get_mut(user_id)
                        .and_then(|dates| dates.remove(&date));
                    if stale.is_some() {
                        warn!(user = user_id.as_str(), date = %date, "Replacing stored evaluation with failure");
                    }
                    self.failures.entry(user_id.clone()).or_default().insert(
                        date,
                        StoredFailure {
                            kind: *kind,
                            error: error.clone(),
                        },
                    );
                    summary.failed += 1;
                }
            }
        }

        summary
    }

    /// Overrides recorded for `date`, keyed by user, for the next recompute
    pub fn overrides_on(&self, date: NaiveDate) -> BTreeMap<String, PersonaOverride> {
        self.evaluations
            .iter()
            .filter_map(|(user_id, dates)| {
                let override_ = dates.get(&date)?.assignment.override_.clone()?;
                Some((user_id.clone(), override_))
            })
            .collect()
    }

    pub fn evaluation(&self, user_id: &str, date: NaiveDate) -> Option<&StoredEvaluation> {
        self.evaluations.get(user_id)?.get(&date)
    }

    /// Most recent evaluation for a user
    pub fn latest(&self, user_id: &str) -> Option<(NaiveDate, &StoredEvaluation)> {
        self.evaluations
            .get(user_id)?
            .iter()
            .next_back()
            .map(|(date, evaluation)| (*date, evaluation))
    }

    /// Evaluation for `date`, or the latest when no date is given
    pub fn find(&self, user_id: &str, date: Option<NaiveDate>) -> Result<(NaiveDate, &StoredEvaluation)> {
        let found = match date {
            Some(date) => self.evaluation(user_id, date).map(|e| (date, e)),
            None => self.latest(user_id),
        };
        found.ok_or_else(|| match date {
            Some(date) => Error::NotFound(format!("Evaluation for {} on {}", user_id, date)),
            None => Error::NotFound(format!("Evaluation for {}", user_id)),
        })
    }

    /// Persona assignment with its decision trace
    pub fn decision_trace(&self, user_id: &str, date: NaiveDate) -> Result<&PersonaAssignment> {
        self.find(user_id, Some(date)).map(|(_, e)| &e.assignment)
    }

    /// Recommendations that passed the guardrail
    pub fn accepted_recommendations(&self, user_id: &str, date: NaiveDate) -> Result<&[Recommendation]> {
        self.find(user_id, Some(date)).map(|(_, e)| e.accepted.as_slice())
    }

    /// Rejected recommendations across all users, by user then date
    pub fn review_queue(&self) -> Vec<ReviewItem> {
        let mut items = Vec::new();
        for (user_id, dates) in &self.evaluations {
            for (date, evaluation) in dates {
                for rec in &evaluation.rejected {
                    let matched_terms = match rec.guardrail() {
                        GuardrailStatus::Rejected { matched_terms } => matched_terms.clone(),
                        _ => Vec::new(),
                    };
                    items.push(ReviewItem {
                        user_id: user_id.clone(),
                        evaluation_date: *date,
                        recommendation_id: rec.id().to_string(),
                        template: rec.template().to_string(),
                        headline: rec.headline().to_string(),
                        rationale: rec.rationale().to_string(),
                        matched_terms,
                    });
                }
            }
        }
        items
    }

    /// Record an operator override; the rule-derived persona is kept
    pub fn apply_override(
        &mut self,
        user_id: &str,
        date: NaiveDate,
        persona: Persona,
        actor: &str,
        reason: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<&PersonaAssignment> {
        let actor = actor.trim();
        if actor.is_empty() {
            return Err(Error::InvalidData("Override requires an actor".into()));
        }

        let evaluation = self
            .evaluations
            .get_mut(user_id)
            .and_then(|dates| dates.get_mut(&date))
            .ok_or_else(|| Error::NotFound(format!("Evaluation for {} on {}", user_id, date)))?;

        info!(
            user = user_id,
            date = %date,
            from = evaluation.assignment.persona.as_str(),
            to = persona.as_str(),
            actor,
            "Persona override recorded"
        );

        evaluation.assignment.override_ = Some(PersonaOverride {
            persona,
            actor: actor.to_string(),
            reason: reason.filter(|r| !r.trim().is_empty()),
            overridden_at: at,
        });
        Ok(&evaluation.assignment)
    }

    /// Regenerate the stored recommendations for the effective persona
    ///
    /// Used after an override so the stored recommendations match it. Users
    /// who withheld consent keep an empty list.
    pub fn refresh_recommendations(
        &mut self,
        user_id: &str,
        date: NaiveDate,
        pipeline: &Pipeline,
    ) -> Result<&StoredEvaluation> {
        let evaluation = self
            .evaluations
            .get_mut(user_id)
            .and_then(|dates| dates.get_mut(&date))
            .ok_or_else(|| Error::NotFound(format!("Evaluation for {} on {}", user_id, date)))?;

        let consent_withheld = evaluation
            .diagnostics
            .iter()
            .any(|d| d.kind == DiagnosticKind::ConsentWithheld);
        if !consent_withheld {
            let (accepted, rejected) =
                pipeline.recommend(&evaluation.assignment, &evaluation.snapshot)?;
            debug!(
                user = user_id,
                persona = evaluation.assignment.effective_persona().as_str(),
                accepted = accepted.len(),
                rejected = rejected.len(),
                "Recommendations refreshed"
            );
            evaluation.accepted = accepted;
            evaluation.rejected = rejected;
        }
        Ok(evaluation)
    }

    /// Failed (user, date) pairs
    pub fn failures(&self) -> impl Iterator<Item = (&str, NaiveDate, &StoredFailure)> {
        self.failures.iter().flat_map(|(user_id, dates)| {
            dates
                .iter()
                .map(move |(date, failure)| (user_id.as_str(), *date, failure))
        })
    }

    pub fn user_ids(&self) -> impl Iterator<Item = &str> {
        self.evaluations.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.evaluations.is_empty() && self.failures.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::guardrail::{GuardrailPolicy, MatchMode, ToneGuardrail};
    use crate::models::{InputDataset, UserProfile};
    use crate::pipeline::{Pipeline, UserSelection};
    use crate::test_utils::*;
    use rust_decimal_macros::dec;

    fn eval_date() -> NaiveDate {
        date(2025, 6, 30)
    }

    /// Idle cash with no income: Unclassified with one idle-cash tip
    fn dataset() -> InputDataset {
        let transactions = (1..=6)
            .map(|m| spend("U1", date(2025, m, 10), dec!(5000), "Rent"))
            .collect();
        InputDataset {
            users: vec![UserProfile::new("U1")],
            accounts: vec![checking("U1", dec!(27000)), savings("U1", dec!(18000))],
            transactions,
        }
    }

    fn pipeline(guardrail_terms: &[&str]) -> Pipeline {
        let guardrail =
            ToneGuardrail::new(GuardrailPolicy::new(guardrail_terms, MatchMode::Word)).unwrap();
        Pipeline::new(PipelineConfig::default())
            .unwrap()
            .with_guardrail(guardrail)
    }

    fn run(guardrail_terms: &[&str]) -> RecomputeOutput {
        pipeline(guardrail_terms)
            .recompute(&dataset(), eval_date(), &UserSelection::All)
            .unwrap()
    }

    fn override_to_optimizer(store: &mut OutputStore) {
        store
            .apply_override("U1", eval_date(), Persona::Optimizer, "ops", None, Utc::now())
            .unwrap();
    }

    #[test]
    fn test_record_and_lookup() {
        let mut store = OutputStore::new();
        let summary = store.record(&run(&["lazy"]));
        assert_eq!(summary.stored, 1);

        let trace = store.decision_trace("U1", eval_date()).unwrap();
        assert_eq!(trace.persona, Persona::Unclassified);

        let accepted = store.accepted_recommendations("U1", eval_date()).unwrap();
        assert_eq!(accepted.len(), 1);
        assert!(accepted[0].rationale().contains("$30,000"));

        let (date, _) = store.latest("U1").unwrap();
        assert_eq!(date, eval_date());
        assert!(store.decision_trace("U2", eval_date()).is_err());
    }

    #[test]
    fn test_review_queue() {
        let mut store = OutputStore::new();
        store.record(&run(&["idle"]));

        let queue = store.review_queue();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].user_id, "U1");
        assert_eq!(queue[0].template, "idle_cash");
        assert_eq!(queue[0].matched_terms, vec!["idle"]);
        assert!(store
            .accepted_recommendations("U1", eval_date())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_override_survives_rerun() {
        let mut store = OutputStore::new();
        store.record(&run(&["lazy"]));

        let assignment = store
            .apply_override(
                "U1",
                eval_date(),
                Persona::Optimizer,
                "ops@example.com",
                Some("Income arrives from an unlinked account".to_string()),
                Utc::now(),
            )
            .unwrap();
        assert_eq!(assignment.persona, Persona::Unclassified);
        assert_eq!(assignment.effective_persona(), Persona::Optimizer);

        let summary = store.record(&run(&["lazy"]));
        assert_eq!(summary.overrides_kept, 1);
        let trace = store.decision_trace("U1", eval_date()).unwrap();
        assert_eq!(trace.effective_persona(), Persona::Optimizer);
        assert_eq!(trace.override_.as_ref().unwrap().actor, "ops@example.com");
    }

    #[test]
    fn test_stored_override_drives_generation_on_rerun() {
        let mut store = OutputStore::new();
        store.record(&run(&["lazy"]));
        override_to_optimizer(&mut store);

        let overrides = store.overrides_on(eval_date());
        assert_eq!(overrides.len(), 1);
        assert!(store.overrides_on(date(2025, 5, 31)).is_empty());

        let output = pipeline(&["lazy"])
            .recompute_with_overrides(&dataset(), eval_date(), &UserSelection::All, &overrides)
            .unwrap();
        let report = output.completed().next().unwrap();
        assert_eq!(report.assignment.persona, Persona::Unclassified);
        assert_eq!(report.assignment.effective_persona(), Persona::Optimizer);
        assert!(!report.accepted.is_empty());
        assert!(report
            .accepted
            .iter()
            .all(|r| r.persona() == Persona::Optimizer));

        store.record(&output);
        let accepted = store.accepted_recommendations("U1", eval_date()).unwrap();
        assert!(accepted.iter().all(|r| r.persona() == Persona::Optimizer));
    }

    #[test]
    fn test_refresh_recommendations_follows_override() {
        let mut store = OutputStore::new();
        store.record(&run(&["lazy"]));
        let before: Vec<String> = store
            .accepted_recommendations("U1", eval_date())
            .unwrap()
            .iter()
            .map(|r| r.id().to_string())
            .collect();

        override_to_optimizer(&mut store);
        let evaluation = store
            .refresh_recommendations("U1", eval_date(), &pipeline(&["lazy"]))
            .unwrap();
        assert!(!evaluation.accepted.is_empty());
        assert!(evaluation
            .accepted
            .iter()
            .all(|r| r.persona() == Persona::Optimizer && !before.contains(&r.id().to_string())));

        let err = store
            .refresh_recommendations("U1", date(2025, 1, 31), &pipeline(&["lazy"]))
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_override_requires_actor_and_evaluation() {
        let mut store = OutputStore::new();
        store.record(&run(&["lazy"]));

        let err = store
            .apply_override("U1", eval_date(), Persona::Optimizer, "  ", None, Utc::now())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidData(_)));

        let err = store
            .apply_override("U1", date(2025, 1, 31), Persona::Optimizer, "ops", None, Utc::now())
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_rerun_overwrites() {
        let mut store = OutputStore::new();
        store.record(&run(&["idle"]));
        assert_eq!(store.review_queue().len(), 1);

        store.record(&run(&["lazy"]));
        assert!(store.review_queue().is_empty());
        assert_eq!(
            store.accepted_recommendations("U1", eval_date()).unwrap().len(),
            1
        );
    }

    #[test]
    fn test_failure_replaces_evaluation() {
        let mut store = OutputStore::new();
        store.record(&run(&["lazy"]));

        let failed = RecomputeOutput {
            evaluation_date: eval_date(),
            cohort_size: Some(1),
            outcomes: vec![UserOutcome::Failed {
                user_id: "U1".to_string(),
                kind: Some(DiagnosticKind::InvalidAccountConfiguration),
                error: "credit account has no credit limit".to_string(),
            }],
            diagnostics: vec![],
        };
        let summary = store.record(&failed);
        assert_eq!(summary.failed, 1);
        assert!(store.evaluation("U1", eval_date()).is_none());

        let failures: Vec<_> = store.failures().collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, "U1");
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("spendsense.json");

        let mut store = OutputStore::new();
        store.record(&run(&["idle"]));
        store
            .apply_override("U1", eval_date(), Persona::Optimizer, "ops", None, Utc::now())
            .unwrap();
        store.save(&path).unwrap();

        let loaded = OutputStore::load(&path).unwrap();
        assert_eq!(loaded, store);
        assert_eq!(loaded.review_queue().len(), 1);

        let missing = OutputStore::load(&dir.path().join("missing.json")).unwrap();
        assert!(missing.is_empty());
    }
}
