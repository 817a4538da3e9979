//! Persona classification
//!
//! Assigns exactly one persona per user per evaluation date from a
//! [`MetricSnapshot`]. Rules run in priority order and the first match wins:
//!
//! 1. **Debt Fighter** - high utilization, interest charges, or past-due
//! 2. **Gig Worker** - volatile income or long pay gaps
//! 3. **Auto-Payer** - many recurring merchants carrying a real share of spend
//! 4. **Wealth Compounder** - high earner, long runway, low savings rate
//! 5. **Optimizer** - low utilization and a positive savings rate
//!
//! Anything else falls through to `Unclassified`. The decision trace records
//! every rule so operators can see why a persona was chosen.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use spendsense_core::classifier::PersonaClassifier;
//!
//! let classifier = PersonaClassifier::new(&config.thresholds);
//! let assignment = classifier.classify(&snapshot);
//! println!("{} via {}", assignment.persona, assignment.matched_rule);
//! ```

pub mod rules;

pub use rules::{
    builtin_rules, Combinator, Comparator, Condition, ConditionEvaluation, ConditionOutcome,
    PersonaRule, RuleEvaluation, RuleOutcome, Signal, SignalValue, ThresholdRule,
    UndefinedPolicy,
};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::config::PersonaThresholds;
use crate::error::{Error, Result};
use crate::models::{MetricSnapshot, Persona};

/// Trace name and priority slot of the terminal fallback
pub const FALLBACK_RULE: &str = "unclassified_fallback";
pub const FALLBACK_PRIORITY: u8 = u8::MAX;

/// Operator override of a rule-derived persona
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaOverride {
    pub persona: Persona,
    pub actor: String,
    pub reason: Option<String>,
    pub overridden_at: DateTime<Utc>,
}

/// Classification result for one user on one evaluation date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaAssignment {
    pub user_id: String,
    pub evaluation_date: NaiveDate,
    /// Rule-derived persona, kept even when overridden
    pub persona: Persona,
    pub matched_rule: String,
    pub trace: Vec<RuleEvaluation>,
    #[serde(rename = "override", default, skip_serializing_if = "Option::is_none")]
    pub override_: Option<PersonaOverride>,
}

impl PersonaAssignment {
    /// Persona shown to the user: the override when present
    pub fn effective_persona(&self) -> Persona {
        self.override_
            .as_ref()
            .map(|o| o.persona)
            .unwrap_or(self.persona)
    }

    /// SHA-256 of the serialized trace
    pub fn trace_fingerprint(&self) -> Result<String> {
        let bytes = serde_json::to_vec(&self.trace)?;
        Ok(hex::encode(Sha256::digest(&bytes)))
    }
}

/// Priority-ordered rule list with an implicit terminal fallback
pub struct PersonaClassifier {
    rules: Vec<Box<dyn PersonaRule>>,
}

impl PersonaClassifier {
    /// Classifier with the built-in rules
    pub fn new(thresholds: &PersonaThresholds) -> Self {
        let rules = builtin_rules(thresholds)
            .into_iter()
            .map(|r| Box::new(r) as Box<dyn PersonaRule>)
            .collect();
        Self { rules }
    }

    /// Classifier that only knows the fallback
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Add a rule in its priority slot
    pub fn register(&mut self, rule: Box<dyn PersonaRule>) -> Result<()> {
        let priority = rule.priority();
        if priority == FALLBACK_PRIORITY {
            return Err(Error::Config(format!(
                "Priority {} is reserved for the {} rule",
                priority, FALLBACK_RULE
            )));
        }
        if let Some(existing) = self.rules.iter().find(|r| r.priority() == priority) {
            return Err(Error::Config(format!(
                "Rule {} cannot take priority {}: already held by {}",
                rule.name(),
                priority,
                existing.name()
            )));
        }

        let position = self.rules.partition_point(|r| r.priority() < priority);
        self.rules.insert(position, rule);
        Ok(())
    }

    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    /// Classify one snapshot. Pure: the same snapshot always yields the same trace.
    pub fn classify(&self, snapshot: &MetricSnapshot) -> PersonaAssignment {
        let mut trace = Vec::with_capacity(self.rules.len() + 1);
        let mut winner: Option<(Persona, String)> = None;

        for rule in &self.rules {
            if winner.is_some() {
                trace.push(rule.not_reached());
                continue;
            }
            let evaluation = rule.evaluate(snapshot);
            if evaluation.outcome == RuleOutcome::Matched {
                winner = Some((rule.persona(), rule.name().to_string()));
            }
            trace.push(evaluation);
        }

        let fallback_outcome = if winner.is_some() {
            RuleOutcome::NotReached
        } else {
            RuleOutcome::Matched
        };
        trace.push(RuleEvaluation {
            priority: FALLBACK_PRIORITY,
            rule: FALLBACK_RULE.to_string(),
            persona: Persona::Unclassified,
            outcome: fallback_outcome,
            conditions: Vec::new(),
        });

        let (persona, matched_rule) =
            winner.unwrap_or((Persona::Unclassified, FALLBACK_RULE.to_string()));

        debug!(
            user = snapshot.user_id.as_str(),
            persona = persona.as_str(),
            rule = matched_rule.as_str(),
            "Persona assigned"
        );

        PersonaAssignment {
            user_id: snapshot.user_id.clone(),
            evaluation_date: snapshot.evaluation_date,
            persona,
            matched_rule,
            trace,
            override_: None,
        }
    }
}
