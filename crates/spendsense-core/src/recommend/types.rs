//! Recommendation types

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::guardrail::GuardrailVerdict;
use crate::models::Persona;

/// Text produced by a template before it becomes a [`Recommendation`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Draft {
    pub headline: String,
    /// "Because ..." sentence quoting at least one figure
    pub rationale: String,
    /// Reference to the educational content or tool behind the suggestion
    pub action: String,
}

/// Guardrail state of a recommendation. Moves out of `Pending` exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GuardrailStatus {
    Pending,
    Passed,
    Rejected { matched_terms: Vec<String> },
}

impl GuardrailStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Passed => "passed",
            Self::Rejected { .. } => "rejected",
        }
    }
}

/// A persona-specific suggestion with its quantified rationale
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    id: String,
    user_id: String,
    evaluation_date: NaiveDate,
    persona: Persona,
    template: String,
    headline: String,
    rationale: String,
    action: String,
    guardrail: GuardrailStatus,
}

impl Recommendation {
    pub fn new(
        user_id: &str,
        evaluation_date: NaiveDate,
        persona: Persona,
        template: &str,
        draft: Draft,
    ) -> Self {
        Self {
            id: recommendation_id(user_id, evaluation_date, persona, template),
            user_id: user_id.to_string(),
            evaluation_date,
            persona,
            template: template.to_string(),
            headline: draft.headline,
            rationale: draft.rationale,
            action: draft.action,
            guardrail: GuardrailStatus::Pending,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn evaluation_date(&self) -> NaiveDate {
        self.evaluation_date
    }

    pub fn persona(&self) -> Persona {
        self.persona
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn headline(&self) -> &str {
        &self.headline
    }

    pub fn rationale(&self) -> &str {
        &self.rationale
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn guardrail(&self) -> &GuardrailStatus {
        &self.guardrail
    }

    /// Record the guardrail verdict. Fails if one was already recorded.
    pub fn record_verdict(&mut self, verdict: &GuardrailVerdict) -> Result<()> {
        if self.guardrail != GuardrailStatus::Pending {
            return Err(Error::VerdictAlreadyRecorded(self.id.clone()));
        }
        self.guardrail = if verdict.passed {
            GuardrailStatus::Passed
        } else {
            GuardrailStatus::Rejected {
                matched_terms: verdict.matched_terms.clone(),
            }
        };
        Ok(())
    }
}

/// First 16 hex chars of SHA-256 over `user|date|persona|template`
pub fn recommendation_id(
    user_id: &str,
    evaluation_date: NaiveDate,
    persona: Persona,
    template: &str,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user_id.as_bytes());
    hasher.update(b"|");
    hasher.update(evaluation_date.to_string().as_bytes());
    hasher.update(b"|");
    hasher.update(persona.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(template.as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::date;

    fn recommendation() -> Recommendation {
        Recommendation::new(
            "U1",
            date(2025, 6, 30),
            Persona::Optimizer,
            "momentum",
            Draft {
                headline: "Keep your momentum going".to_string(),
                rationale: "Because you save 12.0% of your income".to_string(),
                action: "goal_planner".to_string(),
            },
        )
    }

    #[test]
    fn test_id_is_deterministic() {
        let a = recommendation();
        let b = recommendation();
        assert_eq!(a.id(), b.id());
        assert_eq!(a.id().len(), 16);

        let other = recommendation_id("U2", date(2025, 6, 30), Persona::Optimizer, "momentum");
        assert_ne!(a.id(), other);
        let other = recommendation_id("U1", date(2025, 7, 31), Persona::Optimizer, "momentum");
        assert_ne!(a.id(), other);
    }

    #[test]
    fn test_verdict_recorded_once() {
        let mut rec = recommendation();
        assert_eq!(rec.guardrail(), &GuardrailStatus::Pending);

        let rejected = GuardrailVerdict {
            passed: false,
            matched_terms: vec!["lazy".to_string()],
        };
        rec.record_verdict(&rejected).unwrap();
        assert_eq!(
            rec.guardrail(),
            &GuardrailStatus::Rejected {
                matched_terms: vec!["lazy".to_string()]
            }
        );

        let passed = GuardrailVerdict {
            passed: true,
            matched_terms: vec![],
        };
        let err = rec.record_verdict(&passed).unwrap_err();
        assert!(matches!(err, Error::VerdictAlreadyRecorded(_)));
        assert_eq!(rec.guardrail().as_str(), "rejected");
    }
}
