//! Recommendation generation
//!
//! A registry of persona templates. Each template is a pure function of the
//! [`MetricSnapshot`] and renders a headline, a "Because ..." rationale that
//! quotes the user's own numbers, and an action reference.
//!
//! ## Templates
//!
//! - **Debt Fighter** - utilization paydown, interest cost, past-due accounts
//! - **Gig Worker** - income-smoothing buffer
//! - **Auto-Payer** - recurring-charge audit, largest recurring merchant
//! - **Wealth Compounder** - idle cash, savings automation
//! - **Optimizer** - momentum, idle cash
//! - **Unclassified** - idle cash, starter emergency fund, data coverage

pub mod format;
pub mod templates;
pub mod types;

pub use templates::builtin_templates;
pub use types::{recommendation_id, Draft, GuardrailStatus, Recommendation};

use tracing::debug;

use crate::classifier::PersonaAssignment;
use crate::error::{Error, Result};
use crate::models::{MetricSnapshot, Persona};

/// A persona-specific recommendation template
pub trait RecommendationTemplate: Send + Sync {
    /// Stable key, part of the recommendation id
    fn key(&self) -> &'static str;

    /// Personas this template applies to
    fn personas(&self) -> &'static [Persona];

    /// Render from the snapshot, or `None` when it does not apply
    fn render(&self, snapshot: &MetricSnapshot) -> Option<Draft>;
}

/// Template registry
pub struct RecommendationGenerator {
    templates: Vec<Box<dyn RecommendationTemplate>>,
}

impl Default for RecommendationGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl RecommendationGenerator {
    /// Generator with the built-in templates
    pub fn new() -> Self {
        Self {
            templates: builtin_templates(),
        }
    }

    pub fn empty() -> Self {
        Self {
            templates: Vec::new(),
        }
    }

    /// Register a template after the existing ones
    pub fn register(&mut self, template: Box<dyn RecommendationTemplate>) -> Result<()> {
        if self.templates.iter().any(|t| t.key() == template.key()) {
            return Err(Error::Config(format!(
                "Recommendation template {} is already registered",
                template.key()
            )));
        }
        self.templates.push(template);
        Ok(())
    }

    /// Template keys for a persona, in output order
    pub fn templates_for(&self, persona: Persona) -> Vec<&'static str> {
        self.templates
            .iter()
            .filter(|t| t.personas().contains(&persona))
            .map(|t| t.key())
            .collect()
    }

    /// Generate recommendations for the assignment's effective persona
    ///
    /// Fails if any rendered rationale carries no figure.
    pub fn generate(
        &self,
        assignment: &PersonaAssignment,
        snapshot: &MetricSnapshot,
    ) -> Result<Vec<Recommendation>> {
        let persona = assignment.effective_persona();
        let mut recommendations = Vec::new();

        for template in self
            .templates
            .iter()
            .filter(|t| t.personas().contains(&persona))
        {
            let Some(draft) = template.render(snapshot) else {
                continue;
            };
            if !draft.rationale.chars().any(|c| c.is_ascii_digit()) {
                return Err(Error::RationaleMissingFigure {
                    template: template.key().to_string(),
                });
            }
            recommendations.push(Recommendation::new(
                &assignment.user_id,
                assignment.evaluation_date,
                persona,
                template.key(),
                draft,
            ));
        }

        debug!(
            user = assignment.user_id.as_str(),
            persona = persona.as_str(),
            count = recommendations.len(),
            "Recommendations generated"
        );

        Ok(recommendations)
    }
}
