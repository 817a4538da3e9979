//! SpendSense Core Library
//!
//! Deterministic persona and recommendation pipeline over per-user financial
//! history:
//! - Metric calculation (burn rate, runway, utilization, income volatility,
//!   recurring charges, idle cash) over trailing windows
//! - Priority-ordered persona classification with a decision trace
//! - Persona-specific recommendations with quantified rationales
//! - Tone guardrail over generated text
//! - Batch recompute with a shared cohort table and per-user isolation
//! - JSON-file output store with review queue and operator overrides
//! - CSV ingestion of the synthetic dataset layout

pub mod classifier;
pub mod config;
pub mod error;
pub mod guardrail;
pub mod ingest;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod recommend;
pub mod store;

/// Record builders for tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use classifier::{PersonaAssignment, PersonaClassifier, PersonaOverride, RuleEvaluation};
pub use config::PipelineConfig;
pub use error::{Error, Result};
pub use guardrail::{GuardrailPolicy, GuardrailVerdict, MatchMode, PolicySource, TermsFile, ToneGuardrail};
pub use ingest::load_dataset;
pub use metrics::{CohortTable, MetricCalculator};
pub use models::{
    Account, AccountType, Diagnostic, DiagnosticKind, InputDataset, MetricSnapshot, Persona,
    Runway, Transaction, UserProfile,
};
pub use pipeline::{Pipeline, RecomputeOutput, UserOutcome, UserReport, UserSelection};
pub use recommend::{GuardrailStatus, Recommendation, RecommendationGenerator};
pub use store::{OutputStore, ReviewItem};
