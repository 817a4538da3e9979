//! Error types for SpendSense

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid account configuration for {account_id}: {reason}")]
    InvalidAccountConfiguration { account_id: String, reason: String },

    #[error("Cohort incomplete: {available} of {required} required members available")]
    CohortIncomplete { required: usize, available: usize },

    #[error("Template {template} produced a rationale without a figure")]
    RationaleMissingFigure { template: String },

    #[error("Guardrail verdict already recorded for recommendation {0}")]
    VerdictAlreadyRecorded(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),
}

impl Error {
    /// Diagnostic kind this error maps to when it is isolated to one user
    pub fn diagnostic_kind(&self) -> Option<crate::models::DiagnosticKind> {
        use crate::models::DiagnosticKind;

        match self {
            Error::InvalidAccountConfiguration { .. } => {
                Some(DiagnosticKind::InvalidAccountConfiguration)
            }
            Error::CohortIncomplete { .. } => Some(DiagnosticKind::CohortIncomplete),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DiagnosticKind;

    #[test]
    fn test_fatal_errors_map_to_diagnostics() {
        let err = Error::InvalidAccountConfiguration {
            account_id: "A1".to_string(),
            reason: "credit account has no credit limit".to_string(),
        };
        assert_eq!(err.diagnostic_kind(), Some(DiagnosticKind::InvalidAccountConfiguration));

        let err = Error::CohortIncomplete {
            required: 5,
            available: 2,
        };
        assert_eq!(err.diagnostic_kind(), Some(DiagnosticKind::CohortIncomplete));
        assert_eq!(Error::NotFound("U1".to_string()).diagnostic_kind(), None);
    }
}
