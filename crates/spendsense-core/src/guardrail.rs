//! Tone guardrail
//!
//! Vets generated recommendation text against a banned-vocabulary policy
//! before it reaches a user. Matching is case-insensitive, either on word
//! boundaries (default) or as plain substrings.
//!
//! Rejected recommendations are kept, with their matched terms, for the
//! operator review queue.

use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::GuardrailConfig;
use crate::error::{Error, Result};
use crate::models::{Diagnostic, DiagnosticKind};
use crate::recommend::Recommendation;

/// How policy terms are matched against text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Term must be delimited by non-word characters or the text edges
    #[default]
    Word,
    Substring,
}

impl MatchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Word => "word",
            Self::Substring => "substring",
        }
    }
}

impl std::str::FromStr for MatchMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "word" => Ok(Self::Word),
            "substring" | "contains" => Ok(Self::Substring),
            _ => Err(format!("Unknown guardrail match mode: {}", s)),
        }
    }
}

/// Ordered, de-duplicated banned-term list plus a match mode
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GuardrailPolicy {
    terms: Vec<String>,
    mode: MatchMode,
}

impl GuardrailPolicy {
    /// Build a policy. Blank terms are dropped; duplicates (ignoring case) keep
    /// the first spelling.
    pub fn new<I, S>(terms: I, mode: MatchMode) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen: Vec<String> = Vec::new();
        let mut ordered = Vec::new();
        for term in terms {
            let term = term.as_ref().trim();
            if term.is_empty() {
                continue;
            }
            let key = term.to_lowercase();
            if seen.contains(&key) {
                continue;
            }
            seen.push(key);
            ordered.push(term.to_string());
        }
        Self {
            terms: ordered,
            mode,
        }
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    pub fn mode(&self) -> MatchMode {
        self.mode
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

/// Anything the guardrail policy can be loaded from
pub trait PolicySource {
    fn load_policy(&self) -> Result<GuardrailPolicy>;
}

impl PolicySource for GuardrailPolicy {
    fn load_policy(&self) -> Result<GuardrailPolicy> {
        Ok(self.clone())
    }
}

/// Configured terms, followed by the terms file when one is set
impl PolicySource for GuardrailConfig {
    fn load_policy(&self) -> Result<GuardrailPolicy> {
        let mut terms = self.terms.clone();
        if let Some(path) = &self.terms_file {
            terms.extend(read_terms_file(path)?);
        }
        Ok(GuardrailPolicy::new(terms, self.mode))
    }
}

impl<S: AsRef<str>> PolicySource for [S] {
    fn load_policy(&self) -> Result<GuardrailPolicy> {
        Ok(GuardrailPolicy::new(self, MatchMode::default()))
    }
}

impl<S: AsRef<str>> PolicySource for Vec<S> {
    fn load_policy(&self) -> Result<GuardrailPolicy> {
        self.as_slice().load_policy()
    }
}

/// Newline-delimited terms file; blank lines and `#` comments are ignored
#[derive(Debug, Clone)]
pub struct TermsFile {
    pub path: PathBuf,
    pub mode: MatchMode,
}

impl TermsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            mode: MatchMode::default(),
        }
    }
}

impl PolicySource for TermsFile {
    fn load_policy(&self) -> Result<GuardrailPolicy> {
        Ok(GuardrailPolicy::new(read_terms_file(&self.path)?, self.mode))
    }
}

fn read_terms_file(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path).map_err(|e| {
        Error::Config(format!(
            "Failed to read guardrail terms {}: {}",
            path.display(),
            e
        ))
    })?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(String::from)
        .collect())
}

/// Result of checking one piece of text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardrailVerdict {
    pub passed: bool,
    /// In policy order
    pub matched_terms: Vec<String>,
}

/// Compiled guardrail
#[derive(Debug, Clone)]
pub struct ToneGuardrail {
    policy: GuardrailPolicy,
    patterns: Vec<Regex>,
}

impl ToneGuardrail {
    pub fn new(policy: GuardrailPolicy) -> Result<Self> {
        if policy.is_empty() {
            warn!("Guardrail policy has no banned terms; all text will pass");
        }

        let patterns = policy
            .terms
            .iter()
            .map(|term| {
                let escaped = regex::escape(term);
                let pattern = match policy.mode {
                    MatchMode::Word => format!(r"(?i)(?:^|[^\w]){}(?:[^\w]|$)", escaped),
                    MatchMode::Substring => format!("(?i){}", escaped),
                };
                Regex::new(&pattern)
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Self { policy, patterns })
    }

    pub fn from_source<P: PolicySource + ?Sized>(source: &P) -> Result<Self> {
        Self::new(source.load_policy()?)
    }

    pub fn policy(&self) -> &GuardrailPolicy {
        &self.policy
    }

    pub fn is_policy_missing(&self) -> bool {
        self.policy.is_empty()
    }

    /// Run-level diagnostic when the policy is empty
    pub fn policy_diagnostic(&self) -> Option<Diagnostic> {
        self.is_policy_missing().then(|| {
            Diagnostic::run(
                DiagnosticKind::GuardrailPolicyMissing,
                "guardrail.terms",
                "No banned terms configured; recommendations were not vetted",
            )
        })
    }

    /// Check a single piece of text
    pub fn check(&self, text: &str) -> GuardrailVerdict {
        self.check_all(&[text])
    }

    /// Check several fields together; a match in any of them fails
    pub fn check_all(&self, texts: &[&str]) -> GuardrailVerdict {
        let matched_terms: Vec<String> = self
            .policy
            .terms
            .iter()
            .zip(&self.patterns)
            .filter(|(_, pattern)| texts.iter().any(|text| pattern.is_match(text)))
            .map(|(term, _)| term.clone())
            .collect();

        GuardrailVerdict {
            passed: matched_terms.is_empty(),
            matched_terms,
        }
    }

    /// Check the user-visible text of a recommendation
    pub fn check_recommendation(&self, recommendation: &Recommendation) -> GuardrailVerdict {
        self.check_all(&[recommendation.headline(), recommendation.rationale()])
    }

    /// Record a verdict on every recommendation and split them into
    /// (accepted, rejected)
    pub fn vet(
        &self,
        recommendations: Vec<Recommendation>,
    ) -> Result<(Vec<Recommendation>, Vec<Recommendation>)> {
        let mut accepted = Vec::new();
        let mut rejected = Vec::new();

        for mut recommendation in recommendations {
            let verdict = self.check_recommendation(&recommendation);
            recommendation.record_verdict(&verdict)?;
            if verdict.passed {
                accepted.push(recommendation);
            } else {
                warn!(
                    recommendation = recommendation.id(),
                    terms = ?verdict.matched_terms,
                    "Recommendation rejected by tone guardrail"
                );
                rejected.push(recommendation);
            }
        }

        Ok((accepted, rejected))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn guardrail(terms: &[&str], mode: MatchMode) -> ToneGuardrail {
        ToneGuardrail::new(GuardrailPolicy::new(terms, mode)).unwrap()
    }

    #[test]
    fn test_banned_term_rejects_and_removal_passes() {
        let text = "Your reckless spending on dining added up this month";

        let strict = guardrail(&["reckless", "lazy"], MatchMode::Word);
        let verdict = strict.check(text);
        assert!(!verdict.passed);
        assert_eq!(verdict.matched_terms, vec!["reckless"]);

        let relaxed = guardrail(&["lazy"], MatchMode::Word);
        assert!(relaxed.check(text).passed);
    }

    #[test]
    fn test_case_insensitive_and_policy_ordered() {
        let g = guardrail(&["foolish", "Bad With Money", "lazy"], MatchMode::Word);
        let verdict = g.check("LAZY habits make people bad with money. Foolish!");
        assert_eq!(verdict.matched_terms, vec!["foolish", "Bad With Money", "lazy"]);
    }

    #[test]
    fn test_word_mode_respects_boundaries() {
        let word = guardrail(&["lazy"], MatchMode::Word);
        assert!(word.check("A lazy Sunday").matched_terms.len() == 1);
        assert!(word.check("lazy").matched_terms.len() == 1);
        assert!(word.check("Try a Lazy-Susan budget").matched_terms.len() == 1);
        assert!(word.check("Blazyn Coffee").passed);

        let substring = guardrail(&["lazy"], MatchMode::Substring);
        assert!(!substring.check("Blazyn Coffee").passed);
    }

    #[test]
    fn test_empty_policy_passes_with_diagnostic() {
        let g = guardrail(&[], MatchMode::Word);
        assert!(g.is_policy_missing());
        assert!(g.check("anything reckless at all").passed);

        let diagnostic = g.policy_diagnostic().unwrap();
        assert_eq!(diagnostic.kind, DiagnosticKind::GuardrailPolicyMissing);
        assert_eq!(diagnostic.user_id, None);

        assert!(guardrail(&["lazy"], MatchMode::Word).policy_diagnostic().is_none());
    }

    #[test]
    fn test_policy_normalization() {
        let policy = GuardrailPolicy::new(vec![" lazy ", "", "LAZY", "reckless"], MatchMode::Word);
        assert_eq!(policy.terms(), &["lazy".to_string(), "reckless".to_string()]);
    }

    #[test]
    fn test_regex_metacharacters_are_literal() {
        let g = guardrail(&["100% safe"], MatchMode::Substring);
        assert!(!g.check("This is 100% safe.").passed);
        assert!(g.check("This is 1000 safe.").passed);
    }

    #[test]
    fn test_terms_file_source() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# house style").unwrap();
        writeln!(file, "shameful").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "get rich").unwrap();

        let source = TermsFile::new(file.path());
        let g = ToneGuardrail::from_source(&source).unwrap();
        assert_eq!(g.policy().terms(), &["shameful".to_string(), "get rich".to_string()]);
        assert!(!g.check("A plan to get rich quick").passed);
    }

    #[test]
    fn test_config_source_appends_file_terms() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "ashamed").unwrap();
        writeln!(file, "Lazy").unwrap();

        let config = GuardrailConfig {
            mode: MatchMode::Word,
            terms: vec!["lazy".to_string()],
            terms_file: Some(file.path().to_path_buf()),
        };
        let policy = config.load_policy().unwrap();
        assert_eq!(policy.terms(), &["lazy".to_string(), "ashamed".to_string()]);
    }

    #[test]
    fn test_missing_terms_file_is_config_error() {
        let err = TermsFile::new("/nonexistent/terms.txt").load_policy().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_vec_source() {
        let g = ToneGuardrail::from_source(&vec!["careless".to_string()]).unwrap();
        assert_eq!(g.policy().mode(), MatchMode::Word);
        assert!(!g.check("careless").passed);
    }
}
