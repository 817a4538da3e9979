//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `recompute` - Batch recompute and store update
//! - `explain` - Decision trace lookup
//! - `review` - Guardrail review queue and persona overrides
//! - `guardrail` - Ad-hoc text checks
//! - `config` - Effective configuration

pub mod config;
pub mod explain;
pub mod guardrail;
pub mod recompute;
pub mod review;

// Re-export command functions for main.rs
pub use config::*;
pub use explain::*;
pub use guardrail::*;
pub use recompute::*;
pub use review::*;

use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use spendsense_core::{OutputStore, PipelineConfig};

/// Parse a YYYY-MM-DD command-line date
pub fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}' (use YYYY-MM-DD)", value))
}

pub fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    PipelineConfig::load(path).context("Failed to load configuration")
}

pub fn open_store(path: &Path) -> Result<OutputStore> {
    OutputStore::load(path).with_context(|| format!("Failed to open store {}", path.display()))
}

/// Truncate a string to a maximum length, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

fn ratio(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:.1}%", v * 100.0))
        .unwrap_or_else(|| "-".to_string())
}
