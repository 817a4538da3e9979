//! Recompute command implementation

use std::path::Path;

use anyhow::{Context, Result};
use spendsense_core::{load_dataset, Pipeline, UserOutcome, UserSelection};

use super::{load_config, open_store, parse_date, truncate};

pub fn cmd_recompute(
    config_path: Option<&Path>,
    state: &Path,
    data: &Path,
    date: &str,
    users: &[String],
    json: bool,
) -> Result<()> {
    let date = parse_date(date)?;
    let config = load_config(config_path)?;

    let dataset = load_dataset(data)
        .with_context(|| format!("Failed to load dataset from {}", data.display()))?;

    let selection = if users.is_empty() {
        UserSelection::All
    } else {
        UserSelection::Only(users.to_vec())
    };

    let mut store = open_store(state)?;
    let overrides = store.overrides_on(date);

    let pipeline = Pipeline::new(config).context("Failed to build pipeline")?;
    let output = pipeline.recompute_with_overrides(&dataset, date, &selection, &overrides)?;

    let summary = store.record(&output);
    store
        .save(state)
        .with_context(|| format!("Failed to save store {}", state.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!();
    println!("📊 Recompute for {}", date);
    println!("   ─────────────────────────────────────────────────────────────");

    for outcome in &output.outcomes {
        match outcome {
            UserOutcome::Completed(report) => {
                let persona = report.assignment.effective_persona();
                let marker = if report.assignment.override_.is_some() {
                    " (override)"
                } else {
                    ""
                };
                println!(
                    "   ✅ {:16} │ {:18} │ {} accepted, {} held{}",
                    truncate(&report.user_id, 16),
                    persona.label(),
                    report.accepted.len(),
                    report.rejected.len(),
                    marker
                );
            }
            UserOutcome::Failed { user_id, error, .. } => {
                println!("   ❌ {:16} │ {}", truncate(user_id, 16), error);
            }
        }
    }

    let run_diagnostics: Vec<_> = output
        .diagnostics
        .iter()
        .filter(|d| d.user_id.is_none())
        .collect();
    if !run_diagnostics.is_empty() {
        println!();
        for diagnostic in run_diagnostics {
            println!("   ⚠️  {}: {}", diagnostic.kind, diagnostic.message);
        }
    }

    println!();
    println!(
        "   {} stored, {} failed, {} overrides kept → {}",
        summary.stored,
        summary.failed,
        summary.overrides_kept,
        state.display()
    );

    Ok(())
}
