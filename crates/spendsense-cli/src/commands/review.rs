//! Review queue and persona override commands

use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use spendsense_core::{Persona, Pipeline};

use super::{load_config, open_store, parse_date, truncate};

pub fn cmd_review(state: &Path, json: bool) -> Result<()> {
    let store = open_store(state)?;
    let queue = store.review_queue();

    if json {
        println!("{}", serde_json::to_string_pretty(&queue)?);
        return Ok(());
    }

    if queue.is_empty() {
        println!("No recommendations awaiting review.");
        return Ok(());
    }

    println!();
    println!("🛑 Held for review ({})", queue.len());
    println!("   ─────────────────────────────────────────────────────────────");
    for item in &queue {
        println!(
            "   {:16} │ {} │ {:20} │ {}",
            truncate(&item.user_id, 16),
            item.evaluation_date,
            item.template,
            item.matched_terms.join(", ")
        );
        println!("     {}", truncate(&item.headline, 60));
    }

    Ok(())
}

/// Record an override and regenerate that evaluation's recommendations
pub fn cmd_override(
    config_path: Option<&Path>,
    state: &Path,
    user: &str,
    date: &str,
    persona: &str,
    actor: &str,
    reason: Option<String>,
) -> Result<()> {
    let date = parse_date(date)?;
    let persona: Persona = persona.parse().map_err(anyhow::Error::msg)?;

    let pipeline = Pipeline::new(load_config(config_path)?).context("Failed to build pipeline")?;

    let mut store = open_store(state)?;
    let assignment = store.apply_override(user, date, persona, actor, reason, Utc::now())?;
    let original = assignment.persona;
    let evaluation = store.refresh_recommendations(user, date, &pipeline)?;
    let (accepted, held) = (evaluation.accepted.len(), evaluation.rejected.len());
    store
        .save(state)
        .with_context(|| format!("Failed to save store {}", state.display()))?;

    println!(
        "✅ {} on {}: {} → {} (by {})",
        user,
        date,
        original.label(),
        persona.label(),
        actor.trim()
    );
    println!("   {} accepted, {} held for review", accepted, held);

    Ok(())
}
