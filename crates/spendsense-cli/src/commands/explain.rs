//! Decision trace command implementation

use std::path::Path;

use anyhow::Result;
use spendsense_core::classifier::RuleOutcome;
use spendsense_core::recommend::format::money;

use super::{open_store, parse_date, ratio};

pub fn cmd_explain(state: &Path, user: &str, date: Option<&str>, json: bool) -> Result<()> {
    let store = open_store(state)?;
    let date = date.map(parse_date).transpose()?;
    let (date, evaluation) = store.find(user, date)?;

    if json {
        println!("{}", serde_json::to_string_pretty(evaluation)?);
        return Ok(());
    }

    let snapshot = &evaluation.snapshot;
    let assignment = &evaluation.assignment;

    println!();
    println!("🔎 {} on {}", user, date);
    println!("   ─────────────────────────────────────────────────────────────");
    println!(
        "   Persona:      {} (rule: {})",
        assignment.persona.label(),
        assignment.matched_rule
    );
    if let Some(ov) = &assignment.override_ {
        println!(
            "   Override:     {} by {} at {}",
            ov.persona.label(),
            ov.actor,
            ov.overridden_at.format("%Y-%m-%d %H:%M")
        );
        if let Some(reason) = &ov.reason {
            println!("                 \"{}\"", reason);
        }
    }

    println!();
    println!("   Signals ({}-month window)", snapshot.window_months);
    println!(
        "   Burn rate:    {}",
        snapshot.burn_rate.map(money).unwrap_or_else(|| "-".into())
    );
    println!(
        "   Runway:       {}",
        snapshot
            .liquid_runway
            .map(|r| format!("{} months", r))
            .unwrap_or_else(|| "-".into())
    );
    println!("   Utilization:  {}", ratio(snapshot.credit_utilization));
    println!("   Savings rate: {}", ratio(snapshot.savings_rate));
    println!(
        "   Recurring:    {} merchants, {} of spending",
        snapshot.recurring_merchant_count,
        ratio(snapshot.subscription_outflow_ratio)
    );

    println!();
    println!("   Decision trace");
    for rule in &assignment.trace {
        let icon = match rule.outcome {
            RuleOutcome::Matched => "✅",
            RuleOutcome::NotMatched => "❌",
            RuleOutcome::Skipped => "⏭️ ",
            RuleOutcome::NotReached => "·",
        };
        println!(
            "   {} {:3} {:22} {}",
            icon,
            rule.priority,
            rule.rule,
            rule.outcome.as_str()
        );
        for condition in &rule.conditions {
            let threshold = condition
                .threshold
                .map(|t| format!(" {}", t))
                .unwrap_or_default();
            println!(
                "         {} {}{} (measured {}) → {}",
                condition.signal.as_str(),
                condition.comparator.symbol(),
                threshold,
                condition.measured,
                condition.outcome.as_str()
            );
        }
    }

    if !evaluation.accepted.is_empty() {
        println!();
        println!("   Recommendations");
        for rec in &evaluation.accepted {
            println!("   • {}", rec.headline());
            println!("     {}", rec.rationale());
        }
    }

    if !evaluation.diagnostics.is_empty() {
        println!();
        for diagnostic in &evaluation.diagnostics {
            println!(
                "   ⚠️  {} [{}]: {}",
                diagnostic.kind, diagnostic.subject, diagnostic.message
            );
        }
    }

    Ok(())
}
