//! Guardrail check command implementation

use std::path::Path;

use anyhow::Result;
use spendsense_core::{TermsFile, ToneGuardrail};

use super::load_config;

pub fn cmd_check_text(config_path: Option<&Path>, text: &str, terms_file: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let guardrail = match terms_file {
        Some(path) => {
            let mut source = TermsFile::new(path);
            source.mode = config.guardrail.mode;
            ToneGuardrail::from_source(&source)?
        }
        None => ToneGuardrail::from_source(&config.guardrail)?,
    };

    if guardrail.is_policy_missing() {
        println!("⚠️  No banned terms configured; every text passes.");
    }

    let verdict = guardrail.check(text);
    if verdict.passed {
        println!("✅ Passed");
    } else {
        println!("🛑 Rejected: {}", verdict.matched_terms.join(", "));
    }

    Ok(())
}
