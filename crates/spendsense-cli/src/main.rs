//! SpendSense CLI - Persona and recommendation pipeline for operators
//!
//! Usage:
//!   spendsense recompute --data DIR --date 2025-06-30   Recompute every user
//!   spendsense explain USER                             Show a decision trace
//!   spendsense review                                   List held-back recommendations
//!   spendsense override USER --date D --persona P --actor A

mod cli;
mod commands;

#[cfg(test)]
mod tests;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    let config = cli.config.as_deref();

    match cli.command {
        Commands::Recompute {
            data,
            date,
            users,
            json,
        } => commands::cmd_recompute(config, &cli.state, &data, &date, &users, json),
        Commands::Explain { user, date, json } => {
            commands::cmd_explain(&cli.state, &user, date.as_deref(), json)
        }
        Commands::Review { json } => commands::cmd_review(&cli.state, json),
        Commands::Override {
            user,
            date,
            persona,
            actor,
            reason,
        } => commands::cmd_override(config, &cli.state, &user, &date, &persona, &actor, reason),
        Commands::CheckText { text, terms_file } => {
            commands::cmd_check_text(config, &text, terms_file.as_deref())
        }
        Commands::Config => commands::cmd_config(config),
    }
}
