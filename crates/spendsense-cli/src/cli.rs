//! CLI argument definitions using clap
//!
//! The command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// SpendSense - Behavioral personas and explainable recommendations
#[derive(Parser)]
#[command(name = "spendsense")]
#[command(about = "Persona classification and recommendation pipeline", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Configuration file (defaults to the local override, then built-in defaults)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Output store file
    #[arg(long, default_value = "spendsense.json", global = true)]
    pub state: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Recompute metrics, personas, and recommendations for a date
    Recompute {
        /// Directory holding users.csv, accounts.csv, transactions.csv
        #[arg(short, long)]
        data: PathBuf,

        /// Evaluation date (YYYY-MM-DD)
        #[arg(long)]
        date: String,

        /// Only recompute these users (repeatable)
        #[arg(short, long = "user")]
        users: Vec<String>,

        /// Print the full output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the decision trace and recommendations for a user
    Explain {
        /// User ID
        user: String,

        /// Evaluation date (defaults to the latest stored)
        #[arg(long)]
        date: Option<String>,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// List recommendations rejected by the tone guardrail
    Review {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Override the persona assigned to a user on a date and regenerate its recommendations
    Override {
        /// User ID
        user: String,

        /// Evaluation date (YYYY-MM-DD)
        #[arg(long)]
        date: String,

        /// Persona: debt_fighter, gig_worker, auto_payer, wealth_compounder, optimizer, unclassified
        #[arg(short, long)]
        persona: String,

        /// Operator recording the override
        #[arg(short, long)]
        actor: String,

        /// Why the persona was changed
        #[arg(short, long)]
        reason: Option<String>,
    },

    /// Check text against the tone guardrail
    CheckText {
        /// Text to check
        text: String,

        /// Use this banned-term file instead of the configured policy
        #[arg(long)]
        terms_file: Option<PathBuf>,
    },

    /// Show the effective configuration
    Config,
}
