//! CLI command tests

use std::fs;
use std::path::Path;

use clap::Parser;
use rust_decimal_macros::dec;
use spendsense_core::test_utils::{checking, date, savings, spend};
use spendsense_core::{
    InputDataset, OutputStore, Persona, Pipeline, PipelineConfig, UserProfile, UserSelection,
};

use crate::cli::{Cli, Commands};
use crate::commands::{self, parse_date, truncate};

/// One idle-cash user and one user without history
fn write_dataset(dir: &Path) {
    fs::write(
        dir.join("users.csv"),
        "user_id,full_name,consent_granted\nU1,Ana Diaz,true\nU2,Ben Ito,true\n",
    )
    .unwrap();
    fs::write(
        dir.join("accounts.csv"),
        "account_id,user_id,account_type,current_balance,credit_limit\n\
         U1_CHK,U1,checking,45000,\n\
         U2_CHK,U2,checking,100,\n",
    )
    .unwrap();

    let mut csv = String::from("transaction_id,user_id,account_id,merchant_name,amount,date,category\n");
    for month in 1..=6 {
        csv.push_str(&format!(
            "T{},U1,U1_CHK,Landlord Co,-5000,2025-{:02}-05,Rent\n",
            month, month
        ));
    }
    fs::write(dir.join("transactions.csv"), csv).unwrap();
}

fn write_terms(dir: &Path, terms: &str) -> std::path::PathBuf {
    let path = dir.join("terms.txt");
    fs::write(&path, terms).unwrap();
    path
}

fn write_config(dir: &Path, terms_file: &Path) -> std::path::PathBuf {
    let path = dir.join("spendsense.toml");
    fs::write(
        &path,
        format!(
            "[guardrail]\nterms = []\nterms_file = {:?}\n",
            terms_file.display().to_string()
        ),
    )
    .unwrap();
    path
}

// ========== Argument Parsing Tests ==========

#[test]
fn test_parse_recompute_with_users() {
    let cli = Cli::try_parse_from([
        "spendsense",
        "recompute",
        "--data",
        "data",
        "--date",
        "2025-06-30",
        "-u",
        "U1",
        "-u",
        "U2",
    ])
    .unwrap();

    assert_eq!(cli.state.to_str(), Some("spendsense.json"));
    match cli.command {
        Commands::Recompute { users, date, json, .. } => {
            assert_eq!(users, vec!["U1", "U2"]);
            assert_eq!(date, "2025-06-30");
            assert!(!json);
        }
        _ => panic!("Expected recompute"),
    }
}

#[test]
fn test_parse_global_flags_after_subcommand() {
    let cli = Cli::try_parse_from([
        "spendsense",
        "review",
        "--state",
        "out/store.json",
        "--verbose",
    ])
    .unwrap();
    assert!(cli.verbose);
    assert_eq!(cli.state.to_str(), Some("out/store.json"));
}

#[test]
fn test_parse_override_requires_actor() {
    let result = Cli::try_parse_from([
        "spendsense",
        "override",
        "U1",
        "--date",
        "2025-06-30",
        "--persona",
        "optimizer",
    ]);
    assert!(result.is_err());
}

#[test]
fn test_parse_date() {
    assert_eq!(
        parse_date("2025-06-30").unwrap(),
        chrono::NaiveDate::from_ymd_opt(2025, 6, 30).unwrap()
    );
    assert!(parse_date("06/30/2025").is_err());
}

#[test]
fn test_truncate() {
    assert_eq!(truncate("short", 10), "short");
    assert_eq!(truncate("a much longer user id", 10), "a much ...");
}

// ========== Command Tests ==========

#[test]
fn test_recompute_then_explain() {
    let dir = tempfile::tempdir().unwrap();
    write_dataset(dir.path());
    let state = dir.path().join("store.json");

    commands::cmd_recompute(None, &state, dir.path(), "2025-06-30", &[], false).unwrap();

    let store = OutputStore::load(&state).unwrap();
    let (_, evaluation) = store.find("U1", None).unwrap();
    assert_eq!(evaluation.assignment.persona, Persona::Unclassified);
    assert!(evaluation.accepted[0].rationale().contains("$30,000"));

    assert!(commands::cmd_explain(&state, "U1", None, false).is_ok());
    assert!(commands::cmd_explain(&state, "U1", Some("2025-06-30"), true).is_ok());
    assert!(commands::cmd_explain(&state, "NOBODY", None, false).is_err());
}

#[test]
fn test_recompute_bad_date_fails() {
    let dir = tempfile::tempdir().unwrap();
    write_dataset(dir.path());
    let state = dir.path().join("store.json");

    let result = commands::cmd_recompute(None, &state, dir.path(), "30-06-2025", &[], false);
    assert!(result.is_err());
    assert!(!state.exists());
}

#[test]
fn test_recompute_unknown_user_fails() {
    let dir = tempfile::tempdir().unwrap();
    write_dataset(dir.path());
    let state = dir.path().join("store.json");

    let users = vec!["U9".to_string()];
    assert!(commands::cmd_recompute(None, &state, dir.path(), "2025-06-30", &users, true).is_err());
}

#[test]
fn test_review_and_override() {
    let dir = tempfile::tempdir().unwrap();
    write_dataset(dir.path());
    let terms = write_terms(dir.path(), "idle\n");
    let config = write_config(dir.path(), &terms);
    let state = dir.path().join("store.json");

    commands::cmd_recompute(Some(&config), &state, dir.path(), "2025-06-30", &[], false).unwrap();

    let store = OutputStore::load(&state).unwrap();
    assert_eq!(store.review_queue().len(), 1);
    assert!(commands::cmd_review(&state, false).is_ok());
    assert!(commands::cmd_review(&state, true).is_ok());

    commands::cmd_override(
        Some(&config),
        &state,
        "U1",
        "2025-06-30",
        "wealth-compounder",
        "ops@example.com",
        Some("Manual review".to_string()),
    )
    .unwrap();

    let store = OutputStore::load(&state).unwrap();
    let trace = store
        .decision_trace("U1", parse_date("2025-06-30").unwrap())
        .unwrap();
    assert_eq!(trace.persona, Persona::Unclassified);
    assert_eq!(trace.effective_persona(), Persona::WealthCompounder);

    // A later recompute keeps generating for the overridden persona
    commands::cmd_recompute(Some(&config), &state, dir.path(), "2025-06-30", &[], false).unwrap();
    let store = OutputStore::load(&state).unwrap();
    let (_, evaluation) = store.find("U1", None).unwrap();
    assert_eq!(evaluation.assignment.effective_persona(), Persona::WealthCompounder);
    assert!(!evaluation.rejected.is_empty());
    assert!(evaluation
        .accepted
        .iter()
        .chain(&evaluation.rejected)
        .all(|r| r.persona() == Persona::WealthCompounder));
}

#[test]
fn test_override_regenerates_stored_recommendations() {
    let dir = tempfile::tempdir().unwrap();
    let state = dir.path().join("store.json");
    let eval_date = date(2025, 6, 30);

    let dataset = InputDataset {
        users: vec![UserProfile::new("U1")],
        accounts: vec![checking("U1", dec!(27000)), savings("U1", dec!(18000))],
        transactions: (1..=6)
            .map(|m| spend("U1", date(2025, m, 10), dec!(5000), "Landlord Co"))
            .collect(),
    };
    let output = Pipeline::new(PipelineConfig::default())
        .unwrap()
        .recompute(&dataset, eval_date, &UserSelection::All)
        .unwrap();
    let mut store = OutputStore::new();
    store.record(&output);
    store.save(&state).unwrap();

    let before = store.accepted_recommendations("U1", eval_date).unwrap();
    assert!(before.iter().all(|r| r.persona() == Persona::Unclassified));

    commands::cmd_override(None, &state, "U1", "2025-06-30", "optimizer", "ops", None).unwrap();

    let store = OutputStore::load(&state).unwrap();
    let after = store.accepted_recommendations("U1", eval_date).unwrap();
    assert!(!after.is_empty());
    assert!(after.iter().all(|r| r.persona() == Persona::Optimizer));
    assert!(commands::cmd_explain(&state, "U1", Some("2025-06-30"), false).is_ok());
}

#[test]
fn test_override_rejects_unknown_persona() {
    let dir = tempfile::tempdir().unwrap();
    write_dataset(dir.path());
    let state = dir.path().join("store.json");
    commands::cmd_recompute(None, &state, dir.path(), "2025-06-30", &[], false).unwrap();

    let result = commands::cmd_override(None, &state, "U1", "2025-06-30", "spender", "ops", None);
    assert!(result.is_err());
}

#[test]
fn test_check_text_with_terms_file() {
    let dir = tempfile::tempdir().unwrap();
    let terms = write_terms(dir.path(), "# tone\nreckless\n");

    assert!(commands::cmd_check_text(None, "You were reckless.", Some(&terms)).is_ok());
    assert!(commands::cmd_check_text(None, "Pay down the card.", None).is_ok());
    assert!(commands::cmd_check_text(None, "text", Some(&dir.path().join("missing.txt"))).is_err());
}

#[test]
fn test_config_with_missing_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    assert!(commands::cmd_config(Some(&dir.path().join("nope.toml"))).is_err());
    assert!(commands::cmd_config(None).is_ok());
}
