//! Configuration command implementation

use std::path::Path;

use anyhow::Result;
use spendsense_core::config::default_config_path;

use super::load_config;

pub fn cmd_config(config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;

    let source = match config_path {
        Some(path) => path.display().to_string(),
        None => match default_config_path() {
            Some(path) if path.exists() => path.display().to_string(),
            _ => "built-in defaults".to_string(),
        },
    };

    println!("# Source: {}", source);
    println!("# Workers: {}", config.worker_count());
    println!("{}", serde_json::to_string_pretty(&config)?);

    Ok(())
}
