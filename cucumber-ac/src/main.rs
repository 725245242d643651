/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};

use cucumber_ac::config::ExperimentConfigManager;
use cucumber_ac::experiment::{run_all, run_matrix, summary_line};

// ── CLI argument definition ───────────────────────────────────────────────────

/// Cucumber admission-control simulator.
///
/// Example:
///   cucumber-sim -c experiment.yaml -j 8
///   cucumber-sim --scenario alibaba --site berlin --dry-run
#[derive(Debug, Parser)]
#[command(
    name = "cucumber-sim",
    about = "Forecast-driven admission control simulator for renewable-excess capacity",
    long_about = None,
)]
struct Cli {
    /// Path to the YAML experiment configuration file.
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Directory holding `u_{scenario}_{site}.json` and `requests_{scenario}.json`.
    #[arg(short = 'd', long = "data-dir")]
    data_dir: Option<PathBuf>,

    /// Directory the per-run step and job records are written to.
    #[arg(short = 'o', long = "output-dir")]
    output_dir: Option<PathBuf>,

    /// Restrict the matrix to these scenarios (repeatable).
    #[arg(long = "scenario")]
    scenarios: Vec<String>,

    /// Restrict the matrix to these solar sites (repeatable).
    #[arg(long = "site")]
    sites: Vec<String>,

    /// Maximum number of runs executed at the same time.
    #[arg(short = 'j', long = "jobs", default_value_t = 4)]
    jobs: usize,

    /// Print the run matrix and exit.
    #[arg(long = "dry-run", default_value_t = false)]
    dry_run: bool,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    // Initialise structured logging.
    // Level is controlled by the RUST_LOG env-var (e.g. RUST_LOG=debug).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("cucumber-sim starting up...");

    // ── Parse CLI arguments ───────────────────────────────────────────────────
    let cli = Cli::parse();

    info!(
        config     = ?cli.config,
        data_dir   = ?cli.data_dir,
        output_dir = ?cli.output_dir,
        scenarios  = ?cli.scenarios,
        sites      = ?cli.sites,
        jobs       = cli.jobs,
        dry_run    = cli.dry_run,
        "Configuration"
    );

    // ── Load experiment configuration ─────────────────────────────────────────
    let mut manager = ExperimentConfigManager::new();

    match &cli.config {
        Some(path) => {
            if let Err(e) = manager.load_from_file(path) {
                error!("Failed to load experiment configuration: {:#}", e);
                process::exit(1);
            }
        }
        None => {
            warn!("No experiment configuration file provided, using default matrix and policies");
        }
    }

    // ── Command-line overrides ────────────────────────────────────────────────
    let cfg = manager.config_mut();
    if let Some(dir) = cli.data_dir {
        cfg.data_dir = dir;
    }
    if let Some(dir) = cli.output_dir {
        cfg.output_dir = dir;
    }
    if !cli.scenarios.is_empty() {
        cfg.scenarios = cli.scenarios;
    }
    if !cli.sites.is_empty() {
        cfg.sites = cli.sites;
    }
    let cfg = manager.into_config();

    let specs = run_matrix(&cfg);
    let steps_per_hour = cfg.steps_per_hour;
    info!(runs = specs.len(), data_dir = %cfg.data_dir.display(), "Run matrix built");

    if cli.dry_run {
        for spec in &specs {
            println!("{}", spec.label());
        }
        return;
    }

    // ── Execute ───────────────────────────────────────────────────────────────
    let results = run_all(specs, Arc::new(cfg), cli.jobs).await;

    let mut failed = 0;
    let mut current: Option<(String, String)> = None;
    for result in &results {
        match result {
            Ok(outcome) => {
                let key = (outcome.spec.scenario.clone(), outcome.spec.site.clone());
                if current.as_ref() != Some(&key) {
                    println!("\n### SCENARIO: {} | SOLAR SITE: {}", key.0, key.1);
                    current = Some(key);
                }
                println!(
                    "{}",
                    summary_line(&outcome.spec.policy_name, &outcome.summary, steps_per_hour)
                );
            }
            Err(e) => {
                error!("{}", e);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        error!(failed, total = results.len(), "Some runs failed");
        process::exit(1);
    }
    info!(total = results.len(), "All runs completed");
}
