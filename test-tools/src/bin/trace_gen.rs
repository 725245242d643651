/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Synthetic dataset generator.
//!
//! Produces a solar-shaped renewable-excess curve with day-to-day cloud
//! cover, a noisy free-capacity curve, forecasts whose error grows with
//! lead time, and a stream of delay-tolerant requests.  The same seed always
//! produces the same files.

use std::path::PathBuf;
use std::process;

use anyhow::{anyhow, Result};
use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use tracing::{error, info};

use cucumber_ac::dataset::{capacity_trace_path, requests_path, write_json, RequestRow};
use cucumber_ac::trace::CapacitySample;

/// Steps per simulated day (10-minute slots).
const STEPS_PER_DAY: u32 = 144;

// ── CLI argument definition ───────────────────────────────────────────────────

#[derive(Debug, Parser)]
#[command(name = "trace-gen", about = "Write a seeded synthetic cucumber-sim dataset")]
struct Cli {
    /// Output directory.
    #[arg(short = 'o', long = "out-dir", default_value = "data")]
    out_dir: PathBuf,

    #[arg(long, default_value = "synthetic")]
    scenario: String,

    #[arg(long, default_value = "lab")]
    site: String,

    /// Number of steps with actual values.
    #[arg(long, default_value_t = 7 * STEPS_PER_DAY)]
    steps: u32,

    /// Forecast look-ahead in steps.
    #[arg(long, default_value_t = STEPS_PER_DAY)]
    horizon: u32,

    /// Number of requests to generate.
    #[arg(long, default_value_t = 500)]
    requests: usize,

    /// Node capacity (upper bound of `u_free`).
    #[arg(long, default_value_t = 100.0)]
    capacity: f64,

    /// Peak renewable-excess capacity on a clear day.
    #[arg(long, default_value_t = 80.0)]
    peak: f64,

    #[arg(long, default_value_t = 42)]
    seed: u64,
}

// ── Generators ────────────────────────────────────────────────────────────────

/// Actual `(free, reep)` per step.
fn actual_curves(cli: &Cli, rng: &mut StdRng) -> Result<Vec<(f64, f64)>> {
    let noise = Normal::new(0.0, 0.05).map_err(|e| anyhow!("noise distribution: {}", e))?;
    let days = cli.steps.div_ceil(STEPS_PER_DAY) as usize;
    let clouds: Vec<f64> = (0..days).map(|_| rng.gen_range(0.3..=1.0)).collect();

    let curves = (0..cli.steps)
        .map(|t| {
            let slot = (t % STEPS_PER_DAY) as f64;
            let day = (t / STEPS_PER_DAY) as usize;

            // Daylight between 06:00 and 18:00
            let sun = (std::f64::consts::PI * (slot - 36.0) / 72.0).sin().max(0.0);
            let reep = (cli.peak * sun * clouds[day] * (1.0 + noise.sample(rng))).max(0.0);

            // Busier during the day, so less free capacity
            let load = 0.5 + 0.3 * (std::f64::consts::PI * (slot - 48.0) / 72.0).sin().max(0.0);
            let free = (cli.capacity * (1.0 - load) * (1.0 + noise.sample(rng))).clamp(0.0, cli.capacity);
            (free, reep)
        })
        .collect();
    Ok(curves)
}

/// Forecast rows for every issue step.  Relative error grows linearly with
/// lead time; the conservative and optimistic columns bracket the expected
/// one by one standard deviation.
fn forecasts(cli: &Cli, actual: &[(f64, f64)], rng: &mut StdRng) -> Result<Vec<CapacitySample>> {
    let unit = Normal::new(0.0, 1.0).map_err(|e| anyhow!("error distribution: {}", e))?;
    if actual.is_empty() {
        return Ok(Vec::new());
    }
    let last = (actual.len() - 1) as u32;

    let mut samples = Vec::new();
    for issue in 0..=last {
        for target in issue..=issue.saturating_add(cli.horizon).min(last) {
            let (free, reep) = actual[target as usize];
            let lead = (target - issue) as f64 / cli.horizon.max(1) as f64;
            let sigma = 0.02 + 0.3 * lead;

            let expected = (reep * (1.0 + sigma * unit.sample(rng))).max(0.0);
            samples.push(CapacitySample {
                issue,
                target,
                free,
                free_pred: (free * (1.0 + 0.02 * unit.sample(rng))).max(0.0),
                reep,
                reep_pred_expected: expected,
                reep_pred_conservative: (expected * (1.0 - sigma)).max(0.0),
                reep_pred_optimistic: expected * (1.0 + sigma),
            });
        }
    }
    Ok(samples)
}

fn requests(cli: &Cli, rng: &mut StdRng) -> Vec<RequestRow> {
    let latest_arrival = cli.steps.saturating_sub(cli.horizon).max(1);
    let mut rows: Vec<RequestRow> = (0..cli.requests)
        .map(|_| {
            let arrival = rng.gen_range(0..latest_arrival);
            let slack = rng.gen_range(6..=cli.horizon.max(7));
            let size = rng.gen_range(1.0..=(slack as f64 * cli.peak * 0.05).max(2.0));
            RequestRow {
                arrival,
                deadline: arrival + slack,
                size,
            }
        })
        .collect();
    rows.sort_by_key(|r| r.arrival);
    rows
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn run(cli: &Cli) -> Result<()> {
    let mut rng = StdRng::seed_from_u64(cli.seed);

    let actual = actual_curves(cli, &mut rng)?;
    let samples = forecasts(cli, &actual, &mut rng)?;
    let rows = requests(cli, &mut rng);

    let trace_path = capacity_trace_path(&cli.out_dir, &cli.scenario, &cli.site);
    write_json(&trace_path, &samples)?;
    info!(path = %trace_path.display(), rows = samples.len(), "Capacity trace written");

    let requests_path = requests_path(&cli.out_dir, &cli.scenario);
    write_json(&requests_path, &rows)?;
    info!(path = %requests_path.display(), rows = rows.len(), "Requests written");
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    info!(
        scenario = %cli.scenario,
        site     = %cli.site,
        steps    = cli.steps,
        horizon  = cli.horizon,
        requests = cli.requests,
        seed     = cli.seed,
        "Generating dataset"
    );

    if let Err(e) = run(&cli) {
        error!("Dataset generation failed: {:#}", e);
        process::exit(1);
    }
}
