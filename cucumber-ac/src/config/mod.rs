/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Experiment configuration loading and management.
//!
//! The expected YAML structure is:
//! ```yaml
//! data_dir: data
//! output_dir: results
//! run_window: { start: 0, end: 2016 }   # optional request filter
//! steps_per_hour: 6                      # 10-minute steps
//! scenarios: [alibaba, nyctaxi]
//! sites: [berlin, cdmx, capet]
//! policies:
//!   expected:    { risk: expected, strict_green: true }
//!   oracle:      { risk: perfect }
//!   naive:       { admission: naive, strict_green: false }
//!   best_effort: { risk: expected, strict_green: false, tie_break: max_margin }
//! ```
//!
//! Every key is optional.  Policy keys default to `admission: planned`,
//! `strict_green: true`,
//! `tie_break: earliest`, `search_order: earliest_first`,
//! `late_completion: false` and `grid_fallback: !strict_green`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::policy::{AdmissionMode, PolicyConfig, RiskScenario, SearchOrder, TieBreak};
use crate::Step;

// ── Private YAML deserialization types ────────────────────────────────────────

/// Top-level wrapper that maps directly onto the YAML file layout.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ExperimentConfigFile {
    data_dir: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    run_window: Option<RunWindow>,
    steps_per_hour: Option<f64>,
    #[serde(default)]
    scenarios: Vec<String>,
    #[serde(default)]
    sites: Vec<String>,
    #[serde(default)]
    policies: BTreeMap<String, PolicyEntry>,
}

/// Policy fields as they appear in the YAML file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct PolicyEntry {
    risk: Option<RiskScenario>,
    admission: Option<AdmissionMode>,
    strict_green: Option<bool>,
    tie_break: Option<TieBreak>,
    search_order: Option<SearchOrder>,
    late_completion: Option<bool>,
    grid_fallback: Option<bool>,
}

impl PolicyEntry {
    fn into_policy(self) -> PolicyConfig {
        let strict_green = self.strict_green.unwrap_or(true);
        PolicyConfig {
            risk: self.risk.unwrap_or_default(),
            admission: self.admission.unwrap_or_default(),
            strict_green,
            tie_break: self.tie_break.unwrap_or_default(),
            search_order: self.search_order.unwrap_or_default(),
            late_completion: self.late_completion.unwrap_or(false),
            grid_fallback: self.grid_fallback.unwrap_or(!strict_green),
        }
    }
}

// ── Public data structures ────────────────────────────────────────────────────

/// Half-open arrival window `[start, end)` used to filter request rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunWindow {
    pub start: Step,
    pub end: Step,
}

/// Everything needed to build the run matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentConfig {
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
    pub run_window: Option<RunWindow>,
    /// Steps per hour of simulated time, used to report grid energy in
    /// unit-hours.
    pub steps_per_hour: f64,
    pub scenarios: Vec<String>,
    pub sites: Vec<String>,
    /// Policy name → policy.  Sorted so the run matrix order is stable.
    pub policies: BTreeMap<String, PolicyConfig>,
}

impl ExperimentConfig {
    /// Configuration used when no file is supplied.
    pub fn default_config() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            output_dir: PathBuf::from("results"),
            run_window: None,
            steps_per_hour: DEFAULT_STEPS_PER_HOUR,
            scenarios: default_scenarios(),
            sites: default_sites(),
            policies: preset_policies(),
        }
    }

    /// Number of `(scenario, site, policy)` runs.
    pub fn run_count(&self) -> usize {
        self.scenarios.len() * self.sites.len() * self.policies.len()
    }
}

/// 10-minute steps.
const DEFAULT_STEPS_PER_HOUR: f64 = 6.0;

fn default_scenarios() -> Vec<String> {
    vec!["alibaba".to_string(), "nyctaxi".to_string()]
}

fn default_sites() -> Vec<String> {
    vec!["berlin".to_string(), "cdmx".to_string(), "capet".to_string()]
}

fn preset_policies() -> BTreeMap<String, PolicyConfig> {
    PolicyConfig::presets()
        .into_iter()
        .map(|(name, p)| (name.to_string(), p))
        .collect()
}

// ── ExperimentConfigManager ───────────────────────────────────────────────────

/// Loads and holds the experiment configuration.
#[derive(Debug)]
pub struct ExperimentConfigManager {
    config: ExperimentConfig,

    /// Set to `true` after a successful [`load_from_file`](Self::load_from_file).
    loaded: bool,
}

impl Default for ExperimentConfigManager {
    fn default() -> Self {
        Self {
            config: ExperimentConfig::default_config(),
            loaded: false,
        }
    }
}

impl ExperimentConfigManager {
    /// Creates a manager holding the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `path` and replaces the held configuration.
    ///
    /// * Missing `scenarios`, `sites` or `policies` fall back to the built-in
    ///   defaults.
    /// * Calling this method a second time replaces everything loaded before.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened, the YAML is invalid, or
    /// the run window is empty.
    pub fn load_from_file(&mut self, path: &Path) -> Result<()> {
        info!("Loading experiment configuration from: {}", path.display());

        self.config = ExperimentConfig::default_config();
        self.loaded = false;

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot open configuration file: {}", path.display()))?;

        // An empty document deserializes as unit, not as a mapping
        let file: ExperimentConfigFile = if content.trim().is_empty() {
            ExperimentConfigFile::default()
        } else {
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse YAML file: {}", path.display()))?
        };

        if let Some(w) = file.run_window {
            if w.start >= w.end {
                bail!(
                    "Invalid run_window in {}: start {} must be before end {}",
                    path.display(),
                    w.start,
                    w.end
                );
            }
        }

        let steps_per_hour = file.steps_per_hour.unwrap_or(DEFAULT_STEPS_PER_HOUR);
        if !(steps_per_hour > 0.0) {
            bail!(
                "Invalid steps_per_hour in {}: {} must be positive",
                path.display(),
                steps_per_hour
            );
        }

        let mut config = ExperimentConfig {
            data_dir: file.data_dir.unwrap_or(self.config.data_dir.clone()),
            output_dir: file.output_dir.unwrap_or(self.config.output_dir.clone()),
            run_window: file.run_window,
            steps_per_hour,
            scenarios: file.scenarios,
            sites: file.sites,
            policies: BTreeMap::new(),
        };

        for (name, entry) in file.policies {
            let policy = entry.into_policy();
            debug!(
                "  Policy: {} | risk: {} | admission: {} | strict: {} | fallback: {} | late: {}",
                name,
                policy.risk,
                policy.admission,
                policy.strict_green,
                policy.grid_fallback,
                policy.late_completion
            );
            config.policies.insert(name, policy);
        }

        if config.scenarios.is_empty() {
            warn!("No scenarios in configuration file, using defaults");
            config.scenarios = default_scenarios();
        }
        if config.sites.is_empty() {
            warn!("No sites in configuration file, using defaults");
            config.sites = default_sites();
        }
        if config.policies.is_empty() {
            warn!("No policies in configuration file, using built-in presets");
            config.policies = preset_policies();
        }

        info!(
            scenarios = config.scenarios.len(),
            sites = config.sites.len(),
            policies = config.policies.len(),
            runs = config.run_count(),
            "Experiment configuration loaded"
        );

        self.config = config;
        self.loaded = true;
        Ok(())
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    /// Mutable access for command-line overrides.
    pub fn config_mut(&mut self) -> &mut ExperimentConfig {
        &mut self.config
    }

    pub fn into_config(self) -> ExperimentConfig {
        self.config
    }

    /// Returns the policy called `name`, if configured.
    pub fn get_policy(&self, name: &str) -> Option<&PolicyConfig> {
        self.config.policies.get(name)
    }

    /// Returns `true` after a successful call to [`load_from_file`](Self::load_from_file).
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
