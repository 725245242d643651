/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Experiment driver.
//!
//! Expands an [`ExperimentConfig`] into one [`RunSpec`] per
//! `(scenario, site, policy)` and executes them.  Runs are independent: each
//! loads its own trace and requests and owns its simulation state, so they
//! can execute in parallel on blocking threads.
//!
//! ```text
//! run_all ──► JoinSet ──► [Semaphore permit] ──► spawn_blocking(execute_run)
//!                                                   │
//!                                 load ─► simulate ─► write u_*.json / jobs_*.json
//! ```
//!
//! A failing run is reported as a [`RunError`] and never stops the others.

use std::sync::Arc;

use anyhow::anyhow;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::config::ExperimentConfig;
use crate::dataset::{
    capacity_trace_path, jobs_output_path, load_capacity_trace, load_requests, requests_path,
    steps_output_path, write_json,
};
use crate::metrics::RunSummary;
use crate::policy::PolicyConfig;
use crate::simulator::Simulation;
use crate::trace::CapacitySource;

// ── Run description ───────────────────────────────────────────────────────────

/// One cell of the run matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSpec {
    pub scenario: String,
    pub site: String,
    pub policy_name: String,
    pub policy: PolicyConfig,
}

impl RunSpec {
    pub fn label(&self) -> String {
        format!("{}/{}/{}", self.scenario, self.site, self.policy_name)
    }
}

/// Every run in scenario → site → policy order.
pub fn run_matrix(cfg: &ExperimentConfig) -> Vec<RunSpec> {
    let mut specs = Vec::with_capacity(cfg.run_count());
    for scenario in &cfg.scenarios {
        for site in &cfg.sites {
            for (policy_name, policy) in &cfg.policies {
                specs.push(RunSpec {
                    scenario: scenario.clone(),
                    site: site.clone(),
                    policy_name: policy_name.clone(),
                    policy: *policy,
                });
            }
        }
    }
    specs
}

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub spec: RunSpec,
    pub summary: RunSummary,
    pub steps: usize,
}

/// A run that could not complete.  Only this run is affected.
#[derive(Debug, Error)]
#[error("run {scenario}/{site}/{policy} failed: {cause:#}")]
pub struct RunError {
    pub scenario: String,
    pub site: String,
    pub policy: String,
    pub cause: anyhow::Error,
}

impl RunError {
    fn new(spec: &RunSpec, cause: anyhow::Error) -> Self {
        Self {
            scenario: spec.scenario.clone(),
            site: spec.site.clone(),
            policy: spec.policy_name.clone(),
            cause,
        }
    }
}

// ── Single run ────────────────────────────────────────────────────────────────

/// Load, simulate and write the outputs of one run.
pub fn execute_run(spec: &RunSpec, cfg: &ExperimentConfig) -> Result<RunOutcome, RunError> {
    let fail = |cause: anyhow::Error| RunError::new(spec, cause);

    info!(run = %spec.label(), "=== run started ===");

    let trace = load_capacity_trace(
        &capacity_trace_path(&cfg.data_dir, &spec.scenario, &spec.site),
        cfg.run_window,
    )
    .map_err(fail)?;
    let requests = load_requests(
        &requests_path(&cfg.data_dir, &spec.scenario),
        cfg.run_window,
        trace.horizon(),
    )
    .map_err(fail)?;

    let metrics = Simulation::new(trace, requests, spec.policy)
        .run()
        .map_err(|e| fail(e.into()))?;

    let steps_path = steps_output_path(&cfg.output_dir, &spec.scenario, &spec.site, &spec.policy_name);
    let jobs_path = jobs_output_path(&cfg.output_dir, &spec.scenario, &spec.site, &spec.policy_name);
    write_json(&steps_path, &metrics.steps).map_err(fail)?;
    write_json(&jobs_path, &metrics.jobs).map_err(fail)?;

    info!(
        run = %spec.label(),
        steps = metrics.steps.len(),
        jobs = metrics.jobs.len(),
        output = %jobs_path.display(),
        "run finished"
    );

    Ok(RunOutcome {
        spec: spec.clone(),
        summary: metrics.summary,
        steps: metrics.steps.len(),
    })
}

/// One-line report per run.  Late completions count as misses.  Grid
/// energy is converted from unit-steps to unit-hours with `steps_per_hour`.
pub fn summary_line(policy_name: &str, summary: &RunSummary, steps_per_hour: f64) -> String {
    format!(
        "{}: Success/Rejected/Miss: {}/{}/{} at {:.2} unit-hours powered by grid energy",
        policy_name,
        summary.on_time,
        summary.rejected,
        summary.missed + summary.late,
        summary.grid_powered / steps_per_hour
    )
}

// ── Batch ─────────────────────────────────────────────────────────────────────

/// Execute `specs` with at most `concurrency` runs at a time.  Results come
/// back in `specs` order.
pub async fn run_all(
    specs: Vec<RunSpec>,
    cfg: Arc<ExperimentConfig>,
    concurrency: usize,
) -> Vec<Result<RunOutcome, RunError>> {
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut set = JoinSet::new();

    for (index, spec) in specs.into_iter().enumerate() {
        let semaphore = Arc::clone(&semaphore);
        let cfg = Arc::clone(&cfg);
        set.spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(p) => p,
                Err(e) => return (index, Err(RunError::new(&spec, e.into()))),
            };
            let label = spec.label();
            let task_spec = spec.clone();
            let result = match tokio::task::spawn_blocking(move || execute_run(&task_spec, &cfg)).await
            {
                Ok(result) => result,
                Err(e) => Err(RunError::new(&spec, anyhow!("run task aborted: {}", e))),
            };
            if let Err(e) = &result {
                error!(run = %label, error = %e, "run failed");
            }
            (index, result)
        });
    }

    let mut results = Vec::new();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(indexed) => results.push(indexed),
            // The task body never panics; a JoinError here means the runtime
            // is shutting down.
            Err(e) => error!(error = %e, "run task lost"),
        }
    }
    results.sort_by_key(|(index, _)| *index);
    results.into_iter().map(|(_, r)| r).collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::RequestRow;
    use crate::policy::RiskScenario;
    use crate::trace::CapacitySample;
    use std::collections::BTreeMap;
    use std::path::Path;

    /// Writes `u_test_site.json` (8 steps, 10 green each, horizon 4) and
    /// `requests_test.json` into `dir`.
    fn write_dataset(dir: &Path) {
        let mut samples = Vec::new();
        for issue in 0..8 {
            for target in issue..=(issue + 4).min(7) {
                samples.push(CapacitySample {
                    issue,
                    target,
                    free: 10.0,
                    free_pred: 10.0,
                    reep: 10.0,
                    reep_pred_expected: 10.0,
                    reep_pred_conservative: 6.0,
                    reep_pred_optimistic: 12.0,
                });
            }
        }
        write_json(&capacity_trace_path(dir, "test", "site"), &samples).unwrap();

        let requests = vec![
            RequestRow { arrival: 0, deadline: 2, size: 8.0 },
            RequestRow { arrival: 1, deadline: 3, size: 35.0 },
            RequestRow { arrival: 2, deadline: 6, size: 4.0 },
        ];
        write_json(&requests_path(dir, "test"), &requests).unwrap();
    }

    fn config(data: &Path, out: &Path) -> ExperimentConfig {
        let mut policies = BTreeMap::new();
        policies.insert("expected".to_string(), PolicyConfig::strict(RiskScenario::Expected));
        policies.insert(
            "best_effort".to_string(),
            PolicyConfig::best_effort(RiskScenario::Expected),
        );
        ExperimentConfig {
            data_dir: data.to_path_buf(),
            output_dir: out.to_path_buf(),
            run_window: None,
            steps_per_hour: 6.0,
            scenarios: vec!["test".to_string()],
            sites: vec!["site".to_string()],
            policies,
        }
    }

    #[test]
    fn matrix_is_scenario_site_policy_ordered() {
        let mut cfg = ExperimentConfig::default_config();
        cfg.scenarios = vec!["a".into(), "b".into()];
        cfg.sites = vec!["x".into()];
        let specs = run_matrix(&cfg);

        assert_eq!(specs.len(), cfg.run_count());
        assert_eq!(specs[0].label(), "a/x/all_free");
        assert_eq!(specs.last().unwrap().label(), "b/x/oracle");
    }

    #[test]
    fn summary_line_format() {
        let summary = RunSummary {
            on_time: 10,
            late: 1,
            rejected: 3,
            missed: 2,
            grid_powered: 27.4,
            ..RunSummary::default()
        };
        assert_eq!(
            summary_line("Expected", &summary, 6.0),
            "Expected: Success/Rejected/Miss: 10/3/3 at 4.57 unit-hours powered by grid energy"
        );
        assert_eq!(
            summary_line("Expected", &summary, 1.0),
            "Expected: Success/Rejected/Miss: 10/3/3 at 27.40 unit-hours powered by grid energy"
        );
    }

    #[test]
    fn execute_run_writes_both_outputs() {
        let data = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        write_dataset(data.path());
        let cfg = config(data.path(), out.path());

        let spec = run_matrix(&cfg)
            .into_iter()
            .find(|s| s.policy_name == "expected")
            .unwrap();
        let outcome = execute_run(&spec, &cfg).unwrap();

        // 35 units cannot fit in 3 steps of 10 green
        assert_eq!(outcome.summary.on_time, 2);
        assert_eq!(outcome.summary.rejected, 1);

        let steps: Vec<serde_json::Value> = serde_json::from_str(
            &std::fs::read_to_string(out.path().join("u_test_site_expected.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(steps.len(), outcome.steps);
        assert!(steps[0].get("u_used").is_some());

        let jobs: Vec<serde_json::Value> = serde_json::from_str(
            &std::fs::read_to_string(out.path().join("jobs_test_site_expected.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(jobs.len(), 3);
        assert_eq!(jobs[1]["status"], "REJECTED");
    }

    #[test]
    fn missing_data_is_a_run_error() {
        let out = tempfile::tempdir().unwrap();
        let cfg = config(Path::new("/nonexistent"), out.path());
        let spec = run_matrix(&cfg).remove(0);

        let err = execute_run(&spec, &cfg).unwrap_err();
        assert_eq!(err.scenario, "test");
        assert!(err.to_string().contains("Cannot open data file"));
        assert!(format!("{:#}", err.cause).contains("/nonexistent"));
    }

    #[tokio::test]
    async fn run_all_isolates_failures_and_keeps_order() {
        let data = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        write_dataset(data.path());
        let mut cfg = config(data.path(), out.path());
        cfg.sites.push("nowhere".to_string());

        let specs = run_matrix(&cfg);
        let labels: Vec<String> = specs.iter().map(RunSpec::label).collect();
        let results = run_all(specs, Arc::new(cfg), 2).await;

        assert_eq!(results.len(), 4);
        for (label, result) in labels.iter().zip(&results) {
            match result {
                Ok(outcome) => assert_eq!(&outcome.spec.label(), label),
                Err(e) => assert_eq!(e.site, "nowhere"),
            }
        }
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 2);
    }
}
