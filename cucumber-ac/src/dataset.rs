/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Dataset loaders and writers.
//!
//! | file | content |
//! |---|---|
//! | `u_{scenario}_{site}.json` | array of [`CapacitySample`] rows |
//! | `requests_{scenario}.json` | array of [`RequestRow`]s; the id is the row index |
//! | `u_{scenario}_{site}_{policy}.json` | array of step records (output) |
//! | `jobs_{scenario}_{site}_{policy}.json` | array of job records (output) |

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::RunWindow;
use crate::request::Request;
use crate::trace::{CapacitySample, CapacitySource, CapacityTrace};
use crate::Step;

/// One workload request as stored on disk.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RequestRow {
    pub arrival: Step,
    pub deadline: Step,
    pub size: f64,
}

// ── Paths ─────────────────────────────────────────────────────────────────────

pub fn capacity_trace_path(dir: &Path, scenario: &str, site: &str) -> PathBuf {
    dir.join(format!("u_{}_{}.json", scenario, site))
}

pub fn requests_path(dir: &Path, scenario: &str) -> PathBuf {
    dir.join(format!("requests_{}.json", scenario))
}

pub fn steps_output_path(dir: &Path, scenario: &str, site: &str, policy: &str) -> PathBuf {
    dir.join(format!("u_{}_{}_{}.json", scenario, site, policy))
}

pub fn jobs_output_path(dir: &Path, scenario: &str, site: &str, policy: &str) -> PathBuf {
    dir.join(format!("jobs_{}_{}_{}.json", scenario, site, policy))
}

// ── Loaders ───────────────────────────────────────────────────────────────────

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let file = File::open(path)
        .with_context(|| format!("Cannot open data file: {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse JSON file: {}", path.display()))
}

/// Load a capacity trace.
///
/// With a run window, only forecasts issued at or after `window.start` and
/// targeting no later than `window.end + horizon` are kept.
pub fn load_capacity_trace(path: &Path, window: Option<RunWindow>) -> Result<CapacityTrace> {
    let mut samples: Vec<CapacitySample> = read_json(path)?;
    let rows = samples.len();

    if let Some(w) = window {
        let horizon = samples
            .iter()
            .map(|s| s.target.saturating_sub(s.issue))
            .max()
            .unwrap_or(0);
        let last = w.end.saturating_add(horizon);
        samples.retain(|s| s.issue >= w.start && s.target <= last);
        debug!(rows, kept = samples.len(), start = w.start, last, "capacity rows filtered");
    }

    let trace = CapacityTrace::from_samples(samples)
        .with_context(|| format!("Invalid capacity trace: {}", path.display()))?;
    info!(
        path = %path.display(),
        rows,
        issues = trace.issue_count(),
        horizon = trace.horizon(),
        "Capacity trace loaded"
    );
    Ok(trace)
}

/// Load workload requests.
///
/// Ids are row indices in the file, counted before filtering.  With a run
/// window, only rows with `start <= arrival < end` and
/// `deadline < end + horizon` are kept.
///
/// # Errors
/// Unreadable files, invalid JSON and rows with `deadline <= arrival` or
/// `size <= 0`.
pub fn load_requests(path: &Path, window: Option<RunWindow>, horizon: Step) -> Result<Vec<Request>> {
    let rows: Vec<RequestRow> = read_json(path)?;
    let total = rows.len();

    let mut requests = Vec::with_capacity(total);
    for (id, row) in rows.into_iter().enumerate() {
        let request = Request::new(id, row.arrival, row.deadline, row.size)
            .with_context(|| format!("Invalid request row in {}", path.display()))?;
        if let Some(w) = window {
            let in_window = w.start <= request.arrival && request.arrival < w.end;
            if !in_window || request.deadline >= w.end.saturating_add(horizon) {
                continue;
            }
        }
        requests.push(request);
    }

    info!(path = %path.display(), total, kept = requests.len(), "Requests loaded");
    Ok(requests)
}

// ── Writers ───────────────────────────────────────────────────────────────────

/// Write `value` as pretty-printed JSON, creating parent directories.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Cannot create output directory: {}", parent.display()))?;
    }
    let file = File::create(path)
        .with_context(|| format!("Cannot create output file: {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)
        .with_context(|| format!("Failed to write JSON: {}", path.display()))?;
    writer
        .flush()
        .with_context(|| format!("Failed to flush: {}", path.display()))?;
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn json_tempfile(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    fn sample_row(issue: Step, target: Step) -> String {
        format!(
            r#"{{"issue":{},"target":{},"u_free":10.0,"u_free_pred":9.0,"u_reep":4.0,
"u_reep_pred_expected":4.5,"u_reep_pred_conservative":3.0,"u_reep_pred_optimistic":6.0}}"#,
            issue, target
        )
    }

    fn trace_json(steps: Step, horizon: Step) -> String {
        let rows: Vec<String> = (0..steps)
            .flat_map(|i| (i..=(i + horizon).min(steps - 1)).map(move |t| sample_row(i, t)))
            .collect();
        format!("[{}]", rows.join(","))
    }

    // ── Paths ─────────────────────────────────────────────────────────────────

    #[test]
    fn file_names_follow_dataset_convention() {
        let dir = Path::new("data");
        assert_eq!(
            capacity_trace_path(dir, "alibaba", "berlin"),
            PathBuf::from("data/u_alibaba_berlin.json")
        );
        assert_eq!(requests_path(dir, "nyctaxi"), PathBuf::from("data/requests_nyctaxi.json"));
        assert_eq!(
            jobs_output_path(dir, "alibaba", "cdmx", "oracle"),
            PathBuf::from("data/jobs_alibaba_cdmx_oracle.json")
        );
    }

    // ── Capacity trace ────────────────────────────────────────────────────────

    #[test]
    fn load_trace_reads_column_names() {
        let f = json_tempfile(&trace_json(4, 2));
        let trace = load_capacity_trace(f.path(), None).unwrap();

        assert_eq!(trace.horizon(), 2);
        assert_eq!(trace.first_step(), 0);
        assert_eq!(trace.last_step(), 3);
        let forecast = trace.forecast_at(1).unwrap();
        assert_eq!(forecast.len(), 3);
        assert_eq!(forecast[0].reep_pred_optimistic, 6.0);
        assert_eq!(trace.actual_at(2).unwrap().free, 10.0);
    }

    #[test]
    fn run_window_trims_trace() {
        let f = json_tempfile(&trace_json(20, 2));
        let trace = load_capacity_trace(f.path(), Some(RunWindow { start: 5, end: 10 })).unwrap();
        assert_eq!(trace.first_step(), 5);
        assert_eq!(trace.last_step(), 12);
    }

    #[test]
    fn missing_trace_file_is_an_error() {
        assert!(load_capacity_trace(Path::new("/nonexistent/u.json"), None).is_err());
    }

    #[test]
    fn empty_trace_is_an_error() {
        let f = json_tempfile("[]");
        assert!(load_capacity_trace(f.path(), None).is_err());
    }

    // ── Requests ──────────────────────────────────────────────────────────────

    #[test]
    fn request_ids_are_row_indices() {
        let f = json_tempfile(
            r#"[{"arrival":0,"deadline":4,"size":1.5},{"arrival":2,"deadline":3,"size":2.0}]"#,
        );
        let requests = load_requests(f.path(), None, 0).unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].id, 1);
        assert_eq!(requests[1].size, 2.0);
    }

    #[test]
    fn window_filter_keeps_row_ids() {
        let f = json_tempfile(
            r#"[
                {"arrival":1,"deadline":4,"size":1.0},
                {"arrival":5,"deadline":8,"size":1.0},
                {"arrival":9,"deadline":30,"size":1.0},
                {"arrival":10,"deadline":12,"size":1.0}
            ]"#,
        );
        let requests =
            load_requests(f.path(), Some(RunWindow { start: 2, end: 10 }), 6).unwrap();
        let ids: Vec<usize> = requests.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1]);
    }

    #[test]
    fn invalid_request_row_is_an_error() {
        let f = json_tempfile(r#"[{"arrival":3,"deadline":3,"size":1.0}]"#);
        let err = load_requests(f.path(), None, 0).unwrap_err();
        assert!(format!("{:#}", err).contains("deadline"));

        let f = json_tempfile(r#"[{"arrival":1,"deadline":3,"size":-1.0}]"#);
        assert!(load_requests(f.path(), None, 0).is_err());
    }

    // ── Writer ────────────────────────────────────────────────────────────────

    #[test]
    fn write_json_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out.json");
        write_json(&path, &vec![RequestRow { arrival: 0, deadline: 1, size: 1.0 }]).unwrap();

        let back: Vec<RequestRow> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back[0].deadline, 1);
    }
}
