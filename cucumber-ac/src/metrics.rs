/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Run metrics.
//!
//! [`MetricsCollector`] is a pure sink: the simulator pushes one
//! [`StepRecord`] per step and one [`JobRecord`] per job, and takes the
//! buffered result back as [`RunMetrics`] when the run ends.

use serde::Serialize;

use crate::request::{Job, JobId, JobOutcome};
use crate::Step;

// ── Records ───────────────────────────────────────────────────────────────────

/// Capacity usage at one step.  Field names follow the trace columns.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StepRecord {
    pub step: Step,
    #[serde(rename = "u_free")]
    pub free: f64,
    #[serde(rename = "u_reep")]
    pub reep: f64,
    /// `min(free, reep)`
    #[serde(rename = "u_freep")]
    pub green_available: f64,
    #[serde(rename = "u_used")]
    pub used: f64,
    pub used_green: f64,
    pub used_grid: f64,
    /// `free - used`
    pub spare: f64,
}

impl StepRecord {
    /// Usage above the renewable supply, `max(used - reep, 0)`.
    pub fn grid_powered(&self) -> f64 {
        (self.used - self.reep).max(0.0)
    }
}

/// Final state of one job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobRecord {
    pub id: JobId,
    /// `SUCCESS`, `LATE`, `REJECTED` or `MISS`.
    pub status: &'static str,
    pub size: f64,
    pub arrival: Step,
    pub scheduled_start: Option<Step>,
    /// Last step the job held a reservation for.
    pub scheduled_finish: Option<Step>,
    pub finish: Option<Step>,
    pub deadline: Step,
    pub outcome: Option<JobOutcome>,
    pub executed_green: f64,
    pub executed_grid: f64,
}

impl From<&Job> for JobRecord {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id(),
            status: job.outcome.map_or("PENDING", JobOutcome::label),
            size: job.request.size,
            arrival: job.request.arrival,
            scheduled_start: job.scheduled_start,
            scheduled_finish: job.scheduled_finish,
            finish: job.finished_at,
            deadline: job.request.deadline,
            outcome: job.outcome,
            executed_green: job.executed_green,
            executed_grid: job.executed_grid,
        }
    }
}

// ── Summary ───────────────────────────────────────────────────────────────────

/// Per-run totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub on_time: usize,
    pub late: usize,
    pub rejected: usize,
    pub missed: usize,
    pub total_used: f64,
    pub used_green: f64,
    /// Usage drawn from the grid reservation pool.
    pub used_grid: f64,
    /// `Σ max(used - reep, 0)` over all steps.
    pub grid_powered: f64,
}

impl RunSummary {
    fn from_records(steps: &[StepRecord], jobs: &[JobRecord]) -> Self {
        let mut summary = RunSummary::default();
        for s in steps {
            summary.total_used += s.used;
            summary.used_green += s.used_green;
            summary.used_grid += s.used_grid;
            summary.grid_powered += s.grid_powered();
        }
        for j in jobs {
            match j.outcome {
                Some(JobOutcome::CompletedOnTime) => summary.on_time += 1,
                Some(JobOutcome::CompletedLate) => summary.late += 1,
                Some(JobOutcome::Rejected) => summary.rejected += 1,
                Some(JobOutcome::MissedDeadline) | None => summary.missed += 1,
            }
        }
        summary
    }

    pub fn job_count(&self) -> usize {
        self.on_time + self.late + self.rejected + self.missed
    }
}

/// Everything a run produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunMetrics {
    pub steps: Vec<StepRecord>,
    pub jobs: Vec<JobRecord>,
    pub summary: RunSummary,
}

// ── Collector ─────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MetricsCollector {
    steps: Vec<StepRecord>,
    jobs: Vec<JobRecord>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_step(&mut self, record: StepRecord) {
        self.steps.push(record);
    }

    pub fn record_job(&mut self, job: &Job) {
        self.jobs.push(JobRecord::from(job));
    }

    /// Hand the buffered records over; job records are ordered by id.
    pub fn finish(mut self) -> RunMetrics {
        self.jobs.sort_by_key(|j| j.id);
        let summary = RunSummary::from_records(&self.steps, &self.jobs);
        RunMetrics {
            steps: self.steps,
            jobs: self.jobs,
            summary,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
