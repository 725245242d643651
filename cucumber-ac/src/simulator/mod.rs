/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Discrete-time execution simulator.
//!
//! [`Simulation`] is the context of one run: it owns the capacity source,
//! the request stream, the ledger, the job table and the metrics collector,
//! and shares nothing with any other run.
//!
//! Each call to [`Simulation::step`] processes one step `t`:
//!
//! ```text
//!  actual_at(t) ──► finalize(t) ──► arrivals ──► re-queues ──► held late work
//!                       │                                             │
//!                       └─ shortfalls ─► re-queue list                ▼
//!                                                  check_step(t) ──► execute(t) ──► StepRecord
//! ```
//!
//! Re-queued work is delivered after the arrivals of the same step and gets
//! no priority over them.  A run always covers every step of the trace, so
//! the step records span the whole trace even after the last job is done.
//!
//! Under [`RiskScenario::AllFree`](crate::policy::RiskScenario::AllFree) the
//! ledger is reconciled against the widened green pool, while the step
//! records keep the actual renewable excess.

pub mod error;

pub use error::SimulationError;

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::admission::{AdmissionController, Decision};
use crate::ledger::ReservationLedger;
use crate::metrics::{MetricsCollector, RunMetrics, StepRecord};
use crate::policy::PolicyConfig;
use crate::request::{Job, JobId, Request, RequestStream};
use crate::trace::{Capacity, CapacitySource};
use crate::Step;

// ── Simulation ────────────────────────────────────────────────────────────────

pub struct Simulation<S: CapacitySource> {
    source: S,
    requests: RequestStream,
    policy: PolicyConfig,
    controller: AdmissionController,
    ledger: ReservationLedger,
    metrics: MetricsCollector,
    jobs: BTreeMap<JobId, Job>,
    /// Late work that found no placement yet; retried every step.
    pending_late: Vec<Request>,
    clock: Step,
    last_step: Step,
    finished: bool,
}

impl<S: CapacitySource> Simulation<S> {
    /// Prepare a run over `source`.  The clock starts at the first step with
    /// an actual sample.
    pub fn new(source: S, requests: Vec<Request>, policy: PolicyConfig) -> Self {
        let clock = source.first_step();
        let last_step = source.last_step();
        Self {
            source,
            requests: RequestStream::new(requests),
            policy,
            controller: AdmissionController::new(policy),
            ledger: ReservationLedger::new(policy.grid_fallback),
            metrics: MetricsCollector::new(),
            jobs: BTreeMap::new(),
            pending_late: Vec::new(),
            clock,
            last_step,
            finished: false,
        }
    }

    pub fn clock(&self) -> Step {
        self.clock
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn ledger(&self) -> &ReservationLedger {
        &self.ledger
    }

    pub fn job(&self, id: JobId) -> Option<&Job> {
        self.jobs.get(&id)
    }

    /// Run to the end and hand over the collected metrics.
    ///
    /// # Errors
    /// [`SimulationError::DataGap`] when the trace misses a needed entry,
    /// [`SimulationError::InvariantViolation`] on a ledger fault.
    pub fn run(mut self) -> Result<RunMetrics, SimulationError> {
        info!(
            first_step = self.clock,
            last_step = self.last_step,
            requests = self.requests.len(),
            risk = %self.policy.risk,
            admission = %self.policy.admission,
            strict_green = self.policy.strict_green,
            "simulation started"
        );
        if self.requests.is_empty() {
            warn!("no requests in this run, recording capacity only");
        }
        if let Some(deadline) = self.requests.last_deadline().filter(|d| *d > self.last_step) {
            warn!(
                last_deadline = deadline,
                last_step = self.last_step,
                "deadlines reach past the end of the trace"
            );
        }
        while !self.finished {
            self.step()?;
        }
        Ok(self.finish())
    }

    /// Process the current step and advance the clock.
    pub fn step(&mut self) -> Result<StepRecord, SimulationError> {
        if self.finished {
            return Err(SimulationError::Finished(self.clock));
        }
        let t = self.clock;
        let actual = self.source.actual_at(t)?;
        let usable = self.policy.risk.usable(actual);

        // ── Reveal + reconcile ────────────────────────────────────────────────
        let requeued = self.reconcile(t, usable);
        let held = std::mem::take(&mut self.pending_late);

        // ── Admission ─────────────────────────────────────────────────────────
        self.admit_arrivals(t)?;
        self.requeue(t, requeued)?;
        for request in held {
            self.place_late(t, request, t)?;
        }

        // ── Execution ─────────────────────────────────────────────────────────
        self.ledger.check_step(t, usable)?;
        let record = self.execute(t, actual, usable);
        self.metrics.record_step(record);

        if t >= self.last_step {
            self.finished = true;
        } else {
            self.clock = t + 1;
        }
        Ok(record)
    }

    // ── Step phases ───────────────────────────────────────────────────────────

    /// Finalize step `t` and turn shortfalls into re-queue requests or
    /// misses.
    fn reconcile(&mut self, t: Step, actual: Capacity) -> Vec<Request> {
        let mut uncovered: BTreeMap<JobId, f64> = BTreeMap::new();
        for shortfall in self.ledger.finalize(t, actual) {
            *uncovered.entry(shortfall.job).or_default() += shortfall.amount;
        }

        let mut requeued = Vec::new();
        for (id, amount) in uncovered {
            let Some(job) = self.jobs.get_mut(&id) else {
                warn!(job = id, step = t, "shortfall for unknown job");
                continue;
            };
            if job.is_terminal() {
                continue;
            }
            if job.request.deadline > t || self.policy.late_completion {
                debug!(job = id, step = t, amount, "re-queueing uncovered work");
                requeued.push(job.request.remainder(amount));
            } else {
                mark_missed(job, &mut self.ledger, t);
            }
        }
        requeued
    }

    fn admit_arrivals(&mut self, t: Step) -> Result<(), SimulationError> {
        for request in self.requests.arrivals_at(t) {
            let decision = self
                .controller
                .decide(&request, t, &mut self.ledger, &self.source)?;
            let job = self
                .jobs
                .entry(request.id)
                .or_insert_with(|| Job::new(request));
            match decision {
                Decision::Accept(schedule) => {
                    if let (Some(start), Some(finish)) = (schedule.start(), schedule.finish()) {
                        job.extend_schedule(start, finish);
                    }
                }
                Decision::Reject(_) => job.reject(),
            }
        }
        Ok(())
    }

    fn requeue(&mut self, t: Step, requeued: Vec<Request>) -> Result<(), SimulationError> {
        let from = t.saturating_add(1);
        for request in requeued {
            let decision = self
                .controller
                .requeue(&request, from, t, &mut self.ledger, &self.source)?;
            match decision {
                Decision::Accept(schedule) => {
                    if let (Some(job), Some(start), Some(finish)) =
                        (self.jobs.get_mut(&request.id), schedule.start(), schedule.finish())
                    {
                        job.extend_schedule(start, finish);
                    }
                }
                Decision::Reject(reason) if self.policy.late_completion => {
                    debug!(job = request.id, step = t, %reason, "falling back to late placement");
                    self.place_late(t, request, from)?;
                }
                Decision::Reject(reason) => {
                    debug!(job = request.id, step = t, %reason, "re-queue rejected");
                    if let Some(job) = self.jobs.get_mut(&request.id) {
                        mark_missed(job, &mut self.ledger, t);
                    }
                }
            }
        }
        Ok(())
    }

    /// Place `request` past its deadline, or hold it for the next step.
    fn place_late(&mut self, t: Step, request: Request, from: Step) -> Result<(), SimulationError> {
        let decision = self
            .controller
            .place_late(&request, from, t, &mut self.ledger, &self.source)?;
        match decision {
            Decision::Accept(schedule) => {
                if let (Some(job), Some(start), Some(finish)) =
                    (self.jobs.get_mut(&request.id), schedule.start(), schedule.finish())
                {
                    job.extend_schedule(start, finish);
                }
            }
            Decision::Reject(_) => {
                debug!(job = request.id, step = t, size = request.size, "late work held");
                self.pending_late.push(request);
            }
        }
        Ok(())
    }

    /// Run the commitments at `t` and build the step record.
    fn execute(&mut self, t: Step, actual: Capacity, usable: Capacity) -> StepRecord {
        let mut per_job: BTreeMap<JobId, (f64, f64)> = BTreeMap::new();
        for c in self.ledger.commitments_at(t) {
            let entry = per_job.entry(c.job).or_default();
            entry.0 += c.green;
            entry.1 += c.grid;
        }

        let mut used_green = 0.0;
        let mut used_grid = 0.0;
        for (id, (green, grid)) in per_job {
            let Some(job) = self.jobs.get_mut(&id) else {
                warn!(job = id, step = t, "commitment for unknown job");
                continue;
            };
            if job.is_terminal() {
                continue;
            }
            used_green += green;
            used_grid += grid;
            if job.credit(t, green, grid) {
                self.ledger.release_job(id, t.saturating_add(1));
                debug!(job = id, step = t, outcome = ?job.outcome, "job completed");
            }
        }

        let used = used_green + used_grid;
        StepRecord {
            step: t,
            free: actual.free,
            reep: actual.reep,
            green_available: usable.green(),
            used,
            used_green,
            used_grid,
            spare: actual.total() - used,
        }
    }

    // ── Termination ───────────────────────────────────────────────────────────

    fn finish(mut self) -> RunMetrics {
        let end = self.clock;
        for job in self.jobs.values_mut().filter(|j| !j.is_terminal()) {
            warn!(
                job = job.id(),
                step = end,
                remaining = job.remaining(),
                reserved = self.ledger.outstanding(job.id()),
                "trace ended before job finished"
            );
            job.miss();
        }
        for request in self.requests.undelivered() {
            warn!(job = request.id, arrival = request.arrival, "request arrives after the trace ends");
            let mut job = Job::new(*request);
            job.reject();
            self.jobs.insert(request.id, job);
        }

        for job in self.jobs.values() {
            self.metrics.record_job(job);
        }
        let metrics = self.metrics.finish();
        let s = &metrics.summary;
        info!(
            end_step = end,
            on_time = s.on_time,
            late = s.late,
            rejected = s.rejected,
            missed = s.missed,
            used_grid = s.used_grid,
            "simulation finished"
        );
        metrics
    }
}

fn mark_missed(job: &mut Job, ledger: &mut ReservationLedger, t: Step) {
    let released = ledger.release_job(job.id(), t);
    warn!(
        job = job.id(),
        step = t,
        deadline = job.request.deadline,
        remaining = job.remaining(),
        released,
        "job missed its deadline"
    );
    job.miss();
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::RiskScenario;
    use crate::request::JobOutcome;
    use crate::trace::{CapacitySample, CapacityTrace};

    /// Free capacity 10 everywhere.  Expected/conservative forecasts are
    /// exact, the optimistic forecast is the constant `optimistic`.
    fn trace(actual_reep: &[f64], optimistic: f64, horizon: Step) -> CapacityTrace {
        let last = actual_reep.len() as Step - 1;
        let mut samples = Vec::new();
        for issue in 0..=last {
            for target in issue..=(issue + horizon).min(last) {
                let reep = actual_reep[target as usize];
                samples.push(CapacitySample {
                    issue,
                    target,
                    free: 10.0,
                    free_pred: 10.0,
                    reep,
                    reep_pred_expected: reep,
                    reep_pred_conservative: reep,
                    reep_pred_optimistic: optimistic,
                });
            }
        }
        CapacityTrace::from_samples(samples).unwrap()
    }

    fn req(id: JobId, arrival: Step, deadline: Step, size: f64) -> Request {
        Request::new(id, arrival, deadline, size).unwrap()
    }

    fn outcome(m: &RunMetrics, id: JobId) -> Option<JobOutcome> {
        m.jobs.iter().find(|j| j.id == id).and_then(|j| j.outcome)
    }

    // ── Scenarios ─────────────────────────────────────────────────────────────

    #[test]
    fn green_request_completes_on_time_without_grid() {
        let sim = Simulation::new(
            trace(&[10.0, 10.0, 10.0], 10.0, 2),
            vec![req(0, 0, 2, 8.0)],
            PolicyConfig::default(),
        );
        let m = sim.run().unwrap();

        assert_eq!(outcome(&m, 0), Some(JobOutcome::CompletedOnTime));
        assert_eq!(m.summary.used_grid, 0.0);
        assert!((m.summary.used_green - 8.0).abs() < 1e-9);
        assert!(m.jobs[0].finish.unwrap() <= 2);
    }

    #[test]
    fn optimistic_shortfall_before_deadline_is_requeued() {
        // Step 5 forecast 10 green, actual 0
        let reep = [10.0, 10.0, 10.0, 10.0, 10.0, 0.0, 10.0, 10.0];
        let sim = Simulation::new(
            trace(&reep, 10.0, 4),
            vec![req(0, 4, 7, 15.0)],
            PolicyConfig::strict(RiskScenario::Optimistic),
        );
        let m = sim.run().unwrap();

        assert_eq!(outcome(&m, 0), Some(JobOutcome::CompletedOnTime));
        assert_eq!(m.jobs[0].finish, Some(6));
        assert_eq!(m.steps.iter().find(|s| s.step == 5).unwrap().used, 0.0);
    }

    #[test]
    fn optimistic_shortfall_at_deadline_is_a_miss() {
        let reep = [10.0, 10.0, 10.0, 10.0, 10.0, 0.0, 10.0, 10.0];
        let sim = Simulation::new(
            trace(&reep, 10.0, 4),
            vec![req(0, 4, 5, 15.0)],
            PolicyConfig::strict(RiskScenario::Optimistic),
        );
        let m = sim.run().unwrap();

        assert_eq!(outcome(&m, 0), Some(JobOutcome::MissedDeadline));
        assert_eq!(m.steps.iter().find(|s| s.step == 5).unwrap().used, 0.0);
        assert!((m.jobs[0].executed_green - 10.0).abs() < 1e-9);
    }

    #[test]
    fn competing_requests_one_accepted_one_rejected() {
        let sim = Simulation::new(
            trace(&[10.0, 0.0], 0.0, 1),
            vec![req(0, 0, 1, 6.0), req(1, 0, 1, 6.0)],
            PolicyConfig::default(),
        );
        let m = sim.run().unwrap();

        assert_eq!(m.summary.on_time, 1);
        assert_eq!(m.summary.rejected, 1);
        assert_eq!(outcome(&m, 0), Some(JobOutcome::CompletedOnTime));
        assert_eq!(outcome(&m, 1), Some(JobOutcome::Rejected));
    }

    #[test]
    fn late_completion_finishes_after_deadline() {
        let sim = Simulation::new(
            trace(&[10.0, 0.0, 0.0, 10.0, 10.0], 10.0, 4),
            vec![req(0, 0, 1, 15.0)],
            PolicyConfig::strict(RiskScenario::Optimistic).with_late_completion(true),
        );
        let m = sim.run().unwrap();

        assert_eq!(outcome(&m, 0), Some(JobOutcome::CompletedLate));
        assert_eq!(m.jobs[0].finish, Some(3));
        assert_eq!(m.summary.late, 1);
    }

    #[test]
    fn all_free_baseline_runs_green_on_grid_powered_capacity() {
        // No renewable excess, but the baseline treats all free capacity as green
        let sim = Simulation::new(
            trace(&[0.0, 0.0, 0.0], 0.0, 2),
            vec![req(0, 0, 2, 12.0)],
            PolicyConfig::strict(RiskScenario::AllFree),
        );
        let m = sim.run().unwrap();

        assert_eq!(outcome(&m, 0), Some(JobOutcome::CompletedOnTime));
        assert_eq!(m.summary.used_grid, 0.0);
        assert!((m.summary.grid_powered - 12.0).abs() < 1e-9);
        assert_eq!(m.steps[0].green_available, 10.0);
    }

    #[test]
    fn naive_policy_admits_one_job_at_a_time() {
        let sim = Simulation::new(
            trace(&[10.0, 10.0, 10.0, 10.0], 0.0, 3),
            vec![req(0, 0, 2, 15.0), req(1, 0, 3, 2.0), req(2, 2, 3, 2.0)],
            PolicyConfig::naive(),
        );
        let m = sim.run().unwrap();

        assert_eq!(outcome(&m, 0), Some(JobOutcome::CompletedOnTime));
        assert_eq!(outcome(&m, 1), Some(JobOutcome::Rejected));
        assert_eq!(outcome(&m, 2), Some(JobOutcome::CompletedOnTime));
    }

    // ── Invariants ────────────────────────────────────────────────────────────

    #[test]
    fn usage_never_exceeds_actual_capacity() {
        let reep: Vec<f64> = (0..24).map(|i| ((i * 7) % 11) as f64).collect();
        let requests: Vec<Request> = (0..30)
            .map(|i| {
                let arrival = (i % 20) as Step;
                req(i, arrival, arrival + 1 + (i % 4) as Step, 1.0 + (i % 5) as f64 * 2.5)
            })
            .collect();
        let mut sim = Simulation::new(
            trace(&reep, 12.0, 6),
            requests,
            PolicyConfig::best_effort(RiskScenario::Optimistic),
        );

        while !sim.is_finished() {
            let r = sim.step().unwrap();
            assert!(r.used_green <= r.green_available + 1e-9, "step {}", r.step);
            assert!(r.used <= r.free + 1e-9, "step {}", r.step);
        }
    }

    #[test]
    fn strict_runs_never_use_grid() {
        let reep: Vec<f64> = (0..24).map(|i| ((i * 5) % 9) as f64).collect();
        let requests: Vec<Request> = (0..20)
            .map(|i| req(i, i as Step, i as Step + 3, 4.0))
            .collect();
        let m = Simulation::new(
            trace(&reep, 8.0, 6),
            requests,
            PolicyConfig::strict(RiskScenario::Optimistic),
        )
        .run()
        .unwrap();

        assert_eq!(m.summary.used_grid, 0.0);
        for j in &m.jobs {
            assert_eq!(j.executed_grid, 0.0);
            if j.outcome == Some(JobOutcome::CompletedOnTime) {
                assert!(j.finish.unwrap() <= j.deadline);
            }
        }
    }

    // ── Termination / failures ────────────────────────────────────────────────

    #[test]
    fn requests_after_trace_end_are_rejected() {
        let m = Simulation::new(
            trace(&[10.0, 10.0, 10.0], 10.0, 2),
            vec![req(0, 0, 2, 1.0), req(1, 9, 12, 1.0)],
            PolicyConfig::default(),
        )
        .run()
        .unwrap();
        assert_eq!(outcome(&m, 1), Some(JobOutcome::Rejected));
        assert_eq!(m.summary.job_count(), 2);
    }

    #[test]
    fn run_records_every_trace_step() {
        let m = Simulation::new(
            trace(&[10.0; 10], 10.0, 3),
            vec![req(0, 0, 2, 1.0)],
            PolicyConfig::default(),
        )
        .run()
        .unwrap();

        assert_eq!(outcome(&m, 0), Some(JobOutcome::CompletedOnTime));
        assert_eq!(m.steps.len(), 10);
        let steps: Vec<Step> = m.steps.iter().map(|s| s.step).collect();
        assert_eq!(steps, (0..10).collect::<Vec<Step>>());
        assert!(m.steps[3..].iter().all(|s| s.used == 0.0 && s.spare == 10.0));
    }

    #[test]
    fn empty_request_stream_still_covers_the_trace() {
        let m = Simulation::new(trace(&[4.0, 6.0, 8.0], 10.0, 2), Vec::new(), PolicyConfig::default())
            .run()
            .unwrap();
        assert_eq!(m.steps.len(), 3);
        assert_eq!(m.summary.job_count(), 0);
    }

    #[test]
    fn missing_forecast_aborts_the_run() {
        // Issue 1 is absent; step 1 still has an actual via issue 0
        let samples: Vec<CapacitySample> = (0..3)
            .map(|target| CapacitySample {
                issue: 0,
                target,
                free: 10.0,
                free_pred: 10.0,
                reep: 10.0,
                reep_pred_expected: 10.0,
                reep_pred_conservative: 10.0,
                reep_pred_optimistic: 10.0,
            })
            .collect();
        let sim = Simulation::new(
            CapacityTrace::from_samples(samples).unwrap(),
            vec![req(0, 1, 2, 1.0)],
            PolicyConfig::default(),
        );
        assert!(matches!(sim.run(), Err(SimulationError::DataGap(_))));
    }

    #[test]
    fn step_after_finish_is_an_error() {
        let mut sim = Simulation::new(trace(&[10.0], 10.0, 0), Vec::new(), PolicyConfig::default());
        sim.step().unwrap();
        assert!(sim.is_finished());
        assert!(matches!(sim.step(), Err(SimulationError::Finished(0))));
    }
}
