/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Workload requests and their working copies.
//!
//! Two types model the two sides of the pipeline:
//!
//! ```text
//! dataset ──► Request ──(admission)──► Job ──(execution)──► JobRecord
//!             ↑ immutable input         ↑ mutable progress    ↑ metrics
//! ```
//!
//! A [`Request`] never changes once read.  Re-queued work after a forecast
//! shortfall is expressed as a *new* `Request` carrying the same id, the same
//! arrival and deadline, and only the uncovered size.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::Step;

/// Identifier of a request, stable across re-queues.
pub type JobId = usize;

/// Executed amounts within this distance of the size count as complete.
const COMPLETION_EPSILON: f64 = 1e-6;

// ── Request ───────────────────────────────────────────────────────────────────

/// A delay-tolerant job request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: JobId,
    pub arrival: Step,
    /// Last step on which the job may still execute.
    pub deadline: Step,
    /// Capacity units required in total.
    pub size: f64,
}

/// A request that cannot exist.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RequestError {
    #[error("request {id}: deadline {deadline} is not after arrival {arrival}")]
    DeadlineNotAfterArrival {
        id: JobId,
        arrival: Step,
        deadline: Step,
    },

    #[error("request {id}: size {size} must be positive")]
    NonPositiveSize { id: JobId, size: f64 },
}

impl Request {
    /// Build a validated request.
    pub fn new(id: JobId, arrival: Step, deadline: Step, size: f64) -> Result<Self, RequestError> {
        if deadline <= arrival {
            return Err(RequestError::DeadlineNotAfterArrival {
                id,
                arrival,
                deadline,
            });
        }
        if !(size > 0.0) {
            return Err(RequestError::NonPositiveSize { id, size });
        }
        Ok(Self {
            id,
            arrival,
            deadline,
            size,
        })
    }

    /// The same job asking again for `size` more units.
    pub fn remainder(&self, size: f64) -> Self {
        Self { size, ..*self }
    }
}

// ── Outcome ───────────────────────────────────────────────────────────────────

/// Terminal state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobOutcome {
    CompletedOnTime,
    CompletedLate,
    Rejected,
    MissedDeadline,
}

impl JobOutcome {
    /// Short status label used in reports.
    pub fn label(self) -> &'static str {
        match self {
            JobOutcome::CompletedOnTime => "SUCCESS",
            JobOutcome::CompletedLate => "LATE",
            JobOutcome::Rejected => "REJECTED",
            JobOutcome::MissedDeadline => "MISS",
        }
    }
}

// ── Job (working copy) ────────────────────────────────────────────────────────

/// Progress of an admitted (or rejected) request during a run.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub request: Request,

    pub executed_green: f64,
    pub executed_grid: f64,

    /// First step with a reservation.  `None` until admitted.
    pub scheduled_start: Option<Step>,
    /// Last step with a reservation.  Moves later when work is re-queued.
    pub scheduled_finish: Option<Step>,
    /// Step on which the last unit was executed.
    pub finished_at: Option<Step>,

    pub outcome: Option<JobOutcome>,
}

impl Job {
    pub fn new(request: Request) -> Self {
        Self {
            request,
            executed_green: 0.0,
            executed_grid: 0.0,
            scheduled_start: None,
            scheduled_finish: None,
            finished_at: None,
            outcome: None,
        }
    }

    pub fn id(&self) -> JobId {
        self.request.id
    }

    pub fn executed(&self) -> f64 {
        self.executed_green + self.executed_grid
    }

    pub fn remaining(&self) -> f64 {
        (self.request.size - self.executed()).max(0.0)
    }

    pub fn is_terminal(&self) -> bool {
        self.outcome.is_some()
    }

    /// Widen the scheduled span to cover `[start, finish]`.
    pub fn extend_schedule(&mut self, start: Step, finish: Step) {
        self.scheduled_start = Some(self.scheduled_start.map_or(start, |s| s.min(start)));
        self.scheduled_finish = Some(self.scheduled_finish.map_or(finish, |f| f.max(finish)));
    }

    /// Credit work executed at `step`.  Returns `true` when this completes
    /// the job; the outcome is set accordingly.
    pub fn credit(&mut self, step: Step, green: f64, grid: f64) -> bool {
        if self.is_terminal() {
            warn!(job = self.id(), step, "credit on a terminal job ignored");
            return false;
        }
        self.executed_green += green;
        self.executed_grid += grid;

        if self.request.size - self.executed() <= COMPLETION_EPSILON {
            self.finished_at = Some(step);
            self.outcome = Some(if step <= self.request.deadline {
                JobOutcome::CompletedOnTime
            } else {
                JobOutcome::CompletedLate
            });
            true
        } else {
            false
        }
    }

    pub fn reject(&mut self) {
        self.outcome = Some(JobOutcome::Rejected);
    }

    pub fn miss(&mut self) {
        self.outcome = Some(JobOutcome::MissedDeadline);
    }
}

// ── RequestStream ─────────────────────────────────────────────────────────────

/// Requests in arrival order, handed out step by step.
#[derive(Debug, Clone, Default)]
pub struct RequestStream {
    requests: Vec<Request>,
    cursor: usize,
}

impl RequestStream {
    /// Sorts by `(arrival, id)` so delivery order is deterministic.
    pub fn new(mut requests: Vec<Request>) -> Self {
        requests.sort_by(|a, b| a.arrival.cmp(&b.arrival).then(a.id.cmp(&b.id)));
        Self {
            requests,
            cursor: 0,
        }
    }

    /// Every not-yet-delivered request with `arrival <= step`.
    ///
    /// Requests that arrived before the first simulated step are delivered on
    /// the first call.
    pub fn arrivals_at(&mut self, step: Step) -> Vec<Request> {
        let start = self.cursor;
        while self.cursor < self.requests.len() && self.requests[self.cursor].arrival <= step {
            self.cursor += 1;
        }
        self.requests[start..self.cursor].to_vec()
    }

    /// Requests that have not been delivered yet.
    pub fn undelivered(&self) -> &[Request] {
        &self.requests[self.cursor..]
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Latest deadline over the whole stream.
    pub fn last_deadline(&self) -> Option<Step> {
        self.requests.iter().map(|r| r.deadline).max()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
