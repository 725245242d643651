/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Capacity trace provider.
//!
//! A capacity trace is a set of [`CapacitySample`]s keyed by
//! `(issue, target)`: the forecast issued at step `issue` for step `target`,
//! together with the actual values that were later observed at `target`.
//!
//! ```text
//! issue 10 ──► target 10  11  12  ...  10+H
//! issue 11 ──►     target 11  12  13  ...  11+H
//! ```
//!
//! The simulator reads the trace through the [`CapacitySource`] trait:
//! `forecast_at(t)` for the look-ahead the admission controller plans
//! against, `actual_at(t)` for the ground truth revealed when the clock
//! reaches `t`.  Missing entries are reported as
//! [`TraceError::DataGap`]; the provider never interpolates.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::Step;

// ── Samples ───────────────────────────────────────────────────────────────────

/// One forecast result: what was predicted at `issue` for `target`, and what
/// actually happened at `target`.
///
/// Field names on the wire follow the dataset column names (`u_free`,
/// `u_reep_pred_expected`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CapacitySample {
    /// Step at which the forecast was issued.
    pub issue: Step,
    /// Step the forecast is about (`target >= issue`).
    pub target: Step,

    /// Actual spare capacity at `target`.
    #[serde(rename = "u_free")]
    pub free: f64,
    /// Forecast of `free`.
    #[serde(rename = "u_free_pred")]
    pub free_pred: f64,

    /// Actual capacity that can be powered by renewable excess energy.
    #[serde(rename = "u_reep")]
    pub reep: f64,
    #[serde(rename = "u_reep_pred_expected")]
    pub reep_pred_expected: f64,
    #[serde(rename = "u_reep_pred_conservative")]
    pub reep_pred_conservative: f64,
    #[serde(rename = "u_reep_pred_optimistic")]
    pub reep_pred_optimistic: f64,
}

impl CapacitySample {
    /// The actual values observed at `target`.
    pub fn actual(&self) -> Capacity {
        Capacity::new(self.free, self.reep)
    }
}

/// A `(free, reep)` pair, observed or predicted.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Capacity {
    pub free: f64,
    pub reep: f64,
}

impl Capacity {
    pub fn new(free: f64, reep: f64) -> Self {
        Self { free, reep }
    }

    /// Free capacity that can actually run on renewable excess power:
    /// `min(free, reep)`, never negative.
    pub fn green(&self) -> f64 {
        self.free.min(self.reep).max(0.0)
    }

    /// Free capacity, never negative.
    pub fn total(&self) -> f64 {
        self.free.max(0.0)
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Which half of the trace a [`TraceError::DataGap`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GapKind {
    Forecast,
    Actual,
}

impl std::fmt::Display for GapKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GapKind::Forecast => write!(f, "forecast"),
            GapKind::Actual => write!(f, "actual"),
        }
    }
}

/// Errors raised while building or reading a capacity trace.
///
/// `DataGap` is fatal to a simulation run: it means the experiment was
/// configured against a trace that does not cover it.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TraceError {
    #[error("no {kind} entry in the capacity trace for step {step}")]
    DataGap { kind: GapKind, step: Step },

    #[error("capacity trace contains no samples")]
    Empty,

    #[error("forecast issued at step {issue} targets earlier step {target}")]
    TargetBeforeIssue { issue: Step, target: Step },

    #[error("forecast issued at step {issue} has a gap: expected target {expected}, found {found}")]
    NonContiguous {
        issue: Step,
        expected: Step,
        found: Step,
    },

    #[error("samples disagree on the actual capacity at step {step}")]
    ConflictingActual { step: Step },
}

// ── Provider contract ─────────────────────────────────────────────────────────

/// Read-only access to actual and forecast capacity.
pub trait CapacitySource {
    /// Samples issued at `step`, ordered by target and gap-free.
    fn forecast_at(&self, step: Step) -> Result<&[CapacitySample], TraceError>;

    /// Ground truth at `step`.
    fn actual_at(&self, step: Step) -> Result<Capacity, TraceError>;

    /// Longest look-ahead (`target - issue`) of any forecast in the trace.
    fn horizon(&self) -> Step;

    /// First step with an actual value.
    fn first_step(&self) -> Step;

    /// Last step with an actual value.
    fn last_step(&self) -> Step;
}

// ── In-memory trace ───────────────────────────────────────────────────────────

/// A fully loaded capacity trace.
#[derive(Debug, Clone)]
pub struct CapacityTrace {
    forecasts: BTreeMap<Step, Vec<CapacitySample>>,
    actuals: BTreeMap<Step, Capacity>,
    horizon: Step,
}

impl CapacityTrace {
    /// Build a trace from raw samples in any order.
    ///
    /// # Errors
    /// * [`TraceError::Empty`] – no samples.
    /// * [`TraceError::TargetBeforeIssue`] – a forecast looks into the past.
    /// * [`TraceError::NonContiguous`] – an issue group skips a target step.
    /// * [`TraceError::ConflictingActual`] – two samples for the same target
    ///   disagree on `free` / `reep`.
    pub fn from_samples(samples: Vec<CapacitySample>) -> Result<Self, TraceError> {
        if samples.is_empty() {
            return Err(TraceError::Empty);
        }

        let mut forecasts: BTreeMap<Step, Vec<CapacitySample>> = BTreeMap::new();
        let mut actuals: BTreeMap<Step, Capacity> = BTreeMap::new();

        for sample in samples {
            if sample.target < sample.issue {
                return Err(TraceError::TargetBeforeIssue {
                    issue: sample.issue,
                    target: sample.target,
                });
            }

            let actual = sample.actual();
            match actuals.get(&sample.target) {
                Some(seen) if !same_capacity(seen, &actual) => {
                    return Err(TraceError::ConflictingActual {
                        step: sample.target,
                    });
                }
                Some(_) => {}
                None => {
                    actuals.insert(sample.target, actual);
                }
            }

            forecasts.entry(sample.issue).or_default().push(sample);
        }

        let mut horizon = 0;
        for (issue, group) in forecasts.iter_mut() {
            group.sort_by_key(|s| s.target);
            for pair in group.windows(2) {
                if pair[1].target != pair[0].target + 1 {
                    return Err(TraceError::NonContiguous {
                        issue: *issue,
                        expected: pair[0].target + 1,
                        found: pair[1].target,
                    });
                }
            }
            if let Some(last) = group.last() {
                horizon = horizon.max(last.target - issue);
            }
        }

        debug!(
            issues = forecasts.len(),
            actuals = actuals.len(),
            horizon,
            "capacity trace built"
        );

        Ok(Self {
            forecasts,
            actuals,
            horizon,
        })
    }

    /// Build a trace whose forecasts are exact: every scenario predicts the
    /// actual value.  Step `i` of `actuals` becomes step `i` of the trace and
    /// each issue step forecasts `horizon` steps ahead (clipped to the end).
    pub fn from_actuals(actuals: &[Capacity], horizon: Step) -> Result<Self, TraceError> {
        let last = actuals.len() as Step;
        let mut samples = Vec::new();
        for issue in 0..last {
            let end = issue.saturating_add(horizon).min(last - 1);
            for target in issue..=end {
                let a = actuals[target as usize];
                samples.push(CapacitySample {
                    issue,
                    target,
                    free: a.free,
                    free_pred: a.free,
                    reep: a.reep,
                    reep_pred_expected: a.reep,
                    reep_pred_conservative: a.reep,
                    reep_pred_optimistic: a.reep,
                });
            }
        }
        Self::from_samples(samples)
    }

    /// Number of issue steps in the trace.
    pub fn issue_count(&self) -> usize {
        self.forecasts.len()
    }
}

impl CapacitySource for CapacityTrace {
    fn forecast_at(&self, step: Step) -> Result<&[CapacitySample], TraceError> {
        self.forecasts
            .get(&step)
            .map(Vec::as_slice)
            .ok_or(TraceError::DataGap {
                kind: GapKind::Forecast,
                step,
            })
    }

    fn actual_at(&self, step: Step) -> Result<Capacity, TraceError> {
        self.actuals
            .get(&step)
            .copied()
            .ok_or(TraceError::DataGap {
                kind: GapKind::Actual,
                step,
            })
    }

    fn horizon(&self) -> Step {
        self.horizon
    }

    fn first_step(&self) -> Step {
        self.actuals.keys().next().copied().unwrap_or(0)
    }

    fn last_step(&self) -> Step {
        self.actuals.keys().next_back().copied().unwrap_or(0)
    }
}

fn same_capacity(a: &Capacity, b: &Capacity) -> bool {
    (a.free - b.free).abs() <= crate::CAPACITY_EPSILON
        && (a.reep - b.reep).abs() <= crate::CAPACITY_EPSILON
}

// ── Tests ─────────────────────────────────────────────────────────────────────
