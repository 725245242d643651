/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Admission policy knobs.
//!
//! A [`PolicyConfig`] is fixed for a whole run.  In particular the risk
//! scenario is chosen once when the admission controller is built, never per
//! request.

use serde::{Deserialize, Serialize};

use crate::trace::{Capacity, CapacitySample};

// ── Risk scenario ─────────────────────────────────────────────────────────────

/// Which renewable-excess forecast the admission controller plans against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskScenario {
    /// `u_reep_pred_expected`
    #[default]
    Expected,
    /// `u_reep_pred_conservative`
    Conservative,
    /// `u_reep_pred_optimistic`
    Optimistic,
    /// Oracle baseline: the forecast is the actual value.
    Perfect,
    /// Capacity baseline: actual values, and every unit of free capacity
    /// counts as renewable.
    AllFree,
}

impl RiskScenario {
    /// Predicted `(free, reep)` for the sample's target step under this
    /// scenario.
    pub fn forecast(self, sample: &CapacitySample) -> Capacity {
        match self {
            RiskScenario::Expected => Capacity::new(sample.free_pred, sample.reep_pred_expected),
            RiskScenario::Conservative => {
                Capacity::new(sample.free_pred, sample.reep_pred_conservative)
            }
            RiskScenario::Optimistic => {
                Capacity::new(sample.free_pred, sample.reep_pred_optimistic)
            }
            RiskScenario::Perfect | RiskScenario::AllFree => self.usable(sample.actual()),
        }
    }

    /// The capacity this scenario may treat as renewable, given `actual`.
    ///
    /// Only [`RiskScenario::AllFree`] widens the green pool to the whole free
    /// capacity; every other scenario returns `actual` unchanged.
    pub fn usable(self, actual: Capacity) -> Capacity {
        match self {
            RiskScenario::AllFree => Capacity::new(actual.free, actual.free),
            _ => actual,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RiskScenario::Expected => "expected",
            RiskScenario::Conservative => "conservative",
            RiskScenario::Optimistic => "optimistic",
            RiskScenario::Perfect => "perfect",
            RiskScenario::AllFree => "all_free",
        }
    }
}

impl std::fmt::Display for RiskScenario {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Search order / tie-break ──────────────────────────────────────────────────

/// Order in which candidate start steps are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchOrder {
    /// Prefer prompt execution.
    #[default]
    EarliestFirst,
    /// Prefer the latest start that still fits (latest-green-first).
    LatestFirst,
}

/// How to choose among feasible placements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// Take the first feasible placement in search order.
    #[default]
    Earliest,
    /// Take the placement whose tightest touched step keeps the most forecast
    /// green headroom; equal margins go to the earliest start.
    MaxMargin,
}

// ── Admission mode ────────────────────────────────────────────────────────────

/// How arrivals are screened before placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionMode {
    /// Plan against the forecast issued at the arrival step.
    #[default]
    Planned,
    /// No forecasts.  Accept only while the node has nothing queued past the
    /// current step and green headroom exists right now; future steps are
    /// assumed to look like the current one.
    Naive,
}

impl std::fmt::Display for AdmissionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AdmissionMode::Planned => f.write_str("planned"),
            AdmissionMode::Naive => f.write_str("naive"),
        }
    }
}

// ── PolicyConfig ──────────────────────────────────────────────────────────────

/// Complete admission policy for one run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PolicyConfig {
    pub risk: RiskScenario,
    pub admission: AdmissionMode,

    /// Only accept requests that fit on renewable-excess capacity.  When
    /// `false`, a request with no green placement may fall back to grid
    /// capacity before its deadline.
    pub strict_green: bool,

    pub tie_break: TieBreak,
    pub search_order: SearchOrder,

    /// Keep running a job after its deadline instead of dropping it.
    pub late_completion: bool,

    /// Let reconciliation cover a renewable shortfall with grid capacity.
    pub grid_fallback: bool,
}

impl PolicyConfig {
    /// Green-only admission; shortfalls are re-queued, never covered by grid.
    pub fn strict(risk: RiskScenario) -> Self {
        Self {
            risk,
            admission: AdmissionMode::Planned,
            strict_green: true,
            tie_break: TieBreak::Earliest,
            search_order: SearchOrder::EarliestFirst,
            late_completion: false,
            grid_fallback: false,
        }
    }

    /// Green first, grid when no green placement exists before the deadline.
    pub fn best_effort(risk: RiskScenario) -> Self {
        Self {
            strict_green: false,
            grid_fallback: true,
            ..Self::strict(risk)
        }
    }

    /// Forecast-free baseline: naive screening, grid allowed.
    pub fn naive() -> Self {
        Self::best_effort(RiskScenario::Expected).with_admission(AdmissionMode::Naive)
    }

    pub fn with_admission(mut self, admission: AdmissionMode) -> Self {
        self.admission = admission;
        self
    }

    pub fn with_tie_break(mut self, tie_break: TieBreak) -> Self {
        self.tie_break = tie_break;
        self
    }

    pub fn with_search_order(mut self, search_order: SearchOrder) -> Self {
        self.search_order = search_order;
        self
    }

    pub fn with_late_completion(mut self, late_completion: bool) -> Self {
        self.late_completion = late_completion;
        self
    }

    /// Built-in policy set used when an experiment file lists none.
    pub fn presets() -> Vec<(&'static str, PolicyConfig)> {
        vec![
            ("all_free", Self::strict(RiskScenario::AllFree)),
            ("oracle", Self::strict(RiskScenario::Perfect)),
            ("naive", Self::naive()),
            ("expected", Self::strict(RiskScenario::Expected)),
            ("conservative", Self::strict(RiskScenario::Conservative)),
            ("optimistic", Self::strict(RiskScenario::Optimistic)),
        ]
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self::strict(RiskScenario::Expected)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
