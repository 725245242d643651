/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Placement search over a window of step budgets.
//!
//! Pure: reads the ledger, never writes it.  A *candidate* is a start step
//! `s` in the window such that filling `size` units from `s` onwards, in
//! step order, succeeds and actually uses step `s`.
//!
//! ```text
//! budgets   [ s0 ][ s1 ][ s2 ][ s3 ][ s4 ]
//! start s1        ├─────┼─────┤             candidate (starts at s1)
//! start s2              ├─────┼─────┤       candidate
//! start s3                    ├─────┼── ✗   not enough room
//! ```

use crate::ledger::{Allocation, PlacementMode, ReservationLedger, StepBudget};
use crate::policy::{SearchOrder, TieBreak};
use crate::{Step, CAPACITY_EPSILON};

/// A feasible placement found by [`search`].
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub start: Step,
    /// Offset of `start` in the searched budget slice.
    pub offset: usize,
    pub allocations: Vec<Allocation>,
    /// Smallest green headroom left over in any step the placement touches.
    pub margin: f64,
}

/// Find a placement of `size` units in `budgets`.
///
/// Starts are tried in `order`.  With [`TieBreak::Earliest`] the first
/// feasible start wins; with [`TieBreak::MaxMargin`] every start is tried and
/// the largest margin wins, equal margins going to the earliest start.  A
/// placement that drains one step to zero has margin 0, however much room
/// its other steps keep.
pub fn search(
    ledger: &ReservationLedger,
    budgets: &[StepBudget],
    size: f64,
    mode: PlacementMode,
    order: SearchOrder,
    tie_break: TieBreak,
) -> Option<Candidate> {
    let offsets: Box<dyn Iterator<Item = usize>> = match order {
        SearchOrder::EarliestFirst => Box::new(0..budgets.len()),
        SearchOrder::LatestFirst => Box::new((0..budgets.len()).rev()),
    };

    let mut best: Option<Candidate> = None;
    for offset in offsets {
        let Some(candidate) = try_start(ledger, budgets, offset, size, mode) else {
            continue;
        };
        if tie_break == TieBreak::Earliest {
            return Some(candidate);
        }
        best = match best {
            None => Some(candidate),
            Some(current) if better(&candidate, &current) => Some(candidate),
            keep => keep,
        };
    }
    best
}

/// Total green headroom in `budgets`, ignoring placement shape.
pub fn green_headroom(ledger: &ReservationLedger, budgets: &[StepBudget]) -> f64 {
    budgets.iter().map(|b| ledger.headroom(b).0).sum()
}

/// Total free headroom in `budgets`.
pub fn total_headroom(ledger: &ReservationLedger, budgets: &[StepBudget]) -> f64 {
    budgets.iter().map(|b| ledger.headroom(b).1).sum()
}

fn try_start(
    ledger: &ReservationLedger,
    budgets: &[StepBudget],
    offset: usize,
    size: f64,
    mode: PlacementMode,
) -> Option<Candidate> {
    let window = &budgets[offset..];
    let start = window.first()?.step;
    let allocations = ledger.plan(size, window, mode).ok()?;
    if allocations.first().map(|a| a.step) != Some(start) {
        // The same placement is reachable from a later start.
        return None;
    }

    let margin = allocations
        .iter()
        .filter_map(|a| {
            let budget = window.iter().find(|b| b.step == a.step)?;
            Some((ledger.headroom(budget).0 - a.green).max(0.0))
        })
        .fold(f64::INFINITY, f64::min);

    Some(Candidate {
        start,
        offset,
        allocations,
        margin,
    })
}

fn better(candidate: &Candidate, current: &Candidate) -> bool {
    if candidate.margin > current.margin + CAPACITY_EPSILON {
        return true;
    }
    (candidate.margin - current.margin).abs() <= CAPACITY_EPSILON && candidate.start < current.start
}

// ── Tests ─────────────────────────────────────────────────────────────────────
