/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Reservation ledger.
//!
//! Tracks, per step, how much capacity admitted jobs have already claimed,
//! split into a renewable (green) and a grid part.  Two regions:
//!
//! ```text
//!            history (immutable)  │  forward (mutable)
//!   ... t-3   t-2   t-1           │  t   t+1   t+2  ...
//!                                 ▲
//!                           finalize(t)
//! ```
//!
//! * [`ReservationLedger::try_reserve`] places a request's size across a
//!   window of [`StepBudget`]s, green first, and commits all of it or none.
//! * [`ReservationLedger::finalize`] moves elapsed steps to history and
//!   re-grants the commitments at `t` against the actual sample, reporting
//!   whatever no longer fits as a [`Shortfall`].
//!
//! The simulation loop is the only writer; the ledger is mutated
//! only through `&mut self`.

pub mod error;

pub use error::{CapacityPool, InsufficientCapacity, InvariantViolation};

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::request::{JobId, Request};
use crate::trace::Capacity;
use crate::{Step, CAPACITY_EPSILON};

// ── Placement inputs / outputs ────────────────────────────────────────────────

/// Absolute capacity bound for one step of a placement window.
///
/// The ledger subtracts what is already committed at `step` to obtain the
/// headroom.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepBudget {
    pub step: Step,
    /// Capacity that may run on renewable excess power.
    pub green: f64,
    /// Total free capacity (green + grid).
    pub total: f64,
}

impl StepBudget {
    pub fn from_capacity(step: Step, capacity: Capacity) -> Self {
        Self {
            step,
            green: capacity.green(),
            total: capacity.total(),
        }
    }
}

/// Which pools a placement may draw from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementMode {
    GreenOnly,
    GreenThenGrid,
}

/// Capacity claimed at one step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Allocation {
    pub step: Step,
    pub green: f64,
    pub grid: f64,
}

impl Allocation {
    pub fn amount(&self) -> f64 {
        self.green + self.grid
    }
}

/// A committed set of allocations owned by one job.
#[derive(Debug, Clone, PartialEq)]
pub struct Reservation {
    pub job: JobId,
    pub allocations: Vec<Allocation>,
}

impl Reservation {
    pub fn start(&self) -> Option<Step> {
        self.allocations.first().map(|a| a.step)
    }

    pub fn finish(&self) -> Option<Step> {
        self.allocations.last().map(|a| a.step)
    }

    pub fn green(&self) -> f64 {
        self.allocations.iter().map(|a| a.green).sum()
    }

    pub fn grid(&self) -> f64 {
        self.allocations.iter().map(|a| a.grid).sum()
    }

    pub fn total(&self) -> f64 {
        self.green() + self.grid()
    }
}

/// One job's claim at one step, as stored in the ledger.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Commitment {
    pub job: JobId,
    /// Used to order re-grants during reconciliation (earliest first).
    pub deadline: Step,
    pub green: f64,
    pub grid: f64,
}

impl Commitment {
    pub fn amount(&self) -> f64 {
        self.green + self.grid
    }
}

/// Capacity a job was promised at `step` but cannot get.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Shortfall {
    pub job: JobId,
    pub step: Step,
    pub amount: f64,
}

// ── ReservationLedger ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReservationLedger {
    forward: BTreeMap<Step, Vec<Commitment>>,
    history: BTreeMap<Step, Vec<Commitment>>,
    /// First mutable step.  Everything earlier is history.
    now: Step,
    /// Cover a renewable shortfall with grid capacity during `finalize`.
    grid_fallback: bool,
}

impl ReservationLedger {
    pub fn new(grid_fallback: bool) -> Self {
        Self {
            grid_fallback,
            ..Self::default()
        }
    }

    /// Committed `(green, total)` at `step`, from history if it has elapsed.
    pub fn reserved_at(&self, step: Step) -> (f64, f64) {
        let region = if step < self.now {
            &self.history
        } else {
            &self.forward
        };
        region
            .get(&step)
            .map(|cs| {
                cs.iter().fold((0.0, 0.0), |(g, t), c| (g + c.green, t + c.amount()))
            })
            .unwrap_or((0.0, 0.0))
    }

    /// Commitments at `step` (forward or history).
    pub fn commitments_at(&self, step: Step) -> &[Commitment] {
        let region = if step < self.now {
            &self.history
        } else {
            &self.forward
        };
        region.get(&step).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Green and total headroom left at `budget.step`.
    pub fn headroom(&self, budget: &StepBudget) -> (f64, f64) {
        if budget.step < self.now {
            return (0.0, 0.0);
        }
        let (green_used, total_used) = self.reserved_at(budget.step);
        let total = (budget.total - total_used).max(0.0);
        let green = (budget.green - green_used).max(0.0).min(total);
        (green, total)
    }

    /// Compute where `size` units would go across `budgets` without
    /// committing anything.
    ///
    /// Steps are filled in budget order.  At each step green headroom is
    /// used first; in [`PlacementMode::GreenThenGrid`] the remaining free
    /// headroom is used next.
    ///
    /// # Errors
    /// [`InsufficientCapacity`] when the window cannot hold `size`.
    pub fn plan(
        &self,
        size: f64,
        budgets: &[StepBudget],
        mode: PlacementMode,
    ) -> Result<Vec<Allocation>, InsufficientCapacity> {
        let mut remaining = size;
        let mut allocations = Vec::new();

        for budget in budgets {
            if remaining <= CAPACITY_EPSILON {
                break;
            }
            let (green_room, total_room) = self.headroom(budget);

            let green = green_room.min(remaining);
            remaining -= green;

            let grid = match mode {
                PlacementMode::GreenOnly => 0.0,
                PlacementMode::GreenThenGrid => {
                    let g = (total_room - green).max(0.0).min(remaining);
                    remaining -= g;
                    g
                }
            };

            if green + grid > CAPACITY_EPSILON {
                allocations.push(Allocation {
                    step: budget.step,
                    green,
                    grid,
                });
            }
        }

        if remaining > CAPACITY_EPSILON {
            return Err(InsufficientCapacity {
                requested: size,
                placeable: size - remaining,
            });
        }
        Ok(allocations)
    }

    /// Place `request.size` units across `budgets` and commit them to
    /// `request.id`.
    ///
    /// Atomic: on error the ledger is unchanged.
    pub fn try_reserve(
        &mut self,
        request: &Request,
        budgets: &[StepBudget],
        mode: PlacementMode,
    ) -> Result<Reservation, InsufficientCapacity> {
        let allocations = self.plan(request.size, budgets, mode)?;

        for a in &allocations {
            self.forward.entry(a.step).or_default().push(Commitment {
                job: request.id,
                deadline: request.deadline,
                green: a.green,
                grid: a.grid,
            });
        }

        debug!(
            job = request.id,
            size = request.size,
            steps = allocations.len(),
            ?mode,
            "reservation committed"
        );

        Ok(Reservation {
            job: request.id,
            allocations,
        })
    }

    /// Reconcile the commitments at `step` with the revealed `actual`.
    ///
    /// 1. Every forward step before `step` becomes history.
    /// 2. Commitments at `step` are re-granted in deadline order against
    ///    `min(free, reep)` green and `free` total capacity.
    /// 3. Green that no longer fits moves to grid when grid fallback is on
    ///    and headroom remains; anything still uncovered is cut and reported.
    ///
    /// Calling this twice with the same arguments is a no-op the second time.
    pub fn finalize(&mut self, step: Step, actual: Capacity) -> Vec<Shortfall> {
        let later = self.forward.split_off(&step);
        let elapsed = std::mem::replace(&mut self.forward, later);
        self.history.extend(elapsed);
        self.now = self.now.max(step);

        let Some(commitments) = self.forward.get_mut(&step) else {
            return Vec::new();
        };

        commitments.sort_by(|a, b| a.deadline.cmp(&b.deadline).then(a.job.cmp(&b.job)));

        let mut green_left = actual.green();
        let mut total_left = actual.total();
        let mut shortfalls = Vec::new();

        for c in commitments.iter_mut() {
            let green = c.green.min(green_left).min(total_left);
            green_left -= green;
            total_left -= green;

            let mut missing = c.green - green;
            let mut grid_wanted = c.grid;
            if self.grid_fallback {
                grid_wanted += missing;
                missing = 0.0;
            }
            let grid = grid_wanted.min(total_left).max(0.0);
            total_left -= grid;
            missing += grid_wanted - grid;

            if (c.green - green).abs() > CAPACITY_EPSILON || (c.grid - grid).abs() > CAPACITY_EPSILON {
                debug!(
                    job = c.job,
                    step,
                    green_before = c.green,
                    green_after = green,
                    grid_before = c.grid,
                    grid_after = grid,
                    "commitment re-granted"
                );
            }
            c.green = green;
            c.grid = grid;

            if missing > CAPACITY_EPSILON {
                warn!(job = c.job, step, amount = missing, "capacity shortfall");
                shortfalls.push(Shortfall {
                    job: c.job,
                    step,
                    amount: missing,
                });
            }
        }

        commitments.retain(|c| c.amount() > CAPACITY_EPSILON);
        if commitments.is_empty() {
            self.forward.remove(&step);
        }

        shortfalls
    }

    /// Drop every forward commitment of `job` at or after `from`.  Returns
    /// the released amount.
    pub fn release_job(&mut self, job: JobId, from: Step) -> f64 {
        let from = from.max(self.now);
        let mut released = 0.0;
        for commitments in self.forward.range_mut(from..).map(|(_, cs)| cs) {
            commitments.retain(|c| {
                if c.job == job {
                    released += c.amount();
                    false
                } else {
                    true
                }
            });
        }
        self.forward.retain(|_, cs| !cs.is_empty());
        if released > 0.0 {
            debug!(job, from, released, "forward commitments released");
        }
        released
    }

    /// Verify that the commitments at `step` fit within `actual`.
    ///
    /// # Errors
    /// [`InvariantViolation`] naming the overbooked pool.  This is a logic
    /// fault, never a data condition.
    pub fn check_step(&self, step: Step, actual: Capacity) -> Result<(), InvariantViolation> {
        let (green, total) = self.reserved_at(step);
        if green > actual.green() + CAPACITY_EPSILON {
            return Err(InvariantViolation {
                step,
                pool: CapacityPool::Green,
                reserved: green,
                capacity: actual.green(),
            });
        }
        if total > actual.total() + CAPACITY_EPSILON {
            return Err(InvariantViolation {
                step,
                pool: CapacityPool::Total,
                reserved: total,
                capacity: actual.total(),
            });
        }
        Ok(())
    }

    /// `true` when nothing is committed to any step after `step`.
    pub fn is_idle_after(&self, step: Step) -> bool {
        self.forward.range(step.saturating_add(1)..).next().is_none()
    }

    /// Total forward amount still committed to `job`.
    pub fn outstanding(&self, job: JobId) -> f64 {
        self.forward
            .values()
            .flatten()
            .filter(|c| c.job == job)
            .map(Commitment::amount)
            .sum()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
