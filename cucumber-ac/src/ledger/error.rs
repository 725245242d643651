/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Ledger error types.
//!
//! * [`InsufficientCapacity`]: a placement window cannot hold the request.
//!   The admission controller turns this into a normal rejection.
//! * [`InvariantViolation`]: the ledger holds more than the actual capacity
//!   at a step.  This is a bug in `try_reserve` / `finalize` and is fatal to
//!   the run.

use thiserror::Error;

use crate::Step;

/// Not enough headroom in the window.
#[derive(Debug, Clone, Copy, Error, PartialEq)]
#[error("cannot place {requested:.3} units: only {placeable:.3} units of headroom in the window")]
pub struct InsufficientCapacity {
    pub requested: f64,
    pub placeable: f64,
}

/// Capacity pool named by an [`InvariantViolation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityPool {
    /// `min(free, reep)`
    Green,
    /// `free`
    Total,
}

impl std::fmt::Display for CapacityPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CapacityPool::Green => write!(f, "renewable"),
            CapacityPool::Total => write!(f, "total"),
        }
    }
}

/// Double-booking detected at execution time.
#[derive(Debug, Clone, Copy, Error, PartialEq)]
#[error("step {step}: {reserved:.3} {pool} units committed but only {capacity:.3} available")]
pub struct InvariantViolation {
    pub step: Step,
    pub pool: CapacityPool,
    pub reserved: f64,
    pub capacity: f64,
}
