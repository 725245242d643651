/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Fatal simulation errors.
//!
//! Capacity shortfalls are *not* errors: they are reconciled inside the run
//! and always end in a job outcome.  What remains here aborts the run.

use thiserror::Error;

use crate::ledger::InvariantViolation;
use crate::trace::TraceError;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SimulationError {
    /// The trace does not cover a step the run needs.
    #[error("capacity trace does not cover the run: {0}")]
    DataGap(#[from] TraceError),

    /// More capacity is committed at a step than was actually available.
    #[error("ledger invariant violated: {0}")]
    InvariantViolation(#[from] InvariantViolation),

    /// `step()` was called after the run ended.
    #[error("simulation already finished at step {0}")]
    Finished(crate::Step),
}
