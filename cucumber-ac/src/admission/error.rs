/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Rejection reasons produced by the admission controller.
//!
//! A rejection is a normal outcome, not an error: it is carried inside
//! [`Decision::Reject`](super::Decision::Reject) and recorded per job.  Every
//! variant keeps the numbers that led to it so the per-job log line can be
//! read without re-running the search.

use crate::Step;

/// Why a request could not be placed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RejectReason {
    /// The window `[start, end]` is empty after clipping to the current step
    /// and the forecast horizon.
    WindowEmpty { start: Step, end: Step },

    /// The deadline lies before the current step.
    DeadlinePassed { deadline: Step, now: Step },

    /// Strict-green policy: forecast renewable headroom in the window is too
    /// small.
    NoGreenPlacement { required: f64, available: f64 },

    /// Neither green nor grid headroom in the window can hold the request.
    InsufficientCapacity { required: f64, available: f64 },

    /// Naive screening: work is still queued past the current step.
    NodeBusy { now: Step },

    /// Naive screening: no renewable headroom at the current step.
    NoGreenNow { now: Step },
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::WindowEmpty { start, end } => {
                write!(f, "placement window [{}, {}] is empty", start, end)
            }

            RejectReason::DeadlinePassed { deadline, now } => {
                write!(f, "deadline {} already passed at step {}", deadline, now)
            }

            RejectReason::NoGreenPlacement {
                required,
                available,
            } => write!(
                f,
                "needs {:.3} units but only {:.3} units of forecast renewable headroom remain",
                required, available
            ),

            RejectReason::InsufficientCapacity {
                required,
                available,
            } => write!(
                f,
                "needs {:.3} units but only {:.3} units of free capacity remain",
                required, available
            ),

            RejectReason::NodeBusy { now } => {
                write!(f, "node still has queued work after step {}", now)
            }

            RejectReason::NoGreenNow { now } => {
                write!(f, "no renewable headroom at step {}", now)
            }
        }
    }
}
