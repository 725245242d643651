/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Cucumber – forecast-driven admission control for delay-tolerant workloads
//! on a node with an on-site renewable energy source.
//!
//! Module layout:
//!
//! ```text
//! lib.rs
//! ├── trace/          – capacity trace provider (actual + forecast samples)
//! ├── request.rs      – requests, job working copies, outcomes
//! ├── policy.rs       – risk scenario / search order / tie-break knobs
//! ├── ledger/         – reservation ledger (forward commitments + history)
//! ├── admission/      – admission controller and placement search
//! ├── simulator/      – discrete-time execution simulator
//! ├── metrics.rs      – per-step and per-job records
//! ├── config/         – YAML experiment configuration
//! ├── dataset.rs      – JSON trace / request loaders
//! └── experiment/     – run matrix and per-run driver
//! ```

pub mod admission;
pub mod config;
pub mod dataset;
pub mod experiment;
pub mod ledger;
pub mod metrics;
pub mod policy;
pub mod request;
pub mod simulator;
pub mod trace;

/// Discrete simulation time.  One step is one slot of the capacity trace.
pub type Step = u32;

/// Tolerance used for every capacity comparison.
pub const CAPACITY_EPSILON: f64 = 1e-9;
