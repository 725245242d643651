/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Admission controller.
//!
//! [`AdmissionController`] decides, at the step a request arrives, whether
//! the request can be served within its deadline and, if so, reserves the
//! capacity for it in the [`ReservationLedger`].
//!
//! # Budgets
//!
//! The placement window `[max(arrival, now), deadline]` is turned into one
//! [`StepBudget`] per step:
//!
//! | step | source |
//! |---|---|
//! | `now` | actual sample (already revealed) |
//! | `now + k` | forecast issued at `now`, column chosen by the risk scenario |
//!
//! The window is clipped to the last target of the forecast issued at `now`.
//!
//! Under [`AdmissionMode::Naive`] no forecast is read: an arrival is only
//! considered while nothing is queued past `now` and green headroom exists
//! at `now`, and every later step is budgeted like `now`, up to the trace
//! horizon.
//!
//! # Phases
//!
//! 1. Green-only search.
//! 2. Green-then-grid search, only when the policy is not strict-green.
//!
//! The chosen placement is committed atomically.  A rejection leaves the
//! ledger untouched.

pub mod error;
pub mod placement;

pub use error::RejectReason;
pub use placement::Candidate;

use tracing::{debug, warn};

use crate::ledger::{PlacementMode, Reservation, ReservationLedger, StepBudget};
use crate::policy::{AdmissionMode, PolicyConfig};
use crate::request::Request;
use crate::trace::{CapacitySource, TraceError};
use crate::{Step, CAPACITY_EPSILON};

// ── Decision ──────────────────────────────────────────────────────────────────

/// Reservation handed out on acceptance.
#[derive(Debug, Clone, PartialEq)]
pub struct Schedule {
    pub reservation: Reservation,
    /// Which search phase produced it.
    pub mode: PlacementMode,
    /// Smallest forecast green headroom left in any touched step.
    pub margin: f64,
}

impl Schedule {
    pub fn start(&self) -> Option<Step> {
        self.reservation.start()
    }

    pub fn finish(&self) -> Option<Step> {
        self.reservation.finish()
    }
}

/// Outcome of one admission attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Accept(Schedule),
    Reject(RejectReason),
}

impl Decision {
    pub fn is_accept(&self) -> bool {
        matches!(self, Decision::Accept(_))
    }
}

// ── AdmissionController ───────────────────────────────────────────────────────

/// Stateless apart from the policy: all capacity state lives in the ledger.
#[derive(Debug, Clone, Copy)]
pub struct AdmissionController {
    policy: PolicyConfig,
}

impl AdmissionController {
    pub fn new(policy: PolicyConfig) -> Self {
        Self { policy }
    }

    /// Decide on a newly arrived `request` at step `now`.
    ///
    /// # Errors
    /// [`TraceError`] when the trace has no actual or forecast for `now`.
    pub fn decide<S: CapacitySource + ?Sized>(
        &self,
        request: &Request,
        now: Step,
        ledger: &mut ReservationLedger,
        source: &S,
    ) -> Result<Decision, TraceError> {
        if self.policy.admission == AdmissionMode::Naive {
            if let Some(reason) = self.naive_screen(now, ledger, source)? {
                return Ok(self.reject(request, reason));
            }
        }
        let start = request.arrival.max(now);
        self.place(request, start, request.deadline, now, !self.policy.strict_green, ledger, source)
    }

    /// Re-place the uncovered part of an admitted job, starting at `from`.
    ///
    /// Same window rule and search phases as [`decide`](Self::decide), with
    /// the window opening at `from` instead of the arrival.
    pub fn requeue<S: CapacitySource + ?Sized>(
        &self,
        request: &Request,
        from: Step,
        now: Step,
        ledger: &mut ReservationLedger,
        source: &S,
    ) -> Result<Decision, TraceError> {
        self.place(
            request,
            from.max(now),
            request.deadline,
            now,
            !self.policy.strict_green,
            ledger,
            source,
        )
    }

    /// Place work that can no longer finish by its deadline.
    ///
    /// The window runs from `from` to the end of the forecast horizon and
    /// grid capacity is allowed.  Only used with late completion enabled.
    pub fn place_late<S: CapacitySource + ?Sized>(
        &self,
        request: &Request,
        from: Step,
        now: Step,
        ledger: &mut ReservationLedger,
        source: &S,
    ) -> Result<Decision, TraceError> {
        self.place(request, from.max(now), Step::MAX, now, true, ledger, source)
    }

    // ── Internals ─────────────────────────────────────────────────────────────

    #[allow(clippy::too_many_arguments)]
    fn place<S: CapacitySource + ?Sized>(
        &self,
        request: &Request,
        start: Step,
        end: Step,
        now: Step,
        allow_grid: bool,
        ledger: &mut ReservationLedger,
        source: &S,
    ) -> Result<Decision, TraceError> {
        if end < now {
            return Ok(self.reject(
                request,
                RejectReason::DeadlinePassed {
                    deadline: request.deadline,
                    now,
                },
            ));
        }
        if start > end {
            return Ok(self.reject(request, RejectReason::WindowEmpty { start, end }));
        }

        let budgets = self.budgets(start, end, now, source)?;
        if budgets.is_empty() {
            return Ok(self.reject(request, RejectReason::WindowEmpty { start, end }));
        }

        let mut phases = vec![PlacementMode::GreenOnly];
        if allow_grid {
            phases.push(PlacementMode::GreenThenGrid);
        }

        for mode in phases {
            let Some(candidate) = placement::search(
                ledger,
                &budgets,
                request.size,
                mode,
                self.policy.search_order,
                self.policy.tie_break,
            ) else {
                continue;
            };

            match ledger.try_reserve(request, &budgets[candidate.offset..], mode) {
                Ok(reservation) => {
                    debug!(
                        job = request.id,
                        start = candidate.start,
                        finish = reservation.finish(),
                        ?mode,
                        margin = candidate.margin,
                        "request admitted"
                    );
                    return Ok(Decision::Accept(Schedule {
                        reservation,
                        mode,
                        margin: candidate.margin,
                    }));
                }
                Err(e) => {
                    // The search and the commit see the same ledger, so this
                    // only fires on a planning bug.
                    warn!(job = request.id, error = %e, "planned placement failed to commit");
                }
            }
        }

        let reason = if allow_grid {
            RejectReason::InsufficientCapacity {
                required: request.size,
                available: placement::total_headroom(ledger, &budgets),
            }
        } else {
            RejectReason::NoGreenPlacement {
                required: request.size,
                available: placement::green_headroom(ledger, &budgets),
            }
        };
        Ok(self.reject(request, reason))
    }

    /// Reject reason for a naive arrival, if the node is not ready for it.
    fn naive_screen<S: CapacitySource + ?Sized>(
        &self,
        now: Step,
        ledger: &ReservationLedger,
        source: &S,
    ) -> Result<Option<RejectReason>, TraceError> {
        if !ledger.is_idle_after(now) {
            return Ok(Some(RejectReason::NodeBusy { now }));
        }
        let current = self.policy.risk.usable(source.actual_at(now)?);
        let (green, _) = ledger.headroom(&StepBudget::from_capacity(now, current));
        if green <= CAPACITY_EPSILON {
            return Ok(Some(RejectReason::NoGreenNow { now }));
        }
        Ok(None)
    }

    /// One budget per step of `[start, end]`, clipped to the forecast
    /// issued at `now`.
    fn budgets<S: CapacitySource + ?Sized>(
        &self,
        start: Step,
        end: Step,
        now: Step,
        source: &S,
    ) -> Result<Vec<StepBudget>, TraceError> {
        let risk = self.policy.risk;
        let mut budgets = Vec::new();
        let mut step = start;

        if step == now {
            budgets.push(StepBudget::from_capacity(now, risk.usable(source.actual_at(now)?)));
            if end == now {
                return Ok(budgets);
            }
            step += 1;
        }

        if self.policy.admission == AdmissionMode::Naive {
            let current = risk.usable(source.actual_at(now)?);
            let last = end
                .min(now.saturating_add(source.horizon()))
                .min(source.last_step());
            budgets.extend((step..=last).map(|s| StepBudget::from_capacity(s, current)));
            return Ok(budgets);
        }

        let forecast = source.forecast_at(now)?;
        let first = step;
        for sample in forecast.iter().filter(|s| s.target >= first && s.target <= end) {
            if sample.target != step {
                break;
            }
            budgets.push(StepBudget::from_capacity(step, risk.forecast(sample)));
            step += 1;
        }
        Ok(budgets)
    }

    fn reject(&self, request: &Request, reason: RejectReason) -> Decision {
        debug!(job = request.id, size = request.size, %reason, "request rejected");
        Decision::Reject(reason)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{RiskScenario, SearchOrder};
    use crate::trace::{Capacity, CapacitySample, CapacityTrace};

    /// Trace whose forecasts are exact.
    fn flat_trace(steps: usize, free: f64, reep: f64, horizon: Step) -> CapacityTrace {
        CapacityTrace::from_actuals(&vec![Capacity::new(free, reep); steps], horizon).unwrap()
    }

    /// Single-issue trace: actual reep is `actual`, each scenario forecasts
    /// its own constant.
    fn scenario_trace(actual: f64, expected: f64, conservative: f64, optimistic: f64) -> CapacityTrace {
        let mut samples = Vec::new();
        for issue in 0..4 {
            for target in issue..4 {
                samples.push(CapacitySample {
                    issue,
                    target,
                    free: 10.0,
                    free_pred: 10.0,
                    reep: actual,
                    reep_pred_expected: expected,
                    reep_pred_conservative: conservative,
                    reep_pred_optimistic: optimistic,
                });
            }
        }
        CapacityTrace::from_samples(samples).unwrap()
    }

    fn req(id: usize, arrival: Step, deadline: Step, size: f64) -> Request {
        Request::new(id, arrival, deadline, size).unwrap()
    }

    // ── decide ────────────────────────────────────────────────────────────────

    #[test]
    fn accepts_when_green_fits() {
        let trace = flat_trace(5, 10.0, 10.0, 4);
        let mut ledger = ReservationLedger::new(false);
        let ctl = AdmissionController::new(PolicyConfig::default());

        let d = ctl.decide(&req(0, 0, 2, 8.0), 0, &mut ledger, &trace).unwrap();
        let Decision::Accept(s) = d else { panic!("expected accept") };
        assert_eq!(s.start(), Some(0));
        assert_eq!(s.mode, PlacementMode::GreenOnly);
        assert_eq!(ledger.reserved_at(0), (8.0, 8.0));
    }

    #[test]
    fn second_request_sees_first_reservation() {
        let trace = flat_trace(3, 10.0, 10.0, 2);
        let mut ledger = ReservationLedger::new(false);
        let ctl = AdmissionController::new(PolicyConfig::default());

        // Window of a single step
        assert!(ctl.decide(&req(0, 0, 1, 6.0), 1, &mut ledger, &trace).unwrap().is_accept());
        let d = ctl.decide(&req(1, 0, 1, 6.0), 1, &mut ledger, &trace).unwrap();
        assert!(matches!(d, Decision::Reject(RejectReason::NoGreenPlacement { .. })));
        assert_eq!(ledger.reserved_at(1), (6.0, 6.0));
    }

    #[test]
    fn rejection_leaves_ledger_unchanged() {
        let trace = flat_trace(3, 10.0, 2.0, 2);
        let mut ledger = ReservationLedger::new(false);
        let ctl = AdmissionController::new(PolicyConfig::default());
        let before = ledger.clone();

        let d = ctl.decide(&req(0, 0, 2, 50.0), 0, &mut ledger, &trace).unwrap();
        assert!(!d.is_accept());
        assert_eq!(ledger, before);
    }

    #[test]
    fn best_effort_falls_back_to_grid() {
        let trace = flat_trace(3, 10.0, 2.0, 2);
        let mut ledger = ReservationLedger::new(true);
        let ctl = AdmissionController::new(PolicyConfig::best_effort(RiskScenario::Expected));

        let d = ctl.decide(&req(0, 0, 2, 12.0), 0, &mut ledger, &trace).unwrap();
        let Decision::Accept(s) = d else { panic!("expected accept") };
        assert_eq!(s.mode, PlacementMode::GreenThenGrid);
        assert!((s.reservation.green() - 4.0).abs() < 1e-9);
        assert!((s.reservation.grid() - 8.0).abs() < 1e-9);
    }

    #[test]
    fn risk_scenario_selects_forecast_column() {
        // Steps 1..=3 forecast: expected 5, conservative 2, optimistic 9
        let trace = scenario_trace(0.0, 5.0, 2.0, 9.0);
        let request = req(0, 1, 3, 12.0);

        let mut outcomes = Vec::new();
        for risk in [RiskScenario::Conservative, RiskScenario::Expected, RiskScenario::Optimistic] {
            let mut ledger = ReservationLedger::new(false);
            let ctl = AdmissionController::new(PolicyConfig::strict(risk));
            outcomes.push(ctl.decide(&request, 0, &mut ledger, &trace).unwrap().is_accept());
        }
        assert_eq!(outcomes, vec![false, true, true]);
    }

    #[test]
    fn step_now_uses_actual_not_forecast() {
        // Forecast says 9 everywhere, actual is 0
        let trace = scenario_trace(0.0, 9.0, 9.0, 9.0);
        let mut ledger = ReservationLedger::new(false);
        let ctl = AdmissionController::new(PolicyConfig::strict(RiskScenario::Optimistic));

        let d = ctl.decide(&req(0, 0, 1, 5.0), 0, &mut ledger, &trace).unwrap();
        let Decision::Accept(s) = d else { panic!("expected accept") };
        assert_eq!(s.start(), Some(1));
    }

    #[test]
    fn window_is_clipped_to_forecast_horizon() {
        let trace = flat_trace(10, 10.0, 10.0, 1);
        let mut ledger = ReservationLedger::new(false);
        let ctl = AdmissionController::new(PolicyConfig::default());

        // Steps 0 and 1 visible: 20 units max
        let d = ctl.decide(&req(0, 0, 9, 25.0), 0, &mut ledger, &trace).unwrap();
        assert!(matches!(
            d,
            Decision::Reject(RejectReason::NoGreenPlacement { available, .. }) if (available - 20.0).abs() < 1e-9
        ));
    }

    #[test]
    fn latest_first_order_delays_start() {
        let trace = flat_trace(5, 10.0, 10.0, 4);
        let mut ledger = ReservationLedger::new(false);
        let ctl = AdmissionController::new(
            PolicyConfig::default().with_search_order(SearchOrder::LatestFirst),
        );
        let d = ctl.decide(&req(0, 0, 4, 5.0), 0, &mut ledger, &trace).unwrap();
        let Decision::Accept(s) = d else { panic!("expected accept") };
        assert_eq!(s.start(), Some(4));
    }

    #[test]
    fn missing_forecast_is_fatal() {
        let trace = flat_trace(3, 10.0, 10.0, 2);
        let mut ledger = ReservationLedger::new(false);
        let ctl = AdmissionController::new(PolicyConfig::default());
        assert!(ctl.decide(&req(0, 5, 8, 1.0), 5, &mut ledger, &trace).is_err());
    }

    #[test]
    fn all_free_plans_on_whole_free_capacity() {
        // No renewable excess at all
        let trace = flat_trace(3, 10.0, 0.0, 2);
        let mut ledger = ReservationLedger::new(false);
        let ctl = AdmissionController::new(PolicyConfig::strict(RiskScenario::AllFree));

        let d = ctl.decide(&req(0, 0, 2, 25.0), 0, &mut ledger, &trace).unwrap();
        let Decision::Accept(s) = d else { panic!("expected accept") };
        assert_eq!(s.mode, PlacementMode::GreenOnly);
        assert!((s.reservation.green() - 25.0).abs() < 1e-9);

        let strict = AdmissionController::new(PolicyConfig::strict(RiskScenario::Perfect));
        let mut ledger = ReservationLedger::new(false);
        assert!(!strict.decide(&req(0, 0, 2, 25.0), 0, &mut ledger, &trace).unwrap().is_accept());
    }

    // ── naive ─────────────────────────────────────────────────────────────────

    #[test]
    fn naive_ignores_forecasts() {
        // Actual 10 green now, every forecast promises nothing
        let trace = scenario_trace(10.0, 0.0, 0.0, 0.0);
        let mut ledger = ReservationLedger::new(true);
        let ctl = AdmissionController::new(PolicyConfig::naive());

        let d = ctl.decide(&req(0, 0, 2, 25.0), 0, &mut ledger, &trace).unwrap();
        let Decision::Accept(s) = d else { panic!("expected accept") };
        assert_eq!(s.start(), Some(0));
        assert_eq!(s.finish(), Some(2));
        assert!((s.reservation.green() - 25.0).abs() < 1e-9);
    }

    #[test]
    fn naive_rejects_while_work_is_queued() {
        let trace = flat_trace(5, 10.0, 10.0, 4);
        let mut ledger = ReservationLedger::new(true);
        let ctl = AdmissionController::new(PolicyConfig::naive());

        assert!(ctl.decide(&req(0, 0, 3, 15.0), 0, &mut ledger, &trace).unwrap().is_accept());
        let d = ctl.decide(&req(1, 0, 3, 1.0), 0, &mut ledger, &trace).unwrap();
        assert_eq!(d, Decision::Reject(RejectReason::NodeBusy { now: 0 }));
    }

    #[test]
    fn naive_rejects_without_green_now() {
        let trace = flat_trace(3, 10.0, 0.0, 2);
        let mut ledger = ReservationLedger::new(true);
        let ctl = AdmissionController::new(PolicyConfig::naive());
        let before = ledger.clone();

        let d = ctl.decide(&req(0, 0, 2, 1.0), 0, &mut ledger, &trace).unwrap();
        assert_eq!(d, Decision::Reject(RejectReason::NoGreenNow { now: 0 }));
        assert_eq!(ledger, before);
    }

    // ── requeue / late ────────────────────────────────────────────────────────

    #[test]
    fn requeue_after_deadline_is_rejected() {
        let trace = flat_trace(5, 10.0, 10.0, 4);
        let mut ledger = ReservationLedger::new(false);
        let ctl = AdmissionController::new(PolicyConfig::default());

        let d = ctl.requeue(&req(0, 0, 2, 1.0), 3, 3, &mut ledger, &trace).unwrap();
        assert_eq!(d, Decision::Reject(RejectReason::DeadlinePassed { deadline: 2, now: 3 }));
    }

    #[test]
    fn place_late_extends_past_deadline() {
        let trace = flat_trace(6, 10.0, 0.0, 5);
        let mut ledger = ReservationLedger::new(false);
        let ctl = AdmissionController::new(
            PolicyConfig::default().with_late_completion(true),
        );

        let d = ctl.place_late(&req(0, 0, 2, 15.0), 3, 3, &mut ledger, &trace).unwrap();
        let Decision::Accept(s) = d else { panic!("expected accept") };
        assert_eq!(s.start(), Some(3));
        assert_eq!(s.finish(), Some(4));
        assert_eq!(s.mode, PlacementMode::GreenThenGrid);
    }
}
