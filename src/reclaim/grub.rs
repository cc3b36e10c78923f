//! M-GRUB bandwidth reclamation (spec §4.8). Ported from
//! `schedsim::algo::GrubPolicy` in `examples/original_source`: a server
//! that finishes early enters `NonContending` instead of `Inactive`,
//! deferring its return to the active set until its virtual time catches
//! up to real time — and the platform's bandwidth factor is rescaled by
//! how much utilization is currently inactive.
//!
//! Unlike the C++ original, this policy does not own the deadline timer
//! itself: it only decides *whether* a server should go `NonContending`.
//! Arming and cancelling the timer at `server.virtual_time()` is
//! `EdfScheduler`'s job, since it is the component with the event queue
//! handle (spec §9 "pass scheduler-owned mutable references into the ISR
//! closures at registration time").

use super::{ReclamationPolicy, ServerStateChange};
use crate::ids::ServerId;
use crate::server::CbsServer;
use crate::time::{Duration, TimePoint};
use std::collections::HashSet;

/// Floor on the computed bandwidth factor, guarding against division by
/// zero on a fully-inactive platform (spec §7: "bandwidth factor clamped
/// to a floor of 0.01").
const MIN_UTILIZATION: f64 = 0.01;

pub struct GrubPolicy {
    processor_count: usize,
    active_utilization: f64,
    scheduler_utilization: f64,
    /// Multiset of in-scheduler utilizations, for the `u_max` term.
    scheduler_utils: Vec<f64>,
    in_scheduler_set: HashSet<ServerId>,
}

impl GrubPolicy {
    pub fn new(processor_count: usize) -> Self {
        GrubPolicy {
            processor_count,
            active_utilization: 0.0,
            scheduler_utilization: 0.0,
            scheduler_utils: Vec::new(),
            in_scheduler_set: HashSet::new(),
        }
    }
}

impl ReclamationPolicy for GrubPolicy {
    /// M-GRUB NonContending condition: `vt > now && vt < deadline`.
    fn on_early_completion(&mut self, server: &mut CbsServer, _remaining_budget: Duration, now: TimePoint) -> bool {
        let vt = server.virtual_time();
        let dl = server.deadline();
        vt > now && vt < dl
    }

    /// GRUB grants no extra budget on exhaustion.
    fn on_budget_exhausted(&mut self, _server: &mut CbsServer) -> Duration {
        Duration::ZERO
    }

    /// `vt += (bandwidth / U_active) * exec_time`.
    fn compute_virtual_time(&self, server: &CbsServer, current_vt: TimePoint, exec_time: Duration) -> TimePoint {
        let bandwidth = self.compute_bandwidth();
        let increment = exec_time * (bandwidth / server.utilization);
        current_vt + increment
    }

    /// `budget = (U_i / bandwidth) * (deadline - vt)`.
    fn compute_server_budget(&self, server: &CbsServer) -> Duration {
        let bandwidth = self.compute_bandwidth();
        let dt = server.deadline() - server.virtual_time();
        if !dt.is_positive() {
            return Duration::ZERO;
        }
        let budget = dt * (server.utilization / bandwidth);
        budget.max(Duration::ZERO)
    }

    fn on_server_state_change(&mut self, server: &mut CbsServer, change: ServerStateChange) {
        let util = server.utilization;
        match change {
            ServerStateChange::Activated => {
                self.active_utilization += util;
                if self.in_scheduler_set.insert(server.id) {
                    self.scheduler_utilization += util;
                    self.scheduler_utils.push(util);
                }
            }
            ServerStateChange::Completed | ServerStateChange::NonContending => {
                self.active_utilization -= util;
            }
            ServerStateChange::Detached => {
                if self.in_scheduler_set.remove(&server.id) {
                    self.scheduler_utilization -= util;
                    if let Some(pos) = self.scheduler_utils.iter().position(|&u| u == util) {
                        self.scheduler_utils.remove(pos);
                    }
                }
            }
            ServerStateChange::Dispatched | ServerStateChange::Preempted | ServerStateChange::DeadlineReached => {}
        }
        self.active_utilization = self.active_utilization.max(0.0);
        self.scheduler_utilization = self.scheduler_utilization.max(0.0);
    }

    fn needs_global_budget_recalculation(&self) -> bool {
        true
    }

    /// `bandwidth = max(1 - inactive_bw / m, MIN_UTILIZATION)`, where
    /// `inactive_bw = m - (m - 1) * u_max - total_u`.
    fn compute_bandwidth(&self) -> f64 {
        if self.scheduler_utils.is_empty() {
            return 1.0;
        }
        let m = self.processor_count as f64;
        let u_max = self.scheduler_utils.iter().copied().fold(f64::MIN, f64::max);
        let total_u = self.scheduler_utilization;
        let inactive_bw = m - (m - 1.0) * u_max - total_u;
        (1.0 - inactive_bw / m).max(MIN_UTILIZATION)
    }

    fn active_utilization(&self) -> f64 {
        self.active_utilization
    }

    fn scheduler_utilization(&self) -> f64 {
        self.scheduler_utilization
    }

    fn max_scheduler_utilization(&self) -> f64 {
        self.scheduler_utils.iter().copied().fold(0.0, f64::max)
    }
}
