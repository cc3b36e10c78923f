//! CASH (Capacity Sharing) bandwidth reclamation (spec §4.8). Ported
//! from `schedsim::algo::CashPolicy`: unused budget from early
//! completions is deposited into a single global spare queue; a server
//! whose own budget is exhausted borrows from that queue instead of
//! postponing its deadline. Virtual time uses the standard CBS formula.

use super::{ReclamationPolicy, ServerStateChange};
use crate::server::CbsServer;
use crate::time::{Duration, TimePoint};

#[derive(Default)]
pub struct CashPolicy {
    spare_budget: Duration,
    active_utilization: f64,
}

impl CashPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spare_budget(&self) -> Duration {
        self.spare_budget
    }
}

impl ReclamationPolicy for CashPolicy {
    /// Deposits the leftover budget into the spare queue; CASH never
    /// uses `NonContending`.
    fn on_early_completion(&mut self, _server: &mut CbsServer, remaining_budget: Duration, _now: TimePoint) -> bool {
        self.spare_budget += remaining_budget;
        false
    }

    /// Borrows as much as is available from the spare queue.
    fn on_budget_exhausted(&mut self, _server: &mut CbsServer) -> Duration {
        let granted = self.spare_budget;
        self.spare_budget = Duration::ZERO;
        granted
    }

    fn on_server_state_change(&mut self, server: &mut CbsServer, change: ServerStateChange) {
        let util = server.utilization;
        match change {
            ServerStateChange::Activated => self.active_utilization += util,
            ServerStateChange::Completed => self.active_utilization -= util,
            ServerStateChange::Dispatched | ServerStateChange::Preempted | ServerStateChange::NonContending | ServerStateChange::DeadlineReached | ServerStateChange::Detached => {}
        }
        self.active_utilization = self.active_utilization.max(0.0);
    }

    fn active_utilization(&self) -> f64 {
        self.active_utilization
    }
}
