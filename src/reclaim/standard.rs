//! Textbook CBS: no reclamation. Early completion always goes
//! Inactive/Ready, budget exhaustion always postpones the deadline.

use super::{ReclamationPolicy, ServerStateChange};
use crate::server::CbsServer;
use crate::time::{Duration, TimePoint};

#[derive(Default)]
pub struct StandardPolicy {
    active_utilization: f64,
}

impl StandardPolicy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReclamationPolicy for StandardPolicy {
    fn on_early_completion(&mut self, _server: &mut CbsServer, _remaining_budget: Duration, _now: TimePoint) -> bool {
        false
    }

    fn on_budget_exhausted(&mut self, _server: &mut CbsServer) -> Duration {
        Duration::ZERO
    }

    fn on_server_state_change(&mut self, server: &mut CbsServer, change: ServerStateChange) {
        let util = server.utilization;
        match change {
            ServerStateChange::Activated => self.active_utilization += util,
            ServerStateChange::Completed => self.active_utilization -= util,
            ServerStateChange::Dispatched | ServerStateChange::Preempted | ServerStateChange::NonContending | ServerStateChange::DeadlineReached | ServerStateChange::Detached => {}
        }
        if self.active_utilization < 0.0 {
            self.active_utilization = 0.0;
        }
    }

    fn active_utilization(&self) -> f64 {
        self.active_utilization
    }
}
