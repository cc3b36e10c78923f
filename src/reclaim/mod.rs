//! Bandwidth reclamation policies (spec §4.8). Grounded directly on
//! `schedsim::algo::ReclamationPolicy` in `examples/original_source`: a
//! trait with three CBS lifecycle hooks plus the utilization accounting
//! the DVFS policies (§4.10) read back.

pub mod cash;
pub mod grub;
pub mod standard;

pub use cash::CashPolicy;
pub use grub::GrubPolicy;
pub use standard::StandardPolicy;

use crate::server::CbsServer;
use crate::time::{Duration, TimePoint};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ServerStateChange {
    Activated,
    Dispatched,
    Preempted,
    Completed,
    NonContending,
    DeadlineReached,
    Detached,
}

pub trait ReclamationPolicy {
    /// Job finished with `remaining_budget` left over. Returns `true` if
    /// the server should enter `NonContending` (GRUB); `false` for
    /// standard CBS (Inactive/Ready).
    fn on_early_completion(&mut self, server: &mut CbsServer, remaining_budget: Duration, now: TimePoint) -> bool;

    /// Server's budget hit zero while still running. Returns extra budget
    /// granted (CASH borrowing); zero means standard CBS postponement.
    fn on_budget_exhausted(&mut self, server: &mut CbsServer) -> Duration;

    /// `vt += exec_time / U_server` by default; GRUB overrides with the
    /// bandwidth-scaled formula.
    fn compute_virtual_time(&self, server: &CbsServer, current_vt: TimePoint, exec_time: Duration) -> TimePoint {
        let increment = exec_time / server.utilization;
        current_vt + increment
    }

    /// Effective budget for timer scheduling; defaults to the server's
    /// own static remaining budget.
    fn compute_server_budget(&self, server: &CbsServer) -> Duration {
        server.budget()
    }

    fn on_server_state_change(&mut self, server: &mut CbsServer, change: ServerStateChange);

    /// Whether every running server's budget timer must be recomputed
    /// after any reschedule (true for GRUB, since the bandwidth factor
    /// shifts when active utilization changes).
    fn needs_global_budget_recalculation(&self) -> bool {
        false
    }

    fn compute_bandwidth(&self) -> f64 {
        1.0
    }

    fn active_utilization(&self) -> f64;

    fn scheduler_utilization(&self) -> f64 {
        self.active_utilization()
    }

    fn max_scheduler_utilization(&self) -> f64 {
        0.0
    }
}
