//! The Constant Bandwidth Server attached to each task (spec §3 "CbsServer",
//! §4.7). Grounded on `schedlib`'s `Server` entity and `schedsim::algo`'s
//! `CbsServer`/`ReclamationPolicy` split in `examples/original_source`:
//! the server owns its own state machine and deadline/virtual-time
//! bookkeeping, while a `ReclamationPolicy` (standard CBS, GRUB, or CASH)
//! is consulted at the three points where bandwidth reclamation can alter
//! the textbook CBS rules.

use crate::event::TimerId;
use crate::ids::{ServerId, TaskId};
use crate::time::{Duration, TimePoint};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ServerState {
    Inactive,
    Ready,
    Running,
    NonContending,
}

#[derive(Clone, Debug)]
pub struct CbsServer {
    pub id: ServerId,
    pub task: TaskId,
    pub period: Duration,
    pub utilization: f64,
    state: ServerState,
    /// Absolute deadline of the server's current CBS period.
    deadline: TimePoint,
    /// Virtual time, advanced as execution is consumed; monotonic.
    virtual_time: TimePoint,
    /// Remaining budget in the current CBS period.
    budget: Duration,
    last_update: TimePoint,
    /// Set while `NonContending` so a same-instant re-arrival does not
    /// re-enter `Inactive` before the deferred deadline fires (spec §4.7,
    /// "cant_be_inactive" in the original `Server` entity).
    cant_be_inactive: bool,
    last_call: TimePoint,
    /// Armed whenever the server is dispatched; fires a budget-exhaustion
    /// check independent of the job's own completion timer.
    pub budget_timer: TimerId,
}

impl CbsServer {
    pub fn new(id: ServerId, task: TaskId, period: Duration, utilization: f64) -> Self {
        CbsServer {
            id,
            task,
            period,
            utilization,
            state: ServerState::Inactive,
            deadline: TimePoint::ZERO,
            virtual_time: TimePoint::ZERO,
            budget: Duration::ZERO,
            last_update: TimePoint::ZERO,
            cant_be_inactive: false,
            last_call: TimePoint::ZERO,
            budget_timer: TimerId::invalid(),
        }
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    pub fn deadline(&self) -> TimePoint {
        self.deadline
    }

    pub fn virtual_time(&self) -> TimePoint {
        self.virtual_time
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn cant_be_inactive(&self) -> bool {
        self.cant_be_inactive
    }

    /// Sets virtual time; panics (in debug) on attempts to move it
    /// backwards, mirroring the original entity's assertion.
    pub fn set_virtual_time(&mut self, new_time: TimePoint) {
        debug_assert!(new_time >= self.virtual_time, "virtual time must not decrease");
        self.virtual_time = new_time;
    }

    pub fn recharge_budget(&mut self, max_budget: Duration) {
        self.budget = max_budget;
    }

    pub fn consume_budget(&mut self, amount: Duration) {
        self.budget = if amount >= self.budget { Duration::ZERO } else { self.budget - amount };
    }

    pub fn grant_extra_budget(&mut self, extra: Duration) {
        self.budget += extra;
    }

    /// Time elapsed since the server last updated its own bookkeeping.
    pub fn running_time(&self, now: TimePoint) -> Duration {
        now - self.last_update
    }

    pub fn update_time(&mut self, now: TimePoint) {
        self.last_update = now;
    }

    /// Drives the server's state machine; new budget/deadline are set by
    /// the caller (`EdfScheduler`) before or after the call as the
    /// transition requires. Mirrors `Server::change_state` (spec §4.7).
    pub fn change_state(&mut self, new_state: ServerState, now: TimePoint) {
        if new_state == self.state {
            return;
        }
        if self.last_call != now {
            self.last_call = now;
            self.cant_be_inactive = false;
        }
        match new_state {
            ServerState::Ready => {
                match self.state {
                    ServerState::Inactive => {
                        self.deadline = now + self.period;
                    }
                    ServerState::NonContending => {
                        self.cant_be_inactive = true;
                    }
                    ServerState::Ready | ServerState::Running => {}
                }
            }
            ServerState::Running => {
                debug_assert!(matches!(self.state, ServerState::Ready | ServerState::Running));
                self.last_update = now;
            }
            ServerState::NonContending => {
                debug_assert_eq!(self.state, ServerState::Running);
                debug_assert!(self.virtual_time > now && self.virtual_time < self.deadline);
            }
            ServerState::Inactive => {
                debug_assert!(matches!(self.state, ServerState::Running | ServerState::NonContending));
            }
        }
        self.state = new_state;
    }

    /// Postpones the server's deadline by one period (standard CBS
    /// postponement on budget exhaustion, spec §4.7 "postpone").
    pub fn postpone(&mut self) {
        self.deadline = self.deadline + self.period;
    }
}
