//! Processor data model (spec §3 "Processor"). The finite-state-machine
//! *transitions* of spec §4.3 live on `PlatformHandle` in `platform::mod`
//! because they need to schedule/cancel timers and notify the energy
//! tracker; this module holds the processor's own state plus the pure
//! (timer-free) helpers: speed, consumed work, and completion delta.

use super::clock_domain::ClockDomain;
use super::proc_type::ProcessorType;
use crate::event::TimerId;
use crate::ids::{ClockDomainId, PowerDomainId, ProcessorId, ProcessorTypeId};
use crate::job::Job;
use crate::time::{Duration, TimePoint};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ProcessorState {
    Idle,
    ContextSwitching,
    Running,
    Sleep,
    Changing,
}

pub struct Processor {
    pub id: ProcessorId,
    pub proc_type: ProcessorTypeId,
    pub clock_domain: ClockDomainId,
    pub power_domain: PowerDomainId,
    pub state: ProcessorState,
    pub current_job: Option<Job>,
    /// The CBS server whose job is assigned here, if any. Tracked
    /// separately from `current_job` because the scheduler needs to find
    /// a processor's server without walking every server's task back to
    /// a job.
    pub running_server: Option<crate::ids::ServerId>,
    pub completion_timer: TimerId,
    pub deadline_timer: TimerId,
    pub transition_timer: TimerId,
    /// Held here rather than inside the completion timer's closure so a
    /// DVFS frequency change can cancel and re-arm the timer without
    /// losing the callback (spec §4.3/§4.4 "reschedule the completion
    /// timer").
    pub on_complete: Option<Box<dyn FnOnce(ProcessorId)>>,
    pub last_update: TimePoint,
    /// Set when `clear()` is called mid-`Changing` transition.
    pub pending_clear: bool,
    /// Preserved across `Changing` so DVFS can restore it.
    pub pre_dvfs_state: Option<ProcessorState>,
    /// Job to assign once a `ContextSwitching`/wake transition completes.
    pub pending_job: Option<Job>,
    pub reference_performance: f64,
}

impl Processor {
    pub fn new(
        id: ProcessorId,
        proc_type: ProcessorTypeId,
        clock_domain: ClockDomainId,
        power_domain: PowerDomainId,
    ) -> Self {
        Processor {
            id,
            proc_type,
            clock_domain,
            power_domain,
            state: ProcessorState::Idle,
            current_job: None,
            running_server: None,
            completion_timer: TimerId::invalid(),
            deadline_timer: TimerId::invalid(),
            transition_timer: TimerId::invalid(),
            on_complete: None,
            last_update: TimePoint::ZERO,
            pending_clear: false,
            pre_dvfs_state: None,
            pending_job: None,
            reference_performance: 1.0,
        }
    }

    /// `speed = (current_freq / freq_max) * (type.performance / reference_performance)`
    /// (spec §4.3).
    pub fn speed(&self, proc_type: &ProcessorType, clock_domain: &ClockDomain) -> f64 {
        let freq_ratio = clock_domain.current_freq.value() / clock_domain.freq_max.value();
        let perf_ratio = proc_type.performance / self.reference_performance;
        freq_ratio * perf_ratio
    }

    /// Reference-unit work consumed over `[t0, t1]` at `speed`.
    pub fn consumed_work(&self, t0: TimePoint, t1: TimePoint, speed: f64) -> Duration {
        (t1 - t0) * speed
    }

    /// Completion delta for `remaining` work at `speed`, rounded up to
    /// the next nanosecond so work is never under-delivered.
    pub fn completion_delta(remaining: Duration, speed: f64) -> Duration {
        if speed <= 0.0 {
            return Duration::MAX;
        }
        Duration::from_secs_f64_ceil(remaining.as_secs_f64() / speed)
    }

    pub fn is_running(&self) -> bool {
        self.state == ProcessorState::Running
    }

    pub fn is_idle(&self) -> bool {
        self.state == ProcessorState::Idle
    }
}
