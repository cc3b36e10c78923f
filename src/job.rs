//! Job: a single runnable instance of a task (spec §3 "Job").

use crate::ids::TaskId;
use crate::time::{Duration, TimePoint};

/// Below this remaining-work threshold a job is treated as complete;
/// guards against floating point drift accumulated across many small
/// `consumed_work` subtractions (spec §8 "epsilon-complete").
pub const EPSILON: Duration = Duration::from_nanos(1);

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Job {
    pub task: TaskId,
    pub arrival: TimePoint,
    pub absolute_deadline: TimePoint,
    /// Reference-unit work remaining; decremented by `Processor::consumed_work`.
    pub remaining: Duration,
}

impl Job {
    pub fn new(task: TaskId, arrival: TimePoint, relative_deadline: Duration, wcet: Duration) -> Self {
        Job {
            task,
            arrival,
            absolute_deadline: arrival + relative_deadline,
            remaining: wcet,
        }
    }

    /// True once remaining work has dropped to (or below) `EPSILON`.
    pub fn is_complete(&self) -> bool {
        self.remaining <= EPSILON
    }

    /// Applies consumed work, clamping at zero rather than going negative.
    pub fn consume(&mut self, work: Duration) {
        self.remaining = if work >= self.remaining { Duration::ZERO } else { self.remaining - work };
    }

    pub fn has_missed_deadline(&self, now: TimePoint) -> bool {
        now > self.absolute_deadline && !self.is_complete()
    }
}
