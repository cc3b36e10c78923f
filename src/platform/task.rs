//! Task descriptor (spec §3 "Task").

use crate::ids::TaskId;
use crate::time::Duration;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub period: Duration,
    pub relative_deadline: Duration,
    /// Worst-case execution time in reference units (spec §3: "Per-type
    /// WCET is WCET / (type.performance / reference_performance)").
    pub wcet: Duration,
}

impl Task {
    pub fn utilization(&self) -> f64 {
        self.wcet / self.period
    }

    /// Scales this task's reference-unit WCET to the speed of a
    /// processor type relative to the platform's reference performance.
    pub fn wcet_for_performance(&self, performance: f64, reference_performance: f64) -> Duration {
        self.wcet / (performance / reference_performance)
    }
}
