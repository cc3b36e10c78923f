//! Processor type descriptor (spec §3 "ProcessorType").

use crate::time::Duration;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProcessorType {
    pub name: String,
    /// Dimensionless performance factor in (0, ∞); the platform's
    /// reference type has value equal to `reference_performance`.
    pub performance: f64,
    pub context_switch_delay: Duration,
}
