//! Power domain and C-states (spec §3 "PowerDomain", §4.5).

use crate::ids::{PowerDomainId, ProcessorId};
use crate::time::{Duration, Power};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CStateScope {
    PerProcessor,
    DomainWide,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CStateLevel {
    /// Level 0 is active (C0); higher levels are progressively deeper
    /// sleep.
    pub level: u8,
    pub scope: CStateScope,
    pub wake_latency: Duration,
    pub power: Power,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PowerDomain {
    pub id: PowerDomainId,
    /// Sorted by `level`.
    pub c_states: Vec<CStateLevel>,
    pub processors: Vec<ProcessorId>,
    /// Per-processor requested level, indexed positionally into
    /// `processors` (kept alongside rather than on `Processor` so a
    /// domain-wide scope can be resolved without walking the whole
    /// processor arena).
    pub(crate) requested: Vec<u8>,
}

impl PowerDomain {
    pub fn new(id: PowerDomainId, mut c_states: Vec<CStateLevel>) -> Self {
        c_states.sort_by_key(|c| c.level);
        PowerDomain { id, c_states, processors: Vec::new(), requested: Vec::new() }
    }

    pub fn c_state(&self, level: u8) -> Option<&CStateLevel> {
        self.c_states.iter().find(|c| c.level == level)
    }

    fn slot(&self, proc: ProcessorId) -> Option<usize> {
        self.processors.iter().position(|&p| p == proc)
    }

    pub fn request(&mut self, proc: ProcessorId, level: u8) {
        if let Some(idx) = self.slot(proc) {
            self.requested[idx] = level;
        }
    }

    /// Achieved C-state for `proc`: its own request if the level's scope
    /// is `PerProcessor`, otherwise the minimum request across the
    /// domain (spec §3 "PowerDomain").
    pub fn effective_level(&self, proc: ProcessorId) -> u8 {
        let Some(idx) = self.slot(proc) else { return 0 };
        let requested = self.requested[idx];
        match self.c_state(requested).map(|c| c.scope) {
            Some(CStateScope::PerProcessor) | None => requested,
            Some(CStateScope::DomainWide) => self.requested.iter().copied().min().unwrap_or(0),
        }
    }

    pub(crate) fn add_processor(&mut self, proc: ProcessorId) {
        self.processors.push(proc);
        self.requested.push(0);
    }
}
