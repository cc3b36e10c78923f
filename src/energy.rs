//! Energy accounting (spec §4.6). The tracker integrates each
//! processor's instantaneous power draw over time; it is only ever
//! *notified* of state changes by `PlatformHandle` and otherwise has no
//! reach into the event queue.

use crate::ids::{ClockDomainId, PowerDomainId, ProcessorId};
use crate::platform::{Platform, ProcessorState};
use crate::time::{Duration, Energy, Power, TimePoint};
use std::collections::HashMap;

#[derive(Clone, Copy, Debug)]
struct Accumulator {
    last_update: TimePoint,
    last_power: Power,
    energy: Energy,
}

/// Per-processor running totals, updated lazily: `on_power_domain_changed`
/// and `on_frequency_changed` integrate the *previous* power level across
/// the elapsed interval before recording the new one, so `total_energy`
/// never needs to walk the whole timeline.
pub struct EnergyTracker {
    accumulators: HashMap<ProcessorId, Accumulator>,
}

impl EnergyTracker {
    pub fn new() -> Self {
        EnergyTracker { accumulators: HashMap::new() }
    }

    fn instantaneous_power(&self, platform: &Platform, proc_id: ProcessorId) -> Power {
        let proc = platform.processor(proc_id);
        let pd = platform.power_domain(proc.power_domain);
        match proc.state {
            ProcessorState::Running | ProcessorState::ContextSwitching | ProcessorState::Changing => {
                pd.c_state(0).map(|c| c.power).unwrap_or(Power(0.0))
                    + platform
                        .clock_domain(proc.clock_domain)
                        .power_model
                        .map(|m| m.power_at(platform.clock_domain(proc.clock_domain).current_freq))
                        .unwrap_or(Power(0.0))
            }
            ProcessorState::Idle | ProcessorState::Sleep => {
                let level = pd.effective_level(proc_id);
                pd.c_state(level).map(|c| c.power).unwrap_or(Power(0.0))
            }
        }
    }

    fn integrate(&mut self, proc_id: ProcessorId, now: TimePoint) {
        let acc = self.accumulators.entry(proc_id).or_insert(Accumulator {
            last_update: now,
            last_power: Power(0.0),
            energy: Energy(0.0),
        });
        let elapsed = now - acc.last_update;
        if elapsed > Duration::ZERO {
            acc.energy += acc.last_power * elapsed;
        }
        acc.last_update = now;
    }

    /// Called by `PlatformHandle` whenever a processor's power domain (and
    /// therefore its achieved C-state, or its running/idle status) might
    /// have changed.
    pub fn on_power_domain_changed(&mut self, _domain: PowerDomainId, platform: &Platform, now: TimePoint) {
        for proc in &platform.processors {
            self.integrate(proc.id, now);
            let power = self.instantaneous_power(platform, proc.id);
            self.accumulators.get_mut(&proc.id).unwrap().last_power = power;
        }
    }

    /// Called when a clock domain's frequency changes; re-samples every
    /// processor on that domain.
    pub fn on_frequency_changed(&mut self, domain: ClockDomainId, platform: &Platform, now: TimePoint) {
        let members = platform.clock_domain(domain).processors.clone();
        for proc_id in members {
            self.integrate(proc_id, now);
            let power = self.instantaneous_power(platform, proc_id);
            self.accumulators.get_mut(&proc_id).unwrap().last_power = power;
        }
    }

    /// Brings every tracked processor's integral up to `now` without
    /// changing any recorded power level; call before reading totals.
    pub fn update_to_time(&mut self, now: TimePoint) {
        let ids: Vec<ProcessorId> = self.accumulators.keys().copied().collect();
        for id in ids {
            self.integrate(id, now);
        }
    }

    pub fn processor_energy(&self, proc: ProcessorId) -> Energy {
        self.accumulators.get(&proc).map(|a| a.energy).unwrap_or(Energy(0.0))
    }

    pub fn clock_domain_energy(&self, platform: &Platform, domain: ClockDomainId) -> Energy {
        platform
            .clock_domain(domain)
            .processors
            .iter()
            .fold(Energy(0.0), |acc, &p| acc + self.processor_energy(p))
    }

    pub fn power_domain_energy(&self, platform: &Platform, domain: PowerDomainId) -> Energy {
        platform
            .power_domain(domain)
            .processors
            .iter()
            .fold(Energy(0.0), |acc, &p| acc + self.processor_energy(p))
    }

    pub fn total_energy(&self) -> Energy {
        self.accumulators.values().fold(Energy(0.0), |acc, a| acc + a.energy)
    }
}

impl Default for EnergyTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integration_accumulates_power_times_elapsed_time() {
        let mut tracker = EnergyTracker::new();
        tracker.accumulators.insert(
            ProcessorId(0),
            Accumulator { last_update: TimePoint::ZERO, last_power: Power(1000.0), energy: Energy(0.0) },
        );
        tracker.integrate(ProcessorId(0), TimePoint::ZERO + Duration::from_secs_f64(2.0));
        assert!((tracker.processor_energy(ProcessorId(0)).value() - 2000.0).abs() < 1e-6);
    }
}
