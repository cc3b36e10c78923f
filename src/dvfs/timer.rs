//! Deferred-apply variants of FFA/CSF (spec §4.10 "Timer variants"): the
//! computed target is not applied immediately. A one-shot timer armed at
//! `now + cooldown` applies it; a utilization change that arrives before
//! the timer fires replaces the pending target and re-arms the same
//! timer, while a change whose target equals the domain's current state
//! cancels it outright.
//!
//! The underlying `FfaPolicy`/`CsfPolicy` already carry their own
//! immediate-apply cooldown tracker; the timer variants reuse their
//! `compute_target` math and replace only the apply step.

use super::{CsfPolicy, DvfsPolicy, FfaPolicy, PlatformTarget};
use crate::event::{priority, TimerId};
use crate::ids::{ClockDomainId, ProcessorId};
use crate::platform::PlatformHandle;
use crate::time::Duration;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

struct Pending {
    target: PlatformTarget,
    timer: TimerId,
}

#[derive(Default)]
struct PendingTable(Rc<RefCell<HashMap<ClockDomainId, Pending>>>);

impl PendingTable {
    fn new() -> Self {
        Self::default()
    }

    /// Arms or re-arms the deferred apply for `domain`; a target equal to
    /// the domain's current frequency simply cancels whatever was pending.
    fn schedule(&self, platform: &PlatformHandle, domain: ClockDomainId, target: PlatformTarget, cooldown: Duration) -> usize {
        let current_freq = platform.platform().clock_domain(domain).current_freq;
        let mut table = self.0.borrow_mut();

        if target.frequency == current_freq {
            if let Some(mut entry) = table.remove(&domain) {
                platform.queue().borrow_mut().cancel(&mut entry.timer);
            }
            return target.active_processors;
        }

        if let Some(entry) = table.get_mut(&domain) {
            entry.target = target;
            return target.active_processors;
        }

        let handle = platform.clone();
        let map = self.0.clone();
        let timer = platform
            .queue()
            .borrow_mut()
            .add_timer(
                platform.now() + cooldown,
                priority::TIMER_DEFAULT,
                Box::new(move || {
                    let pending_target = map.borrow_mut().remove(&domain).map(|p| p.target);
                    if let Some(target) = pending_target {
                        let _ = handle.set_frequency(domain, target.frequency);
                    }
                }),
            )
            .ok();
        if let Some(timer) = timer {
            table.insert(domain, Pending { target, timer });
        }
        target.active_processors
    }
}

pub struct FfaTimerPolicy {
    inner: FfaPolicy,
    cooldown: Duration,
    pending: PendingTable,
}

impl FfaTimerPolicy {
    pub fn new(cooldown: Duration, sleep_cstate: u8) -> Self {
        FfaTimerPolicy { inner: FfaPolicy::new(Duration::ZERO, sleep_cstate), cooldown, pending: PendingTable::new() }
    }
}

impl DvfsPolicy for FfaTimerPolicy {
    fn update_platform(&self, platform: &PlatformHandle, processors: &[ProcessorId], active_utilization: f64, max_utilization: f64) -> usize {
        let groups = super::group_by_domain(platform, processors);
        let mut total = 0;
        for (domain_id, members) in groups {
            let target = {
                let snapshot = platform.platform();
                self.inner.compute_target(active_utilization, max_utilization, members.len(), snapshot.clock_domain(domain_id))
            };
            total += self.pending.schedule(platform, domain_id, target, self.cooldown);
        }
        total
    }

    fn cooldown_period(&self) -> Duration {
        self.cooldown
    }
}

pub struct CsfTimerPolicy {
    inner: CsfPolicy,
    cooldown: Duration,
    pending: PendingTable,
}

impl CsfTimerPolicy {
    pub fn new(cooldown: Duration, sleep_cstate: u8) -> Self {
        CsfTimerPolicy { inner: CsfPolicy::new(Duration::ZERO, sleep_cstate), cooldown, pending: PendingTable::new() }
    }
}

impl DvfsPolicy for CsfTimerPolicy {
    fn update_platform(&self, platform: &PlatformHandle, processors: &[ProcessorId], active_utilization: f64, max_utilization: f64) -> usize {
        let groups = super::group_by_domain(platform, processors);
        let mut total = 0;
        for (domain_id, members) in groups {
            let target = {
                let snapshot = platform.platform();
                self.inner.compute_target(active_utilization, max_utilization, members.len(), snapshot.clock_domain(domain_id))
            };
            total += self.pending.schedule(platform, domain_id, target, self.cooldown);
        }
        total
    }

    fn cooldown_period(&self) -> Duration {
        self.cooldown
    }
}
