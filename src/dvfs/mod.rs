//! DVFS/DPM policies (spec §4.10). A cluster's scheduler owns at most one
//! policy; `EdfScheduler::call_resched` calls `update_platform` once per
//! reschedule with the aggregate active/max utilization it just computed,
//! and the policy reports back how many processors should stay active —
//! `EdfScheduler::partition_active_processors` does the actual sleeping.
//!
//! Grounded on `examples/original_source/schedsim/algo/include/schedsim/algo/
//! dvfs_policy.hpp` and `dvfs_dpm_utils.hpp`. The original splits the
//! "compute target" and "apply target" steps across a free-function
//! `dvfs_dpm::apply_platform_target` shared by every policy; here that
//! split becomes `compute_target` (per concrete policy) plus the shared
//! `apply_target` in this module that every policy calls from
//! `update_platform`.

mod csf;
mod ffa;
mod power_aware;
mod timer;

pub use csf::CsfPolicy;
pub use ffa::FfaPolicy;
pub use power_aware::PowerAwareDvfsPolicy;
pub use timer::{CsfTimerPolicy, FfaTimerPolicy};

use crate::ids::{ClockDomainId, ProcessorId};
use crate::platform::PlatformHandle;
use crate::time::{Duration, Frequency, TimePoint};
use std::collections::HashMap;

/// Target computed by a policy for one clock domain: a frequency and how
/// many of its processors should remain active (spec §4.10
/// `PlatformTarget`).
#[derive(Clone, Copy, Debug)]
pub struct PlatformTarget {
    pub frequency: Frequency,
    pub active_processors: usize,
}

/// Shared DVFS/DPM contract (spec §4.10 "Shared contract"). Implementations
/// take `&self` because the scheduler holds the policy as a plain
/// `Box<dyn DvfsPolicy>` and calls it from behind a `RefCell` borrow shared
/// with other reschedule steps; any internal mutable state (cooldown
/// deadlines, pending timer targets) lives behind its own `RefCell`.
pub trait DvfsPolicy {
    /// Retunes every clock domain spanned by `processors` for the given
    /// aggregate utilization figures, returning the total number of
    /// processors across all of them that should remain active.
    fn update_platform(
        &self,
        platform: &PlatformHandle,
        processors: &[ProcessorId],
        active_utilization: f64,
        max_utilization: f64,
    ) -> usize;

    /// Minimum interval between successive frequency changes on the same
    /// domain; a change attempted within the cooldown is dropped. Default
    /// is zero (no cooldown).
    fn cooldown_period(&self) -> Duration {
        Duration::ZERO
    }
}

/// `f_min = f_max * (U_total + (m - 1) * U_max) / m` (spec §4.10, ported
/// from `dvfs_dpm::compute_freq_min`).
pub fn compute_freq_min(freq_max: Frequency, total_util: f64, max_util: f64, nb_procs: f64) -> Frequency {
    if nb_procs <= 0.0 {
        return freq_max;
    }
    Frequency(freq_max.value() * (total_util + (nb_procs - 1.0) * max_util) / nb_procs)
}

/// Clamps a fractional processor count to `[1, max_procs]` (spec §4.10
/// `dvfs_dpm::clamp_procs`).
pub fn clamp_procs(value: f64, max_procs: usize) -> usize {
    if max_procs == 0 {
        return 0;
    }
    (value.ceil() as i64).clamp(1, max_procs as i64) as usize
}

/// Groups `processors` by the clock domain they belong to, since a policy
/// retunes one domain at a time (spec §4.10 applies per `ClockDomain`).
pub fn group_by_domain(platform: &PlatformHandle, processors: &[ProcessorId]) -> HashMap<ClockDomainId, Vec<ProcessorId>> {
    let mut groups: HashMap<ClockDomainId, Vec<ProcessorId>> = HashMap::new();
    let snapshot = platform.platform();
    for &p in processors {
        let domain = snapshot.processor(p).clock_domain;
        groups.entry(domain).or_default().push(p);
    }
    groups
}

/// Per-domain cooldown bookkeeping shared by every concrete policy (spec
/// §4.10 "Per-domain cooldown timer"). Tracks the earliest time at which
/// the next change is permitted; a change attempted earlier is dropped.
#[derive(Default)]
pub struct CooldownTracker {
    next_allowed: std::cell::RefCell<HashMap<ClockDomainId, TimePoint>>,
}

impl CooldownTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn can_change(&self, domain: ClockDomainId, now: TimePoint) -> bool {
        self.next_allowed.borrow().get(&domain).map(|&t| now >= t).unwrap_or(true)
    }

    pub fn start_cooldown(&self, domain: ClockDomainId, now: TimePoint, cooldown: Duration) {
        if cooldown.is_positive() {
            self.next_allowed.borrow_mut().insert(domain, now + cooldown);
        }
    }
}

/// Wraps any `DvfsPolicy` to disable its core-shedding (spec §6 `--dpm
/// none`): frequency scaling still runs, but every processor is reported
/// active so `EdfScheduler::partition_active_processors` never sleeps
/// one. Used by the simulator driver when DPM is turned off independently
/// of DVFS.
pub struct DisableDpm<P> {
    inner: P,
}

impl<P> DisableDpm<P> {
    pub fn new(inner: P) -> Self {
        DisableDpm { inner }
    }
}

impl<P: DvfsPolicy> DvfsPolicy for DisableDpm<P> {
    fn update_platform(&self, platform: &PlatformHandle, processors: &[ProcessorId], active_utilization: f64, max_utilization: f64) -> usize {
        self.inner.update_platform(platform, processors, active_utilization, max_utilization);
        processors.len()
    }

    fn cooldown_period(&self) -> Duration {
        self.inner.cooldown_period()
    }
}

impl DvfsPolicy for Box<dyn DvfsPolicy> {
    fn update_platform(&self, platform: &PlatformHandle, processors: &[ProcessorId], active_utilization: f64, max_utilization: f64) -> usize {
        (**self).update_platform(platform, processors, active_utilization, max_utilization)
    }

    fn cooldown_period(&self) -> Duration {
        (**self).cooldown_period()
    }
}

/// Applies a computed target to one clock domain: DPM (reported active
/// count is handled by the caller's partition step) then DVFS
/// (`ClockDomain::set_frequency`), honoring the cooldown tracker (spec
/// §4.10 "Apply-target sequence", steps ii-iii — step i, sleeping excess
/// idle processors, is the scheduler's `partition_active_processors`,
/// which already runs right after `update_platform` every reschedule).
pub fn apply_target(
    platform: &PlatformHandle,
    domain: ClockDomainId,
    target: PlatformTarget,
    cooldown: &CooldownTracker,
    cooldown_period: Duration,
) {
    let now = platform.now();
    if !cooldown.can_change(domain, now) {
        return;
    }
    let current = platform.platform().clock_domain(domain).current_freq;
    if target.frequency == current {
        return;
    }
    if platform.set_frequency(domain, target.frequency).is_ok() {
        cooldown.start_cooldown(domain, now, cooldown_period);
        platform.queue().borrow_mut().trace(|w| {
            w.begin(now);
            w.field_u64("clock_domain_id", domain.index() as u64);
            w.field_f64("old_freq_mhz", current.value());
            w.field_f64("new_freq_mhz", target.frequency.value());
            w.end("frequency_change");
        });
    }
}
