//! FFA — frequency-first DVFS+DPM (spec §4.10 "FFA"). Ported from
//! `examples/original_source/schedsim/algo/include/schedsim/algo/ffa_policy.hpp`:
//! lower frequency as far as the PA formula allows; only once that would
//! fall below the domain's efficient frequency does FFA start shedding
//! cores, preferring frequency reduction over core reduction.

use super::{CooldownTracker, DvfsPolicy, PlatformTarget};
use crate::ids::ProcessorId;
use crate::platform::PlatformHandle;
use crate::time::{Duration, Frequency};

pub struct FfaPolicy {
    cooldown: Duration,
    sleep_cstate: u8,
    tracker: CooldownTracker,
}

impl FfaPolicy {
    pub fn new(cooldown: Duration, sleep_cstate: u8) -> Self {
        FfaPolicy { cooldown, sleep_cstate, tracker: CooldownTracker::new() }
    }

    /// `f_min_req = f_max * (U_total + (m-1) * U_max) / m`; if that falls
    /// below the domain's efficient frequency, stay at `f_eff` and shed
    /// cores down to `ceil(m * f_min_req / f_eff)` instead; otherwise snap
    /// up to the nearest OPP and keep every core active.
    pub(crate) fn compute_target(&self, active_util: f64, max_util: f64, total_procs: usize, domain: &crate::platform::ClockDomain) -> PlatformTarget {
        let f_min_req = super::compute_freq_min(domain.freq_max, active_util, max_util, total_procs as f64);
        match domain.efficient_freq {
            Some(f_eff) if f_min_req < f_eff => {
                let active = super::clamp_procs(total_procs as f64 * f_min_req.value() / f_eff.value(), total_procs);
                PlatformTarget { frequency: f_eff, active_processors: active }
            }
            _ => PlatformTarget { frequency: domain.ceil_to_mode(f_min_req), active_processors: total_procs },
        }
    }
}

impl DvfsPolicy for FfaPolicy {
    fn update_platform(&self, platform: &PlatformHandle, processors: &[ProcessorId], active_utilization: f64, max_utilization: f64) -> usize {
        let groups = super::group_by_domain(platform, processors);
        let mut total_active = 0;
        for (domain_id, members) in groups {
            let target = {
                let snapshot = platform.platform();
                self.compute_target(active_utilization, max_utilization, members.len(), snapshot.clock_domain(domain_id))
            };
            super::apply_target(platform, domain_id, target, &self.tracker, self.cooldown);
            let _ = self.sleep_cstate;
            total_active += target.active_processors;
        }
        total_active
    }

    fn cooldown_period(&self) -> Duration {
        self.cooldown
    }
}
