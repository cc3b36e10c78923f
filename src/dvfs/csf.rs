//! CSF — core-first DVFS+DPM (spec §4.10 "CSF"). Ported from
//! `examples/original_source/schedsim/algo/include/schedsim/algo/csf_policy.hpp`:
//! shed cores down to the minimum feasible count first, then pick the
//! lowest frequency that keeps the remaining cores schedulable — the
//! opposite trade-off from FFA.

use super::{CooldownTracker, DvfsPolicy, PlatformTarget};
use crate::ids::ProcessorId;
use crate::platform::PlatformHandle;
use crate::time::{Duration, Frequency};

pub struct CsfPolicy {
    cooldown: Duration,
    sleep_cstate: u8,
    tracker: CooldownTracker,
}

impl CsfPolicy {
    pub fn new(cooldown: Duration, sleep_cstate: u8) -> Self {
        CsfPolicy { cooldown, sleep_cstate, tracker: CooldownTracker::new() }
    }

    /// `m_min = clamp(ceil((U_active - U_max) / (1 - U_max)), 1, m)`
    /// (clamped to `m` outright when `U_max >= 1` to dodge the division),
    /// then the PA formula on those `m_min` cores; shed further if even
    /// that falls below the efficient frequency.
    pub(crate) fn compute_target(&self, active_util: f64, max_util: f64, total_procs: usize, domain: &crate::platform::ClockDomain) -> PlatformTarget {
        let m_min = if max_util >= 1.0 {
            total_procs
        } else {
            super::clamp_procs((active_util - max_util) / (1.0 - max_util), total_procs)
        };
        let f_min_req = super::compute_freq_min(domain.freq_max, active_util, max_util, m_min as f64);
        match domain.efficient_freq {
            Some(f_eff) if f_min_req < f_eff => {
                let active = super::clamp_procs(m_min as f64 * f_min_req.value() / f_eff.value(), total_procs).min(total_procs);
                PlatformTarget { frequency: f_eff, active_processors: active }
            }
            _ => PlatformTarget { frequency: domain.ceil_to_mode(f_min_req), active_processors: m_min },
        }
    }
}

impl DvfsPolicy for CsfPolicy {
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
