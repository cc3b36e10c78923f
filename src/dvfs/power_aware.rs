//! PowerAware DVFS policy (spec §4.10 "PowerAware"). Ported from
//! `examples/original_source/schedsim/algo/src/dvfs_policy.cpp`'s
//! `PowerAwareDvfsPolicy`: frequency scales linearly with active
//! utilization between the domain's floor and ceiling; DPM (active core
//! count) is left untouched.

use super::{CooldownTracker, DvfsPolicy};
use crate::ids::ProcessorId;
use crate::platform::PlatformHandle;
use crate::time::{Duration, Frequency};

pub struct PowerAwareDvfsPolicy {
    cooldown: Duration,
    tracker: CooldownTracker,
}

impl PowerAwareDvfsPolicy {
    pub fn new(cooldown: Duration) -> Self {
        PowerAwareDvfsPolicy { cooldown, tracker: CooldownTracker::new() }
    }
}

impl DvfsPolicy for PowerAwareDvfsPolicy {
    fn update_platform(&self, platform: &PlatformHandle, processors: &[ProcessorId], active_utilization: f64, _max_utilization: f64) -> usize {
        let groups = super::group_by_domain(platform, processors);
        let mut total_active = 0;
        for (domain_id, members) in groups {
            let (f_min, f_max) = {
                let snapshot = platform.platform();
                let d = snapshot.clock_domain(domain_id);
                (d.freq_min, d.freq_max)
            };
            // f_target = f_min + (f_max - f_min) * clip(U_active, 0, 1)
            let clipped = active_utilization.clamp(0.0, 1.0);
            let target = Frequency(f_min.value() + (f_max.value() - f_min.value()) * clipped);
            super::apply_target(
                platform,
                domain_id,
                super::PlatformTarget { frequency: target, active_processors: members.len() },
                &self.tracker,
                self.cooldown,
            );
            total_active += members.len();
        }
        total_active
    }

    fn cooldown_period(&self) -> Duration {
        self.cooldown
    }
}
