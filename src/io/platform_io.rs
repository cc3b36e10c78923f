//! Platform JSON loader (spec §6 "Platform JSON"): a list of clusters,
//! each translated into one `ClockDomain` + `PowerDomain` pair with
//! `nb_procs` processors sharing them — matching the `Cluster` shape the
//! allocator (§4.11) later wraps around a scheduler.

use crate::error::{Error, Result};
use crate::ids::{ClockDomainId, PowerDomainId, ProcessorTypeId};
use crate::platform::clock_domain::PowerCoefficients;
use crate::platform::power_domain::{CStateLevel, CStateScope};
use crate::platform::proc_type::ProcessorType;
use crate::platform::{Platform, PlatformBuilder};
use crate::time::{Duration, Frequency, Power};
use serde::Deserialize;
use std::io::Read;

#[derive(Deserialize)]
struct ClusterSpec {
    nb_procs: u32,
    /// Sorted descending (spec §6 "sorted-descending `frequencies`").
    frequencies: Vec<f64>,
    effective_freq: f64,
    /// `[a0, a1, a2, a3]` of the cubic power polynomial (spec §4.6).
    power_model: [f64; 4],
    perf_score: f64,
}

#[derive(Deserialize)]
struct PlatformFile {
    clusters: Vec<ClusterSpec>,
}

/// A built platform plus the per-cluster id groupings the allocator needs
/// to construct one `EdfScheduler` + `Cluster` per JSON entry.
#[derive(Debug)]
pub struct LoadedPlatform {
    pub platform: Platform,
    pub clusters: Vec<LoadedCluster>,
}

#[derive(Debug)]
pub struct LoadedCluster {
    pub clock_domain: ClockDomainId,
    pub processors: Vec<crate::ids::ProcessorId>,
    pub perf_score: f64,
}

pub fn load_platform<R: Read>(mut reader: R) -> Result<LoadedPlatform> {
    let mut text = String::new();
    reader.read_to_string(&mut text).map_err(|e| Error::LoaderError(format!("reading platform: {e}")))?;
    let file: PlatformFile = serde_json::from_str(&text).map_err(|e| Error::LoaderError(format!("platform JSON: {e}")))?;
    if file.clusters.is_empty() {
        return Err(Error::LoaderError("platform declares no clusters".into()));
    }

    let mut builder = PlatformBuilder::new();
    let proc_type: ProcessorTypeId = builder.add_proc_type(ProcessorType { name: "generic".into(), performance: 1.0, context_switch_delay: Duration::ZERO });

    let mut clusters = Vec::with_capacity(file.clusters.len());
    for (idx, c) in file.clusters.into_iter().enumerate() {
        if c.nb_procs == 0 {
            return Err(Error::LoaderError(format!("cluster {idx}: nb_procs must be > 0")));
        }
        let mut freqs = c.frequencies.clone();
        if freqs.windows(2).any(|w| w[0] < w[1]) {
            return Err(Error::LoaderError(format!("cluster {idx}: frequencies must be sorted descending")));
        }
        freqs.sort_by(|a, b| a.total_cmp(b));
        let opps: Vec<Frequency> = freqs.iter().copied().map(Frequency).collect();
        let freq_min = *opps.first().ok_or_else(|| Error::LoaderError(format!("cluster {idx}: frequencies is empty")))?;
        let freq_max = *opps.last().unwrap();
        if !freqs.iter().any(|&f| (f - c.effective_freq).abs() < 1e-9) {
            return Err(Error::LoaderError(format!("cluster {idx}: effective_freq is not one of frequencies")));
        }

        let domain_id: ClockDomainId = builder.add_clock_domain(freq_min, freq_max, Duration::ZERO);
        {
            let domain = builder.clock_domain_mut(domain_id);
            domain.opps = Some(opps);
            domain.efficient_freq = Some(Frequency(c.effective_freq));
            domain.power_model = Some(PowerCoefficients { a0: c.power_model[0], a1: c.power_model[1], a2: c.power_model[2], a3: c.power_model[3] });
        }

        let power_domain_id: PowerDomainId = builder.add_power_domain(vec![
            CStateLevel { level: 0, scope: CStateScope::PerProcessor, wake_latency: Duration::ZERO, power: Power(0.0) },
            CStateLevel { level: 1, scope: CStateScope::PerProcessor, wake_latency: Duration::from_secs_f64(0.0001), power: Power(0.0) },
        ]);

        let mut processors = Vec::with_capacity(c.nb_procs as usize);
        for _ in 0..c.nb_procs {
            processors.push(builder.add_processor(proc_type, domain_id, power_domain_id));
        }

        clusters.push(LoadedCluster { clock_domain: domain_id, processors, perf_score: c.perf_score });
    }

    let platform = builder.finalize()?;
    Ok(LoadedPlatform { platform, clusters })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_a_single_cluster_platform() {
        let json = r#"{"clusters":[{"nb_procs":4,"frequencies":[2000.0,1500.0,1000.0],"effective_freq":1500.0,"power_model":[0.1,0.2,0.3,0.4],"perf_score":1.0}]}"#;
        let loaded = load_platform(json.as_bytes()).unwrap();
        assert_eq!(loaded.clusters.len(), 1);
        assert_eq!(loaded.clusters[0].processors.len(), 4);
        assert_eq!(loaded.platform.clock_domain(loaded.clusters[0].clock_domain).freq_max, Frequency(2000.0));
    }

    #[test]
    fn effective_freq_must_be_a_declared_frequency() {
        let json = r#"{"clusters":[{"nb_procs":1,"frequencies":[2000.0,1000.0],"effective_freq":1234.0,"power_model":[0.0,0.0,0.0,0.0],"perf_score":1.0}]}"#;
        assert!(load_platform(json.as_bytes()).is_err());
    }

    #[test]
    fn unsorted_frequencies_are_rejected() {
        let json = r#"{"clusters":[{"nb_procs":1,"frequencies":[1000.0,2000.0],"effective_freq":1000.0,"power_model":[0.0,0.0,0.0,0.0],"perf_score":1.0}]}"#;
        assert!(load_platform(json.as_bytes()).is_err());
    }
}
