//! Task-to-scheduler allocation (spec §4.11 "Allocator"). Grounded on the
//! teacher crate's trait-object policy-injection idiom (the same shape as
//! `ReclamationPolicy`/`DvfsPolicy`): a shared `Allocator` contract with a
//! single-scheduler forwarder and a multi-cluster family whose concrete
//! placement strategies (`FirstFit`/`BestFit`/`WorstFit`) are swappable.

use crate::error::{Error, Result};
use crate::ids::{ClockDomainId, TaskId};
use crate::job::Job;
use crate::scheduler::EdfScheduler;
use crate::time::{Duration, Frequency};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Single entrypoint the engine registers its job-arrival events with
/// (spec §4.11, §7 "Single handler" — a second `Engine::set_allocator`
/// call fails with `HandlerAlreadySet`, enforced by `Engine` itself).
pub trait Allocator {
    fn on_job_arrival(&self, task: TaskId, job: Job) -> Result<()>;
}

/// Forwards every arrival to one `EdfScheduler` (spec §4.11
/// "SingleSchedulerAllocator").
pub struct SingleSchedulerAllocator {
    scheduler: Rc<RefCell<EdfScheduler>>,
}

impl SingleSchedulerAllocator {
    pub fn new(scheduler: Rc<RefCell<EdfScheduler>>) -> Self {
        SingleSchedulerAllocator { scheduler }
    }
}

impl Allocator for SingleSchedulerAllocator {
    fn on_job_arrival(&self, task: TaskId, job: Job) -> Result<()> {
        EdfScheduler::on_job_arrival(&self.scheduler, task, job)
    }
}

/// One partition of a multi-cluster platform: its own clock domain and
/// `EdfScheduler`, plus the figures needed to scale a task's utilization
/// onto it (spec §4.11 "Cluster{clock_domain, scheduler, perf_score,
/// reference_freq_max, u_target}").
pub struct Cluster {
    pub clock_domain: ClockDomainId,
    pub scheduler: Rc<RefCell<EdfScheduler>>,
    pub perf_score: f64,
    pub reference_freq_max: Frequency,
    pub u_target: f64,
}

impl Cluster {
    fn current_freq_max(&self, platform: &crate::platform::PlatformHandle) -> Frequency {
        platform.platform().clock_domain(self.clock_domain).freq_max
    }

    /// `task_util * scale_speed / perf_score`, `scale_speed =
    /// reference_freq_max / cluster_freq_max` (spec §4.11 "Scaled
    /// utilization").
    fn scaled_utilization(&self, platform: &crate::platform::PlatformHandle, raw_util: f64) -> f64 {
        let scale_speed = self.reference_freq_max.value() / self.current_freq_max(platform).value();
        raw_util * scale_speed / self.perf_score
    }

    fn can_admit(&self, platform: &crate::platform::PlatformHandle, wcet: Duration, period: Duration) -> Option<f64> {
        let raw_util = wcet / period;
        let scaled = self.scaled_utilization(platform, raw_util);
        if self.scheduler.borrow().admission_test(scaled) {
            Some(scaled)
        } else {
            None
        }
    }

    fn remaining_capacity(&self) -> f64 {
        self.scheduler.borrow().processor_count() as f64 - self.scheduler.borrow().total_utilization()
    }
}

/// Picks a cluster index among the ones that admit a new task (spec
/// §4.11's three `MultiClusterAllocator` subclasses).
pub trait ClusterStrategy {
    fn select(&self, admitting: &[(usize, f64)], clusters: &[Cluster]) -> usize;
}

/// Scans clusters in construction order; the first admitting cluster
/// wins.
pub struct FirstFit;
impl ClusterStrategy for FirstFit {
    fn select(&self, admitting: &[(usize, f64)], _clusters: &[Cluster]) -> usize {
        admitting[0].0
    }
}

/// Among admitting clusters, picks the one with the smallest remaining
/// capacity (tightest fit).
pub struct BestFit;
impl ClusterStrategy for BestFit {
    fn select(&self, admitting: &[(usize, f64)], clusters: &[Cluster]) -> usize {
        admitting
            .iter()
            .min_by(|a, b| clusters[a.0].remaining_capacity().total_cmp(&clusters[b.0].remaining_capacity()))
            .map(|&(idx, _)| idx)
            .unwrap()
    }
}

/// Among admitting clusters, picks the one with the largest remaining
/// capacity (spread load out).
pub struct WorstFit;
impl ClusterStrategy for WorstFit {
    fn select(&self, admitting: &[(usize, f64)], clusters: &[Cluster]) -> usize {
        admitting
            .iter()
            .max_by(|a, b| clusters[a.0].remaining_capacity().total_cmp(&clusters[b.0].remaining_capacity()))
            .map(|&(idx, _)| idx)
            .unwrap()
    }
}

/// Binds each task permanently to one cluster on its first arrival (spec
/// §4.11: "binding is not revoked on task idleness"); subsequent arrivals
/// forward straight to the bound cluster's scheduler.
pub struct MultiClusterAllocator<S: ClusterStrategy> {
    platform: crate::platform::PlatformHandle,
    clusters: Vec<Cluster>,
    strategy: S,
    bindings: RefCell<HashMap<TaskId, usize>>,
    wcet_period: RefCell<HashMap<TaskId, (Duration, Duration)>>,
}

impl<S: ClusterStrategy> MultiClusterAllocator<S> {
    pub fn new(platform: crate::platform::PlatformHandle, clusters: Vec<Cluster>, strategy: S) -> Self {
        MultiClusterAllocator {
            platform,
            clusters,
            strategy,
            bindings: RefCell::new(HashMap::new()),
            wcet_period: RefCell::new(HashMap::new()),
        }
    }

    /// Registers a task's static WCET/period so its first arrival can be
    /// cluster-bound; call this once per task before the engine runs.
    pub fn register_task(&self, task: TaskId, wcet: Duration, period: Duration) {
        self.wcet_period.borrow_mut().insert(task, (wcet, period));
    }

    fn bind(&self, task: TaskId) -> Result<usize> {
        if let Some(&idx) = self.bindings.borrow().get(&task) {
            return Ok(idx);
        }
        let (wcet, period) = *self
            .wcet_period
            .borrow()
            .get(&task)
            .ok_or_else(|| Error::InvalidState(format!("task {task} was never registered with the allocator")))?;

        let admitting: Vec<(usize, f64)> = self
            .clusters
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.can_admit(&self.platform, wcet, period).map(|u| (i, u)))
            .collect();
        if admitting.is_empty() {
            self.platform.queue().borrow_mut().trace(|w| {
                w.begin(self.platform.now());
                w.field_u64("task_id", task.index() as u64);
                w.end("task_rejected");
            });
            return Err(Error::AdmissionFailure(format!("task {task} fits no cluster")));
        }
        let idx = self.strategy.select(&admitting, &self.clusters);
        let scaled_util = admitting.iter().find(|&&(i, _)| i == idx).unwrap().1;
        self.clusters[idx].scheduler.borrow_mut().attach_task(task, period, scaled_util);
        self.bindings.borrow_mut().insert(task, idx);
        self.platform.queue().borrow_mut().trace(|w| {
            w.begin(self.platform.now());
            w.field_u64("task_id", task.index() as u64);
            w.field_u64("cluster", idx as u64);
            w.end("task_placed");
        });
        Ok(idx)
    }
}

impl<S: ClusterStrategy> Allocator for MultiClusterAllocator<S> {
    fn on_job_arrival(&self, task: TaskId, job: Job) -> Result<()> {
        let idx = self.bind(task)?;
        EdfScheduler::on_job_arrival(&self.clusters[idx].scheduler, task, job)
    }
}
