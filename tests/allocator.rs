//! `MultiClusterAllocator` placement strategies (spec §4.11): FirstFit,
//! BestFit, WorstFit, sticky binding, and admission-failure rejection.
//! `MultiClusterAllocator::bindings` is crate-private, so these drive the
//! allocator purely through `Allocator::on_job_arrival` and observe the
//! effect on each cluster's `EdfScheduler::total_utilization`.

use schedsim::allocator::{Allocator, BestFit, Cluster, FirstFit, MultiClusterAllocator, WorstFit};
use schedsim::energy::EnergyTracker;
use schedsim::event::EventQueue;
use schedsim::ids::{ClockDomainId, TaskId};
use schedsim::job::Job;
use schedsim::platform::proc_type::ProcessorType;
use schedsim::platform::{CStateLevel, CStateScope, Platform, PlatformBuilder, PlatformHandle};
use schedsim::reclaim::StandardPolicy;
use schedsim::scheduler::EdfScheduler;
use schedsim::time::{Duration, Frequency, Power};
use std::cell::RefCell;
use std::rc::Rc;

fn small_platform(n: usize) -> (PlatformHandle, ClockDomainId) {
    let mut b = PlatformBuilder::new();
    let pt = b.add_proc_type(ProcessorType { name: "core".into(), performance: 1.0, context_switch_delay: Duration::ZERO });
    let cd = b.add_clock_domain(Frequency(1000.0), Frequency(1000.0), Duration::ZERO);
    let pd = b.add_power_domain(vec![CStateLevel { level: 0, scope: CStateScope::PerProcessor, wake_latency: Duration::ZERO, power: Power(0.0) }]);
    for _ in 0..n {
        b.add_processor(pt, cd, pd);
    }
    let platform: Platform = b.finalize().unwrap();
    let queue = EventQueue::new();
    let energy: Option<Rc<RefCell<EnergyTracker>>> = None;
    (PlatformHandle::new(platform, queue, energy), cd)
}

fn cluster(platform: &PlatformHandle, domain: ClockDomainId, procs: Vec<schedsim::ids::ProcessorId>, preload: f64) -> Cluster {
    let scheduler = EdfScheduler::new(platform.clone(), Box::new(StandardPolicy::new()), procs);
    if preload > 0.0 {
        scheduler.borrow_mut().attach_task(TaskId(999), Duration::from_secs_f64(10.0), preload);
    }
    Cluster { clock_domain: domain, scheduler, perf_score: 1.0, reference_freq_max: Frequency(1000.0), u_target: 1.0 }
}

#[test]
fn first_fit_places_on_the_first_admitting_cluster_in_order() {
    let (platform, domain) = small_platform(4);
    let procs = platform.platform().clock_domain(domain).processors.clone();
    let c0 = cluster(&platform, domain, vec![procs[0], procs[1]], 0.0);
    let c1 = cluster(&platform, domain, vec![procs[2], procs[3]], 0.0);
    let s0 = c0.scheduler.clone();
    let s1 = c1.scheduler.clone();
    let allocator = MultiClusterAllocator::new(platform.clone(), vec![c0, c1], FirstFit);

    let task = TaskId(0);
    allocator.register_task(task, Duration::from_secs_f64(1.0), Duration::from_secs_f64(4.0));
    let job = Job::new(task, platform.now(), Duration::from_secs_f64(4.0), Duration::from_secs_f64(1.0));
    allocator.on_job_arrival(task, job).unwrap();

    assert!(s0.borrow().total_utilization() > 0.0, "first admitting cluster gets the task");
    assert_eq!(s1.borrow().total_utilization(), 0.0);
}

#[test]
fn best_fit_picks_the_admitting_cluster_with_the_least_remaining_capacity() {
    let (platform, domain) = small_platform(4);
    let procs = platform.platform().clock_domain(domain).processors.clone();
    // c0 remaining capacity 1.7, c1 remaining capacity 1.9: best-fit (tightest) picks c0.
    let c0 = cluster(&platform, domain, vec![procs[0], procs[1]], 0.3);
    let c1 = cluster(&platform, domain, vec![procs[2], procs[3]], 0.1);
    let s0 = c0.scheduler.clone();
    let s1 = c1.scheduler.clone();
    let allocator = MultiClusterAllocator::new(platform.clone(), vec![c0, c1], BestFit);

    let task = TaskId(0);
    allocator.register_task(task, Duration::from_secs_f64(0.4), Duration::from_secs_f64(2.0));
    let job = Job::new(task, platform.now(), Duration::from_secs_f64(2.0), Duration::from_secs_f64(0.4));
    allocator.on_job_arrival(task, job).unwrap();

    assert!(s0.borrow().total_utilization() > 0.3, "best-fit (tightest remaining capacity) is c0");
    assert_eq!(s1.borrow().total_utilization(), 0.1);
}

#[test]
fn worst_fit_picks_the_admitting_cluster_with_the_most_remaining_capacity() {
    let (platform, domain) = small_platform(4);
    let procs = platform.platform().clock_domain(domain).processors.clone();
    // Same setup as best-fit, but worst-fit (spread load) picks c1 instead.
    let c0 = cluster(&platform, domain, vec![procs[0], procs[1]], 0.3);
    let c1 = cluster(&platform, domain, vec![procs[2], procs[3]], 0.1);
    let s0 = c0.scheduler.clone();
    let s1 = c1.scheduler.clone();
    let allocator = MultiClusterAllocator::new(platform.clone(), vec![c0, c1], WorstFit);

    let task = TaskId(0);
    allocator.register_task(task, Duration::from_secs_f64(0.4), Duration::from_secs_f64(2.0));
    let job = Job::new(task, platform.now(), Duration::from_secs_f64(2.0), Duration::from_secs_f64(0.4));
    allocator.on_job_arrival(task, job).unwrap();

    assert_eq!(s0.borrow().total_utilization(), 0.3);
    assert!(s1.borrow().total_utilization() > 0.1, "worst-fit (most remaining capacity) is c1");
}

#[test]
fn binding_is_sticky_across_repeated_arrivals() {
    let (platform, domain) = small_platform(2);
    let procs = platform.platform().clock_domain(domain).processors.clone();
    let c0 = cluster(&platform, domain, vec![procs[0]], 0.0);
    let c1 = cluster(&platform, domain, vec![procs[1]], 0.0);
    let s0 = c0.scheduler.clone();
    let allocator = MultiClusterAllocator::new(platform.clone(), vec![c0, c1], FirstFit);

    let task = TaskId(0);
    allocator.register_task(task, Duration::from_secs_f64(0.1), Duration::from_secs_f64(4.0));
    for _ in 0..3 {
        let job = Job::new(task, platform.now(), Duration::from_secs_f64(4.0), Duration::from_secs_f64(0.1));
        allocator.on_job_arrival(task, job).unwrap();
    }
    // a re-attach on every arrival would push total_utilization to 3x a single server's share.
    assert_eq!(s0.borrow().processor_count(), 1);
    let u = s0.borrow().total_utilization();
    assert!(u > 0.0 && u < 0.5, "task was bound exactly once, got total_utilization={u}");
}

#[test]
fn a_task_that_fits_no_cluster_is_rejected() {
    let (platform, domain) = small_platform(1);
    let procs = platform.platform().clock_domain(domain).processors.clone();
    let c0 = cluster(&platform, domain, procs, 0.9);
    let allocator = MultiClusterAllocator::new(platform.clone(), vec![c0], FirstFit);

    let task = TaskId(0);
    // wcet == period: utilization 1.0, on top of an existing 0.9 load on a single core.
    allocator.register_task(task, Duration::from_secs_f64(1.0), Duration::from_secs_f64(1.0));
    let job = Job::new(task, platform.now(), Duration::from_secs_f64(1.0), Duration::from_secs_f64(1.0));
    let err = allocator.on_job_arrival(task, job).unwrap_err();
    assert!(matches!(err, schedsim::Error::AdmissionFailure(_)));
}
