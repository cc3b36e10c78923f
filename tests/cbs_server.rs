//! CBS server invariants (spec §8): work conservation (3), virtual-time
//! monotonicity (4), budget non-negativity (5), and the CBS deadline
//! equation (6).

use schedsim::ids::{ServerId, TaskId};
use schedsim::job::Job;
use schedsim::server::{CbsServer, ServerState};
use schedsim::time::{Duration, TimePoint};

fn server(period_s: f64, utilization: f64) -> CbsServer {
    CbsServer::new(ServerId(0), TaskId(0), Duration::from_secs_f64(period_s), utilization)
}

#[test]
fn work_conservation_holds_as_a_job_is_consumed_to_completion() {
    let total = Duration::from_secs_f64(2.0);
    let mut job = Job::new(TaskId(0), TimePoint::ZERO, Duration::from_secs_f64(10.0), total);
    let mut consumed = Duration::ZERO;
    for _ in 0..4 {
        let chunk = Duration::from_secs_f64(0.5);
        job.consume(chunk);
        consumed += chunk;
        assert_eq!(consumed + job.remaining, total);
    }
    assert!(job.is_complete());
    assert_eq!(job.remaining, Duration::ZERO);
}

#[test]
fn virtual_time_never_moves_backwards() {
    let mut s = server(1.0, 0.25);
    s.change_state(ServerState::Ready, TimePoint::ZERO);
    s.set_virtual_time(TimePoint::ZERO + Duration::from_secs_f64(1.0));
    s.set_virtual_time(TimePoint::ZERO + Duration::from_secs_f64(1.5));
    assert_eq!(s.virtual_time(), TimePoint::ZERO + Duration::from_secs_f64(1.5));
}

#[test]
#[should_panic]
fn setting_virtual_time_backwards_is_a_debug_assertion_failure() {
    let mut s = server(1.0, 0.25);
    s.set_virtual_time(TimePoint::ZERO + Duration::from_secs_f64(2.0));
    s.set_virtual_time(TimePoint::ZERO + Duration::from_secs_f64(1.0));
}

#[test]
fn budget_is_never_negative_even_when_overconsumed() {
    let mut s = server(1.0, 0.5);
    s.recharge_budget(Duration::from_secs_f64(0.3));
    s.consume_budget(Duration::from_secs_f64(10.0));
    assert_eq!(s.budget(), Duration::ZERO);
    s.grant_extra_budget(Duration::from_secs_f64(0.1));
    assert!(s.budget() >= Duration::ZERO);
}

#[test]
fn budget_never_exceeds_what_was_recharged_plus_explicit_grants() {
    let mut s = server(1.0, 0.5);
    s.recharge_budget(Duration::from_secs_f64(0.5));
    assert_eq!(s.budget(), Duration::from_secs_f64(0.5));
}

#[test]
fn activation_deadline_is_exactly_k_periods_from_the_activation_instant() {
    let period = 2.0;
    let mut s = server(period, 0.25);
    let t0 = TimePoint::ZERO + Duration::from_secs_f64(3.0);
    s.change_state(ServerState::Ready, t0);
    assert_eq!(s.deadline(), t0 + Duration::from_secs_f64(period));

    // Budget exhaustion postpones by whole periods, preserving the k*T form.
    s.postpone();
    s.postpone();
    let delta = s.deadline() - t0;
    let k = (delta.as_secs_f64() / period).round();
    assert!((delta.as_secs_f64() - k * period).abs() < 1e-9);
    assert!(k >= 1.0);
}
