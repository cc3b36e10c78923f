//! Global-EDF scheduler across a cluster's processors (spec §3
//! "EdfScheduler", §4.9). Grounded on `sched_parallel` in
//! `examples/original_source/schedsim/src/schedulers/parallel.cpp`: the
//! same five-step reschedule (update running servers, update the
//! platform, partition active/sleeping processors, place ready servers
//! by earliest deadline onto the least-priority active processor, then
//! arm alarms) translated from shared-pointer entities to arena ids.

use crate::dvfs::DvfsPolicy;
use crate::error::Result;
use crate::event::priority;
use crate::ids::{ProcessorId, ServerId, TaskId};
use crate::job::Job;
use crate::platform::processor::Processor;
use crate::platform::{PlatformHandle, ProcessorState};
use crate::reclaim::{ReclamationPolicy, ServerStateChange};
use crate::server::{CbsServer, ServerState};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

pub struct EdfScheduler {
    platform: PlatformHandle,
    reclaim: Box<dyn ReclamationPolicy>,
    dvfs: Option<Box<dyn DvfsPolicy>>,
    processors: Vec<ProcessorId>,
    servers: Vec<CbsServer>,
    task_server: HashMap<TaskId, ServerId>,
    /// Job waiting to be dispatched or currently running, per server.
    jobs: HashMap<ServerId, Job>,
    deadline_misses: u64,
}

impl EdfScheduler {
    pub fn new(platform: PlatformHandle, reclaim: Box<dyn ReclamationPolicy>, processors: Vec<ProcessorId>) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(EdfScheduler {
            platform,
            reclaim,
            dvfs: None,
            processors,
            servers: Vec::new(),
            task_server: HashMap::new(),
            jobs: HashMap::new(),
            deadline_misses: 0,
        }))
    }

    pub fn set_dvfs_policy(&mut self, policy: Box<dyn DvfsPolicy>) {
        self.dvfs = Some(policy);
    }

    pub fn deadline_misses(&self) -> u64 {
        self.deadline_misses
    }

    pub fn processor_count(&self) -> usize {
        self.processors.len()
    }

    pub fn total_utilization(&self) -> f64 {
        self.servers.iter().map(|s| s.utilization).sum()
    }

    fn max_utilization(&self, including: f64) -> f64 {
        self.servers.iter().map(|s| s.utilization).fold(including, f64::max)
    }

    /// Global-EDF sufficient schedulability bound:
    /// `U_total + U_new <= m - (m - 1) * u_max` (spec §4.9 "admission
    /// test"), matching `sched_parallel::admission_test`.
    pub fn admission_test(&self, new_utilization: f64) -> bool {
        let m = self.processors.len() as f64;
        let u_max = self.max_utilization(new_utilization);
        let new_total = self.total_utilization() + new_utilization;
        new_total <= m - (m - 1.0) * u_max
    }

    pub fn attach_task(&mut self, task: TaskId, period: crate::time::Duration, utilization: f64) -> ServerId {
        let id = ServerId(self.servers.len() as u32);
        self.servers.push(CbsServer::new(id, task, period, utilization));
        self.task_server.insert(task, id);
        id
    }

    fn server_mut(&mut self, id: ServerId) -> &mut CbsServer {
        &mut self.servers[id.index()]
    }

    fn server(&self, id: ServerId) -> &CbsServer {
        &self.servers[id.index()]
    }

    /// A new job arrives for `task`; activates its server if it was
    /// `Inactive` and triggers a reschedule (spec §4.9 "arrival
    /// handling").
    pub fn on_job_arrival(scheduler: &Rc<RefCell<Self>>, task: TaskId, job: Job) -> Result<()> {
        let server_id = {
            let sched = scheduler.borrow();
            *sched
                .task_server
                .get(&task)
                .ok_or_else(|| crate::error::Error::InvalidState(format!("task {task} has no attached server")))?
        };
        let now = scheduler.borrow().platform.now();

        {
            let mut sched = scheduler.borrow_mut();
            sched.jobs.insert(server_id, job);
            let was_inactive = sched.server(server_id).state() == ServerState::Inactive;
            if was_inactive {
                let full_budget = sched.server(server_id).period * sched.server(server_id).utilization;
                sched.server_mut(server_id).recharge_budget(full_budget);
            }
            sched.server_mut(server_id).change_state(ServerState::Ready, now);
            if was_inactive {
                let EdfScheduler { servers, reclaim, .. } = &mut *sched;
                let server = &mut servers[server_id.index()];
                reclaim.on_server_state_change(server, ServerStateChange::Activated);
            }
            sched.platform.queue().borrow_mut().trace(|w| {
                w.begin(now);
                w.field_u64("task_id", task.index() as u64);
                w.field_u64("job_id", server_id.index() as u64);
                w.field_f64("duration", job.remaining.as_secs_f64());
                w.field_f64("deadline", job.absolute_deadline.as_secs_f64());
                w.end("job_arrival");
            });
        }

        Self::call_resched(scheduler);
        Ok(())
    }

    /// The five-step reschedule (spec §4.9):
    /// 1. update running servers' virtual time/budget for elapsed time,
    /// 2. let the DVFS/DPM policy retune the platform,
    /// 3. if reclamation reports a global bandwidth shift, recompute the
    ///    budget-exhaustion and completion timers of every server still
    ///    Running at this point,
    /// 4. partition processors into active/sleeping,
    /// 5. place ready servers on active processors by earliest deadline
    ///    (newly dispatched servers get their own fresh timers here).
    pub fn call_resched(scheduler: &Rc<RefCell<Self>>) {
        Self::update_running_servers(scheduler);
        let active_count = Self::update_platform(scheduler);
        Self::recalculate_running_timers(scheduler);
        Self::partition_active_processors(scheduler, active_count);
        Self::place_ready_servers(scheduler, active_count);
    }

    /// Spec §4.9 steps 5-6: when the reclamation policy's bandwidth
    /// factor can shift on any activation/completion (GRUB), every
    /// server still `Running` needs its budget-exhaustion timer (its
    /// effective budget depends on the now-stale bandwidth) and its
    /// completion timer (remaining work was just updated by
    /// `update_running_servers`) recomputed. Standard CBS and CASH
    /// report `false` here and this is a no-op for them, since nothing
    /// about their per-server budget depends on other servers' state.
    fn recalculate_running_timers(scheduler: &Rc<RefCell<Self>>) {
        if !scheduler.borrow().reclaim.needs_global_budget_recalculation() {
            return;
        }
        let running: Vec<(ProcessorId, ServerId)> = {
            let sched = scheduler.borrow();
            sched
                .processors
                .iter()
                .filter_map(|&p| sched.platform.platform().processor(p).running_server.map(|s| (p, s)))
                .collect()
        };
        for (proc_id, server_id) in running {
            Self::arm_budget_timer(scheduler, proc_id, server_id);
            scheduler.borrow().platform.rearm_running_completion(proc_id);
        }
    }

    fn update_running_servers(scheduler: &Rc<RefCell<Self>>) {
        let (procs, now) = {
            let sched = scheduler.borrow();
            (sched.processors.clone(), sched.platform.now())
        };
        for proc_id in procs {
            let server_id = {
                let sched = scheduler.borrow();
                let x = sched.platform.platform().processor(proc_id).running_server;
                x
            };
            let Some(server_id) = server_id else { continue };
            let mut sched = scheduler.borrow_mut();
            let running_time = sched.server(server_id).running_time(now);
            sched.platform.update_running_job(proc_id);
            let new_vt = sched
                .reclaim
                .compute_virtual_time(sched.server(server_id), sched.server(server_id).virtual_time(), running_time);
            let server = sched.server_mut(server_id);
            let vt_floor = server.virtual_time();
            server.set_virtual_time(new_vt.max(vt_floor));
            server.consume_budget(running_time);
            server.update_time(now);
        }
    }

    /// Lets the DVFS/DPM policy retune clock frequency for the elapsed
    /// window and report how many processors it wants kept active; with
    /// no policy installed every processor stays active (spec §4.10
    /// "apply-target sequence" feeds directly into the partition step).
    fn update_platform(scheduler: &Rc<RefCell<Self>>) -> usize {
        let (active_util, max_util, total) = {
            let sched = scheduler.borrow();
            (sched.total_utilization(), sched.max_utilization(0.0), sched.processors.len())
        };
        let sched = scheduler.borrow();
        match &sched.dvfs {
            Some(dvfs) => dvfs.update_platform(&sched.platform, &sched.processors, active_util, max_util),
            None => total,
        }
    }

    /// Orders processors idle-first, then by the deadline of their
    /// running server, sleeping last; anything past `active_count` is put
    /// (or kept) to sleep, anything within it is woken from sleep.
    fn partition_active_processors(scheduler: &Rc<RefCell<Self>>, active_count: usize) {
        let mut sched = scheduler.borrow_mut();
        let mut order: Vec<ProcessorId> = sched.processors.clone();
        order.sort_by(|&a, &b| Self::processor_order(&sched, a, b));

        for (idx, &proc_id) in order.iter().enumerate() {
            if idx < active_count {
                let asleep = sched.platform.platform().processor(proc_id).state == ProcessorState::Sleep;
                if asleep {
                    sched.platform.platform_mut().processors[proc_id.index()].state = ProcessorState::Idle;
                    sched.platform.request_c_state(proc_id, 0);
                }
            } else {
                let now = sched.platform.now();
                let running_server = sched.platform.platform().processor(proc_id).running_server;
                if let Some(server_id) = running_server {
                    sched.servers[server_id.index()].change_state(ServerState::Ready, now);
                    let EdfScheduler { servers, reclaim, .. } = &mut *sched;
                    let server = &mut servers[server_id.index()];
                    reclaim.on_server_state_change(server, ServerStateChange::Preempted);
                    let _ = sched.platform.clear(proc_id);
                }
                sched.platform.platform_mut().processors[proc_id.index()].state = ProcessorState::Sleep;
                sched.platform.request_c_state(proc_id, 1);
            }
        }
    }

    /// Idle sorts before a processor running a server; a running
    /// processor's priority is its server's deadline; sleeping sorts
    /// last (mirrors `sched_parallel::processor_order`).
    fn processor_order(sched: &EdfScheduler, a: ProcessorId, b: ProcessorId) -> std::cmp::Ordering {
        use std::cmp::Ordering;
        let platform = sched.platform.platform();
        let pa = platform.processor(a);
        let pb = platform.processor(b);
        match (pa.running_server, pb.running_server) {
            (None, None) => {
                let a_awake = pa.state != ProcessorState::Sleep;
                let b_awake = pb.state != ProcessorState::Sleep;
                b_awake.cmp(&a_awake)
            }
            (None, Some(_)) => {
                if pa.state != ProcessorState::Sleep { Ordering::Less } else { Ordering::Greater }
            }
            (Some(_), None) => {
                if pb.state != ProcessorState::Sleep { Ordering::Greater } else { Ordering::Less }
            }
            (Some(sa), Some(sb)) => sched.server(sa).deadline().cmp(&sched.server(sb).deadline()),
        }
    }

    fn place_ready_servers(scheduler: &Rc<RefCell<Self>>, active_count: usize) {
        loop {
            let placement = {
                let sched = scheduler.borrow();
                let mut ready: Vec<ServerId> = sched.servers.iter().filter(|s| s.state() == ServerState::Ready).map(|s| s.id).collect();
                ready.sort_by_key(|&s| sched.server(s).deadline());
                let Some(&highest) = ready.first() else { break };

                let running_count = sched
                    .processors
                    .iter()
                    .filter(|&&p| sched.platform.platform().processor(p).running_server.is_some())
                    .count();
                if running_count >= active_count {
                    break;
                }

                let mut ordered = sched.processors.clone();
                ordered.sort_by(|&a, &b| Self::processor_order(&sched, a, b));
                let least_priority = *ordered.last().unwrap();
                let should_place = match sched.platform.platform().processor(least_priority).running_server {
                    None => true,
                    Some(current) => sched.server(highest).deadline() < sched.server(current).deadline(),
                };
                if should_place { Some((least_priority, highest)) } else { break }
            };
            let Some((proc_id, server_id)) = placement else { break };
            Self::resched_proc(scheduler, proc_id, server_id);
        }
    }

    fn resched_proc(scheduler: &Rc<RefCell<Self>>, proc_id: ProcessorId, server_id: ServerId) {
        let now = scheduler.borrow().platform.now();
        {
            let mut sched = scheduler.borrow_mut();
            let preempted = sched.platform.platform().processor(proc_id).running_server;
            if let Some(preempted) = preempted {
                let _ = sched.platform.clear(proc_id);
                sched.servers[preempted.index()].change_state(ServerState::Ready, now);
                let EdfScheduler { servers, reclaim, .. } = &mut *sched;
                let server = &mut servers[preempted.index()];
                reclaim.on_server_state_change(server, ServerStateChange::Preempted);
            }
            sched.servers[server_id.index()].change_state(ServerState::Running, now);
            let EdfScheduler { servers, reclaim, .. } = &mut *sched;
            let server = &mut servers[server_id.index()];
            reclaim.on_server_state_change(server, ServerStateChange::Dispatched);
        }
        let job = scheduler.borrow().jobs.get(&server_id).copied();
        if let Some(job) = job {
            let platform = scheduler.borrow().platform.clone();
            let sched_for_complete = scheduler.clone();
            let sched_for_deadline = scheduler.clone();
            platform.queue().borrow_mut().trace(|w| {
                w.begin(now);
                w.field_u64("task_id", job.task.index() as u64);
                w.field_u64("job_id", server_id.index() as u64);
                w.field_u64("proc_id", proc_id.index() as u64);
                w.end("job_start");
            });
            let _ = platform.assign(
                proc_id,
                server_id,
                job,
                move |p| Self::on_processor_completion(&sched_for_complete, p, server_id),
                move |_p| Self::on_processor_deadline_miss(&sched_for_deadline, server_id),
            );
            Self::arm_budget_timer(scheduler, proc_id, server_id);
        }
    }

    /// Arms a timer at the server's effective budget horizon
    /// (`ReclamationPolicy::compute_server_budget`, scaled by the
    /// processor's current speed) so exhaustion is detected even when the
    /// job itself would run longer.
    fn arm_budget_timer(scheduler: &Rc<RefCell<Self>>, proc_id: ProcessorId, server_id: ServerId) {
        let mut sched = scheduler.borrow_mut();
        {
            let EdfScheduler { platform, servers, .. } = &mut *sched;
            platform.queue().borrow_mut().cancel(&mut servers[server_id.index()].budget_timer);
        }

        let now = sched.platform.now();
        let speed = sched.platform.platform().speed(proc_id);
        let budget = sched.reclaim.compute_server_budget(sched.server(server_id));
        if speed <= 0.0 || !budget.is_positive() {
            return;
        }
        let delay = Processor::completion_delta(budget, speed);
        let handle = scheduler.clone();
        let timer = sched
            .platform
            .queue()
            .borrow_mut()
            .add_timer(now + delay, priority::TIMER_DEFAULT, Box::new(move || Self::on_budget_exhausted(&handle, server_id)))
            .ok();
        if let Some(t) = timer {
            sched.servers[server_id.index()].budget_timer = t;
        }
    }

    /// The job assigned to `server_id` just finished on `proc_id`. Any
    /// budget the server had not yet consumed is handed to
    /// `ReclamationPolicy::on_early_completion` — under standard CBS that
    /// always answers `false` (straight to `Inactive`); GRUB may keep the
    /// server `NonContending` until its virtual deadline catches up (spec
    /// §4.7, §4.8).
    fn on_processor_completion(scheduler: &Rc<RefCell<Self>>, _proc_id: ProcessorId, server_id: ServerId) {
        let now = scheduler.borrow().platform.now();
        let mut sched = scheduler.borrow_mut();
        let task = sched.jobs.remove(&server_id).map(|j| j.task);
        let budget_left = sched.server(server_id).budget();
        let grub_like = {
            let EdfScheduler { servers, reclaim, .. } = &mut *sched;
            let server = &mut servers[server_id.index()];
            reclaim.on_early_completion(server, budget_left, now)
        };
        if grub_like {
            sched.servers[server_id.index()].change_state(ServerState::NonContending, now);
            let EdfScheduler { servers, reclaim, .. } = &mut *sched;
            let server = &mut servers[server_id.index()];
            reclaim.on_server_state_change(server, ServerStateChange::NonContending);
        } else {
            sched.servers[server_id.index()].change_state(ServerState::Inactive, now);
            let EdfScheduler { servers, reclaim, .. } = &mut *sched;
            let server = &mut servers[server_id.index()];
            reclaim.on_server_state_change(server, ServerStateChange::Completed);
        }
        if let Some(task) = task {
            sched.platform.queue().borrow_mut().trace(|w| {
                w.begin(now);
                w.field_u64("task_id", task.index() as u64);
                w.field_u64("job_id", server_id.index() as u64);
                w.end("job_completion");
            });
        }
        drop(sched);
        Self::call_resched(scheduler);
    }

    fn on_processor_deadline_miss(scheduler: &Rc<RefCell<Self>>, server_id: ServerId) {
        let mut sched = scheduler.borrow_mut();
        sched.deadline_misses += 1;
        let now = sched.platform.now();
        let task = sched.server(server_id).task;
        sched.platform.queue().borrow_mut().trace(|w| {
            w.begin(now);
            w.field_u64("task_id", task.index() as u64);
            w.field_u64("job_id", server_id.index() as u64);
            w.end("deadline_miss");
        });
    }

    /// Called when a server's CBS budget is exhausted mid-job (spec
    /// §4.9); grants extra budget from the reclamation policy, or
    /// postpones the server's deadline and reschedules.
    pub fn on_budget_exhausted(scheduler: &Rc<RefCell<Self>>, server_id: ServerId) {
        {
            let sched = scheduler.borrow();
            if sched.server(server_id).state() != ServerState::Running {
                return;
            }
        }
        {
            let mut sched = scheduler.borrow_mut();
            let now = sched.platform.now();
            let extra = {
                let EdfScheduler { servers, reclaim, .. } = &mut *sched;
                let server = &mut servers[server_id.index()];
                reclaim.on_budget_exhausted(server)
            };
            if extra.is_positive() {
                sched.servers[server_id.index()].grant_extra_budget(extra);
            } else {
                sched.servers[server_id.index()].postpone();
                let full = sched.server(server_id).period * sched.server(server_id).utilization;
                sched.servers[server_id.index()].recharge_budget(full);
                let deadline = sched.server(server_id).deadline();
                sched.platform.queue().borrow_mut().trace(|w| {
                    w.begin(now);
                    w.field_u64("job_id", server_id.index() as u64);
                    w.field_f64("deadline", deadline.as_secs_f64());
                    w.end("serv_postpone");
                });
            }
        }
        Self::call_resched(scheduler);
    }
}
