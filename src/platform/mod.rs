//! The hardware platform: processor types, clock domains, power domains,
//! processors, and tasks, plus the `PlatformHandle` facade that drives the
//! processor/clock-domain finite-state-machines against the event queue
//! and energy tracker (spec §3 "Platform", §4.2-§4.5).
//!
//! `Platform` itself only holds arenas of plain data; it never reaches
//! for the event queue. Anything that needs to schedule or cancel a
//! timer goes through `PlatformHandle`, which bundles the `Rc<RefCell<_>>`
//! handles together (spec §9 "Cyclic references").

pub mod clock_domain;
pub mod power_domain;
pub mod proc_type;
pub mod processor;
pub mod task;

pub use clock_domain::{ClockDomain, PowerCoefficients};
pub use power_domain::{CStateLevel, CStateScope, PowerDomain};
pub use proc_type::ProcessorType;
pub use processor::{Processor, ProcessorState};
pub use task::Task;

use crate::energy::EnergyTracker;
use crate::error::{Error, Result};
use crate::event::{priority, EventKind, EventQueue};
use crate::ids::{ClockDomainId, PowerDomainId, ProcessorId, ProcessorTypeId, TaskId};
use crate::job::Job;
use crate::time::{Frequency, TimePoint};
use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;

#[derive(Debug)]
pub struct Platform {
    pub proc_types: Vec<ProcessorType>,
    pub clock_domains: Vec<ClockDomain>,
    pub power_domains: Vec<PowerDomain>,
    pub processors: Vec<Processor>,
    pub tasks: Vec<Task>,
    pub reference_performance: f64,
}

impl Platform {
    pub fn proc_type(&self, id: ProcessorTypeId) -> &ProcessorType {
        &self.proc_types[id.index()]
    }
    pub fn clock_domain(&self, id: ClockDomainId) -> &ClockDomain {
        &self.clock_domains[id.index()]
    }
    pub fn power_domain(&self, id: PowerDomainId) -> &PowerDomain {
        &self.power_domains[id.index()]
    }
    pub fn processor(&self, id: ProcessorId) -> &Processor {
        &self.processors[id.index()]
    }
    pub fn task(&self, id: TaskId) -> &Task {
        &self.tasks[id.index()]
    }

    pub fn speed(&self, proc: ProcessorId) -> f64 {
        let p = self.processor(proc);
        p.speed(self.proc_type(p.proc_type), self.clock_domain(p.clock_domain))
    }
}

/// Builds a `Platform` by accumulating arenas; `finalize()` consumes the
/// builder so nothing can add hardware after the simulation starts (the
/// typestate equivalent of spec §4.1's runtime `AlreadyFinalized` check,
/// enforced here at compile time instead).
#[derive(Default)]
pub struct PlatformBuilder {
    proc_types: Vec<ProcessorType>,
    clock_domains: Vec<ClockDomain>,
    power_domains: Vec<PowerDomain>,
    processors: Vec<Processor>,
    tasks: Vec<Task>,
}

impl PlatformBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_proc_type(&mut self, pt: ProcessorType) -> ProcessorTypeId {
        let id = ProcessorTypeId(self.proc_types.len() as u32);
        self.proc_types.push(pt);
        id
    }

    pub fn add_clock_domain(&mut self, freq_min: Frequency, freq_max: Frequency, transition_delay: crate::time::Duration) -> ClockDomainId {
        let id = ClockDomainId(self.clock_domains.len() as u32);
        self.clock_domains.push(ClockDomain::new(id, freq_min, freq_max, transition_delay));
        id
    }

    pub fn clock_domain_mut(&mut self, id: ClockDomainId) -> &mut ClockDomain {
        &mut self.clock_domains[id.index()]
    }

    pub fn add_power_domain(&mut self, c_states: Vec<CStateLevel>) -> PowerDomainId {
        let id = PowerDomainId(self.power_domains.len() as u32);
        self.power_domains.push(PowerDomain::new(id, c_states));
        id
    }

    pub fn add_processor(&mut self, proc_type: ProcessorTypeId, clock_domain: ClockDomainId, power_domain: PowerDomainId) -> ProcessorId {
        let id = ProcessorId(self.processors.len() as u32);
        self.processors.push(Processor::new(id, proc_type, clock_domain, power_domain));
        self.clock_domains[clock_domain.index()].add_processor(id);
        self.power_domains[power_domain.index()].add_processor(id);
        id
    }

    pub fn add_task(&mut self, task: Task) -> TaskId {
        self.tasks.push(task);
        task.id
    }

    /// Reference performance is the fastest declared processor type's
    /// `performance`; every processor's speed is relative to it (spec §3
    /// "Task": "Per-type WCET is WCET / (type.performance /
    /// reference_performance)" implies the reference type runs at speed
    /// 1.0, which only the fastest type can guarantee for all tasks).
    pub fn finalize(mut self) -> Result<Platform> {
        if self.proc_types.is_empty() {
            return Err(Error::InvalidState("platform has no processor types".into()));
        }
        let reference_performance = self
            .proc_types
            .iter()
            .map(|t| t.performance)
            .fold(f64::MIN, f64::max);
        for p in &mut self.processors {
            p.reference_performance = reference_performance;
        }
        Ok(Platform {
            proc_types: self.proc_types,
            clock_domains: self.clock_domains,
            power_domains: self.power_domains,
            processors: self.processors,
            tasks: self.tasks,
            reference_performance,
        })
    }
}

/// Bundles the platform together with the event queue and (optional)
/// energy tracker it needs to drive processor and clock-domain
/// transitions. Cloning is cheap (all fields are `Rc`); every `Engine`
/// component that touches hardware state holds one of these rather than
/// a bare `Rc<RefCell<Platform>>`.
#[derive(Clone)]
pub struct PlatformHandle {
    platform: Rc<RefCell<Platform>>,
    queue: Rc<RefCell<EventQueue>>,
    energy: Option<Rc<RefCell<EnergyTracker>>>,
}

impl PlatformHandle {
    pub fn new(platform: Platform, queue: Rc<RefCell<EventQueue>>, energy: Option<Rc<RefCell<EnergyTracker>>>) -> Self {
        PlatformHandle { platform: Rc::new(RefCell::new(platform)), queue, energy }
    }

    pub fn platform(&self) -> Ref<'_, Platform> {
        self.platform.borrow()
    }

    pub fn platform_mut(&self) -> RefMut<'_, Platform> {
        self.platform.borrow_mut()
    }

    pub fn queue(&self) -> &Rc<RefCell<EventQueue>> {
        &self.queue
    }

    pub fn now(&self) -> TimePoint {
        self.queue.borrow().now()
    }

    fn note_power_change(&self, proc: ProcessorId) {
        if let Some(energy) = &self.energy {
            let power_domain = self.platform().processor(proc).power_domain;
            energy.borrow_mut().on_power_domain_changed(power_domain, &self.platform(), self.now());
        }
    }

    /// Cancels a processor's completion and deadline timers, clearing its
    /// current job. Valid from any state; leaves `Changing` untouched but
    /// for bookkeeping (spec §4.3 "pending_clear").
    pub fn clear(&self, proc_id: ProcessorId) -> Result<()> {
        let mut q = self.queue.borrow_mut();
        let mut platform = self.platform_mut();
        let proc = &mut platform.processors[proc_id.index()];
        q.cancel(&mut proc.completion_timer);
        q.cancel(&mut proc.deadline_timer);
        proc.current_job = None;
        proc.pending_job = None;
        proc.running_server = None;
        proc.on_complete = None;
        if proc.state == ProcessorState::Changing {
            proc.pending_clear = true;
        } else {
            proc.state = ProcessorState::Idle;
        }
        Ok(())
    }

    /// Arms a processor's completion and deadline timers for `job`,
    /// transitioning through `ContextSwitching` first when the
    /// processor's type has a non-zero switch delay (spec §4.3
    /// "Assignment").
    pub fn assign(&self, proc_id: ProcessorId, server_id: crate::ids::ServerId, job: Job, on_complete: impl FnOnce(ProcessorId) + 'static, on_deadline_miss: impl FnOnce(ProcessorId) + 'static) -> Result<()> {
        let (state, switch_delay) = {
            let platform = self.platform();
            let proc = platform.processor(proc_id);
            (proc.state, platform.proc_type(proc.proc_type).context_switch_delay)
        };
        match state {
            ProcessorState::Running => {
                return Err(Error::InvalidState(format!("processor {proc_id} is already running a job")))
            }
            ProcessorState::ContextSwitching | ProcessorState::Changing => {
                self.platform_mut().processors[proc_id.index()].pending_job = Some(job);
                return Ok(());
            }
            ProcessorState::Sleep | ProcessorState::Idle => {}
        }

        if switch_delay.is_positive() {
            self.platform_mut().processors[proc_id.index()].state = ProcessorState::ContextSwitching;
            self.note_power_change(proc_id);
            let handle = self.clone();
            let arm_at = self.now() + switch_delay;
            self.queue
                .borrow_mut()
                .add_timer(arm_at, priority::TIMER_DEFAULT, Box::new(move || {
                    handle.start_running(proc_id, server_id, job, on_complete, on_deadline_miss);
                }))?;
            Ok(())
        } else {
            self.start_running(proc_id, server_id, job, on_complete, on_deadline_miss);
            Ok(())
        }
    }

    fn start_running(&self, proc_id: ProcessorId, server_id: crate::ids::ServerId, job: Job, on_complete: impl FnOnce(ProcessorId) + 'static, on_deadline_miss: impl FnOnce(ProcessorId) + 'static) {
        let now = self.now();
        let speed = self.platform().speed(proc_id);
        let delta = Processor::completion_delta(job.remaining, speed);

        {
            let mut platform = self.platform_mut();
            let proc = &mut platform.processors[proc_id.index()];
            proc.state = ProcessorState::Running;
            proc.current_job = Some(job);
            proc.running_server = Some(server_id);
            proc.last_update = now;
            proc.on_complete = Some(Box::new(on_complete));
        }
        self.note_power_change(proc_id);

        let handle = self.clone();
        let completion_timer = self.queue.borrow_mut().add_timer(
            now + delta,
            priority::JOB_COMPLETION,
            Box::new(move || handle.on_completion_fired(proc_id)),
        ).expect("completion timer scheduled in the future");

        let handle2 = self.clone();
        let deadline_timer = if job.absolute_deadline >= now {
            self.queue
                .borrow_mut()
                .add_timer(
                    job.absolute_deadline,
                    priority::DEADLINE_MISS,
                    Box::new(move || handle2.on_deadline_fired(proc_id, on_deadline_miss)),
                )
                .expect("deadline is not in the past")
        } else {
            crate::event::TimerId::invalid()
        };

        let mut platform = self.platform_mut();
        let proc = &mut platform.processors[proc_id.index()];
        proc.completion_timer = completion_timer;
        proc.deadline_timer = deadline_timer;
    }

    fn on_completion_fired(&self, proc_id: ProcessorId) {
        let on_complete = {
            let mut platform = self.platform_mut();
            let proc = &mut platform.processors[proc_id.index()];
            self.queue.borrow_mut().cancel(&mut proc.deadline_timer);
            proc.current_job = None;
            proc.running_server = None;
            proc.state = ProcessorState::Idle;
            proc.on_complete.take()
        };
        if let Some(on_complete) = on_complete {
            on_complete(proc_id);
        }
    }

    fn on_deadline_fired(&self, proc_id: ProcessorId, on_deadline_miss: impl FnOnce(ProcessorId)) {
        on_deadline_miss(proc_id);
    }

    /// Updates `current_job.remaining` for work consumed since
    /// `last_update`, without altering timers; used before a reschedule
    /// changes the processor's speed or assignment (spec §4.9 "update
    /// running jobs before recomputing the schedule").
    pub fn update_running_job(&self, proc_id: ProcessorId) {
        let now = self.now();
        let speed = self.platform().speed(proc_id);
        let mut platform = self.platform_mut();
        let proc = &mut platform.processors[proc_id.index()];
        if let Some(job) = proc.current_job.as_mut() {
            let consumed = (now - proc.last_update) * speed;
            job.consume(consumed);
        }
        proc.last_update = now;
    }

    /// Requests a C-state for `proc`; scheduling a wake is the caller's
    /// responsibility via `assign` (entering `Idle` with a deep C-state
    /// requested simply changes the processor's power draw, spec §4.5).
    pub fn request_c_state(&self, proc_id: ProcessorId, level: u8) {
        let power_domain = self.platform().processor(proc_id).power_domain;
        self.platform_mut().power_domains[power_domain.index()].request(proc_id, level);
        self.note_power_change(proc_id);
    }

    /// Begins a frequency transition on `domain`: all processors in the
    /// domain move to `Changing`, preserving their prior state, and the
    /// requested frequency takes effect after `transition_delay` (spec
    /// §4.4). Errors propagate `ClockDomain::validate_frequency`.
    pub fn set_frequency(&self, domain_id: ClockDomainId, requested: Frequency) -> Result<()> {
        let (target, delay, member_procs) = {
            let platform = self.platform();
            let domain = platform.clock_domain(domain_id);
            domain.validate_frequency(requested)?;
            (domain.ceil_to_mode(requested), domain.transition_delay, domain.processors.clone())
        };

        {
            let mut platform = self.platform_mut();
            let domain = &mut platform.clock_domains[domain_id.index()];
            domain.transitioning = true;
            domain.pending_freq = Some(target);
            for &p in &member_procs {
                let proc = &mut platform.processors[p.index()];
                proc.pre_dvfs_state = Some(proc.state);
                proc.state = ProcessorState::Changing;
            }
        }
        for &p in &member_procs {
            self.note_power_change(p);
        }

        if delay.is_zero() {
            self.finish_frequency_transition(domain_id);
            return Ok(());
        }

        let handle = self.clone();
        self.queue.borrow_mut().schedule(
            self.now() + delay,
            priority::TIMER_DEFAULT,
            EventKind::Timer,
            Box::new(move || handle.finish_frequency_transition(domain_id)),
        )?;
        Ok(())
    }

    fn finish_frequency_transition(&self, domain_id: ClockDomainId) {
        let member_procs = self.platform().clock_domain(domain_id).processors.clone();

        // Flush work consumed during the transition at the pre-transition
        // speed before the new frequency takes effect (spec §4.3/§4.4:
        // a speed change "reschedules the completion timer" — the job's
        // remaining work must be accurate first).
        let was_running: Vec<ProcessorId> = member_procs
            .iter()
            .copied()
            .filter(|&p| {
                let platform = self.platform();
                let proc = platform.processor(p);
                proc.pre_dvfs_state == Some(ProcessorState::Running) && proc.current_job.is_some()
            })
            .collect();
        for &p in &was_running {
            self.update_running_job(p);
        }

        {
            let mut platform = self.platform_mut();
            let domain = &mut platform.clock_domains[domain_id.index()];
            domain.transitioning = false;
            if let Some(f) = domain.pending_freq.take() {
                domain.current_freq = f;
            }
        }
        for &p in &member_procs {
            let mut platform = self.platform_mut();
            let proc = &mut platform.processors[p.index()];
            let restored = proc.pre_dvfs_state.take().unwrap_or(ProcessorState::Idle);
            proc.state = if proc.pending_clear {
                proc.pending_clear = false;
                proc.current_job = None;
                proc.on_complete = None;
                ProcessorState::Idle
            } else {
                restored
            };
        }

        // Now that the new frequency is in effect, retime the completion
        // timer of whichever of those processors is still running its job.
        for &p in &was_running {
            if self.platform().processor(p).state == ProcessorState::Running {
                self.rearm_running_completion(p);
            }
        }

        for p in member_procs {
            self.note_power_change(p);
        }
    }

    /// Cancels and re-arms `proc_id`'s completion timer from its current
    /// remaining work at its current speed, without disturbing the stored
    /// `on_complete` callback (spec §4.4 "reschedules completion based on
    /// the new speed"; also used by `EdfScheduler::call_resched`'s step 5
    /// when reclamation reports a global budget shift, spec §4.9).
    pub fn rearm_running_completion(&self, proc_id: ProcessorId) {
        let now = self.now();
        let Some((remaining, speed)) = ({
            let platform = self.platform();
            platform.processor(proc_id).current_job.map(|job| (job.remaining, platform.speed(proc_id)))
        }) else {
            return;
        };
        let delta = Processor::completion_delta(remaining, speed);

        {
            let mut platform = self.platform_mut();
            self.queue.borrow_mut().cancel(&mut platform.processors[proc_id.index()].completion_timer);
        }
        let handle = self.clone();
        let timer = self
            .queue
            .borrow_mut()
            .add_timer(now + delta, priority::JOB_COMPLETION, Box::new(move || handle.on_completion_fired(proc_id)))
            .expect("completion timer scheduled in the future");
        self.platform_mut().processors[proc_id.index()].completion_timer = timer;
    }
}
