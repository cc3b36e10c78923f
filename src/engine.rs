//! Simulation driver (spec §4 intro component table, §5). `Engine` is the
//! single object a CLI binary constructs: it owns the event queue and the
//! platform, and wires in exactly one `Allocator` as the arrival handler
//! (spec §7/§8 "Single handler" — a second `set_allocator` call fails
//! with `Error::HandlerAlreadySet`).

use crate::allocator::Allocator;
use crate::error::{Error, Result};
use crate::event::EventQueue;
use crate::ids::TaskId;
use crate::job::Job;
use crate::platform::{Platform, PlatformHandle};
use crate::time::TimePoint;
use crate::trace::TraceSink;
use std::cell::RefCell;
use std::rc::Rc;

pub struct Engine {
    queue: Rc<RefCell<EventQueue>>,
    platform: PlatformHandle,
    energy: Option<Rc<RefCell<crate::energy::EnergyTracker>>>,
    allocator: Option<Rc<dyn Allocator>>,
}

impl Engine {
    /// Builds the queue (and, if `track_energy`, the energy tracker)
    /// before wrapping `platform` into a `PlatformHandle`, since the
    /// handle needs both up front (spec §4.2 "PlatformHandle").
    pub fn new(platform: Platform, track_energy: bool) -> Self {
        let queue = EventQueue::new();
        let energy = if track_energy {
            Some(Rc::new(RefCell::new(crate::energy::EnergyTracker::new())))
        } else {
            None
        };
        let platform = PlatformHandle::new(platform, queue.clone(), energy.clone());
        Engine { queue, platform, energy, allocator: None }
    }

    pub fn platform(&self) -> &PlatformHandle {
        &self.platform
    }

    pub fn queue(&self) -> &Rc<RefCell<EventQueue>> {
        &self.queue
    }

    pub fn energy(&self) -> Option<&Rc<RefCell<crate::energy::EnergyTracker>>> {
        self.energy.as_ref()
    }

    pub fn now(&self) -> TimePoint {
        self.queue.borrow().now()
    }

    pub fn set_trace_writer(&self, sink: Option<Box<dyn TraceSink>>) {
        self.queue.borrow_mut().set_trace_writer(sink);
    }

    pub fn flush_trace(&self) {
        self.queue.borrow_mut().flush_trace();
    }

    /// Installs the one allocator this engine will ever forward arrivals
    /// to; rejects a second call (spec §7 "HandlerAlreadySet").
    pub fn set_allocator(&mut self, allocator: Rc<dyn Allocator>) -> Result<()> {
        if self.allocator.is_some() {
            return Err(Error::HandlerAlreadySet("engine allocator is already set"));
        }
        self.allocator = Some(allocator);
        Ok(())
    }

    /// Schedules a job arrival event at `job.arrival`, dispatching to the
    /// installed allocator when it fires (spec §5 "arrival events enter
    /// through the single registered handler").
    pub fn schedule_arrival(&self, task: TaskId, job: Job) -> Result<()> {
        let allocator = self
            .allocator
            .clone()
            .ok_or_else(|| Error::InvalidState("no allocator registered on this engine".into()))?;
        self.queue.borrow_mut().schedule(
            job.arrival,
            crate::event::priority::JOB_ARRIVAL,
            crate::event::EventKind::JobArrival,
            Box::new(move || {
                if let Err(e) = allocator.on_job_arrival(task, job) {
                    tracing::error!(error = %e, task = %task, "job arrival rejected");
                }
            }),
        )?;
        Ok(())
    }

    /// Finalizes deferred-callback registration; call once wiring is
    /// complete, before the first `run*` (spec §4.1).
    pub fn finalize_registration(&self) {
        self.queue.borrow_mut().finalize_registration();
    }

    pub fn run(&self) {
        tracing::debug!("engine run: draining queue to completion");
        EventQueue::run(&self.queue);
        self.sync_energy();
    }

    pub fn run_until(&self, deadline: TimePoint) {
        tracing::debug!(deadline = ?deadline, "engine run_until");
        EventQueue::run_until(&self.queue, deadline);
        self.sync_energy();
    }

    pub fn run_while(&self, pred: impl FnMut(TimePoint) -> bool) {
        EventQueue::run_while(&self.queue, pred);
        self.sync_energy();
    }

    pub fn request_stop(&self) {
        self.queue.borrow_mut().request_stop();
    }

    fn sync_energy(&self) {
        if let Some(energy) = &self.energy {
            energy.borrow_mut().update_to_time(self.now());
        }
    }
}
