//! Deterministic event queue (spec §4.1, §5).
//!
//! Every mutable simulation entity (`Platform`, `EdfScheduler`, the
//! energy tracker) lives behind an `Rc<RefCell<_>>` handle so that a
//! timer callback registered by one component can reach into another at
//! fire time without the engine storing raw back-pointers (spec §9
//! "Cyclic references" / "pass scheduler-owned mutable references into
//! the ISR closures at registration time"). `EventQueue` itself follows
//! the same convention: `run`/`run_until`/`run_while` take `&Rc<RefCell<
//! EventQueue>>` rather than `&mut self` so that a callback can borrow
//! the queue again (to schedule follow-up events or emit a trace record)
//! without re-entering an already-held `RefCell` borrow — each borrow
//! taken by the loop is released before the callback runs.

use crate::time::TimePoint;
use crate::trace::TraceSink;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

/// Fixed event priorities; numerically lower fires first at a given time
/// (spec §3 "EventKey").
pub mod priority {
    pub const JOB_COMPLETION: i32 = 0;
    pub const DEADLINE_MISS: i32 = 1;
    pub const PROCESSOR_AVAILABLE: i32 = 2;
    pub const JOB_ARRIVAL: i32 = 3;
    pub const TIMER_DEFAULT: i32 = 4;
}

/// The tag half of the tagged-union event (spec §3 "Event"). The payload
/// half is the boxed action every scheduled event carries; the tag exists
/// for tracing and for the handful of call sites that want to assert
/// what kind of event just fired.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum EventKind {
    JobArrival,
    JobCompletion,
    DeadlineMiss,
    ProcessorAvailable,
    Timer,
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct EventKey {
    pub time: TimePoint,
    pub priority: i32,
    pub sequence: u64,
}

type Action = Box<dyn FnOnce()>;

struct ScheduledEvent {
    kind: EventKind,
    action: Action,
}

/// An opaque, invalidatable handle to a scheduled event (spec §9 "Timer
/// identity"). A cleared or already-fired id carries `key: None` and
/// compares as invalid.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TimerId {
    key: Option<EventKey>,
}

impl TimerId {
    pub fn invalid() -> Self {
        TimerId { key: None }
    }

    pub fn is_valid(&self) -> bool {
        self.key.is_some()
    }
}

type DeferredCallback = Rc<RefCell<dyn FnMut()>>;

struct DeferredSlot {
    requested: bool,
    callback: DeferredCallback,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct DeferredId(usize);

/// Deterministic min-heap keyed by `(time, priority, sequence)`, plus the
/// deferred-callback table and the optional trace sink (spec §4.1).
pub struct EventQueue {
    now: TimePoint,
    next_sequence: u64,
    events: BTreeMap<EventKey, ScheduledEvent>,
    deferred: Vec<DeferredSlot>,
    deferred_finalized: bool,
    trace: Option<Box<dyn TraceSink>>,
    stop_requested: bool,
}

impl EventQueue {
    pub fn new() -> Rc<RefCell<EventQueue>> {
        Rc::new(RefCell::new(EventQueue {
            now: TimePoint::ZERO,
            next_sequence: 0,
            events: BTreeMap::new(),
            deferred: Vec::new(),
            deferred_finalized: false,
            trace: None,
            stop_requested: false,
        }))
    }

    pub fn now(&self) -> TimePoint {
        self.now
    }

    fn next_seq(&mut self) -> u64 {
        let s = self.next_sequence;
        self.next_sequence += 1;
        s
    }

    /// Inserts an event at `time` with the given `priority`; rejects
    /// `time < now`. Returns a `TimerId` so this also backs `add_timer`
    /// (spec §4.1: "add_timer — specialization of schedule").
    pub fn schedule_event(
        &mut self,
        time: TimePoint,
        priority: i32,
        kind: EventKind,
        action: Action,
    ) -> crate::error::Result<TimerId> {
        if time < self.now {
            return Err(crate::error::Error::InvalidState(format!(
                "cannot schedule at {:?} when now is {:?}",
                time, self.now
            )));
        }
        let sequence = self.next_seq();
        let key = EventKey { time, priority, sequence };
        self.events.insert(key, ScheduledEvent { kind, action });
        Ok(TimerId { key: Some(key) })
    }

    /// Spec's bare `schedule(time, priority, event)`; the id is dropped.
    pub fn schedule(
        &mut self,
        time: TimePoint,
        priority: i32,
        kind: EventKind,
        action: Action,
    ) -> crate::error::Result<()> {
        self.schedule_event(time, priority, kind, action).map(|_| ())
    }

    /// Spec's `add_timer(time, priority, callback) -> TimerId`.
    pub fn add_timer(
        &mut self,
        time: TimePoint,
        priority: i32,
        callback: Action,
    ) -> crate::error::Result<TimerId> {
        self.schedule_event(time, priority, EventKind::Timer, callback)
    }

    /// Cancels the referenced entry if still present; idempotent,
    /// observable invalidation of `id` (spec §9 "Timer identity").
    pub fn cancel(&mut self, id: &mut TimerId) {
        if let Some(key) = id.key.take() {
            self.events.remove(&key);
        }
    }

    /// Registers a deferred callback; rejected once the table is
    /// finalized (spec §4.1).
    pub fn register_deferred(
        &mut self,
        callback: DeferredCallback,
    ) -> crate::error::Result<DeferredId> {
        if self.deferred_finalized {
            return Err(crate::error::Error::AlreadyFinalized(
                "deferred callback table is finalized",
            ));
        }
        let id = DeferredId(self.deferred.len());
        self.deferred.push(DeferredSlot { requested: false, callback });
        Ok(id)
    }

    /// Called once wiring is complete, before the first `run*` call.
    pub fn finalize_registration(&mut self) {
        self.deferred_finalized = true;
    }

    /// Sets the request flag on a deferred callback; duplicate requests
    /// within the same timestep coalesce.
    pub fn request_deferred(&mut self, id: DeferredId) {
        if let Some(slot) = self.deferred.get_mut(id.0) {
            slot.requested = true;
        }
    }

    pub fn set_trace_writer(&mut self, sink: Option<Box<dyn TraceSink>>) {
        self.trace = sink;
    }

    /// Flushes the installed trace sink, if any; call once the run loop
    /// stops.
    pub fn flush_trace(&mut self) {
        if let Some(sink) = self.trace.as_mut() {
            sink.flush();
        }
    }

    /// Zero-overhead trace emission when no writer is installed.
    pub fn trace(&mut self, f: impl FnOnce(&mut dyn TraceSink)) {
        if let Some(sink) = self.trace.as_mut() {
            f(sink.as_mut());
        }
    }

    /// Honored at the next timestep boundary; auto-reset on the next
    /// `run*` call.
    pub fn request_stop(&mut self) {
        self.stop_requested = true;
    }

    fn pop_if_time(&mut self, t: TimePoint) -> Option<ScheduledEvent> {
        let key = *self.events.keys().next()?;
        if key.time != t {
            return None;
        }
        self.events.remove(&key)
    }

    fn fire_deferred(&mut self) {
        let n = self.deferred.len();
        let mut to_fire = Vec::new();
        for i in 0..n {
            let slot = &mut self.deferred[i];
            if slot.requested {
                slot.requested = false;
                to_fire.push(slot.callback.clone());
            }
        }
        for cb in to_fire {
            cb.borrow_mut()();
        }
    }

    /// Drains the queue until empty, honoring `request_stop`.
    pub fn run(queue: &Rc<RefCell<EventQueue>>) {
        Self::run_while(queue, |_| true);
    }

    /// Drains the queue until `now` would exceed `deadline`.
    pub fn run_until(queue: &Rc<RefCell<EventQueue>>, deadline: TimePoint) {
        Self::run_while(queue, move |now| now <= deadline);
    }

    /// Drains the queue while `pred(now)` holds, or until empty.
    pub fn run_while(queue: &Rc<RefCell<EventQueue>>, mut pred: impl FnMut(TimePoint) -> bool) {
        queue.borrow_mut().stop_requested = false;
        loop {
            let next_time = match queue.borrow().events.keys().next() {
                Some(k) => k.time,
                None => break,
            };
            if !pred(next_time) {
                break;
            }
            queue.borrow_mut().now = next_time;

            loop {
                let next = { queue.borrow_mut().pop_if_time(next_time) };
                match next {
                    Some(ev) => (ev.action)(),
                    None => break,
                }
            }

            queue.borrow_mut().fire_deferred();

            if queue.borrow().stop_requested {
                break;
            }
        }
        queue.borrow_mut().stop_requested = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::Duration;
    use std::cell::Cell;

    #[test]
    fn dispatch_is_time_then_priority_then_sequence_ordered() {
        let q = EventQueue::new();
        let order = Rc::new(RefCell::new(Vec::new()));

        let t0 = TimePoint::ZERO + Duration::from_secs_f64(1.0);
        {
            let mut qb = q.borrow_mut();
            let o = order.clone();
            qb.schedule(t0, priority::JOB_ARRIVAL, EventKind::JobArrival, Box::new(move || o.borrow_mut().push("arrival"))).unwrap();
            let o = order.clone();
            qb.schedule(t0, priority::JOB_COMPLETION, EventKind::JobCompletion, Box::new(move || o.borrow_mut().push("completion"))).unwrap();
            let o = order.clone();
            qb.schedule(t0, priority::DEADLINE_MISS, EventKind::DeadlineMiss, Box::new(move || o.borrow_mut().push("deadline"))).unwrap();
        }
        EventQueue::run(&q);
        assert_eq!(*order.borrow(), vec!["completion", "deadline", "arrival"]);
    }

    #[test]
    fn cancel_is_idempotent_and_observable() {
        let q = EventQueue::new();
        let fired = Rc::new(Cell::new(false));
        let f = fired.clone();
        let mut id = q
            .borrow_mut()
            .add_timer(TimePoint::ZERO + Duration::from_secs_f64(1.0), priority::TIMER_DEFAULT, Box::new(move || f.set(true)))
            .unwrap();
        assert!(id.is_valid());
        q.borrow_mut().cancel(&mut id);
        assert!(!id.is_valid());
        q.borrow_mut().cancel(&mut id); // no-op, doesn't panic
        EventQueue::run(&q);
        assert!(!fired.get());
    }

    #[test]
    fn scheduling_in_the_past_is_rejected() {
        let q = EventQueue::new();
        q.borrow_mut().now = TimePoint::ZERO + Duration::from_secs_f64(5.0);
        let err = q
            .borrow_mut()
            .schedule(TimePoint::ZERO, priority::TIMER_DEFAULT, EventKind::Timer, Box::new(|| {}))
            .unwrap_err();
        assert!(matches!(err, crate::error::Error::InvalidState(_)));
    }

    #[test]
    fn deferred_fires_once_per_timestep_in_registration_order() {
        let q = EventQueue::new();
        let order = Rc::new(RefCell::new(Vec::new()));

        let o1 = order.clone();
        let id1 = q.borrow_mut().register_deferred(Rc::new(RefCell::new(move || o1.borrow_mut().push(1)))).unwrap();
        let o2 = order.clone();
        let id2 = q.borrow_mut().register_deferred(Rc::new(RefCell::new(move || o2.borrow_mut().push(2)))).unwrap();
        q.borrow_mut().finalize_registration();

        let t0 = TimePoint::ZERO;
        {
            let mut qb = q.borrow_mut();
            qb.request_deferred(id2);
            qb.request_deferred(id2); // duplicate coalesces
            qb.request_deferred(id1);
            qb.schedule(t0, priority::TIMER_DEFAULT, EventKind::Timer, Box::new(|| {})).unwrap();
        }
        EventQueue::run(&q);
        assert_eq!(*order.borrow(), vec![1, 2]);
    }
}
