use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::models::config::{BridgeCapacity, RuntimeConfig};
use crate::models::error::{DeviceError, RuntimeError};
use crate::models::tag::Tag;
use crate::runtime::bridge::{Arrival, Inbox, PhysicalAction};
use crate::runtime::scheduler::ActionScheduler;

/// A unit of reactive behavior driven by the runtime.
///
/// `startup` and `shutdown` are each delivered exactly once; `react` receives
/// every scheduled or physical event in tag order.
pub trait Reactor {
    type Event: Send + 'static;

    fn name(&self) -> &str;

    fn startup(&mut self, sched: &mut dyn ActionScheduler<Self::Event>);

    fn react(&mut self, event: Self::Event, sched: &mut dyn ActionScheduler<Self::Event>);

    fn shutdown(&mut self, sched: &mut dyn ActionScheduler<Self::Event>);
}

/// Counters describing what the runtime has done so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuntimeStats {
    pub tags_processed: u64,
    pub events_dispatched: u64,
    pub physical_admitted: u64,
    /// Physical events evicted by bounded bridge lanes.
    pub physical_dropped: u64,
    /// Events scheduled during shutdown or left queued at shutdown.
    pub discarded: u64,
}

struct Pending<E> {
    tag: Tag,
    seq: u64,
    event: E,
}

// Reversed so the max-heap pops the earliest (tag, seq) first.
impl<E> Ord for Pending<E> {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .tag
            .cmp(&self.tag)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl<E> PartialOrd for Pending<E> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<E> PartialEq for Pending<E> {
    fn eq(&self, other: &Self) -> bool {
        self.tag == other.tag && self.seq == other.seq
    }
}

impl<E> Eq for Pending<E> {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Created,
    Running,
    Finished,
}

/// Scheduler state shared by all reactions; the `ActionScheduler` they see.
struct Core<E> {
    queue: BinaryHeap<Pending<E>>,
    next_seq: u64,
    current: Tag,
    staged: VecDeque<Arrival<E>>,
    last_physical: Option<Tag>,
    stop_at: Option<Tag>,
    timeout_at: Option<Tag>,
    halted: Option<DeviceError>,
    inbox: Arc<Inbox<E>>,
    started_at: Instant,
    shutting_down: bool,
    stats: RuntimeStats,
}

impl<E: Send + 'static> Core<E> {
    fn push(&mut self, tag: Tag, event: E) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Pending { tag, seq, event });
    }

    /// Pull arrivals from the bridge into the staging queue.
    fn collect_arrivals(&mut self) {
        if self.inbox.take_stop_request() {
            log::debug!("stop requested by host at {}", self.current);
            self.request_stop();
        }

        let admission = self.inbox.take_all();
        for (lane, dropped) in admission.overflowed {
            log::warn!(
                "bridge lane {} overflowed, dropped {} oldest event(s)",
                lane,
                dropped
            );
            self.stats.physical_dropped += dropped;
        }
        self.staged.extend(admission.arrivals);
    }

    /// Tag a physical event would get if admitted now: its wall-clock
    /// arrival, but never at or before a processed tag, and strictly after
    /// the previous physical event.
    fn physical_tag(&self, arrived: Instant) -> Tag {
        let wall = Tag::at(arrived.saturating_duration_since(self.started_at));
        let tag = wall.max(self.current.next_microstep());
        match self.last_physical {
            Some(last) => tag.max(last.next_microstep()),
            None => tag,
        }
    }

    fn stop_tag(&self) -> Option<Tag> {
        match (self.stop_at, self.timeout_at) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn beyond_stop(&self, tag: Tag) -> bool {
        self.stop_tag().is_some_and(|stop| tag >= stop)
    }

    fn next_tag(&self) -> Option<Tag> {
        self.queue.peek().map(|pending| pending.tag)
    }

    fn has_pending(&self) -> bool {
        !self.queue.is_empty() || !self.staged.is_empty()
    }

    /// Earliest tag that lies before the stop tag.
    ///
    /// The oldest staged arrival is admitted only once no logical event is
    /// queued at or before its tag, so everything its predecessors caused at
    /// the same instant has already run.
    fn next_deliverable(&mut self) -> Option<Tag> {
        if let Some(arrival) = self.staged.front() {
            let candidate = self.physical_tag(arrival.arrived);
            let logical_first = self.next_tag().is_some_and(|queued| queued <= candidate);
            if !logical_first && !self.beyond_stop(candidate) {
                if let Some(arrival) = self.staged.pop_front() {
                    self.last_physical = Some(candidate);
                    self.stats.physical_admitted += 1;
                    self.push(candidate, arrival.event);
                }
            }
        }

        let tag = self.next_tag()?;
        if self.beyond_stop(tag) {
            None
        } else {
            Some(tag)
        }
    }
}

impl<E: Send + 'static> ActionScheduler<E> for Core<E> {
    fn current_tag(&self) -> Tag {
        self.current
    }

    fn schedule(&mut self, event: E, delay: Duration) {
        if self.shutting_down {
            log::debug!("discarding event scheduled during shutdown");
            self.stats.discarded += 1;
            return;
        }
        let tag = self.current.delayed(delay);
        self.push(tag, event);
    }

    fn physical_action(&mut self, capacity: BridgeCapacity) -> PhysicalAction<E> {
        PhysicalAction::new(Arc::clone(&self.inbox), capacity)
    }

    fn request_stop(&mut self) {
        let tag = self.current.next_microstep();
        self.stop_at = Some(self.stop_at.map_or(tag, |existing| existing.min(tag)));
    }

    fn halt(&mut self, error: DeviceError) {
        log::error!("halt requested at {}: {}", self.current, error);
        if self.halted.is_none() {
            self.halted = Some(error);
        }
        self.request_stop();
    }
}

/// Cross-thread handle for stopping a running runtime.
pub struct RuntimeHandle<E> {
    inbox: Arc<Inbox<E>>,
}

impl<E> RuntimeHandle<E> {
    /// Ask the runtime to stop at its next microstep. Wakes an idle runtime.
    pub fn request_stop(&self) {
        self.inbox.request_stop();
    }
}

impl<E> Clone for RuntimeHandle<E> {
    fn clone(&self) -> Self {
        Self {
            inbox: Arc::clone(&self.inbox),
        }
    }
}

/// Single-threaded, logical-time event loop for one reactor.
///
/// Either call [`Runtime::run`] for the blocking loop, or drive it with
/// [`Runtime::start`], [`Runtime::step`]/[`Runtime::drain`] and
/// [`Runtime::shutdown`] for deterministic stepping.
pub struct Runtime<R: Reactor> {
    reactor: R,
    core: Core<R::Event>,
    config: RuntimeConfig,
    phase: Phase,
}

impl<R: Reactor> Runtime<R> {
    pub fn new(reactor: R, config: RuntimeConfig) -> Self {
        let timeout_at = config.timeout().map(Tag::at);
        Self {
            reactor,
            core: Core {
                queue: BinaryHeap::new(),
                next_seq: 0,
                current: Tag::ZERO,
                staged: VecDeque::new(),
                last_physical: None,
                stop_at: None,
                timeout_at,
                halted: None,
                inbox: Inbox::new(),
                started_at: Instant::now(),
                shutting_down: false,
                stats: RuntimeStats::default(),
            },
            config,
            phase: Phase::Created,
        }
    }

    /// Open a control-input lane. Inputs are never dropped.
    pub fn input(&self) -> PhysicalAction<R::Event> {
        PhysicalAction::new(Arc::clone(&self.core.inbox), BridgeCapacity::Unbounded)
    }

    pub fn handle(&self) -> RuntimeHandle<R::Event> {
        RuntimeHandle {
            inbox: Arc::clone(&self.core.inbox),
        }
    }

    pub fn reactor(&self) -> &R {
        &self.reactor
    }

    pub fn current_tag(&self) -> Tag {
        self.core.current
    }

    pub fn stats(&self) -> RuntimeStats {
        self.core.stats
    }

    pub fn is_finished(&self) -> bool {
        self.phase == Phase::Finished
    }

    /// Deliver the startup reaction at tag zero. Later calls do nothing.
    pub fn start(&mut self) {
        if self.phase != Phase::Created {
            return;
        }
        self.phase = Phase::Running;
        self.core.started_at = Instant::now();
        self.core.current = Tag::ZERO;
        log::info!("{}: startup", self.reactor.name());
        self.reactor.startup(&mut self.core);
    }

    /// Admit physical events and process the earliest pending tag.
    ///
    /// Returns the processed tag, or `None` when nothing is deliverable.
    pub fn step(&mut self) -> Option<Tag> {
        if self.phase != Phase::Running {
            return None;
        }
        self.core.collect_arrivals();
        let tag = self.core.next_deliverable()?;
        self.process_tag(tag);
        Some(tag)
    }

    /// Step until nothing is deliverable, without waiting. Returns the number
    /// of tags processed.
    pub fn drain(&mut self) -> usize {
        let mut processed = 0;
        while self.step().is_some() {
            processed += 1;
        }
        processed
    }

    /// Process every deliverable tag up to and including `limit`.
    pub fn advance_to(&mut self, limit: Tag) -> usize {
        if self.phase != Phase::Running {
            return 0;
        }
        let mut processed = 0;
        loop {
            self.core.collect_arrivals();
            match self.core.next_deliverable() {
                Some(tag) if tag <= limit => {
                    self.process_tag(tag);
                    processed += 1;
                }
                _ => return processed,
            }
        }
    }

    /// Drain, then keep waiting for physical events until none arrives for
    /// `quiet`.
    pub fn settle(&mut self, quiet: Duration) -> usize {
        let mut processed = self.drain();
        while self.phase == Phase::Running && self.core.inbox.wait(Some(Instant::now() + quiet)) {
            let round = self.drain();
            if round == 0 {
                break;
            }
            processed += round;
        }
        processed
    }

    /// Run shutdown reactions once, close the bridge, and report a halt if one
    /// occurred. Starts the runtime first if it never ran.
    pub fn shutdown(&mut self) -> Result<(), RuntimeError> {
        if self.phase == Phase::Created {
            self.start();
        }
        if self.phase == Phase::Running {
            let tag = self
                .core
                .stop_at
                .filter(|stop| *stop > self.core.current)
                .unwrap_or_else(|| self.core.current.next_microstep());
            self.core.current = tag;
            self.core.shutting_down = true;

            log::info!("{}: shutdown at {}", self.reactor.name(), tag);
            self.reactor.shutdown(&mut self.core);

            self.core.inbox.close();
            let leftover = (self.core.queue.len() + self.core.staged.len()) as u64;
            if leftover > 0 {
                log::debug!("{}: discarding {} queued event(s)", self.reactor.name(), leftover);
            }
            self.core.stats.discarded += leftover;
            self.core.queue.clear();
            self.core.staged.clear();
            self.phase = Phase::Finished;
        }

        match &self.core.halted {
            Some(error) => Err(RuntimeError::Halted {
                reactor: self.reactor.name().to_string(),
                source: error.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Blocking event loop.
    ///
    /// Unless `fast` is set, waits for wall-clock time to reach each tag.
    /// Returns after a stop request, a halt, the timeout, or (without
    /// `keepalive`) when the event queue runs dry.
    pub fn run(&mut self) -> Result<(), RuntimeError> {
        self.start();

        while self.phase == Phase::Running {
            self.core.collect_arrivals();

            if let Some(tag) = self.core.next_deliverable() {
                if !self.config.fast {
                    let deadline = self.core.started_at + tag.time;
                    if Instant::now() < deadline && self.core.inbox.wait(Some(deadline)) {
                        // Something arrived early; it may precede `tag`.
                        continue;
                    }
                }
                self.process_tag(tag);
                continue;
            }

            if self.core.stop_at.is_some() {
                break;
            }
            if let Some(timeout) = self.core.timeout_at {
                if self.core.has_pending() {
                    self.core.stop_at = Some(timeout);
                    break;
                }
            }
            if !self.config.keepalive {
                break;
            }

            let deadline = self.core.timeout_at.map(|t| self.core.started_at + t.time);
            if !self.core.inbox.wait(deadline) {
                self.core.stop_at = self.core.timeout_at;
                break;
            }
        }

        self.shutdown()
    }

    fn process_tag(&mut self, tag: Tag) {
        self.core.current = tag;
        self.core.stats.tags_processed += 1;
        loop {
            match self.core.queue.peek() {
                Some(pending) if pending.tag == tag => {}
                _ => break,
            }
            let Some(pending) = self.core.queue.pop() else {
                break;
            };
            self.core.stats.events_dispatched += 1;
            self.reactor.react(pending.event, &mut self.core);
        }
    }
}

impl<R: Reactor> Drop for Runtime<R> {
    fn drop(&mut self) {
        if self.phase == Phase::Running {
            if let Err(e) = self.shutdown() {
                log::error!("{}", e);
            }
        }
    }
}

impl<R: Reactor> fmt::Debug for Runtime<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("reactor", &self.reactor.name())
            .field("phase", &self.phase)
            .field("current", &self.core.current)
            .field("pending", &self.core.queue.len())
            .finish()
    }
}
