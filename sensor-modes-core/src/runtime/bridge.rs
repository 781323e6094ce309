//! Async bridge: hand-off from foreign threads into the logical timeline.
//!
//! ```text
//! [audio thread] ─submit─► lane (bounded, drop-oldest) ─┐
//! [frame worker] ─submit─► lane (bounded, drop-oldest) ─┼─► Inbox ─► runtime assigns tags
//! [host inputs]  ─submit─► lane (unbounded)            ─┘
//! ```
//!
//! A submission takes one short mutex critical section and never waits for
//! the runtime.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Condvar, Mutex};

use crate::models::config::BridgeCapacity;
use crate::processing::event_queue::EventQueue;

/// A submitted event with its arrival stamp.
pub(crate) struct Arrival<E> {
    pub seq: u64,
    pub arrived: Instant,
    pub event: E,
}

/// Everything that arrived since the previous admission.
pub(crate) struct Admission<E> {
    /// Ordered by submission sequence.
    pub arrivals: Vec<Arrival<E>>,
    /// Drops since the previous admission, per lane that overflowed.
    pub overflowed: Vec<(usize, u64)>,
}

struct Lane<E> {
    queue: EventQueue<Arrival<E>>,
    dropped: u64,
    reported: u64,
}

struct InboxState<E> {
    lanes: Vec<Lane<E>>,
    next_seq: u64,
    closed: bool,
    stop_requested: bool,
}

impl<E> InboxState<E> {
    fn has_pending(&self) -> bool {
        self.lanes.iter().any(|lane| !lane.queue.is_empty())
    }
}

pub(crate) struct Inbox<E> {
    state: Mutex<InboxState<E>>,
    ready: Condvar,
}

impl<E> Inbox<E> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(InboxState {
                lanes: Vec::new(),
                next_seq: 0,
                closed: false,
                stop_requested: false,
            }),
            ready: Condvar::new(),
        })
    }

    pub fn open_lane(&self, capacity: BridgeCapacity) -> usize {
        let mut state = self.state.lock();
        state.lanes.push(Lane {
            queue: EventQueue::with_limit(capacity.limit()),
            dropped: 0,
            reported: 0,
        });
        state.lanes.len() - 1
    }

    fn submit(&self, lane: usize, event: E) -> bool {
        let arrived = Instant::now();
        {
            let mut state = self.state.lock();
            if state.closed {
                return false;
            }
            let seq = state.next_seq;
            state.next_seq += 1;
            let lane = &mut state.lanes[lane];
            if lane.queue.push(Arrival { seq, arrived, event }).is_some() {
                lane.dropped += 1;
            }
        }
        self.ready.notify_one();
        true
    }

    fn dropped(&self, lane: usize) -> u64 {
        self.state.lock().lanes[lane].dropped
    }

    fn pending(&self, lane: usize) -> usize {
        self.state.lock().lanes[lane].queue.len()
    }

    /// Take every pending arrival, merged across lanes in submission order.
    pub fn take_all(&self) -> Admission<E> {
        let mut arrivals = Vec::new();
        let mut overflowed = Vec::new();
        {
            let mut state = self.state.lock();
            for (index, lane) in state.lanes.iter_mut().enumerate() {
                arrivals.extend(lane.queue.drain());
                if lane.dropped > lane.reported {
                    overflowed.push((index, lane.dropped - lane.reported));
                    lane.reported = lane.dropped;
                }
            }
        }
        arrivals.sort_by_key(|arrival| arrival.seq);
        Admission {
            arrivals,
            overflowed,
        }
    }

    /// Block until something is pending, a stop is requested, or `deadline`
    /// passes. Returns whether there is anything to handle.
    pub fn wait(&self, deadline: Option<Instant>) -> bool {
        let mut state = self.state.lock();
        loop {
            if state.has_pending() || state.stop_requested {
                return true;
            }
            match deadline {
                Some(deadline) => {
                    if self.ready.wait_until(&mut state, deadline).timed_out() {
                        return state.has_pending() || state.stop_requested;
                    }
                }
                None => self.ready.wait(&mut state),
            }
        }
    }

    pub fn request_stop(&self) {
        self.state.lock().stop_requested = true;
        self.ready.notify_all();
    }

    pub fn take_stop_request(&self) -> bool {
        std::mem::take(&mut self.state.lock().stop_requested)
    }

    /// Reject all further submissions and discard anything still queued.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        for lane in state.lanes.iter_mut() {
            lane.queue.clear();
        }
    }
}

/// Thread-safe submission endpoint for one bridge lane.
///
/// Cheap to clone; clones share the lane.
pub struct PhysicalAction<E> {
    inbox: Arc<Inbox<E>>,
    lane: usize,
}

impl<E> PhysicalAction<E> {
    pub(crate) fn new(inbox: Arc<Inbox<E>>, capacity: BridgeCapacity) -> Self {
        let lane = inbox.open_lane(capacity);
        Self { inbox, lane }
    }

    /// Hand `event` to the runtime. Callable from any thread.
    ///
    /// Returns `false` once the runtime has shut down; the event is discarded.
    pub fn submit(&self, event: E) -> bool {
        self.inbox.submit(self.lane, event)
    }

    /// Events evicted from this lane by overflow so far.
    pub fn dropped(&self) -> u64 {
        self.inbox.dropped(self.lane)
    }

    /// Events waiting for admission.
    pub fn pending(&self) -> usize {
        self.inbox.pending(self.lane)
    }
}

impl<E> Clone for PhysicalAction<E> {
    fn clone(&self) -> Self {
        Self {
            inbox: Arc::clone(&self.inbox),
            lane: self.lane,
        }
    }
}

impl<E> fmt::Debug for PhysicalAction<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhysicalAction").field("lane", &self.lane).finish()
    }
}
