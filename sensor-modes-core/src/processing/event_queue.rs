use std::collections::VecDeque;

/// FIFO queue with an optional capacity.
///
/// Not synchronized; the async bridge keeps one per lane behind its mutex.
///
/// Overflow behavior: drops the oldest entry and hands it back to the caller
/// so drops can be counted.
#[derive(Debug)]
pub struct EventQueue<T> {
    items: VecDeque<T>,
    capacity: Option<usize>,
}

impl<T> EventQueue<T> {
    /// A queue that never drops.
    pub fn unbounded() -> Self {
        Self {
            items: VecDeque::new(),
            capacity: None,
        }
    }

    /// A queue holding at most `capacity` entries (minimum 1).
    pub fn bounded(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity: Some(capacity),
        }
    }

    pub fn with_limit(limit: Option<usize>) -> Self {
        match limit {
            Some(n) => Self::bounded(n),
            None => Self::unbounded(),
        }
    }

    /// Append an entry, returning the evicted oldest entry if the queue was full.
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = match self.capacity {
            Some(cap) if self.items.len() >= cap => self.items.pop_front(),
            _ => None,
        };
        self.items.push_back(item);
        evicted
    }

    /// Remove and return every entry in FIFO order.
    pub fn drain(&mut self) -> Vec<T> {
        self.items.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}
