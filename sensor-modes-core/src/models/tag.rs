use std::fmt;
use std::time::Duration;

/// Logical timestamp used to order event delivery.
///
/// Tags compare by `time` first, then `microstep`. A zero-delay schedule lands
/// on the next microstep of the current tag, so it is strictly later without
/// advancing logical time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Tag {
    pub time: Duration,
    pub microstep: u32,
}

impl Tag {
    pub const ZERO: Tag = Tag {
        time: Duration::ZERO,
        microstep: 0,
    };

    pub fn new(time: Duration, microstep: u32) -> Self {
        Self { time, microstep }
    }

    /// Tag at `time` with microstep zero.
    pub fn at(time: Duration) -> Self {
        Self::new(time, 0)
    }

    pub fn next_microstep(self) -> Self {
        Self {
            time: self.time,
            microstep: self.microstep.saturating_add(1),
        }
    }

    /// Tag of an event scheduled `delay` after this one.
    pub fn delayed(self, delay: Duration) -> Self {
        if delay.is_zero() {
            self.next_microstep()
        } else {
            Self::at(self.time + delay)
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:?}, {})", self.time, self.microstep)
    }
}
