//! Per-device mode automaton.
//!
//! Exactly one mode is current at any logical time. Every transition bumps
//! an epoch, so tokens issued for the previous residency stop matching and
//! that mode's pending reactions are deactivated.
//!
//! State transitions are driven by the owning device:
//! ```text
//! transition(target) ──► swap mode, bump epoch ──► owner schedules Enter(token) at delay 0
//! ```

use crate::models::mode::Mode;
use crate::models::tag::Tag;

/// Identifies one residency of a mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModeToken<M> {
    pub mode: M,
    pub epoch: u64,
}

/// A committed mode change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition<M> {
    pub from: M,
    pub to: M,
    /// Token of the new residency; carried by its entry event.
    pub token: ModeToken<M>,
}

#[derive(Debug)]
pub struct ModeAutomaton<M: Mode> {
    current: M,
    epoch: u64,
}

impl<M: Mode> ModeAutomaton<M> {
    pub fn new(initial: M) -> Self {
        Self {
            current: initial,
            epoch: 0,
        }
    }

    pub fn current(&self) -> M {
        self.current
    }

    /// Number of committed transitions.
    pub fn transitions(&self) -> u64 {
        self.epoch
    }

    pub fn token(&self) -> ModeToken<M> {
        ModeToken {
            mode: self.current,
            epoch: self.epoch,
        }
    }

    /// Whether reactions bound to `token` may still fire.
    pub fn is_current(&self, token: ModeToken<M>) -> bool {
        token.epoch == self.epoch && token.mode == self.current
    }

    /// Switch to `target`. A request for the current mode is a no-op.
    pub fn transition(&mut self, target: M, now: Tag) -> Option<Transition<M>> {
        if target == self.current {
            log::debug!("already in {}, ignoring transition", target);
            return None;
        }

        let from = self.current;
        self.current = target;
        self.epoch += 1;

        log::debug!("mode transition {} -> {} at {}", from, target, now);

        Some(Transition {
            from,
            to: target,
            token: self.token(),
        })
    }
}
