use std::time::Duration;

use crate::models::config::BridgeCapacity;
use crate::models::error::DeviceError;
use crate::models::tag::Tag;
use crate::runtime::bridge::PhysicalAction;

/// The runtime primitives a reaction may use.
///
/// Passed to every reaction; reactions never hold on to it.
pub trait ActionScheduler<E> {
    /// Tag of the reaction currently executing.
    fn current_tag(&self) -> Tag;

    /// Schedule a logical action `delay` after the current tag. A zero delay
    /// lands on the next microstep.
    fn schedule(&mut self, event: E, delay: Duration);

    /// Open a new physical-action lane for foreign threads.
    fn physical_action(&mut self, capacity: BridgeCapacity) -> PhysicalAction<E>;

    /// Stop at the next microstep. Shutdown reactions run there.
    fn request_stop(&mut self);

    /// Fatal failure: record `error` and stop. The host sees it as the
    /// runtime's result.
    fn halt(&mut self, error: DeviceError);
}
