//! Deterministic logical-time host runtime.
//!
//! A single thread delivers every event in tag order. Foreign threads reach
//! it only through [`PhysicalAction`] lanes of the async bridge.

pub mod bridge;
pub mod engine;
pub mod scheduler;

pub use bridge::PhysicalAction;
pub use engine::{Reactor, Runtime, RuntimeHandle, RuntimeStats};
pub use scheduler::ActionScheduler;
