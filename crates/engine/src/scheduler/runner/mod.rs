//! Round scheduler -- trigger handling, probe supervision and the round cycle.
//!
//! Split into focused submodules:
//! - `core`: Scheduler struct, constructor and accessor methods
//! - `trigger`: mutual exclusion, round outcome bookkeeping and the timer
//! - `supervision`: cancellable waits, probe passes and selection publishing
//! - `round`: the round cycle, escalation and the tight verification loop

mod core;
mod round;
mod supervision;
mod trigger;

pub use self::core::Scheduler;
