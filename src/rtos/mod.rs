//! Time-triggered action scheduling.
//!
//! `clock` turns the wrapping hardware counter into 64-bit ticks, `queue`
//! keeps pending actions ordered by due time and `scheduler` ties the two to
//! the compare interrupt.

pub mod action;
pub mod clock;
pub mod critical;
pub mod queue;
pub mod scheduler;

pub use action::{Action, ActionSink, PinId, ScheduledAction};
pub use clock::{LogicalClock, TickRate};
pub use critical::CompareMask;
pub use queue::ActionQueue;
pub use scheduler::{Scheduler, SchedulerConfig, SchedulerError, SchedulerStats};
