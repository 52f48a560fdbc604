//! Timed call scheduling and named countdown timers
//!
//! Two tightly coupled layers:
//! - [`CallScheduler`]: dispatches zero-argument actions from a
//!   deadline-ordered table to a pool of buffered workers, with
//!   token-based cancellation (an in-flight call completes, later ones
//!   never start).
//! - [`Timeline`]: named, pausable, resettable countdown timers on top
//!   of the scheduler, with lossless string serialization of their
//!   observable state.

pub mod error;
pub mod scheduler;
pub mod timeline;
pub mod token;
pub mod worker;

mod serial;
mod timetable;

#[cfg(test)]
mod timing_tests;

pub use error::Error;
pub use scheduler::{CallResult, CallScheduler};
pub use timeline::{Timeline, TimerState};
pub use token::CallHandle;
pub use worker::BufferedWorker;
