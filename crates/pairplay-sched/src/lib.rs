//! Time-driven work for Pairplay.
//!
//! - [`Scheduler`] spawns detached and delayed tasks (score reporting,
//!   post-game teardown) and aborts whatever is left on shutdown.
//! - [`SweepTicker`] fires the periodic maintenance sweep with initial
//!   jitter and skip-on-overrun semantics.
//!
//! Neither holds any game state. Callers pass in the future to run and
//! keep their own locks out of it.

mod scheduler;
mod sweep;

pub use scheduler::{Scheduler, TaskHandle};
pub use sweep::{SweepConfig, SweepInfo, SweepTicker};
