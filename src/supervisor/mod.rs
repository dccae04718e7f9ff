//! # Supervision core: day planning, reconciliation, dependency toggles.
//!
//! The [`Supervisor`] owns the unit table and the runtime collaborators
//! (init driver, janitor, calendar client, logger) and runs the daily
//! cycle: resolve the working day, anchor every schedule to today, then
//! reconcile observed against desired state every 30 seconds until a
//! shutdown signal cancels the loop.

mod core;
mod unit;

pub use self::core::{ExitHandle, Supervisor};
pub use self::unit::{ObservedState, UnitState};
