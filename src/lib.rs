//! # svcvisor
//!
//! **Svcvisor** supervises a fixed set of systemd units on one host
//! according to a daily schedule.
//!
//! For every configured unit it enforces an operational time window, an
//! optional once-per-day restart instant, an optional working-day gate
//! fed by a remote calendar oracle, and a dependency order for the daily
//! restart. A filesystem janitor sweeps aged files at day rollover.
//!
//! ## Features
//!
//! | Area            | Description                                            | Key types                        |
//! |-----------------|--------------------------------------------------------|----------------------------------|
//! | **Supervision** | Daily planning and 30 s reconciliation over all units. | [`Supervisor`], [`ExitHandle`]   |
//! | **Driver**      | Init-system RPC seam; scriptable in tests.             | [`UnitDriver`], [`SystemdDriver`]|
//! | **Schedule**    | Today-anchored windows and restart instants.           | [`TimeRange`]                    |
//! | **Calendar**    | Working-date oracle with same-day disk cache.          | [`CalendarClient`], [`DateCache`]|
//! | **Janitor**     | Aged-file sweep and empty-dir pruning.                 | [`Janitor`], [`SweepConfig`]     |
//! | **Logging**     | Daily log file, 40 MB cap, stdout mirror.              | [`DayLog`]                       |
//! | **Errors**      | Typed errors for config, runtime and driver RPC.       | [`ConfigError`], [`RuntimeError`], [`DriverError`] |
//!
//! ## Optional features
//! - `workday` *(default)*: compile the calendar oracle client; without
//!   it every day counts as a working day and the `http` config section
//!   is ignored.
//!
//! ```no_run
//! use svcvisor::{DayLog, Supervisor};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let log = DayLog::open()?;
//!     let mut supervisor = Supervisor::prepare(log.clone()).await?;
//!
//!     // One task waits for SIGINT/SIGTERM/SIGABRT and cancels the loop.
//!     let exit = supervisor.exit_handle();
//!     tokio::spawn(async move {
//!         if let Ok(signal) = svcvisor::shutdown::wait_for_shutdown_signal().await {
//!             println!("caught {signal}");
//!             exit.exit();
//!         }
//!     });
//!
//!     supervisor.block().await?;
//!     Ok(())
//! }
//! ```
//!
//! ---

#[cfg(feature = "workday")]
mod calendar;
mod config;
mod driver;
mod error;
mod janitor;
mod logger;
mod policy;
mod schedule;
mod supervisor;

pub mod shutdown;

// ---- Public re-exports ----

pub use config::{HttpConfig, LoadedConfig, CONFIG_PATH};
pub use driver::{normalize_unit_name, ActiveState, DriverRef, SystemdDriver, UnitDriver};
pub use error::{ConfigError, DriverError, RuntimeError};
pub use janitor::{Janitor, SweepConfig};
pub use logger::DayLog;
pub use policy::RetryPolicy;
pub use schedule::TimeRange;
pub use supervisor::{ExitHandle, ObservedState, Supervisor, UnitState};

// Optional: the calendar oracle client.
// Enabled by default via the `workday` feature.
#[cfg(feature = "workday")]
pub use calendar::{CalendarClient, DateCache, CACHE_PATH};
