//! # Supervisor: the daily cycle and the reconciliation loop.
//!
//! One [`Supervisor`] runs per process. It owns the unit table and all
//! runtime collaborators and drives everything from a single task:
//!
//! ```text
//! prepare() ──► config + driver + janitor (+ calendar) ──► first sweep
//!
//! block()
//!   ├─► resolve working day (oracle → cache → fatal on day one)
//!   ├─► seed observed states from live status
//!   └─► loop every 30 s:
//!         ├─► run_tick(now)      reconcile every unit, in order
//!         ├─► wait_or_cancel     the only suspension points
//!         └─► switch_to_new_day  re-plan at local midnight
//! ```
//!
//! ## Rules
//! - Transitions are strictly serial; there is no parallelism across
//!   units, and every driver RPC completes before the next step.
//! - The 10 s settle waits after dependency toggles are worst-case
//!   settling windows, not readiness polls.
//! - A cancelled wait drops out of the current iteration without
//!   rollback; whatever state the init system is in is accepted.
//! - RPC failures never mutate the observed state and never abort the
//!   loop; the next tick retries.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tokio_util::sync::CancellationToken;

#[cfg(feature = "workday")]
use crate::calendar::CalendarClient;
use crate::config;
use crate::driver::{DriverRef, SystemdDriver};
use crate::error::RuntimeError;
use crate::janitor::Janitor;
use crate::logger::DayLog;
use crate::schedule;

use super::unit::{ObservedState, UnitState};

/// Reconciliation period.
const TICK_INTERVAL: Duration = Duration::from_secs(30);

/// Settling window between dependency-ordered transitions.
const SETTLE_WAIT: Duration = Duration::from_secs(10);

/// Depth bound on dependent recursion, defending against config cycles.
const MAX_TOGGLE_DEPTH: u32 = 8;

/// Direction of a dependency toggle pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Toggle {
    /// Bring dependents down, leaves first.
    Stop,
    /// Bring dependents up, parents first.
    Start,
}

/// Clonable handle that requests cooperative shutdown.
///
/// Held by the signal task; [`ExitHandle::exit`] logs an exit marker and
/// cancels every pending wait in the supervisor. Safe to call more than
/// once.
#[derive(Clone)]
pub struct ExitHandle {
    cancel: CancellationToken,
    log: Arc<DayLog>,
}

impl ExitHandle {
    /// Cancels the supervision loop.
    pub fn exit(&self) {
        self.log.info("exit requested; cancelling supervision waits");
        self.cancel.cancel();
    }
}

/// Schedule-driven supervisor over a fixed set of units.
pub struct Supervisor {
    /// Unit table in declaration order.
    units: Vec<UnitState>,
    driver: DriverRef,
    janitor: Janitor,
    #[cfg(feature = "workday")]
    calendar: Option<CalendarClient>,
    log: Arc<DayLog>,
    cancel: CancellationToken,
    /// Whether the calendar flags today as a working day.
    working_day: bool,
    /// Local date the current plan was made for, `YYYY-MM-DD`.
    last_date: String,
}

impl Supervisor {
    /// Creates a supervisor from parts. Production code goes through
    /// [`Supervisor::prepare`]; tests inject a scripted driver here.
    pub fn new(
        units: Vec<UnitState>,
        driver: DriverRef,
        janitor: Janitor,
        log: Arc<DayLog>,
    ) -> Self {
        Self {
            units,
            driver,
            janitor,
            #[cfg(feature = "workday")]
            calendar: None,
            log,
            cancel: CancellationToken::new(),
            working_day: true,
            last_date: String::new(),
        }
    }

    /// Attaches the calendar oracle client.
    #[cfg(feature = "workday")]
    pub fn with_calendar(mut self, calendar: CalendarClient) -> Self {
        self.calendar = Some(calendar);
        self
    }

    /// Loads the configuration and builds the production collaborators.
    ///
    /// Runs one janitor pass synchronously before returning. Any config
    /// or connection problem is fatal here and surfaced to the entry
    /// point after being logged.
    pub async fn prepare(log: Arc<DayLog>) -> Result<Self, RuntimeError> {
        log.info("preparing supervisor");

        let loaded = match config::load(Path::new(config::CONFIG_PATH)) {
            Ok(loaded) => loaded,
            Err(err) => {
                log.error(err.to_string());
                return Err(err.into());
            }
        };

        let driver = match SystemdDriver::connect().await {
            Ok(driver) => Arc::new(driver),
            Err(err) => {
                log.error(err.to_string());
                return Err(err);
            }
        };

        let janitor = Janitor::new(loaded.sweeps);
        #[allow(unused_mut)]
        let mut supervisor = Self::new(loaded.units, driver, janitor, log);

        #[cfg(feature = "workday")]
        if let Some(http) = &loaded.http {
            supervisor = supervisor.with_calendar(CalendarClient::new(http)?);
        }

        if !supervisor.janitor.is_empty() {
            supervisor.janitor.sweep(&supervisor.log);
        }

        Ok(supervisor)
    }

    /// Returns a handle the signal task uses to stop the loop.
    pub fn exit_handle(&self) -> ExitHandle {
        ExitHandle {
            cancel: self.cancel.clone(),
            log: Arc::clone(&self.log),
        }
    }

    /// Requests cooperative shutdown from inside the process.
    pub fn exit(&self) {
        self.exit_handle().exit();
    }

    /// Runs the daily cycle until cancelled.
    ///
    /// Returns `Err` only when the very first working-day resolution
    /// fails with no usable cache; later failures stick with the prior
    /// value. Cancellation always returns `Ok` promptly.
    pub async fn block(&mut self) -> Result<(), RuntimeError> {
        self.last_date = schedule::today_string();
        self.resolve_working_day(true).await?;
        self.seed_unit_states().await;

        self.log.info(format!(
            "supervising {} unit(s); reconciling every {} s",
            self.units.len(),
            TICK_INTERVAL.as_secs()
        ));

        while !self.cancel.is_cancelled() {
            let now = Local::now().timestamp();
            self.run_tick(now).await;
            if !self.wait_or_cancel(TICK_INTERVAL).await {
                break;
            }
            self.switch_to_new_day().await;
        }

        self.log.info("supervision loop exited");
        Ok(())
    }

    /// One reconciliation pass over every unit, in declaration order.
    ///
    /// Decision order per unit: working-day gate, once-per-day restart,
    /// in-window start, outside-window stop.
    async fn run_tick(&mut self, now: i64) {
        for idx in 0..self.units.len() {
            if self.cancel.is_cancelled() {
                break;
            }

            if self.units[idx].required_workday && !self.working_day {
                let running = self.units[idx].observed == ObservedState::Active
                    || self.live_state(idx).await == ObservedState::Active;
                if running {
                    self.stop_unit(idx).await;
                }
                continue;
            }

            if self.units[idx].range.is_restart_supported()
                && !self.units[idx].restarted_today
                && self.units[idx].range.need_restart(now)
            {
                if !self.run_daily_restart(idx, now).await {
                    break;
                }
                continue;
            }

            if self.units[idx].range.is_between(now) {
                if self.live_state(idx).await == ObservedState::Inactive {
                    self.log.info(format!(
                        "\"{}\" inactive inside its window; starting",
                        self.units[idx].name
                    ));
                    self.start_unit(idx).await;
                }
                continue;
            }

            if self.units[idx].observed == ObservedState::Active {
                self.stop_unit(idx).await;
            }
        }
    }

    /// The once-per-day restart of `idx` and its dependents.
    ///
    /// Dependents come down first (post-order), the unit restarts, the
    /// dependents come back up (pre-order), with a settle wait between
    /// each phase that toggled anything. Returns `false` when a wait was
    /// cancelled and the tick must end.
    async fn run_daily_restart(&mut self, idx: usize, now: i64) -> bool {
        let name = self.units[idx].name.clone();
        let deps = self.units[idx].dependents.clone();

        if !deps.is_empty() {
            let toggled = self
                .toggle_dependents(name.clone(), deps.clone(), now, Toggle::Stop, 0)
                .await;
            if toggled > 0 && !self.wait_or_cancel(SETTLE_WAIT).await {
                return false;
            }
        }

        self.restart_unit(idx).await;
        self.units[idx].restarted_today = true;

        if !self.wait_or_cancel(SETTLE_WAIT).await {
            return false;
        }

        if !deps.is_empty() {
            let toggled = self
                .toggle_dependents(name, deps, now, Toggle::Start, 0)
                .await;
            if toggled > 0 && !self.wait_or_cancel(SETTLE_WAIT).await {
                return false;
            }
        }
        true
    }

    /// Walks `deps` in order, stopping or starting each resolved unit.
    ///
    /// Stop mode recurses into a dependent's own dependents *before*
    /// stopping it; start mode starts the dependent first and then its
    /// dependents, and only when the dependent is inactive and inside
    /// its own window. Either way a toggled subtree earns a settle wait
    /// before the parent layer proceeds.
    ///
    /// Names that resolve to no unit are logged and skipped. Descent is
    /// abandoned past [`MAX_TOGGLE_DEPTH`] so a dependency cycle typed
    /// into the config cannot hang the loop. Returns the number of units
    /// toggled at this level.
    fn toggle_dependents(
        &mut self,
        parent: String,
        deps: Vec<String>,
        now: i64,
        mode: Toggle,
        depth: u32,
    ) -> Pin<Box<dyn Future<Output = usize> + '_>> {
        Box::pin(async move {
            if depth >= MAX_TOGGLE_DEPTH {
                self.log.error(format!(
                    "dependents of \"{parent}\" exceed depth {MAX_TOGGLE_DEPTH}; stopping descent"
                ));
                return 0;
            }
            self.log
                .info(format!("walking dependents of \"{parent}\""));

            let mut count = 0;
            for name in deps {
                if self.cancel.is_cancelled() {
                    break;
                }
                let Some(idx) = self.index_of(&name) else {
                    self.log.info(format!("unit \"{name}\" not found"));
                    continue;
                };
                let state = self.live_state(idx).await;

                match mode {
                    Toggle::Stop => {
                        if state == ObservedState::Inactive {
                            continue;
                        }
                        let children = self.units[idx].dependents.clone();
                        if !children.is_empty() {
                            let toggled = self
                                .toggle_dependents(name.clone(), children, now, mode, depth + 1)
                                .await;
                            if toggled > 0 && !self.wait_or_cancel(SETTLE_WAIT).await {
                                break;
                            }
                        }
                        self.stop_unit(idx).await;
                        self.units[idx].restarted_today = true;
                        count += 1;
                    }
                    Toggle::Start => {
                        if state != ObservedState::Inactive
                            || !self.units[idx].range.is_between(now)
                        {
                            continue;
                        }
                        self.start_unit(idx).await;
                        self.units[idx].restarted_today = true;
                        let children = self.units[idx].dependents.clone();
                        if !children.is_empty() {
                            let toggled = self
                                .toggle_dependents(name.clone(), children, now, mode, depth + 1)
                                .await;
                            if toggled > 0 && !self.wait_or_cancel(SETTLE_WAIT).await {
                                break;
                            }
                        }
                        count += 1;
                    }
                }
            }
            count
        })
    }

    /// Detects local-midnight rollover and re-plans the day.
    async fn switch_to_new_day(&mut self) {
        let today = schedule::today_string();
        if today == self.last_date {
            return;
        }
        self.begin_day(today).await;
    }

    /// Re-plans for `today`: refresh the working-day flag, renew the
    /// log, sweep, re-anchor every schedule, clear the restart latches
    /// and re-seed observed states.
    async fn begin_day(&mut self, today: String) {
        self.log.info(format!("day rollover to {today}"));
        self.last_date = today;

        // Non-fatal after the first day: on failure the prior
        // working-day value sticks.
        let _ = self.resolve_working_day(false).await;

        self.log.renew();
        if !self.janitor.is_empty() {
            self.janitor.sweep(&self.log);
        }

        for unit in &mut self.units {
            unit.range.prepare();
            unit.restarted_today = false;
        }
        self.seed_unit_states().await;
    }

    /// Resolves today's working-day flag: oracle, then same-day cache,
    /// then — on the first day only — a fatal error.
    #[cfg(feature = "workday")]
    async fn resolve_working_day(&mut self, first: bool) -> Result<(), RuntimeError> {
        let Some(calendar) = &self.calendar else {
            return Ok(());
        };
        let today = self.last_date.clone();

        let resolved = match calendar
            .fetch_working_date(&today, &self.cancel, &self.log)
            .await
        {
            Some(date) => Some(date),
            None => {
                if self.cancel.is_cancelled() {
                    // Shutdown during the retry loop: nothing failed,
                    // block() will exit cleanly.
                    return Ok(());
                }
                calendar.cache_fallback(&today, &self.log)
            }
        };

        match resolved {
            Some(date) => {
                self.working_day = date == today;
                self.log.info(format!(
                    "current date \"{today}\" is a working day: {}",
                    self.working_day
                ));
                if !self.working_day {
                    self.log.info(format!("next working day is \"{date}\""));
                }
                Ok(())
            }
            None if first => {
                self.log
                    .error(format!("failed to load day status for \"{today}\""));
                Err(RuntimeError::WorkdayResolve { date: today })
            }
            None => {
                self.log.error(format!(
                    "failed to load day status for \"{today}\"; keeping working_day={}",
                    self.working_day
                ));
                Ok(())
            }
        }
    }

    /// Without the `workday` feature every day is a working day.
    #[cfg(not(feature = "workday"))]
    async fn resolve_working_day(&mut self, _first: bool) -> Result<(), RuntimeError> {
        Ok(())
    }

    /// Queries live status for every unit and seeds the observed state.
    async fn seed_unit_states(&mut self) {
        for idx in 0..self.units.len() {
            self.log
                .debug(format!("prepare unit: \"{}\"", self.units[idx].name));
            self.units[idx].range.describe(&self.log);

            let observed = self.live_state(idx).await;
            self.units[idx].observed = observed;
            self.log.debug(format!(
                "\"{}\" unit status: {observed}",
                self.units[idx].name
            ));
        }
    }

    /// Reads the unit's live state, collapsing errors to inactive.
    async fn live_state(&self, idx: usize) -> ObservedState {
        let name = &self.units[idx].name;
        match self.driver.status(name).await {
            Ok(state) => {
                if state.is_running() {
                    ObservedState::Active
                } else {
                    if state != crate::driver::ActiveState::Inactive {
                        self.log
                            .debug(format!("unit \"{name}\" status found: {state}"));
                    }
                    ObservedState::Inactive
                }
            }
            Err(err) => {
                self.log
                    .error(format!("failed to check status of \"{name}\": {err}"));
                ObservedState::Inactive
            }
        }
    }

    /// Starts a unit; observed state flips to active only on RPC success.
    async fn start_unit(&mut self, idx: usize) {
        let name = self.units[idx].name.clone();
        self.log.info(format!("starting unit: \"{name}\""));
        match self.driver.start(&name).await {
            Ok(()) => {
                self.units[idx].observed = ObservedState::Active;
                self.log.info(format!("\"{name}\" status changed to active"));
            }
            Err(err) => self
                .log
                .error(format!("failed to start \"{name}\": {err}")),
        }
    }

    /// Stops a unit; observed state flips to inactive only on RPC success.
    async fn stop_unit(&mut self, idx: usize) {
        let name = self.units[idx].name.clone();
        self.log.info(format!("stopping unit: \"{name}\""));
        match self.driver.stop(&name).await {
            Ok(()) => {
                self.units[idx].observed = ObservedState::Inactive;
                self.log
                    .info(format!("\"{name}\" status changed to inactive"));
            }
            Err(err) => self
                .log
                .error(format!("failed to stop \"{name}\": {err}")),
        }
    }

    /// Restarts a unit; observed state flips to active on RPC success.
    async fn restart_unit(&mut self, idx: usize) {
        let name = self.units[idx].name.clone();
        self.log.info(format!("restarting unit: \"{name}\""));
        match self.driver.restart(&name).await {
            Ok(()) => {
                self.units[idx].observed = ObservedState::Active;
                self.log.info(format!("\"{name}\" restarted"));
            }
            Err(err) => self
                .log
                .error(format!("failed to restart \"{name}\": {err}")),
        }
    }

    /// Sleeps up to `duration`; returns `false` immediately once the
    /// cancel token fires. The only suspension point of the loop.
    async fn wait_or_cancel(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = self.cancel.cancelled() => false,
        }
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.units.iter().position(|unit| unit.name == name)
    }
}

#[cfg(test)]
#[path = "core_tests.rs"]
mod core_tests;
