//! Supervision loop tests against a scripted init-system double.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use super::*;
use crate::driver::{ActiveState, UnitDriver};
use crate::error::DriverError;
use crate::schedule::TimeRange;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    Status(String),
    Start(String),
    Stop(String),
    Restart(String),
}

/// Driver double: unit states flip on start/stop/restart, every call is
/// recorded, and hooks simulate RPC failure or a shutdown signal landing
/// mid-transition.
struct ScriptedDriver {
    states: Mutex<HashMap<String, ActiveState>>,
    calls: Mutex<Vec<Call>>,
    fail_transitions: Mutex<bool>,
    cancel_on_restart: Mutex<Option<CancellationToken>>,
}

impl ScriptedDriver {
    fn new(states: &[(&str, ActiveState)]) -> Arc<Self> {
        Arc::new(Self {
            states: Mutex::new(
                states
                    .iter()
                    .map(|(name, state)| (name.to_string(), *state))
                    .collect(),
            ),
            calls: Mutex::new(Vec::new()),
            fail_transitions: Mutex::new(false),
            cancel_on_restart: Mutex::new(None),
        })
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn transitions(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| !matches!(call, Call::Status(_)))
            .collect()
    }

    fn fail_transitions(&self) {
        *self.fail_transitions.lock().unwrap() = true;
    }

    fn cancel_on_restart(&self, token: CancellationToken) {
        *self.cancel_on_restart.lock().unwrap() = Some(token);
    }

    fn record(&self, call: Call) -> Result<(), DriverError> {
        self.calls.lock().unwrap().push(call);
        if *self.fail_transitions.lock().unwrap() {
            return Err(DriverError::BadReply {
                reason: "scripted failure".to_string(),
            });
        }
        Ok(())
    }

    fn set_state(&self, unit: &str, state: ActiveState) {
        self.states.lock().unwrap().insert(unit.to_string(), state);
    }
}

#[async_trait]
impl UnitDriver for ScriptedDriver {
    async fn start(&self, unit: &str) -> Result<(), DriverError> {
        self.record(Call::Start(unit.to_string()))?;
        self.set_state(unit, ActiveState::Active);
        Ok(())
    }

    async fn stop(&self, unit: &str) -> Result<(), DriverError> {
        self.record(Call::Stop(unit.to_string()))?;
        self.set_state(unit, ActiveState::Inactive);
        Ok(())
    }

    async fn restart(&self, unit: &str) -> Result<(), DriverError> {
        self.record(Call::Restart(unit.to_string()))?;
        self.set_state(unit, ActiveState::Active);
        if let Some(token) = self.cancel_on_restart.lock().unwrap().as_ref() {
            token.cancel();
        }
        Ok(())
    }

    async fn status(&self, unit: &str) -> Result<ActiveState, DriverError> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Status(unit.to_string()));
        Ok(self
            .states
            .lock()
            .unwrap()
            .get(unit)
            .copied()
            .unwrap_or(ActiveState::Inactive))
    }
}

fn unit(name: &str, start: &str, end: &str, restart: &str, deps: &[&str]) -> UnitState {
    UnitState::new(
        name.to_string(),
        false,
        deps.iter().map(|d| d.to_string()).collect(),
        TimeRange::new(name, start, end, restart).unwrap(),
    )
}

fn harness(
    units: Vec<UnitState>,
    states: &[(&str, ActiveState)],
) -> (Supervisor, Arc<ScriptedDriver>, TempDir) {
    let dir = TempDir::new().unwrap();
    let log = DayLog::open_in(&dir.path().join("log"), u64::MAX).unwrap();
    let driver = ScriptedDriver::new(states);
    let driver_ref: DriverRef = driver.clone();
    let supervisor = Supervisor::new(units, driver_ref, Janitor::new(Vec::new()), log);
    (supervisor, driver, dir)
}

#[tokio::test(start_paused = true)]
async fn window_unit_starts_and_stops_exactly_once() {
    let a = unit("a.service", "09:00:00", "17:00:00", "", &[]);
    let (start_epoch, end_epoch, _) = a.range.epochs();
    let (mut sup, driver, _dir) = harness(vec![a], &[("a.service", ActiveState::Inactive)]);

    // Before the window: nothing to do.
    sup.run_tick(start_epoch - 60).await;
    assert!(driver.transitions().is_empty());

    // Inside the window: one start, then steady state.
    sup.run_tick(start_epoch + 30).await;
    sup.run_tick(start_epoch + 60).await;
    assert_eq!(
        driver.transitions(),
        vec![Call::Start("a.service".to_string())]
    );
    assert_eq!(sup.units[0].observed, ObservedState::Active);

    // After the window: one stop, then steady state.
    sup.run_tick(end_epoch + 30).await;
    sup.run_tick(end_epoch + 60).await;
    assert_eq!(
        driver.transitions(),
        vec![
            Call::Start("a.service".to_string()),
            Call::Stop("a.service".to_string()),
        ]
    );
    assert_eq!(sup.units[0].observed, ObservedState::Inactive);
}

#[tokio::test(start_paused = true)]
async fn window_boundaries_are_inclusive() {
    let a = unit("a.service", "09:00:00", "17:00:00", "", &[]);
    let (start_epoch, end_epoch, _) = a.range.epochs();
    let (mut sup, driver, _dir) = harness(vec![a], &[("a.service", ActiveState::Inactive)]);

    sup.run_tick(start_epoch).await;
    assert_eq!(
        driver.transitions(),
        vec![Call::Start("a.service".to_string())],
        "exact window start is in-window"
    );

    sup.run_tick(end_epoch).await;
    assert_eq!(
        driver.transitions().len(),
        1,
        "exact window end is still in-window, no stop yet"
    );
}

#[tokio::test(start_paused = true)]
async fn daily_restart_cycles_dependents_in_order() {
    let parent = unit("parent.service", "08:00:00", "22:00:00", "12:00:00", &["child.service"]);
    let child = unit("child.service", "08:00:00", "22:00:00", "", &[]);
    let (_, _, restart_epoch) = parent.range.epochs();
    let (mut sup, driver, _dir) = harness(
        vec![parent, child],
        &[
            ("parent.service", ActiveState::Active),
            ("child.service", ActiveState::Active),
        ],
    );
    sup.units[0].observed = ObservedState::Active;
    sup.units[1].observed = ObservedState::Active;

    sup.run_tick(restart_epoch + 15).await;

    let calls = driver.calls();
    assert_eq!(
        &calls[..5],
        &[
            Call::Status("child.service".to_string()),
            Call::Stop("child.service".to_string()),
            Call::Restart("parent.service".to_string()),
            Call::Status("child.service".to_string()),
            Call::Start("child.service".to_string()),
        ]
    );
    assert!(
        calls[5..].iter().all(|call| matches!(call, Call::Status(_))),
        "the rest of the tick may only reconcile by status"
    );
    assert!(sup.units[0].restarted_today);
    assert!(sup.units[1].restarted_today);

    // The latch holds: a second tick inside the acceptance window must
    // not restart again.
    sup.run_tick(restart_epoch + 45).await;
    let restarts = driver
        .transitions()
        .into_iter()
        .filter(|call| matches!(call, Call::Restart(_)))
        .count();
    assert_eq!(restarts, 1);
}

#[tokio::test(start_paused = true)]
async fn restart_fires_only_inside_the_acceptance_window() {
    let parent = unit("parent.service", "", "", "12:00:00", &[]);
    let (_, _, restart_epoch) = parent.range.epochs();
    let (mut sup, driver, _dir) =
        harness(vec![parent], &[("parent.service", ActiveState::Active)]);
    sup.units[0].observed = ObservedState::Active;

    sup.run_tick(restart_epoch - 1).await;
    sup.run_tick(restart_epoch + 61).await;
    assert!(
        !driver
            .transitions()
            .iter()
            .any(|call| matches!(call, Call::Restart(_))),
        "restart must not fire outside [restart, restart+60]"
    );
    assert!(!sup.units[0].restarted_today);

    sup.run_tick(restart_epoch + 60).await;
    assert!(sup.units[0].restarted_today);
}

#[tokio::test(start_paused = true)]
async fn non_working_day_holds_required_units_inactive() {
    let mut b = unit("b.service", "", "", "", &[]);
    b.required_workday = true;
    let (mut sup, driver, _dir) = harness(vec![b], &[("b.service", ActiveState::Active)]);
    sup.working_day = false;
    sup.seed_unit_states().await;

    sup.run_tick(0).await;
    assert_eq!(
        driver.transitions(),
        vec![Call::Stop("b.service".to_string())]
    );
    assert_eq!(sup.units[0].observed, ObservedState::Inactive);

    // Steady state: no more transitions on later ticks.
    sup.run_tick(30).await;
    sup.run_tick(60).await;
    assert_eq!(driver.transitions().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn working_day_gate_does_not_touch_unrestricted_units() {
    let a = unit("a.service", "", "", "", &[]);
    let (mut sup, driver, _dir) = harness(vec![a], &[("a.service", ActiveState::Active)]);
    sup.working_day = false;
    sup.seed_unit_states().await;

    sup.run_tick(0).await;
    assert!(
        driver.transitions().is_empty(),
        "units without required_workday ignore the gate"
    );
}

#[tokio::test(start_paused = true)]
async fn cancellation_mid_restart_skips_dependent_startup() {
    let parent = unit("parent.service", "", "", "12:00:00", &["child.service"]);
    let child = unit("child.service", "", "", "", &[]);
    let (_, _, restart_epoch) = parent.range.epochs();
    let (mut sup, driver, _dir) = harness(
        vec![parent, child],
        &[
            ("parent.service", ActiveState::Active),
            ("child.service", ActiveState::Active),
        ],
    );
    driver.cancel_on_restart(sup.cancel.clone());

    sup.run_tick(restart_epoch + 15).await;

    let calls = driver.transitions();
    assert!(calls.contains(&Call::Restart("parent.service".to_string())));
    assert!(
        !calls.iter().any(|call| matches!(call, Call::Start(_))),
        "no dependent may start after cancellation"
    );
    assert!(sup.units[0].restarted_today);
}

#[tokio::test(start_paused = true)]
async fn block_returns_promptly_after_exit() {
    let a = unit("a.service", "", "", "", &[]);
    let (mut sup, _driver, _dir) = harness(vec![a], &[("a.service", ActiveState::Active)]);
    let handle = sup.exit_handle();

    let (result, ()) = tokio::join!(sup.block(), async move {
        handle.exit();
    });
    assert!(result.is_ok(), "cancellation is a clean shutdown");
}

#[tokio::test(start_paused = true)]
async fn rollover_clears_latches_and_reseeds_states() {
    let parent = unit("parent.service", "08:00:00", "22:00:00", "12:00:00", &[]);
    let (mut sup, driver, _dir) =
        harness(vec![parent], &[("parent.service", ActiveState::Active)]);
    sup.units[0].restarted_today = true;
    sup.units[0].observed = ObservedState::Inactive;
    sup.last_date = "2000-01-01".to_string();

    sup.switch_to_new_day().await;

    assert_eq!(sup.last_date, schedule::today_string());
    assert!(!sup.units[0].restarted_today, "latch cleared at rollover");
    assert_eq!(
        sup.units[0].observed,
        ObservedState::Active,
        "observed state reseeded from live status"
    );
    assert!(driver
        .calls()
        .contains(&Call::Status("parent.service".to_string())));

    // Same-day wakeups do nothing.
    let seen = driver.calls().len();
    sup.switch_to_new_day().await;
    assert_eq!(driver.calls().len(), seen);
}

#[tokio::test(start_paused = true)]
async fn dependency_cycles_are_cut_by_the_depth_bound() {
    let a = unit("a.service", "", "", "12:00:00", &["b.service"]);
    let b = unit("b.service", "", "", "", &["a.service"]);
    let (_, _, restart_epoch) = a.range.epochs();
    let (mut sup, driver, _dir) = harness(
        vec![a, b],
        &[
            ("a.service", ActiveState::Active),
            ("b.service", ActiveState::Active),
        ],
    );

    // Must terminate despite the a → b → a cycle in config.
    sup.run_tick(restart_epoch + 10).await;
    assert!(
        driver.transitions().len() < 32,
        "depth bound must cut the cycle"
    );
}

#[tokio::test(start_paused = true)]
async fn missing_dependents_are_skipped() {
    let parent = unit("parent.service", "", "", "12:00:00", &["ghost.service"]);
    let (_, _, restart_epoch) = parent.range.epochs();
    let (mut sup, driver, _dir) =
        harness(vec![parent], &[("parent.service", ActiveState::Active)]);

    sup.run_tick(restart_epoch + 10).await;
    assert_eq!(
        driver.transitions(),
        vec![Call::Restart("parent.service".to_string())],
        "unknown dependent names are logged and skipped, never fatal"
    );
    assert!(sup.units[0].restarted_today);
}

#[tokio::test(start_paused = true)]
async fn rpc_failures_leave_observed_state_and_retry_next_tick() {
    let a = unit("a.service", "09:00:00", "17:00:00", "", &[]);
    let (start_epoch, _, _) = a.range.epochs();
    let (mut sup, driver, _dir) = harness(vec![a], &[("a.service", ActiveState::Inactive)]);
    driver.fail_transitions();

    sup.run_tick(start_epoch + 30).await;
    assert_eq!(
        sup.units[0].observed,
        ObservedState::Inactive,
        "failed start must not flip the observed state"
    );

    sup.run_tick(start_epoch + 60).await;
    let starts = driver
        .transitions()
        .into_iter()
        .filter(|call| matches!(call, Call::Start(_)))
        .count();
    assert_eq!(starts, 2, "the next tick retries the transition");
}

#[cfg(feature = "workday")]
mod workday {
    use super::*;
    use crate::calendar::{CalendarClient, DateCache};
    use crate::config::HttpConfig;
    use crate::policy::RetryPolicy;
    use crate::schedule;
    use std::time::Duration;
    use tokio::net::TcpListener;

    /// Client pointed at a port that refuses connections, with a fast
    /// retry policy so the ten-attempt loop costs milliseconds.
    async fn unreachable_client(cache: DateCache) -> CalendarClient {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let cfg = HttpConfig {
            server: "127.0.0.1".to_string(),
            port,
        };
        let mut client = CalendarClient::with_cache(&cfg, cache).unwrap();
        client.retry = RetryPolicy {
            attempts: 2,
            step: Duration::from_millis(1),
        };
        client
    }

    #[tokio::test]
    async fn oracle_failure_falls_back_to_the_same_day_cache() {
        let a = unit("a.service", "", "", "", &[]);
        let (mut sup, _driver, dir) = harness(vec![a], &[]);
        let today = schedule::today_string();

        let cache = DateCache::new(dir.path().join("cache.d"));
        cache.store(&today, &today, &sup.log);
        sup.calendar = Some(unreachable_client(cache).await);
        sup.last_date = today;
        sup.working_day = false;

        let result = sup.resolve_working_day(true).await;
        assert!(result.is_ok(), "same-day cache rescues the first day");
        assert!(sup.working_day, "cached date == today means working day");
    }

    #[tokio::test]
    async fn first_day_without_oracle_or_cache_is_fatal() {
        let a = unit("a.service", "", "", "", &[]);
        let (mut sup, _driver, dir) = harness(vec![a], &[]);

        sup.calendar =
            Some(unreachable_client(DateCache::new(dir.path().join("cache.d"))).await);
        sup.last_date = schedule::today_string();

        let err = sup.resolve_working_day(true).await.unwrap_err();
        assert_eq!(err.as_label(), "runtime_workday_resolve");
    }

    #[tokio::test]
    async fn later_day_failure_keeps_the_prior_value() {
        let a = unit("a.service", "", "", "", &[]);
        let (mut sup, _driver, dir) = harness(vec![a], &[]);

        sup.calendar =
            Some(unreachable_client(DateCache::new(dir.path().join("cache.d"))).await);
        sup.last_date = schedule::today_string();
        sup.working_day = false;

        let result = sup.resolve_working_day(false).await;
        assert!(result.is_ok(), "rollover failures are not fatal");
        assert!(!sup.working_day, "prior working-day value sticks");
    }
}

#[tokio::test(start_paused = true)]
async fn dependents_outside_their_window_are_not_started_back() {
    // Child window is a single instant far from the restart moment, so
    // the start pass must leave it down.
    let parent = unit("parent.service", "", "", "12:00:00", &["child.service"]);
    let child = unit("child.service", "23:59:58", "23:59:59", "", &[]);
    let (_, _, restart_epoch) = parent.range.epochs();
    let (mut sup, driver, _dir) = harness(
        vec![parent, child],
        &[
            ("parent.service", ActiveState::Active),
            ("child.service", ActiveState::Active),
        ],
    );

    sup.run_tick(restart_epoch + 10).await;
    assert!(
        !driver
            .transitions()
            .iter()
            .any(|call| matches!(call, Call::Start(_))),
        "a dependent outside its own window stays down"
    );
    assert!(driver
        .transitions()
        .contains(&Call::Stop("child.service".to_string())));
}
