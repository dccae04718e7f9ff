//! Per-unit supervision state.
//!
//! One [`UnitState`] per configured unit: the immutable schedule loaded
//! from config plus the two fields the loop mutates, the observed state
//! and the once-per-day restart latch.

use crate::schedule::TimeRange;

/// The supervisor's two-valued view of a unit.
///
/// The init system reports a richer vocabulary; the supervisor collapses
/// it so every decision reduces to "running or not". Failed, unknown and
/// unreachable all read as `Inactive` — a unit in that state gets started
/// again if its window says so.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservedState {
    Active,
    Inactive,
}

impl std::fmt::Display for ObservedState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ObservedState::Active => "active",
            ObservedState::Inactive => "inactive",
        })
    }
}

/// Supervision state of one configured unit.
///
/// Owned exclusively by the supervisor; `observed` and `restarted_today`
/// are mutated only from the supervision loop.
#[derive(Debug, Clone)]
pub struct UnitState {
    /// Canonical unit name, suffix-normalized at load.
    pub name: String,
    /// Hold the unit inactive on non-working days.
    pub required_workday: bool,
    /// Units stopped before and restarted after this unit's daily
    /// restart, in order. Name references, resolved at traversal time.
    pub dependents: Vec<String>,
    /// Operational window and restart instant, re-anchored daily.
    pub range: TimeRange,
    /// Last state the loop saw or enforced.
    pub observed: ObservedState,
    /// Latch preventing the daily restart from firing twice; cleared at
    /// day rollover.
    pub restarted_today: bool,
}

impl UnitState {
    /// Creates the load-time state: observed inactive, latch clear.
    pub fn new(
        name: String,
        required_workday: bool,
        dependents: Vec<String>,
        range: TimeRange,
    ) -> Self {
        Self {
            name,
            required_workday,
            dependents,
            range,
            observed: ObservedState::Inactive,
            restarted_today: false,
        }
    }
}
