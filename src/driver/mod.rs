//! # Init-system driver abstraction.
//!
//! Defines the [`UnitDriver`] trait, the one polymorphic seam of the
//! crate: the supervision loop drives units exclusively through it, so
//! tests substitute a scripted double and production uses
//! [`SystemdDriver`] over the D-Bus system bus.
//!
//! - **[`UnitDriver`]** — `start` / `stop` / `restart` / `status`
//! - **[`DriverRef`]** — shared handle (`Arc<dyn UnitDriver>`)
//! - **[`ActiveState`]** — the init system's unit state vocabulary
//!
//! ## Rules
//! - Calls are synchronous from the loop's point of view: one RPC is
//!   awaited to completion before the next transition is considered.
//! - The supervisor collapses the state vocabulary to two observed
//!   values; `active` and `activating` count as running, everything
//!   else (including RPC failures) counts as not running.

mod systemd;

pub use systemd::SystemdDriver;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::DriverError;

/// Suffix appended to unit names that carry no extension.
const UNIT_SUFFIX: &str = ".service";

/// Shared handle to a driver object.
pub type DriverRef = Arc<dyn UnitDriver>;

/// Unit state vocabulary as reported by the init system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveState {
    Active,
    Reloading,
    Inactive,
    Failed,
    Activating,
    Deactivating,
    Maintenance,
}

impl ActiveState {
    /// Parses the init system's state string; unknown or empty strings
    /// read as `Inactive`.
    pub fn parse(value: &str) -> Self {
        match value {
            "active" => ActiveState::Active,
            "reloading" => ActiveState::Reloading,
            "inactive" => ActiveState::Inactive,
            "failed" => ActiveState::Failed,
            "activating" => ActiveState::Activating,
            "deactivating" => ActiveState::Deactivating,
            "maintenance" => ActiveState::Maintenance,
            _ => ActiveState::Inactive,
        }
    }

    /// Whether the supervisor should treat the unit as running.
    pub fn is_running(self) -> bool {
        matches!(self, ActiveState::Active | ActiveState::Activating)
    }

    /// Stable lower-case name, matching the wire vocabulary.
    pub fn as_str(self) -> &'static str {
        match self {
            ActiveState::Active => "active",
            ActiveState::Reloading => "reloading",
            ActiveState::Inactive => "inactive",
            ActiveState::Failed => "failed",
            ActiveState::Activating => "activating",
            ActiveState::Deactivating => "deactivating",
            ActiveState::Maintenance => "maintenance",
        }
    }
}

impl std::fmt::Display for ActiveState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capability set the supervision loop needs from the init system.
///
/// Implementations must be safe to call repeatedly; the loop retries
/// failed transitions on later ticks rather than giving up.
#[async_trait]
pub trait UnitDriver: Send + Sync {
    /// Starts the named unit.
    async fn start(&self, unit: &str) -> Result<(), DriverError>;

    /// Stops the named unit.
    async fn stop(&self, unit: &str) -> Result<(), DriverError>;

    /// Restarts the named unit.
    async fn restart(&self, unit: &str) -> Result<(), DriverError>;

    /// Reads the unit's current state.
    async fn status(&self, unit: &str) -> Result<ActiveState, DriverError>;
}

/// Appends the `.service` suffix when `name` has no extension.
///
/// Names that already carry any extension (`.service`, `.timer`,
/// `.socket`, ...) pass through untouched.
pub fn normalize_unit_name(name: &str) -> String {
    if name.contains('.') {
        name.to_string()
    } else {
        format!("{name}{UNIT_SUFFIX}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_names_get_the_service_suffix() {
        assert_eq!(normalize_unit_name("feed-gateway"), "feed-gateway.service");
        assert_eq!(normalize_unit_name("a.service"), "a.service");
        assert_eq!(normalize_unit_name("tick.timer"), "tick.timer");
    }

    #[test]
    fn state_parse_collapses_unknowns_to_inactive() {
        assert_eq!(ActiveState::parse("active"), ActiveState::Active);
        assert_eq!(ActiveState::parse("activating"), ActiveState::Activating);
        assert_eq!(ActiveState::parse("deactivating"), ActiveState::Deactivating);
        assert_eq!(ActiveState::parse(""), ActiveState::Inactive);
        assert_eq!(ActiveState::parse("weird"), ActiveState::Inactive);
    }

    #[test]
    fn only_active_and_activating_count_as_running() {
        for state in [
            ActiveState::Active,
            ActiveState::Reloading,
            ActiveState::Inactive,
            ActiveState::Failed,
            ActiveState::Activating,
            ActiveState::Deactivating,
            ActiveState::Maintenance,
        ] {
            assert_eq!(
                state.is_running(),
                matches!(state, ActiveState::Active | ActiveState::Activating),
                "{state}"
            );
        }
    }
}
