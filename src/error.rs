//! # Error types used by the svcvisor runtime.
//!
//! This module defines three error enums:
//!
//! - [`ConfigError`] problems found while loading `./svcm/config.json`.
//! - [`RuntimeError`] failures of the supervisor itself (all fatal).
//! - [`DriverError`] failures of a single init-system RPC (never fatal).
//!
//! All types provide an `as_label` helper for logs.
//! [`DriverError`] is always absorbed by the supervision loop: a failed
//! RPC is treated as "unit not running" and retried on a later tick.

use thiserror::Error;

/// # Errors raised while loading and validating the configuration file.
///
/// Every variant is fatal at [`Supervisor::prepare`](crate::Supervisor::prepare).
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The config file could not be read at all.
    #[error("unable to open config file {path}: {source}")]
    Read {
        /// Path that was attempted.
        path: String,
        source: std::io::Error,
    },

    /// The file was read but is not the JSON we expect.
    #[error("invalid JSON in config file: {0}")]
    Parse(#[from] serde_json::Error),

    /// A required top-level section is absent.
    #[error("config->{section} not found in config file")]
    MissingSection {
        /// Section key, e.g. `http`.
        section: &'static str,
    },

    /// The oracle port is out of range or explicitly unsupported.
    #[error("config->http->port {port} invalid (https port not supported, range 1..65534)")]
    InvalidPort { port: i64 },

    /// A schedule string did not parse as `HH:MM:SS`.
    #[error("config->svc->[{unit}]->{field} \"{value}\" is not a valid HH:MM:SS time")]
    BadTime {
        /// Unit the bad field belongs to.
        unit: String,
        /// Field name: `start`, `end` or `restart`.
        field: &'static str,
        value: String,
    },

    /// The end of the window precedes its start on the same day.
    ///
    /// Windows spanning local midnight are rejected at load rather than
    /// silently treated as empty.
    #[error("config->svc->[{unit}] window end {end} precedes start {start}")]
    InvertedWindow {
        unit: String,
        start: String,
        end: String,
    },

    /// Two `svc` entries resolved to the same canonical unit name.
    #[error("duplicate unit \"{name}\" in config->svc")]
    DuplicateUnit { name: String },
}

impl ConfigError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::Read { .. } => "config_read",
            ConfigError::Parse(_) => "config_parse",
            ConfigError::MissingSection { .. } => "config_missing_section",
            ConfigError::InvalidPort { .. } => "config_invalid_port",
            ConfigError::BadTime { .. } => "config_bad_time",
            ConfigError::InvertedWindow { .. } => "config_inverted_window",
            ConfigError::DuplicateUnit { .. } => "config_duplicate_unit",
        }
    }
}

/// # Errors produced by the supervisor runtime.
///
/// These occur only at start-up or at the very first working-day
/// resolution; the reconciliation loop itself never propagates an error.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration could not be loaded or validated.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The daily log file could not be opened.
    #[error("unable to open log file: {0}")]
    LoggerOpen(#[from] std::io::Error),

    /// The init-system bus connection could not be established.
    #[error("unable to connect to the service manager bus: {0}")]
    DriverConnect(#[source] zbus::Error),

    /// The HTTP client for the calendar oracle could not be built.
    #[cfg(feature = "workday")]
    #[error("unable to build calendar http client: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// The first working-day resolution failed: the oracle was
    /// unreachable after all retries and no same-day cache exists.
    #[error("failed to resolve working-day status for {date}")]
    WorkdayResolve { date: String },
}

impl RuntimeError {
    /// Returns a short stable label.
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::Config(_) => "runtime_config",
            RuntimeError::LoggerOpen(_) => "runtime_logger_open",
            RuntimeError::DriverConnect(_) => "runtime_driver_connect",
            #[cfg(feature = "workday")]
            RuntimeError::HttpClient(_) => "runtime_http_client",
            RuntimeError::WorkdayResolve { .. } => "runtime_workday_resolve",
        }
    }
}

/// # Errors produced by a single init-system RPC.
///
/// The supervisor logs these and carries on; a unit whose status cannot
/// be read is treated as inactive and started again if its window says so.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum DriverError {
    /// The bus call itself failed (connection dropped, unit unknown,
    /// permission denied, ...).
    #[error("bus call failed: {0}")]
    Rpc(#[from] zbus::Error),

    /// The bus answered but the reply did not carry the expected value.
    #[error("unexpected reply from service manager: {reason}")]
    BadReply { reason: String },
}

impl DriverError {
    /// Returns a short stable label.
    pub fn as_label(&self) -> &'static str {
        match self {
            DriverError::Rpc(_) => "driver_rpc",
            DriverError::BadReply { .. } => "driver_bad_reply",
        }
    }
}
