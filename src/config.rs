//! # Configuration loading for the supervisor.
//!
//! Parses `./svcm/config.json` into the unit table and the janitor sweep
//! list, validating everything that can be validated before the loop
//! starts. Config problems are the one class of error this crate treats
//! as fatal, so the messages carry the JSON path of the offending field.
//!
//! ## Shape
//! ```json
//! {
//!   "http": { "server": "cal.example.net", "port": 8080 },
//!   "svc": [
//!     {
//!       "name": "feed-gateway",
//!       "start": "08:30:00",
//!       "end": "17:30:00",
//!       "restart": "12:00:00",
//!       "required_workday": true,
//!       "dependent": ["feed-decoder"]
//!     }
//!   ],
//!   "dust": {
//!     "logs": { "dir": "/var/log/feeds", "ext": [".log"], "delete_empty_dir": true }
//!   }
//! }
//! ```
//!
//! ## Rules
//! - Unit names and every dependent name get the `.service` suffix
//!   appended when they carry no extension.
//! - Schedule strings are parsed (and windows anchored) here, once.
//! - Duplicate canonical unit names are rejected.
//! - The `http` section is required only when the `workday` feature is
//!   compiled in; port 443 and ports outside `1..=65534` are rejected.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::driver::normalize_unit_name;
use crate::error::ConfigError;
use crate::janitor::SweepConfig;
use crate::schedule::TimeRange;
use crate::supervisor::UnitState;

/// Default location of the configuration file.
pub const CONFIG_PATH: &str = "./svcm/config.json";

/// Calendar oracle endpoint, validated.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Oracle host name or address.
    pub server: String,
    /// Plain-HTTP port, `1..=65534` and never 443.
    pub port: u16,
}

/// Everything `prepare()` needs, extracted from one config file.
#[derive(Debug)]
pub struct LoadedConfig {
    /// Oracle endpoint; `None` when the `workday` feature is disabled.
    pub http: Option<HttpConfig>,
    /// Unit table in declaration order.
    pub units: Vec<UnitState>,
    /// Janitor sweep descriptors.
    pub sweeps: Vec<SweepConfig>,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    http: Option<RawHttp>,
    svc: Vec<RawUnit>,
    #[serde(default)]
    dust: BTreeMap<String, RawSweep>,
}

#[derive(Debug, Deserialize)]
struct RawHttp {
    server: String,
    port: i64,
}

#[derive(Debug, Deserialize)]
struct RawUnit {
    name: String,
    start: String,
    end: String,
    #[serde(default)]
    restart: String,
    required_workday: bool,
    #[serde(default)]
    dependent: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawSweep {
    #[serde(default)]
    dir: String,
    #[serde(default)]
    is_cache: bool,
    #[serde(default)]
    delete_empty_dir: bool,
    #[serde(default)]
    ext: Vec<String>,
}

/// Loads and validates the configuration file at `path`.
pub fn load(path: &Path) -> Result<LoadedConfig, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let raw: RawConfig = serde_json::from_str(&text)?;

    let http = if cfg!(feature = "workday") {
        Some(validate_http(raw.http)?)
    } else {
        None
    };

    let mut seen = HashSet::new();
    let mut units = Vec::with_capacity(raw.svc.len());
    for entry in raw.svc {
        let name = normalize_unit_name(&entry.name);
        if !seen.insert(name.clone()) {
            return Err(ConfigError::DuplicateUnit { name });
        }
        let dependents: Vec<String> = entry
            .dependent
            .iter()
            .map(|d| normalize_unit_name(d))
            .collect();
        let range = TimeRange::new(&name, &entry.start, &entry.end, &entry.restart)?;
        units.push(UnitState::new(
            name,
            entry.required_workday,
            dependents,
            range,
        ));
    }

    let sweeps = raw
        .dust
        .into_values()
        .map(|entry| SweepConfig {
            dir: sweep_dir(&entry.dir),
            extensions: entry.ext,
            is_cache: entry.is_cache,
            delete_empty_dirs: entry.delete_empty_dir,
        })
        .collect();

    Ok(LoadedConfig {
        http,
        units,
        sweeps,
    })
}

fn validate_http(raw: Option<RawHttp>) -> Result<HttpConfig, ConfigError> {
    let raw = raw.ok_or(ConfigError::MissingSection { section: "http" })?;
    if raw.port <= 0 || raw.port == 443 || raw.port >= 65_535 {
        return Err(ConfigError::InvalidPort { port: raw.port });
    }
    Ok(HttpConfig {
        server: raw.server,
        port: raw.port as u16,
    })
}

/// An empty sweep dir means "the current working directory".
fn sweep_dir(dir: &str) -> PathBuf {
    if dir.is_empty() {
        std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
    } else {
        PathBuf::from(dir)
    }
}
