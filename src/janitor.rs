//! # Filesystem janitor: aged-file sweep and empty-dir pruning.
//!
//! [`Janitor`] walks each configured root and deletes files that have
//! not been written for five days, then prunes directories the sweep
//! left empty. It runs once at start-up and once per day rollover.
//!
//! ## Rules
//! - A file is deletable only when its extension is in the sweep's set,
//!   its path contains `/cache/` when the sweep is marked `is_cache`,
//!   and its last write is ≥ 120 hours in the past.
//! - A sweep with an empty extension set is skipped entirely.
//! - Empty-dir pruning is bottom-up and never removes the root itself.
//! - Every deletion is logged; every per-file error is logged and
//!   skipped. The janitor never fails the caller.

use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};

use walkdir::WalkDir;

use crate::logger::DayLog;

/// Minimum age before a file becomes deletable: 5 × 24 h.
const DELETE_AGE: Duration = Duration::from_secs(120 * 3600);

/// Path fragment that marks cache files.
const CACHE_KEY: &str = "/cache/";

/// One sweep root and its matching rules.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Directory to walk recursively.
    pub dir: std::path::PathBuf,
    /// Extensions to delete, with or without the leading dot.
    pub extensions: Vec<String>,
    /// When set, only paths containing `/cache/` are touched.
    pub is_cache: bool,
    /// When set, directories left empty are pruned bottom-up.
    pub delete_empty_dirs: bool,
}

/// Deletes aged files and stale empty directories.
pub struct Janitor {
    sweeps: Vec<SweepConfig>,
}

impl Janitor {
    /// Creates a janitor over the given sweep list.
    pub fn new(sweeps: Vec<SweepConfig>) -> Self {
        Self { sweeps }
    }

    /// Whether there is anything to sweep at all.
    pub fn is_empty(&self) -> bool {
        self.sweeps.is_empty()
    }

    /// Runs one full pass over every configured sweep.
    pub fn sweep(&self, log: &DayLog) {
        log.info("starting dust sweep");
        for sweep in &self.sweeps {
            if sweep.extensions.is_empty() {
                continue;
            }
            if !sweep.dir.is_dir() {
                log.info(format!("sweep root not found: {}", sweep.dir.display()));
                continue;
            }
            sweep_files(sweep, log);
            if sweep.delete_empty_dirs {
                prune_empty_dirs(&sweep.dir, log);
            }
        }
        log.info("dust sweep finished");
    }
}

fn sweep_files(sweep: &SweepConfig, log: &DayLog) {
    for entry in WalkDir::new(&sweep.dir) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                log.error(format!("sweep walk error: {err}"));
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if sweep.is_cache && !path.to_string_lossy().contains(CACHE_KEY) {
            continue;
        }
        if !extension_matches(path, &sweep.extensions) {
            continue;
        }
        if !is_aged(path) {
            continue;
        }
        log.info(format!("deleting file: {}", path.display()));
        if let Err(err) = fs::remove_file(path) {
            log.error(format!(
                "unable to delete file {}: {err}",
                path.display()
            ));
        }
    }
}

/// Compares the file extension against the sweep set, tolerating a
/// leading dot on either side.
fn extension_matches(path: &Path, extensions: &[String]) -> bool {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    extensions
        .iter()
        .any(|candidate| candidate.trim_start_matches('.') == ext)
}

/// Whether the file's last write is at least [`DELETE_AGE`] in the past.
///
/// Unreadable metadata reads as "not aged": the file is kept.
fn is_aged(path: &Path) -> bool {
    let Ok(modified) = fs::metadata(path).and_then(|m| m.modified()) else {
        return false;
    };
    match SystemTime::now().duration_since(modified) {
        Ok(age) => age >= DELETE_AGE,
        Err(_) => false,
    }
}

/// Removes directories that are empty after the file sweep, children
/// before parents, leaving the root in place.
fn prune_empty_dirs(root: &Path, log: &DayLog) {
    for entry in WalkDir::new(root).min_depth(1).contents_first(true) {
        let Ok(entry) = entry else { continue };
        if !entry.file_type().is_dir() {
            continue;
        }
        let path = entry.path();
        let is_empty = fs::read_dir(path)
            .map(|mut dir| dir.next().is_none())
            .unwrap_or(false);
        if !is_empty {
            continue;
        }
        match fs::remove_dir(path) {
            Ok(()) => log.info(format!("deleted empty directory: {}", path.display())),
            Err(err) => log.error(format!(
                "unable to delete directory {}: {err}",
                path.display()
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::FileTime;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn test_log(dir: &TempDir) -> std::sync::Arc<DayLog> {
        DayLog::open_in(&dir.path().join("log"), u64::MAX).unwrap()
    }

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
    }

    fn age(path: &Path, hours: u64) {
        let past = SystemTime::now() - Duration::from_secs(hours * 3600);
        filetime::set_file_mtime(path, FileTime::from_system_time(past)).unwrap();
    }

    fn sweep_once(root: PathBuf, extensions: &[&str], is_cache: bool, empty_dirs: bool) {
        let scratch = TempDir::new().unwrap();
        let janitor = Janitor::new(vec![SweepConfig {
            dir: root,
            extensions: extensions.iter().map(|s| s.to_string()).collect(),
            is_cache,
            delete_empty_dirs: empty_dirs,
        }]);
        janitor.sweep(&test_log(&scratch));
    }

    #[test]
    fn deletes_only_aged_files_with_matching_extension() {
        let dir = TempDir::new().unwrap();
        let aged_log = dir.path().join("old.log");
        let fresh_log = dir.path().join("new.log");
        let aged_dat = dir.path().join("old.dat");
        touch(&aged_log);
        touch(&fresh_log);
        touch(&aged_dat);
        age(&aged_log, 121);
        age(&aged_dat, 121);

        sweep_once(dir.path().to_path_buf(), &[".log"], false, false);

        assert!(!aged_log.exists(), "aged .log must be swept");
        assert!(fresh_log.exists(), "fresh file must survive");
        assert!(aged_dat.exists(), "non-matching extension must survive");
    }

    #[test]
    fn boundary_age_is_inclusive() {
        let dir = TempDir::new().unwrap();
        let just_aged = dir.path().join("edge.log");
        touch(&just_aged);
        age(&just_aged, 120);

        sweep_once(dir.path().to_path_buf(), &[".log"], false, false);
        assert!(!just_aged.exists());
    }

    #[test]
    fn cache_sweeps_only_touch_cache_paths() {
        let dir = TempDir::new().unwrap();
        let cached = dir.path().join("cache").join("old.dat");
        let plain = dir.path().join("data").join("old.dat");
        touch(&cached);
        touch(&plain);
        age(&cached, 121);
        age(&plain, 121);

        sweep_once(dir.path().to_path_buf(), &[".dat"], true, false);

        assert!(!cached.exists(), "aged file under /cache/ must be swept");
        assert!(plain.exists(), "file outside /cache/ must survive");
    }

    #[test]
    fn empty_dirs_are_pruned_bottom_up_but_root_stays() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a").join("b").join("c");
        fs::create_dir_all(&nested).unwrap();
        let keeper = dir.path().join("keep").join("file.txt");
        touch(&keeper);

        sweep_once(dir.path().to_path_buf(), &[".log"], false, true);

        assert!(!dir.path().join("a").exists(), "empty chain must be pruned");
        assert!(keeper.exists());
        assert!(dir.path().is_dir(), "sweep root itself must survive");
    }

    #[test]
    fn empty_extension_set_skips_the_sweep() {
        let dir = TempDir::new().unwrap();
        let aged = dir.path().join("old.log");
        touch(&aged);
        age(&aged, 200);

        sweep_once(dir.path().to_path_buf(), &[], false, true);
        assert!(aged.exists());
    }

    #[test]
    fn missing_root_is_tolerated() {
        let dir = TempDir::new().unwrap();
        sweep_once(dir.path().join("nope"), &[".log"], false, true);
    }
}
