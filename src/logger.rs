//! # Daily log file with a hard size cap.
//!
//! [`DayLog`] appends timestamped lines to `./svcm/log/YYYY_MM_DD.log`
//! and mirrors every line to stdout. It is shared as an `Arc<DayLog>`
//! across the supervisor, the janitor and the signal task; interior
//! locking keeps concurrent writers line-atomic.
//!
//! ## Rules
//! - A newly created file gets an intro banner; an existing file gets a
//!   separator so restarts are visible in the log.
//! - Line format: `HH:MM:SS.mmm\tLEVEL\tmessage`.
//! - Hard cap of 40 MB per file: once exceeded a single
//!   `MAX_SIZE_EXCEEDED` marker is written and further file writes are
//!   dropped. The stdout mirror keeps going.
//! - [`DayLog::renew`] reopens under today's file name and resets the
//!   cap budget. Called on day rollover.
//! - Logging never fails the caller; file I/O errors are swallowed.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::Local;

/// Default log directory.
const LOG_DIR: &str = "./svcm/log";

/// Hard per-file cap: 40 MB.
const MAX_LOG_BYTES: u64 = 40_000_000;

/// Marker written once when the cap is exceeded.
const CAP_MARKER: &str = "\nMAX_SIZE_EXCEEDED\n";

/// Log severities, lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

impl Level {
    fn as_str(self) -> &'static str {
        match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        }
    }
}

struct Inner {
    out: Option<File>,
    written: u64,
    capped: bool,
}

/// File-backed daily logger, mirrored to stdout.
pub struct DayLog {
    dir: PathBuf,
    max_bytes: u64,
    inner: Mutex<Inner>,
}

impl DayLog {
    /// Opens today's log file under the default `./svcm/log` directory.
    pub fn open() -> std::io::Result<Arc<Self>> {
        Self::open_in(Path::new(LOG_DIR), MAX_LOG_BYTES)
    }

    /// Opens today's log file under `dir` with a custom size cap.
    pub fn open_in(dir: &Path, max_bytes: u64) -> std::io::Result<Arc<Self>> {
        let log = Self {
            dir: dir.to_path_buf(),
            max_bytes,
            inner: Mutex::new(Inner {
                out: None,
                written: 0,
                capped: false,
            }),
        };
        {
            let mut inner = log.inner.lock().unwrap_or_else(|e| e.into_inner());
            log.open_today(&mut inner)?;
        }
        Ok(Arc::new(log))
    }

    /// Closes the current file and reopens under today's name.
    ///
    /// Resets the size-cap budget; each day's file gets its own 40 MB.
    /// A failed reopen leaves the logger stdout-only rather than failing
    /// the rollover.
    pub fn renew(&self) {
        self.info("log switching");
        {
            let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            inner.out = None;
            inner.written = 0;
            inner.capped = false;
            if let Err(err) = self.open_today(&mut inner) {
                eprintln!("unable to reopen log file: {err}");
            }
        }
        self.info("log renewed");
    }

    /// Logs at DEBUG severity.
    pub fn debug(&self, msg: impl AsRef<str>) {
        self.write(Level::Debug, msg.as_ref());
    }

    /// Logs at INFO severity.
    pub fn info(&self, msg: impl AsRef<str>) {
        self.write(Level::Info, msg.as_ref());
    }

    /// Logs at WARN severity.
    pub fn warn(&self, msg: impl AsRef<str>) {
        self.write(Level::Warn, msg.as_ref());
    }

    /// Logs at ERROR severity.
    pub fn error(&self, msg: impl AsRef<str>) {
        self.write(Level::Error, msg.as_ref());
    }

    /// Path of the file currently written to, for diagnostics and tests.
    pub fn current_path(&self) -> PathBuf {
        self.dir
            .join(format!("{}.log", Local::now().format("%Y_%m_%d")))
    }

    fn write(&self, level: Level, msg: &str) {
        let line = format!("{}\t{}\t{}\n", Local::now().format("%H:%M:%S%.3f"), level.as_str(), msg);
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        self.write_raw(&mut inner, &line);
    }

    /// Mirrors `data` to stdout and appends it to the file while the cap
    /// budget lasts.
    fn write_raw(&self, inner: &mut Inner, data: &str) {
        print!("{data}");
        if inner.capped {
            return;
        }
        let Some(out) = inner.out.as_mut() else {
            return;
        };
        inner.written += data.len() as u64;
        let _ = out.write_all(data.as_bytes());
        if inner.written >= self.max_bytes {
            let _ = out.write_all(CAP_MARKER.as_bytes());
            let _ = out.flush();
            inner.capped = true;
        }
    }

    fn open_today(&self, inner: &mut Inner) -> std::io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.current_path();
        let existed = path.exists();
        let out = OpenOptions::new().create(true).append(true).open(&path)?;
        inner.out = Some(out);
        self.write_intro(inner, existed);
        Ok(())
    }

    /// Banner on a fresh file, bare separator when appending to an
    /// existing one.
    fn write_intro(&self, inner: &mut Inner, existed: bool) {
        let rule = format!("{}\n", "-".repeat(65));
        if existed {
            self.write_raw(inner, &rule);
        } else {
            self.write_raw(inner, &rule);
            self.write_raw(
                inner,
                &format!(
                    "This log generated at {} for svcvisor v{}\n",
                    Local::now().format("%Y-%m-%d %H:%M:%S"),
                    env!("CARGO_PKG_VERSION"),
                ),
            );
            self.write_raw(inner, &rule);
        }
    }
}
