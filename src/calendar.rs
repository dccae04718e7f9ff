//! # Calendar oracle client and its disk cache.
//!
//! The supervisor learns whether today is a working day by asking a
//! remote oracle for the *next working date*: when that date equals
//! today, today is a working day.
//!
//! - [`CalendarClient::fetch_working_date`] — HTTP/1.1 GET with up to
//!   ten linear-backoff attempts, every wait cancellable.
//! - [`DateCache`] — `./svcm/cache.d` holding `fetched_on~next_date`;
//!   usable only on the day it was written.
//!
//! ## Rules
//! - Plain HTTP only; port 443 is rejected at config load.
//! - The response body must be a strict `YYYY-MM-DD` date (trailing
//!   whitespace tolerated); anything else counts as a failed attempt.
//! - A successful fetch persists the cache write-then-rename, so a
//!   crash mid-write can never corrupt a previously good cache.
//! - Every failed attempt logs one warn line.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::HttpConfig;
use crate::error::RuntimeError;
use crate::logger::DayLog;
use crate::policy::RetryPolicy;
use crate::schedule;

/// Default location of the trade-date cache.
pub const CACHE_PATH: &str = "./svcm/cache.d";

/// Oracle resource queried for the next working date.
const ORACLE_PATH: &str = "/svc/trade-date";

/// Separator between the fetched-on date and the cached date.
const CACHE_SEP: char = '~';

/// Per-request timeout; the retry loop handles slow oracles.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Disk cache for the last successfully fetched working date.
#[derive(Debug, Clone)]
pub struct DateCache {
    path: PathBuf,
}

impl DateCache {
    /// Creates a cache handle at the given path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Reads the cached date, returning it only when the cache was
    /// written today. Unparseable or stale contents are discarded.
    pub fn load(&self, today: &str, log: &DayLog) -> Option<String> {
        let data = match fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(_) => {
                log.debug(format!("no cache file found: {}", self.path.display()));
                return None;
            }
        };
        let Some((fetched_on, date)) = data.trim_end().split_once(CACHE_SEP) else {
            log.error(format!(
                "invalid cache data \"{data}\" in {}",
                self.path.display()
            ));
            return None;
        };
        if !schedule::is_valid_date(fetched_on) || !schedule::is_valid_date(date) {
            log.error(format!(
                "invalid cache dates \"{fetched_on}\" / \"{date}\" in {}",
                self.path.display()
            ));
            return None;
        }
        if fetched_on != today {
            log.debug(format!(
                "cache written on {fetched_on}, unusable for {today}"
            ));
            return None;
        }
        Some(date.to_string())
    }

    /// Persists `today~date`, writing a sibling temp file first and
    /// renaming it into place. Failures are logged and ignored.
    pub fn store(&self, today: &str, date: &str, log: &DayLog) {
        if let Some(parent) = self.path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        let tmp = self.path.with_extension("tmp");
        let payload = format!("{today}{CACHE_SEP}{date}");
        let result = fs::write(&tmp, payload).and_then(|()| fs::rename(&tmp, &self.path));
        match result {
            Ok(()) => log.debug(format!(
                "trade date \"{date}\" cached at {}",
                self.path.display()
            )),
            Err(err) => log.debug(format!(
                "failed to write cache {}: {err}",
                self.path.display()
            )),
        }
    }

    /// Cache file location, for logs.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// HTTP client for the working-date oracle.
pub struct CalendarClient {
    http: reqwest::Client,
    base: String,
    cache: DateCache,
    /// Attempt count and backoff spacing of the fetch loop.
    pub retry: RetryPolicy,
}

impl CalendarClient {
    /// Builds a client for the configured oracle with the default cache
    /// location.
    pub fn new(cfg: &HttpConfig) -> Result<Self, RuntimeError> {
        Self::with_cache(cfg, DateCache::new(CACHE_PATH))
    }

    /// Builds a client with an explicit cache handle.
    pub fn with_cache(cfg: &HttpConfig, cache: DateCache) -> Result<Self, RuntimeError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base: format!("http://{}:{}", cfg.server, cfg.port),
            cache,
            retry: RetryPolicy::default(),
        })
    }

    /// Oracle endpoint, for logs.
    pub fn host(&self) -> &str {
        &self.base
    }

    /// Fetches the next working date, retrying with linear backoff.
    ///
    /// Returns `None` after the attempts are exhausted or as soon as a
    /// backoff wait observes cancellation. A successful fetch persists
    /// the cache before returning.
    pub async fn fetch_working_date(
        &self,
        today: &str,
        cancel: &CancellationToken,
        log: &DayLog,
    ) -> Option<String> {
        log.info(format!("loading trade date from host: \"{}\"", self.base));

        for attempt in 1..=self.retry.attempts {
            match self.get_once().await {
                Ok(body) => {
                    let date = body.trim_end();
                    if date.is_empty() {
                        log.warn("oracle response has no body");
                    } else if !schedule::is_valid_date(date) {
                        log.warn(format!("invalid date in oracle response: \"{date}\""));
                    } else {
                        log.info(format!("trade date found \"{date}\""));
                        self.cache.store(today, date, log);
                        return Some(date.to_string());
                    }
                }
                Err(err) => log.warn(format!("oracle request failed: {err}")),
            }

            if attempt < self.retry.attempts {
                let delay = self.retry.delay(attempt);
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => return None,
                }
            }
        }
        None
    }

    /// Reads the same-day cache after a failed fetch.
    pub fn cache_fallback(&self, today: &str, log: &DayLog) -> Option<String> {
        log.info(format!(
            "loading trade date from cache: \"{}\"",
            self.cache.path().display()
        ));
        let date = self.cache.load(today, log)?;
        log.info(format!("cached trade date found \"{date}\""));
        Some(date)
    }

    async fn get_once(&self) -> Result<String, reqwest::Error> {
        let response = self
            .http
            .get(format!("{}{}", self.base, ORACLE_PATH))
            .header("Connection", "close")
            .header("X-Req-From", "service")
            .send()
            .await?
            .error_for_status()?;
        response.text().await
    }
}
