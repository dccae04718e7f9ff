//! # Daily schedule windows anchored to the local calendar day.
//!
//! [`TimeRange`] turns the `HH:MM:SS` strings of a unit's configuration
//! into epoch instants anchored to *today* in the local time zone, and
//! answers the three questions the supervision loop asks every tick:
//!
//! - [`TimeRange::is_between`] is `now` inside the operational window?
//! - [`TimeRange::need_restart`] is `now` inside the once-per-day restart
//!   acceptance window?
//! - [`TimeRange::is_restart_supported`] does this unit restart at all?
//!
//! ## Rules
//! - An empty string or `00:00:00` means "unset"; an unset start/end pair
//!   makes the window always open, an unset restart disables restarting.
//! - Epochs go stale at local midnight; [`TimeRange::prepare`] re-anchors
//!   them and is called once per day rollover.
//! - Parsing happens once, at config load; the per-tick predicates are
//!   total and never fail.

use chrono::{DateTime, Local, NaiveDate, NaiveTime, TimeZone};

use crate::error::ConfigError;
use crate::logger::DayLog;

/// Seconds after the restart instant during which the restart still
/// fires. Absorbs tick jitter so the restart happens exactly once.
const RESTART_ACCEPT_SECS: i64 = 60;

/// The "unset" sentinel accepted in schedule strings.
const EMPTY_TIME: &str = "00:00:00";

/// Operational window and optional daily restart instant of one unit.
///
/// Holds the wall-clock times parsed at config load plus their epoch
/// anchors for the current day. A zero epoch means "unconstrained".
#[derive(Debug, Clone)]
pub struct TimeRange {
    /// Window opening time, `None` when the window is always open.
    start: Option<NaiveTime>,
    /// Window closing time, `None` when the window is always open.
    end: Option<NaiveTime>,
    /// Daily restart instant, `None` when the unit never restarts.
    restart: Option<NaiveTime>,
    start_epoch: i64,
    end_epoch: i64,
    restart_epoch: i64,
}

impl TimeRange {
    /// Parses the three schedule strings and anchors them to today.
    ///
    /// `unit` is only used in error messages. Blank strings and
    /// `00:00:00` map to "unset"; if either end of the window is unset
    /// the whole window is unset. A window whose end precedes its start
    /// is rejected: same-day semantics only, no midnight wrap.
    pub fn new(unit: &str, start: &str, end: &str, restart: &str) -> Result<Self, ConfigError> {
        let restart = parse_schedule_time(unit, "restart", restart)?;

        let mut start = parse_schedule_time(unit, "start", start)?;
        let mut end = parse_schedule_time(unit, "end", end)?;
        if start.is_none() || end.is_none() {
            start = None;
            end = None;
        }
        if let (Some(s), Some(e)) = (start, end) {
            if e < s {
                return Err(ConfigError::InvertedWindow {
                    unit: unit.to_string(),
                    start: s.format("%H:%M:%S").to_string(),
                    end: e.format("%H:%M:%S").to_string(),
                });
            }
        }

        let mut range = Self {
            start,
            end,
            restart,
            start_epoch: 0,
            end_epoch: 0,
            restart_epoch: 0,
        };
        range.prepare();
        Ok(range)
    }

    /// Re-anchors all epochs to today. Called at load and on day rollover.
    pub fn prepare(&mut self) {
        self.prepare_for(Local::now().date_naive());
    }

    /// Re-anchors all epochs to the given local date.
    pub(crate) fn prepare_for(&mut self, date: NaiveDate) {
        self.start_epoch = anchor(date, self.start);
        self.end_epoch = anchor(date, self.end);
        self.restart_epoch = anchor(date, self.restart);
    }

    /// Returns `true` when `now` falls inside the operational window.
    ///
    /// Both bounds are inclusive. An unset window is always open.
    pub fn is_between(&self, now: i64) -> bool {
        if self.start_epoch == 0 || self.end_epoch == 0 {
            return true;
        }
        now >= self.start_epoch && now <= self.end_epoch
    }

    /// Returns `true` when `now` lies within the 60 s acceptance window
    /// that begins at the restart instant.
    pub fn need_restart(&self, now: i64) -> bool {
        if self.restart_epoch == 0 {
            return false;
        }
        now >= self.restart_epoch && now <= self.restart_epoch + RESTART_ACCEPT_SECS
    }

    /// Whether a daily restart instant is configured.
    pub fn is_restart_supported(&self) -> bool {
        self.restart_epoch > 0
    }

    /// Logs a debug description of the anchored schedule.
    pub fn describe(&self, log: &DayLog) {
        if self.start_epoch == 0 || self.end_epoch == 0 {
            log.debug("unit runs in uninterrupted mode");
        } else if self.start_epoch == self.end_epoch {
            log.debug(format!(
                "window opens and closes at {}",
                format_epoch(self.start_epoch)
            ));
        } else {
            log.debug(format!(
                "scheduled start: {} end: {}",
                format_epoch(self.start_epoch),
                format_epoch(self.end_epoch)
            ));
        }
        if self.restart_epoch > 0 {
            log.debug(format!(
                "scheduled restart at: {}",
                format_epoch(self.restart_epoch)
            ));
        }
    }

    #[cfg(test)]
    pub(crate) fn epochs(&self) -> (i64, i64, i64) {
        (self.start_epoch, self.end_epoch, self.restart_epoch)
    }
}

/// Parses one schedule string; empty and `00:00:00` become `None`.
fn parse_schedule_time(
    unit: &str,
    field: &'static str,
    value: &str,
) -> Result<Option<NaiveTime>, ConfigError> {
    if value.is_empty() || value == EMPTY_TIME {
        return Ok(None);
    }
    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .map(Some)
        .map_err(|_| ConfigError::BadTime {
            unit: unit.to_string(),
            field,
            value: value.to_string(),
        })
}

/// Combines a local date with a wall-clock time into an epoch second.
///
/// `None` anchors to 0, the "unconstrained" sentinel. A time falling into
/// a DST gap reads ambiguously; the earlier interpretation wins, and a
/// nonexistent local time falls back to the UTC reading.
fn anchor(date: NaiveDate, time: Option<NaiveTime>) -> i64 {
    let Some(time) = time else { return 0 };
    let naive = date.and_time(time);
    match Local.from_local_datetime(&naive) {
        chrono::LocalResult::Single(dt) => dt.timestamp(),
        chrono::LocalResult::Ambiguous(earliest, _) => earliest.timestamp(),
        chrono::LocalResult::None => naive.and_utc().timestamp(),
    }
}

/// Formats an epoch second as local `Sat Feb 22 07:54:00 2025`.
fn format_epoch(epoch: i64) -> String {
    match DateTime::from_timestamp(epoch, 0) {
        Some(dt) => dt
            .with_timezone(&Local)
            .format("%a %b %d %H:%M:%S %Y")
            .to_string(),
        None => epoch.to_string(),
    }
}

/// Current local date as `YYYY-MM-DD`.
pub fn today_string() -> String {
    Local::now().format("%Y-%m-%d").to_string()
}

/// Whether `value` is a real calendar date in strict `YYYY-MM-DD` form.
pub fn is_valid_date(value: &str) -> bool {
    value.len() == 10 && NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn blank_and_zero_times_are_unset() {
        let r = TimeRange::new("a.service", "", "", "").unwrap();
        assert_eq!(r.epochs(), (0, 0, 0));
        assert!(!r.is_restart_supported());

        let r = TimeRange::new("a.service", "00:00:00", "00:00:00", "00:00:00").unwrap();
        assert_eq!(r.epochs(), (0, 0, 0));
    }

    #[test]
    fn half_set_window_is_fully_unset() {
        let r = TimeRange::new("a.service", "09:00:00", "", "").unwrap();
        let (start, end, _) = r.epochs();
        assert_eq!((start, end), (0, 0));
        assert!(r.is_between(0));
        assert!(r.is_between(i64::MAX));
    }

    #[test]
    fn garbage_time_is_rejected() {
        let err = TimeRange::new("a.service", "9 o'clock", "17:00:00", "").unwrap_err();
        assert_eq!(err.as_label(), "config_bad_time");
    }

    #[test]
    fn inverted_window_is_rejected() {
        let err = TimeRange::new("a.service", "17:00:00", "09:00:00", "").unwrap_err();
        assert_eq!(err.as_label(), "config_inverted_window");
    }

    #[test]
    fn window_membership_is_inclusive_and_monotone() {
        let mut r = TimeRange::new("a.service", "09:00:00", "17:00:00", "").unwrap();
        r.prepare_for(day(2025, 6, 10));
        let (start, end, _) = r.epochs();

        assert_eq!(end - start, 8 * 3600);
        assert!(!r.is_between(start - 1));
        assert!(r.is_between(start));
        assert!(r.is_between(start + 3600));
        assert!(r.is_between(end));
        assert!(!r.is_between(end + 1));
    }

    #[test]
    fn restart_window_is_sixty_seconds() {
        let mut r = TimeRange::new("a.service", "", "", "12:00:00").unwrap();
        r.prepare_for(day(2025, 6, 10));
        let (_, _, restart) = r.epochs();

        assert!(r.is_restart_supported());
        assert!(!r.need_restart(restart - 1));
        assert!(r.need_restart(restart));
        assert!(r.need_restart(restart + 60));
        assert!(!r.need_restart(restart + 61));
    }

    #[test]
    fn prepare_reanchors_to_the_new_day() {
        let mut r = TimeRange::new("a.service", "09:00:00", "17:00:00", "12:00:00").unwrap();
        r.prepare_for(day(2025, 6, 10));
        let (start_a, _, restart_a) = r.epochs();
        r.prepare_for(day(2025, 6, 11));
        let (start_b, _, restart_b) = r.epochs();

        assert_eq!(start_b - start_a, 86_400);
        assert_eq!(restart_b - restart_a, 86_400);
    }

    #[test]
    fn date_validation_handles_leap_years() {
        assert!(is_valid_date("2024-02-29"));
        assert!(is_valid_date("2000-02-29"));
        assert!(!is_valid_date("2025-02-29"));
        assert!(!is_valid_date("1900-02-29"));
        assert!(is_valid_date("2025-12-31"));
        assert!(!is_valid_date("2025-13-01"));
        assert!(!is_valid_date("2025-00-10"));
        assert!(!is_valid_date("2025-1-10"));
        assert!(!is_valid_date("yesterday!!"));
        assert!(!is_valid_date(""));
    }
}
