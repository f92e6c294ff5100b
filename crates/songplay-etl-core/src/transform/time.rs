//! Time dimension derived from event timestamps.
//!
//! `ts` holds epoch milliseconds as a digit string. Conversion drops the last
//! three characters of the string (truncation, never rounding) and reads the
//! rest as epoch seconds. The resulting instant is stored in UTC; calendar
//! fields are read in the run's [`SessionTimeZone`].

use std::{fmt, str::FromStr};

use chrono::{DateTime, Datelike, FixedOffset, Offset, Timelike, Utc};
use snafu::prelude::*;

use crate::transform::{
    activity::PlayEvents,
    dedup::{DedupKey, dedup},
};

/// A `session_time_zone` value could not be parsed.
#[derive(Debug, Snafu)]
#[snafu(display("invalid session time zone '{value}' (expected UTC or an offset like -03:00)"))]
pub struct TimeZoneError {
    value: String,
}

/// Fixed UTC offset in which calendar fields and partitions are computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTimeZone(FixedOffset);

impl SessionTimeZone {
    /// Coordinated Universal Time.
    pub fn utc() -> Self {
        SessionTimeZone(Utc.fix())
    }

    /// The underlying offset.
    pub fn offset(&self) -> FixedOffset {
        self.0
    }

    /// View an instant in this zone.
    pub fn local(&self, instant: DateTime<Utc>) -> DateTime<FixedOffset> {
        instant.with_timezone(&self.0)
    }
}

impl Default for SessionTimeZone {
    fn default() -> Self {
        SessionTimeZone::utc()
    }
}

impl From<FixedOffset> for SessionTimeZone {
    fn from(offset: FixedOffset) -> Self {
        SessionTimeZone(offset)
    }
}

impl FromStr for SessionTimeZone {
    type Err = TimeZoneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("utc") || trimmed.eq_ignore_ascii_case("z") {
            return Ok(SessionTimeZone::utc());
        }

        let fail = || TimeZoneSnafu {
            value: trimmed.to_string(),
        };

        let (sign, rest) = match trimmed.as_bytes().first() {
            Some(b'+') => (1, &trimmed[1..]),
            Some(b'-') => (-1, &trimmed[1..]),
            _ => return fail().fail(),
        };
        let (hh, mm) = rest.split_once(':').context(fail())?;
        ensure!(
            hh.len() == 2
                && mm.len() == 2
                && hh.bytes().chain(mm.bytes()).all(|b| b.is_ascii_digit()),
            fail()
        );
        let hours: i32 = hh.parse().ok().context(fail())?;
        let minutes: i32 = mm.parse().ok().context(fail())?;
        ensure!(hours <= 18 && minutes < 60, fail());

        FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
            .map(SessionTimeZone)
            .context(fail())
    }
}

impl fmt::Display for SessionTimeZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.0.local_minus_utc();
        if secs == 0 {
            return f.write_str("UTC");
        }
        let sign = if secs < 0 { '-' } else { '+' };
        let abs = secs.unsigned_abs();
        write!(f, "{sign}{:02}:{:02}", abs / 3600, (abs % 3600) / 60)
    }
}

/// Epoch seconds encoded by a millisecond `ts` string.
///
/// Drops the last three characters and parses the remainder (trimmed) as an
/// integer. Anything that does not parse yields `None`.
pub fn epoch_seconds_from_ts(ts: &str) -> Option<i64> {
    let cut = ts.char_indices().rev().nth(2).map(|(idx, _)| idx)?;
    ts[..cut].trim().parse().ok()
}

/// `start_time` of an event: the instant its `ts` encodes, to the second.
pub fn start_time_from_ts(ts: Option<&str>) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(epoch_seconds_from_ts(ts?)?, 0)
}

/// One row of `time_table`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeRow {
    /// The instant, stored in UTC.
    pub start_time: DateTime<Utc>,
    /// Hour of day, 0-23.
    pub hour: i32,
    /// Day of month, 1-31.
    pub day: i32,
    /// ISO-8601 week of year.
    pub week: i32,
    /// Month, 1-12.
    pub month: i32,
    /// Calendar year.
    pub year: i32,
    /// Full English weekday name.
    pub weekday: String,
}

impl TimeRow {
    /// Decompose `start_time` as seen in `tz`.
    pub fn from_start_time(start_time: DateTime<Utc>, tz: SessionTimeZone) -> Self {
        let local = tz.local(start_time);
        TimeRow {
            start_time,
            hour: local.hour() as i32,
            day: local.day() as i32,
            week: local.iso_week().week() as i32,
            month: local.month() as i32,
            year: local.year(),
            weekday: local.format("%A").to_string(),
        }
    }
}

impl DedupKey for TimeRow {
    // Every other field is a function of `start_time`.
    type Key = DateTime<Utc>;

    fn dedup_key(&self) -> Self::Key {
        self.start_time
    }
}

/// One row per distinct `start_time` among the playback events.
///
/// Events whose `ts` does not convert contribute no row.
pub fn extract_time(events: &PlayEvents, tz: SessionTimeZone) -> Vec<TimeRow> {
    let rows = events
        .as_slice()
        .iter()
        .filter_map(|e| start_time_from_ts(e.ts.as_deref()))
        .map(|start| TimeRow::from_start_time(start, tz))
        .collect();
    dedup(rows)
}
