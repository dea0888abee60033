//! Clock and retention-window arithmetic.

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};

/// Supplies "now" for a run. Read once per run, never per resource.
pub trait Clock: Send + Sync {
    /// Current instant in UTC.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock frozen at one instant (tests, replayed plans).
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// A retention threshold in whole days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Retention {
    days: u32,
}

impl Retention {
    /// Build from an optional policy field; `None` disables the check.
    pub fn from_days(days: Option<u32>) -> Option<Self> {
        days.map(|days| Self { days })
    }

    /// Threshold in days.
    pub fn days(self) -> u32 {
        self.days
    }

    /// Oldest instant still inside the retention window.
    pub fn cutoff(self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::days(i64::from(self.days))
    }

    /// Returns `true` if `at` falls inside `[now - days, now]`, i.e. the
    /// resource is too young or too recently active to remove.
    pub fn protects(self, at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        at > self.cutoff(now)
    }
}

/// Interpret a timestamp without zone information as UTC.
pub fn assume_utc(naive: NaiveDateTime) -> DateTime<Utc> {
    Utc.from_utc_datetime(&naive)
}

/// Convert epoch milliseconds (log service timestamps) to UTC.
pub fn from_epoch_millis(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}

/// Parse the function service's `LastModified` format
/// (`2024-01-31T12:00:00.000+0000`), falling back to RFC 3339 and then to a
/// zone-less timestamp taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(assume_utc)
}
