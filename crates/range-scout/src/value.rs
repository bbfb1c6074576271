//! Raw widget values and their conversion to canonical instants.
//!
//! A picker exposes its dates in whatever shape its current build happens to
//! use: epoch seconds as numbers or digit strings, typed date objects, or
//! `MM/DD/YYYY` text. [`parse`] accepts all of these and reduces them to an
//! [`Instant`], or to `None` when the value carries no usable point in time.
//!
//! Nothing here returns an error. Absence is the only failure signal, so a
//! malformed value on the page can never abort an extraction cycle.
//!
//! # Functions
//!
//! - [`parse`] — Polymorphic conversion of a [`RawValue`]
//! - [`parse_epoch_seconds`] — Epoch-seconds text only
//! - [`parse_month_day_year`] — `MM/DD/YYYY` text only, at local midnight

use std::fmt;

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Deserialize;

use crate::error::ScoutError;

/// Largest magnitude a browser time value may hold (±100,000,000 days).
pub const MAX_TIME_VALUE_MS: f64 = 8.64e15;

// ── Instant ─────────────────────────────────────────────────────────────────

/// An absolute point in time, stored as milliseconds since the Unix epoch.
///
/// Always within ±[`MAX_TIME_VALUE_MS`]; construction outside that range
/// yields `None` instead of an instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Instant(i64);

impl Instant {
    /// Build an instant from a millisecond count, rejecting out-of-range values.
    pub fn from_millis(ms: i64) -> Option<Self> {
        if (ms as f64).abs() > MAX_TIME_VALUE_MS {
            return None;
        }
        DateTime::<Utc>::from_timestamp_millis(ms).map(|_| Self(ms))
    }

    /// Build an instant from a chrono datetime (sub-millisecond precision is dropped).
    pub fn from_datetime<T: TimeZone>(dt: &DateTime<T>) -> Option<Self> {
        Self::from_millis(dt.timestamp_millis())
    }

    pub fn millis(self) -> i64 {
        self.0
    }

    pub fn to_utc(self) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp_millis(self.0).unwrap_or_default()
    }
}

impl fmt::Display for Instant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_utc().to_rfc3339())
    }
}

// ── RawValue ────────────────────────────────────────────────────────────────

/// A value read from a picker property, before any interpretation.
///
/// Deserializes untagged so page fixtures can write `null`, `1718000000`,
/// `"06/10/2024"`, `{"epoch_ms": 1718000000000}` or `[a, b]` directly.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    /// A typed date object. `None` (or NaN) is an invalid date.
    Date {
        epoch_ms: Option<f64>,
    },
    List(Vec<RawValue>),
}

impl RawValue {
    pub fn is_null(&self) -> bool {
        matches!(self, RawValue::Null)
    }

    pub fn date<T: TimeZone>(dt: &DateTime<T>) -> Self {
        RawValue::Date {
            epoch_ms: Some(dt.timestamp_millis() as f64),
        }
    }

    pub fn invalid_date() -> Self {
        RawValue::Date { epoch_ms: None }
    }
}

impl From<&str> for RawValue {
    fn from(s: &str) -> Self {
        RawValue::Text(s.to_string())
    }
}

impl From<f64> for RawValue {
    fn from(n: f64) -> Self {
        RawValue::Number(n)
    }
}

// ── LocalZone ───────────────────────────────────────────────────────────────

/// The zone whose midnight anchors `MM/DD/YYYY` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LocalZone {
    /// The host system's local zone.
    #[default]
    System,
    /// A fixed IANA zone, independent of the host.
    Named(Tz),
}

impl LocalZone {
    /// Resolve an optional IANA name; `None` selects the system zone.
    pub fn from_name(name: Option<&str>) -> Result<Self, ScoutError> {
        match name {
            None => Ok(LocalZone::System),
            Some(s) => s
                .parse::<Tz>()
                .map(LocalZone::Named)
                .map_err(|_| ScoutError::InvalidTimezone(format!("'{}'", s))),
        }
    }

    /// The instant of local midnight starting `date`.
    pub fn midnight(&self, date: NaiveDate) -> Option<Instant> {
        let naive = date.and_hms_opt(0, 0, 0)?;
        let utc = match self {
            LocalZone::System => resolve_local(&Local, naive),
            LocalZone::Named(tz) => resolve_local(tz, naive),
        }?;
        Instant::from_datetime(&utc)
    }
}

/// Map a wall-clock time to UTC, taking the earlier reading on a fold and
/// the first valid reading after a gap.
fn resolve_local<T: TimeZone>(tz: &T, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
    (0..=8)
        .map(|step| naive + chrono::Duration::minutes(15 * step))
        .find_map(|candidate| tz.from_local_datetime(&candidate).earliest())
        .map(|dt| dt.with_timezone(&Utc))
}

// ── parse ───────────────────────────────────────────────────────────────────

/// Convert a raw value to an instant.
///
/// - Numbers, and text that reads as a finite number, are epoch **seconds**.
/// - Date objects are used as-is when valid.
/// - `MM/DD/YYYY` text is local midnight in `zone`.
/// - Everything else is `None`.
///
/// # Examples
///
/// ```
/// use range_scout::value::{parse, LocalZone, RawValue};
///
/// let instant = parse(&RawValue::Number(1_718_000_000.0), &LocalZone::System).unwrap();
/// assert_eq!(instant.millis(), 1_718_000_000_000);
/// assert!(parse(&RawValue::from("2024-06-10"), &LocalZone::System).is_none());
/// ```
pub fn parse(raw: &RawValue, zone: &LocalZone) -> Option<Instant> {
    match raw {
        RawValue::Number(n) => from_epoch_seconds(*n),
        RawValue::Date { epoch_ms } => epoch_ms.and_then(from_time_value),
        RawValue::Text(s) => parse_epoch_seconds(s).or_else(|| parse_month_day_year(s, zone)),
        RawValue::Null | RawValue::Bool(_) | RawValue::List(_) => None,
    }
}

/// Read epoch-seconds text (`"1718000000"`, `" 1718000000.5 "`).
///
/// Blank text is absent rather than the epoch.
pub fn parse_epoch_seconds(text: &str) -> Option<Instant> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().and_then(from_epoch_seconds)
}

/// Read `M/D/YYYY` or `MM/DD/YYYY` text as local midnight of that day.
///
/// Impossible dates (`02/30/2024`) are absent.
pub fn parse_month_day_year(text: &str, zone: &LocalZone) -> Option<Instant> {
    let mut parts = text.split('/');
    let month = digits(parts.next()?, 1..=2)?;
    let day = digits(parts.next()?, 1..=2)?;
    let year = digits(parts.next()?, 4..=4)?;
    if parts.next().is_some() {
        return None;
    }
    let date = NaiveDate::from_ymd_opt(year as i32, month, day)?;
    zone.midnight(date)
}

fn digits(s: &str, len: std::ops::RangeInclusive<usize>) -> Option<u32> {
    if !len.contains(&s.len()) || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

fn from_epoch_seconds(seconds: f64) -> Option<Instant> {
    from_time_value(seconds * 1000.0)
}

fn from_time_value(ms: f64) -> Option<Instant> {
    if !ms.is_finite() || ms.abs() > MAX_TIME_VALUE_MS {
        return None;
    }
    Instant::from_millis(ms.trunc() as i64)
}
