//! Canonical timestamp rendering.
//!
//! Every endpoint leaves the pipeline as a fixed-width string,
//! `YYYY-MM-DDThh:mm:ss.000`, optionally followed by a literal `Z`. The
//! [`FormatMode`] decides which calendar interpretation the string encodes.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::ScoutError;
use crate::value::Instant;

/// How an instant is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FormatMode {
    /// The instant's UTC clock time, milliseconds fixed to `000`.
    #[default]
    UtcClock,
    /// The instant's UTC calendar date at `00:00:00.000`.
    UtcMidnight,
    /// The calendar date in the named zone at `00:00:00.000`. Encodes a
    /// wall-clock midnight, so it never carries a zone suffix.
    CivilMidnight(Tz),
}

impl FromStr for FormatMode {
    type Err = ScoutError;

    /// Accepts `utc-clock`, `utc-midnight` and `civil-midnight:<IANA zone>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "utc-clock" => Ok(FormatMode::UtcClock),
            "utc-midnight" => Ok(FormatMode::UtcMidnight),
            other => {
                let zone = other
                    .strip_prefix("civil-midnight:")
                    .ok_or_else(|| ScoutError::InvalidFormatMode(format!("'{}'", s)))?;
                zone.parse::<Tz>()
                    .map(FormatMode::CivilMidnight)
                    .map_err(|_| ScoutError::InvalidTimezone(format!("'{}'", zone)))
            }
        }
    }
}

impl TryFrom<String> for FormatMode {
    type Error = ScoutError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<FormatMode> for String {
    fn from(mode: FormatMode) -> Self {
        mode.to_string()
    }
}

impl fmt::Display for FormatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatMode::UtcClock => f.write_str("utc-clock"),
            FormatMode::UtcMidnight => f.write_str("utc-midnight"),
            FormatMode::CivilMidnight(tz) => write!(f, "civil-midnight:{}", tz.name()),
        }
    }
}

/// Renders instants according to a [`FormatMode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Formatter {
    mode: FormatMode,
    zone_suffix: bool,
}

impl Default for Formatter {
    /// `utc-clock` with the `Z` suffix.
    fn default() -> Self {
        Self::new(FormatMode::UtcClock, true)
    }
}

impl Formatter {
    /// `zone_suffix` appends `Z` in the UTC modes; civil midnight ignores it.
    pub fn new(mode: FormatMode, zone_suffix: bool) -> Self {
        Self { mode, zone_suffix }
    }

    pub fn mode(&self) -> FormatMode {
        self.mode
    }

    /// Render an instant. Absent in, absent out.
    ///
    /// # Examples
    ///
    /// ```
    /// use range_scout::format::Formatter;
    /// use range_scout::value::Instant;
    ///
    /// let instant = Instant::from_millis(1_718_000_000_000);
    /// assert_eq!(
    ///     Formatter::default().format(instant).as_deref(),
    ///     Some("2024-06-10T06:13:20.000Z")
    /// );
    /// ```
    pub fn format(&self, instant: Option<Instant>) -> Option<String> {
        let utc = instant?.to_utc();
        let rendered = match self.mode {
            FormatMode::UtcClock => render_clock(&utc),
            FormatMode::UtcMidnight => render_midnight(utc.date_naive()),
            FormatMode::CivilMidnight(tz) => {
                return Some(render_midnight(utc.with_timezone(&tz).date_naive()));
            }
        };
        if self.zone_suffix {
            Some(format!("{rendered}Z"))
        } else {
            Some(rendered)
        }
    }
}

fn render_clock(utc: &DateTime<Utc>) -> String {
    utc.format("%Y-%m-%dT%H:%M:%S.000").to_string()
}

fn render_midnight(date: NaiveDate) -> String {
    date.format("%Y-%m-%dT00:00:00.000").to_string()
}
