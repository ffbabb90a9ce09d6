//! Logical-day resolution.
//!
//! A logical day starts at the user's configured [`DayStartTime`] rather than
//! at midnight. All boundaries are computed in a fixed reference timezone of
//! UTC+9 so every device derives the same day for the same instant. The offset
//! is a constant: there is no DST handling and no timezone database.

use std::fmt;
use std::str::FromStr;

use chrono::{
    DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Timelike, Utc,
};
use serde::{Deserialize, Serialize};

use crate::clock::Clock;

/// Offset of the reference timezone from UTC, in hours.
pub const REFERENCE_OFFSET_HOURS: i32 = 9;

/// The fixed reference timezone used for all day-boundary computation.
pub fn reference_offset() -> FixedOffset {
    FixedOffset::east_opt(REFERENCE_OFFSET_HOURS * 60 * 60)
        .expect("reference offset is within a day of UTC")
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum DayStartError {
    #[error("Invalid day start time {value:?}: expected HH:MM")]
    Format { value: String },
    #[error("Day start time {value:?} out of range: hour must be 0-23 and minute 0-59")]
    OutOfRange { value: String },
}

/// Time of day at which a logical day begins, stored as "HH:MM".
///
/// Ordering is lexicographic on (hour, minute).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DayStartTime {
    hour: u8,
    minute: u8,
}

impl DayStartTime {
    pub const DEFAULT: DayStartTime = DayStartTime { hour: 5, minute: 0 };

    pub fn new(hour: u8, minute: u8) -> Result<Self, DayStartError> {
        if hour > 23 || minute > 59 {
            return Err(DayStartError::OutOfRange {
                value: format!("{hour:02}:{minute:02}"),
            });
        }
        Ok(Self { hour, minute })
    }

    pub fn hour(&self) -> u8 {
        self.hour
    }

    pub fn minute(&self) -> u8 {
        self.minute
    }
}

impl Default for DayStartTime {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for DayStartTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl FromStr for DayStartTime {
    type Err = DayStartError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let format_err = || DayStartError::Format {
            value: s.to_string(),
        };

        let (h, m) = s.split_once(':').ok_or_else(format_err)?;
        let two_digits = |part: &str| part.len() == 2 && part.bytes().all(|b| b.is_ascii_digit());
        if !two_digits(h) || !two_digits(m) {
            return Err(format_err());
        }

        let hour: u8 = h.parse().map_err(|_| format_err())?;
        let minute: u8 = m.parse().map_err(|_| format_err())?;
        Self::new(hour, minute).map_err(|_| DayStartError::OutOfRange {
            value: s.to_string(),
        })
    }
}

impl TryFrom<String> for DayStartTime {
    type Error = DayStartError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DayStartTime> for String {
    fn from(value: DayStartTime) -> Self {
        value.to_string()
    }
}

/// The date bucket an instant belongs to. Renders as "YYYY-MM-DD", which
/// sorts lexicographically in chronological order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LogicalDay(NaiveDate);

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("Invalid logical day {value:?}: expected YYYY-MM-DD")]
pub struct LogicalDayError {
    value: String,
}

impl LogicalDay {
    /// Earliest representable day. Only four-digit years render as
    /// "YYYY-MM-DD", so the range is 0000-01-01 through 9999-12-31.
    pub fn min() -> Self {
        Self(NaiveDate::from_ymd_opt(0, 1, 1).expect("0000-01-01 is a valid date"))
    }

    /// Latest representable day.
    pub fn max() -> Self {
        Self(NaiveDate::from_ymd_opt(9999, 12, 31).expect("9999-12-31 is a valid date"))
    }

    /// Clamp `date` into the representable range.
    fn saturating(date: NaiveDate) -> Self {
        Self(date).clamp(Self::min(), Self::max())
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }

    /// The following day, or `None` past 9999-12-31.
    pub fn succ_opt(&self) -> Option<Self> {
        self.0
            .succ_opt()
            .map(Self)
            .filter(|next| *next <= Self::max())
    }
}

impl TryFrom<NaiveDate> for LogicalDay {
    type Error = LogicalDayError;

    fn try_from(date: NaiveDate) -> Result<Self, Self::Error> {
        if (0..=9999).contains(&date.year()) {
            Ok(Self(date))
        } else {
            Err(LogicalDayError {
                value: date.to_string(),
            })
        }
    }
}

impl fmt::Display for LogicalDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02}",
            self.0.year(),
            self.0.month(),
            self.0.day()
        )
    }
}

impl FromStr for LogicalDay {
    type Err = LogicalDayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || LogicalDayError {
            value: s.to_string(),
        };
        // Only the canonical zero-padded form is accepted so that keys stay unique.
        let canonical = s.len() == 10
            && s.bytes().enumerate().all(|(i, b)| match i {
                4 | 7 => b == b'-',
                _ => b.is_ascii_digit(),
            });
        if !canonical {
            return Err(err());
        }
        let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| err())?;
        Self::try_from(date)
    }
}

impl TryFrom<String> for LogicalDay {
    type Error = LogicalDayError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<LogicalDay> for String {
    fn from(value: LogicalDay) -> Self {
        value.to_string()
    }
}

/// Resolve which logical day `instant` belongs to.
///
/// An instant exactly at the day start belongs to the new day. Instants whose
/// logical day falls outside years 0000-9999 saturate to [`LogicalDay::min`]
/// or [`LogicalDay::max`].
pub fn resolve_logical_day(instant: DateTime<Utc>, day_start: DayStartTime) -> LogicalDay {
    let local = instant.with_timezone(&reference_offset());
    let date = local.date_naive();

    let before_start = (local.hour(), local.minute())
        < (u32::from(day_start.hour()), u32::from(day_start.minute()));
    if !before_start {
        return LogicalDay::saturating(date);
    }
    match date.pred_opt() {
        Some(previous) => LogicalDay::saturating(previous),
        // Only chrono's own minimum date has no predecessor, far below year 0.
        None => LogicalDay::min(),
    }
}

/// The logical day containing the clock's current instant.
pub fn today(clock: &dyn Clock, day_start: DayStartTime) -> LogicalDay {
    resolve_logical_day(clock.now(), day_start)
}

/// UTC instants bounding `day` as a half-open range `[start, end)`.
///
/// Every instant in the range resolves to `day`.
pub fn logical_day_bounds(
    day: LogicalDay,
    day_start: DayStartTime,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let start_of_day = NaiveTime::from_hms_opt(
        u32::from(day_start.hour()),
        u32::from(day_start.minute()),
        0,
    )
    .expect("day start hour and minute are validated on construction");
    // Years 0000-9999 shifted by the fixed offset stay well inside chrono's range.
    let local_start = day.date().and_time(start_of_day);
    let offset = Duration::hours(i64::from(REFERENCE_OFFSET_HOURS));
    let start = Utc.from_utc_datetime(&(local_start - offset));
    (start, start + Duration::days(1))
}
