//! Valid-time timestamps.
//!
//! Timestamps are stored as fixed-width text, `YYYY-MM-DD HH:MM:SS.ffffff`, so
//! that lexicographic order (what a relational backend compares) and
//! chronological order agree.

// used for timestamps in the database
use chrono::{Duration, NaiveDate, NaiveDateTime, Timelike, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Serialize, Serializer};

use std::fmt;
use std::str::FromStr;

use crate::datatype::Value;
use crate::error::{Result, TemporaError};

pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";
/// The largest value the format can hold; marks a version as still current.
pub const END_OF_TIME: &str = "9999-12-31 23:59:59.999999";

lazy_static! {
    static ref TIME_LITERAL: Regex = Regex::new(
        r"^(\d{4})-(\d{2})-(\d{2})(?:[ T](\d{2}):(\d{2}):(\d{2})(?:\.(\d{1,6}))?)?$"
    )
    .unwrap();
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(NaiveDateTime);

impl Timestamp {
    /// Samples the clock once, so the second and its microsecond fraction
    /// always come from the same instant.
    pub fn now() -> Self {
        let sampled = Utc::now().naive_utc();
        let micros = sampled.nanosecond() / 1_000;
        Self(sampled.with_nanosecond(micros * 1_000).unwrap_or(sampled))
    }
    pub fn end_of_time() -> Self {
        let date = NaiveDate::from_ymd_opt(9999, 12, 31).unwrap_or(NaiveDate::MAX);
        Self(date.and_hms_micro_opt(23, 59, 59, 999_999).unwrap_or(NaiveDateTime::MAX))
    }
    pub fn is_end_of_time(&self) -> bool {
        *self == Self::end_of_time()
    }
    /// Accepts a date, a date with time, or a date with time and up to six
    /// fractional digits. Anything else is an [`TemporaError::InvalidTime`].
    pub fn parse(text: &str) -> Result<Self> {
        let captures = TIME_LITERAL
            .captures(text.trim())
            .ok_or_else(|| TemporaError::invalid_time(text, "expected YYYY-MM-DD[ HH:MM:SS[.ffffff]]"))?;
        let part = |i: usize| -> u32 {
            captures.get(i).and_then(|m| m.as_str().parse().ok()).unwrap_or(0)
        };
        let micros = match captures.get(7) {
            Some(m) => format!("{:0<6}", m.as_str()).parse::<u32>().unwrap_or(0),
            None => 0,
        };
        let date = NaiveDate::from_ymd_opt(part(1) as i32, part(2), part(3))
            .ok_or_else(|| TemporaError::invalid_time(text, "no such date"))?;
        let moment = date
            .and_hms_micro_opt(part(4), part(5), part(6), micros)
            .ok_or_else(|| TemporaError::invalid_time(text, "no such time of day"))?;
        Ok(Self(moment))
    }
    pub fn naive(&self) -> NaiveDateTime {
        self.0
    }
    /// The next representable instant, one microsecond on; saturates at the end of time.
    pub fn successor(&self) -> Self {
        let next = self.0.checked_add_signed(Duration::microseconds(1)).map(Self);
        match next {
            Some(next) if next < Self::end_of_time() => next,
            _ => Self::end_of_time(),
        }
    }
}

/// Anything a caller may pass where a valid time is expected.
pub trait IntoTimestamp {
    fn into_timestamp(self) -> Result<Timestamp>;
}
impl IntoTimestamp for Timestamp {
    fn into_timestamp(self) -> Result<Timestamp> {
        Ok(self)
    }
}
impl IntoTimestamp for &str {
    fn into_timestamp(self) -> Result<Timestamp> {
        Timestamp::parse(self)
    }
}
impl IntoTimestamp for &String {
    fn into_timestamp(self) -> Result<Timestamp> {
        Timestamp::parse(self)
    }
}
impl IntoTimestamp for NaiveDateTime {
    fn into_timestamp(self) -> Result<Timestamp> {
        Ok(Timestamp::from(self))
    }
}

impl From<NaiveDateTime> for Timestamp {
    fn from(moment: NaiveDateTime) -> Self {
        let micros = moment.nanosecond() / 1_000;
        Self(moment.with_nanosecond(micros * 1_000).unwrap_or(moment))
    }
}
impl FromStr for Timestamp {
    type Err = TemporaError;
    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
impl TryFrom<&Value> for Timestamp {
    type Error = TemporaError;
    fn try_from(value: &Value) -> Result<Self> {
        match value {
            Value::Text(s) => Self::parse(s),
            other => Err(TemporaError::invalid_time(other.to_string(), "not a textual timestamp")),
        }
    }
}
impl From<Timestamp> for Value {
    fn from(t: Timestamp) -> Self {
        Value::Text(t.to_string())
    }
}
impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0.format(TIME_FORMAT))
    }
}
impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}
impl ToSql for Timestamp {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.to_string()))
    }
}
impl FromSql for Timestamp {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        Timestamp::parse(text).map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}
