use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{ModelError, Resolution};

const MS_PER_MINUTE: i64 = 60_000;

/// A stored chart annotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mark {
    pub id: i64,
    pub symbol: String,
    pub timestamp: i64,
    pub date: String,
    pub created_at: DateTime<Utc>,
}

/// A validated create-mark request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMark {
    pub symbol: String,
    pub timestamp: i64,
    pub date: String,
}

/// Create-mark body as it arrives off the wire.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MarkDraft {
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub timestamp: Option<Value>,
    #[serde(default)]
    pub date: Option<String>,
}

impl MarkDraft {
    pub fn validate(self) -> Result<NewMark, ModelError> {
        let symbol = self.symbol.filter(|s| !s.trim().is_empty());
        let timestamp = self.timestamp.filter(|v| !is_blank(v));
        let date = self.date.filter(|d| !d.trim().is_empty());

        let (Some(symbol), Some(timestamp), Some(date)) = (symbol, timestamp, date) else {
            return Err(ModelError::MissingFields);
        };

        Ok(NewMark {
            symbol,
            timestamp: parse_timestamp_value(&timestamp)?,
            date,
        })
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// Accepts integer or finite float milliseconds, or a numeric string.
/// Fractional milliseconds are truncated toward zero.
pub fn parse_timestamp_value(value: &Value) -> Result<i64, ModelError> {
    match value {
        Value::Number(n) => {
            if let Some(ms) = n.as_i64() {
                return Ok(ms);
            }
            n.as_f64()
                .filter(|f| f.is_finite() && *f >= i64::MIN as f64 && *f <= i64::MAX as f64)
                .map(|f| f.trunc() as i64)
                .ok_or(ModelError::InvalidTimestamp)
        }
        Value::String(s) => parse_timestamp_str(s),
        _ => Err(ModelError::InvalidTimestamp),
    }
}

pub fn parse_timestamp_str(raw: &str) -> Result<i64, ModelError> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| ModelError::InvalidTimestamp)
}

/// Parses the date a user typed into the mark picker.
///
/// Accepts `YYYY-MM-DD`, a `datetime-local` value (`YYYY-MM-DDTHH:MM`) or
/// RFC 3339; only the calendar date is kept.
pub fn parse_mark_date(raw: &str) -> Result<NaiveDate, ModelError> {
    let trimmed = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Ok(date);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M") {
        return Ok(dt.date());
    }
    DateTime::parse_from_rfc3339(trimmed)
        .map(|dt| dt.with_timezone(&Utc).date_naive())
        .map_err(|_| ModelError::InvalidDate(raw.to_string()))
}

/// Chooses the bar a new mark lands on.
///
/// Daily and coarser resolutions pin the mark to 00:00 UTC of `date`.
/// Sub-daily resolutions take the current UTC time of day from `now` and
/// floor it to a multiple of the bar width.
pub fn align_mark_timestamp(date: NaiveDate, resolution: Resolution, now: DateTime<Utc>) -> i64 {
    let midnight = date.and_time(NaiveTime::default()).and_utc().timestamp_millis();
    match resolution.intraday_minutes() {
        Some(width) => {
            let width = i64::from(width.max(1));
            let minute_of_day = i64::from(now.hour()) * 60 + i64::from(now.minute());
            midnight + (minute_of_day / width) * width * MS_PER_MINUTE
        }
        None => midnight,
    }
}
