// strftime-style time parsing for configured time fields
//
// Inputs without an offset are interpreted as UTC. Formats that only carry a
// date resolve to midnight of that day.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("cannot parse '{input}' with format '{format}': {reason}")]
pub struct TimeParseError {
    pub input: String,
    pub format: String,
    pub reason: String,
}

/// Parse `input` with the strftime `format` and return Unix epoch seconds.
pub fn parse_epoch_seconds(input: &str, format: &str) -> Result<i64, TimeParseError> {
    let input = input.trim();

    if let Ok(with_offset) = DateTime::parse_from_str(input, format) {
        return Ok(with_offset.timestamp());
    }

    match NaiveDateTime::parse_from_str(input, format) {
        Ok(naive) => Ok(naive.and_utc().timestamp()),
        Err(err) => NaiveDate::parse_from_str(input, format)
            .map(|date| date.and_time(NaiveTime::MIN).and_utc().timestamp())
            .map_err(|_| TimeParseError {
                input: input.to_string(),
                format: format.to_string(),
                reason: err.to_string(),
            }),
    }
}
