//! Purpose: Textual date/time forms owned by the codec.
//! Exports: `format_date`, `format_timestamp`, `parse_date`, `parse_timestamp`, `detect`.
//! Role: Keeps temporal restoration an explicit decode step instead of a
//! JSON-library side effect.
//! Invariants: Detection is shape-checked before parsing; non-matching
//! strings are never touched.

use time::format_description::well_known::Rfc3339;
use time::{Date, OffsetDateTime};

use crate::core::error::{Error, ErrorKind};
use crate::core::value::Value;

const DATE_FORMAT: &str = "[year]-[month]-[day]";

pub(crate) fn format_date(date: &Date) -> Result<String, Error> {
    let format = time::format_description::parse(DATE_FORMAT).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("invalid date format description")
            .with_source(err)
    })?;
    date.format(&format).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("failed to format date")
            .with_source(err)
    })
}

pub(crate) fn format_timestamp(timestamp: &OffsetDateTime) -> Result<String, Error> {
    timestamp.format(&Rfc3339).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("failed to format timestamp")
            .with_source(err)
    })
}

pub(crate) fn parse_date(text: &str) -> Result<Date, Error> {
    let format = time::format_description::parse(DATE_FORMAT).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("invalid date format description")
            .with_source(err)
    })?;
    Date::parse(text, &format).map_err(|err| {
        Error::new(ErrorKind::Corrupt)
            .with_message(format!("invalid date string {text:?}"))
            .with_source(err)
    })
}

pub(crate) fn parse_timestamp(text: &str) -> Result<OffsetDateTime, Error> {
    OffsetDateTime::parse(text, &Rfc3339).map_err(|err| {
        Error::new(ErrorKind::Corrupt)
            .with_message(format!("invalid timestamp string {text:?}"))
            .with_source(err)
    })
}

/// Restores a string to a temporal value when it has one of the two wire
/// shapes. Returns `None` for everything else, leaving the text alone.
pub(crate) fn detect(text: &str) -> Option<Value> {
    if has_date_shape(text.as_bytes()) {
        let format = time::format_description::parse(DATE_FORMAT).ok()?;
        return Date::parse(text, &format).ok().map(Value::Date);
    }
    if has_timestamp_shape(text.as_bytes()) {
        return OffsetDateTime::parse(text, &Rfc3339).ok().map(Value::Timestamp);
    }
    None
}

fn has_date_shape(bytes: &[u8]) -> bool {
    if bytes.len() != 10 {
        return false;
    }
    bytes[4] == b'-'
        && bytes[7] == b'-'
        && [0usize, 1, 2, 3, 5, 6, 8, 9]
            .iter()
            .all(|&index| bytes[index].is_ascii_digit())
}

fn has_timestamp_shape(bytes: &[u8]) -> bool {
    // Minimum RFC 3339 form is "YYYY-MM-DDThh:mm:ssZ" (20 bytes); the
    // full grammar is left to the parser once the shape matches.
    bytes.len() >= 20
        && has_date_shape(&bytes[..10])
        && (bytes[10] == b'T' || bytes[10] == b't')
        && bytes[13] == b':'
        && bytes[16] == b':'
}
