//! Text parsing for Neato console responses.
//!
//! Most status commands answer with a header line followed by
//! `Name,Value` lines. `GetErr` answers with a three line block whose middle
//! line reads `<code> - <message>`.

use crate::types::{DeviceError, Record};

/// Separator between error code and message in `GetErr` output.
const ERROR_SEPARATOR: &str = " - ";

/// Parses comma separated response lines into a [`Record`].
///
/// Each line is split on commas and the first two segments become key and
/// value. Lines without a comma or with an empty key are skipped, and later
/// duplicates replace earlier ones. Empty input yields an empty record.
#[must_use]
pub fn parse_record(text: &str) -> Record {
    let mut record = Record::new();
    for line in text.split(['\r', '\n']) {
        let mut segments = line.split(',');
        let (Some(key), Some(value)) = (segments.next(), segments.next()) else {
            continue;
        };
        if key.is_empty() {
            continue;
        }
        record.insert(key, value);
    }
    record
}

/// Parses the response to `GetErr`.
///
/// Returns `None` unless the response has exactly three CRLF separated
/// segments and the middle one contains `" - "`.
#[must_use]
pub fn parse_error(text: &str) -> Option<DeviceError> {
    parse_error_line(error_line(text)?)
}

/// Extracts the error line from the response to `GetErr`.
///
/// Returns the middle segment when the response has exactly three CRLF
/// separated segments and that segment is not blank.
#[must_use]
pub fn error_line(text: &str) -> Option<&str> {
    let mut segments = text.split("\r\n");
    let (Some(_), Some(line), Some(_), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return None;
    };
    let line = line.trim();
    (!line.is_empty()).then_some(line)
}

/// Splits an error line into code and message on the first `" - "`.
#[must_use]
pub fn parse_error_line(line: &str) -> Option<DeviceError> {
    let (code, message) = line.split_once(ERROR_SEPARATOR)?;
    Some(DeviceError::new(code, message))
}
