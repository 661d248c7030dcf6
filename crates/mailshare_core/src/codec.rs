//! Row codec.
//!
//! A record is one line of four comma-delimited fields:
//!
//! ```text
//! <id>,<room>,<message_id>,<expired_at>
//! ```
//!
//! `expired_at` is UTC in [`EXPIRED_AT_FORMAT`]. A field is wrapped in
//! double quotes only when it contains a comma or a quote, and embedded
//! quotes are doubled. Line terminators cannot be represented.

use crate::error::{CoreError, CoreResult};
use crate::record::SharedMessageRecord;
use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};
use thiserror::Error;

/// Textual form of `expired_at`, UTC with second precision.
pub const EXPIRED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Number of fields in a row.
pub const FIELD_COUNT: usize = 4;

/// Why a single row could not be decoded.
///
/// Decode errors are local to one row; they never fail a whole scan.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The row does not have exactly [`FIELD_COUNT`] fields.
    #[error("expected {expected} fields, found {actual}")]
    FieldCount {
        /// Required number of fields.
        expected: usize,
        /// Number of fields found.
        actual: usize,
    },

    /// A quoted field is never closed.
    #[error("unterminated quoted field")]
    UnterminatedQuote,

    /// A closing quote is followed by something other than a delimiter.
    #[error("unexpected character after closing quote at byte {position}")]
    UnexpectedQuote {
        /// Byte offset of the offending character.
        position: usize,
    },

    /// The expiration field is not in [`EXPIRED_AT_FORMAT`].
    #[error("invalid expiration timestamp {value:?}")]
    Timestamp {
        /// The text that failed to parse.
        value: String,
    },
}

/// Seconds since the epoch of `0001-01-01 00:00:00`, the earliest
/// instant with a four-digit year.
const EARLIEST_EXPIRED_AT: i64 = -62_135_596_800;

/// Seconds since the epoch of `9999-12-31 23:59:59`, the latest
/// instant with a four-digit year.
const LATEST_EXPIRED_AT: i64 = 253_402_300_799;

/// Truncates `at` to whole seconds and clamps it to the range
/// [`EXPIRED_AT_FORMAT`] can represent.
#[must_use]
pub fn clamp_expired_at(at: DateTime<Utc>) -> DateTime<Utc> {
    let earliest =
        DateTime::<Utc>::from_timestamp(EARLIEST_EXPIRED_AT, 0).unwrap_or(DateTime::<Utc>::MIN_UTC);
    let latest =
        DateTime::<Utc>::from_timestamp(LATEST_EXPIRED_AT, 0).unwrap_or(DateTime::<Utc>::MAX_UTC);
    at.trunc_subsecs(0).clamp(earliest, latest)
}

/// Renders a timestamp in [`EXPIRED_AT_FORMAT`].
#[must_use]
pub fn format_expired_at(at: DateTime<Utc>) -> String {
    at.format(EXPIRED_AT_FORMAT).to_string()
}

/// Parses a timestamp in [`EXPIRED_AT_FORMAT`] as UTC.
///
/// # Errors
///
/// Returns [`DecodeError::Timestamp`] if `text` does not match the format
/// exactly. Unpadded or signed fields are rejected even where chrono
/// would accept them.
pub fn parse_expired_at(text: &str) -> Result<DateTime<Utc>, DecodeError> {
    NaiveDateTime::parse_from_str(text, EXPIRED_AT_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
        .filter(|at| format_expired_at(*at) == text)
        .ok_or_else(|| DecodeError::Timestamp {
            value: text.to_string(),
        })
}

/// Encodes a record as one row.
///
/// # Errors
///
/// Returns [`CoreError::InvalidField`] if a field contains a line terminator.
pub fn encode(record: &SharedMessageRecord) -> CoreResult<String> {
    let expired_at = record.expired_at_string();
    let fields = [
        ("id", record.id.as_str()),
        ("room", record.room.as_str()),
        ("message_id", record.message_id.as_str()),
        ("expired_at", expired_at.as_str()),
    ];

    let mut row = String::new();
    for (i, (name, value)) in fields.into_iter().enumerate() {
        if value.contains(['\n', '\r']) {
            return Err(CoreError::invalid_field(name, "contains a line terminator"));
        }
        if i > 0 {
            row.push(',');
        }
        push_field(&mut row, value);
    }
    Ok(row)
}

/// Decodes one row into a record.
///
/// # Errors
///
/// Returns a [`DecodeError`] if the row is not four well-formed fields
/// with a valid timestamp.
pub fn decode(row: &str) -> Result<SharedMessageRecord, DecodeError> {
    let fields = split_fields(row)?;
    let [id, room, message_id, expired_at]: [String; FIELD_COUNT] =
        fields.try_into().map_err(|fields: Vec<String>| DecodeError::FieldCount {
            expected: FIELD_COUNT,
            actual: fields.len(),
        })?;

    Ok(SharedMessageRecord {
        expired_at: parse_expired_at(&expired_at)?,
        id,
        room: room.into(),
        message_id: message_id.into(),
    })
}

/// Splits a row into its unquoted fields.
///
/// # Errors
///
/// Returns an error if a quoted field is malformed.
pub fn split_fields(row: &str) -> Result<Vec<String>, DecodeError> {
    let mut fields = Vec::with_capacity(FIELD_COUNT);
    let mut chars = row.char_indices().peekable();

    loop {
        let mut field = String::new();

        if matches!(chars.peek(), Some((_, '"'))) {
            chars.next();
            loop {
                match chars.next() {
                    Some((_, '"')) if matches!(chars.peek(), Some((_, '"'))) => {
                        chars.next();
                        field.push('"');
                    }
                    Some((_, '"')) => break,
                    Some((_, c)) => field.push(c),
                    None => return Err(DecodeError::UnterminatedQuote),
                }
            }
            match chars.next() {
                None => {
                    fields.push(field);
                    return Ok(fields);
                }
                Some((_, ',')) => fields.push(field),
                Some((position, _)) => return Err(DecodeError::UnexpectedQuote { position }),
            }
        } else {
            loop {
                match chars.next() {
                    Some((_, ',')) => {
                        fields.push(field);
                        break;
                    }
                    Some((_, c)) => field.push(c),
                    None => {
                        fields.push(field);
                        return Ok(fields);
                    }
                }
            }
        }
    }
}

fn push_field(row: &mut String, value: &str) {
    if value.contains([',', '"']) {
        row.push('"');
        row.push_str(&value.replace('"', "\"\""));
        row.push('"');
    } else {
        row.push_str(value);
    }
}
