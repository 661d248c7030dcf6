//! Expiration policy.
//!
//! Lookup and compaction both decide a row's fate with [`classify`], so a
//! row that `find` would return is exactly a row that `delete_expired`
//! keeps.

use crate::codec::{self, DecodeError};
use crate::record::SharedMessageRecord;
use chrono::{DateTime, Utc};

/// Returns `true` if a record expiring at `expired_at` is live at `now`.
///
/// The comparison is strict: a record expiring exactly at `now` is gone.
#[inline]
#[must_use]
pub fn is_live(expired_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    expired_at > now
}

/// The fate of one stored row at a given instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowStatus {
    /// Decoded and not yet expired.
    Live(SharedMessageRecord),
    /// Decoded but expired.
    Expired(SharedMessageRecord),
    /// Could not be decoded.
    Malformed(DecodeError),
}

impl RowStatus {
    /// Returns `true` for [`RowStatus::Live`].
    #[must_use]
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Live(_))
    }
}

/// Decodes `row` and evaluates its liveness at `now`.
#[must_use]
pub fn classify(row: &str, now: DateTime<Utc>) -> RowStatus {
    match codec::decode(row) {
        Ok(record) if is_live(record.expired_at, now) => RowStatus::Live(record),
        Ok(record) => RowStatus::Expired(record),
        Err(e) => RowStatus::Malformed(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn strictly_after_now_is_live() {
        assert!(is_live(now() + TimeDelta::seconds(1), now()));
        assert!(!is_live(now(), now()));
        assert!(!is_live(now() - TimeDelta::seconds(1), now()));
    }

    #[test]
    fn classify_live_row() {
        let status = classify("id_2,bar,m,2025-06-01 12:00:01", now());
        assert!(status.is_live());
        let RowStatus::Live(record) = status else {
            panic!("expected live row");
        };
        assert_eq!(record.id, "id_2");
    }

    #[test]
    fn classify_expired_row() {
        let status = classify("id_0,foo,m,2025-06-01 12:00:00", now());
        assert!(matches!(status, RowStatus::Expired(ref r) if r.id == "id_0"));
    }

    #[test]
    fn classify_malformed_rows() {
        assert!(matches!(
            classify("id_0,foo,m,tomorrow", now()),
            RowStatus::Malformed(DecodeError::Timestamp { .. })
        ));
        assert!(matches!(
            classify("just-one-field", now()),
            RowStatus::Malformed(DecodeError::FieldCount { actual: 1, .. })
        ));
    }
}
