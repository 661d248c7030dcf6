//! The shared message store.

use crate::codec;
use crate::config::StoreConfig;
use crate::error::{CoreError, CoreResult};
use crate::expiry::{classify, RowStatus};
use crate::record::SharedMessageRecord;
use chrono::{DateTime, Utc};
use mailshare_storage::{FileBackend, StorageBackend};
use std::ops::ControlFlow;
use tracing::{debug, info, warn, Span};
use uuid::Uuid;

/// Outcome of a compaction pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompactionStats {
    /// Rows written back.
    pub kept: usize,
    /// Rows dropped because they had expired.
    pub expired: usize,
    /// Rows that failed to decode, whether dropped or preserved.
    pub malformed: usize,
    /// Rows removed from the backing store.
    pub removed: usize,
}

impl CompactionStats {
    /// Returns `true` if at least one row was removed.
    #[must_use]
    pub fn dropped_any(&self) -> bool {
        self.removed > 0
    }
}

/// Persistent store of shared message records.
///
/// The store keeps no state between calls beyond its configuration:
/// every operation goes back to the backing storage. Log events are
/// emitted inside the span given to [`SharedMessageStore::with_span`].
///
/// # Example
///
/// ```rust
/// use mailshare_core::{InMemoryBackend, SharedMessageRecord, SharedMessageStore, StoreConfig};
///
/// let store = SharedMessageStore::with_backend(InMemoryBackend::new(), StoreConfig::new("mem"));
/// let shared = store.add(SharedMessageRecord::new("inbox", "msg-1")).unwrap();
/// assert_eq!(store.find(&shared.id).unwrap(), shared);
/// assert!(!store.delete_expired().unwrap());
/// ```
pub struct SharedMessageStore {
    backend: Box<dyn StorageBackend>,
    config: StoreConfig,
    span: Span,
}

impl SharedMessageStore {
    /// Opens a store over the file named in `config`.
    ///
    /// The file itself is not touched until the first operation.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Config`] if the configuration is invalid.
    pub fn open(config: StoreConfig) -> CoreResult<Self> {
        config.validate()?;
        let backend = FileBackend::new(&config.path).sync_on_write(config.sync_on_write);
        Ok(Self::with_backend(backend, config))
    }

    /// Creates a store over an arbitrary backend.
    ///
    /// `config.path` is only used to label log output.
    pub fn with_backend(backend: impl StorageBackend + 'static, config: StoreConfig) -> Self {
        let span = tracing::debug_span!("mailshare", path = %config.path.display());
        Self {
            backend: Box::new(backend),
            config,
            span,
        }
    }

    /// Emits all log events of this store inside `span`.
    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Returns the store configuration.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Returns the number of rows in the backing store, live or not.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be read.
    pub fn row_count(&self) -> CoreResult<usize> {
        Ok(self.backend.line_count()?)
    }

    /// Looks up the live record with the given id.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if no live row has this id, or a
    /// storage error if the backing store cannot be read.
    pub fn find(&self, id: &str) -> CoreResult<SharedMessageRecord> {
        self.find_at(id, Utc::now())
    }

    /// Looks up the record with the given id that is live at `now`.
    ///
    /// Rows are scanned in file order and the first live match wins.
    /// Expired and malformed rows never match, even if their id does.
    ///
    /// # Errors
    ///
    /// Same as [`SharedMessageStore::find`].
    pub fn find_at(&self, id: &str, now: DateTime<Utc>) -> CoreResult<SharedMessageRecord> {
        let _entered = self.span.enter();

        let mut found = None;
        self.backend.scan(&mut |row| match classify(row, now) {
            RowStatus::Live(record) if record.id == id => {
                found = Some(record);
                ControlFlow::Break(())
            }
            RowStatus::Expired(record) if record.id == id => {
                debug!(id, expired_at = %record.expired_at, "skipping expired shared message");
                ControlFlow::Continue(())
            }
            _ => ControlFlow::Continue(()),
        })?;

        match found {
            Some(record) => {
                debug!(id, "found shared message");
                Ok(record)
            }
            None => Err(CoreError::not_found(id)),
        }
    }

    /// Stores a record under a freshly generated id.
    ///
    /// Any id already set on `record` is replaced. The expiration is not
    /// checked, so an already expired record is stored as well. The
    /// returned record is exactly what was written, with `expired_at`
    /// truncated to whole seconds and clamped to a four-digit year.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidField`] if a field contains a line
    /// terminator, or a storage error if the row cannot be appended.
    pub fn add(&self, mut record: SharedMessageRecord) -> CoreResult<SharedMessageRecord> {
        let _entered = self.span.enter();

        record.id = Uuid::new_v4().to_string();
        record.expired_at = codec::clamp_expired_at(record.expired_at);

        let row = codec::encode(&record)?;
        self.backend.append_line(&row)?;

        debug!(id = %record.id, room = %record.room, "added shared message");
        Ok(record)
    }

    /// Removes every row that is no longer live.
    ///
    /// Returns `true` if at least one row was removed.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the backing store cannot be rewritten;
    /// the previous contents are then left in place.
    pub fn delete_expired(&self) -> CoreResult<bool> {
        Ok(self.compact_at(Utc::now())?.dropped_any())
    }

    /// Rewrites the backing store to hold only rows live at `now`.
    ///
    /// Surviving rows are copied verbatim and keep their order. Rows that
    /// fail to decode are dropped unless the store was configured with
    /// `preserve_malformed_rows`.
    ///
    /// # Errors
    ///
    /// Same as [`SharedMessageStore::delete_expired`].
    pub fn compact_at(&self, now: DateTime<Utc>) -> CoreResult<CompactionStats> {
        let _entered = self.span.enter();

        let preserve_malformed = self.config.preserve_malformed_rows;
        let mut stats = CompactionStats::default();

        let removed = self.backend.retain(&mut |row| match classify(row, now) {
            RowStatus::Live(_) => {
                stats.kept += 1;
                true
            }
            RowStatus::Expired(record) => {
                debug!(id = %record.id, "removing expired shared message");
                stats.expired += 1;
                false
            }
            RowStatus::Malformed(error) => {
                warn!(%error, row, preserved = preserve_malformed, "malformed shared message row");
                stats.malformed += 1;
                if preserve_malformed {
                    stats.kept += 1;
                }
                preserve_malformed
            }
        })?;
        stats.removed = removed;

        if stats.dropped_any() {
            info!(
                removed = stats.removed,
                expired = stats.expired,
                malformed = stats.malformed,
                kept = stats.kept,
                "compacted shared messages"
            );
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryBackend;
    use chrono::{TimeDelta, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn store_with(rows: &[&str]) -> SharedMessageStore {
        SharedMessageStore::with_backend(
            InMemoryBackend::with_lines(rows.iter().copied()),
            StoreConfig::new("memory"),
        )
    }

    #[test]
    fn find_returns_first_live_match() {
        let store = store_with(&[
            "dup,expired,m0,2025-06-01 11:00:00",
            "dup,first,m1,2025-06-01 13:00:00",
            "dup,second,m2,2025-06-01 14:00:00",
        ]);

        let record = store.find_at("dup", now()).unwrap();
        assert_eq!(record.room.as_str(), "first");
    }

    #[test]
    fn find_skips_malformed_match() {
        let store = store_with(&["id_0,foo,m,not-a-time", "id_0,bar,m,2025-06-01 13:00:00"]);

        let record = store.find_at("id_0", now()).unwrap();
        assert_eq!(record.room.as_str(), "bar");
    }

    #[test]
    fn find_expiry_boundary_is_strict() {
        let store = store_with(&["id_0,foo,m,2025-06-01 12:00:00"]);

        assert!(store.find_at("id_0", now() - TimeDelta::seconds(1)).is_ok());
        assert!(store.find_at("id_0", now()).unwrap_err().is_not_found());
    }

    #[test]
    fn find_on_empty_store() {
        let store = store_with(&[]);
        let err = store.find_at("anything", now()).unwrap_err();
        assert!(matches!(err, CoreError::NotFound { ref id } if id == "anything"));
    }

    #[test]
    fn add_replaces_supplied_id() {
        let store = store_with(&[]);
        let mut candidate = SharedMessageRecord::new("inbox", "msg");
        candidate.id = "caller-chosen".to_string();

        let stored = store.add(candidate).unwrap();
        assert!(stored.exists());
        assert_ne!(stored.id, "caller-chosen");
        assert!(Uuid::parse_str(&stored.id).is_ok());
    }

    #[test]
    fn add_generates_distinct_ids() {
        let store = store_with(&[]);
        let a = store.add(SharedMessageRecord::new("r", "m")).unwrap();
        let b = store.add(SharedMessageRecord::new("r", "m")).unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(store.row_count().unwrap(), 2);
    }

    #[test]
    fn add_rejects_multiline_field() {
        let store = store_with(&[]);
        let err = store
            .add(SharedMessageRecord::new("in\nbox", "msg"))
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidField { field: "room", .. }));
        assert_eq!(store.row_count().unwrap(), 0);
    }

    #[test]
    fn added_record_round_trips() {
        let store = store_with(&[]);
        let at = Utc::now() + TimeDelta::hours(1) + TimeDelta::milliseconds(321);
        let stored = store
            .add(SharedMessageRecord::new("a,b", "\"quoted\"").with_expired_at(at))
            .unwrap();

        assert_eq!(store.find(&stored.id).unwrap(), stored);
    }

    #[test]
    fn add_clamps_unrepresentable_expiration() {
        let store = store_with(&[]);
        let mut candidate = SharedMessageRecord::new("inbox", "msg");
        candidate.expired_at = DateTime::<Utc>::MAX_UTC;

        let stored = store.add(candidate).unwrap();
        assert_eq!(stored.expired_at_string(), "9999-12-31 23:59:59");
        assert_eq!(store.find(&stored.id).unwrap(), stored);
    }

    #[test]
    fn unpadded_timestamp_is_malformed() {
        let store = store_with(&["id_0,foo,m,2030-1-1 0:0:0"]);

        assert!(store.find_at("id_0", now()).unwrap_err().is_not_found());
        let stats = store.compact_at(now()).unwrap();
        assert_eq!(stats.malformed, 1);
        assert_eq!(stats.removed, 1);
    }

    #[test]
    fn compaction_counts() {
        let store = store_with(&[
            "id_0,foo,m,2020-08-28 13:53:17",
            "garbage",
            "id_2,bar,m,2025-06-01 13:00:00",
        ]);

        let stats = store.compact_at(now()).unwrap();
        assert_eq!(
            stats,
            CompactionStats {
                kept: 1,
                expired: 1,
                malformed: 1,
                removed: 2,
            }
        );
        assert!(stats.dropped_any());
        assert_eq!(store.row_count().unwrap(), 1);
    }

    #[test]
    fn compaction_can_preserve_malformed_rows() {
        let store = SharedMessageStore::with_backend(
            InMemoryBackend::with_lines(["garbage", "id_0,foo,m,2020-08-28 13:53:17"]),
            StoreConfig::new("memory").preserve_malformed_rows(true),
        );

        let stats = store.compact_at(now()).unwrap();
        assert_eq!(stats.malformed, 1);
        assert_eq!(stats.kept, 1);
        assert_eq!(stats.removed, 1);

        let stats = store.compact_at(now()).unwrap();
        assert!(!stats.dropped_any());
        assert_eq!(store.row_count().unwrap(), 1);
    }

    #[test]
    fn compaction_agrees_with_find() {
        let rows = [
            "a,r,m,2025-06-01 11:59:59",
            "b,r,m,2025-06-01 12:00:00",
            "c,r,m,2025-06-01 12:00:01",
            "d,r,m,bad",
        ];
        let store = store_with(&rows);
        let findable: Vec<bool> = ["a", "b", "c", "d"]
            .iter()
            .map(|id| store.find_at(id, now()).is_ok())
            .collect();

        store.compact_at(now()).unwrap();

        for (id, was_findable) in ["a", "b", "c", "d"].iter().zip(findable) {
            assert_eq!(store.find_at(id, now()).is_ok(), was_findable);
        }
        assert_eq!(store.row_count().unwrap(), 1);
    }

    #[test]
    fn custom_span_is_used() {
        let span = tracing::info_span!("sharing", tenant = "acme");
        let store = store_with(&[]).with_span(span);
        assert!(store.add(SharedMessageRecord::new("r", "m")).is_ok());
    }

    #[test]
    fn open_rejects_empty_path() {
        assert!(matches!(
            SharedMessageStore::open(StoreConfig::new("")),
            Err(CoreError::Config { .. })
        ));
    }
}
