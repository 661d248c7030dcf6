//! Store configuration.

use crate::error::{CoreError, CoreResult};
use serde::Deserialize;
use std::path::PathBuf;

/// Configuration for opening a [`crate::SharedMessageStore`].
///
/// Deserializes from a host config section where only `path` is required:
///
/// ```yaml
/// path: /var/lib/mailshare/shares.csv
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Location of the backing file. Created on the first add.
    pub path: PathBuf,

    /// Keep rows that fail to decode when compacting instead of dropping them.
    #[serde(default)]
    pub preserve_malformed_rows: bool,

    /// Sync the backing file to disk after every add.
    #[serde(default)]
    pub sync_on_write: bool,
}

impl StoreConfig {
    /// Creates a configuration for the file at `path` with default options.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            preserve_malformed_rows: false,
            sync_on_write: false,
        }
    }

    /// Sets whether malformed rows survive compaction.
    #[must_use]
    pub const fn preserve_malformed_rows(mut self, value: bool) -> Self {
        self.preserve_malformed_rows = value;
        self
    }

    /// Sets whether every add is synced to disk.
    #[must_use]
    pub const fn sync_on_write(mut self, value: bool) -> Self {
        self.sync_on_write = value;
        self
    }

    /// Checks that the configuration can be used to open a store.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Config`] if `path` is empty.
    pub fn validate(&self) -> CoreResult<()> {
        if self.path.as_os_str().is_empty() {
            return Err(CoreError::config("path must not be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options() {
        let config = StoreConfig::new("shares.csv");
        assert_eq!(config.path, PathBuf::from("shares.csv"));
        assert!(!config.preserve_malformed_rows);
        assert!(!config.sync_on_write);
    }

    #[test]
    fn builder_pattern() {
        let config = StoreConfig::new("shares.csv")
            .preserve_malformed_rows(true)
            .sync_on_write(true);

        assert!(config.preserve_malformed_rows);
        assert!(config.sync_on_write);
    }

    #[test]
    fn deserialize_path_only() {
        let config: StoreConfig =
            serde_json::from_str(r#"{ "path": "/tmp/.mh-sharing.csv" }"#).unwrap();
        assert_eq!(config.path, PathBuf::from("/tmp/.mh-sharing.csv"));
        assert!(!config.preserve_malformed_rows);
        assert!(!config.sync_on_write);
    }

    #[test]
    fn deserialize_requires_path() {
        let result = serde_json::from_str::<StoreConfig>(r#"{ "sync_on_write": true }"#);
        assert!(result.is_err());
    }

    #[test]
    fn empty_path_is_invalid() {
        let err = StoreConfig::new("").validate().unwrap_err();
        assert!(matches!(err, CoreError::Config { .. }));
        assert!(StoreConfig::new("x.csv").validate().is_ok());
    }
}
