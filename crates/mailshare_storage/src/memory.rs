//! In-memory storage backend for testing.

use crate::backend::{is_single_line, StorageBackend};
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::ops::ControlFlow;

/// An in-memory storage backend.
///
/// This backend keeps all lines in memory and is suitable for:
/// - Unit tests
/// - Ephemeral stores that don't need persistence
///
/// # Example
///
/// ```rust
/// use mailshare_storage::{InMemoryBackend, StorageBackend};
///
/// let backend = InMemoryBackend::new();
/// backend.append_line("row").unwrap();
/// assert_eq!(backend.line_count().unwrap(), 1);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    lines: RwLock<Vec<String>>,
}

impl InMemoryBackend {
    /// Creates a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new in-memory backend with pre-existing lines.
    ///
    /// Blank lines are dropped, as a file backend would skip them.
    #[must_use]
    pub fn with_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let lines = lines
            .into_iter()
            .map(Into::into)
            .filter(|line: &String| !line.trim().is_empty())
            .collect();
        Self {
            lines: RwLock::new(lines),
        }
    }

    /// Returns a copy of all lines in the backend.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.lines.read().clone()
    }
}

impl StorageBackend for InMemoryBackend {
    fn scan(&self, visit: &mut dyn FnMut(&str) -> ControlFlow<()>) -> StorageResult<()> {
        let lines = self.lines.read();
        for line in lines.iter() {
            if visit(line).is_break() {
                break;
            }
        }
        Ok(())
    }

    fn append_line(&self, line: &str) -> StorageResult<()> {
        if !is_single_line(line) {
            return Err(StorageError::InvalidLine);
        }
        self.lines.write().push(line.to_string());
        Ok(())
    }

    fn retain(&self, keep: &mut dyn FnMut(&str) -> bool) -> StorageResult<usize> {
        let mut lines = self.lines.write();
        let before = lines.len();
        lines.retain(|line| keep(line));
        Ok(before - lines.len())
    }

    fn line_count(&self) -> StorageResult<usize> {
        Ok(self.lines.read().len())
    }
}
