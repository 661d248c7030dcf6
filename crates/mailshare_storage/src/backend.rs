//! Storage backend trait definition.

use crate::error::StorageResult;
use std::ops::ControlFlow;

/// A line-oriented storage backend.
///
/// Backends hold an ordered sequence of text lines. They do not interpret
/// the lines; decoding is the caller's job.
///
/// # Invariants
///
/// - `append_line` adds exactly one line at the end
/// - `scan` yields lines in the order they were appended
/// - `retain` preserves the relative order of kept lines and replaces
///   the previous line set atomically
/// - Blank lines are never handed to callers; `retain` keeps them in place
/// - Backends must be `Send + Sync` for concurrent access
///
/// # Implementors
///
/// - [`super::FileBackend`] - For persistent storage
/// - [`super::InMemoryBackend`] - For testing
pub trait StorageBackend: Send + Sync {
    /// Streams every line to `visit`, stopping early if it breaks.
    ///
    /// A backend with no backing data yields nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if the data cannot be read.
    fn scan(&self, visit: &mut dyn FnMut(&str) -> ControlFlow<()>) -> StorageResult<()>;

    /// Appends one line to the end of the storage.
    ///
    /// The line must not contain `\n` or `\r`; the backend adds the
    /// terminator itself.
    ///
    /// # Errors
    ///
    /// Returns an error if the line is invalid or an I/O error occurs.
    fn append_line(&self, line: &str) -> StorageResult<()>;

    /// Rewrites the storage to contain only the lines for which `keep`
    /// returns `true`.
    ///
    /// Returns the number of lines removed.
    ///
    /// # Errors
    ///
    /// Returns an error if reading, writing, or replacing the data fails.
    /// On error the previous line set is left intact.
    fn retain(&self, keep: &mut dyn FnMut(&str) -> bool) -> StorageResult<usize>;

    /// Returns the number of non-blank lines currently stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the data cannot be read.
    fn line_count(&self) -> StorageResult<usize> {
        let mut count = 0;
        self.scan(&mut |_| {
            count += 1;
            ControlFlow::Continue(())
        })?;
        Ok(count)
    }
}

/// Returns `true` if `line` can be stored as a single line.
pub(crate) fn is_single_line(line: &str) -> bool {
    !line.contains(['\n', '\r'])
}
