//! File-based storage backend for persistent storage.
//!
//! The backend owns three paths derived from the configured one:
//!
//! ```text
//! <path>        # the line file itself
//! <path>.lock   # advisory lock shared by every process using <path>
//! <path>.tmp    # scratch file written during `retain`, renamed over <path>
//! ```

use crate::backend::{is_single_line, StorageBackend};
use crate::error::{StorageError, StorageResult};
use fs2::FileExt;
use parking_lot::RwLock;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};

const LOCK_SUFFIX: &str = ".lock";
const TEMP_SUFFIX: &str = ".tmp";

/// A file-based storage backend.
///
/// Every operation reopens the file, so nothing is cached between calls
/// and the file on disk is always the source of truth.
///
/// # Locking
///
/// Operations are serialized twice over: an in-process `RwLock` and an
/// advisory lock on `<path>.lock`. `scan` takes both in shared mode;
/// `append_line` and `retain` take both exclusively and hold them until
/// the rename has completed, so an append can never land in a file that
/// is about to be replaced.
///
/// # Durability
///
/// - `append_line` flushes after every line, and calls `File::sync_all()`
///   when `sync_on_write` is enabled
/// - `retain` copies kept lines byte for byte, blank lines included, so a
///   pass that removes nothing leaves the file contents unchanged
/// - `retain` always syncs the rewritten file before renaming it and
///   syncs the parent directory afterwards (Unix)
///
/// # Example
///
/// ```no_run
/// use mailshare_storage::{FileBackend, StorageBackend};
///
/// let backend = FileBackend::new("shares.csv");
/// backend.append_line("id,room,message,2030-01-01 00:00:00").unwrap();
/// let removed = backend.retain(&mut |line| !line.starts_with("id,")).unwrap();
/// assert_eq!(removed, 1);
/// ```
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    lock_path: PathBuf,
    temp_path: PathBuf,
    sync_on_write: bool,
    guard: RwLock<()>,
}

impl FileBackend {
    /// Creates a backend for the file at `path`.
    ///
    /// No I/O happens here. The file is created by the first
    /// `append_line`; until then it reads as empty.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            lock_path: with_suffix(&path, LOCK_SUFFIX),
            temp_path: with_suffix(&path, TEMP_SUFFIX),
            path,
            sync_on_write: false,
            guard: RwLock::new(()),
        }
    }

    /// Sets whether every append is synced to disk.
    #[must_use]
    pub fn sync_on_write(mut self, value: bool) -> Self {
        self.sync_on_write = value;
        self
    }

    /// Returns the path to the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Takes the advisory lock.
    ///
    /// Only exclusive locking creates the lock file. A shared lock is
    /// skipped (`None`) when the lock file is missing or cannot be opened
    /// by a read-only caller; readers then rely on the in-process lock.
    /// An exclusive lock is `None` only when the directory does not exist.
    fn lock(&self, mode: LockMode) -> StorageResult<Option<FileLock>> {
        let mut options = OpenOptions::new();
        match mode {
            LockMode::Shared => options.read(true),
            LockMode::Exclusive => options.read(true).write(true).create(true).truncate(false),
        };

        let file = match options.open(&self.lock_path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e)
                if mode == LockMode::Shared
                    && matches!(
                        e.kind(),
                        io::ErrorKind::PermissionDenied | io::ErrorKind::ReadOnlyFilesystem
                    ) =>
            {
                return Ok(None)
            }
            Err(e) => return Err(e.into()),
        };

        let locked = match mode {
            LockMode::Shared => FileExt::lock_shared(&file),
            LockMode::Exclusive => FileExt::lock_exclusive(&file),
        };
        locked.map_err(|source| StorageError::Locked {
            path: self.lock_path.clone(),
            source,
        })?;

        Ok(Some(FileLock { file }))
    }

    /// Opens the line file for reading, or `None` if it does not exist.
    fn open_existing(&self) -> StorageResult<Option<File>> {
        match File::open(&self.path) {
            Ok(file) => Ok(Some(file)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl StorageBackend for FileBackend {
    fn scan(&self, visit: &mut dyn FnMut(&str) -> ControlFlow<()>) -> StorageResult<()> {
        let _guard = self.guard.read();
        let _lock = self.lock(LockMode::Shared)?;
        let Some(file) = self.open_existing()? else {
            return Ok(());
        };

        for_each_line(BufReader::new(file), |_, line| match line {
            Some(line) => Ok(visit(line)),
            None => Ok(ControlFlow::Continue(())),
        })?;
        Ok(())
    }

    fn append_line(&self, line: &str) -> StorageResult<()> {
        if !is_single_line(line) {
            return Err(StorageError::InvalidLine);
        }

        let _guard = self.guard.write();
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let _lock = self.lock(LockMode::Exclusive)?;

        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&self.path)?;

        let mut buf = Vec::with_capacity(line.len() + 2);
        // An interrupted earlier write may have left an unterminated line.
        if !ends_with_newline(&mut file)? {
            buf.push(b'\n');
        }
        buf.extend_from_slice(line.as_bytes());
        buf.push(b'\n');

        file.write_all(&buf)?;
        file.flush()?;
        if self.sync_on_write {
            file.sync_all()?;
        }
        Ok(())
    }

    fn retain(&self, keep: &mut dyn FnMut(&str) -> bool) -> StorageResult<usize> {
        let _guard = self.guard.write();
        let Some(_lock) = self.lock(LockMode::Exclusive)? else {
            return Ok(0);
        };
        let Some(source) = self.open_existing()? else {
            return Ok(0);
        };

        let mut temp = TempFile::create(&self.temp_path)?;
        let mut removed = 0;
        for_each_line(BufReader::new(source), |raw, line| {
            match line {
                Some(line) if !keep(line) => removed += 1,
                _ => temp.write_raw(raw)?,
            }
            Ok(ControlFlow::Continue(()))
        })?;

        temp.persist(&self.path)?;
        sync_parent_dir(&self.path)?;
        Ok(removed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LockMode {
    Shared,
    Exclusive,
}

/// Advisory lock released when dropped.
struct FileLock {
    file: File,
}

impl Drop for FileLock {
    fn drop(&mut self) {
        // Closing the handle releases the lock as well; unlocking first
        // just makes the release immediate.
        let _ = FileExt::unlock(&self.file);
    }
}

/// Scratch file that is removed unless it was persisted.
struct TempFile {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl TempFile {
    fn create(path: &Path) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: Some(BufWriter::new(file)),
        })
    }

    fn write_raw(&mut self, raw: &[u8]) -> io::Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "temp file already closed"))?;
        writer.write_all(raw)
    }

    /// Syncs the scratch file and renames it over `target`.
    fn persist(mut self, target: &Path) -> io::Result<()> {
        let writer = self
            .writer
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "temp file already closed"))?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        drop(file);

        fs::rename(&self.path, target)
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        // After a successful rename the scratch path no longer exists.
        drop(self.writer.take());
        if self.path.exists() {
            let _ = fs::remove_file(&self.path);
        }
    }
}

/// Feeds every line to `f` as raw bytes, terminator included, and as
/// text without the terminator. Blank lines get `None` for the text.
/// Invalid UTF-8 is replaced rather than rejected, so one bad line cannot
/// fail the whole scan.
fn for_each_line<R: BufRead>(
    mut reader: R,
    mut f: impl FnMut(&[u8], Option<&str>) -> io::Result<ControlFlow<()>>,
) -> io::Result<()> {
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            return Ok(());
        }

        let content = strip_terminator(&buf);
        let flow = if content.iter().all(u8::is_ascii_whitespace) {
            f(&buf, None)?
        } else {
            let text = String::from_utf8_lossy(content);
            f(&buf, Some(&*text))?
        };
        if flow.is_break() {
            return Ok(());
        }
    }
}

fn strip_terminator(buf: &[u8]) -> &[u8] {
    let buf = buf.strip_suffix(b"\n").unwrap_or(buf);
    buf.strip_suffix(b"\r").unwrap_or(buf)
}

fn ends_with_newline(file: &mut File) -> io::Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(true);
    }
    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Syncs the directory holding `path` so a rename into it is durable.
#[cfg(unix)]
fn sync_parent_dir(path: &Path) -> io::Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    File::open(parent)?.sync_all()
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) -> io::Result<()> {
    // NTFS journals metadata; directory handles cannot be fsynced.
    Ok(())
}
