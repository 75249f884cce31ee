use crate::core::error::{DbError, Result};
use crate::db::lock::{FileLock, LockKind};
use crate::models::record::{fields_are_clean, Record};
use crate::query::lookup::scan;
use crate::query::selector::Query;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Scans only, under a shared lock
    Read,
    /// Scans plus row insertion at the end, under an exclusive lock
    Append,
    /// Scans plus whole-file replacement, under an exclusive lock
    Rewrite,
}

/// Rows of a store from the top.
///
/// Only the `\n` terminator is removed. Every other byte, a trailing `\r`
/// included, stays part of the last field.
pub struct Rows<B> {
    reader: B,
}

impl<B: BufRead> Iterator for Rows<B> {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut row = String::new();
        match self.reader.read_line(&mut row) {
            Ok(0) => None,
            Ok(_) => {
                if row.ends_with('\n') {
                    row.pop();
                }
                Some(Ok(row))
            }
            Err(e) => Some(Err(e)),
        }
    }
}

/// Outcome of an operation and the close that followed it.
/// The operation's error wins when both failed.
fn settle<T>(result: Result<T>, closed: Result<()>, path: &Path) -> Result<T> {
    match (result, closed) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(close_err)) => Err(close_err),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(close_err)) => {
            warn!(
                file = %path.display(),
                error = %close_err,
                "Close failed after operation error"
            );
            Err(e)
        }
    }
}

/// An open store holding its lock for one logical operation.
///
/// Dropping it releases the lock; `close` also flushes and syncs
/// appended rows and reports errors.
pub struct DbFile {
    path: PathBuf,
    mode: AccessMode,
    file: File,
    writer: Option<BufWriter<File>>,
    lock: FileLock,
}

impl DbFile {
    pub fn open(path: &Path, mode: AccessMode) -> Result<Self> {
        let kind = match mode {
            AccessMode::Read => LockKind::Shared,
            AccessMode::Append | AccessMode::Rewrite => LockKind::Exclusive,
        };
        let lock = FileLock::acquire(path, kind)?;

        let file = match mode {
            AccessMode::Read | AccessMode::Rewrite => File::open(path)?,
            AccessMode::Append => OpenOptions::new()
                .read(true)
                .append(true)
                .create(true)
                .open(path)?,
        };

        debug!(file = %path.display(), mode = ?mode, "Store opened");

        Ok(DbFile {
            path: path.to_path_buf(),
            mode,
            file,
            writer: None,
            lock,
        })
    }

    /// Runs `op` with the store open in `mode` and always closes it.
    ///
    /// If both `op` and the close fail, the error from `op` is returned.
    pub fn scoped<T, F>(path: &Path, mode: AccessMode, op: F) -> Result<T>
    where
        F: FnOnce(&mut DbFile) -> Result<T>,
    {
        let mut db = DbFile::open(path, mode)?;
        let result = op(&mut db);
        let closed = db.close();
        settle(result, closed, path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    pub fn rows(&self) -> Result<Rows<BufReader<&File>>> {
        let mut file = &self.file;
        file.seek(SeekFrom::Start(0))?;
        Ok(Rows {
            reader: BufReader::new(file),
        })
    }

    /// See `query::lookup::scan` for the limit rules
    pub fn lookup<R: Record>(&self, query: &Query<R::Selector>, limit: isize) -> Result<Vec<R>> {
        scan(self.rows()?, query, limit).map_err(|e| e.in_file(&self.path))
    }

    /// Buffers one row for the end of the store. Written out by `close`.
    pub fn append<R: Record>(&mut self, record: &R) -> Result<()> {
        self.require(AccessMode::Append)?;

        let row = record.to_row();
        if !fields_are_clean(record) {
            return Err(DbError::MalformedRow {
                file: self.path.clone(),
                row,
            });
        }

        if self.writer.is_none() {
            let mut writer = BufWriter::new(self.file.try_clone()?);
            // Terminate a last row written without its newline
            if !self.ends_with_newline()? {
                writer.write_all(b"\n")?;
            }
            self.writer = Some(writer);
        }
        if let Some(writer) = self.writer.as_mut() {
            writer.write_all(row.as_bytes())?;
        }
        Ok(())
    }

    fn ends_with_newline(&self) -> Result<bool> {
        let mut file = &self.file;
        let len = file.metadata()?.len();
        if len == 0 {
            return Ok(true);
        }

        let mut last = [0u8; 1];
        file.seek(SeekFrom::Start(len - 1))?;
        file.read_exact(&mut last)?;
        Ok(last[0] == b'\n')
    }

    /// Drops every row `keep` rejects and returns how many were dropped.
    ///
    /// Kept rows are written unchanged to a temporary file next to the
    /// store, which is then renamed over it. Nothing is written when no
    /// row is dropped.
    pub fn retain<R, F>(&mut self, mut keep: F) -> Result<usize>
    where
        R: Record,
        F: FnMut(&R) -> bool,
    {
        self.require(AccessMode::Rewrite)?;

        let mut kept = String::new();
        let mut removed = 0;

        for row in self.rows()? {
            let row = row?;
            if row.is_empty() {
                continue;
            }
            let record = R::parse(&row).map_err(|e| e.in_file(&self.path))?;
            if keep(&record) {
                kept.push_str(&row);
                kept.push('\n');
            } else {
                removed += 1;
            }
        }

        if removed == 0 {
            return Ok(0);
        }

        self.replace_contents(kept.as_bytes())?;
        debug!(file = %self.path.display(), removed, "Store rewritten");
        Ok(removed)
    }

    fn replace_contents(&self, contents: &[u8]) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut temp = NamedTempFile::new_in(dir)?;
        temp.write_all(contents)?;
        temp.as_file().set_permissions(self.file.metadata()?.permissions())?;
        temp.as_file().sync_all()?;
        temp.persist(&self.path).map_err(|e| e.error)?;

        // Make the rename itself durable
        #[cfg(unix)]
        File::open(dir)?.sync_all()?;

        Ok(())
    }

    fn require(&self, mode: AccessMode) -> Result<()> {
        if self.mode != mode {
            return Err(DbError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "{} is open for {:?}, not {:?}",
                    self.path.display(),
                    self.mode,
                    mode
                ),
            )));
        }
        Ok(())
    }

    /// Flushes buffered rows to disk and releases the lock
    pub fn close(self) -> Result<()> {
        let DbFile {
            path, writer, lock, ..
        } = self;

        let flushed = match writer {
            Some(mut writer) => writer
                .flush()
                .and_then(|_| writer.get_ref().sync_all())
                .map_err(DbError::from),
            None => Ok(()),
        };
        let released = lock.release();

        debug!(file = %path.display(), "Store closed");
        flushed.and(released)
    }
}
