use crate::core::error::{DbError, Result};
use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

/// Sidecar suffix. Kept apart from the `<store>.lock` name that shadow-utils
/// creates and treats as held while it exists.
const LOCK_SUFFIX: &str = ".acctdb-lock";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockKind {
    /// Scans; any number of holders
    Shared,
    /// Appends and rewrites; one holder
    Exclusive,
}

#[derive(Debug)]
struct Handle {
    file: File,
    path: PathBuf,
}

/// Advisory `flock(2)` lock on a store, released on drop.
///
/// Writers lock the `<store>.acctdb-lock` sidecar, creating it if needed,
/// and then the store file itself. A rewrite renames a new file over the
/// store, so the sidecar is what orders writers.
///
/// Readers never create anything. They lock the sidecar read-only when it
/// exists, and otherwise take a shared lock on the store file, which the
/// writers' second lock excludes. A scan therefore needs only read access.
#[derive(Debug)]
pub struct FileLock {
    handles: Vec<Handle>,
    held: bool,
}

pub fn lock_path(store: &Path) -> PathBuf {
    let mut name = OsString::from(store.as_os_str());
    name.push(LOCK_SUFFIX);
    PathBuf::from(name)
}

fn lock_error(path: &Path) -> impl FnOnce(io::Error) -> DbError + '_ {
    move |source| DbError::Lock {
        path: path.to_path_buf(),
        source,
    }
}

impl FileLock {
    /// Blocks until the lock is granted
    pub fn acquire(store: &Path, kind: LockKind) -> Result<Self> {
        let mut lock = FileLock {
            handles: Vec::with_capacity(2),
            held: true,
        };

        let sidecar = lock_path(store);

        match kind {
            LockKind::Exclusive => {
                let file = OpenOptions::new()
                    .read(true)
                    .write(true)
                    .create(true)
                    .truncate(false)
                    .open(&sidecar)
                    .map_err(lock_error(&sidecar))?;
                lock.hold(file, sidecar, kind)?;

                match File::open(store) {
                    Ok(file) => lock.hold(file, store.to_path_buf(), kind)?,
                    // Append creates the store after this
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(source) => return Err(lock_error(store)(source)),
                }
            }
            LockKind::Shared => match File::open(&sidecar) {
                Ok(file) => lock.hold(file, sidecar, kind)?,
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied
                    ) =>
                {
                    lock.hold_store(store)?;
                }
                Err(source) => return Err(lock_error(&sidecar)(source)),
            },
        }

        Ok(lock)
    }

    /// Shared lock on the store file itself. Retries when a rewrite renamed
    /// a new file over the store while this was waiting.
    fn hold_store(&mut self, store: &Path) -> Result<()> {
        loop {
            let file = File::open(store)?;
            flock(&file, LockKind::Shared).map_err(lock_error(store))?;

            if is_current(&file, store)? {
                tracing::debug!(lock = %store.display(), kind = ?LockKind::Shared, "Lock acquired");
                self.handles.push(Handle {
                    file,
                    path: store.to_path_buf(),
                });
                return Ok(());
            }
        }
    }

    fn hold(&mut self, file: File, path: PathBuf, kind: LockKind) -> Result<()> {
        flock(&file, kind).map_err(lock_error(&path))?;
        tracing::debug!(lock = %path.display(), kind = ?kind, "Lock acquired");
        self.handles.push(Handle { file, path });
        Ok(())
    }

    /// The first file locked
    pub fn path(&self) -> Option<&Path> {
        self.handles.first().map(|h| h.path.as_path())
    }

    pub fn release(mut self) -> Result<()> {
        self.unlock()
    }

    fn unlock(&mut self) -> Result<()> {
        if !self.held {
            return Ok(());
        }
        self.held = false;

        let mut first_err = None;
        for handle in self.handles.iter().rev() {
            match unlock(&handle.file) {
                Ok(()) => tracing::debug!(lock = %handle.path.display(), "Lock released"),
                Err(source) => {
                    first_err.get_or_insert(DbError::Lock {
                        path: handle.path.clone(),
                        source,
                    });
                }
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(e) = self.unlock() {
            tracing::warn!(error = %e, "Failed to release lock on drop");
        }
    }
}

#[cfg(unix)]
fn is_current(file: &File, path: &Path) -> Result<bool> {
    use std::os::unix::fs::MetadataExt;

    let held = file.metadata()?;
    match std::fs::metadata(path) {
        Ok(now) => Ok(held.dev() == now.dev() && held.ino() == now.ino()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[cfg(not(unix))]
fn is_current(_file: &File, _path: &Path) -> Result<bool> {
    Ok(true)
}

#[cfg(unix)]
fn flock_op(file: &File, op: libc::c_int) -> io::Result<()> {
    use std::os::unix::io::AsRawFd;

    loop {
        // SAFETY: the descriptor is owned by `file` and open for the call
        let ret = unsafe { libc::flock(file.as_raw_fd(), op) };
        if ret == 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

#[cfg(unix)]
fn flock(file: &File, kind: LockKind) -> io::Result<()> {
    let op = match kind {
        LockKind::Shared => libc::LOCK_SH,
        LockKind::Exclusive => libc::LOCK_EX,
    };
    flock_op(file, op)
}

#[cfg(unix)]
fn unlock(file: &File) -> io::Result<()> {
    flock_op(file, libc::LOCK_UN)
}

#[cfg(not(unix))]
fn flock(_file: &File, _kind: LockKind) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "advisory file locks need a unix host",
    ))
}

#[cfg(not(unix))]
fn unlock(_file: &File) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;
    use tempfile::TempDir;

    fn store(temp_dir: &TempDir) -> PathBuf {
        let path = temp_dir.path().join("passwd");
        fs::write(&path, "root:x:0:0:root:/root:/bin/sh\n").unwrap();
        path
    }

    fn wait_blocked(acquired: &AtomicBool) {
        thread::sleep(Duration::from_millis(100));
        assert!(!acquired.load(Ordering::SeqCst));
    }

    #[test]
    fn test_lock_path_does_not_collide_with_shadow_utils() {
        let path = lock_path(Path::new("/etc/passwd"));
        assert_eq!(path, PathBuf::from("/etc/passwd.acctdb-lock"));
        assert_ne!(path, PathBuf::from("/etc/passwd.lock"));
    }

    #[test]
    fn test_shared_lock_creates_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);

        let a = FileLock::acquire(&store, LockKind::Shared).unwrap();
        let b = FileLock::acquire(&store, LockKind::Shared).unwrap();
        assert_eq!(a.path(), Some(store.as_path()));
        assert!(!lock_path(&store).exists());

        a.release().unwrap();
        b.release().unwrap();
    }

    #[test]
    fn test_shared_lock_uses_existing_sidecar() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);
        FileLock::acquire(&store, LockKind::Exclusive)
            .unwrap()
            .release()
            .unwrap();

        let lock = FileLock::acquire(&store, LockKind::Shared).unwrap();
        assert_eq!(lock.path(), Some(lock_path(&store).as_path()));
    }

    #[test]
    fn test_shared_lock_on_missing_store_is_io_error() {
        let temp_dir = TempDir::new().unwrap();
        let result = FileLock::acquire(&temp_dir.path().join("passwd"), LockKind::Shared);
        assert!(matches!(result, Err(DbError::Io(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_shared_lock_in_read_only_directory() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let etc = temp_dir.path().join("etc");
        fs::create_dir(&etc).unwrap();
        let store = etc.join("passwd");
        fs::write(&store, "root:x:0:0:root:/root:/bin/sh\n").unwrap();
        fs::set_permissions(&etc, fs::Permissions::from_mode(0o555)).unwrap();

        let result = FileLock::acquire(&store, LockKind::Shared).map(|l| l.release());
        fs::set_permissions(&etc, fs::Permissions::from_mode(0o755)).unwrap();

        assert!(matches!(result, Ok(Ok(()))));
        assert!(!lock_path(&store).exists());
    }

    #[test]
    fn test_exclusive_lock_blocks_until_released() {
        let temp_dir = TempDir::new().unwrap();
        let store = temp_dir.path().join("passwd");

        let held = FileLock::acquire(&store, LockKind::Exclusive).unwrap();
        let acquired = Arc::new(AtomicBool::new(false));

        let waiter = {
            let store = store.clone();
            let acquired = Arc::clone(&acquired);
            thread::spawn(move || {
                let lock = FileLock::acquire(&store, LockKind::Exclusive).unwrap();
                acquired.store(true, Ordering::SeqCst);
                drop(lock);
            })
        };

        wait_blocked(&acquired);

        drop(held);
        waiter.join().unwrap();
        assert!(acquired.load(Ordering::SeqCst));
    }

    #[test]
    fn test_writer_excludes_reader_without_sidecar() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);

        let reader = FileLock::acquire(&store, LockKind::Shared).unwrap();
        let acquired = Arc::new(AtomicBool::new(false));

        let writer = {
            let store = store.clone();
            let acquired = Arc::clone(&acquired);
            thread::spawn(move || {
                let lock = FileLock::acquire(&store, LockKind::Exclusive).unwrap();
                acquired.store(true, Ordering::SeqCst);
                drop(lock);
            })
        };

        wait_blocked(&acquired);

        drop(reader);
        writer.join().unwrap();
        assert!(acquired.load(Ordering::SeqCst));
    }
}
