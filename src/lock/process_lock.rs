//! Non-reentrant read/write locks, in-process or backed by a lock file
//!
//! A cross-process lock first takes the thread-level lock for its
//! (normalized) lock-file path, then an OS advisory lock on the file. The
//! thread-level half is needed because advisory file locks are owned by the
//! process and do not exclude other threads of the same process.

use crate::error::{StowError, StowResult};
use crate::fsutil;
use crate::lock::registry::{lock_state, LockMode, LockState};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};
use tracing::debug;

/// Registry namespace for file-backed locks
const FILE_NAMESPACE: &str = "stow.lock-file";

/// Poll interval while waiting on a contended lock file with a timeout
const LOCK_RETRY: Duration = Duration::from_millis(10);

/// A named, non-reentrant read/write lock
#[derive(Debug, Clone)]
pub struct ProcessLock {
    state: Arc<LockState>,
    lock_file: Option<PathBuf>,
}

impl ProcessLock {
    /// A lock visible to every thread of this process that uses the same
    /// `(namespace, name)` pair
    pub fn in_process(namespace: &str, name: &str) -> Self {
        Self {
            state: lock_state(namespace, name),
            lock_file: None,
        }
    }

    /// A lock visible to every process on the machine that uses `lock_file`.
    ///
    /// The lock file is created if missing; its parent directory must exist.
    pub fn cross_process(lock_file: &Path) -> StowResult<Self> {
        let lock_file = create_and_normalize_lock_file(lock_file)?;
        Ok(Self {
            state: lock_state(FILE_NAMESPACE, &lock_file.to_string_lossy()),
            lock_file: Some(lock_file),
        })
    }

    /// Normalized lock-file path, for cross-process locks
    pub fn lock_file(&self) -> Option<&Path> {
        self.lock_file.as_deref()
    }

    /// Block until the read lock is acquired
    pub fn read(&self) -> StowResult<LockGuard> {
        self.lock(LockMode::Read)
    }

    /// Block until the write lock is acquired
    pub fn write(&self) -> StowResult<LockGuard> {
        self.lock(LockMode::Write)
    }

    /// Block until the lock is acquired in `mode`
    pub fn lock(&self, mode: LockMode) -> StowResult<LockGuard> {
        self.state.acquire(mode, None)?;
        let thread_guard = ThreadGuard {
            state: Arc::clone(&self.state),
            mode,
            holder: thread::current().id(),
        };

        let file = match &self.lock_file {
            Some(path) => {
                let file = open_lock_file(path)?;
                let locked = match mode {
                    LockMode::Read => FileExt::lock_shared(&file),
                    LockMode::Write => FileExt::lock_exclusive(&file),
                };
                locked.map_err(|e| StowError::io(format!("locking {}", path.display()), e))?;
                Some(HeldFile(file))
            }
            None => None,
        };

        Ok(LockGuard {
            _file: file,
            thread: thread_guard,
        })
    }

    /// Try to acquire the lock in `mode` within `timeout`.
    ///
    /// The lock is always attempted at least once, even with a zero timeout.
    /// Returns `Ok(None)` if the timeout expired.
    pub fn try_lock(&self, mode: LockMode, timeout: Duration) -> StowResult<Option<LockGuard>> {
        let deadline = Instant::now() + timeout;

        if !self.state.acquire(mode, Some(deadline))? {
            return Ok(None);
        }
        let thread_guard = ThreadGuard {
            state: Arc::clone(&self.state),
            mode,
            holder: thread::current().id(),
        };

        let file = match &self.lock_file {
            Some(path) => match try_lock_file_until(path, mode, deadline)? {
                Some(file) => Some(HeldFile(file)),
                None => return Ok(None),
            },
            None => None,
        };

        Ok(Some(LockGuard {
            _file: file,
            thread: thread_guard,
        }))
    }
}

/// An acquired lock. Released when dropped.
#[derive(Debug)]
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct LockGuard {
    // Field order matters: the file lock is released before the thread lock.
    _file: Option<HeldFile>,
    thread: ThreadGuard,
}

impl LockGuard {
    /// Mode this guard holds
    pub fn mode(&self) -> LockMode {
        self.thread.mode
    }
}

#[derive(Debug)]
struct ThreadGuard {
    state: Arc<LockState>,
    mode: LockMode,
    // Thread that acquired the lock; the guard may be dropped elsewhere.
    holder: ThreadId,
}

impl Drop for ThreadGuard {
    fn drop(&mut self) {
        self.state.release(self.mode, self.holder);
    }
}

#[derive(Debug)]
struct HeldFile(File);

impl Drop for HeldFile {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.0);
    }
}

fn open_lock_file(path: &Path) -> StowResult<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .map_err(|e| StowError::io(format!("opening lock file {}", path.display()), e))
}

fn is_contended(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

fn try_lock_file_until(path: &Path, mode: LockMode, deadline: Instant) -> StowResult<Option<File>> {
    let file = open_lock_file(path)?;
    loop {
        let attempt = match mode {
            LockMode::Read => FileExt::try_lock_shared(&file),
            LockMode::Write => FileExt::try_lock_exclusive(&file),
        };
        match attempt {
            Ok(()) => return Ok(Some(file)),
            Err(e) if is_contended(&e) => {
                let now = Instant::now();
                if now >= deadline {
                    return Ok(None);
                }
                thread::sleep(LOCK_RETRY.min(deadline - now));
            }
            Err(e) => return Err(StowError::io(format!("locking {}", path.display()), e)),
        }
    }
}

/// Create `lock_file` if it does not exist and return its normalized path.
///
/// The parent directory must already exist. An existing directory or
/// non-empty file at that path is rejected: lock files are always empty.
pub fn create_and_normalize_lock_file(lock_file: &Path) -> StowResult<PathBuf> {
    let lexical = fsutil::normalize(lock_file)?;
    let (Some(parent), Some(file_name)) = (lexical.parent(), lexical.file_name()) else {
        return Err(StowError::LockFileInvalid(lexical));
    };
    let parent = match parent.canonicalize() {
        Ok(parent) if parent.is_dir() => parent,
        _ => return Err(StowError::LockFileParentMissing(lexical)),
    };
    let normalized = parent.join(file_name);

    match fs::metadata(&normalized) {
        Ok(meta) if meta.is_dir() => Err(StowError::LockFileIsDirectory(normalized)),
        Ok(meta) if meta.len() > 0 => Err(StowError::LockFileInvalid(normalized)),
        Ok(_) => Ok(normalized),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            open_lock_file(&normalized)?;
            debug!("Created lock file {}", normalized.display());
            Ok(normalized)
        }
        Err(e) => Err(StowError::io(
            format!("inspecting lock file {}", normalized.display()),
            e,
        )),
    }
}
