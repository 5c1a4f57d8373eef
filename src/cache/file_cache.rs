//! The artifact cache
//!
//! Every query holds a read lock on the cache directory and a write lock on
//! the entry's key for the whole lookup-or-populate sequence, so at most one
//! producer runs per key while unrelated keys proceed in parallel. `delete`
//! takes the directory write lock and therefore waits for in-flight queries.

use crate::cache::entry::{CacheEntry, CorruptionCause, EntryState, ARTIFACT_FILE};
use crate::cache::inputs::Inputs;
use crate::error::{BoxError, StowError, StowResult};
use crate::fsutil;
use crate::lock::{LockGuard, ProcessLock};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

const DIR_NAMESPACE: &str = "stow.cache-dir";
const ENTRY_NAMESPACE: &str = "stow.cache-entry";

/// Which callers a cache's locks exclude
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LockingScope {
    /// Lock files shared by every process on the machine
    #[default]
    MultiProcess,
    /// In-memory locks shared by the threads of this process only
    SingleProcess,
}

impl fmt::Display for LockingScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MultiProcess => write!(f, "multi-process"),
            Self::SingleProcess => write!(f, "single-process"),
        }
    }
}

/// What a query found in the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryEvent {
    Hit,
    Missed,
    Corrupted,
}

impl fmt::Display for QueryEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hit => write!(f, "hit"),
            Self::Missed => write!(f, "missed"),
            Self::Corrupted => write!(f, "corrupted"),
        }
    }
}

/// Outcome of a successful query
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    event: QueryEvent,
    #[serde(skip_serializing_if = "Option::is_none")]
    cause_of_corruption: Option<CorruptionCause>,
    cached_file: PathBuf,
}

impl QueryResult {
    pub fn event(&self) -> QueryEvent {
        self.event
    }

    /// Set only when the event is `Corrupted`
    pub fn cause_of_corruption(&self) -> Option<&CorruptionCause> {
        self.cause_of_corruption.as_ref()
    }

    /// The artifact inside the cache entry
    pub fn cached_file(&self) -> &Path {
        &self.cached_file
    }
}

/// A content-addressed cache of files and directories produced by callers.
///
/// Statistics are per instance. Instances pointed at the same directory
/// share their locks (across processes with [`LockingScope::MultiProcess`]).
#[derive(Debug)]
pub struct FileCache {
    cache_dir: PathBuf,
    scope: LockingScope,
    dir_lock: ProcessLock,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl FileCache {
    /// Open a cache rooted at `cache_dir`.
    ///
    /// The directory itself is created lazily by the first query. With
    /// multi-process locking its parent is created here, because the
    /// directory's lock file lives next to it. Symlinks in `cache_dir` are
    /// resolved, so every alias of one physical directory shares its locks.
    pub fn new(cache_dir: &Path, scope: LockingScope) -> StowResult<Self> {
        let lexical = fsutil::normalize(cache_dir)?;

        let (cache_dir, dir_lock) = match scope {
            LockingScope::MultiProcess => {
                let Some(parent) = lexical.parent() else {
                    return Err(StowError::CacheDirIsRoot(lexical));
                };
                fs::create_dir_all(parent).map_err(|e| {
                    StowError::io(format!("creating directory {}", parent.display()), e)
                })?;
                let cache_dir = fsutil::resolve(&lexical)?;
                let (Some(parent), Some(name)) = (cache_dir.parent(), cache_dir.file_name())
                else {
                    return Err(StowError::CacheDirIsRoot(cache_dir));
                };
                let mut lock_name = name.to_os_string();
                lock_name.push(".lock");
                let dir_lock = ProcessLock::cross_process(&parent.join(lock_name))?;
                (cache_dir, dir_lock)
            }
            LockingScope::SingleProcess => {
                let cache_dir = fsutil::resolve(&lexical)?;
                let dir_lock = ProcessLock::in_process(DIR_NAMESPACE, &cache_dir.to_string_lossy());
                (cache_dir, dir_lock)
            }
        };

        debug!("Opened cache {} ({})", cache_dir.display(), scope);
        Ok(Self {
            cache_dir,
            scope,
            dir_lock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    /// Cache usable from several processes at once
    pub fn with_multi_process_locking(cache_dir: &Path) -> StowResult<Self> {
        Self::new(cache_dir, LockingScope::MultiProcess)
    }

    /// Cache used by a single process (possibly from many threads)
    pub fn with_single_process_locking(cache_dir: &Path) -> StowResult<Self> {
        Self::new(cache_dir, LockingScope::SingleProcess)
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn locking_scope(&self) -> LockingScope {
        self.scope
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::SeqCst)
    }

    /// Produce an artifact at `output`, reusing the cached copy when present.
    ///
    /// On a miss `producer` is called with `output`, then whatever it wrote
    /// there is copied into the cache. On a hit whatever is at `output` is
    /// replaced by the cached copy and `producer` is not called.
    pub fn create_file<F, E>(
        &self,
        output: &Path,
        inputs: &Inputs,
        producer: F,
    ) -> StowResult<QueryResult>
    where
        F: FnOnce(&Path) -> Result<(), E>,
        E: Into<BoxError>,
    {
        let output = self.check_output_location(output)?;

        self.query(
            inputs,
            |entry| {
                fsutil::delete_path(&output)?;
                fsutil::ensure_parent_dir(&output)?;
                let artifact = entry.artifact_path();
                if fsutil::path_exists(&artifact) {
                    fsutil::copy_path(&artifact, &output)?;
                }
                Ok(())
            },
            |artifact| {
                fsutil::delete_path(&output)?;
                fsutil::ensure_parent_dir(&output)?;
                producer(&output).map_err(StowError::producer)?;
                if fsutil::path_exists(&output) {
                    fsutil::copy_path(&output, artifact)?;
                }
                Ok(())
            },
        )
    }

    /// Produce the artifact directly inside the cache unless it is there already.
    ///
    /// `producer` is called with the path of the cached artifact.
    pub fn create_file_in_cache_if_absent<F, E>(
        &self,
        inputs: &Inputs,
        producer: F,
    ) -> StowResult<QueryResult>
    where
        F: FnOnce(&Path) -> Result<(), E>,
        E: Into<BoxError>,
    {
        self.query(
            inputs,
            |_| Ok(()),
            |artifact| producer(artifact).map_err(StowError::producer),
        )
    }

    /// Whether a valid entry exists for `inputs`
    pub fn cache_entry_exists(&self, inputs: &Inputs) -> StowResult<bool> {
        let _dir_guard = self.dir_lock.read()?;
        if !self.cache_dir.is_dir() {
            return Ok(false);
        }

        let _entry_guard = self.entry_lock(inputs.key())?.read()?;
        let entry = CacheEntry::new(&self.cache_dir, inputs.key());
        Ok(entry.lookup(inputs.canonical_string()) == EntryState::Hit)
    }

    /// Where the artifact for `inputs` lives (or would live). No I/O.
    pub fn file_in_cache(&self, inputs: &Inputs) -> PathBuf {
        self.cache_dir.join(inputs.key()).join(ARTIFACT_FILE)
    }

    /// Delete the whole cache directory
    pub fn delete(&self) -> StowResult<()> {
        let _dir_guard = self.dir_lock.write()?;
        fsutil::delete_path(&self.cache_dir)?;
        info!("Deleted cache {}", self.cache_dir.display());
        Ok(())
    }

    fn entry_lock(&self, key: &str) -> StowResult<ProcessLock> {
        match self.scope {
            LockingScope::MultiProcess => {
                ProcessLock::cross_process(&self.cache_dir.join(format!("{}.lock", key)))
            }
            LockingScope::SingleProcess => Ok(ProcessLock::in_process(
                ENTRY_NAMESPACE,
                &self.cache_dir.join(key).to_string_lossy(),
            )),
        }
    }

    fn lock_entry(&self, key: &str) -> StowResult<LockGuard> {
        self.entry_lock(key)?.write()
    }

    fn query<H, P>(&self, inputs: &Inputs, on_hit: H, populate: P) -> StowResult<QueryResult>
    where
        H: FnOnce(&CacheEntry) -> StowResult<()>,
        P: FnOnce(&Path) -> StowResult<()>,
    {
        let _dir_guard = self.dir_lock.read()?;
        fs::create_dir_all(&self.cache_dir).map_err(|e| {
            StowError::io(format!("creating cache directory {}", self.cache_dir.display()), e)
        })?;
        let _entry_guard = self.lock_entry(inputs.key())?;

        let entry = CacheEntry::new(&self.cache_dir, inputs.key());
        let state = entry.lookup(inputs.canonical_string());

        let (event, cause_of_corruption) = match &state {
            EntryState::Hit => {
                self.hits.fetch_add(1, Ordering::SeqCst);
                debug!("Cache hit for {} ({})", inputs.command(), inputs.key());
                on_hit(&entry)?;
                (QueryEvent::Hit, None)
            }
            EntryState::Missed => {
                self.misses.fetch_add(1, Ordering::SeqCst);
                debug!("Cache miss for {} ({})", inputs.command(), inputs.key());
                entry.commit(inputs.canonical_string(), &state, populate)?;
                (QueryEvent::Missed, None)
            }
            EntryState::Corrupted(cause) => {
                self.misses.fetch_add(1, Ordering::SeqCst);
                warn!("Cache entry {} is corrupted: {}", entry.dir().display(), cause);
                entry.commit(inputs.canonical_string(), &state, populate)?;
                (QueryEvent::Corrupted, Some(cause.clone()))
            }
        };

        Ok(QueryResult {
            event,
            cause_of_corruption,
            cached_file: entry.artifact_path(),
        })
    }

    fn check_output_location(&self, output: &Path) -> StowResult<PathBuf> {
        // Resolve the parent only: a symlink at `output` is replaced, not followed
        let output = fsutil::normalize(output)?;
        let output = match (output.parent(), output.file_name()) {
            (Some(parent), Some(name)) => fsutil::resolve(parent)?.join(name),
            _ => output,
        };
        if fsutil::is_strictly_within(&output, &self.cache_dir) {
            return Err(StowError::OutputInCacheDir {
                output,
                cache_dir: self.cache_dir.clone(),
            });
        }
        if fsutil::is_strictly_within(&self.cache_dir, &output) {
            return Err(StowError::OutputContainsCacheDir {
                output,
                cache_dir: self.cache_dir.clone(),
            });
        }
        if output == self.cache_dir {
            return Err(StowError::OutputIsCacheDir(output));
        }
        Ok(output)
    }
}
