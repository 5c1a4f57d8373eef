//! On-disk cache entries
//!
//! Each entry is a directory named by the cache key:
//!
//! ```text
//! <cache_dir>/<key>/record     exact canonical string of the inputs
//! <cache_dir>/<key>/artifact   produced file or directory
//! ```
//!
//! The record is written only after the artifact was produced successfully,
//! so an entry with a matching record always has a complete artifact.
//! Callers must hold the entry's write lock around `commit`.

use crate::error::{StowError, StowResult};
use crate::fsutil;
use serde::Serialize;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// File holding the canonical inputs of an entry
pub const RECORD_FILE: &str = "record";

/// File or directory holding the produced artifact
pub const ARTIFACT_FILE: &str = "artifact";

/// Why an existing entry cannot be trusted
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum CorruptionCause {
    /// Entry directory exists but has no record file
    MissingRecord { path: PathBuf },
    /// Record file content differs from the queried inputs
    RecordMismatch {
        path: PathBuf,
        expected: String,
        found: String,
    },
    /// Record file could not be read
    Unreadable { path: PathBuf, reason: String },
}

impl fmt::Display for CorruptionCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingRecord { path } => {
                write!(f, "Record file {} does not exist", path.display())
            }
            Self::RecordMismatch {
                path,
                expected,
                found,
            } => write!(
                f,
                "Record file {} has unexpected contents: expected {:?} but found {:?}",
                path.display(),
                expected,
                found
            ),
            Self::Unreadable { path, reason } => {
                write!(f, "Record file {} cannot be read: {}", path.display(), reason)
            }
        }
    }
}

/// Verdict of looking up an entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryState {
    /// Record present and identical to the queried inputs
    Hit,
    /// No entry directory
    Missed,
    /// Entry directory exists but cannot be trusted
    Corrupted(CorruptionCause),
}

/// One cache entry, addressed by key
#[derive(Debug, Clone)]
pub struct CacheEntry {
    dir: PathBuf,
}

impl CacheEntry {
    pub fn new(cache_dir: &Path, key: &str) -> Self {
        Self {
            dir: cache_dir.join(key),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn record_path(&self) -> PathBuf {
        self.dir.join(RECORD_FILE)
    }

    pub fn artifact_path(&self) -> PathBuf {
        self.dir.join(ARTIFACT_FILE)
    }

    /// Compare the stored record with `canonical`
    pub fn lookup(&self, canonical: &str) -> EntryState {
        match fs::symlink_metadata(&self.dir) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => return EntryState::Missed,
            _ => {}
        }

        let path = self.record_path();
        match fs::read(&path) {
            Ok(bytes) if bytes == canonical.as_bytes() => EntryState::Hit,
            Ok(bytes) => EntryState::Corrupted(CorruptionCause::RecordMismatch {
                path,
                expected: canonical.to_string(),
                found: String::from_utf8_lossy(&bytes).into_owned(),
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                EntryState::Corrupted(CorruptionCause::MissingRecord { path })
            }
            Err(e) => EntryState::Corrupted(CorruptionCause::Unreadable {
                path,
                reason: e.to_string(),
            }),
        }
    }

    /// Populate the entry and record `canonical`.
    ///
    /// `populate` receives the artifact path. A corrupted entry is wiped
    /// first. If population or the record write fails, the entry directory is
    /// removed so the next lookup reports `Missed`.
    pub fn commit<P>(&self, canonical: &str, state: &EntryState, populate: P) -> StowResult<()>
    where
        P: FnOnce(&Path) -> StowResult<()>,
    {
        if let EntryState::Corrupted(_) = state {
            fsutil::delete_path(&self.dir)?;
        }
        fs::create_dir_all(&self.dir).map_err(|e| {
            StowError::io(format!("creating cache entry {}", self.dir.display()), e)
        })?;

        let result = populate(&self.artifact_path())
            .and_then(|()| fsutil::atomic_write(&self.record_path(), canonical.as_bytes()));

        match result {
            Ok(()) => {
                debug!("Committed cache entry {}", self.dir.display());
                Ok(())
            }
            Err(e) => {
                if let Err(cleanup) = fsutil::delete_path(&self.dir) {
                    warn!(
                        "Failed to remove incomplete cache entry {}: {}",
                        self.dir.display(),
                        cleanup
                    );
                }
                Err(e)
            }
        }
    }
}
