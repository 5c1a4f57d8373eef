//! Filesystem helpers shared by the entry store and the cache facade
//!
//! Artifacts are opaque: a single file or a whole directory tree. Everything
//! here treats both uniformly as "the thing at this path".

use crate::error::{StowError, StowResult};
use std::fs;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;
use walkdir::WalkDir;

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Delete a file or directory tree. A missing path is not an error.
pub fn delete_path(path: &Path) -> StowResult<()> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(StowError::io(format!("inspecting {}", path.display()), e)),
    };

    let result = if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };

    match result {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StowError::io(format!("deleting {}", path.display()), e)),
    }
}

/// Create the parent directory of `path` if it does not exist yet
pub fn ensure_parent_dir(path: &Path) -> StowResult<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent)
            .map_err(|e| StowError::io(format!("creating directory {}", parent.display()), e)),
        _ => Ok(()),
    }
}

/// Whether anything, including a dangling symlink, is at `path`
pub fn path_exists(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

/// Copy a file or directory tree from `from` to `to`, replacing whatever is at `to`.
///
/// Symlinks are copied as links, at the top level as well as inside trees.
pub fn copy_path(from: &Path, to: &Path) -> StowResult<()> {
    let file_type = fs::symlink_metadata(from)
        .map_err(|e| StowError::io(format!("reading {}", from.display()), e))?
        .file_type();

    delete_path(to)?;
    ensure_parent_dir(to)?;

    if file_type.is_symlink() {
        copy_symlink(from, to)
    } else if file_type.is_dir() {
        copy_dir(from, to)
    } else {
        fs::copy(from, to).map_err(|e| {
            StowError::io(format!("copying {} to {}", from.display(), to.display()), e)
        })?;
        Ok(())
    }
}

fn copy_dir(from: &Path, to: &Path) -> StowResult<()> {
    for entry in WalkDir::new(from).follow_links(false) {
        let entry = entry.map_err(|e| {
            let context = format!("walking {}", from.display());
            StowError::io(context, e.into())
        })?;

        // WalkDir only yields paths below `from`
        let Ok(relative) = entry.path().strip_prefix(from) else {
            continue;
        };
        let target = to.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target)
                .map_err(|e| StowError::io(format!("creating directory {}", target.display()), e))?;
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target).map_err(|e| {
                StowError::io(
                    format!("copying {} to {}", entry.path().display(), target.display()),
                    e,
                )
            })?;
        }
    }

    debug!("Copied directory {} to {}", from.display(), to.display());
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(link: &Path, target: &Path) -> StowResult<()> {
    let points_to = fs::read_link(link)
        .map_err(|e| StowError::io(format!("reading link {}", link.display()), e))?;
    std::os::unix::fs::symlink(&points_to, target)
        .map_err(|e| StowError::io(format!("creating link {}", target.display()), e))
}

#[cfg(not(unix))]
fn copy_symlink(link: &Path, target: &Path) -> StowResult<()> {
    fs::copy(link, target)
        .map(|_| ())
        .map_err(|e| StowError::io(format!("copying {} to {}", link.display(), target.display()), e))
}

/// Make `path` absolute and resolve `.` and `..` lexically.
///
/// The path does not need to exist. Symlinks are not resolved.
pub fn normalize(path: &Path) -> StowResult<PathBuf> {
    let absolute = std::path::absolute(path)
        .map_err(|e| StowError::io(format!("resolving {}", path.display()), e))?;

    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    Ok(normalized)
}

/// Resolve `path` to the physical location it names.
///
/// Symlinks are resolved through the longest existing ancestor; the missing
/// tail is appended as written, after lexical normalization.
pub fn resolve(path: &Path) -> StowResult<PathBuf> {
    let normalized = normalize(path)?;
    let mut existing = normalized.as_path();
    let mut tail = Vec::new();

    loop {
        match existing.canonicalize() {
            Ok(mut resolved) => {
                resolved.extend(tail.iter().rev());
                return Ok(resolved);
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(StowError::io(format!("resolving {}", existing.display()), e)),
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                tail.push(name);
                existing = parent;
            }
            _ => break,
        }
    }

    Ok(normalized)
}

/// Whether `path` is strictly inside `dir` (both already normalized)
pub fn is_strictly_within(path: &Path, dir: &Path) -> bool {
    path != dir && path.starts_with(dir)
}

/// Write `bytes` to `path` through a unique temporary file and a rename,
/// so readers never observe a partially written file.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> StowResult<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let file_name = path.file_name().ok_or_else(|| {
        StowError::io(
            format!("writing {}", path.display()),
            io::Error::other("destination path has no file name"),
        )
    })?;

    let (tmp_path, mut file) = loop {
        let counter = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let mut tmp_name = file_name.to_os_string();
        tmp_name.push(format!(".tmp.{}.{}", std::process::id(), counter));
        let tmp_path = parent.join(tmp_name);

        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp_path)
        {
            Ok(file) => break (tmp_path, file),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => {
                return Err(StowError::io(
                    format!("creating temporary file {}", tmp_path.display()),
                    e,
                ))
            }
        }
    };

    let written = file.write_all(bytes).and_then(|()| file.sync_all());
    drop(file);

    let renamed = written.and_then(|()| {
        #[cfg(windows)]
        {
            // rename does not replace an existing file on Windows
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        fs::rename(&tmp_path, path)
    });

    if let Err(e) = renamed {
        if let Err(remove_err) = fs::remove_file(&tmp_path) {
            if remove_err.kind() != io::ErrorKind::NotFound {
                debug!(
                    "Failed to remove temporary file {}: {}",
                    tmp_path.display(),
                    remove_err
                );
            }
        }
        return Err(StowError::io(format!("writing {}", path.display()), e));
    }

    Ok(())
}
