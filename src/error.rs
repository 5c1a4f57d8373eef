//! Error types for Stow
//!
//! All modules use `StowResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Boxed error returned by artifact producers
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type alias for Stow operations
pub type StowResult<T> = Result<T, StowError>;

/// All errors that can occur in Stow
#[derive(Error, Debug)]
pub enum StowError {
    // Input errors
    #[error("Invalid cache inputs: {0}")]
    InvalidInputs(String),

    #[error("{} is not a file", .0.display())]
    NotAFile(PathBuf),

    // Cache configuration errors
    #[error("Cache directory must not be the root directory: {}", .0.display())]
    CacheDirIsRoot(PathBuf),

    #[error("Output file/directory '{}' must not be located in the cache directory '{}'", output.display(), cache_dir.display())]
    OutputInCacheDir { output: PathBuf, cache_dir: PathBuf },

    #[error("Output directory '{}' must not contain the cache directory '{}'", output.display(), cache_dir.display())]
    OutputContainsCacheDir { output: PathBuf, cache_dir: PathBuf },

    #[error("Output directory must not be the same as the cache directory '{}'", .0.display())]
    OutputIsCacheDir(PathBuf),

    // Lock errors
    #[error("Parent directory of {} does not exist", .0.display())]
    LockFileParentMissing(PathBuf),

    #[error("Lock file {} is a directory", .0.display())]
    LockFileIsDirectory(PathBuf),

    #[error("File {} already exists and cannot be used as a lock file", .0.display())]
    LockFileInvalid(PathBuf),

    #[error("Lock {lock} is not reentrant: it is already held by the current thread")]
    LockReentrant { lock: String },

    // Producer errors
    #[error("Artifact producer failed: {source}")]
    Producer {
        #[source]
        source: BoxError,
    },

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command {command} exited with {status}")]
    CommandExecution { command: String, status: String },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("{0}")]
    User(String),
}

impl StowError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Wrap an error raised by an artifact producer
    pub fn producer(source: impl Into<BoxError>) -> Self {
        Self::Producer {
            source: source.into(),
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create a command execution error
    pub fn command_exec(command: impl Into<String>, status: impl Into<String>) -> Self {
        Self::CommandExecution {
            command: command.into(),
            status: status.into(),
        }
    }

    /// Whether the error is a caller or configuration mistake detected before any work
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::InvalidInputs(_)
                | Self::NotAFile(_)
                | Self::CacheDirIsRoot(_)
                | Self::OutputInCacheDir { .. }
                | Self::OutputContainsCacheDir { .. }
                | Self::OutputIsCacheDir(_)
                | Self::LockFileParentMissing(_)
                | Self::LockFileIsDirectory(_)
                | Self::LockFileInvalid(_)
                | Self::ConfigInvalid { .. }
        )
    }

    /// Whether the error was raised by the caller-supplied producer
    pub fn is_producer_failure(&self) -> bool {
        matches!(self, Self::Producer { .. })
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::LockReentrant { .. } => {
                Some("A producer must not call back into the cache it is populating")
            }
            Self::LockFileInvalid(_) => Some("Remove the stray file or pick another cache directory"),
            Self::OutputInCacheDir { .. }
            | Self::OutputContainsCacheDir { .. }
            | Self::OutputIsCacheDir(_) => Some("Pick an --output location outside the cache directory"),
            Self::ConfigInvalid { .. } => Some("Run: stow config init --force"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = StowError::OutputIsCacheDir(PathBuf::from("/tmp/cache"));
        assert!(err.to_string().contains("must not be the same as the cache directory"));
    }

    #[test]
    fn producer_preserves_source() {
        let cause = std::io::Error::other("disk on fire");
        let err = StowError::producer(cause);
        assert!(err.is_producer_failure());
        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "disk on fire");
    }

    #[test]
    fn reentrant_message() {
        let err = StowError::LockReentrant {
            lock: "/tmp/a.lock".to_string(),
        };
        assert!(err.to_string().contains("is not reentrant"));
        assert!(!err.is_configuration());
        assert!(err.hint().is_some());
    }

    #[test]
    fn configuration_classification() {
        assert!(StowError::InvalidInputs("empty".into()).is_configuration());
        assert!(StowError::LockFileParentMissing(PathBuf::from("x")).is_configuration());
        assert!(!StowError::io("x", std::io::Error::other("y")).is_configuration());
    }
}
