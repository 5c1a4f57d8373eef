//! Canonical encoding of cache inputs
//!
//! A cache query is described by a command namespace plus an ordered list of
//! named parameters. The canonical string is
//!
//! ```text
//! COMMAND=<command>
//! <name>=<value>
//! ...
//! ```
//!
//! joined with `\n` and without a trailing newline. The cache key is the
//! SHA-256 digest of that string, hex-encoded. Same canonical string = same
//! cache entry.

use crate::error::{StowError, StowResult};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;

const COMMAND: &str = "COMMAND";

/// Hash bytes with SHA-256, returning the full hex digest
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Hash a file's contents with SHA-256
fn hash_file_contents(path: &Path) -> StowResult<String> {
    let contents = fs::read(path)
        .map_err(|e| StowError::io(format!("reading input file {}", path.display()), e))?;
    Ok(sha256_hex(&contents))
}

/// Fail fast if `path` is not an existing regular file
fn require_file(path: &Path) -> StowResult<fs::Metadata> {
    match fs::metadata(path) {
        Ok(meta) if meta.is_file() => Ok(meta),
        _ => Err(StowError::NotAFile(path.to_path_buf())),
    }
}

/// Milliseconds since the Unix epoch, floored and negative before it.
/// Saturates at the `i64` range.
fn epoch_millis(time: SystemTime) -> i64 {
    let saturate = |d: Duration| i64::try_from(d.as_millis()).unwrap_or(i64::MAX);
    match time.duration_since(UNIX_EPOCH) {
        Ok(after) => saturate(after),
        Err(e) => {
            let before = e.duration();
            let partial = i64::from(before.subsec_nanos() % 1_000_000 != 0);
            -saturate(before).saturating_add(partial)
        }
    }
}

/// Builder collecting the parameters of one cache query.
///
/// Putting a name twice keeps the slot of the first occurrence and the value
/// of the last one.
#[derive(Debug, Clone)]
pub struct InputsBuilder {
    command: String,
    parameters: Vec<(String, String)>,
}

impl InputsBuilder {
    /// Start a builder for the given command namespace
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            parameters: Vec::new(),
        }
    }

    fn put(mut self, name: impl Into<String>, value: String) -> Self {
        let name = name.into();
        match self.parameters.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => slot.1 = value,
            None => self.parameters.push((name, value)),
        }
        self
    }

    /// Add a file path, compared textually (not resolved)
    pub fn put_file_path(self, name: impl Into<String>, path: &Path) -> Self {
        let value = path.to_string_lossy().into_owned();
        self.put(name, value)
    }

    /// Add the SHA-256 of a file's contents. The file is read immediately.
    pub fn put_file_hash(self, name: impl Into<String>, path: &Path) -> StowResult<Self> {
        require_file(path)?;
        let hash = hash_file_contents(path)?;
        Ok(self.put(name, hash))
    }

    /// Add a file's path, length and modification time as three parameters
    /// `<name>.path`, `<name>.length` and `<name>.timestamp`.
    ///
    /// Cheaper than hashing but trusts the filesystem's mtime.
    pub fn put_file_path_length_timestamp(
        self,
        name: impl Into<String>,
        path: &Path,
    ) -> StowResult<Self> {
        let meta = require_file(path)?;
        let modified = meta
            .modified()
            .map_err(|e| StowError::io(format!("reading mtime of {}", path.display()), e))?;
        let millis = epoch_millis(modified);

        let name = name.into();
        Ok(self
            .put_file_path(format!("{}.path", name), path)
            .put_long(format!("{}.length", name), meta.len() as i64)
            .put_long(format!("{}.timestamp", name), millis))
    }

    /// Add an opaque string
    pub fn put_string(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.put(name, value.into())
    }

    /// Add a boolean, encoded as `true`/`false`
    pub fn put_bool(self, name: impl Into<String>, value: bool) -> Self {
        self.put(name, value.to_string())
    }

    /// Add an integer
    pub fn put_long(self, name: impl Into<String>, value: i64) -> Self {
        self.put(name, value.to_string())
    }

    /// Validate and freeze the inputs, computing the canonical string and key
    pub fn build(self) -> StowResult<Inputs> {
        validate_token("command", &self.command)?;
        if self.parameters.is_empty() {
            return Err(StowError::InvalidInputs(
                "Inputs must not be empty.".to_string(),
            ));
        }
        for (name, _) in &self.parameters {
            validate_token("parameter name", name)?;
        }

        let mut canonical = format!("{}={}", COMMAND, self.command);
        for (name, value) in &self.parameters {
            canonical.push('\n');
            canonical.push_str(name);
            canonical.push('=');
            canonical.push_str(value);
        }
        let key = sha256_hex(canonical.as_bytes());
        debug!("Inputs for {} hash to {}", self.command, key);

        Ok(Inputs {
            command: self.command,
            parameters: self.parameters,
            canonical,
            key,
        })
    }
}

fn validate_token(what: &str, token: &str) -> StowResult<()> {
    if token.is_empty() {
        return Err(StowError::InvalidInputs(format!("{} must not be empty", what)));
    }
    if token.contains('=') || token.contains('\n') || token.contains('\r') {
        return Err(StowError::InvalidInputs(format!(
            "{} {:?} must not contain '=' or line breaks",
            what, token
        )));
    }
    Ok(())
}

/// Immutable, validated cache inputs.
///
/// Two `Inputs` are equal iff their canonical strings are byte-identical.
#[derive(Debug, Clone)]
pub struct Inputs {
    command: String,
    parameters: Vec<(String, String)>,
    canonical: String,
    key: String,
}

impl Inputs {
    /// Start building inputs for a command namespace
    pub fn builder(command: impl Into<String>) -> InputsBuilder {
        InputsBuilder::new(command)
    }

    /// The command namespace
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Parameters in canonical (first-occurrence) order
    pub fn parameters(&self) -> impl Iterator<Item = (&str, &str)> {
        self.parameters
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// The canonical string stored in each cache entry's record file
    pub fn canonical_string(&self) -> &str {
        &self.canonical
    }

    /// Hex-encoded SHA-256 of the canonical string
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl PartialEq for Inputs {
    fn eq(&self, other: &Self) -> bool {
        self.canonical == other.canonical
    }
}

impl Eq for Inputs {}

impl fmt::Display for Inputs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}
