//! Content-addressed artifact cache
//!
//! Queries are keyed by the SHA-256 of their canonical inputs. Each key maps
//! to one entry directory holding the inputs record and the artifact.
//!
//! # Query outcomes
//!
//! | Event | Producer runs | Counted as |
//! |-------|---------------|------------|
//! | Hit | no | hit |
//! | Missed | yes | miss |
//! | Corrupted | yes, after wiping the entry | miss |

pub mod entry;
pub mod file_cache;
pub mod inputs;

pub use entry::{CacheEntry, CorruptionCause, EntryState};
pub use file_cache::{FileCache, LockingScope, QueryEvent, QueryResult};
pub use inputs::{Inputs, InputsBuilder};
