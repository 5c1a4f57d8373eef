//! Stow - content-addressed artifact cache
//!
//! Caches files and directories produced by arbitrary commands, keyed by
//! their inputs, with read/write locking shared between threads and
//! processes.

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod fsutil;
pub mod lock;
pub mod ui;

pub use error::{StowError, StowResult};
