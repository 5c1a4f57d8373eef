//! Named read/write locks shared between threads and processes

mod process_lock;
mod registry;

pub use process_lock::{create_and_normalize_lock_file, LockGuard, ProcessLock};
pub use registry::LockMode;
