//! Process-wide table of thread-level lock states
//!
//! A lock is identified by its `(namespace, name)` pair, never by the object
//! that created it: two `ProcessLock`s built for the same pair share one state
//! for as long as either of them (or a guard) is alive.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, OnceLock, Weak};
use std::thread::{self, ThreadId};
use std::time::Instant;

use crate::error::{StowError, StowResult};

/// Read or write access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Shared access, any number of concurrent holders
    Read,
    /// Exclusive access
    Write,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct LockId {
    pub(crate) namespace: String,
    pub(crate) name: String,
}

impl std::fmt::Display for LockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.namespace, self.name)
    }
}

#[derive(Debug, Default)]
struct Holders {
    readers: Vec<ThreadId>,
    writer: Option<ThreadId>,
}

impl Holders {
    fn held_by(&self, thread: ThreadId) -> bool {
        self.writer == Some(thread) || self.readers.contains(&thread)
    }

    fn can_grant(&self, mode: LockMode) -> bool {
        match mode {
            LockMode::Read => self.writer.is_none(),
            LockMode::Write => self.writer.is_none() && self.readers.is_empty(),
        }
    }
}

/// Thread-level reader/writer state for one lock id
#[derive(Debug)]
pub(crate) struct LockState {
    id: LockId,
    holders: Mutex<Holders>,
    released: Condvar,
}

impl LockState {
    fn holders(&self) -> MutexGuard<'_, Holders> {
        self.holders
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Acquire `mode` for the current thread.
    ///
    /// Blocks until granted when `deadline` is `None`. With a deadline, the
    /// lock is attempted at least once and `Ok(false)` is returned once the
    /// deadline passes. Re-acquiring while the thread already holds the lock
    /// in any mode is an error.
    pub(crate) fn acquire(&self, mode: LockMode, deadline: Option<Instant>) -> StowResult<bool> {
        let me = thread::current().id();
        let mut holders = self.holders();

        if holders.held_by(me) {
            return Err(StowError::LockReentrant {
                lock: self.id.to_string(),
            });
        }

        loop {
            if holders.can_grant(mode) {
                match mode {
                    LockMode::Read => holders.readers.push(me),
                    LockMode::Write => holders.writer = Some(me),
                }
                return Ok(true);
            }

            holders = match deadline {
                None => self
                    .released
                    .wait(holders)
                    .unwrap_or_else(|poisoned| poisoned.into_inner()),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(false);
                    }
                    self.released
                        .wait_timeout(holders, deadline - now)
                        .unwrap_or_else(|poisoned| poisoned.into_inner())
                        .0
                }
            };
        }
    }

    /// Release `mode` held by `holder`, the thread that acquired it.
    ///
    /// The caller may be a different thread when a guard was moved.
    pub(crate) fn release(&self, mode: LockMode, holder: ThreadId) {
        let mut holders = self.holders();
        match mode {
            LockMode::Read => {
                if let Some(pos) = holders.readers.iter().position(|t| *t == holder) {
                    holders.readers.swap_remove(pos);
                }
            }
            LockMode::Write => {
                if holders.writer == Some(holder) {
                    holders.writer = None;
                }
            }
        }
        drop(holders);
        self.released.notify_all();
    }
}

type Table = Mutex<HashMap<LockId, Weak<LockState>>>;

fn table() -> &'static Table {
    static LOCKS: OnceLock<Table> = OnceLock::new();
    LOCKS.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Look up (or create) the shared state for `(namespace, name)`
pub(crate) fn lock_state(namespace: &str, name: &str) -> Arc<LockState> {
    let id = LockId {
        namespace: namespace.to_string(),
        name: name.to_string(),
    };

    let mut locks = table()
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());

    if let Some(existing) = locks.get(&id).and_then(Weak::upgrade) {
        return existing;
    }

    // Drop entries whose locks are no longer referenced anywhere
    locks.retain(|_, state| state.strong_count() > 0);

    let state = Arc::new(LockState {
        id: id.clone(),
        holders: Mutex::new(Holders::default()),
        released: Condvar::new(),
    });
    locks.insert(id, Arc::downgrade(&state));
    state
}
