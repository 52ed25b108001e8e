use crate::{ProcessorId, RemoteLock, SpinLock};
use alloc::sync::Arc;
use alloc::vec::Vec;

struct Entry {
    name: &'static str,
    lock: Arc<dyn RemoteLock>,
}

/// Roster of every shared lock a peer could die while holding.
///
/// Recovery walks the roster and erases the dead processor's claims; locks
/// that never get registered here stay stuck forever after a peer crash.
#[derive(Default)]
pub struct LockRegistry {
    entries: SpinLock<Vec<Entry>>,
}

impl LockRegistry {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: SpinLock::new(Vec::new()),
        }
    }

    /// Adds `lock` under `name`; the name only matters for diagnostics.
    pub fn register(&self, name: &'static str, lock: Arc<dyn RemoteLock>) {
        self.entries.lock().push(Entry { name, lock });
    }

    /// Erases every claim held by `owner`, returning how many were erased.
    ///
    /// The closure receives the name of each lock that was actually freed,
    /// which keeps the caller's logging out of this crate.
    pub fn force_release_all<F>(&self, owner: ProcessorId, mut released: F) -> usize
    where
        F: FnMut(&'static str),
    {
        let entries = self.entries.lock();
        let mut count = 0;
        for entry in entries.iter() {
            if entry.lock.force_release(owner) {
                released(entry.name);
                count += 1;
            }
        }
        count
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
