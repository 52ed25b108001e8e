//! Adapter around the externally supplied cross-processor lock.

use crate::error::ConfigError;
use alloc::sync::Arc;
use core::sync::atomic::{Ordering, fence};
use shmem_sync::{ProcessorId, RemoteLock, SetOnce};

/// Serializes table mutation across processors.
///
/// The backing lock arrives late in bring-up. Before it is installed there
/// is exactly one writer in the whole system, so [`acquire`](Self::acquire)
/// degrades to a no-op guard; afterwards it blocks on the real lock. Readers
/// never depend on the lock, only writers do.
pub(crate) struct HeapLock {
    lock: SetOnce<Arc<dyn RemoteLock>>,
    owner: ProcessorId,
}

impl HeapLock {
    pub(crate) const fn new(owner: ProcessorId) -> Self {
        Self {
            lock: SetOnce::new(),
            owner,
        }
    }

    /// Installs the backing lock. At most once.
    pub(crate) fn install(&self, lock: Arc<dyn RemoteLock>) -> Result<(), ConfigError> {
        self.lock
            .set(lock)
            .map_err(|_| ConfigError::LockAlreadyInstalled)
    }

    /// Whether the lock subsystem finished its own bring-up.
    pub(crate) fn is_initialized(&self) -> bool {
        self.lock.get().is_some()
    }

    /// Takes the lock, or a no-op guard while no lock is installed.
    pub(crate) fn acquire(&self) -> HeapGuard<'_> {
        match self.lock.get() {
            Some(lock) => {
                lock.lock(self.owner);
                HeapGuard {
                    lock: Some(lock.as_ref()),
                }
            }
            None => HeapGuard { lock: None },
        }
    }

    /// Recovery: tears the lock out of `owner`'s hands if it holds it.
    pub(crate) fn force_release(&self, owner: ProcessorId) -> bool {
        self.lock
            .get()
            .is_some_and(|lock| lock.force_release(owner))
    }
}

/// Critical-section witness for the shared table.
pub(crate) struct HeapGuard<'a> {
    lock: Option<&'a dyn RemoteLock>,
}

impl Drop for HeapGuard<'_> {
    fn drop(&mut self) {
        // Unconditional: every write of the critical section must be visible
        // to peers no later than the lock word going free.
        fence(Ordering::Release);
        if let Some(lock) = self.lock {
            // SAFETY: the guard exists only after a successful acquisition.
            unsafe { lock.unlock() };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shmem_sync::RemoteSpin;

    #[test]
    fn no_op_guard_before_install() {
        let lock = HeapLock::new(ProcessorId::new(0));
        assert!(!lock.is_initialized());
        drop(lock.acquire());
        drop(lock.acquire());
    }

    #[test]
    fn guard_holds_the_installed_lock() {
        let lock = HeapLock::new(ProcessorId::new(2));
        let spin = Arc::new(RemoteSpin::new());
        lock.install(Arc::clone(&spin) as Arc<dyn RemoteLock>).unwrap();
        assert!(lock.is_initialized());

        let guard = lock.acquire();
        assert_eq!(spin.holder(), Some(ProcessorId::new(2)));
        drop(guard);
        assert_eq!(spin.holder(), None);
    }

    #[test]
    fn install_is_at_most_once() {
        let lock = HeapLock::new(ProcessorId::new(0));
        lock.install(Arc::new(RemoteSpin::new())).unwrap();
        assert_eq!(
            lock.install(Arc::new(RemoteSpin::new())),
            Err(ConfigError::LockAlreadyInstalled)
        );
    }

    #[test]
    fn force_release_frees_a_dead_peer_claim() {
        let lock = HeapLock::new(ProcessorId::new(1));
        let spin = Arc::new(RemoteSpin::new());
        lock.install(Arc::clone(&spin) as Arc<dyn RemoteLock>).unwrap();

        let dead = ProcessorId::new(7);
        spin.lock(dead);
        assert!(!lock.force_release(ProcessorId::new(0)));
        assert!(lock.force_release(dead));
        assert_eq!(spin.holder(), None);
    }
}
