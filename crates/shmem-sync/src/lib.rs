//! # Cross-processor synchronization primitives
//!
//! Mutual exclusion between execution units that share memory but not a
//! scheduler: independent processors spinning on a word that all of them can
//! see. The [`RemoteLock`] trait is the seam consumers program against; the
//! concrete mechanism (a hardware mutex bank, a word in the shared segment,
//! or the in-process [`RemoteSpin`] reference implementation) stays opaque
//! behind it.
//!
//! Unlike a thread mutex, a remote lock records *which processor* holds it,
//! because recovery code must be able to tear a lock out of the hands of a
//! peer that died while holding it; see [`RemoteLock::force_release`] and
//! [`LockRegistry::force_release_all`].

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

extern crate alloc;

mod registry;
mod remote_spin;
mod set_once;
mod spin_lock;

pub use registry::LockRegistry;
pub use remote_spin::RemoteSpin;
pub use set_once::SetOnce;
pub use spin_lock::{SpinLock, SpinLockGuard};

use core::fmt;

/// Identifier of one execution unit sharing the memory segment.
///
/// The numbering is a platform convention shared by every participant; this
/// crate only requires that ids fit the lock-word encoding (`id + 1` must not
/// wrap a `u32`).
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct ProcessorId(u32);

impl ProcessorId {
    #[inline]
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ProcessorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A mutual-exclusion primitive shared between processors.
///
/// ## Ordering contract
///
/// A successful [`lock`](Self::lock) or [`try_lock`](Self::try_lock) has
/// acquire semantics and [`unlock`](Self::unlock) has release semantics, so
/// memory written inside the critical section is visible to the next holder.
/// Implementations backed by non-coherent hardware must issue whatever
/// barriers make that contract hold.
///
/// Acquisition blocks until it succeeds; there is no timeout. Liveness rests
/// on holders releasing promptly and on recovery forcing locks out of
/// terminated peers.
pub trait RemoteLock: Send + Sync {
    /// Block until the lock is held, recording `owner` as the holder.
    fn lock(&self, owner: ProcessorId);

    /// Try once; `true` when the lock was taken.
    fn try_lock(&self, owner: ProcessorId) -> bool;

    /// Release the lock.
    ///
    /// # Safety
    /// The caller must currently hold the lock.
    unsafe fn unlock(&self);

    /// Processor currently recorded as holding the lock, if any.
    fn holder(&self) -> Option<ProcessorId>;

    /// Release the lock if (and only if) `owner` holds it.
    ///
    /// Recovery entry point: safe to call from any context, including while
    /// other processors are spinning on the lock. Returns `true` when a
    /// release actually happened.
    fn force_release(&self, owner: ProcessorId) -> bool;
}
