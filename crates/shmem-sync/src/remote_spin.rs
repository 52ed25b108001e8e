use crate::{ProcessorId, RemoteLock};
use core::hint::spin_loop;
use core::sync::atomic::{AtomicU32, Ordering};

/// Lock word value when nobody holds the lock.
const FREE: u32 = 0;

/// Owner-tagged spinlock over a single shared word.
///
/// Wire protocol: `0` means free, `id + 1` means processor `id` holds the
/// lock. Every participant spins on the same word, so the holder is always
/// observable and a crashed peer's claim can be erased by writing `FREE`
/// back. [`force_release`](RemoteSpin::force_release) does exactly that,
/// guarded by a compare-exchange so only the dead peer's tag is erased.
pub struct RemoteSpin {
    word: AtomicU32,
}

impl Default for RemoteSpin {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteSpin {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            word: AtomicU32::new(FREE),
        }
    }

    #[inline]
    fn tag(owner: ProcessorId) -> u32 {
        debug_assert!(owner.as_u32() < u32::MAX, "processor id saturates tag");
        owner.as_u32() + 1
    }

    /// Spin until the word is claimed for `owner`.
    #[inline]
    pub fn lock(&self, owner: ProcessorId) {
        let tag = Self::tag(owner);
        // Claim attempt first, then spin on a plain read while contended.
        while self
            .word
            .compare_exchange(FREE, tag, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            while self.word.load(Ordering::Relaxed) != FREE {
                spin_loop();
            }
        }
    }

    /// Try once; `true` when the claim succeeded.
    #[inline]
    pub fn try_lock(&self, owner: ProcessorId) -> bool {
        self.word
            .compare_exchange(FREE, Self::tag(owner), Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Write the word back to free.
    ///
    /// # Safety
    /// The caller must currently hold the lock.
    #[inline]
    pub unsafe fn unlock(&self) {
        self.word.store(FREE, Ordering::Release);
    }

    /// Processor recorded in the lock word, if any.
    #[inline]
    #[must_use]
    pub fn holder(&self) -> Option<ProcessorId> {
        match self.word.load(Ordering::Acquire) {
            FREE => None,
            tag => Some(ProcessorId::new(tag - 1)),
        }
    }

    /// Erase `owner`'s claim if it is the current holder.
    #[inline]
    pub fn force_release(&self, owner: ProcessorId) -> bool {
        self.word
            .compare_exchange(Self::tag(owner), FREE, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
    }
}

impl RemoteLock for RemoteSpin {
    fn lock(&self, owner: ProcessorId) {
        Self::lock(self, owner);
    }

    fn try_lock(&self, owner: ProcessorId) -> bool {
        Self::try_lock(self, owner)
    }

    unsafe fn unlock(&self) {
        unsafe { Self::unlock(self) }
    }

    fn holder(&self) -> Option<ProcessorId> {
        Self::holder(self)
    }

    fn force_release(&self, owner: ProcessorId) -> bool {
        Self::force_release(self, owner)
    }
}
