//! Buffers over mapped shared regions.
//!
//! Raw pointer arithmetic over the shared segment is confined to this
//! module; everything above it addresses the segment through offset
//! checked, word-granular accessors. Words are atomic because other
//! processors read and write the same bytes concurrently.

use crate::error::AccessError;
use alloc::boxed::Box;
use alloc::vec::Vec;
use core::iter;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicU32, Ordering};
use shmem_addresses::{PhysicalAddress, VirtualAddress};

enum Backing {
    /// Process-private buffer standing in for a hardware mapping.
    Owned(Box<[AtomicU32]>),
    /// Externally mapped memory adopted at bring-up.
    Raw(NonNull<AtomicU32>),
}

/// One mapped shared region.
///
/// Holds the region's physical base so inhabitants can be translated, and
/// its mapped bytes behind checked accessors. The backing is either an
/// owned buffer (tests, single-process use) or an adopted external mapping.
pub struct SharedRegion {
    backing: Backing,
    phys: PhysicalAddress,
    size: u32,
}

// SAFETY: every access to the backing bytes goes through `AtomicU32`; the
// raw variant's pointer is valid for the region's lifetime per `from_raw`.
unsafe impl Send for SharedRegion {}
unsafe impl Sync for SharedRegion {}

impl SharedRegion {
    /// Creates a zeroed in-process region of `size` bytes.
    ///
    /// `size` must be a multiple of the 4-byte word granularity.
    #[must_use]
    pub fn in_memory(phys: PhysicalAddress, size: u32) -> Self {
        debug_assert!(size % 4 == 0, "region sizes are word granular");
        let words = (size as usize).div_ceil(4);
        let backing = iter::repeat_with(|| AtomicU32::new(0)).take(words).collect();
        Self {
            backing: Backing::Owned(backing),
            phys,
            size,
        }
    }

    /// Adopts an externally mapped region at `ptr`.
    ///
    /// # Safety
    /// `ptr` must point to `size` bytes (a multiple of 4) of 4-byte aligned
    /// memory that stays mapped for the lifetime of the returned value, and
    /// every concurrent writer of those bytes must use word-atomic access.
    #[must_use]
    pub const unsafe fn from_raw(ptr: NonNull<u32>, size: u32, phys: PhysicalAddress) -> Self {
        Self {
            backing: Backing::Raw(ptr.cast()),
            phys,
            size,
        }
    }

    /// Physical base address of the region.
    #[inline]
    #[must_use]
    pub const fn phys(&self) -> PhysicalAddress {
        self.phys
    }

    /// Region size in bytes.
    #[inline]
    #[must_use]
    pub const fn size(&self) -> u32 {
        self.size
    }

    /// Virtual address the region is mapped at in this process.
    #[inline]
    #[must_use]
    pub fn virt(&self) -> VirtualAddress {
        VirtualAddress::from_ptr(self.base_ptr())
    }

    fn base_ptr(&self) -> *const AtomicU32 {
        match &self.backing {
            Backing::Owned(words) => words.as_ptr(),
            Backing::Raw(ptr) => ptr.as_ptr(),
        }
    }

    fn check(&self, offset: u32) -> Result<(), AccessError> {
        if offset & 3 != 0 {
            return Err(AccessError::Misaligned(offset));
        }
        match offset.checked_add(4) {
            Some(end) if end <= self.size => Ok(()),
            _ => Err(AccessError::OutOfBounds { offset, len: 4 }),
        }
    }

    /// Word at a `check`ed byte offset.
    fn word(&self, offset: u32) -> &AtomicU32 {
        debug_assert!(self.check(offset).is_ok());
        let index = (offset / 4) as usize;
        match &self.backing {
            Backing::Owned(words) => &words[index],
            // SAFETY: `check` put the word inside the mapping.
            Backing::Raw(ptr) => unsafe { ptr.add(index).as_ref() },
        }
    }

    /// Reads the word at byte `offset`.
    pub fn load(&self, offset: u32, order: Ordering) -> Result<u32, AccessError> {
        self.check(offset)?;
        Ok(self.word(offset).load(order))
    }

    /// Writes the word at byte `offset`.
    pub fn store(&self, offset: u32, value: u32, order: Ordering) -> Result<(), AccessError> {
        self.check(offset)?;
        self.word(offset).store(value, order);
        Ok(())
    }

    /// Copies the region contents out, for diagnostics.
    ///
    /// The copy is word-atomic but not transactionally consistent with
    /// writers on other processors; postmortem dumps do not need to be.
    #[must_use]
    pub fn snapshot(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.size as usize);
        let mut offset = 0;
        while offset < self.size {
            let word = self.word(offset).load(Ordering::Relaxed);
            bytes.extend_from_slice(&word.to_ne_bytes());
            offset += 4;
        }
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_then_load() {
        let region = SharedRegion::in_memory(PhysicalAddress::new(0x1000), 64);
        region.store(8, 0xDEAD_BEEF, Ordering::Relaxed).unwrap();
        assert_eq!(region.load(8, Ordering::Relaxed), Ok(0xDEAD_BEEF));
        assert_eq!(region.load(12, Ordering::Relaxed), Ok(0));
    }

    #[test]
    fn rejects_out_of_bounds() {
        let region = SharedRegion::in_memory(PhysicalAddress::zero(), 16);
        assert_eq!(
            region.load(16, Ordering::Relaxed),
            Err(AccessError::OutOfBounds { offset: 16, len: 4 })
        );
        assert_eq!(
            region.store(u32::MAX - 3, 1, Ordering::Relaxed),
            Err(AccessError::OutOfBounds {
                offset: u32::MAX - 3,
                len: 4
            })
        );
    }

    #[test]
    fn rejects_misaligned() {
        let region = SharedRegion::in_memory(PhysicalAddress::zero(), 16);
        assert_eq!(
            region.load(2, Ordering::Relaxed),
            Err(AccessError::Misaligned(2))
        );
    }

    #[test]
    fn snapshot_matches_stores() {
        let region = SharedRegion::in_memory(PhysicalAddress::zero(), 8);
        region.store(0, 0x0403_0201, Ordering::Relaxed).unwrap();
        region.store(4, 0x0807_0605, Ordering::Relaxed).unwrap();
        let expected: Vec<u8> = (0x0403_0201_u32.to_ne_bytes().iter())
            .chain(0x0807_0605_u32.to_ne_bytes().iter())
            .copied()
            .collect();
        assert_eq!(region.snapshot(), expected);
    }

    #[test]
    fn virt_is_word_aligned() {
        let region = SharedRegion::in_memory(PhysicalAddress::zero(), 16);
        let virt = region.virt();
        assert_ne!(virt.as_u64(), 0);
        assert_eq!(virt.as_u64() % 4, 0);
    }
}
