//! # Physical and Virtual Memory Address Types
//!
//! Strongly typed wrappers for the raw addresses that shared-memory
//! bookkeeping code juggles constantly: physical bases of backing regions
//! and the process-local virtual addresses they are mapped at.
//!
//! ## Overview
//!
//! Both types are zero-cost `#[repr(transparent)]` wrappers around `u64`.
//! They exist purely so that a physical base can never be handed to code
//! expecting a mapped address (or vice versa) without an explicit, visible
//! conversion.
//!
//! | Type | Meaning |
//! |------|---------|
//! | [`PhysicalAddress`] | An address in the shared physical segment. |
//! | [`VirtualAddress`]  | A process-local mapping of such an address. |
//!
//! Address arithmetic on shared-memory offsets must never wrap: a peer that
//! wrote a bogus offset may otherwise alias an unrelated mapping. Both types
//! therefore carry [`checked_add`](PhysicalAddress::checked_add), and the
//! plain `Add` impls are reserved for values already validated against a
//! region span.
//!
//! ## Typical Usage
//!
//! ```rust
//! # use shmem_addresses::*;
//! let base = PhysicalAddress::new(0x8000_0000);
//! assert_eq!((base + 0x40).as_u64(), 0x8000_0040);
//! assert_eq!(base.checked_add(u64::MAX), None);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

use core::fmt;
use core::ops::{Add, AddAssign};
use core::ptr::NonNull;

/// Physical memory address.
///
/// Denotes a location in the physically shared segment, independent of any
/// processor's mapping of it. Carries intent only; no alignment or range
/// invariant is enforced here.
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysicalAddress(u64);

impl PhysicalAddress {
    #[inline]
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self::new(0)
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Add an offset, returning `None` instead of wrapping.
    #[inline]
    #[must_use]
    pub const fn checked_add(self, rhs: u64) -> Option<Self> {
        match self.0.checked_add(rhs) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }
}

impl fmt::Debug for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PA(0x{:016X})", self.as_u64())
    }
}

impl fmt::Display for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}", self.as_u64())
    }
}

impl From<u64> for PhysicalAddress {
    #[inline]
    fn from(v: u64) -> Self {
        Self::new(v)
    }
}

impl Add<u64> for PhysicalAddress {
    type Output = Self;
    #[inline]
    fn add(self, rhs: u64) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl AddAssign<u64> for PhysicalAddress {
    #[inline]
    fn add_assign(&mut self, rhs: u64) {
        self.0 += rhs;
    }
}

/// Virtual memory address.
///
/// A process-local view of shared memory. Nothing here dereferences it; the
/// type only records where a mapping lives so translation results stay
/// distinguishable from the physical bases they were derived from.
///
/// ### Examples
/// ```rust
/// # use shmem_addresses::*;
/// let word: u64 = 0;
/// let va = VirtualAddress::from_ptr(&raw const word);
/// assert_eq!(va.as_u64(), (&raw const word) as u64);
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VirtualAddress(u64);

impl VirtualAddress {
    #[inline]
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self::new(0)
    }

    /// Address of an existing mapping.
    #[inline]
    #[must_use]
    pub fn from_ptr<T>(ptr: *const T) -> Self {
        Self::new(ptr as u64)
    }

    #[inline]
    #[must_use]
    pub fn from_nonnull<T>(ptr: NonNull<T>) -> Self {
        Self::from_ptr(ptr.as_ptr())
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Add an offset, returning `None` instead of wrapping.
    #[inline]
    #[must_use]
    pub const fn checked_add(self, rhs: u64) -> Option<Self> {
        match self.0.checked_add(rhs) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }
}

impl fmt::Debug for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VA(0x{:016X})", self.as_u64())
    }
}

impl fmt::Display for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}", self.as_u64())
    }
}

impl From<u64> for VirtualAddress {
    #[inline]
    fn from(v: u64) -> Self {
        Self::new(v)
    }
}

impl Add<u64> for VirtualAddress {
    type Output = Self;
    #[inline]
    fn add(self, rhs: u64) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl AddAssign<u64> for VirtualAddress {
    #[inline]
    fn add_assign(&mut self, rhs: u64) {
        self.0 += rhs;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checked_add_detects_overflow() {
        let pa = PhysicalAddress::new(u64::MAX - 4);
        assert_eq!(pa.checked_add(4), Some(PhysicalAddress::new(u64::MAX)));
        assert_eq!(pa.checked_add(5), None);

        let va = VirtualAddress::new(u64::MAX);
        assert_eq!(va.checked_add(0), Some(va));
        assert_eq!(va.checked_add(1), None);
    }

    #[test]
    fn add_and_add_assign() {
        let mut pa = PhysicalAddress::new(0x1000);
        pa += 0x50;
        assert_eq!(pa, PhysicalAddress::new(0x1050));
        assert_eq!((pa + 0x10).as_u64(), 0x1060);
    }

    #[test]
    fn formatting() {
        let pa = PhysicalAddress::new(0x1234);
        assert_eq!(format!("{pa:?}"), "PA(0x0000000000001234)");
        assert_eq!(format!("{pa}"), "0x0000000000001234");

        let va = VirtualAddress::new(0xA000);
        assert_eq!(format!("{va:?}"), "VA(0x000000000000A000)");
    }

    #[test]
    fn from_ptr_matches_pointer_value() {
        let word: u32 = 7;
        let p = &raw const word;
        assert_eq!(VirtualAddress::from_ptr(p).as_u64(), p as u64);
    }
}
