//! Byte layout of the shared root structure.
//!
//! This is the wire format: every participating processor reads and writes
//! these offsets directly, so the constants here are a contract shared
//! byte-for-byte across all of them. All fields are native-endian `u32`
//! words.
//!
//! ```text
//! offset 0     header   initialized, free_offset, remaining, reserved
//! offset 16    TOC      ITEM_COUNT entries, 16 bytes each:
//!                       allocated, offset, size, aux
//! offset 8208  heap     bump-allocated item space
//! ```
//!
//! `offset` fields are byte offsets from the base of the region an item
//! lives in, which is the primary region unless the entry's aux word says
//! otherwise.

use bitfield_struct::bitfield;
use core::fmt;
use shmem_addresses::PhysicalAddress;

/// Number of item identifiers in the table of contents.
pub const ITEM_COUNT: u32 = 512;

/// Highest identifier of the fixed bring-up range (inclusive).
///
/// Identifiers `0..=LAST_FIXED_ITEM` are claimed through the dedicated
/// bring-up path and refused by general dynamic allocation.
pub const LAST_FIXED_ITEM: u32 = 8;

/// Header word offsets.
pub(crate) const HDR_INITIALIZED: u32 = 0;
pub(crate) const HDR_FREE_OFFSET: u32 = 4;
pub(crate) const HDR_REMAINING: u32 = 8;

/// Value of the `initialized` header word once bootstrap completed.
pub(crate) const INITIALIZED: u32 = 1;

/// Offset of the first TOC entry.
pub(crate) const TOC_OFFSET: u32 = 16;
/// Bytes covered by one TOC entry.
pub(crate) const ENTRY_STRIDE: u32 = 16;
/// Entry word offsets, relative to the entry.
pub(crate) const ENTRY_ALLOCATED: u32 = 0;
pub(crate) const ENTRY_OFFSET: u32 = 4;
pub(crate) const ENTRY_SIZE: u32 = 8;
pub(crate) const ENTRY_AUX: u32 = 12;

/// First byte of general heap space, right behind the table.
pub const DATA_OFFSET: u32 = TOC_OFFSET + ITEM_COUNT * ENTRY_STRIDE;

const _: () = assert!(DATA_OFFSET % 8 == 0, "heap space must stay 8-byte aligned");
const _: () = assert!(LAST_FIXED_ITEM < ITEM_COUNT);

/// Rounds an allocation size up to the 8-byte heap granularity.
///
/// Saturates near `u32::MAX`; a request that large can never fit and fails
/// the remaining-space check like any other oversized request.
#[inline]
#[must_use]
pub const fn align8(len: u32) -> u32 {
    len.saturating_add(7) & !7
}

/// Identifier of one table-of-contents item.
///
/// Small integers from a namespace agreed on by convention across all
/// processors; only values below [`ITEM_COUNT`] address a slot.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct ItemId(u32);

impl ItemId {
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

    /// Whether the identifier addresses a slot at all.
    #[inline]
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 < ITEM_COUNT
    }

    /// Whether the identifier belongs to the fixed bring-up range.
    #[inline]
    #[must_use]
    pub const fn is_fixed(self) -> bool {
        self.0 <= LAST_FIXED_ITEM
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for ItemId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

/// Auxiliary word of a TOC entry.
///
/// Items normally offset against the primary region; an item prepared in
/// another backing region instead records that region's physical base here.
#[bitfield(u32)]
pub struct EntryAux {
    /// Flag bits (bits 1:0); meaning is peer convention, not enforced here.
    #[bits(2)]
    pub flags: u8,
    /// Physical base override (bits 31:2), shifted right by two.
    /// Zero means "primary region".
    #[bits(30)]
    base_addr_31_2: u32,
}

impl EntryAux {
    /// Explicit physical base override, when one is recorded.
    #[inline]
    #[must_use]
    pub const fn base(self) -> Option<PhysicalAddress> {
        match self.base_addr_31_2() {
            0 => None,
            shifted => Some(PhysicalAddress::new((shifted as u64) << 2)),
        }
    }

    /// Records `base` as the override.
    ///
    /// Fails when the address is zero (indistinguishable from "no
    /// override"), not 4-byte aligned, or too wide for the 30-bit field.
    #[inline]
    #[must_use]
    pub const fn try_with_base(self, base: PhysicalAddress) -> Option<Self> {
        let raw = base.as_u64();
        if raw == 0 || raw & 0b11 != 0 || (raw >> 2) > 0x3FFF_FFFF {
            return None;
        }
        Some(self.with_base_addr_31_2((raw >> 2) as u32))
    }
}
