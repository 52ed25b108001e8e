//! Failure taxonomy for the shared heap.
//!
//! Everything here is returned to the immediate caller; nothing retries
//! internally. The single exception to loud failure is diagnostic dump
//! capture, whose [`DumpError`] is logged and swallowed by the recovery
//! path because postmortem capture is best-effort by nature.

use crate::ItemId;

/// Address translation failures.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TranslateError {
    /// Address arithmetic wrapped; treated as a lookup miss, never a panic.
    #[error("address arithmetic overflow")]
    Overflow,
    /// No configured region contains the requested span.
    #[error("no region contains the address")]
    NoRegion,
}

/// Rejected access to a shared region buffer.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccessError {
    /// The addressed word does not lie inside the mapped region.
    #[error("offset {offset} (+{len}) is outside the region")]
    OutOfBounds { offset: u32, len: u32 },
    /// The region is word-granular; the offset is not.
    #[error("offset {0} is not word aligned")]
    Misaligned(u32),
}

/// Allocation and lookup failures surfaced by [`SharedHeap`].
///
/// [`SharedHeap`]: crate::SharedHeap
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HeapError {
    /// The shared header does not report a completed bootstrap.
    #[error("shared heap is not initialized")]
    NotInitialized,
    /// Identifier outside the table capacity.
    #[error("invalid item identifier {0}")]
    InvalidItem(ItemId),
    /// Lookup of an identifier nobody has allocated.
    #[error("item {0} is not allocated")]
    NotAllocated(ItemId),
    /// Stored size disagrees with the caller's size.
    #[error("item {id} holds {stored} bytes, caller expected {requested}")]
    SizeMismatch {
        id: ItemId,
        stored: u32,
        requested: u32,
    },
    /// The heap cannot satisfy the request.
    #[error("out of shared heap memory ({requested} bytes requested, {remaining} free)")]
    OutOfMemory { requested: u32, remaining: u32 },
    /// Dynamic allocation of an identifier in the reserved bring-up range.
    #[error("item {0} is reserved for fixed allocation")]
    FixedItem(ItemId),
    /// Fixed-path allocation of an identifier outside the reserved range.
    #[error("item {0} is not in the fixed range")]
    NotFixed(ItemId),
    /// The physical base does not fit the entry's aux encoding.
    #[error("item {0}: base address does not fit the aux encoding")]
    UnencodableBase(ItemId),
    /// The item is already recorded with a different placement.
    #[error("item {0} is already mapped elsewhere")]
    MappingConflict(ItemId),
    /// The item exists but its address does not resolve.
    #[error(transparent)]
    Translation(#[from] TranslateError),
    /// Shared-region access outside the mapped layout.
    #[error(transparent)]
    Access(#[from] AccessError),
}

/// Bring-up wiring failures.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// The primary region cannot even hold the header and table.
    #[error("region of {size} bytes is smaller than the {required} byte layout")]
    RegionTooSmall { size: u32, required: u32 },
    /// Two descriptors claim the same physical bytes.
    #[error("region descriptors overlap in physical space")]
    OverlappingRegions,
    /// A descriptor's span wraps the end of the address space.
    #[error("region span overflows the address space")]
    RegionSpanOverflow,
    /// A second region set was offered after the first was installed.
    #[error("region set already registered")]
    RegionsAlreadyRegistered,
    /// A second cross-processor lock was offered after the first.
    #[error("cross-processor lock already installed")]
    LockAlreadyInstalled,
}

/// Failure reported by a diagnostic dump sink.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
#[error("dump capture failed (code {0})")]
pub struct DumpError(pub i32);
