//! The shared header and table of contents, word by word.
//!
//! Readers may consult a slot without holding the cross-processor lock, so
//! publication is a two-phase commit: [`Slot::publish`] stages offset, size
//! and aux with relaxed stores and commits them with a single release store
//! of the allocated flag; [`Slot::load`] acquire-loads the flag before it
//! touches the staged fields. An observer that sees the flag therefore sees
//! the matching fields, torn states are unobservable.

use crate::error::AccessError;
use crate::layout::{
    DATA_OFFSET, ENTRY_ALLOCATED, ENTRY_AUX, ENTRY_OFFSET, ENTRY_SIZE, ENTRY_STRIDE, EntryAux,
    HDR_FREE_OFFSET, HDR_INITIALIZED, HDR_REMAINING, INITIALIZED, ItemId, TOC_OFFSET,
};
use crate::region::SharedRegion;
use alloc::sync::Arc;
use core::sync::atomic::Ordering;

/// Fields of one allocated table entry.
#[derive(Debug, Copy, Clone)]
pub(crate) struct EntryRecord {
    pub offset: u32,
    pub size: u32,
    pub aux: EntryAux,
}

/// The header and entry table at the base of the primary region.
pub(crate) struct Toc {
    region: Arc<SharedRegion>,
}

impl Toc {
    pub(crate) fn new(region: Arc<SharedRegion>) -> Self {
        debug_assert!(region.size() >= DATA_OFFSET);
        Self { region }
    }

    /// Whether some processor has completed [`initialize`](Self::initialize).
    pub(crate) fn is_initialized(&self) -> bool {
        self.region
            .load(HDR_INITIALIZED, Ordering::Acquire)
            .is_ok_and(|word| word == INITIALIZED)
    }

    /// First-boot setup of the header. Returns `false` when another
    /// processor got there first (joining is a no-op).
    pub(crate) fn initialize(&self) -> Result<bool, AccessError> {
        if self.is_initialized() {
            return Ok(false);
        }
        self.region
            .store(HDR_FREE_OFFSET, DATA_OFFSET, Ordering::Relaxed)?;
        self.region.store(
            HDR_REMAINING,
            self.region.size() - DATA_OFFSET,
            Ordering::Relaxed,
        )?;
        // Publishes the staged cursor the same way slots publish fields.
        self.region
            .store(HDR_INITIALIZED, INITIALIZED, Ordering::Release)?;
        Ok(true)
    }

    pub(crate) fn free_offset(&self) -> Result<u32, AccessError> {
        self.region.load(HDR_FREE_OFFSET, Ordering::Acquire)
    }

    pub(crate) fn remaining(&self) -> Result<u32, AccessError> {
        self.region.load(HDR_REMAINING, Ordering::Acquire)
    }

    /// Advances the bump cursor. Caller holds the cross-processor lock; the
    /// guard's release fence publishes the plain stores.
    pub(crate) fn set_cursor(&self, free_offset: u32, remaining: u32) -> Result<(), AccessError> {
        self.region
            .store(HDR_FREE_OFFSET, free_offset, Ordering::Relaxed)?;
        self.region
            .store(HDR_REMAINING, remaining, Ordering::Relaxed)
    }

    /// The table slot for `id`. The identifier must be in range.
    pub(crate) fn slot(&self, id: ItemId) -> Slot<'_> {
        debug_assert!(id.is_valid());
        Slot {
            region: &self.region,
            base: TOC_OFFSET + id.as_u32() * ENTRY_STRIDE,
        }
    }
}

/// One entry of the table, addressed through the two-phase commit.
pub(crate) struct Slot<'a> {
    region: &'a SharedRegion,
    base: u32,
}

impl Slot<'_> {
    /// Reads the slot; `None` while unallocated.
    pub(crate) fn load(&self) -> Result<Option<EntryRecord>, AccessError> {
        if self.region.load(self.base + ENTRY_ALLOCATED, Ordering::Acquire)? == 0 {
            return Ok(None);
        }
        Ok(Some(EntryRecord {
            offset: self.region.load(self.base + ENTRY_OFFSET, Ordering::Relaxed)?,
            size: self.region.load(self.base + ENTRY_SIZE, Ordering::Relaxed)?,
            aux: EntryAux::from_bits(self.region.load(self.base + ENTRY_AUX, Ordering::Relaxed)?),
        }))
    }

    /// Stages the record's fields, then commits the allocated flag.
    pub(crate) fn publish(&self, record: EntryRecord) -> Result<(), AccessError> {
        self.region
            .store(self.base + ENTRY_OFFSET, record.offset, Ordering::Relaxed)?;
        self.region
            .store(self.base + ENTRY_SIZE, record.size, Ordering::Relaxed)?;
        self.region.store(
            self.base + ENTRY_AUX,
            record.aux.into_bits(),
            Ordering::Relaxed,
        )?;
        self.region
            .store(self.base + ENTRY_ALLOCATED, 1, Ordering::Release)
    }
}
