//! The shared heap facade: find, allocate and resolve items.

use crate::error::{ConfigError, HeapError};
use crate::layout::{DATA_OFFSET, EntryAux, ItemId, align8};
use crate::lock::HeapLock;
use crate::map::{Region, RegionMap};
use crate::region::SharedRegion;
use crate::toc::{EntryRecord, Toc};
use alloc::sync::Arc;
use alloc::vec::Vec;
use log::{debug, error, info};
use shmem_addresses::{PhysicalAddress, VirtualAddress};
use shmem_sync::{ProcessorId, RemoteLock};

/// A resolved heap item: where it lives in this process, and how big it is.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Item {
    pub addr: VirtualAddress,
    pub size: u32,
}

/// One process's handle onto the shared heap.
///
/// Every processor constructs its own `SharedHeap` over the same primary
/// region; the region's header and table are the single source of truth,
/// this type only holds the process-local plumbing around them (the region
/// registry, the lock adapter, the local processor id).
///
/// Allocation is monotonic: items are never freed or resized. A request for
/// an already allocated identifier returns the existing placement, which
/// makes `find_or_alloc` idempotent and safe to race from any number of
/// processors.
pub struct SharedHeap {
    region: Arc<SharedRegion>,
    map: RegionMap,
    toc: Toc,
    lock: HeapLock,
}

impl SharedHeap {
    /// Opens the heap over its primary region.
    ///
    /// The region must at least hold the header and the table; the space
    /// behind [`DATA_OFFSET`] becomes the allocatable heap.
    pub fn new(region: Arc<SharedRegion>, local: ProcessorId) -> Result<Self, ConfigError> {
        if region.size() < DATA_OFFSET {
            return Err(ConfigError::RegionTooSmall {
                size: region.size(),
                required: DATA_OFFSET,
            });
        }
        let fallback = Region::new(region.phys(), region.virt(), region.size());
        Ok(Self {
            map: RegionMap::new(fallback),
            toc: Toc::new(Arc::clone(&region)),
            lock: HeapLock::new(local),
            region,
        })
    }

    /// First-boot initialization of the shared header.
    ///
    /// Exactly one processor ends up doing the work; everyone else joins the
    /// already initialized segment and gets `Ok(false)`.
    pub fn bootstrap(&self) -> Result<bool, HeapError> {
        let _guard = self.lock.acquire();
        let first = self.toc.initialize()?;
        if first {
            info!(
                "shared heap initialized, {} bytes behind the table",
                self.region.size() - DATA_OFFSET
            );
        } else {
            debug!("joining an initialized shared heap");
        }
        Ok(first)
    }

    /// Installs the cross-processor lock once its own bring-up finished.
    pub fn install_lock(&self, lock: Arc<dyn RemoteLock>) -> Result<(), ConfigError> {
        self.lock.install(lock)
    }

    /// Installs the full region descriptor set. At most once.
    pub fn register_regions(&self, regions: Vec<Region>) -> Result<(), ConfigError> {
        self.map.register(regions)
    }

    /// Looks an item up without size validation.
    pub fn get_entry(&self, id: ItemId) -> Result<Item, HeapError> {
        if !id.is_valid() {
            return Err(HeapError::InvalidItem(id));
        }
        let _guard = self.lock.acquire();
        let record = self
            .toc
            .slot(id)
            .load()?
            .ok_or(HeapError::NotAllocated(id))?;
        self.resolve(&record)
    }

    /// Looks an item up, validating the caller's size expectation.
    ///
    /// A divergent size means the peers disagree about the layout of the
    /// item, which is a bug worth catching early; it is never papered over.
    pub fn find(&self, id: ItemId, expected_size: u32) -> Result<Item, HeapError> {
        let item = self.get_entry(id)?;
        let expected = align8(expected_size);
        if item.size != expected {
            error!("item {id} holds {} bytes, caller expected {expected}", item.size);
            return Err(HeapError::SizeMismatch {
                id,
                stored: item.size,
                requested: expected,
            });
        }
        Ok(item)
    }

    /// Returns the item, allocating it from the bump heap if nobody has yet.
    ///
    /// Identifiers in the fixed range cannot be created here; they are
    /// established through [`alloc_fixed`](Self::alloc_fixed) or
    /// [`map_fixed`](Self::map_fixed) during bring-up. Looking up an already
    /// established fixed item through this call is fine.
    pub fn find_or_alloc(&self, id: ItemId, size: u32) -> Result<Item, HeapError> {
        if !self.toc.is_initialized() {
            error!("find_or_alloc({id}): shared heap is not initialized");
            return Err(HeapError::NotInitialized);
        }
        if !id.is_valid() {
            return Err(HeapError::InvalidItem(id));
        }
        let size = align8(size);
        let _guard = self.lock.acquire();
        match self.toc.slot(id).load()? {
            Some(record) => {
                debug!("item {id} already allocated");
                self.resolve_sized(id, &record, size)
            }
            None if id.is_fixed() => {
                error!("item {id} is reserved for fixed allocation");
                Err(HeapError::FixedItem(id))
            }
            None => self.claim(id, size),
        }
    }

    /// Bring-up allocation of a fixed item from the primary region's heap.
    ///
    /// Same claim algorithm as the dynamic path, restricted to the fixed
    /// identifier range and just as idempotent.
    pub fn alloc_fixed(&self, id: ItemId, size: u32) -> Result<Item, HeapError> {
        if !self.toc.is_initialized() {
            error!("alloc_fixed({id}): shared heap is not initialized");
            return Err(HeapError::NotInitialized);
        }
        if !id.is_fixed() {
            return Err(HeapError::NotFixed(id));
        }
        let size = align8(size);
        let _guard = self.lock.acquire();
        match self.toc.slot(id).load()? {
            Some(record) => {
                debug!("fixed item {id} already allocated");
                self.resolve_sized(id, &record, size)
            }
            None => self.claim(id, size),
        }
    }

    /// Records a fixed item that was prepared in another backing region.
    ///
    /// The entry carries `base` as its aux override, so every processor
    /// resolves the item against that region instead of the primary one.
    /// `base` must be registered (or be the fallback) on this processor; the
    /// entry is only published once it resolves locally.
    pub fn map_fixed(
        &self,
        id: ItemId,
        base: PhysicalAddress,
        offset: u32,
        size: u32,
    ) -> Result<Item, HeapError> {
        if !self.toc.is_initialized() {
            error!("map_fixed({id}): shared heap is not initialized");
            return Err(HeapError::NotInitialized);
        }
        if !id.is_fixed() {
            return Err(HeapError::NotFixed(id));
        }
        let size = align8(size);
        let Some(aux) = EntryAux::new().try_with_base(base) else {
            error!("map_fixed({id}): base {base} does not fit the aux encoding");
            return Err(HeapError::UnencodableBase(id));
        };
        let record = EntryRecord { offset, size, aux };

        let _guard = self.lock.acquire();
        match self.toc.slot(id).load()? {
            Some(existing) => {
                if existing.size != record.size {
                    return Err(HeapError::SizeMismatch {
                        id,
                        stored: existing.size,
                        requested: record.size,
                    });
                }
                if existing.offset != record.offset
                    || existing.aux.base() != record.aux.base()
                {
                    error!("map_fixed({id}): item is already mapped elsewhere");
                    return Err(HeapError::MappingConflict(id));
                }
                self.resolve(&existing)
            }
            None => {
                // Resolve before publishing so a bad placement never lands
                // in the table.
                let item = self.resolve(&record)?;
                self.toc.slot(id).publish(record)?;
                info!("fixed item {id} mapped at {base} + {offset:#x} ({size} bytes)");
                Ok(item)
            }
        }
    }

    /// Inverse translation for pointers previously handed out by this heap.
    #[must_use]
    pub fn physical_address(&self, va: VirtualAddress) -> Option<PhysicalAddress> {
        self.map.physical_of(va)
    }

    /// Whether some processor has bootstrapped the segment.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.toc.is_initialized()
    }

    /// Current bump cursor (bytes from the region base).
    pub fn free_offset(&self) -> Result<u32, HeapError> {
        Ok(self.toc.free_offset()?)
    }

    /// Bytes still allocatable.
    pub fn remaining(&self) -> Result<u32, HeapError> {
        Ok(self.toc.remaining()?)
    }

    /// The region this heap lives in, for diagnostics and dumps.
    #[must_use]
    pub fn primary_region(&self) -> &Arc<SharedRegion> {
        &self.region
    }

    /// Recovery hook: frees the table lock if `owner` holds it.
    pub fn force_release(&self, owner: ProcessorId) -> bool {
        self.lock.force_release(owner)
    }

    /// Claims fresh heap space for `id`. Caller holds the lock and has
    /// checked that the slot is unallocated.
    fn claim(&self, id: ItemId, size: u32) -> Result<Item, HeapError> {
        debug!("allocating item {id} ({size} bytes)");
        let free_offset = self.toc.free_offset()?;
        let remaining = self.toc.remaining()?;
        if remaining < size {
            error!("item {id} needs {size} bytes, only {remaining} remain");
            return Err(HeapError::OutOfMemory {
                requested: size,
                remaining,
            });
        }
        let record = EntryRecord {
            offset: free_offset,
            size,
            aux: EntryAux::new(),
        };
        self.toc.slot(id).publish(record)?;
        // Guarded by the remaining check unless a peer corrupted the header.
        let (next, left) = match (free_offset.checked_add(size), remaining.checked_sub(size)) {
            (Some(next), Some(left)) => (next, left),
            _ => {
                error!("heap header is inconsistent at item {id}");
                return Err(HeapError::OutOfMemory {
                    requested: size,
                    remaining,
                });
            }
        };
        self.toc.set_cursor(next, left)?;
        self.resolve(&record)
    }

    /// Size-validated resolution of an existing record.
    fn resolve_sized(
        &self,
        id: ItemId,
        record: &EntryRecord,
        requested: u32,
    ) -> Result<Item, HeapError> {
        if record.size != requested {
            error!(
                "item {id} holds {} bytes, caller requested {requested}",
                record.size
            );
            return Err(HeapError::SizeMismatch {
                id,
                stored: record.size,
                requested,
            });
        }
        self.resolve(record)
    }

    /// Turns a table record into a process-local item.
    fn resolve(&self, record: &EntryRecord) -> Result<Item, HeapError> {
        let base = record.aux.base().unwrap_or(self.region.phys());
        let addr = self.map.translate(base, record.offset)?;
        Ok(Item {
            addr,
            size: record.size,
        })
    }
}
