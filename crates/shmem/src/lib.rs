//! # Shared-memory heap and table of contents
//!
//! Several independent processors share one physical memory segment. Each
//! runs its own instruction stream in its own address space, and nothing
//! guarantees cache coherency between them; all they agree on is the byte
//! layout at the base of the segment and a cross-processor lock. This crate
//! implements that agreement: a fixed-capacity, never-freed bump heap with
//! a statically sized table of contents, addressed through physical-to-
//! virtual translation over possibly discontiguous backing regions.
//!
//! The shared layout (a 16-byte header, then [`ITEM_COUNT`] table entries
//! of 16 bytes, then heap space) is the wire format. There is no
//! serialization and no copying; every participant reads and writes the
//! same header and table words directly, which is why mutation goes through
//! a two-phase commit (stage the entry fields, then release-store the
//! allocated flag) and why lock-free readers are safe.
//!
//! Allocation is monotonic. An item, once allocated, keeps its offset and
//! size forever; nothing is ever freed or compacted. Requesting an existing
//! identifier returns the established placement, so any number of processors
//! can race [`SharedHeap::find_or_alloc`] for the same item and all of them
//! end up with the same bytes.
//!
//! Peers can crash while holding the lock. The [`RestartMonitor`] listens
//! for subsystem lifecycle events, forcibly releases anything a terminated
//! peer still held, and captures the segment for postmortem analysis.
//!
//! ```
//! use shmem::{ItemId, PhysicalAddress, ProcessorId, SharedHeap, SharedRegion};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // In production the region is an adopted hardware mapping; tests and
//! // single-process embedders use an in-memory stand-in.
//! let region = Arc::new(SharedRegion::in_memory(
//!     PhysicalAddress::new(0x8000_0000),
//!     64 * 1024,
//! ));
//! let heap = SharedHeap::new(region, ProcessorId::new(0))?;
//! heap.bootstrap()?;
//!
//! let item = heap.find_or_alloc(ItemId::new(42), 120)?;
//! assert_eq!(item.size, 120);
//!
//! // The same request resolves to the same placement, on any processor.
//! assert_eq!(heap.find_or_alloc(ItemId::new(42), 120)?, item);
//! # Ok(())
//! # }
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

extern crate alloc;

mod error;
mod heap;
mod layout;
mod lock;
mod map;
mod recovery;
mod region;
mod toc;

pub use error::{AccessError, ConfigError, DumpError, HeapError, TranslateError};
pub use heap::{Item, SharedHeap};
pub use layout::{DATA_OFFSET, EntryAux, ITEM_COUNT, ItemId, LAST_FIXED_ITEM, align8};
pub use map::{Region, RegionMap};
pub use recovery::{
    DumpSegment, DumpSink, PeerEvent, PeerSubsystem, RestartMonitor, SubsystemNotifier,
};
pub use region::SharedRegion;

pub use shmem_addresses::{PhysicalAddress, VirtualAddress};
pub use shmem_sync::{LockRegistry, ProcessorId, RemoteLock, RemoteSpin};
