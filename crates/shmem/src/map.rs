//! Region registry and physical/virtual address translation.

use crate::error::{ConfigError, TranslateError};
use alloc::boxed::Box;
use alloc::vec::Vec;
use core::slice;
use log::{debug, error};
use shmem_addresses::{PhysicalAddress, VirtualAddress};
use shmem_sync::SetOnce;

/// Descriptor of one backing region: a contiguous physical span and the
/// equally sized virtual mapping this process reaches it through.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Region {
    pub phys: PhysicalAddress,
    pub virt: VirtualAddress,
    pub size: u32,
}

impl Region {
    #[must_use]
    pub const fn new(phys: PhysicalAddress, virt: VirtualAddress, size: u32) -> Self {
        Self { phys, virt, size }
    }

    fn spans_fit(&self) -> bool {
        self.phys.checked_add(u64::from(self.size)).is_some()
            && self.virt.checked_add(u64::from(self.size)).is_some()
    }
}

/// The registry of backing regions.
///
/// Starts out knowing only the primary region (the fallback); the platform
/// layer registers the full descriptor set once during bring-up, and that
/// set replaces the fallback entirely, so it should contain the primary
/// region as well. Registration happens before concurrent lookups start;
/// afterwards the registry is read-only.
pub struct RegionMap {
    fallback: Region,
    registered: SetOnce<Box<[Region]>>,
}

impl RegionMap {
    #[must_use]
    pub const fn new(fallback: Region) -> Self {
        Self {
            fallback,
            registered: SetOnce::new(),
        }
    }

    /// Installs the full region set. At most once.
    pub fn register(&self, regions: Vec<Region>) -> Result<(), ConfigError> {
        for region in &regions {
            if !region.spans_fit() {
                return Err(ConfigError::RegionSpanOverflow);
            }
        }
        for (index, a) in regions.iter().enumerate() {
            for b in &regions[index + 1..] {
                let a_end = a.phys.as_u64() + u64::from(a.size);
                let b_end = b.phys.as_u64() + u64::from(b.size);
                if a.phys.as_u64() < b_end && b.phys.as_u64() < a_end {
                    return Err(ConfigError::OverlappingRegions);
                }
            }
        }
        self.registered
            .set(regions.into_boxed_slice())
            .map_err(|_| ConfigError::RegionsAlreadyRegistered)
    }

    /// Whether the full region set has been installed.
    #[must_use]
    pub fn is_registered(&self) -> bool {
        self.registered.get().is_some()
    }

    fn active(&self) -> &[Region] {
        match self.registered.get() {
            Some(regions) => regions,
            None => slice::from_ref(&self.fallback),
        }
    }

    /// Resolves `base + offset` to the virtual address this process can
    /// dereference.
    ///
    /// The whole span `[base, base + offset]` must lie inside a single
    /// region; spans crossing a region boundary do not translate. Address
    /// arithmetic is overflow-checked on both the physical and the virtual
    /// side and fails as [`TranslateError::Overflow`] instead of wrapping.
    pub fn translate(
        &self,
        base: PhysicalAddress,
        offset: u32,
    ) -> Result<VirtualAddress, TranslateError> {
        let Some(target) = base.checked_add(u64::from(offset)) else {
            error!("translation overflow: {base} + {offset:#x}");
            return Err(TranslateError::Overflow);
        };
        for region in self.active() {
            if base.as_u64() < region.phys.as_u64() {
                continue;
            }
            let delta = target.as_u64() - region.phys.as_u64();
            if delta >= u64::from(region.size) {
                continue;
            }
            return match region.virt.checked_add(delta) {
                Some(va) => Ok(va),
                None => {
                    error!("translation overflow: {} + {delta:#x}", region.virt);
                    Err(TranslateError::Overflow)
                }
            };
        }
        debug!("no region contains {base} + {offset:#x}");
        Err(TranslateError::NoRegion)
    }

    /// Inverse translation: which physical address does `va` refer to?
    ///
    /// `None` when no region maps the address. A physical result of zero is
    /// a real answer, not a sentinel; regions physically based at zero stay
    /// representable.
    #[must_use]
    pub fn physical_of(&self, va: VirtualAddress) -> Option<PhysicalAddress> {
        for region in self.active() {
            if va.as_u64() < region.virt.as_u64() {
                continue;
            }
            let delta = va.as_u64() - region.virt.as_u64();
            if delta >= u64::from(region.size) {
                continue;
            }
            return region.phys.checked_add(delta);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn map_with_two_regions() -> RegionMap {
        let map = RegionMap::new(Region::new(
            PhysicalAddress::new(0x1000),
            VirtualAddress::new(0x9000),
            0x100,
        ));
        map.register(vec![
            Region::new(PhysicalAddress::new(0x1000), VirtualAddress::new(0x9000), 0x100),
            Region::new(PhysicalAddress::new(0x2000), VirtualAddress::new(0xA000), 0x200),
        ])
        .unwrap();
        map
    }

    #[test]
    fn translates_within_a_region() {
        let map = map_with_two_regions();
        assert_eq!(
            map.translate(PhysicalAddress::new(0x1050), 0x10),
            Ok(VirtualAddress::new(0x9060))
        );
        assert_eq!(
            map.translate(PhysicalAddress::new(0x2000), 0x1FF),
            Ok(VirtualAddress::new(0xA1FF))
        );
    }

    #[test]
    fn rejects_spans_crossing_region_bounds() {
        let map = map_with_two_regions();
        assert_eq!(
            map.translate(PhysicalAddress::new(0x1050), 0x200),
            Err(TranslateError::NoRegion)
        );
        // The gap between the regions resolves nowhere.
        assert_eq!(
            map.translate(PhysicalAddress::new(0x1800), 0),
            Err(TranslateError::NoRegion)
        );
    }

    #[test]
    fn rejects_physical_overflow() {
        let map = map_with_two_regions();
        assert_eq!(
            map.translate(PhysicalAddress::new(u64::MAX), 1),
            Err(TranslateError::Overflow)
        );
    }

    #[test]
    fn rejects_virtual_overflow() {
        let map = RegionMap::new(Region::new(
            PhysicalAddress::new(0x1000),
            VirtualAddress::new(u64::MAX - 0x10),
            0x100,
        ));
        assert_eq!(
            map.translate(PhysicalAddress::new(0x1000), 0x20),
            Err(TranslateError::Overflow)
        );
    }

    #[test]
    fn falls_back_before_registration() {
        let map = RegionMap::new(Region::new(
            PhysicalAddress::new(0x4000),
            VirtualAddress::new(0x8000),
            0x1000,
        ));
        assert!(!map.is_registered());
        assert_eq!(
            map.translate(PhysicalAddress::new(0x4000), 0x10),
            Ok(VirtualAddress::new(0x8010))
        );
        assert_eq!(
            map.translate(PhysicalAddress::new(0x5000), 0),
            Err(TranslateError::NoRegion)
        );
    }

    #[test]
    fn registration_is_at_most_once() {
        let map = map_with_two_regions();
        assert_eq!(
            map.register(vec![]),
            Err(ConfigError::RegionsAlreadyRegistered)
        );
    }

    #[test]
    fn rejects_overlapping_descriptors() {
        let map = RegionMap::new(Region::new(
            PhysicalAddress::zero(),
            VirtualAddress::new(0x1_0000),
            0x100,
        ));
        let result = map.register(vec![
            Region::new(PhysicalAddress::new(0x1000), VirtualAddress::new(0x9000), 0x100),
            Region::new(PhysicalAddress::new(0x10F0), VirtualAddress::new(0xB000), 0x100),
        ]);
        assert_eq!(result, Err(ConfigError::OverlappingRegions));
    }

    #[test]
    fn rejects_wrapping_descriptors() {
        let map = RegionMap::new(Region::new(
            PhysicalAddress::zero(),
            VirtualAddress::new(0x1_0000),
            0x100,
        ));
        let result = map.register(vec![Region::new(
            PhysicalAddress::new(u64::MAX - 0x10),
            VirtualAddress::new(0x9000),
            0x100,
        )]);
        assert_eq!(result, Err(ConfigError::RegionSpanOverflow));
    }

    #[test]
    fn inverse_translation() {
        let map = map_with_two_regions();
        assert_eq!(
            map.physical_of(VirtualAddress::new(0xA060)),
            Some(PhysicalAddress::new(0x2060))
        );
        assert_eq!(map.physical_of(VirtualAddress::new(0xC000)), None);
    }

    #[test]
    fn inverse_translation_at_physical_zero() {
        let map = RegionMap::new(Region::new(
            PhysicalAddress::zero(),
            VirtualAddress::new(0x7000),
            0x100,
        ));
        assert_eq!(
            map.physical_of(VirtualAddress::new(0x7000)),
            Some(PhysicalAddress::zero())
        );
    }
}
