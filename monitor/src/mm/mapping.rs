//! Mapping Inspector
//!
//! `showmappings` and `setPerm` are both thin layers over
//! [`AddressSpace::walk`] with `create` set, so a query can allocate empty
//! intermediate tables but never changes a leaf entry.
//!
//! A range inside a 2MiB or 1GiB page is still reported one 4KiB page at a
//! time, each with its own frame inside the large page.

use x86_64::{PhysAddr, VirtAddr};

use super::{AddressSpace, HardwarePte, Leaf, MmResult, PteFlags, PAGE_SIZE};

/// Snapshot of one page's leaf entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageMapping {
    pub virt: VirtAddr,
    pub entry: HardwarePte,
    /// Bytes mapped by `entry`
    pub span: u64,
}

impl PageMapping {
    fn new(virt: VirtAddr, leaf: Leaf<'_>) -> Self {
        Self {
            virt,
            entry: *leaf.entry,
            span: leaf.span,
        }
    }

    pub fn is_present(&self) -> bool {
        self.entry.is_present()
    }

    /// Entry maps a 2MiB or 1GiB page
    pub fn is_huge(&self) -> bool {
        self.span > PAGE_SIZE
    }

    /// Frame backing this 4KiB page, if present
    pub fn frame(&self) -> Option<PhysAddr> {
        self.is_present()
            .then(|| self.entry.frame_for(self.virt, self.span))
    }

    pub fn flags(&self) -> PteFlags {
        self.entry.flags()
    }
}

/// Iterator over the pages of `[begin, end]`
///
/// Ends after the first walk failure, which it yields.
pub struct Mappings<'s> {
    space: &'s mut dyn AddressSpace,
    next: Option<u64>,
    end: u64,
}

impl Iterator for Mappings<'_> {
    type Item = MmResult<PageMapping>;

    fn next(&mut self) -> Option<Self::Item> {
        let addr = self.next.filter(|addr| *addr <= self.end)?;
        self.next = addr.checked_add(PAGE_SIZE);

        let step = super::virt(addr).and_then(|va| {
            let leaf = self.space.walk(va, true)?;
            Ok(PageMapping::new(va, leaf))
        });
        if step.is_err() {
            self.next = None;
        }
        Some(step)
    }
}

/// Report the mapping of every page in `[begin, end]`
///
/// Iteration starts at the page containing `begin`. An empty range
/// (`begin > end`) yields nothing.
pub fn show_mappings(space: &mut dyn AddressSpace, begin: u64, end: u64) -> Mappings<'_> {
    Mappings {
        space,
        next: Some(begin & !(PAGE_SIZE - 1)),
        end,
    }
}

/// Replace the low 12 permission bits of the page mapping `addr`
///
/// The frame address is left untouched. On a large page the whole 2MiB or
/// 1GiB entry changes and its page size bit stays set. Intermediate tables
/// allocated on the way are kept even if the walk fails further down.
pub fn set_permission(space: &mut dyn AddressSpace, addr: u64, bits: u64) -> MmResult<PageMapping> {
    let va = super::virt(addr)?.align_down(PAGE_SIZE);
    let leaf = space.walk(va, true)?;
    let huge = leaf.is_huge();
    leaf.entry.set_permission(bits, huge)?;
    let mapping = PageMapping::new(va, leaf);
    space.invalidate(va);
    Ok(mapping)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mm::MmError;
    use crate::testing::FakeSpace;
    use alloc::vec::Vec;

    #[test]
    fn test_single_mapped_page() {
        let mut space = FakeSpace::new();
        space.map(0x40_0000, 0x7_3000, PteFlags::WRITABLE);

        let pages: Vec<_> = show_mappings(&mut space, 0x40_0000, 0x40_0000).collect();
        assert_eq!(pages.len(), 1);
        let page = pages[0].unwrap();
        assert!(page.is_present());
        assert_eq!(page.frame(), Some(PhysAddr::new(0x7_3000)));
        assert!(page.flags().contains(PteFlags::WRITABLE));
        assert!(!page.flags().contains(PteFlags::USER));
    }

    #[test]
    fn test_range_is_inclusive() {
        let mut space = FakeSpace::new();
        space.map(0x1000, 0x9000, PteFlags::empty());
        let pages: Vec<_> = show_mappings(&mut space, 0x1000, 0x3000)
            .map(|p| p.unwrap())
            .collect();
        assert_eq!(pages.len(), 3);
        assert!(pages[0].is_present());
        assert!(!pages[1].is_present());
        assert_eq!(pages[2].virt.as_u64(), 0x3000);
    }

    #[test]
    fn test_empty_range() {
        let mut space = FakeSpace::new();
        assert_eq!(show_mappings(&mut space, 0x2000, 0x1000).count(), 0);
    }

    #[test]
    fn test_top_of_address_space_terminates() {
        let mut space = FakeSpace::new();
        let pages = show_mappings(&mut space, 0xFFFF_FFFF_FFFF_E000, u64::MAX).count();
        assert_eq!(pages, 2);
    }

    #[test]
    fn test_walk_failure_aborts() {
        let mut space = FakeSpace::new();
        space.fail_walks = true;
        let results: Vec<_> = show_mappings(&mut space, 0x1000, 0x10_0000).collect();
        assert_eq!(results, [Err(MmError::NoMemory)]);
    }

    #[test]
    fn test_set_permission_then_show() {
        let mut space = FakeSpace::new();
        space.map(0x5000, 0xA_B000, PteFlags::WRITABLE | PteFlags::USER);

        let updated = set_permission(&mut space, 0x5123, 0x1).unwrap();
        assert_eq!(updated.virt.as_u64(), 0x5000);

        let page = show_mappings(&mut space, 0x5000, 0x5000).next().unwrap().unwrap();
        assert_eq!(page.entry.permission(), 0x1);
        assert_eq!(page.frame(), Some(PhysAddr::new(0xA_B000)));
    }

    #[test]
    fn test_set_permission_rejects_failed_walk() {
        let mut space = FakeSpace::new();
        space.map(0x5000, 0xA_B000, PteFlags::WRITABLE);
        space.fail_walks = true;
        assert_eq!(set_permission(&mut space, 0x5000, 0x7), Err(MmError::NoMemory));
        space.fail_walks = false;
        assert_eq!(space.entry(0x5000).permission(), 0x3);
    }

    #[test]
    fn test_set_permission_rejects_wide_bits() {
        let mut space = FakeSpace::new();
        space.map(0x5000, 0xA_B000, PteFlags::WRITABLE);
        assert_eq!(
            set_permission(&mut space, 0x5000, 0x1_0007),
            Err(MmError::InvalidPermission(0x1_0007))
        );
        assert_eq!(space.entry(0x5000).phys_addr().as_u64(), 0xA_B000);
    }
}
