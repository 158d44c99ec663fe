//! Kernel Address Layout
//!
//! ```text
//! 0x0000_0000_0000_0000 - 0x0000_7FFF_FFFF_FFFF: User space (128TB)
//! 0x0000_8000_0000_0000 - 0xFFFF_7FFF_FFFF_FFFF: Non-canonical hole
//! 0xFFFF_8000_0000_0000 - ...                  : Direct map of physical memory
//! ```
//!
//! Physical memory below `phys_limit` is aliased at `KERNBASE + pa`. The
//! physical dump command and the page table walker both go through this
//! alias.

use x86_64::{PhysAddr, VirtAddr};

use super::{MmError, MmResult};

/// Default base of the direct map
pub const KERNBASE: u64 = 0xFFFF_8000_0000_0000;

/// Direct map of physical memory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelLayout {
    /// Virtual address of physical address zero
    pub phys_offset: VirtAddr,
    /// First physical address not covered by the direct map
    pub phys_limit: u64,
}

impl KernelLayout {
    pub const fn new(phys_offset: VirtAddr, phys_limit: u64) -> Self {
        Self {
            phys_offset,
            phys_limit,
        }
    }

    /// Direct map at `KERNBASE` covering `phys_limit` bytes
    pub fn with_limit(phys_limit: u64) -> Self {
        Self::new(VirtAddr::new(KERNBASE), phys_limit)
    }

    /// Kernel virtual alias of a physical address
    pub fn kaddr(&self, pa: PhysAddr) -> MmResult<VirtAddr> {
        let pa = pa.as_u64();
        if pa >= self.phys_limit {
            return Err(MmError::PhysOutOfRange(pa));
        }
        let va = self
            .phys_offset
            .as_u64()
            .checked_add(pa)
            .ok_or(MmError::PhysOutOfRange(pa))?;
        super::virt(va)
    }

    /// Physical address behind a direct-map virtual address
    pub fn paddr(&self, va: VirtAddr) -> MmResult<PhysAddr> {
        let pa = va
            .as_u64()
            .checked_sub(self.phys_offset.as_u64())
            .filter(|pa| *pa < self.phys_limit)
            .ok_or(MmError::NotDirectMapped(va))?;
        super::phys(pa)
    }
}

/// Kernel image symbols shown by `kerninfo`
///
/// All addresses except `start` are link-time virtual addresses; the
/// image is loaded so that `va - load_base` is its physical address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelImage {
    /// Physical entry point used by the boot loader
    pub start: PhysAddr,
    pub entry: VirtAddr,
    pub etext: VirtAddr,
    pub edata: VirtAddr,
    pub end: VirtAddr,
    /// Virtual address the image's physical address zero is linked at
    pub load_base: VirtAddr,
}

impl KernelImage {
    /// Physical load address of an image symbol
    pub fn phys(&self, va: VirtAddr) -> u64 {
        va.as_u64().wrapping_sub(self.load_base.as_u64())
    }

    /// Executable footprint rounded up to whole kilobytes
    pub fn footprint_kb(&self) -> u64 {
        let size = self.end.as_u64().saturating_sub(self.entry.as_u64());
        size.div_ceil(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kaddr_paddr() {
        let layout = KernelLayout::with_limit(0x1000_0000);
        let va = layout.kaddr(PhysAddr::new(0x20_0000)).unwrap();
        assert_eq!(va.as_u64(), 0xFFFF_8000_0020_0000);
        assert_eq!(layout.paddr(va), Ok(PhysAddr::new(0x20_0000)));
    }

    #[test]
    fn test_out_of_range() {
        let layout = KernelLayout::with_limit(0x1000_0000);
        assert_eq!(
            layout.kaddr(PhysAddr::new(0x1000_0000)),
            Err(MmError::PhysOutOfRange(0x1000_0000))
        );
        let low = VirtAddr::new(0x4000);
        assert_eq!(layout.paddr(low), Err(MmError::NotDirectMapped(low)));
    }

    #[test]
    fn test_footprint_rounds_up() {
        let image = KernelImage {
            start: PhysAddr::new(0x10_000c),
            entry: VirtAddr::new(0xFFFF_FFFF_8010_0000),
            etext: VirtAddr::new(0xFFFF_FFFF_8010_4000),
            edata: VirtAddr::new(0xFFFF_FFFF_8011_0000),
            end: VirtAddr::new(0xFFFF_FFFF_8011_0001),
            load_base: VirtAddr::new(0xFFFF_FFFF_8000_0000),
        };
        assert_eq!(image.footprint_kb(), 65);
        assert_eq!(image.phys(image.entry), 0x10_0000);
    }
}
