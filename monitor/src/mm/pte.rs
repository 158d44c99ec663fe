//! Page Table Entry Implementation
//!
//! x86_64 uses 4-level paging:
//! - PML4 (Page Map Level 4) - 512 entries, each covers 512GB
//! - PDPT (Page Directory Pointer Table) - 512 entries, each covers 1GB
//! - PD (Page Directory) - 512 entries, each covers 2MB
//! - PT (Page Table) - 512 entries, each covers 4KB
//!
//! # Page Table Entry Format
//! ```text
//! Bit 0:     Present
//! Bit 1:     Read/Write
//! Bit 2:     User/Supervisor
//! Bit 3:     Write-Through
//! Bit 4:     Cache Disable
//! Bit 5:     Accessed
//! Bit 6:     Dirty
//! Bit 7:     Page Size (1=Large page)
//! Bit 8:     Global
//! Bits 9-11: Available
//! Bits 12-51: Physical address (40 bits, 4KB aligned)
//! Bit 63:    No Execute
//! ```
//!
//! The monitor treats bits 0-11 as the "permission field": `setPerm`
//! replaces it and leaves the frame address and NX bit alone. In a 2MiB or
//! 1GiB entry bit 7 is the page size bit and bit 12 is PAT; both survive.

use bitflags::bitflags;
use x86_64::structures::paging::{FrameAllocator, PhysFrame, Size4KiB};
use x86_64::{PhysAddr, VirtAddr};

use super::{AddressSpace, KernelLayout, Leaf, MmError, MmResult, PAGE_SIZE, WORD_SIZE};

/// Number of entries per page table (all levels)
pub const ENTRIES_PER_TABLE: usize = 512;

/// Low 12 bits of an entry, replaced by `setPerm`
pub const PERMISSION_MASK: u64 = 0xFFF;

/// Mask for physical address (bits 12-51)
pub const ADDR_MASK: u64 = 0x000F_FFFF_FFFF_F000;

bitflags! {
    /// Page table entry flags (bits 0-11 plus NX)
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PteFlags: u64 {
        const PRESENT = 1 << 0;
        const WRITABLE = 1 << 1;
        const USER = 1 << 2;
        const WRITE_THROUGH = 1 << 3;
        const CACHE_DISABLE = 1 << 4;
        const ACCESSED = 1 << 5;
        const DIRTY = 1 << 6;
        const HUGE_PAGE = 1 << 7;
        const GLOBAL = 1 << 8;
        const AVAILABLE = 0b111 << 9;
        const NO_EXECUTE = 1 << 63;
    }
}

/// Flags given to freshly allocated intermediate tables
///
/// Intermediate levels stay permissive so the leaf alone decides access.
const TABLE_FLAGS: PteFlags = PteFlags::PRESENT
    .union(PteFlags::WRITABLE)
    .union(PteFlags::USER);

/// Hardware Page Table Entry
#[derive(Clone, Copy, Default, PartialEq, Eq)]
#[repr(transparent)]
pub struct HardwarePte(u64);

impl HardwarePte {
    /// Create an empty (not present) PTE
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Create a PTE with the given physical address and flags
    pub const fn new(phys_addr: u64, flags: PteFlags) -> Self {
        Self((phys_addr & ADDR_MASK) | flags.bits())
    }

    pub fn set_raw(&mut self, value: u64) {
        self.0 = value;
    }

    pub fn flags(&self) -> PteFlags {
        PteFlags::from_bits_retain(self.0 & (PERMISSION_MASK | PteFlags::NO_EXECUTE.bits()))
    }

    /// Low 12 bits
    pub fn permission(&self) -> u64 {
        self.0 & PERMISSION_MASK
    }

    pub fn is_present(&self) -> bool {
        self.flags().contains(PteFlags::PRESENT)
    }

    pub fn is_writable(&self) -> bool {
        self.flags().contains(PteFlags::WRITABLE)
    }

    pub fn is_user(&self) -> bool {
        self.flags().contains(PteFlags::USER)
    }

    pub fn is_huge(&self) -> bool {
        self.flags().contains(PteFlags::HUGE_PAGE)
    }

    /// Get the physical address
    pub fn phys_addr(&self) -> PhysAddr {
        PhysAddr::new(self.0 & ADDR_MASK)
    }

    /// Physical address of `va` inside the `span` bytes this entry maps
    pub fn frame_for(&self, va: VirtAddr, span: u64) -> PhysAddr {
        let base = self.0 & ADDR_MASK & !(span - 1);
        PhysAddr::new(base + (va.as_u64() & (span - 1) & !(PAGE_SIZE - 1)))
    }

    /// Replace the permission field, keeping frame address and NX
    ///
    /// `huge` marks a 2MiB/1GiB entry, whose page size bit is kept set.
    pub fn set_permission(&mut self, bits: u64, huge: bool) -> MmResult<()> {
        if bits & !PERMISSION_MASK != 0 {
            return Err(MmError::InvalidPermission(bits));
        }
        let bits = if huge {
            bits | PteFlags::HUGE_PAGE.bits()
        } else {
            bits
        };
        self.0 = (self.0 & !PERMISSION_MASK) | bits;
        Ok(())
    }

    /// Point at a frame with the given flags
    pub fn set_present(&mut self, phys_addr: PhysAddr, flags: PteFlags) {
        self.0 = (phys_addr.as_u64() & ADDR_MASK) | (flags | PteFlags::PRESENT).bits();
    }

    pub fn clear(&mut self) {
        self.0 = 0;
    }
}

impl core::fmt::Debug for HardwarePte {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HardwarePte")
            .field("addr", &self.phys_addr())
            .field("flags", &self.flags())
            .finish()
    }
}

/// Page Table (array of 512 PTEs)
#[repr(C, align(4096))]
pub struct PageTable {
    pub entries: [HardwarePte; ENTRIES_PER_TABLE],
}

impl PageTable {
    pub const fn new() -> Self {
        Self {
            entries: [HardwarePte::empty(); ENTRIES_PER_TABLE],
        }
    }

    /// Clear all entries
    pub fn clear(&mut self) {
        for entry in self.entries.iter_mut() {
            entry.clear();
        }
    }
}

impl Default for PageTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Table index of `va` at `level` (4 = PML4, 1 = PT)
pub fn table_index(va: VirtAddr, level: u8) -> usize {
    ((va.as_u64() >> (12 + 9 * (level as u64 - 1))) & 0x1FF) as usize
}

/// Bytes covered by one entry at `level`
fn level_span(level: u8) -> u64 {
    1u64 << (12 + 9 * (level as u64 - 1))
}

/// Page tables reached through the kernel direct map
///
/// Table frames are accessed at `layout.kaddr(frame)`. Intermediate tables
/// created by `walk(.., true)` come from `allocator` and are zeroed before
/// being linked in. Allocation is never rolled back.
pub struct DirectMapSpace<A> {
    root: PhysFrame,
    layout: KernelLayout,
    allocator: A,
    live: bool,
}

impl<A: FrameAllocator<Size4KiB>> DirectMapSpace<A> {
    /// Wrap the page tables rooted at `root`
    ///
    /// # Safety
    /// `root` and every table frame reachable from it must be mapped at
    /// `layout.kaddr(frame)`, and the allocator must hand out unused frames
    /// that are also direct mapped.
    pub unsafe fn new(root: PhysFrame, layout: KernelLayout, allocator: A) -> Self {
        Self {
            root,
            layout,
            allocator,
            live: false,
        }
    }

    /// Wrap the page tables currently loaded in CR3
    ///
    /// Entry changes made through this space flush the TLB entry.
    ///
    /// # Safety
    /// Same contract as [`DirectMapSpace::new`], and must run in ring 0.
    #[cfg(target_arch = "x86_64")]
    pub unsafe fn active(layout: KernelLayout, allocator: A) -> Self {
        let (root, _) = x86_64::registers::control::Cr3::read();
        Self {
            root,
            layout,
            allocator,
            live: true,
        }
    }

    fn table(&self, frame: PhysAddr) -> MmResult<*mut PageTable> {
        Ok(self.layout.kaddr(frame)?.as_mut_ptr())
    }

    /// Read-only walk to the leaf entry and the span it maps
    fn lookup(&self, va: VirtAddr) -> MmResult<(HardwarePte, u64)> {
        let mut table = self.table(self.root.start_address())?;
        for level in (2..=4).rev() {
            let entry = unsafe { (*table).entries[table_index(va, level)] };
            if !entry.is_present() {
                return Err(MmError::NotMapped(va));
            }
            if level < 4 && entry.is_huge() {
                return Ok((entry, level_span(level)));
            }
            table = self.table(entry.phys_addr())?;
        }
        let leaf = unsafe { (*table).entries[table_index(va, 1)] };
        Ok((leaf, level_span(1)))
    }

    /// Translate a virtual address to a physical one
    pub fn translate(&self, va: VirtAddr) -> MmResult<PhysAddr> {
        let (entry, span) = self.lookup(va)?;
        if !entry.is_present() {
            return Err(MmError::NotMapped(va));
        }
        Ok(entry.frame_for(va, span) + (va.as_u64() & (PAGE_SIZE - 1)))
    }

    /// Walk down to the entry for `va` at `target` level (1 = PT)
    ///
    /// Stops early at a large page entry above `target`.
    fn descend(&mut self, va: VirtAddr, target: u8, create: bool) -> MmResult<Leaf<'_>> {
        let mut table = self.table(self.root.start_address())?;
        for level in (target + 1..=4).rev() {
            let entry = unsafe { &mut (*table).entries[table_index(va, level)] };
            if !entry.is_present() {
                if !create {
                    return Err(MmError::NotMapped(va));
                }
                let frame = self.allocator.allocate_frame().ok_or(MmError::NoMemory)?;
                let fresh = self.table(frame.start_address())?;
                unsafe { (*fresh).clear() };
                entry.set_present(frame.start_address(), TABLE_FLAGS);
                log::debug!(
                    "mm: level {} table for {:#x} at {:#x}",
                    level - 1,
                    va.as_u64(),
                    frame.start_address().as_u64()
                );
            } else if level < 4 && entry.is_huge() {
                return Ok(Leaf {
                    entry,
                    span: level_span(level),
                });
            }
            table = self.table(entry.phys_addr())?;
        }
        Ok(Leaf {
            entry: unsafe { &mut (*table).entries[table_index(va, target)] },
            span: level_span(target),
        })
    }

    /// Read one byte through the translation
    fn read_byte(&self, va: VirtAddr) -> MmResult<u8> {
        let alias = self.layout.kaddr(self.translate(va)?)?;
        Ok(unsafe { core::ptr::read_volatile(alias.as_ptr::<u8>()) })
    }
}

impl<A: FrameAllocator<Size4KiB>> AddressSpace for DirectMapSpace<A> {
    fn walk(&mut self, va: VirtAddr, create: bool) -> MmResult<Leaf<'_>> {
        self.descend(va, 1, create)
    }

    fn read_word(&self, va: VirtAddr) -> MmResult<u64> {
        if va.as_u64() & (PAGE_SIZE - 1) <= PAGE_SIZE - WORD_SIZE {
            let alias = self.layout.kaddr(self.translate(va)?)?;
            return Ok(unsafe { core::ptr::read_unaligned(alias.as_ptr::<u64>()) });
        }

        // Word straddles a page boundary
        let mut bytes = [0u8; WORD_SIZE as usize];
        for (i, byte) in bytes.iter_mut().enumerate() {
            let addr = va
                .as_u64()
                .checked_add(i as u64)
                .ok_or(MmError::NonCanonical(va.as_u64()))?;
            *byte = self.read_byte(super::virt(addr)?)?;
        }
        Ok(u64::from_le_bytes(bytes))
    }

    fn invalidate(&mut self, va: VirtAddr) {
        if self.live {
            flush_tlb(va);
        }
    }
}

#[cfg(target_arch = "x86_64")]
fn flush_tlb(va: VirtAddr) {
    x86_64::instructions::tlb::flush(va);
}

#[cfg(not(target_arch = "x86_64"))]
fn flush_tlb(_va: VirtAddr) {}
