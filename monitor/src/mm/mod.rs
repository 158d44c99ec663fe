//! Memory Manager Interface
//!
//! The monitor never dereferences kernel addresses directly. Everything goes
//! through an [`AddressSpace`]:
//! - `walk` finds (or creates) the leaf page table entry for a virtual page
//! - `read_word` reads one machine word through the translation
//!
//! [`pte::DirectMapSpace`] implements this for live x86_64 page tables
//! reached through the kernel's direct map of physical memory.
//!
//! # Modules
//! - `pte` - Hardware PTE format and the 4-level walker
//! - `layout` - Direct map and kernel image addresses
//! - `mapping` - showmappings / setPerm
//! - `dump` - Physical and virtual word dumps

pub mod dump;
pub mod layout;
pub mod mapping;
pub mod pte;

pub use layout::{KernelImage, KernelLayout, KERNBASE};
pub use mapping::{set_permission, show_mappings, PageMapping};
pub use pte::{DirectMapSpace, HardwarePte, PteFlags};

use core::fmt;
use x86_64::structures::paging::{PageSize, Size4KiB};
use x86_64::{PhysAddr, VirtAddr};

/// Size of a base page
pub const PAGE_SIZE: u64 = Size4KiB::SIZE;

/// Size of a machine word read by the dump commands
pub const WORD_SIZE: u64 = core::mem::size_of::<u64>() as u64;

/// Memory manager errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MmError {
    /// No frame available for an intermediate page table
    NoMemory,
    /// Address has no present translation
    NotMapped(VirtAddr),
    /// Address is outside the canonical 48-bit range
    NonCanonical(u64),
    /// Physical address is beyond the direct map
    PhysOutOfRange(u64),
    /// Virtual address is not inside the direct map
    NotDirectMapped(VirtAddr),
    /// Permission value does not fit in the low 12 bits
    InvalidPermission(u64),
}

impl fmt::Display for MmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MmError::NoMemory => write!(f, "out of memory for page table"),
            MmError::NotMapped(va) => write!(f, "{:#x} is not mapped", va.as_u64()),
            MmError::NonCanonical(addr) => write!(f, "{:#x} is not a canonical address", addr),
            MmError::PhysOutOfRange(pa) => {
                write!(f, "physical address {:#x} is outside the direct map", pa)
            }
            MmError::NotDirectMapped(va) => {
                write!(f, "{:#x} is not a direct-mapped address", va.as_u64())
            }
            MmError::InvalidPermission(bits) => {
                write!(f, "permission {:#x} does not fit in 12 bits", bits)
            }
        }
    }
}

/// Result type for memory manager operations
pub type MmResult<T> = Result<T, MmError>;

/// Leaf entry reached by a page walk
///
/// A walk ends early at a 2MiB or 1GiB entry; `span` says how much of the
/// address space `entry` maps.
#[derive(Debug)]
pub struct Leaf<'s> {
    pub entry: &'s mut HardwarePte,
    pub span: u64,
}

impl<'s> Leaf<'s> {
    /// Base page sized leaf
    pub fn base(entry: &'s mut HardwarePte) -> Self {
        Self {
            entry,
            span: PAGE_SIZE,
        }
    }

    /// Entry has the page size bit set and maps a large page
    pub fn is_huge(&self) -> bool {
        self.span > PAGE_SIZE
    }
}

/// Access to the address space the monitor inspects
pub trait AddressSpace {
    /// Walk to the leaf entry mapping `va`
    ///
    /// With `create` set, missing intermediate tables are allocated and the
    /// walk only fails when allocation does. Without it, a missing
    /// intermediate table is `MmError::NotMapped`.
    fn walk(&mut self, va: VirtAddr, create: bool) -> MmResult<Leaf<'_>>;

    /// Read one machine word through the current translation
    ///
    /// `va` need not be aligned; a word straddling two pages needs both
    /// mapped. Fails with `MmError::NotMapped` instead of faulting.
    fn read_word(&self, va: VirtAddr) -> MmResult<u64>;

    /// Drop any cached translation for `va` after its entry changed
    fn invalidate(&mut self, _va: VirtAddr) {}
}

/// Checked conversion of a raw virtual address
pub fn virt(addr: u64) -> MmResult<VirtAddr> {
    VirtAddr::try_new(addr).map_err(|_| MmError::NonCanonical(addr))
}

/// Checked conversion of a raw physical address
pub fn phys(addr: u64) -> MmResult<PhysAddr> {
    PhysAddr::try_new(addr).map_err(|_| MmError::PhysOutOfRange(addr))
}
