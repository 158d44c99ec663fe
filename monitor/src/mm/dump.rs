//! Memory Dumps
//!
//! `vvm` reads words at virtual addresses through the active address space.
//! `vpm` reads words at physical addresses through their direct-map alias.
//! Both produce exactly `count` results; a word that cannot be read (not
//! mapped, outside the direct map, ...) is an `Err` in place of its value.
//! The start address need not be word aligned.

use super::{AddressSpace, KernelLayout, MmResult, WORD_SIZE};

/// One dumped word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DumpedWord {
    /// Address as given by the user (virtual or physical)
    pub addr: u64,
    pub value: MmResult<u64>,
}

/// Which address space the start address lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpMode {
    Virtual,
    Physical(KernelLayout),
}

/// Iterator over `count` consecutive words
pub struct Dump<'s> {
    space: &'s dyn AddressSpace,
    mode: DumpMode,
    start: u64,
    index: u64,
    count: u64,
}

impl Dump<'_> {
    fn read(&self, addr: u64) -> MmResult<u64> {
        let va = match self.mode {
            DumpMode::Virtual => super::virt(addr)?,
            DumpMode::Physical(layout) => layout.kaddr(super::phys(addr)?)?,
        };
        self.space.read_word(va)
    }
}

impl Iterator for Dump<'_> {
    type Item = DumpedWord;

    fn next(&mut self) -> Option<DumpedWord> {
        if self.index >= self.count {
            return None;
        }
        let offset = self.index.wrapping_mul(WORD_SIZE);
        self.index += 1;

        let addr = self.start.wrapping_add(offset);
        let value = self.read(addr);
        Some(DumpedWord { addr, value })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = (self.count - self.index) as usize;
        (left, Some(left))
    }
}

/// Dump `count` words starting at virtual address `start`
pub fn virtual_words(space: &dyn AddressSpace, start: u64, count: u64) -> Dump<'_> {
    Dump {
        space,
        mode: DumpMode::Virtual,
        start,
        index: 0,
        count,
    }
}

/// Dump `count` words starting at physical address `start`
pub fn physical_words(
    space: &dyn AddressSpace,
    layout: KernelLayout,
    start: u64,
    count: u64,
) -> Dump<'_> {
    Dump {
        space,
        mode: DumpMode::Physical(layout),
        start,
        index: 0,
        count,
    }
}
