//! Test doubles for the monitor's collaborators

use alloc::boxed::Box;
use alloc::collections::{BTreeMap, VecDeque};
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::fmt;
use x86_64::structures::paging::{FrameAllocator, PhysFrame, Size4KiB};
use x86_64::{PhysAddr, VirtAddr};

use crate::kd::SymbolResolver;
use crate::ke::TrapFrame;
use crate::mm::pte::PageTable;
use crate::mm::{
    AddressSpace, HardwarePte, KernelImage, KernelLayout, Leaf, MmError, MmResult, PteFlags,
    PAGE_SIZE,
};
use crate::shell::{Console, Monitor, MonitorConfig, MonitorContext};

/// Host heap used as "physical memory": frame address == pointer
pub const HOST_LAYOUT: KernelLayout = KernelLayout::new(VirtAddr::zero(), 1 << 47);

/// Frame allocator handing out leaked, zeroed page tables from the heap
#[derive(Default)]
pub struct HeapFrames {
    allocated: usize,
    limit: Option<usize>,
}

impl HeapFrames {
    pub fn allocated(&self) -> usize {
        self.allocated
    }

    pub fn set_limit(&mut self, limit: usize) {
        self.limit = Some(limit);
    }
}

unsafe impl FrameAllocator<Size4KiB> for HeapFrames {
    fn allocate_frame(&mut self) -> Option<PhysFrame<Size4KiB>> {
        if self.limit.is_some_and(|limit| self.allocated >= limit) {
            return None;
        }
        self.allocated += 1;
        let table: &'static mut PageTable = Box::leak(Box::new(PageTable::new()));
        PhysFrame::from_start_address(PhysAddr::new(table as *mut PageTable as u64)).ok()
    }
}

/// Single-level fake page table plus sparse physical memory
pub struct FakeSpace {
    leaves: BTreeMap<u64, HardwarePte>,
    memory: BTreeMap<u64, u64>,
    /// Make every allocating walk fail with `NoMemory`
    pub fail_walks: bool,
}

impl FakeSpace {
    pub fn new() -> Self {
        Self {
            leaves: BTreeMap::new(),
            memory: BTreeMap::new(),
            fail_walks: false,
        }
    }

    pub fn map(&mut self, va: u64, pa: u64, flags: PteFlags) {
        let mut pte = HardwarePte::empty();
        pte.set_present(PhysAddr::new(pa), flags);
        self.leaves.insert(va & !(PAGE_SIZE - 1), pte);
    }

    pub fn entry(&self, va: u64) -> HardwarePte {
        self.leaves
            .get(&(va & !(PAGE_SIZE - 1)))
            .copied()
            .unwrap_or_default()
    }

    /// Number of leaf entries with the present bit set
    pub fn present_count(&self) -> usize {
        self.leaves.values().filter(|pte| pte.is_present()).count()
    }

    pub fn write_phys(&mut self, pa: u64, value: u64) {
        self.memory.insert(pa, value);
    }

    /// Write a word at a mapped virtual address
    pub fn write_virt(&mut self, va: u64, value: u64) {
        let pte = self.entry(va);
        assert!(pte.is_present(), "write to unmapped {:#x}", va);
        self.write_phys(pte.phys_addr().as_u64() + (va & (PAGE_SIZE - 1)), value);
    }
}

impl AddressSpace for FakeSpace {
    fn walk(&mut self, va: VirtAddr, create: bool) -> MmResult<Leaf<'_>> {
        let page = va.align_down(PAGE_SIZE).as_u64();
        let entry = if create {
            if self.fail_walks {
                return Err(MmError::NoMemory);
            }
            self.leaves.entry(page).or_default()
        } else {
            self.leaves.get_mut(&page).ok_or(MmError::NotMapped(va))?
        };
        Ok(Leaf::base(entry))
    }

    fn read_word(&self, va: VirtAddr) -> MmResult<u64> {
        let pte = self.entry(va.as_u64());
        if !pte.is_present() {
            return Err(MmError::NotMapped(va));
        }
        let pa = pte.phys_addr().as_u64() + (va.as_u64() & (PAGE_SIZE - 1));
        Ok(self.memory.get(&pa).copied().unwrap_or(0))
    }
}

/// Console fed from a script; `None` entries simulate end-of-input
pub struct ScriptConsole {
    input: VecDeque<Option<String>>,
    pub output: String,
}

impl ScriptConsole {
    pub fn new(lines: &[Option<&str>]) -> Self {
        Self {
            input: lines.iter().map(|l| l.map(|s| s.to_string())).collect(),
            output: String::new(),
        }
    }

    pub fn lines(&self) -> Vec<&str> {
        self.output.lines().collect()
    }
}

impl fmt::Write for ScriptConsole {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.output.push_str(s);
        Ok(())
    }
}

impl Console for ScriptConsole {
    fn read_line(&mut self, prompt: &str) -> Option<String> {
        let line = self
            .input
            .pop_front()
            .expect("script ran out of input before the monitor exited");
        // Echo like a terminal would
        if let Some(line) = &line {
            self.output.push_str(prompt);
            self.output.push_str(line);
            self.output.push('\n');
        }
        line
    }
}

/// Kernel image used by monitor tests
pub fn test_image() -> KernelImage {
    KernelImage {
        start: PhysAddr::new(0x10_000c),
        entry: VirtAddr::new(0xFFFF_FFFF_8010_000c),
        etext: VirtAddr::new(0xFFFF_FFFF_8010_5000),
        edata: VirtAddr::new(0xFFFF_FFFF_8011_2000),
        end: VirtAddr::new(0xFFFF_FFFF_8011_4000),
        load_base: VirtAddr::new(0xFFFF_FFFF_8000_0000),
    }
}

pub fn no_frame_pointer() -> u64 {
    0
}

/// Monitor services backed by test doubles
pub fn test_context<'a>(
    space: &'a mut dyn AddressSpace,
    symbols: &'a dyn SymbolResolver,
    frame_pointer: fn() -> u64,
) -> MonitorContext<'a> {
    MonitorContext {
        frame_pointer,
        ..MonitorContext::new(space, symbols, KernelLayout::with_limit(0x1000_0000), test_image())
    }
}

/// Run a whole monitor session over a script and return the console
pub fn run_script<'a>(
    space: &'a mut dyn AddressSpace,
    symbols: &'a dyn SymbolResolver,
    frame_pointer: fn() -> u64,
    lines: &[Option<&str>],
    tf: Option<&TrapFrame>,
) -> ScriptConsole {
    let console = ScriptConsole::new(lines);
    let ctx = test_context(space, symbols, frame_pointer);
    let mut monitor = Monitor::new(console, ctx, MonitorConfig::default());
    monitor.run(tf);
    monitor.into_console()
}
