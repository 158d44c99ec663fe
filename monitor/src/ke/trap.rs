//! Trap Frame
//!
//! Register snapshot pushed by the fault entry stubs. The layout matches
//! the push order of the common entry path: general registers (r15 first),
//! then vector and error code, then the hardware interrupt frame.

use core::fmt;

/// Processor exception names, indexed by vector
static EXCEPTION_NAMES: [&str; 22] = [
    "Divide Error",
    "Debug",
    "Non-Maskable Interrupt",
    "Breakpoint",
    "Overflow",
    "BOUND Range Exceeded",
    "Invalid Opcode",
    "Device Not Available",
    "Double Fault",
    "Coprocessor Segment Overrun",
    "Invalid TSS",
    "Segment Not Present",
    "Stack Fault",
    "General Protection",
    "Page Fault",
    "(unknown trap)",
    "x87 FPU Floating-Point Error",
    "Alignment Check",
    "Machine-Check",
    "SIMD Floating-Point Exception",
    "Virtualization Exception",
    "Control Protection Exception",
];

/// First vector used for hardware interrupts
pub const IRQ_BASE: u64 = 32;

/// Human readable name of a trap vector
pub fn exception_name(vector: u64) -> &'static str {
    match vector {
        v if (v as usize) < EXCEPTION_NAMES.len() => EXCEPTION_NAMES[v as usize],
        v if (IRQ_BASE..IRQ_BASE + 16).contains(&v) => "Hardware Interrupt",
        _ => "(unknown trap)",
    }
}

/// Register state at the point the monitor was entered from a fault
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrapFrame {
    pub r15: u64,
    pub r14: u64,
    pub r13: u64,
    pub r12: u64,
    pub r11: u64,
    pub r10: u64,
    pub r9: u64,
    pub r8: u64,
    pub rbp: u64,
    pub rdi: u64,
    pub rsi: u64,
    pub rdx: u64,
    pub rcx: u64,
    pub rbx: u64,
    pub rax: u64,

    pub vector: u64,
    pub error_code: u64,

    // Pushed by the processor
    pub rip: u64,
    pub cs: u64,
    pub rflags: u64,
    pub rsp: u64,
    pub ss: u64,
}

impl TrapFrame {
    /// Trap came from user mode (CPL 3)
    pub fn from_user(&self) -> bool {
        self.cs & 3 == 3
    }
}

impl fmt::Display for TrapFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "TRAP frame at {:p}", self)?;
        let regs = [
            ("rax", self.rax),
            ("rbx", self.rbx),
            ("rcx", self.rcx),
            ("rdx", self.rdx),
            ("rsi", self.rsi),
            ("rdi", self.rdi),
            ("rbp", self.rbp),
            ("r8 ", self.r8),
            ("r9 ", self.r9),
            ("r10", self.r10),
            ("r11", self.r11),
            ("r12", self.r12),
            ("r13", self.r13),
            ("r14", self.r14),
            ("r15", self.r15),
        ];
        for (name, value) in regs {
            writeln!(f, "  {}  0x{:016x}", name, value)?;
        }
        writeln!(f, "  trap 0x{:08x} {}", self.vector, exception_name(self.vector))?;
        writeln!(f, "  err  0x{:08x}", self.error_code)?;
        writeln!(f, "  rip  0x{:016x}", self.rip)?;
        writeln!(
            f,
            "  cs   0x----{:04x} {}",
            self.cs,
            if self.from_user() { "(user)" } else { "(kernel)" }
        )?;
        writeln!(f, "  flag 0x{:016x}", self.rflags)?;
        writeln!(f, "  rsp  0x{:016x}", self.rsp)?;
        writeln!(f, "  ss   0x----{:04x}", self.ss)
    }
}
