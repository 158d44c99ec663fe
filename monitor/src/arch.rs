//! Architecture helpers used by the monitor

/// Read the current frame pointer (RBP)
///
/// Only meaningful when the kernel is built with frame pointers
/// (`-Cforce-frame-pointers=yes`).
#[cfg(target_arch = "x86_64")]
#[inline(always)]
pub fn read_frame_pointer() -> u64 {
    let rbp: u64;
    unsafe {
        core::arch::asm!("mov {}, rbp", out(reg) rbp, options(nomem, nostack, preserves_flags));
    }
    rbp
}

/// Frame pointers are not walked on other architectures
#[cfg(not(target_arch = "x86_64"))]
#[inline(always)]
pub fn read_frame_pointer() -> u64 {
    0
}
