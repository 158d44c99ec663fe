//! Nostalgia OS Kernel Monitor
//!
//! A small interactive debug console that runs inside the kernel, either at
//! boot or when a fault handler hands over a register snapshot.
//!
//! # Subsystems
//!
//! - **shell** - Console loop, tokenizer, command table
//! - **kd** - Kernel debugger pieces: frame-pointer unwinder, symbol lookup
//! - **mm** - Page table walker, mapping inspector/editor, memory dumps
//! - **ke** - Trap frame (fault snapshot) formatting
//! - **rtl** - Runtime library: numeral parsing
//! - **serial** - COM1 console and `log` backend (x86_64 only)
//!
//! # Entering the monitor
//!
//! ```text
//! fault handler / boot
//!        │
//!        ▼
//!   Monitor::run(tf) ──► read_line ──► shell::args::split ──► commands::lookup
//!                                                                  │
//!                    ┌──────────────┬───────────────┬──────────────┤
//!                    ▼              ▼               ▼              ▼
//!              kd::backtrace  mm::mapping      mm::dump      help/kerninfo
//! ```
//!
//! Every collaborator that touches hardware state is a trait
//! ([`mm::AddressSpace`], [`kd::SymbolResolver`], [`shell::Console`]), so
//! the whole monitor runs against test doubles on the host.

#![cfg_attr(not(test), no_std)]
#![allow(clippy::new_without_default)]
#![allow(clippy::result_unit_err)]

extern crate alloc;

pub mod arch;
pub mod kd;
pub mod ke;
pub mod mm;
pub mod rtl;
#[cfg(target_arch = "x86_64")]
pub mod serial;
pub mod shell;

#[cfg(test)]
mod testing;

pub use ke::TrapFrame;
pub use shell::{Console, Flow, Monitor, MonitorConfig, MonitorContext};

/// Enter the monitor with the default configuration
///
/// Returns once a command (`continue`) asks to leave the monitor.
pub fn monitor<C: Console>(console: C, ctx: MonitorContext<'_>, tf: Option<&TrapFrame>) {
    Monitor::new(console, ctx, MonitorConfig::default()).run(tf);
}
