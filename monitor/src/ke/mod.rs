//! Kernel Executive Support
//!
//! Processor state handed to the monitor on fault entry.

pub mod trap;

pub use trap::{exception_name, TrapFrame};
