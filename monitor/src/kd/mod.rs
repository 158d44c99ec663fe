//! Kernel Debugger (KD) Support
//!
//! The pieces of the debugger the monitor needs:
//! - Frame-pointer stack unwinding
//! - Symbol lookup by instruction address
//!
//! # Stack Frame Layout (x86_64, frame pointers enabled)
//!
//! ```text
//!            ┌──────────────────┐ higher addresses
//! rbp + 48   │ arg 5            │
//!   ...      │ ...              │
//! rbp + 16   │ arg 1            │
//! rbp + 8    │ return address   │
//! rbp ──────►│ saved rbp        │──► caller's frame
//!            └──────────────────┘ lower addresses
//! ```

pub mod backtrace;
pub mod symbols;

pub use backtrace::{write_frame, Backtrace, Frame, UnwindError, FRAME_ARGS};
pub use symbols::{LineEntry, NoSymbols, SymbolEntry, SymbolInfo, SymbolResolver, SymbolTable};
