//! Runtime Library
//!
//! Small, dependency-free helpers shared by the monitor commands.

pub mod numeral;

pub use numeral::{parse, NumeralError, NumeralMode};
