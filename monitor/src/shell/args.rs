//! Command Line Tokenizer
//!
//! Splits a line into whitespace separated arguments. The arguments borrow
//! from the line; nothing is copied or rewritten.

use alloc::vec::Vec;
use core::fmt;

/// Characters that separate arguments
pub const WHITESPACE: [char; 4] = ['\t', '\r', '\n', ' '];

/// Line has more arguments than allowed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TooManyArgs {
    pub max: usize,
}

impl fmt::Display for TooManyArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Too many arguments (max {})", self.max)
    }
}

/// Split `line` into at most `max` arguments
///
/// An empty or all-whitespace line gives no arguments. Exceeding `max` is
/// an error; no partial list is returned.
pub fn split(line: &str, max: usize) -> Result<Vec<&str>, TooManyArgs> {
    let mut args = Vec::new();
    for token in line.split(|c: char| WHITESPACE.contains(&c)).filter(|t| !t.is_empty()) {
        if args.len() == max {
            return Err(TooManyArgs { max });
        }
        args.push(token);
    }
    Ok(args)
}
