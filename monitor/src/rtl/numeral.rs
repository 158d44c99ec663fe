//! Numeral Parsing
//!
//! Monitor arguments are unsigned machine words written either in decimal
//! or as `0x`-prefixed hexadecimal.
//!
//! Two parsers are provided:
//! - [`NumeralMode::Strict`] rejects empty tokens, invalid digits and
//!   values that do not fit in 64 bits.
//! - [`NumeralMode::Legacy`] reproduces the historical monitor parser: every
//!   character that is not `0`-`9` is taken as a lowercase hex letter
//!   (`c - 'a' + 10`), in any base, and the accumulator wraps. It never
//!   fails.

use core::fmt;

/// Which numeral parser the shell uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumeralMode {
    /// Validate digits and report errors
    Strict,
    /// Historical lenient parser, never fails
    Legacy,
}

impl Default for NumeralMode {
    fn default() -> Self {
        if cfg!(feature = "legacy-numerals") {
            NumeralMode::Legacy
        } else {
            NumeralMode::Strict
        }
    }
}

/// Numeral parse failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumeralError {
    /// Empty token, or a bare `0x` prefix
    Empty,
    /// Character that is not a digit of the base
    InvalidDigit { digit: char, position: usize },
    /// Value does not fit in a machine word
    Overflow,
}

impl fmt::Display for NumeralError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NumeralError::Empty => write!(f, "empty number"),
            NumeralError::InvalidDigit { digit, position } => {
                write!(f, "invalid digit '{}' at position {}", digit, position)
            }
            NumeralError::Overflow => write!(f, "number too large"),
        }
    }
}

/// Split off the `0x` prefix and pick the base
fn split_radix(token: &str) -> (u32, &str, usize) {
    match token.strip_prefix("0x") {
        Some(rest) => (16, rest, 2),
        None => (10, token, 0),
    }
}

/// Parse a numeral with the given mode
pub fn parse(token: &str, mode: NumeralMode) -> Result<u64, NumeralError> {
    match mode {
        NumeralMode::Strict => parse_strict(token),
        NumeralMode::Legacy => Ok(parse_legacy(token)),
    }
}

/// Parse a decimal or `0x` hexadecimal numeral, rejecting bad input
pub fn parse_strict(token: &str) -> Result<u64, NumeralError> {
    let (radix, digits, skipped) = split_radix(token);
    if digits.is_empty() {
        return Err(NumeralError::Empty);
    }

    let mut value: u64 = 0;
    for (i, c) in digits.char_indices() {
        let digit = c.to_digit(radix).ok_or(NumeralError::InvalidDigit {
            digit: c,
            position: skipped + i,
        })?;
        value = value
            .checked_mul(radix as u64)
            .and_then(|v| v.checked_add(digit as u64))
            .ok_or(NumeralError::Overflow)?;
    }
    Ok(value)
}

/// Historical lenient parser
///
/// Each byte contributes `b - '0'` when it sorts at or below `'9'` and
/// `b - 'a' + 10` otherwise, both as signed values. The accumulator wraps
/// on overflow.
pub fn parse_legacy(token: &str) -> u64 {
    let (radix, digits, _) = split_radix(token);
    let base = radix as u64;

    digits.bytes().fold(0u64, |acc, b| {
        let digit = if b <= b'9' {
            b as i64 - b'0' as i64
        } else {
            b as i64 - b'a' as i64 + 10
        };
        acc.wrapping_mul(base).wrapping_add(digit as u64)
    })
}
