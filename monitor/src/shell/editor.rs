//! Line Editor
//!
//! Assembles a command line one input byte at a time:
//! - Printable ASCII is appended and echoed
//! - Backspace / DEL erase the last character
//! - Escape sequences (arrow keys, etc.) are swallowed
//! - Ctrl+C cancels the current line, Ctrl+D signals end of input
//! - Enter completes the line

use alloc::string::String;
use core::fmt::{self, Write};

/// Maximum command line length
pub const MAX_CMD_LEN: usize = 256;

/// What a byte did to the line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    /// Line complete
    Line(String),
    /// Ctrl+C: line discarded
    Cancelled,
    /// Ctrl+D
    EndOfInput,
}

/// Line assembly state
pub struct LineEditor {
    buf: String,
    /// Bytes of an escape sequence still to swallow
    escape: u8,
}

impl LineEditor {
    pub const fn new() -> Self {
        Self {
            buf: String::new(),
            escape: 0,
        }
    }

    /// Feed one byte, echoing to `echo`
    pub fn feed(&mut self, c: u8, echo: &mut dyn Write) -> Result<Option<LineEvent>, fmt::Error> {
        if self.escape > 0 {
            self.escape -= 1;
            return Ok(None);
        }

        match c {
            // Enter - complete line
            b'\r' | b'\n' => {
                echo.write_str("\n")?;
                Ok(Some(LineEvent::Line(core::mem::take(&mut self.buf))))
            }

            // Backspace
            0x7F | 0x08 => {
                if self.buf.pop().is_some() {
                    // Erase character on screen: backspace, space, backspace
                    echo.write_str("\x08 \x08")?;
                }
                Ok(None)
            }

            // Escape sequences: ESC [ X
            0x1B => {
                self.escape = 2;
                Ok(None)
            }

            0x20..=0x7E => {
                if self.buf.len() < MAX_CMD_LEN - 1 {
                    self.buf.push(c as char);
                    echo.write_char(c as char)?;
                }
                Ok(None)
            }

            // Ctrl+C - cancel current line
            0x03 => {
                echo.write_str("^C\n")?;
                self.buf.clear();
                Ok(Some(LineEvent::Cancelled))
            }

            // Ctrl+D
            0x04 => {
                echo.write_str("\n")?;
                self.buf.clear();
                Ok(Some(LineEvent::EndOfInput))
            }

            // Tab and other control characters
            _ => Ok(None),
        }
    }
}
