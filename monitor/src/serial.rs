//! Serial console
//!
//! COM1 (0x3F8) as the monitor's console and as the `log` backend. The port
//! is assumed to be initialized by the boot loader.

use alloc::string::String;
use core::fmt::{self, Write};
use spin::Mutex;
use x86_64::instructions::port::Port;

use crate::shell::editor::{LineEditor, LineEvent};
use crate::shell::Console;

/// COM1 port address
const COM1: u16 = 0x3F8;

/// Line status register offset
const LSR: u16 = 5;

/// LSR: receive buffer holds a byte
const LSR_DATA_READY: u8 = 0x01;

/// LSR: transmit holding register empty
const LSR_THR_EMPTY: u8 = 0x20;

/// Serial port writer
pub struct SerialWriter {
    base: u16,
}

impl SerialWriter {
    pub const fn new(base: u16) -> Self {
        Self { base }
    }

    fn line_status(&self) -> u8 {
        let mut lsr: Port<u8> = Port::new(self.base + LSR);
        unsafe { lsr.read() }
    }

    /// Write a byte, spinning until the transmitter is free
    fn write_byte(&mut self, byte: u8) {
        while self.line_status() & LSR_THR_EMPTY == 0 {
            core::hint::spin_loop();
        }
        let mut data: Port<u8> = Port::new(self.base);
        unsafe { data.write(byte) }
    }

    /// Read a byte if one has arrived
    fn try_read_byte(&mut self) -> Option<u8> {
        if self.line_status() & LSR_DATA_READY == 0 {
            return None;
        }
        let mut data: Port<u8> = Port::new(self.base);
        Some(unsafe { data.read() })
    }
}

impl Write for SerialWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            if byte == b'\n' {
                self.write_byte(b'\r');
            }
            self.write_byte(byte);
        }
        Ok(())
    }
}

/// Global COM1 writer
static WRITER: Mutex<SerialWriter> = Mutex::new(SerialWriter::new(COM1));

/// Print to serial port
pub fn _print(args: fmt::Arguments) {
    // Serial writes cannot fail
    let _ = WRITER.lock().write_fmt(args);
}

/// Print macro for serial output
#[macro_export]
macro_rules! serial_print {
    ($($arg:tt)*) => ($crate::serial::_print(format_args!($($arg)*)));
}

/// Print with newline macro for serial output
#[macro_export]
macro_rules! serial_println {
    () => ($crate::serial_print!("\n"));
    ($($arg:tt)*) => ($crate::serial_print!("{}\n", format_args!($($arg)*)));
}

/// Polled COM1 console for the monitor
///
/// Each call locks the global writer, so log output and monitor output
/// never interleave within a write.
pub struct SerialConsole {
    editor: LineEditor,
}

impl SerialConsole {
    pub const fn new() -> Self {
        Self {
            editor: LineEditor::new(),
        }
    }
}

impl Write for SerialConsole {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        WRITER.lock().write_str(s)
    }
}

impl Console for SerialConsole {
    fn read_line(&mut self, prompt: &str) -> Option<String> {
        let mut port = WRITER.lock();
        port.write_str(prompt).ok()?;
        loop {
            let Some(byte) = port.try_read_byte() else {
                core::hint::spin_loop();
                continue;
            };
            match self.editor.feed(byte, &mut *port).ok()? {
                None => {}
                Some(LineEvent::Line(line)) => return Some(line),
                Some(LineEvent::Cancelled) => port.write_str(prompt).ok()?,
                Some(LineEvent::EndOfInput) => return None,
            }
        }
    }
}

/// `log` backend writing to COM1
pub struct SerialLogger;

impl log::Log for SerialLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record) {
        if self.enabled(record.metadata()) {
            _print(format_args!("[{:>5}] {}\n", record.level(), record.args()));
        }
    }

    fn flush(&self) {}
}

static LOGGER: SerialLogger = SerialLogger;

/// Route `log` output to COM1
///
/// Fails if another logger was installed first.
pub fn init_logger(level: log::LevelFilter) -> Result<(), log::SetLoggerError> {
    log::set_logger(&LOGGER)?;
    log::set_max_level(level);
    Ok(())
}

/// Enter the monitor on COM1
pub fn run_monitor(ctx: crate::MonitorContext<'_>, tf: Option<&crate::TrapFrame>) {
    log::info!("monitor: entering on COM1");
    crate::monitor(SerialConsole::new(), ctx, tf);
}
