//! Kernel Monitor Shell
//!
//! The command loop of the monitor:
//! - Prints a banner and, when entered from a fault, the trap frame
//! - Reads a line, splits it into arguments and runs the matching command
//! - Keeps going until a command returns [`Flow::Stop`]
//!
//! Command errors (bad arguments, unmapped memory, ...) are printed and the
//! loop continues.

pub mod args;
pub mod commands;
pub mod editor;

use alloc::string::String;
use core::fmt::{self, Write};

use crate::kd::SymbolResolver;
use crate::ke::TrapFrame;
use crate::mm::{AddressSpace, KernelImage, KernelLayout, MmError};
use crate::rtl::{NumeralError, NumeralMode};
use args::TooManyArgs;

/// Default prompt
pub const DEFAULT_PROMPT: &str = "K> ";

/// Maximum number of arguments, command name included
pub const MAX_ARGS: usize = 16;

/// Default limit on frames printed by `backtrace`
pub const MAX_BACKTRACE_DEPTH: usize = 64;

/// Character console the monitor talks through
pub trait Console: Write {
    /// Print `prompt` and block for one line of input
    ///
    /// `None` means no line was available; the monitor asks again.
    fn read_line(&mut self, prompt: &str) -> Option<String>;
}

/// What the loop does after a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// Leave the monitor
    Stop,
}

/// Command failure, reported to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandError {
    /// Wrong argument count; holds the usage line
    Usage(&'static str),
    Numeral(NumeralError),
    Mm(MmError),
    TooManyArgs(TooManyArgs),
    /// Console write failed
    Output,
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::Usage(usage) => write!(f, "Usage : {}", usage),
            CommandError::Numeral(e) => write!(f, "Bad number: {}", e),
            CommandError::Mm(e) => write!(f, "Error: {}", e),
            CommandError::TooManyArgs(e) => write!(f, "{}", e),
            CommandError::Output => write!(f, "console write failed"),
        }
    }
}

impl From<NumeralError> for CommandError {
    fn from(e: NumeralError) -> Self {
        CommandError::Numeral(e)
    }
}

impl From<MmError> for CommandError {
    fn from(e: MmError) -> Self {
        CommandError::Mm(e)
    }
}

impl From<TooManyArgs> for CommandError {
    fn from(e: TooManyArgs) -> Self {
        CommandError::TooManyArgs(e)
    }
}

impl From<fmt::Error> for CommandError {
    fn from(_: fmt::Error) -> Self {
        CommandError::Output
    }
}

/// Result of a command handler
pub type CmdResult = Result<Flow, CommandError>;

/// Monitor settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorConfig {
    pub prompt: &'static str,
    pub max_args: usize,
    pub numerals: NumeralMode,
    pub backtrace_depth: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            prompt: DEFAULT_PROMPT,
            max_args: MAX_ARGS,
            numerals: NumeralMode::default(),
            backtrace_depth: MAX_BACKTRACE_DEPTH,
        }
    }
}

/// Kernel services the commands operate on
pub struct MonitorContext<'a> {
    pub space: &'a mut dyn AddressSpace,
    pub symbols: &'a dyn SymbolResolver,
    pub layout: KernelLayout,
    pub image: KernelImage,
    /// Frame pointer to unwind from when there is no trap frame
    pub frame_pointer: fn() -> u64,
}

impl<'a> MonitorContext<'a> {
    /// Context that unwinds from the monitor's own frame when there is no
    /// trap frame
    pub fn new(
        space: &'a mut dyn AddressSpace,
        symbols: &'a dyn SymbolResolver,
        layout: KernelLayout,
        image: KernelImage,
    ) -> Self {
        Self {
            space,
            symbols,
            layout,
            image,
            frame_pointer: crate::arch::read_frame_pointer,
        }
    }
}

/// Everything a command handler can reach
pub struct Invocation<'i, 'a> {
    pub out: &'i mut dyn Write,
    pub ctx: &'i mut MonitorContext<'a>,
    pub config: &'i MonitorConfig,
    pub tf: Option<&'i TrapFrame>,
}

impl Invocation<'_, '_> {
    /// Parse a numeric argument with the configured numeral mode
    pub fn number(&self, token: &str) -> Result<u64, CommandError> {
        Ok(crate::rtl::parse(token, self.config.numerals)?)
    }
}

/// Run the command named by `args[0]`
///
/// Unknown commands and handler errors are reported on `inv.out`; only a
/// handler's `Flow::Stop` ends the loop.
pub fn dispatch(args: &[&str], inv: &mut Invocation<'_, '_>) -> Flow {
    let Some(&name) = args.first() else {
        return Flow::Continue;
    };

    let Some(command) = commands::lookup(name) else {
        log::debug!("monitor: unknown command {}", name);
        let _ = writeln!(inv.out, "Unknown command '{}'", name);
        return Flow::Continue;
    };

    match (command.handler)(args, inv) {
        Ok(flow) => flow,
        Err(e) => {
            log::debug!("monitor: {} failed: {:?}", name, e);
            let _ = writeln!(inv.out, "{}", e);
            Flow::Continue
        }
    }
}

/// The monitor: console, kernel services and settings
pub struct Monitor<'a, C> {
    console: C,
    ctx: MonitorContext<'a>,
    config: MonitorConfig,
}

impl<'a, C: Console> Monitor<'a, C> {
    pub fn new(console: C, ctx: MonitorContext<'a>, config: MonitorConfig) -> Self {
        Self {
            console,
            ctx,
            config,
        }
    }

    pub fn into_console(self) -> C {
        self.console
    }

    /// Parse and run one command line
    pub fn execute(&mut self, line: &str, tf: Option<&TrapFrame>) -> Flow {
        let args = match args::split(line, self.config.max_args) {
            Ok(args) => args,
            Err(e) => {
                let _ = writeln!(self.console, "{}", e);
                return Flow::Continue;
            }
        };

        let mut inv = Invocation {
            out: &mut self.console,
            ctx: &mut self.ctx,
            config: &self.config,
            tf,
        };
        dispatch(&args, &mut inv)
    }

    /// Run the monitor until a command asks to leave
    pub fn run(&mut self, tf: Option<&TrapFrame>) {
        let _ = writeln!(self.console, "Welcome to the kernel monitor!");
        let _ = writeln!(self.console, "Type 'help' for a list of commands.");

        if let Some(tf) = tf {
            let _ = write!(self.console, "{}", tf);
        }

        loop {
            let Some(line) = self.console.read_line(self.config.prompt) else {
                continue;
            };
            if self.execute(&line, tf) == Flow::Stop {
                log::debug!("monitor: leaving");
                break;
            }
        }
    }
}
