//! Monitor Commands
//!
//! The command table and the handlers behind it. Handlers print through
//! `inv.out` and report problems as [`CommandError`]s, which the dispatcher
//! prints.

use core::fmt::Write;

use super::{CmdResult, CommandError, Flow, Invocation};
use crate::kd::{write_frame, Backtrace};
use crate::mm::{self, dump, MmError};

/// Command handler
pub type Handler = fn(&[&str], &mut Invocation<'_, '_>) -> CmdResult;

/// One monitor command
pub struct Command {
    pub name: &'static str,
    pub desc: &'static str,
    pub handler: Handler,
}

/// All commands, in `help` order
pub static COMMANDS: &[Command] = &[
    Command {
        name: "help",
        desc: "Display this list of commands",
        handler: mon_help,
    },
    Command {
        name: "kerninfo",
        desc: "Display information about the kernel",
        handler: mon_kerninfo,
    },
    Command {
        name: "backtrace",
        desc: "Display all the outstanding stack frames",
        handler: mon_backtrace,
    },
    Command {
        name: "showmappings",
        desc: "Display memory mappings",
        handler: mon_showmappings,
    },
    Command {
        name: "setPerm",
        desc: "Set permission of a virtual page",
        handler: mon_set_perm,
    },
    Command {
        name: "vvm",
        desc: "Dump contents of certain virtual memory",
        handler: mon_vvm,
    },
    Command {
        name: "vpm",
        desc: "Dump contents of certain physical memory",
        handler: mon_vpm,
    },
    Command {
        name: "continue",
        desc: "Leave the monitor and resume execution",
        handler: mon_continue,
    },
];

/// Find a command by exact name
pub fn lookup(name: &str) -> Option<&'static Command> {
    COMMANDS.iter().find(|cmd| cmd.name == name)
}

/// Fail with `usage` unless exactly `count` arguments (name included) were given
fn expect_args(args: &[&str], count: usize, usage: &'static str) -> Result<(), CommandError> {
    if args.len() == count {
        Ok(())
    } else {
        Err(CommandError::Usage(usage))
    }
}

pub fn mon_help(_args: &[&str], inv: &mut Invocation<'_, '_>) -> CmdResult {
    for cmd in COMMANDS {
        writeln!(inv.out, "{} - {}", cmd.name, cmd.desc)?;
    }
    Ok(Flow::Continue)
}

pub fn mon_kerninfo(_args: &[&str], inv: &mut Invocation<'_, '_>) -> CmdResult {
    let image = inv.ctx.image;
    writeln!(inv.out, "Special kernel symbols:")?;
    writeln!(inv.out, "  _start                  {:016x} (phys)", image.start.as_u64())?;
    for (name, va) in [
        ("entry", image.entry),
        ("etext", image.etext),
        ("edata", image.edata),
        ("end  ", image.end),
    ] {
        writeln!(
            inv.out,
            "  {}  {:016x} (virt)  {:016x} (phys)",
            name,
            va.as_u64(),
            image.phys(va)
        )?;
    }
    writeln!(inv.out, "Kernel executable memory footprint: {}KB", image.footprint_kb())?;
    Ok(Flow::Continue)
}

pub fn mon_backtrace(_args: &[&str], inv: &mut Invocation<'_, '_>) -> CmdResult {
    let fp = match inv.tf {
        Some(tf) => tf.rbp,
        None => (inv.ctx.frame_pointer)(),
    };

    writeln!(inv.out, "Stack backtrace:")?;
    for step in Backtrace::new(&*inv.ctx.space, fp, inv.config.backtrace_depth) {
        match step {
            Ok(frame) => write_frame(inv.out, &frame, inv.ctx.symbols)?,
            Err(e) => {
                log::warn!("backtrace: {}", e);
                writeln!(inv.out, "  {}", e)?;
            }
        }
    }
    Ok(Flow::Continue)
}

pub fn mon_showmappings(args: &[&str], inv: &mut Invocation<'_, '_>) -> CmdResult {
    expect_args(args, 3, "showmappings <begin-address> <end-address>")?;
    let begin = inv.number(args[1])?;
    let end = inv.number(args[2])?;
    writeln!(inv.out, "Got args: 0x{:016x} 0x{:016x}", begin, end)?;

    for page in mm::show_mappings(&mut *inv.ctx.space, begin, end) {
        let page = match page {
            Ok(page) => page,
            Err(e) => {
                log::warn!("showmappings: page walk failed: {}", e);
                writeln!(inv.out, "Page walk error!")?;
                return Err(e.into());
            }
        };
        write!(inv.out, "Virtual address : 0x{:016x} ", page.virt.as_u64())?;
        match page.frame() {
            Some(frame) => writeln!(
                inv.out,
                "Physical page : 0x{:016x} PTE_P {} PTE_U {} PTE_W {}",
                frame.as_u64(),
                page.entry.is_present() as u8,
                page.entry.is_user() as u8,
                page.entry.is_writable() as u8
            )?,
            None => writeln!(inv.out, "is not mapped")?,
        }
    }
    Ok(Flow::Continue)
}

pub fn mon_set_perm(args: &[&str], inv: &mut Invocation<'_, '_>) -> CmdResult {
    expect_args(args, 3, "setPerm <virtual-address> <permission>")?;
    let addr = inv.number(args[1])?;
    let bits = inv.number(args[2])?;

    let page = mm::set_permission(&mut *inv.ctx.space, addr, bits).map_err(|e| {
        log::warn!("setPerm: {:#x}: {}", addr, e);
        e
    })?;
    writeln!(
        inv.out,
        "Virtual address : 0x{:016x} permission 0x{:03x}",
        page.virt.as_u64(),
        page.entry.permission()
    )?;
    Ok(Flow::Continue)
}

/// Print one line per dumped word
fn print_words(out: &mut dyn Write, words: dump::Dump<'_>) -> CmdResult {
    for word in words {
        write!(out, "Value of 0x{:016x} is ", word.addr)?;
        match word.value {
            Ok(value) => writeln!(out, "0x{:016x}", value)?,
            Err(MmError::NotMapped(_)) => writeln!(out, "unmapped")?,
            Err(e) => writeln!(out, "unreadable ({})", e)?,
        }
    }
    Ok(Flow::Continue)
}

pub fn mon_vpm(args: &[&str], inv: &mut Invocation<'_, '_>) -> CmdResult {
    expect_args(args, 3, "vpm <physical-address> <num>")?;
    let start = inv.number(args[1])?;
    let count = inv.number(args[2])?;
    let words = dump::physical_words(&*inv.ctx.space, inv.ctx.layout, start, count);
    print_words(inv.out, words)
}

pub fn mon_vvm(args: &[&str], inv: &mut Invocation<'_, '_>) -> CmdResult {
    expect_args(args, 3, "vvm <virtual-address> <num>")?;
    let start = inv.number(args[1])?;
    let count = inv.number(args[2])?;
    let words = dump::virtual_words(&*inv.ctx.space, start, count);
    print_words(inv.out, words)
}

pub fn mon_continue(_args: &[&str], _inv: &mut Invocation<'_, '_>) -> CmdResult {
    Ok(Flow::Stop)
}
