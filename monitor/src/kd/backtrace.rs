//! Stack Backtrace
//!
//! Walks the saved frame-pointer chain starting at a given `rbp`. Stack
//! words are read through [`AddressSpace::read_word`], so a bad pointer
//! ends the walk with an error instead of faulting.
//!
//! The walk stops normally at a zero frame pointer. It stops with an
//! [`UnwindError`] when:
//! - a stack word cannot be read
//! - the saved frame pointer does not move towards the stack base
//!   (stacks grow down, so each caller frame sits at a higher address)
//! - `max_depth` frames have been produced

use core::fmt;

use super::symbols::SymbolResolver;
use crate::mm::{AddressSpace, MmError, WORD_SIZE};

/// Raw argument words shown per frame
pub const FRAME_ARGS: usize = 5;

/// One frame of the call chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    pub frame_pointer: u64,
    pub return_address: u64,
    /// Words above the return address; not necessarily real arguments
    pub args: [u64; FRAME_ARGS],
}

/// Reason the walk ended early
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnwindError {
    /// A stack word could not be read
    Unreadable { address: u64, error: MmError },
    /// Saved frame pointer is at or below the current frame
    NotAscending { frame: u64, next: u64 },
    /// Chain is longer than the configured limit
    DepthExceeded(usize),
}

impl fmt::Display for UnwindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnwindError::Unreadable { address, error } => {
                write!(f, "cannot read stack at {:#x}: {}", address, error)
            }
            UnwindError::NotAscending { frame, next } => {
                write!(f, "corrupt frame chain: {:#x} -> {:#x}", frame, next)
            }
            UnwindError::DepthExceeded(depth) => {
                write!(f, "frame chain deeper than {} frames, stopping", depth)
            }
        }
    }
}

enum State {
    Walking(u64),
    Failed(UnwindError),
    Done,
}

/// Iterator over the frames of a call chain, innermost first
pub struct Backtrace<'a, S: ?Sized> {
    space: &'a S,
    state: State,
    depth: usize,
    max_depth: usize,
}

impl<'a, S: AddressSpace + ?Sized> Backtrace<'a, S> {
    pub fn new(space: &'a S, frame_pointer: u64, max_depth: usize) -> Self {
        Self {
            space,
            state: State::Walking(frame_pointer),
            depth: 0,
            max_depth,
        }
    }

    fn read(&self, frame: u64, slot: u64) -> Result<u64, UnwindError> {
        let address = frame.wrapping_add(slot * WORD_SIZE);
        let unreadable = |error| UnwindError::Unreadable { address, error };
        if address < frame {
            return Err(unreadable(MmError::NonCanonical(address)));
        }
        let va = crate::mm::virt(address).map_err(unreadable)?;
        self.space.read_word(va).map_err(unreadable)
    }

    fn unwind_one(&self, fp: u64) -> Result<(Frame, u64), UnwindError> {
        let next = self.read(fp, 0)?;
        let return_address = self.read(fp, 1)?;
        let mut args = [0u64; FRAME_ARGS];
        for (i, arg) in args.iter_mut().enumerate() {
            *arg = self.read(fp, 2 + i as u64)?;
        }
        let frame = Frame {
            frame_pointer: fp,
            return_address,
            args,
        };
        Ok((frame, next))
    }
}

impl<S: AddressSpace + ?Sized> Iterator for Backtrace<'_, S> {
    type Item = Result<Frame, UnwindError>;

    fn next(&mut self) -> Option<Self::Item> {
        match core::mem::replace(&mut self.state, State::Done) {
            State::Done | State::Walking(0) => None,
            State::Failed(err) => Some(Err(err)),
            State::Walking(fp) => {
                if self.depth == self.max_depth {
                    return Some(Err(UnwindError::DepthExceeded(self.max_depth)));
                }
                self.depth += 1;
                match self.unwind_one(fp) {
                    Ok((frame, next)) => {
                        self.state = if next == 0 || next > fp {
                            State::Walking(next)
                        } else {
                            State::Failed(UnwindError::NotAscending { frame: fp, next })
                        };
                        Some(Ok(frame))
                    }
                    Err(err) => Some(Err(err)),
                }
            }
        }
    }
}

/// Print one frame and its symbol the way `backtrace` shows it
///
/// ```text
///   rbp ffff80000010ff80  rip ffffffff80101a2c  args 0000000000000001 ...
///          kern/init.rs:42: kernel_main+44
/// ```
pub fn write_frame(
    out: &mut dyn fmt::Write,
    frame: &Frame,
    symbols: &dyn SymbolResolver,
) -> fmt::Result {
    write!(
        out,
        "  rbp {:016x}  rip {:016x}  args",
        frame.frame_pointer, frame.return_address
    )?;
    for arg in frame.args {
        write!(out, " {:016x}", arg)?;
    }
    writeln!(out)?;

    match symbols.resolve(frame.return_address) {
        Some(info) => writeln!(
            out,
            "         {}:{}: {}+{}",
            info.file,
            info.line,
            info.name,
            info.offset(frame.return_address)
        ),
        None => writeln!(out, "         <unknown>:0: <unknown>+0"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kd::symbols::{NoSymbols, SymbolEntry, SymbolTable};
    use crate::mm::PteFlags;
    use crate::testing::FakeSpace;
    use alloc::string::String;
    use alloc::vec::Vec;

    const STACK: u64 = 0x7000_0000;

    /// Lay out frames at the given addresses, each linking to the next
    fn build_chain(frames: &[(u64, u64)]) -> FakeSpace {
        let mut space = FakeSpace::new();
        space.map(STACK, 0x20_0000, PteFlags::WRITABLE);
        for (i, &(fp, ret)) in frames.iter().enumerate() {
            let next = frames.get(i + 1).map_or(0, |f| f.0);
            space.write_virt(fp, next);
            space.write_virt(fp + 8, ret);
            for arg in 0..FRAME_ARGS as u64 {
                space.write_virt(fp + 16 + arg * 8, (i as u64) * 10 + arg);
            }
        }
        space
    }

    #[test]
    fn test_three_frames_innermost_first() {
        let chain = [(STACK + 0x100, 0x1010), (STACK + 0x200, 0x1050), (STACK + 0x300, 0x9999)];
        let space = build_chain(&chain);

        let frames: Vec<Frame> = Backtrace::new(&space, STACK + 0x100, 64)
            .map(|f| f.unwrap())
            .collect();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].frame_pointer, STACK + 0x100);
        assert_eq!(frames[0].return_address, 0x1010);
        assert_eq!(frames[1].args, [10, 11, 12, 13, 14]);
        assert_eq!(frames[2].frame_pointer, STACK + 0x300);
    }

    #[test]
    fn test_zero_frame_pointer_is_empty() {
        let space = FakeSpace::new();
        assert_eq!(Backtrace::new(&space, 0, 64).count(), 0);
    }

    #[test]
    fn test_cycle_is_reported() {
        let mut space = build_chain(&[(STACK + 0x100, 0x1010), (STACK + 0x200, 0x1050)]);
        // Second frame points back at the first
        space.write_virt(STACK + 0x200, STACK + 0x100);

        let steps: Vec<_> = Backtrace::new(&space, STACK + 0x100, 64).collect();
        assert_eq!(steps.len(), 3);
        assert!(steps[0].is_ok() && steps[1].is_ok());
        assert_eq!(
            steps[2],
            Err(UnwindError::NotAscending { frame: STACK + 0x200, next: STACK + 0x100 })
        );
    }

    #[test]
    fn test_depth_limit() {
        let chain: Vec<_> = (1..=10).map(|i| (STACK + i * 0x80, 0x1000 + i)).collect();
        let space = build_chain(&chain);

        let steps: Vec<_> = Backtrace::new(&space, STACK + 0x80, 4).collect();
        assert_eq!(steps.len(), 5);
        assert_eq!(steps[4], Err(UnwindError::DepthExceeded(4)));
    }

    #[test]
    fn test_unreadable_stack() {
        let space = build_chain(&[(STACK + 0x100, 0x1010)]);
        let steps: Vec<_> = Backtrace::new(&space, 0x6000_0000, 64).collect();
        assert_eq!(steps.len(), 1);
        assert!(matches!(
            steps[0],
            Err(UnwindError::Unreadable { address: 0x6000_0000, error: MmError::NotMapped(_) })
        ));
    }

    #[test]
    fn test_write_frame_symbols() {
        static FUNCS: [SymbolEntry; 1] = [SymbolEntry {
            start: 0x1000,
            size: 0x100,
            name: "kernel_main",
            file: "kern/init.rs",
            line: 42,
            lines: &[],
        }];
        let frame = Frame {
            frame_pointer: 0xFF80,
            return_address: 0x102c,
            args: [1, 2, 3, 4, 5],
        };

        let mut out = String::new();
        write_frame(&mut out, &frame, &SymbolTable::new(&FUNCS).unwrap()).unwrap();
        assert!(out.contains("rip 000000000000102c"));
        assert!(out.ends_with("kern/init.rs:42: kernel_main+44\n"));

        let mut out = String::new();
        write_frame(&mut out, &frame, &NoSymbols).unwrap();
        assert!(out.ends_with("<unknown>:0: <unknown>+0\n"));
    }
}
