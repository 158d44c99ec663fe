//! Symbol Lookup
//!
//! Resolves an instruction address to the function containing it. The
//! kernel supplies a resolver; [`SymbolTable`] covers the common case of a
//! table generated at build time.

/// Debug information for one instruction address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolInfo<'a> {
    /// Source file of the function
    pub file: &'a str,
    /// Source line of the address, or of the function when unknown
    pub line: u32,
    /// Function name
    pub name: &'a str,
    /// Start address of the function
    pub start: u64,
}

impl SymbolInfo<'_> {
    /// Byte offset of `addr` into the function
    pub fn offset(&self, addr: u64) -> u64 {
        addr.wrapping_sub(self.start)
    }
}

/// Address to symbol lookup service
pub trait SymbolResolver {
    /// Find the function enclosing `addr`
    fn resolve(&self, addr: u64) -> Option<SymbolInfo<'_>>;
}

/// Resolver with no symbols; every lookup fails
pub struct NoSymbols;

impl SymbolResolver for NoSymbols {
    fn resolve(&self, _addr: u64) -> Option<SymbolInfo<'_>> {
        None
    }
}

/// Source line beginning `offset` bytes into a function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineEntry {
    pub offset: u64,
    pub line: u32,
}

/// One function in a symbol table
#[derive(Debug, Clone, Copy)]
pub struct SymbolEntry {
    pub start: u64,
    pub size: u64,
    pub name: &'static str,
    pub file: &'static str,
    /// Declaration line
    pub line: u32,
    /// Line table sorted by offset; may be empty
    pub lines: &'static [LineEntry],
}

impl SymbolEntry {
    /// Source line of `addr`, falling back to the declaration line
    pub fn line_of(&self, addr: u64) -> u32 {
        let offset = addr.wrapping_sub(self.start);
        let idx = self.lines.partition_point(|l| l.offset <= offset);
        self.lines[..idx].last().map_or(self.line, |l| l.line)
    }
}

/// Function table sorted by start address
pub struct SymbolTable<'a> {
    entries: &'a [SymbolEntry],
}

impl<'a> SymbolTable<'a> {
    /// Wrap a table; returns `None` unless sorted by start address
    pub fn new(entries: &'a [SymbolEntry]) -> Option<Self> {
        entries
            .windows(2)
            .all(|w| w[0].start <= w[1].start)
            .then_some(Self { entries })
    }

}

impl SymbolResolver for SymbolTable<'_> {
    fn resolve(&self, addr: u64) -> Option<SymbolInfo<'_>> {
        let idx = self.entries.partition_point(|e| e.start <= addr);
        let entry = self.entries[..idx].last()?;
        if addr - entry.start >= entry.size {
            return None;
        }
        Some(SymbolInfo {
            file: entry.file,
            line: entry.line_of(addr),
            name: entry.name,
            start: entry.start,
        })
    }
}
