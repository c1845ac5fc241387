//! Function symbols read straight from the firmware ELF
//!
//! Used when addr2line is unavailable or cannot resolve an address, so a frame
//! still gets a function name.

use std::fmt;
use std::path::Path;

/// Zero-sized symbols (hand written assembly) cover at most this many bytes
const MAX_ZERO_SIZE_SPAN: u32 = 4096;

#[derive(Debug, Clone)]
struct FunctionSymbol {
    name: String,
    start: u32,
    size: u32,
}

impl FunctionSymbol {
    fn covers(&self, address: u32) -> bool {
        let offset = address - self.start;
        if self.size > 0 {
            offset < self.size
        } else {
            offset <= MAX_ZERO_SIZE_SPAN
        }
    }
}

/// Function containing an address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolMatch {
    pub name: String,
    pub start: u32,
    pub offset: u32,
}

impl fmt::Display for SymbolMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.offset {
            0 => write!(f, "{}", self.name),
            offset => write!(f, "{}+0x{:x}", self.name, offset),
        }
    }
}

/// Function symbols sorted by start address, Thumb bit cleared
#[derive(Debug, Clone, Default)]
pub struct ElfSymbols {
    functions: Vec<FunctionSymbol>,
}

impl ElfSymbols {
    pub fn from_elf(path: &Path) -> anyhow::Result<Self> {
        let data = std::fs::read(path)?;
        Self::from_elf_bytes(&data)
    }

    pub fn from_elf_bytes(data: &[u8]) -> anyhow::Result<Self> {
        let elf = goblin::elf::Elf::parse(data)?;

        let entries = elf.syms.iter().filter(|sym| sym.is_function() && sym.st_value != 0).filter_map(|sym| {
            let name = elf.strtab.get_at(sym.st_name).filter(|name| !name.is_empty())?;
            let start = u32::try_from(sym.st_value).ok()?;
            let size = u32::try_from(sym.st_size).unwrap_or(u32::MAX);
            Some((name.to_string(), start, size))
        });

        Ok(Self::from_functions(entries))
    }

    /// Build a table from `(name, start, size)` triples.
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = (&'a str, u32, u32)>) -> Self {
        Self::from_functions(entries.into_iter().map(|(name, start, size)| (name.to_string(), start, size)))
    }

    fn from_functions(entries: impl IntoIterator<Item = (String, u32, u32)>) -> Self {
        let mut functions: Vec<FunctionSymbol> = entries
            .into_iter()
            .map(|(name, start, size)| FunctionSymbol {
                name,
                start: start & !1,
                size,
            })
            .collect();

        functions.sort_by_key(|f| f.start);
        // aliases share an address, keep the first
        functions.dedup_by_key(|f| f.start);

        Self { functions }
    }

    /// Find the function containing `address`.
    pub fn lookup(&self, address: u32) -> Option<SymbolMatch> {
        let address = address & !1;

        let candidates = self.functions.partition_point(|f| f.start <= address);
        let function = self.functions[..candidates].last()?;

        function.covers(address).then(|| SymbolMatch {
            name: function.name.clone(),
            start: function.start,
            offset: address - function.start,
        })
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}
