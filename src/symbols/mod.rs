//! Address symbolication
//!
//! [`Symbolizer`] combines an [`Addr2Line`] process wrapper with a function table
//! read from the firmware ELF. Lookups never fail: an address that cannot be
//! resolved simply carries no location.

pub mod addr2line;
pub mod elf_symbols;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub use self::addr2line::{Addr2Line, SourceFile, SourceLocation};
pub use self::elf_symbols::{ElfSymbols, SymbolMatch};

use crate::config::SymbolizerConfig;
use crate::error::{AnalyzerError, Result};

/// Everything known about one code address
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddressInfo {
    pub address: u32,
    /// Source location from addr2line
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceLocation>,
    /// Containing function from the ELF symbol table, e.g. `loop+0x1a`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
}

impl AddressInfo {
    fn unresolved(address: u32) -> Self {
        Self {
            address,
            location: None,
            symbol: None,
        }
    }

    /// Best known function name
    pub fn function_name(&self) -> Option<&str> {
        self.location
            .as_ref()
            .map(|l| l.function_name.as_str())
            .or(self.symbol.as_deref())
    }

    /// `file:line` when addr2line resolved the address
    pub fn file_line(&self) -> Option<String> {
        self.location.as_ref().map(|l| format!("{}:{}", l.file.name, l.line))
    }

    pub fn is_resolved(&self) -> bool {
        self.location.is_some() || self.symbol.is_some()
    }
}

/// Resolves code addresses of one firmware image
pub struct Symbolizer {
    addr2line: Option<Addr2Line>,
    elf_symbols: Option<ElfSymbols>,
    /// Read-through cache keyed by address, lives as long as the symbolizer
    cache: Option<Mutex<HashMap<u32, Option<SourceLocation>>>>,
    max_concurrent: usize,
}

impl Symbolizer {
    /// A symbolizer that resolves nothing
    pub fn disabled() -> Self {
        Self::from_parts(None, None, false, 1)
    }

    pub fn from_parts(
        addr2line: Option<Addr2Line>,
        elf_symbols: Option<ElfSymbols>,
        cache_enable: bool,
        max_concurrent: usize,
    ) -> Self {
        Self {
            addr2line,
            elf_symbols,
            cache: cache_enable.then(|| Mutex::new(HashMap::new())),
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Build a symbolizer from configuration.
    ///
    /// Without a firmware path nothing is resolved. A firmware path that does not
    /// exist is an error; an unusable addr2line or unreadable symbol table only
    /// degrades resolution.
    pub async fn from_config(config: &SymbolizerConfig) -> Result<Self> {
        let Some(elf_path) = &config.elf_path else {
            debug!("No firmware ELF configured, symbolication disabled");
            return Ok(Self::disabled());
        };

        if !elf_path.is_file() {
            return Err(AnalyzerError::FirmwareNotFound(elf_path.display().to_string()));
        }

        let elf_symbols = match ElfSymbols::from_elf(elf_path) {
            Ok(symbols) => {
                debug!("Loaded {} function symbols from {}", symbols.len(), elf_path.display());
                Some(symbols)
            }
            Err(e) => {
                warn!("Failed to read symbols from {}: {}", elf_path.display(), e);
                None
            }
        };

        let timeout = Duration::from_millis(config.lookup_timeout_ms);
        let addr2line = if Addr2Line::is_available(&config.addr2line_path, timeout).await {
            Some(Addr2Line::new(&config.addr2line_path, elf_path, timeout))
        } else {
            warn!(
                "addr2line not found at {}, source locations will be unavailable",
                config.addr2line_path.display()
            );
            None
        };

        info!(
            "Symbolizer ready for {} (addr2line: {}, symbol table: {})",
            elf_path.display(),
            addr2line.is_some(),
            elf_symbols.is_some()
        );

        Ok(Self::from_parts(
            addr2line,
            elf_symbols,
            config.cache_enable,
            config.max_concurrent_lookups,
        ))
    }

    /// Whether any resolution source is available
    pub fn is_enabled(&self) -> bool {
        self.addr2line.is_some() || self.elf_symbols.is_some()
    }

    pub fn has_addr2line(&self) -> bool {
        self.addr2line.is_some()
    }

    async fn locate(&self, addr2line: &Addr2Line, address: u32) -> Option<SourceLocation> {
        let Some(cache) = &self.cache else {
            return addr2line.resolve(address).await;
        };

        if let Some(hit) = cache.lock().await.get(&address) {
            debug!("Cache hit for 0x{:08X}", address);
            return hit.clone();
        }

        let location = addr2line.resolve(address).await;
        cache.lock().await.insert(address, location.clone());
        location
    }

    /// Resolve one address.
    pub async fn resolve(&self, address: u32) -> AddressInfo {
        let mut info = AddressInfo::unresolved(address);

        if let Some(addr2line) = &self.addr2line {
            info.location = self.locate(addr2line, address).await;
        }
        if let Some(symbols) = &self.elf_symbols {
            info.symbol = symbols.lookup(address).map(|m| m.to_string());
        }

        info
    }

    /// Resolve many addresses, each distinct address once, running up to the
    /// configured number of lookups concurrently.
    pub async fn resolve_all(&self, addresses: impl IntoIterator<Item = u32>) -> BTreeMap<u32, AddressInfo> {
        let distinct: BTreeSet<u32> = addresses.into_iter().collect();
        if !self.is_enabled() {
            return distinct.into_iter().map(|a| (a, AddressInfo::unresolved(a))).collect();
        }

        debug!("Resolving {} addresses", distinct.len());
        stream::iter(distinct)
            .map(|address| async move { (address, self.resolve(address).await) })
            .buffer_unordered(self.max_concurrent)
            .collect()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_symbolizer() {
        let symbolizer = Symbolizer::disabled();
        assert!(!symbolizer.is_enabled());

        let info = symbolizer.resolve(0x1000).await;
        assert!(!info.is_resolved());
        assert_eq!(info.function_name(), None);
        assert_eq!(info.file_line(), None);
    }

    #[tokio::test]
    async fn test_symbol_table_only() {
        let symbols = ElfSymbols::from_entries(vec![("loop", 0x1000, 0x100)]);
        let symbolizer = Symbolizer::from_parts(None, Some(symbols), true, 4);

        let info = symbolizer.resolve(0x1010).await;
        assert_eq!(info.symbol.as_deref(), Some("loop+0x10"));
        assert_eq!(info.function_name(), Some("loop+0x10"));
        assert!(info.location.is_none());
    }

    #[tokio::test]
    async fn test_resolve_all_deduplicates() {
        let symbols = ElfSymbols::from_entries(vec![("loop", 0x1000, 0x100)]);
        let symbolizer = Symbolizer::from_parts(None, Some(symbols), false, 2);

        let resolved = symbolizer.resolve_all(vec![0x1010, 0x1010, 0x2000]).await;
        assert_eq!(resolved.len(), 2);
        assert!(resolved[&0x1010].is_resolved());
        assert!(!resolved[&0x2000].is_resolved());
    }

    #[tokio::test]
    async fn test_from_config_without_elf() {
        let config = SymbolizerConfig::default();
        let symbolizer = Symbolizer::from_config(&config).await.unwrap();
        assert!(!symbolizer.is_enabled());
    }

    #[tokio::test]
    async fn test_from_config_missing_elf() {
        let config = SymbolizerConfig {
            elf_path: Some("/nonexistent/firmware.elf".into()),
            ..SymbolizerConfig::default()
        };
        let result = Symbolizer::from_config(&config).await;
        assert!(matches!(result, Err(AnalyzerError::FirmwareNotFound(_))));
    }

    #[tokio::test]
    async fn test_from_config_degrades_without_tool() {
        let elf = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(elf.path(), b"not an elf file").unwrap();

        let config = SymbolizerConfig {
            elf_path: Some(elf.path().to_path_buf()),
            addr2line_path: "non-existing-executable-that-does-not-exist".into(),
            ..SymbolizerConfig::default()
        };
        let symbolizer = Symbolizer::from_config(&config).await.unwrap();
        assert!(!symbolizer.is_enabled());
        assert!(!symbolizer.resolve(0x1000).await.is_resolved());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cache_avoids_repeat_spawns() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let counter = dir.path().join("calls");
        let tool = dir.path().join("addr2line");
        std::fs::write(
            &tool,
            format!("#!/bin/sh\necho x >> {}\necho main\necho /src/main.c:3\n", counter.display()),
        )
        .unwrap();
        std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();

        let a2l = Addr2Line::new(&tool, "fw.elf", Duration::from_secs(5));
        let symbolizer = Symbolizer::from_parts(Some(a2l), None, true, 4);

        let first = symbolizer.resolve(0x100).await;
        let second = symbolizer.resolve(0x100).await;
        assert_eq!(first, second);
        assert_eq!(first.file_line().as_deref(), Some("main.c:3"));

        let calls = std::fs::read_to_string(&counter).unwrap();
        assert_eq!(calls.lines().count(), 1);
    }
}
