//! Crash log pipeline: normalize, select a parser, parse, symbolicate

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::{debug, info};

use crate::crashlog::{BacktraceItem, CrashLog, CrashLogRegisters, Register};
use crate::error::{AnalyzerError, Result};
use crate::parsers::{self, cleanup_and_split, CrashLogParser};
use crate::registers::{self, CfsrFlag, FlagInfo, HfsrFlag, MemManageFlag, BusFaultFlag, Psr};
use crate::symbols::{AddressInfo, Symbolizer};

/// A crash log together with the parser that recognized it
#[derive(Debug, Clone, Serialize)]
pub struct AnalyzedCrashLog {
    pub parser: &'static str,
    pub backtrace_supported: bool,
    /// Number of normalized lines skipped before the start marker
    pub start_index: usize,
    pub crash_log: CrashLog,
}

/// Analyze raw crash log text with the built-in parsers.
pub fn analyze(text: &str) -> Result<AnalyzedCrashLog> {
    analyze_with(parsers::registered(), text)
}

/// Analyze raw crash log text, trying `parsers` in order.
pub fn analyze_with(parsers: &[&dyn CrashLogParser], text: &str) -> Result<AnalyzedCrashLog> {
    let lines = cleanup_and_split(text);
    debug!("Crash log has {} non-empty lines", lines.len());

    let (parser, start_index) = parsers::select_parser(parsers, &lines).ok_or(AnalyzerError::UnsupportedFormat)?;

    info!("Using parser: {}", parser.name());
    info!("Skipping first {} lines in crash log", start_index);

    let crash_log = parser.parse(&lines[start_index..])?;
    debug!(
        "Parsed {} registers and {} backtrace frames",
        crash_log.registers.len(),
        crash_log.backtrace.len()
    );

    Ok(AnalyzedCrashLog {
        parser: parser.name(),
        backtrace_supported: parser.backtrace_supported(),
        start_index,
        crash_log,
    })
}

/// One decoded status flag, ready for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlagExplanation {
    pub name: &'static str,
    pub description: &'static str,
    /// Fault class for CFSR flags
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_register: Option<&'static str>,
}

impl FlagExplanation {
    fn of<F: FlagInfo>(flag: &F, sub_register: Option<&'static str>) -> Self {
        Self {
            name: flag.name(),
            description: flag.description(),
            sub_register,
        }
    }
}

/// Decoded fault status of a crash
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FaultSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cfsr: Option<BTreeSet<CfsrFlag>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hfsr: Option<BTreeSet<HfsrFlag>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub psr: Option<Psr>,
    /// Faulting data address, only when CFSR marks MMAR valid
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mmar: Option<u32>,
    /// Faulting bus address, only when CFSR marks BFAR valid
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bfar: Option<u32>,
}

impl FaultSummary {
    /// Decode raw status register values
    pub fn decode(cfsr: Option<u32>, hfsr: Option<u32>, psr: Option<u32>) -> Self {
        Self {
            cfsr: cfsr.map(registers::cfsr::parse),
            hfsr: hfsr.map(registers::hfsr::parse),
            psr: psr.map(registers::psr::parse),
            mmar: None,
            bfar: None,
        }
    }

    pub fn from_registers(regs: &CrashLogRegisters) -> Self {
        let mut summary = Self::decode(
            regs.get(Register::CFSR),
            regs.get(Register::HFSR),
            regs.get(Register::PSR),
        );

        if summary.has_cfsr_flag(CfsrFlag::MemManage(MemManageFlag::MmarValid)) {
            summary.mmar = regs.get(Register::MMAR);
        }
        if summary.has_cfsr_flag(CfsrFlag::BusFault(BusFaultFlag::BfarValid)) {
            summary.bfar = regs.get(Register::BFAR);
        }
        summary
    }

    fn has_cfsr_flag(&self, flag: CfsrFlag) -> bool {
        self.cfsr.as_ref().is_some_and(|flags| flags.contains(&flag))
    }

    pub fn cfsr_explanations(&self) -> Vec<FlagExplanation> {
        self.cfsr
            .iter()
            .flatten()
            .map(|flag| FlagExplanation::of(flag, Some(flag.sub_register())))
            .collect()
    }

    pub fn hfsr_explanations(&self) -> Vec<FlagExplanation> {
        self.hfsr.iter().flatten().map(|flag| FlagExplanation::of(flag, None)).collect()
    }

    pub fn apsr_explanations(&self) -> Vec<FlagExplanation> {
        self.psr
            .iter()
            .flat_map(|psr| psr.apsr.iter())
            .map(|flag| FlagExplanation::of(flag, None))
            .collect()
    }
}

/// A backtrace frame with its resolved source location
#[derive(Debug, Clone, Serialize)]
pub struct SymbolicatedFrame {
    #[serde(flatten)]
    pub item: BacktraceItem,
    pub source: AddressInfo,
}

impl SymbolicatedFrame {
    /// Function name from addr2line, then the symbol table, then the firmware's own output
    pub fn function_name(&self) -> Option<&str> {
        self.source
            .function_name()
            .or_else(|| self.item.function.as_ref().and_then(|f| f.name.as_deref()))
    }
}

/// Fully analyzed crash log
#[derive(Debug, Clone, Serialize)]
pub struct SymbolicatedCrashLog {
    pub parser: &'static str,
    pub backtrace_supported: bool,
    pub start_index: usize,
    pub registers: CrashLogRegisters,
    pub faults: FaultSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lr: Option<AddressInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pc: Option<AddressInfo>,
    pub backtrace: Vec<SymbolicatedFrame>,
}

/// Resolve LR, PC and every backtrace PC. Failed lookups stay unresolved.
pub async fn symbolicate(analyzed: AnalyzedCrashLog, symbolizer: &Symbolizer) -> SymbolicatedCrashLog {
    let AnalyzedCrashLog {
        parser,
        backtrace_supported,
        start_index,
        crash_log: CrashLog { registers, backtrace },
    } = analyzed;

    let code_addresses = registers
        .iter()
        .filter(|(register, _)| register.is_code_address())
        .map(|(_, value)| value);
    let addresses: Vec<u32> = code_addresses.chain(backtrace.iter().map(|item| item.pc)).collect();

    let resolved = symbolizer.resolve_all(addresses).await;
    let lookup = |address: u32| {
        resolved.get(&address).cloned().unwrap_or_else(|| AddressInfo {
            address,
            location: None,
            symbol: None,
        })
    };

    let lr = registers.get(Register::LR).map(&lookup);
    let pc = registers.get(Register::PC).map(&lookup);
    let backtrace = backtrace
        .into_iter()
        .map(|item| SymbolicatedFrame {
            source: lookup(item.pc),
            item,
        })
        .collect();

    SymbolicatedCrashLog {
        parser,
        backtrace_supported,
        start_index,
        faults: FaultSummary::from_registers(&registers),
        registers,
        lr,
        pc,
        backtrace,
    }
}
