//! Configurable Fault Status Register (CFSR)
//!
//! CFSR packs three 8-bit status registers into one word:
//! MMFSR at bit 0, BFSR at bit 8 and UFSR at bit 16.

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use super::{flags_set, FlagInfo};

/// Offset of the MemManage Fault Status Register in CFSR
pub const MMFSR_OFFSET: u32 = 0;

/// Offset of the BusFault Status Register in CFSR
pub const BFSR_OFFSET: u32 = 8;

/// Offset of the UsageFault Status Register in CFSR
pub const UFSR_OFFSET: u32 = 16;

/// MemManage fault flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MemManageFlag {
    MmarValid,
    MlspErr,
    MstkErr,
    MunstkErr,
    DaccViol,
    IaccViol,
}

/// BusFault flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BusFaultFlag {
    BfarValid,
    LspErr,
    StkErr,
    UnstkErr,
    #[serde(rename = "IMPRECISERR")]
    ImpreciseErr,
    #[serde(rename = "PRECISERR")]
    PreciseErr,
    IbusErr,
}

/// UsageFault flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UsageFaultFlag {
    DivByZero,
    Unaligned,
    NoCp,
    InvPc,
    InvState,
    UndefInstr,
}

/// Bit positions within MMFSR
pub const MEM_MANAGE_FLAGS: &[(MemManageFlag, u32)] = &[
    (MemManageFlag::MmarValid, 7),
    (MemManageFlag::MlspErr, 5),
    (MemManageFlag::MstkErr, 4),
    (MemManageFlag::MunstkErr, 3),
    (MemManageFlag::DaccViol, 1),
    (MemManageFlag::IaccViol, 0),
];

/// Bit positions within BFSR
pub const BUS_FAULT_FLAGS: &[(BusFaultFlag, u32)] = &[
    (BusFaultFlag::BfarValid, 7),
    (BusFaultFlag::LspErr, 5),
    (BusFaultFlag::StkErr, 4),
    (BusFaultFlag::UnstkErr, 3),
    (BusFaultFlag::ImpreciseErr, 2),
    (BusFaultFlag::PreciseErr, 1),
    (BusFaultFlag::IbusErr, 0),
];

/// Bit positions within UFSR (UFSR is 16 bits wide, DIVBYZERO sits at bit 9)
pub const USAGE_FAULT_FLAGS: &[(UsageFaultFlag, u32)] = &[
    (UsageFaultFlag::DivByZero, 9),
    (UsageFaultFlag::Unaligned, 8),
    (UsageFaultFlag::NoCp, 3),
    (UsageFaultFlag::InvPc, 2),
    (UsageFaultFlag::InvState, 1),
    (UsageFaultFlag::UndefInstr, 0),
];

/// Any CFSR flag, tagged with the sub-register it belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(untagged)]
pub enum CfsrFlag {
    MemManage(MemManageFlag),
    BusFault(BusFaultFlag),
    UsageFault(UsageFaultFlag),
}

impl CfsrFlag {
    /// Name of the fault class the flag reports on
    pub fn sub_register(&self) -> &'static str {
        match self {
            CfsrFlag::MemManage(_) => "MemManage",
            CfsrFlag::BusFault(_) => "BusFault",
            CfsrFlag::UsageFault(_) => "UsageFault",
        }
    }
}

impl FlagInfo for MemManageFlag {
    fn name(&self) -> &'static str {
        match self {
            MemManageFlag::MmarValid => "MMARVALID",
            MemManageFlag::MlspErr => "MLSPERR",
            MemManageFlag::MstkErr => "MSTKERR",
            MemManageFlag::MunstkErr => "MUNSTKERR",
            MemManageFlag::DaccViol => "DACCVIOL",
            MemManageFlag::IaccViol => "IACCVIOL",
        }
    }

    fn description(&self) -> &'static str {
        match self {
            MemManageFlag::MmarValid => "Memory Management Fault Address Register (MMAR) is valid",
            MemManageFlag::MlspErr => "Memory Management Fault occurred during floating-point lazy state preservation",
            MemManageFlag::MstkErr => "Memory Management Fault occurred during exception stacking",
            MemManageFlag::MunstkErr => "Memory Management Fault occurred during exception unstacking",
            MemManageFlag::DaccViol => "Data Access Violation",
            MemManageFlag::IaccViol => "Instruction Access Violation",
        }
    }
}

impl FlagInfo for BusFaultFlag {
    fn name(&self) -> &'static str {
        match self {
            BusFaultFlag::BfarValid => "BFARVALID",
            BusFaultFlag::LspErr => "LSPERR",
            BusFaultFlag::StkErr => "STKERR",
            BusFaultFlag::UnstkErr => "UNSTKERR",
            BusFaultFlag::ImpreciseErr => "IMPRECISERR",
            BusFaultFlag::PreciseErr => "PRECISERR",
            BusFaultFlag::IbusErr => "IBUSERR",
        }
    }

    fn description(&self) -> &'static str {
        match self {
            BusFaultFlag::BfarValid => "Bus Fault Address Register (BFAR) is valid",
            BusFaultFlag::LspErr => "Bus Fault occurred during floating-point lazy state preservation",
            BusFaultFlag::StkErr => "Bus Fault occurred during exception stacking",
            BusFaultFlag::UnstkErr => "Bus Fault occurred during exception unstacking",
            BusFaultFlag::ImpreciseErr => "Imprecise Data Access Error",
            BusFaultFlag::PreciseErr => "Precise Data Access Error",
            BusFaultFlag::IbusErr => "Instruction Bus Error",
        }
    }
}

impl FlagInfo for UsageFaultFlag {
    fn name(&self) -> &'static str {
        match self {
            UsageFaultFlag::DivByZero => "DIVBYZERO",
            UsageFaultFlag::Unaligned => "UNALIGNED",
            UsageFaultFlag::NoCp => "NOCP",
            UsageFaultFlag::InvPc => "INVPC",
            UsageFaultFlag::InvState => "INVSTATE",
            UsageFaultFlag::UndefInstr => "UNDEFINSTR",
        }
    }

    fn description(&self) -> &'static str {
        match self {
            UsageFaultFlag::DivByZero => "Division By Zero",
            UsageFaultFlag::Unaligned => "Unaligned Access",
            UsageFaultFlag::NoCp => "No Coprocessor",
            UsageFaultFlag::InvPc => "Invalid PC Load",
            UsageFaultFlag::InvState => "Invalid State",
            UsageFaultFlag::UndefInstr => "Undefined Instruction",
        }
    }
}

impl FlagInfo for CfsrFlag {
    fn name(&self) -> &'static str {
        match self {
            CfsrFlag::MemManage(flag) => flag.name(),
            CfsrFlag::BusFault(flag) => flag.name(),
            CfsrFlag::UsageFault(flag) => flag.name(),
        }
    }

    fn description(&self) -> &'static str {
        match self {
            CfsrFlag::MemManage(flag) => flag.description(),
            CfsrFlag::BusFault(flag) => flag.description(),
            CfsrFlag::UsageFault(flag) => flag.description(),
        }
    }
}

impl fmt::Display for CfsrFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Decode a CFSR value into the union of its MemManage, BusFault and UsageFault flags.
pub fn parse(cfsr: u32) -> BTreeSet<CfsrFlag> {
    let mut flags = BTreeSet::new();

    flags.extend(flags_set(cfsr, MMFSR_OFFSET, MEM_MANAGE_FLAGS).into_iter().map(CfsrFlag::MemManage));
    flags.extend(flags_set(cfsr, BFSR_OFFSET, BUS_FAULT_FLAGS).into_iter().map(CfsrFlag::BusFault));
    flags.extend(flags_set(cfsr, UFSR_OFFSET, USAGE_FAULT_FLAGS).into_iter().map(CfsrFlag::UsageFault));

    flags
}
