//! HardFault Status Register (HFSR)

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use super::{flags_set, FlagInfo};

/// HardFault flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HfsrFlag {
    DebugEvt,
    Forced,
    #[serde(rename = "VECTBL")]
    VectTbl,
}

/// Bit positions within HFSR
pub const HARD_FAULT_FLAGS: &[(HfsrFlag, u32)] = &[
    (HfsrFlag::DebugEvt, 31),
    (HfsrFlag::Forced, 30),
    (HfsrFlag::VectTbl, 1),
];

impl FlagInfo for HfsrFlag {
    fn name(&self) -> &'static str {
        match self {
            HfsrFlag::DebugEvt => "DEBUGEVT",
            HfsrFlag::Forced => "FORCED",
            HfsrFlag::VectTbl => "VECTBL",
        }
    }

    fn description(&self) -> &'static str {
        match self {
            HfsrFlag::DebugEvt => "Debug Event",
            HfsrFlag::Forced => "Forced Hard Fault",
            HfsrFlag::VectTbl => "Vector Table Hard Fault",
        }
    }
}

impl fmt::Display for HfsrFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Decode an HFSR value into its set flags.
pub fn parse(hfsr: u32) -> BTreeSet<HfsrFlag> {
    flags_set(hfsr, 0, HARD_FAULT_FLAGS)
}
