//! Program Status Register (xPSR)
//!
//! Only the APSR condition flags and the IPSR exception number are decoded;
//! the EPSR execution state bits are left alone.

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use super::{flags_set, FlagInfo};

/// APSR condition flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum ApsrFlag {
    N,
    Z,
    C,
    V,
    Q,
}

/// Bit positions of the APSR flags
pub const APSR_FLAGS: &[(ApsrFlag, u32)] = &[
    (ApsrFlag::N, 31),
    (ApsrFlag::Z, 30),
    (ApsrFlag::C, 29),
    (ApsrFlag::V, 28),
    (ApsrFlag::Q, 27),
];

const APSR_OFFSET: u32 = 0;

/// IPSR is the low byte of PSR
pub const IPSR_MASK: u32 = 0x0000_00FF;

impl FlagInfo for ApsrFlag {
    fn name(&self) -> &'static str {
        match self {
            ApsrFlag::N => "N",
            ApsrFlag::Z => "Z",
            ApsrFlag::C => "C",
            ApsrFlag::V => "V",
            ApsrFlag::Q => "Q",
        }
    }

    fn description(&self) -> &'static str {
        match self {
            ApsrFlag::N => "Negative Condition Flag",
            ApsrFlag::Z => "Zero Condition Flag",
            ApsrFlag::C => "Carry Condition Flag",
            ApsrFlag::V => "Overflow Condition Flag",
            ApsrFlag::Q => "Cumulative saturation flag",
        }
    }
}

impl fmt::Display for ApsrFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Decoded PSR value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Psr {
    /// Set APSR condition flags
    pub apsr: BTreeSet<ApsrFlag>,
    /// Number of the exception being handled, 0 in thread mode
    pub ipsr: u8,
}

/// Split a PSR value into its APSR flags and IPSR exception number.
pub fn parse(psr: u32) -> Psr {
    Psr {
        apsr: flags_set(psr, APSR_OFFSET, APSR_FLAGS),
        ipsr: (psr & IPSR_MASK) as u8,
    }
}
