//! Cortex-M fault and status register decoding
//!
//! CFSR, HFSR and PSR pack named single-bit conditions into a 32-bit word. Each
//! register module holds a fixed `(flag, bit)` table for its hardware layout and
//! decodes through [`flags_set`].

pub mod cfsr;
pub mod hfsr;
pub mod psr;

use std::collections::BTreeSet;

pub use cfsr::{BusFaultFlag, CfsrFlag, MemManageFlag, UsageFaultFlag};
pub use hfsr::HfsrFlag;
pub use psr::{ApsrFlag, Psr};

/// Symbolic name and human-readable meaning of a status flag.
pub trait FlagInfo {
    /// Canonical flag name as printed in the ARM documentation, e.g. `DIVBYZERO`.
    fn name(&self) -> &'static str;

    /// One-line explanation of the flag.
    fn description(&self) -> &'static str;
}

/// Check whether `bit` (relative to `offset`) is set in `value`.
///
/// Positions past bit 31 (`offset + bit >= 32`) do not exist in a 32-bit register.
/// They are a caller error: debug builds assert, release builds report them as unset.
pub fn flag_set(value: u32, offset: u32, bit: u32) -> bool {
    let position = offset.saturating_add(bit);
    debug_assert!(position < 32, "bit position {} outside 32-bit register", position);

    1u32.checked_shl(position)
        .map(|mask| value & mask != 0)
        .unwrap_or(false)
}

/// Collect every flag of `table` whose bit is set in `value`.
///
/// `table` maps each flag to its bit position within a sub-register that starts at
/// bit `offset` of the full register.
pub fn flags_set<F: Copy + Ord>(value: u32, offset: u32, table: &[(F, u32)]) -> BTreeSet<F> {
    table
        .iter()
        .filter(|(_, bit)| flag_set(value, offset, *bit))
        .map(|(flag, _)| *flag)
        .collect()
}
