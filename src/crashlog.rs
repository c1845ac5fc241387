//! Parsed crash log data model

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

/// Registers a firmware fault handler may dump.
///
/// Declaration order is the display order.
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Register {
    R0,
    R1,
    R2,
    R3,
    R12,
    LR,
    PC,
    PSR,
    CFSR,
    HFSR,
    DFSR,
    AFSR,
    MMAR,
    BFAR,
    ExcLR,
    ExcSP,
}

impl Register {
    pub const ALL: [Register; 16] = [
        Register::R0,
        Register::R1,
        Register::R2,
        Register::R3,
        Register::R12,
        Register::LR,
        Register::PC,
        Register::PSR,
        Register::CFSR,
        Register::HFSR,
        Register::DFSR,
        Register::AFSR,
        Register::MMAR,
        Register::BFAR,
        Register::ExcLR,
        Register::ExcSP,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Register::R0 => "R0",
            Register::R1 => "R1",
            Register::R2 => "R2",
            Register::R3 => "R3",
            Register::R12 => "R12",
            Register::LR => "LR",
            Register::PC => "PC",
            Register::PSR => "PSR",
            Register::CFSR => "CFSR",
            Register::HFSR => "HFSR",
            Register::DFSR => "DFSR",
            Register::AFSR => "AFSR",
            Register::MMAR => "MMAR",
            Register::BFAR => "BFAR",
            Register::ExcLR => "ExcLR",
            Register::ExcSP => "ExcSP",
        }
    }

    /// Look up a register by its canonical name (case sensitive).
    pub fn from_name(name: &str) -> Option<Register> {
        Register::ALL.iter().copied().find(|r| r.name() == name)
    }

    /// Registers holding code addresses worth symbolicating
    pub fn is_code_address(&self) -> bool {
        matches!(self, Register::LR | Register::PC)
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Register snapshot of one crash log. Every register is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CrashLogRegisters {
    values: BTreeMap<Register, u32>,
}

impl CrashLogRegisters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a register value unless the register was already seen.
    ///
    /// Returns `false` when an earlier value was kept. Fault handlers repeat some
    /// labels under another subsystem (HC32 prints the exception LR after the
    /// stacked LR), and the first occurrence is the stacked one.
    pub fn insert_first(&mut self, register: Register, value: u32) -> bool {
        match self.values.entry(register) {
            std::collections::btree_map::Entry::Vacant(entry) => {
                entry.insert(value);
                true
            }
            std::collections::btree_map::Entry::Occupied(_) => false,
        }
    }

    pub fn get(&self, register: Register) -> Option<u32> {
        self.values.get(&register).copied()
    }

    pub fn contains(&self, register: Register) -> bool {
        self.values.contains_key(&register)
    }

    /// Registers in display order
    pub fn iter(&self) -> impl Iterator<Item = (Register, u32)> + '_ {
        self.values.iter().map(|(r, v)| (*r, *v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<(Register, u32)> for CrashLogRegisters {
    /// Collects with first-seen-wins semantics.
    fn from_iter<I: IntoIterator<Item = (Register, u32)>>(iter: I) -> Self {
        let mut registers = CrashLogRegisters::new();
        for (register, value) in iter {
            registers.insert_first(register, value);
        }
        registers
    }
}

/// Function a backtrace frame belongs to, as printed by the firmware
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionInfo {
    /// Function name, `None` when the firmware printed `unknown`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub base_address: u32,
    pub instruction_offset: u32,
}

/// One stack frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BacktraceItem {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function: Option<FunctionInfo>,
    pub pc: u32,
}

/// Frames in the order the firmware printed them
pub type Backtrace = Vec<BacktraceItem>;

/// A parsed crash log
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CrashLog {
    pub registers: CrashLogRegisters,
    pub backtrace: Backtrace,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_names_round_trip() {
        for register in Register::ALL {
            assert_eq!(Register::from_name(register.name()), Some(register));
        }
        assert_eq!(Register::from_name("R4"), None);
        assert_eq!(Register::from_name("pc"), None);
    }

    #[test]
    fn test_insert_first_keeps_first_value() {
        let mut registers = CrashLogRegisters::new();
        assert!(registers.insert_first(Register::LR, 0x1FFF_8494));
        assert!(!registers.insert_first(Register::LR, 0xFFFF_FFF9));
        assert_eq!(registers.get(Register::LR), Some(0x1FFF_8494));
        assert_eq!(registers.len(), 1);
    }

    #[test]
    fn test_iter_in_display_order() {
        let registers: CrashLogRegisters = vec![
            (Register::ExcSP, 3),
            (Register::PC, 2),
            (Register::R0, 1),
        ]
        .into_iter()
        .collect();

        let order: Vec<Register> = registers.iter().map(|(r, _)| r).collect();
        assert_eq!(order, vec![Register::R0, Register::PC, Register::ExcSP]);
    }

    #[test]
    fn test_serialize_registers() {
        let registers: CrashLogRegisters = vec![(Register::ExcLR, 0xFFFF_FFF9), (Register::R12, 1)]
            .into_iter()
            .collect();
        let json = serde_json::to_string(&registers).unwrap();
        assert_eq!(json, r#"{"R12":1,"ExcLR":4294967289}"#);
    }

    #[test]
    fn test_serialize_backtrace_item_without_name() {
        let item = BacktraceItem {
            function: Some(FunctionInfo {
                name: None,
                base_address: 0x1C39C,
                instruction_offset: 1046,
            }),
            pc: 0x1C7B2,
        };
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["pc"], 0x1C7B2);
        assert_eq!(json["function"]["base_address"], 0x1C39C);
        assert!(json["function"].get("name").is_none());
    }
}
