//! framework-arduino-hc32f46x `HardFault_Handler` crash log
//!
//! ```text
//! *** HARDFAULT ***
//! - FSR / FAR:
//! SCB->HFSR = 0x40000000
//! SCB->CFSR = 0x02000000
//! SCB->DFSR = 0x00000000
//! SCB->AFSR = 0x00000000
//! - Usage fault:
//!  * DIVBYZERO
//! - Stack frame:
//! R0 = 0x00000002
//! R1 = 0x1fff8c0c
//! R2 = 0x00000000
//! R3 = 0x000001c4
//! R12 = 0x7fffffff
//! LR = 0x1fff848c
//! PC = 0x0001af4a
//! PSR = 0x61000000
//! - Misc:
//! LR = 0xfffffff9
//! ***
//! ```
//!
//! The handler prints no backtrace.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use super::CrashLogParser;
use crate::crashlog::{CrashLog, CrashLogRegisters, Register};
use crate::error::Result;

const START_MARKER: &str = "*** HARDFAULT ***";

/// `R0 = 0x00000002`, `SCB->HFSR = 0x40000000`
static REGISTER_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^((?:SCB->)?[A-Za-z0-9]+)\s+=\s+0x([0-9A-Fa-f]+)$").expect("valid regex")
});

/// Register labels as printed by the handler. System control block registers
/// carry an `SCB->` prefix; MMAR and BFAR only appear while they are valid.
const REGISTER_NAMES: &[(&str, Register)] = &[
    ("R0", Register::R0),
    ("R1", Register::R1),
    ("R2", Register::R2),
    ("R3", Register::R3),
    ("R12", Register::R12),
    ("LR", Register::LR),
    ("PC", Register::PC),
    ("PSR", Register::PSR),
    ("SCB->CFSR", Register::CFSR),
    ("SCB->HFSR", Register::HFSR),
    ("SCB->DFSR", Register::DFSR),
    ("SCB->AFSR", Register::AFSR),
    ("SCB->MMAR", Register::MMAR),
    ("SCB->BFAR", Register::BFAR),
];

/// Parser for the HC32F46x Arduino core's hard fault handler output
#[derive(Debug, Clone, Copy, Default)]
pub struct Hc32Parser;

impl Hc32Parser {
    /// Parse a register dump line. Malformed values are logged and skipped.
    fn parse_register_line(line: &str) -> Option<(Register, u32)> {
        let caps = REGISTER_LINE.captures(line)?;

        let register = REGISTER_NAMES
            .iter()
            .find(|(name, _)| *name == &caps[1])
            .map(|(_, register)| *register)?;

        match u32::from_str_radix(&caps[2], 16) {
            Ok(value) => Some((register, value)),
            Err(e) => {
                warn!("Failed to parse register value: {} (line: {}): {}", &caps[2], line, e);
                None
            }
        }
    }
}

impl CrashLogParser for Hc32Parser {
    fn name(&self) -> &'static str {
        "hc32"
    }

    fn backtrace_supported(&self) -> bool {
        false
    }

    fn can_parse(&self, lines: &[String]) -> bool {
        lines.first().is_some_and(|line| line.starts_with(START_MARKER))
    }

    fn parse(&self, lines: &[String]) -> Result<CrashLog> {
        let mut registers = CrashLogRegisters::new();

        for line in lines {
            if let Some((register, value)) = Self::parse_register_line(line) {
                if !registers.insert_first(register, value) {
                    debug!("Ignoring repeated {} value 0x{:08X}", register, value);
                }
            }
        }

        Ok(CrashLog {
            registers,
            backtrace: Vec::new(),
        })
    }
}
