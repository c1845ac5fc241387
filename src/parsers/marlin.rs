//! Marlin `POSTMORTEM_DEBUGGING` crash log
//!
//! ```text
//! ## Software Fault detected ##
//! Cause: Hard
//! R0   : 0x00000002
//! R1   : 0x1FFF8B31
//! R2   : 0x00000000
//! R3   : 0x000001C4
//! R12  : 0x7FFFFFFF
//! LR   : 0x1FFF8494
//! PC   : 0x0001C7B2
//! PSR  : 0x61000000
//! CFSR : 0x02000000
//! HFSR : 0x40000000
//! DFSR : 0x00000000
//! AFSR : 0x00000000
//! MMAR : 0xE000ED34
//! BFAR : 0xE000ED38
//! ExcLR: 0xFFFFFFF9
//! ExcSP: 0x1FFFB158
//! Backtrace:#1 : unknown@0x0001C39C+1046 PC:0x0001C7B2
//! #2 : unknown@0x0001BA20+1746 PC:0x0001C0F2
//! ```

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use super::CrashLogParser;
use crate::crashlog::{BacktraceItem, CrashLog, CrashLogRegisters, FunctionInfo, Register};
use crate::error::{AnalyzerError, Result};

const START_MARKER: &str = "## Software Fault detected ##";

/// `R0   : 0x00000001`, `ExcLR: 0xFFFFFFF9`
static REGISTER_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z0-9]+)\s*:\s+0x([0-9A-Fa-f]+)$").expect("valid regex"));

/// `#<position> : <name>@0x<base>+<offset> PC:0x<pc>`, base and pc hex, offset decimal
static BACKTRACE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"#(\d+) : ([^@]+)@0x([0-9A-Fa-f]+)\+(\d+) PC:0x([0-9A-Fa-f]+)").expect("valid regex")
});

/// Register labels Marlin prints, all spelled like the canonical names
const REGISTER_NAMES: &[(&str, Register)] = &[
    ("R0", Register::R0),
    ("R1", Register::R1),
    ("R2", Register::R2),
    ("R3", Register::R3),
    ("R12", Register::R12),
    ("LR", Register::LR),
    ("PC", Register::PC),
    ("PSR", Register::PSR),
    ("CFSR", Register::CFSR),
    ("HFSR", Register::HFSR),
    ("DFSR", Register::DFSR),
    ("AFSR", Register::AFSR),
    ("MMAR", Register::MMAR),
    ("BFAR", Register::BFAR),
    ("ExcLR", Register::ExcLR),
    ("ExcSP", Register::ExcSP),
];

/// Parser for Marlin's software fault handler output
#[derive(Debug, Clone, Copy, Default)]
pub struct MarlinParser;

impl MarlinParser {
    /// Parse a register dump line. Malformed values abort the whole log.
    fn parse_register_line(line: &str) -> Result<Option<(Register, u32)>> {
        let Some(caps) = REGISTER_LINE.captures(line) else {
            return Ok(None);
        };

        let Some(register) = REGISTER_NAMES
            .iter()
            .find(|(name, _)| *name == &caps[1])
            .map(|(_, register)| *register)
        else {
            return Ok(None);
        };

        let value = u32::from_str_radix(&caps[2], 16).map_err(|_| AnalyzerError::MalformedRegister {
            value: caps[2].to_string(),
            line: line.to_string(),
        })?;

        Ok(Some((register, value)))
    }

    /// Parse a backtrace frame. The pattern is not anchored because the first frame
    /// shares its line with the `Backtrace:` label.
    fn parse_backtrace_line(line: &str) -> Result<Option<BacktraceItem>> {
        let Some(caps) = BACKTRACE_LINE.captures(line) else {
            return Ok(None);
        };

        let name = match &caps[2] {
            "unknown" => None,
            name => Some(name.to_string()),
        };
        let base_address = u32::from_str_radix(&caps[3], 16).ok();
        let instruction_offset = caps[4].parse::<u32>().ok();

        let pc = u32::from_str_radix(&caps[5], 16).map_err(|_| AnalyzerError::MalformedBacktrace {
            value: caps[5].to_string(),
            line: line.to_string(),
        })?;

        let function = match (base_address, instruction_offset) {
            (Some(base_address), Some(instruction_offset)) => Some(FunctionInfo {
                name,
                base_address,
                instruction_offset,
            }),
            _ => None,
        };

        debug!("Backtrace frame #{}: pc=0x{:08X}", &caps[1], pc);
        Ok(Some(BacktraceItem { function, pc }))
    }
}

impl CrashLogParser for MarlinParser {
    fn name(&self) -> &'static str {
        "marlin"
    }

    fn backtrace_supported(&self) -> bool {
        true
    }

    fn can_parse(&self, lines: &[String]) -> bool {
        lines.first().is_some_and(|line| line.starts_with(START_MARKER))
    }

    fn parse(&self, lines: &[String]) -> Result<CrashLog> {
        let mut registers = CrashLogRegisters::new();
        let mut backtrace = Vec::new();

        for line in lines {
            if let Some((register, value)) = Self::parse_register_line(line)? {
                if !registers.insert_first(register, value) {
                    debug!("Ignoring repeated {} value 0x{:08X}", register, value);
                }
            }

            if let Some(item) = Self::parse_backtrace_line(line)? {
                backtrace.push(item);
            }
        }

        Ok(CrashLog { registers, backtrace })
    }
}
