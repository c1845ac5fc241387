//! Plain-text crash report

use std::fmt::Write;

use crate::crashlog::Register;
use crate::pipeline::{FlagExplanation, SymbolicatedCrashLog, SymbolicatedFrame};
use crate::symbols::AddressInfo;

/// Further reading on interpreting CFSR flags
pub const CFSR_REFERENCES: [&str; 3] = [
    "https://interrupt.memfault.com/blog/cortex-m-fault-debug",
    "https://developer.arm.com/documentation/dui0552/a/cortex-m3-peripherals/system-control-block/configurable-fault-status-register",
    "https://developer.arm.com/documentation/dui0553/a/the-cortex-m4-processor/exception-model/fault-reporting/cfsr---configurable-fault-status-register",
];

const UNKNOWN_FUNCTION: &str = "??";
const UNKNOWN_LOCATION: &str = "??:?";

/// Width of the register name column, fits `ExcLR`
const NAME_WIDTH: usize = 6;

fn function_or_unknown(info: &AddressInfo) -> &str {
    info.function_name().unwrap_or(UNKNOWN_FUNCTION)
}

fn location_or_unknown(info: &AddressInfo) -> String {
    info.file_line().unwrap_or_else(|| UNKNOWN_LOCATION.to_string())
}

fn push_flag(report: &mut String, flag: &FlagExplanation, extra: Option<String>) {
    let _ = write!(report, "  {:width$}  - {}: {}", "", flag.name, flag.description, width = NAME_WIDTH);
    if let Some(extra) = extra {
        let _ = write!(report, "  {}", extra);
    }
    report.push('\n');
}

fn push_registers(report: &mut String, log: &SymbolicatedCrashLog) {
    let faults = &log.faults;

    for (register, value) in log.registers.iter() {
        let _ = write!(report, "  {:width$}  0x{:08x}", register.name(), value, width = NAME_WIDTH);

        let code_address = match register {
            Register::LR => log.lr.as_ref(),
            Register::PC => log.pc.as_ref(),
            _ => None,
        };
        if let Some(info) = code_address.filter(|info| info.is_resolved()) {
            let _ = write!(report, "  {}  {}", function_or_unknown(info), location_or_unknown(info));
        }
        report.push('\n');

        match register {
            Register::CFSR => {
                for flag in faults.cfsr_explanations() {
                    let extra = match flag.name {
                        "MMARVALID" => faults.mmar.map(|a| format!("MMAR: 0x{:08x}", a)),
                        "BFARVALID" => faults.bfar.map(|a| format!("BFAR: 0x{:08x}", a)),
                        _ => None,
                    };
                    push_flag(report, &flag, extra);
                }
            }
            Register::HFSR => {
                for flag in faults.hfsr_explanations() {
                    push_flag(report, &flag, None);
                }
            }
            Register::PSR => {
                if let Some(psr) = &faults.psr {
                    let _ = writeln!(report, "  {:width$}  - IPSR: {}", "", psr.ipsr, width = NAME_WIDTH);
                }
                for flag in faults.apsr_explanations() {
                    push_flag(report, &flag, None);
                }
            }
            _ => {}
        }
    }
}

fn frame_origin(frame: &SymbolicatedFrame) -> String {
    match &frame.item.function {
        Some(function) => format!("0x{:08x}+{}", function.base_address, function.instruction_offset),
        None => format!("{}+{}", UNKNOWN_FUNCTION, UNKNOWN_FUNCTION),
    }
}

fn push_backtrace(report: &mut String, frames: &[SymbolicatedFrame]) {
    let rows: Vec<[String; 4]> = frames
        .iter()
        .enumerate()
        .map(|(i, frame)| {
            [
                i.to_string(),
                format!("0x{:08x} ({})", frame.item.pc, frame_origin(frame)),
                frame.function_name().unwrap_or(UNKNOWN_FUNCTION).to_string(),
                location_or_unknown(&frame.source),
            ]
        })
        .collect();

    let header = ["#", "Address (Function+Offset)", "Function", "File:Line"].map(String::from);
    let mut widths = header.clone().map(|h| h.len());
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    for row in std::iter::once(&header).chain(&rows) {
        let line = row
            .iter()
            .zip(widths)
            .map(|(cell, width)| format!("{:width$}", cell))
            .collect::<Vec<_>>()
            .join(" | ");
        let _ = writeln!(report, "  {}", line.trim_end());
    }
}

/// Format a symbolicated crash log as a plain-text report.
///
/// Unresolved functions print as `??` and unresolved locations as `??:?`.
pub fn format_crash_report(log: &SymbolicatedCrashLog) -> String {
    let mut report = String::new();

    report.push_str("=== Crash Analysis Report ===\n\n");
    let _ = writeln!(report, "Parser: {}", log.parser);
    let _ = writeln!(report, "Skipped lines before crash log: {}", log.start_index);

    report.push_str("\nRegisters:\n");
    if log.registers.is_empty() {
        report.push_str("  No registers found\n");
    } else {
        push_registers(&mut report, log);
    }

    if log.backtrace_supported {
        report.push_str("\nBacktrace:\n");
        if log.backtrace.is_empty() {
            report.push_str("  No backtrace found\n");
        } else {
            push_backtrace(&mut report, &log.backtrace);
        }
    }

    if log.registers.get(Register::CFSR).is_some_and(|cfsr| cfsr != 0) {
        report.push_str("\nFor more information on how to interpret the CFSR flags, see:\n");
        for link in CFSR_REFERENCES {
            let _ = writeln!(report, "  - {}", link);
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{analyze, symbolicate};
    use crate::symbols::{ElfSymbols, Symbolizer};

    async fn report_for(text: &str, symbolizer: &Symbolizer) -> String {
        let analyzed = analyze(text).unwrap();
        format_crash_report(&symbolicate(analyzed, symbolizer).await)
    }

    const MARLIN_LOG: &str = "\
## Software Fault detected ##
LR   : 0x1FFF8494
PC   : 0x0001C7B2
PSR  : 0x61000000
CFSR : 0x02000080
HFSR : 0x40000000
MMAR : 0xE000ED34
Backtrace:#1 : unknown@0x0001C39C+1046 PC:0x0001C7B2
#2 : loop@0x0001BA20+1746 PC:0x0001C0F2
";

    #[tokio::test]
    async fn test_register_table() {
        let report = report_for(MARLIN_LOG, &Symbolizer::disabled()).await;

        assert!(report.starts_with("=== Crash Analysis Report ===\n"));
        assert!(report.contains("Parser: marlin"));
        assert!(report.contains("  PC      0x0001c7b2\n"));
        assert!(report.contains("- DIVBYZERO: Division By Zero"));
        assert!(report.contains("- MMARVALID: Memory Management Fault Address Register (MMAR) is valid  MMAR: 0xe000ed34"));
        assert!(report.contains("- FORCED: Forced Hard Fault"));
        assert!(report.contains("- IPSR: 0"));
        assert!(report.contains("- Z: Zero Condition Flag"));
    }

    #[tokio::test]
    async fn test_backtrace_table_unresolved() {
        let report = report_for(MARLIN_LOG, &Symbolizer::disabled()).await;

        assert!(report.contains("# | Address (Function+Offset)"));
        let frame0 = report.lines().find(|l| l.trim_start().starts_with("0 |")).unwrap();
        assert!(frame0.contains("0x0001c7b2 (0x0001c39c+1046)"));
        assert!(frame0.contains("| ??"));
        assert!(frame0.ends_with("??:?"));

        let frame1 = report.lines().find(|l| l.trim_start().starts_with("1 |")).unwrap();
        assert!(frame1.contains("| loop"));
    }

    #[tokio::test]
    async fn test_backtrace_uses_symbol_table() {
        let symbols = ElfSymbols::from_entries(vec![("GcodeSuite::G28()", 0x0001C39D, 0x500)]);
        let symbolizer = Symbolizer::from_parts(None, Some(symbols), true, 2);
        let report = report_for(MARLIN_LOG, &symbolizer).await;

        assert!(report.contains("  PC      0x0001c7b2  GcodeSuite::G28()+0x416  ??:?\n"));
        assert!(report.contains("  LR      0x1fff8494\n"));
    }

    #[tokio::test]
    async fn test_no_backtrace_found() {
        let report = report_for("## Software Fault detected ##\nPC   : 0x0001C7B2\n", &Symbolizer::disabled()).await;
        assert!(report.contains("Backtrace:\n  No backtrace found\n"));
    }

    #[tokio::test]
    async fn test_backtrace_section_omitted_for_hc32() {
        let report = report_for("*** HARDFAULT ***\nSCB->CFSR = 0x00000000\nPC = 0x0001af4a\n", &Symbolizer::disabled()).await;
        assert!(report.contains("Parser: hc32"));
        assert!(!report.contains("Backtrace:"));
    }

    #[tokio::test]
    async fn test_cfsr_links_only_for_nonzero_cfsr() {
        let with_fault = report_for(MARLIN_LOG, &Symbolizer::disabled()).await;
        for link in CFSR_REFERENCES {
            assert!(with_fault.contains(link));
        }

        let clean = report_for("## Software Fault detected ##\nCFSR : 0x00000000\n", &Symbolizer::disabled()).await;
        assert!(!clean.contains(CFSR_REFERENCES[0]));
    }
}
