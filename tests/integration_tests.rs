//! Integration tests for the postmortem analyzer

use postmortem_analyzer::{analyze, symbolicate, AnalyzerError, Config, Register};
use postmortem_analyzer::report::format_crash_report;
use postmortem_analyzer::symbols::Symbolizer;

const MARLIN_CAPTURE: &str = "\
Send: G28
Recv: echo:busy: processing
Recv: ## Software Fault detected ##
Recv: Cause: Hard
Recv: R0   : 0x00000002
Recv: R1   : 0x1FFF8B31
Recv: R2   : 0x00000000
Recv: R3   : 0x000001C4
Recv: R12  : 0x7FFFFFFF
Recv: LR   : 0x1FFF8494
Recv: PC   : 0x0001C7B2
Recv: PSR  : 0x61000000
Recv: CFSR : 0x02000000
Recv: HFSR : 0x40000000
Recv: DFSR : 0x00000000
Recv: AFSR : 0x00000000
Recv: MMAR : 0xE000ED34
Recv: BFAR : 0xE000ED38
Recv: ExcLR: 0xFFFFFFF9
Recv: ExcSP: 0x1FFFB158
Recv: Backtrace:#1 : unknown@0x0001C39C+1046 PC:0x0001C7B2
Recv: #2 : unknown@0x0001BA20+1746 PC:0x0001C0F2
Recv: #3 : unknown@0x0001E4B4+102 PC:0x0001E51A
";

#[tokio::test]
async fn test_config_validation() {
    let config = Config::default();
    assert!(config.validate().is_ok());

    // Test TOML serialization
    let toml_str = config.to_toml().unwrap();
    assert!(toml_str.contains("[symbolizer]"));
    assert!(toml_str.contains("[logging]"));
}

#[test]
fn test_error_types() {
    let error = AnalyzerError::UnsupportedFormat;
    assert!(error.to_string().contains("No parser found"));
    assert!(error.is_input_error());

    let error = AnalyzerError::FirmwareNotFound("fw.elf".to_string());
    assert!(error.to_string().contains("fw.elf"));
    assert!(!error.is_input_error());
}

#[test]
fn test_analyze_terminal_capture() {
    let analyzed = analyze(MARLIN_CAPTURE).unwrap();

    assert_eq!(analyzed.parser, "marlin");
    assert_eq!(analyzed.start_index, 2);
    assert_eq!(analyzed.crash_log.registers.len(), 16);
    assert_eq!(analyzed.crash_log.registers.get(Register::ExcSP), Some(0x1FFFB158));
    assert_eq!(analyzed.crash_log.backtrace.len(), 3);
}

#[test]
fn test_report_without_firmware() {
    let report = tokio_test::block_on(async {
        let analyzed = analyze(MARLIN_CAPTURE).unwrap();
        format_crash_report(&symbolicate(analyzed, &Symbolizer::disabled()).await)
    });

    assert!(report.contains("Parser: marlin"));
    assert!(report.contains("- DIVBYZERO: Division By Zero"));
    assert!(report.contains("- FORCED: Forced Hard Fault"));
    assert!(report.contains("??:?"));
    assert!(report.contains("https://interrupt.memfault.com/blog/cortex-m-fault-debug"));
}

#[tokio::test]
async fn test_hc32_log() {
    let log = "\
*** HARDFAULT ***
- FSR / FAR:
SCB->HFSR = 0x40000000
SCB->CFSR = 0x02000000
- Stack frame:
LR = 0x1fff848c
PC = 0x0001af4a
- Misc:
LR = 0xfffffff9
***
";
    let analyzed = analyze(log).unwrap();
    assert_eq!(analyzed.parser, "hc32");
    assert_eq!(analyzed.crash_log.registers.get(Register::LR), Some(0x1fff848c));

    let report = format_crash_report(&symbolicate(analyzed, &Symbolizer::disabled()).await);
    assert!(!report.contains("Backtrace:"));
}

#[cfg(unix)]
#[tokio::test]
async fn test_symbolicate_with_fake_addr2line() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let elf = dir.path().join("firmware.elf");
    std::fs::write(&elf, b"placeholder").unwrap();

    let tool = dir.path().join("arm-none-eabi-addr2line");
    std::fs::write(
        &tool,
        r#"#!/bin/sh
if [ "$1" = "--version" ]; then
  echo "GNU addr2line (GNU Arm Embedded Toolchain) 2.38"
  exit 0
fi
case "$5" in
  0x1c7b2) echo "GcodeSuite::G28()"; echo "/src/Marlin/src/gcode/calibrate/G28.cpp:120" ;;
  0x1c0f2) echo "GcodeSuite::process_parsed_command(bool)"; echo "/src/Marlin/src/gcode/gcode.cpp:339 (discriminator 2)" ;;
  *) echo "??"; echo "??:0" ;;
esac
"#,
    )
    .unwrap();
    std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();

    let mut config = Config::default();
    config.symbolizer.elf_path = Some(elf);
    config.symbolizer.addr2line_path = tool;

    let symbolizer = Symbolizer::from_config(&config.symbolizer).await.unwrap();
    assert!(symbolizer.has_addr2line());

    let result = symbolicate(analyze(MARLIN_CAPTURE).unwrap(), &symbolizer).await;

    let pc = result.pc.as_ref().unwrap();
    assert_eq!(pc.function_name(), Some("GcodeSuite::G28()"));
    assert_eq!(pc.file_line().as_deref(), Some("G28.cpp:120"));
    assert!(!result.lr.as_ref().unwrap().is_resolved());

    assert_eq!(result.backtrace[0].function_name(), Some("GcodeSuite::G28()"));
    assert_eq!(
        result.backtrace[1].source.file_line().as_deref(),
        Some("gcode.cpp:339")
    );
    assert!(!result.backtrace[2].source.is_resolved());

    let report = format_crash_report(&result);
    assert!(report.contains("GcodeSuite::G28()  G28.cpp:120"));
    assert!(report.contains("GcodeSuite::process_parsed_command(bool)"));
}

#[tokio::test]
async fn test_mcp_tool_handler() {
    use postmortem_analyzer::PostmortemToolHandler;
    use postmortem_analyzer::tools::{analyze_crash_log_json, detect_crash_format_json};

    let config = Config::default();
    let _handler = PostmortemToolHandler::new(config.symbolizer.clone());

    let detected = detect_crash_format_json(MARLIN_CAPTURE);
    assert_eq!(detected["parser"], "marlin");
    assert_eq!(detected["start_index"], 2);

    let result = analyze_crash_log_json(MARLIN_CAPTURE, &config.symbolizer).await.unwrap();
    assert_eq!(result["crash_log"]["registers"]["CFSR"], 0x02000000);
    assert_eq!(result["crash_log"]["backtrace"].as_array().unwrap().len(), 3);
}
