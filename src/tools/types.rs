//! Argument types for the crash log MCP tools

use serde::Deserialize;
use schemars::JsonSchema;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct AnalyzeCrashLogArgs {
    /// Raw crash log text as captured from the serial console
    pub log_text: String,
    /// Path to the firmware ELF (overrides the configured one)
    pub elf_path: Option<String>,
    /// Path to the addr2line executable (overrides the configured one)
    pub addr2line_path: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DetectCrashFormatArgs {
    /// Raw crash log text as captured from the serial console
    pub log_text: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DecodeFaultRegistersArgs {
    /// CFSR value (hex string like "0x02000000" or decimal)
    pub cfsr: Option<String>,
    /// HFSR value (hex string like "0x40000000" or decimal)
    pub hfsr: Option<String>,
    /// PSR value (hex string like "0x61000000" or decimal)
    pub psr: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ResolveAddressArgs {
    /// Code address (hex string like "0x0001C7B2" or decimal)
    pub address: String,
    /// Path to the firmware ELF (overrides the configured one)
    pub elf_path: Option<String>,
    /// Path to the addr2line executable (overrides the configured one)
    pub addr2line_path: Option<String>,
}
