//! RMCP 0.3.2 tool handler for crash log analysis
//!
//! Each tool is a thin wrapper around a plain function returning JSON, so the
//! behavior can be exercised without an MCP transport.

use rmcp::{
    tool, tool_handler, tool_router, ServerHandler,
    handler::server::{router::tool::ToolRouter, tool::Parameters},
    model::*,
    ErrorData as McpError,
    service::RequestContext,
    RoleServer,
};
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, info};

use super::types::*;
use crate::config::SymbolizerConfig;
use crate::error::AnalyzerError;
use crate::parsers::{self, cleanup_and_split};
use crate::pipeline::{self, FaultSummary, FlagExplanation};
use crate::report::format_crash_report;
use crate::symbols::Symbolizer;

/// Crash log analysis tool handler
#[derive(Clone)]
pub struct PostmortemToolHandler {
    #[allow(dead_code)]
    tool_router: ToolRouter<PostmortemToolHandler>,
    symbolizer_config: Arc<SymbolizerConfig>,
}

impl PostmortemToolHandler {
    pub fn new(symbolizer_config: SymbolizerConfig) -> Self {
        Self {
            tool_router: Self::tool_router(),
            symbolizer_config: Arc::new(symbolizer_config),
        }
    }
}

impl Default for PostmortemToolHandler {
    fn default() -> Self {
        Self::new(SymbolizerConfig::default())
    }
}

#[tool_router]
impl PostmortemToolHandler {
    #[tool(description = "Analyze a Cortex-M firmware crash log (Marlin or HC32 fault handler output): detect the format, decode registers and fault flags, and resolve LR, PC and backtrace addresses against the firmware ELF")]
    async fn analyze_crash_log(&self, Parameters(args): Parameters<AnalyzeCrashLogArgs>) -> Result<CallToolResult, McpError> {
        debug!("Analyzing crash log ({} bytes)", args.log_text.len());

        let config = self
            .symbolizer_config
            .with_overrides(args.elf_path.as_deref(), args.addr2line_path.as_deref());
        let result = analyze_crash_log_json(&args.log_text, &config).await.map_err(to_mcp_error)?;

        json_result(&result)
    }

    #[tool(description = "Detect which crash log format the text contains and the line where it starts")]
    async fn detect_crash_format(&self, Parameters(args): Parameters<DetectCrashFormatArgs>) -> Result<CallToolResult, McpError> {
        json_result(&detect_crash_format_json(&args.log_text))
    }

    #[tool(description = "Decode Cortex-M CFSR, HFSR and PSR register values into their fault and condition flags")]
    async fn decode_fault_registers(&self, Parameters(args): Parameters<DecodeFaultRegistersArgs>) -> Result<CallToolResult, McpError> {
        let result = decode_fault_registers_json(
            args.cfsr.as_deref(),
            args.hfsr.as_deref(),
            args.psr.as_deref(),
        )
        .map_err(to_mcp_error)?;
        json_result(&result)
    }

    #[tool(description = "Resolve a code address to function, file and line using addr2line and the firmware ELF")]
    async fn resolve_address(&self, Parameters(args): Parameters<ResolveAddressArgs>) -> Result<CallToolResult, McpError> {
        let config = self
            .symbolizer_config
            .with_overrides(args.elf_path.as_deref(), args.addr2line_path.as_deref());
        let result = resolve_address_json(&args.address, &config).await.map_err(to_mcp_error)?;
        json_result(&result)
    }
}

// =============================================================================
// Tool implementations
// =============================================================================

/// Analyze, symbolicate and render a crash log
pub async fn analyze_crash_log_json(log_text: &str, config: &SymbolizerConfig) -> crate::error::Result<Value> {
    let analyzed = pipeline::analyze(log_text)?;
    let symbolizer = Symbolizer::from_config(config).await?;
    let symbolicated = pipeline::symbolicate(analyzed, &symbolizer).await;
    let report = format_crash_report(&symbolicated);
    info!(
        "Crash log analyzed with parser {} ({} frames)",
        symbolicated.parser,
        symbolicated.backtrace.len()
    );

    Ok(json!({
        "crash_log": serde_json::to_value(&symbolicated)?,
        "symbolicated": symbolizer.is_enabled(),
        "report": report,
    }))
}

/// Report the matching parser and start line, if any
pub fn detect_crash_format_json(log_text: &str) -> Value {
    let lines = cleanup_and_split(log_text);

    match parsers::select_parser(parsers::registered(), &lines) {
        Some((parser, index)) => json!({
            "detected": true,
            "parser": parser.name(),
            "backtrace_supported": parser.backtrace_supported(),
            "start_index": index,
            "start_line": lines[index],
        }),
        None => json!({
            "detected": false,
            "supported_formats": parsers::registered().iter().map(|p| p.name()).collect::<Vec<_>>(),
        }),
    }
}

fn explained(value: u32, flags: Vec<FlagExplanation>) -> Value {
    json!({
        "value": format!("0x{:08X}", value),
        "flags": flags,
    })
}

/// Decode whichever status registers were given
pub fn decode_fault_registers_json(cfsr: Option<&str>, hfsr: Option<&str>, psr: Option<&str>) -> crate::error::Result<Value> {
    if cfsr.is_none() && hfsr.is_none() && psr.is_none() {
        return Err(AnalyzerError::InvalidArgument(
            "at least one of cfsr, hfsr or psr is required".to_string(),
        ));
    }

    let cfsr = cfsr.map(parse_register_value).transpose()?;
    let hfsr = hfsr.map(parse_register_value).transpose()?;
    let psr = psr.map(parse_register_value).transpose()?;
    let summary = FaultSummary::decode(cfsr, hfsr, psr);

    let mut result = json!({});
    if let Some(value) = cfsr {
        result["cfsr"] = explained(value, summary.cfsr_explanations());
    }
    if let Some(value) = hfsr {
        result["hfsr"] = explained(value, summary.hfsr_explanations());
    }
    if let (Some(value), Some(decoded)) = (psr, &summary.psr) {
        result["psr"] = explained(value, summary.apsr_explanations());
        result["psr"]["ipsr"] = json!(decoded.ipsr);
    }
    Ok(result)
}

/// Resolve one address against the configured firmware
pub async fn resolve_address_json(address: &str, config: &SymbolizerConfig) -> crate::error::Result<Value> {
    let address = parse_register_value(address)?;
    if config.elf_path.is_none() {
        return Err(AnalyzerError::SymbolizerUnavailable(
            "no firmware ELF given; pass elf_path or start the server with --elf".to_string(),
        ));
    }

    let symbolizer = Symbolizer::from_config(config).await?;
    if !symbolizer.is_enabled() {
        return Err(AnalyzerError::SymbolizerUnavailable(format!(
            "neither {} nor the ELF symbol table is usable",
            config.addr2line_path.display()
        )));
    }

    let info = symbolizer.resolve(address).await;
    Ok(json!({
        "address": format!("0x{:08X}", address),
        "resolved": info.is_resolved(),
        "function": info.function_name(),
        "location": info.location,
        "symbol": info.symbol,
    }))
}

// =============================================================================
// Utility Functions
// =============================================================================

/// Parse a register value or address string (hex or decimal) to u32
pub fn parse_register_value(value_str: &str) -> crate::error::Result<u32> {
    let value_str = value_str.trim();

    let parsed = match value_str.strip_prefix("0x").or_else(|| value_str.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => value_str.parse::<u32>(),
    };
    parsed.map_err(|e| AnalyzerError::InvalidAddress(format!("{}: {}", value_str, e)))
}

fn to_mcp_error(e: AnalyzerError) -> McpError {
    match e {
        e if e.is_input_error() => McpError::invalid_params(e.to_string(), None),
        AnalyzerError::FirmwareNotFound(_) | AnalyzerError::SymbolizerUnavailable(_) => {
            McpError::invalid_params(e.to_string(), None)
        }
        e => {
            error!("Tool failed: {}", e);
            McpError::internal_error(e.to_string(), None)
        }
    }
}

fn json_result(value: &Value) -> Result<CallToolResult, McpError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| McpError::internal_error(format!("Failed to serialize result: {}", e), None))?;
    Ok(CallToolResult::success(vec![Content::text(text)]))
}

#[tool_handler]
impl ServerHandler for PostmortemToolHandler {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some("Firmware crash log analyzer for ARM Cortex-M. Paste the fault handler output captured from a serial console (Marlin POSTMORTEM_DEBUGGING or HC32F46x HardFault_Handler) and get decoded registers, fault flags and a symbolicated backtrace. Tools: analyze_crash_log, detect_crash_format, decode_fault_registers, resolve_address.".to_string()),
        }
    }

    async fn initialize(
        &self,
        _request: InitializeRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<InitializeResult, McpError> {
        info!("Postmortem analyzer MCP server initialized");
        Ok(self.get_info())
    }
}
