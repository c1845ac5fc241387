//! Crash log MCP tools module
//!
//! A single tool handler exposing crash log analysis using the RMCP 0.3.2 API patterns.

pub mod crash_tools;
pub mod types;

pub use crash_tools::*;
pub use types::*;
