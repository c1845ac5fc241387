//! Postmortem Analyzer
//!
//! Decodes ARM Cortex-M crash logs printed by firmware fault handlers over a serial
//! console. The log format is detected automatically, registers and backtrace are
//! parsed, CFSR/HFSR/PSR are decoded into named fault flags, and code addresses are
//! resolved to source locations with `addr2line`. The same functionality is served
//! to AI assistants as Model Context Protocol tools.

pub mod config;
pub mod crashlog;
pub mod error;
pub mod parsers;
pub mod pipeline;
pub mod registers;
pub mod report;
pub mod symbols;
pub mod tools;

pub use config::Config;
pub use crashlog::{CrashLog, Register};
pub use error::{AnalyzerError, Result};
pub use pipeline::{analyze, symbolicate};
pub use tools::PostmortemToolHandler;
