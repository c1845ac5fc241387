//! Error types for the postmortem analyzer

use thiserror::Error;

/// Main error type for crash log analysis
#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("No parser found for the provided crash log")]
    UnsupportedFormat,

    #[error("Failed to parse register value: {value} (line: {line})")]
    MalformedRegister { value: String, line: String },

    #[error("Failed to parse PC address: {value} (line: {line})")]
    MalformedBacktrace { value: String, line: String },

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Symbolizer not available: {0}")]
    SymbolizerUnavailable(String),

    #[error("Firmware not found: {0}")]
    FirmwareNotFound(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<anyhow::Error> for AnalyzerError {
    fn from(error: anyhow::Error) -> Self {
        AnalyzerError::InternalError(error.to_string())
    }
}

impl AnalyzerError {
    /// Whether the error was caused by the crash log text itself rather than the environment
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            AnalyzerError::UnsupportedFormat
                | AnalyzerError::MalformedRegister { .. }
                | AnalyzerError::MalformedBacktrace { .. }
                | AnalyzerError::InvalidAddress(_)
                | AnalyzerError::InvalidArgument(_)
        )
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AnalyzerError>;
