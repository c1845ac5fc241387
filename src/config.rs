//! Configuration management for the postmortem analyzer

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use clap::Parser;
use crate::error::{AnalyzerError, Result};
use crate::symbols::addr2line::DEFAULT_ADDR2LINE;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "postmortem-analyzer")]
#[command(about = "A Model Context Protocol server for decoding firmware crash logs")]
#[command(version)]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace) [default: info]
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log file path
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// addr2line executable (e.g. arm-none-eabi-addr2line)
    #[arg(long, env = "POSTMORTEM_ADDR2LINE")]
    pub addr2line: Option<PathBuf>,

    /// Firmware ELF used to symbolicate addresses
    #[arg(long, env = "POSTMORTEM_ELF")]
    pub elf: Option<PathBuf>,

    /// Timeout for a single address lookup in milliseconds
    #[arg(long)]
    pub lookup_timeout: Option<u64>,

    /// Maximum number of addr2line processes running at once
    #[arg(long)]
    pub max_concurrent_lookups: Option<usize>,

    /// Disable the per-run address cache
    #[arg(long)]
    pub no_cache: bool,

    /// Analyze this crash log file, print a report and exit
    #[arg(long)]
    pub crash_log: Option<PathBuf>,

    /// Generate default configuration file
    #[arg(long)]
    pub generate_config: bool,

    /// Validate configuration and exit
    #[arg(long)]
    pub validate_config: bool,

    /// Show current configuration and exit
    #[arg(long)]
    pub show_config: bool,
}

/// Main configuration structure
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub symbolizer: SymbolizerConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from file or create default
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            let content = std::fs::read_to_string(path)
                .map_err(|e| AnalyzerError::InvalidConfig(format!("Failed to read config file: {}", e)))?;
            let config: Config = toml::from_str(&content)
                .map_err(|e| AnalyzerError::InvalidConfig(format!("Invalid TOML syntax: {}", e)))?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Merge command line arguments into configuration
    pub fn merge_args(&mut self, args: &Args) {
        if let Some(addr2line) = &args.addr2line {
            self.symbolizer.addr2line_path = addr2line.clone();
        }
        if let Some(elf) = &args.elf {
            self.symbolizer.elf_path = Some(elf.clone());
        }
        if let Some(timeout) = args.lookup_timeout {
            self.symbolizer.lookup_timeout_ms = timeout;
        }
        if let Some(max) = args.max_concurrent_lookups {
            self.symbolizer.max_concurrent_lookups = max;
        }
        if args.no_cache {
            self.symbolizer.cache_enable = false;
        }
        if let Some(level) = &args.log_level {
            self.logging.level = level.clone();
        }
        if args.log_file.is_some() {
            self.logging.file = args.log_file.clone();
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.symbolizer.lookup_timeout_ms == 0 {
            return Err(AnalyzerError::InvalidConfig("lookup_timeout_ms must be > 0".to_string()));
        }
        if self.symbolizer.max_concurrent_lookups == 0 {
            return Err(AnalyzerError::InvalidConfig("max_concurrent_lookups must be > 0".to_string()));
        }
        if self.symbolizer.addr2line_path.as_os_str().is_empty() {
            return Err(AnalyzerError::InvalidConfig("addr2line_path must not be empty".to_string()));
        }
        Ok(())
    }

    /// Generate TOML configuration string
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| AnalyzerError::InvalidConfig(format!("Failed to serialize config: {}", e)))
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct SymbolizerConfig {
    /// addr2line executable, looked up on `PATH` when not absolute
    pub addr2line_path: PathBuf,
    /// Firmware ELF; symbolication is skipped when unset
    pub elf_path: Option<PathBuf>,
    pub lookup_timeout_ms: u64,
    pub max_concurrent_lookups: usize,
    pub cache_enable: bool,
}

impl Default for SymbolizerConfig {
    fn default() -> Self {
        Self {
            addr2line_path: PathBuf::from(DEFAULT_ADDR2LINE),
            elf_path: None,
            lookup_timeout_ms: 5000,
            max_concurrent_lookups: 4,
            cache_enable: true,
        }
    }
}

impl SymbolizerConfig {
    /// Copy with per-request overrides applied
    pub fn with_overrides(&self, elf_path: Option<&str>, addr2line_path: Option<&str>) -> Self {
        let mut config = self.clone();
        if let Some(elf) = elf_path {
            config.elf_path = Some(PathBuf::from(elf));
        }
        if let Some(tool) = addr2line_path {
            config.addr2line_path = PathBuf::from(tool);
        }
        config
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.symbolizer.addr2line_path, PathBuf::from("arm-none-eabi-addr2line"));
        assert_eq!(config.symbolizer.lookup_timeout_ms, 5000);
        assert_eq!(config.symbolizer.max_concurrent_lookups, 4);
        assert!(config.symbolizer.cache_enable);
        assert!(config.symbolizer.elf_path.is_none());
    }

    #[test]
    fn test_merge_args() {
        let args = Args::parse_from([
            "postmortem-analyzer",
            "--elf", "/tmp/firmware.elf",
            "--addr2line", "/opt/gcc/bin/arm-none-eabi-addr2line",
            "--lookup-timeout", "250",
            "--no-cache",
            "--log-level", "debug",
        ]);

        let mut config = Config::default();
        config.merge_args(&args);

        assert_eq!(config.symbolizer.elf_path, Some(PathBuf::from("/tmp/firmware.elf")));
        assert_eq!(
            config.symbolizer.addr2line_path,
            PathBuf::from("/opt/gcc/bin/arm-none-eabi-addr2line")
        );
        assert_eq!(config.symbolizer.lookup_timeout_ms, 250);
        assert_eq!(config.symbolizer.max_concurrent_lookups, 4);
        assert!(!config.symbolizer.cache_enable);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let mut config = Config::default();
        config.symbolizer.max_concurrent_lookups = 0;
        assert!(matches!(config.validate(), Err(AnalyzerError::InvalidConfig(_))));

        let mut config = Config::default();
        config.symbolizer.lookup_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let mut config = Config::default();
        config.symbolizer.elf_path = Some(PathBuf::from("build/firmware.elf"));

        let text = config.to_toml().unwrap();
        assert!(text.contains("[symbolizer]"));
        assert!(text.contains("[logging]"));

        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.symbolizer.elf_path, config.symbolizer.elf_path);
        assert_eq!(parsed.symbolizer.lookup_timeout_ms, 5000);
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[symbolizer]\nmax_concurrent_lookups = 8").unwrap();

        let config = Config::load(Some(&file.path().to_path_buf())).unwrap();
        assert_eq!(config.symbolizer.max_concurrent_lookups, 8);
        assert_eq!(config.symbolizer.lookup_timeout_ms, 5000);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_file_logging_settings_survive_merge() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[logging]\nlevel = \"debug\"\nfile = \"/tmp/postmortem.log\"").unwrap();

        let mut config = Config::load(Some(&file.path().to_path_buf())).unwrap();
        config.merge_args(&Args::parse_from(["postmortem-analyzer"]));
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.file, Some(PathBuf::from("/tmp/postmortem.log")));

        config.merge_args(&Args::parse_from(["postmortem-analyzer", "--log-level", "trace"]));
        assert_eq!(config.logging.level, "trace");
        assert_eq!(config.logging.file, Some(PathBuf::from("/tmp/postmortem.log")));
    }

    #[test]
    fn test_load_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[symbolizer\nbroken").unwrap();
        assert!(Config::load(Some(&file.path().to_path_buf())).is_err());

        let missing = PathBuf::from("/nonexistent/postmortem.toml");
        assert!(Config::load(Some(&missing)).is_err());
    }

    #[test]
    fn test_with_overrides() {
        let base = SymbolizerConfig::default();
        let config = base.with_overrides(Some("fw.elf"), None);
        assert_eq!(config.elf_path, Some(PathBuf::from("fw.elf")));
        assert_eq!(config.addr2line_path, base.addr2line_path);
    }
}
