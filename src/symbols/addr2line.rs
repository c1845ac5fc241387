//! Wrapper around GNU `addr2line`
//!
//! One process is spawned per lookup: `addr2line -e <elf> -f -C <address>`.
//! The tool prints the demangled function name on the first line and
//! `path:line` on the second.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::Serialize;
use tokio::process::Command;
use tracing::{debug, warn};

/// Default tool name, looked up on `PATH`
pub const DEFAULT_ADDR2LINE: &str = "arm-none-eabi-addr2line";

/// `C:\path\to\marlin/Marlin\src\gcode/gcode.cpp:339 (discriminator 2)`
static PATH_AND_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+):(\d+)").expect("valid regex"));

/// Source file a code address belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFile {
    /// File name without directories
    pub name: String,
    /// Path as recorded in the debug info
    pub path: String,
}

/// Source location of a code address
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceLocation {
    pub file: SourceFile,
    pub line: u32,
    pub function_name: String,
}

impl std::fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}:{})", self.function_name, self.file.name, self.line)
    }
}

/// Last path component, accepting both `/` and `\` separators since firmware is
/// often built on Windows.
fn file_name(path: &str) -> &str {
    path.rsplit(['/', '\\'])
        .next()
        .filter(|name| !name.is_empty())
        .unwrap_or(path)
}

/// Parse the output of `addr2line -f`.
///
/// Returns `None` when the output is incomplete or addr2line could not resolve
/// the address (`??` / `??:0`).
pub fn parse_output(stdout: &str) -> Option<SourceLocation> {
    let mut lines = stdout.lines().map(str::trim);
    let function_name = lines.next()?;
    let path_and_line = lines.next()?;

    let caps = PATH_AND_LINE.captures(path_and_line)?;
    let path = &caps[1];
    let line = caps[2].parse::<u32>().ok()?;

    if path == "??" && function_name == "??" {
        return None;
    }

    Some(SourceLocation {
        file: SourceFile {
            name: file_name(path).to_string(),
            path: path.to_string(),
        },
        line,
        function_name: function_name.to_string(),
    })
}

/// Resolves code addresses against one firmware image
#[derive(Debug, Clone)]
pub struct Addr2Line {
    tool_path: PathBuf,
    elf_path: PathBuf,
    timeout: Duration,
}

impl Addr2Line {
    pub fn new(tool_path: impl Into<PathBuf>, elf_path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            tool_path: tool_path.into(),
            elf_path: elf_path.into(),
            timeout,
        }
    }

    /// Look up `address`. Any failure (spawn error, timeout, non-zero exit,
    /// unresolvable address) is logged and reported as `None`.
    pub async fn resolve(&self, address: u32) -> Option<SourceLocation> {
        let mut cmd = Command::new(&self.tool_path);
        cmd.arg("-e")
            .arg(&self.elf_path)
            .args(["-f", "-C"])
            .arg(format!("{:#x}", address))
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                warn!("Failed to execute {}: {}", self.tool_path.display(), e);
                return None;
            }
            Err(_) => {
                warn!(
                    "{} timed out after {:?} resolving 0x{:08X} in {}",
                    self.tool_path.display(),
                    self.timeout,
                    address,
                    self.elf_path.display()
                );
                return None;
            }
        };

        if !output.status.success() {
            debug!(
                "addr2line exited with {} for 0x{:08X}: {}",
                output.status,
                address,
                String::from_utf8_lossy(&output.stderr).trim()
            );
            return None;
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let location = parse_output(&stdout);
        if location.is_none() {
            debug!("Could not resolve 0x{:08X}: {:?}", address, stdout);
        }
        location
    }

    /// Check that `tool_path` runs and identifies itself as addr2line.
    ///
    /// Executing successfully is not enough: `--version` output must name the tool,
    /// so e.g. a compiler binary passed by mistake is rejected.
    pub async fn is_available(tool_path: &Path, timeout: Duration) -> bool {
        let mut cmd = Command::new(tool_path);
        cmd.arg("--version").stdin(Stdio::null()).kill_on_drop(true);

        let output = match tokio::time::timeout(timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                debug!("{} is not executable: {}", tool_path.display(), e);
                return false;
            }
            Err(_) => {
                debug!("{} --version timed out", tool_path.display());
                return false;
            }
        };

        if !output.status.success() {
            return false;
        }

        let version = String::from_utf8_lossy(&output.stdout).to_lowercase();
        let identified = version.contains("addr2line");
        if !identified {
            debug!("{} does not look like addr2line: {:?}", tool_path.display(), version.lines().next());
        }
        identified
    }
}
