//! Crash log format detection and parsing
//!
//! Every supported firmware fault handler gets a [`CrashLogParser`]. Parsers are
//! tried in registration order; the first one whose start marker appears anywhere
//! in the cleaned-up log wins.

pub mod hc32;
pub mod marlin;

use serde::Serialize;
use tracing::debug;

use crate::crashlog::CrashLog;
use crate::error::Result;

pub use hc32::Hc32Parser;
pub use marlin::MarlinParser;

/// Result of scanning a log for a parser's start marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StartIndex {
    /// Index of the first line of the crash log, 0 when not found
    pub index: usize,
    /// Whether the start marker was found
    pub can_parse: bool,
}

/// A crash log format.
///
/// Lines passed in have already gone through [`cleanup_and_split`], so they are
/// trimmed and never empty.
pub trait CrashLogParser: Send + Sync {
    /// Stable identifier, e.g. `marlin`
    fn name(&self) -> &'static str;

    /// Whether this format ever prints a backtrace
    fn backtrace_supported(&self) -> bool;

    /// Check whether the first line is this format's start marker.
    ///
    /// Must look at `lines[0]` only. [`find_start_index`](Self::find_start_index)
    /// probes single lines, so a format whose start can only be confirmed with
    /// multiple lines of context cannot be detected through this contract.
    fn can_parse(&self, lines: &[String]) -> bool;

    /// Parse a crash log starting exactly at the start marker.
    fn parse(&self, lines: &[String]) -> Result<CrashLog>;

    /// Find the first line that starts a crash log of this format.
    fn find_start_index(&self, lines: &[String]) -> StartIndex {
        lines
            .iter()
            .position(|line| self.can_parse(std::slice::from_ref(line)))
            .map(|index| StartIndex { index, can_parse: true })
            .unwrap_or(StartIndex { index: 0, can_parse: false })
    }
}

static PARSERS: &[&dyn CrashLogParser] = &[&MarlinParser, &Hc32Parser];

/// Built-in parsers in priority order
pub fn registered() -> &'static [&'static dyn CrashLogParser] {
    PARSERS
}

/// Pick the first parser in `parsers` that recognizes `lines`, with its start index.
pub fn select_parser<'a>(
    parsers: &[&'a dyn CrashLogParser],
    lines: &[String],
) -> Option<(&'a dyn CrashLogParser, usize)> {
    for parser in parsers {
        let start = parser.find_start_index(lines);
        debug!("Parser {} start probe: {:?}", parser.name(), start);
        if start.can_parse {
            return Some((*parser, start.index));
        }
    }
    None
}

/// Serial terminal prefixes added by host tools such as OctoPrint
const TERMINAL_PREFIXES: [&str; 2] = ["recv:", "send:"];

fn strip_terminal_prefix(line: &str) -> Option<&str> {
    TERMINAL_PREFIXES.iter().find_map(|prefix| {
        line.get(..prefix.len())
            .filter(|head| head.eq_ignore_ascii_case(prefix))
            .map(|_| &line[prefix.len()..])
    })
}

/// Clean up raw crash log text and split it into lines.
///
/// Lines are trimmed, `Recv:`/`Send:` terminal prefixes (any case) are removed and
/// empty lines are dropped. Applying this to its own output changes nothing.
pub fn cleanup_and_split(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| {
            let mut line = line.trim();
            while let Some(rest) = strip_terminal_prefix(line) {
                line = rest.trim();
            }
            line
        })
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
