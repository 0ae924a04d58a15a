// Output module for fleetcast

use indicatif::ProgressBar;

use crate::executor::RunSummary;
use crate::inventory::HostPool;

pub mod errors;
pub mod json_output;
pub mod report;
pub mod terminal;

pub use errors::*;
pub use json_output::*;
pub use report::*;
pub use terminal::*;

/// Output format for fleetcast
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable text output with colors
    #[default]
    Text,
    /// Machine-readable JSON output (NDJSON format)
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!("unknown output format '{}' (expected text or json)", other)),
        }
    }
}

/// Unified output writer supporting both text and JSON formats
pub enum OutputWriter {
    Text(TerminalOutput),
    Json(JsonOutput),
}

impl OutputWriter {
    pub fn new(format: OutputFormat, verbose: bool, quiet: bool) -> Self {
        match format {
            OutputFormat::Text => OutputWriter::Text(TerminalOutput::new(verbose, quiet)),
            OutputFormat::Json => OutputWriter::Json(JsonOutput::new(verbose, quiet)),
        }
    }

    pub fn print_run_header(&self, mode: &str, hosts_count: usize) {
        match self {
            OutputWriter::Text(output) => output.print_run_header(mode, hosts_count),
            OutputWriter::Json(output) => output.print_run_header(mode, hosts_count),
        }
    }

    pub fn create_progress(&self, total: usize) -> ProgressBar {
        match self {
            OutputWriter::Text(output) => output.create_progress(total),
            OutputWriter::Json(_output) => ProgressBar::hidden(),
        }
    }

    pub fn print_summary(&self, summary: &RunSummary, pool: &HostPool) {
        match self {
            OutputWriter::Text(output) => output.print_summary(summary, pool),
            OutputWriter::Json(output) => output.print_summary(summary, pool),
        }
    }
}
