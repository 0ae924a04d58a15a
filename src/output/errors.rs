// Human-readable error messages for fleetcast

use std::fmt;
use std::io::IsTerminal;
use std::path::PathBuf;

use colored::*;

/// Initialize color output based on TTY detection and NO_COLOR environment variable
fn should_use_colors() -> bool {
    // Check NO_COLOR environment variable first (https://no-color.org/)
    if std::env::var("NO_COLOR").is_ok() {
        return false;
    }

    // Errors are written to stderr
    std::io::stderr().is_terminal()
}

/// All error types surfaced to the operator
#[derive(Debug)]
pub enum FleetError {
    /// Not running with the privilege required for ICMP probing
    Privilege { suggestion: Option<String> },

    /// The address source could not be opened
    SourceUnavailable { path: PathBuf, message: String },

    /// A required binary is not resolvable on PATH
    BinaryMissing { binary: String },

    /// Command-file assembly found nothing to send
    NoCommandFiles { path: PathBuf },

    /// Invalid configuration values
    Config {
        message: String,
        suggestion: Option<String>,
    },

    /// I/O errors (report writing, rotation, command-file assembly).
    /// Fatal to the run once the pipeline has started.
    Io {
        message: String,
        path: Option<PathBuf>,
    },
}

impl FleetError {
    /// Startup errors abort the run before any stage starts
    pub fn is_startup_fatal(&self) -> bool {
        matches!(
            self,
            FleetError::Privilege { .. }
                | FleetError::SourceUnavailable { .. }
                | FleetError::BinaryMissing { .. }
                | FleetError::NoCommandFiles { .. }
                | FleetError::Config { .. }
        )
    }
}

impl std::error::Error for FleetError {}

impl fmt::Display for FleetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !should_use_colors() {
            colored::control::set_override(false);
        }

        match self {
            FleetError::Privilege { suggestion } => {
                writeln!(
                    f,
                    "{}: this tool needs root privileges to send ICMP probes",
                    "PRIVILEGE ERROR".red().bold()
                )?;

                if let Some(suggestion) = suggestion {
                    writeln!(f)?;
                    writeln!(f, "{}: {}", "Hint".yellow().bold(), suggestion)?;
                }

                Ok(())
            }

            FleetError::SourceUnavailable { path, message } => {
                writeln!(
                    f,
                    "{}: cannot open address source: {}",
                    "INVENTORY ERROR".red().bold(),
                    message
                )?;
                writeln!(f, "  {} {}", "Path:".dimmed(), path.display())?;
                writeln!(f)?;
                writeln!(
                    f,
                    "{}: put one address per line, or pass --hosts-file",
                    "Hint".yellow().bold()
                )?;
                Ok(())
            }

            FleetError::BinaryMissing { binary } => {
                writeln!(
                    f,
                    "{}: '{}' was not found on PATH",
                    "MISSING BINARY".red().bold(),
                    binary
                )?;
                writeln!(f)?;
                writeln!(
                    f,
                    "{}: install it or pick another --method",
                    "Hint".yellow().bold()
                )?;
                Ok(())
            }

            FleetError::NoCommandFiles { path } => {
                writeln!(
                    f,
                    "{}: no command files found",
                    "COMMAND ERROR".red().bold()
                )?;
                writeln!(f, "  {} {}", "Path:".dimmed(), path.display())?;
                Ok(())
            }

            FleetError::Config {
                message,
                suggestion,
            } => {
                writeln!(f, "{}: {}", "CONFIG ERROR".red().bold(), message)?;

                if let Some(suggestion) = suggestion {
                    writeln!(f)?;
                    writeln!(f, "{}: {}", "Hint".yellow().bold(), suggestion)?;
                }

                Ok(())
            }

            FleetError::Io { message, path } => {
                writeln!(f, "{}: {}", "I/O ERROR".red().bold(), message)?;
                if let Some(path) = path {
                    writeln!(f, "  {} {}", "Path:".dimmed(), path.display())?;
                }
                Ok(())
            }
        }
    }
}
