// Startup checks: privilege, binaries on PATH and command-file assembly

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::output::errors::FleetError;

/// Name of the assembled payload written when the command source is a directory
pub const COMBINED_COMMANDS: &str = "combined-commands.txt";

/// Fail unless the process runs as root (ICMP probes need raw sockets on
/// most systems). `allow_unprivileged` skips the check.
pub fn ensure_privileged(allow_unprivileged: bool) -> Result<(), FleetError> {
    if allow_unprivileged || is_privileged() {
        return Ok(());
    }

    Err(FleetError::Privilege {
        suggestion: Some("Run with sudo, or pass --allow-unprivileged".to_string()),
    })
}

#[cfg(unix)]
fn is_privileged() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail
    unsafe { libc::geteuid() == 0 }
}

#[cfg(not(unix))]
fn is_privileged() -> bool {
    true
}

/// Resolve `binary` on PATH (or as given, when it contains a path
/// separator). A missing binary is a startup error.
pub fn require_binary(binary: &str) -> Result<PathBuf, FleetError> {
    let path = which::which(binary).map_err(|e| {
        debug!(binary, error = %e, "binary lookup failed");
        FleetError::BinaryMissing {
            binary: binary.to_string(),
        }
    })?;

    debug!(binary, path = %path.display(), "binary resolved");
    Ok(path)
}

/// Produce the single command file sent to every host.
///
/// A regular file is used as is. A directory has its regular files
/// concatenated in name order into `out_dir/combined-commands.txt`.
/// Finding nothing to send is an error.
pub fn assemble_command_file(source: &Path, out_dir: &Path) -> Result<PathBuf, FleetError> {
    let no_files = || FleetError::NoCommandFiles {
        path: source.to_path_buf(),
    };

    let meta = fs::metadata(source).map_err(|_| no_files())?;
    if meta.is_file() {
        return Ok(source.to_path_buf());
    }

    let io_err = |path: &Path, e: std::io::Error| FleetError::Io {
        message: format!("Failed to read command files: {}", e),
        path: Some(path.to_path_buf()),
    };

    let mut files: Vec<PathBuf> = fs::read_dir(source)
        .map_err(|e| io_err(source, e))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();
    files.sort();

    if files.is_empty() {
        return Err(no_files());
    }

    let mut combined = String::new();
    for file in &files {
        let content = fs::read_to_string(file).map_err(|e| io_err(file, e))?;
        combined.push_str(&content);
        if !content.is_empty() && !content.ends_with('\n') {
            combined.push('\n');
        }
    }

    fs::create_dir_all(out_dir).map_err(|e| io_err(out_dir, e))?;
    let target = out_dir.join(COMBINED_COMMANDS);
    fs::write(&target, combined).map_err(|e| io_err(&target, e))?;

    debug!(files = files.len(), path = %target.display(), "command files assembled");
    Ok(target)
}
