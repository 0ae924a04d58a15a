// Report file writing, aggregation and latest/previous pointer rotation

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Local};
use indicatif::ProgressBar;
use tracing::{debug, warn};

use crate::executor::HostQueue;
use crate::inventory::HostRecord;
use crate::output::errors::FleetError;

/// Pointer to the report of the most recent run
pub const LATEST_POINTER: &str = "latest_report";
/// Pointer to the report of the run before that
pub const PREVIOUS_POINTER: &str = "previous_report";

const FIELD_SEPARATOR: char = ';';

/// Render one report line (without the trailing newline).
///
/// Probe-only runs and offline hosts get `address;liveness`, executed hosts
/// get `address;liveness;SUCCESS|FAILURE;text`. Separators inside the text
/// become commas, so a line never has more than four fields.
pub fn format_record(host: &HostRecord, probe_only: bool) -> String {
    if probe_only || !host.liveness.is_online() {
        return format!("{}{}{}", host.address, FIELD_SEPARATOR, host.liveness);
    }

    let outcome = if host.succeeded { "SUCCESS" } else { "FAILURE" };
    format!(
        "{addr}{sep}{live}{sep}{outcome}{sep}{text}",
        addr = host.address,
        live = host.liveness,
        outcome = outcome,
        text = host
            .report
            .replace(['\r', '\n'], " ")
            .replace(FIELD_SEPARATOR, ","),
        sep = FIELD_SEPARATOR,
    )
}

/// Append-only writer for one run's report file
pub struct ReportWriter {
    dir: PathBuf,
    path: PathBuf,
    file: File,
    probe_only: bool,
    written: usize,
}

impl ReportWriter {
    /// Create `dir/YYYYMMDD-HHMM-report.csv`, adding a `-N` suffix when a
    /// report from the same minute already exists
    pub fn create(dir: &Path, now: DateTime<Local>, probe_only: bool) -> Result<Self, FleetError> {
        fs::create_dir_all(dir).map_err(|e| FleetError::Io {
            message: format!("Failed to create reports directory: {}", e),
            path: Some(dir.to_path_buf()),
        })?;

        let stamp = now.format("%Y%m%d-%H%M");
        let mut attempt = 0u32;

        loop {
            let name = if attempt == 0 {
                format!("{}-report.csv", stamp)
            } else {
                format!("{}-report-{}.csv", stamp, attempt)
            };
            let path = dir.join(name);

            match OpenOptions::new().append(true).create_new(true).open(&path) {
                Ok(file) => {
                    debug!(path = %path.display(), "report file created");
                    return Ok(ReportWriter {
                        dir: dir.to_path_buf(),
                        path,
                        file,
                        probe_only,
                        written: 0,
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => {
                    return Err(FleetError::Io {
                        message: format!("Failed to create report file: {}", e),
                        path: Some(path),
                    })
                }
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn written(&self) -> usize {
        self.written
    }

    /// Write one record and push it to stable storage before returning
    pub fn write(&mut self, host: &HostRecord) -> Result<(), FleetError> {
        let line = format_record(host, self.probe_only);

        writeln!(self.file, "{}", line)
            .and_then(|_| self.file.flush())
            .and_then(|_| self.file.sync_data())
            .map_err(|e| FleetError::Io {
                message: format!("Failed to write report record for {}: {}", host.address, e),
                path: Some(self.path.clone()),
            })?;

        self.written += 1;
        Ok(())
    }

    /// Close the report and make it the latest one
    pub fn finish(self) -> Result<PathBuf, FleetError> {
        let ReportWriter { dir, path, file, .. } = self;
        drop(file);

        rotate_pointers(&dir, &path)?;
        Ok(path)
    }
}

/// Shift `latest_report` to `previous_report` and point `latest_report` at `report`.
///
/// Older report files stay on disk; only the two pointers are rewritten.
pub fn rotate_pointers(dir: &Path, report: &Path) -> Result<(), FleetError> {
    let latest = dir.join(LATEST_POINTER);
    let previous = dir.join(PREVIOUS_POINTER);

    let io_err = |action: &str, path: &Path, e: std::io::Error| FleetError::Io {
        message: format!("Failed to {} report pointer: {}", action, e),
        path: Some(path.to_path_buf()),
    };

    if pointer_exists(&previous) {
        fs::remove_file(&previous).map_err(|e| io_err("remove", &previous, e))?;
    }

    if pointer_exists(&latest) {
        fs::rename(&latest, &previous).map_err(|e| io_err("rotate", &latest, e))?;
    }

    create_pointer(report, &latest).map_err(|e| io_err("create", &latest, e))?;
    debug!(report = %report.display(), "report pointers rotated");
    Ok(())
}

/// True for pointers, including ones whose target has been removed
fn pointer_exists(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

#[cfg(unix)]
fn create_pointer(report: &Path, pointer: &Path) -> std::io::Result<()> {
    // relative target, so the reports directory can be moved as a whole
    let target = report.file_name().map(Path::new).unwrap_or(report);
    std::os::unix::fs::symlink(target, pointer)
}

#[cfg(not(unix))]
fn create_pointer(report: &Path, pointer: &Path) -> std::io::Result<()> {
    fs::copy(report, pointer).map(|_| ())
}

/// Drain `queue` until `total` distinct hosts have been written.
///
/// This is what ends a run: every host must eventually reach the queue. A
/// host id seen twice is logged and skipped, so a duplicated hand-off can
/// neither end the run early nor produce a second record.
pub async fn aggregate(
    queue: &HostQueue,
    total: usize,
    poll: Duration,
    writer: &mut ReportWriter,
    progress: &ProgressBar,
) -> Result<Vec<HostRecord>, FleetError> {
    let mut seen = HashSet::with_capacity(total);
    let mut records = Vec::with_capacity(total);

    while seen.len() < total {
        let Some(host) = queue.pop(poll).await else {
            continue;
        };

        if !seen.insert(host.id) {
            warn!(host = %host.address, id = host.id, "host reported twice, ignoring");
            continue;
        }

        writer.write(&host)?;
        progress.inc(1);
        progress.set_message(format!("{} remaining", total - seen.len()));
        records.push(host);
    }

    Ok(records)
}
