// End-to-end runs of the pipeline through the public API
#![cfg(unix)]

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use indicatif::ProgressBar;
use pretty_assertions::assert_eq;
use tempfile::TempDir;

use fleetcast::executor::{LivenessProber, LocalExecutor, Pipeline, PipelineConfig, ProbeError};
use fleetcast::inventory::{HostDefaults, HostPool, Liveness};
use fleetcast::output::{LATEST_POINTER, PREVIOUS_POINTER};
use fleetcast::precheck::assemble_command_file;

/// Answers for a fixed set of addresses, never for the rest
struct StaticProber {
    online: HashSet<String>,
}

impl StaticProber {
    fn new(online: &[&str]) -> Self {
        StaticProber {
            online: online.iter().map(|a| a.to_string()).collect(),
        }
    }
}

#[async_trait]
impl LivenessProber for StaticProber {
    async fn probe(&self, address: &str, _wait: Duration) -> Result<bool, ProbeError> {
        Ok(self.online.contains(address))
    }
}

fn config(reports: &Path, probe_only: bool) -> PipelineConfig {
    PipelineConfig {
        probe_workers: 4,
        exec_workers: 4,
        poll_interval: Duration::from_millis(20),
        probe_only,
        reports_dir: reports.to_path_buf(),
        ..PipelineConfig::default()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_local_run_with_assembled_commands() {
    let dir = TempDir::new().unwrap();
    let commands = dir.path().join("commands");
    fs::create_dir(&commands).unwrap();
    fs::write(commands.join("01-greet"), "echo hello\n").unwrap();
    fs::write(commands.join("02-name"), "echo fleet\n").unwrap();

    let reports = dir.path().join("reports");
    let command_file = assemble_command_file(&commands, &reports).unwrap();

    let defaults = HostDefaults {
        command_file: Some(command_file),
        timeout: 5,
        ..HostDefaults::default()
    };
    let mut pool = HostPool::parse_str(
        "# lab machines\nlocalhost\n\n127.0.0.1\n10.255.0.1\n",
        &defaults,
    );
    assert_eq!(pool.len(), 3);

    let pipeline = Pipeline::new(
        config(&reports, false),
        Arc::new(StaticProber::new(&["localhost", "127.0.0.1"])),
    )
    .with_executor(Arc::new(LocalExecutor::new()));

    let summary = pipeline.run(&mut pool, &ProgressBar::hidden()).await.unwrap();

    let mut lines: Vec<String> = fs::read_to_string(&summary.report)
        .unwrap()
        .lines()
        .map(String::from)
        .collect();
    lines.sort();

    assert_eq!(
        lines,
        vec![
            "10.255.0.1;False",
            "127.0.0.1;True;SUCCESS;hello fleet",
            "localhost;True;SUCCESS;hello fleet",
        ]
    );
    assert_eq!(summary.stats.succeeded, 2);
    assert_eq!(pool.hosts()[2].liveness, Liveness::Offline);
    assert!(pool.hosts().iter().all(|h| h.completed_at.is_some()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_consecutive_runs_rotate_pointers() {
    let dir = TempDir::new().unwrap();
    let reports = dir.path().join("reports");
    let prober = Arc::new(StaticProber::new(&["a"]));

    let mut produced = Vec::new();
    for _ in 0..3 {
        let mut pool = HostPool::parse_str("a\nb\n", &HostDefaults::default());
        let pipeline = Pipeline::new(config(&reports, true), prober.clone());
        let summary = pipeline.run(&mut pool, &ProgressBar::hidden()).await.unwrap();
        produced.push(summary.report);
    }

    let latest = fs::read_link(reports.join(LATEST_POINTER)).unwrap();
    let previous = fs::read_link(reports.join(PREVIOUS_POINTER)).unwrap();
    assert_eq!(Some(latest.as_os_str()), produced[2].file_name());
    assert_eq!(Some(previous.as_os_str()), produced[1].file_name());

    // the oldest report survives, it just lost its pointer
    assert!(produced[0].exists());
    assert_eq!(
        fs::read_to_string(reports.join(LATEST_POINTER)).unwrap(),
        fs::read_to_string(&produced[2]).unwrap()
    );
}
