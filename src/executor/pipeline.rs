// Two-stage pipeline: probe pool, execution pool, report aggregator

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Local;
use indicatif::ProgressBar;
use serde::Serialize;
use tracing::info;

use super::exec::ExecStage;
use super::probe::ProbeStage;
use super::queue::HostQueue;
use super::retry::ProbeConfig;
use super::supervisor::WorkerPool;
use super::{LivenessProber, RemoteExecutor};
use crate::inventory::{HostDefaults, HostPool, PoolStats};
use crate::output::errors::FleetError;
use crate::output::report::{aggregate, ReportWriter};

/// Configuration for a run
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Probe pool size
    pub probe_workers: usize,
    /// Execution pool size
    pub exec_workers: usize,
    /// Retry bound and wait budget of the probe stage
    pub probe: ProbeConfig,
    /// How long an idle worker waits on its queue before re-checking for stop
    pub poll_interval: Duration,
    /// Skip the execution stage
    pub probe_only: bool,
    /// Where timestamped reports and the pointers live
    pub reports_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            probe_workers: 10,
            exec_workers: 10,
            probe: ProbeConfig::default(),
            poll_interval: Duration::from_millis(250),
            probe_only: false,
            reports_dir: PathBuf::from("reports"),
        }
    }
}

impl PipelineConfig {
    /// Reject unusable settings. Returns operational advisories worth logging.
    pub fn validate(&self, defaults: &HostDefaults) -> Result<Vec<String>, FleetError> {
        if self.probe_workers == 0 {
            return Err(FleetError::Config {
                message: "probe pool needs at least one worker".to_string(),
                suggestion: Some("Set --probe-workers to 1 or more".to_string()),
            });
        }

        if !self.probe_only && self.exec_workers == 0 {
            return Err(FleetError::Config {
                message: "execution pool needs at least one worker".to_string(),
                suggestion: Some("Set --exec-workers to 1 or more, or use --probe-only".to_string()),
            });
        }

        if self.probe.max_wait < self.probe.base_wait {
            return Err(FleetError::Config {
                message: format!(
                    "probe wait cap ({}s) is below the base wait ({}s)",
                    self.probe.max_wait, self.probe.base_wait
                ),
                suggestion: None,
            });
        }

        let mut advisories = Vec::new();
        let recommended = self.probe_workers * 2;
        if !self.probe_only && defaults.timeout > 0 && self.exec_workers < recommended {
            advisories.push(format!(
                "a {}s timeout keeps an execution worker busy until the kill completes; \
                 with many slow hosts consider --exec-workers {}",
                defaults.timeout, recommended
            ));
        }

        Ok(advisories)
    }
}

/// Outcome of a finished run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub report: PathBuf,
    pub stats: PoolStats,
    pub probe_only: bool,
    pub duration_ms: u64,
}

impl RunSummary {
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}

/// Wires the queues, stages and aggregator together for one run
pub struct Pipeline {
    config: PipelineConfig,
    prober: Arc<dyn LivenessProber>,
    executor: Option<Arc<dyn RemoteExecutor>>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, prober: Arc<dyn LivenessProber>) -> Self {
        Pipeline {
            config,
            prober,
            executor: None,
        }
    }

    pub fn with_executor(mut self, executor: Arc<dyn RemoteExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run both stages over `pool` and write the report.
    ///
    /// On return the pool carries every host's final flags.
    pub async fn run(
        &self,
        pool: &mut HostPool,
        progress: &ProgressBar,
    ) -> Result<RunSummary, FleetError> {
        let started = Instant::now();
        let total = pool.len();
        let poll = self.config.poll_interval;

        let executor = match (&self.executor, self.config.probe_only) {
            (_, true) => None,
            (Some(executor), false) => Some(executor.clone()),
            (None, false) => {
                return Err(FleetError::Config {
                    message: "command mode needs a remote executor".to_string(),
                    suggestion: Some("Pick a --method or use --probe-only".to_string()),
                })
            }
        };

        let mut writer =
            ReportWriter::create(&self.config.reports_dir, Local::now(), self.config.probe_only)?;

        let alive = HostQueue::new();
        let results = HostQueue::new();

        let probe_stage = Arc::new(ProbeStage::new(
            pool.to_queue(),
            alive.clone(),
            self.prober.clone(),
            self.config.probe,
            poll,
        ));
        let mut probe_pool = WorkerPool::new("probe");
        probe_pool.start(self.config.probe_workers, move |id, token| {
            probe_stage.clone().run_worker(id, token)
        });

        let mut exec_pool = WorkerPool::new("exec");
        let drained = match executor {
            Some(executor) => {
                let exec_stage =
                    Arc::new(ExecStage::new(alive.clone(), results.clone(), executor, poll));
                exec_pool.start(self.config.exec_workers, move |id, token| {
                    exec_stage.clone().run_worker(id, token)
                });
                &results
            }
            None => &alive,
        };

        info!(
            hosts = total,
            probe_workers = self.config.probe_workers,
            exec_workers = self.config.exec_workers,
            probe_only = self.config.probe_only,
            "pipeline started"
        );

        progress.set_length(total as u64);
        let drained = aggregate(drained, total, poll, &mut writer, progress).await;

        probe_pool.shutdown().await;
        exec_pool.shutdown().await;

        pool.absorb(drained?);
        let report = writer.finish()?;
        let stats = pool.stats();

        info!(
            report = %report.display(),
            online = stats.online,
            offline = stats.offline,
            succeeded = stats.succeeded,
            "pipeline finished"
        );

        Ok(RunSummary {
            report,
            stats,
            probe_only: self.config.probe_only,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }
}
