// Executor module - the probe/execute pipeline and its collaborators

use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::inventory::HostRecord;

pub mod exec;
pub mod local;
pub mod pipeline;
pub mod ping;
pub mod probe;
pub mod queue;
pub mod remote;
pub mod retry;
pub mod supervisor;

pub use exec::{run_with_watchdog, CommandResult, ExecError, ExecStage};
pub use local::LocalExecutor;
pub use pipeline::{Pipeline, PipelineConfig, RunSummary};
pub use ping::PingProber;
pub use probe::ProbeStage;
pub use queue::HostQueue;
pub use remote::{ConnectionMethod, NcExecutor, PlinkExecutor};
pub use retry::ProbeConfig;
pub use supervisor::WorkerPool;

/// Failure of a single probe attempt
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("failed to launch prober: {0}")]
    Launch(#[from] std::io::Error),
}

/// Reachability check against one host
#[async_trait]
pub trait LivenessProber: Send + Sync {
    /// Probe `address`, giving the host at most `wait` to answer
    async fn probe(&self, address: &str, wait: Duration) -> Result<bool, ProbeError>;
}

/// Transport that runs a host's command payload remotely.
///
/// The executor only describes the process; the execution stage spawns it,
/// captures its streams and kills it when the host's timeout elapses.
pub trait RemoteExecutor: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Build the process for this host. Arguments are passed as a vector,
    /// never through a shell command line.
    fn command(&self, host: &HostRecord) -> Result<Command, ExecError>;
}
