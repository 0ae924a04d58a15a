// fleetcast - parallel fleet command runner
//
// Probes a list of hosts for liveness, runs a command file on the ones that
// answer through a bounded worker pool, and writes one report line per host.

pub mod executor;
pub mod inventory;
pub mod output;
pub mod precheck;

pub use executor::{LivenessProber, Pipeline, PipelineConfig, RemoteExecutor, RunSummary};
pub use inventory::{HostDefaults, HostPool, HostRecord, Liveness};
pub use output::{FleetError, OutputFormat, OutputWriter};

/// Version of the fleetcast tool
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Re-export commonly used types
pub mod prelude {
    pub use crate::executor::{
        ConnectionMethod, LivenessProber, Pipeline, PipelineConfig, ProbeConfig, RemoteExecutor,
        RunSummary,
    };
    pub use crate::inventory::{Credentials, HostDefaults, HostPool, HostRecord, Liveness};
    pub use crate::output::{FleetError, OutputFormat, OutputWriter};
}
