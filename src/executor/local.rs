// Local command execution without a remote transport

use std::process::Stdio;

use tokio::process::Command;

use super::{ExecError, RemoteExecutor};
use crate::inventory::HostRecord;

/// Runs the host's command file through `sh` on this machine.
///
/// Useful for dry runs against `localhost` and for exercising the pipeline
/// without remote hosts. Credentials are ignored.
pub struct LocalExecutor {
    shell: String,
}

impl LocalExecutor {
    pub fn new() -> Self {
        LocalExecutor {
            shell: "sh".to_string(),
        }
    }

    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    /// Check if a host address refers to this machine
    pub fn is_local_address(address: &str) -> bool {
        address == "localhost" || address == "127.0.0.1" || address == "::1"
    }
}

impl Default for LocalExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteExecutor for LocalExecutor {
    fn name(&self) -> &str {
        "local"
    }

    fn command(&self, host: &HostRecord) -> Result<Command, ExecError> {
        let file = host
            .command_file
            .as_ref()
            .ok_or(ExecError::MissingCommandFile)?;

        let mut command = Command::new(&self.shell);
        command.arg(file).stdin(Stdio::null());
        Ok(command)
    }
}
