// Remote transports: plink (SSH) and nc (listener on the target)

use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::str::FromStr;

use tokio::process::Command;

use super::{ExecError, RemoteExecutor};
use crate::inventory::HostRecord;

/// Type of connection to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionMethod {
    #[default]
    Plink,
    Nc,
    Local,
}

impl ConnectionMethod {
    /// Binary that must be resolvable on PATH for this method
    pub fn binary(self) -> &'static str {
        match self {
            ConnectionMethod::Plink => "plink",
            ConnectionMethod::Nc => "nc",
            ConnectionMethod::Local => "sh",
        }
    }
}

impl FromStr for ConnectionMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "plink" => Ok(ConnectionMethod::Plink),
            "nc" => Ok(ConnectionMethod::Nc),
            "local" => Ok(ConnectionMethod::Local),
            other => Err(format!(
                "unknown connection method '{}' (expected plink, nc or local)",
                other
            )),
        }
    }
}

impl fmt::Display for ConnectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionMethod::Plink => "plink",
            ConnectionMethod::Nc => "nc",
            ConnectionMethod::Local => "local",
        })
    }
}

/// Runs the command file over SSH with PuTTY's `plink`.
///
/// `-batch` keeps plink from ever prompting; an unknown host key therefore
/// fails the host instead of hanging the worker.
pub struct PlinkExecutor {
    binary: PathBuf,
}

impl PlinkExecutor {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        PlinkExecutor {
            binary: binary.into(),
        }
    }

    fn args(host: &HostRecord) -> Result<Vec<String>, ExecError> {
        let file = host
            .command_file
            .as_ref()
            .ok_or(ExecError::MissingCommandFile)?;

        let mut args = vec!["-ssh".to_string(), "-batch".to_string()];
        if let Some(ref credentials) = host.credentials {
            args.push("-pw".to_string());
            args.push(credentials.expose().to_string());
        }
        args.push(host.address.clone());
        args.push("-m".to_string());
        args.push(file.to_string_lossy().into_owned());
        Ok(args)
    }
}

impl RemoteExecutor for PlinkExecutor {
    fn name(&self) -> &str {
        "plink"
    }

    fn command(&self, host: &HostRecord) -> Result<Command, ExecError> {
        let mut command = Command::new(&self.binary);
        command.args(Self::args(host)?).stdin(Stdio::null());
        Ok(command)
    }
}

/// Streams the command file to a listener on the target with `nc`.
///
/// The listener runs whatever it receives and writes the output back on the
/// same connection.
pub struct NcExecutor {
    binary: PathBuf,
    port: u16,
}

impl NcExecutor {
    pub fn new(binary: impl Into<PathBuf>, port: u16) -> Self {
        NcExecutor {
            binary: binary.into(),
            port,
        }
    }
}

impl RemoteExecutor for NcExecutor {
    fn name(&self) -> &str {
        "nc"
    }

    fn command(&self, host: &HostRecord) -> Result<Command, ExecError> {
        let file = host
            .command_file
            .as_ref()
            .ok_or(ExecError::MissingCommandFile)?;
        let payload = std::fs::File::open(file).map_err(ExecError::Launch)?;

        let mut command = Command::new(&self.binary);
        command
            .arg(host.hostname())
            .arg(self.port.to_string())
            .stdin(Stdio::from(payload));
        Ok(command)
    }
}
