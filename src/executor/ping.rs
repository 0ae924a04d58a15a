// ICMP liveness probe through the system ping binary

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use super::{LivenessProber, ProbeError};

/// Extra time granted to the ping process beyond its own wait budget
const PROCESS_GRACE: Duration = Duration::from_secs(2);

/// Sends a single echo request and reports whether it was answered
pub struct PingProber {
    binary: PathBuf,
}

impl PingProber {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        PingProber {
            binary: binary.into(),
        }
    }

    /// Arguments for one echo request with the given wait budget
    fn args(address: &str, wait: Duration) -> Vec<String> {
        let secs = wait.as_secs().max(1);

        if cfg!(windows) {
            vec![
                "-n".to_string(),
                "1".to_string(),
                "-w".to_string(),
                (secs * 1000).to_string(),
                address.to_string(),
            ]
        } else if cfg!(target_os = "macos") {
            vec![
                "-c".to_string(),
                "1".to_string(),
                "-t".to_string(),
                secs.to_string(),
                address.to_string(),
            ]
        } else {
            vec![
                "-c".to_string(),
                "1".to_string(),
                "-W".to_string(),
                secs.to_string(),
                address.to_string(),
            ]
        }
    }
}

impl Default for PingProber {
    fn default() -> Self {
        Self::new("ping")
    }
}

#[async_trait]
impl LivenessProber for PingProber {
    async fn probe(&self, address: &str, wait: Duration) -> Result<bool, ProbeError> {
        let mut child = Command::new(&self.binary)
            .args(Self::args(address, wait))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        match tokio::time::timeout(wait + PROCESS_GRACE, child.wait()).await {
            Ok(status) => Ok(status?.success()),
            // a ping that outlives its own deadline counts as no answer
            Err(_) => Ok(false),
        }
    }
}
