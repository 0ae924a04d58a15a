// Inventory module - host records and the host pool

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;
use zeroize::Zeroizing;

use crate::executor::HostQueue;
use crate::output::errors::FleetError;

/// Reachability of a host as decided by the probe stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Liveness {
    #[default]
    Unknown,
    Online,
    Offline,
}

impl Liveness {
    pub fn is_online(self) -> bool {
        self == Liveness::Online
    }
}

impl fmt::Display for Liveness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Liveness::Online => write!(f, "True"),
            Liveness::Offline => write!(f, "False"),
            Liveness::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Password for a remote host. Wiped from memory on drop and never printed.
#[derive(Clone)]
pub struct Credentials(Zeroizing<String>);

impl Credentials {
    pub fn new(secret: impl Into<String>) -> Self {
        Credentials(Zeroizing::new(secret.into()))
    }

    pub fn expose(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credentials(***)")
    }
}

/// A single target host and everything the pipeline learns about it
#[derive(Debug, Clone)]
pub struct HostRecord {
    /// Position in the pool, used for exactly-once accounting
    pub id: usize,
    pub address: String,
    pub credentials: Option<Credentials>,
    pub command_file: Option<PathBuf>,
    /// Per-host timeout in seconds, 0 = unbounded
    pub timeout: u64,
    pub liveness: Liveness,
    /// Probe attempts already retried
    pub retries: u32,
    /// Current probe wait budget in seconds
    pub ping_wait: u64,
    pub succeeded: bool,
    pub report: String,
    pub error: String,
    pub completed_at: Option<DateTime<Utc>>,
}

impl HostRecord {
    pub fn new(id: usize, address: impl Into<String>) -> Self {
        HostRecord {
            id,
            address: address.into(),
            credentials: None,
            command_file: None,
            timeout: 0,
            liveness: Liveness::Unknown,
            retries: 0,
            ping_wait: 1,
            succeeded: false,
            report: String::new(),
            error: String::new(),
            completed_at: None,
        }
    }

    pub fn with_defaults(mut self, defaults: &HostDefaults) -> Self {
        self.credentials = defaults.credentials.clone();
        self.command_file = defaults.command_file.clone();
        self.timeout = defaults.timeout;
        self.ping_wait = defaults.ping_wait;
        self
    }

    /// Network part of the address, without any `user@` prefix
    pub fn hostname(&self) -> &str {
        self.address
            .rsplit_once('@')
            .map_or(self.address.as_str(), |(_, host)| host)
    }

    /// Stamp the completion time
    pub fn complete(&mut self) {
        self.completed_at = Some(Utc::now());
    }
}

/// Values applied to every record when the pool is loaded
#[derive(Debug, Clone)]
pub struct HostDefaults {
    pub credentials: Option<Credentials>,
    pub command_file: Option<PathBuf>,
    pub timeout: u64,
    pub ping_wait: u64,
}

impl Default for HostDefaults {
    fn default() -> Self {
        HostDefaults {
            credentials: None,
            command_file: None,
            timeout: 30,
            ping_wait: 1,
        }
    }
}

/// Flag counts over the pool
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub total: usize,
    pub online: usize,
    pub offline: usize,
    pub succeeded: usize,
}

/// Ordered collection of every host in the run. Its size never changes after load.
#[derive(Debug, Clone, Default)]
pub struct HostPool {
    hosts: Vec<HostRecord>,
}

impl HostPool {
    /// Load the pool from an address file, one address per line
    pub fn load(path: &Path, defaults: &HostDefaults) -> Result<Self, FleetError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| FleetError::SourceUnavailable {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        Ok(Self::parse_str(&content, defaults))
    }

    /// Build the pool from address text. Blank lines and `#` comments are
    /// skipped, and so are lines starting with `-`, which the transports
    /// would read as options.
    pub fn parse_str(content: &str, defaults: &HostDefaults) -> Self {
        let hosts = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter(|line| {
                if line.starts_with('-') {
                    warn!(address = %line, "skipping address that looks like an option");
                    return false;
                }
                true
            })
            .enumerate()
            .map(|(id, address)| HostRecord::new(id, address).with_defaults(defaults))
            .collect();

        HostPool { hosts }
    }

    /// Re-apply pool-wide values, e.g. once the command file is assembled
    pub fn with_defaults(mut self, defaults: &HostDefaults) -> Self {
        self.hosts = self
            .hosts
            .into_iter()
            .map(|host| host.with_defaults(defaults))
            .collect();
        self
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    pub fn hosts(&self) -> &[HostRecord] {
        &self.hosts
    }

    /// Queue holding a copy of every record. The pool itself is left untouched.
    pub fn to_queue(&self) -> HostQueue {
        let queue = HostQueue::new();
        for host in &self.hosts {
            queue.push(host.clone());
        }
        queue
    }

    /// Replace pool entries with drained records, matched by id
    pub fn absorb(&mut self, records: impl IntoIterator<Item = HostRecord>) {
        for record in records {
            if let Some(slot) = self.hosts.get_mut(record.id) {
                *slot = record;
            }
        }
    }

    /// Aggregate the current flags.
    ///
    /// Only meaningful once the stage that sets the flags has fully drained;
    /// before that the counts are partial.
    pub fn stats(&self) -> PoolStats {
        let mut stats = PoolStats {
            total: self.hosts.len(),
            ..Default::default()
        };

        for host in &self.hosts {
            match host.liveness {
                Liveness::Online => stats.online += 1,
                Liveness::Offline => stats.offline += 1,
                Liveness::Unknown => {}
            }
            if host.succeeded {
                stats.succeeded += 1;
            }
        }

        stats
    }
}
