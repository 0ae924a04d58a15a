// Command execution stage

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::queue::HostQueue;
use super::RemoteExecutor;
use crate::inventory::HostRecord;

/// Result of running a host's command
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Terminal per-host execution failures. None of them are retried.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("failed to launch remote executor: {0}")]
    Launch(#[source] std::io::Error),

    #[error("command killed after {}s", .0.as_secs())]
    TimedOut(Duration),

    #[error("failed to collect command output: {0}")]
    Io(#[source] std::io::Error),

    #[error("no command file configured for this host")]
    MissingCommandFile,
}

impl ExecError {
    /// Short marker written into the report in place of the output
    pub fn marker(&self) -> &'static str {
        match self {
            ExecError::Launch(_) | ExecError::MissingCommandFile => "ERROR (launch)",
            ExecError::TimedOut(_) => "ERROR (timeout)",
            ExecError::Io(_) => "ERROR (io)",
        }
    }
}

/// Spawn `command`, read both streams to the end and wait for it.
///
/// With a `timeout`, one deadline covers the whole run: the process exiting
/// and both streams reaching end of file. A background process that keeps
/// the pipes open therefore counts against the deadline too. Once it passes,
/// the command's whole process group is killed and the call returns
/// [`ExecError::TimedOut`].
pub async fn run_with_watchdog(
    mut command: Command,
    timeout: Option<Duration>,
) -> Result<CommandResult, ExecError> {
    // own process group, so the watchdog can take down everything it started
    #[cfg(unix)]
    command.process_group(0);

    let mut child = command
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(ExecError::Launch)?;
    let pid = child.id();

    let mut stdout_task = tokio::spawn(read_stream(child.stdout.take()));
    let mut stderr_task = tokio::spawn(read_stream(child.stderr.take()));

    let collected = async {
        let status = child.wait().await.map_err(ExecError::Io)?;
        let stdout = (&mut stdout_task)
            .await
            .map_err(|e| ExecError::Io(std::io::Error::other(e)))?;
        let stderr = (&mut stderr_task)
            .await
            .map_err(|e| ExecError::Io(std::io::Error::other(e)))?;
        Ok::<_, ExecError>((status, stdout, stderr))
    };

    let finished = match timeout {
        Some(limit) => tokio::time::timeout(limit, collected).await,
        None => Ok(collected.await),
    };

    match finished {
        Ok(Ok((status, stdout, stderr))) => Ok(CommandResult {
            stdout,
            stderr,
            exit_code: status.code().unwrap_or(-1),
        }),
        Ok(Err(e)) => {
            stdout_task.abort();
            stderr_task.abort();
            Err(e)
        }
        Err(_) => {
            kill_process_group(&mut child, pid).await;
            stdout_task.abort();
            stderr_task.abort();
            Err(ExecError::TimedOut(timeout.unwrap_or_default()))
        }
    }
}

/// Kill the child and every process in its group
async fn kill_process_group(child: &mut Child, pid: Option<u32>) {
    #[cfg(unix)]
    {
        if let Some(pid) = pid {
            // SAFETY: killpg takes plain integers; the group was created at spawn
            if unsafe { libc::killpg(pid as libc::pid_t, libc::SIGKILL) } != 0 {
                let err = std::io::Error::last_os_error();
                debug!(pid, error = %err, "process group already gone");
            }
        }
    }
    #[cfg(not(unix))]
    let _ = pid;

    // the direct child may already have been reaped
    if let Err(e) = child.kill().await {
        debug!(error = %e, "direct child not killed");
    }
}

async fn read_stream<R>(stream: Option<R>) -> String
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    if let Some(mut stream) = stream {
        // a read error just truncates what we keep
        stream.read_to_end(&mut buf).await.ok();
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Join output lines with spaces so it fits on one report line
pub fn flatten_output(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Record an execution outcome on the host
pub fn apply_outcome(host: &mut HostRecord, outcome: Result<CommandResult, ExecError>) {
    match outcome {
        Ok(result) if result.success() => {
            host.succeeded = true;
            host.report = flatten_output(&result.stdout);
            host.error = result.stderr.trim().to_string();
        }
        Ok(result) => {
            host.succeeded = false;
            host.report = format!("ERROR ({})", result.exit_code);
            host.error = result.stderr.trim().to_string();
        }
        Err(e) => {
            host.succeeded = false;
            host.report = e.marker().to_string();
            host.error = e.to_string();
        }
    }
}

/// Execution workers: Alive Queue in, Result Queue out.
///
/// Every host popped here is pushed to the Result Queue exactly once, whether
/// or not a command ran.
pub struct ExecStage {
    alive: HostQueue,
    results: HostQueue,
    executor: Arc<dyn RemoteExecutor>,
    poll: Duration,
}

impl ExecStage {
    pub fn new(
        alive: HostQueue,
        results: HostQueue,
        executor: Arc<dyn RemoteExecutor>,
        poll: Duration,
    ) -> Self {
        ExecStage {
            alive,
            results,
            executor,
            poll,
        }
    }

    /// Worker loop. A momentarily empty queue just means polling again; the
    /// aggregator decides when the run is over.
    pub async fn run_worker(self: Arc<Self>, worker: usize, stop: CancellationToken) {
        while !stop.is_cancelled() {
            let Some(host) = self.alive.pop(self.poll).await else {
                continue;
            };
            let host = self.execute_host(worker, host).await;
            self.results.push(host);
        }
        debug!(worker, "exec worker stopped");
    }

    async fn execute_host(&self, worker: usize, mut host: HostRecord) -> HostRecord {
        if !host.liveness.is_online() {
            host.complete();
            return host;
        }

        let timeout = (host.timeout > 0).then(|| Duration::from_secs(host.timeout));
        debug!(
            worker,
            host = %host.address,
            executor = self.executor.name(),
            timeout = host.timeout,
            "running command"
        );

        let outcome = match self.executor.command(&host) {
            Ok(command) => run_with_watchdog(command, timeout).await,
            Err(e) => Err(e),
        };

        if let Err(ref e) = outcome {
            warn!(host = %host.address, error = %e, "command did not complete");
        }

        apply_outcome(&mut host, outcome);
        host.complete();
        host
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::executor::LocalExecutor;
    use crate::inventory::Liveness;
    use std::path::PathBuf;
    use std::time::Instant;
    use tempfile::TempDir;

    fn script(dir: &TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    fn online_host(id: usize, command_file: PathBuf, timeout: u64) -> HostRecord {
        let mut host = HostRecord::new(id, "127.0.0.1");
        host.liveness = Liveness::Online;
        host.command_file = Some(command_file);
        host.timeout = timeout;
        host
    }

    fn stage() -> ExecStage {
        ExecStage::new(
            HostQueue::new(),
            HostQueue::new(),
            Arc::new(LocalExecutor::new()),
            Duration::from_millis(10),
        )
    }

    #[test]
    fn test_flatten_output() {
        assert_eq!(flatten_output("hello\nworld\n"), "hello world");
        assert_eq!(flatten_output("  a \r\n\r\n b\n"), "a b");
        assert_eq!(flatten_output(""), "");
    }

    #[tokio::test]
    async fn test_success_flattens_stdout() {
        let dir = TempDir::new().unwrap();
        let file = script(&dir, "ok.sh", "echo hello\necho world\n");

        let host = stage().execute_host(0, online_host(0, file, 30)).await;

        assert!(host.succeeded);
        assert_eq!(host.report, "hello world");
        assert!(host.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_nonzero_exit_marks_failure() {
        let dir = TempDir::new().unwrap();
        let file = script(&dir, "fail.sh", "echo partial\necho oops >&2\nexit 3\n");

        let host = stage().execute_host(0, online_host(0, file, 30)).await;

        assert!(!host.succeeded);
        assert_eq!(host.report, "ERROR (3)");
        assert_eq!(host.error, "oops");
    }

    #[tokio::test]
    async fn test_timeout_kills_command() {
        let dir = TempDir::new().unwrap();
        let file = script(&dir, "slow.sh", "sleep 10\necho never\n");

        let start = Instant::now();
        let host = stage().execute_host(0, online_host(0, file, 1)).await;

        assert!(start.elapsed() < Duration::from_secs(5));
        assert!(!host.succeeded);
        assert_eq!(host.report, "ERROR (timeout)");
        assert!(host.error.contains("killed after 1s"));
    }

    #[tokio::test]
    async fn test_background_process_counts_against_timeout() {
        let dir = TempDir::new().unwrap();
        // the shell exits at once, the background sleep keeps the pipes open
        let file = script(&dir, "bg.sh", "sleep 6 &\necho started\n");

        let start = Instant::now();
        let host = stage().execute_host(0, online_host(0, file, 1)).await;

        assert!(start.elapsed() < Duration::from_secs(4));
        assert!(!host.succeeded);
        assert_eq!(host.report, "ERROR (timeout)");
    }

    #[cfg(target_os = "linux")]
    fn is_running(pid: u32) -> bool {
        // a zombie waiting for its new parent to reap it no longer runs
        std::fs::read_to_string(format!("/proc/{}/stat", pid))
            .ok()
            .and_then(|stat| {
                stat.rsplit_once(')')
                    .map(|(_, rest)| !rest.trim_start().starts_with('Z'))
            })
            .unwrap_or(false)
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_timeout_kills_whole_process_group() {
        let dir = TempDir::new().unwrap();
        let pid_file = dir.path().join("sleeper.pid");
        let file = script(
            &dir,
            "tree.sh",
            &format!("sleep 47 &\necho $! > {}\nwait\n", pid_file.display()),
        );

        let host = stage().execute_host(0, online_host(0, file, 1)).await;
        assert_eq!(host.report, "ERROR (timeout)");

        let pid: u32 = std::fs::read_to_string(&pid_file)
            .unwrap()
            .trim()
            .parse()
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while is_running(pid) && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(!is_running(pid), "sleep {} survived the timeout", pid);
    }

    #[tokio::test]
    async fn test_zero_timeout_is_unbounded() {
        let dir = TempDir::new().unwrap();
        let file = script(&dir, "long.sh", "sleep 2\necho done\n");

        let host = stage().execute_host(0, online_host(0, file, 0)).await;

        assert!(host.succeeded);
        assert_eq!(host.report, "done");
    }

    #[tokio::test]
    async fn test_offline_host_is_not_executed() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("ran");
        let file = script(&dir, "touch.sh", &format!("touch {}\n", marker.display()));

        let mut host = online_host(0, file, 30);
        host.liveness = Liveness::Offline;
        let host = stage().execute_host(0, host).await;

        assert!(!host.succeeded);
        assert!(host.report.is_empty());
        assert!(host.completed_at.is_some());
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn test_missing_command_file_is_launch_failure() {
        let mut host = HostRecord::new(0, "127.0.0.1");
        host.liveness = Liveness::Online;

        let host = stage().execute_host(0, host).await;

        assert!(!host.succeeded);
        assert_eq!(host.report, "ERROR (launch)");
    }

    #[tokio::test]
    async fn test_workers_forward_every_host() {
        let dir = TempDir::new().unwrap();
        let file = script(&dir, "ok.sh", "echo up\n");
        let alive = HostQueue::new();
        let results = HostQueue::new();

        for id in 0..5 {
            let mut host = online_host(id, file.clone(), 30);
            if id % 2 == 1 {
                host.liveness = Liveness::Offline;
            }
            alive.push(host);
        }

        let stage = Arc::new(ExecStage::new(
            alive.clone(),
            results.clone(),
            Arc::new(LocalExecutor::new()),
            Duration::from_millis(10),
        ));
        let mut pool = crate::executor::WorkerPool::new("exec");
        pool.start(2, move |id, token| stage.clone().run_worker(id, token));

        let mut seen = Vec::new();
        while seen.len() < 5 {
            if let Some(host) = results.pop(Duration::from_millis(100)).await {
                seen.push(host);
            }
        }
        pool.shutdown().await;

        seen.sort_by_key(|h| h.id);
        let succeeded: Vec<bool> = seen.iter().map(|h| h.succeeded).collect();
        assert_eq!(succeeded, vec![true, false, true, false, true]);
        assert!(results.is_empty());
    }
}
