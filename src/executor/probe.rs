// Liveness probe stage

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::queue::HostQueue;
use super::retry::ProbeConfig;
use super::LivenessProber;
use crate::inventory::{HostRecord, Liveness};

/// Probe workers: Input Queue in, Alive Queue out.
///
/// Every host reaches the Alive Queue exactly once, either online or, after
/// its retries run out, offline. Failed attempts go back onto the Input Queue
/// with a wider wait budget.
pub struct ProbeStage {
    input: HostQueue,
    alive: HostQueue,
    prober: Arc<dyn LivenessProber>,
    config: ProbeConfig,
    poll: Duration,
}

impl ProbeStage {
    pub fn new(
        input: HostQueue,
        alive: HostQueue,
        prober: Arc<dyn LivenessProber>,
        config: ProbeConfig,
        poll: Duration,
    ) -> Self {
        ProbeStage {
            input,
            alive,
            prober,
            config,
            poll,
        }
    }

    /// Worker loop. An empty dequeue is not a reason to exit: retries may
    /// still land on the Input Queue, so only the stop token ends the loop.
    pub async fn run_worker(self: Arc<Self>, worker: usize, stop: CancellationToken) {
        while !stop.is_cancelled() {
            let Some(host) = self.input.pop(self.poll).await else {
                continue;
            };
            self.probe_host(worker, host).await;
        }
        debug!(worker, "probe worker stopped");
    }

    async fn probe_host(&self, worker: usize, mut host: HostRecord) {
        let wait = Duration::from_secs(host.ping_wait);
        let reachable = match self.prober.probe(host.hostname(), wait).await {
            Ok(reachable) => reachable,
            Err(e) => {
                debug!(worker, host = %host.address, error = %e, "probe attempt failed");
                false
            }
        };

        if reachable {
            debug!(worker, host = %host.address, retries = host.retries, "host online");
            host.liveness = Liveness::Online;
            self.alive.push(host);
        } else if self.config.can_retry(host.retries) {
            host.retries += 1;
            host.ping_wait = self.config.next_wait(host.ping_wait);
            debug!(
                worker,
                host = %host.address,
                retries = host.retries,
                ping_wait = host.ping_wait,
                "no answer, requeueing"
            );
            self.input.push(host);
        } else {
            debug!(worker, host = %host.address, "host offline");
            host.liveness = Liveness::Offline;
            self.alive.push(host);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::executor::supervisor::WorkerPool;
    use crate::executor::ProbeError;
    use crate::inventory::{HostDefaults, HostPool};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    /// Prober answering from a script: each address fails a fixed number of
    /// times before it replies. Addresses not in the script never reply.
    #[derive(Default)]
    pub(crate) struct ScriptedProber {
        failures_before_reply: HashMap<String, usize>,
        pub(crate) calls: Mutex<Vec<(String, Duration)>>,
    }

    impl ScriptedProber {
        pub(crate) fn new(script: &[(&str, usize)]) -> Self {
            ScriptedProber {
                failures_before_reply: script
                    .iter()
                    .map(|(address, n)| (address.to_string(), *n))
                    .collect(),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LivenessProber for ScriptedProber {
        async fn probe(&self, address: &str, wait: Duration) -> Result<bool, ProbeError> {
            let mut calls = self.calls.lock();
            let previous = calls.iter().filter(|(a, _)| a == address).count();
            calls.push((address.to_string(), wait));

            Ok(match self.failures_before_reply.get(address) {
                Some(&failures) => previous >= failures,
                None => false,
            })
        }
    }

    async fn drain(queue: &HostQueue, expected: usize) -> Vec<HostRecord> {
        let mut out = Vec::new();
        while out.len() < expected {
            if let Some(host) = queue.pop(Duration::from_millis(50)).await {
                out.push(host);
            }
        }
        out.sort_by_key(|h| h.id);
        out
    }

    fn start(stage: Arc<ProbeStage>, workers: usize) -> WorkerPool {
        let mut pool = WorkerPool::new("probe");
        pool.start(workers, move |id, token| stage.clone().run_worker(id, token));
        pool
    }

    #[tokio::test]
    async fn test_unreachable_host_marked_offline_after_retries() {
        let pool = HostPool::parse_str("10.0.0.9\n", &HostDefaults::default());
        let alive = HostQueue::new();
        let prober = Arc::new(ScriptedProber::default());
        let config = ProbeConfig {
            max_retries: 2,
            base_wait: 1,
            wait_step: 1,
            max_wait: 10,
        };

        let stage = Arc::new(ProbeStage::new(
            pool.to_queue(),
            alive.clone(),
            prober.clone(),
            config,
            Duration::from_millis(10),
        ));
        let mut workers = start(stage, 2);

        let hosts = drain(&alive, 1).await;
        workers.shutdown().await;

        assert_eq!(hosts[0].liveness, Liveness::Offline);
        assert_eq!(hosts[0].retries, 2);

        let waits: Vec<u64> = prober.calls.lock().iter().map(|(_, w)| w.as_secs()).collect();
        assert_eq!(waits, vec![1, 2, 3]);
        assert!(alive.is_empty());
    }

    #[tokio::test]
    async fn test_host_recovers_within_retry_bound() {
        let pool = HostPool::parse_str("a\nb\nc\n", &HostDefaults::default());
        let alive = HostQueue::new();
        let prober = Arc::new(ScriptedProber::new(&[("a", 0), ("b", 2)]));

        let stage = Arc::new(ProbeStage::new(
            pool.to_queue(),
            alive.clone(),
            prober,
            ProbeConfig::default(),
            Duration::from_millis(10),
        ));
        let mut workers = start(stage, 3);

        let hosts = drain(&alive, 3).await;
        workers.shutdown().await;

        assert_eq!(hosts[0].liveness, Liveness::Online);
        assert_eq!(hosts[0].retries, 0);
        assert_eq!(hosts[1].liveness, Liveness::Online);
        assert_eq!(hosts[1].retries, 2);
        assert_eq!(hosts[2].liveness, Liveness::Offline);
        assert_eq!(hosts[2].retries, 3);
    }
}
