// Probe retry policy
// Backoff is linear: every retry widens the ping wait budget by a fixed step.

/// Pool-wide probe settings, shared by every probe worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeConfig {
    /// Retries per host before it is declared offline
    pub max_retries: u32,
    /// Wait budget of the first attempt, in seconds
    pub base_wait: u64,
    /// Added to the wait budget on every retry, in seconds
    pub wait_step: u64,
    /// Upper bound on the wait budget, in seconds
    pub max_wait: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        ProbeConfig {
            max_retries: 3,
            base_wait: 1,
            wait_step: 1,
            max_wait: 10,
        }
    }
}

impl ProbeConfig {
    /// Whether a host that already retried `retries` times may try again
    pub fn can_retry(&self, retries: u32) -> bool {
        retries < self.max_retries
    }

    /// Wait budget after bumping `current` by one step
    pub fn next_wait(&self, current: u64) -> u64 {
        current.saturating_add(self.wait_step).min(self.max_wait)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_backoff() {
        let config = ProbeConfig {
            max_retries: 5,
            base_wait: 1,
            wait_step: 2,
            max_wait: 6,
        };

        let mut wait = config.base_wait;
        let mut seen = vec![wait];
        for _ in 0..4 {
            wait = config.next_wait(wait);
            seen.push(wait);
        }
        // Should cap at max
        assert_eq!(seen, vec![1, 3, 5, 6, 6]);
    }

    #[test]
    fn test_retry_bound() {
        let config = ProbeConfig::default();

        assert!(config.can_retry(0));
        assert!(config.can_retry(2));
        assert!(!config.can_retry(3));
    }
}
