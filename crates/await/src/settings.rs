//! Per-kind deadlines and retry pacing, overridable from the environment.

use std::time::Duration;

/// Pacing for deletion polls and watch resubscription: exponential, doubling, capped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub initial: Duration,
    pub max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { initial: Duration::from_secs(1), max: Duration::from_secs(10) }
    }
}

impl RetryPolicy {
    /// Same delay every time.
    pub fn fixed(delay: Duration) -> Self {
        Self { initial: delay, max: delay }
    }

    pub fn backoff(&self) -> Backoff {
        Backoff { next: self.initial, policy: *self }
    }
}

/// Running state of a [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct Backoff {
    next: Duration,
    policy: RetryPolicy,
}

impl Backoff {
    pub fn next_delay(&mut self) -> Duration {
        let d = self.next;
        self.next = self.next.saturating_mul(2).min(self.policy.max.max(self.policy.initial));
        d
    }

    pub fn reset(&mut self) {
        self.next = self.policy.initial;
    }
}

/// Deadlines are sized to the cluster-side work each kind implies: replica
/// rollouts of ~10k pods, single phase transitions, quota reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwaitSettings {
    pub replicas_timeout: Duration,
    pub phase_timeout: Duration,
    pub namespace_delete_timeout: Duration,
    pub pod_delete_timeout: Duration,
    pub service_account_timeout: Duration,
    pub load_balancer_timeout: Duration,
    pub quota_timeout: Duration,
    pub retry: RetryPolicy,
    /// Max warning events folded into a failed load-balancer wait.
    pub event_limit: usize,
}

impl Default for AwaitSettings {
    fn default() -> Self {
        Self {
            replicas_timeout: Duration::from_secs(10 * 60),
            phase_timeout: Duration::from_secs(5 * 60),
            namespace_delete_timeout: Duration::from_secs(5 * 60),
            pod_delete_timeout: Duration::from_secs(5 * 60),
            service_account_timeout: Duration::from_secs(5 * 60),
            load_balancer_timeout: Duration::from_secs(10 * 60),
            quota_timeout: Duration::from_secs(60),
            retry: RetryPolicy::default(),
            event_limit: 3,
        }
    }
}

impl AwaitSettings {
    /// Defaults overridden by `CONVERGE_*` variables; unparsable values are ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let d = Self::default();
        let secs = |key: &str, default: Duration| {
            lookup(key).and_then(|s| s.trim().parse::<u64>().ok()).map(Duration::from_secs).unwrap_or(default)
        };
        let millis = |key: &str, default: Duration| {
            lookup(key)
                .and_then(|s| s.trim().parse::<u64>().ok())
                .map(|ms| Duration::from_millis(ms.max(10)))
                .unwrap_or(default)
        };
        Self {
            replicas_timeout: secs("CONVERGE_REPLICAS_TIMEOUT_SECS", d.replicas_timeout),
            phase_timeout: secs("CONVERGE_PHASE_TIMEOUT_SECS", d.phase_timeout),
            namespace_delete_timeout: secs("CONVERGE_NAMESPACE_DELETE_TIMEOUT_SECS", d.namespace_delete_timeout),
            pod_delete_timeout: secs("CONVERGE_POD_DELETE_TIMEOUT_SECS", d.pod_delete_timeout),
            service_account_timeout: secs("CONVERGE_SERVICE_ACCOUNT_TIMEOUT_SECS", d.service_account_timeout),
            load_balancer_timeout: secs("CONVERGE_LOAD_BALANCER_TIMEOUT_SECS", d.load_balancer_timeout),
            quota_timeout: secs("CONVERGE_QUOTA_TIMEOUT_SECS", d.quota_timeout),
            retry: RetryPolicy {
                initial: millis("CONVERGE_RETRY_INITIAL_MS", d.retry.initial),
                max: millis("CONVERGE_RETRY_MAX_MS", d.retry.max),
            },
            event_limit: lookup("CONVERGE_EVENT_LIMIT").and_then(|s| s.trim().parse().ok()).unwrap_or(d.event_limit),
        }
    }
}
