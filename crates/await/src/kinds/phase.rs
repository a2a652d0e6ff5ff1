//! Phase convergence: PersistentVolume, PersistentVolumeClaim, Pod and Namespace.

use std::time::Duration;

use tracing::debug;

use converge_core::{object_name, str_at, AwaitResult, Check, ClientError, ObservedState};

use super::{Capabilities, KindAwaiter};
use crate::context::{CreateContext, DeleteContext};
use crate::retry::lookup_check;
use crate::settings::RetryPolicy;

pub fn phase_in(obj: &ObservedState, phases: &[&str]) -> bool {
    let phase = str_at(obj, "/status/phase");
    debug!(name = %object_name(obj), phase = ?phase, "status received");
    phase.is_some_and(|p| phases.contains(&p))
}

/// Deletion check for objects that are only done once they are gone.
pub fn object_gone(name: &str, label: &str, lookup: Result<Option<&ObservedState>, &ClientError>) -> Check {
    lookup_check(lookup, |obj| {
        let phase = str_at(obj, "/status/phase").unwrap_or("");
        Check::retry(format!("{} '{}' still exists ({})", label, name, phase))
    })
}

/// Namespace deletion: gone, or its phase has been cleared.
pub fn namespace_gone(name: &str, lookup: Result<Option<&ObservedState>, &ClientError>) -> Check {
    lookup_check(lookup, |obj| match str_at(obj, "/status/phase") {
        None => Check::Done,
        Some(phase) => Check::retry(format!("Namespace '{}' still exists ({})", name, phase)),
    })
}

/// Waits for `status.phase` to reach one of `phases`, and optionally for the
/// object to disappear on delete.
pub struct PhaseAwaiter {
    label: &'static str,
    phases: &'static [&'static str],
    timeout: Duration,
    delete_timeout: Option<Duration>,
    retry: RetryPolicy,
}

impl PhaseAwaiter {
    pub fn new(label: &'static str, phases: &'static [&'static str], timeout: Duration, retry: RetryPolicy) -> Self {
        Self { label, phases, timeout, delete_timeout: None, retry }
    }

    pub fn persistent_volume(timeout: Duration, retry: RetryPolicy) -> Self {
        Self::new("PersistentVolume", &["Available", "Bound"], timeout, retry)
    }

    pub fn persistent_volume_claim(timeout: Duration, retry: RetryPolicy) -> Self {
        Self::new("PersistentVolumeClaim", &["Bound"], timeout, retry)
    }

    pub fn pod(timeout: Duration, delete_timeout: Duration, retry: RetryPolicy) -> Self {
        Self::new("Pod", &["Running"], timeout, retry).with_delete(delete_timeout)
    }

    pub fn with_delete(mut self, timeout: Duration) -> Self {
        self.delete_timeout = Some(timeout);
        self
    }
}

#[async_trait::async_trait]
impl KindAwaiter for PhaseAwaiter {
    fn capabilities(&self) -> Capabilities {
        Capabilities { create: true, update: false, delete: self.delete_timeout.is_some() }
    }

    async fn await_create(&self, ctx: &CreateContext) -> AwaitResult {
        let phases = self.phases;
        ctx.watch(self.retry)
            .waiting_for(format!("{} phase {}", self.label, phases.join(" or ")))
            .watch_until(|obj| phase_in(obj, phases), self.timeout)
            .await
    }

    async fn await_delete(&self, ctx: &DeleteContext) -> AwaitResult {
        let Some(timeout) = self.delete_timeout else {
            return Ok(());
        };
        let label = self.label;
        let name = ctx.name.as_str();
        ctx.watch(self.retry).retry_until(|lookup| object_gone(name, label, lookup), timeout).await
    }
}

pub struct NamespaceAwaiter {
    timeout: Duration,
    retry: RetryPolicy,
}

impl NamespaceAwaiter {
    pub fn new(timeout: Duration, retry: RetryPolicy) -> Self {
        Self { timeout, retry }
    }
}

#[async_trait::async_trait]
impl KindAwaiter for NamespaceAwaiter {
    fn capabilities(&self) -> Capabilities {
        Capabilities::delete_only()
    }

    async fn await_delete(&self, ctx: &DeleteContext) -> AwaitResult {
        let name = ctx.name.as_str();
        ctx.watch(self.retry).retry_until(|lookup| namespace_gone(name, lookup), self.timeout).await
    }
}
