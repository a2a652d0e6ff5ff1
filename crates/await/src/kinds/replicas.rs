//! Replica convergence for Deployment and ReplicationController.
//!
//! Only the controller's aggregate counters are consulted; readiness of
//! individual pods is not verified.

use std::time::Duration;

use tracing::{debug, info};

use converge_core::{i64_at, object_name, AwaitResult, Check, ClientError, ObservedState};

use super::{Capabilities, KindAwaiter};
use crate::context::{CreateContext, DeleteContext, UpdateContext};
use crate::retry::lookup_check;
use crate::settings::RetryPolicy;

/// `status.availableReplicas` has caught up with `spec.replicas`.
///
/// The server omits zero-valued counters, so an absent `availableReplicas`
/// only matches a desired count of zero.
pub fn replicas_ready(obj: &ObservedState) -> bool {
    let Some(desired) = i64_at(obj, "/spec/replicas") else {
        return false;
    };
    let available = match i64_at(obj, "/status/availableReplicas") {
        Some(n) => n,
        None if desired == 0 => 0,
        None => return false,
    };
    debug!(name = %object_name(obj), available, desired, "replica counts");
    available == desired
}

/// Deletion check: gone, or scaled down to nothing.
pub fn replicas_gone(name: &str, label: &str, lookup: Result<Option<&ObservedState>, &ClientError>) -> Check {
    lookup_check(lookup, |obj| {
        let current = i64_at(obj, "/status/replicas").unwrap_or(0);
        if current == 0 {
            return Check::Done;
        }
        let desired = i64_at(obj, "/spec/replicas").unwrap_or(0);
        Check::retry(format!("{} '{}' still exists ({} / {} replicas exist)", label, name, current, desired))
    })
}

pub struct ReplicasAwaiter {
    label: &'static str,
    timeout: Duration,
    retry: RetryPolicy,
}

impl ReplicasAwaiter {
    pub fn new(label: &'static str, timeout: Duration, retry: RetryPolicy) -> Self {
        Self { label, timeout, retry }
    }
}

#[async_trait::async_trait]
impl KindAwaiter for ReplicasAwaiter {
    fn capabilities(&self) -> Capabilities {
        Capabilities::ALL
    }

    async fn await_create(&self, ctx: &CreateContext) -> AwaitResult {
        let desired = i64_at(&ctx.inputs, "/spec/replicas");
        info!(name = %ctx.name(), kind = self.label, desired = ?desired, "waiting for replicas");
        ctx.watch(self.retry)
            .waiting_for(format!("{} replicas to become available", self.label))
            .watch_until(replicas_ready, self.timeout)
            .await
    }

    async fn await_update(&self, ctx: &UpdateContext) -> AwaitResult {
        self.await_create(&ctx.current).await
    }

    async fn await_delete(&self, ctx: &DeleteContext) -> AwaitResult {
        let label = self.label;
        let name = ctx.name.as_str();
        ctx.watch(self.retry).retry_until(|lookup| replicas_gone(name, label, lookup), self.timeout).await
    }
}
