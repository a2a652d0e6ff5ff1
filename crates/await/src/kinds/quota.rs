//! ResourceQuota: the quota controller mirrors `spec.hard` into `status.hard`.

use std::time::Duration;

use tracing::{debug, info};

use converge_core::{object_name, AwaitResult, ObservedState};

use super::{Capabilities, KindAwaiter};
use crate::context::{CreateContext, UpdateContext};
use crate::quantity::resource_lists_equal;
use crate::settings::RetryPolicy;

pub fn quota_synced(obj: &ObservedState) -> bool {
    let synced = resource_lists_equal(obj.pointer("/spec/hard"), obj.pointer("/status/hard"));
    if !synced {
        debug!(
            name = %object_name(obj),
            expected = ?obj.pointer("/spec/hard"),
            given = ?obj.pointer("/status/hard"),
            "quotas don't match yet"
        );
    }
    synced
}

pub fn spec_changed(previous: &ObservedState, current: &ObservedState) -> bool {
    previous.get("spec") != current.get("spec")
}

pub struct QuotaAwaiter {
    timeout: Duration,
    retry: RetryPolicy,
}

impl QuotaAwaiter {
    pub fn new(timeout: Duration, retry: RetryPolicy) -> Self {
        Self { timeout, retry }
    }
}

#[async_trait::async_trait]
impl KindAwaiter for QuotaAwaiter {
    fn capabilities(&self) -> Capabilities {
        Capabilities { create: true, update: true, delete: false }
    }

    async fn await_create(&self, ctx: &CreateContext) -> AwaitResult {
        ctx.watch(self.retry)
            .waiting_for("status.hard to match spec.hard")
            .watch_until(quota_synced, self.timeout)
            .await
    }

    async fn await_update(&self, ctx: &UpdateContext) -> AwaitResult {
        if !spec_changed(&ctx.last_inputs, &ctx.current.inputs) {
            info!(name = %ctx.current.name(), "quota spec unchanged");
            return Ok(());
        }
        self.await_create(&ctx.current).await
    }
}
