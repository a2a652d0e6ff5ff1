//! ServiceAccount: the token controller appends a default secret to `secrets`.

use std::time::Duration;

use tracing::debug;

use converge_core::{len_at, object_name, AwaitResult, ObservedState};

use super::{Capabilities, KindAwaiter};
use crate::context::CreateContext;
use crate::settings::RetryPolicy;

/// More secrets observed than the caller declared.
pub fn secrets_allocated(obj: &ObservedState, declared: usize) -> bool {
    let Some(have) = len_at(obj, "/secrets") else {
        return false;
    };
    debug!(name = %object_name(obj), have, want = declared + 1, "secrets allocated");
    have > declared
}

pub struct ServiceAccountAwaiter {
    timeout: Duration,
    retry: RetryPolicy,
}

impl ServiceAccountAwaiter {
    pub fn new(timeout: Duration, retry: RetryPolicy) -> Self {
        Self { timeout, retry }
    }
}

#[async_trait::async_trait]
impl KindAwaiter for ServiceAccountAwaiter {
    fn capabilities(&self) -> Capabilities {
        Capabilities::create_only()
    }

    async fn await_create(&self, ctx: &CreateContext) -> AwaitResult {
        let declared = len_at(&ctx.inputs, "/secrets").unwrap_or(0);
        ctx.watch(self.retry)
            .waiting_for(format!("default secret to be added ({} declared)", declared))
            .watch_until(|obj| secrets_allocated(obj, declared), self.timeout)
            .await
    }
}
