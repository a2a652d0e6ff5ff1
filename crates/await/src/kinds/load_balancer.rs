//! External endpoint allocation for `LoadBalancer` Services and Ingresses.

use std::time::Duration;

use tracing::{debug, info};

use converge_core::{len_at, object_name, str_at, AwaitResult, ObservedState};

use super::{Capabilities, KindAwaiter};
use crate::context::CreateContext;
use crate::events::with_warnings;
use crate::settings::RetryPolicy;

/// `status.loadBalancer.ingress` holds at least one address.
pub fn ingress_allocated(obj: &ObservedState) -> bool {
    let n = len_at(obj, "/status/loadBalancer/ingress").unwrap_or(0);
    debug!(name = %object_name(obj), ingress = n, "load balancer status");
    n > 0
}

pub struct LoadBalancerAwaiter {
    kind: &'static str,
    only_type_lb: bool,
    timeout: Duration,
    retry: RetryPolicy,
    event_limit: usize,
}

impl LoadBalancerAwaiter {
    /// Only Services of `spec.type: LoadBalancer` wait; other types are ready at once.
    pub fn service(timeout: Duration, retry: RetryPolicy, event_limit: usize) -> Self {
        Self { kind: "Service", only_type_lb: true, timeout, retry, event_limit }
    }

    pub fn ingress(timeout: Duration, retry: RetryPolicy, event_limit: usize) -> Self {
        Self { kind: "Ingress", only_type_lb: false, timeout, retry, event_limit }
    }
}

#[async_trait::async_trait]
impl KindAwaiter for LoadBalancerAwaiter {
    fn capabilities(&self) -> Capabilities {
        Capabilities::create_only()
    }

    async fn await_create(&self, ctx: &CreateContext) -> AwaitResult {
        if self.only_type_lb && str_at(&ctx.inputs, "/spec/type") != Some("LoadBalancer") {
            debug!(name = %ctx.name(), "not a load balancer; nothing to wait for");
            return Ok(());
        }
        info!(name = %ctx.name(), kind = self.kind, "waiting for load balancer address");
        let res = ctx
            .watch(self.retry)
            .waiting_for("load balancer to assign an IP or hostname")
            .watch_until(ingress_allocated, self.timeout)
            .await;
        match res {
            Ok(()) => Ok(()),
            Err(err) => {
                let events = ctx.factory.events(ctx.namespace());
                Err(with_warnings(err, events.as_ref(), ctx.namespace(), ctx.name(), self.kind, self.event_limit).await)
            }
        }
    }
}
