//! Per-kind convergence predicates and the awaiters built on them.

use converge_core::AwaitResult;

use crate::context::{CreateContext, DeleteContext, UpdateContext};

pub mod load_balancer;
pub mod phase;
pub mod quota;
pub mod replicas;
pub mod service_account;

pub use load_balancer::LoadBalancerAwaiter;
pub use phase::{NamespaceAwaiter, PhaseAwaiter};
pub use quota::QuotaAwaiter;
pub use replicas::ReplicasAwaiter;
pub use service_account::ServiceAccountAwaiter;

/// Which operations a kind actually waits on. An absent slot means the
/// operation is converged as soon as the API call returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct Capabilities {
    pub create: bool,
    pub update: bool,
    pub delete: bool,
}

impl Capabilities {
    pub const NONE: Capabilities = Capabilities { create: false, update: false, delete: false };
    pub const ALL: Capabilities = Capabilities { create: true, update: true, delete: true };

    pub const fn create_only() -> Self {
        Capabilities { create: true, update: false, delete: false }
    }

    pub const fn delete_only() -> Self {
        Capabilities { create: false, update: false, delete: true }
    }
}

#[async_trait::async_trait]
pub trait KindAwaiter: Send + Sync {
    fn capabilities(&self) -> Capabilities;

    async fn await_create(&self, _ctx: &CreateContext) -> AwaitResult {
        Ok(())
    }

    async fn await_update(&self, _ctx: &UpdateContext) -> AwaitResult {
        Ok(())
    }

    async fn await_delete(&self, _ctx: &DeleteContext) -> AwaitResult {
        Ok(())
    }
}

/// Known kind that needs no waiting.
pub struct NoAwait;

#[async_trait::async_trait]
impl KindAwaiter for NoAwait {
    fn capabilities(&self) -> Capabilities {
        Capabilities::NONE
    }
}
