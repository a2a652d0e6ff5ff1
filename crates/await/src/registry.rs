//! Kind → awaiter dispatch.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use rustc_hash::FxHashMap;
use tracing::{debug, info};

use converge_core::{AwaitResult, KindKey};

use crate::context::{CreateContext, DeleteContext, UpdateContext};
use crate::kinds::{
    Capabilities, KindAwaiter, LoadBalancerAwaiter, NamespaceAwaiter, NoAwait, PhaseAwaiter, QuotaAwaiter,
    ReplicasAwaiter, ServiceAccountAwaiter,
};
use crate::settings::AwaitSettings;

const DEPLOYMENT_VERSIONS: [(&str, &str); 4] =
    [("apps", "v1"), ("apps", "v1beta1"), ("apps", "v1beta2"), ("extensions", "v1beta1")];
const INGRESS_VERSIONS: [(&str, &str); 3] =
    [("extensions", "v1beta1"), ("networking.k8s.io", "v1beta1"), ("networking.k8s.io", "v1")];
const RBAC_VERSIONS: [&str; 3] = ["v1", "v1alpha1", "v1beta1"];
const RBAC_KINDS: [&str; 4] = ["ClusterRole", "ClusterRoleBinding", "Role", "RoleBinding"];

/// Read-only after construction; share it behind an `Arc`.
pub struct AwaitRegistry {
    awaiters: FxHashMap<KindKey, Arc<dyn KindAwaiter>>,
}

impl AwaitRegistry {
    /// Registry with no kinds; every await resolves at once.
    pub fn empty() -> Self {
        Self { awaiters: FxHashMap::default() }
    }

    /// All built-in kinds, with deadlines and pacing from `settings`.
    pub fn new(settings: &AwaitSettings) -> Self {
        let retry = settings.retry;
        let mut reg = Self::empty();

        let deployment: Arc<dyn KindAwaiter> =
            Arc::new(ReplicasAwaiter::new("Deployment", settings.replicas_timeout, retry));
        for (group, version) in DEPLOYMENT_VERSIONS {
            reg.register(KindKey::new(group, version, "Deployment"), Arc::clone(&deployment));
        }
        reg.register(
            KindKey::new("", "v1", "ReplicationController"),
            Arc::new(ReplicasAwaiter::new("ReplicationController", settings.replicas_timeout, retry)),
        );

        reg.register(
            KindKey::new("", "v1", "Namespace"),
            Arc::new(NamespaceAwaiter::new(settings.namespace_delete_timeout, retry)),
        );
        reg.register(
            KindKey::new("", "v1", "PersistentVolume"),
            Arc::new(PhaseAwaiter::persistent_volume(settings.phase_timeout, retry)),
        );
        reg.register(
            KindKey::new("", "v1", "PersistentVolumeClaim"),
            Arc::new(PhaseAwaiter::persistent_volume_claim(settings.phase_timeout, retry)),
        );
        reg.register(
            KindKey::new("", "v1", "Pod"),
            Arc::new(PhaseAwaiter::pod(settings.phase_timeout, settings.pod_delete_timeout, retry)),
        );
        reg.register(KindKey::new("", "v1", "ResourceQuota"), Arc::new(QuotaAwaiter::new(settings.quota_timeout, retry)));
        reg.register(
            KindKey::new("", "v1", "Service"),
            Arc::new(LoadBalancerAwaiter::service(settings.load_balancer_timeout, retry, settings.event_limit)),
        );
        reg.register(
            KindKey::new("", "v1", "ServiceAccount"),
            Arc::new(ServiceAccountAwaiter::new(settings.service_account_timeout, retry)),
        );

        let ingress: Arc<dyn KindAwaiter> =
            Arc::new(LoadBalancerAwaiter::ingress(settings.load_balancer_timeout, retry, settings.event_limit));
        for (group, version) in INGRESS_VERSIONS {
            reg.register(KindKey::new(group, version, "Ingress"), Arc::clone(&ingress));
        }

        let none: Arc<dyn KindAwaiter> = Arc::new(NoAwait);
        reg.register(KindKey::new("autoscaling", "v1", "HorizontalPodAutoscaler"), Arc::clone(&none));
        for kind in ["ConfigMap", "LimitRange", "Secret"] {
            reg.register(KindKey::new("", "v1", kind), Arc::clone(&none));
        }
        for version in RBAC_VERSIONS {
            for kind in RBAC_KINDS {
                reg.register(KindKey::new("rbac.authorization.k8s.io", version, kind), Arc::clone(&none));
            }
        }
        reg.register(KindKey::new("storage.k8s.io", "v1", "StorageClass"), none);

        debug!(kinds = reg.awaiters.len(), "await registry built");
        reg
    }

    pub fn register(&mut self, kind: KindKey, awaiter: Arc<dyn KindAwaiter>) {
        self.awaiters.insert(kind, awaiter);
    }

    pub fn lookup(&self, kind: &KindKey) -> Option<&Arc<dyn KindAwaiter>> {
        self.awaiters.get(kind)
    }

    /// Known kinds report their slots; unknown kinds report none.
    pub fn capabilities(&self, kind: &KindKey) -> Capabilities {
        self.lookup(kind).map(|a| a.capabilities()).unwrap_or_default()
    }

    /// Distinguishes kinds registered without waits from kinds never heard of.
    pub fn is_known(&self, kind: &KindKey) -> bool {
        self.awaiters.contains_key(kind)
    }

    /// Registered kinds in key order.
    pub fn kinds(&self) -> Vec<(KindKey, Capabilities)> {
        let mut out: Vec<_> = self.awaiters.iter().map(|(k, a)| (k.clone(), a.capabilities())).collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    pub async fn await_create(&self, kind: &KindKey, ctx: &CreateContext) -> AwaitResult {
        match self.lookup(kind).filter(|a| a.capabilities().create) {
            Some(a) => timed("create", kind, ctx.name(), a.await_create(ctx)).await,
            None => skip("create", kind, ctx.name()),
        }
    }

    pub async fn await_update(&self, kind: &KindKey, ctx: &UpdateContext) -> AwaitResult {
        match self.lookup(kind).filter(|a| a.capabilities().update) {
            Some(a) => timed("update", kind, ctx.current.name(), a.await_update(ctx)).await,
            None => skip("update", kind, ctx.current.name()),
        }
    }

    pub async fn await_delete(&self, kind: &KindKey, ctx: &DeleteContext) -> AwaitResult {
        match self.lookup(kind).filter(|a| a.capabilities().delete) {
            Some(a) => timed("delete", kind, &ctx.name, a.await_delete(ctx)).await,
            None => skip("delete", kind, &ctx.name),
        }
    }
}

fn skip(op: &'static str, kind: &KindKey, name: &str) -> AwaitResult {
    debug!(op, kind = %kind, name = %name, "no await registered");
    metrics::counter!("await_total", 1u64, "op" => op, "outcome" => "skipped");
    Ok(())
}

async fn timed<F>(op: &'static str, kind: &KindKey, name: &str, fut: F) -> AwaitResult
where
    F: Future<Output = AwaitResult>,
{
    let t0 = Instant::now();
    info!(op, kind = %kind, name = %name, "await start");
    let res = fut.await;
    let took = t0.elapsed();
    metrics::histogram!("await_latency_ms", took.as_secs_f64() * 1_000.0, "op" => op);
    let outcome = match &res {
        Ok(()) => "ok",
        Err(e) => e.outcome(),
    };
    metrics::counter!("await_total", 1u64, "op" => op, "outcome" => outcome);
    info!(op, kind = %kind, name = %name, outcome, took_ms = %took.as_millis(), "await done");
    res
}
