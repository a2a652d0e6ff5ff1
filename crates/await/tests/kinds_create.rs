#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Duration;

use converge_await::mock::ScriptedResource;
use converge_await::{AwaitRegistry, AwaitSettings, CreateContext};
use converge_core::{ClientError, KindKey, ObservationStream, ObservedState, ResourceClient};
use futures::StreamExt;
use serde_json::json;

/// Emits the given phases one per second, then stays quiet.
struct SlowPhases(Vec<&'static str>);

#[async_trait::async_trait]
impl ResourceClient for SlowPhases {
    async fn get(&self, _name: &str) -> Result<Option<ObservedState>, ClientError> {
        Ok(None)
    }

    async fn watch(&self, name: &str) -> Result<ObservationStream, ClientError> {
        let phases = self.0.clone();
        let name = name.to_string();
        let s = async_stream::stream! {
            for p in phases {
                tokio::time::sleep(Duration::from_secs(1)).await;
                yield Ok::<_, ClientError>(json!({"metadata": {"name": name}, "status": {"phase": p}}));
            }
            futures::future::pending::<()>().await;
        };
        Ok(s.boxed())
    }
}

fn pod_ctx(phases: Vec<&'static str>) -> CreateContext {
    CreateContext::new(
        Arc::new(ScriptedResource::new()),
        Arc::new(SlowPhases(phases)),
        json!({"apiVersion": "v1", "kind": "Pod", "metadata": {"name": "p"}}),
    )
}

fn service_account(secrets: usize) -> ObservedState {
    let list: Vec<_> = (0..secrets).map(|i| json!({"name": format!("token-{}", i)})).collect();
    json!({"apiVersion": "v1", "kind": "ServiceAccount", "metadata": {"name": "builder"}, "secrets": list})
}

#[tokio::test(start_paused = true)]
async fn pod_running_within_deadline() {
    let reg = AwaitRegistry::new(&AwaitSettings::default());
    let ctx = pod_ctx(vec!["Pending", "ContainerCreating", "Running"]);
    reg.await_create(&KindKey::new("", "v1", "Pod"), &ctx).await.expect("running");
}

#[tokio::test(start_paused = true)]
async fn deadline_shorter_than_convergence_times_out() {
    let settings = AwaitSettings { phase_timeout: Duration::from_millis(1500), ..AwaitSettings::default() };
    let reg = AwaitRegistry::new(&settings);
    let ctx = pod_ctx(vec!["Pending", "ContainerCreating", "Running"]);
    let err = reg.await_create(&KindKey::new("", "v1", "Pod"), &ctx).await.expect_err("too slow");
    assert!(err.is_timeout());
    assert_eq!(err.last_observed().and_then(|o| o.pointer("/status/phase")), Some(&json!("Pending")));
}

#[tokio::test(start_paused = true)]
async fn huge_phase_timeout_override_still_waits() {
    let settings = AwaitSettings::from_lookup(|k| (k == "CONVERGE_PHASE_TIMEOUT_SECS").then(|| u64::MAX.to_string()));
    let reg = AwaitRegistry::new(&settings);
    let ctx = pod_ctx(vec!["Pending", "Running"]);
    reg.await_create(&KindKey::new("", "v1", "Pod"), &ctx).await.expect("running");
}

#[tokio::test(start_paused = true)]
async fn persistent_volume_accepts_available_or_bound() {
    let reg = AwaitRegistry::new(&AwaitSettings::default());
    let pv = |phase: &str| json!({"metadata": {"name": "vol"}, "status": {"phase": phase}});
    let res = ScriptedResource::new().with_watch(vec![Ok(pv("Pending")), Ok(pv("Available"))]);
    let ctx = CreateContext::new(Arc::new(res.clone()), Arc::new(res.clone()), pv(""));
    reg.await_create(&KindKey::new("", "v1", "PersistentVolume"), &ctx).await.expect("available");
}

#[tokio::test(start_paused = true)]
async fn service_account_needs_one_secret_beyond_declared() {
    let reg = AwaitRegistry::new(&AwaitSettings::default());
    let kind = KindKey::new("", "v1", "ServiceAccount");

    let res = ScriptedResource::new().with_watch(vec![Ok(service_account(2)), Ok(service_account(3))]);
    let ctx = CreateContext::new(Arc::new(res.clone()), Arc::new(res.clone()), service_account(2));
    reg.await_create(&kind, &ctx).await.expect("allocated");

    let settings = AwaitSettings { service_account_timeout: Duration::from_secs(10), ..AwaitSettings::default() };
    let reg = AwaitRegistry::new(&settings);
    let res = ScriptedResource::new().with_watch(vec![Ok(service_account(2))]);
    let ctx = CreateContext::new(Arc::new(res.clone()), Arc::new(res.clone()), service_account(2));
    assert!(reg.await_create(&kind, &ctx).await.expect_err("still 2").is_timeout());
}

#[tokio::test(start_paused = true)]
async fn quota_create_compares_quantities_by_value() {
    let reg = AwaitRegistry::new(&AwaitSettings::default());
    let inputs = json!({"metadata": {"name": "q"}, "spec": {"hard": {"requests.memory": "1Gi", "limits.cpu": "500m"}}});
    let mut pending = inputs.clone();
    pending["status"] = json!({});
    let mut synced = inputs.clone();
    synced["status"] = json!({"hard": {"requests.memory": "1073741824", "limits.cpu": "0.5"}});

    let res = ScriptedResource::new().with_watch(vec![Ok(pending), Ok(synced)]);
    let ctx = CreateContext::new(Arc::new(res.clone()), Arc::new(res.clone()), inputs);
    reg.await_create(&KindKey::new("", "v1", "ResourceQuota"), &ctx).await.expect("synced");
}
