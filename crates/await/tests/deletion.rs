#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Duration;

use converge_await::mock::ScriptedResource;
use converge_await::{AwaitRegistry, AwaitSettings, DeleteContext};
use converge_core::{AwaitError, ClientError, KindKey, ObservedState};
use serde_json::json;

fn settings() -> AwaitSettings {
    AwaitSettings {
        replicas_timeout: Duration::from_secs(60),
        namespace_delete_timeout: Duration::from_secs(60),
        pod_delete_timeout: Duration::from_secs(60),
        ..AwaitSettings::default()
    }
}

fn scaled(name: &str, spec: i64, current: i64) -> ObservedState {
    json!({"metadata": {"name": name}, "spec": {"replicas": spec}, "status": {"replicas": current}})
}

#[tokio::test(start_paused = true)]
async fn deployment_delete_stops_polling_once_not_found() {
    let reg = AwaitRegistry::new(&settings());
    let res = ScriptedResource::new().with_gets(vec![
        Ok(Some(scaled("web", 3, 3))),
        Ok(Some(scaled("web", 3, 1))),
        Err(ClientError::NotFound("deployments.apps \"web\" not found".into())),
    ]);
    let kind = KindKey::parse("apps/v1/Deployment").expect("key");

    reg.await_delete(&kind, &DeleteContext::new(Arc::new(res.clone()), "web")).await.expect("deleted");
    assert_eq!(res.get_calls(), 3);

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(res.get_calls(), 3);
    assert_eq!(res.watch_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn replication_controller_timeout_names_remaining_replicas() {
    let reg = AwaitRegistry::new(&settings());
    let res = ScriptedResource::new().with_gets(vec![Ok(Some(scaled("rc", 2, 2)))]);
    let kind = KindKey::new("", "v1", "ReplicationController");

    let err = reg.await_delete(&kind, &DeleteContext::new(Arc::new(res.clone()), "rc")).await.expect_err("stuck");
    assert!(err.is_timeout());
    assert!(
        err.to_string().contains("ReplicationController 'rc' still exists (2 / 2 replicas exist)"),
        "{}",
        err
    );
    // 1s doubling to a 10s cap over a minute.
    assert!(res.get_calls() >= 7, "polled {} times", res.get_calls());
}

#[tokio::test(start_paused = true)]
async fn namespace_delete_finishes_when_phase_clears() {
    let reg = AwaitRegistry::new(&settings());
    let ns = |phase: &str| json!({"metadata": {"name": "team"}, "status": {"phase": phase}});
    let res = ScriptedResource::new().with_gets(vec![
        Ok(Some(ns("Terminating"))),
        Err(ClientError::from_status(503, "etcd leader changed")),
        Ok(Some(ns("Terminating"))),
        Ok(Some(ns(""))),
    ]);
    let kind = KindKey::new("", "v1", "Namespace");

    reg.await_delete(&kind, &DeleteContext::new(Arc::new(res.clone()), "team")).await.expect("gone");
    assert_eq!(res.get_calls(), 4);
}

#[tokio::test(start_paused = true)]
async fn pod_delete_aborts_on_forbidden() {
    let reg = AwaitRegistry::new(&settings());
    let res = ScriptedResource::new().with_gets(vec![Err(ClientError::Forbidden("pods \"p\" is forbidden".into()))]);
    let kind = KindKey::new("", "v1", "Pod");

    let err = reg.await_delete(&kind, &DeleteContext::new(Arc::new(res.clone()), "p")).await.expect_err("fatal");
    assert!(matches!(err, AwaitError::Fatal { source: ClientError::Forbidden(_), .. }));
    assert_eq!(res.get_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn delete_wait_can_be_cancelled() {
    let reg = Arc::new(AwaitRegistry::new(&settings()));
    let res = ScriptedResource::new().with_gets(vec![Ok(Some(json!({"metadata": {"name": "p"}, "status": {"phase": "Running"}})))]);
    let ctx = DeleteContext::new(Arc::new(res.clone()), "p");
    let cancel = ctx.cancel.clone();

    let task = tokio::spawn({
        let reg = Arc::clone(&reg);
        async move { reg.await_delete(&KindKey::new("", "v1", "Pod"), &ctx).await }
    });
    tokio::time::sleep(Duration::from_secs(3)).await;
    cancel.cancel();

    let err = task.await.expect("join").expect_err("cancelled");
    assert!(err.is_cancelled());
    assert!(!err.is_timeout());
}
