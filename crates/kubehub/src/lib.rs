//! Converge kubehub – kube-rs backed change-stream client, discovery and events

#![forbid(unsafe_code)]

use std::sync::Arc;

use anyhow::{Context, Result};
use futures::StreamExt;
use k8s_openapi::api::core::v1::Event as CoreEvent;
use kube::{
    api::{Api, ListParams},
    core::{ApiResource, DynamicObject, GroupVersionKind},
    discovery::{self, Scope},
    runtime::watcher::{self, Event},
    Client,
};
use tracing::{debug, info};

use converge_core::{
    strip_managed_fields, ClientError, ClientFactory, EventRecord, EventSource, KindKey, ObservationStream,
    ObservedState, ResourceClient,
};

/// Builds kube-backed handles from one shared client.
#[derive(Clone)]
pub struct KubeFactory {
    client: Client,
}

impl KubeFactory {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Client from the ambient kubeconfig or in-cluster environment.
    pub async fn try_default() -> Result<Self> {
        let client = Client::try_default().await.context("building kube client")?;
        Ok(Self::new(client))
    }

    pub fn client(&self) -> Client {
        self.client.clone()
    }
}

#[async_trait::async_trait]
impl ClientFactory for KubeFactory {
    async fn resource(&self, kind: &KindKey, namespace: Option<&str>) -> Result<Arc<dyn ResourceClient>> {
        let gvk = GroupVersionKind::gvk(&kind.group, &kind.version, &kind.kind);
        let (ar, namespaced) = find_api_resource(self.client.clone(), &gvk).await?;
        let api: Api<DynamicObject> = if namespaced {
            match namespace {
                Some(ns) => Api::namespaced_with(self.client.clone(), ns, &ar),
                None => Api::default_namespaced_with(self.client.clone(), &ar),
            }
        } else {
            Api::all_with(self.client.clone(), &ar)
        };
        debug!(kind = %kind, ns = ?namespace, namespaced, "resource handle ready");
        Ok(Arc::new(KubeResource { api, kind: kind.clone() }))
    }

    fn events(&self, namespace: Option<&str>) -> Arc<dyn EventSource> {
        Arc::new(KubeEvents::new(self.client.clone(), namespace))
    }
}

async fn find_api_resource(client: Client, gvk: &GroupVersionKind) -> Result<(ApiResource, bool)> {
    let (ar, caps) = discovery::pinned_kind(&client, gvk)
        .await
        .with_context(|| format!("resolving {}/{}/{}", gvk.group, gvk.version, gvk.kind))?;
    Ok((ar, matches!(caps.scope, Scope::Namespaced)))
}

/// Dynamic handle for one kind, scoped to a namespace (or cluster-wide).
pub struct KubeResource {
    api: Api<DynamicObject>,
    kind: KindKey,
}

impl KubeResource {
    pub fn new(api: Api<DynamicObject>, kind: KindKey) -> Self {
        Self { api, kind }
    }
}

#[async_trait::async_trait]
impl ResourceClient for KubeResource {
    async fn get(&self, name: &str) -> Result<Option<ObservedState>, ClientError> {
        let found = self.api.get_opt(name).await.map_err(client_error)?;
        found.as_ref().map(observed_from).transpose()
    }

    async fn watch(&self, name: &str) -> Result<ObservationStream, ClientError> {
        let cfg = watcher::Config::default().fields(&format!("metadata.name={}", name));
        let target = name.to_string();
        info!(kind = %self.kind, name = %name, "watch opened");
        metrics::counter!("kube_watch_opened_total", 1u64);
        let stream = watcher::watcher(self.api.clone(), cfg)
            .flat_map(move |ev| futures::stream::iter(observations(ev, &target)))
            .boxed();
        Ok(stream)
    }
}

fn observed_from(obj: &DynamicObject) -> Result<ObservedState, ClientError> {
    let mut raw = serde_json::to_value(obj).map_err(|e| ClientError::Invalid(format!("serializing DynamicObject: {}", e)))?;
    strip_managed_fields(&mut raw);
    Ok(raw)
}

/// Flatten one watcher event into the states of the target object.
fn observations(ev: Result<Event<DynamicObject>, watcher::Error>, name: &str) -> Vec<Result<ObservedState, ClientError>> {
    match ev {
        Ok(Event::Applied(o)) => vec![observed_from(&o)],
        Ok(Event::Deleted(o)) => {
            debug!(name = ?o.metadata.name, "watched object deleted");
            Vec::new()
        }
        Ok(Event::Restarted(list)) => {
            debug!(count = list.len(), "watch restart");
            list.iter()
                .filter(|o| o.metadata.name.as_deref() == Some(name))
                .map(observed_from)
                .collect()
        }
        Err(e) => vec![Err(watch_error(e))],
    }
}

fn client_error(e: kube::Error) -> ClientError {
    match e {
        kube::Error::Api(ae) => ClientError::from_status(ae.code, ae.message),
        kube::Error::SerdeError(e) => ClientError::Invalid(e.to_string()),
        other => ClientError::Transport(other.to_string()),
    }
}

fn watch_error(e: watcher::Error) -> ClientError {
    match e {
        watcher::Error::InitialListFailed(e) | watcher::Error::WatchStartFailed(e) | watcher::Error::WatchFailed(e) => {
            client_error(e)
        }
        watcher::Error::WatchError(resp) => ClientError::from_status(resp.code, resp.message),
        other => ClientError::Transport(other.to_string()),
    }
}

/// Event lister backed by `v1/Event`.
pub struct KubeEvents {
    api: Api<CoreEvent>,
}

impl KubeEvents {
    pub fn new(client: Client, namespace: Option<&str>) -> Self {
        let api = match namespace {
            Some(ns) => Api::namespaced(client, ns),
            None => Api::all(client),
        };
        Self { api }
    }
}

#[async_trait::async_trait]
impl EventSource for KubeEvents {
    async fn list_events(&self, namespace: Option<&str>, name: &str, kind: &str) -> Result<Vec<EventRecord>, ClientError> {
        let mut selector = format!("involvedObject.name={},involvedObject.kind={}", name, kind);
        if let Some(ns) = namespace {
            selector.push_str(&format!(",involvedObject.namespace={}", ns));
        }
        let lp = ListParams::default().fields(&selector);
        let list = self.api.list(&lp).await.map_err(client_error)?;
        debug!(name = %name, kind = %kind, count = list.items.len(), "events listed");
        Ok(list.items.iter().map(event_record).collect())
    }
}

fn event_record(ev: &CoreEvent) -> EventRecord {
    let last_seen = ev
        .last_timestamp
        .as_ref()
        .map(|t| t.0)
        .or_else(|| ev.event_time.as_ref().map(|t| t.0))
        .or_else(|| ev.metadata.creation_timestamp.as_ref().map(|t| t.0));
    EventRecord {
        type_: ev.type_.clone().unwrap_or_default(),
        reason: ev.reason.clone().unwrap_or_default(),
        message: ev.message.clone().unwrap_or_default(),
        object_kind: ev.involved_object.kind.clone().unwrap_or_default(),
        object_name: ev.involved_object.name.clone().unwrap_or_default(),
        object_namespace: ev.involved_object.namespace.clone(),
        count: ev.count.unwrap_or(1),
        last_seen,
    }
}
