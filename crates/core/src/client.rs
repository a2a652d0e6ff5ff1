//! Change-stream capability consumed by the await engine.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::{ClientError, KindKey, ObservedState};

/// Successive states of one watched object. Transient failures are yielded as items;
/// the sequence ends when the server closes the watch.
pub type ObservationStream = BoxStream<'static, Result<ObservedState, ClientError>>;

/// Handle scoped to one kind and namespace.
#[async_trait::async_trait]
pub trait ResourceClient: Send + Sync {
    /// Fetch the named object; `Ok(None)` when it does not exist.
    async fn get(&self, name: &str) -> Result<Option<ObservedState>, ClientError>;

    /// Open a watch on the named object. The current state is delivered first.
    async fn watch(&self, name: &str) -> Result<ObservationStream, ClientError>;
}

/// A cluster event, reduced to the fields used for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// `Normal` or `Warning`.
    pub type_: String,
    pub reason: String,
    pub message: String,
    pub object_kind: String,
    pub object_name: String,
    pub object_namespace: Option<String>,
    pub count: i32,
    pub last_seen: Option<DateTime<Utc>>,
}

impl EventRecord {
    pub fn is_warning(&self) -> bool {
        self.type_ == "Warning"
    }
}

/// Source of events correlated to objects in one namespace.
#[async_trait::async_trait]
pub trait EventSource: Send + Sync {
    /// List events whose involved object has the given name and kind.
    async fn list_events(&self, namespace: Option<&str>, name: &str, kind: &str) -> Result<Vec<EventRecord>, ClientError>;
}

/// Produces scoped handles; resolving an arbitrary kind may require discovery.
#[async_trait::async_trait]
pub trait ClientFactory: Send + Sync {
    async fn resource(&self, kind: &KindKey, namespace: Option<&str>) -> anyhow::Result<Arc<dyn ResourceClient>>;

    fn events(&self, namespace: Option<&str>) -> Arc<dyn EventSource>;
}
