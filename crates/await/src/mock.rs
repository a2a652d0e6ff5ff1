// ----------------- Scripted in-memory client -----------------

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use futures::{stream, StreamExt};

use converge_core::{
    ClientError, ClientFactory, EventRecord, EventSource, KindKey, ObservationStream, ObservedState, ResourceClient,
};

enum WatchScript {
    Open { items: Vec<Result<ObservedState, ClientError>>, keep_open: bool },
    Fail(ClientError),
}

#[derive(Default)]
struct Inner {
    watches: Mutex<VecDeque<WatchScript>>,
    gets: Mutex<VecDeque<Result<Option<ObservedState>, ClientError>>>,
    last_get: Mutex<Option<Result<Option<ObservedState>, ClientError>>>,
    events: Mutex<Option<Result<Vec<EventRecord>, ClientError>>>,
    get_calls: AtomicUsize,
    watch_calls: AtomicUsize,
    event_calls: AtomicUsize,
}

/// In-memory client replaying scripted watches, lookups and events, counting every call.
///
/// Each `watch` consumes the next scripted subscription; once the script is
/// exhausted new subscriptions stay open without delivering anything. Each
/// `get` consumes the next scripted result and repeats the last one afterwards.
/// Clones share one script.
#[derive(Clone, Default)]
pub struct ScriptedResource {
    inner: Arc<Inner>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

impl ScriptedResource {
    pub fn new() -> Self {
        Self::default()
    }

    /// A subscription delivering `items`, then staying open.
    pub fn with_watch(self, items: Vec<Result<ObservedState, ClientError>>) -> Self {
        lock(&self.inner.watches).push_back(WatchScript::Open { items, keep_open: true });
        self
    }

    /// A subscription delivering `items`, then ending.
    pub fn with_closing_watch(self, items: Vec<Result<ObservedState, ClientError>>) -> Self {
        lock(&self.inner.watches).push_back(WatchScript::Open { items, keep_open: false });
        self
    }

    /// A subscription attempt that fails to open.
    pub fn with_failed_watch(self, err: ClientError) -> Self {
        lock(&self.inner.watches).push_back(WatchScript::Fail(err));
        self
    }

    pub fn with_gets(self, results: Vec<Result<Option<ObservedState>, ClientError>>) -> Self {
        lock(&self.inner.gets).extend(results);
        self
    }

    pub fn with_events(self, events: Vec<EventRecord>) -> Self {
        *lock(&self.inner.events) = Some(Ok(events));
        self
    }

    pub fn with_event_error(self, err: ClientError) -> Self {
        *lock(&self.inner.events) = Some(Err(err));
        self
    }

    pub fn get_calls(&self) -> usize {
        self.inner.get_calls.load(Ordering::SeqCst)
    }

    pub fn watch_calls(&self) -> usize {
        self.inner.watch_calls.load(Ordering::SeqCst)
    }

    pub fn event_calls(&self) -> usize {
        self.inner.event_calls.load(Ordering::SeqCst)
    }

    /// Total calls of any kind.
    pub fn calls(&self) -> usize {
        self.get_calls() + self.watch_calls() + self.event_calls()
    }
}

#[async_trait::async_trait]
impl ResourceClient for ScriptedResource {
    async fn get(&self, _name: &str) -> Result<Option<ObservedState>, ClientError> {
        self.inner.get_calls.fetch_add(1, Ordering::SeqCst);
        let next = lock(&self.inner.gets).pop_front();
        let mut last = lock(&self.inner.last_get);
        match next {
            Some(res) => {
                *last = Some(res.clone());
                res
            }
            None => last.clone().unwrap_or(Ok(None)),
        }
    }

    async fn watch(&self, _name: &str) -> Result<ObservationStream, ClientError> {
        self.inner.watch_calls.fetch_add(1, Ordering::SeqCst);
        match lock(&self.inner.watches).pop_front() {
            Some(WatchScript::Fail(e)) => Err(e),
            Some(WatchScript::Open { items, keep_open: true }) => Ok(stream::iter(items).chain(stream::pending()).boxed()),
            Some(WatchScript::Open { items, keep_open: false }) => Ok(stream::iter(items).boxed()),
            None => Ok(stream::pending().boxed()),
        }
    }
}

#[async_trait::async_trait]
impl EventSource for ScriptedResource {
    async fn list_events(&self, _namespace: Option<&str>, _name: &str, _kind: &str) -> Result<Vec<EventRecord>, ClientError> {
        self.inner.event_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.inner.events).clone().unwrap_or_else(|| Ok(Vec::new()))
    }
}

#[async_trait::async_trait]
impl ClientFactory for ScriptedResource {
    async fn resource(&self, _kind: &KindKey, _namespace: Option<&str>) -> anyhow::Result<Arc<dyn ResourceClient>> {
        Ok(Arc::new(self.clone()))
    }

    fn events(&self, _namespace: Option<&str>) -> Arc<dyn EventSource> {
        Arc::new(self.clone())
    }
}
