//! Per-call context bundles handed to awaiters.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use converge_core::{object_name, object_namespace, ClientFactory, ObservedState, ResourceClient};

use crate::settings::RetryPolicy;
use crate::watch::ObjectWatch;

/// Everything a create await needs: the desired object and a handle scoped to
/// its kind and namespace.
#[derive(Clone)]
pub struct CreateContext {
    pub cancel: CancellationToken,
    pub factory: Arc<dyn ClientFactory>,
    pub resource: Arc<dyn ResourceClient>,
    pub inputs: ObservedState,
}

impl CreateContext {
    pub fn new(factory: Arc<dyn ClientFactory>, resource: Arc<dyn ResourceClient>, inputs: ObservedState) -> Self {
        Self { cancel: CancellationToken::new(), factory, resource, inputs }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn name(&self) -> &str {
        object_name(&self.inputs)
    }

    pub fn namespace(&self) -> Option<&str> {
        object_namespace(&self.inputs)
    }

    pub fn watch(&self, retry: RetryPolicy) -> ObjectWatch<'_> {
        ObjectWatch::for_object(self.resource.as_ref(), self.name(), &self.cancel).with_retry(retry)
    }
}

/// A create context plus the inputs and outputs of the previous revision.
#[derive(Clone)]
pub struct UpdateContext {
    pub current: CreateContext,
    pub last_inputs: ObservedState,
    pub last_outputs: ObservedState,
}

impl UpdateContext {
    pub fn new(current: CreateContext, last_inputs: ObservedState, last_outputs: ObservedState) -> Self {
        Self { current, last_inputs, last_outputs }
    }
}

#[derive(Clone)]
pub struct DeleteContext {
    pub cancel: CancellationToken,
    pub resource: Arc<dyn ResourceClient>,
    pub name: String,
}

impl DeleteContext {
    pub fn new(resource: Arc<dyn ResourceClient>, name: impl Into<String>) -> Self {
        Self { cancel: CancellationToken::new(), resource, name: name.into() }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn watch(&self, retry: RetryPolicy) -> ObjectWatch<'_> {
        ObjectWatch::for_object(self.resource.as_ref(), &self.name, &self.cancel).with_retry(retry)
    }
}
