//! Converge core types: kind keys, observed state, check verdicts and the
//! change-stream capability consumed by the await engine.

#![forbid(unsafe_code)]

use std::fmt;

use serde::{Deserialize, Serialize};

mod client;
mod error;

pub use client::{ClientFactory, EventRecord, EventSource, ObservationStream, ResourceClient};
pub use error::{AwaitError, AwaitResult, ClientError};

/// Server-side representation of an object as delivered by a get or a watch.
pub type ObservedState = serde_json::Value;

pub mod prelude {
    pub use super::{
        AwaitError, AwaitResult, Check, ClientError, ClientFactory, EventRecord, EventSource, KindKey,
        ObservationStream, ObservedState, ResourceClient,
    };
}

/// Identity of a resource kind: `group/version/Kind`, or `version/Kind` for the core group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KindKey {
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl KindKey {
    pub fn new(group: &str, version: &str, kind: &str) -> Self {
        Self { group: group.to_string(), version: version.to_string(), kind: kind.to_string() }
    }

    /// Parse `v1/Kind` or `group/v1/Kind`.
    pub fn parse(key: &str) -> Result<Self, ClientError> {
        let parts: Vec<_> = key.split('/').collect();
        match parts.as_slice() {
            [version, kind] if !version.is_empty() && !kind.is_empty() => Ok(Self::new("", version, kind)),
            [group, version, kind] if !group.is_empty() && !version.is_empty() && !kind.is_empty() => {
                Ok(Self::new(group, version, kind))
            }
            _ => Err(ClientError::Invalid(format!("invalid kind key: {} (expect v1/Kind or group/v1/Kind)", key))),
        }
    }

    /// Build a key from an object's `apiVersion` and `kind` fields.
    pub fn from_object(obj: &ObservedState) -> Result<Self, ClientError> {
        let api_version = obj
            .get("apiVersion")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ClientError::Invalid("object missing apiVersion".into()))?;
        let kind = obj
            .get("kind")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ClientError::Invalid("object missing kind".into()))?;
        match api_version.split_once('/') {
            Some((group, version)) => Ok(Self::new(group, version, kind)),
            None => Ok(Self::new("", api_version, kind)),
        }
    }
}

impl fmt::Display for KindKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}/{}", self.version, self.kind)
        } else {
            write!(f, "{}/{}/{}", self.group, self.version, self.kind)
        }
    }
}

/// Verdict of a deletion-style check against the latest lookup.
#[derive(Debug, Clone)]
pub enum Check {
    /// Condition satisfied (object gone or converged).
    Done,
    /// Not there yet; keep polling. Carries the reason reported on timeout.
    Retry(String),
    /// Can never converge; stop polling now.
    Fatal(ClientError),
}

impl Check {
    pub fn retry(reason: impl Into<String>) -> Self {
        Check::Retry(reason.into())
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Check::Done)
    }
}

/// `metadata.name` of an object, or an empty string.
pub fn object_name(obj: &ObservedState) -> &str {
    obj.pointer("/metadata/name").and_then(|v| v.as_str()).unwrap_or("")
}

/// `metadata.namespace` of an object, if set.
pub fn object_namespace(obj: &ObservedState) -> Option<&str> {
    obj.pointer("/metadata/namespace").and_then(|v| v.as_str()).filter(|s| !s.is_empty())
}

/// String field at a JSON pointer; empty strings count as absent.
pub fn str_at<'a>(obj: &'a ObservedState, pointer: &str) -> Option<&'a str> {
    obj.pointer(pointer).and_then(|v| v.as_str()).filter(|s| !s.is_empty())
}

/// Integer field at a JSON pointer.
pub fn i64_at(obj: &ObservedState, pointer: &str) -> Option<i64> {
    obj.pointer(pointer).and_then(|v| v.as_i64())
}

/// Length of an array field at a JSON pointer (`None` if absent or not an array).
pub fn len_at(obj: &ObservedState, pointer: &str) -> Option<usize> {
    obj.pointer(pointer).and_then(|v| v.as_array()).map(|a| a.len())
}

/// Drop `metadata.managedFields`; it is noise for every predicate and for diagnostics.
pub fn strip_managed_fields(v: &mut ObservedState) {
    if let Some(meta) = v.get_mut("metadata") {
        if let Some(obj) = meta.as_object_mut() {
            obj.remove("managedFields");
        }
    }
}
