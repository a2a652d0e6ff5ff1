//! Warning-event aggregation for failed waits.

use tracing::{debug, warn};

use converge_core::{AwaitError, ClientError, EventRecord, EventSource};

/// The `limit` most recent `Warning` events for the named object, oldest first.
/// A known `namespace` also has to match the event's object.
pub async fn recent_warnings(
    events: &dyn EventSource,
    namespace: Option<&str>,
    name: &str,
    kind: &str,
    limit: usize,
) -> Result<Vec<EventRecord>, ClientError> {
    let mut warnings: Vec<EventRecord> = events
        .list_events(namespace, name, kind)
        .await?
        .into_iter()
        .filter(|e| e.is_warning() && e.object_name == name && e.object_kind == kind)
        .filter(|e| namespace.map_or(true, |ns| e.object_namespace.as_deref() == Some(ns)))
        .collect();
    warnings.sort_by_key(|e| e.last_seen);
    let skip = warnings.len().saturating_sub(limit);
    Ok(warnings.split_off(skip))
}

pub fn render_warnings(warnings: &[EventRecord]) -> String {
    warnings
        .iter()
        .map(|e| format!("\n   * {} ({}): {}: {}", e.object_name, e.object_kind, e.reason, e.message))
        .collect()
}

/// Fold recent warnings for the object into `err`. Cancellation is returned untouched.
pub async fn with_warnings(
    err: AwaitError,
    events: &dyn EventSource,
    namespace: Option<&str>,
    name: &str,
    kind: &str,
    limit: usize,
) -> AwaitError {
    if err.is_cancelled() {
        return err;
    }
    match recent_warnings(events, namespace, name, kind, limit).await {
        Ok(found) if found.is_empty() => err,
        Ok(found) => {
            debug!(name = %name, kind = %kind, count = found.len(), "attaching warning events");
            AwaitError::Warnings { source: Box::new(err), warnings: render_warnings(&found) }
        }
        Err(fetch) => {
            warn!(name = %name, kind = %kind, error = %fetch, "failed to list events");
            AwaitError::DiagnosticFetch { source: Box::new(err), fetch }
        }
    }
}
