//! Condition poller: follow one object's change stream until a predicate holds.

use std::time::Duration;

use futures::StreamExt;
use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use converge_core::{AwaitError, AwaitResult, ClientError, ObservedState, ResourceClient};

use crate::settings::RetryPolicy;

/// Roughly 30 years; stands in for deadlines too large to represent.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// `now + timeout`, saturating to a far-future instant instead of overflowing.
pub(crate) fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout).unwrap_or_else(|| now + FAR_FUTURE)
}

/// One await call's view of a single named object.
pub struct ObjectWatch<'a> {
    pub(crate) resource: &'a dyn ResourceClient,
    pub(crate) name: &'a str,
    pub(crate) cancel: &'a CancellationToken,
    pub(crate) retry: RetryPolicy,
    pub(crate) waiting_for: String,
}

impl<'a> ObjectWatch<'a> {
    pub fn for_object(resource: &'a dyn ResourceClient, name: &'a str, cancel: &'a CancellationToken) -> Self {
        Self { resource, name, cancel, retry: RetryPolicy::default(), waiting_for: "condition to be met".to_string() }
    }

    /// Pacing for resubscription and deletion polls.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Human description of what is awaited, used in timeout messages.
    pub fn waiting_for(mut self, what: impl Into<String>) -> Self {
        self.waiting_for = what.into();
        self
    }

    pub fn name(&self) -> &str {
        self.name
    }

    /// Evaluate `predicate` on every delivered state until it returns `true`.
    ///
    /// Transient stream failures and closed streams are resubscribed after a
    /// backoff pause; non-transient failures end the wait immediately. On
    /// deadline the error carries the last state seen.
    pub async fn watch_until<P>(&self, predicate: P, timeout: Duration) -> AwaitResult
    where
        P: Fn(&ObservedState) -> bool + Send + Sync,
    {
        let deadline = deadline_after(timeout);
        let mut backoff = self.retry.backoff();
        let mut last: Option<ObservedState> = None;
        let mut last_error: Option<ClientError> = None;

        loop {
            let opened = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(self.cancelled()),
                _ = sleep_until(deadline) => return Err(self.watch_timeout(timeout, last.take(), last_error.take())),
                res = self.resource.watch(self.name) => res,
            };
            match opened {
                Ok(mut stream) => loop {
                    let next = tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => return Err(self.cancelled()),
                        _ = sleep_until(deadline) => return Err(self.watch_timeout(timeout, last.take(), last_error.take())),
                        item = stream.next() => item,
                    };
                    match next {
                        Some(Ok(obj)) => {
                            backoff.reset();
                            if predicate(&obj) {
                                info!(name = %self.name, "condition met");
                                return Ok(());
                            }
                            debug!(name = %self.name, waiting_for = %self.waiting_for, "observed; condition not met");
                            last = Some(obj);
                        }
                        Some(Err(e)) if e.is_transient() => {
                            warn!(name = %self.name, error = %e, "watch interrupted; resubscribing");
                            last_error = Some(e);
                            break;
                        }
                        Some(Err(e)) => return Err(self.fatal(e)),
                        None => {
                            debug!(name = %self.name, "watch stream closed; resubscribing");
                            break;
                        }
                    }
                },
                Err(e) if e.is_transient() => {
                    warn!(name = %self.name, error = %e, "failed to open watch; retrying");
                    last_error = Some(e);
                }
                Err(e) => return Err(self.fatal(e)),
            }

            metrics::counter!("await_resubscribe_total", 1u64);
            let delay = backoff.next_delay();
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(self.cancelled()),
                _ = sleep_until(deadline) => return Err(self.watch_timeout(timeout, last.take(), last_error.take())),
                _ = sleep(delay) => {}
            }
        }
    }

    pub(crate) fn cancelled(&self) -> AwaitError {
        info!(name = %self.name, "await cancelled");
        AwaitError::Cancelled { name: self.name.to_string() }
    }

    pub(crate) fn fatal(&self, source: ClientError) -> AwaitError {
        warn!(name = %self.name, error = %source, "await aborted");
        AwaitError::Fatal { name: self.name.to_string(), source }
    }

    fn watch_timeout(&self, waited: Duration, last: Option<ObservedState>, last_error: Option<ClientError>) -> AwaitError {
        let mut reason = format!("waiting for {}", self.waiting_for);
        if last.is_none() {
            reason.push_str(" (no state observed)");
        }
        if let Some(e) = last_error {
            reason.push_str(&format!(" (last watch error: {})", e));
        }
        AwaitError::Timeout { name: self.name.to_string(), waited, reason, last_observed: last.map(Box::new) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::ScriptedResource;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn phase(p: &str) -> ObservedState {
        json!({"metadata": {"name": "pod-a"}, "status": {"phase": p}})
    }

    fn running(obj: &ObservedState) -> bool {
        obj.pointer("/status/phase").and_then(|v| v.as_str()) == Some("Running")
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_first_matching_observation() {
        let res = ScriptedResource::new().with_watch(vec![Ok(phase("Pending")), Ok(phase("Running")), Ok(phase("Failed"))]);
        let cancel = CancellationToken::new();
        let seen = AtomicUsize::new(0);
        let out = ObjectWatch::for_object(&res, "pod-a", &cancel)
            .watch_until(
                |o| {
                    seen.fetch_add(1, Ordering::SeqCst);
                    running(o)
                },
                Duration::from_secs(60),
            )
            .await;
        assert!(out.is_ok());
        assert_eq!(seen.load(Ordering::SeqCst), 2);
        assert_eq!(res.watch_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_with_last_observed_state() {
        let res = ScriptedResource::new().with_watch(vec![Ok(phase("Pending")), Ok(phase("ContainerCreating"))]);
        let cancel = CancellationToken::new();
        let err = ObjectWatch::for_object(&res, "pod-a", &cancel)
            .waiting_for("pod to run")
            .watch_until(running, Duration::from_secs(30))
            .await
            .expect_err("must time out");
        assert!(err.is_timeout());
        assert!(err.to_string().contains("waiting for pod to run"), "{}", err);
        let last = err.last_observed().expect("last state kept");
        assert_eq!(last.pointer("/status/phase").and_then(|v| v.as_str()), Some("ContainerCreating"));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_resubscribe_transparently() {
        let res = ScriptedResource::new()
            .with_watch(vec![Ok(phase("Pending")), Err(ClientError::Transport("connection reset".into()))])
            .with_failed_watch(ClientError::from_status(503, "apiserver restarting"))
            .with_closing_watch(vec![Ok(phase("Pending"))])
            .with_watch(vec![Ok(phase("Running"))]);
        let cancel = CancellationToken::new();
        let out = ObjectWatch::for_object(&res, "pod-a", &cancel)
            .with_retry(RetryPolicy::fixed(Duration::from_millis(100)))
            .watch_until(running, Duration::from_secs(60))
            .await;
        assert!(out.is_ok(), "{:?}", out);
        assert_eq!(res.watch_calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_error_is_reported_in_timeout() {
        let res = ScriptedResource::new().with_watch(vec![Err(ClientError::Transport("connection reset".into()))]);
        let cancel = CancellationToken::new();
        let err = ObjectWatch::for_object(&res, "pod-a", &cancel)
            .watch_until(running, Duration::from_secs(5))
            .await
            .expect_err("never satisfied");
        assert!(err.is_timeout());
        assert!(err.to_string().contains("connection reset"), "{}", err);
    }

    #[tokio::test(start_paused = true)]
    async fn forbidden_aborts_without_resubscribing() {
        let res = ScriptedResource::new().with_watch(vec![Err(ClientError::Forbidden("pods is forbidden".into()))]);
        let cancel = CancellationToken::new();
        let err = ObjectWatch::for_object(&res, "pod-a", &cancel)
            .watch_until(running, Duration::from_secs(60))
            .await
            .expect_err("fatal");
        assert!(matches!(err, AwaitError::Fatal { source: ClientError::Forbidden(_), .. }));
        assert_eq!(res.watch_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unrepresentable_timeout_waits_instead_of_panicking() {
        let res = ScriptedResource::new().with_watch(vec![Ok(phase("Pending")), Ok(phase("Running"))]);
        let cancel = CancellationToken::new();
        let out = ObjectWatch::for_object(&res, "pod-a", &cancel).watch_until(running, Duration::MAX).await;
        assert!(out.is_ok(), "{:?}", out);
    }

    #[test]
    fn deadline_saturates_to_far_future() {
        let far = deadline_after(Duration::from_secs(u64::MAX));
        assert!(far > Instant::now() + Duration::from_secs(86400 * 365));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_is_distinct_from_timeout() {
        let res = Arc::new(ScriptedResource::new().with_watch(vec![Ok(phase("Pending"))]));
        let cancel = CancellationToken::new();
        let task = tokio::spawn({
            let res = Arc::clone(&res);
            let cancel = cancel.clone();
            async move {
                ObjectWatch::for_object(res.as_ref(), "pod-a", &cancel)
                    .watch_until(running, Duration::from_secs(600))
                    .await
            }
        });
        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();
        let err = task.await.expect("join").expect_err("cancelled");
        assert!(err.is_cancelled());
        assert!(!err.is_timeout());
    }
}
