//! Retry classifier: poll with `get` until a check reports done or fatal.
//!
//! Used where the change stream cannot cleanly assert that an object is gone.

use std::time::Duration;

use tokio::time::{sleep, sleep_until};
use tracing::{debug, info};

use converge_core::{AwaitError, AwaitResult, Check, ClientError, ObservedState};

use crate::watch::{deadline_after, ObjectWatch};

/// Shared classification for deletion checks: absence is success, transient
/// lookup failures are retried, anything else is fatal. `present` decides for
/// an object that still exists.
pub fn lookup_check<F>(lookup: Result<Option<&ObservedState>, &ClientError>, present: F) -> Check
where
    F: FnOnce(&ObservedState) -> Check,
{
    match lookup {
        Ok(None) => Check::Done,
        Err(e) if e.is_not_found() => Check::Done,
        Err(e) if e.is_transient() => Check::retry(format!("lookup failed: {}", e)),
        Err(e) => Check::Fatal(e.clone()),
        Ok(Some(obj)) => present(obj),
    }
}

impl<'a> ObjectWatch<'a> {
    /// Re-run `check` against fresh lookups, sleeping between attempts, until
    /// it returns [`Check::Done`] or [`Check::Fatal`]. On deadline the last
    /// retry reason is reported as a timeout.
    pub async fn retry_until<C>(&self, check: C, timeout: Duration) -> AwaitResult
    where
        C: Fn(Result<Option<&ObservedState>, &ClientError>) -> Check + Send + Sync,
    {
        let deadline = deadline_after(timeout);
        let mut backoff = self.retry.backoff();
        let mut last_reason = String::from("no lookup completed");
        let mut last: Option<ObservedState> = None;

        loop {
            let got = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(self.cancelled()),
                _ = sleep_until(deadline) => return Err(self.retry_timeout(timeout, last_reason, last)),
                res = self.resource.get(self.name) => res,
            };
            metrics::counter!("await_retry_polls_total", 1u64);

            let verdict = match &got {
                Ok(found) => check(Ok(found.as_ref())),
                Err(e) => check(Err(e)),
            };
            match verdict {
                Check::Done => {
                    info!(name = %self.name, "check satisfied");
                    return Ok(());
                }
                Check::Fatal(e) => return Err(self.fatal(e)),
                Check::Retry(reason) => {
                    debug!(name = %self.name, reason = %reason, "retrying");
                    last_reason = reason;
                    if let Ok(Some(obj)) = got {
                        last = Some(obj);
                    }
                }
            }

            let delay = backoff.next_delay();
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(self.cancelled()),
                _ = sleep_until(deadline) => return Err(self.retry_timeout(timeout, last_reason, last)),
                _ = sleep(delay) => {}
            }
        }
    }

    fn retry_timeout(&self, waited: Duration, reason: String, last: Option<ObservedState>) -> AwaitError {
        AwaitError::Timeout { name: self.name.to_string(), waited, reason, last_observed: last.map(Box::new) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::ScriptedResource;
    use crate::settings::RetryPolicy;
    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    fn still_there(name: &str, lookup: Result<Option<&ObservedState>, &ClientError>) -> Check {
        lookup_check(lookup, |_| Check::retry(format!("'{}' still exists", name)))
    }

    #[test]
    fn lookup_check_normalizes_not_found() {
        assert!(lookup_check(Ok(None), |_| Check::retry("x")).is_done());
        let nf = ClientError::NotFound("gone".into());
        assert!(lookup_check(Err(&nf), |_| Check::retry("x")).is_done());
        let busy = ClientError::from_status(503, "busy");
        assert!(matches!(lookup_check(Err(&busy), |_| Check::Done), Check::Retry(_)));
        let denied = ClientError::Forbidden("no".into());
        assert!(matches!(lookup_check(Err(&denied), |_| Check::Done), Check::Fatal(ClientError::Forbidden(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn stops_polling_once_gone() {
        let obj = json!({"metadata": {"name": "web"}});
        let res = ScriptedResource::new().with_gets(vec![Ok(Some(obj.clone())), Ok(Some(obj)), Ok(None)]);
        let cancel = CancellationToken::new();
        let out = ObjectWatch::for_object(&res, "web", &cancel)
            .retry_until(|l| still_there("web", l), Duration::from_secs(60))
            .await;
        assert!(out.is_ok());
        assert_eq!(res.get_calls(), 3);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(res.get_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn unrepresentable_timeout_still_polls() {
        let res = ScriptedResource::new().with_gets(vec![Ok(Some(json!({"metadata": {"name": "web"}}))), Ok(None)]);
        let cancel = CancellationToken::new();
        let out = ObjectWatch::for_object(&res, "web", &cancel)
            .retry_until(|l| still_there("web", l), Duration::from_secs(u64::MAX))
            .await;
        assert!(out.is_ok(), "{:?}", out);
        assert_eq!(res.get_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_reports_last_retry_reason() {
        let obj = json!({"metadata": {"name": "web"}});
        let res = ScriptedResource::new().with_gets(vec![Ok(Some(obj))]);
        let cancel = CancellationToken::new();
        let err = ObjectWatch::for_object(&res, "web", &cancel)
            .with_retry(RetryPolicy::fixed(Duration::from_secs(1)))
            .retry_until(|l| still_there("web", l), Duration::from_secs(10))
            .await
            .expect_err("never gone");
        assert!(err.is_timeout());
        assert!(err.to_string().contains("'web' still exists"), "{}", err);
        assert!(err.last_observed().is_some());
        assert!(res.get_calls() >= 10);
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_lookup_ends_immediately() {
        let res = ScriptedResource::new().with_gets(vec![Err(ClientError::Forbidden("rbac".into()))]);
        let cancel = CancellationToken::new();
        let err = ObjectWatch::for_object(&res, "web", &cancel)
            .retry_until(|l| still_there("web", l), Duration::from_secs(60))
            .await
            .expect_err("fatal");
        assert!(matches!(err, AwaitError::Fatal { .. }));
        assert_eq!(res.get_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_lookup_errors_are_retried() {
        let res = ScriptedResource::new().with_gets(vec![Err(ClientError::Transport("reset".into())), Ok(None)]);
        let cancel = CancellationToken::new();
        let out = ObjectWatch::for_object(&res, "web", &cancel)
            .retry_until(|l| still_there("web", l), Duration::from_secs(60))
            .await;
        assert!(out.is_ok());
        assert_eq!(res.get_calls(), 2);
    }
}
