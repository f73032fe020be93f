//! Request coordination: bounded worker pool, memoization, timeout with
//! cooperative cancel, retry/backoff, and the content-policy fallback.

use std::sync::Arc;

use {
    tokio::sync::Semaphore,
    tokio_util::sync::CancellationToken,
    tracing::{error, info, warn},
};

use {
    courier_backend::{
        BackendInvoker, ContentExtractor, Error as BackendError, InvokeRequest, aggregate,
    },
    courier_common::types::AggregationResult,
};

use crate::{
    cache::{CacheKey, ResponseCache},
    error::{Context, Error, UNKNOWN_ERROR_REPLY},
    policy::RetryPolicy,
};

/// How many times a content-policy rejection may shorten the query before
/// the fixed apology goes out.
const MAX_QUERY_MUTATIONS: u32 = 3;

/// Terminal outcome of one coordinated request: a result or a user-facing
/// message, never both, never neither.
pub type Outcome = (Option<AggregationResult>, Option<String>);

/// Runs backend invocations inside a bounded worker pool with memoization.
pub struct Coordinator {
    invoker: Arc<dyn BackendInvoker>,
    extractor: Arc<dyn ContentExtractor>,
    cache: Arc<ResponseCache>,
    pool: Arc<Semaphore>,
}

impl Coordinator {
    pub fn new(
        invoker: Arc<dyn BackendInvoker>,
        extractor: Arc<dyn ContentExtractor>,
        max_workers: usize,
    ) -> Self {
        Self {
            invoker,
            extractor,
            cache: Arc::new(ResponseCache::new()),
            pool: Arc::new(Semaphore::new(max_workers.max(1))),
        }
    }

    /// The response cache (shared with the worker tasks).
    #[must_use]
    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// Execute one request.
    ///
    /// Cache hits return without invoking the backend. Misses run on the
    /// worker pool; the caller waits up to `policy.timeout`. On timeout the
    /// worker's cancellation token is cancelled but the work is not forcibly
    /// stopped — a late success is still written to the cache.
    pub async fn execute(
        &self,
        key: Option<CacheKey>,
        request: InvokeRequest,
        policy: RetryPolicy,
    ) -> Outcome {
        if let Some(ref key) = key
            && let Some((result, error)) = self.cache.get(key)
        {
            info!(user = %request.user, "returning memoized backend response");
            return (result, error);
        }

        let cancel = CancellationToken::new();
        let worker_cancel = cancel.clone();
        let invoker = Arc::clone(&self.invoker);
        let extractor = Arc::clone(&self.extractor);
        let cache = Arc::clone(&self.cache);
        let pool = Arc::clone(&self.pool);
        let timeout = policy.timeout;

        let handle = tokio::spawn(async move {
            let _permit = pool.acquire_owned().await.context("worker pool closed")?;
            let outcome = run_attempts(
                invoker.as_ref(),
                extractor.as_ref(),
                request,
                policy,
                &worker_cancel,
            )
            .await;
            if let (Some(key), Ok(result)) = (key, &outcome) {
                // Written by the worker so that a result arriving after the
                // caller gave up still lands here (stale-but-valid).
                cache.insert(key, result.clone());
            }
            outcome.map_err(Error::from)
        });

        match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(Ok(result))) => (Some(result), None),
            Ok(Ok(Err(err))) => {
                warn!(error = %err, "backend request failed");
                (None, Some(err.user_message()))
            },
            Ok(Err(join_err)) => {
                error!(error = %join_err, "backend worker panicked");
                (None, Some(UNKNOWN_ERROR_REPLY.to_string()))
            },
            Err(_) => {
                // Cancels the wait, not the work: the token is the worker's
                // cue to stop at its next check.
                cancel.cancel();
                warn!(
                    timeout_secs = timeout.as_secs(),
                    "backend call exceeded its budget, requested cancellation"
                );
                let still_working = Error::StillWorking {
                    timeout_secs: timeout.as_secs(),
                };
                (None, Some(still_working.user_message()))
            },
        }
    }
}

/// Retry loop run by the worker: transport failures back off exponentially,
/// content-policy rejections mutate the query instead, everything else is
/// terminal.
async fn run_attempts(
    invoker: &dyn BackendInvoker,
    extractor: &dyn ContentExtractor,
    mut request: InvokeRequest,
    policy: RetryPolicy,
    cancel: &CancellationToken,
) -> Result<AggregationResult, BackendError> {
    let original_query = request.query.clone();
    let mut attempt: u32 = 0;
    let mut mutations: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(BackendError::transport("cancelled before attempt"));
        }

        let response = match invoker.invoke(request.clone(), cancel).await {
            Ok(response) => aggregate(response, extractor).await,
            Err(e) => Err(e),
        };

        match response {
            Ok(result) => {
                if request.query != original_query {
                    info!(
                        original = %original_query,
                        mutated = %request.query,
                        "query mutation succeeded"
                    );
                }
                return Ok(result);
            },
            Err(e) if e.is_content_policy() => {
                mutations += 1;
                if mutations > MAX_QUERY_MUTATIONS || request.query.chars().count() <= 1 {
                    return Err(e);
                }
                request.query.pop();
                info!(
                    mutation = mutations,
                    query = %request.query,
                    "content filter rejected the query, retrying shortened"
                );
            },
            Err(e) if e.is_retryable() && attempt + 1 < policy.max_attempts => {
                let delay = policy.backoff(attempt);
                warn!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "transport failure, backing off"
                );
                attempt += 1;
                tokio::time::sleep(delay).await;
            },
            Err(e) => return Err(e),
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use {async_trait::async_trait, tokio_util::sync::CancellationToken};

    use courier_backend::{
        BackendResponse, BlockingAnswer, InvokeMode, MarkdownExtractor, Result as BackendResult,
    };

    use super::*;
    use crate::error::{CONTENT_POLICY_REPLY, UNKNOWN_ERROR_REPLY};

    fn request(query: &str) -> InvokeRequest {
        InvokeRequest {
            query: query.into(),
            user: "u1".into(),
            conversation_id: None,
            mode: InvokeMode::Blocking,
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            timeout: Duration::from_secs(5),
        }
    }

    fn key(query: &str) -> Option<CacheKey> {
        CacheKey::build(query, "u1", "chatbot", "")
    }

    fn answer(text: &str) -> BackendResponse {
        BackendResponse::Answer(BlockingAnswer {
            answer: text.into(),
            conversation_id: "c1".into(),
        })
    }

    /// Counts invocations, always answers "hello".
    struct CountingInvoker {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl BackendInvoker for CountingInvoker {
        async fn invoke(
            &self,
            _request: InvokeRequest,
            _cancel: &CancellationToken,
        ) -> BackendResult<BackendResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(answer("hello"))
        }
    }

    /// Fails with a transport error `failures` times, then succeeds.
    struct FlakyInvoker {
        calls: AtomicUsize,
        failures: usize,
    }

    #[async_trait]
    impl BackendInvoker for FlakyInvoker {
        async fn invoke(
            &self,
            _request: InvokeRequest,
            _cancel: &CancellationToken,
        ) -> BackendResult<BackendResponse> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(BackendError::transport("connection reset by peer"))
            } else {
                Ok(answer("recovered"))
            }
        }
    }

    /// Rejects queries longer than `max_len` chars with a content filter.
    struct FilteringInvoker {
        calls: AtomicUsize,
        max_len: usize,
    }

    #[async_trait]
    impl BackendInvoker for FilteringInvoker {
        async fn invoke(
            &self,
            request: InvokeRequest,
            _cancel: &CancellationToken,
        ) -> BackendResult<BackendResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if request.query.chars().count() > self.max_len {
                Err(BackendError::upstream_rejection("content management policy"))
            } else {
                Ok(answer(&format!("ok: {}", request.query)))
            }
        }
    }

    /// Sleeps before answering; honors the cancellation token.
    struct SlowInvoker {
        delay: Duration,
    }

    #[async_trait]
    impl BackendInvoker for SlowInvoker {
        async fn invoke(
            &self,
            _request: InvokeRequest,
            cancel: &CancellationToken,
        ) -> BackendResult<BackendResponse> {
            tokio::select! {
                () = tokio::time::sleep(self.delay) => Ok(answer("late")),
                () = cancel.cancelled() => Err(BackendError::transport("cancelled")),
            }
        }
    }

    /// Like `SlowInvoker` but ignores the token, as a misbehaving invoker
    /// would.
    struct StubbornSlowInvoker {
        delay: Duration,
    }

    #[async_trait]
    impl BackendInvoker for StubbornSlowInvoker {
        async fn invoke(
            &self,
            _request: InvokeRequest,
            _cancel: &CancellationToken,
        ) -> BackendResult<BackendResponse> {
            tokio::time::sleep(self.delay).await;
            Ok(answer("late but valid"))
        }
    }

    fn coordinator(invoker: Arc<dyn BackendInvoker>) -> Coordinator {
        Coordinator::new(invoker, Arc::new(MarkdownExtractor::new()), 4)
    }

    #[tokio::test]
    async fn identical_requests_invoke_backend_once() {
        let invoker = Arc::new(CountingInvoker {
            calls: AtomicUsize::new(0),
        });
        let coord = coordinator(Arc::clone(&invoker) as Arc<dyn BackendInvoker>);

        let (first, _) = coord
            .execute(key("hi"), request("hi"), fast_policy())
            .await;
        let (second, _) = coord
            .execute(key("hi"), request("hi"), fast_policy())
            .await;

        assert_eq!(first, second);
        assert!(first.is_some());
        assert_eq!(invoker.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn uncached_when_key_absent() {
        let invoker = Arc::new(CountingInvoker {
            calls: AtomicUsize::new(0),
        });
        let coord = coordinator(Arc::clone(&invoker) as Arc<dyn BackendInvoker>);

        coord.execute(None, request("hi"), fast_policy()).await;
        coord.execute(None, request("hi"), fast_policy()).await;

        assert_eq!(invoker.calls.load(Ordering::SeqCst), 2);
        assert!(coord.cache().is_empty());
    }

    #[tokio::test]
    async fn transport_failures_are_retried_with_backoff() {
        let invoker = Arc::new(FlakyInvoker {
            calls: AtomicUsize::new(0),
            failures: 2,
        });
        let coord = coordinator(Arc::clone(&invoker) as Arc<dyn BackendInvoker>);

        let (result, error) = coord.execute(None, request("hi"), fast_policy()).await;

        assert!(error.is_none());
        assert_eq!(result.unwrap().segments[0].value, "recovered");
        assert_eq!(invoker.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retries_exhausted_yields_user_message() {
        let invoker = Arc::new(FlakyInvoker {
            calls: AtomicUsize::new(0),
            failures: 99,
        });
        let coord = coordinator(Arc::clone(&invoker) as Arc<dyn BackendInvoker>);

        let (result, error) = coord.execute(key("hi"), request("hi"), fast_policy()).await;

        assert!(result.is_none());
        assert_eq!(error.as_deref(), Some(UNKNOWN_ERROR_REPLY));
        assert_eq!(invoker.calls.load(Ordering::SeqCst), 3);
        // Failures are never cached.
        assert!(coord.cache().is_empty());
    }

    #[tokio::test]
    async fn content_filter_shortens_query_until_accepted() {
        let invoker = Arc::new(FilteringInvoker {
            calls: AtomicUsize::new(0),
            max_len: 3,
        });
        let coord = coordinator(Arc::clone(&invoker) as Arc<dyn BackendInvoker>);

        // "abcde" (5 chars) is rejected twice, "abc" passes.
        let (result, error) = coord
            .execute(None, request("abcde"), fast_policy())
            .await;

        assert!(error.is_none());
        assert_eq!(result.unwrap().segments[0].value, "ok: abc");
        assert_eq!(invoker.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn content_filter_exhaustion_returns_fixed_apology() {
        let invoker = Arc::new(FilteringInvoker {
            calls: AtomicUsize::new(0),
            max_len: 0,
        });
        let coord = coordinator(Arc::clone(&invoker) as Arc<dyn BackendInvoker>);

        let (result, error) = coord
            .execute(None, request("abcdefgh"), fast_policy())
            .await;

        assert!(result.is_none());
        assert_eq!(error.as_deref(), Some(CONTENT_POLICY_REPLY));
        // Initial attempt plus MAX_QUERY_MUTATIONS shortened resubmissions.
        assert_eq!(invoker.calls.load(Ordering::SeqCst), 1 + 3);
    }

    #[tokio::test]
    async fn timeout_returns_still_working_and_cancels() {
        let coord = coordinator(Arc::new(SlowInvoker {
            delay: Duration::from_secs(30),
        }));
        let policy = RetryPolicy {
            max_attempts: 1,
            base_delay: Duration::from_millis(1),
            timeout: Duration::from_millis(20),
        };

        let (result, error) = coord.execute(key("hi"), request("hi"), policy).await;

        assert!(result.is_none());
        assert!(error.unwrap().contains("Still working"));
    }

    #[tokio::test]
    async fn late_result_is_still_cached() {
        let coord = coordinator(Arc::new(StubbornSlowInvoker {
            delay: Duration::from_millis(50),
        }));
        let policy = RetryPolicy {
            max_attempts: 1,
            base_delay: Duration::from_millis(1),
            timeout: Duration::from_millis(5),
        };

        let (result, _) = coord.execute(key("hi"), request("hi"), policy).await;
        assert!(result.is_none());

        // The worker outlives the caller's wait and writes its result.
        tokio::time::sleep(Duration::from_millis(150)).await;
        let hit = coord.cache().get(&key("hi").unwrap());
        assert!(hit.is_some());
    }
}
