//! Serialized, rate-limit-aware access to the GitHub API.
//!
//! Every call to the content API goes through one [`RequestQueue`]. Requests
//! are handed to a single background drain task over a channel, so they are
//! issued strictly in enqueue order with at most one in flight, and the shared
//! rate-limit budget is read and updated by exactly one writer.
//!
//! ```text
//! enqueue() → mpsc channel → drain task → HttpTransport
//!     ↑                          │
//!     └──── oneshot reply ───────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! let clock = Arc::new(SystemClock);
//! let queue = RequestQueue::spawn(transport, tokens, clock, QueueConfig::default());
//! let pending = queue.enqueue("/repos/owner/site", RequestOptions::get());
//! let response = pending.await?;
//! ```

mod error;
mod rate_limit;

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use crate::auth::TokenProvider;
use crate::clock::Clock;
use crate::http::{HttpHeaders, HttpMethod, HttpRequest, HttpResponse, HttpTransport, header_set};

pub use error::{ApiError, short_error_message};
pub use rate_limit::RateLimitState;

/// Default GitHub REST API base URL.
pub const DEFAULT_API_BASE: &str = "https://api.github.com";

/// GitHub REST API version header value.
pub const DEFAULT_API_VERSION: &str = "2022-11-28";

/// Longest the queue will hold a request waiting for a rate-limit reset.
pub const DEFAULT_MAX_RATE_LIMIT_WAIT: Duration = Duration::from_secs(15 * 60);

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Prefix for endpoints that are not absolute URLs.
    pub base_url: String,
    /// Sent as `X-GitHub-Api-Version`.
    pub api_version: String,
    /// Sent as `User-Agent`.
    pub user_agent: String,
    /// Requests that would have to wait longer than this for the budget to
    /// reset are rejected with [`ApiError::RateLimited`] instead.
    pub max_rate_limit_wait: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            user_agent: "contentdeck".to_string(),
            max_rate_limit_wait: DEFAULT_MAX_RATE_LIMIT_WAIT,
        }
    }
}

/// Per-request options.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub method: HttpMethod,
    /// Extra headers; these override the queue's defaults.
    pub headers: HttpHeaders,
    pub body: Vec<u8>,
}

impl RequestOptions {
    pub fn get() -> Self {
        Self::default()
    }

    /// A request with a JSON body.
    pub fn json(method: HttpMethod, body: &serde_json::Value) -> Self {
        Self {
            method,
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            body: body.to_string().into_bytes(),
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        header_set(&mut self.headers, name, value);
        self
    }
}

struct QueuedRequest {
    endpoint: String,
    options: RequestOptions,
    reply: oneshot::Sender<Result<HttpResponse, ApiError>>,
}

/// Handle to the request queue. Cheap to clone.
///
/// The drain task stops once every handle has been dropped and the queue is
/// empty.
#[derive(Clone)]
pub struct RequestQueue {
    tx: mpsc::UnboundedSender<QueuedRequest>,
    rate_limit: Arc<Mutex<RateLimitState>>,
}

impl RequestQueue {
    /// Start the drain task on the current tokio runtime.
    pub fn spawn(
        transport: Arc<dyn HttpTransport>,
        tokens: Arc<dyn TokenProvider>,
        clock: Arc<dyn Clock>,
        config: QueueConfig,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let rate_limit = Arc::new(Mutex::new(RateLimitState::default()));

        let drainer = Drainer {
            transport,
            tokens,
            clock,
            config,
            rate_limit: Arc::clone(&rate_limit),
        };
        tokio::spawn(drainer.run(rx));

        Self { tx, rate_limit }
    }

    /// Append a request to the queue.
    ///
    /// The request is queued immediately, before the returned future is
    /// polled, so the order of `enqueue` calls is the order requests are
    /// issued in. Dropping the future abandons the response but does not
    /// remove the request.
    pub fn enqueue(
        &self,
        endpoint: impl Into<String>,
        options: RequestOptions,
    ) -> impl Future<Output = Result<HttpResponse, ApiError>> + Send + 'static {
        let (reply, rx) = oneshot::channel();
        let queued = self.tx.send(QueuedRequest {
            endpoint: endpoint.into(),
            options,
            reply,
        });

        async move {
            queued.map_err(|_| ApiError::Closed)?;
            rx.await.map_err(|_| ApiError::Closed)?
        }
    }

    /// Enqueue and wait for the response.
    pub async fn request(
        &self,
        endpoint: impl Into<String>,
        options: RequestOptions,
    ) -> Result<HttpResponse, ApiError> {
        self.enqueue(endpoint, options).await
    }

    /// Snapshot of the last reported rate-limit budget.
    pub fn rate_limit(&self) -> RateLimitState {
        *self.rate_limit.lock().unwrap_or_else(|e| e.into_inner())
    }
}

struct Drainer {
    transport: Arc<dyn HttpTransport>,
    tokens: Arc<dyn TokenProvider>,
    clock: Arc<dyn Clock>,
    config: QueueConfig,
    rate_limit: Arc<Mutex<RateLimitState>>,
}

impl Drainer {
    async fn run(self, mut rx: mpsc::UnboundedReceiver<QueuedRequest>) {
        while let Some(queued) = rx.recv().await {
            let QueuedRequest {
                endpoint,
                options,
                reply,
            } = queued;

            let result = self.dispatch(&endpoint, options).await;
            if let Err(ref e) = result {
                tracing::debug!(
                    endpoint = %endpoint,
                    error = %short_error_message(e),
                    "Request failed"
                );
            }
            if reply.send(result).is_err() {
                tracing::debug!(endpoint = %endpoint, "Caller dropped before response");
            }
        }
        tracing::debug!("Request queue drained and closed");
    }

    async fn dispatch(
        &self,
        endpoint: &str,
        options: RequestOptions,
    ) -> Result<HttpResponse, ApiError> {
        self.wait_for_budget().await?;

        let token = self.tokens.token().await?;
        let request = self.build_request(endpoint, options, &token);

        tracing::debug!(method = request.method.as_str(), url = %request.url, "Sending request");
        let response = self.transport.send(request).await?;

        let state = {
            let mut state = self.rate_limit.lock().unwrap_or_else(|e| e.into_inner());
            state.update_from_headers(&response.headers);
            *state
        };
        tracing::debug!(
            status = response.status,
            remaining = ?state.remaining,
            reset = ?state.reset_at_epoch_secs,
            "Response received"
        );

        if !response.is_success() {
            return Err(ApiError::Status {
                status: response.status,
                body: response.text(),
            });
        }

        Ok(response)
    }

    /// Hold the next request while the budget is exhausted.
    async fn wait_for_budget(&self) -> Result<(), ApiError> {
        let state = *self.rate_limit.lock().unwrap_or_else(|e| e.into_inner());
        let Some(wait) = state.wait_before_next(self.clock.now_ms()) else {
            return Ok(());
        };

        let reset_at = state.reset_at().unwrap_or_else(|| self.clock.now());
        if wait > self.config.max_rate_limit_wait {
            tracing::warn!(
                %reset_at,
                wait_secs = wait.as_secs(),
                "Rate limit reset too far away, rejecting request"
            );
            return Err(ApiError::RateLimited { reset_at });
        }

        tracing::info!(
            %reset_at,
            wait_ms = wait.as_millis() as u64,
            "Rate limit exhausted, waiting for reset"
        );
        tokio::time::sleep(wait).await;
        Ok(())
    }

    fn build_request(&self, endpoint: &str, options: RequestOptions, token: &str) -> HttpRequest {
        let url = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.to_string()
        } else {
            format!("{}{}", self.config.base_url.trim_end_matches('/'), endpoint)
        };

        let mut headers: HttpHeaders = vec![
            ("Authorization".to_string(), format!("token {token}")),
            (
                "Accept".to_string(),
                "application/vnd.github+json".to_string(),
            ),
            (
                "X-GitHub-Api-Version".to_string(),
                self.config.api_version.clone(),
            ),
            ("User-Agent".to_string(), self.config.user_agent.clone()),
        ];
        for (name, value) in options.headers {
            header_set(&mut headers, &name, value);
        }

        HttpRequest {
            method: options.method,
            url,
            headers,
            body: options.body,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tokio::time::Instant;

    use crate::auth::{AuthError, StaticToken, StoredToken};
    use crate::clock::TokioClock;
    use crate::http::{HttpError, MockTransport};
    use crate::storage::MemoryStorage;

    const START_MS: i64 = 1_700_000_000_000;

    fn queue_with(transport: Arc<dyn HttpTransport>, config: QueueConfig) -> RequestQueue {
        RequestQueue::spawn(
            transport,
            Arc::new(StaticToken::new("ghp_test")),
            Arc::new(TokioClock::new(START_MS)),
            config,
        )
    }

    fn ok(body: &str) -> HttpResponse {
        HttpResponse {
            status: 200,
            headers: Vec::new(),
            body: body.as_bytes().to_vec(),
        }
    }

    /// Transport that takes time per call and records call start times and
    /// peak concurrency.
    #[derive(Default)]
    struct SlowTransport {
        calls: Mutex<Vec<(String, Instant)>>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl HttpTransport for SlowTransport {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.calls
                .lock()
                .unwrap()
                .push((request.url.clone(), Instant::now()));

            tokio::time::sleep(Duration::from_millis(250)).await;

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(ok(&request.url))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn requests_are_issued_in_enqueue_order_one_at_a_time() {
        let transport = Arc::new(SlowTransport::default());
        let queue = queue_with(transport.clone(), QueueConfig::default());

        let pending: Vec<_> = (0..5)
            .map(|i| queue.enqueue(format!("/r/{i}"), RequestOptions::get()))
            .collect();

        let mut bodies = Vec::new();
        // Await in reverse: ordering must not depend on who polls first.
        for fut in pending.into_iter().rev() {
            bodies.push(fut.await.expect("response").text());
        }
        bodies.reverse();

        let expected: Vec<String> = (0..5)
            .map(|i| format!("https://api.github.com/r/{i}"))
            .collect();
        assert_eq!(bodies, expected);

        let calls = transport.calls.lock().unwrap().clone();
        let urls: Vec<String> = calls.iter().map(|(u, _)| u.clone()).collect();
        assert_eq!(urls, expected);
        assert_eq!(transport.peak.load(Ordering::SeqCst), 1);
        for pair in calls.windows(2) {
            assert!(pair[1].1 - pair[0].1 >= Duration::from_millis(250));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_budget_holds_next_request_until_one_second_after_reset() {
        let transport = Arc::new(SlowTransport::default());
        let queue = queue_with(transport.clone(), QueueConfig::default());
        *queue.rate_limit.lock().unwrap() = RateLimitState {
            remaining: Some(0),
            reset_at_epoch_secs: Some(START_MS / 1000 + 5),
        };
        let start = Instant::now();

        let pending = queue.enqueue("/after-reset", RequestOptions::get());

        tokio::time::sleep(Duration::from_millis(5_900)).await;
        assert!(transport.calls.lock().unwrap().is_empty());

        pending.await.expect("response");
        let calls = transport.calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].1 - start >= Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn reset_beyond_cap_rejects_without_sending() {
        let transport = MockTransport::new();
        transport.push_response(HttpMethod::Get, "https://api.github.com/ok", ok("fine"));
        let queue = queue_with(
            Arc::new(transport.clone()),
            QueueConfig {
                max_rate_limit_wait: Duration::from_secs(60),
                ..QueueConfig::default()
            },
        );
        *queue.rate_limit.lock().unwrap() = RateLimitState {
            remaining: Some(0),
            reset_at_epoch_secs: Some(START_MS / 1000 + 3_600),
        };

        let err = queue
            .request("/blocked", RequestOptions::get())
            .await
            .expect_err("should be rejected");
        match err {
            ApiError::RateLimited { reset_at } => {
                assert_eq!(reset_at.timestamp(), START_MS / 1000 + 3_600)
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(transport.requests().is_empty());

        // Once the budget is known to be available again, the queue proceeds.
        *queue.rate_limit.lock().unwrap() = RateLimitState::default();
        let resp = queue.request("/ok", RequestOptions::get()).await;
        assert_eq!(resp.expect("response").text(), "fine");
    }

    #[tokio::test]
    async fn failures_reject_only_their_own_request() {
        let transport = MockTransport::new();
        transport.push_response(
            HttpMethod::Get,
            "https://api.github.com/missing",
            HttpResponse {
                status: 404,
                headers: Vec::new(),
                body: b"{\"message\":\"Not Found\"}".to_vec(),
            },
        );
        transport.push_failure(HttpMethod::Get, "https://api.github.com/flaky", "reset by peer");
        transport.push_response(HttpMethod::Get, "https://api.github.com/fine", ok("yes"));
        let queue = queue_with(Arc::new(transport.clone()), QueueConfig::default());

        let missing = queue.enqueue("/missing", RequestOptions::get());
        let flaky = queue.enqueue("/flaky", RequestOptions::get());
        let fine = queue.enqueue("/fine", RequestOptions::get());

        match missing.await.expect_err("404") {
            ApiError::Status { status, body } => {
                assert_eq!(status, 404);
                assert!(body.contains("Not Found"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(matches!(
            flaky.await.expect_err("transport"),
            ApiError::Transport(HttpError::Transport(_))
        ));
        assert_eq!(fine.await.expect("fine").text(), "yes");
        assert_eq!(transport.requests().len(), 3);
    }

    #[tokio::test]
    async fn missing_token_rejects_request_without_sending() {
        let transport = MockTransport::new();
        let queue = RequestQueue::spawn(
            Arc::new(transport.clone()),
            Arc::new(StoredToken::new(Arc::new(MemoryStorage::new()))),
            Arc::new(TokioClock::new(START_MS)),
            QueueConfig::default(),
        );

        let err = queue
            .request("/user", RequestOptions::get())
            .await
            .expect_err("no token");
        assert!(matches!(err, ApiError::Auth(AuthError::NotAuthenticated)));
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn attaches_auth_and_default_headers_and_tracks_budget() {
        let transport = MockTransport::new();
        transport.push_response(
            HttpMethod::Put,
            "https://api.github.com/repos/o/r/contents/a.yml",
            HttpResponse {
                status: 201,
                headers: vec![
                    ("x-ratelimit-remaining".to_string(), "4999".to_string()),
                    ("x-ratelimit-reset".to_string(), "1700003600".to_string()),
                ],
                body: b"{}".to_vec(),
            },
        );
        let queue = queue_with(Arc::new(transport.clone()), QueueConfig::default());

        let options = RequestOptions::json(HttpMethod::Put, &serde_json::json!({"a": 1}))
            .with_header("accept", "application/vnd.github.raw+json");
        queue
            .request("/repos/o/r/contents/a.yml", options)
            .await
            .expect("created");

        let sent = &transport.requests()[0];
        assert_eq!(sent.header("authorization"), Some("token ghp_test"));
        assert_eq!(sent.header("accept"), Some("application/vnd.github.raw+json"));
        assert_eq!(sent.header("x-github-api-version"), Some(DEFAULT_API_VERSION));
        assert_eq!(sent.header("content-type"), Some("application/json"));
        assert_eq!(sent.body, b"{\"a\":1}".to_vec());

        assert_eq!(
            queue.rate_limit(),
            RateLimitState {
                remaining: Some(4999),
                reset_at_epoch_secs: Some(1_700_003_600),
            }
        );
    }

    #[tokio::test]
    async fn absolute_urls_bypass_base_url() {
        let transport = MockTransport::new();
        transport.push_response(HttpMethod::Get, "https://uploads.example/x", ok("abs"));
        let queue = queue_with(Arc::new(transport.clone()), QueueConfig::default());

        let resp = queue
            .request("https://uploads.example/x", RequestOptions::get())
            .await
            .expect("response");
        assert_eq!(resp.text(), "abs");
    }
}
