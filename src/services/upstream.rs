//! Rate-limited, retrying GET client shared by both providers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use http::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::from_str;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::models::error::FetchError;
use crate::utils::backoff::{RetryKind, RetryPolicy, Sleeper};
use crate::utils::rate_limiter::RateLimiter;

#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub body: String,
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue one GET. `Err` is a transport failure (connect, timeout, reset).
    async fn get(&self, url: &str) -> Result<RawResponse, String>;
}

/// Production transport with short connect and read windows.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout.min(Duration::from_secs(5)))
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, url: &str) -> Result<RawResponse, String> {
        let res = self.client.get(url).send().await.map_err(|e| e.to_string())?;
        let status = StatusCode::from_u16(res.status().as_u16())
            .map_err(|e| e.to_string())?;
        let body = res.text().await.map_err(|e| e.to_string())?;
        Ok(RawResponse { status, body })
    }
}

/// Successful outcome of a fetch: either a payload or a legitimate absence.
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched<T> {
    Data(T),
    NoData,
}

impl<T> Fetched<T> {
    pub fn into_option(self) -> Option<T> {
        match self {
            Fetched::Data(t) => Some(t),
            Fetched::NoData => None,
        }
    }
}

/// Resource descriptor: a path under the provider's base URL plus query parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub path: String,
    pub query: Vec<(&'static str, String)>,
}

impl Resource {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            query: Vec::new(),
        }
    }

    pub fn param(mut self, key: &'static str, value: impl ToString) -> Self {
        self.query.push((key, value.to_string()));
        self
    }

    pub fn url(&self, base_url: &str) -> String {
        let mut url = format!(
            "{}/{}",
            base_url.trim_end_matches('/'),
            self.path.trim_start_matches('/')
        );
        for (i, (key, value)) in self.query.iter().enumerate() {
            url.push(if i == 0 { '?' } else { '&' });
            url.push_str(key);
            url.push('=');
            url.push_str(value);
        }
        url
    }
}

#[derive(Clone)]
pub struct UpstreamClient {
    provider: &'static str,
    base_url: String,
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    limiter: RateLimiter,
    cancel: CancellationToken,
}

enum Attempt<T> {
    Done(Fetched<T>),
    Retry(RetryKind, String),
}

impl UpstreamClient {
    pub fn new(
        provider: &'static str,
        base_url: impl Into<String>,
        transport: Arc<dyn Transport>,
        policy: RetryPolicy,
        sleeper: Arc<dyn Sleeper>,
        limiter: RateLimiter,
    ) -> Self {
        Self {
            provider,
            base_url: base_url.into(),
            transport,
            policy,
            sleeper,
            limiter,
            cancel: CancellationToken::new(),
        }
    }

    /// Cancelling this token aborts any fetch sleeping between attempts.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Fetch and decode one resource.
    ///
    /// 404 and 503 yield [`Fetched::NoData`]; 429 and other failures are
    /// retried according to the policy, then surface as [`FetchError::Fatal`].
    /// A body that does not decode is [`FetchError::Malformed`] and is not retried.
    pub async fn fetch<T: DeserializeOwned>(&self, resource: &Resource) -> Result<Fetched<T>, FetchError> {
        let url = resource.url(&self.base_url);
        let mut rate_limited_waits = 0u32;
        let mut transient_waits = 0u32;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            if self.cancel.is_cancelled() {
                return Err(self.cancelled(&url));
            }

            let (kind, reason) = match self.attempt(&url).await? {
                Attempt::Done(outcome) => return Ok(outcome),
                Attempt::Retry(kind, reason) => (kind, reason),
            };

            if attempt >= self.policy.max_attempts {
                error!(
                    "{}: {} failed after {} attempts: {}",
                    self.provider, url, attempt, reason
                );
                return Err(FetchError::Fatal {
                    provider: self.provider.to_string(),
                    url,
                    attempts: attempt,
                    reason,
                });
            }

            let waits = match kind {
                RetryKind::RateLimited => &mut rate_limited_waits,
                RetryKind::Transient => &mut transient_waits,
            };
            let delay = self.policy.delay(kind, *waits);
            *waits += 1;
            warn!(
                "{}: {} attempt {}/{} failed ({}), retrying in {:?}",
                self.provider, url, attempt, self.policy.max_attempts, reason, delay
            );

            tokio::select! {
                _ = self.sleeper.sleep(delay) => {}
                _ = self.cancel.cancelled() => return Err(self.cancelled(&url)),
            }
        }
    }

    async fn attempt<T: DeserializeOwned>(&self, url: &str) -> Result<Attempt<T>, FetchError> {
        let response = {
            let _slot = self.limiter.acquire().await;
            debug!("{}: GET {}", self.provider, url);
            self.transport.get(url).await
        };

        let response = match response {
            Ok(r) => r,
            Err(e) => return Ok(Attempt::Retry(RetryKind::Transient, e)),
        };

        match response.status {
            s if s.is_success() => from_str::<T>(&response.body)
                .map(|payload| Attempt::Done(Fetched::Data(payload)))
                .map_err(|e| FetchError::Malformed {
                    provider: self.provider.to_string(),
                    url: url.to_string(),
                    reason: e.to_string(),
                }),
            StatusCode::NOT_FOUND | StatusCode::SERVICE_UNAVAILABLE => {
                info!("{}: no data at {} ({})", self.provider, url, response.status);
                Ok(Attempt::Done(Fetched::NoData))
            }
            StatusCode::TOO_MANY_REQUESTS => Ok(Attempt::Retry(
                RetryKind::RateLimited,
                "rate limited".to_string(),
            )),
            other => Ok(Attempt::Retry(RetryKind::Transient, format!("HTTP {other}"))),
        }
    }

    fn cancelled(&self, url: &str) -> FetchError {
        FetchError::Cancelled {
            provider: self.provider.to_string(),
            url: url.to_string(),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedTransport;
    use super::*;
    use crate::utils::backoff::RecordingSleeper;
    use serde_json::Value;

    fn client(transport: Arc<ScriptedTransport>, sleeper: RecordingSleeper) -> UpstreamClient {
        UpstreamClient::new(
            "test",
            "http://upstream.test/api/",
            transport,
            RetryPolicy::new(Duration::from_secs(10), 5),
            Arc::new(sleeper),
            RateLimiter::new(Duration::ZERO),
        )
    }

    #[test]
    fn resource_builds_url_with_query() {
        let r = Resource::new("/2024/5/results/")
            .param("format", "json")
            .param("limit", 100);
        assert_eq!(
            r.url("https://api.jolpi.ca/ergast/f1/"),
            "https://api.jolpi.ca/ergast/f1/2024/5/results/?format=json&limit=100"
        );
    }

    #[tokio::test]
    async fn three_rate_limits_back_off_exponentially() {
        let transport = Arc::new(ScriptedTransport::new());
        transport
            .respond(429, "")
            .respond(429, "")
            .respond(429, "")
            .respond(200, r#"{"ok": true}"#);
        let sleeper = RecordingSleeper::new();
        let got: Fetched<Value> = client(transport.clone(), sleeper.clone())
            .fetch(&Resource::new("x"))
            .await
            .unwrap();

        assert_eq!(got, Fetched::Data(serde_json::json!({"ok": true})));
        assert_eq!(
            sleeper.delays(),
            vec![
                Duration::from_secs(10),
                Duration::from_secs(20),
                Duration::from_secs(40)
            ]
        );
        assert_eq!(transport.request_count(), 4);
    }

    #[tokio::test]
    async fn persistent_rate_limit_escalates_to_fatal() {
        let transport = Arc::new(ScriptedTransport::new());
        for _ in 0..6 {
            transport.respond(429, "");
        }
        let sleeper = RecordingSleeper::new();
        let err = client(transport.clone(), sleeper.clone())
            .fetch::<Value>(&Resource::new("x"))
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Fatal { attempts: 5, .. }));
        assert_eq!(transport.request_count(), 5);
        assert_eq!(sleeper.delays().len(), 4);
        assert_eq!(sleeper.delays()[3], Duration::from_secs(80));
    }

    #[tokio::test]
    async fn not_found_and_unavailable_are_no_data() {
        for status in [404, 503] {
            let transport = Arc::new(ScriptedTransport::new());
            transport.respond(status, "gone");
            let sleeper = RecordingSleeper::new();
            let got = client(transport.clone(), sleeper.clone())
                .fetch::<Value>(&Resource::new("x"))
                .await
                .unwrap();
            assert_eq!(got, Fetched::NoData);
            assert!(sleeper.delays().is_empty());
            assert_eq!(transport.request_count(), 1);
        }
    }

    #[tokio::test]
    async fn transient_failures_use_gentler_backoff() {
        let transport = Arc::new(ScriptedTransport::new());
        transport
            .fail("connection reset")
            .respond(500, "")
            .respond(200, "[]");
        let sleeper = RecordingSleeper::new();
        let got: Fetched<Vec<Value>> = client(transport, sleeper.clone())
            .fetch(&Resource::new("x"))
            .await
            .unwrap();
        assert_eq!(got, Fetched::Data(vec![]));
        assert_eq!(
            sleeper.delays(),
            vec![Duration::from_secs(10), Duration::from_secs(15)]
        );
    }

    #[tokio::test]
    async fn undecodable_body_is_malformed_without_retry() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(200, "<html>");
        let sleeper = RecordingSleeper::new();
        let err = client(transport.clone(), sleeper.clone())
            .fetch::<Value>(&Resource::new("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Malformed { .. }));
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_backoff_sleep() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(429, "");
        let cancel = CancellationToken::new();
        let client = UpstreamClient::new(
            "test",
            "http://upstream.test",
            transport,
            RetryPolicy::new(Duration::from_secs(3600), 5),
            Arc::new(crate::utils::backoff::TokioSleeper),
            RateLimiter::new(Duration::ZERO),
        )
        .with_cancellation(cancel.clone());

        let task = tokio::spawn(async move { client.fetch::<Value>(&Resource::new("x")).await });
        tokio::task::yield_now().await;
        cancel.cancel();
        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, FetchError::Cancelled { .. }));
    }
}
