//! Retrying JSON-over-HTTP client shared by the external services.
//!
//! Transient failures (connection errors, timeouts, 5xx, 429) are retried up
//! to `max_attempts` times with a linear backoff of `base_delay * attempt`. A
//! 429 `Retry-After` header overrides that delay and slows the service's
//! limiter. Other 4xx statuses and undecodable bodies are permanent. Running
//! out of attempts is a value ([`RequestFailure::NotAvailable`]), never a panic.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::CoreError;
use crate::rate_limit::{AdaptiveLimiter, RateLimiters, parse_retry_after};

/// Retry and timeout settings for one external call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero is treated as one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Per-attempt timeout.
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(5),
            timeout: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Delay before the attempt after `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

/// Why a request produced no usable response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestFailure {
    /// Every attempt failed transiently.
    NotAvailable { attempts: u32, reason: String },
    /// The service rejected the request or answered with something unusable.
    Permanent { reason: String },
}

impl std::fmt::Display for RequestFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestFailure::NotAvailable { attempts, reason } => {
                write!(f, "not available after {attempts} attempt(s): {reason}")
            }
            RequestFailure::Permanent { reason } => write!(f, "request rejected: {reason}"),
        }
    }
}

/// Outcome of one failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptError {
    Transient(String),
    RateLimited { retry_after: Option<Duration> },
    Permanent(String),
}

/// Classify a response status. `Ok(())` for 2xx.
pub fn check_response(resp: &reqwest::Response) -> Result<(), AttemptError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(());
    }
    if status.as_u16() == 429 {
        let retry_after = resp
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        return Err(AttemptError::RateLimited { retry_after });
    }
    if status.is_server_error() {
        return Err(AttemptError::Transient(format!("HTTP {status}")));
    }
    Err(AttemptError::Permanent(format!("HTTP {status}")))
}

fn classify_send_error(e: reqwest::Error) -> AttemptError {
    if e.is_builder() {
        AttemptError::Permanent(e.to_string())
    } else {
        AttemptError::Transient(e.to_string())
    }
}

/// Run `attempt` until it succeeds, fails permanently, or attempts run out.
///
/// Each attempt first waits for the limiter (when one is given) and is bounded
/// by `policy.timeout`.
pub async fn with_retries<T, F, Fut>(
    policy: &RetryPolicy,
    limiter: Option<&AdaptiveLimiter>,
    service: &str,
    mut attempt: F,
) -> Result<T, RequestFailure>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AttemptError>>,
{
    let max = policy.max_attempts.max(1);
    let mut last_reason = String::new();

    for n in 1..=max {
        if let Some(lim) = limiter {
            lim.acquire().await;
        }

        let result = match tokio::time::timeout(policy.timeout, attempt()).await {
            Ok(result) => result,
            Err(_) => Err(AttemptError::Transient(format!(
                "timed out after {:.1}s",
                policy.timeout.as_secs_f64()
            ))),
        };

        let delay = match result {
            Ok(value) => return Ok(value),
            Err(AttemptError::Permanent(reason)) => {
                tracing::warn!(service, reason = %reason, "request failed permanently");
                return Err(RequestFailure::Permanent { reason });
            }
            Err(AttemptError::Transient(reason)) => {
                last_reason = reason;
                policy.delay_after(n)
            }
            Err(AttemptError::RateLimited { retry_after }) => {
                if let Some(lim) = limiter {
                    lim.on_rate_limited();
                }
                last_reason = "rate limited (429)".to_string();
                retry_after.unwrap_or_else(|| policy.delay_after(n))
            }
        };

        if n < max {
            tracing::debug!(
                service,
                attempt = n,
                delay_ms = delay.as_millis() as u64,
                reason = %last_reason,
                "retrying request"
            );
            tokio::time::sleep(delay).await;
        }
    }

    tracing::warn!(service, attempts = max, reason = %last_reason, "service not available");
    Err(RequestFailure::NotAvailable {
        attempts: max,
        reason: last_reason,
    })
}

/// Append URL-encoded query parameters to `base`.
pub fn build_url(base: &str, params: &[(&str, String)]) -> String {
    if params.is_empty() {
        return base.to_string();
    }
    let query: Vec<String> = params
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect();
    let sep = if base.contains('?') { '&' } else { '?' };
    format!("{base}{sep}{}", query.join("&"))
}

/// Shared HTTP client: one `reqwest::Client`, one retry policy, per-service limiters.
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    policy: RetryPolicy,
    limiters: Arc<RateLimiters>,
}

impl HttpClient {
    pub fn new(policy: RetryPolicy, limiters: Arc<RateLimiters>) -> Result<Self, CoreError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("hallucitation/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_client(client, policy, limiters))
    }

    pub fn with_client(client: reqwest::Client, policy: RetryPolicy, limiters: Arc<RateLimiters>) -> Self {
        Self {
            client,
            policy,
            limiters,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// GET `url` with query `params` and decode the JSON body.
    pub async fn get_json(
        &self,
        service: &str,
        url: &str,
        params: &[(&str, String)],
        headers: &[(&str, String)],
    ) -> Result<serde_json::Value, RequestFailure> {
        let full_url = build_url(url, params);
        let client = &self.client;
        let url = full_url.as_str();
        let timeout = self.policy.timeout;

        with_retries(&self.policy, self.limiters.get(service), service, move || async move {
            let mut req = client.get(url).timeout(timeout);
            for (name, value) in headers {
                req = req.header(*name, value.as_str());
            }
            let resp = req.send().await.map_err(classify_send_error)?;
            check_response(&resp)?;
            resp.json::<serde_json::Value>()
                .await
                .map_err(|e| AttemptError::Permanent(format!("undecodable response body: {e}")))
        })
        .await
    }

    /// POST a JSON `body` to `url` and decode the JSON response.
    pub async fn post_json(
        &self,
        service: &str,
        url: &str,
        body: &serde_json::Value,
        headers: &[(&str, String)],
    ) -> Result<serde_json::Value, RequestFailure> {
        let client = &self.client;
        let timeout = self.policy.timeout;

        with_retries(&self.policy, self.limiters.get(service), service, move || async move {
            let mut req = client.post(url).timeout(timeout).json(body);
            for (name, value) in headers {
                req = req.header(*name, value.as_str());
            }
            let resp = req.send().await.map_err(classify_send_error)?;
            check_response(&resp)?;
            resp.json::<serde_json::Value>()
                .await
                .map_err(|e| AttemptError::Permanent(format!("undecodable response body: {e}")))
        })
        .await
    }
}
