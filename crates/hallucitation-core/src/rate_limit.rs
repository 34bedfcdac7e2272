//! Per-service rate limiting with adaptive governor instances.
//!
//! Every outgoing request waits for its service's governor permit via
//! `until_ready()`, which spaces requests at the configured interval no matter
//! how many citations are in flight. On 429 the governor is swapped for a
//! slower one; it recovers after a quiet minute.

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Service names used as limiter keys.
pub const CROSSREF: &str = "CrossRef";
pub const GPTZERO: &str = "GPTZero";

const MAX_SLOWDOWN: u32 = 16;
const RECOVERY: Duration = Duration::from_secs(60);

fn quota_for(period: Duration) -> Quota {
    // A zero period means "no spacing": a microsecond interval with a large burst.
    Quota::with_period(period)
        .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN.saturating_add(999_999)))
}

/// Per-service limiter whose rate can be lowered at runtime.
pub struct AdaptiveLimiter {
    limiter: ArcSwap<DirectLimiter>,
    base_period: Duration,
    /// 1 = normal, 2 = half rate, ...
    current_factor: AtomicU32,
    last_429: std::sync::Mutex<Option<Instant>>,
}

impl AdaptiveLimiter {
    /// Allow one request every `period`.
    pub fn new(period: Duration) -> Self {
        Self {
            limiter: ArcSwap::from(Arc::new(DirectLimiter::direct(quota_for(period)))),
            base_period: period,
            current_factor: AtomicU32::new(1),
            last_429: std::sync::Mutex::new(None),
        }
    }

    pub fn base_period(&self) -> Duration {
        self.base_period
    }

    pub fn slowdown_factor(&self) -> u32 {
        self.current_factor.load(Ordering::SeqCst)
    }

    /// Wait until the limiter allows a request.
    pub async fn acquire(&self) {
        self.try_decay();
        let limiter = self.limiter.load();
        limiter.until_ready().await;
    }

    /// Called when a 429 is received. Doubles the slowdown factor and swaps the governor.
    pub fn on_rate_limited(&self) {
        if let Ok(mut last) = self.last_429.lock() {
            *last = Some(Instant::now());
        }

        let _ = self
            .current_factor
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |f| {
                Some((f * 2).min(MAX_SLOWDOWN))
            });

        let factor = self.current_factor.load(Ordering::SeqCst);
        if let Some(scaled) = self.base_period.checked_mul(factor) {
            tracing::debug!(factor, period_ms = scaled.as_millis() as u64, "slowing limiter after 429");
            self.limiter
                .store(Arc::new(DirectLimiter::direct(quota_for(scaled))));
        }
    }

    fn try_decay(&self) {
        let should_restore = self
            .last_429
            .lock()
            .ok()
            .and_then(|last| last.map(|t| t.elapsed() >= RECOVERY))
            .unwrap_or(false);

        if should_restore && self.current_factor.load(Ordering::SeqCst) > 1 {
            self.current_factor.store(1, Ordering::SeqCst);
            self.limiter
                .store(Arc::new(DirectLimiter::direct(quota_for(self.base_period))));
        }
    }
}

/// Collection of per-service rate limiters.
pub struct RateLimiters {
    limiters: HashMap<&'static str, AdaptiveLimiter>,
}

impl Default for RateLimiters {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl RateLimiters {
    /// One limiter per external service, each spacing requests by `inter_request_delay`.
    pub fn new(inter_request_delay: Duration) -> Self {
        let mut limiters = HashMap::new();
        limiters.insert(CROSSREF, AdaptiveLimiter::new(inter_request_delay));
        limiters.insert(GPTZERO, AdaptiveLimiter::new(inter_request_delay));
        Self { limiters }
    }

    /// No spacing at all. Used by tests and by the offline dry run.
    pub fn unlimited() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn get(&self, service: &str) -> Option<&AdaptiveLimiter> {
        self.limiters.get(service)
    }
}

impl std::fmt::Debug for RateLimiters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.limiters.keys().collect();
        names.sort();
        f.debug_struct("RateLimiters").field("services", &names).finish()
    }
}

/// Parse a Retry-After header value (seconds or HTTP-date).
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    if let Ok(secs) = value.trim().parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    // HTTP-date: use a conservative fixed wait instead of parsing the date.
    if value.contains(',') || value.contains("GMT") {
        return Some(Duration::from_secs(5));
    }
    None
}
