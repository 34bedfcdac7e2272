use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use hallucitation_parsing::{ParsingConfig, YearWindow};

use crate::classify::ClassificationPolicy;
use crate::net::RetryPolicy;
use crate::rate_limit::RateLimiters;

pub const DEFAULT_CROSSREF_URL: &str = "https://api.crossref.org/works";
pub const DEFAULT_GPTZERO_URL: &str = "https://api.gptzero.me/v2/predict/text";

/// Runtime configuration for the pipeline.
#[derive(Clone)]
pub struct Config {
    pub gptzero_api_key: Option<String>,
    pub crossref_mailto: Option<String>,
    pub crossref_url: String,
    pub gptzero_url: String,
    /// Attempts per external request, including the first.
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub request_timeout: Duration,
    /// Minimum spacing between requests to the same service.
    pub inter_request_delay: Duration,
    pub rate_limiters: Arc<RateLimiters>,
    pub policy: ClassificationPolicy,
    pub parsing: ParsingConfig,
    /// Citations of one paper checked at the same time. 1 = sequential.
    pub citation_concurrency: usize,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("gptzero_api_key", &self.gptzero_api_key.as_ref().map(|_| "***"))
            .field(
                "crossref_mailto",
                &self.crossref_mailto.as_ref().map(|_| "***"),
            )
            .field("crossref_url", &self.crossref_url)
            .field("gptzero_url", &self.gptzero_url)
            .field("max_retries", &self.max_retries)
            .field("retry_base_delay", &self.retry_base_delay)
            .field("request_timeout", &self.request_timeout)
            .field("inter_request_delay", &self.inter_request_delay)
            .field("rate_limiters", &self.rate_limiters)
            .field("policy", &self.policy)
            .field("parsing", &self.parsing)
            .field("citation_concurrency", &self.citation_concurrency)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gptzero_api_key: None,
            crossref_mailto: None,
            crossref_url: DEFAULT_CROSSREF_URL.to_string(),
            gptzero_url: DEFAULT_GPTZERO_URL.to_string(),
            max_retries: 3,
            retry_base_delay: Duration::from_secs(5),
            request_timeout: Duration::from_secs(60),
            inter_request_delay: Duration::from_secs(1),
            rate_limiters: Arc::new(RateLimiters::default()),
            policy: ClassificationPolicy::default(),
            parsing: ParsingConfig {
                year_window: YearWindow::relative_to(current_year(), 1800, 1),
                ..ParsingConfig::default()
            },
            citation_concurrency: 1,
        }
    }
}

impl Config {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retries,
            base_delay: self.retry_base_delay,
            timeout: self.request_timeout,
        }
    }
}

/// Current calendar year (UTC).
pub fn current_year() -> u16 {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    year_from_unix_days((secs / 86_400) as i64)
}

/// Civil year for a count of days since 1970-01-01.
fn year_from_unix_days(days: i64) -> u16 {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = yoe + era * 400 + i64::from(month <= 2);
    year.clamp(0, i64::from(u16::MAX)) as u16
}
