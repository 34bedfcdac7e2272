use std::future::Future;
use std::pin::Pin;

use super::{GenerationDetector, ScoreOutcome};
use crate::CoreError;
use crate::config::DEFAULT_GPTZERO_URL;
use crate::net::HttpClient;
use crate::rate_limit::GPTZERO;

/// GPTZero `/v2/predict/text` scorer.
pub struct GptZero {
    http: HttpClient,
    endpoint: String,
    api_key: String,
}

impl std::fmt::Debug for GptZero {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GptZero")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"***")
            .finish()
    }
}

impl GptZero {
    /// Fails when no API key is configured: scoring cannot run without one.
    pub fn new(http: HttpClient, api_key: Option<String>) -> Result<Self, CoreError> {
        let api_key = api_key
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .ok_or(CoreError::MissingCredential("GPTZERO_API_KEY"))?;
        Ok(Self {
            http,
            endpoint: DEFAULT_GPTZERO_URL.to_string(),
            api_key,
        })
    }

    pub fn with_endpoint(mut self, url: impl Into<String>) -> Self {
        self.endpoint = url.into();
        self
    }
}

/// Read `documents[0].average_generated_prob`, clamped to `[0, 1]`.
pub fn parse_prediction(data: &serde_json::Value) -> ScoreOutcome {
    match data["documents"][0]["average_generated_prob"].as_f64() {
        Some(p) if p.is_finite() => ScoreOutcome::Probability(p.clamp(0.0, 1.0)),
        _ => ScoreOutcome::NotAvailable {
            reason: "GPTZero response has no numeric average_generated_prob".to_string(),
        },
    }
}

impl GenerationDetector for GptZero {
    fn name(&self) -> &str {
        GPTZERO
    }

    fn score<'a>(
        &'a self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = ScoreOutcome> + Send + 'a>> {
        Box::pin(async move {
            if text.trim().is_empty() {
                return ScoreOutcome::NotAvailable {
                    reason: "empty text sample".to_string(),
                };
            }
            let body = serde_json::json!({ "document": text });
            let headers = [
                ("x-api-key", self.api_key.clone()),
                ("Accept", "application/json".to_string()),
            ];
            match self
                .http
                .post_json(GPTZERO, &self.endpoint, &body, &headers)
                .await
            {
                Ok(data) => parse_prediction(&data),
                Err(failure) => ScoreOutcome::NotAvailable {
                    reason: format!("GPTZero {failure}"),
                },
            }
        })
    }
}
