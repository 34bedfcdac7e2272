//! Mock generation detector for testing.

use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::{GenerationDetector, ScoreOutcome};

/// A hand-rolled mock implementing [`GenerationDetector`].
///
/// Rule matches on the submitted text win over the sequence, which wins over
/// the fallback; the last sequence entry repeats.
pub struct MockDetector {
    rules: Vec<(String, ScoreOutcome)>,
    responses: Mutex<Vec<ScoreOutcome>>,
    fallback: ScoreOutcome,
    delay: Option<Duration>,
    call_count: AtomicUsize,
    samples: Mutex<Vec<String>>,
}

impl MockDetector {
    /// Create a mock that always returns `response`.
    pub fn new(response: ScoreOutcome) -> Self {
        Self {
            rules: Vec::new(),
            responses: Mutex::new(Vec::new()),
            fallback: response,
            delay: None,
            call_count: AtomicUsize::new(0),
            samples: Mutex::new(Vec::new()),
        }
    }

    /// Always answer with probability `p`.
    pub fn constant(p: f64) -> Self {
        Self::new(ScoreOutcome::Probability(p))
    }

    /// Create a mock that returns responses in order, repeating the last one.
    pub fn with_sequence(mut responses: Vec<ScoreOutcome>) -> Self {
        let fallback = responses
            .last()
            .cloned()
            .unwrap_or(ScoreOutcome::Probability(0.0));
        responses.reverse();
        Self {
            responses: Mutex::new(responses),
            ..Self::new(fallback)
        }
    }

    /// Return `response` whenever `needle` occurs (case-insensitively) in the sample.
    pub fn with_rule(mut self, needle: &str, response: ScoreOutcome) -> Self {
        self.rules.push((needle.to_lowercase(), response));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Every text sample received so far, in call order.
    pub fn samples(&self) -> Vec<String> {
        self.samples.lock().map(|s| s.clone()).unwrap_or_default()
    }

    fn next_response(&self, text: &str) -> ScoreOutcome {
        let haystack = text.to_lowercase();
        if let Some((_, response)) = self.rules.iter().find(|(needle, _)| haystack.contains(needle)) {
            return response.clone();
        }
        self.responses
            .lock()
            .ok()
            .and_then(|mut seq| seq.pop())
            .unwrap_or_else(|| self.fallback.clone())
    }
}

impl GenerationDetector for MockDetector {
    fn name(&self) -> &str {
        "MockDetector"
    }

    fn score<'a>(
        &'a self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = ScoreOutcome> + Send + 'a>> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut samples) = self.samples.lock() {
            samples.push(text.to_string());
        }
        let response = self.next_response(text);
        let delay = self.delay;

        Box::pin(async move {
            if let Some(d) = delay {
                tokio::time::sleep(d).await;
            }
            response
        })
    }
}
