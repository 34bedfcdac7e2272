//! Mock bibliographic authority for testing.

use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::{BibMatch, BibliographicAuthority, CitationQuery, VerifyOutcome};

/// A hand-rolled mock implementing [`BibliographicAuthority`].
///
/// Responses are chosen, in order of precedence, by:
/// - a rule whose needle appears in the query's title or raw text,
/// - the next entry of a sequence (the last one repeats),
/// - the fallback.
pub struct MockAuthority {
    rules: Vec<(String, VerifyOutcome)>,
    /// Reversed so `pop()` yields the next response.
    responses: Mutex<Vec<VerifyOutcome>>,
    fallback: VerifyOutcome,
    delay: Option<Duration>,
    call_count: AtomicUsize,
    queries: Mutex<Vec<CitationQuery>>,
}

impl MockAuthority {
    /// Create a mock that always returns `response`.
    pub fn new(response: VerifyOutcome) -> Self {
        Self {
            rules: Vec::new(),
            responses: Mutex::new(Vec::new()),
            fallback: response,
            delay: None,
            call_count: AtomicUsize::new(0),
            queries: Mutex::new(Vec::new()),
        }
    }

    /// Create a mock that returns responses in order, repeating the last one.
    pub fn with_sequence(mut responses: Vec<VerifyOutcome>) -> Self {
        let fallback = responses.last().cloned().unwrap_or(VerifyOutcome::NotFound);
        responses.reverse();
        Self {
            responses: Mutex::new(responses),
            ..Self::new(fallback)
        }
    }

    /// Return `response` whenever `needle` occurs (case-insensitively) in the query.
    pub fn with_rule(mut self, needle: &str, response: VerifyOutcome) -> Self {
        self.rules.push((needle.to_lowercase(), response));
        self
    }

    /// Set simulated network latency per call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// How many times `verify()` has been called.
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Every query received so far, in call order.
    pub fn queries(&self) -> Vec<CitationQuery> {
        self.queries.lock().map(|q| q.clone()).unwrap_or_default()
    }

    fn next_response(&self, query: &CitationQuery) -> VerifyOutcome {
        let haystack = format!(
            "{} {}",
            query.title.as_deref().unwrap_or(""),
            query.raw
        )
        .to_lowercase();
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

/// A high-relevance match with an exact title.
pub fn exact_match(title: &str) -> VerifyOutcome {
    VerifyOutcome::Match(BibMatch {
        title: title.to_string(),
        relevance: 90.0,
        similarity: Some(1.0),
        doi: None,
    })
}

impl BibliographicAuthority for MockAuthority {
    fn name(&self) -> &str {
        "MockAuthority"
    }

    fn verify<'a>(
        &'a self,
        query: &'a CitationQuery,
    ) -> Pin<Box<dyn Future<Output = VerifyOutcome> + Send + 'a>> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut queries) = self.queries.lock() {
            queries.push(query.clone());
        }
        let response = self.next_response(query);
        let delay = self.delay;

        Box::pin(async move {
            if let Some(d) = delay {
                tokio::time::sleep(d).await;
            }
            response
        })
    }
}
