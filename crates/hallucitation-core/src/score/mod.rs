//! AI-generation probability scoring of citation context.

pub mod gptzero;
pub mod mock;

use std::future::Future;
use std::pin::Pin;

/// Result of one scoring request.
#[derive(Debug, Clone, PartialEq)]
pub enum ScoreOutcome {
    /// Probability in `[0, 1]` that the text was machine-generated.
    Probability(f64),
    NotAvailable { reason: String },
}

/// A detector estimating whether a text sample was machine-generated.
pub trait GenerationDetector: Send + Sync {
    fn name(&self) -> &str;

    fn score<'a>(
        &'a self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = ScoreOutcome> + Send + 'a>>;
}
