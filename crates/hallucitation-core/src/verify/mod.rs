//! Bibliographic lookup of a citation against an external authority.

pub mod crossref;
pub mod mock;

use std::future::Future;
use std::pin::Pin;

/// What is asked of the authority for one citation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CitationQuery {
    /// Raw citation text, used when no title could be extracted.
    pub raw: String,
    pub title: Option<String>,
    pub year: Option<u16>,
}

/// Top match returned by the authority.
#[derive(Debug, Clone, PartialEq)]
pub struct BibMatch {
    pub title: String,
    /// Relevance score reported by the authority.
    pub relevance: f64,
    /// Fuzzy similarity (0–1) between the cited and matched titles, when both exist.
    pub similarity: Option<f64>,
    pub doi: Option<String>,
}

/// Result of one verification. `NotFound` and `NotAvailable` are distinct:
/// the first is evidence, the second is the absence of evidence.
#[derive(Debug, Clone, PartialEq)]
pub enum VerifyOutcome {
    Match(BibMatch),
    NotFound,
    NotAvailable { reason: String },
}

/// A bibliographic authority that can look up a citation.
pub trait BibliographicAuthority: Send + Sync {
    /// The canonical name of this authority (e.g., "CrossRef").
    fn name(&self) -> &str;

    fn verify<'a>(
        &'a self,
        query: &'a CitationQuery,
    ) -> Pin<Box<dyn Future<Output = VerifyOutcome> + Send + 'a>>;
}
