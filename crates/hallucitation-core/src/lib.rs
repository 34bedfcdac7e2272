use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

pub mod backend;
pub mod classify;
pub mod config;
pub mod config_file;
pub mod matching;
pub mod net;
pub mod pipeline;
pub mod rate_limit;
pub mod score;
pub mod store;
pub mod verify;

// Re-export for convenience
pub use backend::{BackendError, Extraction, PdfBackend, TextExtractor};
pub use classify::{ClassificationPolicy, classify};
pub use config::Config;
pub use net::{HttpClient, RequestFailure, RetryPolicy};
pub use pipeline::{DryRunReport, PaperOutcome, ParsedCitation, Pipeline, dry_run, parse_citations};
pub use rate_limit::{AdaptiveLimiter, RateLimiters};
pub use score::{GenerationDetector, ScoreOutcome};
pub use store::{CodingRow, StatusCounts, Store, StoreError};
pub use verify::{BibMatch, BibliographicAuthority, CitationQuery, VerifyOutcome};

/// Processing state of a paper.
///
/// Transitions are `pending -> processed` and `pending -> error`. Papers are
/// never deleted; re-queueing resets them to `pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaperStatus {
    Pending,
    Processed,
    Error,
}

impl PaperStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaperStatus::Pending => "pending",
            PaperStatus::Processed => "processed",
            PaperStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for PaperStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaperStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "pending" => Ok(PaperStatus::Pending),
            "processed" => Ok(PaperStatus::Processed),
            "error" => Ok(PaperStatus::Error),
            other => Err(format!("unknown processing status '{other}'")),
        }
    }
}

/// One row of the paper-metadata table.
#[derive(Debug, Clone, PartialEq)]
pub struct PaperRecord {
    pub paper_id: String,
    pub pdf_path: PathBuf,
    pub status: PaperStatus,
    /// Why the paper ended in `error`. Cleared once it is processed.
    pub error_reason: Option<String>,
    pub domain_category: String,
    pub venue: String,
    pub publication_year: Option<u16>,
    pub title: String,
    pub authors: String,
}

impl PaperRecord {
    /// A pending paper with empty metadata.
    pub fn new(paper_id: impl Into<String>, pdf_path: impl Into<PathBuf>) -> Self {
        Self {
            paper_id: paper_id.into(),
            pdf_path: pdf_path.into(),
            status: PaperStatus::Pending,
            error_reason: None,
            domain_category: String::new(),
            venue: String::new(),
            publication_year: None,
            title: String::new(),
            authors: String::new(),
        }
    }
}

/// Final verdict for one citation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classification {
    Real,
    Hallucinated,
    Uncertain,
}

impl Classification {
    /// Value of the `Is_Hallucinated` column.
    pub fn code(&self) -> i8 {
        match self {
            Classification::Real => 0,
            Classification::Hallucinated => 1,
            Classification::Uncertain => -1,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Classification::Real),
            1 => Some(Classification::Hallucinated),
            -1 => Some(Classification::Uncertain),
            _ => None,
        }
    }

    /// Hallucinated and Uncertain citations get a manual-coding row.
    pub fn is_flagged(&self) -> bool {
        !matches!(self, Classification::Real)
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Classification::Real => f.write_str("Real"),
            Classification::Hallucinated => f.write_str("Hallucinated"),
            Classification::Uncertain => f.write_str("Uncertain"),
        }
    }
}

/// How a citation's classification was reached.
///
/// Automated rows are always attributed to the bibliographic authority; which
/// services were unavailable is recorded in the failure reason instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VerificationMethod {
    CrossRef,
    /// Set by a human coder.
    Manual,
}

impl VerificationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationMethod::CrossRef => "CrossRef",
            VerificationMethod::Manual => "Manual",
        }
    }
}

impl FromStr for VerificationMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "crossref" => Ok(VerificationMethod::CrossRef),
            "manual" => Ok(VerificationMethod::Manual),
            other => Err(format!("unknown verification method '{other}'")),
        }
    }
}

/// One row of the citations table.
#[derive(Debug, Clone, PartialEq)]
pub struct CitationRecord {
    /// `{paper_id}_C{seq:03}`.
    pub citation_id: String,
    pub paper_id: String,
    /// 1-based position in the reference list.
    pub seq: usize,
    pub citation_text: String,
    pub citation_year: Option<u16>,
    pub authors_cited: String,
    pub title_cited: String,
    pub classification: Classification,
    pub verification_method: VerificationMethod,
    /// CrossRef relevance score of the top match.
    pub crossref_score: Option<f64>,
    /// GPTZero average generated probability.
    pub gptzero_score: Option<f64>,
    pub section_location: Option<String>,
    pub context_sentence: Option<String>,
    pub matched_title: Option<String>,
    pub title_similarity: Option<f64>,
    /// DOI of the matched work.
    pub matched_doi: Option<String>,
    /// Set while either external service was unavailable for this citation.
    pub failure_reason: Option<String>,
}

/// Deterministic citation id for the `seq`-th reference of a paper.
pub fn citation_id(paper_id: &str, seq: usize) -> String {
    format!("{paper_id}_C{seq:03}")
}

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("missing credential: {0} is not set")]
    MissingCredential(&'static str),
    #[error("unknown paper '{0}'")]
    UnknownPaper(String),
    #[error("store lock poisoned")]
    StorePoisoned,
    #[error("configuration error: {0}")]
    Config(String),
}

/// Progress events emitted while the pipeline runs.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    PaperStarted {
        index: usize,
        total: usize,
        paper_id: String,
    },
    CitationChecked {
        paper_id: String,
        seq: usize,
        total: usize,
        classification: Classification,
    },
    PaperProcessed {
        paper_id: String,
        citations: usize,
        flagged: usize,
    },
    PaperFailed {
        paper_id: String,
        reason: String,
    },
    CitationReverified {
        citation_id: String,
        classification: Classification,
        resolved: bool,
    },
}

/// Totals for one batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub papers_processed: usize,
    pub papers_errored: usize,
    pub citations: usize,
    pub real: usize,
    pub hallucinated: usize,
    pub uncertain: usize,
    /// The run stopped early because cancellation was requested.
    pub cancelled: bool,
}

/// Totals for one re-verification pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReverifySummary {
    pub attempted: usize,
    /// Citations whose services both answered this time.
    pub resolved: usize,
    pub still_unavailable: usize,
    pub cancelled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn citation_ids_are_zero_padded() {
        assert_eq!(citation_id("P001", 1), "P001_C001");
        assert_eq!(citation_id("P001", 42), "P001_C042");
        assert_eq!(citation_id("P001", 1234), "P001_C1234");
    }

    #[test]
    fn classification_codes() {
        assert_eq!(Classification::Real.code(), 0);
        assert_eq!(Classification::Hallucinated.code(), 1);
        assert_eq!(Classification::Uncertain.code(), -1);
        for c in [
            Classification::Real,
            Classification::Hallucinated,
            Classification::Uncertain,
        ] {
            assert_eq!(Classification::from_code(c.code() as i64), Some(c));
        }
        assert_eq!(Classification::from_code(7), None);
    }

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!("Processed".parse::<PaperStatus>(), Ok(PaperStatus::Processed));
        assert_eq!("".parse::<PaperStatus>(), Ok(PaperStatus::Pending));
        assert!("done".parse::<PaperStatus>().is_err());
    }

    #[test]
    fn verification_method_strings() {
        for m in [VerificationMethod::CrossRef, VerificationMethod::Manual] {
            assert_eq!(m.as_str().parse::<VerificationMethod>(), Ok(m));
        }
        assert_eq!("manual".parse::<VerificationMethod>(), Ok(VerificationMethod::Manual));
        assert!("CrossRef+GPTZero".parse::<VerificationMethod>().is_err());
    }
}
