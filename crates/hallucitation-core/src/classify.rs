//! Combining verification and scoring evidence into a verdict.
//!
//! | verifier              | scorer                  | result       |
//! |-----------------------|-------------------------|--------------|
//! | NotAvailable          | any                     | Uncertain    |
//! | any                   | NotAvailable            | Uncertain    |
//! | NotFound              | p >= threshold          | Hallucinated |
//! | NotFound              | p < threshold           | Uncertain    |
//! | high-confidence Match | p >= conflict           | Uncertain    |
//! | high-confidence Match | p < conflict            | Real         |
//! | low-confidence Match  | any                     | Uncertain    |

use crate::score::ScoreOutcome;
use crate::verify::{BibMatch, VerifyOutcome};
use crate::Classification;

/// Thresholds applied by [`classify`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassificationPolicy {
    /// AI probability at or above which an unmatched citation is hallucinated.
    pub threshold: f64,
    /// AI probability at or above which a confident match is contradicted.
    pub conflict_probability: f64,
    /// Minimum authority relevance score for a confident match.
    pub min_relevance_score: f64,
    /// Minimum cited/matched title similarity for a confident match.
    pub min_title_similarity: f64,
}

impl Default for ClassificationPolicy {
    fn default() -> Self {
        Self {
            threshold: 0.7,
            conflict_probability: 0.9,
            min_relevance_score: 20.0,
            min_title_similarity: 0.8,
        }
    }
}

impl ClassificationPolicy {
    /// A match counts as confident when its relevance clears the floor and,
    /// if a title similarity could be computed, that clears its floor too.
    pub fn is_confident(&self, m: &BibMatch) -> bool {
        m.relevance >= self.min_relevance_score
            && m.similarity
                .is_none_or(|s| s >= self.min_title_similarity)
    }
}

/// Pure, deterministic verdict for one citation.
pub fn classify(
    verify: &VerifyOutcome,
    score: &ScoreOutcome,
    policy: &ClassificationPolicy,
) -> Classification {
    let p = match score {
        ScoreOutcome::Probability(p) => *p,
        ScoreOutcome::NotAvailable { .. } => return Classification::Uncertain,
    };
    match verify {
        VerifyOutcome::NotAvailable { .. } => Classification::Uncertain,
        VerifyOutcome::NotFound if p >= policy.threshold => Classification::Hallucinated,
        VerifyOutcome::NotFound => Classification::Uncertain,
        VerifyOutcome::Match(m) if !policy.is_confident(m) => Classification::Uncertain,
        VerifyOutcome::Match(_) if p >= policy.conflict_probability => Classification::Uncertain,
        VerifyOutcome::Match(_) => Classification::Real,
    }
}

/// Joined reasons of the services that were unavailable, if any.
pub fn failure_reason(verify: &VerifyOutcome, score: &ScoreOutcome) -> Option<String> {
    let mut reasons = Vec::new();
    if let VerifyOutcome::NotAvailable { reason } = verify {
        reasons.push(reason.as_str());
    }
    if let ScoreOutcome::NotAvailable { reason } = score {
        reasons.push(reason.as_str());
    }
    (!reasons.is_empty()).then(|| reasons.join("; "))
}
