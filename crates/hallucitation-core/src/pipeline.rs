//! Per-paper orchestration: extract, segment, verify, score, classify, persist.
//!
//! A paper moves `pending -> processed | error`. Empty extracted text is the
//! only paper-level failure; a citation whose services are unavailable is
//! still recorded (Uncertain, with its failure reason). All of a paper's rows
//! are built before anything is written, then committed with the status flip
//! in one store transaction.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::stream::{self, StreamExt};
use hallucitation_parsing::{
    SectionMap, SectionSegmenter, extract_year, locate_usage, parse_paper, split_citation,
};
use tokio_util::sync::CancellationToken;

use crate::backend::TextExtractor;
use crate::classify::{ClassificationPolicy, classify, failure_reason};
use crate::config::Config;
use crate::score::{GenerationDetector, ScoreOutcome};
use crate::store::Store;
use crate::verify::{BibliographicAuthority, CitationQuery, VerifyOutcome};
use crate::{
    CitationRecord, Classification, CoreError, PaperRecord, PipelineEvent, ReverifySummary,
    RunSummary, VerificationMethod, citation_id,
};

/// A reference parsed out of a paper, before any network call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCitation {
    /// 1-based position in the reference list.
    pub seq: usize,
    pub text: String,
    pub year: Option<u16>,
    pub title: Option<String>,
    pub authors: Option<String>,
    /// Section containing the first in-text usage.
    pub section: Option<String>,
    /// Sentence around the first in-text usage.
    pub context: Option<String>,
}

impl ParsedCitation {
    fn query(&self) -> CitationQuery {
        CitationQuery {
            raw: self.text.clone(),
            title: self.title.clone(),
            year: self.year,
        }
    }

    /// Text submitted to the generation detector.
    fn sample(&self) -> &str {
        self.context.as_deref().unwrap_or(&self.text)
    }
}

/// What the offline dry run found in one document.
#[derive(Debug, Clone, Default)]
pub struct DryRunReport {
    pub chars: usize,
    pub failure: Option<String>,
    pub sections: SectionMap,
    pub citations: Vec<ParsedCitation>,
}

/// How one paper ended.
#[derive(Debug, Clone)]
pub enum PaperOutcome {
    Processed(Vec<CitationRecord>),
    Failed(String),
}

/// Segment `text` and parse every reference, without touching the network.
pub fn parse_citations(
    text: &str,
    segmenter: &SectionSegmenter,
    config: &Config,
) -> (SectionMap, Vec<ParsedCitation>) {
    let parsed = parse_paper(text, segmenter, &config.parsing);
    let body = &text[..parsed.body_end];
    let citations = parsed
        .references
        .iter()
        .enumerate()
        .map(|(i, raw)| {
            let seq = i + 1;
            let year = extract_year(raw, config.parsing.year_window);
            let parts = split_citation(raw);
            let usage = locate_usage(body, raw, seq, year);
            let section = usage
                .as_ref()
                .and_then(|u| parsed.sections.section_at(u.offset))
                .map(str::to_string);
            ParsedCitation {
                seq,
                text: raw.clone(),
                year,
                title: parts.title,
                authors: parts.authors,
                section,
                context: usage.map(|u| u.sentence).filter(|s| !s.is_empty()),
            }
        })
        .collect();
    (parsed.sections, citations)
}

/// Extraction, segmentation and reference splitting only.
pub async fn dry_run(extractor: &TextExtractor, config: &Config, path: &Path) -> DryRunReport {
    let extraction = extractor.extract(path).await;
    if extraction.is_empty() {
        return DryRunReport {
            failure: extraction.failure,
            ..DryRunReport::default()
        };
    }
    let segmenter = SectionSegmenter::new(&config.parsing.resolved_section_patterns());
    let (sections, citations) = parse_citations(&extraction.text, &segmenter, config);
    DryRunReport {
        chars: extraction.text.chars().count(),
        failure: None,
        sections,
        citations,
    }
}

/// Overwrite the verification-derived fields of `record`.
fn apply_outcomes(
    record: &mut CitationRecord,
    verify: &VerifyOutcome,
    score: &ScoreOutcome,
    policy: &ClassificationPolicy,
) {
    record.classification = classify(verify, score, policy);
    record.verification_method = VerificationMethod::CrossRef;
    record.failure_reason = failure_reason(verify, score);
    (
        record.crossref_score,
        record.matched_title,
        record.title_similarity,
        record.matched_doi,
    ) = match verify {
        VerifyOutcome::Match(m) => (
            Some(m.relevance),
            Some(m.title.clone()),
            m.similarity,
            m.doi.clone(),
        ),
        _ => (None, None, None, None),
    };
    record.gptzero_score = match score {
        ScoreOutcome::Probability(p) => Some(*p),
        ScoreOutcome::NotAvailable { .. } => None,
    };
}

pub struct Pipeline {
    config: Arc<Config>,
    extractor: TextExtractor,
    segmenter: SectionSegmenter,
    authority: Arc<dyn BibliographicAuthority>,
    detector: Arc<dyn GenerationDetector>,
    store: Mutex<Store>,
}

impl Pipeline {
    pub fn new(
        config: Arc<Config>,
        extractor: TextExtractor,
        authority: Arc<dyn BibliographicAuthority>,
        detector: Arc<dyn GenerationDetector>,
        store: Store,
    ) -> Self {
        let segmenter = SectionSegmenter::new(&config.parsing.resolved_section_patterns());
        Self {
            config,
            extractor,
            segmenter,
            authority,
            detector,
            store: Mutex::new(store),
        }
    }

    /// Exclusive access to the store. Never held across an `.await`.
    pub fn store(&self) -> Result<MutexGuard<'_, Store>, CoreError> {
        self.store.lock().map_err(|_| CoreError::StorePoisoned)
    }

    /// Process up to `limit` pending or errored papers in id order.
    ///
    /// Cancellation is checked between papers only, so a paper is never
    /// left half-written.
    pub async fn run_batch(
        &self,
        limit: Option<usize>,
        cancel: &CancellationToken,
        progress: &(dyn Fn(PipelineEvent) + Send + Sync),
    ) -> Result<RunSummary, CoreError> {
        let papers = self.store()?.pending_papers(limit)?;
        let total = papers.len();
        let mut summary = RunSummary::default();
        tracing::info!(papers = total, "starting batch");

        for (index, paper) in papers.iter().enumerate() {
            if cancel.is_cancelled() {
                tracing::info!(remaining = total - index, "batch cancelled");
                summary.cancelled = true;
                break;
            }
            progress(PipelineEvent::PaperStarted {
                index,
                total,
                paper_id: paper.paper_id.clone(),
            });

            match self.process_paper(paper, progress).await {
                Ok(PaperOutcome::Processed(records)) => {
                    summary.papers_processed += 1;
                    summary.citations += records.len();
                    for r in &records {
                        match r.classification {
                            Classification::Real => summary.real += 1,
                            Classification::Hallucinated => summary.hallucinated += 1,
                            Classification::Uncertain => summary.uncertain += 1,
                        }
                    }
                }
                Ok(PaperOutcome::Failed(_)) => summary.papers_errored += 1,
                Err(e) => {
                    tracing::error!(paper_id = %paper.paper_id, error = %e, "failed to persist paper");
                    let reason = format!("store write failed: {e}");
                    if let Err(mark_err) = self
                        .store()
                        .and_then(|mut store| Ok(store.mark_error(&paper.paper_id, &reason)?))
                    {
                        tracing::warn!(
                            paper_id = %paper.paper_id,
                            error = %mark_err,
                            "could not record paper error; it stays queued"
                        );
                    }
                    progress(PipelineEvent::PaperFailed {
                        paper_id: paper.paper_id.clone(),
                        reason,
                    });
                    summary.papers_errored += 1;
                }
            }
        }

        tracing::info!(
            processed = summary.papers_processed,
            errored = summary.papers_errored,
            citations = summary.citations,
            hallucinated = summary.hallucinated,
            uncertain = summary.uncertain,
            "batch finished"
        );
        Ok(summary)
    }

    /// Run one paper end to end and persist the result.
    pub async fn process_paper(
        &self,
        paper: &PaperRecord,
        progress: &(dyn Fn(PipelineEvent) + Send + Sync),
    ) -> Result<PaperOutcome, CoreError> {
        let extraction = self.extractor.extract(&paper.pdf_path).await;
        if extraction.is_empty() {
            let reason = extraction
                .failure
                .unwrap_or_else(|| "no extractable text".to_string());
            self.store()?.mark_error(&paper.paper_id, &reason)?;
            tracing::warn!(paper_id = %paper.paper_id, reason = %reason, "paper marked as error");
            progress(PipelineEvent::PaperFailed {
                paper_id: paper.paper_id.clone(),
                reason: reason.clone(),
            });
            return Ok(PaperOutcome::Failed(reason));
        }

        let (_, citations) = parse_citations(&extraction.text, &self.segmenter, &self.config);
        let total = citations.len();
        if total == 0 {
            tracing::info!(paper_id = %paper.paper_id, "no reference list found");
        }

        let records: Vec<CitationRecord> = stream::iter(
            citations
                .iter()
                .map(|c| self.check_citation(&paper.paper_id, c, total, progress)),
        )
        .buffered(self.config.citation_concurrency.max(1))
        .collect()
        .await;

        self.store()?.commit_paper(&paper.paper_id, &records)?;

        let flagged = records.iter().filter(|r| r.classification.is_flagged()).count();
        tracing::info!(paper_id = %paper.paper_id, citations = total, flagged, "paper processed");
        progress(PipelineEvent::PaperProcessed {
            paper_id: paper.paper_id.clone(),
            citations: total,
            flagged,
        });
        Ok(PaperOutcome::Processed(records))
    }

    /// Re-queue a paper (processed or not) and run it again.
    ///
    /// Citation ids are derived from reference order, so an unchanged
    /// document yields the same ids.
    pub async fn reprocess(
        &self,
        paper_id: &str,
        progress: &(dyn Fn(PipelineEvent) + Send + Sync),
    ) -> Result<PaperOutcome, CoreError> {
        let paper = {
            let store = self.store()?;
            if !store.requeue(paper_id)? {
                return Err(CoreError::UnknownPaper(paper_id.to_string()));
            }
            store
                .paper(paper_id)?
                .ok_or_else(|| CoreError::UnknownPaper(paper_id.to_string()))?
        };
        self.process_paper(&paper, progress).await
    }

    /// Retry verification and scoring for citations recorded while a service
    /// was unavailable. Rows are updated in place; ids never change.
    pub async fn reverify(
        &self,
        cancel: &CancellationToken,
        progress: &(dyn Fn(PipelineEvent) + Send + Sync),
    ) -> Result<ReverifySummary, CoreError> {
        let candidates = self.store()?.citations_needing_reverify()?;
        let mut summary = ReverifySummary::default();
        tracing::info!(citations = candidates.len(), "starting re-verification");

        for mut record in candidates {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            summary.attempted += 1;

            let query = CitationQuery {
                raw: record.citation_text.clone(),
                title: Some(record.title_cited.clone()).filter(|t| !t.is_empty()),
                year: record.citation_year,
            };
            let sample = record
                .context_sentence
                .clone()
                .unwrap_or_else(|| record.citation_text.clone());
            let (verify, score) =
                tokio::join!(self.authority.verify(&query), self.detector.score(&sample));
            apply_outcomes(&mut record, &verify, &score, &self.config.policy);

            let resolved = record.failure_reason.is_none();
            if resolved {
                summary.resolved += 1;
            } else {
                summary.still_unavailable += 1;
            }
            self.store()?.update_citation(&record)?;
            progress(PipelineEvent::CitationReverified {
                citation_id: record.citation_id.clone(),
                classification: record.classification,
                resolved,
            });
        }
        Ok(summary)
    }

    async fn check_citation(
        &self,
        paper_id: &str,
        citation: &ParsedCitation,
        total: usize,
        progress: &(dyn Fn(PipelineEvent) + Send + Sync),
    ) -> CitationRecord {
        let query = citation.query();
        let (verify, score) = tokio::join!(
            self.authority.verify(&query),
            self.detector.score(citation.sample())
        );

        let mut record = CitationRecord {
            citation_id: citation_id(paper_id, citation.seq),
            paper_id: paper_id.to_string(),
            seq: citation.seq,
            citation_text: citation.text.clone(),
            citation_year: citation.year,
            authors_cited: citation.authors.clone().unwrap_or_default(),
            title_cited: citation.title.clone().unwrap_or_default(),
            classification: Classification::Uncertain,
            verification_method: VerificationMethod::CrossRef,
            crossref_score: None,
            gptzero_score: None,
            section_location: citation.section.clone(),
            context_sentence: citation.context.clone(),
            matched_title: None,
            title_similarity: None,
            matched_doi: None,
            failure_reason: None,
        };
        apply_outcomes(&mut record, &verify, &score, &self.config.policy);

        if let Some(reason) = &record.failure_reason {
            tracing::warn!(citation_id = %record.citation_id, reason = %reason, "citation check incomplete");
        }
        tracing::debug!(
            citation_id = %record.citation_id,
            classification = %record.classification,
            "citation checked"
        );
        progress(PipelineEvent::CitationChecked {
            paper_id: paper_id.to_string(),
            seq: citation.seq,
            total,
            classification: record.classification,
        });
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verify::BibMatch;

    #[test]
    fn apply_outcomes_fills_match_fields() {
        let mut record = CitationRecord {
            citation_id: "P_C001".into(),
            paper_id: "P".into(),
            seq: 1,
            citation_text: "x".into(),
            citation_year: None,
            authors_cited: String::new(),
            title_cited: String::new(),
            classification: Classification::Uncertain,
            verification_method: VerificationMethod::CrossRef,
            crossref_score: None,
            gptzero_score: None,
            section_location: None,
            context_sentence: None,
            matched_title: None,
            title_similarity: None,
            matched_doi: None,
            failure_reason: Some("old".into()),
        };
        let verify = VerifyOutcome::Match(BibMatch {
            title: "Found".into(),
            relevance: 55.0,
            similarity: Some(0.9),
            doi: Some("10.1000/found".into()),
        });
        apply_outcomes(
            &mut record,
            &verify,
            &ScoreOutcome::Probability(0.1),
            &ClassificationPolicy::default(),
        );
        assert_eq!(record.classification, Classification::Real);
        assert_eq!(record.crossref_score, Some(55.0));
        assert_eq!(record.matched_title.as_deref(), Some("Found"));
        assert_eq!(record.title_similarity, Some(0.9));
        assert_eq!(record.matched_doi.as_deref(), Some("10.1000/found"));
        assert_eq!(record.gptzero_score, Some(0.1));
        assert_eq!(record.verification_method, VerificationMethod::CrossRef);
        assert!(record.failure_reason.is_none());
    }

    #[test]
    fn parse_citations_annotates_usage() {
        let text = "Paper title\n\n1 Introduction\n\nTransformers [1] replaced recurrence.\n\n\
                    2 Methods\n\nWe fine-tune BERT [2].\n\nReferences\n\n\
                    [1] A. Vaswani, N. Shazeer. Attention is all you need. NeurIPS, 2017.\n\n\
                    [2] J. Devlin, M. Chang. BERT: Pre-training of deep bidirectional transformers. NAACL, 2019.\n";
        let config = Config::default();
        let segmenter = SectionSegmenter::new(&config.parsing.resolved_section_patterns());
        let (sections, citations) = parse_citations(text, &segmenter, &config);

        assert!(sections.get("introduction").is_some());
        assert_eq!(citations.len(), 2);
        assert_eq!(citations[0].seq, 1);
        assert_eq!(citations[0].year, Some(2017));
        assert_eq!(citations[0].section.as_deref(), Some("introduction"));
        assert_eq!(
            citations[0].context.as_deref(),
            Some("Transformers [1] replaced recurrence.")
        );
        assert_eq!(citations[1].section.as_deref(), Some("methods"));
        assert_eq!(citations[1].year, Some(2019));
    }
}
