use std::io::Write;
use std::path::{Path, PathBuf};

use hallucitation_core::{CitationRecord, CodingRow, PaperRecord, Store};

use crate::{ReportError, csv};

pub const PAPER_METADATA_FILE: &str = "paper_metadata.csv";
pub const CITATIONS_FILE: &str = "citations_extracted.csv";
pub const CODING_FILE: &str = "hallucination_coding.csv";

/// Files written and rows in each.
#[derive(Debug, Clone, Default)]
pub struct ExportSummary {
    pub files: Vec<PathBuf>,
    pub papers: usize,
    pub citations: usize,
    pub coding_rows: usize,
}

/// Write the three result tables into `out_dir`, replacing existing files.
pub fn export_all(store: &Store, out_dir: &Path) -> Result<ExportSummary, ReportError> {
    std::fs::create_dir_all(out_dir)?;
    let papers = store.papers()?;
    let citations = store.citations(None)?;
    let coding = store.coding_rows()?;

    let mut summary = ExportSummary {
        papers: papers.len(),
        citations: citations.len(),
        coding_rows: coding.len(),
        ..ExportSummary::default()
    };
    for (name, content) in [
        (PAPER_METADATA_FILE, paper_metadata_csv(&papers)),
        (CITATIONS_FILE, citations_csv(&citations)),
        (CODING_FILE, coding_csv(&coding)),
    ] {
        let path = out_dir.join(name);
        let mut file = std::fs::File::create(&path)?;
        file.write_all(content.as_bytes())?;
        summary.files.push(path);
    }
    tracing::info!(
        dir = %out_dir.display(),
        papers = summary.papers,
        citations = summary.citations,
        coding_rows = summary.coding_rows,
        "exported tables"
    );
    Ok(summary)
}

fn opt<T: ToString>(v: Option<T>) -> String {
    v.map(|v| v.to_string()).unwrap_or_default()
}

pub fn paper_metadata_csv(papers: &[PaperRecord]) -> String {
    let mut out = String::new();
    csv::write_row(
        &mut out,
        &[
            "Paper_ID",
            "Domain_Category",
            "Venue",
            "Publication_Year",
            "Title",
            "Authors",
            "Processing_Status",
            "Local_PDF_Path",
            "Error_Reason",
        ],
    );
    for p in papers {
        csv::write_row(
            &mut out,
            &[
                p.paper_id.clone(),
                p.domain_category.clone(),
                p.venue.clone(),
                opt(p.publication_year),
                p.title.clone(),
                p.authors.clone(),
                p.status.to_string(),
                p.pdf_path.display().to_string(),
                opt(p.error_reason.as_deref()),
            ],
        );
    }
    out
}

pub fn citations_csv(citations: &[CitationRecord]) -> String {
    let mut out = String::new();
    csv::write_row(
        &mut out,
        &[
            "Citation_ID",
            "Paper_ID",
            "Citation_Text",
            "Citation_Year",
            "Authors_Cited",
            "Title_Cited",
            "Is_Hallucinated",
            "Verification_Method",
            "CrossRef_Score",
            "GPTZero_Score",
            "Section_Location_Auto",
            "Context_Sentence",
            "Matched_Title",
            "Title_Similarity",
            "Matched_DOI",
            "Failure_Reason",
        ],
    );
    for c in citations {
        csv::write_row(
            &mut out,
            &[
                c.citation_id.clone(),
                c.paper_id.clone(),
                c.citation_text.clone(),
                opt(c.citation_year),
                c.authors_cited.clone(),
                c.title_cited.clone(),
                c.classification.code().to_string(),
                c.verification_method.as_str().to_string(),
                opt(c.crossref_score),
                opt(c.gptzero_score),
                opt(c.section_location.as_deref()),
                opt(c.context_sentence.as_deref()),
                opt(c.matched_title.as_deref()),
                c.title_similarity.map(|s| format!("{s:.3}")).unwrap_or_default(),
                opt(c.matched_doi.as_deref()),
                opt(c.failure_reason.as_deref()),
            ],
        );
    }
    out
}

pub fn coding_csv(rows: &[CodingRow]) -> String {
    let mut out = String::new();
    csv::write_row(
        &mut out,
        &[
            "Citation_ID",
            "Paper_ID",
            "Citation_Domain",
            "Citation_Role",
            "Distance_from_Paper",
            "Recency_Category",
            "Temporal_Distance",
            "Notes",
            "Coding_Time_Minutes",
            "Coder_ID",
        ],
    );
    for r in rows {
        csv::write_row(
            &mut out,
            &[
                &r.citation_id,
                &r.paper_id,
                &r.citation_domain,
                &r.citation_role,
                &r.distance_from_paper,
                &r.recency_category,
                &r.temporal_distance,
                &r.notes,
                &r.coding_time_minutes,
                &r.coder_id,
            ],
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use hallucitation_core::{Classification, PaperStatus, VerificationMethod};

    fn citation() -> CitationRecord {
        CitationRecord {
            citation_id: "P1_C001".into(),
            paper_id: "P1".into(),
            seq: 1,
            citation_text: "A. Author. Some title, with comma. 2020.".into(),
            citation_year: Some(2020),
            authors_cited: "A. Author".into(),
            title_cited: "Some title, with comma".into(),
            classification: Classification::Uncertain,
            verification_method: VerificationMethod::CrossRef,
            crossref_score: None,
            gptzero_score: Some(0.75),
            section_location: Some("introduction".into()),
            context_sentence: Some("As shown in [1].".into()),
            matched_title: None,
            title_similarity: None,
            matched_doi: None,
            failure_reason: Some("CrossRef: HTTP 503".into()),
        }
    }

    #[test]
    fn citation_rows_follow_header() {
        let out = citations_csv(&[citation()]);
        let records = csv::parse(&out).unwrap();
        assert_eq!(records.len(), 2);
        let (header, row) = (&records[0].1, &records[1].1);
        assert_eq!(header.len(), row.len());
        let col = |name: &str| &row[header.iter().position(|h| h == name).unwrap()];
        assert_eq!(col("Is_Hallucinated"), "-1");
        assert_eq!(col("Verification_Method"), "CrossRef");
        assert_eq!(col("Matched_DOI"), "");
        assert_eq!(col("CrossRef_Score"), "");
        assert_eq!(col("GPTZero_Score"), "0.75");
        assert_eq!(col("Title_Cited"), "Some title, with comma");
        assert_eq!(col("Failure_Reason"), "CrossRef: HTTP 503");
    }

    #[test]
    fn paper_rows_carry_status_and_reason() {
        let mut paper = PaperRecord::new("P1", "pdfs/P1.pdf");
        paper.status = PaperStatus::Error;
        paper.error_reason = Some("no extractable text".into());
        let out = paper_metadata_csv(&[paper]);
        let records = csv::parse(&out).unwrap();
        assert_eq!(records[1].1[6], "error");
        assert_eq!(records[1].1[8], "no extractable text");
    }

    #[test]
    fn coding_rows_start_empty() {
        let row = CodingRow {
            citation_id: "P1_C001".into(),
            paper_id: "P1".into(),
            ..CodingRow::default()
        };
        let out = coding_csv(&[row]);
        assert!(out.ends_with("P1_C001,P1,,,,,,,,\n"));
    }
}
