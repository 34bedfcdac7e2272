//! Import a metadata CSV into an on-disk store, record results, export.

use std::fs;

use hallucitation_core::{
    CitationRecord, Classification, PaperStatus, Store, VerificationMethod, citation_id,
};
use hallucitation_reporting::export::{CITATIONS_FILE, CODING_FILE, PAPER_METADATA_FILE};
use hallucitation_reporting::{ImportOptions, export_all, import_metadata};

const METADATA: &str = "\
Paper_ID,Domain_Category,Venue,Publication_Year,Title,Authors,Processing_Status
P0001,NLP/Language Models,ACL,2023,Paper One,Doe,pending
P0002,Quantum Basket Weaving,Nowhere,2022,Paper Two,Roe,
";

fn record(paper_id: &str, seq: usize, classification: Classification) -> CitationRecord {
    CitationRecord {
        citation_id: citation_id(paper_id, seq),
        paper_id: paper_id.into(),
        seq,
        citation_text: format!("Reference number {seq}."),
        citation_year: Some(2020),
        authors_cited: String::new(),
        title_cited: String::new(),
        classification,
        verification_method: VerificationMethod::CrossRef,
        crossref_score: Some(42.0),
        gptzero_score: Some(0.2),
        section_location: None,
        context_sentence: None,
        matched_title: Some(format!("Reference number {seq}")),
        title_similarity: Some(1.0),
        matched_doi: Some(format!("10.1000/ref.{seq}")),
        failure_reason: None,
    }
}

#[test]
fn import_then_export() {
    let dir = tempfile::tempdir().unwrap();
    let csv_path = dir.path().join("paper_metadata.csv");
    fs::write(&csv_path, METADATA).unwrap();
    let mut store = Store::open(&dir.path().join("db/results.sqlite")).unwrap();

    let summary = import_metadata(&store, &csv_path, &ImportOptions::new(dir.path())).unwrap();
    assert_eq!(summary.added, 2);
    assert_eq!(summary.unknown_domains, vec!["Quantum Basket Weaving".to_string()]);

    store
        .commit_paper(
            "P0001",
            &[
                record("P0001", 1, Classification::Real),
                record("P0001", 2, Classification::Hallucinated),
            ],
        )
        .unwrap();
    store.mark_error("P0002", "file not found").unwrap();

    let out = dir.path().join("out");
    let exported = export_all(&store, &out).unwrap();
    assert_eq!(exported.files.len(), 3);
    assert_eq!(exported.citations, 2);
    assert_eq!(exported.coding_rows, 1);

    let papers = fs::read_to_string(out.join(PAPER_METADATA_FILE)).unwrap();
    assert!(papers.contains("P0001,NLP/Language Models,ACL,2023,Paper One,Doe,processed,"));
    assert!(papers.contains(",error,"));
    assert!(papers.trim_end().ends_with("file not found"));

    let citations = fs::read_to_string(out.join(CITATIONS_FILE)).unwrap();
    assert_eq!(citations.lines().count(), 3);
    assert!(citations.contains("P0001_C002,P0001,Reference number 2.,2020,,,1,CrossRef,42,0.2,"));
    assert!(citations.contains(",Reference number 2,1.000,10.1000/ref.2,"));

    let coding = fs::read_to_string(out.join(CODING_FILE)).unwrap();
    assert_eq!(coding.lines().nth(1), Some("P0001_C002,P0001,,,,,,,,"));
}

#[test]
fn reimport_never_downgrades_status() {
    let dir = tempfile::tempdir().unwrap();
    let csv_path = dir.path().join("meta.csv");
    fs::write(&csv_path, METADATA).unwrap();
    let mut store = Store::open(&dir.path().join("results.sqlite")).unwrap();
    let options = ImportOptions::new(dir.path());

    import_metadata(&store, &csv_path, &options).unwrap();
    store.commit_paper("P0001", &[]).unwrap();

    let summary = import_metadata(&store, &csv_path, &options).unwrap();
    assert_eq!(summary.added, 0);
    assert_eq!(summary.refreshed, 2);
    assert_eq!(
        store.paper("P0001").unwrap().unwrap().status,
        PaperStatus::Processed
    );
}
