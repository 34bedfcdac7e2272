//! Loading the paper-metadata CSV into the store.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use hallucitation_core::{PaperRecord, PaperStatus, Store};

use crate::{ReportError, csv};

/// Broad field buckets a paper's `Domain_Category` is expected to use.
pub const DEFAULT_DOMAINS: &[&str] = &[
    "NLP/Language Models",
    "Computer Vision",
    "Robotics/Embodied AI",
    "ML Theory/Optimization",
    "Reinforcement Learning",
    "Graphs/Networks",
    "Biomedical/Computational Biology",
    "Economics/Finance",
    "Political Science",
    "Sociology",
    "Psychology/Cognitive Science",
    "Other",
];

#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Directory holding `{Paper_ID}.pdf`; relative `Local_PDF_Path` values
    /// are resolved against it too.
    pub pdf_dir: PathBuf,
    /// Known domain categories. Other values are imported but reported.
    pub domains: Vec<String>,
}

impl ImportOptions {
    pub fn new(pdf_dir: impl Into<PathBuf>) -> Self {
        Self {
            pdf_dir: pdf_dir.into(),
            domains: DEFAULT_DOMAINS.iter().map(|d| d.to_string()).collect(),
        }
    }

    /// Replace the domain taxonomy.
    pub fn with_domains<S: AsRef<str>>(mut self, domains: &[S]) -> Self {
        self.domains = domains.iter().map(|d| d.as_ref().to_string()).collect();
        self
    }

    fn pdf_path(&self, paper_id: &str, local: Option<&str>) -> PathBuf {
        match local.map(str::trim).filter(|p| !p.is_empty()) {
            Some(p) if Path::new(p).is_absolute() => PathBuf::from(p),
            Some(p) => self.pdf_dir.join(p),
            None => self.pdf_dir.join(format!("{paper_id}.pdf")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    /// Papers not previously in the store.
    pub added: usize,
    /// Known papers whose metadata was refreshed (status untouched).
    pub refreshed: usize,
    /// Distinct `Domain_Category` values outside the configured list.
    pub unknown_domains: Vec<String>,
}

struct Columns {
    paper_id: usize,
    domain: Option<usize>,
    venue: Option<usize>,
    year: Option<usize>,
    title: Option<usize>,
    authors: Option<usize>,
    status: Option<usize>,
    local_path: Option<usize>,
}

impl Columns {
    fn from_header(header: &[String]) -> Result<Self, ReportError> {
        let find = |name: &str| header.iter().position(|h| h.trim().eq_ignore_ascii_case(name));
        Ok(Self {
            paper_id: find("Paper_ID").ok_or(ReportError::MissingColumn("Paper_ID"))?,
            domain: find("Domain_Category"),
            venue: find("Venue"),
            year: find("Publication_Year"),
            title: find("Title"),
            authors: find("Authors"),
            status: find("Processing_Status"),
            local_path: find("Local_PDF_Path"),
        })
    }
}

fn cell(record: &[String], idx: Option<usize>) -> &str {
    idx.and_then(|i| record.get(i)).map(|s| s.trim()).unwrap_or("")
}

/// Parse metadata CSV content into paper records.
///
/// Rows without a `Paper_ID` and repeated ids are skipped with a warning. An
/// unparseable `Publication_Year` is dropped with a warning; an unknown
/// `Processing_Status` rejects the whole file.
pub fn parse_metadata(content: &str, options: &ImportOptions) -> Result<Vec<PaperRecord>, ReportError> {
    let mut records = csv::parse(content)?.into_iter();
    let Some((_, header)) = records.next() else {
        return Ok(Vec::new());
    };
    let cols = Columns::from_header(&header)?;

    let mut seen = HashSet::new();
    let mut papers = Vec::new();
    for (line, record) in records {
        let paper_id = cell(&record, Some(cols.paper_id));
        if paper_id.is_empty() {
            tracing::warn!(line, "skipping metadata row without Paper_ID");
            continue;
        }
        if !seen.insert(paper_id.to_string()) {
            tracing::warn!(line, paper_id, "duplicate Paper_ID, keeping the first row");
            continue;
        }

        let status = cell(&record, cols.status)
            .parse::<PaperStatus>()
            .map_err(|message| ReportError::Row { line, message })?;
        let year = cell(&record, cols.year);
        let publication_year = if year.is_empty() {
            None
        } else {
            // Spreadsheets tend to write years as "2021.0".
            let parsed = year
                .split('.')
                .next()
                .and_then(|y| y.parse::<u16>().ok());
            if parsed.is_none() {
                tracing::warn!(line, paper_id, year, "ignoring unparseable Publication_Year");
            }
            parsed
        };

        let local = cols.local_path.and_then(|i| record.get(i)).map(String::as_str);
        papers.push(PaperRecord {
            status,
            domain_category: cell(&record, cols.domain).to_string(),
            venue: cell(&record, cols.venue).to_string(),
            publication_year,
            title: cell(&record, cols.title).to_string(),
            authors: cell(&record, cols.authors).to_string(),
            ..PaperRecord::new(paper_id, options.pdf_path(paper_id, local))
        });
    }
    Ok(papers)
}

/// Read `csv_path` and upsert every paper into `store`.
pub fn import_metadata(
    store: &Store,
    csv_path: &Path,
    options: &ImportOptions,
) -> Result<ImportSummary, ReportError> {
    let content = std::fs::read_to_string(csv_path)?;
    let papers = parse_metadata(&content, options)?;

    let mut summary = ImportSummary::default();
    for paper in &papers {
        if !paper.domain_category.is_empty()
            && !options.domains.iter().any(|d| d == &paper.domain_category)
            && !summary.unknown_domains.contains(&paper.domain_category)
        {
            tracing::warn!(domain = %paper.domain_category, "unknown domain category");
            summary.unknown_domains.push(paper.domain_category.clone());
        }
        if store.upsert_paper(paper)? {
            summary.added += 1;
        } else {
            summary.refreshed += 1;
        }
    }
    tracing::info!(
        added = summary.added,
        refreshed = summary.refreshed,
        path = %csv_path.display(),
        "imported paper metadata"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str =
        "Paper_ID,Domain_Category,Venue,Publication_Year,Title,Authors,Processing_Status\n";

    #[test]
    fn default_pdf_path_uses_paper_id() {
        let content = format!("{HEADER}P0001,Computer Vision,CVPR,2023,\"A, B\",Doe,pending\n");
        let papers = parse_metadata(&content, &ImportOptions::new("/data/pdfs")).unwrap();
        assert_eq!(papers.len(), 1);
        let p = &papers[0];
        assert_eq!(p.pdf_path, PathBuf::from("/data/pdfs/P0001.pdf"));
        assert_eq!(p.title, "A, B");
        assert_eq!(p.publication_year, Some(2023));
        assert_eq!(p.status, PaperStatus::Pending);
    }

    #[test]
    fn local_pdf_path_overrides_default() {
        let content = "Paper_ID,Local_PDF_Path\nP1,sub/one.pdf\nP2,/abs/two.pdf\nP3,\n";
        let papers = parse_metadata(content, &ImportOptions::new("pdfs")).unwrap();
        assert_eq!(papers[0].pdf_path, PathBuf::from("pdfs/sub/one.pdf"));
        assert_eq!(papers[1].pdf_path, PathBuf::from("/abs/two.pdf"));
        assert_eq!(papers[2].pdf_path, PathBuf::from("pdfs/P3.pdf"));
    }

    #[test]
    fn spreadsheet_years_and_blank_status() {
        let content = format!("{HEADER}P1,Other,X,2021.0,T,A,\nP2,Other,X,n/a,T,A,Processed\n");
        let papers = parse_metadata(&content, &ImportOptions::new(".")).unwrap();
        assert_eq!(papers[0].publication_year, Some(2021));
        assert_eq!(papers[0].status, PaperStatus::Pending);
        assert_eq!(papers[1].publication_year, None);
        assert_eq!(papers[1].status, PaperStatus::Processed);
    }

    #[test]
    fn missing_paper_id_column_is_rejected() {
        let err = parse_metadata("Title\nfoo\n", &ImportOptions::new(".")).unwrap_err();
        assert!(matches!(err, ReportError::MissingColumn("Paper_ID")));
    }

    #[test]
    fn unknown_status_names_the_line() {
        let content = format!("{HEADER}P1,Other,X,2020,T,A,done\n");
        let err = parse_metadata(&content, &ImportOptions::new(".")).unwrap_err();
        assert!(matches!(err, ReportError::Row { line: 2, .. }));
    }

    #[test]
    fn duplicate_and_blank_ids_are_skipped() {
        let content = format!("{HEADER}P1,Other,A,,,,\n,Other,B,,,,\nP1,Other,C,,,,\n");
        let papers = parse_metadata(&content, &ImportOptions::new(".")).unwrap();
        assert_eq!(papers.len(), 1);
        assert_eq!(papers[0].venue, "A");
    }

    #[test]
    fn custom_taxonomy_changes_unknown_domains() {
        let dir = tempfile::tempdir().unwrap();
        let csv_path = dir.path().join("meta.csv");
        std::fs::write(
            &csv_path,
            format!("{HEADER}P1,Physics,X,2020,T,A,\nP2,Computer Vision,Y,2021,T,A,\n"),
        )
        .unwrap();
        let store = Store::open_in_memory().unwrap();

        let options = ImportOptions::new(dir.path()).with_domains(&["Physics"]);
        let summary = import_metadata(&store, &csv_path, &options).unwrap();
        assert_eq!(summary.added, 2);
        assert_eq!(summary.unknown_domains, vec!["Computer Vision".to_string()]);
    }
}
