//! Durable, resumable output store.
//!
//! A single SQLite database holds the paper table, the citation table and the
//! manual-coding skeleton. A paper's citation rows, its coding rows and its
//! `processed` status flip are written in one transaction, so a crash can
//! never leave a processed paper with missing rows.

use std::path::{Path, PathBuf};

use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use thiserror::Error;

use crate::{CitationRecord, Classification, PaperRecord, PaperStatus};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unknown paper '{0}'")]
    UnknownPaper(String),
}

/// Blank manual-coding row for a flagged citation. The pipeline only ever
/// creates these; coders fill them in downstream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodingRow {
    pub citation_id: String,
    pub paper_id: String,
    pub citation_domain: String,
    pub citation_role: String,
    pub distance_from_paper: String,
    pub recency_category: String,
    pub temporal_distance: String,
    pub notes: String,
    pub coding_time_minutes: String,
    pub coder_id: String,
}

/// Paper and citation totals.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub pending: usize,
    pub processed: usize,
    pub error: usize,
    pub citations: usize,
    pub real: usize,
    pub hallucinated: usize,
    pub uncertain: usize,
    /// Citations still carrying a service failure reason.
    pub awaiting_reverify: usize,
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS papers (
    paper_id         TEXT PRIMARY KEY,
    pdf_path         TEXT NOT NULL,
    status           TEXT NOT NULL DEFAULT 'pending',
    error_reason     TEXT,
    domain_category  TEXT NOT NULL DEFAULT '',
    venue            TEXT NOT NULL DEFAULT '',
    publication_year INTEGER,
    title            TEXT NOT NULL DEFAULT '',
    authors          TEXT NOT NULL DEFAULT ''
);
CREATE TABLE IF NOT EXISTS citations (
    citation_id         TEXT PRIMARY KEY,
    paper_id            TEXT NOT NULL REFERENCES papers(paper_id),
    seq                 INTEGER NOT NULL,
    citation_text       TEXT NOT NULL,
    citation_year       INTEGER,
    authors_cited       TEXT NOT NULL DEFAULT '',
    title_cited         TEXT NOT NULL DEFAULT '',
    is_hallucinated     INTEGER NOT NULL,
    verification_method TEXT NOT NULL,
    crossref_score      REAL,
    gptzero_score       REAL,
    section_location    TEXT,
    context_sentence    TEXT,
    matched_title       TEXT,
    title_similarity    REAL,
    matched_doi         TEXT,
    failure_reason      TEXT
);
CREATE INDEX IF NOT EXISTS idx_citations_paper ON citations(paper_id, seq);
CREATE TABLE IF NOT EXISTS hallucination_coding (
    citation_id         TEXT PRIMARY KEY,
    paper_id            TEXT NOT NULL,
    citation_domain     TEXT NOT NULL DEFAULT '',
    citation_role       TEXT NOT NULL DEFAULT '',
    distance_from_paper TEXT NOT NULL DEFAULT '',
    recency_category    TEXT NOT NULL DEFAULT '',
    temporal_distance   TEXT NOT NULL DEFAULT '',
    notes               TEXT NOT NULL DEFAULT '',
    coding_time_minutes TEXT NOT NULL DEFAULT '',
    coder_id            TEXT NOT NULL DEFAULT ''
);
";

const PAPER_COLUMNS: &str = "paper_id, pdf_path, status, error_reason, domain_category, venue, \
                             publication_year, title, authors";

const CITATION_COLUMNS: &str = "citation_id, paper_id, seq, citation_text, citation_year, \
                                authors_cited, title_cited, is_hallucinated, verification_method, \
                                crossref_score, gptzero_score, section_location, context_sentence, \
                                matched_title, title_similarity, matched_doi, failure_reason";

fn conversion_error(idx: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, msg.into())
}

fn paper_from_row(row: &Row<'_>) -> rusqlite::Result<PaperRecord> {
    let status: String = row.get(2)?;
    let pdf_path: String = row.get(1)?;
    Ok(PaperRecord {
        paper_id: row.get(0)?,
        pdf_path: PathBuf::from(pdf_path),
        status: status.parse().map_err(|e| conversion_error(2, e))?,
        error_reason: row.get(3)?,
        domain_category: row.get(4)?,
        venue: row.get(5)?,
        publication_year: row.get(6)?,
        title: row.get(7)?,
        authors: row.get(8)?,
    })
}

fn citation_from_row(row: &Row<'_>) -> rusqlite::Result<CitationRecord> {
    let code: i64 = row.get(7)?;
    let method: String = row.get(8)?;
    Ok(CitationRecord {
        citation_id: row.get(0)?,
        paper_id: row.get(1)?,
        seq: row.get(2)?,
        citation_text: row.get(3)?,
        citation_year: row.get(4)?,
        authors_cited: row.get(5)?,
        title_cited: row.get(6)?,
        classification: Classification::from_code(code)
            .ok_or_else(|| conversion_error(7, format!("invalid Is_Hallucinated code {code}")))?,
        verification_method: method.parse().map_err(|e| conversion_error(8, e))?,
        crossref_score: row.get(9)?,
        gptzero_score: row.get(10)?,
        section_location: row.get(11)?,
        context_sentence: row.get(12)?,
        matched_title: row.get(13)?,
        title_similarity: row.get(14)?,
        matched_doi: row.get(15)?,
        failure_reason: row.get(16)?,
    })
}

fn insert_coding_skeleton(conn: &Connection, c: &CitationRecord) -> rusqlite::Result<usize> {
    conn.execute(
        "INSERT OR IGNORE INTO hallucination_coding (citation_id, paper_id) VALUES (?1, ?2)",
        params![c.citation_id, c.paper_id],
    )
}

/// SQLite-backed store for papers, citations and coding rows.
pub struct Store {
    conn: Connection,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("path", &self.conn.path())
            .finish()
    }
}

impl Store {
    /// Open (creating if needed) the store at `path` with WAL mode.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Insert a paper, or refresh the metadata of a known one.
    ///
    /// The status of a known paper is never touched. Returns `true` when the
    /// paper was new.
    pub fn upsert_paper(&self, paper: &PaperRecord) -> Result<bool, StoreError> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO papers (paper_id, pdf_path, status, error_reason, domain_category,
                                           venue, publication_year, title, authors)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                paper.paper_id,
                paper.pdf_path.to_string_lossy(),
                paper.status.as_str(),
                paper.error_reason,
                paper.domain_category,
                paper.venue,
                paper.publication_year,
                paper.title,
                paper.authors,
            ],
        )?;
        if inserted == 0 {
            self.conn.execute(
                "UPDATE papers SET pdf_path = ?2, domain_category = ?3, venue = ?4,
                                   publication_year = ?5, title = ?6, authors = ?7
                 WHERE paper_id = ?1",
                params![
                    paper.paper_id,
                    paper.pdf_path.to_string_lossy(),
                    paper.domain_category,
                    paper.venue,
                    paper.publication_year,
                    paper.title,
                    paper.authors,
                ],
            )?;
        }
        Ok(inserted > 0)
    }

    pub fn paper(&self, paper_id: &str) -> Result<Option<PaperRecord>, StoreError> {
        let sql = format!("SELECT {PAPER_COLUMNS} FROM papers WHERE paper_id = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![paper_id], paper_from_row)
            .optional()?)
    }

    /// All papers ordered by id.
    pub fn papers(&self) -> Result<Vec<PaperRecord>, StoreError> {
        let sql = format!("SELECT {PAPER_COLUMNS} FROM papers ORDER BY paper_id");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], paper_from_row)?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    /// Papers still to be attempted (`pending` or `error`), ordered by id.
    pub fn pending_papers(&self, limit: Option<usize>) -> Result<Vec<PaperRecord>, StoreError> {
        let sql = format!(
            "SELECT {PAPER_COLUMNS} FROM papers WHERE status IN ('pending', 'error')
             ORDER BY paper_id LIMIT ?1"
        );
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![limit], paper_from_row)?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    /// Write a paper's citations and coding skeleton and mark it processed,
    /// all in one transaction.
    ///
    /// Previous citation rows of the paper are replaced; coding rows are only
    /// ever added.
    pub fn commit_paper(
        &mut self,
        paper_id: &str,
        citations: &[CitationRecord],
    ) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        let updated = tx.execute(
            "UPDATE papers SET status = 'processed', error_reason = NULL WHERE paper_id = ?1",
            params![paper_id],
        )?;
        if updated == 0 {
            return Err(StoreError::UnknownPaper(paper_id.to_string()));
        }
        tx.execute("DELETE FROM citations WHERE paper_id = ?1", params![paper_id])?;
        {
            let sql = format!(
                "INSERT INTO citations ({CITATION_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)"
            );
            let mut stmt = tx.prepare(&sql)?;
            for c in citations {
                stmt.execute(params![
                    c.citation_id,
                    c.paper_id,
                    c.seq,
                    c.citation_text,
                    c.citation_year,
                    c.authors_cited,
                    c.title_cited,
                    c.classification.code(),
                    c.verification_method.as_str(),
                    c.crossref_score,
                    c.gptzero_score,
                    c.section_location,
                    c.context_sentence,
                    c.matched_title,
                    c.title_similarity,
                    c.matched_doi,
                    c.failure_reason,
                ])?;
                if c.classification.is_flagged() {
                    insert_coding_skeleton(&tx, c)?;
                }
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Mark a paper as failed and drop any citation rows left from an
    /// earlier run, in one transaction. Processed papers are left alone.
    pub fn mark_error(&mut self, paper_id: &str, reason: &str) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        let updated = tx.execute(
            "UPDATE papers SET status = 'error', error_reason = ?2
             WHERE paper_id = ?1 AND status != 'processed'",
            params![paper_id, reason],
        )?;
        if updated == 0 {
            let known: Option<i64> = tx
                .query_row(
                    "SELECT 1 FROM papers WHERE paper_id = ?1",
                    params![paper_id],
                    |row| row.get(0),
                )
                .optional()?;
            if known.is_none() {
                return Err(StoreError::UnknownPaper(paper_id.to_string()));
            }
        } else {
            tx.execute("DELETE FROM citations WHERE paper_id = ?1", params![paper_id])?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Reset a paper to `pending`. Returns `false` for an unknown paper.
    pub fn requeue(&self, paper_id: &str) -> Result<bool, StoreError> {
        let updated = self.conn.execute(
            "UPDATE papers SET status = 'pending', error_reason = NULL WHERE paper_id = ?1",
            params![paper_id],
        )?;
        Ok(updated > 0)
    }

    /// Reset every errored paper to `pending`. Returns how many were reset.
    pub fn requeue_errors(&self) -> Result<usize, StoreError> {
        Ok(self.conn.execute(
            "UPDATE papers SET status = 'pending', error_reason = NULL WHERE status = 'error'",
            [],
        )?)
    }

    /// Citations ordered by paper and position, optionally for one paper only.
    pub fn citations(&self, paper_id: Option<&str>) -> Result<Vec<CitationRecord>, StoreError> {
        let sql = format!(
            "SELECT {CITATION_COLUMNS} FROM citations
             WHERE ?1 IS NULL OR paper_id = ?1 ORDER BY paper_id, seq"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![paper_id], citation_from_row)?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    /// Citations recorded while a service was unavailable.
    pub fn citations_needing_reverify(&self) -> Result<Vec<CitationRecord>, StoreError> {
        let sql = format!(
            "SELECT {CITATION_COLUMNS} FROM citations
             WHERE failure_reason IS NOT NULL ORDER BY paper_id, seq"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], citation_from_row)?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    /// Overwrite the verification fields of one citation in place.
    pub fn update_citation(&mut self, c: &CitationRecord) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "UPDATE citations SET is_hallucinated = ?2, verification_method = ?3,
                                  crossref_score = ?4, gptzero_score = ?5, matched_title = ?6,
                                  title_similarity = ?7, matched_doi = ?8, failure_reason = ?9
             WHERE citation_id = ?1",
            params![
                c.citation_id,
                c.classification.code(),
                c.verification_method.as_str(),
                c.crossref_score,
                c.gptzero_score,
                c.matched_title,
                c.title_similarity,
                c.matched_doi,
                c.failure_reason,
            ],
        )?;
        if c.classification.is_flagged() {
            insert_coding_skeleton(&tx, c)?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn coding_rows(&self) -> Result<Vec<CodingRow>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT citation_id, paper_id, citation_domain, citation_role, distance_from_paper,
                    recency_category, temporal_distance, notes, coding_time_minutes, coder_id
             FROM hallucination_coding ORDER BY citation_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(CodingRow {
                citation_id: row.get(0)?,
                paper_id: row.get(1)?,
                citation_domain: row.get(2)?,
                citation_role: row.get(3)?,
                distance_from_paper: row.get(4)?,
                recency_category: row.get(5)?,
                temporal_distance: row.get(6)?,
                notes: row.get(7)?,
                coding_time_minutes: row.get(8)?,
                coder_id: row.get(9)?,
            })
        })?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    pub fn counts(&self) -> Result<StatusCounts, StoreError> {
        let mut counts = StatusCounts::default();
        let mut stmt = self
            .conn
            .prepare("SELECT status, COUNT(*) FROM papers GROUP BY status")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, usize>(1)?)))?;
        for row in rows {
            let (status, n) = row?;
            match status.parse::<PaperStatus>() {
                Ok(PaperStatus::Pending) => counts.pending = n,
                Ok(PaperStatus::Processed) => counts.processed = n,
                Ok(PaperStatus::Error) => counts.error = n,
                Err(e) => tracing::warn!(error = %e, "unexpected status in store"),
            }
        }

        let mut stmt = self
            .conn
            .prepare("SELECT is_hallucinated, COUNT(*) FROM citations GROUP BY is_hallucinated")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, usize>(1)?)))?;
        for row in rows {
            let (code, n) = row?;
            counts.citations += n;
            match Classification::from_code(code) {
                Some(Classification::Real) => counts.real = n,
                Some(Classification::Hallucinated) => counts.hallucinated = n,
                Some(Classification::Uncertain) => counts.uncertain = n,
                None => {}
            }
        }

        counts.awaiting_reverify = self.conn.query_row(
            "SELECT COUNT(*) FROM citations WHERE failure_reason IS NOT NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(counts)
    }
}
