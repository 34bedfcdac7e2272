//! Tabular input and output for the pipeline's store.
//!
//! The paper-metadata CSV is the only input; the three research tables
//! (`paper_metadata.csv`, `citations_extracted.csv`, `hallucination_coding.csv`)
//! are regenerated from the store on every export.

pub mod csv;
pub mod export;
pub mod import;

use thiserror::Error;

pub use export::{ExportSummary, export_all};
pub use import::{ImportOptions, ImportSummary, import_metadata, parse_metadata};

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store error: {0}")]
    Store(#[from] hallucitation_core::StoreError),
    #[error("malformed CSV at line {line}: {message}")]
    Csv { line: usize, message: String },
    #[error("required column '{0}' is missing")]
    MissingColumn(&'static str),
    #[error("row {line}: {message}")]
    Row { line: usize, message: String },
}
