//! Text-level parsing for the citation pipeline.
//!
//! Everything here is pure: it takes extracted plain text and returns
//! best-effort structure (section offsets, reference strings, years, titles,
//! in-text usages). Nothing in this crate performs I/O, and nothing here
//! fails on malformed input: a bad reference list yields garbage strings,
//! never an error.

pub mod config;
pub mod context;
pub mod references;
pub mod section;
pub mod title;
pub mod year;

pub use config::{ListOverride, ParsingConfig};
pub use context::{Usage, locate_usage, sentence_around};
pub use references::{ReferenceRegion, find_references_section, split_references};
pub use section::{SectionEntry, SectionMap, SectionPattern, SectionSegmenter};
pub use title::{CitationParts, split_citation};
pub use year::{YearWindow, extract_year};

/// Everything the pipeline needs from one paper's text, computed in one pass.
#[derive(Debug, Clone, Default)]
pub struct ParsedPaper {
    pub sections: SectionMap,
    /// Byte offset where the reference region starts. Text before it is the body.
    pub body_end: usize,
    pub references: Vec<String>,
}

/// Segment a paper and split its reference list.
///
/// When no reference region can be located the body is the whole text and
/// `references` is empty.
pub fn parse_paper(text: &str, segmenter: &SectionSegmenter, config: &ParsingConfig) -> ParsedPaper {
    let sections = segmenter.segment(text);
    match references::find_references_section_with(text, config.fallback_fraction) {
        Some(region) => ParsedPaper {
            sections,
            body_end: region.start,
            references: split_references(&region.text),
        },
        None => ParsedPaper {
            sections,
            body_end: text.len(),
            references: Vec::new(),
        },
    }
}
