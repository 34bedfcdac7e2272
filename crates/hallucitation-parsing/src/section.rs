//! Structural section detection.
//!
//! Each section is described by a heading alternation (e.g.
//! `related work|literature review|background`). The segmenter anchors every
//! alternation at a line start, optionally preceded by a numeric heading
//! marker such as `2`, `2.` or `3.1`, and matches case-insensitively. Only the
//! first match of each pattern is recorded.

use regex::Regex;
use serde::{Deserialize, Serialize};

/// A named heading pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionPattern {
    pub name: String,
    /// Regex alternation for the heading text, without the line-start anchor.
    pub pattern: String,
}

impl SectionPattern {
    pub fn new(name: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pattern: pattern.into(),
        }
    }
}

/// The built-in heading table.
pub fn default_section_patterns() -> Vec<SectionPattern> {
    vec![
        SectionPattern::new("introduction", "introduction"),
        SectionPattern::new(
            "related_work",
            "related work|literature review|background",
        ),
        SectionPattern::new(
            "methods",
            "methods?|methodology|approach|model|algorithm",
        ),
        SectionPattern::new("results", "results?|experiments?|evaluation"),
        SectionPattern::new("discussion", "discussion|conclusion|future work"),
    ]
}

/// One detected section start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionEntry {
    pub name: String,
    /// Byte offset of the heading in the source text.
    pub start: usize,
}

/// Sections found in one paper, ordered by offset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SectionMap {
    entries: Vec<SectionEntry>,
}

impl SectionMap {
    /// Build a map from unordered entries.
    pub fn from_entries(mut entries: Vec<SectionEntry>) -> Self {
        // Stable: ties keep pattern order.
        entries.sort_by_key(|e| e.start);
        Self { entries }
    }

    pub fn entries(&self) -> &[SectionEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Start offset of a named section, if it was found.
    pub fn get(&self, name: &str) -> Option<usize> {
        self.entries.iter().find(|e| e.name == name).map(|e| e.start)
    }

    /// Name of the nearest section starting at or before `offset`.
    pub fn section_at(&self, offset: usize) -> Option<&str> {
        self.entries
            .iter()
            .take_while(|e| e.start <= offset)
            .last()
            .map(|e| e.name.as_str())
    }
}

/// Compiled heading table.
///
/// A pattern that fails to compile is kept as a dead entry: its section is
/// never found, and the rest of the table keeps working.
#[derive(Debug, Clone)]
pub struct SectionSegmenter {
    compiled: Vec<(String, Option<Regex>)>,
}

impl Default for SectionSegmenter {
    fn default() -> Self {
        Self::new(&default_section_patterns())
    }
}

impl SectionSegmenter {
    pub fn new(patterns: &[SectionPattern]) -> Self {
        let compiled = patterns
            .iter()
            .map(|p| {
                let re = match compile_heading(&p.pattern) {
                    Ok(re) => Some(re),
                    Err(e) => {
                        tracing::warn!(section = %p.name, error = %e, "invalid section pattern, section will never match");
                        None
                    }
                };
                (p.name.clone(), re)
            })
            .collect();
        Self { compiled }
    }

    /// Names of patterns that failed to compile.
    pub fn invalid_patterns(&self) -> Vec<&str> {
        self.compiled
            .iter()
            .filter(|(_, re)| re.is_none())
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Locate every configured section in `text`.
    pub fn segment(&self, text: &str) -> SectionMap {
        let mut entries = Vec::new();
        for (name, re) in &self.compiled {
            let Some(re) = re else { continue };
            if entries.iter().any(|e: &SectionEntry| &e.name == name) {
                continue;
            }
            if let Some(start) = re
                .captures(text)
                .and_then(|caps| caps.name("heading"))
                .map(|m| m.start())
            {
                entries.push(SectionEntry {
                    name: name.clone(),
                    start,
                });
            }
        }
        SectionMap::from_entries(entries)
    }
}

fn compile_heading(pattern: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!(
        r"(?i)(?:^|\n)[ \t]*(?P<heading>(?:\d+(?:\.\d+)*\.?[ \t]*)?(?:{}))",
        pattern
    ))
}
