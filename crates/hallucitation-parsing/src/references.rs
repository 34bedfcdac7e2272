//! Reference-list isolation and splitting.

use once_cell::sync::Lazy;
use regex::Regex;

/// The bibliography part of a paper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceRegion {
    /// Byte offset in the source text where the region (including its heading) starts.
    pub start: usize,
    /// Region text after the heading, up to the first end marker.
    pub text: String,
}

/// Locate the references section using the default settings (no fallback).
pub fn find_references_section(text: &str) -> Option<ReferenceRegion> {
    find_references_section_with(text, None)
}

/// Locate the references section.
///
/// Uses the LAST "References" / "Bibliography" / "Works Cited" heading, since
/// tables and running text sometimes contain the word earlier. The region ends
/// at the first appendix-like marker after the heading. If no heading exists
/// and `fallback_fraction` is set, the document tail starting at that fraction
/// is returned instead.
pub fn find_references_section_with(
    text: &str,
    fallback_fraction: Option<f64>,
) -> Option<ReferenceRegion> {
    static HEADER_RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(
            r"(?i)(?:^|\n)[ \t]*(?:\d+\.?[ \t]*)?(?:References|Bibliography|Works\s+Cited|Literature\s+Cited)[ \t]*(?:\r?\n|$)",
        )
        .unwrap()
    });

    // Appendix must be followed by whitespace+label or end of line, not a colon
    // ("Artifact Appendix: ..." inside a reference is not a section end).
    static END_RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?i)\n[ \t]*(?:[A-Z]\.?[ \t]+)?(?:Appendix(?:[ \t]+[A-Z0-9]|[ \t]*\n|[ \t]*$)|Appendices|Acknowledg(?:e)?ments|Supplementary\s+Material|Ethics\s+Statement|Broader\s+Impact|(?:\w+\s+)?(?:Paper\s+)?Checklist)")
            .unwrap()
    });

    if let Some(m) = HEADER_RE.find_iter(text).last() {
        let rest = &text[m.end()..];
        let end = END_RE.find(rest).map(|e| e.start()).unwrap_or(rest.len());
        let section = &rest[..end];
        if !section.trim().is_empty() {
            // Skip the leading newline the heading regex consumed.
            let start = if text[m.start()..].starts_with('\n') {
                m.start() + 1
            } else {
                m.start()
            };
            return Some(ReferenceRegion {
                start,
                text: section.to_string(),
            });
        }
    }

    let fraction = fallback_fraction?;
    if !(0.0..1.0).contains(&fraction) || text.trim().is_empty() {
        return None;
    }
    let cutoff = (text.len() as f64 * fraction) as usize;
    // Don't split in the middle of a UTF-8 codepoint
    let cutoff = text
        .char_indices()
        .map(|(i, _)| i)
        .find(|&i| i >= cutoff)
        .unwrap_or(text.len());
    Some(ReferenceRegion {
        start: cutoff,
        text: text[cutoff..].to_string(),
    })
}

/// Split a reference region into individual citation strings.
///
/// Blank-line-delimited blocks are tried first; more than three blocks is
/// taken as a one-reference-per-block list. Otherwise every non-blank line is
/// one reference. Merged or split citations are possible; callers must
/// tolerate garbage strings.
pub fn split_references(raw_text: &str) -> Vec<String> {
    static BLANK_LINE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n[ \t]*\n").unwrap());
    static WS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

    let normalized = raw_text.replace("\r\n", "\n");
    let trimmed = normalized.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    let blocks: Vec<String> = BLANK_LINE_RE
        .split(trimmed)
        .map(|b| WS_RE.replace_all(b.trim(), " ").into_owned())
        .filter(|b| !b.is_empty())
        .collect();
    if blocks.len() > 3 {
        return blocks;
    }

    trimmed
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn four_blocks_give_one_citation_per_block() {
        let text = "Author A. Title one.\nVenue 2019.\n\nAuthor B. Title two. 2020.\n\n\
                    Author C. Title three. 2021.\n\nAuthor D. Title four. 2022.";
        let refs = split_references(text);
        assert_eq!(refs.len(), 4);
        assert_eq!(refs[0], "Author A. Title one. Venue 2019.");
        assert_eq!(refs[3], "Author D. Title four. 2022.");
    }

    #[test]
    fn five_lines_without_blank_lines_give_five_citations() {
        let text = "Ref one\nRef two\nRef three\nRef four\nRef five\n";
        let refs = split_references(text);
        assert_eq!(refs, vec!["Ref one", "Ref two", "Ref three", "Ref four", "Ref five"]);
    }

    #[test]
    fn three_blocks_fall_back_to_lines() {
        let text = "a1\na2\n\nb1\n\nc1";
        assert_eq!(split_references(text), vec!["a1", "a2", "b1", "c1"]);
    }

    #[test]
    fn whitespace_only_blank_lines_count_as_separators() {
        let text = "one\n  \ntwo\n\t\nthree\n \nfour\n";
        assert_eq!(split_references(text), vec!["one", "two", "three", "four"]);
    }

    #[test]
    fn empty_input_is_empty() {
        assert!(split_references("  \n\n ").is_empty());
    }

    #[test]
    fn crlf_is_normalized() {
        let text = "a\r\n\r\nb\r\n\r\nc\r\n\r\nd";
        assert_eq!(split_references(text), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn finds_last_references_heading() {
        let text = "Intro\nReferences\nnot really\nBody continues.\n\nReferences\n[1] Real ref.\n";
        let region = find_references_section(text).unwrap();
        assert_eq!(region.text.trim(), "[1] Real ref.");
        assert_eq!(region.start, text.rfind("References").unwrap());
    }

    #[test]
    fn stops_at_appendix() {
        let text = "Body.\n\nReferences\n\n[1] Ref one.\n\nAppendix A\n\nExtra stuff.";
        let region = find_references_section(text).unwrap();
        assert!(region.text.contains("[1] Ref one."));
        assert!(!region.text.contains("Extra stuff"));
    }

    #[test]
    fn appendix_with_colon_inside_reference_does_not_end_region() {
        let text = "Body.\nReferences\n[1] Foo. Artifact Appendix: Bar. 2020.\n[2] Baz.\n";
        let region = find_references_section(text).unwrap();
        assert!(region.text.contains("[2] Baz."));
    }

    #[test]
    fn numbered_heading_is_accepted() {
        let text = "Body.\n7 References\n[1] Ref.\n";
        assert!(find_references_section(text).is_some());
    }

    #[test]
    fn no_heading_without_fallback_is_none() {
        assert!(find_references_section("just body text\nmore text\n").is_none());
    }

    #[test]
    fn no_heading_with_fallback_returns_tail() {
        let text = "0123456789";
        let region = find_references_section_with(text, Some(0.7)).unwrap();
        assert_eq!(region.text, "789");
        assert_eq!(region.start, 7);
    }
}
