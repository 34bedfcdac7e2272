//! Best-effort split of a citation string into its author segment and title.
//!
//! Handles the common shapes:
//! - IEEE/USENIX: `Authors, "Title," in Venue, Year`
//! - Harvard/APA/Springer: `Authors (Year). Title. Journal`
//! - ACM: `Authors. Year. Title. In Venue`
//! - fallback: the second sentence, skipping author initials
//!
//! The result is a lookup query, not ground truth; `None` fields are normal.

use once_cell::sync::Lazy;
use regex::Regex;

/// Author and title segments of one citation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CitationParts {
    pub authors: Option<String>,
    pub title: Option<String>,
}

/// Words a title must have to be used as a title query.
const MIN_TITLE_WORDS: usize = 3;

/// Split a raw citation into authors and title.
pub fn split_citation(citation: &str) -> CitationParts {
    static WS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
    let text = WS_RE.replace_all(citation, " ");
    let text = strip_marker(text.trim());

    let found = try_quoted(text)
        .or_else(|| try_paren_year(text))
        .or_else(|| try_dot_year(text))
        .or_else(|| try_second_sentence(text));

    match found {
        Some((title_start, title)) => CitationParts {
            authors: clean_authors(&text[..title_start]),
            title: Some(title),
        },
        None => CitationParts::default(),
    }
}

/// Drop a leading list marker: `[12]`, `12.` or `12)`.
pub(crate) fn strip_marker(text: &str) -> &str {
    static MARKER_RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"^(?:\[\d{1,4}\]|\d{1,4}[.)])\s*").unwrap());
    match MARKER_RE.find(text) {
        Some(m) => &text[m.end()..],
        None => text,
    }
}

fn clean_authors(segment: &str) -> Option<String> {
    static TRAIL_RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"[\s,.;:]*(?:\(\d{4}[a-z]?\)|\d{4}[a-z]?)?[\s,.;:(]*$").unwrap());
    let cleaned = TRAIL_RE.replace(segment, "");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_string())
    }
}

fn word_count(s: &str) -> usize {
    s.split_whitespace().count()
}

fn trim_title(s: &str) -> String {
    s.trim()
        .trim_end_matches(|c: char| matches!(c, '.' | ',' | ';' | ':'))
        .trim()
        .to_string()
}

fn try_quoted(text: &str) -> Option<(usize, String)> {
    static QUOTE_RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r#"[\u{201c}\u{201d}"]([^\u{201c}\u{201d}"]+)[\u{201c}\u{201d}"]"#).unwrap()
    });
    let caps = QUOTE_RE.captures(text)?;
    let whole = caps.get(0)?;
    let title = trim_title(caps.get(1)?.as_str());
    (word_count(&title) >= MIN_TITLE_WORDS).then_some((whole.start(), title))
}

/// Where a title that follows a year runs into venue metadata.
fn venue_cut(after_year: &str) -> usize {
    static END_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
        vec![
            Regex::new(r"\.\s*[Ii]n:?\s+[A-Z]").unwrap(),
            Regex::new(r"\.\s*(?:Proceedings|Proc\.|IEEE|ACM|USENIX|arXiv|CoRR|Advances)").unwrap(),
            Regex::new(r"\.\s*[A-Z][a-zA-Z\s&]+,?\s*\d+\s*[(:]").unwrap(),
            Regex::new(r"\.\s*https?://").unwrap(),
            Regex::new(r"\.\s*(?:doi|DOI):").unwrap(),
            Regex::new(r"[?!]\s+[A-Z][a-zA-Z\s&]+,\s*\d+").unwrap(),
            Regex::new(r"\.\s+[A-Z]").unwrap(),
        ]
    });

    let mut end = after_year.len();
    for re in END_PATTERNS.iter() {
        if let Some(m) = re.find(after_year) {
            // Keep a title-ending ? or !
            let cut = match after_year.as_bytes().get(m.start()) {
                Some(b'?') | Some(b'!') => m.start() + 1,
                _ => m.start(),
            };
            end = end.min(cut);
        }
    }
    end
}

fn try_paren_year(text: &str) -> Option<(usize, String)> {
    static RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\((\d{4}[a-z]?|n\.d\.)\)[.,]?\s+").unwrap());
    let m = RE.find(text)?;
    let after = &text[m.end()..];
    let title = trim_title(&after[..venue_cut(after)]);
    (word_count(&title) >= MIN_TITLE_WORDS).then_some((m.end(), title))
}

fn try_dot_year(text: &str) -> Option<(usize, String)> {
    // ". YYYY. Title": require whitespace after the year to avoid DOIs
    static RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.\s*(?:1[89]|20)\d{2}[a-z]?\.\s+").unwrap());
    let m = RE.find(text)?;
    let after = &text[m.end()..];
    let title = trim_title(&after[..venue_cut(after)]);
    (word_count(&title) >= MIN_TITLE_WORDS).then_some((m.end(), title))
}

fn try_second_sentence(text: &str) -> Option<(usize, String)> {
    let starts = sentence_starts(text);
    if starts.len() < 2 {
        return None;
    }
    let begin = starts[1];
    let end = starts.get(2).copied().unwrap_or(text.len());
    let candidate = trim_title(&text[begin..end]);

    static IN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[Ii]n\s+").unwrap());
    if IN_RE.is_match(&candidate) || word_count(&candidate) < MIN_TITLE_WORDS {
        return None;
    }
    Some((begin, candidate))
}

/// Byte offsets where sentences start, ignoring periods after initials
/// (`J.`), `et al.` and a few common abbreviations.
fn sentence_starts(text: &str) -> Vec<usize> {
    static PERIOD_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.\s+").unwrap());
    const ABBREVIATIONS: &[&str] = &["al", "vs", "eg", "ie", "cf", "ed", "eds", "vol", "no", "pp"];

    let mut starts = vec![0];
    for m in PERIOD_SPACE.find_iter(text) {
        let before = &text[..m.start()];
        let word = before
            .rsplit(|c: char| c.is_whitespace() || c == ',' || c == '.')
            .next()
            .unwrap_or("");
        let is_initial = word.chars().count() == 1 && word.chars().all(char::is_uppercase);
        let is_abbrev = ABBREVIATIONS.contains(&word.to_lowercase().as_str());
        if is_initial || is_abbrev {
            continue;
        }
        starts.push(m.end());
    }
    starts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ieee_quoted_title() {
        let parts = split_citation(
            "[3] A. Vaswani and N. Shazeer, \u{201c}Attention is all you need,\u{201d} in NeurIPS, 2017.",
        );
        assert_eq!(parts.title.as_deref(), Some("Attention is all you need"));
        assert_eq!(parts.authors.as_deref(), Some("A. Vaswani and N. Shazeer"));
    }

    #[test]
    fn apa_paren_year_title() {
        let parts = split_citation(
            "Vaswani, A., Shazeer, N., & Parmar, N. (2017). Attention is all you need. Advances in Neural Information Processing Systems, 30.",
        );
        assert_eq!(parts.title.as_deref(), Some("Attention is all you need"));
        assert_eq!(
            parts.authors.as_deref(),
            Some("Vaswani, A., Shazeer, N., & Parmar, N")
        );
    }

    #[test]
    fn acm_dot_year_title() {
        let parts = split_citation(
            "Ashish Vaswani, Noam Shazeer, and Niki Parmar. 2017. Attention Is All You Need. In Advances in Neural Information Processing Systems.",
        );
        assert_eq!(parts.title.as_deref(), Some("Attention Is All You Need"));
        assert!(parts.authors.unwrap().starts_with("Ashish Vaswani"));
    }

    #[test]
    fn fallback_second_sentence_skips_initials() {
        let parts = split_citation(
            "J. Smith and K. Jones. Deep learning for tabular data. Journal of Things, 2020.",
        );
        assert_eq!(parts.title.as_deref(), Some("Deep learning for tabular data"));
    }

    #[test]
    fn garbage_yields_empty_parts() {
        assert_eq!(split_citation("12"), CitationParts::default());
        assert_eq!(split_citation(""), CitationParts::default());
    }

    #[test]
    fn strips_list_markers() {
        assert_eq!(strip_marker("[12] Foo"), "Foo");
        assert_eq!(strip_marker("4. Foo"), "Foo");
        assert_eq!(strip_marker("Foo 4."), "Foo 4.");
    }
}
