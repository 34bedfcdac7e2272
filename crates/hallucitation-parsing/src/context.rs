//! In-text usage lookup: where in the body a citation is referenced, and the
//! sentence around that reference.

use once_cell::sync::Lazy;
use regex::Regex;

/// Longest context sentence kept, in characters.
const MAX_SENTENCE_CHARS: usize = 600;

/// First in-text usage of a citation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Usage {
    /// Byte offset of the marker in the body.
    pub offset: usize,
    pub sentence: String,
}

/// Find where `citation` is first used in `body`.
///
/// Numbered lists (`[n] ...` or `n. ...`) are matched against bracketed
/// markers such as `[n]`, `[2, n]` or `[1-n]`. Other styles use the
/// first-author surname followed closely by the citation year. `seq` is the
/// 1-based position in the reference list and stands in for the label when a
/// numbered citation lost its marker during extraction.
pub fn locate_usage(body: &str, citation: &str, seq: usize, year: Option<u16>) -> Option<Usage> {
    let offset = match numeric_label(citation) {
        Some(label) => find_numeric_marker(body, label),
        None => find_author_year(body, citation, year)
            .or_else(|| looks_numbered(body).then(|| find_numeric_marker(body, seq)).flatten()),
    }?;
    Some(Usage {
        offset,
        sentence: sentence_around(body, offset),
    })
}

fn numeric_label(citation: &str) -> Option<usize> {
    static LABEL_RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"^\s*(?:\[(\d{1,4})\]|(\d{1,4})[.)]\s)").unwrap());
    let caps = LABEL_RE.captures(citation)?;
    caps.get(1).or_else(|| caps.get(2))?.as_str().parse().ok()
}

/// Whether the body uses bracketed numeric citations at all.
fn looks_numbered(body: &str) -> bool {
    static NUMERIC_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[\d{1,4}(?:[,;\u{2013}-]\s*\d{1,4})*\]").unwrap());
    NUMERIC_RE.is_match(body)
}

fn find_numeric_marker(body: &str, label: usize) -> Option<usize> {
    static BRACKET_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[([\d,;\s\u{2013}-]{1,60})\]").unwrap());

    BRACKET_RE
        .captures_iter(body)
        .find(|caps| {
            caps.get(1)
                .is_some_and(|inner| marker_list_contains(inner.as_str(), label))
        })
        .and_then(|caps| caps.get(0))
        .map(|m| m.start())
}

fn marker_list_contains(inner: &str, label: usize) -> bool {
    inner.split([',', ';']).any(|item| {
        let item = item.trim();
        match item.split_once(['-', '\u{2013}']) {
            Some((lo, hi)) => match (lo.trim().parse::<usize>(), hi.trim().parse::<usize>()) {
                (Ok(lo), Ok(hi)) => (lo..=hi).contains(&label),
                _ => false,
            },
            None => item.parse::<usize>().is_ok_and(|n| n == label),
        }
    })
}

fn find_author_year(body: &str, citation: &str, year: Option<u16>) -> Option<usize> {
    static SURNAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\p{Lu}[\p{Ll}\p{Lu}'\u{2019}-]+").unwrap());

    let year = year?;
    let surname = SURNAME_RE.find(crate::title::strip_marker(citation.trim()))?.as_str();
    let pattern = format!(r"(?s){}.{{0,60}}?{}", regex::escape(surname), year);
    let re = Regex::new(&pattern).ok()?;
    re.find(body).map(|m| m.start())
}

/// The sentence of `text` that contains byte `offset`, with whitespace collapsed.
///
/// Sentence boundaries are `.`, `?` or `!` followed by whitespace (except after
/// initials and `et al.`-style abbreviations) and paragraph breaks.
pub fn sentence_around(text: &str, offset: usize) -> String {
    static WS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

    let offset = floor_char_boundary(text, offset.min(text.len()));
    let start = sentence_start(text, offset);
    let end = sentence_end(text, offset);
    let sentence = WS_RE.replace_all(text[start..end].trim(), " ");
    truncate_chars(&sentence, MAX_SENTENCE_CHARS)
}

fn floor_char_boundary(text: &str, mut i: usize) -> usize {
    while i > 0 && !text.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn is_terminal_at(text: &str, idx: usize) -> bool {
    let bytes = text.as_bytes();
    let Some(&b) = bytes.get(idx) else {
        return false;
    };
    if b == b'\n' {
        return bytes.get(idx + 1) == Some(&b'\n');
    }
    if !matches!(b, b'.' | b'?' | b'!') {
        return false;
    }
    if !bytes.get(idx + 1).is_some_and(|c| c.is_ascii_whitespace()) {
        return false;
    }
    if b != b'.' {
        return true;
    }
    const ABBREVIATIONS: &[&str] = &["al", "e.g", "i.e", "eg", "ie", "cf", "fig", "eq", "sec", "vs", "etc"];
    let word = text[..idx]
        .rsplit(|c: char| c.is_whitespace() || c == '(')
        .next()
        .unwrap_or("");
    let is_initial = word.chars().count() == 1 && word.chars().all(char::is_uppercase);
    !(is_initial || ABBREVIATIONS.contains(&word.to_lowercase().as_str()))
}

fn sentence_start(text: &str, offset: usize) -> usize {
    let mut i = offset;
    while i > 0 {
        i -= 1;
        if is_terminal_at(text, i) {
            return floor_char_boundary(text, (i + 1).min(text.len()));
        }
    }
    0
}

fn sentence_end(text: &str, offset: usize) -> usize {
    let mut i = offset;
    while i < text.len() {
        if is_terminal_at(text, i) {
            return if text.as_bytes()[i] == b'\n' { i } else { i + 1 };
        }
        i += 1;
    }
    text.len()
}

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}
