use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

/// Normalize a title for comparison: lowercase ASCII alphanumerics only.
///
/// HTML entities from API payloads are unescaped first, then NFKD folds
/// accented letters to their base letter before everything else is dropped.
pub fn normalize_title(title: &str) -> String {
    let title = title
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'");

    // JATS markup shows up in CrossRef titles (<i>, <sub>, ...).
    static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"</?[a-zA-Z:]+[^>]*>").unwrap());
    let title = TAG_RE.replace_all(&title, "");

    let normalized: String = title.nfkd().filter(|c| c.is_ascii()).collect();

    static NON_ALNUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-zA-Z0-9]").unwrap());
    NON_ALNUM.replace_all(&normalized, "").to_lowercase()
}

/// Fuzzy similarity (0.0–1.0) between a cited title and a matched title.
///
/// `None` when either side has nothing comparable left after normalization.
pub fn title_similarity(cited: &str, matched: &str) -> Option<f64> {
    let a = normalize_title(cited);
    let b = normalize_title(matched);
    if a.is_empty() || b.is_empty() {
        return None;
    }
    Some(rapidfuzz::fuzz::ratio(a.chars(), b.chars()))
}
