use once_cell::sync::Lazy;
use regex::Regex;

/// Inclusive range of plausible publication years.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YearWindow {
    pub min: u16,
    pub max: u16,
}

impl Default for YearWindow {
    /// The historical fixed window (1800–2029).
    fn default() -> Self {
        Self {
            min: 1800,
            max: 2029,
        }
    }
}

impl YearWindow {
    pub fn new(min: u16, max: u16) -> Self {
        Self { min, max }
    }

    /// A window whose upper bound follows the calendar: `current_year + lookahead`,
    /// so near-future preprint dates are admitted.
    pub fn relative_to(current_year: u16, min: u16, lookahead: u16) -> Self {
        Self {
            min,
            max: current_year.saturating_add(lookahead),
        }
    }

    pub fn contains(&self, year: u16) -> bool {
        (self.min..=self.max).contains(&year)
    }
}

/// First standalone four-digit year inside `window`.
///
/// A trailing disambiguation letter (`2017a`) is allowed. Multiple embedded
/// years (page ranges, editions) are not disambiguated: the first one wins.
pub fn extract_year(citation_text: &str, window: YearWindow) -> Option<u16> {
    static YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d{4})[a-z]?\b").unwrap());

    YEAR_RE
        .captures_iter(citation_text)
        .filter_map(|caps| caps.get(1)?.as_str().parse::<u16>().ok())
        .find(|y| window.contains(*y))
}
