use crate::section::{SectionPattern, default_section_patterns};
use crate::year::YearWindow;

/// Controls how a list of patterns/values is overridden from its defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ListOverride<T> {
    /// Use the built-in defaults.
    #[default]
    Default,
    /// Completely replace the defaults with these values.
    Replace(Vec<T>),
    /// Append these values to the defaults.
    Extend(Vec<T>),
}

impl<T: Clone> ListOverride<T> {
    /// Resolve this override against the given defaults.
    pub fn resolve(&self, defaults: &[T]) -> Vec<T> {
        match self {
            ListOverride::Default => defaults.to_vec(),
            ListOverride::Replace(v) => v.clone(),
            ListOverride::Extend(v) => {
                let mut result = defaults.to_vec();
                result.extend(v.iter().cloned());
                result
            }
        }
    }
}

/// Knobs for the text-level parsing stage.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsingConfig {
    /// Section heading table, applied in order.
    pub section_patterns: ListOverride<SectionPattern>,
    /// When no references heading is found, treat the trailing part of the
    /// document starting at this fraction (0.0–1.0) as the reference list.
    /// `None` means "no reference list".
    pub fallback_fraction: Option<f64>,
    /// Accepted publication-year range for citation years.
    pub year_window: YearWindow,
}

impl Default for ParsingConfig {
    fn default() -> Self {
        Self {
            section_patterns: ListOverride::Default,
            fallback_fraction: None,
            year_window: YearWindow::default(),
        }
    }
}

impl ParsingConfig {
    /// The effective section table after applying overrides.
    pub fn resolved_section_patterns(&self) -> Vec<SectionPattern> {
        self.section_patterns.resolve(&default_section_patterns())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extend_appends_after_defaults() {
        let config = ParsingConfig {
            section_patterns: ListOverride::Extend(vec![SectionPattern::new(
                "threats",
                "threats to validity",
            )]),
            ..Default::default()
        };
        let patterns = config.resolved_section_patterns();
        assert_eq!(patterns.len(), default_section_patterns().len() + 1);
        assert_eq!(patterns.last().unwrap().name, "threats");
    }

    #[test]
    fn replace_drops_defaults() {
        let over = ListOverride::Replace(vec![1, 2]);
        assert_eq!(over.resolve(&[7, 8, 9]), vec![1, 2]);
    }
}
