use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use hallucitation_parsing::{ListOverride, SectionPattern, YearWindow};
use serde::{Deserialize, Serialize};

use crate::CoreError;
use crate::config::{Config, current_year};
use crate::rate_limit::RateLimiters;

/// On-disk TOML configuration structure.
/// All fields are optional so partial configs work (merge with defaults).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    pub api_keys: Option<ApiKeysConfig>,
    pub paths: Option<PathsConfig>,
    pub network: Option<NetworkConfig>,
    pub classification: Option<ClassificationConfig>,
    pub parsing: Option<ParsingFileConfig>,
    pub sections: Option<SectionsConfig>,
    pub import: Option<ImportConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiKeysConfig {
    pub gptzero_api_key: Option<String>,
    pub crossref_mailto: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathsConfig {
    pub pdf_dir: Option<String>,
    pub metadata_csv: Option<String>,
    pub db_path: Option<String>,
    pub output_dir: Option<String>,
    pub log_dir: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub max_retries: Option<u32>,
    pub retry_base_delay_secs: Option<f64>,
    pub request_timeout_secs: Option<f64>,
    pub inter_request_delay_secs: Option<f64>,
    pub citation_concurrency: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassificationConfig {
    pub threshold: Option<f64>,
    pub conflict_probability: Option<f64>,
    pub min_relevance_score: Option<f64>,
    pub min_title_similarity: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParsingFileConfig {
    pub year_min: Option<u16>,
    /// Fixed upper bound. Takes precedence over `year_lookahead`.
    pub year_max: Option<u16>,
    pub year_lookahead: Option<u16>,
    pub fallback_fraction: Option<f64>,
}

/// `[sections]` table: `mode = "extend" | "replace"` plus `[[sections.patterns]]`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SectionsConfig {
    pub mode: Option<String>,
    pub patterns: Option<Vec<SectionPattern>>,
}

/// `[import]` table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportConfig {
    /// Known Domain_Category values. Replaces the built-in taxonomy.
    pub domains: Option<Vec<String>>,
}

/// Platform config directory path: `<config_dir>/hallucitation/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("hallucitation").join("config.toml"))
}

/// Load config by cascading CWD `.hallucitation.toml` over platform config.
/// CWD values override platform values.
pub fn load_config() -> ConfigFile {
    let platform = config_path().and_then(|p| load_from_path(&p));
    let cwd = load_from_path(Path::new(".hallucitation.toml"));

    match (platform, cwd) {
        (None, None) => ConfigFile::default(),
        (Some(p), None) => p,
        (None, Some(c)) => c,
        (Some(p), Some(c)) => merge(p, c),
    }
}

/// Load a config from a specific path. Returns `None` if the file doesn't
/// exist or can't be parsed.
pub fn load_from_path(path: &Path) -> Option<ConfigFile> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(config) => Some(config),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unparseable config file");
            None
        }
    }
}

fn pick<S, T>(overlay: &Option<S>, base: &Option<S>, field: impl Fn(&S) -> Option<T>) -> Option<T> {
    overlay
        .as_ref()
        .and_then(&field)
        .or_else(|| base.as_ref().and_then(&field))
}

/// Merge two configs: `overlay` values take precedence over `base`.
///
/// `[sections]` is taken as a whole from whichever side defines patterns.
pub fn merge(base: ConfigFile, overlay: ConfigFile) -> ConfigFile {
    let (o, b) = (&overlay, &base);
    ConfigFile {
        api_keys: Some(ApiKeysConfig {
            gptzero_api_key: pick(&o.api_keys, &b.api_keys, |a| a.gptzero_api_key.clone()),
            crossref_mailto: pick(&o.api_keys, &b.api_keys, |a| a.crossref_mailto.clone()),
        }),
        paths: Some(PathsConfig {
            pdf_dir: pick(&o.paths, &b.paths, |p| p.pdf_dir.clone()),
            metadata_csv: pick(&o.paths, &b.paths, |p| p.metadata_csv.clone()),
            db_path: pick(&o.paths, &b.paths, |p| p.db_path.clone()),
            output_dir: pick(&o.paths, &b.paths, |p| p.output_dir.clone()),
            log_dir: pick(&o.paths, &b.paths, |p| p.log_dir.clone()),
        }),
        network: Some(NetworkConfig {
            max_retries: pick(&o.network, &b.network, |n| n.max_retries),
            retry_base_delay_secs: pick(&o.network, &b.network, |n| n.retry_base_delay_secs),
            request_timeout_secs: pick(&o.network, &b.network, |n| n.request_timeout_secs),
            inter_request_delay_secs: pick(&o.network, &b.network, |n| {
                n.inter_request_delay_secs
            }),
            citation_concurrency: pick(&o.network, &b.network, |n| n.citation_concurrency),
        }),
        classification: Some(ClassificationConfig {
            threshold: pick(&o.classification, &b.classification, |c| c.threshold),
            conflict_probability: pick(&o.classification, &b.classification, |c| {
                c.conflict_probability
            }),
            min_relevance_score: pick(&o.classification, &b.classification, |c| {
                c.min_relevance_score
            }),
            min_title_similarity: pick(&o.classification, &b.classification, |c| {
                c.min_title_similarity
            }),
        }),
        parsing: Some(ParsingFileConfig {
            year_min: pick(&o.parsing, &b.parsing, |p| p.year_min),
            year_max: pick(&o.parsing, &b.parsing, |p| p.year_max),
            year_lookahead: pick(&o.parsing, &b.parsing, |p| p.year_lookahead),
            fallback_fraction: pick(&o.parsing, &b.parsing, |p| p.fallback_fraction),
        }),
        import: Some(ImportConfig {
            domains: pick(&o.import, &b.import, |i| i.domains.clone()),
        }),
        sections: match overlay.sections {
            Some(s) if s.patterns.is_some() => Some(s),
            _ => base.sections,
        },
    }
}

fn secs(name: &str, value: f64) -> Result<Duration, CoreError> {
    Duration::try_from_secs_f64(value)
        .map_err(|_| CoreError::Config(format!("{name} must be a non-negative number of seconds")))
}

fn probability(name: &str, value: f64) -> Result<f64, CoreError> {
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(CoreError::Config(format!("{name} must be between 0 and 1, got {value}")))
    }
}

impl ConfigFile {
    /// Domain taxonomy from `[import] domains`, if set.
    pub fn domains(&self) -> Option<&[String]> {
        self.import.as_ref()?.domains.as_deref()
    }

    /// Overlay the values present in this file onto `config`.
    ///
    /// Rebuilds the rate limiters so a changed inter-request delay takes effect.
    pub fn apply_to(&self, config: &mut Config) -> Result<(), CoreError> {
        if let Some(keys) = &self.api_keys {
            if let Some(key) = &keys.gptzero_api_key {
                config.gptzero_api_key = Some(key.clone());
            }
            if let Some(mailto) = &keys.crossref_mailto {
                config.crossref_mailto = Some(mailto.clone());
            }
        }

        if let Some(net) = &self.network {
            if let Some(n) = net.max_retries {
                config.max_retries = n;
            }
            if let Some(s) = net.retry_base_delay_secs {
                config.retry_base_delay = secs("retry_base_delay_secs", s)?;
            }
            if let Some(s) = net.request_timeout_secs {
                config.request_timeout = secs("request_timeout_secs", s)?;
            }
            if let Some(s) = net.inter_request_delay_secs {
                config.inter_request_delay = secs("inter_request_delay_secs", s)?;
            }
            if let Some(n) = net.citation_concurrency {
                config.citation_concurrency = n.max(1);
            }
        }

        if let Some(c) = &self.classification {
            if let Some(v) = c.threshold {
                config.policy.threshold = probability("threshold", v)?;
            }
            if let Some(v) = c.conflict_probability {
                config.policy.conflict_probability = probability("conflict_probability", v)?;
            }
            if let Some(v) = c.min_relevance_score {
                config.policy.min_relevance_score = v;
            }
            if let Some(v) = c.min_title_similarity {
                config.policy.min_title_similarity = probability("min_title_similarity", v)?;
            }
        }

        if let Some(p) = &self.parsing {
            let min = p.year_min.unwrap_or(config.parsing.year_window.min);
            let window = match (p.year_max, p.year_lookahead) {
                (Some(max), _) => YearWindow::new(min, max),
                (None, Some(lookahead)) => YearWindow::relative_to(current_year(), min, lookahead),
                (None, None) => YearWindow::new(min, config.parsing.year_window.max),
            };
            if window.min > window.max {
                return Err(CoreError::Config(format!(
                    "year window is empty ({}..={})",
                    window.min, window.max
                )));
            }
            config.parsing.year_window = window;
            if let Some(f) = p.fallback_fraction {
                if !(0.0..1.0).contains(&f) {
                    return Err(CoreError::Config(format!(
                        "fallback_fraction must be in [0, 1), got {f}"
                    )));
                }
                config.parsing.fallback_fraction = Some(f);
            }
        }

        if let Some(sections) = &self.sections
            && let Some(patterns) = &sections.patterns
        {
            config.parsing.section_patterns = match sections.mode.as_deref() {
                None | Some("extend") => ListOverride::Extend(patterns.clone()),
                Some("replace") => ListOverride::Replace(patterns.clone()),
                Some(other) => {
                    return Err(CoreError::Config(format!(
                        "sections.mode must be \"extend\" or \"replace\", got \"{other}\""
                    )));
                }
            };
        }

        config.rate_limiters = Arc::new(RateLimiters::new(config.inter_request_delay));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[api_keys]
crossref_mailto = "lab@example.org"

[network]
max_retries = 5
retry_base_delay_secs = 0.5
citation_concurrency = 4

[classification]
threshold = 0.8

[parsing]
year_min = 1900
year_max = 2030

[sections]
mode = "replace"

[[sections.patterns]]
name = "introduction"
pattern = "introduction"

[[sections.patterns]]
name = "threats"
pattern = "threats to validity"
"#;

    #[test]
    fn parses_full_file() {
        let parsed: ConfigFile = toml::from_str(SAMPLE).unwrap();
        let patterns = parsed.sections.as_ref().unwrap().patterns.as_ref().unwrap();
        assert_eq!(patterns.len(), 2);
        assert_eq!(patterns[1].name, "threats");
        assert_eq!(parsed.network.as_ref().unwrap().max_retries, Some(5));
    }

    #[test]
    fn apply_overlays_values() {
        let parsed: ConfigFile = toml::from_str(SAMPLE).unwrap();
        let mut config = Config::default();
        parsed.apply_to(&mut config).unwrap();

        assert_eq!(config.crossref_mailto.as_deref(), Some("lab@example.org"));
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.retry_base_delay, Duration::from_millis(500));
        assert_eq!(config.request_timeout, Duration::from_secs(60));
        assert_eq!(config.citation_concurrency, 4);
        assert_eq!(config.policy.threshold, 0.8);
        assert_eq!(config.parsing.year_window, YearWindow::new(1900, 2030));
        assert_eq!(config.parsing.resolved_section_patterns().len(), 2);
    }

    #[test]
    fn lookahead_follows_the_calendar() {
        let parsed: ConfigFile = toml::from_str("[parsing]\nyear_lookahead = 3\n").unwrap();
        let mut config = Config::default();
        parsed.apply_to(&mut config).unwrap();
        assert_eq!(config.parsing.year_window.max, current_year() + 3);
        assert_eq!(config.parsing.year_window.min, 1800);
    }

    #[test]
    fn rejects_out_of_range_values() {
        for toml_str in [
            "[classification]\nthreshold = 1.5\n",
            "[network]\nrequest_timeout_secs = -1.0\n",
            "[parsing]\nyear_min = 2000\nyear_max = 1990\n",
            "[parsing]\nfallback_fraction = 1.0\n",
            "[sections]\nmode = \"merge\"\n[[sections.patterns]]\nname = \"x\"\npattern = \"x\"\n",
        ] {
            let parsed: ConfigFile = toml::from_str(toml_str).unwrap();
            assert!(
                parsed.apply_to(&mut Config::default()).is_err(),
                "accepted: {toml_str}"
            );
        }
    }

    #[test]
    fn merge_overlay_wins() {
        let base: ConfigFile =
            toml::from_str("[network]\nmax_retries = 2\nrequest_timeout_secs = 10.0\n").unwrap();
        let overlay: ConfigFile = toml::from_str("[network]\nmax_retries = 7\n").unwrap();
        let merged = merge(base, overlay);
        let net = merged.network.unwrap();
        assert_eq!(net.max_retries, Some(7));
        assert_eq!(net.request_timeout_secs, Some(10.0));
    }

    #[test]
    fn merge_keeps_base_sections_when_overlay_has_none() {
        let base: ConfigFile = toml::from_str(SAMPLE).unwrap();
        let merged = merge(base, ConfigFile::default());
        assert_eq!(merged.sections.unwrap().patterns.unwrap().len(), 2);
    }

    #[test]
    fn import_domains_come_from_overlay() {
        let base: ConfigFile =
            toml::from_str("[import]\ndomains = [\"Physics\", \"Biology\"]\n").unwrap();
        assert_eq!(base.domains(), Some(&["Physics".to_string(), "Biology".to_string()][..]));

        let overlay: ConfigFile = toml::from_str("[import]\ndomains = [\"Law\"]\n").unwrap();
        let merged = merge(base.clone(), overlay);
        assert_eq!(merged.domains(), Some(&["Law".to_string()][..]));

        let merged = merge(base, ConfigFile::default());
        assert_eq!(merged.domains().map(<[String]>::len), Some(2));
        assert_eq!(ConfigFile::default().domains(), None);
    }

    #[test]
    fn load_from_path_ignores_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "this is = not [valid toml").unwrap();
        assert!(load_from_path(&path).is_none());
        assert!(load_from_path(&dir.path().join("missing.toml")).is_none());
    }
}
