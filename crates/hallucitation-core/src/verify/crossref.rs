use std::future::Future;
use std::pin::Pin;

use super::{BibMatch, BibliographicAuthority, CitationQuery, VerifyOutcome};
use crate::config::DEFAULT_CROSSREF_URL;
use crate::matching::title_similarity;
use crate::net::HttpClient;
use crate::rate_limit::CROSSREF;

/// CrossRef `/works` lookup.
pub struct CrossRef {
    http: HttpClient,
    base_url: String,
    mailto: Option<String>,
}

impl CrossRef {
    pub fn new(http: HttpClient, mailto: Option<String>) -> Self {
        Self {
            http,
            base_url: DEFAULT_CROSSREF_URL.to_string(),
            mailto,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Query parameters for one lookup.
    pub fn params(&self, query: &CitationQuery) -> Vec<(&'static str, String)> {
        let mut params = Vec::with_capacity(4);
        match query.title.as_deref().filter(|t| !t.trim().is_empty()) {
            Some(title) => params.push(("query.title", title.to_string())),
            None => params.push(("query.bibliographic", query.raw.clone())),
        }
        params.push(("rows", "1".to_string()));
        if let Some(year) = query.year {
            params.push(("filter", format!("from-pub-date:{year},until-pub-date:{year}")));
        }
        if let Some(email) = &self.mailto {
            params.push(("mailto", email.clone()));
        }
        params
    }

    fn user_agent(&self) -> String {
        match &self.mailto {
            Some(email) => format!("hallucitation/{} (mailto:{email})", env!("CARGO_PKG_VERSION")),
            None => format!("hallucitation/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Turn a CrossRef `/works` response into an outcome.
pub fn parse_works_response(data: &serde_json::Value, query: &CitationQuery) -> VerifyOutcome {
    let Some(items) = data["message"]["items"].as_array() else {
        return VerifyOutcome::NotAvailable {
            reason: "CrossRef response has no message.items".to_string(),
        };
    };
    let Some(item) = items.first() else {
        return VerifyOutcome::NotFound;
    };

    let title = item["title"]
        .as_array()
        .and_then(|a| a.first())
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    let relevance = item["score"].as_f64().unwrap_or(0.0);
    let similarity = query
        .title
        .as_deref()
        .and_then(|cited| title_similarity(cited, &title));

    VerifyOutcome::Match(BibMatch {
        title,
        relevance,
        similarity,
        doi: item["DOI"].as_str().map(str::to_string),
    })
}

impl BibliographicAuthority for CrossRef {
    fn name(&self) -> &str {
        CROSSREF
    }

    fn verify<'a>(
        &'a self,
        query: &'a CitationQuery,
    ) -> Pin<Box<dyn Future<Output = VerifyOutcome> + Send + 'a>> {
        Box::pin(async move {
            let params = self.params(query);
            let headers = [("User-Agent", self.user_agent())];
            match self
                .http
                .get_json(CROSSREF, &self.base_url, &params, &headers)
                .await
            {
                Ok(data) => parse_works_response(&data, query),
                Err(failure) => VerifyOutcome::NotAvailable {
                    reason: format!("CrossRef {failure}"),
                },
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::RetryPolicy;
    use crate::rate_limit::RateLimiters;
    use serde_json::json;
    use std::sync::Arc;

    fn crossref(mailto: Option<&str>) -> CrossRef {
        let http = HttpClient::with_client(
            reqwest::Client::new(),
            RetryPolicy::default(),
            Arc::new(RateLimiters::unlimited()),
        );
        CrossRef::new(http, mailto.map(str::to_string))
    }

    fn query(title: Option<&str>, year: Option<u16>) -> CitationQuery {
        CitationQuery {
            raw: "A. Vaswani et al. Attention is all you need. NeurIPS 2017.".into(),
            title: title.map(str::to_string),
            year,
        }
    }

    #[test]
    fn params_use_title_year_filter_and_mailto() {
        let cr = crossref(Some("lab@example.org"));
        let params = cr.params(&query(Some("Attention is all you need"), Some(2017)));
        assert_eq!(
            params,
            vec![
                ("query.title", "Attention is all you need".to_string()),
                ("rows", "1".to_string()),
                ("filter", "from-pub-date:2017,until-pub-date:2017".to_string()),
                ("mailto", "lab@example.org".to_string()),
            ]
        );
    }

    #[test]
    fn params_fall_back_to_bibliographic_query() {
        let cr = crossref(None);
        let params = cr.params(&query(Some("  "), None));
        assert_eq!(params[0].0, "query.bibliographic");
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn parses_top_item() {
        let data = json!({
            "status": "ok",
            "message": {
                "items": [{
                    "title": ["Attention Is All You Need"],
                    "score": 87.5,
                    "DOI": "10.5555/3295222.3295349"
                }]
            }
        });
        let q = query(Some("Attention is all you need"), Some(2017));
        match parse_works_response(&data, &q) {
            VerifyOutcome::Match(m) => {
                assert_eq!(m.title, "Attention Is All You Need");
                assert_eq!(m.relevance, 87.5);
                assert!(m.similarity.unwrap() > 0.99);
                assert_eq!(m.doi.as_deref(), Some("10.5555/3295222.3295349"));
            }
            other => panic!("expected Match, got {other:?}"),
        }
    }

    #[test]
    fn no_items_is_not_found() {
        let data = json!({"message": {"items": []}});
        assert_eq!(parse_works_response(&data, &query(None, None)), VerifyOutcome::NotFound);
    }

    #[test]
    fn malformed_payload_is_not_available() {
        let data = json!({"message": "oops"});
        assert!(matches!(
            parse_works_response(&data, &query(None, None)),
            VerifyOutcome::NotAvailable { .. }
        ));
    }

    #[test]
    fn untitled_item_has_no_similarity() {
        let data = json!({"message": {"items": [{"score": 12.0}]}});
        match parse_works_response(&data, &query(Some("Some title"), None)) {
            VerifyOutcome::Match(m) => {
                assert_eq!(m.title, "");
                assert!(m.similarity.is_none());
            }
            other => panic!("expected Match, got {other:?}"),
        }
    }
}
