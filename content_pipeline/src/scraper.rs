use redact::Secret;
use serde::Deserialize;
use serde_json::json;

use crate::utils::truncate_chars;

const RESULT_LIMIT: usize = 3;
const EXCERPT_CHARS: usize = 2000;
const SEPARATOR: &str = "\n\n---\n\n";

pub trait ContextScraper {
    /// Recent web excerpts about `topic`, or an empty string. Never fails.
    fn scrape(&self, topic: &str) -> impl Future<Output = String> + Send;
}

/// Context scraper backed by a Firecrawl-compatible `/v1/search` endpoint.
#[derive(Debug, Clone)]
pub struct FirecrawlScraper {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<Secret<String>>,
}

impl FirecrawlScraper {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        api_key: Option<Secret<String>>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            api_key,
        }
    }

    async fn search(&self, topic: &str) -> Result<Vec<SearchHit>, String> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| "scraping API key is not configured".to_string())?;

        let response = self
            .http
            .post(format!("{}/v1/search", self.base_url.trim_end_matches('/')))
            .bearer_auth(api_key.expose_secret())
            .json(&json!({
                "query": topic,
                "limit": RESULT_LIMIT,
                "tbs": "qdr:w",
                "scrapeOptions": { "formats": ["markdown"] },
            }))
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("search returned status {status}"));
        }

        let body: SearchResponse =
            response.json().await.map_err(|e| e.to_string())?;

        Ok(body.data)
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<SearchHit>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SearchHit {
    url: String,
    title: Option<String>,
    description: Option<String>,
    markdown: Option<String>,
}

impl ContextScraper for FirecrawlScraper {
    #[tracing::instrument(skip(self))]
    async fn scrape(&self, topic: &str) -> String {
        match self.search(topic).await {
            Ok(hits) => {
                let context = format_excerpts(&hits);
                tracing::info!(
                    pages = hits.len().min(RESULT_LIMIT),
                    chars = context.len(),
                    "scraped context"
                );
                context
            }
            Err(e) => {
                tracing::warn!("context scraping failed, continuing without it: {e}");
                String::new()
            }
        }
    }
}

fn format_excerpts(hits: &[SearchHit]) -> String {
    hits.iter()
        .take(RESULT_LIMIT)
        .filter_map(|hit| {
            let text = hit
                .markdown
                .as_deref()
                .or(hit.description.as_deref())
                .map(str::trim)
                .filter(|text| !text.is_empty())?;

            let title = hit.title.as_deref().unwrap_or(&hit.url);

            Some(format!(
                "### {title}\nSource: {}\n\n{}",
                hit.url,
                truncate_chars(text, EXCERPT_CHARS)
            ))
        })
        .collect::<Vec<_>>()
        .join(SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::spawn_mock;
    use axum::{Json, Router, http::StatusCode, routing::post};

    fn scraper(base_url: &str) -> FirecrawlScraper {
        FirecrawlScraper::new(
            reqwest::Client::new(),
            base_url,
            Some(Secret::new("fc-key".to_string())),
        )
    }

    #[test]
    fn test_excerpts_are_limited_and_truncated() {
        let hits = (0..5)
            .map(|i| SearchHit {
                url: format!("https://site{i}.fr"),
                title: Some(format!("Page {i}")),
                markdown: Some("x".repeat(5000)),
                ..SearchHit::default()
            })
            .collect::<Vec<_>>();

        let context = format_excerpts(&hits);

        assert_eq!(context.matches("### Page").count(), 3);
        assert!(!context.contains("site3"));
        assert!(!context.contains(&"x".repeat(2001)));
        assert!(context.contains(&"x".repeat(2000)));
    }

    #[test]
    fn test_hits_without_text_are_skipped() {
        let hits = vec![SearchHit {
            url: "https://vide.fr".to_string(),
            ..SearchHit::default()
        }];

        assert_eq!(format_excerpts(&hits), "");
    }

    #[tokio::test]
    async fn test_scrape_sends_weekly_search() {
        let app = Router::new().route(
            "/v1/search",
            post(|Json(body): Json<serde_json::Value>| async move {
                assert_eq!(body["tbs"], "qdr:w");
                assert_eq!(body["limit"], 3);
                Json(serde_json::json!({
                    "success": true,
                    "data": [{
                        "url": "https://actu.fr/cpf",
                        "title": "CPF : ce qui change",
                        "markdown": "Le reste à charge passe à 100 euros."
                    }]
                }))
            }),
        );
        let base_url = spawn_mock(app).await;

        let context = scraper(&base_url).scrape("CPF").await;

        assert!(context.contains("### CPF : ce qui change"));
        assert!(context.contains("Le reste à charge"));
    }

    #[tokio::test]
    async fn test_scrape_degrades_on_non_2xx() {
        let app = Router::new().route(
            "/v1/search",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        );
        let base_url = spawn_mock(app).await;

        assert_eq!(scraper(&base_url).scrape("CPF").await, "");
    }

    #[tokio::test]
    async fn test_scrape_degrades_without_key() {
        let scraper =
            FirecrawlScraper::new(reqwest::Client::new(), "http://127.0.0.1:9", None);

        assert_eq!(scraper.scrape("CPF").await, "");
    }
}
