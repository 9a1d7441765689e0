use redact::Secret;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::PipelineError;
use crate::utils::{extract_json_block, truncate_chars};

const SERVICE: &str = "trend detection";

/// Used when a tenant has not configured any candidate topics.
pub const DEFAULT_TOPICS: [&str; 5] = [
    "Certification Qualiopi",
    "Financement CPF",
    "Formation professionnelle continue",
    "Digital learning en entreprise",
    "OPCO et financement des formations",
];

const TOPIC_FALLBACK_CHARS: usize = 120;

const SYSTEM_PROMPT: &str = "You are a trend analyst for the professional \
training sector (training organisations, certification, funding, digital \
learning). Search the web for news published during the past week. Answer \
with a single JSON object and nothing else, shaped as \
{\"topic\": string, \"context\": string, \"sources\": [string]}. The topic \
must be specific and current, the context three to five sentences, the \
sources the URLs you relied on.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendResult {
    pub topic: String,
    pub context: String,
    pub sources: Vec<String>,
}

pub trait TrendDetector {
    /// Pick one trending topic among `topics`.
    fn detect_trend(
        &self,
        topics: &[String],
    ) -> impl Future<Output = Result<TrendResult, PipelineError>> + Send;
}

/// Trend detector backed by a Perplexity-compatible chat completions API.
#[derive(Debug, Clone)]
pub struct PerplexityTrendDetector {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<Secret<String>>,
}

impl PerplexityTrendDetector {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<Secret<String>>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            model: model.into(),
            api_key,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    citations: Vec<String>,
    #[serde(default)]
    search_results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    url: String,
}

#[derive(Debug, Deserialize)]
struct TrendReply {
    topic: String,
    #[serde(default, alias = "summary")]
    context: String,
    #[serde(default)]
    sources: Vec<String>,
}

impl TrendDetector for PerplexityTrendDetector {
    #[tracing::instrument(skip(self))]
    async fn detect_trend(
        &self,
        topics: &[String],
    ) -> Result<TrendResult, PipelineError> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or(PipelineError::MissingApiKey(SERVICE))?;

        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": build_user_prompt(topics) },
            ],
            "search_recency_filter": "week",
        });

        let response = self
            .http
            .post(format!(
                "{}/chat/completions",
                self.base_url.trim_end_matches('/')
            ))
            .bearer_auth(api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| PipelineError::Transport {
                service: SERVICE,
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!("trend detection failed with status {status}");
            return Err(PipelineError::UpstreamStatus {
                service: SERVICE,
                status: status.as_u16(),
                body: truncate_chars(&body, 500).to_string(),
            });
        }

        let reply: ChatReply =
            response.json().await.map_err(|e| PipelineError::Transport {
                service: SERVICE,
                message: e.to_string(),
            })?;

        let text = reply
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(PipelineError::EmptyResponse { service: SERVICE });
        }

        let citations = reply
            .citations
            .into_iter()
            .chain(reply.search_results.into_iter().map(|r| r.url))
            .collect::<Vec<_>>();

        let trend = parse_trend_reply(&text, citations);
        tracing::info!(topic = %trend.topic, sources = trend.sources.len(), "trend detected");

        Ok(trend)
    }
}

fn build_user_prompt(topics: &[String]) -> String {
    let candidates = if topics.is_empty() {
        DEFAULT_TOPICS.iter().map(ToString::to_string).collect()
    } else {
        topics.to_vec()
    };

    let list = candidates
        .iter()
        .map(|topic| format!("- {topic}"))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Candidate topics:\n{list}\n\nPick the single topic with the strongest \
         news momentum this week. You may narrow it to a precise angle."
    )
}

/// Turn the model reply into a [`TrendResult`]. A reply that is not the
/// expected JSON is kept whole as the context, its beginning becomes the
/// topic.
pub fn parse_trend_reply(text: &str, citations: Vec<String>) -> TrendResult {
    let parsed = extract_json_block(text)
        .and_then(|block| serde_json::from_str::<TrendReply>(block).ok())
        .filter(|reply| !reply.topic.trim().is_empty());

    let mut trend = parsed.map_or_else(
        || {
            tracing::warn!("trend reply is not valid JSON, using raw text");
            let raw = text.trim();
            TrendResult {
                topic: truncate_chars(raw, TOPIC_FALLBACK_CHARS).trim().to_string(),
                context: raw.to_string(),
                sources: Vec::new(),
            }
        },
        |reply| TrendResult {
            topic: reply.topic.trim().to_string(),
            context: reply.context,
            sources: reply.sources,
        },
    );

    for citation in citations {
        if !trend.sources.contains(&citation) {
            trend.sources.push(citation);
        }
    }

    trend
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::spawn_mock;
    use axum::{Json, Router, http::StatusCode, routing::post};

    fn detector(base_url: &str, api_key: Option<&str>) -> PerplexityTrendDetector {
        PerplexityTrendDetector::new(
            reqwest::Client::new(),
            base_url,
            "sonar",
            api_key.map(|key| Secret::new(key.to_string())),
        )
    }

    #[test]
    fn test_parse_trend_reply_merges_citations() {
        let trend = parse_trend_reply(
            "```json\n{\"topic\": \"Réforme CPF\", \"context\": \"Nouveau reste à charge\", \"sources\": [\"https://a.fr\"]}\n```",
            vec!["https://a.fr".to_string(), "https://b.fr".to_string()],
        );

        assert_eq!(trend.topic, "Réforme CPF");
        assert_eq!(trend.context, "Nouveau reste à charge");
        assert_eq!(trend.sources, vec!["https://a.fr", "https://b.fr"]);
    }

    #[test]
    fn test_parse_trend_reply_falls_back_to_raw_text() {
        let raw = "La réforme du CPF ".repeat(20);
        let trend = parse_trend_reply(&raw, vec![]);

        assert_eq!(trend.context, raw.trim());
        assert!(trend.topic.chars().count() <= 120);
        assert!(raw.starts_with(&trend.topic));
    }

    #[test]
    fn test_user_prompt_uses_default_topics_when_empty() {
        let prompt = build_user_prompt(&[]);
        assert!(prompt.contains("- Certification Qualiopi"));

        let prompt = build_user_prompt(&["IA et formation".to_string()]);
        assert!(prompt.contains("- IA et formation"));
        assert!(!prompt.contains("Qualiopi"));
    }

    #[tokio::test]
    async fn test_detect_trend_reads_choice_and_citations() {
        let app = Router::new().route(
            "/chat/completions",
            post(|| async {
                Json(serde_json::json!({
                    "choices": [{
                        "message": {
                            "content": "{\"topic\": \"IA générative en formation\", \"context\": \"ctx\", \"sources\": []}"
                        }
                    }],
                    "citations": ["https://news.example/ia"]
                }))
            }),
        );
        let base_url = spawn_mock(app).await;

        let trend = detector(&base_url, Some("key"))
            .detect_trend(&["IA".to_string()])
            .await
            .unwrap();

        assert_eq!(trend.topic, "IA générative en formation");
        assert_eq!(trend.sources, vec!["https://news.example/ia"]);
    }

    #[tokio::test]
    async fn test_detect_trend_fails_on_non_2xx() {
        let app = Router::new().route(
            "/chat/completions",
            post(|| async { (StatusCode::TOO_MANY_REQUESTS, "slow down") }),
        );
        let base_url = spawn_mock(app).await;

        let error = detector(&base_url, Some("key"))
            .detect_trend(&[])
            .await
            .unwrap_err();

        assert!(matches!(
            error,
            PipelineError::UpstreamStatus { status: 429, .. }
        ));
    }

    #[tokio::test]
    async fn test_detect_trend_requires_api_key() {
        let error = detector("http://127.0.0.1:9", None)
            .detect_trend(&[])
            .await
            .unwrap_err();

        assert!(matches!(error, PipelineError::MissingApiKey(_)));
    }
}
