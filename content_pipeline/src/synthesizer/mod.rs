pub mod prompts;

use openai_dive::v1::api::Client;
use openai_dive::v1::resources::chat::{
    ChatCompletionParametersBuilder, ChatMessage, ChatMessageContent,
};
use redact::Secret;
use types::GeneratedContent;

use crate::error::PipelineError;
use crate::utils::extract_json_block;

const SERVICE: &str = "AI gateway";

/// Everything the synthesizer needs to write one run's content.
#[derive(Debug, Clone, Copy)]
pub struct SynthesisRequest<'a> {
    pub topic: &'a str,
    pub context: &'a str,
    pub scraped: &'a str,
    pub tone: &'a str,
    pub language: &'a str,
    pub forbidden_words: &'a [String],
}

pub trait ContentWriter {
    fn model_name(&self) -> &str;

    /// Raw text of one chat completion.
    fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> impl Future<Output = Result<String, PipelineError>> + Send;
}

/// Writer backed by an OpenAI-compatible gateway.
#[derive(Debug, Clone)]
pub struct GatewayWriter {
    base_url: String,
    model: String,
    api_key: Option<Secret<String>>,
}

impl GatewayWriter {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<Secret<String>>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            api_key,
        }
    }
}

impl ContentWriter for GatewayWriter {
    fn model_name(&self) -> &str {
        &self.model
    }

    #[tracing::instrument(skip_all, fields(model = %self.model))]
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, PipelineError> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or(PipelineError::MissingApiKey(SERVICE))?;

        let mut client = Client::new(api_key.expose_secret().clone());
        client.set_base_url(self.base_url.trim_end_matches('/'));

        let parameters = ChatCompletionParametersBuilder::default()
            .model(self.model.clone())
            .messages(vec![
                ChatMessage::System {
                    name: None,
                    content: ChatMessageContent::Text(system_prompt.to_string()),
                },
                ChatMessage::User {
                    name: None,
                    content: ChatMessageContent::Text(user_prompt.to_string()),
                },
            ])
            .build()
            .map_err(|e| PipelineError::Transport {
                service: SERVICE,
                message: e.to_string(),
            })?;

        let response = client.chat().create(parameters).await.map_err(|e| {
            tracing::error!("Failed to complete chat: {:?}", e);
            PipelineError::Transport {
                service: SERVICE,
                message: e.to_string(),
            }
        })?;

        let Some(choice) = response.choices.first() else {
            return Err(PipelineError::EmptyResponse { service: SERVICE });
        };

        if let Some(reason) = &choice.finish_reason {
            tracing::info!("Finish reason: {:?}", reason);
        }

        match &choice.message {
            ChatMessage::Assistant {
                content: Some(ChatMessageContent::Text(text)),
                ..
            } => Ok(text.clone()),
            _ => Err(PipelineError::EmptyResponse { service: SERVICE }),
        }
    }
}

/// Write the article and the four channel adaptations in a single call.
///
/// # Errors
/// Upstream failures, a reply without a parsable JSON object, or a reply
/// without an article.
pub async fn synthesize<W: ContentWriter + Sync>(
    writer: &W,
    request: &SynthesisRequest<'_>,
) -> Result<GeneratedContent, PipelineError> {
    let user_prompt = prompts::build_user_prompt(request);

    let text = writer.complete(prompts::SYSTEM_PROMPT, &user_prompt).await?;

    let content = parse_generated_content(&text)?;

    match &content.article {
        Some(article) if !article.title.trim().is_empty() => {}
        _ => return Err(PipelineError::MissingArticle),
    }

    let channels = [
        ("linkedin", content.linkedin.is_some()),
        ("instagram", content.instagram.is_some()),
        ("tiktok", content.tiktok.is_some()),
        ("twitter", content.twitter.is_some()),
    ];
    for (channel, present) in channels {
        if !present {
            tracing::warn!("AI response did not contain the {channel} channel");
        }
    }

    Ok(content)
}

/// Parse the first `{...}` block of a reply.
///
/// # Errors
/// [`PipelineError::ResponseParse`] when there is no block or it is not the
/// expected JSON.
pub fn parse_generated_content(
    text: &str,
) -> Result<GeneratedContent, PipelineError> {
    let block = extract_json_block(text).ok_or_else(|| {
        tracing::error!("AI response contains no JSON object");
        PipelineError::ResponseParse
    })?;

    serde_json::from_str(block).map_err(|e| {
        tracing::error!("AI response JSON is invalid: {e}");
        PipelineError::ResponseParse
    })
}

/// Forbidden words present anywhere in the generated text, compared without
/// case. The content is reported, never rewritten.
#[must_use]
pub fn find_forbidden_words(
    content: &GeneratedContent,
    forbidden_words: &[String],
) -> Vec<String> {
    let words = forbidden_words
        .iter()
        .map(|word| word.trim())
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>();
    if words.is_empty() {
        return Vec::new();
    }

    let mut haystack = String::new();
    if let Ok(value) = serde_json::to_value(content) {
        collect_text(&value, &mut haystack);
    }
    let haystack = haystack.to_lowercase();

    let mut found: Vec<String> = Vec::new();
    for word in words {
        if haystack.contains(&word.to_lowercase())
            && !found.iter().any(|f| f.eq_ignore_ascii_case(word))
        {
            found.push(word.to_string());
        }
    }

    found
}

fn collect_text(value: &serde_json::Value, out: &mut String) {
    match value {
        serde_json::Value::String(text) => {
            out.push_str(text);
            out.push('\n');
        }
        serde_json::Value::Array(items) => {
            items.iter().for_each(|item| collect_text(item, out));
        }
        serde_json::Value::Object(map) => {
            map.values().for_each(|item| collect_text(item, out));
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use types::Slide;

    struct CannedWriter {
        reply: String,
        prompts: Mutex<Vec<String>>,
    }

    impl CannedWriter {
        fn new(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    impl ContentWriter for CannedWriter {
        fn model_name(&self) -> &str {
            "canned"
        }

        async fn complete(
            &self,
            _system_prompt: &str,
            user_prompt: &str,
        ) -> Result<String, PipelineError> {
            self.prompts.lock().unwrap().push(user_prompt.to_string());
            Ok(self.reply.clone())
        }
    }

    fn request() -> SynthesisRequest<'static> {
        SynthesisRequest {
            topic: "Qualiopi",
            context: "Audit",
            scraped: "",
            tone: "professionnel",
            language: "fr",
            forbidden_words: &[],
        }
    }

    #[tokio::test]
    async fn test_synthesize_without_json_block_fails() {
        let writer = CannedWriter::new("Désolé, je ne peux pas répondre.");

        let error = synthesize(&writer, &request()).await.unwrap_err();

        assert_eq!(error.to_string(), "Failed to parse AI response as JSON");
    }

    #[tokio::test]
    async fn test_synthesize_without_article_fails() {
        let writer = CannedWriter::new(r#"{"twitter": {"tweets": ["1/"]}}"#);

        let error = synthesize(&writer, &request()).await.unwrap_err();

        assert!(matches!(error, PipelineError::MissingArticle));
    }

    #[tokio::test]
    async fn test_synthesize_keeps_missing_channels_absent() {
        let writer = CannedWriter::new(
            "Voici :\n{\"article\": {\"title\": \"T\", \"excerpt\": \"E\", \"content\": \"<p>C</p>\"}, \"linkedin\": {\"caption\": \"L\", \"slides\": [{\"type\": \"cover\", \"title\": \"T\"}]}}",
        );

        let content = synthesize(&writer, &request()).await.unwrap();

        assert_eq!(content.article.unwrap().title, "T");
        assert_eq!(content.linkedin.unwrap().slides.len(), 1);
        assert!(content.instagram.is_none());
        assert!(writer.prompts.lock().unwrap()[0].contains("Topic: Qualiopi"));
    }

    #[tokio::test]
    async fn test_synthesize_tolerates_sloppy_slides() {
        let writer = CannedWriter::new(
            r#"{
                "article": {"title": "T", "excerpt": "E", "content": "<p>C</p>"},
                "linkedin": {"caption": "L", "slides": [
                    {"title": "no type"},
                    {"type": "quote", "title": "Citation", "body": "Texte"}
                ]}
            }"#,
        );

        let content = synthesize(&writer, &request()).await.unwrap();

        let slides = content.linkedin.unwrap().slides;
        assert!(matches!(&slides[0], Slide::Content { title, .. } if title == "no type"));
        assert!(matches!(&slides[1], Slide::Other(raw) if raw["body"] == "Texte"));
    }

    #[test]
    fn test_find_forbidden_words_ignores_case_and_keys() {
        let content: GeneratedContent = serde_json::from_str(
            r#"{
                "article": {"title": "Formation GRATUITE", "excerpt": "", "content": "<p>Le type de parcours</p>"},
                "twitter": {"tweets": ["Un financement garanti"]}
            }"#,
        )
        .unwrap();

        let found = find_forbidden_words(
            &content,
            &[
                "gratuite".to_string(),
                "garanti".to_string(),
                "miracle".to_string(),
                "title".to_string(),
            ],
        );

        assert_eq!(found, vec!["gratuite", "garanti"]);
    }
}
