use base64::{Engine as _, engine::general_purpose::STANDARD};
use redact::Secret;
use serde_json::{Value, json};
use types::Scene;

use crate::error::PipelineError;
use crate::media::MediaStorage;

const SERVICE: &str = "image generation";

/// What an image model handed back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeneratedImage {
    Bytes { data: Vec<u8>, content_type: String },
    Url(String),
}

pub trait ImageModel {
    fn generate(
        &self,
        prompt: &str,
    ) -> impl Future<Output = Result<GeneratedImage, PipelineError>> + Send;
}

/// Image generation through the gateway's image-capable chat model.
#[derive(Debug, Clone)]
pub struct GatewayImageModel {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<Secret<String>>,
}

impl GatewayImageModel {
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

impl ImageModel for GatewayImageModel {
    async fn generate(&self, prompt: &str) -> Result<GeneratedImage, PipelineError> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or(PipelineError::MissingApiKey(SERVICE))?;

        let response = self
            .http
            .post(format!(
                "{}/chat/completions",
                self.base_url.trim_end_matches('/')
            ))
            .bearer_auth(api_key.expose_secret())
            .json(&json!({
                "model": self.model,
                "messages": [{ "role": "user", "content": prompt }],
                "modalities": ["image", "text"],
            }))
            .send()
            .await
            .map_err(|e| PipelineError::Transport {
                service: SERVICE,
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::UpstreamStatus {
                service: SERVICE,
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let body: Value =
            response.json().await.map_err(|e| PipelineError::Transport {
                service: SERVICE,
                message: e.to_string(),
            })?;

        let reference = image_reference(&body)
            .ok_or(PipelineError::EmptyResponse { service: SERVICE })?;

        decode_image_reference(reference).map_err(|message| {
            PipelineError::Transport {
                service: SERVICE,
                message,
            }
        })
    }
}

/// Locate the image in a reply: the chat `images` extension, an inline
/// content string, or the images API `data` array.
fn image_reference(body: &Value) -> Option<&str> {
    let message = &body["choices"][0]["message"];

    message["images"][0]["image_url"]["url"]
        .as_str()
        .or_else(|| {
            message["content"].as_str().filter(|content| {
                content.starts_with("data:") || content.starts_with("http")
            })
        })
        .or_else(|| body["data"][0]["b64_json"].as_str())
        .or_else(|| body["data"][0]["url"].as_str())
}

/// Turn a data URL, a bare base64 payload or a remote URL into an image.
///
/// # Errors
/// If the payload is not valid base64.
pub fn decode_image_reference(reference: &str) -> Result<GeneratedImage, String> {
    let reference = reference.trim();

    if reference.starts_with("http://") || reference.starts_with("https://") {
        return Ok(GeneratedImage::Url(reference.to_string()));
    }

    if let Some(rest) = reference.strip_prefix("data:") {
        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| "malformed data URL".to_string())?;
        let content_type = header
            .split(';')
            .next()
            .filter(|mime| !mime.is_empty())
            .unwrap_or("image/png");
        let data = STANDARD
            .decode(payload.trim())
            .map_err(|e| format!("invalid base64 payload: {e}"))?;

        return Ok(GeneratedImage::Bytes {
            data,
            content_type: content_type.to_string(),
        });
    }

    let data = STANDARD
        .decode(reference)
        .map_err(|e| format!("invalid base64 payload: {e}"))?;
    let content_type = sniff_content_type(&data).to_string();

    Ok(GeneratedImage::Bytes { data, content_type })
}

fn sniff_content_type(data: &[u8]) -> &'static str {
    if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        "image/jpeg"
    } else if data.starts_with(b"GIF8") {
        "image/gif"
    } else if data.len() >= 12 && &data[..4] == b"RIFF" && &data[8..12] == b"WEBP" {
        "image/webp"
    } else {
        "image/png"
    }
}

#[must_use]
pub fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "png",
    }
}

fn scene_prompt(topic: &str, scene: &Scene) -> String {
    let mut prompt = format!(
        "Vertical 9:16 illustration for a short educational video about \"{topic}\". Scene: {}.",
        scene.visual.trim()
    );
    if let Some(overlay) = scene.text_overlay.as_deref().filter(|o| !o.trim().is_empty()) {
        prompt.push_str(&format!(" The scene conveys: {}.", overlay.trim()));
    }
    prompt.push_str(" Clean, modern, professional style. No text in the image.");
    prompt
}

/// One image per scene, in order. Scenes are generated one at a time and a
/// failing scene is skipped, so the result holds at most `scenes.len()`
/// URLs.
pub async fn generate_scene_images<I, M>(
    model: &I,
    media: &M,
    scenes: &[Scene],
    topic: &str,
    key_prefix: &str,
) -> Vec<String>
where
    I: ImageModel + Sync,
    M: MediaStorage + Sync,
{
    let mut urls = Vec::with_capacity(scenes.len());

    for (index, scene) in scenes.iter().enumerate() {
        let number = index + 1;

        let image = match model.generate(&scene_prompt(topic, scene)).await {
            Ok(image) => image,
            Err(e) => {
                tracing::warn!("scene {number} image generation failed: {e}");
                continue;
            }
        };

        let url = match image {
            GeneratedImage::Url(url) => url,
            GeneratedImage::Bytes { data, content_type } => {
                let key = format!(
                    "{}/{}-scene-{number}.{}",
                    key_prefix.trim_end_matches('/'),
                    chrono::Utc::now().timestamp_millis(),
                    extension_for(&content_type)
                );
                match media.upload(&key, &content_type, data).await {
                    Ok(url) => url,
                    Err(e) => {
                        tracing::warn!("scene {number} image upload failed: {e}");
                        continue;
                    }
                }
            }
        };

        urls.push(url);
    }

    tracing::info!(
        generated = urls.len(),
        scenes = scenes.len(),
        "scene images generated"
    );

    urls
}
