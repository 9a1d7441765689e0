//! Shapes of the content produced by the multi-channel synthesizer.
//!
//! The model answers with loosely specified JSON, so every field here is
//! lenient: missing values default, a few common aliases are accepted and
//! durations may come back as numbers or strings.

use serde::{Deserialize, Deserializer, Serialize};

/// Whole synthesizer answer. A channel the model left out stays `None` and is
/// skipped downstream.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GeneratedContent {
    #[serde(default)]
    pub article: Option<GeneratedArticle>,

    #[serde(default)]
    pub linkedin: Option<CarouselPost>,

    #[serde(default)]
    pub instagram: Option<CarouselPost>,

    #[serde(default)]
    pub tiktok: Option<TiktokPost>,

    #[serde(default)]
    pub twitter: Option<TwitterThread>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratedArticle {
    pub title: String,
    pub excerpt: String,

    /// HTML body.
    pub content: String,

    pub seo_title: Option<String>,

    #[serde(alias = "meta_description")]
    pub seo_description: Option<String>,

    #[serde(alias = "keywords")]
    pub seo_keywords: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CarouselPost {
    pub caption: String,
    pub hashtags: Vec<String>,

    #[serde(deserialize_with = "lenient_slides")]
    pub slides: Vec<Slide>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TiktokPost {
    pub caption: String,
    pub hashtags: Vec<String>,

    #[serde(alias = "script")]
    pub video_script: VideoScript,

    #[serde(deserialize_with = "lenient_slides")]
    pub slides: Vec<Slide>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TwitterThread {
    #[serde(alias = "thread")]
    pub tweets: Vec<String>,

    pub hashtags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoScript {
    pub hook: String,
    pub scenes: Vec<Scene>,

    #[serde(alias = "music")]
    pub music_suggestion: Option<String>,

    #[serde(deserialize_with = "string_or_number")]
    pub total_duration: Option<String>,

    #[serde(alias = "cta")]
    pub call_to_action: Option<String>,
}

impl VideoScript {
    /// Plain-text rendering stored in the `video_script` column so reviewers
    /// can read the script without the structured view.
    #[must_use]
    pub fn to_script_text(&self) -> String {
        let mut lines = Vec::with_capacity(self.scenes.len() + 4);

        if !self.hook.is_empty() {
            lines.push(format!("HOOK: {}", self.hook));
        }

        for (index, scene) in self.scenes.iter().enumerate() {
            let timing = scene
                .timing
                .as_deref()
                .map_or_else(|| format!("#{}", index + 1), str::to_string);
            let mut line = format!("[{timing}] {}", scene.visual);
            if !scene.voiceover.is_empty() {
                line.push_str(&format!(" | VO: {}", scene.voiceover));
            }
            if let Some(overlay) = &scene.text_overlay {
                line.push_str(&format!(" | TEXT: {overlay}"));
            }
            lines.push(line);
        }

        if let Some(cta) = &self.call_to_action {
            lines.push(format!("CTA: {cta}"));
        }
        if let Some(music) = &self.music_suggestion {
            lines.push(format!("MUSIC: {music}"));
        }

        lines.join("\n")
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Scene {
    #[serde(alias = "time", deserialize_with = "string_or_number")]
    pub timing: Option<String>,

    #[serde(alias = "visual_description", alias = "description")]
    pub visual: String,

    #[serde(alias = "narration", alias = "voice_over")]
    pub voiceover: String,

    #[serde(alias = "text")]
    pub text_overlay: Option<String>,
}

/// One carousel slide. Kinds the model invents outside the known set are
/// kept verbatim as [`Slide::Other`] rather than failing the whole answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Slide {
    Cover {
        #[serde(default)]
        title: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subtitle: Option<String>,
    },
    Content {
        #[serde(default)]
        title: String,
        #[serde(default, alias = "text", alias = "content")]
        body: String,
    },
    Stat {
        #[serde(default, alias = "stat", deserialize_with = "string_or_number")]
        value: Option<String>,
        #[serde(default)]
        label: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source: Option<String>,
    },
    Cta {
        #[serde(default)]
        title: String,
        #[serde(default, alias = "text", alias = "content")]
        body: String,
    },
    Fact {
        #[serde(default)]
        title: String,
        #[serde(default, alias = "text", alias = "content")]
        body: String,
    },
    Tips {
        #[serde(default)]
        title: String,
        #[serde(default, alias = "items")]
        tips: Vec<String>,
    },
    Solution {
        #[serde(default)]
        title: String,
        #[serde(default, alias = "text", alias = "content")]
        body: String,
    },
    #[serde(rename = "result")]
    Outcome {
        #[serde(default)]
        title: String,
        #[serde(default, alias = "text", alias = "content")]
        body: String,
    },
    #[serde(untagged)]
    Other(serde_json::Value),
}

/// Structured payload stored on a social post, one variant per platform the
/// synthesizer writes for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "platform", rename_all = "snake_case")]
pub enum StructuredContent {
    Linkedin(CarouselPost),
    Instagram(CarouselPost),
    Tiktok(TiktokPost),
    Twitter(TwitterThread),
}

impl StructuredContent {
    #[must_use]
    pub fn slide_count(&self) -> usize {
        match self {
            Self::Linkedin(post) | Self::Instagram(post) => post.slides.len(),
            Self::Tiktok(post) => post.slides.len(),
            Self::Twitter(_) => 0,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrNumber {
    String(String),
    Number(serde_json::Number),
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<StringOrNumber>::deserialize(deserializer)?;

    Ok(value.map(|value| match value {
        StringOrNumber::String(s) => s,
        StringOrNumber::Number(n) => n.to_string(),
    }))
}

/// Slides as the model wrote them. A slide object without a `type` is a
/// plain content slide.
fn lenient_slides<'de, D>(deserializer: D) -> Result<Vec<Slide>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Vec<serde_json::Value>>::deserialize(deserializer)?;

    raw.unwrap_or_default()
        .into_iter()
        .map(|mut slide| {
            if let serde_json::Value::Object(fields) = &mut slide {
                fields
                    .entry("type")
                    .or_insert_with(|| serde_json::Value::from("content"));
            }
            serde_json::from_value(slide).map_err(serde::de::Error::custom)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slides_parse_known_and_unknown_kinds() {
        let slides: Vec<Slide> = serde_json::from_str(
            r#"[
                {"type": "cover", "title": "Qualiopi 2025", "subtitle": "Ce qui change"},
                {"type": "stat", "value": 72, "label": "des OF certifiés"},
                {"type": "tips", "title": "3 conseils", "items": ["a", "b", "c"]},
                {"type": "result", "title": "Résultat", "text": "Audit réussi"},
                {"type": "meme", "title": "?"}
            ]"#,
        )
        .unwrap();

        assert_eq!(slides.len(), 5);
        assert!(matches!(&slides[0], Slide::Cover { subtitle: Some(s), .. } if s == "Ce qui change"));
        assert!(matches!(&slides[1], Slide::Stat { value: Some(v), .. } if v == "72"));
        assert!(matches!(&slides[2], Slide::Tips { tips, .. } if tips.len() == 3));
        assert!(matches!(&slides[3], Slide::Outcome { body, .. } if body == "Audit réussi"));
        assert_eq!(
            slides[4],
            Slide::Other(serde_json::json!({"type": "meme", "title": "?"}))
        );
    }

    #[test]
    fn test_unknown_slide_kind_keeps_its_text() {
        let quote = serde_json::json!({
            "type": "quote",
            "title": "Citation",
            "body": "La formation est un investissement."
        });
        let post: CarouselPost = serde_json::from_value(serde_json::json!({
            "caption": "C",
            "slides": [quote.clone()]
        }))
        .unwrap();

        assert_eq!(post.slides, vec![Slide::Other(quote.clone())]);
        assert_eq!(serde_json::to_value(&post).unwrap()["slides"][0], quote);
    }

    #[test]
    fn test_slide_without_type_is_content() {
        let content: GeneratedContent = serde_json::from_str(
            r#"{
                "article": {"title": "T", "excerpt": "E", "content": "<p>C</p>"},
                "linkedin": {"caption": "L", "slides": [{"title": "no type", "text": "Corps"}]},
                "tiktok": {"caption": "T", "slides": null}
            }"#,
        )
        .unwrap();

        let linkedin = content.linkedin.unwrap();
        assert_eq!(
            linkedin.slides,
            vec![Slide::Content {
                title: "no type".to_string(),
                body: "Corps".to_string(),
            }]
        );
        assert!(content.tiktok.unwrap().slides.is_empty());
    }

    #[test]
    fn test_structured_content_is_tagged_by_platform() {
        let content = StructuredContent::Twitter(TwitterThread {
            tweets: vec!["1/ hello".to_string()],
            hashtags: vec![],
        });

        let json = serde_json::to_value(&content).unwrap();
        assert_eq!(json["platform"], "twitter");
        assert_eq!(json["tweets"][0], "1/ hello");

        let back: StructuredContent = serde_json::from_value(json).unwrap();
        assert_eq!(back, content);
    }

    #[test]
    fn test_video_script_accepts_numeric_timings() {
        let script: VideoScript = serde_json::from_str(
            r#"{
                "hook": "Vous perdez des stagiaires ?",
                "scenes": [
                    {"time": 3, "visual": "Salle vide", "voiceover": "Chaque année..."},
                    {"timing": "3-8s", "visual_description": "Graphique", "narration": "Les chiffres"}
                ],
                "music": "lofi",
                "total_duration": 30
            }"#,
        )
        .unwrap();

        assert_eq!(script.scenes[0].timing.as_deref(), Some("3"));
        assert_eq!(script.scenes[1].visual, "Graphique");
        assert_eq!(script.total_duration.as_deref(), Some("30"));

        let text = script.to_script_text();
        assert!(text.starts_with("HOOK: Vous perdez des stagiaires ?"));
        assert!(text.contains("[3-8s] Graphique | VO: Les chiffres"));
        assert!(text.ends_with("MUSIC: lofi"));
    }

    #[test]
    fn test_missing_channels_stay_none() {
        let content: GeneratedContent = serde_json::from_str(
            r#"{"article": {"title": "T", "excerpt": "E", "content": "<p>C</p>"}}"#,
        )
        .unwrap();

        assert!(content.article.is_some());
        assert!(content.linkedin.is_none());
        assert!(content.tiktok.is_none());
    }
}
