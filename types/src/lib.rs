// Records shared by the autopilot functions.
//
// Every record is stored as a DynamoDB item through `serde_dynamo` and
// returned as JSON by the HTTP functions, so the serde shape here is the
// wire shape for both.
//
// use types::SocialPost;
//
// fn main() {
//     let json = r#"{"id": "...", "platform": "linkedin", ...}"#;
//     let post: SocialPost = serde_json::from_str(&json).unwrap();
// }

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

pub mod content;

pub use content::{
    CarouselPost, GeneratedArticle, GeneratedContent, Scene, Slide,
    StructuredContent, TiktokPost, TwitterThread, VideoScript,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Linkedin,
    Instagram,
    Tiktok,
    Twitter,
    Facebook,
    Youtube,
    Threads,
    Pinterest,
}

impl Platform {
    /// The channels the synthesizer writes, in the order they are persisted.
    pub const GENERATED: [Self; 4] =
        [Self::Linkedin, Self::Instagram, Self::Tiktok, Self::Twitter];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Linkedin => "linkedin",
            Self::Instagram => "instagram",
            Self::Tiktok => "tiktok",
            Self::Twitter => "twitter",
            Self::Facebook => "facebook",
            Self::Youtube => "youtube",
            Self::Threads => "threads",
            Self::Pinterest => "pinterest",
        }
    }

    /// Host used when building the URL of a simulated publication.
    #[must_use]
    pub const fn web_host(self) -> &'static str {
        match self {
            Self::Linkedin => "www.linkedin.com",
            Self::Instagram => "www.instagram.com",
            Self::Tiktok => "www.tiktok.com",
            Self::Twitter => "x.com",
            Self::Facebook => "www.facebook.com",
            Self::Youtube => "www.youtube.com",
            Self::Threads => "www.threads.net",
            Self::Pinterest => "www.pinterest.com",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunType {
    Manual,
    Scheduled,
    RunOnce,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

/// Flags describing what a run produced, stored alongside the run row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunMetadata {
    pub channels: Vec<Platform>,
    pub has_scraped_context: bool,
    pub scene_image_count: usize,
    pub forced: bool,
    pub forbidden_words_found: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutopilotRun {
    pub id: String,
    pub tenant_id: String,
    pub run_type: RunType,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trend_topic: Option<String>,

    #[serde(default)]
    pub trend_sources: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub article_id: Option<String>,

    #[serde(default)]
    pub social_posts_generated: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_model: Option<String>,

    #[serde(default)]
    pub metadata: RunMetadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArticleStatus {
    Draft,
    Scheduled,
    Published,
}

impl ArticleStatus {
    /// Articles are never deleted, editors move them between states instead.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Draft, Self::Scheduled | Self::Published)
                | (Self::Scheduled, Self::Published | Self::Draft)
                | (Self::Published, Self::Draft)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlogPost {
    pub id: String,
    pub tenant_id: String,
    pub title: String,
    pub slug: String,
    pub excerpt: String,
    pub content: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seo_title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seo_description: Option<String>,

    #[serde(default)]
    pub seo_keywords: Vec<String>,

    pub status: ArticleStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_for: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_id: Option<String>,

    #[serde(default)]
    pub ai_generated: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autopilot_run_id: Option<String>,

    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Carousel,
    VideoScript,
    Thread,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostStatus {
    Draft,
    Scheduled,
    Publishing,
    Published,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocialPost {
    pub id: String,
    pub tenant_id: String,
    pub platform: Platform,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blog_post_id: Option<String>,

    pub caption: String,

    #[serde(default)]
    pub hashtags: Vec<String>,

    pub content_type: ContentType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_content: Option<StructuredContent>,

    #[serde(default)]
    pub slide_count: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_script: Option<String>,

    #[serde(default)]
    pub thread_tweets: Vec<String>,

    #[serde(default)]
    pub media_urls: Vec<String>,

    pub status: PostStatus,
    pub approval_status: ApprovalStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_for: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_post_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish_error: Option<String>,

    #[serde(default)]
    pub ai_generated: bool,

    #[serde(default)]
    pub auto_published: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,

    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Connected,
    Expired,
    Error,
    Disconnected,
}

/// Credential state of one platform account. The tokens themselves live in
/// Secrets Manager, see [`PlatformTokens`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocialConnection {
    pub tenant_id: String,
    pub platform: Platform,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,

    pub connection_status: ConnectionStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_expires_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_tested_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connected_at: Option<DateTime<Utc>>,
}

/// OAuth tokens of a connected platform account, stored as a secret.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct PlatformTokens {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Seconds since the unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<f64>,
}

impl fmt::Debug for PlatformTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlatformTokens")
            .field("access_token", &self.access_token.as_ref().map(|_| "[REDACTED]"))
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("valid_until", &self.valid_until)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutopilotFrequency {
    Daily,
    TwiceWeekly,
    #[default]
    Weekly,
}

impl AutopilotFrequency {
    #[must_use]
    pub const fn interval_hours(self) -> i64 {
        match self {
            Self::Daily => 24,
            Self::TwiceWeekly => 84,
            Self::Weekly => 168,
        }
    }
}

/// Per-tenant autopilot configuration. Missing attributes fall back to the
/// defaults below, so a tenant without a row behaves as "disabled".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishingSettings {
    pub tenant_id: String,
    pub autopilot_enabled: bool,
    pub autopilot_frequency: AutopilotFrequency,
    pub autopilot_topics: Vec<String>,
    pub autopilot_tone: String,
    pub emergency_stop: bool,
    pub require_approval: bool,
    pub auto_publish_enabled: bool,
    pub auto_publish_platforms: Vec<Platform>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand_tone: Option<String>,

    pub forbidden_words: Vec<String>,
    pub default_hashtags: Vec<String>,
    /// Platform name to `HH:MM` UTC slots.
    pub best_posting_times: HashMap<String, Vec<String>>,
    pub content_language: String,
    pub scene_images_enabled: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_run_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_run_started_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for PublishingSettings {
    fn default() -> Self {
        Self {
            tenant_id: String::new(),
            autopilot_enabled: false,
            autopilot_frequency: AutopilotFrequency::default(),
            autopilot_topics: Vec::new(),
            autopilot_tone: "professionnel et accessible".to_string(),
            emergency_stop: false,
            require_approval: true,
            auto_publish_enabled: false,
            auto_publish_platforms: Vec::new(),
            brand_tone: None,
            forbidden_words: Vec::new(),
            default_hashtags: Vec::new(),
            best_posting_times: HashMap::new(),
            content_language: "fr".to_string(),
            scene_images_enabled: true,
            last_run_at: None,
            active_run_id: None,
            active_run_started_at: None,
            updated_at: None,
        }
    }
}

impl PublishingSettings {
    #[must_use]
    pub fn posting_times(&self, platform: Platform) -> &[String] {
        self.best_posting_times
            .get(platform.as_str())
            .map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn for_tenant(tenant_id: &str) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            ..Self::default()
        }
    }

    /// Tone handed to the synthesizer: the brand tone wins over the
    /// autopilot tone when both are set.
    #[must_use]
    pub fn effective_tone(&self) -> &str {
        self.brand_tone
            .as_deref()
            .filter(|tone| !tone.trim().is_empty())
            .unwrap_or(&self.autopilot_tone)
    }
}

/// Partial update of [`PublishingSettings`]; `None` leaves the stored value
/// untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingsUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autopilot_enabled: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emergency_stop: Option<bool>,

    #[serde(default, alias = "topics", skip_serializing_if = "Option::is_none")]
    pub autopilot_topics: Option<Vec<String>>,

    #[serde(default, alias = "tone", skip_serializing_if = "Option::is_none")]
    pub autopilot_tone: Option<String>,

    #[serde(default, alias = "frequency", skip_serializing_if = "Option::is_none")]
    pub autopilot_frequency: Option<AutopilotFrequency>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub require_approval: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_publish_enabled: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_publish_platforms: Option<Vec<Platform>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand_tone: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forbidden_words: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_hashtags: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best_posting_times: Option<HashMap<String, Vec<String>>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_language: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scene_images_enabled: Option<bool>,
}

impl SettingsUpdate {
    /// Applies the present fields onto `settings`.
    pub fn apply_to(&self, settings: &mut PublishingSettings) {
        if let Some(value) = self.autopilot_enabled {
            settings.autopilot_enabled = value;
        }
        if let Some(value) = self.emergency_stop {
            settings.emergency_stop = value;
        }
        if let Some(value) = &self.autopilot_topics {
            settings.autopilot_topics.clone_from(value);
        }
        if let Some(value) = &self.autopilot_tone {
            settings.autopilot_tone.clone_from(value);
        }
        if let Some(value) = self.autopilot_frequency {
            settings.autopilot_frequency = value;
        }
        if let Some(value) = self.require_approval {
            settings.require_approval = value;
        }
        if let Some(value) = self.auto_publish_enabled {
            settings.auto_publish_enabled = value;
        }
        if let Some(value) = &self.auto_publish_platforms {
            settings.auto_publish_platforms.clone_from(value);
        }
        if let Some(value) = &self.brand_tone {
            settings.brand_tone = Some(value.clone());
        }
        if let Some(value) = &self.forbidden_words {
            settings.forbidden_words.clone_from(value);
        }
        if let Some(value) = &self.default_hashtags {
            settings.default_hashtags.clone_from(value);
        }
        if let Some(value) = &self.best_posting_times {
            settings.best_posting_times.clone_from(value);
        }
        if let Some(value) = &self.content_language {
            settings.content_language.clone_from(value);
        }
        if let Some(value) = self.scene_images_enabled {
            settings.scene_images_enabled = value;
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_article_transitions() {
        assert!(ArticleStatus::Draft.can_transition_to(ArticleStatus::Scheduled));
        assert!(ArticleStatus::Draft.can_transition_to(ArticleStatus::Published));
        assert!(ArticleStatus::Scheduled.can_transition_to(ArticleStatus::Draft));
        assert!(ArticleStatus::Published.can_transition_to(ArticleStatus::Draft));
        assert!(
            !ArticleStatus::Published.can_transition_to(ArticleStatus::Scheduled)
        );
        assert!(!ArticleStatus::Draft.can_transition_to(ArticleStatus::Draft));
    }

    #[test]
    fn test_settings_defaults_from_empty_item() {
        let settings: PublishingSettings =
            serde_json::from_str(r#"{"tenant_id": "acme"}"#).unwrap();

        assert_eq!(settings.tenant_id, "acme");
        assert!(!settings.autopilot_enabled);
        assert!(!settings.emergency_stop);
        assert!(settings.require_approval);
        assert_eq!(settings.autopilot_frequency, AutopilotFrequency::Weekly);
    }

    #[test]
    fn test_settings_update_only_touches_present_fields() {
        let mut settings = PublishingSettings::for_tenant("acme");
        settings.autopilot_topics = vec!["Qualiopi".to_string()];

        let update = SettingsUpdate {
            autopilot_tone: Some("enthousiaste".to_string()),
            require_approval: Some(false),
            ..SettingsUpdate::default()
        };
        update.apply_to(&mut settings);

        assert_eq!(settings.autopilot_tone, "enthousiaste");
        assert!(!settings.require_approval);
        assert_eq!(settings.autopilot_topics, vec!["Qualiopi".to_string()]);
    }

    #[test]
    fn test_settings_update_accepts_short_names() {
        let update: SettingsUpdate = serde_json::from_str(
            r#"{"topics": ["CPF"], "tone": "direct", "frequency": "daily"}"#,
        )
        .unwrap();

        assert_eq!(update.autopilot_topics, Some(vec!["CPF".to_string()]));
        assert_eq!(update.autopilot_tone.as_deref(), Some("direct"));
        assert_eq!(update.autopilot_frequency, Some(AutopilotFrequency::Daily));
        assert!(!update.is_empty());
    }

    #[test]
    fn test_effective_tone_prefers_brand_tone() {
        let mut settings = PublishingSettings::for_tenant("acme");
        assert_eq!(settings.effective_tone(), "professionnel et accessible");

        settings.brand_tone = Some("  ".to_string());
        assert_eq!(settings.effective_tone(), "professionnel et accessible");

        settings.brand_tone = Some("chaleureux".to_string());
        assert_eq!(settings.effective_tone(), "chaleureux");
    }

    #[test]
    fn test_posting_times_lookup_by_platform() {
        let settings: PublishingSettings = serde_json::from_str(
            r#"{"best_posting_times": {"linkedin": ["08:30", "12:00"]}}"#,
        )
        .unwrap();

        assert_eq!(settings.posting_times(Platform::Linkedin), ["08:30", "12:00"]);
        assert!(settings.posting_times(Platform::Tiktok).is_empty());
    }

    #[test]
    fn test_tokens_debug_is_redacted() {
        let tokens = PlatformTokens {
            access_token: Some("very-secret".to_string()),
            refresh_token: None,
            valid_until: Some(1.0),
        };

        let debug = format!("{tokens:?}");
        assert!(!debug.contains("very-secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
