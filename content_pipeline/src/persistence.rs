use chrono::{DateTime, Utc};
use types::{
    ApprovalStatus, ArticleStatus, BlogPost, ContentType, GeneratedContent,
    Platform, PostStatus, PublishingSettings, SocialPost, StructuredContent,
};
use uuid::Uuid;

use crate::error::PipelineError;
use crate::schedule::next_posting_slot;
use crate::slug::generate_slug;
use crate::store::ContentStore;

#[derive(Debug, Clone, Copy)]
pub struct PersistRequest<'a> {
    pub tenant_id: &'a str,
    pub run_id: &'a str,
    pub content: &'a GeneratedContent,
    pub settings: &'a PublishingSettings,
    /// Scene images, attached to the TikTok post.
    pub scene_image_urls: &'a [String],
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistOutcome {
    pub article_id: String,
    pub post_ids: Vec<String>,
    pub channels: Vec<Platform>,
    pub auto_published: Vec<Platform>,
    pub pending_approval: usize,
}

/// Platform-specific fields of a post before workflow state is applied.
struct PostDraft {
    caption: String,
    hashtags: Vec<String>,
    content_type: ContentType,
    structured_content: StructuredContent,
    slide_count: usize,
    video_script: Option<String>,
    thread_tweets: Vec<String>,
}

fn draft_for(platform: Platform, content: &GeneratedContent) -> Option<PostDraft> {
    match platform {
        Platform::Linkedin | Platform::Instagram => {
            let carousel = if platform == Platform::Linkedin {
                content.linkedin.as_ref()?
            } else {
                content.instagram.as_ref()?
            };
            let structured_content = if platform == Platform::Linkedin {
                StructuredContent::Linkedin(carousel.clone())
            } else {
                StructuredContent::Instagram(carousel.clone())
            };

            Some(PostDraft {
                caption: carousel.caption.clone(),
                hashtags: carousel.hashtags.clone(),
                content_type: ContentType::Carousel,
                slide_count: carousel.slides.len(),
                structured_content,
                video_script: None,
                thread_tweets: Vec::new(),
            })
        }
        Platform::Tiktok => {
            let tiktok = content.tiktok.as_ref()?;

            Some(PostDraft {
                caption: tiktok.caption.clone(),
                hashtags: tiktok.hashtags.clone(),
                content_type: ContentType::VideoScript,
                slide_count: tiktok.slides.len(),
                video_script: Some(tiktok.video_script.to_script_text()),
                structured_content: StructuredContent::Tiktok(tiktok.clone()),
                thread_tweets: Vec::new(),
            })
        }
        Platform::Twitter => {
            let thread = content.twitter.as_ref()?;

            Some(PostDraft {
                caption: thread.tweets.first().cloned().unwrap_or_default(),
                hashtags: thread.hashtags.clone(),
                content_type: ContentType::Thread,
                slide_count: 0,
                video_script: None,
                thread_tweets: thread.tweets.clone(),
                structured_content: StructuredContent::Twitter(thread.clone()),
            })
        }
        _ => None,
    }
}

/// Prefix every hashtag with `#` and drop case-insensitive duplicates,
/// keeping the first occurrence. Defaults come after the generated tags.
#[must_use]
pub fn normalize_hashtags(generated: &[String], defaults: &[String]) -> Vec<String> {
    let mut hashtags: Vec<String> = Vec::new();

    for tag in generated.iter().chain(defaults) {
        let bare = tag.trim().trim_start_matches('#').replace(char::is_whitespace, "");
        if bare.is_empty() {
            continue;
        }

        let tag = format!("#{bare}");
        if !hashtags.iter().any(|existing| existing.to_lowercase() == tag.to_lowercase()) {
            hashtags.push(tag);
        }
    }

    hashtags
}

#[must_use]
pub fn should_auto_publish(settings: &PublishingSettings, platform: Platform) -> bool {
    !settings.require_approval
        && settings.auto_publish_enabled
        && settings.auto_publish_platforms.contains(&platform)
}

/// Write the article, then one social post per present channel.
///
/// # Errors
/// The article write is fatal; a failing post write is logged and the
/// remaining channels are still written.
pub async fn persist_generated_content<S: ContentStore + Sync>(
    store: &S,
    request: PersistRequest<'_>,
) -> Result<PersistOutcome, PipelineError> {
    let article = request
        .content
        .article
        .as_ref()
        .ok_or(PipelineError::MissingArticle)?;

    let author_id = match store.find_admin_user(request.tenant_id).await {
        Ok(author_id) => author_id,
        Err(e) => {
            tracing::warn!("failed to resolve article author: {e}");
            None
        }
    };

    let blog_post = BlogPost {
        id: Uuid::now_v7().to_string(),
        tenant_id: request.tenant_id.to_string(),
        title: article.title.clone(),
        slug: generate_slug(&article.title),
        excerpt: article.excerpt.clone(),
        content: article.content.clone(),
        seo_title: article.seo_title.clone(),
        seo_description: article.seo_description.clone(),
        seo_keywords: article.seo_keywords.clone(),
        status: ArticleStatus::Draft,
        scheduled_for: None,
        published_at: None,
        author_id: author_id.clone(),
        ai_generated: true,
        autopilot_run_id: Some(request.run_id.to_string()),
        created_at: request.now,
        updated_at: None,
    };

    store.put_article(&blog_post).await?;
    tracing::info!(article_id = %blog_post.id, slug = %blog_post.slug, "article stored");

    let mut outcome = PersistOutcome {
        article_id: blog_post.id.clone(),
        ..PersistOutcome::default()
    };

    for platform in Platform::GENERATED {
        let Some(draft) = draft_for(platform, request.content) else {
            continue;
        };

        let auto_publish = should_auto_publish(request.settings, platform);
        let media_urls = if platform == Platform::Tiktok {
            request.scene_image_urls.to_vec()
        } else {
            Vec::new()
        };

        let post = SocialPost {
            id: Uuid::now_v7().to_string(),
            tenant_id: request.tenant_id.to_string(),
            platform,
            blog_post_id: Some(blog_post.id.clone()),
            caption: draft.caption,
            hashtags: normalize_hashtags(&draft.hashtags, &request.settings.default_hashtags),
            content_type: draft.content_type,
            structured_content: Some(draft.structured_content),
            slide_count: draft.slide_count,
            video_script: draft.video_script,
            thread_tweets: draft.thread_tweets,
            media_urls,
            status: if auto_publish {
                PostStatus::Scheduled
            } else {
                PostStatus::Draft
            },
            approval_status: if auto_publish {
                ApprovalStatus::Approved
            } else {
                ApprovalStatus::Pending
            },
            approved_at: auto_publish.then_some(request.now),
            approved_by: None,
            scheduled_for: auto_publish.then(|| {
                next_posting_slot(request.settings.posting_times(platform), request.now)
                    .unwrap_or(request.now)
            }),
            published_at: None,
            external_post_id: None,
            external_url: None,
            publish_error: None,
            ai_generated: true,
            auto_published: auto_publish,
            created_by: author_id.clone(),
            created_at: request.now,
        };

        if let Err(e) = store.put_social_post(&post).await {
            tracing::warn!("failed to store {platform} post, skipping it: {e}");
            continue;
        }

        outcome.post_ids.push(post.id);
        outcome.channels.push(platform);
        if auto_publish {
            outcome.auto_published.push(platform);
        } else {
            outcome.pending_approval += 1;
        }
    }

    Ok(outcome)
}
