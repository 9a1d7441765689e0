use chrono::{Duration, Utc};
use serde::Serialize;
use types::{
    AutopilotRun, Platform, PublishingSettings, RunMetadata, RunStatus, RunType,
};
use uuid::Uuid;

use crate::error::PipelineError;
use crate::images::{ImageModel, generate_scene_images};
use crate::media::MediaStorage;
use crate::notify::{Notifier, ReviewNotice};
use crate::persistence::{PersistOutcome, PersistRequest, persist_generated_content};
use crate::scraper::ContextScraper;
use crate::store::{ContentStore, RunGuard, RunStart, SkipReason};
use crate::synthesizer::{
    ContentWriter, SynthesisRequest, find_forbidden_words, synthesize,
};
use crate::trends::TrendDetector;

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// A run lease older than this is considered abandoned.
    pub run_lease_minutes: i64,
    /// Root of the object keys of generated media.
    pub media_key_prefix: String,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            run_lease_minutes: 15,
            media_key_prefix: "autopilot".to_string(),
        }
    }
}

/// The collaborators a run needs.
pub trait Services: Sync {
    type Trends: TrendDetector + Sync;
    type Scraper: ContextScraper + Sync;
    type Writer: ContentWriter + Sync;
    type Images: ImageModel + Sync;
    type Media: MediaStorage + Sync;
    type Store: ContentStore + Sync;
    type Notifier: Notifier + Sync;

    fn trends(&self) -> &Self::Trends;
    fn scraper(&self) -> &Self::Scraper;
    fn writer(&self) -> &Self::Writer;
    fn images(&self) -> &Self::Images;
    fn media(&self) -> &Self::Media;
    fn store(&self) -> &Self::Store;
    fn notifier(&self) -> &Self::Notifier;
    fn options(&self) -> &PipelineOptions;
}

/// Plain bundle of collaborators.
#[derive(Debug, Clone)]
pub struct PipelineServices<T, C, W, I, M, S, N> {
    pub trends: T,
    pub scraper: C,
    pub writer: W,
    pub images: I,
    pub media: M,
    pub store: S,
    pub notifier: N,
    pub options: PipelineOptions,
}

impl<T, C, W, I, M, S, N> Services for PipelineServices<T, C, W, I, M, S, N>
where
    T: TrendDetector + Sync,
    C: ContextScraper + Sync,
    W: ContentWriter + Sync,
    I: ImageModel + Sync,
    M: MediaStorage + Sync,
    S: ContentStore + Sync,
    N: Notifier + Sync,
{
    type Trends = T;
    type Scraper = C;
    type Writer = W;
    type Images = I;
    type Media = M;
    type Store = S;
    type Notifier = N;

    fn trends(&self) -> &T {
        &self.trends
    }

    fn scraper(&self) -> &C {
        &self.scraper
    }

    fn writer(&self) -> &W {
        &self.writer
    }

    fn images(&self) -> &I {
        &self.images
    }

    fn media(&self) -> &M {
        &self.media
    }

    fn store(&self) -> &S {
        &self.store
    }

    fn notifier(&self) -> &N {
        &self.notifier
    }

    fn options(&self) -> &PipelineOptions {
        &self.options
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    pub run_type: RunType,
    /// Bypass the emergency-stop and enabled flags.
    pub force: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub article_id: String,
    pub social_posts_generated: usize,
    pub topic: String,
    pub channels: Vec<Platform>,
    pub auto_published: Vec<Platform>,
    pub pending_approval: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed(RunSummary),
    Failed { run_id: String, error: String },
    Skipped(SkipReason),
}

/// Run the whole pipeline once for a tenant.
///
/// # Errors
/// Only store failures that happen before the run row exists. Once the run
/// has started every failure ends as [`RunOutcome::Failed`].
#[tracing::instrument(skip(services), fields(run_id))]
pub async fn run_autopilot<S: Services>(
    services: &S,
    tenant_id: &str,
    options: RunOptions,
) -> Result<RunOutcome, PipelineError> {
    let store = services.store();

    let settings = store
        .get_settings(tenant_id)
        .await?
        .unwrap_or_else(|| PublishingSettings::for_tenant(tenant_id));

    let now = Utc::now();
    let mut run = AutopilotRun {
        id: Uuid::now_v7().to_string(),
        tenant_id: tenant_id.to_string(),
        run_type: options.run_type,
        status: RunStatus::Running,
        started_at: now,
        completed_at: None,
        trend_topic: None,
        trend_sources: Vec::new(),
        article_id: None,
        social_posts_generated: 0,
        error_message: None,
        ai_model: Some(services.writer().model_name().to_string()),
        metadata: RunMetadata {
            forced: options.force,
            ..RunMetadata::default()
        },
    };
    tracing::Span::current().record("run_id", run.id.as_str());

    let guard = RunGuard {
        force: options.force,
        lease: Duration::minutes(services.options().run_lease_minutes),
        now,
    };

    if let RunStart::Rejected(reason) = store.start_run(&run, guard).await? {
        tracing::info!(reason = reason.code(), "autopilot run skipped: {}", reason.message());
        return Ok(RunOutcome::Skipped(reason));
    }

    tracing::info!(run_type = ?options.run_type, "autopilot run started");

    let result = execute(services, &settings, &mut run).await;
    run.completed_at = Some(Utc::now());

    let outcome = match result {
        Ok(persisted) => {
            run.status = RunStatus::Completed;
            run.article_id = Some(persisted.article_id.clone());
            run.social_posts_generated = persisted.channels.len();
            run.metadata.channels.clone_from(&persisted.channels);

            tracing::info!(
                article_id = %persisted.article_id,
                posts = persisted.channels.len(),
                "autopilot run completed"
            );

            RunOutcome::Completed(RunSummary {
                run_id: run.id.clone(),
                article_id: persisted.article_id,
                social_posts_generated: persisted.channels.len(),
                topic: run.trend_topic.clone().unwrap_or_default(),
                channels: persisted.channels,
                auto_published: persisted.auto_published,
                pending_approval: persisted.pending_approval,
            })
        }
        Err(e) => {
            tracing::error!("autopilot run failed: {e}");
            run.status = RunStatus::Failed;
            run.error_message = Some(e.to_string());

            RunOutcome::Failed {
                run_id: run.id.clone(),
                error: e.to_string(),
            }
        }
    };

    if let Err(e) = store.finish_run(&run).await {
        tracing::error!("failed to record the end of the run: {e}");
    }

    if let RunOutcome::Completed(summary) = &outcome {
        if summary.pending_approval > 0 {
            let notice = ReviewNotice {
                tenant_id: tenant_id.to_string(),
                run_id: summary.run_id.clone(),
                article_id: summary.article_id.clone(),
                pending_posts: summary.pending_approval,
                topic: summary.topic.clone(),
            };
            services.notifier().notify_review(notice).await;
        }
    }

    Ok(outcome)
}

async fn execute<S: Services>(
    services: &S,
    settings: &PublishingSettings,
    run: &mut AutopilotRun,
) -> Result<PersistOutcome, PipelineError> {
    let trend = services
        .trends()
        .detect_trend(&settings.autopilot_topics)
        .await?;
    run.trend_topic = Some(trend.topic.clone());
    run.trend_sources.clone_from(&trend.sources);

    let scraped = services.scraper().scrape(&trend.topic).await;
    run.metadata.has_scraped_context = !scraped.is_empty();

    let content = synthesize(
        services.writer(),
        &SynthesisRequest {
            topic: &trend.topic,
            context: &trend.context,
            scraped: &scraped,
            tone: settings.effective_tone(),
            language: &settings.content_language,
            forbidden_words: &settings.forbidden_words,
        },
    )
    .await?;

    let forbidden = find_forbidden_words(&content, &settings.forbidden_words);
    if !forbidden.is_empty() {
        tracing::warn!(words = ?forbidden, "generated content contains forbidden words");
    }
    run.metadata.forbidden_words_found = forbidden;

    let scenes = content
        .tiktok
        .as_ref()
        .map(|tiktok| tiktok.video_script.scenes.as_slice())
        .unwrap_or_default();

    let scene_image_urls = if settings.scene_images_enabled && !scenes.is_empty() {
        let key_prefix = format!(
            "{}/{}/{}",
            services.options().media_key_prefix.trim_end_matches('/'),
            run.tenant_id,
            run.id
        );
        generate_scene_images(
            services.images(),
            services.media(),
            scenes,
            &trend.topic,
            &key_prefix,
        )
        .await
    } else {
        Vec::new()
    };
    run.metadata.scene_image_count = scene_image_urls.len();

    persist_generated_content(
        services.store(),
        PersistRequest {
            tenant_id: &run.tenant_id,
            run_id: &run.id,
            content: &content,
            settings,
            scene_image_urls: &scene_image_urls,
            now: Utc::now(),
        },
    )
    .await
}
