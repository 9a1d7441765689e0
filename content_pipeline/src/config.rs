use aws_sdk_dynamodb::Client as DynamoDbClient;
use aws_sdk_s3::Client as S3Client;
use aws_sdk_secretsmanager::Client as SecretsManagerClient;
use redact::Secret;
use serde::Deserialize;

use crate::autopilot::{PipelineOptions, PipelineServices};
use crate::images::GatewayImageModel;
use crate::media::S3MediaStorage;
use crate::notify::WebhookNotifier;
use crate::scraper::FirecrawlScraper;
use crate::store::{DynamoStore, TableNames};
use crate::synthesizer::GatewayWriter;
use crate::trends::PerplexityTrendDetector;
use crate::utils::build_http_client;

/// Environment of the functions that run the pipeline.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    pub settings_table: String,
    pub runs_table: String,
    pub articles_table: String,
    pub social_posts_table: String,
    pub connections_table: String,
    pub user_roles_table: String,

    pub media_bucket: String,
    pub media_public_base_url: String,
    #[serde(default = "default_media_key_prefix")]
    pub media_key_prefix: String,

    #[serde(default)]
    pub trend_api_key_secret_arn: Option<String>,
    #[serde(default)]
    pub scrape_api_key_secret_arn: Option<String>,
    #[serde(default)]
    pub gateway_api_key_secret_arn: Option<String>,

    #[serde(default = "default_trend_api_base_url")]
    pub trend_api_base_url: String,
    #[serde(default = "default_trend_model")]
    pub trend_model: String,
    #[serde(default = "default_scrape_api_base_url")]
    pub scrape_api_base_url: String,
    #[serde(default = "default_gateway_base_url")]
    pub gateway_base_url: String,
    #[serde(default = "default_synthesis_model")]
    pub synthesis_model: String,
    #[serde(default = "default_image_model")]
    pub image_model: String,

    /// Tenant used when neither the body nor the caller's claims name one.
    #[serde(default)]
    pub default_tenant_id: Option<String>,
    #[serde(default = "default_run_lease_minutes")]
    pub run_lease_minutes: i64,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    #[serde(default)]
    pub review_webhook_url: Option<String>,
}

fn default_media_key_prefix() -> String {
    "autopilot".to_string()
}

fn default_trend_api_base_url() -> String {
    "https://api.perplexity.ai".to_string()
}

fn default_trend_model() -> String {
    "sonar".to_string()
}

fn default_scrape_api_base_url() -> String {
    "https://api.firecrawl.dev".to_string()
}

fn default_gateway_base_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

fn default_synthesis_model() -> String {
    "google/gemini-2.5-flash".to_string()
}

fn default_image_model() -> String {
    "google/gemini-2.5-flash-image-preview".to_string()
}

const fn default_run_lease_minutes() -> i64 {
    15
}

const fn default_http_timeout_secs() -> u64 {
    120
}

impl PipelineConfig {
    #[must_use]
    pub fn table_names(&self) -> TableNames {
        TableNames {
            settings: self.settings_table.clone(),
            runs: self.runs_table.clone(),
            articles: self.articles_table.clone(),
            social_posts: self.social_posts_table.clone(),
            connections: self.connections_table.clone(),
            user_roles: self.user_roles_table.clone(),
        }
    }

    #[must_use]
    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            run_lease_minutes: self.run_lease_minutes,
            media_key_prefix: self.media_key_prefix.clone(),
        }
    }
}

pub type LiveServices = PipelineServices<
    PerplexityTrendDetector,
    FirecrawlScraper,
    GatewayWriter,
    GatewayImageModel,
    S3MediaStorage,
    DynamoStore,
    WebhookNotifier,
>;

/// A missing key is not fatal here: the stage that needs it reports it.
async fn load_api_key(
    secrets: &SecretsManagerClient,
    secret_arn: Option<&str>,
    name: &str,
) -> Option<Secret<String>> {
    let Some(secret_arn) = secret_arn else {
        tracing::warn!("no {name} API key secret configured");
        return None;
    };

    match ap_secrets::get_api_key(secrets, secret_arn).await {
        Ok(key) => Some(key),
        Err(e) => {
            tracing::warn!("failed to load the {name} API key: {e}");
            None
        }
    }
}

/// Build the production collaborators. API keys are fetched once, at cold
/// start.
///
/// # Errors
/// If the HTTP client cannot be built.
pub async fn build_live_services(
    config: &PipelineConfig,
    aws_config: &aws_config::SdkConfig,
) -> Result<LiveServices, reqwest::Error> {
    let http = build_http_client(config.http_timeout_secs)?;
    let secrets = SecretsManagerClient::new(aws_config);

    let trend_key = load_api_key(
        &secrets,
        config.trend_api_key_secret_arn.as_deref(),
        "trend",
    )
    .await;
    let scrape_key = load_api_key(
        &secrets,
        config.scrape_api_key_secret_arn.as_deref(),
        "scrape",
    )
    .await;
    let gateway_key = load_api_key(
        &secrets,
        config.gateway_api_key_secret_arn.as_deref(),
        "gateway",
    )
    .await;

    Ok(PipelineServices {
        trends: PerplexityTrendDetector::new(
            http.clone(),
            &config.trend_api_base_url,
            &config.trend_model,
            trend_key,
        ),
        scraper: FirecrawlScraper::new(http.clone(), &config.scrape_api_base_url, scrape_key),
        writer: GatewayWriter::new(
            &config.gateway_base_url,
            &config.synthesis_model,
            gateway_key.clone(),
        ),
        images: GatewayImageModel::new(
            http.clone(),
            &config.gateway_base_url,
            &config.image_model,
            gateway_key,
        ),
        media: S3MediaStorage::new(
            S3Client::new(aws_config),
            &config.media_bucket,
            &config.media_public_base_url,
        ),
        store: DynamoStore::new(DynamoDbClient::new(aws_config), config.table_names()),
        notifier: WebhookNotifier::new(http, config.review_webhook_url.clone()),
        options: config.pipeline_options(),
    })
}
