use std::collections::HashMap;
use std::time::Duration;

use ap_secrets::{TokenSecret, connection_secret_id};
use aws_sdk_secretsmanager::Client as SecretsManagerClient;
use chrono::{DateTime, Utc};
use redact::Secret;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use types::{
    ApprovalStatus, ConnectionStatus, Platform, PlatformTokens, PostStatus,
    PublishingSettings, SocialConnection, SocialPost,
};
use uuid::Uuid;

use crate::error::PublishError;
use crate::store::ContentStore;

/// Where platform OAuth tokens are kept. Connection rows never hold them.
pub trait TokenVault {
    fn store_tokens(
        &self,
        tenant_id: &str,
        platform: Platform,
        access_token: &str,
        refresh_token: Option<&str>,
        valid_for: Option<Duration>,
    ) -> impl Future<Output = Result<(), PublishError>> + Send;

    fn get_tokens(
        &self,
        tenant_id: &str,
        platform: Platform,
    ) -> impl Future<Output = Result<Option<PlatformTokens>, PublishError>> + Send;

    fn clear_tokens(
        &self,
        tenant_id: &str,
        platform: Platform,
    ) -> impl Future<Output = Result<(), PublishError>> + Send;
}

#[derive(Debug, Clone)]
pub struct SecretsManagerVault {
    client: SecretsManagerClient,
    prefix: String,
}

impl SecretsManagerVault {
    pub fn new(client: SecretsManagerClient, prefix: impl Into<String>) -> Self {
        Self {
            client,
            prefix: prefix.into(),
        }
    }

    fn secret_id(&self, tenant_id: &str, platform: Platform) -> String {
        connection_secret_id(&self.prefix, tenant_id, platform)
    }
}

impl TokenVault for SecretsManagerVault {
    async fn store_tokens(
        &self,
        tenant_id: &str,
        platform: Platform,
        access_token: &str,
        refresh_token: Option<&str>,
        valid_for: Option<Duration>,
    ) -> Result<(), PublishError> {
        ap_secrets::set_tokens::<PlatformTokens>(
            &self.client,
            &self.secret_id(tenant_id, platform),
            access_token,
            refresh_token,
            valid_for,
        )
        .await
        .map_err(PublishError::Secrets)
    }

    async fn get_tokens(
        &self,
        tenant_id: &str,
        platform: Platform,
    ) -> Result<Option<PlatformTokens>, PublishError> {
        ap_secrets::get::<PlatformTokens>(
            &self.client,
            &self.secret_id(tenant_id, platform),
        )
        .await
        .map_err(PublishError::Secrets)
    }

    async fn clear_tokens(
        &self,
        tenant_id: &str,
        platform: Platform,
    ) -> Result<(), PublishError> {
        ap_secrets::clear_tokens::<PlatformTokens>(
            &self.client,
            &self.secret_id(tenant_id, platform),
        )
        .await
        .map_err(PublishError::Secrets)
    }
}

/// Token vault kept in process memory, for tests and local development.
#[derive(Debug, Default)]
pub struct MemoryVault {
    tokens: Mutex<HashMap<(String, Platform), PlatformTokens>>,
}

impl MemoryVault {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenVault for MemoryVault {
    async fn store_tokens(
        &self,
        tenant_id: &str,
        platform: Platform,
        access_token: &str,
        refresh_token: Option<&str>,
        valid_for: Option<Duration>,
    ) -> Result<(), PublishError> {
        let mut tokens = self.tokens.lock().await;
        tokens
            .entry((tenant_id.to_string(), platform))
            .or_default()
            .set_tokens(
                access_token.to_string(),
                refresh_token.map(str::to_string),
                ap_secrets::calculate_valid_until(valid_for),
            );
        Ok(())
    }

    async fn get_tokens(
        &self,
        tenant_id: &str,
        platform: Platform,
    ) -> Result<Option<PlatformTokens>, PublishError> {
        Ok(self
            .tokens
            .lock()
            .await
            .get(&(tenant_id.to_string(), platform))
            .cloned())
    }

    async fn clear_tokens(
        &self,
        tenant_id: &str,
        platform: Platform,
    ) -> Result<(), PublishError> {
        if let Some(tokens) = self
            .tokens
            .lock()
            .await
            .get_mut(&(tenant_id.to_string(), platform))
        {
            tokens.clear_tokens();
        }
        Ok(())
    }
}

async fn load_post<S: ContentStore + Sync>(
    store: &S,
    tenant_id: &str,
    post_id: &str,
) -> Result<SocialPost, PublishError> {
    store
        .get_social_post(tenant_id, post_id)
        .await?
        .ok_or_else(|| PublishError::PostNotFound(post_id.to_string()))
}

/// Record a reviewer decision on a post.
///
/// # Errors
/// [`PublishError::PostNotFound`] or a store failure.
#[tracing::instrument(skip(store))]
pub async fn approve_post<S: ContentStore + Sync>(
    store: &S,
    tenant_id: &str,
    post_id: &str,
    approved: bool,
    reviewer: Option<&str>,
    now: DateTime<Utc>,
) -> Result<SocialPost, PublishError> {
    let mut post = load_post(store, tenant_id, post_id).await?;

    if approved {
        post.approval_status = ApprovalStatus::Approved;
        post.approved_at = Some(now);
        post.approved_by = reviewer.map(str::to_string);
    } else {
        post.approval_status = ApprovalStatus::Rejected;
        post.approved_at = None;
        post.approved_by = None;
    }

    store.put_social_post(&post).await?;
    tracing::info!(approval_status = ?post.approval_status, "post reviewed");

    Ok(post)
}

#[derive(Debug, Clone, Serialize)]
pub struct PublishResult {
    pub post: SocialPost,
    /// No platform API is called; the publication is recorded only.
    pub simulated: bool,
}

fn simulated_publication(platform: Platform) -> (String, String) {
    let external_id = format!("sim_{}", Uuid::now_v7().simple());
    let url = format!("https://{}/posts/{external_id}", platform.web_host());
    (external_id, url)
}

/// Publish a post on its platform.
///
/// Fails closed: without a live connection the post is marked failed. With
/// one, the publication is simulated.
///
/// # Errors
/// Missing post, a post in a final state, a missing approval when the
/// tenant requires one, [`PublishError::NotConnected`], or a store failure.
#[tracing::instrument(skip(store))]
pub async fn publish_post<S: ContentStore + Sync>(
    store: &S,
    tenant_id: &str,
    post_id: &str,
    now: DateTime<Utc>,
) -> Result<PublishResult, PublishError> {
    let mut post = load_post(store, tenant_id, post_id).await?;

    if matches!(post.status, PostStatus::Published | PostStatus::Cancelled) {
        return Err(PublishError::InvalidState(post.status));
    }

    let settings = store
        .get_settings(tenant_id)
        .await?
        .unwrap_or_else(|| PublishingSettings::for_tenant(tenant_id));

    if post.approval_status == ApprovalStatus::Rejected
        || (settings.require_approval && post.approval_status != ApprovalStatus::Approved)
    {
        return Err(PublishError::NotApproved);
    }

    let connected = store
        .get_connection(tenant_id, post.platform)
        .await?
        .is_some_and(|connection| connection.connection_status == ConnectionStatus::Connected);

    if !connected {
        tracing::warn!(platform = %post.platform, "cannot publish, platform not connected");
        post.status = PostStatus::Failed;
        post.publish_error = Some(PublishError::NotConnected.to_string());
        store.put_social_post(&post).await?;
        return Err(PublishError::NotConnected);
    }

    post.status = PostStatus::Publishing;
    store.put_social_post(&post).await?;

    let (external_id, url) = simulated_publication(post.platform);
    tracing::warn!(
        platform = %post.platform,
        external_post_id = %external_id,
        "platform API not integrated, publication simulated"
    );

    post.status = PostStatus::Published;
    post.published_at = Some(now);
    post.external_post_id = Some(external_id);
    post.external_url = Some(url);
    post.publish_error = None;
    store.put_social_post(&post).await?;

    Ok(PublishResult {
        post,
        simulated: true,
    })
}

/// # Errors
/// Missing post, a post that is publishing or final, a time not in the
/// future, a missing approval, or a store failure.
#[tracing::instrument(skip(store))]
pub async fn schedule_post<S: ContentStore + Sync>(
    store: &S,
    tenant_id: &str,
    post_id: &str,
    scheduled_for: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<SocialPost, PublishError> {
    let mut post = load_post(store, tenant_id, post_id).await?;

    if !matches!(
        post.status,
        PostStatus::Draft | PostStatus::Scheduled | PostStatus::Failed
    ) {
        return Err(PublishError::InvalidState(post.status));
    }

    if scheduled_for <= now {
        return Err(PublishError::ScheduleInPast);
    }

    let require_approval = store
        .get_settings(tenant_id)
        .await?
        .is_none_or(|settings| settings.require_approval);

    if require_approval && post.approval_status != ApprovalStatus::Approved {
        return Err(PublishError::NotApproved);
    }

    post.status = PostStatus::Scheduled;
    post.scheduled_for = Some(scheduled_for);
    post.publish_error = None;
    store.put_social_post(&post).await?;

    Ok(post)
}

/// # Errors
/// Missing post, an already published or cancelled post, or a store failure.
#[tracing::instrument(skip(store))]
pub async fn cancel_post<S: ContentStore + Sync>(
    store: &S,
    tenant_id: &str,
    post_id: &str,
) -> Result<SocialPost, PublishError> {
    let mut post = load_post(store, tenant_id, post_id).await?;

    if matches!(post.status, PostStatus::Published | PostStatus::Cancelled) {
        return Err(PublishError::InvalidState(post.status));
    }

    post.status = PostStatus::Cancelled;
    post.scheduled_for = None;
    store.put_social_post(&post).await?;

    Ok(post)
}

/// Ten years. Longer lifetimes are rejected rather than stored.
pub const MAX_TOKEN_LIFETIME_SECS: u64 = 10 * 365 * 24 * 60 * 60;

#[derive(Debug, Clone, Deserialize)]
pub struct ConnectRequest {
    pub platform: Platform,
    pub account_name: String,
    #[serde(default)]
    pub account_id: Option<String>,
    pub access_token: Secret<String>,
    #[serde(default)]
    pub refresh_token: Option<Secret<String>>,
    /// Token lifetime in seconds, at most [`MAX_TOKEN_LIFETIME_SECS`].
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// Store the account tokens and mark the platform connected.
///
/// # Errors
/// [`PublishError::InvalidExpiry`] for a lifetime above
/// [`MAX_TOKEN_LIFETIME_SECS`], or a secrets or store failure.
#[tracing::instrument(skip(store, vault, request), fields(platform = %request.platform))]
pub async fn connect<S, V>(
    store: &S,
    vault: &V,
    tenant_id: &str,
    request: ConnectRequest,
    now: DateTime<Utc>,
) -> Result<SocialConnection, PublishError>
where
    S: ContentStore + Sync,
    V: TokenVault + Sync,
{
    let token_expires_at = match request.expires_in {
        None => None,
        Some(secs) => Some(
            i64::try_from(secs)
                .ok()
                .filter(|_| secs <= MAX_TOKEN_LIFETIME_SECS)
                .and_then(chrono::TimeDelta::try_seconds)
                .and_then(|lifetime| now.checked_add_signed(lifetime))
                .ok_or(PublishError::InvalidExpiry {
                    got: secs,
                    max: MAX_TOKEN_LIFETIME_SECS,
                })?,
        ),
    };
    let valid_for = request.expires_in.map(Duration::from_secs);

    vault
        .store_tokens(
            tenant_id,
            request.platform,
            request.access_token.expose_secret(),
            request
                .refresh_token
                .as_ref()
                .map(|token| token.expose_secret().as_str()),
            valid_for,
        )
        .await?;

    let connection = SocialConnection {
        tenant_id: tenant_id.to_string(),
        platform: request.platform,
        account_name: Some(request.account_name),
        account_id: request.account_id,
        connection_status: ConnectionStatus::Connected,
        token_expires_at,
        last_tested_at: None,
        connected_at: Some(now),
    };

    store.put_connection(&connection).await?;
    tracing::info!("platform connected");

    Ok(connection)
}

/// Check that the stored tokens are still usable and record the result.
///
/// # Errors
/// [`PublishError::ConnectionNotFound`] for a missing or disconnected
/// platform, or a secrets or store failure.
#[tracing::instrument(skip(store, vault))]
pub async fn test_connection<S, V>(
    store: &S,
    vault: &V,
    tenant_id: &str,
    platform: Platform,
    now: DateTime<Utc>,
) -> Result<SocialConnection, PublishError>
where
    S: ContentStore + Sync,
    V: TokenVault + Sync,
{
    let mut connection = store
        .get_connection(tenant_id, platform)
        .await?
        .filter(|connection| connection.connection_status != ConnectionStatus::Disconnected)
        .ok_or(PublishError::ConnectionNotFound(platform))?;

    #[allow(clippy::cast_precision_loss)]
    let now_secs = now.timestamp_millis() as f64 / 1000.0;
    let expired = vault
        .get_tokens(tenant_id, platform)
        .await?
        .is_none_or(|tokens| tokens.is_expired(now_secs));

    connection.connection_status = if expired {
        ConnectionStatus::Expired
    } else {
        ConnectionStatus::Connected
    };
    connection.last_tested_at = Some(now);
    store.put_connection(&connection).await?;

    Ok(connection)
}

/// Clear the tokens and reset the connection row. The row itself is kept.
///
/// # Errors
/// [`PublishError::ConnectionNotFound`], or a secrets or store failure.
#[tracing::instrument(skip(store, vault))]
pub async fn disconnect<S, V>(
    store: &S,
    vault: &V,
    tenant_id: &str,
    platform: Platform,
) -> Result<SocialConnection, PublishError>
where
    S: ContentStore + Sync,
    V: TokenVault + Sync,
{
    let mut connection = store
        .get_connection(tenant_id, platform)
        .await?
        .ok_or(PublishError::ConnectionNotFound(platform))?;

    vault.clear_tokens(tenant_id, platform).await?;

    connection.connection_status = ConnectionStatus::Disconnected;
    connection.account_name = None;
    connection.account_id = None;
    connection.token_expires_at = None;
    connection.connected_at = None;
    store.put_connection(&connection).await?;

    Ok(connection)
}

/// # Errors
/// A store failure.
pub async fn list_connections<S: ContentStore + Sync>(
    store: &S,
    tenant_id: &str,
) -> Result<Vec<SocialConnection>, PublishError> {
    Ok(store.list_connections(tenant_id).await?)
}
