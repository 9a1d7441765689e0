use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::{Value, json};
use thiserror::Error;
use types::{ArticleStatus, Platform, PublishingSettings, RunType, SettingsUpdate};

use crate::autopilot::{RunOptions, RunOutcome, Services, run_autopilot};
use crate::error::{PublishError, StoreError};
use crate::publisher::{self, ConnectRequest, TokenVault};
use crate::store::ContentStore;
use crate::trends::TrendDetector;

const STATUS_RUN_LIMIT: usize = 10;

/// A JSON body with its status code.
#[derive(Debug)]
pub struct ActionReply {
    pub status: StatusCode,
    pub body: Value,
}

impl ActionReply {
    #[must_use]
    pub const fn ok(body: Value) -> Self {
        Self {
            status: StatusCode::OK,
            body,
        }
    }
}

impl IntoResponse for ActionReply {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for ActionError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (
            status,
            Json(json!({ "success": false, "error": self.to_string() })),
        )
            .into_response()
    }
}

impl From<StoreError> for ActionError {
    fn from(e: StoreError) -> Self {
        tracing::error!("store error: {e}");
        Self::Internal(e.to_string())
    }
}

impl From<PublishError> for ActionError {
    fn from(e: PublishError) -> Self {
        match e {
            PublishError::PostNotFound(_) | PublishError::ConnectionNotFound(_) => {
                Self::NotFound(e.to_string())
            }
            PublishError::NotApproved
            | PublishError::ScheduleInPast
            | PublishError::NotConnected
            | PublishError::InvalidExpiry { .. } => Self::BadRequest(e.to_string()),
            PublishError::InvalidState(_) => Self::Conflict(e.to_string()),
            PublishError::Secrets(_) | PublishError::Store(_) => {
                tracing::error!("publishing error: {e}");
                Self::Internal(e.to_string())
            }
        }
    }
}

/// Tenant of a request. An authenticated tenant claim always wins; the body's
/// `tenant_id` and then the configured default only apply to callers
/// without one.
///
/// # Errors
/// [`ActionError::BadRequest`] when none of them names a tenant.
pub fn resolve_tenant(
    body: &Value,
    claimed: Option<&str>,
    default: Option<&str>,
) -> Result<String, ActionError> {
    let claimed = claimed
        .map(str::trim)
        .filter(|tenant_id| !tenant_id.is_empty());

    claimed
        .or_else(|| body.get("tenant_id").and_then(Value::as_str))
        .or(default)
        .map(str::trim)
        .filter(|tenant_id| !tenant_id.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ActionError::BadRequest("tenant_id is required".to_string()))
}

fn params<T: DeserializeOwned>(body: &Value) -> Result<T, ActionError> {
    serde_json::from_value(body.clone())
        .map_err(|e| ActionError::BadRequest(format!("invalid request: {e}")))
}

fn action_name(body: &Value) -> Option<&str> {
    body.get("action").and_then(Value::as_str)
}

#[derive(Debug, Deserialize)]
struct ToggleParams {
    enabled: bool,
}

#[derive(Debug, Deserialize)]
struct EmergencyStopParams {
    active: bool,
}

#[derive(Debug, Deserialize)]
struct ArticleParams {
    article_id: String,
}

#[derive(Debug, Deserialize)]
struct ApproveParams {
    post_id: String,
    approved: bool,
}

#[derive(Debug, Deserialize)]
struct TrendParams {
    #[serde(default)]
    topics: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ArticleStatusParams {
    article_id: String,
    status: ArticleStatus,
    #[serde(default)]
    scheduled_for: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct RunParams {
    #[serde(default)]
    force: bool,
}

#[derive(Debug, Deserialize)]
struct PostParams {
    post_id: String,
}

#[derive(Debug, Deserialize)]
struct ScheduleParams {
    post_id: String,
    scheduled_for: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct PlatformParams {
    platform: Platform,
}

/// Handle one `POST /autopilot` body. A body without an action runs the
/// pipeline.
///
/// # Errors
/// Any failure, already mapped to its HTTP status.
#[tracing::instrument(skip(services, body), fields(action = action_name(&body)))]
pub async fn dispatch_autopilot<S: Services>(
    services: &S,
    tenant_id: &str,
    reviewer: Option<&str>,
    body: Value,
) -> Result<ActionReply, ActionError> {
    let store = services.store();

    match action_name(&body) {
        Some("toggle") => {
            let ToggleParams { enabled } = params(&body)?;
            let update = SettingsUpdate {
                autopilot_enabled: Some(enabled),
                emergency_stop: enabled.then_some(false),
                ..SettingsUpdate::default()
            };
            let settings = store.update_settings(tenant_id, &update).await?;
            tracing::info!(enabled, "autopilot toggled");

            Ok(ActionReply::ok(json!({
                "success": true,
                "autopilot_enabled": settings.autopilot_enabled,
            })))
        }
        Some("status") => {
            let settings = store
                .get_settings(tenant_id)
                .await?
                .unwrap_or_else(|| PublishingSettings::for_tenant(tenant_id));
            let runs = store.list_runs(tenant_id, STATUS_RUN_LIMIT).await?;

            Ok(ActionReply::ok(json!({
                "success": true,
                "settings": settings,
                "runs": runs,
            })))
        }
        Some("get-social-posts") => {
            let ArticleParams { article_id } = params(&body)?;
            let posts = store.list_social_posts(tenant_id, &article_id).await?;

            Ok(ActionReply::ok(json!({ "success": true, "posts": posts })))
        }
        Some("approve-post") => {
            let ApproveParams { post_id, approved } = params(&body)?;
            let post = publisher::approve_post(
                store,
                tenant_id,
                &post_id,
                approved,
                reviewer,
                Utc::now(),
            )
            .await?;

            Ok(ActionReply::ok(json!({ "success": true, "post": post })))
        }
        Some("test-trends") => {
            let TrendParams { topics } = params(&body)?;
            let trends = services
                .trends()
                .detect_trend(&topics)
                .await
                .map_err(|e| ActionError::Internal(e.to_string()))?;

            Ok(ActionReply::ok(json!({ "success": true, "trends": trends })))
        }
        Some("update-settings") => {
            let update: SettingsUpdate = params(&body)?;
            let settings = store.update_settings(tenant_id, &update).await?;

            Ok(ActionReply::ok(json!({ "success": true, "settings": settings })))
        }
        Some("emergency-stop") => {
            let EmergencyStopParams { active } = params(&body)?;
            let update = SettingsUpdate {
                emergency_stop: Some(active),
                ..SettingsUpdate::default()
            };
            let settings = store.update_settings(tenant_id, &update).await?;
            tracing::warn!(active, "emergency stop changed");

            Ok(ActionReply::ok(json!({
                "success": true,
                "emergency_stop": settings.emergency_stop,
            })))
        }
        Some("set-article-status") => {
            let request: ArticleStatusParams = params(&body)?;
            set_article_status(store, tenant_id, request).await
        }
        None | Some("run") => run(services, tenant_id, RunType::Manual, &body).await,
        Some("run-once") => run(services, tenant_id, RunType::RunOnce, &body).await,
        Some(other) => Err(ActionError::BadRequest(format!("Unknown action: {other}"))),
    }
}

async fn set_article_status<S: ContentStore + Sync>(
    store: &S,
    tenant_id: &str,
    request: ArticleStatusParams,
) -> Result<ActionReply, ActionError> {
    let mut article = store
        .get_article(tenant_id, &request.article_id)
        .await?
        .ok_or_else(|| {
            ActionError::NotFound(format!("article {} not found", request.article_id))
        })?;

    if !article.status.can_transition_to(request.status) {
        return Err(ActionError::Conflict(format!(
            "cannot move article from {:?} to {:?}",
            article.status, request.status
        )));
    }

    let now = Utc::now();
    match request.status {
        ArticleStatus::Scheduled => {
            let scheduled_for = request.scheduled_for.ok_or_else(|| {
                ActionError::BadRequest("scheduled_for is required".to_string())
            })?;
            article.scheduled_for = Some(scheduled_for);
        }
        ArticleStatus::Published => {
            article.published_at = Some(now);
        }
        ArticleStatus::Draft => {
            article.scheduled_for = None;
        }
    }
    article.status = request.status;
    article.updated_at = Some(now);

    store.put_article(&article).await?;

    Ok(ActionReply::ok(json!({ "success": true, "article": article })))
}

async fn run<S: Services>(
    services: &S,
    tenant_id: &str,
    run_type: RunType,
    body: &Value,
) -> Result<ActionReply, ActionError> {
    let RunParams { force } = params(body)?;

    let outcome = run_autopilot(services, tenant_id, RunOptions { run_type, force })
        .await
        .map_err(|e| ActionError::Internal(e.to_string()))?;

    let reply = match outcome {
        RunOutcome::Completed(summary) => ActionReply::ok(json!({
            "success": true,
            "runId": summary.run_id,
            "articleId": summary.article_id,
            "socialPostsGenerated": summary.social_posts_generated,
            "topic": summary.topic,
            "autoPublished": summary.auto_published.len(),
            "channels": summary.channels,
        })),
        RunOutcome::Failed { run_id, error } => ActionReply {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: json!({ "success": false, "error": error, "runId": run_id }),
        },
        RunOutcome::Skipped(reason) => ActionReply::ok(json!({
            "success": false,
            "skipped": true,
            "reason": reason.code(),
            "message": reason.message(),
        })),
    };

    Ok(reply)
}

/// Handle one `POST /social` body.
///
/// # Errors
/// Any failure, already mapped to its HTTP status.
#[tracing::instrument(skip(store, vault, body), fields(action = action_name(&body)))]
pub async fn dispatch_social<S, V>(
    store: &S,
    vault: &V,
    tenant_id: &str,
    body: Value,
) -> Result<ActionReply, ActionError>
where
    S: ContentStore + Sync,
    V: TokenVault + Sync,
{
    let now = Utc::now();

    match action_name(&body) {
        Some("list-connections") => {
            let connections = publisher::list_connections(store, tenant_id).await?;

            Ok(ActionReply::ok(json!({ "success": true, "connections": connections })))
        }
        Some("connect") => {
            let request: ConnectRequest = params(&body)?;
            let connection = publisher::connect(store, vault, tenant_id, request, now).await?;

            Ok(ActionReply::ok(json!({ "success": true, "connection": connection })))
        }
        Some("test-connection") => {
            let PlatformParams { platform } = params(&body)?;
            let connection =
                publisher::test_connection(store, vault, tenant_id, platform, now).await?;

            Ok(ActionReply::ok(json!({ "success": true, "connection": connection })))
        }
        Some("disconnect") => {
            let PlatformParams { platform } = params(&body)?;
            let connection = publisher::disconnect(store, vault, tenant_id, platform).await?;

            Ok(ActionReply::ok(json!({ "success": true, "connection": connection })))
        }
        Some("publish") => {
            let PostParams { post_id } = params(&body)?;
            let result = publisher::publish_post(store, tenant_id, &post_id, now).await?;

            Ok(ActionReply::ok(json!({
                "success": true,
                "post": result.post,
                "simulated": result.simulated,
            })))
        }
        Some("schedule-post") => {
            let ScheduleParams {
                post_id,
                scheduled_for,
            } = params(&body)?;
            let post =
                publisher::schedule_post(store, tenant_id, &post_id, scheduled_for, now).await?;

            Ok(ActionReply::ok(json!({ "success": true, "post": post })))
        }
        Some("cancel-post") => {
            let PostParams { post_id } = params(&body)?;
            let post = publisher::cancel_post(store, tenant_id, &post_id).await?;

            Ok(ActionReply::ok(json!({ "success": true, "post": post })))
        }
        Some(other) => Err(ActionError::BadRequest(format!("Unknown action: {other}"))),
        None => Err(ActionError::BadRequest("action is required".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publisher::MemoryVault;
    use crate::store::MemoryStore;

    #[test]
    fn test_tenant_resolution_order() {
        let body = json!({ "tenant_id": "from-body" });
        assert_eq!(
            resolve_tenant(&body, Some("from-claims"), Some("default")).unwrap(),
            "from-claims"
        );
        assert_eq!(
            resolve_tenant(&body, None, Some("default")).unwrap(),
            "from-body"
        );
        assert_eq!(
            resolve_tenant(&body, Some(" "), Some("default")).unwrap(),
            "from-body"
        );
        assert_eq!(
            resolve_tenant(&json!({}), Some("from-claims"), Some("default")).unwrap(),
            "from-claims"
        );
        assert_eq!(
            resolve_tenant(&json!({}), None, Some("default")).unwrap(),
            "default"
        );
        assert!(matches!(
            resolve_tenant(&json!({ "tenant_id": " " }), None, None),
            Err(ActionError::BadRequest(_))
        ));
    }

    #[test]
    fn test_publish_errors_map_to_statuses() {
        let status = |e: PublishError| ActionError::from(e).into_response().status();

        assert_eq!(status(PublishError::PostNotFound("x".to_string())), StatusCode::NOT_FOUND);
        assert_eq!(status(PublishError::NotConnected), StatusCode::BAD_REQUEST);
        assert_eq!(
            status(PublishError::InvalidExpiry { got: u64::MAX, max: 1 }),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status(PublishError::InvalidState(types::PostStatus::Published)),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status(PublishError::Secrets("denied".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_social_requires_known_action() {
        let store = MemoryStore::new();
        let vault = MemoryVault::new();

        let missing = dispatch_social(&store, &vault, "acme", json!({})).await;
        assert!(matches!(missing, Err(ActionError::BadRequest(_))));

        let unknown = dispatch_social(&store, &vault, "acme", json!({ "action": "nope" })).await;
        assert!(matches!(unknown, Err(ActionError::BadRequest(m)) if m == "Unknown action: nope"));
    }

    #[tokio::test]
    async fn test_social_connect_then_list() {
        let store = MemoryStore::new();
        let vault = MemoryVault::new();

        let reply = dispatch_social(
            &store,
            &vault,
            "acme",
            json!({
                "action": "connect",
                "platform": "linkedin",
                "account_name": "Acme Formation",
                "access_token": "token-123",
            }),
        )
        .await
        .unwrap();
        assert_eq!(reply.body["connection"]["connection_status"], "connected");
        assert!(!reply.body.to_string().contains("token-123"));

        let reply = dispatch_social(&store, &vault, "acme", json!({ "action": "list-connections" }))
            .await
            .unwrap();
        assert_eq!(reply.body["connections"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_social_missing_parameter_is_bad_request() {
        let store = MemoryStore::new();
        let vault = MemoryVault::new();

        let result = dispatch_social(&store, &vault, "acme", json!({ "action": "publish" })).await;
        assert!(matches!(result, Err(ActionError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_social_connect_rejects_out_of_range_expiry() {
        let store = MemoryStore::new();
        let vault = MemoryVault::new();

        for expires_in in [u64::MAX, 9_223_372_036_854_775_807, 400_000_000] {
            let result = dispatch_social(
                &store,
                &vault,
                "acme",
                json!({
                    "action": "connect",
                    "platform": "linkedin",
                    "account_name": "Acme Formation",
                    "access_token": "token-123",
                    "expires_in": expires_in,
                }),
            )
            .await;
            assert!(
                matches!(result, Err(ActionError::BadRequest(_))),
                "expires_in {expires_in} should be rejected"
            );
        }

        let reply = dispatch_social(&store, &vault, "acme", json!({ "action": "list-connections" }))
            .await
            .unwrap();
        assert!(reply.body["connections"].as_array().unwrap().is_empty());
        assert!(vault.get_tokens("acme", Platform::Linkedin).await.unwrap().is_none());
    }
}
