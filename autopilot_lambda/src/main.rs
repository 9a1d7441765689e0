use std::sync::Arc;

use ap_axum::identity::CallerIdentity;
use axum::{Json, Router, extract::State, response::IntoResponse, routing::post};
use content_pipeline::actions::{ActionError, dispatch_autopilot, resolve_tenant};
use content_pipeline::config::{LiveServices, PipelineConfig, build_live_services};
use serde_json::Value;

#[derive(Debug)]
struct AppContext {
    services: LiveServices,
    config: PipelineConfig,
}

impl ap_app::ContextProvider<PipelineConfig> for AppContext {
    async fn new(config: PipelineConfig, aws_config: aws_config::SdkConfig) -> Self {
        let services = build_live_services(&config, &aws_config)
            .await
            .expect("Failed to build pipeline services");

        Self { services, config }
    }
}

#[tracing::instrument(skip(ctx, body))]
async fn handle_action(
    State(ctx): State<Arc<AppContext>>,
    identity: CallerIdentity,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, ActionError> {
    let tenant_id = resolve_tenant(
        &body,
        identity.tenant_id.as_deref(),
        ctx.config.default_tenant_id.as_deref(),
    )?;

    dispatch_autopilot(&ctx.services, &tenant_id, identity.user_id.as_deref(), body).await
}

#[tokio::main]
async fn main() {
    let app_context = ap_app::create_app_context::<AppContext, PipelineConfig>()
        .await
        .expect("Failed to create app context");

    let app = Router::new()
        .route("/autopilot", post(handle_action))
        .with_state(Arc::new(app_context));

    ap_axum::run_app(ap_axum::with_default_layers(app))
        .await
        .expect("Failed to run lambda");
}
