use std::sync::Arc;

use ap_axum::identity::CallerIdentity;
use aws_sdk_dynamodb::Client as DynamoDbClient;
use aws_sdk_secretsmanager::Client as SecretsManagerClient;
use axum::{Json, Router, extract::State, response::IntoResponse, routing::post};
use content_pipeline::actions::{ActionError, dispatch_social, resolve_tenant};
use content_pipeline::publisher::SecretsManagerVault;
use content_pipeline::store::{DynamoStore, TableNames};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
struct Config {
    settings_table: String,
    runs_table: String,
    articles_table: String,
    social_posts_table: String,
    connections_table: String,
    user_roles_table: String,
    #[serde(default = "default_connection_secret_prefix")]
    connection_secret_prefix: String,
    #[serde(default)]
    default_tenant_id: Option<String>,
}

fn default_connection_secret_prefix() -> String {
    "social-connections".to_string()
}

#[derive(Debug)]
struct AppContext {
    store: DynamoStore,
    vault: SecretsManagerVault,
    config: Config,
}

impl ap_app::ContextProvider<Config> for AppContext {
    async fn new(config: Config, aws_config: aws_config::SdkConfig) -> Self {
        let tables = TableNames {
            settings: config.settings_table.clone(),
            runs: config.runs_table.clone(),
            articles: config.articles_table.clone(),
            social_posts: config.social_posts_table.clone(),
            connections: config.connections_table.clone(),
            user_roles: config.user_roles_table.clone(),
        };

        Self {
            store: DynamoStore::new(DynamoDbClient::new(&aws_config), tables),
            vault: SecretsManagerVault::new(
                SecretsManagerClient::new(&aws_config),
                &config.connection_secret_prefix,
            ),
            config,
        }
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

    dispatch_social(&ctx.store, &ctx.vault, &tenant_id, body).await
}

#[tokio::main]
async fn main() {
    let app_context = ap_app::create_app_context::<AppContext, Config>()
        .await
        .expect("Failed to create app context");

    let app = Router::new()
        .route("/social", post(handle_action))
        .with_state(Arc::new(app_context));

    ap_axum::run_app(ap_axum::with_default_layers(app))
        .await
        .expect("Failed to run lambda");
}
