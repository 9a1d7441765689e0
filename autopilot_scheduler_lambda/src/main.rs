use aws_lambda_events::eventbridge::EventBridgeEvent;
use chrono::Utc;
use content_pipeline::config::{LiveServices, PipelineConfig, build_live_services};
use content_pipeline::schedule::{SchedulerReport, run_due_tenants};
use lambda_runtime::{Error, LambdaEvent, run, service_fn};
use serde_json::Value;

#[derive(Debug)]
struct AppContext {
    services: LiveServices,
}

impl ap_app::ContextProvider<PipelineConfig> for AppContext {
    async fn new(config: PipelineConfig, aws_config: aws_config::SdkConfig) -> Self {
        let services = build_live_services(&config, &aws_config)
            .await
            .expect("Failed to build pipeline services");

        Self { services }
    }
}

async fn function_handler(
    context: &AppContext,
    event: LambdaEvent<EventBridgeEvent<Value>>,
) -> Result<SchedulerReport, Error> {
    tracing::info!(
        source = ?event.payload.source,
        time = ?event.payload.time,
        "scheduled autopilot pass"
    );

    let report = run_due_tenants(&context.services, Utc::now()).await?;

    Ok(report)
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let context = ap_app::create_app_context::<AppContext, PipelineConfig>().await?;

    run(service_fn(|event| async {
        function_handler(&context, event).await
    }))
    .await
}
