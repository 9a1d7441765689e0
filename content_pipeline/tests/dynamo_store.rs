use aws_sdk_dynamodb::Client as DynamoDbClient;
use aws_sdk_dynamodb::types::{
    AttributeDefinition, AttributeValue, BillingMode, GlobalSecondaryIndex,
    KeySchemaElement, KeyType, Projection, ProjectionType, ScalarAttributeType,
};
use chrono::{Duration, Utc};
use content_pipeline::store::{
    ContentStore, DynamoStore, RunGuard, RunStart, SkipReason, TableNames,
};
use testcontainers::{ImageExt, runners::AsyncRunner};
use testcontainers_modules::localstack::LocalStack;
use types::{
    AutopilotRun, RunMetadata, RunStatus, RunType, SettingsUpdate,
};

fn table_names() -> TableNames {
    TableNames {
        settings: "publishing-settings".to_string(),
        runs: "autopilot-runs".to_string(),
        articles: "blog-posts".to_string(),
        social_posts: "social-posts".to_string(),
        connections: "social-connections".to_string(),
        user_roles: "user-roles".to_string(),
    }
}

fn key(name: &str, key_type: KeyType) -> KeySchemaElement {
    KeySchemaElement::builder()
        .attribute_name(name)
        .key_type(key_type)
        .build()
        .unwrap()
}

fn string_attribute(name: &str) -> AttributeDefinition {
    AttributeDefinition::builder()
        .attribute_name(name)
        .attribute_type(ScalarAttributeType::S)
        .build()
        .unwrap()
}

async fn create_table(
    client: &DynamoDbClient,
    name: &str,
    hash_key: &str,
    range_key: Option<&str>,
    index: Option<(&str, &str, Option<&str>)>,
) {
    let mut attributes = vec![string_attribute(hash_key)];
    let mut schema = vec![key(hash_key, KeyType::Hash)];
    if let Some(range_key) = range_key {
        attributes.push(string_attribute(range_key));
        schema.push(key(range_key, KeyType::Range));
    }

    let mut request = client
        .create_table()
        .table_name(name)
        .billing_mode(BillingMode::PayPerRequest);

    if let Some((index_name, index_hash, index_range)) = index {
        let mut index_schema = vec![key(index_hash, KeyType::Hash)];
        for attribute in std::iter::once(index_hash).chain(index_range) {
            if !attributes
                .iter()
                .any(|existing| existing.attribute_name() == attribute)
            {
                attributes.push(string_attribute(attribute));
            }
        }
        if let Some(index_range) = index_range {
            index_schema.push(key(index_range, KeyType::Range));
        }

        request = request.global_secondary_indexes(
            GlobalSecondaryIndex::builder()
                .index_name(index_name)
                .set_key_schema(Some(index_schema))
                .projection(
                    Projection::builder()
                        .projection_type(ProjectionType::All)
                        .build(),
                )
                .build()
                .unwrap(),
        );
    }

    request
        .set_attribute_definitions(Some(attributes))
        .set_key_schema(Some(schema))
        .send()
        .await
        .expect("Failed to create table");
}

async fn setup_tables(client: &DynamoDbClient, tables: &TableNames) {
    create_table(client, &tables.settings, "tenant_id", None, None).await;
    create_table(
        client,
        &tables.runs,
        "id",
        None,
        Some(("tenant_id-started_at-index", "tenant_id", Some("started_at"))),
    )
    .await;
    create_table(client, &tables.articles, "id", None, None).await;
    create_table(
        client,
        &tables.social_posts,
        "id",
        None,
        Some(("blog_post_id-index", "blog_post_id", None)),
    )
    .await;
    create_table(client, &tables.connections, "tenant_id", Some("platform"), None).await;
    create_table(
        client,
        &tables.user_roles,
        "tenant_id",
        Some("user_id"),
        Some(("role-index", "role", None)),
    )
    .await;
}

fn run(id: &str) -> AutopilotRun {
    AutopilotRun {
        id: id.to_string(),
        tenant_id: "acme".to_string(),
        run_type: RunType::Manual,
        status: RunStatus::Running,
        started_at: Utc::now(),
        completed_at: None,
        trend_topic: None,
        trend_sources: vec![],
        article_id: None,
        social_posts_generated: 0,
        error_message: None,
        ai_model: None,
        metadata: RunMetadata::default(),
    }
}

fn guard(force: bool) -> RunGuard {
    RunGuard {
        force,
        lease: Duration::minutes(15),
        now: Utc::now(),
    }
}

/// Needs Docker.
#[tokio::test]
#[ignore]
async fn test_dynamo_store_run_lease_and_settings() {
    let localstack = LocalStack::default()
        .with_env_var("SERVICES", "dynamodb")
        .start()
        .await
        .expect("Failed to start LocalStack container");
    let port = localstack
        .get_host_port_ipv4(4566)
        .await
        .expect("Failed to get LocalStack port");

    let aws_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .endpoint_url(format!("http://localhost:{port}"))
        .region("us-east-1")
        .credentials_provider(aws_sdk_dynamodb::config::Credentials::new(
            "test", "test", None, None, "test",
        ))
        .load()
        .await;
    let client = DynamoDbClient::new(&aws_config);
    let tables = table_names();
    setup_tables(&client, &tables).await;

    let store = DynamoStore::new(client.clone(), tables.clone());

    // unforced start on a tenant without settings is refused
    assert_eq!(
        store.start_run(&run("run-0"), guard(false)).await.unwrap(),
        RunStart::Rejected(SkipReason::Disabled)
    );

    let settings = store
        .update_settings(
            "acme",
            &SettingsUpdate {
                autopilot_enabled: Some(true),
                autopilot_topics: Some(vec!["Qualiopi".to_string()]),
                ..SettingsUpdate::default()
            },
        )
        .await
        .unwrap();
    assert!(settings.autopilot_enabled);
    assert_eq!(settings.autopilot_topics, vec!["Qualiopi".to_string()]);
    assert!(settings.updated_at.is_some());

    let enabled = store.list_enabled_settings().await.unwrap();
    assert_eq!(enabled.len(), 1);

    let first = run("run-1");
    assert_eq!(store.start_run(&first, guard(false)).await.unwrap(), RunStart::Started);

    let second = run("run-2");
    assert_eq!(
        store.start_run(&second, guard(true)).await.unwrap(),
        RunStart::Rejected(SkipReason::RunInProgress {
            active_run_id: Some("run-1".to_string())
        })
    );

    let mut finished = first.clone();
    finished.status = RunStatus::Completed;
    finished.completed_at = Some(Utc::now());
    store.finish_run(&finished).await.unwrap();

    let settings = store.get_settings("acme").await.unwrap().unwrap();
    assert!(settings.active_run_id.is_none());
    assert!(settings.last_run_at.is_some());

    let runs = store.list_runs("acme", 10).await.unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Completed);

    store
        .update_settings(
            "acme",
            &SettingsUpdate {
                emergency_stop: Some(true),
                ..SettingsUpdate::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(
        store.start_run(&second, guard(false)).await.unwrap(),
        RunStart::Rejected(SkipReason::EmergencyStop)
    );
    assert_eq!(store.start_run(&second, guard(true)).await.unwrap(), RunStart::Started);

    client
        .put_item()
        .table_name(&tables.user_roles)
        .item("tenant_id", AttributeValue::S("acme".to_string()))
        .item("user_id", AttributeValue::S("admin-1".to_string()))
        .item("role", AttributeValue::S("admin".to_string()))
        .send()
        .await
        .unwrap();
    assert_eq!(
        store.find_admin_user("acme").await.unwrap().as_deref(),
        Some("admin-1")
    );
    assert_eq!(store.find_admin_user("other").await.unwrap(), None);
}
