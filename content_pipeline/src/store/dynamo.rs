use std::collections::HashMap;

use aws_sdk_dynamodb::Client as DynamoDbClient;
use aws_sdk_dynamodb::types::{
    AttributeValue, Put, ReturnValue, TransactWriteItem, Update,
};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use types::{
    AutopilotRun, BlogPost, Platform, PublishingSettings, SettingsUpdate,
    SocialConnection, SocialPost,
};

use super::{ContentStore, RunGuard, RunStart, SkipReason, check_guard};
use crate::error::StoreError;

type Item = HashMap<String, AttributeValue>;

const RUNS_BY_TENANT_INDEX: &str = "tenant_id-started_at-index";
const POSTS_BY_ARTICLE_INDEX: &str = "blog_post_id-index";
const ROLES_BY_ROLE_INDEX: &str = "role-index";

#[derive(Debug, Clone)]
pub struct TableNames {
    pub settings: String,
    pub runs: String,
    pub articles: String,
    pub social_posts: String,
    pub connections: String,
    pub user_roles: String,
}

/// [`ContentStore`] over DynamoDB.
///
/// | table        | key                     | index                                 |
/// |--------------|-------------------------|---------------------------------------|
/// | settings     | `tenant_id`             |                                       |
/// | runs         | `id`                    | `tenant_id-started_at-index`          |
/// | articles     | `id`                    |                                       |
/// | social posts | `id`                    | `blog_post_id-index`                  |
/// | connections  | `tenant_id`, `platform` |                                       |
/// | user roles   | `tenant_id`, `user_id`  | `role-index`                          |
#[derive(Debug, Clone)]
pub struct DynamoStore {
    client: DynamoDbClient,
    tables: TableNames,
}

impl DynamoStore {
    #[must_use]
    pub const fn new(client: DynamoDbClient, tables: TableNames) -> Self {
        Self { client, tables }
    }

    async fn get_by_id<T: DeserializeOwned>(
        &self,
        table_name: &str,
        id: &str,
    ) -> Result<Option<T>, StoreError> {
        let result = self
            .client
            .get_item()
            .table_name(table_name)
            .key("id", AttributeValue::S(id.to_string()))
            .send()
            .await
            .map_err(|e| StoreError::dynamodb("GetItem", e))?;

        result
            .item
            .map(|item| serde_dynamo::from_item(item).map_err(StoreError::from))
            .transpose()
    }

    async fn put<T: serde::Serialize>(
        &self,
        table_name: &str,
        value: &T,
    ) -> Result<(), StoreError> {
        let item: Item = serde_dynamo::to_item(value)?;

        self.client
            .put_item()
            .table_name(table_name)
            .set_item(Some(item))
            .send()
            .await
            .map_err(|e| StoreError::dynamodb("PutItem", e))?;

        Ok(())
    }

    /// Run a query to exhaustion, skipping items that do not deserialize.
    async fn query_all<T: DeserializeOwned>(
        &self,
        table_name: &str,
        index_name: Option<&str>,
        key_condition: &str,
        filter: Option<&str>,
        names: Option<HashMap<String, String>>,
        values: Item,
    ) -> Result<Vec<T>, StoreError> {
        let mut rows = Vec::new();
        let mut exclusive_start_key: Option<Item> = None;

        loop {
            let mut query = self
                .client
                .query()
                .table_name(table_name)
                .set_index_name(index_name.map(str::to_string))
                .key_condition_expression(key_condition)
                .set_filter_expression(filter.map(str::to_string))
                .set_expression_attribute_names(names.clone())
                .set_expression_attribute_values(Some(values.clone()));

            if let Some(start_key) = exclusive_start_key {
                query = query.set_exclusive_start_key(Some(start_key));
            }

            let response = query
                .send()
                .await
                .map_err(|e| StoreError::dynamodb("Query", e))?;

            for item in response.items.unwrap_or_default() {
                match serde_dynamo::from_item(item) {
                    Ok(row) => rows.push(row),
                    Err(e) => tracing::warn!(
                        "Failed to deserialize item from {table_name}: {e}"
                    ),
                }
            }

            if response.last_evaluated_key.is_none() {
                break;
            }
            exclusive_start_key = response.last_evaluated_key;
        }

        Ok(rows)
    }
}

/// Fixed-width timestamp so that string comparisons in condition
/// expressions follow time order.
fn timestamp(at: DateTime<Utc>) -> AttributeValue {
    AttributeValue::S(at.to_rfc3339_opts(SecondsFormat::Millis, true))
}

fn s(value: &str) -> AttributeValue {
    AttributeValue::S(value.to_string())
}

impl ContentStore for DynamoStore {
    #[tracing::instrument(skip(self))]
    async fn get_settings(
        &self,
        tenant_id: &str,
    ) -> Result<Option<PublishingSettings>, StoreError> {
        let result = self
            .client
            .get_item()
            .table_name(&self.tables.settings)
            .key("tenant_id", s(tenant_id))
            .send()
            .await
            .map_err(|e| StoreError::dynamodb("GetItem", e))?;

        result
            .item
            .map(|item| serde_dynamo::from_item(item).map_err(StoreError::from))
            .transpose()
    }

    #[tracing::instrument(skip(self))]
    async fn update_settings(
        &self,
        tenant_id: &str,
        update: &SettingsUpdate,
    ) -> Result<PublishingSettings, StoreError> {
        let mut fields: Item = serde_dynamo::to_item(update)?;
        fields.insert("updated_at".to_string(), timestamp(Utc::now()));

        let (update_expression, expression_attribute_names, expression_attribute_values) =
            fields
                .into_iter()
                .filter(|(k, _)| k != "tenant_id")
                .enumerate()
                .fold(
                    (Vec::new(), HashMap::new(), HashMap::new()),
                    |(mut exprs, mut names, mut values), (i, (k, v))| {
                        exprs.push(format!("#k{i} = :v{i}"));
                        names.insert(format!("#k{i}"), k);
                        values.insert(format!(":v{i}"), v);
                        (exprs, names, values)
                    },
                );
        let update_expression = format!("SET {}", update_expression.join(", "));

        tracing::debug!(
            "Update expression: {:?}, Expression attribute names: {:?}",
            update_expression,
            expression_attribute_names,
        );

        let result = self
            .client
            .update_item()
            .table_name(&self.tables.settings)
            .key("tenant_id", s(tenant_id))
            .set_update_expression(Some(update_expression))
            .set_expression_attribute_names(Some(expression_attribute_names))
            .set_expression_attribute_values(Some(expression_attribute_values))
            .return_values(ReturnValue::AllNew)
            .send()
            .await
            .map_err(|e| StoreError::dynamodb("UpdateItem", e))?;

        let item = result.attributes.unwrap_or_default();

        Ok(serde_dynamo::from_item(item)?)
    }

    #[tracing::instrument(skip(self))]
    async fn list_enabled_settings(
        &self,
    ) -> Result<Vec<PublishingSettings>, StoreError> {
        let mut rows = Vec::new();
        let mut exclusive_start_key: Option<Item> = None;

        loop {
            let mut scan = self
                .client
                .scan()
                .table_name(&self.tables.settings)
                .filter_expression("autopilot_enabled = :enabled")
                .expression_attribute_values(":enabled", AttributeValue::Bool(true));

            if let Some(start_key) = exclusive_start_key {
                scan = scan.set_exclusive_start_key(Some(start_key));
            }

            let response = scan
                .send()
                .await
                .map_err(|e| StoreError::dynamodb("Scan", e))?;

            for item in response.items.unwrap_or_default() {
                match serde_dynamo::from_item(item) {
                    Ok(settings) => rows.push(settings),
                    Err(e) => tracing::warn!("Failed to deserialize settings: {e}"),
                }
            }

            if response.last_evaluated_key.is_none() {
                break;
            }
            exclusive_start_key = response.last_evaluated_key;
        }

        Ok(rows)
    }

    #[tracing::instrument(skip(self, run), fields(run_id = %run.id, tenant_id = %run.tenant_id))]
    async fn start_run(
        &self,
        run: &AutopilotRun,
        guard: RunGuard,
    ) -> Result<RunStart, StoreError> {
        let mut condition = String::from(
            "(attribute_not_exists(active_run_id) OR active_run_started_at < :stale_before)",
        );
        let mut values = HashMap::from([
            (":run_id".to_string(), s(&run.id)),
            (":started_at".to_string(), timestamp(run.started_at)),
            (":stale_before".to_string(), timestamp(guard.stale_before())),
        ]);

        if !guard.force {
            condition.push_str(
                " AND (attribute_not_exists(emergency_stop) OR emergency_stop = :false) AND autopilot_enabled = :true",
            );
            values.insert(":false".to_string(), AttributeValue::Bool(false));
            values.insert(":true".to_string(), AttributeValue::Bool(true));
        }

        let lease = Update::builder()
            .table_name(&self.tables.settings)
            .key("tenant_id", s(&run.tenant_id))
            .update_expression(
                "SET active_run_id = :run_id, active_run_started_at = :started_at",
            )
            .condition_expression(condition)
            .set_expression_attribute_values(Some(values))
            .build()
            .map_err(|e| StoreError::DynamoDb(e.to_string()))?;

        let run_item: Item = serde_dynamo::to_item(run)?;
        let insert = Put::builder()
            .table_name(&self.tables.runs)
            .set_item(Some(run_item))
            .condition_expression("attribute_not_exists(id)")
            .build()
            .map_err(|e| StoreError::DynamoDb(e.to_string()))?;

        let result = self
            .client
            .transact_write_items()
            .transact_items(TransactWriteItem::builder().update(lease).build())
            .transact_items(TransactWriteItem::builder().put(insert).build())
            .send()
            .await;

        match result {
            Ok(_) => Ok(RunStart::Started),
            Err(e)
                if e.as_service_error()
                    .is_some_and(|e| e.is_transaction_canceled_exception()) =>
            {
                // find out which condition failed
                let settings = self
                    .get_settings(&run.tenant_id)
                    .await?
                    .unwrap_or_else(|| PublishingSettings::for_tenant(&run.tenant_id));
                let reason = check_guard(&settings, &guard).unwrap_or(
                    SkipReason::RunInProgress {
                        active_run_id: settings.active_run_id,
                    },
                );
                Ok(RunStart::Rejected(reason))
            }
            Err(e) => Err(StoreError::dynamodb("TransactWriteItems", e)),
        }
    }

    #[tracing::instrument(skip(self, run), fields(run_id = %run.id, tenant_id = %run.tenant_id))]
    async fn finish_run(&self, run: &AutopilotRun) -> Result<(), StoreError> {
        self.put(&self.tables.runs, run).await?;

        let result = self
            .client
            .update_item()
            .table_name(&self.tables.settings)
            .key("tenant_id", s(&run.tenant_id))
            .update_expression(
                "SET last_run_at = :finished_at REMOVE active_run_id, active_run_started_at",
            )
            .condition_expression("active_run_id = :run_id")
            .expression_attribute_values(
                ":finished_at",
                timestamp(run.completed_at.unwrap_or_else(Utc::now)),
            )
            .expression_attribute_values(":run_id", s(&run.id))
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e)
                if e.as_service_error()
                    .is_some_and(|e| e.is_conditional_check_failed_exception()) =>
            {
                tracing::warn!("run lease was already released");
                Ok(())
            }
            Err(e) => Err(StoreError::dynamodb("UpdateItem", e)),
        }
    }

    #[tracing::instrument(skip(self))]
    async fn list_runs(
        &self,
        tenant_id: &str,
        limit: usize,
    ) -> Result<Vec<AutopilotRun>, StoreError> {
        let response = self
            .client
            .query()
            .table_name(&self.tables.runs)
            .index_name(RUNS_BY_TENANT_INDEX)
            .key_condition_expression("tenant_id = :tenant_id")
            .expression_attribute_values(":tenant_id", s(tenant_id))
            .scan_index_forward(false)
            .limit(i32::try_from(limit).unwrap_or(i32::MAX))
            .send()
            .await
            .map_err(|e| StoreError::dynamodb("Query", e))?;

        let runs = response
            .items
            .unwrap_or_default()
            .into_iter()
            .filter_map(|item| {
                serde_dynamo::from_item(item)
                    .map_err(|e| tracing::warn!("Failed to deserialize run: {e}"))
                    .ok()
            })
            .collect();

        Ok(runs)
    }

    #[tracing::instrument(skip(self, article), fields(article_id = %article.id))]
    async fn put_article(&self, article: &BlogPost) -> Result<(), StoreError> {
        self.put(&self.tables.articles, article).await
    }

    #[tracing::instrument(skip(self))]
    async fn get_article(
        &self,
        tenant_id: &str,
        article_id: &str,
    ) -> Result<Option<BlogPost>, StoreError> {
        let article: Option<BlogPost> =
            self.get_by_id(&self.tables.articles, article_id).await?;

        Ok(article.filter(|article| article.tenant_id == tenant_id))
    }

    #[tracing::instrument(skip(self, post), fields(post_id = %post.id, platform = %post.platform))]
    async fn put_social_post(&self, post: &SocialPost) -> Result<(), StoreError> {
        self.put(&self.tables.social_posts, post).await
    }

    #[tracing::instrument(skip(self))]
    async fn get_social_post(
        &self,
        tenant_id: &str,
        post_id: &str,
    ) -> Result<Option<SocialPost>, StoreError> {
        let post: Option<SocialPost> =
            self.get_by_id(&self.tables.social_posts, post_id).await?;

        Ok(post.filter(|post| post.tenant_id == tenant_id))
    }

    #[tracing::instrument(skip(self))]
    async fn list_social_posts(
        &self,
        tenant_id: &str,
        article_id: &str,
    ) -> Result<Vec<SocialPost>, StoreError> {
        self.query_all(
            &self.tables.social_posts,
            Some(POSTS_BY_ARTICLE_INDEX),
            "blog_post_id = :article_id",
            Some("tenant_id = :tenant_id"),
            None,
            HashMap::from([
                (":article_id".to_string(), s(article_id)),
                (":tenant_id".to_string(), s(tenant_id)),
            ]),
        )
        .await
    }

    #[tracing::instrument(skip(self))]
    async fn find_admin_user(
        &self,
        tenant_id: &str,
    ) -> Result<Option<String>, StoreError> {
        let mut exclusive_start_key: Option<Item> = None;

        loop {
            let mut query = self
                .client
                .query()
                .table_name(&self.tables.user_roles)
                .index_name(ROLES_BY_ROLE_INDEX)
                .key_condition_expression("#role = :role")
                .filter_expression("tenant_id = :tenant_id")
                .expression_attribute_names("#role", "role")
                .expression_attribute_values(":role", s("admin"))
                .expression_attribute_values(":tenant_id", s(tenant_id));

            if let Some(start_key) = exclusive_start_key {
                query = query.set_exclusive_start_key(Some(start_key));
            }

            let response = query
                .send()
                .await
                .map_err(|e| StoreError::dynamodb("Query", e))?;

            let user_id = response.items().iter().find_map(|item| {
                item.get("user_id").and_then(|v| v.as_s().ok()).cloned()
            });
            if user_id.is_some() {
                return Ok(user_id);
            }

            if response.last_evaluated_key.is_none() {
                return Ok(None);
            }
            exclusive_start_key = response.last_evaluated_key;
        }
    }

    #[tracing::instrument(skip(self))]
    async fn get_connection(
        &self,
        tenant_id: &str,
        platform: Platform,
    ) -> Result<Option<SocialConnection>, StoreError> {
        let result = self
            .client
            .get_item()
            .table_name(&self.tables.connections)
            .key("tenant_id", s(tenant_id))
            .key("platform", s(platform.as_str()))
            .send()
            .await
            .map_err(|e| StoreError::dynamodb("GetItem", e))?;

        result
            .item
            .map(|item| serde_dynamo::from_item(item).map_err(StoreError::from))
            .transpose()
    }

    #[tracing::instrument(skip(self, connection), fields(platform = %connection.platform))]
    async fn put_connection(
        &self,
        connection: &SocialConnection,
    ) -> Result<(), StoreError> {
        self.put(&self.tables.connections, connection).await
    }

    #[tracing::instrument(skip(self))]
    async fn list_connections(
        &self,
        tenant_id: &str,
    ) -> Result<Vec<SocialConnection>, StoreError> {
        self.query_all(
            &self.tables.connections,
            None,
            "tenant_id = :tenant_id",
            None,
            None,
            HashMap::from([(":tenant_id".to_string(), s(tenant_id))]),
        )
        .await
    }
}
