use std::collections::{HashMap, HashSet};

use chrono::Utc;
use tokio::sync::Mutex;
use types::{
    AutopilotRun, BlogPost, Platform, PublishingSettings, SettingsUpdate,
    SocialConnection, SocialPost,
};

use super::{ContentStore, RunGuard, RunStart, check_guard};
use crate::error::StoreError;

#[derive(Debug, Default)]
struct Tables {
    settings: HashMap<String, PublishingSettings>,
    runs: Vec<AutopilotRun>,
    articles: Vec<BlogPost>,
    social_posts: Vec<SocialPost>,
    connections: Vec<SocialConnection>,
    user_roles: Vec<(String, String, String)>,
    failing_platforms: HashSet<Platform>,
}

/// In-process store for tests and local development. A single mutex makes
/// the run guard and the run insert one atomic step, as the transactional
/// write does on DynamoDB.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put_settings(&self, settings: PublishingSettings) {
        self.tables
            .lock()
            .await
            .settings
            .insert(settings.tenant_id.clone(), settings);
    }

    pub async fn add_user_role(&self, tenant_id: &str, user_id: &str, role: &str) {
        self.tables.lock().await.user_roles.push((
            tenant_id.to_string(),
            user_id.to_string(),
            role.to_string(),
        ));
    }

    /// Make every social post write for `platform` fail.
    pub async fn fail_social_post_writes(&self, platform: Platform) {
        self.tables.lock().await.failing_platforms.insert(platform);
    }

    pub async fn runs(&self) -> Vec<AutopilotRun> {
        self.tables.lock().await.runs.clone()
    }

    pub async fn articles(&self) -> Vec<BlogPost> {
        self.tables.lock().await.articles.clone()
    }

    pub async fn social_posts(&self) -> Vec<SocialPost> {
        self.tables.lock().await.social_posts.clone()
    }
}

fn upsert<T: Clone>(rows: &mut Vec<T>, row: &T, same: impl Fn(&T) -> bool) {
    if let Some(existing) = rows.iter_mut().find(|existing| same(existing)) {
        *existing = row.clone();
    } else {
        rows.push(row.clone());
    }
}

impl ContentStore for MemoryStore {
    async fn get_settings(
        &self,
        tenant_id: &str,
    ) -> Result<Option<PublishingSettings>, StoreError> {
        Ok(self.tables.lock().await.settings.get(tenant_id).cloned())
    }

    async fn update_settings(
        &self,
        tenant_id: &str,
        update: &SettingsUpdate,
    ) -> Result<PublishingSettings, StoreError> {
        let mut tables = self.tables.lock().await;
        let settings = tables
            .settings
            .entry(tenant_id.to_string())
            .or_insert_with(|| PublishingSettings::for_tenant(tenant_id));

        update.apply_to(settings);
        settings.updated_at = Some(Utc::now());

        Ok(settings.clone())
    }

    async fn list_enabled_settings(
        &self,
    ) -> Result<Vec<PublishingSettings>, StoreError> {
        let tables = self.tables.lock().await;
        let mut enabled = tables
            .settings
            .values()
            .filter(|settings| settings.autopilot_enabled)
            .cloned()
            .collect::<Vec<_>>();
        enabled.sort_by(|a, b| a.tenant_id.cmp(&b.tenant_id));

        Ok(enabled)
    }

    async fn start_run(
        &self,
        run: &AutopilotRun,
        guard: RunGuard,
    ) -> Result<RunStart, StoreError> {
        let mut tables = self.tables.lock().await;

        let settings = tables
            .settings
            .entry(run.tenant_id.clone())
            .or_insert_with(|| PublishingSettings::for_tenant(&run.tenant_id));

        if let Some(reason) = check_guard(settings, &guard) {
            return Ok(RunStart::Rejected(reason));
        }

        settings.active_run_id = Some(run.id.clone());
        settings.active_run_started_at = Some(run.started_at);
        tables.runs.push(run.clone());

        Ok(RunStart::Started)
    }

    async fn finish_run(&self, run: &AutopilotRun) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;

        upsert(&mut tables.runs, run, |existing| existing.id == run.id);

        if let Some(settings) = tables.settings.get_mut(&run.tenant_id) {
            if settings.active_run_id.as_deref() == Some(run.id.as_str()) {
                settings.active_run_id = None;
                settings.active_run_started_at = None;
                settings.last_run_at = Some(run.completed_at.unwrap_or_else(Utc::now));
            } else {
                tracing::warn!(run_id = %run.id, "run lease was already released");
            }
        }

        Ok(())
    }

    async fn list_runs(
        &self,
        tenant_id: &str,
        limit: usize,
    ) -> Result<Vec<AutopilotRun>, StoreError> {
        let tables = self.tables.lock().await;
        let mut runs = tables
            .runs
            .iter()
            .filter(|run| run.tenant_id == tenant_id)
            .cloned()
            .collect::<Vec<_>>();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        runs.truncate(limit);

        Ok(runs)
    }

    async fn put_article(&self, article: &BlogPost) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        upsert(&mut tables.articles, article, |existing| existing.id == article.id);
        Ok(())
    }

    async fn get_article(
        &self,
        tenant_id: &str,
        article_id: &str,
    ) -> Result<Option<BlogPost>, StoreError> {
        Ok(self
            .tables
            .lock()
            .await
            .articles
            .iter()
            .find(|article| article.id == article_id && article.tenant_id == tenant_id)
            .cloned())
    }

    async fn put_social_post(&self, post: &SocialPost) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;

        if tables.failing_platforms.contains(&post.platform) {
            return Err(StoreError::Unavailable(format!(
                "writes for {} are failing",
                post.platform
            )));
        }

        upsert(&mut tables.social_posts, post, |existing| existing.id == post.id);
        Ok(())
    }

    async fn get_social_post(
        &self,
        tenant_id: &str,
        post_id: &str,
    ) -> Result<Option<SocialPost>, StoreError> {
        Ok(self
            .tables
            .lock()
            .await
            .social_posts
            .iter()
            .find(|post| post.id == post_id && post.tenant_id == tenant_id)
            .cloned())
    }

    async fn list_social_posts(
        &self,
        tenant_id: &str,
        article_id: &str,
    ) -> Result<Vec<SocialPost>, StoreError> {
        Ok(self
            .tables
            .lock()
            .await
            .social_posts
            .iter()
            .filter(|post| {
                post.tenant_id == tenant_id
                    && post.blog_post_id.as_deref() == Some(article_id)
            })
            .cloned()
            .collect())
    }

    async fn find_admin_user(
        &self,
        tenant_id: &str,
    ) -> Result<Option<String>, StoreError> {
        Ok(self
            .tables
            .lock()
            .await
            .user_roles
            .iter()
            .find(|(tenant, _, role)| tenant == tenant_id && role == "admin")
            .map(|(_, user_id, _)| user_id.clone()))
    }

    async fn get_connection(
        &self,
        tenant_id: &str,
        platform: Platform,
    ) -> Result<Option<SocialConnection>, StoreError> {
        Ok(self
            .tables
            .lock()
            .await
            .connections
            .iter()
            .find(|c| c.tenant_id == tenant_id && c.platform == platform)
            .cloned())
    }

    async fn put_connection(
        &self,
        connection: &SocialConnection,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        upsert(&mut tables.connections, connection, |existing| {
            existing.tenant_id == connection.tenant_id
                && existing.platform == connection.platform
        });
        Ok(())
    }

    async fn list_connections(
        &self,
        tenant_id: &str,
    ) -> Result<Vec<SocialConnection>, StoreError> {
        Ok(self
            .tables
            .lock()
            .await
            .connections
            .iter()
            .filter(|c| c.tenant_id == tenant_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use types::{RunMetadata, RunStatus, RunType};

    fn run(tenant_id: &str, id: &str) -> AutopilotRun {
        AutopilotRun {
            id: id.to_string(),
            tenant_id: tenant_id.to_string(),
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

    #[tokio::test]
    async fn test_lease_blocks_second_start_until_finished() {
        let store = MemoryStore::new();

        let first = run("acme", "run-1");
        assert_eq!(store.start_run(&first, guard(true)).await.unwrap(), RunStart::Started);

        let second = run("acme", "run-2");
        assert!(matches!(
            store.start_run(&second, guard(true)).await.unwrap(),
            RunStart::Rejected(super::super::SkipReason::RunInProgress { .. })
        ));
        assert_eq!(store.runs().await.len(), 1);

        let mut finished = first.clone();
        finished.status = RunStatus::Completed;
        finished.completed_at = Some(Utc::now());
        store.finish_run(&finished).await.unwrap();

        let settings = store.get_settings("acme").await.unwrap().unwrap();
        assert!(settings.active_run_id.is_none());
        assert!(settings.last_run_at.is_some());

        assert_eq!(store.start_run(&second, guard(true)).await.unwrap(), RunStart::Started);
    }

    #[tokio::test]
    async fn test_lookups_are_tenant_scoped() {
        let store = MemoryStore::new();
        store.add_user_role("acme", "user-1", "trainer").await;
        store.add_user_role("other", "user-2", "admin").await;
        store.add_user_role("acme", "user-3", "admin").await;

        assert_eq!(store.find_admin_user("acme").await.unwrap().as_deref(), Some("user-3"));
        assert_eq!(store.find_admin_user("nobody").await.unwrap(), None);

        store.start_run(&run("acme", "run-1"), guard(true)).await.unwrap();
        assert!(store.list_runs("other", 10).await.unwrap().is_empty());
    }
}
