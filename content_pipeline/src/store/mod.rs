mod dynamo;
mod memory;

pub use dynamo::{DynamoStore, TableNames};
pub use memory::MemoryStore;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use types::{
    AutopilotRun, BlogPost, Platform, PublishingSettings, SettingsUpdate,
    SocialConnection, SocialPost,
};

use crate::error::StoreError;

/// Conditions checked atomically with the insertion of a run row.
#[derive(Debug, Clone, Copy)]
pub struct RunGuard {
    /// Skip the emergency-stop and enabled checks. The lease still applies.
    pub force: bool,
    pub lease: Duration,
    pub now: DateTime<Utc>,
}

impl RunGuard {
    /// Leases started before this instant are considered abandoned.
    #[must_use]
    pub fn stale_before(&self) -> DateTime<Utc> {
        self.now - self.lease
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    EmergencyStop,
    Disabled,
    RunInProgress { active_run_id: Option<String> },
}

impl SkipReason {
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::EmergencyStop => "emergency_stop",
            Self::Disabled => "disabled",
            Self::RunInProgress { .. } => "run_in_progress",
        }
    }

    #[must_use]
    pub const fn message(&self) -> &'static str {
        match self {
            Self::EmergencyStop => "Emergency stop is active",
            Self::Disabled => "Autopilot is disabled",
            Self::RunInProgress { .. } => {
                "Another autopilot run is already in progress"
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStart {
    Started,
    Rejected(SkipReason),
}

/// Why `settings` forbids starting a run, if it does. Emergency stop wins
/// over disabled, which wins over a live lease.
#[must_use]
pub fn check_guard(
    settings: &PublishingSettings,
    guard: &RunGuard,
) -> Option<SkipReason> {
    if !guard.force {
        if settings.emergency_stop {
            return Some(SkipReason::EmergencyStop);
        }
        if !settings.autopilot_enabled {
            return Some(SkipReason::Disabled);
        }
    }

    let lease_is_live = settings.active_run_id.is_some()
        && settings
            .active_run_started_at
            .is_none_or(|started_at| started_at >= guard.stale_before());

    if lease_is_live {
        return Some(SkipReason::RunInProgress {
            active_run_id: settings.active_run_id.clone(),
        });
    }

    None
}

/// Persistence of every autopilot record. All lookups are scoped to a
/// tenant: a record of another tenant reads as absent.
pub trait ContentStore {
    fn get_settings(
        &self,
        tenant_id: &str,
    ) -> impl Future<Output = Result<Option<PublishingSettings>, StoreError>> + Send;

    /// Upsert the present fields and return the stored settings.
    fn update_settings(
        &self,
        tenant_id: &str,
        update: &SettingsUpdate,
    ) -> impl Future<Output = Result<PublishingSettings, StoreError>> + Send;

    fn list_enabled_settings(
        &self,
    ) -> impl Future<Output = Result<Vec<PublishingSettings>, StoreError>> + Send;

    /// Take the tenant's run lease and insert `run` in one conditional write.
    fn start_run(
        &self,
        run: &AutopilotRun,
        guard: RunGuard,
    ) -> impl Future<Output = Result<RunStart, StoreError>> + Send;

    /// Store the final state of `run`, release the lease and stamp
    /// `last_run_at`.
    fn finish_run(
        &self,
        run: &AutopilotRun,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Most recent runs first.
    fn list_runs(
        &self,
        tenant_id: &str,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<AutopilotRun>, StoreError>> + Send;

    fn put_article(
        &self,
        article: &BlogPost,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn get_article(
        &self,
        tenant_id: &str,
        article_id: &str,
    ) -> impl Future<Output = Result<Option<BlogPost>, StoreError>> + Send;

    fn put_social_post(
        &self,
        post: &SocialPost,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn get_social_post(
        &self,
        tenant_id: &str,
        post_id: &str,
    ) -> impl Future<Output = Result<Option<SocialPost>, StoreError>> + Send;

    fn list_social_posts(
        &self,
        tenant_id: &str,
        article_id: &str,
    ) -> impl Future<Output = Result<Vec<SocialPost>, StoreError>> + Send;

    /// User id of the first admin of the tenant.
    fn find_admin_user(
        &self,
        tenant_id: &str,
    ) -> impl Future<Output = Result<Option<String>, StoreError>> + Send;

    fn get_connection(
        &self,
        tenant_id: &str,
        platform: Platform,
    ) -> impl Future<Output = Result<Option<SocialConnection>, StoreError>> + Send;

    fn put_connection(
        &self,
        connection: &SocialConnection,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn list_connections(
        &self,
        tenant_id: &str,
    ) -> impl Future<Output = Result<Vec<SocialConnection>, StoreError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard(force: bool) -> RunGuard {
        RunGuard {
            force,
            lease: Duration::minutes(15),
            now: Utc::now(),
        }
    }

    fn enabled() -> PublishingSettings {
        PublishingSettings {
            autopilot_enabled: true,
            ..PublishingSettings::for_tenant("acme")
        }
    }

    #[test]
    fn test_guard_precedence() {
        let mut settings = enabled();
        settings.emergency_stop = true;
        settings.autopilot_enabled = false;
        settings.active_run_id = Some("run-1".to_string());
        settings.active_run_started_at = Some(Utc::now());

        assert_eq!(check_guard(&settings, &guard(false)), Some(SkipReason::EmergencyStop));

        settings.emergency_stop = false;
        assert_eq!(check_guard(&settings, &guard(false)), Some(SkipReason::Disabled));

        settings.autopilot_enabled = true;
        assert_eq!(
            check_guard(&settings, &guard(false)),
            Some(SkipReason::RunInProgress {
                active_run_id: Some("run-1".to_string())
            })
        );
    }

    #[test]
    fn test_force_bypasses_flags_but_not_a_live_lease() {
        let mut settings = PublishingSettings::for_tenant("acme");
        settings.emergency_stop = true;
        assert_eq!(check_guard(&settings, &guard(true)), None);

        settings.active_run_id = Some("run-1".to_string());
        settings.active_run_started_at = Some(Utc::now() - Duration::minutes(5));
        assert!(matches!(
            check_guard(&settings, &guard(true)),
            Some(SkipReason::RunInProgress { .. })
        ));
    }

    #[test]
    fn test_stale_lease_is_ignored() {
        let mut settings = enabled();
        settings.active_run_id = Some("run-1".to_string());
        settings.active_run_started_at = Some(Utc::now() - Duration::minutes(16));

        assert_eq!(check_guard(&settings, &guard(false)), None);
    }
}
