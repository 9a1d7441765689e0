use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::Serialize;
use types::{PublishingSettings, RunType};

use crate::autopilot::{RunOptions, RunOutcome, Services, run_autopilot};
use crate::error::PipelineError;
use crate::store::ContentStore;

/// Whether a tenant's next scheduled run is due. A tenant that never ran is
/// due immediately.
#[must_use]
pub fn is_due(settings: &PublishingSettings, now: DateTime<Utc>) -> bool {
    if !settings.autopilot_enabled || settings.emergency_stop {
        return false;
    }

    settings.last_run_at.is_none_or(|last_run_at| {
        last_run_at + Duration::hours(settings.autopilot_frequency.interval_hours()) <= now
    })
}

/// Next `HH:MM` UTC slot at or after `now`, or tomorrow's first slot when
/// every slot of the day has passed. Unparsable entries are ignored.
#[must_use]
pub fn next_posting_slot(times: &[String], now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let mut slots = times
        .iter()
        .filter_map(|time| NaiveTime::parse_from_str(time.trim(), "%H:%M").ok())
        .collect::<Vec<_>>();
    slots.sort_unstable();

    let first = *slots.first()?;
    let today = now.date_naive();

    let slot = slots
        .iter()
        .map(|time| today.and_time(*time).and_utc())
        .find(|slot| *slot >= now)
        .unwrap_or_else(|| (today + Duration::days(1)).and_time(first).and_utc());

    Some(slot)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerReport {
    pub tenants_checked: usize,
    pub runs_started: usize,
    pub runs_completed: usize,
    pub runs_failed: usize,
}

/// Run the pipeline for every enabled tenant that is due, one at a time.
///
/// # Errors
/// Fails only when the enabled tenants cannot be listed. A tenant whose run
/// errors is counted as failed and the others still run.
#[tracing::instrument(skip(services))]
pub async fn run_due_tenants<S: Services>(
    services: &S,
    now: DateTime<Utc>,
) -> Result<SchedulerReport, PipelineError> {
    let tenants = services.store().list_enabled_settings().await?;
    let mut report = SchedulerReport {
        tenants_checked: tenants.len(),
        ..SchedulerReport::default()
    };

    for settings in tenants.iter().filter(|settings| is_due(settings, now)) {
        let options = RunOptions {
            run_type: RunType::Scheduled,
            force: false,
        };

        match run_autopilot(services, &settings.tenant_id, options).await {
            Ok(RunOutcome::Completed(_)) => {
                report.runs_started += 1;
                report.runs_completed += 1;
            }
            Ok(RunOutcome::Failed { .. }) => {
                report.runs_started += 1;
                report.runs_failed += 1;
            }
            Ok(RunOutcome::Skipped(reason)) => {
                tracing::info!(
                    tenant_id = %settings.tenant_id,
                    "scheduled run skipped: {}",
                    reason.message()
                );
            }
            Err(e) => {
                tracing::error!(
                    tenant_id = %settings.tenant_id,
                    "scheduled run could not start: {e}"
                );
                report.runs_failed += 1;
            }
        }
    }

    tracing::info!(?report, "scheduler pass finished");

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use types::AutopilotFrequency;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, hour, minute, 0).unwrap()
    }

    fn times(values: &[&str]) -> Vec<String> {
        values.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_next_slot_later_today() {
        let slot = next_posting_slot(&times(&["18:00", "09:00"]), at(10, 0));
        assert_eq!(slot, Some(at(18, 0)));
    }

    #[test]
    fn test_slot_equal_to_now_is_kept() {
        let slot = next_posting_slot(&times(&["09:00"]), at(9, 0));
        assert_eq!(slot, Some(at(9, 0)));
    }

    #[test]
    fn test_next_slot_rolls_to_tomorrow() {
        let slot = next_posting_slot(&times(&["12:00", "08:30"]), at(20, 0));
        assert_eq!(
            slot,
            Some(Utc.with_ymd_and_hms(2026, 3, 11, 8, 30, 0).unwrap())
        );
    }

    #[test]
    fn test_no_valid_slot() {
        assert_eq!(next_posting_slot(&[], at(9, 0)), None);
        assert_eq!(next_posting_slot(&times(&["noon", "25:99"]), at(9, 0)), None);
    }

    #[test]
    fn test_due_follows_frequency() {
        let mut settings = PublishingSettings::for_tenant("acme");
        assert!(!is_due(&settings, at(9, 0)));

        settings.autopilot_enabled = true;
        assert!(is_due(&settings, at(9, 0)));

        settings.autopilot_frequency = AutopilotFrequency::Daily;
        settings.last_run_at = Some(at(9, 0) - Duration::hours(23));
        assert!(!is_due(&settings, at(9, 0)));

        settings.last_run_at = Some(at(9, 0) - Duration::hours(24));
        assert!(is_due(&settings, at(9, 0)));

        settings.autopilot_frequency = AutopilotFrequency::TwiceWeekly;
        assert!(!is_due(&settings, at(9, 0)));

        settings.emergency_stop = true;
        settings.last_run_at = None;
        assert!(!is_due(&settings, at(9, 0)));
    }
}
