//! Scheduled backups
//!
//! Schedules live in their own storage collection next to the backups.
//! A sweep takes every enabled schedule whose `next_run` has passed, backs
//! up the current configuration, and moves `next_run` forward past `now`.
//! Each schedule is run independently; a failure is recorded on its
//! [`ScheduleRun`] and the sweep carries on.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sysconf_storage::{get_json, list_json, put_json};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{BackupManager, BackupOptions, BackupType};
use crate::error::{ConfigError, Result};
use crate::value::ConfigValue;

pub(crate) const SCHEDULE_COLLECTION: &str = "backup_schedules";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "every", content = "minutes")]
pub enum BackupFrequency {
    Hourly,
    Daily,
    Weekly,
    EveryMinutes(u32),
}

impl BackupFrequency {
    pub fn period(&self) -> Duration {
        match self {
            BackupFrequency::Hourly => Duration::hours(1),
            BackupFrequency::Daily => Duration::days(1),
            BackupFrequency::Weekly => Duration::weeks(1),
            BackupFrequency::EveryMinutes(m) => Duration::minutes(i64::from(*m)),
        }
    }

    fn validate(&self) -> Result<()> {
        match self {
            BackupFrequency::EveryMinutes(0) => Err(ConfigError::invalid_input(
                "schedule interval must be at least one minute",
            )),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for BackupFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackupFrequency::Hourly => write!(f, "hourly"),
            BackupFrequency::Daily => write!(f, "daily"),
            BackupFrequency::Weekly => write!(f, "weekly"),
            BackupFrequency::EveryMinutes(m) => write!(f, "every {}m", m),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupSchedule {
    pub id: String,
    pub name: String,
    pub frequency: BackupFrequency,
    pub enabled: bool,
    pub next_run: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
    pub created_by: String,
}

impl BackupSchedule {
    /// A new enabled schedule whose first run is one period after `start`
    pub fn new(
        name: impl Into<String>,
        frequency: BackupFrequency,
        created_by: impl Into<String>,
        start: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            frequency,
            enabled: true,
            next_run: start + frequency.period(),
            last_run: None,
            tags: Vec::new(),
            created_by: created_by.into(),
        }
    }

    pub fn with_tags(mut self, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.enabled && self.next_run <= now
    }

    /// First slot on the schedule's grid strictly after `now`
    fn advance_past(&mut self, now: DateTime<Utc>) {
        let period = self.frequency.period();
        if period <= Duration::zero() {
            return;
        }
        let behind = (now - self.next_run).num_seconds().max(0);
        let steps = behind / period.num_seconds().max(1) + 1;
        let advanced = i32::try_from(steps)
            .ok()
            .and_then(|steps| self.next_run.checked_add_signed(period * steps));
        self.next_run = match advanced {
            Some(next) if next > now => next,
            _ => now + period,
        };
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum ScheduleOutcome {
    Success { backup_id: String },
    Failure { message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleRun {
    pub schedule_id: String,
    pub schedule_name: String,
    pub ran_at: DateTime<Utc>,
    pub outcome: ScheduleOutcome,
}

impl ScheduleRun {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ScheduleOutcome::Success { .. })
    }
}

/// Supplies the document a scheduled backup should capture
#[async_trait]
pub trait ConfigurationSource: Send + Sync {
    async fn current_configuration(&self) -> Result<ConfigValue>;
}

#[async_trait]
impl ConfigurationSource for ConfigValue {
    async fn current_configuration(&self) -> Result<ConfigValue> {
        Ok(self.clone())
    }
}

impl BackupManager {
    pub async fn add_schedule(&self, schedule: BackupSchedule) -> Result<BackupSchedule> {
        schedule.frequency.validate()?;
        put_json(self.storage.as_ref(), SCHEDULE_COLLECTION, &schedule.id, &schedule).await?;
        info!(
            id = %schedule.id,
            name = %schedule.name,
            frequency = %schedule.frequency,
            "Backup schedule added"
        );
        Ok(schedule)
    }

    pub async fn get_schedule(&self, id: &str) -> Result<Option<BackupSchedule>> {
        Ok(get_json(self.storage.as_ref(), SCHEDULE_COLLECTION, id).await?)
    }

    /// Schedules ordered by next run
    pub async fn list_schedules(&self) -> Result<Vec<BackupSchedule>> {
        let mut schedules: Vec<BackupSchedule> =
            list_json(self.storage.as_ref(), SCHEDULE_COLLECTION).await?;
        schedules.sort_by(|a, b| a.next_run.cmp(&b.next_run).then_with(|| a.id.cmp(&b.id)));
        Ok(schedules)
    }

    pub async fn remove_schedule(&self, id: &str) -> Result<bool> {
        let removed = self.storage.delete(SCHEDULE_COLLECTION, id).await?;
        if removed {
            info!(id = %id, "Backup schedule removed");
        }
        Ok(removed)
    }

    pub async fn set_schedule_enabled(&self, id: &str, enabled: bool) -> Result<BackupSchedule> {
        let mut schedule = self
            .get_schedule(id)
            .await?
            .ok_or_else(|| ConfigError::invalid_input(format!("unknown backup schedule '{}'", id)))?;
        schedule.enabled = enabled;
        put_json(self.storage.as_ref(), SCHEDULE_COLLECTION, id, &schedule).await?;
        Ok(schedule)
    }

    /// Run every due schedule; one [`ScheduleRun`] per schedule attempted
    pub async fn run_due_schedules(
        &self,
        now: DateTime<Utc>,
        source: &dyn ConfigurationSource,
    ) -> Vec<ScheduleRun> {
        let schedules = match self.list_schedules().await {
            Ok(schedules) => schedules,
            Err(e) => {
                error!("Failed to load backup schedules: {}", e);
                return Vec::new();
            }
        };

        let mut runs = Vec::new();
        for mut schedule in schedules.into_iter().filter(|s| s.is_due(now)) {
            let outcome = match self.run_schedule(&schedule, source).await {
                Ok(backup_id) => ScheduleOutcome::Success { backup_id },
                Err(e) => {
                    warn!(schedule = %schedule.name, error = %e, "Scheduled backup failed");
                    ScheduleOutcome::Failure {
                        message: e.to_string(),
                    }
                }
            };

            schedule.last_run = Some(now);
            schedule.advance_past(now);
            if let Err(e) =
                put_json(self.storage.as_ref(), SCHEDULE_COLLECTION, &schedule.id, &schedule).await
            {
                error!(schedule = %schedule.name, "Failed to persist schedule state: {}", e);
            }

            runs.push(ScheduleRun {
                schedule_id: schedule.id.clone(),
                schedule_name: schedule.name.clone(),
                ran_at: now,
                outcome,
            });
        }
        runs
    }

    async fn run_schedule(
        &self,
        schedule: &BackupSchedule,
        source: &dyn ConfigurationSource,
    ) -> Result<String> {
        let config = source.current_configuration().await?;
        let options = BackupOptions::new(BackupType::Scheduled, &schedule.created_by)
            .with_tags(schedule.tags.iter().cloned())
            .with_description(format!("Scheduled backup '{}'", schedule.name));
        Ok(self.create_backup(&config, &options).await?.id)
    }
}

/// Sweep due schedules every `period` until the handle is aborted
pub fn spawn_schedule_sweep(
    manager: Arc<BackupManager>,
    source: Arc<dyn ConfigurationSource>,
    period: std::time::Duration,
) -> JoinHandle<()> {
    let mut interval = interval(period);

    tokio::spawn(async move {
        loop {
            interval.tick().await;

            let runs = manager.run_due_schedules(Utc::now(), source.as_ref()).await;
            let failed = runs.iter().filter(|r| !r.is_success()).count();
            if !runs.is_empty() {
                info!("Ran {} scheduled backups ({} failed)", runs.len(), failed);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::{BackupFilter, BackupPolicy};
    use crate::model::default_document;
    use sysconf_storage::MemoryStorage;

    struct FailingSource;

    #[async_trait]
    impl ConfigurationSource for FailingSource {
        async fn current_configuration(&self) -> Result<ConfigValue> {
            Err(ConfigError::invalid_input("source offline"))
        }
    }

    fn manager() -> BackupManager {
        BackupManager::new(Arc::new(MemoryStorage::new()), BackupPolicy::default())
    }

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(&format!("2026-03-01T{:02}:{:02}:00Z", hour, minute))
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_advance_skips_missed_slots() {
        let mut schedule = BackupSchedule::new("hourly", BackupFrequency::Hourly, "ops", at(0, 0));
        assert_eq!(schedule.next_run, at(1, 0));

        schedule.advance_past(at(4, 30));
        assert_eq!(schedule.next_run, at(5, 0));

        schedule.advance_past(at(5, 0));
        assert_eq!(schedule.next_run, at(6, 0));
    }

    #[test]
    fn test_advance_from_distant_past_lands_after_now() {
        let mut schedule = BackupSchedule::new("minutely", BackupFrequency::EveryMinutes(1), "ops", at(0, 0));
        schedule.next_run = DateTime::<Utc>::MIN_UTC;
        schedule.advance_past(at(4, 30));
        assert_eq!(schedule.next_run, at(4, 31));
    }

    #[tokio::test]
    async fn test_zero_minute_interval_rejected() {
        let backups = manager();
        let schedule = BackupSchedule::new("bad", BackupFrequency::EveryMinutes(0), "ops", at(0, 0));
        assert!(backups.add_schedule(schedule).await.is_err());
    }

    #[tokio::test]
    async fn test_due_schedules_run_and_advance() {
        let backups = manager();
        let due = backups
            .add_schedule(
                BackupSchedule::new("quarter", BackupFrequency::EveryMinutes(15), "ops", at(0, 0))
                    .with_tags(["auto"]),
            )
            .await
            .unwrap();
        backups
            .add_schedule(BackupSchedule::new("daily", BackupFrequency::Daily, "ops", at(0, 0)))
            .await
            .unwrap();

        let doc = default_document();
        let runs = backups.run_due_schedules(at(0, 20), &doc).await;
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].schedule_id, due.id);
        assert!(runs[0].is_success());

        let stored = backups.get_schedule(&due.id).await.unwrap().unwrap();
        assert_eq!(stored.last_run, Some(at(0, 20)));
        assert_eq!(stored.next_run, at(0, 30));

        let listed = backups
            .list_backups(&BackupFilter::new().with_type(BackupType::Scheduled))
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].tags, vec!["auto".to_string()]);

        // nothing due until the next slot
        assert!(backups.run_due_schedules(at(0, 25), &doc).await.is_empty());
    }

    #[tokio::test]
    async fn test_failure_is_recorded_per_schedule() {
        let backups = manager();
        backups
            .add_schedule(BackupSchedule::new("hourly", BackupFrequency::Hourly, "ops", at(0, 0)))
            .await
            .unwrap();

        let runs = backups.run_due_schedules(at(2, 0), &FailingSource).await;
        assert_eq!(runs.len(), 1);
        match &runs[0].outcome {
            ScheduleOutcome::Failure { message } => assert!(message.contains("source offline")),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(backups.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_disabled_schedule_is_skipped() {
        let backups = manager();
        let schedule = backups
            .add_schedule(BackupSchedule::new("hourly", BackupFrequency::Hourly, "ops", at(0, 0)))
            .await
            .unwrap();
        backups.set_schedule_enabled(&schedule.id, false).await.unwrap();

        assert!(backups.run_due_schedules(at(3, 0), &default_document()).await.is_empty());
        assert!(backups.remove_schedule(&schedule.id).await.unwrap());
        assert!(backups.list_schedules().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sweep_task_runs_schedules() {
        let backups = Arc::new(manager());
        backups
            .add_schedule(BackupSchedule::new(
                "past",
                BackupFrequency::Hourly,
                "ops",
                Utc::now() - Duration::hours(2),
            ))
            .await
            .unwrap();

        let source: Arc<dyn ConfigurationSource> = Arc::new(default_document());
        let handle = spawn_schedule_sweep(backups.clone(), source, std::time::Duration::from_secs(60));
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        handle.abort();

        assert_eq!(backups.count().await.unwrap(), 1);
    }
}
