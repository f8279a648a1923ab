//! Wires the on-disk state to the scheduling service and a calendar provider.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde_json::json;
use slotwise_core::{Clock, Error, Priority, SyncPolicy, SystemClock, Task};
use slotwise_sync::{
    AutoSyncGate, CalendarClient, CalendarEventMapper, LocalCalendar, MemoryStore, QuotaGuard,
    RetryCoordinator, RetryPolicy, SchedulingService, StaticTier, SyncEngine,
};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use crate::config::{CalendarProvider, Config};
use crate::state;

pub struct App {
    pub home: PathBuf,
    pub config: Config,
    pub tz: Tz,
    pub store: Arc<MemoryStore>,
    pub service: SchedulingService,
    local: Arc<LocalCalendar>,
    sync_state: BTreeMap<String, DateTime<Utc>>,
}

impl App {
    pub fn open(home: PathBuf, config: Config) -> Result<Self> {
        Self::open_with_clock(home, config, Arc::new(SystemClock))
    }

    pub fn open_with_clock(home: PathBuf, config: Config, clock: Arc<dyn Clock>) -> Result<Self> {
        let tz = config.timezone()?;
        let store = Arc::new(MemoryStore::from_document(state::load_document(&home)?));
        let local = Arc::new(LocalCalendar::from_events(state::load_local_events(&home)?));
        let sync_state = state::load_sync_state(&home)?;

        let mut gate = AutoSyncGate::default();
        for (user, at) in &sync_state {
            gate = gate.with_last_run(user, *at);
        }

        let quota = QuotaGuard::new(store.clone(), Arc::new(StaticTier(config.profile.tier)), clock.clone());
        let service = SchedulingService::new(store.clone(), quota, clock, tz).with_gate(gate);

        debug!(home = %home.display(), tz = %tz, "state loaded");
        Ok(Self {
            home,
            config,
            tz,
            store,
            service,
            local,
            sync_state,
        })
    }

    pub fn user_id(&self) -> &str {
        &self.config.profile.user_id
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.store.document().tasks.get(self.user_id()).cloned().unwrap_or_default()
    }

    pub fn find_task(&self, id: &str) -> Result<Task> {
        self.tasks()
            .into_iter()
            .find(|t| t.id == id)
            .with_context(|| format!("no task with id {id}"))
    }

    /// Drop tasks marked for removal once their calendar event is gone.
    pub fn purge_removed(&self) -> usize {
        let gone: Vec<String> = self
            .tasks()
            .into_iter()
            .filter(|t| t.priority == Priority::Delete && t.external_event_id.is_none())
            .map(|t| t.id)
            .collect();
        for id in &gone {
            self.store.remove_task(self.user_id(), id);
        }
        gone.len()
    }

    pub fn local_calendar(&self) -> &Arc<LocalCalendar> {
        &self.local
    }

    /// Build a sync engine against the configured provider.
    pub async fn engine(&self, tz: Tz) -> Result<SyncEngine> {
        let client = self.calendar_client().await?;
        let mapper = CalendarEventMapper::new(
            client,
            self.store.clone(),
            RetryCoordinator::new(RetryPolicy::default()),
            SyncPolicy::new(tz),
        );
        Ok(SyncEngine::new(mapper))
    }

    async fn calendar_client(&self) -> Result<Arc<dyn CalendarClient>> {
        match self.config.calendar.provider {
            CalendarProvider::Local => {
                let client: Arc<dyn CalendarClient> = self.local.clone();
                Ok(client)
            }
            CalendarProvider::Google => google_client(self).await,
        }
    }

    /// Write tasks, quota, snapshots, local events and the auto-sync marker.
    pub fn persist(&mut self) -> Result<()> {
        state::save_document(&self.home, &self.store.document()).context("persist store")?;
        state::save_local_events(&self.home, &self.local.events()).context("persist local calendar")?;

        let user = self.config.profile.user_id.clone();
        if let Some(at) = self.service.gate().last_run(&user) {
            self.sync_state.insert(user, at);
        }
        state::save_sync_state(&self.home, &self.sync_state)?;
        Ok(())
    }
}

/// Machine-readable error body for `slotwise request`.
pub fn error_json(err: &Error) -> serde_json::Value {
    let (summary, report) = match err {
        Error::Persistence { summary, report, .. } => (
            serde_json::to_value(summary).unwrap_or_default(),
            serde_json::to_value(report).unwrap_or_default(),
        ),
        _ => (serde_json::Value::Null, serde_json::Value::Null),
    };
    json!({
        "error": {
            "code": err.code(),
            "message": err.to_string(),
            "summary": summary,
            "report": report,
        }
    })
}

#[cfg(feature = "gcal")]
async fn google_client(app: &App) -> Result<Arc<dyn CalendarClient>> {
    let cal = crate::google_calendar::GoogleCalendar::connect(&app.home, &app.config.calendar.calendar_id).await?;
    let client: Arc<dyn CalendarClient> = Arc::new(cal);
    Ok(client)
}

#[cfg(not(feature = "gcal"))]
async fn google_client(_app: &App) -> Result<Arc<dyn CalendarClient>> {
    anyhow::bail!("provider \"google\" needs a build with `--features gcal`")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use slotwise_core::{FixedClock, OperationType, ScheduleRequest, SyncRequest, TaskKind};
    use slotwise_sync::SyncMode;

    // Monday 2026-03-02 10:00 in Chicago.
    fn clock() -> Arc<FixedClock> {
        Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2026, 3, 2, 16, 0, 0).unwrap()))
    }

    fn open(home: &std::path::Path, clock: Arc<FixedClock>) -> App {
        App::open_with_clock(home.to_path_buf(), Config::default(), clock).unwrap()
    }

    #[tokio::test]
    async fn schedule_and_sync_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let clock = clock();

        let mut app = open(dir.path(), clock.clone());
        app.store.upsert_task(
            "me",
            Task::new("standup", "Team sync")
                .with_kind(TaskKind::Event)
                .with_priority(Priority::Do),
        );
        let summary = app.service.schedule(&ScheduleRequest::new("me")).await.unwrap();
        assert_eq!(summary.scheduled_count, 1);

        let engine = app.engine(app.tz).await.unwrap();
        let report = app
            .service
            .sync(&SyncRequest::new("me"), &engine, SyncMode::Manual)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.created, vec!["standup".to_string()]);
        app.persist().unwrap();

        let app = open(dir.path(), clock.clone());
        let task = app.find_task("standup").unwrap();
        assert_eq!(task.start_date, Some(Utc.with_ymd_and_hms(2026, 3, 2, 16, 0, 0).unwrap()));
        let event_id = task.external_event_id.clone().unwrap();
        assert!(app.local_calendar().get(&event_id).is_some());

        let doc = app.store.document();
        assert_eq!(doc.quota["me"].used(OperationType::Scheduling), 1);
        assert!(doc.snapshots.values().next().is_some());

        let engine = app.engine(app.tz).await.unwrap();
        let auto = app
            .service
            .sync(&SyncRequest::new("me"), &engine, SyncMode::Auto)
            .await
            .unwrap();
        assert!(auto.is_none(), "cooldown restored from disk");
    }

    #[tokio::test]
    async fn removed_tasks_are_purged_after_their_event_is_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = open(dir.path(), clock());
        let start = Utc.with_ymd_and_hms(2026, 3, 3, 15, 0, 0).unwrap();
        app.store.upsert_task(
            "me",
            Task::new("gone", "Cancelled meeting")
                .with_kind(TaskKind::Event)
                .with_slot(start, start + chrono::Duration::hours(1)),
        );

        let engine = app.engine(app.tz).await.unwrap();
        app.service
            .sync(&SyncRequest::new("me"), &engine, SyncMode::Manual)
            .await
            .unwrap();
        assert_eq!(app.local_calendar().events().len(), 1);

        let mut task = app.find_task("gone").unwrap();
        task.priority = Priority::Delete;
        app.store.upsert_task("me", task);
        let report = app
            .service
            .sync(&SyncRequest::new("me"), &engine, SyncMode::Manual)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.deleted, vec!["gone".to_string()]);

        assert_eq!(app.purge_removed(), 1);
        assert!(app.find_task("gone").is_err());
        assert!(app.local_calendar().events().is_empty());
        app.persist().unwrap();
    }

    #[test]
    fn persistence_error_body_carries_partial_results() {
        let err = Error::Persistence {
            message: "disk full".into(),
            summary: Some(Box::default()),
            report: None,
        };
        let body = error_json(&err);
        assert_eq!(body["error"]["code"], "PERSISTENCE_ERROR");
        assert_eq!(body["error"]["summary"]["scheduledCount"], 0);
        assert!(body["error"]["report"].is_null());

        let err = Error::Persistence {
            message: "disk full".into(),
            summary: None,
            report: Some(Box::new(slotwise_core::SyncReport {
                created: vec!["standup".into()],
                ..Default::default()
            })),
        };
        let body = error_json(&err);
        assert_eq!(body["error"]["report"]["created"][0], "standup");
        assert!(body["error"]["summary"].is_null());

        let body = error_json(&Error::validation("userId is required"));
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        assert!(body["error"]["summary"].is_null());
    }
}
