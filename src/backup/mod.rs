//! Weekly backup and retention pruning, gated to a nightly window.
//!
//! The orchestrator wakes hourly. When a backup is due and the clock is
//! inside the maintenance window it pauses the services that write the
//! storage file, snapshots the file to a dated path, prunes expired backups
//! and readings, compacts storage, and resumes the services. Resume runs
//! unconditionally: leaving dependent services stopped is worse than any
//! failure earlier in the cycle.

mod state;

pub use state::RetentionState;

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDate, Timelike};
use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::clock::Clock;
use crate::config::{DeviceConfig, RetentionConfig};
use crate::db::Database;
use crate::services::ServiceController;
use crate::{log_error, log_info, log_warn};

const ENABLE_LOGS: bool = true;

const CHECK_INTERVAL_SECS: u64 = 3600;
const BACKUP_PREFIX: &str = "wxstation_";
const BACKUP_SUFFIX: &str = ".sqlite";

pub struct BackupOrchestrator {
    db: Database,
    state: RetentionState,
    backup_dir: PathBuf,
    service_names: Vec<String>,
    retention: RetentionConfig,
    controller: Arc<dyn ServiceController>,
    clock: Arc<dyn Clock>,
}

impl BackupOrchestrator {
    pub fn new(
        config: &DeviceConfig,
        db: Database,
        controller: Arc<dyn ServiceController>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            db,
            state: RetentionState::load(config.state_path.clone()),
            backup_dir: config.backup_dir.clone(),
            service_names: config.services.clone(),
            retention: config.retention.clone(),
            controller,
            clock,
        }
    }

    fn backup_due(&self, today: NaiveDate) -> bool {
        match self.state.last_backup() {
            Some(last) => (today - last).num_days() >= self.retention.backup_every_days,
            None => true,
        }
    }

    fn in_window(&self, hour: u32) -> bool {
        (self.retention.window_start_hour..self.retention.window_end_hour).contains(&hour)
    }

    /// One hourly check. Runs the backup cycle only when it is both due and
    /// inside the maintenance window.
    pub async fn tick(&mut self) {
        let now = self.clock.now();
        if !self.backup_due(now.date_naive()) {
            log_info!("backup not due yet");
            return;
        }
        if !self.in_window(now.hour()) {
            log_info!(
                "backup due, waiting for maintenance window [{:02}:00, {:02}:00)",
                self.retention.window_start_hour,
                self.retention.window_end_hour
            );
            return;
        }
        self.run_cycle(now).await;
    }

    async fn run_cycle(&mut self, now: DateTime<Local>) {
        let today = now.date_naive();
        log_info!("maintenance window open and backup due, starting cycle");

        self.pause_services();

        if let Err(err) = self.db.checkpoint().await {
            log_warn!("WAL checkpoint before copy failed: {err:#}");
        }

        match self.copy_snapshot(today) {
            Ok(true) => {
                if let Err(err) = self.state.record_backup(today) {
                    // Unchanged state retries the copy next window; the
                    // same-day guard makes that retry a no-op copy.
                    log_error!("backup written but state not persisted: {err:#}");
                }
            }
            Ok(false) => {}
            Err(err) => log_error!("backup copy failed: {err:#}"),
        }

        if let Err(err) = self.cleanup_snapshots(today) {
            log_error!("backup cleanup failed: {err:#}");
        }
        if let Err(err) = self.purge_expired(now).await {
            log_error!("retention purge failed: {err:#}");
        }

        // Every failure path above is contained, so resume always runs.
        self.resume_services();
    }

    fn pause_services(&self) {
        for (service, result) in self.controller.pause(&self.service_names) {
            match result {
                Ok(()) => log_info!("paused service {service}"),
                Err(err) => log_error!("failed to pause service {service}: {err}"),
            }
        }
    }

    fn resume_services(&self) {
        for (service, result) in self.controller.resume(&self.service_names) {
            match result {
                Ok(()) => log_info!("resumed service {service}"),
                Err(err) => log_error!("failed to resume service {service}: {err}"),
            }
        }
    }

    fn snapshot_path(&self, date: NaiveDate) -> PathBuf {
        self.backup_dir
            .join(format!("{BACKUP_PREFIX}{date}{BACKUP_SUFFIX}"))
    }

    /// Copies the live storage file to today's dated path. Returns `true`
    /// only when a fresh copy was written; an existing same-day snapshot is
    /// left untouched.
    fn copy_snapshot(&self, today: NaiveDate) -> Result<bool> {
        fs::create_dir_all(&self.backup_dir).with_context(|| {
            format!("failed to create backup directory {}", self.backup_dir.display())
        })?;

        let target = self.snapshot_path(today);
        if target.exists() {
            log_info!("backup for {today} already exists, skipping copy");
            return Ok(false);
        }

        fs::copy(self.db.path(), &target)
            .with_context(|| format!("failed to copy storage to {}", target.display()))?;
        log_info!("backup written to {}", target.display());
        Ok(true)
    }

    /// Deletes snapshots whose embedded date is strictly older than the keep
    /// horizon. Files with an unparsable date component are left in place.
    fn cleanup_snapshots(&self, today: NaiveDate) -> Result<()> {
        let cutoff = today - chrono::Duration::days(self.retention.backup_keep_days);

        let entries = match fs::read_dir(&self.backup_dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("failed to list backup directory {}", self.backup_dir.display())
                })
            }
        };

        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some(stem) = name
                .strip_prefix(BACKUP_PREFIX)
                .and_then(|s| s.strip_suffix(BACKUP_SUFFIX))
            else {
                continue;
            };

            match NaiveDate::parse_from_str(stem, "%Y-%m-%d") {
                Ok(date) if date < cutoff => match fs::remove_file(entry.path()) {
                    Ok(()) => log_info!("expired backup removed: {name}"),
                    Err(err) => log_warn!("failed to remove expired backup {name}: {err}"),
                },
                Ok(_) => {}
                Err(err) => log_warn!("skipping backup with unrecognized name {name}: {err}"),
            }
        }

        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Local>) -> Result<()> {
        let cutoff = (now - chrono::Duration::days(self.retention.data_keep_days)).timestamp();
        let deleted = self.db.purge_readings_before(cutoff).await?;
        log_info!(
            "purged {deleted} readings older than {} days",
            self.retention.data_keep_days
        );

        self.db.vacuum().await?;
        log_info!("storage compacted");
        Ok(())
    }
}

pub async fn backup_loop(mut orchestrator: BackupOrchestrator, cancel_token: CancellationToken) {
    let mut ticker = tokio::time::interval(Duration::from_secs(CHECK_INTERVAL_SECS));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    log_info!("backup loop started, checking hourly");

    loop {
        tokio::select! {
            _ = ticker.tick() => orchestrator.tick().await,
            _ = cancel_token.cancelled() => {
                log_info!("backup loop shutting down");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Reading;
    use crate::services::ServiceResult;
    use chrono::TimeZone;
    use std::path::Path;
    use std::sync::Mutex;

    struct FixedClock(DateTime<Local>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Local> {
            self.0
        }
    }

    #[derive(Default)]
    struct RecordingController {
        fail_pause_for: Option<String>,
        calls: Mutex<Vec<String>>,
    }

    impl ServiceController for RecordingController {
        fn pause(&self, services: &[String]) -> Vec<(String, ServiceResult)> {
            services
                .iter()
                .map(|service| {
                    self.calls.lock().unwrap().push(format!("pause:{service}"));
                    let result = if self.fail_pause_for.as_deref() == Some(service.as_str()) {
                        Err(crate::error::ServiceControlError::Spawn {
                            service: service.clone(),
                            action: "stop".into(),
                            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no systemctl"),
                        })
                    } else {
                        Ok(())
                    };
                    (service.clone(), result)
                })
                .collect()
        }

        fn resume(&self, services: &[String]) -> Vec<(String, ServiceResult)> {
            services
                .iter()
                .map(|service| {
                    self.calls.lock().unwrap().push(format!("resume:{service}"));
                    (service.clone(), Ok(()))
                })
                .collect()
        }
    }

    fn test_config(dir: &Path) -> DeviceConfig {
        DeviceConfig {
            database_path: dir.join("wxstation.sqlite"),
            backup_dir: dir.join("backup"),
            state_path: dir.join("backup_state.json"),
            ..DeviceConfig::default()
        }
    }

    fn local(y: i32, m: u32, d: u32, hour: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(y, m, d, hour, 30, 0).unwrap()
    }

    fn seed_state(config: &DeviceConfig, date: NaiveDate) {
        let mut state = RetentionState::load(config.state_path.clone());
        state.record_backup(date).unwrap();
    }

    fn orchestrator(
        config: &DeviceConfig,
        db: Database,
        controller: Arc<RecordingController>,
        now: DateTime<Local>,
    ) -> BackupOrchestrator {
        BackupOrchestrator::new(config, db, controller, Arc::new(FixedClock(now)))
    }

    fn sample_reading(created_at: i64) -> Reading {
        Reading {
            id: None,
            temperature: Some(20.0),
            humidity: Some(50.0),
            pressure: Some(1010.0),
            wind_speed: Some(0.5),
            wind_direction: Some(90.0),
            rain: Some(0.0),
            solar_radiation: Some(100.0),
            device: "aws-01".into(),
            timestamp: created_at,
            created_at,
            latitude: 0.0,
            longitude: 0.0,
            altitude: 0.0,
            location: "test".into(),
        }
    }

    #[tokio::test]
    async fn due_backup_outside_window_does_not_run() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let db = Database::new(config.database_path.clone()).unwrap();
        let now = local(2026, 8, 25, 2);
        seed_state(&config, now.date_naive() - chrono::Duration::days(3));

        let controller = Arc::new(RecordingController::default());
        let mut orch = orchestrator(&config, db, Arc::clone(&controller), now);
        orch.tick().await;

        assert!(!config.backup_dir.exists() || fs::read_dir(&config.backup_dir).unwrap().count() == 0);
        assert!(controller.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn recent_backup_in_window_does_not_run() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let db = Database::new(config.database_path.clone()).unwrap();
        let now = local(2026, 8, 25, 0);
        seed_state(&config, now.date_naive() - chrono::Duration::days(3));

        let controller = Arc::new(RecordingController::default());
        let mut orch = orchestrator(&config, db, Arc::clone(&controller), now);
        orch.tick().await;

        assert!(controller.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn overdue_backup_in_window_runs_exactly_once() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let db = Database::new(config.database_path.clone()).unwrap();
        db.insert_reading(&sample_reading(1_000)).await.unwrap();

        let now = local(2026, 8, 25, 0);
        let today = now.date_naive();
        seed_state(&config, today - chrono::Duration::days(8));

        let controller = Arc::new(RecordingController::default());
        let mut orch = orchestrator(&config, db, Arc::clone(&controller), now);
        orch.tick().await;

        let snapshot = config.backup_dir.join(format!("wxstation_{today}.sqlite"));
        assert!(snapshot.exists());
        assert_eq!(
            RetentionState::load(config.state_path.clone()).last_backup(),
            Some(today)
        );

        // Second tick in the same hour: backup is no longer due.
        let calls_after_first = controller.calls.lock().unwrap().len();
        orch.tick().await;
        assert_eq!(controller.calls.lock().unwrap().len(), calls_after_first);
    }

    #[tokio::test]
    async fn existing_same_day_snapshot_is_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let db = Database::new(config.database_path.clone()).unwrap();

        let now = local(2026, 8, 25, 0);
        let today = now.date_naive();
        seed_state(&config, today - chrono::Duration::days(8));

        fs::create_dir_all(&config.backup_dir).unwrap();
        let snapshot = config.backup_dir.join(format!("wxstation_{today}.sqlite"));
        fs::write(&snapshot, b"sentinel").unwrap();

        let controller = Arc::new(RecordingController::default());
        let mut orch = orchestrator(&config, db, Arc::clone(&controller), now);
        orch.tick().await;

        assert_eq!(fs::read(&snapshot).unwrap(), b"sentinel");
    }

    #[tokio::test]
    async fn pause_failure_still_backs_up_and_resumes_all() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let db = Database::new(config.database_path.clone()).unwrap();

        let now = local(2026, 8, 25, 0);
        let today = now.date_naive();

        let controller = Arc::new(RecordingController {
            fail_pause_for: Some("wxstation-api.service".into()),
            calls: Mutex::new(Vec::new()),
        });
        let mut orch = orchestrator(&config, db, Arc::clone(&controller), now);
        orch.tick().await;

        let snapshot = config.backup_dir.join(format!("wxstation_{today}.sqlite"));
        assert!(snapshot.exists());

        let calls = controller.calls.lock().unwrap();
        assert!(calls.contains(&"resume:wxstation.service".to_string()));
        assert!(calls.contains(&"resume:wxstation-api.service".to_string()));
    }

    #[tokio::test]
    async fn cleanup_removes_only_strictly_expired_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let db = Database::new(config.database_path.clone()).unwrap();

        let now = local(2026, 8, 25, 0);
        let today = now.date_naive();
        fs::create_dir_all(&config.backup_dir).unwrap();

        let at_horizon = config.backup_dir.join(format!(
            "wxstation_{}.sqlite",
            today - chrono::Duration::days(30)
        ));
        let expired = config.backup_dir.join(format!(
            "wxstation_{}.sqlite",
            today - chrono::Duration::days(31)
        ));
        let unparsable = config.backup_dir.join("wxstation_yesterday.sqlite");
        let unrelated = config.backup_dir.join("notes.txt");
        for path in [&at_horizon, &expired, &unparsable, &unrelated] {
            fs::write(path, b"x").unwrap();
        }

        let controller = Arc::new(RecordingController::default());
        let mut orch = orchestrator(&config, db, controller, now);
        orch.tick().await;

        assert!(at_horizon.exists(), "snapshot at the horizon must be kept");
        assert!(!expired.exists(), "snapshot past the horizon must be removed");
        assert!(unparsable.exists(), "unparsable names are skipped, not deleted");
        assert!(unrelated.exists());
    }

    #[tokio::test]
    async fn cycle_purges_readings_past_the_data_horizon() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let db = Database::new(config.database_path.clone()).unwrap();

        let now = local(2026, 8, 25, 0);
        let cutoff = (now - chrono::Duration::days(396)).timestamp();
        db.insert_reading(&sample_reading(cutoff - 1)).await.unwrap();
        db.insert_reading(&sample_reading(cutoff)).await.unwrap();
        db.insert_reading(&sample_reading(now.timestamp())).await.unwrap();

        let controller = Arc::new(RecordingController::default());
        let mut orch = orchestrator(&config, db.clone(), controller, now);
        orch.tick().await;

        let remaining = db.readings_in_range(0, i64::MAX).await.unwrap();
        let created: Vec<i64> = remaining.iter().map(|r| r.created_at).collect();
        assert_eq!(created, vec![cutoff, now.timestamp()]);
    }
}
