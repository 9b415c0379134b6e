//! Wall-clock-aligned acquisition: one read-decode-store cycle per interval.
//!
//! The loop ticks twice a second and fires when the clock crosses an aligned
//! minute (`minute % interval == 0` at second zero). The fired minute is
//! remembered so overlapping ticks inside the same second cannot double-fire.
//! A failed cycle is a gap in the history, not a fatal condition.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Timelike};
use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::clock::Clock;
use crate::config::DeviceConfig;
use crate::db::{Database, Reading};
use crate::link::SensorLink;
use crate::{log_error, log_info, log_warn};

const ENABLE_LOGS: bool = true;

const TICK_INTERVAL_MS: u64 = 500;
// Port open + settle + read stays well under this; a stuck cycle is logged
// and abandoned rather than stalling the next aligned minute.
const CYCLE_TIMEOUT_SECS: u64 = 30;

/// Decides when a tick crosses an aligned sample boundary.
#[derive(Debug)]
pub struct AcquisitionSchedule {
    interval_minutes: u32,
    last_fired: Option<DateTime<Local>>,
}

impl AcquisitionSchedule {
    pub fn new(interval_minutes: u32) -> Self {
        Self {
            interval_minutes,
            last_fired: None,
        }
    }

    /// Returns the aligned sample time if this tick should fire, at most
    /// once per qualifying wall-clock minute.
    pub fn due_at(&mut self, now: DateTime<Local>) -> Option<DateTime<Local>> {
        if now.minute() % self.interval_minutes != 0 || now.second() != 0 {
            return None;
        }
        let minute = now.with_second(0)?.with_nanosecond(0)?;
        if self.last_fired == Some(minute) {
            return None;
        }
        self.last_fired = Some(minute);
        Some(minute)
    }
}

pub async fn acquisition_loop(
    config: DeviceConfig,
    db: Database,
    clock: Arc<dyn Clock>,
    cancel_token: CancellationToken,
) {
    let link = Arc::new(SensorLink::new(&config.port, config.model));
    let mut schedule = AcquisitionSchedule::new(config.interval_minutes);

    let mut ticker = tokio::time::interval(Duration::from_millis(TICK_INTERVAL_MS));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    log_info!(
        "acquisition loop started: device {}, port {}, every {} min",
        config.device,
        config.port,
        config.interval_minutes
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let Some(sample_time) = schedule.due_at(clock.now()) else {
                    continue;
                };

                let cycle = run_cycle(&config, &db, &link, clock.as_ref(), sample_time);
                match tokio::time::timeout(Duration::from_secs(CYCLE_TIMEOUT_SECS), cycle).await {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => log_error!("acquisition cycle failed: {err:#}"),
                    Err(_) => log_warn!("acquisition cycle timeout (> {CYCLE_TIMEOUT_SECS}s)"),
                }
            }
            _ = cancel_token.cancelled() => {
                log_info!("acquisition loop shutting down");
                break;
            }
        }
    }
}

async fn run_cycle(
    config: &DeviceConfig,
    db: &Database,
    link: &Arc<SensorLink>,
    clock: &dyn Clock,
    sample_time: DateTime<Local>,
) -> Result<()> {
    log_info!("reading sensor for sample at {}", sample_time.format("%Y-%m-%d %H:%M"));

    let link = Arc::clone(link);
    let raw = tokio::task::spawn_blocking(move || link.read())
        .await
        .context("sensor read task panicked")??;

    log_info!("raw response: {}", hex(&raw));

    let measurements = config.model.decode_response(&raw)?;
    let reading = Reading::from_measurements(
        config,
        measurements,
        sample_time.timestamp(),
        clock.now().timestamp(),
    );

    db.insert_reading(&reading)
        .await
        .context("failed to persist reading")?;

    log_info!(
        "reading stored: temp={:.2} hum={:.2} press={:.1} wspeed={:.2} wdir={:.1} rain={:.1} srad={:.0}",
        measurements.temperature,
        measurements.humidity,
        measurements.pressure,
        measurements.wind_speed,
        measurements.wind_direction,
        measurements.rain,
        measurements.solar_radiation
    );

    Ok(())
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32, second: u32) -> DateTime<Local> {
        Local
            .with_ymd_and_hms(2026, 8, 25, hour, minute, second)
            .unwrap()
    }

    #[test]
    fn fires_only_on_aligned_minutes() {
        let mut schedule = AcquisitionSchedule::new(5);

        assert!(schedule.due_at(at(0, 4, 59)).is_none());
        assert_eq!(schedule.due_at(at(0, 5, 0)), Some(at(0, 5, 0)));
        assert!(schedule.due_at(at(0, 6, 0)).is_none());
        assert_eq!(schedule.due_at(at(0, 10, 0)), Some(at(0, 10, 0)));
    }

    #[test]
    fn sub_second_ticks_fire_at_most_once_per_minute() {
        let mut schedule = AcquisitionSchedule::new(5);
        let half_second = chrono::Duration::milliseconds(500);

        // Tick every 0.5 s across the boundary: :04:59.0 .. :05:01.0.
        let mut now = at(0, 4, 59);
        let mut fires = 0;
        for _ in 0..5 {
            if schedule.due_at(now).is_some() {
                fires += 1;
            }
            now = now + half_second;
        }
        assert_eq!(fires, 1);
    }

    #[test]
    fn hour_boundary_is_an_aligned_minute() {
        let mut schedule = AcquisitionSchedule::new(5);
        assert_eq!(schedule.due_at(at(1, 0, 0)), Some(at(1, 0, 0)));
    }

    #[test]
    fn one_minute_interval_fires_every_minute() {
        let mut schedule = AcquisitionSchedule::new(1);
        for minute in 0..4 {
            assert!(schedule.due_at(at(2, minute, 0)).is_some());
        }
    }
}
