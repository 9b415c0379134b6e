use anyhow::{Context, Result};
use rusqlite::{params, OptionalExtension, Row};

use crate::db::{models::Reading, Database};

const READING_COLUMNS: &str = "id, temp, hum, press, wspeed, wdir, rain, srad, \
     device, timestamp, created_at, latitude, longitude, altitude, location";

fn map_reading(row: &Row<'_>) -> rusqlite::Result<Reading> {
    Ok(Reading {
        id: row.get(0)?,
        temperature: row.get(1)?,
        humidity: row.get(2)?,
        pressure: row.get(3)?,
        wind_speed: row.get(4)?,
        wind_direction: row.get(5)?,
        rain: row.get(6)?,
        solar_radiation: row.get(7)?,
        device: row.get(8)?,
        timestamp: row.get(9)?,
        created_at: row.get(10)?,
        latitude: row.get(11)?,
        longitude: row.get(12)?,
        altitude: row.get(13)?,
        location: row.get(14)?,
    })
}

impl Database {
    /// Appends one reading. A single atomic INSERT; on failure the error
    /// propagates and the reading is dropped by the caller.
    pub async fn insert_reading(&self, reading: &Reading) -> Result<()> {
        let record = reading.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO sensor_datas (
                    temp, hum, press, wspeed, wdir, rain, srad,
                    device, timestamp, created_at,
                    latitude, longitude, altitude, location
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                params![
                    record.temperature,
                    record.humidity,
                    record.pressure,
                    record.wind_speed,
                    record.wind_direction,
                    record.rain,
                    record.solar_radiation,
                    record.device,
                    record.timestamp,
                    record.created_at,
                    record.latitude,
                    record.longitude,
                    record.altitude,
                    record.location,
                ],
            )
            .context("failed to insert reading")?;
            Ok(())
        })
        .await
    }

    /// Readings with `from <= timestamp <= to`, oldest first. Read path for
    /// the reporting layer; the acquisition side never calls this.
    pub async fn readings_in_range(&self, from: i64, to: i64) -> Result<Vec<Reading>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {READING_COLUMNS} FROM sensor_datas
                 WHERE timestamp >= ?1 AND timestamp <= ?2
                 ORDER BY timestamp ASC"
            ))?;
            let rows = stmt.query_map(params![from, to], map_reading)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .context("failed to read rows in range")
        })
        .await
    }

    /// Most recently sampled reading, if any.
    pub async fn latest_reading(&self) -> Result<Option<Reading>> {
        self.execute(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {READING_COLUMNS} FROM sensor_datas
                     ORDER BY timestamp DESC LIMIT 1"
                ),
                [],
                map_reading,
            )
            .optional()
            .context("failed to read latest reading")
        })
        .await
    }

    /// Deletes readings persisted strictly before `cutoff` (epoch seconds).
    /// Returns the number of rows removed.
    pub async fn purge_readings_before(&self, cutoff: i64) -> Result<usize> {
        self.execute(move |conn| {
            conn.execute(
                "DELETE FROM sensor_datas WHERE created_at < ?1",
                params![cutoff],
            )
            .context("failed to purge expired readings")
        })
        .await
    }

    /// Flushes the WAL into the main storage file so a plain file copy
    /// captures every committed row.
    pub async fn checkpoint(&self) -> Result<()> {
        self.execute(|conn| {
            conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))
                .context("failed to checkpoint WAL")?;
            Ok(())
        })
        .await
    }

    /// Compaction pass run by the backup cycle after pruning.
    pub async fn vacuum(&self) -> Result<()> {
        self.execute(|conn| {
            conn.execute_batch("VACUUM")
                .context("failed to vacuum storage")?;
            Ok(())
        })
        .await
    }
}
