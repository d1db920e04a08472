//! SQLite-backed forecast run and grid slice store.
//!
//! Runs move through `ingesting -> complete | failed`, and complete runs are
//! later `superseded` by a newer run of the same source. Slices are
//! append-only. The per-source "latest complete run" pointer lives in memory
//! as an `Arc<ForecastRun>` that is swapped, never mutated, after the
//! completing transaction commits.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::geo::BoundingBox;

use super::codec::CompressedSlice;
use super::types::{ForecastRun, ForecastSource, GridSlice, RawGrid, RunStatus};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS forecast_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source TEXT NOT NULL,
    run_time TEXT NOT NULL,
    ingested_at TEXT NOT NULL,
    completed_at TEXT,
    status TEXT NOT NULL,
    resolution REAL NOT NULL,
    lat_min REAL NOT NULL,
    lat_max REAL NOT NULL,
    lon_min REAL NOT NULL,
    lon_max REAL NOT NULL,
    forecast_hours TEXT NOT NULL DEFAULT '[]',
    metadata TEXT NOT NULL DEFAULT '{}',
    UNIQUE(source, run_time)
);
CREATE TABLE IF NOT EXISTS grid_slices (
    run_id INTEGER NOT NULL REFERENCES forecast_runs(id) ON DELETE CASCADE,
    forecast_hour INTEGER NOT NULL,
    parameter TEXT NOT NULL,
    rows INTEGER NOT NULL,
    cols INTEGER NOT NULL,
    lats BLOB NOT NULL,
    lons BLOB NOT NULL,
    data BLOB NOT NULL,
    PRIMARY KEY (run_id, forecast_hour, parameter)
);
CREATE INDEX IF NOT EXISTS idx_runs_source_status ON forecast_runs(source, status);
";

const RUN_COLUMNS: &str = "id, source, run_time, ingested_at, completed_at, status, resolution, \
     lat_min, lat_max, lon_min, lon_max, forecast_hours, metadata";

/// Persistent store of forecast runs and their compressed grid slices.
#[derive(Debug)]
pub struct WeatherStore {
    connection: Mutex<Connection>,
    latest: RwLock<HashMap<ForecastSource, Arc<ForecastRun>>>,
    path: Option<PathBuf>,
}

fn timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::CorruptData {
            message: format!("invalid timestamp '{value}': {e}"),
        })
}

/// Row as read from SQLite, before string columns are parsed.
struct RunRow {
    id: i64,
    source: String,
    run_time: String,
    ingested_at: String,
    completed_at: Option<String>,
    status: String,
    resolution: f64,
    bbox: BoundingBox,
    forecast_hours: String,
    metadata: String,
}

fn row_to_run(row: &Row<'_>) -> rusqlite::Result<RunRow> {
    Ok(RunRow {
        id: row.get(0)?,
        source: row.get(1)?,
        run_time: row.get(2)?,
        ingested_at: row.get(3)?,
        completed_at: row.get(4)?,
        status: row.get(5)?,
        resolution: row.get(6)?,
        bbox: BoundingBox::new(row.get(7)?, row.get(8)?, row.get(9)?, row.get(10)?),
        forecast_hours: row.get(11)?,
        metadata: row.get(12)?,
    })
}

impl TryFrom<RunRow> for ForecastRun {
    type Error = Error;

    fn try_from(row: RunRow) -> Result<Self> {
        Ok(ForecastRun {
            id: row.id,
            source: row.source.parse()?,
            run_time: parse_timestamp(&row.run_time)?,
            ingested_at: parse_timestamp(&row.ingested_at)?,
            completed_at: row
                .completed_at
                .as_deref()
                .map(parse_timestamp)
                .transpose()?,
            status: RunStatus::parse(&row.status)?,
            resolution_deg: row.resolution,
            bbox: row.bbox,
            forecast_hours: serde_json::from_str(&row.forecast_hours)?,
            metadata: serde_json::from_str(&row.metadata)?,
        })
    }
}

impl WeatherStore {
    /// Open (or create) a store at `path`.
    ///
    /// Runs left `ingesting` by a previous process are marked `failed`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let connection = Connection::open(path)?;
        Self::from_connection(connection, Some(path.to_path_buf()))
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?, None)
    }

    fn from_connection(connection: Connection, path: Option<PathBuf>) -> Result<Self> {
        connection.execute_batch("PRAGMA foreign_keys = ON;")?;
        connection.execute_batch(SCHEMA)?;

        let interrupted = connection.execute(
            "UPDATE forecast_runs
             SET status = 'failed', metadata = json_set(metadata, '$.failure', 'interrupted')
             WHERE status = 'ingesting'",
            [],
        )?;
        if interrupted > 0 {
            warn!(runs = interrupted, "marked interrupted ingestions as failed");
        }

        let mut latest = HashMap::new();
        for source in ForecastSource::ALL {
            if let Some(run) = Self::query_latest_complete(&connection, source)? {
                latest.insert(source, Arc::new(run));
            }
        }

        debug!(
            path = ?path,
            sources_with_data = latest.len(),
            "opened weather store"
        );

        Ok(Self {
            connection: Mutex::new(connection),
            latest: RwLock::new(latest),
            path,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.connection
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn query_run(connection: &Connection, run_id: i64) -> Result<Option<ForecastRun>> {
        let sql = format!("SELECT {RUN_COLUMNS} FROM forecast_runs WHERE id = ?1");
        connection
            .query_row(&sql, params![run_id], row_to_run)
            .optional()?
            .map(ForecastRun::try_from)
            .transpose()
    }

    fn query_latest_complete(
        connection: &Connection,
        source: ForecastSource,
    ) -> Result<Option<ForecastRun>> {
        let sql = format!(
            "SELECT {RUN_COLUMNS} FROM forecast_runs
             WHERE source = ?1 AND status = 'complete'
             ORDER BY run_time DESC LIMIT 1"
        );
        connection
            .query_row(&sql, params![source.as_str()], row_to_run)
            .optional()?
            .map(ForecastRun::try_from)
            .transpose()
    }

    /// Source of a run that is still ingesting.
    fn ingesting_source(connection: &Connection, run_id: i64) -> Result<ForecastSource> {
        let row: Option<(String, String)> = connection
            .query_row(
                "SELECT source, status FROM forecast_runs WHERE id = ?1",
                params![run_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        match row {
            Some((source, status)) if status == "ingesting" => source.parse(),
            _ => Err(Error::UnknownRun { run_id }),
        }
    }

    /// Register a new run in `ingesting` state.
    pub fn begin_run(
        &self,
        source: ForecastSource,
        run_time: DateTime<Utc>,
        resolution_deg: f64,
        bbox: BoundingBox,
    ) -> Result<i64> {
        let run_time_text = timestamp(run_time);
        let connection = self.conn();

        let exists: Option<i64> = connection
            .query_row(
                "SELECT id FROM forecast_runs WHERE source = ?1 AND run_time = ?2",
                params![source.as_str(), run_time_text],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_some() {
            return Err(Error::DuplicateRun {
                feed: source.to_string(),
                run_time: run_time_text,
            });
        }

        connection.execute(
            "INSERT INTO forecast_runs
             (source, run_time, ingested_at, status, resolution, lat_min, lat_max, lon_min, lon_max)
             VALUES (?1, ?2, ?3, 'ingesting', ?4, ?5, ?6, ?7, ?8)",
            params![
                source.as_str(),
                run_time_text,
                timestamp(Utc::now()),
                resolution_deg,
                bbox.lat_min,
                bbox.lat_max,
                bbox.lon_min,
                bbox.lon_max
            ],
        )?;
        let run_id = connection.last_insert_rowid();
        info!(run_id, source = %source, run_time = %run_time_text, "began forecast run");
        Ok(run_id)
    }

    /// Merge a key into the run's free-form metadata.
    pub fn annotate_run(&self, run_id: i64, key: &str, value: &serde_json::Value) -> Result<()> {
        let path = format!("$.{key}");
        let updated = self.conn().execute(
            "UPDATE forecast_runs SET metadata = json_set(metadata, ?2, json(?3)) WHERE id = ?1",
            params![run_id, path, value.to_string()],
        )?;
        if updated == 0 {
            return Err(Error::UnknownRun { run_id });
        }
        Ok(())
    }

    /// Compress and persist one slice. Published slices are immutable.
    pub fn write_slice(
        &self,
        run_id: i64,
        forecast_hour: u32,
        parameter: &str,
        grid: &RawGrid,
    ) -> Result<()> {
        let compressed = CompressedSlice::compress(grid)?;
        let connection = self.conn();
        let source = Self::ingesting_source(&connection, run_id)?;
        if !source.parameters().contains(&parameter) {
            return Err(Error::UnknownParameter {
                feed: source.to_string(),
                parameter: parameter.to_string(),
            });
        }

        let exists: Option<i64> = connection
            .query_row(
                "SELECT 1 FROM grid_slices WHERE run_id = ?1 AND forecast_hour = ?2 AND parameter = ?3",
                params![run_id, forecast_hour, parameter],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_some() {
            return Err(Error::DuplicateSlice {
                run_id,
                forecast_hour,
                parameter: parameter.to_string(),
            });
        }

        connection.execute(
            "INSERT INTO grid_slices (run_id, forecast_hour, parameter, rows, cols, lats, lons, data)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                run_id,
                forecast_hour,
                parameter,
                compressed.rows as i64,
                compressed.cols as i64,
                compressed.lats,
                compressed.lons,
                compressed.data
            ],
        )?;
        debug!(
            run_id,
            forecast_hour,
            parameter,
            bytes = compressed.stored_len(),
            "wrote grid slice"
        );
        Ok(())
    }

    /// Record that every parameter of `forecast_hour` is now present.
    pub fn record_hour(&self, run_id: i64, forecast_hour: u32) -> Result<()> {
        let connection = self.conn();
        Self::ingesting_source(&connection, run_id)?;
        let text: String = connection.query_row(
            "SELECT forecast_hours FROM forecast_runs WHERE id = ?1",
            params![run_id],
            |row| row.get(0),
        )?;
        let mut hours: Vec<u32> = serde_json::from_str(&text)?;
        if !hours.contains(&forecast_hour) {
            hours.push(forecast_hour);
            hours.sort_unstable();
            connection.execute(
                "UPDATE forecast_runs SET forecast_hours = ?2 WHERE id = ?1",
                params![run_id, serde_json::to_string(&hours)?],
            )?;
        }
        Ok(())
    }

    /// Mark a run complete with its full hour set and supersede older complete
    /// runs of the same source in one transaction.
    ///
    /// A run older than the source's current complete run is recorded as
    /// superseded straight away and the pointer is left alone.
    pub fn complete_run(&self, run_id: i64, forecast_hours: &[u32]) -> Result<Arc<ForecastRun>> {
        let mut hours = forecast_hours.to_vec();
        hours.sort_unstable();
        hours.dedup();

        let mut connection = self.conn();
        Self::ingesting_source(&connection, run_id)?;
        let tx = connection.transaction()?;

        let (source, run_time): (String, String) = tx.query_row(
            "SELECT source, run_time FROM forecast_runs WHERE id = ?1",
            params![run_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let newer: Option<i64> = tx
            .query_row(
                "SELECT id FROM forecast_runs
                 WHERE source = ?1 AND run_time > ?2 AND status IN ('complete', 'superseded')
                 LIMIT 1",
                params![source, run_time],
                |row| row.get(0),
            )
            .optional()?;
        let final_status = if newer.is_some() {
            RunStatus::Superseded
        } else {
            RunStatus::Complete
        };

        tx.execute(
            "UPDATE forecast_runs SET status = ?2, forecast_hours = ?3, completed_at = ?4 WHERE id = ?1",
            params![
                run_id,
                final_status.as_str(),
                serde_json::to_string(&hours)?,
                timestamp(Utc::now())
            ],
        )?;
        let superseded = if final_status == RunStatus::Complete {
            tx.execute(
                "UPDATE forecast_runs SET status = 'superseded'
                 WHERE source = ?1 AND status = 'complete' AND id != ?2",
                params![source, run_id],
            )?
        } else {
            0
        };
        tx.commit()?;

        let run = Arc::new(Self::query_run(&connection, run_id)?.ok_or(Error::UnknownRun { run_id })?);
        if run.status == RunStatus::Complete {
            // Swap while the connection lock is still held so pointer order
            // matches commit order.
            let mut latest = self
                .latest
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            latest.insert(run.source, Arc::clone(&run));
        }

        info!(
            run_id,
            source = %run.source,
            status = %run.status,
            hours = run.forecast_hours.len(),
            superseded,
            "completed forecast run"
        );
        Ok(run)
    }

    /// Move an ingesting run to the terminal `failed` state.
    pub fn fail_run(&self, run_id: i64, reason: &str) -> Result<()> {
        let connection = self.conn();
        Self::ingesting_source(&connection, run_id)?;
        connection.execute(
            "UPDATE forecast_runs
             SET status = 'failed', completed_at = ?2, metadata = json_set(metadata, '$.failure', ?3)
             WHERE id = ?1",
            params![run_id, timestamp(Utc::now()), reason],
        )?;
        warn!(run_id, reason, "forecast run failed");
        Ok(())
    }

    /// Read and decompress one slice, `None` if it was never written.
    pub fn read_slice(
        &self,
        run_id: i64,
        forecast_hour: u32,
        parameter: &str,
    ) -> Result<Option<GridSlice>> {
        let compressed = self
            .conn()
            .query_row(
                "SELECT rows, cols, lats, lons, data FROM grid_slices
                 WHERE run_id = ?1 AND forecast_hour = ?2 AND parameter = ?3",
                params![run_id, forecast_hour, parameter],
                |row| {
                    let rows: i64 = row.get(0)?;
                    let cols: i64 = row.get(1)?;
                    Ok(CompressedSlice {
                        rows: rows as usize,
                        cols: cols as usize,
                        lats: row.get(2)?,
                        lons: row.get(3)?,
                        data: row.get(4)?,
                    })
                },
            )
            .optional()?;

        compressed
            .map(|slice| slice.decompress(run_id, forecast_hour, parameter))
            .transpose()
    }

    /// Like [`read_slice`](Self::read_slice) but a missing slice is an error.
    pub fn require_slice(
        &self,
        run_id: i64,
        forecast_hour: u32,
        parameter: &str,
    ) -> Result<GridSlice> {
        self.read_slice(run_id, forecast_hour, parameter)?
            .ok_or_else(|| Error::SliceNotFound {
                run_id,
                forecast_hour,
                parameter: parameter.to_string(),
            })
    }

    /// Most recently completed, non-superseded run of `source`.
    pub fn latest_complete(&self, source: ForecastSource) -> Option<Arc<ForecastRun>> {
        self.latest
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&source)
            .cloned()
    }

    pub fn run(&self, run_id: i64) -> Result<Option<ForecastRun>> {
        Self::query_run(&self.conn(), run_id)
    }

    pub fn find_run(
        &self,
        source: ForecastSource,
        run_time: DateTime<Utc>,
    ) -> Result<Option<ForecastRun>> {
        let sql = format!(
            "SELECT {RUN_COLUMNS} FROM forecast_runs WHERE source = ?1 AND run_time = ?2"
        );
        self.conn()
            .query_row(&sql, params![source.as_str(), timestamp(run_time)], row_to_run)
            .optional()?
            .map(ForecastRun::try_from)
            .transpose()
    }

    /// All runs of a source, newest model cycle first.
    pub fn runs(&self, source: ForecastSource) -> Result<Vec<ForecastRun>> {
        let sql = format!(
            "SELECT {RUN_COLUMNS} FROM forecast_runs WHERE source = ?1 ORDER BY run_time DESC"
        );
        let connection = self.conn();
        let mut stmt = connection.prepare(&sql)?;
        let rows = stmt.query_map(params![source.as_str()], row_to_run)?;
        let mut runs = Vec::new();
        for row in rows {
            runs.push(ForecastRun::try_from(row?)?);
        }
        Ok(runs)
    }

    /// Number of slices stored for a run.
    pub fn slice_count(&self, run_id: i64) -> Result<usize> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM grid_slices WHERE run_id = ?1",
            params![run_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Delete a run that is not the active one; its slices cascade.
    pub fn delete_run(&self, run_id: i64) -> Result<()> {
        let connection = self.conn();
        let run = Self::query_run(&connection, run_id)?.ok_or(Error::UnknownRun { run_id })?;
        if matches!(run.status, RunStatus::Complete | RunStatus::Ingesting) {
            return Err(Error::UnknownRun { run_id });
        }
        connection.execute("DELETE FROM forecast_runs WHERE id = ?1", params![run_id])?;
        info!(run_id, source = %run.source, "deleted forecast run");
        Ok(())
    }
}
