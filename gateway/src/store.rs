use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use cold_storage_protocol::{
    api::{AggregatedRow, CurrentStatus, GroupValues, RawRow, WindowRow},
    SensorGroup,
};
use rusqlite::{params, Connection};
use std::{
    path::Path,
    str::FromStr,
    sync::{Arc, Mutex},
};
use tracing::{info, warn};

/// Format timestamps are stored in, always UTC.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS storage_units (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    unit_type TEXT    NOT NULL UNIQUE,
    unit_name TEXT    NOT NULL
);
INSERT OR IGNORE INTO storage_units (unit_type, unit_name)
    VALUES ('milk', 'Milk'), ('vegetables', 'Vegetables'), ('single', 'Single');

CREATE TABLE IF NOT EXISTS readings (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    unit_type        TEXT    NOT NULL,
    device_id        TEXT    NOT NULL,
    temperature      REAL    NOT NULL,
    humidity         REAL    NOT NULL,
    server_timestamp TEXT    NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_readings_time ON readings(server_timestamp);
CREATE INDEX IF NOT EXISTS idx_readings_unit ON readings(unit_type, id);
";

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("database task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("database connection poisoned")]
    Poisoned,
}

/// A validated reading about to be stored.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NewReading {
    pub group: SensorGroup,
    pub temperature: f64,
    pub humidity: f64,
}

/// SQLite backed reading store.
///
/// Cloning is cheap, clones share one connection. Queries run on the blocking thread pool.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::init(conn)
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;

        let count: i64 = conn.query_row("SELECT COUNT(*) FROM readings", [], |row| row.get(0))?;
        info!("Schema ready, {count} readings stored");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || -> Result<T, StoreError> {
            let conn = conn.lock().map_err(|_| StoreError::Poisoned)?;
            Ok(f(&*conn)?)
        })
        .await?
    }

    /// Stores the readings of one payload atomically.
    pub async fn insert(
        &self,
        device_id: String,
        readings: Vec<NewReading>,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let timestamp = at.format(TIMESTAMP_FORMAT).to_string();

        self.with(move |conn| {
            let tx = conn.unchecked_transaction()?;
            {
                let mut stmt = tx.prepare_cached(
                    "INSERT INTO readings (unit_type, device_id, temperature, humidity, server_timestamp)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )?;
                for r in &readings {
                    stmt.execute(params![
                        r.group.to_string(),
                        device_id,
                        r.temperature,
                        r.humidity,
                        timestamp
                    ])?;
                }
            }
            tx.commit()
        })
        .await
    }

    /// The newest reading of every group, folded into one status.
    pub async fn latest(&self) -> Result<Option<CurrentStatus>, StoreError> {
        let rows: Vec<(String, String, f64, f64, String)> = self
            .with(|conn| {
                let mut stmt = conn.prepare_cached(
                    "SELECT r.unit_type, r.device_id, r.temperature, r.humidity, r.server_timestamp
                     FROM readings r
                     WHERE r.id = (SELECT MAX(id) FROM readings WHERE unit_type = r.unit_type)
                     ORDER BY r.id",
                )?;
                let rows = stmt.query_map([], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
                })?;
                rows.collect()
            })
            .await?;

        let Some((_, device_id, _, _, timestamp)) = rows.last().cloned() else {
            return Ok(None);
        };

        let mut status = CurrentStatus {
            device_id,
            milk: None,
            vegetables: None,
            temperature: None,
            humidity: None,
            timestamp: to_rfc3339(&timestamp),
        };

        for (unit_type, _, temperature, humidity, _) in rows {
            let values = GroupValues {
                temperature,
                humidity,
            };

            match SensorGroup::from_str(&unit_type) {
                Ok(SensorGroup::Milk) => status.milk = Some(values),
                Ok(SensorGroup::Vegetables) => status.vegetables = Some(values),
                Ok(SensorGroup::Single) => {
                    status.temperature = Some(temperature);
                    status.humidity = Some(humidity);
                }
                Err(_) => warn!("Ignoring reading with unknown unit type \"{unit_type}\""),
            }
        }

        Ok(Some(status))
    }

    /// Every stored reading, oldest first.
    pub async fn raw(&self) -> Result<Vec<RawRow>, StoreError> {
        let rows: Vec<(String, String, f64, f64, String)> = self
            .with(|conn| {
                let mut stmt = conn.prepare_cached(
                    "SELECT r.unit_type, COALESCE(u.unit_name, r.unit_type), r.temperature, r.humidity,
                            r.server_timestamp
                     FROM readings r
                     LEFT JOIN storage_units u ON u.unit_type = r.unit_type
                     ORDER BY r.server_timestamp, r.id",
                )?;
                let rows = stmt.query_map([], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
                })?;
                rows.collect()
            })
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(unit_type, unit_name, temperature, humidity, time)| {
                Some(RawRow {
                    unit_type: parse_group(&unit_type)?,
                    unit_name,
                    temperature,
                    humidity,
                    time: Some(to_rfc3339(&time)),
                })
            })
            .collect())
    }

    /// Per-group hourly statistics over the whole history, oldest first.
    pub async fn aggregated(&self) -> Result<Vec<AggregatedRow>, StoreError> {
        type Row = (String, String, f64, f64, f64, f64, f64, f64);

        let rows: Vec<Row> = self
            .with(|conn| {
                let mut stmt = conn.prepare_cached(
                    "SELECT strftime('%Y-%m-%d %H:00:00', server_timestamp) AS hour, unit_type,
                            ROUND(AVG(temperature), 2), MAX(temperature), MIN(temperature),
                            ROUND(AVG(humidity), 2), MAX(humidity), MIN(humidity)
                     FROM readings
                     GROUP BY hour, unit_type
                     ORDER BY hour, unit_type",
                )?;
                let rows = stmt.query_map([], |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                        row.get(7)?,
                    ))
                })?;
                rows.collect()
            })
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(
                |(time, unit_type, avg_temp, max_temp, min_temp, avg_humidity, max_humidity, min_humidity)| {
                    Some(AggregatedRow {
                        time,
                        unit_type: parse_group(&unit_type)?,
                        avg_temp,
                        max_temp,
                        min_temp,
                        avg_humidity,
                        max_humidity,
                        min_humidity,
                    })
                },
            )
            .collect())
    }

    /// Hourly milk and vegetables averages side by side, over the `hours` before `now`.
    pub async fn window(&self, hours: u32, now: DateTime<Utc>) -> Result<Vec<WindowRow>, StoreError> {
        let cutoff = now
            .checked_sub_signed(TimeDelta::hours(i64::from(hours)))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
            .format(TIMESTAMP_FORMAT)
            .to_string();

        self.with(move |conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT strftime('%Y-%m-%d %H:00:00', server_timestamp) AS hour,
                        ROUND(AVG(CASE WHEN unit_type = 'milk' THEN temperature END), 2),
                        ROUND(AVG(CASE WHEN unit_type = 'milk' THEN humidity END), 2),
                        ROUND(AVG(CASE WHEN unit_type = 'vegetables' THEN temperature END), 2),
                        ROUND(AVG(CASE WHEN unit_type = 'vegetables' THEN humidity END), 2)
                 FROM readings
                 WHERE server_timestamp >= ?1 AND unit_type IN ('milk', 'vegetables')
                 GROUP BY hour
                 ORDER BY hour",
            )?;
            let rows = stmt.query_map(params![cutoff], |row| {
                Ok(WindowRow {
                    time: row.get(0)?,
                    milk_temperature: row.get(1)?,
                    milk_humidity: row.get(2)?,
                    veg_temperature: row.get(3)?,
                    veg_humidity: row.get(4)?,
                })
            })?;
            rows.collect()
        })
        .await
    }
}

fn parse_group(unit_type: &str) -> Option<SensorGroup> {
    match SensorGroup::from_str(unit_type) {
        Ok(group) => Some(group),
        Err(_) => {
            warn!("Ignoring reading with unknown unit type \"{unit_type}\"");
            None
        }
    }
}

fn to_rfc3339(timestamp: &str) -> String {
    match NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT) {
        Ok(t) => t.and_utc().to_rfc3339(),
        Err(_) => timestamp.to_string(),
    }
}
