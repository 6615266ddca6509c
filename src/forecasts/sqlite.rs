//! SQLite-based forecast store.
//!
//! Mirrors the Postgres tables so the assistant can run against a local file.
//! Timestamps are stored as RFC 3339 text.

use super::{check_read_only, Forecast, ForecastStore, QueryRows};
use crate::error::{AssistantError, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::types::ValueRef;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info, instrument};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS forecast_v2 (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    question TEXT NOT NULL,
    category TEXT NOT NULL DEFAULT '',
    created TEXT NOT NULL,
    resolution_criteria TEXT,
    resolution TEXT,
    resolved TEXT,
    brier_score REAL,
    log2_score REAL,
    logn_score REAL,
    comment TEXT
);

CREATE INDEX IF NOT EXISTS idx_forecast_v2_resolved ON forecast_v2(resolved);

CREATE TABLE IF NOT EXISTS forecast_points (
    update_id INTEGER PRIMARY KEY AUTOINCREMENT,
    forecast_id INTEGER NOT NULL REFERENCES forecast_v2(id),
    point_forecast REAL NOT NULL,
    upper_ci REAL,
    lower_ci REAL,
    reason TEXT,
    created TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_forecast_points_forecast_id ON forecast_points(forecast_id);
"#;

/// SQLite forecast store.
pub struct SqliteForecastStore {
    conn: Mutex<Connection>,
    read_only_queries: bool,
}

impl SqliteForecastStore {
    /// Open (or create) a forecast database file.
    #[instrument(skip_all)]
    pub fn new(path: &Path, read_only_queries: bool) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;

        info!("Opened SQLite forecast store at {:?}", path);

        Ok(Self {
            conn: Mutex::new(conn),
            read_only_queries,
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory(read_only_queries: bool) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Mutex::new(conn),
            read_only_queries,
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| AssistantError::Query(format!("Failed to acquire lock: {}", e)))
    }

    /// Insert a forecast and return its id.
    pub fn insert_forecast(
        &self,
        question: &str,
        category: &str,
        created_at: DateTime<Utc>,
        resolved_at: Option<DateTime<Utc>>,
    ) -> Result<i64> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO forecast_v2 (question, category, created, resolved) VALUES (?1, ?2, ?3, ?4)",
            params![
                question,
                category,
                created_at.to_rfc3339(),
                resolved_at.map(|ts| ts.to_rfc3339())
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Record a point forecast for an existing forecast.
    pub fn insert_point(
        &self,
        forecast_id: i64,
        point_forecast: f64,
        created_at: DateTime<Utc>,
    ) -> Result<i64> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO forecast_points (forecast_id, point_forecast, created) VALUES (?1, ?2, ?3)",
            params![forecast_id, point_forecast, created_at.to_rfc3339()],
        )?;
        Ok(conn.last_insert_rowid())
    }
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|dt| dt.and_utc()))
        .unwrap_or_default()
}

fn cell_to_string(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => "NULL".to_string(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        ValueRef::Blob(bytes) => format!("<blob {} bytes>", bytes.len()),
    }
}

#[async_trait]
impl ForecastStore for SqliteForecastStore {
    #[instrument(skip(self))]
    async fn unresolved_forecasts(&self) -> Result<Vec<Forecast>> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT id, question, category, created
            FROM forecast_v2
            WHERE resolved IS NULL
            ORDER BY created
            "#,
        )?;

        let forecasts = stmt
            .query_map([], |row| {
                let created: String = row.get(3)?;
                Ok(Forecast {
                    id: row.get(0)?,
                    question: row.get(1)?,
                    category: row.get(2)?,
                    created_at: parse_timestamp(&created),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        debug!("Fetched {} unresolved forecasts", forecasts.len());
        Ok(forecasts)
    }

    #[instrument(skip(self))]
    async fn run_query(&self, sql: &str) -> Result<QueryRows> {
        if self.read_only_queries {
            check_read_only(sql)?;
        }

        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(sql.trim())
            .map_err(|e| AssistantError::Query(e.to_string()))?;

        if self.read_only_queries && !stmt.readonly() {
            return Err(AssistantError::Query(
                "Statement would modify the database".to_string(),
            ));
        }

        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let width = columns.len();

        let mut rows = stmt
            .query([])
            .map_err(|e| AssistantError::Query(e.to_string()))?;
        let mut result = Vec::new();
        while let Some(row) = rows.next().map_err(|e| AssistantError::Query(e.to_string()))? {
            let mut cells = Vec::with_capacity(width);
            for idx in 0..width {
                cells.push(cell_to_string(row.get_ref(idx)?));
            }
            result.push(cells);
        }

        Ok(QueryRows {
            columns,
            rows: result,
        })
    }

    #[instrument(skip(self))]
    async fn forecast_points(&self, forecast_id: i64) -> Result<Vec<f64>> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            "SELECT point_forecast FROM forecast_points WHERE forecast_id = ?1 ORDER BY created, update_id",
        )?;

        let points = stmt
            .query_map(params![forecast_id], |row| row.get::<_, f64>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(points)
    }
}
