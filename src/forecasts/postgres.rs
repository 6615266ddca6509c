//! Postgres-backed forecast store.
//!
//! Opens one connection per call on a blocking thread and closes it when the
//! call returns. There is no pooling.

use super::{check_read_only, Forecast, ForecastStore, QueryRows};
use crate::config::{Credentials, DatabaseSettings};
use crate::error::{AssistantError, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use postgres::row::SimpleQueryRow;
use postgres::{Client, NoTls, Row, SimpleQueryMessage};
use tracing::{debug, instrument};

/// Connection parameters for the forecast database.
#[derive(Clone)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: Option<String>,
    pub read_only_queries: bool,
}

impl std::fmt::Debug for PostgresConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("dbname", &self.dbname)
            .field("user", &self.user)
            .field("read_only_queries", &self.read_only_queries)
            .finish()
    }
}

impl PostgresConfig {
    /// Combine file settings with the HOST / DB_PASSWORD environment credentials.
    pub fn from_settings(settings: &DatabaseSettings, credentials: &Credentials) -> Self {
        Self {
            host: credentials
                .db_host
                .clone()
                .unwrap_or_else(|| settings.host.clone()),
            port: settings.port,
            dbname: settings.dbname.clone(),
            user: settings.user.clone(),
            password: credentials.db_password.clone(),
            read_only_queries: settings.read_only_queries,
        }
    }

    fn connect(&self) -> Result<Client> {
        let mut config = postgres::Config::new();
        config
            .host(&self.host)
            .port(self.port)
            .dbname(&self.dbname)
            .user(&self.user);
        if let Some(password) = &self.password {
            config.password(password);
        }
        Ok(config.connect(NoTls)?)
    }
}

/// Forecast store backed by the remote Postgres database.
pub struct PostgresForecastStore {
    config: PostgresConfig,
}

impl PostgresForecastStore {
    pub fn new(config: PostgresConfig) -> Self {
        Self { config }
    }

    /// Run a closure with a fresh connection on the blocking pool.
    async fn with_connection<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Client) -> Result<T> + Send + 'static,
    {
        let config = self.config.clone();
        tokio::task::spawn_blocking(move || {
            let mut client = config.connect()?;
            f(&mut client)
        })
        .await
        .map_err(|e| AssistantError::Query(format!("Database task failed: {}", e)))?
    }
}

#[async_trait]
impl ForecastStore for PostgresForecastStore {
    #[instrument(skip(self))]
    async fn unresolved_forecasts(&self) -> Result<Vec<Forecast>> {
        let forecasts = self
            .with_connection(|client| {
                let rows = client.query(
                    "SELECT id::BIGINT, question, category, created \
                     FROM forecast_v2 WHERE resolved IS NULL ORDER BY created",
                    &[],
                )?;
                rows.iter().map(row_to_forecast).collect::<Result<Vec<_>>>()
            })
            .await?;

        debug!("Fetched {} unresolved forecasts", forecasts.len());
        Ok(forecasts)
    }

    #[instrument(skip(self))]
    async fn run_query(&self, sql: &str) -> Result<QueryRows> {
        let read_only = self.config.read_only_queries;
        if read_only {
            check_read_only(sql)?;
        }

        let sql = sql.trim().trim_end_matches(';').to_string();
        self.with_connection(move |client| {
            // The simple protocol returns every cell as text, whatever its column type.
            let messages = if read_only {
                let mut tx = client.build_transaction().read_only(true).start()?;
                let messages = tx.simple_query(sql.as_str());
                tx.rollback()?;
                messages
            } else {
                client.simple_query(sql.as_str())
            }
            .map_err(|e| AssistantError::Query(e.to_string()))?;

            Ok(messages_to_query_rows(&messages))
        })
        .await
    }

    #[instrument(skip(self))]
    async fn forecast_points(&self, forecast_id: i64) -> Result<Vec<f64>> {
        self.with_connection(move |client| {
            let rows = client.query(
                "SELECT point_forecast::DOUBLE PRECISION FROM forecast_points \
                 WHERE forecast_id = $1::BIGINT ORDER BY created",
                &[&forecast_id],
            )?;
            Ok(rows
                .iter()
                .filter_map(|row| row.get::<_, Option<f64>>(0))
                .collect())
        })
        .await
    }
}

fn row_to_forecast(row: &Row) -> Result<Forecast> {
    Ok(Forecast {
        id: row.try_get(0)?,
        question: row.try_get::<_, Option<String>>(1)?.unwrap_or_default(),
        category: row.try_get::<_, Option<String>>(2)?.unwrap_or_default(),
        created_at: timestamp_at(row, 3)?,
    })
}

/// Read a timestamp column that may be declared with or without a time zone.
fn timestamp_at(row: &Row, idx: usize) -> Result<DateTime<Utc>> {
    if let Ok(Some(ts)) = row.try_get::<_, Option<DateTime<Utc>>>(idx) {
        return Ok(ts);
    }
    if let Ok(Some(ts)) = row.try_get::<_, Option<NaiveDateTime>>(idx) {
        return Ok(ts.and_utc());
    }
    if let Ok(Some(date)) = row.try_get::<_, Option<NaiveDate>>(idx) {
        return Ok(date.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc());
    }
    Err(AssistantError::Query(format!(
        "Column {} is not a readable timestamp",
        idx
    )))
}

fn messages_to_query_rows(messages: &[SimpleQueryMessage]) -> QueryRows {
    let rows: Vec<&SimpleQueryRow> = messages
        .iter()
        .filter_map(|message| match message {
            SimpleQueryMessage::Row(row) => Some(row),
            _ => None,
        })
        .collect();

    let columns = rows
        .first()
        .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
        .unwrap_or_default();

    text_rows(
        columns,
        rows.iter().map(|row| (0..row.len()).map(|idx| row.get(idx)).collect()),
    )
}

/// Build `QueryRows` from text cells, rendering SQL NULL as `NULL`.
fn text_rows<'a>(columns: Vec<String>, rows: impl Iterator<Item = Vec<Option<&'a str>>>) -> QueryRows {
    let rows = rows
        .map(|cells| {
            cells
                .into_iter()
                .map(|cell| cell.unwrap_or("NULL").to_string())
                .collect()
        })
        .collect();

    QueryRows { columns, rows }
}
