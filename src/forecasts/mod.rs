//! Forecast database access.
//!
//! Provides a trait-based interface over the forecast tables (`forecast_v2`
//! and `forecast_points`) with Postgres and SQLite backends.

mod guard;
mod postgres;
mod sqlite;

pub use guard::check_read_only;
pub use self::postgres::{PostgresConfig, PostgresForecastStore};
pub use sqlite::SqliteForecastStore;

use crate::config::{Credentials, DatabaseProvider, Settings};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Human-readable description of the forecast tables, given to the query agent.
pub const SCHEMA_DESCRIPTION: &str = r#"Table: forecast_v2, fields: [id: unique integer for each forecast, question: string with the forecast question, category: string with one or more categories the forecast belongs to, created: datetime of question creation, resolution_criteria: string describing the conditions for the forecast to resolve as Yes or No, resolution: string with how the forecast resolved, "0" if it did not happen, "1" if it happened and "-" if it resolved as ambiguous, resolved: datetime of question resolution (NULL while open), brier_score: Brier score obtained for the forecast, log2_score: log score in base 2, logn_score: log score in natural logarithm, comment: the user's comment on the resolution]
Table: forecast_points, fields: [update_id: unique integer for the forecast point, forecast_id: the id of the forecast in forecast_v2, point_forecast: the forecasted probability as a float, upper_ci: upper confidence interval on the forecasted probability, lower_ci: lower confidence interval on the forecasted probability, reason: the user's reason for the forecast point, created: datetime of forecast point creation]"#;

/// An unresolved forecast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub id: i64,
    pub question: String,
    pub category: String,
    pub created_at: DateTime<Utc>,
}

impl std::fmt::Display for Forecast {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{}] (created {})",
            self.question,
            self.category,
            self.created_at.format("%Y-%m-%d")
        )
    }
}

/// Rows returned by an ad-hoc query, with every cell rendered as text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryRows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl QueryRows {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl std::fmt::Display for QueryRows {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return write!(f, "Query returned no rows.");
        }
        writeln!(f, "{}", self.columns.join(" | "))?;
        for row in &self.rows {
            writeln!(f, "{}", row.join(" | "))?;
        }
        write!(f, "({} row{})", self.rows.len(), if self.rows.len() == 1 { "" } else { "s" })
    }
}

/// Brier scores of a forecast's points under both possible resolutions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BrierScores {
    pub resolves_yes: Vec<f64>,
    pub resolves_no: Vec<f64>,
    pub mean_if_yes: Option<f64>,
    pub mean_if_no: Option<f64>,
}

/// Score every point forecast against a Yes (1) and a No (0) outcome.
pub fn brier_scores(points: &[f64]) -> BrierScores {
    let resolves_yes: Vec<f64> = points.iter().map(|p| (p - 1.0).powi(2)).collect();
    let resolves_no: Vec<f64> = points.iter().map(|p| p.powi(2)).collect();

    let mean = |scores: &[f64]| {
        if scores.is_empty() {
            None
        } else {
            Some(scores.iter().sum::<f64>() / scores.len() as f64)
        }
    };

    BrierScores {
        mean_if_yes: mean(&resolves_yes),
        mean_if_no: mean(&resolves_no),
        resolves_yes,
        resolves_no,
    }
}

/// Trait for forecast database implementations.
#[async_trait]
pub trait ForecastStore: Send + Sync {
    /// Fetch forecasts that have not been resolved yet.
    async fn unresolved_forecasts(&self) -> Result<Vec<Forecast>>;

    /// Execute model-supplied SQL and return its rows.
    ///
    /// The statement text is not parameterized. When the store is configured
    /// for read-only queries it is checked with [`check_read_only`] first.
    async fn run_query(&self, sql: &str) -> Result<QueryRows>;

    /// Point forecasts recorded for one forecast, oldest first.
    async fn forecast_points(&self, forecast_id: i64) -> Result<Vec<f64>>;
}

/// Open the configured forecast store.
pub fn create_store(settings: &Settings, credentials: &Credentials) -> Result<Arc<dyn ForecastStore>> {
    let store: Arc<dyn ForecastStore> = match settings.database.provider {
        DatabaseProvider::Postgres => Arc::new(PostgresForecastStore::new(PostgresConfig::from_settings(
            &settings.database,
            credentials,
        ))),
        DatabaseProvider::Sqlite => Arc::new(SqliteForecastStore::new(
            &settings.sqlite_path(),
            settings.database.read_only_queries,
        )?),
    };
    Ok(store)
}
