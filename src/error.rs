//! Error types for the forecast assistant.

use thiserror::Error;

/// Library-level error type for assistant operations.
#[derive(Error, Debug)]
pub enum AssistantError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authorization failed: {0}")]
    Auth(String),

    #[error("Email delivery failed: {0}")]
    Delivery(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("News search failed: {0}")]
    News(String),

    #[error("Language model error: {0}")]
    Model(String),

    #[error("Router error: {0}")]
    Router(String),

    #[error("Mail error: {0}")]
    Mail(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Postgres error: {0}")]
    Postgres(#[from] postgres::Error),

    #[error("OpenAI API error: {0}")]
    OpenAI(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type alias for assistant operations.
pub type Result<T> = std::result::Result<T, AssistantError>;
